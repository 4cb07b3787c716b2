//! 内存回环介质

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use super::Medium;
use crate::error::{Result, TadError};
use crate::pkt::Packet;

/// 对写出的每个报文给出可选应答，应答进入接收队列
pub type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

#[derive(Default)]
struct Queues {
    rx: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    echo: bool,
}

struct Shared {
    queues: Mutex<Queues>,
    ready: Condvar,
}

/// 回环介质的外部句柄：注入待接收报文，查看已写出的报文
#[derive(Clone)]
pub struct LoopbackHandle {
    shared: Arc<Shared>,
}

impl LoopbackHandle {
    /// `echo` 为真时写出的报文同时进入接收队列
    pub fn new(echo: bool) -> Self {
        Self {
            shared: Arc::new(Shared {
                queues: Mutex::new(Queues {
                    echo,
                    ..Queues::default()
                }),
                ready: Condvar::new(),
            }),
        }
    }

    pub fn inject(&self, frame: impl Into<Vec<u8>>) {
        self.shared.queues.lock().rx.push_back(frame.into());
        self.shared.ready.notify_all();
    }

    /// 接收队列中尚未读取的报文数
    pub fn pending(&self) -> usize {
        self.shared.queues.lock().rx.len()
    }

    /// 至今写出的全部报文
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.shared.queues.lock().sent.clone()
    }

    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.shared.queues.lock().sent)
    }

    /// 生成绑定到本句柄的介质
    pub fn medium(&self) -> LoopbackMedium {
        LoopbackMedium {
            shared: self.shared.clone(),
            responder: None,
        }
    }

    /// 带应答器的介质
    pub fn medium_with_responder(&self, responder: Responder) -> LoopbackMedium {
        LoopbackMedium {
            shared: self.shared.clone(),
            responder: Some(responder),
        }
    }
}

pub struct LoopbackMedium {
    shared: Arc<Shared>,
    responder: Option<Responder>,
}

impl Medium for LoopbackMedium {
    fn name(&self) -> &str {
        "loopback"
    }

    fn write(&mut self, pkt: &Packet) -> Result<()> {
        let frame = pkt.to_vec();
        let reply = self.responder.as_mut().and_then(|r| r(&frame));
        let mut q = self.shared.queues.lock();
        if q.echo {
            q.rx.push_back(frame.clone());
        }
        if let Some(reply) = reply {
            q.rx.push_back(reply);
        }
        trace!(len = frame.len(), queued = q.rx.len(), "回环写出");
        q.sent.push(frame);
        drop(q);
        self.shared.ready.notify_all();
        Ok(())
    }

    fn read(&mut self, timeout: Duration) -> Result<Packet> {
        let mut q = self.shared.queues.lock();
        if q.rx.is_empty() {
            self.shared.ready.wait_for(&mut q, timeout);
        }
        q.rx.pop_front().map(Packet::from_bytes).ok_or(TadError::TimedOut)
    }
}
