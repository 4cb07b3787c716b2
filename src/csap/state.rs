//! CSAP 运行状态
//!
//! 状态位、最近一次收发操作、计数器与时间戳都放在 [`CsapStatus`] 中，
//! 由 CSAP 的数据访问锁保护。跨线程读写必须持锁。

use std::thread::ThreadId;
use std::time::{Instant, SystemTime};

use crate::error::{ErrorKind, Result, TadError};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CsapState: u8 {
        const SENDING = 1 << 0;
        const RECEIVING = 1 << 1;
        /// 收发在调用线程上阻塞执行
        const FOREGROUND = 1 << 2;
        const COMPLETE = 1 << 3;
        /// 匹配成功时构造结果 NDS
        const RESULTS = 1 << 4;
    }
}

/// 收发操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TrafficOp {
    #[default]
    Idle,
    Send,
    SendRecv,
    Recv,
    Get,
    Wait,
    Stop,
    Destroy,
}

/// 控制面发给收发线程的命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficCmd {
    Stop,
    Destroy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CsapCounters {
    /// 当前操作处理的报文数
    pub packets: u64,
    /// 当前操作处理的字节数
    pub bytes: u64,
    pub total_sent: u64,
    pub total_received: u64,
}

#[derive(Debug, Clone, Default)]
pub struct CsapStatus {
    pub state: CsapState,
    pub last_op: TrafficOp,
    pub traffic_thread: Option<ThreadId>,
    pub counters: CsapCounters,
    pub first_pkt: Option<SystemTime>,
    pub last_pkt: Option<SystemTime>,
    pub deadline: Option<Instant>,
    pub last_error: Option<(ErrorKind, String)>,
}

impl CsapStatus {
    /// 正在收发且尚未结束
    pub fn is_busy(&self) -> bool {
        self.state.intersects(CsapState::SENDING | CsapState::RECEIVING)
            && !self.state.contains(CsapState::COMPLETE)
    }

    /// 开始一次收发：Idle/Complete → Sending/Receiving
    pub(crate) fn begin(&mut self, id: u32, op: TrafficOp, flags: CsapState) -> Result<()> {
        if self.is_busy() {
            return Err(TadError::Busy(id));
        }
        self.state = flags;
        self.last_op = op;
        self.traffic_thread = None;
        self.counters.packets = 0;
        self.counters.bytes = 0;
        self.first_pkt = None;
        self.last_pkt = None;
        self.deadline = None;
        self.last_error = None;
        Ok(())
    }

    /// 记录一个成功处理的报文
    pub(crate) fn account(&mut self, bytes: usize, sent: bool) {
        self.counters.packets += 1;
        self.counters.bytes += bytes as u64;
        if sent {
            self.counters.total_sent += bytes as u64;
        } else {
            self.counters.total_received += bytes as u64;
        }
        self.touch();
    }

    /// 发送并接收时的请求报文：只计入发送总量，操作计数只算收到的应答
    pub(crate) fn account_request(&mut self, bytes: usize) {
        self.counters.total_sent += bytes as u64;
        self.touch();
    }

    fn touch(&mut self) {
        let now = SystemTime::now();
        if self.first_pkt.is_none() {
            self.first_pkt = Some(now);
        }
        self.last_pkt = Some(now);
    }

    /// 收发结束：置 COMPLETE，记录错误（可恢复错误不记录）
    pub(crate) fn finish(&mut self, error: Option<&TadError>) {
        self.state.insert(CsapState::COMPLETE);
        self.traffic_thread = None;
        if let Some(e) = error.filter(|e| !e.is_recoverable()) {
            self.last_error = Some((e.kind(), e.to_string()));
        }
    }

    /// 结果已被取走，回到空闲
    pub(crate) fn reset_idle(&mut self, op: TrafficOp) {
        self.state = CsapState::empty();
        self.last_op = op;
        self.deadline = None;
    }
}
