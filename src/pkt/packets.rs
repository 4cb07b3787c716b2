//! 报文列表

use std::collections::VecDeque;

use bytes::Bytes;

use super::packet::Packet;
use super::segment::{SegFree, Segment};
use crate::error::Result;

/// 一次生成或匹配中某一层的 PDU/SDU 列表
#[derive(Debug, Clone, Default)]
pub struct Packets {
    pkts: VecDeque<Packet>,
}

impl Packets {
    pub fn new() -> Self {
        Self::default()
    }

    /// `n` 个空报文
    pub fn alloc(n: usize) -> Self {
        Self {
            pkts: (0..n).map(|_| Packet::new()).collect(),
        }
    }

    pub fn add(&mut self, pkt: Packet) {
        self.pkts.push_back(pkt);
    }

    /// 报文个数
    pub fn len(&self) -> usize {
        self.pkts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pkts.is_empty()
    }

    /// 所有报文的总字节数
    pub fn total_len(&self) -> usize {
        self.pkts.iter().map(Packet::len).sum()
    }

    pub fn first(&self) -> Option<&Packet> {
        self.pkts.front()
    }

    pub fn first_mut(&mut self) -> Option<&mut Packet> {
        self.pkts.front_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Packet> {
        self.pkts.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Packet> {
        self.pkts.iter_mut()
    }

    pub fn pop_front(&mut self) -> Option<Packet> {
        self.pkts.pop_front()
    }

    /// 把 `from` 中的全部报文移到本列表末尾，`from` 变为空
    pub fn move_from(&mut self, from: &mut Packets) {
        self.pkts.append(&mut from.pkts);
    }

    /// 在每个报文前部插入一个共享 `data` 的段，只有第一个报文的段带释放回调
    pub fn prepend_shared_seg(&mut self, data: Bytes, free: Option<SegFree>) {
        let mut free = free;
        for pkt in self.pkts.iter_mut() {
            let seg = match free.take() {
                Some(f) => Segment::with_free(data.clone(), f),
                None => Segment::new(data.clone()),
            };
            pkt.prepend_seg(seg);
        }
    }

    /// 在每个报文末尾追加一个共享 `data` 的段，规则同 [`Self::prepend_shared_seg`]
    pub fn append_shared_seg(&mut self, data: Bytes, free: Option<SegFree>) {
        let mut free = free;
        for pkt in self.pkts.iter_mut() {
            let seg = match free.take() {
                Some(f) => Segment::with_free(data.clone(), f),
                None => Segment::new(data.clone()),
            };
            pkt.append_seg(seg);
        }
    }

    /// 依次回调每个报文，遇到错误立即返回
    pub fn enumerate<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(&mut Packet, usize) -> Result<()>,
    {
        for (i, pkt) in self.pkts.iter_mut().enumerate() {
            f(pkt, i)?;
        }
        Ok(())
    }

    /// 依次回调每个报文的第一个段
    pub fn enumerate_first_segs<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&Segment, usize) -> Result<()>,
    {
        for (i, pkt) in self.pkts.iter().enumerate() {
            if let Some(seg) = pkt.first_seg() {
                f(seg, i)?;
            }
        }
        Ok(())
    }
}

impl From<Packet> for Packets {
    fn from(pkt: Packet) -> Self {
        let mut pkts = Packets::new();
        pkts.add(pkt);
        pkts
    }
}

impl IntoIterator for Packets {
    type Item = Packet;
    type IntoIter = std::collections::vec_deque::IntoIter<Packet>;

    fn into_iter(self) -> Self::IntoIter {
        self.pkts.into_iter()
    }
}
