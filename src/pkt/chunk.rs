//! 分块字节缓冲
//!
//! 按固定块大小增长，写满一块再开下一块；冻结后每块成为报文的一个段，
//! 不需要整体拷贝。

use bytes::BytesMut;

use super::packet::Packet;
use super::segment::Segment;

pub const DEFAULT_CHUNK_SIZE: usize = 1024;

#[derive(Debug)]
pub struct ChunkBuf {
    chunk_size: usize,
    chunks: Vec<BytesMut>,
    len: usize,
}

impl Default for ChunkBuf {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl ChunkBuf {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunks: Vec::new(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn append(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let room = self.tail_room();
            let take = room.min(data.len());
            if let Some(tail) = self.chunks.last_mut() {
                tail.extend_from_slice(&data[..take]);
            }
            self.len += take;
            data = &data[take..];
        }
    }

    /// 追加 `n` 个零字节，返回新增区域供调用方填充（可能跨块，按块回调）
    pub fn append_with<F>(&mut self, mut n: usize, mut fill: F)
    where
        F: FnMut(&mut [u8]),
    {
        while n > 0 {
            let take = self.tail_room().min(n);
            if let Some(tail) = self.chunks.last_mut() {
                let start = tail.len();
                tail.resize(start + take, 0);
                fill(&mut tail[start..]);
            }
            self.len += take;
            n -= take;
        }
    }

    /// 当前尾块剩余空间，尾块已满时先开新块
    fn tail_room(&mut self) -> usize {
        let full = self
            .chunks
            .last()
            .is_none_or(|c| c.len() >= self.chunk_size);
        if full {
            self.chunks.push(BytesMut::with_capacity(self.chunk_size));
        }
        self.chunks
            .last()
            .map_or(0, |c| self.chunk_size - c.len())
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len);
        for c in &self.chunks {
            out.extend_from_slice(c);
        }
        out
    }

    /// 冻结为报文，每块一个段
    pub fn into_packet(self) -> Packet {
        let mut pkt = Packet::new();
        for c in self.chunks {
            if !c.is_empty() {
                pkt.append_seg(Segment::new(c.freeze()));
            }
        }
        pkt
    }
}
