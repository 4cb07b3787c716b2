//! 报文：段的有序列表

use std::collections::VecDeque;

use bytes::Bytes;
use rand::RngCore;

use super::bits;
use super::segment::Segment;
use crate::error::{Result, TadError};

/// 取片段时数据不足的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragMode {
    /// 数据不足时报错
    Error,
    /// 截断到实际可用长度
    Trunc,
    /// 不足部分补零
    Zero,
    /// 不足部分补随机字节
    Rand,
}

#[derive(Debug, Clone, Default)]
pub struct Packet {
    segs: VecDeque<Segment>,
}

impl Packet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 单段报文
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let mut pkt = Self::new();
        pkt.append_seg(Segment::new(data));
        pkt
    }

    pub fn seg_num(&self) -> usize {
        self.segs.len()
    }

    /// 所有段的总字节数
    pub fn len(&self) -> usize {
        self.segs.iter().map(Segment::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn first_seg(&self) -> Option<&Segment> {
        self.segs.front()
    }

    pub fn last_seg(&self) -> Option<&Segment> {
        self.segs.back()
    }

    pub fn segs(&self) -> impl Iterator<Item = &Segment> {
        self.segs.iter()
    }

    pub fn append_seg(&mut self, seg: Segment) {
        self.segs.push_back(seg);
    }

    pub fn prepend_seg(&mut self, seg: Segment) {
        self.segs.push_front(seg);
    }

    /// 在第 `idx` 个段之前插入；`idx` 超出时追加
    pub fn insert_seg(&mut self, idx: usize, seg: Segment) {
        if idx >= self.segs.len() {
            self.segs.push_back(seg);
        } else {
            self.segs.insert(idx, seg);
        }
    }

    /// 把另一个报文的所有段移到本报文末尾
    pub fn append_pkt(&mut self, other: &mut Packet) {
        self.segs.append(&mut other.segs);
    }

    pub fn clear(&mut self) {
        self.segs.clear();
    }

    /// 拷贝为连续字节
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        for seg in &self.segs {
            out.extend_from_slice(seg.as_slice());
        }
        out
    }

    /// 单段报文直接借出，多段时返回 `None`
    pub fn as_contiguous(&self) -> Option<&[u8]> {
        match self.segs.len() {
            0 => Some(&[]),
            1 => self.segs.front().map(Segment::as_slice),
            _ => None,
        }
    }

    /// 取 `[offset, offset + len)` 的片段视图，与原报文共享缓冲区
    pub fn get_frag(&self, offset: usize, len: usize, mode: FragMode) -> Result<Packet> {
        let total = self.len();
        let avail = total.saturating_sub(offset);
        if avail < len && mode == FragMode::Error {
            return Err(TadError::LessData(format!(
                "fragment {offset}+{len} beyond packet of {total} bytes"
            )));
        }

        let mut frag = Packet::new();
        let mut skip = offset;
        let mut want = len.min(avail);
        for seg in &self.segs {
            if want == 0 {
                break;
            }
            if skip >= seg.len() {
                skip -= seg.len();
                continue;
            }
            let take = (seg.len() - skip).min(want);
            frag.append_seg(seg.slice(skip..skip + take));
            want -= take;
            skip = 0;
        }

        let missing = len - len.min(avail);
        if missing > 0 {
            match mode {
                FragMode::Zero => frag.append_seg(Segment::zeroed(missing)),
                FragMode::Rand => {
                    let mut fill = vec![0u8; missing];
                    rand::thread_rng().fill_bytes(&mut fill);
                    frag.append_seg(Segment::new(fill));
                }
                FragMode::Error | FragMode::Trunc => {}
            }
        }
        Ok(frag)
    }

    /// 从 `offset` 拷贝 `buf.len()` 个字节
    pub fn read(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        if offset + buf.len() > self.len() {
            return Err(TadError::LessData(format!(
                "read {}+{} beyond packet of {} bytes",
                offset,
                buf.len(),
                self.len()
            )));
        }
        let mut skip = offset;
        let mut done = 0;
        for seg in &self.segs {
            if done == buf.len() {
                break;
            }
            if skip >= seg.len() {
                skip -= seg.len();
                continue;
            }
            let take = (seg.len() - skip).min(buf.len() - done);
            buf[done..done + take].copy_from_slice(&seg.as_slice()[skip..skip + take]);
            done += take;
            skip = 0;
        }
        Ok(())
    }

    /// 读出 `bitlen`（≤ 64）位无符号整数
    pub fn read_bits(&self, bitoff: usize, bitlen: usize) -> Result<u64> {
        if bitlen == 0 {
            return Ok(0);
        }
        let first = bitoff / 8;
        let last = (bitoff + bitlen).div_ceil(8);
        let mut tmp = vec![0u8; last - first];
        self.read(first, &mut tmp)?;
        bits::read_bits(&tmp, bitoff - first * 8, bitlen)
    }

    /// 读出 `bitlen` 位到 `out`（MSB 在前，左对齐）
    pub fn read_bits_to(&self, bitoff: usize, bitlen: usize, out: &mut [u8]) -> Result<()> {
        if bitlen > out.len() * 8 {
            return Err(TadError::invalid(format!(
                "{bitlen} bits do not fit into {} bytes",
                out.len()
            )));
        }
        if bitoff % 8 == 0 && bitlen % 8 == 0 {
            return self.read(bitoff / 8, &mut out[..bitlen / 8]);
        }
        let mut done = 0;
        while done < bitlen {
            let n = (bitlen - done).min(8);
            let v = self.read_bits(bitoff + done, n)? as u8;
            out[done / 8] = v << (8 - n);
            done += n;
        }
        Ok(())
    }

    /// 与字节串比较，`exact_len` 时长度也必须相同
    pub fn match_bytes(&self, data: &[u8], exact_len: bool) -> Result<()> {
        if self.len() < data.len() || (exact_len && self.len() != data.len()) {
            return Err(TadError::NotMatch);
        }
        let mut head = vec![0u8; data.len()];
        self.read(0, &mut head)?;
        if head == data {
            Ok(())
        } else {
            Err(TadError::NotMatch)
        }
    }

    /// 带掩码比较：`pkt & mask == value & mask`
    pub fn match_mask(&self, mask: &[u8], value: &[u8], exact_len: bool) -> Result<()> {
        if mask.len() != value.len() {
            return Err(TadError::wrong_nds("mask and value differ in length"));
        }
        if self.len() < mask.len() || (exact_len && self.len() != mask.len()) {
            return Err(TadError::NotMatch);
        }
        let mut head = vec![0u8; mask.len()];
        self.read(0, &mut head)?;
        let ok = head
            .iter()
            .zip(mask)
            .zip(value)
            .all(|((b, m), v)| b & m == v & m);
        if ok { Ok(()) } else { Err(TadError::NotMatch) }
    }
}
