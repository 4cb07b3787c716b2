//! 位级读写
//!
//! 位序为 MSB 在前（网络位序），偏移从 0 开始。

use crate::error::{Result, TadError};

/// 把 `value` 的低 `bitlen` 位写到 `buf` 的 `bitoff` 处
pub fn write_bits(buf: &mut [u8], bitoff: usize, value: u64, bitlen: usize) -> Result<()> {
    if bitlen > 64 {
        return Err(TadError::invalid(format!("bit length {bitlen} exceeds 64")));
    }
    if bitoff + bitlen > buf.len() * 8 {
        return Err(TadError::invalid(format!(
            "bit field {bitoff}+{bitlen} exceeds buffer of {} bytes",
            buf.len()
        )));
    }
    if bitoff % 8 == 0 && bitlen % 8 == 0 {
        let n = bitlen / 8;
        let be = value.to_be_bytes();
        buf[bitoff / 8..bitoff / 8 + n].copy_from_slice(&be[8 - n..]);
        return Ok(());
    }
    for i in 0..bitlen {
        let bit = (value >> (bitlen - 1 - i)) & 1;
        let pos = bitoff + i;
        let mask = 0x80u8 >> (pos % 8);
        if bit == 1 {
            buf[pos / 8] |= mask;
        } else {
            buf[pos / 8] &= !mask;
        }
    }
    Ok(())
}

/// 把字节串按位写入（起点可以不对齐）
pub fn write_bytes_at(buf: &mut [u8], bitoff: usize, src: &[u8]) -> Result<()> {
    if bitoff % 8 == 0 {
        let start = bitoff / 8;
        let end = start + src.len();
        if end > buf.len() {
            return Err(TadError::invalid(format!(
                "{} bytes at bit {bitoff} exceed buffer of {} bytes",
                src.len(),
                buf.len()
            )));
        }
        buf[start..end].copy_from_slice(src);
        return Ok(());
    }
    for (i, b) in src.iter().enumerate() {
        write_bits(buf, bitoff + i * 8, u64::from(*b), 8)?;
    }
    Ok(())
}

/// 从连续字节中读出 `bitlen`（≤ 64）位
pub fn read_bits(data: &[u8], bitoff: usize, bitlen: usize) -> Result<u64> {
    if bitlen > 64 {
        return Err(TadError::invalid(format!("bit length {bitlen} exceeds 64")));
    }
    if bitoff + bitlen > data.len() * 8 {
        return Err(TadError::LessData(format!(
            "bit field {bitoff}+{bitlen} beyond {} bytes",
            data.len()
        )));
    }
    let mut value = 0u64;
    for i in 0..bitlen {
        let pos = bitoff + i;
        let bit = (data[pos / 8] >> (7 - pos % 8)) & 1;
        value = (value << 1) | u64::from(bit);
    }
    Ok(value)
}
