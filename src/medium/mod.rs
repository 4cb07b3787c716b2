//! 介质：CSAP 读写层背后的报文收发端
//!
//! 读写层在 CSAP 创建时通过 `rw_init` 产生一个 [`Medium`]，收发线程经由它
//! 写出生成的报文、读入待匹配的报文。

mod loopback;
#[cfg(unix)]
mod socket;

use std::time::Duration;

pub use loopback::{LoopbackHandle, LoopbackMedium, Responder};
#[cfg(unix)]
pub use socket::{FdMedium, read_with_timeout};

use crate::error::Result;
use crate::pkt::Packet;

pub trait Medium: Send {
    /// 用于日志的名字
    fn name(&self) -> &str;

    fn prepare_send(&mut self) -> Result<()> {
        Ok(())
    }

    fn shutdown_send(&mut self) -> Result<()> {
        Ok(())
    }

    fn prepare_recv(&mut self) -> Result<()> {
        Ok(())
    }

    fn shutdown_recv(&mut self) -> Result<()> {
        Ok(())
    }

    /// 写出一个完整报文
    fn write(&mut self, pkt: &Packet) -> Result<()>;

    /// 读一个报文；`timeout` 内没有数据时返回 timed-out
    fn read(&mut self, timeout: Duration) -> Result<Packet>;

    /// 写出后等待一个应答
    fn write_read(&mut self, pkt: &Packet, timeout: Duration) -> Result<Packet> {
        self.write(pkt)?;
        self.read(timeout)
    }
}
