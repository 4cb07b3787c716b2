//! 基于文件描述符的介质

use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::time::Duration;

use tracing::{debug, trace};

use super::Medium;
use crate::error::{Result, TadError};
use crate::pkt::Packet;

/// 等待 `fd` 可读并读出一个报文
///
/// 超时精度为毫秒（不足 1 毫秒的部分舍去）。poll 返回 0 时报告 timed-out；
/// 随后按内核报告的队列长度一次 `recvmsg` 读完。
pub fn read_with_timeout(fd: RawFd, timeout: Duration) -> Result<Vec<u8>> {
    let ms = (timeout.as_micros() / 1000).min(libc::c_int::MAX as u128) as libc::c_int;
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    // SAFETY: pfd 是一个有效的 pollfd，数量为 1
    let rc = unsafe { libc::poll(&mut pfd, 1, ms) };
    if rc < 0 {
        return Err(TadError::last_os_error());
    }
    if rc == 0 {
        return Err(TadError::TimedOut);
    }

    let mut pending: libc::c_int = 0;
    // SAFETY: FIONREAD 写入一个 c_int
    if unsafe { libc::ioctl(fd, libc::FIONREAD, &mut pending as *mut libc::c_int) } < 0 {
        return Err(TadError::last_os_error());
    }
    let mut buf = vec![0u8; pending.max(0) as usize];

    let mut iov = libc::iovec {
        iov_base: buf.as_mut_ptr().cast(),
        iov_len: buf.len(),
    };
    // SAFETY: msghdr 全零是合法的初值
    let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    // SAFETY: iov 指向 buf，两者在调用期间有效
    let n = unsafe { libc::recvmsg(fd, &mut msg, 0) };
    if n < 0 {
        return Err(TadError::last_os_error());
    }
    buf.truncate(n as usize);
    trace!(fd, len = buf.len(), "读到报文");
    Ok(buf)
}

/// 对一个已打开的描述符（原始套接字、数据报套接字对等）收发整报文
pub struct FdMedium {
    fd: OwnedFd,
    name: String,
}

impl FdMedium {
    pub fn new(fd: impl Into<OwnedFd>, name: impl Into<String>) -> Self {
        Self {
            fd: fd.into(),
            name: name.into(),
        }
    }
}

impl Medium for FdMedium {
    fn name(&self) -> &str {
        &self.name
    }

    /// 各段分散写出，一次 `writev`
    fn write(&mut self, pkt: &Packet) -> Result<()> {
        let iov: Vec<libc::iovec> = pkt
            .segs()
            .filter(|s| !s.is_empty())
            .map(|s| libc::iovec {
                iov_base: s.as_slice().as_ptr() as *mut libc::c_void,
                iov_len: s.len(),
            })
            .collect();
        // SAFETY: iov 中的指针来自 pkt 的段，调用期间不会释放
        let n = unsafe { libc::writev(self.fd.as_raw_fd(), iov.as_ptr(), iov.len() as libc::c_int) };
        if n < 0 {
            return Err(TadError::last_os_error());
        }
        if n as usize != pkt.len() {
            debug!(medium = %self.name, written = n, len = pkt.len(), "报文只写出一部分");
            return Err(TadError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "short write",
            )));
        }
        Ok(())
    }

    fn read(&mut self, timeout: Duration) -> Result<Packet> {
        read_with_timeout(self.fd.as_raw_fd(), timeout).map(Packet::from_bytes)
    }
}
