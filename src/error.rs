//! 错误类型
//!
//! TAD 的所有操作都返回 [`Result`]。错误既可以按种类（[`ErrorKind`]）判断，
//! 也可以与模块标签组合成 32 位错误码交给控制通道。

use std::fmt;

use thiserror::Error;

/// TAD 操作结果
pub type Result<T> = std::result::Result<T, TadError>;

/// 错误种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorKind {
    NoMemory = 1,
    InvalidArgument = 2,
    WrongNds = 3,
    NotSupported = 4,
    NoSuchProtocol = 5,
    NoSuchCsap = 6,
    NotFound = 7,
    NotMatch = 8,
    LessData = 9,
    TimedOut = 10,
    Io = 11,
    AlreadyExists = 12,
    Busy = 13,
    Interrupted = 14,
    ExprParse = 15,
    MissingNds = 16,
}

impl ErrorKind {
    const ALL: [ErrorKind; 16] = [
        ErrorKind::NoMemory,
        ErrorKind::InvalidArgument,
        ErrorKind::WrongNds,
        ErrorKind::NotSupported,
        ErrorKind::NoSuchProtocol,
        ErrorKind::NoSuchCsap,
        ErrorKind::NotFound,
        ErrorKind::NotMatch,
        ErrorKind::LessData,
        ErrorKind::TimedOut,
        ErrorKind::Io,
        ErrorKind::AlreadyExists,
        ErrorKind::Busy,
        ErrorKind::Interrupted,
        ErrorKind::ExprParse,
        ErrorKind::MissingNds,
    ];

    /// 种类的数值（错误码低 16 位）
    pub fn code(self) -> u16 {
        self as u16
    }

    /// 匹配流程中的“预期”错误：不中断收发活动
    pub fn is_recoverable(self) -> bool {
        matches!(self, ErrorKind::NotMatch | ErrorKind::LessData)
    }

    /// 从 32 位错误码中拆出模块与种类
    pub fn from_code(code: u32) -> Option<(ModuleTag, ErrorKind)> {
        let module = ModuleTag::from_u16((code >> 16) as u16)?;
        let kind_code = (code & 0xffff) as u16;
        let kind = Self::ALL.into_iter().find(|k| k.code() == kind_code)?;
        Some((module, kind))
    }

    /// 在 I/O 边界映射到 OS errno
    pub fn to_errno(self) -> i32 {
        match self {
            ErrorKind::NoMemory => libc::ENOMEM,
            ErrorKind::InvalidArgument
            | ErrorKind::WrongNds
            | ErrorKind::ExprParse
            | ErrorKind::MissingNds => libc::EINVAL,
            ErrorKind::NotSupported => libc::EOPNOTSUPP,
            ErrorKind::NoSuchProtocol => libc::EPROTONOSUPPORT,
            ErrorKind::NoSuchCsap | ErrorKind::NotFound => libc::ENOENT,
            ErrorKind::NotMatch => libc::ENOMSG,
            ErrorKind::LessData => libc::ENODATA,
            ErrorKind::TimedOut => libc::ETIMEDOUT,
            ErrorKind::Io => libc::EIO,
            ErrorKind::AlreadyExists => libc::EEXIST,
            ErrorKind::Busy => libc::EBUSY,
            ErrorKind::Interrupted => libc::EINTR,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NoMemory => "no-memory",
            ErrorKind::InvalidArgument => "invalid-argument",
            ErrorKind::WrongNds => "wrong-NDS",
            ErrorKind::NotSupported => "not-supported",
            ErrorKind::NoSuchProtocol => "no-such-protocol",
            ErrorKind::NoSuchCsap => "no-such-csap",
            ErrorKind::NotFound => "not-found",
            ErrorKind::NotMatch => "not-match",
            ErrorKind::LessData => "less-data",
            ErrorKind::TimedOut => "timed-out",
            ErrorKind::Io => "I/O",
            ErrorKind::AlreadyExists => "already-exists",
            ErrorKind::Busy => "busy",
            ErrorKind::Interrupted => "interrupted",
            ErrorKind::ExprParse => "expr-parse",
            ErrorKind::MissingNds => "missing-NDS",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 错误码中的模块标签（高 16 位）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ModuleTag {
    TadCsap = 0x21,
    TadCh = 0x22,
    TadBps = 0x23,
    TadPkt = 0x24,
    TadUtils = 0x25,
    TadArp = 0x26,
    TadEth = 0x27,
    Asn = 0x30,
}

impl ModuleTag {
    fn from_u16(v: u16) -> Option<Self> {
        Some(match v {
            0x21 => ModuleTag::TadCsap,
            0x22 => ModuleTag::TadCh,
            0x23 => ModuleTag::TadBps,
            0x24 => ModuleTag::TadPkt,
            0x25 => ModuleTag::TadUtils,
            0x26 => ModuleTag::TadArp,
            0x27 => ModuleTag::TadEth,
            0x30 => ModuleTag::Asn,
            _ => return None,
        })
    }
}

/// TAD 错误
#[derive(Error, Debug)]
pub enum TadError {
    #[error("out of memory")]
    NoMemory,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// NDS 内容与 CSAP 或字段定义不符
    #[error("wrong NDS: {0}")]
    WrongNds(String),

    /// 发送需要但 NDS 与默认值都未给出的字段
    #[error("no value and no default for field '{0}'")]
    MissingNds(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    /// 创建 CSAP 时找不到协议支持
    #[error("protocol '{0}' is not supported")]
    UnsupportedProtocol(String),

    #[error("no such protocol '{0}'")]
    NoSuchProtocol(String),

    #[error("protocol '{0}' is already registered")]
    DuplicateProtocol(String),

    #[error("CSAP {0} does not exist")]
    NoSuchCsap(u32),

    #[error("{0} not found")]
    NotFound(String),

    /// 收到的数据与模式不匹配（匹配流程的正常结果）
    #[error("packet does not match the pattern")]
    NotMatch,

    #[error("less data than expected: {0}")]
    LessData(String),

    #[error("operation timed out")]
    TimedOut,

    #[error("operation interrupted")]
    Interrupted,

    #[error("CSAP {0} is busy")]
    Busy(u32),

    /// 表达式解析失败，`pos` 为失败处已消耗的字符数
    #[error("expression parse error at offset {pos}")]
    ExprParse { pos: usize },

    #[error("ASN text parse error at offset {pos}: {msg}")]
    AsnParse { pos: usize, msg: String },

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TadError::NoMemory => ErrorKind::NoMemory,
            TadError::InvalidArgument(_) | TadError::Config(_) => ErrorKind::InvalidArgument,
            TadError::WrongNds(_) | TadError::AsnParse { .. } => ErrorKind::WrongNds,
            TadError::MissingNds(_) => ErrorKind::MissingNds,
            TadError::NotSupported(_) | TadError::UnsupportedProtocol(_) => ErrorKind::NotSupported,
            TadError::NoSuchProtocol(_) => ErrorKind::NoSuchProtocol,
            TadError::DuplicateProtocol(_) => ErrorKind::AlreadyExists,
            TadError::NoSuchCsap(_) => ErrorKind::NoSuchCsap,
            TadError::NotFound(_) => ErrorKind::NotFound,
            TadError::NotMatch => ErrorKind::NotMatch,
            TadError::LessData(_) => ErrorKind::LessData,
            TadError::TimedOut => ErrorKind::TimedOut,
            TadError::Interrupted => ErrorKind::Interrupted,
            TadError::Busy(_) => ErrorKind::Busy,
            TadError::ExprParse { .. } => ErrorKind::ExprParse,
            TadError::Io(_) => ErrorKind::Io,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.kind().is_recoverable()
    }

    /// 组合 32 位错误码：`module << 16 | kind`
    pub fn code(&self, module: ModuleTag) -> u32 {
        ((module as u32) << 16) | u32::from(self.kind().code())
    }

    /// 从 OS errno 构造错误（I/O 边界使用）
    pub fn from_errno(errno: i32) -> Self {
        match errno {
            libc::ETIMEDOUT => TadError::TimedOut,
            libc::EINTR => TadError::Interrupted,
            libc::ENOMEM => TadError::NoMemory,
            _ => TadError::Io(std::io::Error::from_raw_os_error(errno)),
        }
    }

    /// 最近一次系统调用的 errno
    pub fn last_os_error() -> Self {
        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(errno) => Self::from_errno(errno),
            None => TadError::Io(err),
        }
    }

    pub fn to_errno(&self) -> i32 {
        match self {
            TadError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            other => other.kind().to_errno(),
        }
    }

    pub(crate) fn wrong_nds(msg: impl Into<String>) -> Self {
        TadError::WrongNds(msg.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        TadError::InvalidArgument(msg.into())
    }

    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        TadError::NotSupported(msg.into())
    }
}
