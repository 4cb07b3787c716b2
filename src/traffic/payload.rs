//! 载荷规格
//!
//! 模板中的载荷在最外层之上作为初始 SDU；模式中的 BYTES/MASK 载荷与匹配
//! 完所有层后剩下的 SDU 比较。FUNCTION/STREAM 按名字在符号表中查找。

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use rand::RngCore;
use tracing::{debug, warn};

use crate::asn::AsnValue;
use crate::csap::CsapId;
use crate::du::{DataUnit, TmplArg};
use crate::error::{Result, TadError};
use crate::pkt::{ChunkBuf, Packet};

/// 生成整段载荷
pub type PayloadFn = Arc<dyn Fn(CsapId, &[TmplArg]) -> Result<Vec<u8>> + Send + Sync>;

/// 按流偏移填充一块载荷
pub type StreamFn = Arc<dyn Fn(u64, &mut [u8]) -> Result<()> + Send + Sync>;

/// 用户函数符号表
#[derive(Default)]
pub struct SymbolTable {
    payload_fns: RwLock<HashMap<String, PayloadFn>>,
    stream_fns: RwLock<HashMap<String, StreamFn>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_payload_fn(&self, name: impl Into<String>, f: PayloadFn) {
        self.payload_fns.write().insert(name.into(), f);
    }

    pub fn register_stream_fn(&self, name: impl Into<String>, f: StreamFn) {
        self.stream_fns.write().insert(name.into(), f);
    }

    pub fn payload_fn(&self, name: &str) -> Option<PayloadFn> {
        self.payload_fns.read().get(name).cloned()
    }

    pub fn stream_fn(&self, name: &str) -> Option<StreamFn> {
        self.stream_fns.read().get(name).cloned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadSpec {
    Bytes(Vec<u8>),
    /// 给定长度的随机字节
    Length(usize),
    Mask {
        value: Vec<u8>,
        mask: Vec<u8>,
        exact_len: bool,
    },
    Function(String),
    Stream {
        function: String,
        offset: DataUnit,
        length: DataUnit,
    },
}

impl PayloadSpec {
    /// 从 NDS 中的 `payload` CHOICE 解析
    pub fn from_asn(v: &AsnValue) -> Result<Self> {
        let (label, body) = v
            .as_choice()
            .ok_or_else(|| TadError::wrong_nds("payload must be a choice"))?;
        let octets = |v: Option<&AsnValue>, what: &str| -> Result<Vec<u8>> {
            v.and_then(AsnValue::as_octets)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| TadError::wrong_nds(format!("payload {label} needs octets '{what}'")))
        };
        match label {
            "bytes" => Ok(PayloadSpec::Bytes(octets(Some(body), "bytes")?)),
            "length" => body
                .as_int()
                .and_then(|n| usize::try_from(n).ok())
                .map(PayloadSpec::Length)
                .ok_or_else(|| TadError::wrong_nds("payload length must be a non-negative integer")),
            "mask" => {
                let value = octets(body.field("v"), "v")?;
                let mask = octets(body.field("m"), "m")?;
                if value.len() != mask.len() {
                    return Err(TadError::wrong_nds(format!(
                        "payload mask of {} bytes for value of {}",
                        mask.len(),
                        value.len()
                    )));
                }
                let exact_len = body.field("exact-len").and_then(AsnValue::as_bool).unwrap_or(false);
                Ok(PayloadSpec::Mask { value, mask, exact_len })
            }
            "function" => body
                .as_str()
                .map(|s| PayloadSpec::Function(s.to_string()))
                .ok_or_else(|| TadError::wrong_nds("payload function must be a name")),
            "stream" => {
                let function = body
                    .field("function")
                    .and_then(AsnValue::as_str)
                    .ok_or_else(|| TadError::wrong_nds("payload stream needs 'function'"))?
                    .to_string();
                Ok(PayloadSpec::Stream {
                    function,
                    offset: DataUnit::convert(body, "offset")?,
                    length: DataUnit::convert(body, "length")?,
                })
            }
            other => Err(TadError::unsupported(format!("payload '{other}'"))),
        }
    }

    /// 只有 BYTES 与 MASK 可以用于匹配
    pub fn check_pattern(&self) -> Result<()> {
        match self {
            PayloadSpec::Bytes(_) | PayloadSpec::Mask { .. } => Ok(()),
            other => Err(TadError::unsupported(format!("matching payload {other:?}"))),
        }
    }

    /// 发送侧生成载荷报文
    pub fn generate(&self, csap: CsapId, symbols: &SymbolTable, args: &[TmplArg]) -> Result<Packet> {
        match self {
            PayloadSpec::Bytes(b) => Ok(Packet::from_bytes(b.clone())),
            PayloadSpec::Length(n) => {
                let mut rng = rand::thread_rng();
                let mut buf = ChunkBuf::default();
                buf.append_with(*n, |chunk| rng.fill_bytes(chunk));
                Ok(buf.into_packet())
            }
            PayloadSpec::Mask { .. } => Err(TadError::wrong_nds("payload cannot be specified using mask")),
            PayloadSpec::Function(name) => {
                let f = symbols.payload_fn(name).ok_or_else(|| {
                    warn!(csap = %csap, function = %name, "载荷函数未注册");
                    TadError::wrong_nds(format!("payload function '{name}' is not registered"))
                })?;
                Ok(Packet::from_bytes(f(csap, args)?))
            }
            PayloadSpec::Stream { function, offset, length } => {
                let f = symbols
                    .stream_fn(function)
                    .ok_or_else(|| TadError::wrong_nds(format!("stream function '{function}' is not registered")))?;
                let offset = u64::try_from(offset.eval_int(args)?)
                    .map_err(|_| TadError::wrong_nds("negative stream offset"))?;
                let length = usize::try_from(length.eval_int(args)?)
                    .map_err(|_| TadError::wrong_nds("negative stream length"))?;

                let mut buf = ChunkBuf::default();
                let mut pos = offset;
                let mut failed = None;
                buf.append_with(length, |chunk| {
                    if failed.is_none() {
                        if let Err(e) = f(pos, chunk) {
                            failed = Some(e);
                        }
                    }
                    pos += chunk.len() as u64;
                });
                if let Some(e) = failed {
                    return Err(e);
                }
                debug!(csap = %csap, offset, length, segs = buf.chunk_count(), "流载荷已生成");
                Ok(buf.into_packet())
            }
        }
    }

    /// 接收侧匹配载荷；BYTES 允许尾部有多余字节（如以太网补零）
    pub fn match_payload(&self, payload: &Packet) -> Result<()> {
        match self {
            PayloadSpec::Bytes(b) => payload.match_bytes(b, false),
            PayloadSpec::Mask { value, mask, exact_len } => payload.match_mask(mask, value, *exact_len),
            other => Err(TadError::unsupported(format!("matching payload {other:?}"))),
        }
    }
}
