//! 数据单元本体及其与 ASN 值、二进制之间的转换

use tracing::{error, warn};

use super::args::TmplArg;
use super::expr::Expr;
use crate::asn::AsnValue;
use crate::error::{Result, TadError};
use crate::pkt::Packet;

const EXPR_SCRIPT_PREFIX: &str = "expr:";

/// 数据单元类型，用于字段描述中的“平凡”类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DuKind {
    Undef,
    I32,
    I64,
    Octs,
    Str,
    Expr,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DataUnit {
    /// 未指定，使用默认值
    #[default]
    Undef,
    I32(i32),
    I64(i64),
    Octs(Vec<u8>),
    Str(String),
    Expr(Expr),
}

impl DataUnit {
    pub fn kind(&self) -> DuKind {
        match self {
            DataUnit::Undef => DuKind::Undef,
            DataUnit::I32(_) => DuKind::I32,
            DataUnit::I64(_) => DuKind::I64,
            DataUnit::Octs(_) => DuKind::Octs,
            DataUnit::Str(_) => DuKind::Str,
            DataUnit::Expr(_) => DuKind::Expr,
        }
    }

    pub fn is_undef(&self) -> bool {
        matches!(self, DataUnit::Undef)
    }

    /// 释放持有的数据并回到 `Undef`
    pub fn clear(&mut self) {
        *self = DataUnit::Undef;
    }

    /// 取 PDU 中名为 `label` 的字段转换；字段不存在时为 `Undef`
    pub fn convert(pdu: &AsnValue, label: &str) -> Result<DataUnit> {
        match pdu.field(label) {
            Some(field) => Self::from_asn(field).inspect_err(|e| {
                error!(label, error = %e, "字段转换为数据单元失败");
            }),
            None => Ok(DataUnit::Undef),
        }
    }

    /// 把 DATA-UNIT 形式的 CHOICE（`plain:...` / `script:"expr:..."`）转换为数据单元
    pub fn from_asn(du_field: &AsnValue) -> Result<DataUnit> {
        let (choice, value) = du_field
            .as_choice()
            .ok_or_else(|| TadError::wrong_nds("data unit must be a choice"))?;
        match choice {
            "plain" => Self::from_plain(value),
            "script" => {
                let script = value
                    .as_str()
                    .ok_or_else(|| TadError::wrong_nds("script must be a character string"))?;
                let Some(text) = script.strip_prefix(EXPR_SCRIPT_PREFIX) else {
                    return Err(TadError::unsupported(format!("script flavour '{script}'")));
                };
                let (expr, used) = Expr::parse(text)?;
                if !text[used..].trim().is_empty() {
                    return Err(TadError::ExprParse { pos: used });
                }
                Ok(DataUnit::Expr(expr))
            }
            other => {
                warn!(choice = other, "不支持的数据单元形式，按未指定处理");
                Ok(DataUnit::Undef)
            }
        }
    }

    fn from_plain(value: &AsnValue) -> Result<DataUnit> {
        match value {
            AsnValue::Bool(_) | AsnValue::Integer(_) | AsnValue::Enumerated(_) => {
                let v = value.as_int().unwrap_or_default();
                i32::try_from(v)
                    .map(DataUnit::I32)
                    .map_err(|_| TadError::wrong_nds(format!("plain integer {v} exceeds int32")))
            }
            AsnValue::BitString(b) | AsnValue::OctetString(b) => {
                if b.is_empty() {
                    return Err(TadError::invalid("empty octet string"));
                }
                Ok(DataUnit::Octs(b.clone()))
            }
            AsnValue::CharString(s) => {
                if s.is_empty() {
                    return Err(TadError::invalid("empty character string"));
                }
                Ok(DataUnit::Str(s.clone()))
            }
            AsnValue::LongInt(_) | AsnValue::Real(_) | AsnValue::Oid(_) => Err(TadError::unsupported(
                format!("plain syntax {:?}", value.syntax()),
            )),
            other => Err(TadError::invalid(format!(
                "plain value of syntax {:?}",
                other.syntax()
            ))),
        }
    }

    /// 接收到的字节直接作为字节串
    pub fn from_bin(data: &[u8]) -> DataUnit {
        DataUnit::Octs(data.to_vec())
    }

    /// 整数类取值（表达式按 `args` 求值）
    pub fn eval_int(&self, args: &[TmplArg]) -> Result<i64> {
        match self {
            DataUnit::I32(v) => Ok(i64::from(*v)),
            DataUnit::I64(v) => Ok(*v),
            DataUnit::Expr(e) => e.eval(args),
            other => Err(TadError::wrong_nds(format!("{:?} is not an integer", other.kind()))),
        }
    }

    /// 以网络序写入 `out`，整数取低 `out.len()` 字节
    pub fn to_bin(&self, args: &[TmplArg], out: &mut [u8]) -> Result<()> {
        if out.is_empty() {
            return Err(TadError::invalid("zero-length field"));
        }
        match self {
            DataUnit::I32(_) | DataUnit::I64(_) | DataUnit::Expr(_) => {
                if out.len() > 8 {
                    return Err(TadError::invalid(format!(
                        "integer does not fill a {}-byte field",
                        out.len()
                    )));
                }
                let be = self.eval_int(args)?.to_be_bytes();
                out.copy_from_slice(&be[8 - out.len()..]);
                Ok(())
            }
            DataUnit::Octs(_) | DataUnit::Str(_) => {
                let data = self.as_bytes().unwrap_or_default();
                if data.len() < out.len() {
                    return Err(TadError::LessData(format!(
                        "{} bytes for a {}-byte field",
                        data.len(),
                        out.len()
                    )));
                }
                if data.len() > out.len() {
                    return Err(TadError::wrong_nds(format!(
                        "{} bytes for a {}-byte field",
                        data.len(),
                        out.len()
                    )));
                }
                out.copy_from_slice(data);
                Ok(())
            }
            DataUnit::Undef => Err(TadError::LessData("no value to send".into())),
        }
    }

    /// 字节串类取值
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            DataUnit::Octs(b) => Some(b),
            DataUnit::Str(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// 从报文 `bitoff` 处读取 `bitlen` 位，按本单元已有的类型填入
    ///
    /// `I32` 要求不超过 32 位；`Octs` 的长度会调整为容纳 `bitlen` 位。
    pub fn read_bin(&mut self, pkt: &Packet, bitoff: usize, bitlen: usize) -> Result<()> {
        match self {
            DataUnit::I32(v) => {
                if bitlen > 32 {
                    return Err(TadError::invalid(format!("{bitlen} bits into int32")));
                }
                *v = pkt.read_bits(bitoff, bitlen)? as u32 as i32;
                Ok(())
            }
            DataUnit::I64(v) => {
                *v = pkt.read_bits(bitoff, bitlen)? as i64;
                Ok(())
            }
            DataUnit::Octs(buf) => {
                buf.resize(bitlen.div_ceil(8), 0);
                pkt.read_bits_to(bitoff, bitlen, buf)
            }
            other => Err(TadError::unsupported(format!(
                "reading binary into {:?} data unit",
                other.kind()
            ))),
        }
    }

    /// 以 `self` 为模式匹配收到的值，不匹配返回 [`TadError::NotMatch`]
    pub fn match_value(&self, got: &DataUnit) -> Result<()> {
        let same = match (self, got) {
            (DataUnit::Undef, _) => true,
            (DataUnit::I32(_) | DataUnit::I64(_) | DataUnit::Expr(_), DataUnit::I32(_) | DataUnit::I64(_)) => {
                self.eval_int(&[])? == got.eval_int(&[])?
            }
            (DataUnit::Octs(_) | DataUnit::Str(_), DataUnit::Octs(_) | DataUnit::Str(_)) => {
                self.as_bytes() == got.as_bytes()
            }
            (p, g) => {
                return Err(TadError::unsupported(format!(
                    "matching {:?} pattern against {:?} value",
                    p.kind(),
                    g.kind()
                )));
            }
        };
        if same { Ok(()) } else { Err(TadError::NotMatch) }
    }

    /// 转换为结果中的 `plain:` / `script:` 值
    pub fn to_asn(&self) -> Result<AsnValue> {
        let plain = match self {
            DataUnit::I32(v) => AsnValue::Integer(i64::from(*v)),
            DataUnit::I64(v) => AsnValue::Integer(*v),
            DataUnit::Octs(b) => AsnValue::OctetString(b.clone()),
            DataUnit::Str(s) => AsnValue::CharString(s.clone()),
            DataUnit::Expr(e) => {
                return Ok(AsnValue::new_choice(
                    "script",
                    AsnValue::CharString(format!("{EXPR_SCRIPT_PREFIX}{e}")),
                ));
            }
            DataUnit::Undef => return Err(TadError::wrong_nds("undefined data unit has no value")),
        };
        Ok(AsnValue::new_choice("plain", plain))
    }
}

/// 平凡类型的空单元，作为接收时的读出容器
impl From<DuKind> for DataUnit {
    fn from(kind: DuKind) -> Self {
        match kind {
            DuKind::I32 => DataUnit::I32(0),
            DuKind::I64 => DataUnit::I64(0),
            DuKind::Octs => DataUnit::Octs(Vec::new()),
            DuKind::Str => DataUnit::Str(String::new()),
            DuKind::Undef | DuKind::Expr => DataUnit::Undef,
        }
    }
}
