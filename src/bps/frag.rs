//! 字段集的生成与匹配

use tracing::{trace, warn};

use super::field::{BpsDefault, BpsField};
use crate::asn::AsnValue;
use crate::du::{DataUnit, TmplArg};
use crate::error::{Result, TadError};
use crate::pkt::{Packet, write_bits, write_bytes_at};

/// 字段集的一组具体取值，下标与字段定义一一对应
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BpsFragData {
    dus: Vec<DataUnit>,
}

impl BpsFragData {
    pub fn len(&self) -> usize {
        self.dus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dus.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&DataUnit> {
        self.dus.get(i)
    }

    pub fn get_mut(&mut self, i: usize) -> Option<&mut DataUnit> {
        self.dus.get_mut(i)
    }

    pub fn set(&mut self, i: usize, du: DataUnit) {
        if let Some(slot) = self.dus.get_mut(i) {
            *slot = du;
        }
    }

    pub fn dus(&self) -> &[DataUnit] {
        &self.dus
    }
}

/// 字段集定义：字段描述加上按 CSAP 层 NDS 解析出的收发默认值
#[derive(Debug, Clone)]
pub struct BpsFragDef {
    name: &'static str,
    fields: &'static [BpsField],
    tx_def: Vec<DataUnit>,
    rx_def: Vec<DataUnit>,
}

/// CSAP 层 NDS 中的默认值字段：可以是 `plain:` 形式，也可以直接给值
fn nds_default(layer_nds: Option<&AsnValue>, label: &str) -> Result<DataUnit> {
    match layer_nds.and_then(|n| n.field(label)) {
        None => Ok(DataUnit::Undef),
        Some(v @ AsnValue::Choice(..)) => DataUnit::from_asn(v),
        Some(v) => DataUnit::from_asn(&AsnValue::new_choice("plain", v.clone())),
    }
}

fn resolve_default(def: BpsDefault, layer_nds: Option<&AsnValue>) -> Result<DataUnit> {
    match def {
        BpsDefault::None | BpsDefault::User => Ok(DataUnit::Undef),
        BpsDefault::Const(v) => Ok(DataUnit::I32(v)),
        BpsDefault::Nds(label) => nds_default(layer_nds, label),
    }
}

impl BpsFragDef {
    /// 初始化字段集，默认值从 CSAP 层 NDS 中读取
    pub fn init(
        name: &'static str,
        fields: &'static [BpsField],
        layer_nds: Option<&AsnValue>,
    ) -> Result<Self> {
        let mut tx_def = Vec::with_capacity(fields.len());
        let mut rx_def = Vec::with_capacity(fields.len());
        for f in fields {
            tx_def.push(resolve_default(f.tx_def, layer_nds)?);
            rx_def.push(resolve_default(f.rx_def, layer_nds)?);
        }
        Ok(Self {
            name,
            fields,
            tx_def,
            rx_def,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> &'static [BpsField] {
        self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 按名字查字段下标
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn tx_default(&self, i: usize) -> Option<&DataUnit> {
        self.tx_def.get(i)
    }

    pub fn rx_default(&self, i: usize) -> Option<&DataUnit> {
        self.rx_def.get(i)
    }

    /// 协议层在初始化时补充的收发默认值
    pub fn set_defaults(&mut self, i: usize, tx: DataUnit, rx: DataUnit) {
        if i < self.fields.len() {
            self.tx_def[i] = tx;
            self.rx_def[i] = rx;
        }
    }

    /// 从层 PDU 中读出各字段的数据单元，PDU 缺省时全部为 `Undef`
    pub fn nds_to_data_units(&self, layer_pdu: Option<&AsnValue>) -> Result<BpsFragData> {
        let mut dus = Vec::with_capacity(self.fields.len());
        for f in self.fields {
            let du = match (f.tag, layer_pdu) {
                (Some(tag), Some(pdu)) => DataUnit::convert(pdu, tag)?,
                _ => DataUnit::Undef,
            };
            dus.push(du);
        }
        Ok(BpsFragData { dus })
    }

    /// 发送前检查：每个字段要么有值，要么有默认值，要么由协议层补齐
    pub fn confirm_send(&self, data: &BpsFragData) -> Result<()> {
        for (i, f) in self.fields.iter().enumerate() {
            let has_value = data.get(i).is_some_and(|d| !d.is_undef());
            if !has_value && self.tx_def[i].is_undef() && f.tx_def != BpsDefault::User {
                warn!(frag = self.name, field = f.name, "字段既无取值也无默认值");
                return Err(TadError::MissingNds(f.name.to_string()));
            }
        }
        Ok(())
    }

    fn tx_value<'a>(&'a self, data: &'a BpsFragData, i: usize) -> &'a DataUnit {
        match data.get(i) {
            Some(du) if !du.is_undef() => du,
            _ => &self.tx_def[i],
        }
    }

    fn field_bitlen(&self, i: usize, du: &DataUnit) -> usize {
        match self.fields[i].bits {
            0 => du.as_bytes().map_or(0, |b| b.len() * 8),
            bits => bits,
        }
    }

    /// 定长部分的位数（变长字段计 0）
    pub fn fixed_bitlen(&self) -> usize {
        self.fields.iter().map(|f| f.bits).sum()
    }

    /// 按给定取值（缺省用发送默认值）计算的总位数
    pub fn data_bitlen(&self, data: Option<&BpsFragData>) -> usize {
        let empty = BpsFragData::default();
        let data = data.unwrap_or(&empty);
        (0..self.fields.len())
            .map(|i| self.field_bitlen(i, self.tx_value(data, i)))
            .sum()
    }

    /// 把字段集写入 `buf` 的 `bitoff` 处并推进 `bitoff`，表达式在此时按 `args` 求值
    pub fn gen_bin(
        &self,
        data: &BpsFragData,
        args: &[TmplArg],
        buf: &mut [u8],
        bitoff: &mut usize,
        max_bitlen: usize,
    ) -> Result<()> {
        for (i, f) in self.fields.iter().enumerate() {
            let du = self.tx_value(data, i);
            let len = self.field_bitlen(i, du);
            self.write_field(f, du, args, buf, *bitoff, len, max_bitlen)
                .inspect_err(|e| {
                    warn!(frag = self.name, field = f.name, bitoff = *bitoff, error = %e, "字段生成失败");
                })?;
            *bitoff += len;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn write_field(
        &self,
        f: &BpsField,
        du: &DataUnit,
        args: &[TmplArg],
        buf: &mut [u8],
        bitoff: usize,
        len: usize,
        max_bitlen: usize,
    ) -> Result<()> {
        if bitoff + len > max_bitlen {
            return Err(TadError::invalid(format!(
                "field '{}' ends at bit {} beyond limit {max_bitlen}",
                f.name,
                bitoff + len
            )));
        }
        match du {
            DataUnit::Undef => Err(TadError::MissingNds(f.name.to_string())),
            DataUnit::I32(_) | DataUnit::I64(_) | DataUnit::Expr(_) => {
                if len > 64 {
                    return Err(TadError::invalid(format!("integer field of {len} bits")));
                }
                let v = du.eval_int(args)? as u64;
                let masked = if len == 64 { v } else { v & ((1u64 << len) - 1) };
                write_bits(buf, bitoff, masked, len)
            }
            DataUnit::Octs(_) | DataUnit::Str(_) => {
                let bytes = du.as_bytes().unwrap_or_default();
                if len % 8 != 0 {
                    return Err(TadError::unsupported(format!(
                        "octet value for {len}-bit field '{}'",
                        f.name
                    )));
                }
                if bytes.len() * 8 < len {
                    return Err(TadError::LessData(format!(
                        "{} bytes for {len}-bit field '{}'",
                        bytes.len(),
                        f.name
                    )));
                }
                if bytes.len() * 8 > len {
                    return Err(TadError::wrong_nds(format!(
                        "{} bytes for {len}-bit field '{}'",
                        bytes.len(),
                        f.name
                    )));
                }
                write_bytes_at(buf, bitoff, bytes)
            }
        }
    }

    /// 为一个收到的报文准备读出容器
    pub fn match_pre(&self) -> BpsFragData {
        let dus = self
            .fields
            .iter()
            .map(|f| match DataUnit::from(f.plain) {
                DataUnit::Octs(_) => DataUnit::Octs(vec![0; f.bits / 8]),
                du => du,
            })
            .collect();
        BpsFragData { dus }
    }

    fn match_pattern<'a>(&'a self, ptrn: Option<&'a BpsFragData>, i: usize) -> Option<&'a DataUnit> {
        ptrn.and_then(|p| p.get(i))
            .filter(|d| !d.is_undef())
            .or_else(|| Some(&self.rx_def[i]).filter(|d| !d.is_undef()))
    }

    /// 读出模式关心的字段并逐一比较，推进 `bitoff`
    ///
    /// 模式与接收默认值都未给出、且非 `force_read` 的字段只跳过不读。
    pub fn match_do(
        &self,
        ptrn: Option<&BpsFragData>,
        pkt_data: &mut BpsFragData,
        pkt: &Packet,
        bitoff: &mut usize,
    ) -> Result<()> {
        let total = pkt.len() * 8;
        for (i, f) in self.fields.iter().enumerate() {
            let pattern = self.match_pattern(ptrn, i);
            let len = match f.bits {
                0 => pkt_data.get(i).and_then(DataUnit::as_bytes).map_or(0, |b| b.len() * 8),
                bits => bits,
            };
            if len > 0 && (pattern.is_some() || f.force_read) {
                if *bitoff + len > total {
                    return Err(TadError::LessData(format!(
                        "field '{}' at bit {} needs {len} bits, packet has {total}",
                        f.name, *bitoff
                    )));
                }
                let got = pkt_data
                    .get_mut(i)
                    .ok_or_else(|| TadError::invalid("packet data shorter than field set"))?;
                got.read_bin(pkt, *bitoff, len)?;
                if let Some(p) = pattern {
                    if let Err(e) = p.match_value(got) {
                        trace!(frag = self.name, field = f.name, bitoff = *bitoff, "字段不匹配");
                        return Err(e);
                    }
                }
            }
            *bitoff += len;
        }
        // 跳过的字段也必须落在报文内
        if *bitoff > total {
            return Err(TadError::LessData(format!(
                "{} ends at bit {}, packet has {total}",
                self.name, *bitoff
            )));
        }
        Ok(())
    }

    /// 读出全部字段并写入结果 NDS（`标签 plain:值`），推进 `bitoff`
    pub fn match_post(
        &self,
        pkt_data: &mut BpsFragData,
        pkt: &Packet,
        bitoff: &mut usize,
        nds: &mut AsnValue,
    ) -> Result<()> {
        for (i, f) in self.fields.iter().enumerate() {
            let Some(du) = pkt_data.get_mut(i) else {
                break;
            };
            let len = match f.bits {
                0 => du.as_bytes().map_or(0, |b| b.len() * 8),
                bits => bits,
            };
            if len == 0 {
                continue;
            }
            du.read_bin(pkt, *bitoff, len)?;
            if let Some(tag) = f.tag {
                nds.set_field(tag, du.to_asn()?)?;
            }
            *bitoff += len;
        }
        Ok(())
    }
}
