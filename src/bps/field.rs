//! 字段描述

use crate::du::DuKind;

/// 字段默认值的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BpsDefault {
    /// 没有默认值
    None,
    Const(i32),
    /// 取 CSAP 该层 NDS 中给定标签的字段
    Nds(&'static str),
    /// 由协议层在生成前自行补齐
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BpsField {
    /// 字段名，也是结果 NDS 中的标签
    pub name: &'static str,
    /// 位宽，0 表示变长（由取值长度决定）
    pub bits: usize,
    /// 模板/模式 PDU 中对应的标签，`None` 表示不可由用户指定
    pub tag: Option<&'static str>,
    pub tx_def: BpsDefault,
    pub rx_def: BpsDefault,
    /// 平凡类型，接收时据此创建读出容器
    pub plain: DuKind,
    /// 即使模式与默认值都未给出也要读出
    pub force_read: bool,
}

impl BpsField {
    /// 可由用户指定的整数字段
    pub const fn simple(name: &'static str, bits: usize) -> Self {
        Self {
            name,
            bits,
            tag: Some(name),
            tx_def: BpsDefault::None,
            rx_def: BpsDefault::None,
            plain: DuKind::I32,
            force_read: false,
        }
    }

    /// 可由用户指定的字节串字段
    pub const fn octets(name: &'static str, bits: usize) -> Self {
        Self {
            plain: DuKind::Octs,
            ..Self::simple(name, bits)
        }
    }

    /// 固定取值的字段，收发两侧都以该值为默认
    pub const fn constant(name: &'static str, bits: usize, value: i32) -> Self {
        Self {
            tag: None,
            tx_def: BpsDefault::Const(value),
            rx_def: BpsDefault::Const(value),
            ..Self::simple(name, bits)
        }
    }

    pub const fn with_defaults(self, tx_def: BpsDefault, rx_def: BpsDefault) -> Self {
        Self { tx_def, rx_def, ..self }
    }

    pub const fn force_read(self) -> Self {
        Self {
            force_read: true,
            ..self
        }
    }

    pub fn is_variable(&self) -> bool {
        self.bits == 0
    }
}
