//! ASN 值
//!
//! 带标签的和类型，覆盖 NDS 中出现的语法：整数、字符串、CHOICE、
//! SEQUENCE 与 SEQUENCE OF。

use serde::{Deserialize, Serialize};

use crate::error::{Result, TadError};

/// 值的语法类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsnSyntax {
    Bool,
    Integer,
    Enumerated,
    LongInt,
    Real,
    Oid,
    BitString,
    OctetString,
    CharString,
    Choice,
    Sequence,
    SequenceOf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "syntax", content = "value", rename_all = "snake_case")]
pub enum AsnValue {
    Bool(bool),
    Integer(i64),
    Enumerated(i64),
    LongInt(i64),
    Real(f64),
    Oid(Vec<u32>),
    BitString(Vec<u8>),
    OctetString(Vec<u8>),
    CharString(String),
    /// 选中的分支标签与值
    Choice(String, Box<AsnValue>),
    /// 有序的具名字段
    Sequence(Vec<(String, AsnValue)>),
    SequenceOf(Vec<AsnValue>),
}

impl Default for AsnValue {
    fn default() -> Self {
        AsnValue::Sequence(Vec::new())
    }
}

impl AsnValue {
    pub fn new_choice(label: impl Into<String>, value: AsnValue) -> Self {
        AsnValue::Choice(label.into(), Box::new(value))
    }

    /// 空容器 `{}`
    pub fn empty() -> Self {
        AsnValue::Sequence(Vec::new())
    }

    /// 构造具名字段序列
    pub fn sequence<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, AsnValue)>,
        S: Into<String>,
    {
        AsnValue::Sequence(fields.into_iter().map(|(l, v)| (l.into(), v)).collect())
    }

    pub fn syntax(&self) -> AsnSyntax {
        match self {
            AsnValue::Bool(_) => AsnSyntax::Bool,
            AsnValue::Integer(_) => AsnSyntax::Integer,
            AsnValue::Enumerated(_) => AsnSyntax::Enumerated,
            AsnValue::LongInt(_) => AsnSyntax::LongInt,
            AsnValue::Real(_) => AsnSyntax::Real,
            AsnValue::Oid(_) => AsnSyntax::Oid,
            AsnValue::BitString(_) => AsnSyntax::BitString,
            AsnValue::OctetString(_) => AsnSyntax::OctetString,
            AsnValue::CharString(_) => AsnSyntax::CharString,
            AsnValue::Choice(..) => AsnSyntax::Choice,
            AsnValue::Sequence(_) => AsnSyntax::Sequence,
            AsnValue::SequenceOf(_) => AsnSyntax::SequenceOf,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AsnValue::Integer(v) | AsnValue::Enumerated(v) | AsnValue::LongInt(v) => Some(*v),
            AsnValue::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AsnValue::Bool(b) => Some(*b),
            AsnValue::Integer(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn as_octets(&self) -> Option<&[u8]> {
        match self {
            AsnValue::OctetString(v) | AsnValue::BitString(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AsnValue::CharString(s) => Some(s),
            _ => None,
        }
    }

    /// CHOICE 的分支标签与值
    pub fn as_choice(&self) -> Option<(&str, &AsnValue)> {
        match self {
            AsnValue::Choice(label, v) => Some((label, v)),
            _ => None,
        }
    }

    pub fn as_choice_mut(&mut self) -> Option<(&str, &mut AsnValue)> {
        match self {
            AsnValue::Choice(label, v) => Some((label.as_str(), v.as_mut())),
            _ => None,
        }
    }

    pub fn choice_label(&self) -> Option<&str> {
        self.as_choice().map(|(l, _)| l)
    }

    pub fn field(&self, label: &str) -> Option<&AsnValue> {
        match self {
            AsnValue::Sequence(fields) => fields.iter().find(|(l, _)| l == label).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn field_mut(&mut self, label: &str) -> Option<&mut AsnValue> {
        match self {
            AsnValue::Sequence(fields) => fields
                .iter_mut()
                .find(|(l, _)| l == label)
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// 设置字段：已存在则替换，否则追加到末尾
    pub fn set_field(&mut self, label: &str, value: AsnValue) -> Result<()> {
        if let AsnValue::SequenceOf(items) = self {
            if items.is_empty() {
                *self = AsnValue::empty();
            }
        }
        match self {
            AsnValue::Sequence(fields) => {
                match fields.iter_mut().find(|(l, _)| l == label) {
                    Some((_, v)) => *v = value,
                    None => fields.push((label.to_string(), value)),
                }
                Ok(())
            }
            other => Err(TadError::wrong_nds(format!(
                "cannot set field '{label}' on {:?} value",
                other.syntax()
            ))),
        }
    }

    pub fn remove_field(&mut self, label: &str) -> Option<AsnValue> {
        match self {
            AsnValue::Sequence(fields) => {
                let idx = fields.iter().position(|(l, _)| l == label)?;
                Some(fields.remove(idx).1)
            }
            _ => None,
        }
    }

    /// SEQUENCE OF 的元素；空的 `{}` 视作空列表
    pub fn items(&self) -> Option<&[AsnValue]> {
        match self {
            AsnValue::SequenceOf(items) => Some(items),
            AsnValue::Sequence(fields) if fields.is_empty() => Some(&[]),
            _ => None,
        }
    }

    pub fn items_mut(&mut self) -> Option<&mut Vec<AsnValue>> {
        if matches!(self, AsnValue::Sequence(f) if f.is_empty()) {
            *self = AsnValue::SequenceOf(Vec::new());
        }
        match self {
            AsnValue::SequenceOf(items) => Some(items),
            _ => None,
        }
    }

    /// 按点分路径取子值
    ///
    /// 路径段可以是字段标签、SEQUENCE OF 下标，或 `#label`（穿过 CHOICE，
    /// 要求选中的正是该分支）。
    pub fn descendant(&self, path: &str) -> Option<&AsnValue> {
        let mut cur = self;
        for seg in path.split('.').filter(|s| !s.is_empty()) {
            cur = if let Some(label) = seg.strip_prefix('#') {
                match cur.as_choice() {
                    Some((l, v)) if l == label => v,
                    _ => return None,
                }
            } else if let (Ok(idx), Some(items)) = (seg.parse::<usize>(), cur.items()) {
                items.get(idx)?
            } else {
                cur.field(seg)?
            };
        }
        Some(cur)
    }

    pub fn descendant_mut(&mut self, path: &str) -> Option<&mut AsnValue> {
        let mut cur = self;
        for seg in path.split('.').filter(|s| !s.is_empty()) {
            cur = if let Some(label) = seg.strip_prefix('#') {
                match cur {
                    AsnValue::Choice(l, v) if l == label => v.as_mut(),
                    _ => return None,
                }
            } else if let (Ok(idx), true) = (seg.parse::<usize>(), cur.items().is_some()) {
                cur.items_mut()?.get_mut(idx)?
            } else {
                cur.field_mut(seg)?
            };
        }
        Some(cur)
    }

    pub fn read_int(&self, path: &str) -> Option<i64> {
        self.descendant(path)?.as_int()
    }

    pub fn read_octets(&self, path: &str) -> Option<&[u8]> {
        self.descendant(path)?.as_octets()
    }
}
