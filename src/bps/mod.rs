//! 位打包字段集（bps）
//!
//! 协议头由若干定长或变长字段组成。字段集定义（[`BpsFragDef`]）描述每个字段
//! 的位宽、在 PDU NDS 中的标签、平凡类型与收发默认值；每次生成或匹配时的
//! 具体取值保存在 [`BpsFragData`] 中。

mod field;
mod frag;

pub use field::{BpsDefault, BpsField};
pub use frag::{BpsFragData, BpsFragDef};
