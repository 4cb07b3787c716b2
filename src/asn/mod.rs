//! ASN 值模型
//!
//! NDS（模板、模式、CSAP 配置）以 ASN 值的形式在模块间传递。这里只实现
//! TAD 核心需要检查的那部分语法，以及一套简化的文本记法。

mod text;
mod value;

pub use value::{AsnSyntax, AsnValue};
