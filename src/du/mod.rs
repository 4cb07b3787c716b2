//! 数据单元
//!
//! 一个数据单元描述一个协议字段的取值：整数、字节串、字符串，或者引用
//! 迭代参数的算术表达式。未给出时为 `Undef`，由字段默认值补齐。

mod args;
mod expr;
mod unit;

pub use args::{IterSpec, IterStep, TmplArg, TmplArgs};
pub use expr::{BinOp, Expr, ntohll};
pub use unit::{DataUnit, DuKind};
