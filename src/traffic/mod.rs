//! 收发：模板与模式的确认、报文生成、匹配以及控制操作

mod confirm;
mod ops;
mod payload;
mod recv;
mod send;

pub use confirm::{Side, check_pdu_seq, confirm_pdus, count_insertions, release_opaques};
pub use ops::RecvReport;
pub use payload::{PayloadFn, PayloadSpec, StreamFn, SymbolTable};
pub use recv::{Matched, Pattern, PtrnUnit, RecvTimeout};
pub use send::{TmplUnit, generate_pkts};

pub(crate) use recv::build_result;
