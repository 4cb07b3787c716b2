//! CSAP：协议层栈之上的收发端点
//!
//! 句柄表、实例结构、运行状态与协议支持注册表。

mod id;
mod instance;
mod state;
mod support;
mod table;

pub use id::{CsapId, TeProto};
pub use instance::{Csap, CsapKind, CsapLayer, parse_type};
pub use state::{CsapCounters, CsapState, CsapStatus, TrafficCmd, TrafficOp};
pub use support::{LayerCaps, LayerData, MatchLayer, Opaque, ProtocolSupport, SupportRegistry};
pub use table::CsapTable;
