pub mod asn;
pub mod bps;
pub mod config;
pub mod csap;
pub mod du;
pub mod error;
pub mod logging;
pub mod medium;
pub mod pkt;
pub mod proto;
pub mod tad;
pub mod traffic;

pub use asn::AsnValue;
pub use config::TadConfig;
pub use csap::{Csap, CsapId, CsapTable, ProtocolSupport, SupportRegistry};
pub use error::{ErrorKind, Result, TadError};
pub use tad::Tad;
pub use traffic::{RecvReport, RecvTimeout};

#[cfg(test)]
mod test;
