//! 协议层实现
//!
//! ARP 与以太网。每个协议一个 [`ProtocolSupport`](crate::csap::ProtocolSupport) 实现。

mod arp;
mod eth;

pub use arp::{ARP_OP_REPLY, ARP_PROTO, ArpLayerData, ArpSupport};
pub use eth::{ETH_MIN_FRAME, ETH_PROTO, ETHERTYPE_ARP, ETHERTYPE_IP, EthLayerData, EthSupport, MediumFactory};
