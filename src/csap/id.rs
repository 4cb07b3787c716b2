//! 标识符类型
//!
//! CSAP 句柄与协议标签。

use std::fmt;
use std::str::FromStr;

/// CSAP 句柄，0 保留为无效值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CsapId(pub u32);

impl CsapId {
    pub const INVALID: CsapId = CsapId(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for CsapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 已知协议标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TeProto {
    Invalid,
    Aal5,
    Atm,
    Arp,
    Bridge,
    Cli,
    Dhcp,
    Eth,
    Icmp4,
    Ip4,
    Iscsi,
    Pcap,
    Snmp,
    Tcp,
    Udp,
    Socket,
}

impl TeProto {
    /// 未知标签映射为 [`TeProto::Invalid`]
    pub fn from_label(label: &str) -> Self {
        match label {
            "aal5" => TeProto::Aal5,
            "atm" => TeProto::Atm,
            "arp" => TeProto::Arp,
            "bridge" => TeProto::Bridge,
            "cli" => TeProto::Cli,
            "dhcp" => TeProto::Dhcp,
            "eth" => TeProto::Eth,
            "icmp4" => TeProto::Icmp4,
            "ip4" => TeProto::Ip4,
            "iscsi" => TeProto::Iscsi,
            "pcap" => TeProto::Pcap,
            "snmp" => TeProto::Snmp,
            "tcp" => TeProto::Tcp,
            "udp" => TeProto::Udp,
            "socket" => TeProto::Socket,
            _ => TeProto::Invalid,
        }
    }

    /// 无效标签返回 `None`
    pub fn as_str(self) -> Option<&'static str> {
        Some(match self {
            TeProto::Invalid => return None,
            TeProto::Aal5 => "aal5",
            TeProto::Atm => "atm",
            TeProto::Arp => "arp",
            TeProto::Bridge => "bridge",
            TeProto::Cli => "cli",
            TeProto::Dhcp => "dhcp",
            TeProto::Eth => "eth",
            TeProto::Icmp4 => "icmp4",
            TeProto::Ip4 => "ip4",
            TeProto::Iscsi => "iscsi",
            TeProto::Pcap => "pcap",
            TeProto::Snmp => "snmp",
            TeProto::Tcp => "tcp",
            TeProto::Udp => "udp",
            TeProto::Socket => "socket",
        })
    }

    pub fn is_valid(self) -> bool {
        self != TeProto::Invalid
    }
}

impl FromStr for TeProto {
    type Err = crate::error::TadError;

    /// 与 [`TeProto::from_label`] 不同，未知标签报错
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match TeProto::from_label(s) {
            TeProto::Invalid => Err(crate::error::TadError::NoSuchProtocol(s.to_string())),
            p => Ok(p),
        }
    }
}

impl fmt::Display for TeProto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str().unwrap_or("<invalid>"))
    }
}
