//! TAD 配置
//!
//! 以 JSON 描述，缺省字段取默认值。单个 CSAP 可以在创建 NDS 的 `params`
//! 中覆盖接收超时与停止响应延迟。

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::asn::AsnValue;
use crate::error::Result;

/// 协议栈最大深度
pub const DEFAULT_MAX_DEPTH: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TadConfig {
    /// CSAP 协议栈允许的最大层数
    pub max_depth: usize,
    /// 默认接收超时（毫秒）
    pub recv_timeout_ms: u64,
    /// 阻塞 I/O 时检查停止命令的间隔（毫秒）
    pub stop_latency_ms: u64,
    /// 每个 CSAP 最多缓存的已匹配报文数
    pub max_received: usize,
    /// trace 级别下以十六进制输出报文
    pub dump_packets: bool,
}

impl Default for TadConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            recv_timeout_ms: 3000,
            stop_latency_ms: 100,
            max_received: 4096,
            dump_packets: false,
        }
    }
}

impl TadConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

/// 单个 CSAP 的运行参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsapParams {
    pub recv_timeout: Duration,
    pub stop_latency: Duration,
}

impl CsapParams {
    /// 以全局配置为基础，叠加 CSAP NDS 中 `params` 的覆盖项
    pub fn resolve(cfg: &TadConfig, nds: Option<&AsnValue>) -> Self {
        let params = nds.and_then(|v| v.field("params"));
        let ms = |label: &str, default: u64| {
            params
                .and_then(|p| p.field(label))
                .and_then(AsnValue::as_int)
                .and_then(|v| u64::try_from(v).ok())
                .unwrap_or(default)
        };
        Self {
            recv_timeout: Duration::from_millis(ms("receive-timeout-ms", cfg.recv_timeout_ms)),
            stop_latency: Duration::from_millis(ms("stop-latency-timeout-ms", cfg.stop_latency_ms).max(1)),
        }
    }
}
