//! 日志初始化

use tracing_subscriber::EnvFilter;

/// 安装 fmt 订阅者：优先读取 `RUST_LOG`，否则使用 `default_filter`。
///
/// 可以重复调用，已安装时静默返回。
pub fn init_tracing(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .try_init();
}

/// 报文的十六进制转储（trace 级别）
pub(crate) fn dump_hex(what: &str, data: &[u8]) {
    tracing::trace!(len = data.len(), bytes = %hex::encode(data), "{what}");
}
