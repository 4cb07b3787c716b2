//! TAD 上下文
//!
//! 把配置、协议支持注册表、CSAP 表与用户函数符号表放在一起。进程级单例
//! 通过 [`Tad::global`] 取得（首次访问时注册 ARP 与以太网），测试与嵌入方
//! 可以用 [`Tad::new`] 建立互不影响的上下文。

use std::sync::{Arc, OnceLock};

use tracing::{error, info};

use crate::asn::AsnValue;
use crate::config::TadConfig;
use crate::csap::{Csap, CsapId, CsapTable, ProtocolSupport, SupportRegistry};
use crate::error::{Result, TadError};
use crate::proto::{ArpSupport, EthSupport};
use crate::traffic::SymbolTable;

static GLOBAL: OnceLock<Tad> = OnceLock::new();

pub struct Tad {
    config: TadConfig,
    registry: SupportRegistry,
    csaps: CsapTable,
    symbols: Arc<SymbolTable>,
}

impl Default for Tad {
    fn default() -> Self {
        Self::new(TadConfig::default())
    }
}

impl Tad {
    /// 空上下文：没有注册任何协议
    pub fn new(config: TadConfig) -> Self {
        Self {
            config,
            registry: SupportRegistry::new(),
            csaps: CsapTable::new(),
            symbols: Arc::new(SymbolTable::new()),
        }
    }

    /// 注册了 ARP 与（无介质的）以太网的上下文
    pub fn with_default_protocols(config: TadConfig) -> Result<Self> {
        let tad = Self::new(config);
        tad.register_defaults()?;
        Ok(tad)
    }

    /// 进程级上下文，首次调用时以默认配置初始化
    pub fn global() -> &'static Tad {
        GLOBAL.get_or_init(|| {
            let tad = Tad::default();
            if let Err(e) = tad.register_defaults() {
                error!(error = %e, "默认协议注册失败");
            }
            info!("TAD 上下文已初始化");
            tad
        })
    }

    pub fn register_defaults(&self) -> Result<()> {
        self.register(Arc::new(ArpSupport::new()))?;
        self.register(Arc::new(EthSupport::new()))
    }

    pub fn register(&self, support: Arc<dyn ProtocolSupport>) -> Result<()> {
        self.registry.register(support)
    }

    pub fn config(&self) -> &TadConfig {
        &self.config
    }

    pub fn registry(&self) -> &SupportRegistry {
        &self.registry
    }

    pub fn csaps(&self) -> &CsapTable {
        &self.csaps
    }

    pub fn symbols(&self) -> &Arc<SymbolTable> {
        &self.symbols
    }

    pub fn csap_create(&self, type_str: &str, nds: Option<&AsnValue>) -> Result<CsapId> {
        self.csaps.create(&self.registry, &self.config, type_str, nds)
    }

    pub fn csap_destroy(&self, id: CsapId) -> Result<()> {
        self.csaps.destroy(id)
    }

    pub fn csap_find(&self, id: CsapId) -> Option<Arc<Csap>> {
        self.csaps.find(id)
    }

    pub(crate) fn csap(&self, id: CsapId) -> Result<Arc<Csap>> {
        self.csap_find(id).ok_or(TadError::NoSuchCsap(id.0))
    }

    /// CSAP 参数：通用参数（status、total_bytes、first/last_packet_time 等）或层参数
    pub fn csap_param(&self, id: CsapId, name: &str) -> Result<String> {
        self.csap(id)?
            .param(name)
            .ok_or_else(|| TadError::NotFound(format!("CSAP parameter '{name}'")))
    }

    /// 销毁全部 CSAP 并清空注册表
    pub fn shutdown(&self) {
        let n = self.csaps.len();
        self.csaps.clear();
        self.registry.clear();
        info!(destroyed = n, "TAD 上下文已关闭");
    }
}
