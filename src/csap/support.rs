//! 协议支持
//!
//! 每个协议标签对应一个 [`ProtocolSupport`] 实现，即该协议层的回调集合。
//! 注册表在进程启动时填充，收发期间只读。

use std::any::Any;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use super::instance::Csap;
use crate::asn::AsnValue;
use crate::du::TmplArg;
use crate::error::{Result, TadError};
use crate::medium::Medium;
use crate::pkt::{Packet, Packets};

/// 层私有数据，创建 CSAP 时由 `init` 产生，CSAP 销毁时释放
pub type LayerData = Box<dyn Any + Send + Sync>;

/// 一次收发操作中某层的不透明状态（confirm 的产物）
pub type Opaque = Box<dyn Any + Send>;

bitflags::bitflags! {
    /// 协议层具备的能力
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LayerCaps: u8 {
        const SEND = 1 << 0;
        const RECV = 1 << 1;
        /// 拥有介质，可作为 CSAP 的读写层
        const RW = 1 << 2;
        const PATTERN = 1 << 3;
    }
}

impl LayerCaps {
    /// 只做生成与匹配，没有介质
    pub const NO_RW: LayerCaps = LayerCaps::SEND.union(LayerCaps::RECV);
}

/// 匹配一个收到的报文时某层的状态
#[derive(Debug, Default)]
pub struct MatchLayer {
    /// 层在 `match_pre` 中分配的每报文状态
    pub opaque: Option<Opaque>,
    /// 本层 PDU（match_do 的输入）
    pub pkt: Packet,
    /// `match_post` 生成的结果
    pub nds: Option<AsnValue>,
}

/// 协议层回调
///
/// `layer` 是层在 CSAP 中的下标（0 为最外层）。除 `proto` 外都有默认实现：
/// 可选的回调默认什么都不做，生成与匹配默认返回 not-supported。
pub trait ProtocolSupport: Send + Sync {
    fn proto(&self) -> &str;

    fn caps(&self) -> LayerCaps {
        LayerCaps::NO_RW
    }

    /// CSAP 创建时调用一次，返回层私有数据
    fn init(&self, _csap: &Csap, _layer: usize) -> Result<Option<LayerData>> {
        Ok(None)
    }

    fn destroy(&self, _csap: &Csap, _layer: usize) -> Result<()> {
        Ok(())
    }

    /// 层相关的 CSAP 参数
    fn get_param(&self, _csap: &Csap, _layer: usize, _param: &str) -> Option<String> {
        None
    }

    fn confirm_tmpl(
        &self,
        _csap: &Csap,
        _layer: usize,
        _layer_pdu: &mut AsnValue,
    ) -> Result<Option<Opaque>> {
        Ok(None)
    }

    fn release_tmpl(&self, _csap: &Csap, _layer: usize, _opaque: Opaque) {}

    /// 消费上层 SDU，产出本层 PDU
    #[allow(clippy::too_many_arguments)]
    fn generate_pkts(
        &self,
        _csap: &Csap,
        _layer: usize,
        _tmpl_pdu: &AsnValue,
        _opaque: Option<&Opaque>,
        _args: &[TmplArg],
        _sdus: &mut Packets,
        _pdus: &mut Packets,
    ) -> Result<()> {
        Err(TadError::unsupported(format!("'{}' cannot generate packets", self.proto())))
    }

    fn confirm_ptrn(
        &self,
        _csap: &Csap,
        _layer: usize,
        _layer_pdu: &mut AsnValue,
    ) -> Result<Option<Opaque>> {
        Ok(None)
    }

    fn release_ptrn(&self, _csap: &Csap, _layer: usize, _opaque: Opaque) {}

    fn match_pre(&self, _csap: &Csap, _layer: usize, _meta: &mut MatchLayer) -> Result<()> {
        Ok(())
    }

    /// 用模式匹配本层 PDU；成功时把载荷片段放入 `sdu`
    #[allow(clippy::too_many_arguments)]
    fn match_do(
        &self,
        _csap: &Csap,
        _layer: usize,
        _ptrn_pdu: &AsnValue,
        _ptrn_opaque: Option<&Opaque>,
        _meta: &mut MatchLayer,
        _pdu: &Packet,
        _sdu: &mut Packet,
    ) -> Result<()> {
        Err(TadError::unsupported(format!("'{}' cannot match packets", self.proto())))
    }

    fn match_done(
        &self,
        _csap: &Csap,
        _layer: usize,
        _ptrn_pdu: &AsnValue,
        _ptrn_opaque: Option<&Opaque>,
        _meta: &mut MatchLayer,
    ) -> Result<()> {
        Ok(())
    }

    /// 构造本层结果 NDS（仅在请求了结果时调用）
    fn match_post(&self, _csap: &Csap, _layer: usize, _meta: &mut MatchLayer) -> Result<()> {
        Ok(())
    }

    fn match_free(&self, _csap: &Csap, _layer: usize, _opaque: Opaque) {}

    /// 由模板层 PDU 生成应答的模式层 PDU
    fn generate_pattern(&self, _csap: &Csap, _layer: usize, _tmpl_pdu: &AsnValue) -> Result<AsnValue> {
        Err(TadError::unsupported(format!("'{}' cannot generate patterns", self.proto())))
    }

    /// 读写层创建介质
    fn rw_init(&self, _csap: &Csap) -> Result<Option<Box<dyn Medium>>> {
        Ok(None)
    }

    fn rw_destroy(&self, _csap: &Csap, _medium: Box<dyn Medium>) -> Result<()> {
        Ok(())
    }

    /// 从注册表中移除时调用
    fn unregister(&self) {}
}

/// 协议支持注册表
#[derive(Default)]
pub struct SupportRegistry {
    list: RwLock<Vec<Arc<dyn ProtocolSupport>>>,
}

impl SupportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册协议支持，标签重复时拒绝
    pub fn register(&self, support: Arc<dyn ProtocolSupport>) -> Result<()> {
        let mut list = self.list.write();
        let label = support.proto().to_string();
        if list.iter().any(|s| s.proto() == label) {
            return Err(TadError::DuplicateProtocol(label));
        }
        info!(proto = %label, "🧩 注册协议支持");
        list.push(support);
        Ok(())
    }

    /// 按标签线性查找
    pub fn find(&self, label: &str) -> Option<Arc<dyn ProtocolSupport>> {
        self.list.read().iter().find(|s| s.proto() == label).cloned()
    }

    pub fn labels(&self) -> Vec<String> {
        self.list.read().iter().map(|s| s.proto().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.list.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.read().is_empty()
    }

    /// 清空注册表，逐个调用 `unregister`
    pub fn clear(&self) {
        let drained: Vec<_> = self.list.write().drain(..).collect();
        for s in drained {
            debug!(proto = s.proto(), "注销协议支持");
            s.unregister();
        }
    }
}
