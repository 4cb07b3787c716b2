//! CSAP 表与生命周期

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::id::CsapId;
use super::instance::Csap;
use super::state::TrafficCmd;
use super::support::{LayerCaps, SupportRegistry};
use crate::asn::AsnValue;
use crate::config::TadConfig;
use crate::error::{Result, TadError};

#[derive(Default)]
struct TableInner {
    csaps: HashMap<CsapId, Arc<Csap>>,
    next_id: u32,
}

/// 进程内的 CSAP 句柄表
#[derive(Default)]
pub struct CsapTable {
    inner: Mutex<TableInner>,
}

impl CsapTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 分配一个未被占用的句柄，跳过 0
    fn allocate(&self) -> Result<CsapId> {
        let mut inner = self.inner.lock();
        for _ in 0..=u32::MAX {
            inner.next_id = inner.next_id.wrapping_add(1);
            let id = CsapId(inner.next_id);
            if id.is_valid() && !inner.csaps.contains_key(&id) {
                return Ok(id);
            }
        }
        Err(TadError::NoMemory)
    }

    fn insert(&self, csap: Arc<Csap>) {
        self.inner.lock().csaps.insert(csap.id(), csap);
    }

    fn remove(&self, id: CsapId) -> Option<Arc<Csap>> {
        self.inner.lock().csaps.remove(&id)
    }

    pub fn find(&self, id: CsapId) -> Option<Arc<Csap>> {
        self.inner.lock().csaps.get(&id).cloned()
    }

    pub fn ids(&self) -> Vec<CsapId> {
        let mut ids: Vec<_> = self.inner.lock().csaps.keys().copied().collect();
        ids.sort_by_key(|id| id.0);
        ids
    }

    pub fn len(&self) -> usize {
        self.inner.lock().csaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().csaps.is_empty()
    }

    /// 创建 CSAP
    ///
    /// 任一步失败时已初始化的层按相反顺序销毁，句柄不会进入表中。
    #[tracing::instrument(skip(self, registry, cfg, nds), fields(csap_type = %type_str))]
    pub fn create(
        &self,
        registry: &SupportRegistry,
        cfg: &TadConfig,
        type_str: &str,
        nds: Option<&AsnValue>,
    ) -> Result<CsapId> {
        let id = self.allocate()?;
        let mut csap = Csap::build(id, type_str, nds, |l| registry.find(l), cfg)?;

        let rw = csap.rw_layer();
        let rw_support = csap.layers()[rw].support().clone();
        if rw_support.caps().contains(LayerCaps::RW) {
            let medium = rw_support.rw_init(&csap).inspect_err(|e| {
                warn!(csap = %id, layer = rw, proto = rw_support.proto(), error = %e, "介质初始化失败");
            })?;
            csap.set_medium(medium);
        }

        // 自线路侧向外初始化，上层 init 可以看到下层的私有数据
        for layer in (0..csap.depth()).rev() {
            let support = csap.layers()[layer].support().clone();
            match support.init(&csap, layer) {
                Ok(data) => csap.layers_mut()[layer].specific_data = data,
                Err(e) => {
                    warn!(csap = %id, layer, proto = support.proto(), error = %e, "层初始化失败");
                    teardown_layers(&csap, layer + 1);
                    return Err(e);
                }
            }
        }

        let depth = csap.depth();
        self.insert(Arc::new(csap));
        info!(csap = %id, depth, "📡 CSAP 已创建");
        Ok(id)
    }

    /// 销毁 CSAP：先停止收发线程，再逐层释放
    #[tracing::instrument(skip(self), fields(csap = %id))]
    pub fn destroy(&self, id: CsapId) -> Result<()> {
        let csap = self.remove(id).ok_or_else(|| {
            debug!(csap = %id, "销毁不存在的 CSAP");
            TadError::NoSuchCsap(id.0)
        })?;
        csap.send_command(TrafficCmd::Destroy);
        if let Err(e) = csap.join_worker() {
            debug!(csap = %id, error = %e, "收发线程以错误结束");
        }
        csap.close_command_channel();
        teardown_layers(&csap, 0);
        info!(csap = %id, "CSAP 已销毁");
        Ok(())
    }

    /// 销毁表中所有 CSAP
    pub fn clear(&self) {
        for id in self.ids() {
            if let Err(e) = self.destroy(id) {
                warn!(csap = %id, error = %e, "CSAP 销毁失败");
            }
        }
    }
}

/// 销毁 `from` 及更内层的层私有数据，然后释放介质
fn teardown_layers(csap: &Csap, from: usize) {
    for layer in from..csap.depth() {
        let support = csap.layers()[layer].support();
        if let Err(e) = support.destroy(csap, layer) {
            warn!(csap = %csap.id(), layer, proto = support.proto(), error = %e, "层销毁失败");
        }
    }
    if let Some(medium) = csap.take_medium() {
        let rw = csap.rw_layer();
        let support = csap.layers()[rw].support();
        if let Err(e) = support.rw_destroy(csap, medium) {
            warn!(csap = %csap.id(), layer = rw, error = %e, "介质释放失败");
        }
    }
}
