//! CSAP 实例
//!
//! 层结构在创建后不再变化；状态、计数器和时间戳放在数据访问锁后面，
//! 介质和收发线程句柄各有自己的锁。

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, UNIX_EPOCH};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, warn};

use super::id::{CsapId, TeProto};
use super::state::{CsapCounters, CsapState, CsapStatus, TrafficCmd};
use super::support::{LayerData, ProtocolSupport};
use crate::asn::AsnValue;
use crate::config::{CsapParams, TadConfig};
use crate::error::{Result, TadError};
use crate::medium::Medium;

/// 类型串以 `data.` 开头的 CSAP 只承载数据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsapKind {
    Raw,
    Data,
}

const DATA_PREFIX: &str = "data";

/// 解析点分类型串，得到 CSAP 种类与各层协议标签（最外层在前）
pub fn parse_type(type_str: &str, max_depth: usize) -> Result<(CsapKind, Vec<String>)> {
    let mut labels: Vec<&str> = type_str.split('.').collect();
    if labels.iter().any(|l| l.is_empty()) {
        return Err(TadError::invalid(format!("malformed CSAP type '{type_str}'")));
    }
    let kind = if labels.first() == Some(&DATA_PREFIX) {
        labels.remove(0);
        CsapKind::Data
    } else {
        CsapKind::Raw
    };
    if labels.is_empty() {
        return Err(TadError::invalid(format!("CSAP type '{type_str}' has no layers")));
    }
    if labels.len() > max_depth {
        return Err(TadError::invalid(format!(
            "CSAP type '{type_str}' has {} layers, limit is {max_depth}",
            labels.len()
        )));
    }
    Ok((kind, labels.into_iter().map(str::to_string).collect()))
}

/// CSAP 中的一层
pub struct CsapLayer {
    proto: String,
    proto_tag: TeProto,
    support: Arc<dyn ProtocolSupport>,
    pub(crate) specific_data: Option<LayerData>,
    nds: AsnValue,
}

impl CsapLayer {
    pub fn proto(&self) -> &str {
        &self.proto
    }

    pub fn proto_tag(&self) -> TeProto {
        self.proto_tag
    }

    pub fn support(&self) -> &Arc<dyn ProtocolSupport> {
        &self.support
    }

    /// 创建时给出的层 NDS（未给出时为空 `{}`）
    pub fn nds(&self) -> &AsnValue {
        &self.nds
    }

    pub fn has_specific_data(&self) -> bool {
        self.specific_data.is_some()
    }
}

pub struct Csap {
    id: CsapId,
    type_str: String,
    kind: CsapKind,
    layers: Vec<CsapLayer>,
    params: CsapParams,
    max_received: usize,
    dump_packets: bool,
    medium: Mutex<Option<Box<dyn Medium>>>,
    status: Mutex<CsapStatus>,
    status_cv: Condvar,
    command: Mutex<Option<Sender<TrafficCmd>>>,
    worker: Mutex<Option<JoinHandle<Result<()>>>>,
    results: Mutex<VecDeque<AsnValue>>,
}

impl Csap {
    /// 解析类型串并查找每层的协议支持；层私有数据与介质由生命周期代码随后填充
    pub(crate) fn build(
        id: CsapId,
        type_str: &str,
        nds: Option<&AsnValue>,
        find: impl Fn(&str) -> Option<Arc<dyn ProtocolSupport>>,
        cfg: &TadConfig,
    ) -> Result<Csap> {
        let (kind, labels) = parse_type(type_str, cfg.max_depth)?;
        let layer_nds = layer_nds_list(nds, &labels)?;

        let mut layers = Vec::with_capacity(labels.len());
        for (label, lnds) in labels.into_iter().zip(layer_nds) {
            let support = find(&label).ok_or_else(|| {
                warn!(proto = %label, "协议不受支持");
                TadError::UnsupportedProtocol(label.clone())
            })?;
            layers.push(CsapLayer {
                proto_tag: TeProto::from_label(&label),
                proto: label,
                support,
                specific_data: None,
                nds: lnds,
            });
        }

        Ok(Csap {
            id,
            type_str: type_str.to_string(),
            kind,
            layers,
            params: CsapParams::resolve(cfg, nds),
            max_received: cfg.max_received,
            dump_packets: cfg.dump_packets,
            medium: Mutex::new(None),
            status: Mutex::new(CsapStatus::default()),
            status_cv: Condvar::new(),
            command: Mutex::new(None),
            worker: Mutex::new(None),
            results: Mutex::new(VecDeque::new()),
        })
    }

    pub fn id(&self) -> CsapId {
        self.id
    }

    pub fn type_str(&self) -> &str {
        &self.type_str
    }

    pub fn kind(&self) -> CsapKind {
        self.kind
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    pub fn layers(&self) -> &[CsapLayer] {
        &self.layers
    }

    pub fn layer(&self, i: usize) -> Option<&CsapLayer> {
        self.layers.get(i)
    }

    pub(crate) fn layers_mut(&mut self) -> &mut [CsapLayer] {
        &mut self.layers
    }

    /// 各层协议标签，最外层在前
    pub fn protos(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.proto.as_str()).collect()
    }

    /// 拥有介质的层：最靠近线路的一层
    pub fn rw_layer(&self) -> usize {
        self.layers.len().saturating_sub(1)
    }

    pub fn params(&self) -> &CsapParams {
        &self.params
    }

    pub(crate) fn dump_packets(&self) -> bool {
        self.dump_packets
    }

    /// 取第 `layer` 层的私有数据
    pub fn specific<T: 'static>(&self, layer: usize) -> Option<&T> {
        self.layers
            .get(layer)?
            .specific_data
            .as_ref()?
            .downcast_ref::<T>()
    }

    /// 持数据访问锁
    pub fn lock_status(&self) -> MutexGuard<'_, CsapStatus> {
        self.status.lock()
    }

    /// 状态快照
    pub fn status(&self) -> CsapStatus {
        self.status.lock().clone()
    }

    pub fn state(&self) -> CsapState {
        self.status.lock().state
    }

    pub fn counters(&self) -> CsapCounters {
        self.status.lock().counters
    }

    /// 唤醒等待状态变化的线程
    pub(crate) fn notify(&self) {
        self.status_cv.notify_all();
    }

    /// 等待当前操作结束（COMPLETE）或超时；返回是否已结束
    pub(crate) fn wait_complete(&self, timeout: Option<Duration>) -> bool {
        let mut st = self.status.lock();
        loop {
            if !st.is_busy() {
                return true;
            }
            match timeout {
                Some(t) => {
                    if self.status_cv.wait_for(&mut st, t).timed_out() {
                        return !st.is_busy();
                    }
                }
                None => self.status_cv.wait(&mut st),
            }
        }
    }

    pub(crate) fn set_medium(&self, medium: Option<Box<dyn Medium>>) {
        *self.medium.lock() = medium;
    }

    pub(crate) fn take_medium(&self) -> Option<Box<dyn Medium>> {
        self.medium.lock().take()
    }

    pub fn has_medium(&self) -> bool {
        self.medium.lock().is_some()
    }

    /// 在介质上执行一次操作，没有介质时返回 not-supported
    pub(crate) fn with_medium<R>(&self, f: impl FnOnce(&mut dyn Medium) -> Result<R>) -> Result<R> {
        let mut guard = self.medium.lock();
        match guard.as_mut() {
            Some(m) => f(m.as_mut()),
            None => Err(TadError::unsupported(format!("CSAP {} has no medium", self.id))),
        }
    }

    /// 新建命令通道，返回收发线程一端
    pub(crate) fn open_command_channel(&self) -> Receiver<TrafficCmd> {
        let (tx, rx) = mpsc::channel();
        *self.command.lock() = Some(tx);
        rx
    }

    /// 向收发线程发命令；没有活动通道时返回 false
    pub(crate) fn send_command(&self, cmd: TrafficCmd) -> bool {
        let sent = self
            .command
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.send(cmd).is_ok());
        debug!(csap = %self.id, ?cmd, sent, "发送收发命令");
        sent
    }

    pub(crate) fn close_command_channel(&self) {
        self.command.lock().take();
    }

    pub(crate) fn set_worker(&self, handle: JoinHandle<Result<()>>) {
        *self.worker.lock() = Some(handle);
    }

    /// 等待后台收发线程退出，返回它的结果；没有线程时为 `Ok`
    pub(crate) fn join_worker(&self) -> Result<()> {
        let handle = self.worker.lock().take();
        match handle.map(JoinHandle::join) {
            None => Ok(()),
            Some(Ok(result)) => result,
            Some(Err(_)) => {
                warn!(csap = %self.id, "收发线程异常退出");
                Err(TadError::Interrupted)
            }
        }
    }

    /// 保存一个匹配结果；超过上限时丢弃最旧的
    pub(crate) fn push_result(&self, result: AsnValue) {
        let mut q = self.results.lock();
        if q.len() >= self.max_received {
            q.pop_front();
        }
        q.push_back(result);
    }

    pub(crate) fn drain_results(&self) -> Vec<AsnValue> {
        self.results.lock().drain(..).collect()
    }

    pub(crate) fn clear_results(&self) {
        self.results.lock().clear();
    }

    /// CSAP 参数查询
    pub fn param(&self, name: &str) -> Option<String> {
        let st = self.status();
        let secs = |t: Option<std::time::SystemTime>| {
            t.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| format!("{}.{:06}", d.as_secs(), d.subsec_micros()))
                .unwrap_or_else(|| "0".into())
        };
        match name {
            "status" => Some(
                if st.is_busy() {
                    "busy"
                } else if st.state.contains(CsapState::COMPLETE) {
                    "completed"
                } else {
                    "idle"
                }
                .to_string(),
            ),
            "total_bytes" => Some((st.counters.total_sent + st.counters.total_received).to_string()),
            "total_sent" => Some(st.counters.total_sent.to_string()),
            "total_received" => Some(st.counters.total_received.to_string()),
            "packets" => Some(st.counters.packets.to_string()),
            "first_packet_time" => Some(secs(st.first_pkt)),
            "last_packet_time" => Some(secs(st.last_pkt)),
            _ => self
                .layers
                .iter()
                .enumerate()
                .find_map(|(i, l)| l.support.get_param(self, i, name)),
        }
    }
}

/// CSAP NDS 中的层列表：`{ layers { arp:{...}, eth:{...} } }` 或直接给列表
fn layer_nds_list(nds: Option<&AsnValue>, labels: &[String]) -> Result<Vec<AsnValue>> {
    let Some(nds) = nds else {
        return Ok(vec![AsnValue::empty(); labels.len()]);
    };
    let items = match nds.field("layers") {
        Some(layers) => layers.items(),
        None => nds.items(),
    };
    let Some(items) = items else {
        return Ok(vec![AsnValue::empty(); labels.len()]);
    };
    if items.is_empty() {
        return Ok(vec![AsnValue::empty(); labels.len()]);
    }
    if items.len() != labels.len() {
        return Err(TadError::wrong_nds(format!(
            "CSAP NDS has {} layers, type has {}",
            items.len(),
            labels.len()
        )));
    }
    items
        .iter()
        .zip(labels)
        .map(|(item, label)| match item.as_choice() {
            Some((l, v)) if l == label => Ok(v.clone()),
            _ => Err(TadError::wrong_nds(format!("CSAP NDS layer does not match '{label}'"))),
        })
        .collect()
}
