//! 接收：模式确认、逐层匹配与接收循环
//!
//! 收到的报文是线路侧在前的字节流，因此匹配自最内层（最靠近线路）开始，
//! 每层的 SDU 作为上一层的 PDU。模式由若干单元组成，第一个匹配的单元生效。

use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, trace, warn};

use super::confirm::{Side, confirm_pdus, release_opaques};
use super::payload::PayloadSpec;
use super::send::stop_requested;
use crate::asn::AsnValue;
use crate::csap::{Csap, MatchLayer, Opaque, TrafficCmd};
use crate::error::{Result, TadError};
use crate::logging::dump_hex;
use crate::pkt::Packet;

/// 接收超时
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecvTimeout {
    /// 使用 CSAP 的接收超时参数
    #[default]
    Default,
    Infinite,
    After(Duration),
}

impl RecvTimeout {
    pub(crate) fn deadline(self, csap: &Csap) -> Option<Instant> {
        match self {
            RecvTimeout::Default => Some(Instant::now() + csap.params().recv_timeout),
            RecvTimeout::Infinite => None,
            RecvTimeout::After(d) => Some(Instant::now() + d),
        }
    }
}

/// 已确认的模式单元
pub struct PtrnUnit {
    pdus: AsnValue,
    opaques: Vec<Option<Opaque>>,
    payload: Option<PayloadSpec>,
}

impl PtrnUnit {
    fn confirm(csap: &Csap, nds: &AsnValue) -> Result<Self> {
        let mut pdus = match nds.field("pdus") {
            Some(p) => p.clone(),
            None => AsnValue::SequenceOf(Vec::new()),
        };
        let opaques = confirm_pdus(csap, &mut pdus, Side::Pattern)?;
        let payload = nds
            .field("payload")
            .map(|p| PayloadSpec::from_asn(p).and_then(|spec| spec.check_pattern().map(|()| spec)))
            .transpose();
        match payload {
            Ok(payload) => Ok(Self { pdus, opaques, payload }),
            Err(e) => {
                release_opaques(csap, Side::Pattern, opaques);
                Err(e)
            }
        }
    }

    pub fn pdus(&self) -> &AsnValue {
        &self.pdus
    }

    fn layer_pdu(&self, layer: usize) -> Result<&AsnValue> {
        self.pdus
            .items()
            .and_then(|items| items.get(layer))
            .and_then(|item| item.as_choice())
            .map(|(_, v)| v)
            .ok_or_else(|| TadError::wrong_nds(format!("pattern has no PDU for layer {layer}")))
    }
}

/// 一次成功匹配
#[derive(Debug)]
pub struct Matched {
    pub unit: usize,
    pub layers: Vec<MatchLayer>,
    /// 最内层剥离后剩下的载荷，引用原报文的数据
    pub payload: Packet,
}

/// 已确认的模式：单元列表
pub struct Pattern {
    units: Vec<PtrnUnit>,
}

impl Pattern {
    /// 确认模式
    ///
    /// NDS 可以是单元列表 `{ { pdus {...} }, ... }`，也可以是单个单元。
    #[tracing::instrument(skip(csap, nds), fields(csap = %csap.id()))]
    pub fn confirm(csap: &Csap, nds: &AsnValue) -> Result<Self> {
        let single;
        let unit_nds: &[AsnValue] = match nds.items() {
            Some(items) if !items.is_empty() => items,
            _ => {
                single = [nds.clone()];
                &single
            }
        };
        let mut units = Vec::with_capacity(unit_nds.len());
        for (i, u) in unit_nds.iter().enumerate() {
            match PtrnUnit::confirm(csap, u) {
                Ok(unit) => units.push(unit),
                Err(e) => {
                    warn!(csap = %csap.id(), unit = i, error = %e, "模式单元确认失败");
                    Pattern { units }.release(csap);
                    return Err(e);
                }
            }
        }
        Ok(Self { units })
    }

    /// 由单元直接构成（send-recv 自动生成的应答模式）
    pub(crate) fn from_units(units: Vec<PtrnUnit>) -> Self {
        Self { units }
    }

    pub fn units(&self) -> &[PtrnUnit] {
        &self.units
    }

    pub fn release(self, csap: &Csap) {
        for unit in self.units {
            release_opaques(csap, Side::Pattern, unit.opaques);
        }
    }

    /// 依次尝试各单元；全部不匹配时返回 not-match
    #[tracing::instrument(level = "trace", skip_all, fields(csap = %csap.id(), len = pkt.len()))]
    pub fn match_packet(&self, csap: &Csap, pkt: &Packet) -> Result<Matched> {
        for (i, unit) in self.units.iter().enumerate() {
            match match_with_unit(csap, unit, pkt) {
                Ok((layers, payload)) => {
                    trace!(csap = %csap.id(), unit = i, "报文匹配");
                    return Ok(Matched {
                        unit: i,
                        layers,
                        payload,
                    });
                }
                Err(e) if e.is_recoverable() => {
                    trace!(csap = %csap.id(), unit = i, error = %e, "单元不匹配");
                }
                Err(e) => return Err(e),
            }
        }
        Err(TadError::NotMatch)
    }
}

/// 确认时单元 NDS 中只给出 pdus 的情形
pub(crate) fn unit_from_pdus(csap: &Csap, pdus: AsnValue) -> Result<PtrnUnit> {
    PtrnUnit::confirm(csap, &AsnValue::sequence([("pdus", pdus)]))
}

fn match_with_unit(csap: &Csap, unit: &PtrnUnit, pkt: &Packet) -> Result<(Vec<MatchLayer>, Packet)> {
    let depth = csap.depth();
    let mut metas: Vec<MatchLayer> = (0..depth).map(|_| MatchLayer::default()).collect();
    let mut cur = pkt.clone();

    let result = (|| -> Result<()> {
        for layer in (0..depth).rev() {
            let support = csap.layers()[layer].support();
            let ptrn_pdu = unit.layer_pdu(layer)?;
            let opaque = unit.opaques.get(layer).and_then(Option::as_ref);
            support.match_pre(csap, layer, &mut metas[layer])?;

            let pdu = std::mem::take(&mut cur);
            let mut sdu = Packet::new();
            let r = support.match_do(csap, layer, ptrn_pdu, opaque, &mut metas[layer], &pdu, &mut sdu);
            metas[layer].pkt = pdu;
            if let Err(e) = r {
                if !e.is_recoverable() {
                    warn!(csap = %csap.id(), layer, proto = support.proto(), error = %e, "匹配出错");
                }
                return Err(e);
            }
            support.match_done(csap, layer, ptrn_pdu, opaque, &mut metas[layer])?;
            cur = sdu;
        }
        if let Some(spec) = &unit.payload {
            spec.match_payload(&cur)?;
        }
        Ok(())
    })();

    match result {
        Ok(()) => Ok((metas, cur)),
        Err(e) => {
            free_match(csap, metas);
            Err(e)
        }
    }
}

/// 释放各层的每报文匹配状态
pub(crate) fn free_match(csap: &Csap, metas: Vec<MatchLayer>) {
    for (layer, meta) in metas.into_iter().enumerate() {
        if let (Some(opaque), Some(l)) = (meta.opaque, csap.layer(layer)) {
            l.support().match_free(csap, layer, opaque);
        }
    }
}

/// 构造结果：`{ match-unit N, received {...}, pdus { <proto>:{...}, ... }, payload bytes:'..'H }`
pub(crate) fn build_result(csap: &Csap, mut matched: Matched) -> Result<AsnValue> {
    let depth = csap.depth();
    let mut pdus = vec![AsnValue::empty(); depth];
    for layer in (0..depth).rev() {
        let l = &csap.layers()[layer];
        let meta = &mut matched.layers[layer];
        l.support().match_post(csap, layer, meta).inspect_err(|e| {
            warn!(csap = %csap.id(), layer, proto = l.proto(), error = %e, "结果构造失败");
        })?;
        pdus[layer] = AsnValue::new_choice(l.proto(), meta.nds.take().unwrap_or_default());
    }

    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    let received = AsnValue::sequence([
        ("seconds", AsnValue::Integer(now.as_secs() as i64)),
        ("micro-seconds", AsnValue::Integer(i64::from(now.subsec_micros()))),
    ]);
    let result = AsnValue::sequence([
        ("match-unit", AsnValue::Integer(matched.unit as i64)),
        ("received", received),
        ("pdus", AsnValue::SequenceOf(pdus)),
        (
            "payload",
            AsnValue::new_choice("bytes", AsnValue::OctetString(matched.payload.to_vec())),
        ),
    ]);
    free_match(csap, matched.layers);
    Ok(result)
}

/// 处理一个匹配上的报文：计数，按需构造并保存结果
pub(crate) fn handle_matched(csap: &Csap, pkt: &Packet, matched: Matched, results: bool) -> Result<Option<AsnValue>> {
    csap.lock_status().account(pkt.len(), false);
    if results {
        Ok(Some(build_result(csap, matched)?))
    } else {
        free_match(csap, matched.layers);
        Ok(None)
    }
}

/// 一次接收的参数
#[derive(Debug, Clone, Copy)]
pub(crate) struct RecvLimits {
    /// 匹配多少个报文后结束，0 表示不限
    pub num: u64,
    pub deadline: Option<Instant>,
    pub results: bool,
}

/// 接收循环：读报文、匹配、保存结果，直到数量达到、超时或被停止
#[tracing::instrument(skip_all, fields(csap = %csap.id(), num = limits.num))]
pub(crate) fn run_recv(
    csap: &Csap,
    pattern: &Pattern,
    limits: RecvLimits,
    commands: Option<&Receiver<TrafficCmd>>,
) -> Result<()> {
    csap.with_medium(|m| m.prepare_recv())?;
    let result = recv_loop(csap, pattern, limits, commands);
    if let Err(e) = csap.with_medium(|m| m.shutdown_recv()) {
        warn!(csap = %csap.id(), error = %e, "关闭接收失败");
    }
    let got = csap.counters().packets;
    match &result {
        Ok(()) => info!(csap = %csap.id(), got, "接收结束"),
        Err(e) => warn!(csap = %csap.id(), got, error = %e, "接收中止"),
    }
    result
}

fn recv_loop(csap: &Csap, pattern: &Pattern, limits: RecvLimits, commands: Option<&Receiver<TrafficCmd>>) -> Result<()> {
    let latency = csap.params().stop_latency;
    let mut matched = 0u64;
    loop {
        if let Some(cmd) = stop_requested(commands) {
            debug!(csap = %csap.id(), ?cmd, matched, "接收被停止");
            return Ok(());
        }
        let wait = match limits.deadline {
            Some(d) => {
                let left = d.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    // 不限数量时超时即正常结束
                    return if limits.num == 0 { Ok(()) } else { Err(TadError::TimedOut) };
                }
                left.min(latency)
            }
            None => latency,
        };

        let pkt = match csap.with_medium(|m| m.read(wait)) {
            Ok(pkt) => pkt,
            Err(TadError::TimedOut) => continue,
            Err(e) => return Err(e),
        };
        if csap.dump_packets() {
            dump_hex("收到报文", &pkt.to_vec());
        }
        match pattern.match_packet(csap, &pkt) {
            Ok(m) => {
                if let Some(result) = handle_matched(csap, &pkt, m, limits.results)? {
                    csap.push_result(result);
                }
                csap.notify();
                matched += 1;
                if limits.num > 0 && matched >= limits.num {
                    return Ok(());
                }
            }
            Err(e) if e.is_recoverable() => trace!(csap = %csap.id(), len = pkt.len(), "报文不匹配"),
            Err(e) => return Err(e),
        }
    }
}
