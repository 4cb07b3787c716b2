//! 发送：模板确认、逐层生成与发送循环

use std::sync::mpsc::Receiver;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use super::confirm::{Side, confirm_pdus, release_opaques};
use super::payload::{PayloadSpec, SymbolTable};
use crate::asn::AsnValue;
use crate::csap::{Csap, Opaque, TrafficCmd};
use crate::du::{IterStep, TmplArg, TmplArgs};
use crate::error::{Result, TadError};
use crate::logging::dump_hex;
use crate::pkt::{Packet, Packets};

/// 已确认的发送模板
pub struct TmplUnit {
    pdus: AsnValue,
    opaques: Vec<Option<Opaque>>,
    args: TmplArgs,
    payload: Option<PayloadSpec>,
    delay: Duration,
}

/// `delays` 可以是裸整数，也可以是 `plain:` 形式
fn read_delay(nds: &AsnValue) -> Result<Duration> {
    let Some(v) = nds.field("delays") else {
        return Ok(Duration::ZERO);
    };
    let ms = v
        .as_int()
        .or_else(|| v.as_choice().and_then(|(_, inner)| inner.as_int()))
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| TadError::wrong_nds("'delays' must be a non-negative number of milliseconds"))?;
    Ok(Duration::from_millis(ms))
}

impl TmplUnit {
    /// 确认模板：补齐并逐层确认 PDU，解析迭代参数、载荷与发送间隔
    #[tracing::instrument(skip(csap, nds), fields(csap = %csap.id()))]
    pub fn confirm(csap: &Csap, nds: &AsnValue) -> Result<Self> {
        let mut pdus = nds
            .field("pdus")
            .cloned()
            .ok_or_else(|| TadError::wrong_nds("template has no 'pdus'"))?;
        let opaques = confirm_pdus(csap, &mut pdus, Side::Template)?;

        let rest = (|| -> Result<_> {
            let args = TmplArgs::from_nds(nds.field("arg-sets"))?;
            let payload = nds.field("payload").map(PayloadSpec::from_asn).transpose()?;
            if matches!(payload, Some(PayloadSpec::Mask { .. })) {
                return Err(TadError::wrong_nds("payload cannot be specified using mask"));
            }
            Ok((args, payload, read_delay(nds)?))
        })();
        match rest {
            Ok((args, payload, delay)) => Ok(Self {
                pdus,
                opaques,
                args,
                payload,
                delay,
            }),
            Err(e) => {
                warn!(csap = %csap.id(), error = %e, "模板预处理失败");
                release_opaques(csap, Side::Template, opaques);
                Err(e)
            }
        }
    }

    /// 补齐后的 PDU 列表
    pub fn pdus(&self) -> &AsnValue {
        &self.pdus
    }

    pub fn args(&self) -> &[TmplArg] {
        self.args.args()
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// 推进迭代参数
    pub fn iterate(&mut self) -> IterStep {
        self.args.iterate()
    }

    /// 按当前迭代参数生成报文
    pub fn generate(&self, csap: &Csap, symbols: &SymbolTable) -> Result<Packets> {
        let payload = match &self.payload {
            Some(p) => p.generate(csap.id(), symbols, self.args.args())?,
            None => Packet::new(),
        };
        generate_pkts(csap, &self.pdus, &self.opaques, self.args.args(), payload)
    }

    pub fn release(self, csap: &Csap) {
        release_opaques(csap, Side::Template, self.opaques);
    }
}

/// 自最外层向线路侧逐层生成：每层消费上层的 SDU，产出本层 PDU
pub fn generate_pkts(
    csap: &Csap,
    pdus: &AsnValue,
    opaques: &[Option<Opaque>],
    args: &[TmplArg],
    payload: Packet,
) -> Result<Packets> {
    let items = pdus
        .items()
        .ok_or_else(|| TadError::wrong_nds("'pdus' must be a list"))?;
    if items.len() != csap.depth() || opaques.len() != csap.depth() {
        return Err(TadError::invalid("template is not confirmed for this CSAP"));
    }

    let mut sdus = Packets::from(payload);
    for (layer, item) in items.iter().enumerate() {
        let support = csap.layers()[layer].support();
        let tmpl_pdu = item
            .as_choice()
            .map(|(_, v)| v)
            .ok_or_else(|| TadError::wrong_nds("PDU must be a choice"))?;
        let mut out = Packets::new();
        support
            .generate_pkts(csap, layer, tmpl_pdu, opaques[layer].as_ref(), args, &mut sdus, &mut out)
            .inspect_err(|e| {
                warn!(csap = %csap.id(), layer, proto = support.proto(), error = %e, "报文生成失败");
            })?;
        trace!(csap = %csap.id(), layer, pkts = out.len(), bytes = out.total_len(), "层生成完成");
        sdus = out;
    }
    Ok(sdus)
}

/// 写出一组报文并计数
pub(crate) fn write_pkts(csap: &Csap, pkts: Packets) -> Result<usize> {
    let mut n = 0;
    for pkt in pkts {
        if csap.dump_packets() {
            dump_hex("发送报文", &pkt.to_vec());
        }
        csap.with_medium(|m| m.write(&pkt))?;
        csap.lock_status().account(pkt.len(), true);
        n += 1;
    }
    Ok(n)
}

/// 控制面是否要求停止
pub(crate) fn stop_requested(commands: Option<&Receiver<TrafficCmd>>) -> Option<TrafficCmd> {
    commands.and_then(|rx| rx.try_recv().ok())
}

/// 发送循环：遍历全部迭代参数组合，两次发送之间等待 `delays`
#[tracing::instrument(skip_all, fields(csap = %csap.id()))]
pub(crate) fn run_send(
    csap: &Csap,
    unit: &mut TmplUnit,
    symbols: &SymbolTable,
    commands: Option<&Receiver<TrafficCmd>>,
) -> Result<()> {
    csap.with_medium(|m| m.prepare_send())?;
    let result = send_loop(csap, unit, symbols, commands);
    if let Err(e) = csap.with_medium(|m| m.shutdown_send()) {
        warn!(csap = %csap.id(), error = %e, "关闭发送失败");
    }
    let sent = csap.counters().packets;
    match &result {
        Ok(()) => info!(csap = %csap.id(), sent, "发送结束"),
        Err(e) => warn!(csap = %csap.id(), sent, error = %e, "发送中止"),
    }
    result
}

fn send_loop(
    csap: &Csap,
    unit: &mut TmplUnit,
    symbols: &SymbolTable,
    commands: Option<&Receiver<TrafficCmd>>,
) -> Result<()> {
    loop {
        if let Some(cmd) = stop_requested(commands) {
            debug!(csap = %csap.id(), ?cmd, "发送被停止");
            return Ok(());
        }
        let pkts = unit.generate(csap, symbols)?;
        write_pkts(csap, pkts)?;
        if unit.iterate() == IterStep::Finished {
            return Ok(());
        }
        if !unit.delay.is_zero() {
            thread::sleep(unit.delay);
        }
    }
}
