//! 收发控制操作
//!
//! 后台收发在单独的线程中运行，控制面经命令通道请求停止。同一 CSAP 同时
//! 只允许一个收发操作。

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::recv::{Pattern, RecvLimits, RecvTimeout, handle_matched, run_recv, unit_from_pdus};
use super::send::{TmplUnit, run_send};
use crate::asn::AsnValue;
use crate::csap::{Csap, CsapId, CsapState, TrafficCmd, TrafficOp};
use crate::error::{Result, TadError};
use crate::tad::Tad;

/// 接收操作的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecvReport {
    /// 匹配的报文数
    pub got: u64,
    /// 请求了结果时每个匹配报文一项
    pub results: Vec<AsnValue>,
}

fn finish(csap: &Csap, error: Option<&TadError>) {
    csap.lock_status().finish(error);
    csap.notify();
}

fn spawn_worker<F>(csap: &Arc<Csap>, what: &str, body: F) -> Result<()>
where
    F: FnOnce(&Csap) -> Result<()> + Send + 'static,
{
    let worker = csap.clone();
    let handle = thread::Builder::new()
        .name(format!("tad-{what}-{}", csap.id()))
        .spawn(move || {
            worker.lock_status().traffic_thread = Some(thread::current().id());
            let r = body(&worker);
            finish(&worker, r.as_ref().err());
            r
        });
    match handle {
        Ok(h) => {
            csap.set_worker(h);
            Ok(())
        }
        Err(e) => {
            csap.close_command_channel();
            csap.lock_status().reset_idle(TrafficOp::Idle);
            Err(e.into())
        }
    }
}

impl Tad {
    /// 开始发送
    ///
    /// `blocking` 为真时在调用线程上发完全部迭代并返回发送的报文数；否则在
    /// 后台发送并立即返回 0。
    #[tracing::instrument(skip(self, tmpl), fields(csap = %id))]
    pub fn trsend_start(&self, id: CsapId, tmpl: &AsnValue, blocking: bool) -> Result<u64> {
        let csap = self.csap(id)?;
        let mut flags = CsapState::SENDING;
        if blocking {
            flags |= CsapState::FOREGROUND;
        }
        csap.lock_status().begin(id.0, TrafficOp::Send, flags)?;

        let mut unit = match TmplUnit::confirm(&csap, tmpl) {
            Ok(u) => u,
            Err(e) => {
                csap.lock_status().reset_idle(TrafficOp::Idle);
                return Err(e);
            }
        };

        if blocking {
            let r = run_send(&csap, &mut unit, self.symbols(), None);
            unit.release(&csap);
            finish(&csap, r.as_ref().err());
            return r.map(|()| csap.counters().packets);
        }

        let rx = csap.open_command_channel();
        let symbols = self.symbols().clone();
        spawn_worker(&csap, "send", move |csap| {
            let r = run_send(csap, &mut unit, &symbols, Some(&rx));
            unit.release(csap);
            r
        })?;
        Ok(0)
    }

    /// 停止发送，返回已发送的报文数
    pub fn trsend_stop(&self, id: CsapId) -> Result<u64> {
        let csap = self.csap(id)?;
        csap.send_command(TrafficCmd::Stop);
        let r = csap.join_worker();
        csap.close_command_channel();
        let sent = {
            let mut st = csap.lock_status();
            let n = st.counters.packets;
            st.reset_idle(TrafficOp::Stop);
            n
        };
        info!(csap = %id, sent, "发送已停止");
        r.map(|()| sent)
    }

    /// 开始后台接收
    ///
    /// `num` 为 0 时不限数量，直到超时或被停止；`results` 为真时保存每个匹配
    /// 报文的结果 NDS。
    #[tracing::instrument(skip(self, pattern), fields(csap = %id))]
    pub fn trrecv_start(
        &self,
        id: CsapId,
        pattern: &AsnValue,
        num: u64,
        timeout: RecvTimeout,
        results: bool,
    ) -> Result<()> {
        let csap = self.csap(id)?;
        let mut flags = CsapState::RECEIVING;
        if results {
            flags |= CsapState::RESULTS;
        }
        csap.lock_status().begin(id.0, TrafficOp::Recv, flags)?;
        csap.clear_results();

        let pattern = match Pattern::confirm(&csap, pattern) {
            Ok(p) => p,
            Err(e) => {
                csap.lock_status().reset_idle(TrafficOp::Idle);
                return Err(e);
            }
        };
        let deadline = timeout.deadline(&csap);
        csap.lock_status().deadline = deadline;
        let limits = RecvLimits { num, deadline, results };

        let rx = csap.open_command_channel();
        spawn_worker(&csap, "recv", move |csap| {
            let r = run_recv(csap, &pattern, limits, Some(&rx));
            pattern.release(csap);
            r
        })
    }

    /// 取走目前为止的匹配结果，接收继续进行
    pub fn trrecv_get(&self, id: CsapId) -> Result<RecvReport> {
        let csap = self.csap(id)?;
        csap.lock_status().last_op = TrafficOp::Get;
        let got = csap.counters().packets;
        Ok(RecvReport {
            got,
            results: csap.drain_results(),
        })
    }

    /// 等待接收结束
    ///
    /// `timeout` 内未结束时返回 timed-out，接收继续进行。
    pub fn trrecv_wait(&self, id: CsapId, timeout: Option<Duration>) -> Result<RecvReport> {
        let csap = self.csap(id)?;
        if !csap.wait_complete(timeout) {
            debug!(csap = %id, "等待接收结束超时");
            return Err(TadError::TimedOut);
        }
        self.collect_recv(&csap, TrafficOp::Wait)
    }

    /// 停止接收并取走剩余结果
    pub fn trrecv_stop(&self, id: CsapId) -> Result<RecvReport> {
        let csap = self.csap(id)?;
        csap.send_command(TrafficCmd::Stop);
        self.collect_recv(&csap, TrafficOp::Stop)
    }

    fn collect_recv(&self, csap: &Csap, op: TrafficOp) -> Result<RecvReport> {
        let r = csap.join_worker();
        csap.close_command_channel();
        let got = {
            let mut st = csap.lock_status();
            let n = st.counters.packets;
            st.reset_idle(op);
            n
        };
        let results = csap.drain_results();
        info!(csap = %csap.id(), got, ?op, "接收已结束");
        r.map(|()| RecvReport { got, results })
    }

    /// 发送一个报文并等待应答
    ///
    /// 应答模式由各层的 `generate_pattern` 从模板推出。
    #[tracing::instrument(skip(self, tmpl), fields(csap = %id))]
    pub fn trsend_recv(
        &self,
        id: CsapId,
        tmpl: &AsnValue,
        timeout: RecvTimeout,
        results: bool,
    ) -> Result<RecvReport> {
        let csap = self.csap(id)?;
        let mut flags = CsapState::SENDING | CsapState::RECEIVING | CsapState::FOREGROUND;
        if results {
            flags |= CsapState::RESULTS;
        }
        csap.lock_status().begin(id.0, TrafficOp::SendRecv, flags)?;

        let r = TmplUnit::confirm(&csap, tmpl).and_then(|unit| {
            let r = reply_pattern(&csap, &unit).and_then(|pattern| {
                let r = self.exchange(&csap, &unit, &pattern, timeout, results);
                pattern.release(&csap);
                r
            });
            unit.release(&csap);
            r
        });
        finish(&csap, r.as_ref().err());
        r
    }

    fn exchange(
        &self,
        csap: &Csap,
        unit: &TmplUnit,
        pattern: &Pattern,
        timeout: RecvTimeout,
        results: bool,
    ) -> Result<RecvReport> {
        let first = unit
            .generate(csap, self.symbols())?
            .pop_front()
            .ok_or_else(|| TadError::invalid("template produced no packets"))?;
        let deadline = timeout.deadline(csap);
        let latency = csap.params().stop_latency;
        let wait = |deadline: Option<Instant>| -> Option<Duration> {
            match deadline {
                Some(d) => {
                    let left = d.saturating_duration_since(Instant::now());
                    (!left.is_zero()).then(|| left.min(latency))
                }
                None => Some(latency),
            }
        };

        csap.with_medium(|m| {
            m.prepare_send()?;
            m.prepare_recv()
        })?;
        let outcome = (|| -> Result<RecvReport> {
            let first_wait = wait(deadline).unwrap_or_default();
            let mut reply = csap.with_medium(|m| m.write_read(&first, first_wait));
            if matches!(reply, Ok(_) | Err(TadError::TimedOut)) {
                csap.lock_status().account_request(first.len());
            }
            loop {
                match reply {
                    Ok(pkt) => match pattern.match_packet(csap, &pkt) {
                        Ok(m) => {
                            let result = handle_matched(csap, &pkt, m, results)?;
                            return Ok(RecvReport {
                                got: 1,
                                results: result.into_iter().collect(),
                            });
                        }
                        Err(e) if e.is_recoverable() => {}
                        Err(e) => return Err(e),
                    },
                    Err(TadError::TimedOut) => {}
                    Err(e) => return Err(e),
                }
                let Some(w) = wait(deadline) else {
                    return Err(TadError::TimedOut);
                };
                reply = csap.with_medium(|m| m.read(w));
            }
        })();
        if let Err(e) = csap.with_medium(|m| {
            m.shutdown_send()?;
            m.shutdown_recv()
        }) {
            warn!(csap = %csap.id(), error = %e, "关闭介质失败");
        }
        outcome
    }
}

/// 由模板各层推出应答模式
fn reply_pattern(csap: &Csap, unit: &TmplUnit) -> Result<Pattern> {
    let items = unit
        .pdus()
        .items()
        .ok_or_else(|| TadError::wrong_nds("'pdus' must be a list"))?;
    let mut pdus = Vec::with_capacity(items.len());
    for (layer, item) in items.iter().enumerate() {
        let l = &csap.layers()[layer];
        let tmpl_pdu = item
            .as_choice()
            .map(|(_, v)| v)
            .ok_or_else(|| TadError::wrong_nds("PDU must be a choice"))?;
        let ptrn = l.support().generate_pattern(csap, layer, tmpl_pdu)?;
        pdus.push(AsnValue::new_choice(l.proto(), ptrn));
    }
    let unit = unit_from_pdus(csap, AsnValue::SequenceOf(pdus))?;
    Ok(Pattern::from_units(vec![unit]))
}
