//! PDU 序列校验与逐层确认
//!
//! 模板或模式中的 PDU 列表可以省略部分层。校验时计算把缺失层插回列表、
//! 同时保持顺序的方法数：恰好一种时补上空 PDU，零种或多种都是 NDS 错误。

use tracing::{debug, warn};

use crate::asn::AsnValue;
use crate::csap::{Csap, LayerCaps, Opaque};
use crate::error::{Result, TadError};

/// 确认发生在发送侧（模板）还是接收侧（模式）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Template,
    Pattern,
}

/// PDU 标签序列嵌入协议栈的方法数，2 表示“多于一种”
///
/// `ways[i][j]`：栈的后缀 `stack[i..]` 容纳 PDU 后缀 `pdus[j..]` 的方法数。
pub fn count_insertions(stack: &[&str], pdus: &[&str]) -> usize {
    let (d, p) = (stack.len(), pdus.len());
    if p > d {
        return 0;
    }
    let mut ways = vec![vec![0usize; p + 1]; d + 1];
    for row in ways.iter_mut() {
        row[p] = 1;
    }
    for i in (0..d).rev() {
        for j in (0..p).rev() {
            let mut n = ways[i + 1][j];
            if stack[i] == pdus[j] {
                n += ways[i + 1][j + 1];
            }
            ways[i][j] = n.min(2);
        }
    }
    ways[0][0]
}

fn pdu_label(pdu: &AsnValue) -> Result<&str> {
    pdu.choice_label()
        .ok_or_else(|| TadError::wrong_nds("PDU must be a choice labelled with its protocol"))
}

/// 把 `pdus`（SEQUENCE OF 层 PDU）补齐到 CSAP 的协议栈
///
/// 已经与栈一一对应的列表保持不变。
pub fn check_pdu_seq(csap: &Csap, pdus: &mut AsnValue) -> Result<()> {
    let stack = csap.protos();
    let items = pdus
        .items_mut()
        .ok_or_else(|| TadError::wrong_nds("'pdus' must be a list"))?;
    let labels = items.iter().map(pdu_label).collect::<Result<Vec<_>>>()?;

    if labels.len() > stack.len() {
        warn!(csap = %csap.id(), pdus = labels.len(), depth = stack.len(), "PDU 多于协议栈层数");
        return Err(TadError::wrong_nds(format!(
            "{} PDUs for a {}-layer CSAP",
            labels.len(),
            stack.len()
        )));
    }
    match count_insertions(&stack, &labels) {
        0 => {
            warn!(csap = %csap.id(), ?labels, ?stack, "PDU 序列与协议栈不符");
            return Err(TadError::wrong_nds(format!("PDUs {labels:?} do not fit stack {stack:?}")));
        }
        1 => {}
        _ => {
            warn!(csap = %csap.id(), ?labels, ?stack, "PDU 序列有歧义");
            return Err(TadError::wrong_nds(format!("PDUs {labels:?} are ambiguous for stack {stack:?}")));
        }
    }
    if labels.len() == stack.len() {
        return Ok(());
    }

    // 唯一嵌入时，自左向右贪心匹配得到的就是它
    let mut filled = Vec::with_capacity(stack.len());
    let mut given = std::mem::take(items).into_iter().peekable();
    for proto in &stack {
        let take = given
            .peek()
            .and_then(|p| p.choice_label())
            .is_some_and(|l| l == *proto);
        if take {
            filled.extend(given.next());
        } else {
            debug!(csap = %csap.id(), proto, at = filled.len(), "补充空 PDU");
            filled.push(AsnValue::from_text(&format!("{proto}:{{}}"))?);
        }
    }
    *items = filled;
    Ok(())
}

/// 校验 PDU 序列后逐层调用 confirm，返回每层的不透明状态
///
/// 任一层失败时已产生的状态立即释放。
#[tracing::instrument(skip(csap, pdus), fields(csap = %csap.id()))]
pub fn confirm_pdus(csap: &Csap, pdus: &mut AsnValue, side: Side) -> Result<Vec<Option<Opaque>>> {
    check_pdu_seq(csap, pdus)?;
    let items = pdus
        .items_mut()
        .ok_or_else(|| TadError::wrong_nds("'pdus' must be a list"))?;

    let need = match side {
        Side::Template => LayerCaps::SEND,
        Side::Pattern => LayerCaps::RECV,
    };
    let mut opaques = Vec::with_capacity(csap.depth());
    for (layer, item) in items.iter_mut().enumerate() {
        let support = csap.layers()[layer].support();
        let result = if !support.caps().contains(need) {
            Err(TadError::unsupported(format!("'{}' cannot be used on {side:?} side", support.proto())))
        } else {
            let pdu = item
                .as_choice_mut()
                .map(|(_, v)| v)
                .ok_or_else(|| TadError::wrong_nds("PDU must be a choice"));
            pdu.and_then(|pdu| match side {
                Side::Template => support.confirm_tmpl(csap, layer, pdu),
                Side::Pattern => support.confirm_ptrn(csap, layer, pdu),
            })
        };
        match result {
            Ok(opaque) => opaques.push(opaque),
            Err(e) => {
                warn!(csap = %csap.id(), layer, proto = support.proto(), error = %e, "层确认失败");
                release_opaques(csap, side, opaques);
                return Err(e);
            }
        }
    }
    Ok(opaques)
}

/// 释放 confirm 产生的状态
pub fn release_opaques(csap: &Csap, side: Side, opaques: Vec<Option<Opaque>>) {
    for (layer, opaque) in opaques.into_iter().enumerate() {
        let (Some(opaque), Some(l)) = (opaque, csap.layer(layer)) else {
            continue;
        };
        match side {
            Side::Template => l.support().release_tmpl(csap, layer, opaque),
            Side::Pattern => l.support().release_ptrn(csap, layer, opaque),
        }
    }
}
