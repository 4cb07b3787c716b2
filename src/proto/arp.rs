//! ARP 层
//!
//! 定长头部 `hdr` 加四个变长地址字段 `addrs`。地址宽度在发送侧默认取
//! 发送方地址的长度，在接收侧由已匹配的 `hw-size` / `proto-size` 决定。

use bytes::Bytes;
use tracing::{debug, warn};

use crate::asn::AsnValue;
use crate::bps::{BpsDefault, BpsField, BpsFragData, BpsFragDef};
use crate::csap::{Csap, LayerCaps, LayerData, MatchLayer, Opaque, ProtocolSupport};
use crate::du::{DataUnit, TmplArg};
use crate::error::{Result, TadError};
use crate::pkt::{FragMode, Packet, Packets};

pub const ARP_PROTO: &str = "arp";

/// ARP 应答的操作码
pub const ARP_OP_REPLY: i64 = 2;

const HW_SIZE: usize = 2;
const PROTO_SIZE: usize = 3;

const SND_HW: usize = 0;
const SND_PROTO: usize = 1;
const TGT_HW: usize = 2;
const TGT_PROTO: usize = 3;

static ARP_HDR: [BpsField; 5] = [
    BpsField::simple("hw-type", 16),
    BpsField::simple("proto-type", 16),
    BpsField::simple("hw-size", 8)
        .with_defaults(BpsDefault::User, BpsDefault::None)
        .force_read(),
    BpsField::simple("proto-size", 8)
        .with_defaults(BpsDefault::User, BpsDefault::None)
        .force_read(),
    BpsField::simple("opcode", 16),
];

static ARP_ADDRS: [BpsField; 4] = [
    BpsField::octets("snd-hw-addr", 0),
    BpsField::octets("snd-proto-addr", 0),
    BpsField::octets("tgt-hw-addr", 0),
    BpsField::octets("tgt-proto-addr", 0),
];

/// 层私有数据
#[derive(Debug)]
pub struct ArpLayerData {
    hdr: BpsFragDef,
    addrs: BpsFragDef,
}

/// 模板或模式确认后的字段取值
#[derive(Debug, Default)]
struct ArpPduData {
    hdr: BpsFragData,
    addrs: BpsFragData,
}

#[derive(Debug, Default)]
pub struct ArpSupport;

impl ArpSupport {
    pub fn new() -> Self {
        Self
    }

    fn layer_data<'a>(&self, csap: &'a Csap, layer: usize) -> Result<&'a ArpLayerData> {
        csap.specific::<ArpLayerData>(layer)
            .ok_or_else(|| TadError::invalid(format!("CSAP {} layer {layer} is not initialised", csap.id())))
    }

    fn pdu_data(&self, proto: &ArpLayerData, layer_pdu: &AsnValue) -> Result<ArpPduData> {
        Ok(ArpPduData {
            hdr: proto.hdr.nds_to_data_units(Some(layer_pdu))?,
            addrs: proto.addrs.nds_to_data_units(Some(layer_pdu))?,
        })
    }
}

fn addr_len(addrs: &BpsFragData, i: usize) -> Option<usize> {
    addrs.get(i).and_then(DataUnit::as_bytes).map(<[u8]>::len)
}

impl ProtocolSupport for ArpSupport {
    fn proto(&self) -> &str {
        ARP_PROTO
    }

    fn caps(&self) -> LayerCaps {
        LayerCaps::NO_RW | LayerCaps::PATTERN
    }

    fn init(&self, csap: &Csap, layer: usize) -> Result<Option<LayerData>> {
        let nds = csap.layer(layer).map(|l| l.nds());
        let data = ArpLayerData {
            hdr: BpsFragDef::init("arp-hdr", &ARP_HDR, nds)?,
            addrs: BpsFragDef::init("arp-addrs", &ARP_ADDRS, nds)?,
        };
        Ok(Some(Box::new(data)))
    }

    fn confirm_tmpl(&self, csap: &Csap, layer: usize, layer_pdu: &mut AsnValue) -> Result<Option<Opaque>> {
        let proto = self.layer_data(csap, layer)?;
        let mut data = self.pdu_data(proto, layer_pdu)?;

        // 地址宽度未给出时取发送方地址的长度
        for (size, addr) in [(HW_SIZE, SND_HW), (PROTO_SIZE, SND_PROTO)] {
            if data.hdr.get(size).is_some_and(DataUnit::is_undef) {
                if let Some(len) = addr_len(&data.addrs, addr) {
                    data.hdr.set(size, DataUnit::I32(len as i32));
                }
            }
        }

        proto.hdr.confirm_send(&data.hdr)?;
        proto.addrs.confirm_send(&data.addrs)?;
        Ok(Some(Box::new(data)))
    }

    fn generate_pkts(
        &self,
        csap: &Csap,
        layer: usize,
        _tmpl_pdu: &AsnValue,
        opaque: Option<&Opaque>,
        args: &[TmplArg],
        sdus: &mut Packets,
        pdus: &mut Packets,
    ) -> Result<()> {
        let proto = self.layer_data(csap, layer)?;
        let data = opaque
            .and_then(|o| o.downcast_ref::<ArpPduData>())
            .ok_or_else(|| TadError::invalid("ARP template is not confirmed"))?;

        let hdr_bitlen = proto.hdr.data_bitlen(Some(&data.hdr));
        let addrs_bitlen = proto.addrs.data_bitlen(Some(&data.addrs));
        let total = hdr_bitlen + addrs_bitlen;
        if hdr_bitlen == 0 || addrs_bitlen == 0 || total % 8 != 0 {
            warn!(csap = %csap.id(), layer, hdr_bitlen, addrs_bitlen, "ARP 头部长度异常");
            return Err(TadError::invalid(format!(
                "ARP header of {hdr_bitlen}+{addrs_bitlen} bits"
            )));
        }

        let mut buf = vec![0u8; total / 8];
        let mut bitoff = 0;
        proto.hdr.gen_bin(&data.hdr, args, &mut buf, &mut bitoff, total)?;
        proto.addrs.gen_bin(&data.addrs, args, &mut buf, &mut bitoff, total)?;
        if bitoff != total {
            return Err(TadError::invalid(format!(
                "ARP header ends at bit {bitoff}, expected {total}"
            )));
        }

        pdus.move_from(sdus);
        pdus.prepend_shared_seg(Bytes::from(buf), None);
        Ok(())
    }

    fn confirm_ptrn(&self, csap: &Csap, layer: usize, layer_pdu: &mut AsnValue) -> Result<Option<Opaque>> {
        let proto = self.layer_data(csap, layer)?;
        Ok(Some(Box::new(self.pdu_data(proto, layer_pdu)?)))
    }

    fn match_pre(&self, csap: &Csap, layer: usize, meta: &mut MatchLayer) -> Result<()> {
        let proto = self.layer_data(csap, layer)?;
        meta.opaque = Some(Box::new(ArpPduData {
            hdr: proto.hdr.match_pre(),
            addrs: proto.addrs.match_pre(),
        }));
        Ok(())
    }

    fn match_do(
        &self,
        csap: &Csap,
        layer: usize,
        _ptrn_pdu: &AsnValue,
        ptrn_opaque: Option<&Opaque>,
        meta: &mut MatchLayer,
        pdu: &Packet,
        sdu: &mut Packet,
    ) -> Result<()> {
        let proto = self.layer_data(csap, layer)?;
        let ptrn = ptrn_opaque.and_then(|o| o.downcast_ref::<ArpPduData>());
        let pkt_data = meta
            .opaque
            .as_mut()
            .and_then(|o| o.downcast_mut::<ArpPduData>())
            .ok_or_else(|| TadError::invalid("ARP match state is missing"))?;

        let mut bitoff = 0;
        proto.hdr.match_do(ptrn.map(|p| &p.hdr), &mut pkt_data.hdr, pdu, &mut bitoff)?;

        let width = |i: usize| -> Result<usize> {
            let v = pkt_data.hdr.get(i).map_or(Ok(0), |d| d.eval_int(&[]))?;
            Ok(v as usize)
        };
        let (hw, pr) = (width(HW_SIZE)?, width(PROTO_SIZE)?);
        for (i, len) in [(SND_HW, hw), (SND_PROTO, pr), (TGT_HW, hw), (TGT_PROTO, pr)] {
            pkt_data.addrs.set(i, DataUnit::Octs(vec![0; len]));
        }
        proto.addrs.match_do(ptrn.map(|p| &p.addrs), &mut pkt_data.addrs, pdu, &mut bitoff)?;

        let off = bitoff / 8;
        *sdu = pdu.get_frag(off, pdu.len() - off, FragMode::Error)?;
        debug!(csap = %csap.id(), layer, hw, pr, payload = sdu.len(), "ARP 匹配成功");
        Ok(())
    }

    fn match_post(&self, csap: &Csap, layer: usize, meta: &mut MatchLayer) -> Result<()> {
        let proto = self.layer_data(csap, layer)?;
        let MatchLayer { opaque, pkt, nds } = meta;
        let pkt_data = opaque
            .as_mut()
            .and_then(|o| o.downcast_mut::<ArpPduData>())
            .ok_or_else(|| TadError::invalid("ARP match state is missing"))?;

        let mut result = AsnValue::empty();
        let mut bitoff = 0;
        proto.hdr.match_post(&mut pkt_data.hdr, pkt, &mut bitoff, &mut result)?;
        proto.addrs.match_post(&mut pkt_data.addrs, pkt, &mut bitoff, &mut result)?;
        *nds = Some(result);
        Ok(())
    }

    /// 应答模式：操作码 2，双方协议地址互换，目标硬件地址为请求方
    fn generate_pattern(&self, _csap: &Csap, _layer: usize, tmpl_pdu: &AsnValue) -> Result<AsnValue> {
        let mut ptrn = AsnValue::empty();
        ptrn.set_field("opcode", AsnValue::new_choice("plain", AsnValue::Integer(ARP_OP_REPLY)))?;
        for (from, to) in [
            ("tgt-proto-addr", "snd-proto-addr"),
            ("snd-proto-addr", "tgt-proto-addr"),
            ("snd-hw-addr", "tgt-hw-addr"),
        ] {
            if let Some(v) = tmpl_pdu.field(from) {
                ptrn.set_field(to, v.clone())?;
            }
        }
        Ok(ptrn)
    }
}
