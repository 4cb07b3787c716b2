//! 以太网层（802.1d 头部）
//!
//! 作为 CSAP 的读写层时由介质工厂提供 [`Medium`]。

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, trace, warn};

use crate::asn::AsnValue;
use crate::bps::{BpsDefault, BpsField, BpsFragData, BpsFragDef};
use crate::csap::{Csap, LayerCaps, LayerData, MatchLayer, Opaque, ProtocolSupport, TeProto};
use crate::du::{DataUnit, TmplArg};
use crate::error::{Result, TadError};
use crate::medium::Medium;
use crate::pkt::{FragMode, Packet, Packets, Segment};

pub const ETH_PROTO: &str = "eth";

pub const ETHERTYPE_IP: i32 = 0x0800;
pub const ETHERTYPE_ARP: i32 = 0x0806;

/// 不含 FCS 的最短帧长
pub const ETH_MIN_FRAME: usize = 60;

const ETHER_TYPE: usize = 2;

static ETH_HDR: [BpsField; 3] = [
    BpsField::octets("dst-addr", 48).with_defaults(BpsDefault::Nds("remote-addr"), BpsDefault::Nds("local-addr")),
    BpsField::octets("src-addr", 48).with_defaults(BpsDefault::Nds("local-addr"), BpsDefault::Nds("remote-addr")),
    BpsField::simple("ether-type", 16).with_defaults(BpsDefault::Nds("ether-type"), BpsDefault::Nds("ether-type")),
];

/// 为 CSAP 创建介质
pub type MediumFactory = Arc<dyn Fn(&Csap) -> Result<Box<dyn Medium>> + Send + Sync>;

#[derive(Debug)]
pub struct EthLayerData {
    hdr: BpsFragDef,
}

impl EthLayerData {
    pub fn hdr(&self) -> &BpsFragDef {
        &self.hdr
    }
}

#[derive(Default)]
pub struct EthSupport {
    medium: Option<MediumFactory>,
}

impl EthSupport {
    /// 没有介质：只能在内存中生成与匹配
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_medium(factory: MediumFactory) -> Self {
        Self { medium: Some(factory) }
    }

    fn layer_data<'a>(&self, csap: &'a Csap, layer: usize) -> Result<&'a EthLayerData> {
        csap.specific::<EthLayerData>(layer)
            .ok_or_else(|| TadError::invalid(format!("CSAP {} layer {layer} is not initialised", csap.id())))
    }
}

/// 按上层协议推断以太网类型
fn guess_ether_type(upper: TeProto) -> Option<i32> {
    match upper {
        TeProto::Ip4 => Some(ETHERTYPE_IP),
        TeProto::Arp => Some(ETHERTYPE_ARP),
        _ => None,
    }
}

impl ProtocolSupport for EthSupport {
    fn proto(&self) -> &str {
        ETH_PROTO
    }

    fn caps(&self) -> LayerCaps {
        LayerCaps::all()
    }

    fn init(&self, csap: &Csap, layer: usize) -> Result<Option<LayerData>> {
        let nds = csap.layer(layer).map(|l| l.nds());
        let mut hdr = BpsFragDef::init("eth-hdr", &ETH_HDR, nds)?;

        let unset = hdr.tx_default(ETHER_TYPE).is_some_and(DataUnit::is_undef)
            && hdr.rx_default(ETHER_TYPE).is_some_and(DataUnit::is_undef);
        if layer > 0 && unset {
            let upper = csap.layers()[layer - 1].proto_tag();
            if let Some(t) = guess_ether_type(upper) {
                info!(csap = %csap.id(), layer, ether_type = format_args!("{t:#06x}"), "推断以太网类型");
                hdr.set_defaults(ETHER_TYPE, DataUnit::I32(t), DataUnit::I32(t));
            }
        }
        Ok(Some(Box::new(EthLayerData { hdr })))
    }

    fn get_param(&self, csap: &Csap, layer: usize, param: &str) -> Option<String> {
        match param {
            "local-addr" | "remote-addr" => {
                let nds = csap.layer(layer)?.nds();
                let v = nds.field(param)?;
                let bytes = v.as_octets().or_else(|| v.as_choice()?.1.as_octets())?;
                Some(
                    bytes
                        .iter()
                        .map(|b| format!("{b:02x}"))
                        .collect::<Vec<_>>()
                        .join(":"),
                )
            }
            _ => None,
        }
    }

    fn confirm_tmpl(&self, csap: &Csap, layer: usize, layer_pdu: &mut AsnValue) -> Result<Option<Opaque>> {
        let proto = self.layer_data(csap, layer)?;
        let data = proto.hdr.nds_to_data_units(Some(layer_pdu))?;
        proto.hdr.confirm_send(&data)?;
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
            .and_then(|o| o.downcast_ref::<BpsFragData>())
            .ok_or_else(|| TadError::invalid("Ethernet template is not confirmed"))?;

        let bitlen = proto.hdr.data_bitlen(Some(data));
        if bitlen % 8 != 0 {
            return Err(TadError::unsupported(format!("Ethernet header of {bitlen} bits")));
        }
        let mut buf = vec![0u8; bitlen / 8];
        let mut bitoff = 0;
        proto.hdr.gen_bin(data, args, &mut buf, &mut bitoff, bitlen)?;

        pdus.move_from(sdus);
        pdus.prepend_shared_seg(Bytes::from(buf), None);
        pdus.enumerate(|pkt, _| {
            let short = ETH_MIN_FRAME.saturating_sub(pkt.len());
            if short > 0 {
                trace!(len = pkt.len(), pad = short, "以太网帧补零");
                pkt.append_seg(Segment::zeroed(short));
            }
            Ok(())
        })
    }

    fn confirm_ptrn(&self, csap: &Csap, layer: usize, layer_pdu: &mut AsnValue) -> Result<Option<Opaque>> {
        let proto = self.layer_data(csap, layer)?;
        Ok(Some(Box::new(proto.hdr.nds_to_data_units(Some(layer_pdu))?)))
    }

    fn match_pre(&self, csap: &Csap, layer: usize, meta: &mut MatchLayer) -> Result<()> {
        let proto = self.layer_data(csap, layer)?;
        meta.opaque = Some(Box::new(proto.hdr.match_pre()));
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
        let ptrn = ptrn_opaque.and_then(|o| o.downcast_ref::<BpsFragData>());
        let pkt_data = meta
            .opaque
            .as_mut()
            .and_then(|o| o.downcast_mut::<BpsFragData>())
            .ok_or_else(|| TadError::invalid("Ethernet match state is missing"))?;

        let mut bitoff = 0;
        proto.hdr.match_do(ptrn, pkt_data, pdu, &mut bitoff)?;
        let off = bitoff / 8;
        *sdu = pdu.get_frag(off, pdu.len() - off, FragMode::Error)?;
        Ok(())
    }

    fn match_post(&self, csap: &Csap, layer: usize, meta: &mut MatchLayer) -> Result<()> {
        let proto = self.layer_data(csap, layer)?;
        let MatchLayer { opaque, pkt, nds } = meta;
        let pkt_data = opaque
            .as_mut()
            .and_then(|o| o.downcast_mut::<BpsFragData>())
            .ok_or_else(|| TadError::invalid("Ethernet match state is missing"))?;
        let mut result = AsnValue::empty();
        let mut bitoff = 0;
        proto.hdr.match_post(pkt_data, pkt, &mut bitoff, &mut result)?;
        *nds = Some(result);
        Ok(())
    }

    /// 应答模式：源、目的地址互换
    fn generate_pattern(&self, _csap: &Csap, _layer: usize, tmpl_pdu: &AsnValue) -> Result<AsnValue> {
        let mut ptrn = AsnValue::empty();
        for (from, to) in [("src-addr", "dst-addr"), ("dst-addr", "src-addr")] {
            if let Some(v) = tmpl_pdu.field(from) {
                ptrn.set_field(to, v.clone())?;
            }
        }
        if let Some(v) = tmpl_pdu.field("ether-type") {
            ptrn.set_field("ether-type", v.clone())?;
        }
        Ok(ptrn)
    }

    fn rw_init(&self, csap: &Csap) -> Result<Option<Box<dyn Medium>>> {
        match &self.medium {
            Some(factory) => {
                let medium = factory(csap)?;
                debug!(csap = %csap.id(), medium = medium.name(), "📬 介质已就绪");
                Ok(Some(medium))
            }
            None => Ok(None),
        }
    }

    fn rw_destroy(&self, csap: &Csap, mut medium: Box<dyn Medium>) -> Result<()> {
        let send = medium.shutdown_send();
        let recv = medium.shutdown_recv();
        if let Err(e) = &send {
            warn!(csap = %csap.id(), error = %e, "关闭发送失败");
        }
        send.and(recv)
    }
}
