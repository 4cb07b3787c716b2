use std::sync::Arc;

use crate::asn::AsnValue;
use crate::config::TadConfig;
use crate::csap::Csap;
use crate::error::ErrorKind;
use crate::pkt::Packet;
use crate::tad::Tad;
use crate::traffic::{Pattern, TmplUnit, build_result};

const REQUEST: &str = "arp:{ hw-type plain:1, proto-type plain:2048, hw-size plain:6, \
     proto-size plain:4, opcode plain:1, snd-hw-addr plain:'AABBCCDDEEFF'H, \
     snd-proto-addr plain:'0A000001'H, tgt-hw-addr plain:'000000000000'H, \
     tgt-proto-addr plain:'0A000002'H }";

const REQUEST_BYTES: [u8; 28] = [
    0x00, 0x01, 0x08, 0x00, 0x06, 0x04, 0x00, 0x01, // 头部
    0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff, 0x0a, 0x00, 0x00, 0x01, // 发送方
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0a, 0x00, 0x00, 0x02, // 目标
];

fn csap(type_str: &str, nds: Option<&str>) -> (Tad, Arc<Csap>) {
    let tad = Tad::with_default_protocols(TadConfig::default()).unwrap();
    let nds = nds.map(|t| AsnValue::from_text(t).unwrap());
    let id = tad.csap_create(type_str, nds.as_ref()).unwrap();
    let csap = tad.csap_find(id).unwrap();
    (tad, csap)
}

fn unit(pdus: &str) -> AsnValue {
    AsnValue::from_text(&format!("{{ pdus {{ {pdus} }} }}")).unwrap()
}

#[test]
fn arp_request_generates_28_bytes() {
    let (tad, csap) = csap("arp", None);
    let tmpl = TmplUnit::confirm(&csap, &unit(REQUEST)).unwrap();
    let pkts = tmpl.generate(&csap, tad.symbols()).unwrap();
    assert_eq!(pkts.len(), 1);
    let pkt = pkts.first().unwrap();
    assert_eq!(pkt.len(), 28);
    assert_eq!(pkt.seg_num(), 1);
    assert_eq!(pkt.to_vec(), REQUEST_BYTES);
    tmpl.release(&csap);
}

#[test]
fn arp_address_sizes_follow_sender_addresses() {
    let (tad, csap) = csap("arp", None);
    let tmpl = TmplUnit::confirm(
        &csap,
        &unit(
            "arp:{ hw-type plain:1, proto-type plain:2048, opcode plain:1, \
             snd-hw-addr plain:'AABBCCDDEEFF'H, snd-proto-addr plain:'0A000001'H, \
             tgt-hw-addr plain:'000000000000'H, tgt-proto-addr plain:'0A000002'H }",
        ),
    )
    .unwrap();
    let pkts = tmpl.generate(&csap, tad.symbols()).unwrap();
    assert_eq!(pkts.first().unwrap().to_vec(), REQUEST_BYTES);
}

#[test]
fn arp_round_trip_reproduces_template_fields() {
    let (tad, csap) = csap("arp", None);
    let tmpl = TmplUnit::confirm(&csap, &unit(REQUEST)).unwrap();
    let pkt = tmpl.generate(&csap, tad.symbols()).unwrap().pop_front().unwrap();

    let pattern = Pattern::confirm(&csap, &unit(REQUEST)).unwrap();
    let matched = pattern.match_packet(&csap, &pkt).unwrap();
    assert_eq!(matched.unit, 0);
    assert!(matched.payload.is_empty());

    let result = build_result(&csap, matched).unwrap();
    assert_eq!(result.read_int("match-unit"), Some(0));
    assert!(result.read_int("received.seconds").unwrap() > 0);
    let want = AsnValue::from_text(REQUEST).unwrap();
    assert_eq!(result.descendant("pdus.0"), Some(&want));
    assert_eq!(result.read_octets("payload.#bytes"), Some(&[][..]));

    pattern.release(&csap);
    tmpl.release(&csap);
}

#[test]
fn arp_pattern_mismatch_and_short_packet() {
    let (_tad, csap) = csap("arp", None);
    let pattern = Pattern::confirm(&csap, &unit("arp:{ opcode plain:2 }")).unwrap();
    let request = Packet::from_bytes(REQUEST_BYTES.to_vec());
    assert_eq!(
        pattern.match_packet(&csap, &request).unwrap_err().kind(),
        ErrorKind::NotMatch
    );

    let any = Pattern::confirm(&csap, &unit("arp:{}")).unwrap();
    assert!(any.match_packet(&csap, &request).is_ok());
    // 地址部分被截断
    let short = Packet::from_bytes(REQUEST_BYTES[..20].to_vec());
    assert_eq!(any.match_packet(&csap, &short).unwrap_err().kind(), ErrorKind::NotMatch);
}

#[test]
fn arp_pattern_units_first_match_wins() {
    let (_tad, csap) = csap("arp", None);
    let nds = AsnValue::from_text(
        "{ { pdus { arp:{ opcode plain:2 } } }, { pdus { arp:{ opcode plain:1 } } }, { pdus { arp:{} } } }",
    )
    .unwrap();
    let pattern = Pattern::confirm(&csap, &nds).unwrap();
    assert_eq!(pattern.units().len(), 3);
    let matched = pattern
        .match_packet(&csap, &Packet::from_bytes(REQUEST_BYTES.to_vec()))
        .unwrap();
    assert_eq!(matched.unit, 1);
}

#[test]
fn arp_reply_pattern_swaps_addresses() {
    let (_tad, csap) = csap("arp", None);
    let tmpl_pdu = AsnValue::from_text(REQUEST).unwrap();
    let (_, body) = tmpl_pdu.as_choice().unwrap();
    let support = csap.layers()[0].support().clone();
    let ptrn = support.generate_pattern(&csap, 0, body).unwrap();
    assert_eq!(ptrn.read_int("opcode.#plain"), Some(2));
    assert_eq!(ptrn.read_octets("snd-proto-addr.#plain"), Some(&[10, 0, 0, 2][..]));
    assert_eq!(ptrn.read_octets("tgt-proto-addr.#plain"), Some(&[10, 0, 0, 1][..]));
    assert_eq!(
        ptrn.read_octets("tgt-hw-addr.#plain"),
        Some(&[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff][..])
    );
    assert!(ptrn.field("snd-hw-addr").is_none());
}

const ARP_ETH_NDS: &str = "{ layers { arp:{}, eth:{ local-addr plain:'020000000001'H, \
     remote-addr plain:'020000000002'H } } }";

#[test]
fn arp_over_eth_pads_and_guesses_ether_type() {
    let (tad, csap) = csap("arp.eth", Some(ARP_ETH_NDS));
    let tmpl = TmplUnit::confirm(&csap, &unit(REQUEST)).unwrap();
    assert_eq!(tmpl.pdus().items().unwrap().len(), 2);

    let pkt = tmpl.generate(&csap, tad.symbols()).unwrap().pop_front().unwrap();
    let frame = pkt.to_vec();
    assert_eq!(frame.len(), 60);
    assert_eq!(frame[..6], [0x02, 0, 0, 0, 0, 0x02]);
    assert_eq!(frame[6..12], [0x02, 0, 0, 0, 0, 0x01]);
    assert_eq!(frame[12..14], [0x08, 0x06]);
    assert_eq!(frame[14..42], REQUEST_BYTES);
    assert!(frame[42..].iter().all(|&b| b == 0));
    tmpl.release(&csap);
}

#[test]
fn arp_over_eth_matches_frames_addressed_to_us() {
    let (tad, csap) = csap("arp.eth", Some(ARP_ETH_NDS));
    let tmpl = TmplUnit::confirm(&csap, &unit(REQUEST)).unwrap();
    let sent = tmpl.generate(&csap, tad.symbols()).unwrap().pop_front().unwrap().to_vec();

    let pattern = Pattern::confirm(&csap, &unit("arp:{ opcode plain:1 }")).unwrap();
    // 自己发出的帧目的地址是对端，不匹配接收默认值
    assert_eq!(
        pattern.match_packet(&csap, &Packet::from_bytes(sent.clone())).unwrap_err().kind(),
        ErrorKind::NotMatch
    );

    let mut incoming = sent;
    let (dst, src) = incoming.split_at_mut(6);
    dst.swap_with_slice(&mut src[..6]);
    let matched = pattern.match_packet(&csap, &Packet::from_bytes(incoming)).unwrap();
    assert_eq!(matched.payload.len(), 60 - 14 - 28);

    let result = build_result(&csap, matched).unwrap();
    assert_eq!(
        result.read_octets("pdus.1.#eth.dst-addr.#plain"),
        Some(&[0x02, 0, 0, 0, 0, 0x01][..])
    );
    assert_eq!(result.read_int("pdus.1.#eth.ether-type.#plain"), Some(0x0806));
    assert_eq!(result.read_int("pdus.0.#arp.opcode.#plain"), Some(1));
    assert_eq!(result.read_octets("payload.#bytes").map(<[u8]>::len), Some(18));
}
