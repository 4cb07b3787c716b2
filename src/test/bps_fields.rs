use crate::asn::AsnValue;
use crate::bps::{BpsDefault, BpsField, BpsFragDef};
use crate::du::{DataUnit, TmplArg};
use crate::error::ErrorKind;
use crate::pkt::Packet;

static DEMO: [BpsField; 4] = [
    BpsField::simple("version", 4),
    BpsField::simple("flags", 4).with_defaults(BpsDefault::Const(0x5), BpsDefault::None),
    BpsField::simple("port", 16).with_defaults(BpsDefault::Nds("port"), BpsDefault::Nds("port")),
    BpsField::octets("tail", 0),
];

fn def(layer_nds: &str) -> BpsFragDef {
    let nds = AsnValue::from_text(layer_nds).unwrap();
    BpsFragDef::init("demo", &DEMO, Some(&nds)).unwrap()
}

#[test]
fn bps_defaults_resolve_from_layer_nds() {
    let d = def("{ port 8080 }");
    assert_eq!(d.len(), 4);
    assert_eq!(d.index_of("port"), Some(2));
    assert_eq!(d.tx_default(1), Some(&DataUnit::I32(5)));
    assert_eq!(d.tx_default(2), Some(&DataUnit::I32(8080)));
    assert_eq!(d.rx_default(2), Some(&DataUnit::I32(8080)));
    assert_eq!(d.rx_default(0), Some(&DataUnit::Undef));
    assert_eq!(d.fixed_bitlen(), 24);

    let with_choice = def("{ port plain:53 }");
    assert_eq!(with_choice.tx_default(2), Some(&DataUnit::I32(53)));
}

#[test]
fn bps_confirm_send_requires_value_or_default() {
    let d = def("{}");
    let pdu = AsnValue::from_text("{ version plain:4, tail plain:'01'H }").unwrap();
    let data = d.nds_to_data_units(Some(&pdu)).unwrap();
    match d.confirm_send(&data) {
        Err(e) => {
            assert_eq!(e.kind(), ErrorKind::MissingNds);
            assert!(e.to_string().contains("port"));
        }
        Ok(()) => panic!("port has neither value nor default"),
    }

    let d = def("{ port 1 }");
    assert!(d.confirm_send(&data).is_ok());
}

#[test]
fn bps_gen_bin_packs_unaligned_fields_and_evaluates_args() {
    let d = def("{ port 1 }");
    let pdu = AsnValue::from_text(
        r#"{ version plain:4, port script:"expr:($0 * 2)", tail plain:'ABCD'H }"#,
    )
    .unwrap();
    let data = d.nds_to_data_units(Some(&pdu)).unwrap();
    let bitlen = d.data_bitlen(Some(&data));
    assert_eq!(bitlen, 24 + 16);

    let mut buf = vec![0u8; bitlen / 8];
    let mut bitoff = 0;
    d.gen_bin(&data, &[TmplArg::Int(0x1234)], &mut buf, &mut bitoff, bitlen)
        .unwrap();
    assert_eq!(bitoff, bitlen);
    assert_eq!(buf, vec![0x45, 0x24, 0x68, 0xab, 0xcd]);

    let mut short = vec![0u8; 2];
    let mut bitoff = 0;
    let err = d
        .gen_bin(&data, &[TmplArg::Int(1)], &mut short, &mut bitoff, 16)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn bps_match_reads_only_constrained_fields() {
    let d = def("{}");
    let pkt = Packet::from_bytes(vec![0x45, 0x00, 0x35, 0xff]);

    let ptrn_pdu = AsnValue::from_text("{ port plain:53 }").unwrap();
    let ptrn = d.nds_to_data_units(Some(&ptrn_pdu)).unwrap();
    let mut got = d.match_pre();
    let mut bitoff = 0;
    d.match_do(Some(&ptrn), &mut got, &pkt, &mut bitoff).unwrap();
    assert_eq!(bitoff, 24);
    assert_eq!(got.get(2), Some(&DataUnit::I32(53)));
    // version 不受约束，没有读出
    assert_eq!(got.get(0), Some(&DataUnit::I32(0)));

    let other_pdu = AsnValue::from_text("{ port plain:54 }").unwrap();
    let other = d.nds_to_data_units(Some(&other_pdu)).unwrap();
    let mut got = d.match_pre();
    let mut bitoff = 0;
    let err = d.match_do(Some(&other), &mut got, &pkt, &mut bitoff).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotMatch);

    let short = Packet::from_bytes(vec![0x45]);
    let mut got = d.match_pre();
    let mut bitoff = 0;
    let err = d.match_do(Some(&ptrn), &mut got, &short, &mut bitoff).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LessData);
}

#[test]
fn bps_match_post_builds_result_fields() {
    let d = def("{}");
    let pkt = Packet::from_bytes(vec![0x45, 0x00, 0x35, 0xaa, 0xbb]);
    let mut got = d.match_pre();
    got.set(3, DataUnit::Octs(vec![0; 2]));

    let mut bitoff = 0;
    let mut nds = AsnValue::empty();
    d.match_post(&mut got, &pkt, &mut bitoff, &mut nds).unwrap();
    assert_eq!(bitoff, 40);
    let want = AsnValue::from_text(
        "{ version plain:4, flags plain:5, port plain:53, tail plain:'AABB'H }",
    )
    .unwrap();
    assert_eq!(nds, want);
}
