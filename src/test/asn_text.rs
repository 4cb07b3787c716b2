use crate::asn::{AsnSyntax, AsnValue};
use crate::error::{ErrorKind, TadError};

#[test]
fn asn_text_parses_nested_template() {
    let v = AsnValue::from_text(
        r#"{ pdus { arp:{ opcode plain:1, snd-hw-addr plain:'aa bb:cc'H }, eth:{} }, name "t1" }"#,
    )
    .unwrap();

    assert_eq!(v.syntax(), AsnSyntax::Sequence);
    let pdus = v.field("pdus").and_then(AsnValue::items).unwrap();
    assert_eq!(pdus.len(), 2);
    assert_eq!(pdus[0].choice_label(), Some("arp"));
    assert_eq!(pdus[1].choice_label(), Some("eth"));
    assert_eq!(v.read_int("pdus.0.#arp.opcode.#plain"), Some(1));
    assert_eq!(
        v.read_octets("pdus.0.#arp.snd-hw-addr.#plain"),
        Some(&[0xaa, 0xbb, 0xcc][..])
    );
    assert_eq!(v.field("name").and_then(AsnValue::as_str), Some("t1"));
    // 选中的分支不对时路径不存在
    assert_eq!(v.descendant("pdus.0.#eth"), None);
}

#[test]
fn asn_text_reports_consumed_length() {
    let (v, used) = AsnValue::parse_text("42 trailing").unwrap();
    assert_eq!(v, AsnValue::Integer(42));
    assert_eq!(used, 2);

    match AsnValue::from_text("1 2") {
        Err(TadError::AsnParse { pos, .. }) => assert_eq!(pos, 1),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn asn_text_rejects_malformed_input() {
    for bad in ["{ a 1, 2 }", "{ a 1", "'abc", "'zz'H", "label", "\"open"] {
        let err = AsnValue::from_text(bad).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WrongNds, "input {bad:?}");
    }
}

#[test]
fn asn_text_display_round_trips() {
    let texts = [
        r#"{ pdus { arp:{ opcode plain:2 }, eth:{} }, delays 10 }"#,
        r#"{ "a\"b", -5, TRUE, '0A0B'H }"#,
        "{}",
    ];
    for text in texts {
        let v = AsnValue::from_text(text).unwrap();
        let printed = v.to_string();
        assert_eq!(AsnValue::from_text(&printed).unwrap(), v, "printed {printed}");
    }
}

#[test]
fn asn_empty_value_is_both_sequence_and_list() {
    let mut v = AsnValue::from_text("{}").unwrap();
    assert_eq!(v.items(), Some(&[][..]));
    assert_eq!(v.field("x"), None);

    v.set_field("x", AsnValue::Integer(1)).unwrap();
    assert_eq!(v.read_int("x"), Some(1));
    v.set_field("x", AsnValue::Integer(2)).unwrap();
    assert_eq!(v.read_int("x"), Some(2));
    assert_eq!(v.remove_field("x"), Some(AsnValue::Integer(2)));

    let mut list = AsnValue::empty();
    list.items_mut().unwrap().push(AsnValue::Integer(3));
    assert_eq!(list, AsnValue::SequenceOf(vec![AsnValue::Integer(3)]));
    assert!(list.set_field("y", AsnValue::Integer(0)).is_err());
}

#[test]
fn asn_value_serde_json_round_trip() {
    let v = AsnValue::from_text(r#"{ layers { eth:{ local-addr '010203040506'H } }, n 7 }"#).unwrap();
    let json = serde_json::to_string(&v).unwrap();
    let back: AsnValue = serde_json::from_str(&json).unwrap();
    assert_eq!(back, v);

    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed["syntax"], "sequence");
}
