use std::sync::Arc;

use crate::asn::AsnValue;
use crate::csap::CsapId;
use crate::du::{DataUnit, TmplArg};
use crate::error::{ErrorKind, Result};
use crate::pkt::Packet;
use crate::traffic::{PayloadSpec, SymbolTable};

fn spec(text: &str) -> Result<PayloadSpec> {
    PayloadSpec::from_asn(&AsnValue::from_text(text).unwrap())
}

#[test]
fn payload_specs_parse() {
    assert_eq!(spec("bytes:'0102'H").unwrap(), PayloadSpec::Bytes(vec![1, 2]));
    assert_eq!(spec("length:16").unwrap(), PayloadSpec::Length(16));
    assert_eq!(
        spec("mask:{ v '0A00'H, m 'FF00'H, exact-len TRUE }").unwrap(),
        PayloadSpec::Mask {
            value: vec![0x0a, 0],
            mask: vec![0xff, 0],
            exact_len: true,
        }
    );
    assert_eq!(spec(r#"function:"fill""#).unwrap(), PayloadSpec::Function("fill".into()));
    assert_eq!(
        spec(r#"stream:{ function "counter", offset plain:4, length plain:6 }"#).unwrap(),
        PayloadSpec::Stream {
            function: "counter".into(),
            offset: DataUnit::I32(4),
            length: DataUnit::I32(6),
        }
    );

    assert_eq!(spec("length:-1").unwrap_err().kind(), ErrorKind::WrongNds);
    assert_eq!(spec("mask:{ v '0A00'H, m 'FF'H }").unwrap_err().kind(), ErrorKind::WrongNds);
    assert_eq!(spec("'01'H").unwrap_err().kind(), ErrorKind::WrongNds);
    assert_eq!(spec("random:4").unwrap_err().kind(), ErrorKind::NotSupported);
}

#[test]
fn payload_generation() {
    let symbols = SymbolTable::new();
    let id = CsapId(1);

    let pkt = spec("bytes:'DEAD'H").unwrap().generate(id, &symbols, &[]).unwrap();
    assert_eq!(pkt.to_vec(), vec![0xde, 0xad]);

    let pkt = spec("length:100").unwrap().generate(id, &symbols, &[]).unwrap();
    assert_eq!(pkt.len(), 100);

    let err = spec("mask:{ v '00'H, m 'FF'H }")
        .unwrap()
        .generate(id, &symbols, &[])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WrongNds);
}

#[test]
fn payload_functions_come_from_symbol_table() {
    let symbols = SymbolTable::new();
    let id = CsapId(3);
    let f = spec(r#"function:"tag""#).unwrap();
    assert_eq!(f.generate(id, &symbols, &[]).unwrap_err().kind(), ErrorKind::WrongNds);

    symbols.register_payload_fn(
        "tag",
        Arc::new(|csap: CsapId, args: &[TmplArg]| -> Result<Vec<u8>> {
            let n = args.first().and_then(TmplArg::as_int).unwrap_or(0);
            Ok(vec![csap.0 as u8, n as u8])
        }),
    );
    let pkt = f.generate(id, &symbols, &[TmplArg::Int(9)]).unwrap();
    assert_eq!(pkt.to_vec(), vec![3, 9]);
}

#[test]
fn payload_stream_fills_from_offset() {
    let symbols = SymbolTable::new();
    symbols.register_stream_fn(
        "counter",
        Arc::new(|offset: u64, buf: &mut [u8]| -> Result<()> {
            for (i, b) in buf.iter_mut().enumerate() {
                *b = (offset + i as u64) as u8;
            }
            Ok(())
        }),
    );
    let s = spec(r#"stream:{ function "counter", offset script:"expr:($0 * 10)", length plain:5 }"#).unwrap();
    let pkt = s.generate(CsapId(1), &symbols, &[TmplArg::Int(2)]).unwrap();
    assert_eq!(pkt.to_vec(), vec![20, 21, 22, 23, 24]);

    let missing = spec(r#"stream:{ function "nope", offset plain:0, length plain:1 }"#).unwrap();
    assert_eq!(
        missing.generate(CsapId(1), &symbols, &[]).unwrap_err().kind(),
        ErrorKind::WrongNds
    );
}

#[test]
fn payload_matching() {
    let padded = Packet::from_bytes(vec![0x01, 0x02, 0x00, 0x00]);

    // BYTES 允许尾部补零
    assert!(spec("bytes:'0102'H").unwrap().match_payload(&padded).is_ok());
    assert_eq!(
        spec("bytes:'0103'H").unwrap().match_payload(&padded).unwrap_err().kind(),
        ErrorKind::NotMatch
    );

    let loose = spec("mask:{ v '0100'H, m 'FF00'H }").unwrap();
    assert!(loose.match_payload(&padded).is_ok());
    let exact = spec("mask:{ v '0100'H, m 'FF00'H, exact-len TRUE }").unwrap();
    assert_eq!(exact.match_payload(&padded).unwrap_err().kind(), ErrorKind::NotMatch);
    assert!(exact.match_payload(&Packet::from_bytes(vec![0x01, 0x7f])).is_ok());

    assert!(spec("length:4").unwrap().check_pattern().is_err());
    assert!(spec(r#"function:"f""#).unwrap().check_pattern().is_err());
    assert!(loose.check_pattern().is_ok());
}
