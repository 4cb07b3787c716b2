use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tad_csap::config::CsapParams;
use tad_csap::csap::{CsapKind, parse_type};
use tad_csap::proto::ArpSupport;
use tad_csap::{AsnValue, CsapId, ErrorKind, Tad, TadConfig};

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("tad-csap-{prefix}-{}-{nanos}", std::process::id()));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn tad() -> Tad {
    Tad::with_default_protocols(TadConfig::default()).expect("register default protocols")
}

fn nds(text: &str) -> AsnValue {
    AsnValue::from_text(text).expect("parse NDS")
}

#[test]
fn create_and_destroy_arp_eth() {
    let tad = tad();
    let id = tad.csap_create("arp.eth", None).expect("create arp.eth");
    assert!(id.is_valid());

    let csap = tad.csap_find(id).expect("csap in table");
    assert_eq!(csap.depth(), 2);
    assert_eq!(csap.protos(), vec!["arp", "eth"]);
    assert_eq!(csap.kind(), CsapKind::Raw);
    assert!(csap.layers().iter().all(|l| l.has_specific_data()));
    // 默认以太网支持没有介质
    assert!(!csap.has_medium());
    drop(csap);

    tad.csap_destroy(id).expect("destroy");
    assert!(tad.csap_find(id).is_none());
    let err = tad.csap_destroy(id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoSuchCsap);
    assert!(tad.csaps().is_empty());
}

#[test]
fn create_with_unknown_protocol_fails_cleanly() {
    let tad = tad();
    let err = tad.csap_create("ip4.eth", None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotSupported);
    assert!(err.to_string().contains("ip4"));
    assert!(tad.csaps().is_empty());
}

#[test]
fn csap_ids_are_distinct_and_nonzero() {
    let tad = tad();
    let a = tad.csap_create("arp", None).expect("first");
    let b = tad.csap_create("eth", None).expect("second");
    assert_ne!(a, b);
    assert_ne!(a, CsapId::INVALID);
    assert_eq!(tad.csaps().ids(), vec![a, b]);
    tad.shutdown();
    assert!(tad.csaps().is_empty());
    assert!(tad.registry().is_empty());
}

#[test]
fn type_strings() {
    let (kind, labels) = parse_type("data.arp", 200).expect("data prefix");
    assert_eq!(kind, CsapKind::Data);
    assert_eq!(labels, vec!["arp"]);

    for bad in ["", "arp..eth", ".eth", "data"] {
        let err = parse_type(bad, 200).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{bad:?}");
    }

    let tad = Tad::with_default_protocols(TadConfig {
        max_depth: 2,
        ..TadConfig::default()
    })
    .expect("context");
    let err = tad.csap_create("eth.eth.eth", None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let id = tad.csap_create("data.arp", None).expect("data CSAP");
    assert_eq!(tad.csap_find(id).expect("csap").kind(), CsapKind::Data);
}

#[test]
fn layer_nds_must_follow_type_order() {
    let tad = tad();
    let err = tad
        .csap_create("arp.eth", Some(&nds("{ layers { eth:{}, arp:{} } }")))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WrongNds);

    let err = tad
        .csap_create("arp.eth", Some(&nds("{ layers { arp:{} } }")))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WrongNds);
    assert!(tad.csaps().is_empty());
}

#[test]
fn csap_parameters() {
    let tad = tad();
    let id = tad
        .csap_create(
            "arp.eth",
            Some(&nds(
                "{ layers { arp:{}, eth:{ local-addr plain:'020000000001'H, remote-addr '020000000002'H } } }",
            )),
        )
        .expect("create");

    assert_eq!(tad.csap_param(id, "status").expect("status"), "idle");
    assert_eq!(tad.csap_param(id, "total_bytes").expect("bytes"), "0");
    assert_eq!(tad.csap_param(id, "first_packet_time").expect("time"), "0");
    assert_eq!(tad.csap_param(id, "local-addr").expect("local"), "02:00:00:00:00:01");
    assert_eq!(tad.csap_param(id, "remote-addr").expect("remote"), "02:00:00:00:00:02");

    let err = tad.csap_param(id, "mtu").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = tad.csap_param(CsapId(9999), "status").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoSuchCsap);
}

#[test]
fn csap_params_override_config() {
    let cfg = TadConfig::default();
    let tad = tad();
    let id = tad
        .csap_create(
            "arp",
            Some(&nds("{ params { receive-timeout-ms 10, stop-latency-timeout-ms 0 } }")),
        )
        .expect("create");
    let csap = tad.csap_find(id).expect("csap");
    assert_eq!(csap.params().recv_timeout, Duration::from_millis(10));
    // 停止响应延迟至少 1 毫秒
    assert_eq!(csap.params().stop_latency, Duration::from_millis(1));

    let plain = CsapParams::resolve(&cfg, None);
    assert_eq!(plain.recv_timeout, Duration::from_millis(cfg.recv_timeout_ms));
    assert_eq!(plain.stop_latency, Duration::from_millis(cfg.stop_latency_ms));
}

#[test]
fn config_from_json() {
    let cfg = TadConfig::from_json_str(r#"{ "recv_timeout_ms": 50, "dump_packets": true }"#).expect("config");
    assert_eq!(cfg.recv_timeout_ms, 50);
    assert!(cfg.dump_packets);
    assert_eq!(cfg.max_depth, TadConfig::default().max_depth);

    let raw = serde_json::to_string(&cfg).expect("serialize");
    assert_eq!(TadConfig::from_json_str(&raw).expect("reparse"), cfg);

    let dir = unique_temp_dir("config");
    let path = dir.join("tad.json");
    fs::write(&path, r#"{ "max_received": 8 }"#).expect("write config");
    let from_file = TadConfig::from_json_file(&path).expect("config file");
    assert_eq!(from_file.max_received, 8);

    let err = TadConfig::from_json_str(r#"{ "max_depth": "deep" }"#).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = TadConfig::from_json_file(dir.join("missing.json")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[test]
fn duplicate_protocol_is_rejected() {
    let tad = tad();
    let err = tad.register(Arc::new(ArpSupport::new())).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert_eq!(tad.registry().labels(), vec!["arp", "eth"]);
}

#[test]
fn global_context_has_default_protocols() {
    let tad = Tad::global();
    assert!(tad.registry().find("arp").is_some());
    assert!(tad.registry().find("eth").is_some());
    assert!(std::ptr::eq(tad, Tad::global()));
}
