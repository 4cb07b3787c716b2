use crate::asn::AsnValue;
use crate::du::{IterSpec, IterStep, TmplArg, TmplArgs};
use crate::error::ErrorKind;

fn collect_all(mut args: TmplArgs) -> Vec<Vec<TmplArg>> {
    let mut out = vec![args.args().to_vec()];
    while args.iterate() == IterStep::Advanced {
        out.push(args.args().to_vec());
    }
    out
}

#[test]
fn iter_args_int_sequence_cycles_then_finishes() {
    let mut args = TmplArgs::init(vec![IterSpec::Ints(vec![1, 2, 3])]).unwrap();
    assert_eq!(args.args(), &[TmplArg::Int(1)]);
    assert_eq!(args.iterate(), IterStep::Advanced);
    assert_eq!(args.args(), &[TmplArg::Int(2)]);
    assert_eq!(args.iterate(), IterStep::Advanced);
    assert_eq!(args.args(), &[TmplArg::Int(3)]);
    assert_eq!(args.iterate(), IterStep::Finished);
    // 回绕后回到第一组取值
    assert_eq!(args.args(), &[TmplArg::Int(1)]);
}

#[test]
fn iter_args_rightmost_advances_first() {
    let args = TmplArgs::init(vec![
        IterSpec::Ints(vec![1, 2]),
        IterSpec::Strings(vec!["a".into(), "b".into()]),
    ])
    .unwrap();
    let tuples = collect_all(args);
    let want: Vec<Vec<TmplArg>> = [(1, "a"), (1, "b"), (2, "a"), (2, "b")]
        .into_iter()
        .map(|(i, s)| vec![TmplArg::Int(i), TmplArg::Str(s.to_string())])
        .collect();
    assert_eq!(tuples, want);
}

#[test]
fn iter_args_simple_for_bound_is_inclusive() {
    let args = TmplArgs::init(vec![IterSpec::SimpleFor { begin: 1, end: 5, step: 2 }]).unwrap();
    let vals: Vec<i32> = collect_all(args)
        .into_iter()
        .map(|t| t[0].as_int().unwrap())
        .collect();
    assert_eq!(vals, vec![1, 3, 5]);

    let args = TmplArgs::init(vec![IterSpec::simple_for(3)]).unwrap();
    assert_eq!(collect_all(args).len(), 3);
}

#[test]
fn iter_args_assoc_moves_with_left_neighbour() {
    let args = TmplArgs::init(vec![IterSpec::Ints(vec![1, 2]), IterSpec::IntsAssoc(vec![10, 20])]).unwrap();
    let tuples = collect_all(args);
    assert_eq!(
        tuples,
        vec![
            vec![TmplArg::Int(1), TmplArg::Int(10)],
            vec![TmplArg::Int(2), TmplArg::Int(20)],
        ]
    );
}

#[test]
fn iter_args_from_nds() {
    let nds = AsnValue::from_text(
        r#"{ simple-for:{ begin 0, end 2 }, ints:{ 7, 8 }, strings:{ "x" } }"#,
    )
    .unwrap();
    let args = TmplArgs::from_nds(Some(&nds)).unwrap();
    assert_eq!(args.specs().len(), 3);
    assert_eq!(
        args.args(),
        &[TmplArg::Int(0), TmplArg::Int(7), TmplArg::Str("x".into())]
    );
    assert_eq!(collect_all(args).len(), 3 * 2);

    let none = TmplArgs::from_nds(None).unwrap();
    assert!(none.is_empty());
    assert!(none.args().is_empty());
}

#[test]
fn iter_args_invalid_specs() {
    for text in [
        "{ simple-for:{ begin 1 } }",
        "{ simple-for:{ end 3, step 0 } }",
        "{ ints:{} }",
        "{ strings:{ 1 } }",
    ] {
        let nds = AsnValue::from_text(text).unwrap();
        let err = TmplArgs::from_nds(Some(&nds)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WrongNds, "{text}");
    }
    let nds = AsnValue::from_text("{ random:{} }").unwrap();
    assert_eq!(TmplArgs::from_nds(Some(&nds)).unwrap_err().kind(), ErrorKind::NotSupported);

    assert_eq!(TmplArg::Int(5).len(), 4);
    assert_eq!(TmplArg::Oct(vec![1, 2]).len(), 2);
}
