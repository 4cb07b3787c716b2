use crate::asn::AsnValue;
use crate::du::{BinOp, DataUnit, Expr, TmplArg, ntohll};
use crate::error::{ErrorKind, TadError};

fn ints(vals: &[i32]) -> Vec<TmplArg> {
    vals.iter().copied().map(TmplArg::Int).collect()
}

#[test]
fn expr_parse_consumes_whole_input_and_evaluates() {
    let text = "((2 + 3) * $1)";
    let (tree, used) = Expr::parse(text).unwrap();
    assert_eq!(used, text.len());
    assert_eq!(used, 14);
    assert_eq!(tree.eval(&ints(&[0, 4])).unwrap(), 20);
}

#[test]
fn expr_parse_error_reports_position_of_close_paren() {
    match Expr::parse("(1 +)") {
        Err(TadError::ExprParse { pos }) => assert_eq!(pos, 4),
        other => panic!("unexpected {other:?}"),
    }
    match Expr::parse("$") {
        Err(TadError::ExprParse { pos }) => assert_eq!(pos, 1),
        other => panic!("unexpected {other:?}"),
    }
    match Expr::parse("0x") {
        Err(TadError::ExprParse { pos }) => assert_eq!(pos, 2),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(Expr::parse("1 + 2").map(|(_, n)| n).unwrap(), 1);
}

#[test]
fn expr_integer_base_detection_and_width() {
    let cases = [("0", 0), ("017", 15), ("0x1F", 31), ("0XfF", 255), ("123", 123)];
    for (text, want) in cases {
        let (tree, used) = Expr::parse(text).unwrap();
        assert_eq!(used, text.len(), "{text}");
        assert_eq!(tree, Expr::constant(want), "{text}");
        assert_eq!(tree.const_width(), Some(4));
    }
    let (wide, _) = Expr::parse("0x10000000000").unwrap();
    assert_eq!(wide.const_width(), Some(8));
    assert_eq!(Expr::ArgLink(0).const_width(), None);
}

#[test]
fn expr_eval_argument_errors() {
    let (tree, _) = Expr::parse("($3 + 1)").unwrap();
    let err = tree.eval(&ints(&[1, 2])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WrongNds);

    let (tree, _) = Expr::parse("$0").unwrap();
    let err = tree.eval(&[TmplArg::Str("x".into())]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WrongNds);
}

#[test]
fn expr_division_by_zero_and_overflow_are_wrong_nds() {
    for text in ["(1 / 0)", "(7 % ($0 - $0))"] {
        let (tree, _) = Expr::parse(text).unwrap();
        assert_eq!(tree.eval(&ints(&[9])).unwrap_err().kind(), ErrorKind::WrongNds, "{text}");
    }
    let overflow = Expr::binary(BinOp::Div, Expr::constant(i64::MIN), Expr::constant(-1));
    assert_eq!(overflow.eval(&[]).unwrap_err().kind(), ErrorKind::WrongNds);

    // 加减乘按 64 位回绕
    let wrap = Expr::binary(BinOp::Add, Expr::constant(i64::MAX), Expr::constant(1));
    assert_eq!(wrap.eval(&[]).unwrap(), i64::MIN);
}

#[test]
fn expr_identities_hold_for_any_argument() {
    let (add0, _) = Expr::parse("($0 + 0)").unwrap();
    let (mul1, _) = Expr::parse("($0 * 1)").unwrap();
    let (sub_self, _) = Expr::parse("($0 - $0)").unwrap();
    let (neg, _) = Expr::parse("(-$0)").unwrap();
    for x in [-7, 0, 1, 12345, i32::MAX, i32::MIN] {
        let args = ints(&[x]);
        assert_eq!(add0.eval(&args).unwrap(), i64::from(x));
        assert_eq!(mul1.eval(&args).unwrap(), i64::from(x));
        assert_eq!(sub_self.eval(&args).unwrap(), 0);
        assert_eq!(neg.eval(&args).unwrap(), -i64::from(x));
    }
}

#[test]
fn expr_eval_is_pure() {
    let (tree, _) = Expr::parse("((($0 * 3) - $1) % 7)").unwrap();
    let args = ints(&[100, 5]);
    let first = tree.eval(&args).unwrap();
    for _ in 0..3 {
        assert_eq!(tree.eval(&args).unwrap(), first);
    }
    assert_eq!(first, (300 - 5) % 7);
}

#[test]
fn expr_display_parses_back_to_same_tree() {
    for text in ["((2 + 3) * $1)", "(-(1 + $0))", "(($0 / 4) % 0x10)", "$12", "017"] {
        let (tree, _) = Expr::parse(text).unwrap();
        let printed = tree.to_string();
        let (again, used) = Expr::parse(&printed).unwrap();
        assert_eq!(again, tree, "printed {printed}");
        assert_eq!(used, printed.len());
    }

    let negatives = [
        Expr::from_be_bytes(&[0xff; 8]).unwrap(),
        Expr::constant(i64::MIN),
        Expr::binary(BinOp::Sub, Expr::constant(-7), Expr::ArgLink(0)),
    ];
    assert_eq!(negatives[0], Expr::constant(-1));
    for tree in negatives {
        let printed = tree.to_string();
        let (again, used) = Expr::parse(&printed).unwrap();
        assert_eq!(again, tree, "printed {printed}");
        assert_eq!(used, printed.len());

        let du = DataUnit::Expr(tree.clone());
        match DataUnit::from_asn(&du.to_asn().unwrap()).unwrap() {
            DataUnit::Expr(back) => assert_eq!(back, tree),
            other => panic!("unexpected {other:?}"),
        }
    }
}

#[test]
fn expr_negative_literal_folds_to_constant() {
    let (tree, used) = Expr::parse("( - 0x10 )").unwrap();
    assert_eq!(tree, Expr::constant(-16));
    assert_eq!(used, 10);
    assert_eq!(tree.eval(&[]).unwrap(), -16);

    let (min, _) = Expr::parse("(-9223372036854775808)").unwrap();
    assert_eq!(min, Expr::constant(i64::MIN));
    assert_eq!(min.const_width(), Some(8));

    // 正常量的上限仍是 i64::MAX
    assert!(Expr::parse("9223372036854775808").is_err());
    assert!(Expr::parse("(-9223372036854775809)").is_err());
}

#[test]
fn expr_from_network_order_bytes() {
    assert_eq!(Expr::from_be_bytes(&[0x01, 0x02]).unwrap(), Expr::constant(0x0102));
    assert_eq!(
        Expr::from_be_bytes(&[0, 0, 0, 1, 0, 0, 0, 0]).unwrap(),
        Expr::constant(1 << 32)
    );
    assert!(Expr::from_be_bytes(&[]).is_err());
    assert!(Expr::from_be_bytes(&[0; 9]).is_err());

    let x = 0x0102_0304_0506_0708u64;
    assert_eq!(ntohll(x), u64::from_be(x));
}

#[test]
fn expr_script_data_unit() {
    let script = AsnValue::from_text(r#"script:"expr:((2 + 3) * $1)""#).unwrap();
    match DataUnit::from_asn(&script).unwrap() {
        DataUnit::Expr(e) => assert_eq!(e.eval(&ints(&[0, 4])).unwrap(), 20),
        other => panic!("unexpected {other:?}"),
    }

    let trailing = AsnValue::from_text(r#"script:"expr:(1 + 2) junk""#).unwrap();
    assert_eq!(DataUnit::from_asn(&trailing).unwrap_err().kind(), ErrorKind::ExprParse);

    let other = AsnValue::from_text(r#"script:"lua:return 1""#).unwrap();
    assert_eq!(DataUnit::from_asn(&other).unwrap_err().kind(), ErrorKind::NotSupported);
}
