use super::*;
use crate::ir::{BinOp, FormalArgs, FunctionDef, TypedExprKind};
use crate::session::Session;
use crate::types::ScalarKind;
use crate::value::Value;
use pretty_assertions::assert_eq;

fn session_with(defs: Vec<FunctionDef>) -> Session {
    let mut session = Session::new(JitConfig::default());
    for def in defs {
        session.define(def).unwrap();
    }
    session
}

fn binop(op: BinOp, l: Expr, r: Expr) -> Expr {
    Expr::binop(op, l, r)
}

fn returned(f: &TypedFn) -> &TypedExpr {
    match f.body.last() {
        Some(Stmt::Return(e)) => e,
        other => panic!("expected a trailing return, got {other:?}"),
    }
}

fn fib() -> FunctionDef {
    FunctionDef::new(
        "fib",
        FormalArgs::new(&["n"]),
        vec![
            Stmt::if_else(
                binop(BinOp::Lt, Expr::var("n"), Expr::int(2)),
                vec![Stmt::Return(Expr::var("n"))],
                vec![],
            ),
            Stmt::Return(binop(
                BinOp::Add,
                Expr::call("fib", vec![binop(BinOp::Sub, Expr::var("n"), Expr::int(1))]),
                Expr::call("fib", vec![binop(BinOp::Sub, Expr::var("n"), Expr::int(2))]),
            )),
        ],
    )
}

// ── cache ────────────────────────────────────────────────────────────────────

#[test]
fn test_same_signature_shares_specialization() {
    let mut session = session_with(vec![FunctionDef::new(
        "inc",
        FormalArgs::new(&["x"]),
        vec![Stmt::Return(binop(BinOp::Add, Expr::var("x"), Expr::int(1)))],
    )]);
    let a = session.specialize_fn("inc", &[JitType::INT64]).unwrap();
    let b = session.specialize_fn("inc", &[JitType::INT64]).unwrap();
    assert!(Rc::ptr_eq(&a, &b));
    assert_eq!(session.stats().specializations_built, 1);
    assert_eq!(session.stats().cache_hits, 1);

    let c = session.specialize_fn("inc", &[JitType::FLOAT64]).unwrap();
    assert_ne!(a.id, c.id);
    assert_eq!(c.return_type, JitType::FLOAT64);
    assert_eq!(session.cache().len(), 2);
}

#[test]
fn test_defaults_become_prologue_constants() {
    let mut session = session_with(vec![FunctionDef::new(
        "scale",
        FormalArgs::new(&["x"]).with_default("k", Const::Int(3)),
        vec![Stmt::Return(binop(BinOp::Mult, Expr::var("x"), Expr::var("k")))],
    )]);
    let f = session.specialize_fn("scale", &[JitType::INT64]).unwrap();
    assert_eq!(session.registry().lookup("scale").unwrap().args.positional, vec!["x", "k"]);
    assert_eq!(f.params, vec!["x".to_string()]);
    let Stmt::Assign { lhs, rhs } = &f.body[0] else {
        panic!("expected the default binding first, got {:?}", f.body[0]);
    };
    assert_eq!(lhs, &crate::ir::Lhs::Var("k".to_string()));
    assert_eq!(rhs.as_const(), Some(Const::Int(3)));

    // supplying the default slot is a different signature
    let g = session
        .specialize_fn("scale", &[JitType::INT64, JitType::INT64])
        .unwrap();
    assert_ne!(f.id, g.id);
    assert_eq!(g.params.len(), 2);
}

#[test]
fn test_spec_key_marks_defaulted_slots() {
    let mut session = session_with(vec![FunctionDef::new(
        "scale",
        FormalArgs::new(&["x"]).with_default("k", Const::Int(3)),
        vec![Stmt::Return(Expr::var("x"))],
    )]);
    session.specialize_fn("scale", &[JitType::FLOAT64]).unwrap();
    let key = SpecKey {
        func: "scale".to_string(),
        slots: vec![Some(JitType::FLOAT64), None],
    };
    assert!(matches!(
        session.cache().entry(&key),
        Some(CacheEntry::Complete(_))
    ));
}

// ── recursion ────────────────────────────────────────────────────────────────

#[test]
fn test_recursive_specialization_terminates() {
    let mut session = session_with(vec![fib()]);
    let f = session.specialize_fn("fib", &[JitType::INT64]).unwrap();
    assert_eq!(f.return_type, JitType::INT64);
    assert!(!f.writes_memory);
    assert_eq!(session.cache().len(), 1);

    let result = session.evaluator().call(f.id, vec![Value::Int(10)]).unwrap();
    assert_eq!(result, Value::Int(55));
}

#[test]
fn test_recursion_before_any_return_fails_once() {
    let mut session = session_with(vec![FunctionDef::new(
        "spin",
        FormalArgs::new(&["n"]),
        vec![Stmt::Return(binop(
            BinOp::Add,
            Expr::call("spin", vec![Expr::var("n")]),
            Expr::int(1),
        ))],
    )]);
    let err = session.specialize_fn("spin", &[JitType::INT64]).unwrap_err();
    assert!(matches!(err, JitError::TypeError { .. }), "{err}");
    assert_eq!(session.stats().failed_specializations, 1);

    let again = session.specialize_fn("spin", &[JitType::INT64]).unwrap_err();
    assert_eq!(again.to_string(), err.to_string());
    assert_eq!(session.stats().failed_specializations, 1);
    assert!(session.cache().is_empty());
}

// ── adverbs ──────────────────────────────────────────────────────────────────

fn add_one() -> FunctionDef {
    FunctionDef::new(
        "add_one",
        FormalArgs::new(&["x"]),
        vec![Stmt::Return(binop(BinOp::Add, Expr::var("x"), Expr::int(1)))],
    )
}

#[test]
fn test_vector_operator_lowers_to_map() {
    let mut session = session_with(vec![add_one()]);
    let f = session
        .specialize_fn("add_one", &[JitType::array(ScalarKind::Float64, 1)])
        .unwrap();
    assert_eq!(f.return_type, JitType::array(ScalarKind::Float64, 1));
    assert!(matches!(returned(&f).kind, TypedExprKind::Map { axis: 0, .. }));
    assert_eq!(session.stats().wrappers_synthesized, 1);

    let out = session
        .evaluator()
        .call(f.id, vec![Value::from_f64s(&[1.0, 2.5])])
        .unwrap();
    assert_eq!(out, Value::from_f64s(&[2.0, 3.5]));
}

#[test]
fn test_matrix_operator_calls_nested_wrapper() {
    let mut session = session_with(vec![add_one()]);
    let f = session
        .specialize_fn("add_one", &[JitType::array(ScalarKind::Int64, 2)])
        .unwrap();
    assert_eq!(f.return_type, JitType::array(ScalarKind::Int64, 2));
    assert!(matches!(returned(&f).kind, TypedExprKind::Call { .. }));
    // primitive wrapper plus the one- and two-level maps
    assert_eq!(session.stats().wrappers_synthesized, 3);

    let m = Value::array(
        vec![2, 2],
        ScalarKind::Int64,
        vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)],
    )
    .unwrap();
    let out = session.evaluator().call(f.id, vec![m]).unwrap();
    let expected = Value::array(
        vec![2, 2],
        ScalarKind::Int64,
        vec![Value::Int(2), Value::Int(3), Value::Int(4), Value::Int(5)],
    )
    .unwrap();
    assert_eq!(out, expected);
}

#[test]
fn test_map_axis_out_of_range() {
    let mut session = session_with(vec![
        add_one(),
        FunctionDef::new(
            "along",
            FormalArgs::new(&["xs"]),
            vec![Stmt::Return(Expr::map(
                Expr::fn_ref("add_one"),
                vec![Expr::var("xs")],
                Some(1),
            ))],
        ),
    ]);
    let err = session
        .specialize_fn("along", &[JitType::array(ScalarKind::Float64, 1)])
        .unwrap_err();
    assert!(matches!(err, JitError::TypeError { .. }), "{err}");
}

// ── merges and returns ───────────────────────────────────────────────────────

#[test]
fn test_loop_carried_type_widens() {
    let mut session = session_with(vec![FunctionDef::new(
        "halves",
        FormalArgs::new(&["n"]),
        vec![
            Stmt::assign("x", Expr::int(0)),
            Stmt::assign("i", Expr::int(0)),
            Stmt::while_loop(
                binop(BinOp::Lt, Expr::var("i"), Expr::var("n")),
                vec![
                    Stmt::assign("x", binop(BinOp::Add, Expr::var("x"), Expr::float(0.5))),
                    Stmt::assign("i", binop(BinOp::Add, Expr::var("i"), Expr::int(1))),
                ],
            ),
            Stmt::Return(Expr::var("x")),
        ],
    )]);
    let f = session.specialize_fn("halves", &[JitType::INT64]).unwrap();
    assert_eq!(f.return_type, JitType::FLOAT64);

    let out = session.evaluator().call(f.id, vec![Value::Int(4)]).unwrap();
    assert_eq!(out, Value::Float(2.0));
    let out = session.evaluator().call(f.id, vec![Value::Int(0)]).unwrap();
    assert_eq!(out, Value::Float(0.0));
}

#[test]
fn test_returns_coerced_to_join() {
    let mut session = session_with(vec![FunctionDef::new(
        "pick",
        FormalArgs::new(&["c", "n"]),
        vec![
            Stmt::if_else(Expr::var("c"), vec![Stmt::Return(Expr::var("n"))], vec![]),
            Stmt::Return(Expr::float(2.5)),
        ],
    )]);
    let f = session
        .specialize_fn("pick", &[JitType::BOOL, JitType::INT64])
        .unwrap();
    assert_eq!(f.return_type, JitType::FLOAT64);
    let Stmt::If { true_block, .. } = &f.body[0] else {
        panic!("expected a conditional, got {:?}", f.body[0]);
    };
    let Stmt::Return(e) = &true_block[0] else {
        panic!("expected a return");
    };
    assert!(matches!(
        e.kind,
        TypedExprKind::Cast {
            to: ScalarKind::Float64,
            ..
        }
    ));

    let out = session
        .evaluator()
        .call(f.id, vec![Value::Bool(true), Value::Int(7)])
        .unwrap();
    assert_eq!(out, Value::Float(7.0));
}

#[test]
fn test_store_marks_writes_memory() {
    let mut session = session_with(vec![FunctionDef::new(
        "zero_first",
        FormalArgs::new(&["xs"]),
        vec![
            Stmt::store(Expr::var("xs"), Expr::int(0), Expr::int(0)),
            Stmt::Return(Expr::var("xs")),
        ],
    )]);
    let f = session
        .specialize_fn("zero_first", &[JitType::array(ScalarKind::Float64, 1)])
        .unwrap();
    assert!(f.writes_memory);
    assert!(session.cache().writes_memory(f.id));
}
