//! Driver behavior: routine caching, shape fallbacks, errors

mod common;

use common::*;
use shapejit::ir::Stmt;
use shapejit::shape::SymValue;
use shapejit::{Expr, JitConfig, JitError, JitStats, JitType, ScalarKind, Value};

/// `k = 0; while k < n { k = k + 1 }; return fill(k, 0.0)`
fn zeros_by_counting() -> shapejit::FunctionDef {
    def(
        "zeros",
        &["n"],
        vec![
            Stmt::assign("k", int(0)),
            Stmt::while_loop(
                lt(var("k"), var("n")),
                vec![Stmt::assign("k", add(var("k"), int(1)))],
            ),
            Stmt::Return(Expr::fill(var("k"), Expr::float(0.0))),
        ],
    )
}

#[test]
fn test_routines_cached_per_signature() {
    let mut jit = jit_with(vec![sum_below()]);
    jit.call("sum_below", vec![Value::Int(3)]).unwrap();
    jit.call("sum_below", vec![Value::Int(4)]).unwrap();
    assert_eq!(
        jit.stats(),
        &JitStats {
            compilations: 1,
            routine_cache_hits: 1,
            shape_fallbacks: 0,
            calls: 2,
        }
    );
    assert_eq!(jit.backend().compiled(), 1);
    assert_eq!(jit.session().stats().specializations_built, 1);
    assert_eq!(jit.session().stats().cache_hits, 1);
}

#[test]
fn test_new_signature_compiles_again() {
    let mut jit = jit_with(vec![def(
        "inc",
        &["x"],
        vec![Stmt::Return(add(var("x"), int(1)))],
    )]);
    assert_eq!(jit.call("inc", vec![Value::Int(1)]).unwrap(), Value::Int(2));
    assert_eq!(jit.call("inc", vec![Value::Float(1.5)]).unwrap(), Value::Float(2.5));
    let out = jit.call("inc", vec![Value::from_i64s(&[1, 2])]).unwrap();
    assert_eq!(out, Value::from_i64s(&[2, 3]));
    assert_eq!(jit.stats().compilations, 3);
}

#[test]
fn test_shape_precomputed_for_vector_result() {
    let mut jit = jit_with(vec![def(
        "inc",
        &["x"],
        vec![Stmt::Return(add(var("x"), int(1)))],
    )]);
    let f = jit
        .session_mut()
        .specialize_fn("inc", &[JitType::array(ScalarKind::Float64, 1)])
        .unwrap();
    assert_eq!(jit.session().shape_of(&f).unwrap(), SymValue::Shape(vec![SymValue::Var(0)]));

    let routine = jit.compile(&f).unwrap();
    let code = routine.shape_code().expect("shape code for a vector result");
    let shape = jit
        .session()
        .evaluator()
        .eval_shape_code(code, &[Value::from_f64s(&[1.0, 2.0, 3.0, 4.0])])
        .unwrap();
    assert_eq!(shape, Value::Tuple(vec![Value::Int(4)]));
}

#[test]
fn test_empty_range_matches_precomputed_shape() {
    let mut jit = jit_with(vec![def(
        "upto",
        &["n"],
        vec![Stmt::Return(Expr::range(int(0), var("n"), int(1)))],
    )]);
    assert_eq!(jit.call("upto", vec![Value::Int(-2)]).unwrap(), Value::from_i64s(&[]));
    assert_eq!(jit.call("upto", vec![Value::Int(0)]).unwrap(), Value::from_i64s(&[]));
    assert_eq!(
        jit.call("upto", vec![Value::Int(3)]).unwrap(),
        Value::from_i64s(&[0, 1, 2])
    );
    assert_eq!(jit.stats().shape_fallbacks, 0);
    assert_eq!(jit.stats().compilations, 1);
}

#[test]
fn test_unknown_shape_falls_back() {
    let mut jit = jit_with(vec![zeros_by_counting()]);
    let out = jit.call("zeros", vec![Value::Int(3)]).unwrap();
    assert_eq!(out, Value::from_f64s(&[0.0, 0.0, 0.0]));
    assert_eq!(jit.stats().shape_fallbacks, 1);
    assert_eq!(jit.session().stats().shape_fallbacks, 1);
}

#[test]
fn test_shapes_disabled_by_config() {
    let config = JitConfig::from_toml_str("[jit]\nprecompute_shapes = false\n").unwrap();
    let mut jit = jit_with_config(config, vec![zeros_by_counting()]);
    jit.call("zeros", vec![Value::Int(2)]).unwrap();
    assert_eq!(jit.stats().shape_fallbacks, 0);
    assert_eq!(jit.session().stats().shape_fallbacks, 0);
}

#[test]
fn test_unoptimized_results_match() {
    let config = JitConfig {
        optimize: false,
        ..JitConfig::default()
    };
    let mut plain = jit_with_config(config, vec![sum_below()]);
    let mut optimized = jit_with(vec![sum_below()]);
    let a = plain.call("sum_below", vec![Value::Int(7)]).unwrap();
    let b = optimized.call("sum_below", vec![Value::Int(7)]).unwrap();
    assert_eq!(a, b);
    assert_eq!(plain.session().stats().optimizer_changes, 0);
}

#[test]
fn test_unknown_function() {
    let mut jit = jit_with(vec![]);
    let err = jit.call("missing", vec![]).unwrap_err();
    assert_eq!(err, JitError::UnknownFunction("missing".to_string()));
}

#[test]
fn test_duplicate_definition() {
    let mut jit = jit_with(vec![sum_below()]);
    let err = jit.define(sum_below()).unwrap_err();
    assert_eq!(err, JitError::DuplicateFunction("sum_below".to_string()));
}

#[test]
fn test_too_many_arguments() {
    let mut jit = jit_with(vec![sum_below()]);
    let err = jit
        .call("sum_below", vec![Value::Int(1), Value::Int(2)])
        .unwrap_err();
    assert!(matches!(err, JitError::ArityMismatch { .. }), "{err}");
}

#[test]
fn test_rank_mismatch_between_arrays() {
    let mut jit = jit_with(vec![def(
        "sum2",
        &["a", "b"],
        vec![Stmt::Return(add(var("a"), var("b")))],
    )]);
    let m = Value::from_f64_rows(&[vec![1.0], vec![2.0]]).unwrap();
    let err = jit
        .call("sum2", vec![Value::from_f64s(&[1.0, 2.0]), m])
        .unwrap_err();
    assert_eq!(
        err,
        JitError::RankMismatch {
            expected: 1,
            found: 2
        }
    );
}
