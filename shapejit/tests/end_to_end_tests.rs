//! Differential tests: the untyped interpreter against the JIT driver

mod common;

use common::*;
use shapejit::ir::{Lhs, Stmt};
use shapejit::{ActualArgs, Callable, Const, Expr, FormalArgs, FunctionDef, ScalarKind, Value};

#[test]
fn test_scalar_arithmetic() {
    let mut jit = jit_with(vec![def(
        "poly",
        &["x", "y"],
        vec![Stmt::Return(add(mul(var("x"), var("x")), var("y")))],
    )]);
    assert_eq!(run_both(&mut jit, "poly", vec![Value::Int(3), Value::Int(4)]), Value::Int(13));
    assert_eq!(
        run_both(&mut jit, "poly", vec![Value::Int(2), Value::Float(0.5)]),
        Value::Float(4.5)
    );
}

#[test]
fn test_vector_broadcasting() {
    let mut jit = jit_with(vec![def(
        "scale",
        &["xs", "k"],
        vec![Stmt::Return(mul(var("xs"), var("k")))],
    )]);
    let out = run_both(
        &mut jit,
        "scale",
        vec![Value::from_f64s(&[1.0, 2.0, 3.0]), Value::Int(2)],
    );
    assert_eq!(out, Value::from_f64s(&[2.0, 4.0, 6.0]));
}

#[test]
fn test_matrix_broadcasting() {
    let mut jit = jit_with(vec![def(
        "double",
        &["m"],
        vec![Stmt::Return(add(var("m"), var("m")))],
    )]);
    let m = Value::from_f64_rows(&[vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap();
    let out = run_both(&mut jit, "double", vec![m]);
    assert_eq!(
        out,
        Value::from_f64_rows(&[vec![2.0, 4.0], vec![6.0, 8.0], vec![10.0, 12.0]]).unwrap()
    );
}

#[test]
fn test_loop() {
    let mut jit = jit_with(vec![sum_below()]);
    assert_eq!(run_both(&mut jit, "sum_below", vec![Value::Int(10)]), Value::Int(45));
    assert_eq!(run_both(&mut jit, "sum_below", vec![Value::Int(0)]), Value::Int(0));
}

#[test]
fn test_merge_of_literals() {
    let mut jit = jit_with(vec![def(
        "pick",
        &["c"],
        vec![
            Stmt::if_else(
                var("c"),
                vec![Stmt::assign("y", int(1))],
                vec![Stmt::assign("y", int(2))],
            ),
            Stmt::Return(var("y")),
        ],
    )]);
    assert_eq!(run_both(&mut jit, "pick", vec![Value::Bool(true)]), Value::Int(1));
    assert_eq!(run_both(&mut jit, "pick", vec![Value::Bool(false)]), Value::Int(2));
}

#[test]
fn test_closure_map() {
    let mut jit = jit_with(vec![
        def("plus", &["a", "b"], vec![Stmt::Return(add(var("a"), var("b")))]),
        def(
            "shift_all",
            &["k", "xs"],
            vec![Stmt::Return(Expr::map(
                Expr::closure("plus", vec![var("k")]),
                vec![var("xs")],
                None,
            ))],
        ),
    ]);
    let out = run_both(
        &mut jit,
        "shift_all",
        vec![Value::Int(10), Value::from_f64s(&[0.5, 1.5])],
    );
    assert_eq!(out, Value::from_f64s(&[10.5, 11.5]));

    let direct = jit
        .call_with(
            Callable::Closure {
                func: "plus".to_string(),
                fixed: vec![Value::Int(10)],
            },
            ActualArgs::positional(vec![Value::Int(5)]),
        )
        .unwrap();
    assert_eq!(direct, Value::Int(15));
}

#[test]
fn test_indexing_literals_and_ranges() {
    let mut jit = jit_with(vec![
        def(
            "second",
            &[],
            vec![Stmt::Return(Expr::index(
                Expr::Array(vec![int(10), int(20), int(30)]),
                int(1),
            ))],
        ),
        def(
            "fourth_odd",
            &["n"],
            vec![Stmt::Return(Expr::index(
                Expr::range(int(5), var("n"), int(2)),
                int(3),
            ))],
        ),
    ]);
    assert_eq!(run_both(&mut jit, "second", vec![]), Value::Int(20));
    assert_eq!(run_both(&mut jit, "fourth_odd", vec![Value::Int(100)]), Value::Int(11));
}

#[test]
fn test_keywords_and_defaults() {
    let mut jit = jit_with(vec![FunctionDef::new(
        "affine",
        FormalArgs::new(&["x"])
            .with_default("a", Const::Int(2))
            .with_default("b", Const::Int(1)),
        vec![Stmt::Return(add(mul(var("a"), var("x")), var("b")))],
    )]);
    assert_eq!(run_both(&mut jit, "affine", vec![Value::Int(5)]), Value::Int(11));

    let args = ActualArgs::positional(vec![Value::Int(5)]).with_keyword("b", Value::Int(-1));
    let expected = jit
        .session()
        .interpreter()
        .call(Callable::function("affine"), args.clone())
        .unwrap();
    let actual = jit.call_with(Callable::function("affine"), args).unwrap();
    assert_eq!(actual, Value::Int(9));
    assert_eq!(actual, expected);
}

#[test]
fn test_variadic_arguments() {
    let mut jit = jit_with(vec![FunctionDef::new(
        "count",
        FormalArgs::new(&[]).with_starargs("rest"),
        vec![Stmt::Return(Expr::len(var("rest")))],
    )]);
    let out = run_both(
        &mut jit,
        "count",
        vec![Value::Int(1), Value::Float(2.0), Value::Bool(true)],
    );
    assert_eq!(out, Value::Int(3));
}

#[test]
fn test_mixed_kind_array_literal() {
    let mut jit = jit_with(vec![def(
        "mixed",
        &["x"],
        vec![Stmt::Return(Expr::Array(vec![int(1), var("x")]))],
    )]);
    let out = run_both(&mut jit, "mixed", vec![Value::Float(2.5)]);
    assert_eq!(out.kind().unwrap(), ScalarKind::Float64);
    assert_eq!(out.flat_f64().unwrap(), vec![1.0, 2.5]);
}

// Expected values below are fixed rather than taken from the interpreter:
// both evaluators run the same SSA body, so a construction error would be
// shared.

#[test]
fn test_loop_exit_sees_last_copied_value() {
    // prev = 0; i = 0; while i < n { prev = i; i = i + 1 }; return prev
    let mut jit = jit_with(vec![def(
        "last_index",
        &["n"],
        vec![
            Stmt::assign("prev", int(0)),
            Stmt::assign("i", int(0)),
            Stmt::while_loop(
                lt(var("i"), var("n")),
                vec![
                    Stmt::assign("prev", var("i")),
                    Stmt::assign("i", add(var("i"), int(1))),
                ],
            ),
            Stmt::Return(var("prev")),
        ],
    )]);
    assert_eq!(run_both(&mut jit, "last_index", vec![Value::Int(3)]), Value::Int(2));
    assert_eq!(run_both(&mut jit, "last_index", vec![Value::Int(1)]), Value::Int(0));
    assert_eq!(run_both(&mut jit, "last_index", vec![Value::Int(0)]), Value::Int(0));
}

fn swap_loop(name: &str, swap: Vec<Stmt<Expr>>) -> FunctionDef {
    let mut body = swap;
    body.push(Stmt::assign("i", add(var("i"), int(1))));
    def(
        name,
        &["n"],
        vec![
            Stmt::assign("a", int(1)),
            Stmt::assign("b", int(2)),
            Stmt::assign("i", int(0)),
            Stmt::while_loop(lt(var("i"), var("n")), body),
            Stmt::Return(add(mul(var("a"), int(10)), var("b"))),
        ],
    )
}

#[test]
fn test_swap_in_loop() {
    let mut jit = jit_with(vec![
        swap_loop(
            "swap_pattern",
            vec![Stmt::Assign {
                lhs: Lhs::Tuple(vec![Lhs::Var("a".to_string()), Lhs::Var("b".to_string())]),
                rhs: Expr::Tuple(vec![var("b"), var("a")]),
            }],
        ),
        swap_loop(
            "swap_temp",
            vec![
                Stmt::assign("t", var("a")),
                Stmt::assign("a", var("b")),
                Stmt::assign("b", var("t")),
            ],
        ),
    ]);
    for name in ["swap_pattern", "swap_temp"] {
        assert_eq!(run_both(&mut jit, name, vec![Value::Int(0)]), Value::Int(12), "{name}");
        assert_eq!(run_both(&mut jit, name, vec![Value::Int(1)]), Value::Int(21), "{name}");
        assert_eq!(run_both(&mut jit, name, vec![Value::Int(3)]), Value::Int(21), "{name}");
        assert_eq!(run_both(&mut jit, name, vec![Value::Int(4)]), Value::Int(12), "{name}");
    }
}
