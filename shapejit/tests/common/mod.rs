//! Shared helpers for integration tests
// Each test target uses a different subset of these helpers.
#![allow(dead_code)]

use shapejit::ir::{BinOp, Stmt};
use shapejit::{Expr, FormalArgs, FunctionDef, Jit, JitConfig, Value};

pub fn var(name: &str) -> Expr {
    Expr::var(name)
}

pub fn int(value: i64) -> Expr {
    Expr::int(value)
}

pub fn add(l: Expr, r: Expr) -> Expr {
    Expr::binop(BinOp::Add, l, r)
}

pub fn mul(l: Expr, r: Expr) -> Expr {
    Expr::binop(BinOp::Mult, l, r)
}

pub fn lt(l: Expr, r: Expr) -> Expr {
    Expr::binop(BinOp::Lt, l, r)
}

/// Definition with positional parameters only
pub fn def(name: &str, params: &[&str], body: Vec<Stmt<Expr>>) -> FunctionDef {
    FunctionDef::new(name, FormalArgs::new(params), body)
}

/// Driver with every definition registered
pub fn jit_with(defs: Vec<FunctionDef>) -> Jit {
    jit_with_config(JitConfig::default(), defs)
}

pub fn jit_with_config(config: JitConfig, defs: Vec<FunctionDef>) -> Jit {
    let mut jit = Jit::new(config);
    for d in defs {
        jit.define(d)
            .unwrap_or_else(|e| panic!("failed to define function: {e}"));
    }
    jit
}

/// Run `name` on the untyped interpreter and through the driver; both
/// results must agree
pub fn run_both(jit: &mut Jit, name: &str, args: Vec<Value>) -> Value {
    let expected = jit
        .session()
        .interpreter()
        .call_fn(name, args.clone())
        .unwrap_or_else(|e| panic!("interpreter failed on `{name}`: {e}"));
    let actual = jit
        .call(name, args)
        .unwrap_or_else(|e| panic!("jit failed on `{name}`: {e}"));
    assert_eq!(actual, expected, "interpreter and jit disagree on `{name}`");
    actual
}

/// `s = 0; i = 0; while i < n { s = s + i; i = i + 1 }; return s`
pub fn sum_below() -> FunctionDef {
    def(
        "sum_below",
        &["n"],
        vec![
            Stmt::assign("s", int(0)),
            Stmt::assign("i", int(0)),
            Stmt::while_loop(
                lt(var("i"), var("n")),
                vec![
                    Stmt::assign("s", add(var("s"), var("i"))),
                    Stmt::assign("i", add(var("i"), int(1))),
                ],
            ),
            Stmt::Return(var("s")),
        ],
    )
}
