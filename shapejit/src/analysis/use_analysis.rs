//! Liveness and use counts.

use crate::ir::visit::block_reads;
use crate::ir::{Expr, ReadsVars, Stmt, TypedExpr, TypedFn, UntypedFn};
use std::collections::{HashMap, HashSet};

/// A function body the analyses can walk, typed or untyped.
pub trait FunctionBody {
    type Expr: ReadsVars;

    /// Names bound on entry
    fn param_names(&self) -> Vec<String>;

    fn stmts(&self) -> &[Stmt<Self::Expr>];
}

impl FunctionBody for UntypedFn {
    type Expr = Expr;

    fn param_names(&self) -> Vec<String> {
        self.args.all_names()
    }

    fn stmts(&self) -> &[Stmt<Expr>] {
        &self.body
    }
}

impl FunctionBody for TypedFn {
    type Expr = TypedExpr;

    fn param_names(&self) -> Vec<String> {
        self.params.clone()
    }

    fn stmts(&self) -> &[Stmt<TypedExpr>] {
        &self.body
    }
}

/// Formal parameters plus every variable read anywhere in the body.
pub fn live_vars<F: FunctionBody>(function: &F) -> HashSet<String> {
    let mut reads = Vec::new();
    block_reads(function.stmts(), &mut reads);
    function.param_names().into_iter().chain(reads).collect()
}

/// Read count of every variable. Formals start at one.
pub fn use_count<F: FunctionBody>(function: &F) -> HashMap<String, usize> {
    let mut counts: HashMap<String, usize> = function
        .param_names()
        .into_iter()
        .map(|name| (name, 1))
        .collect();
    let mut reads = Vec::new();
    block_reads(function.stmts(), &mut reads);
    for name in reads {
        *counts.entry(name).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, FormalArgs, Lhs, Phi};

    fn sample() -> UntypedFn {
        // t = (x, x); (a, b) = t; z[0] = a; if c: return a + a
        UntypedFn::new(
            "f",
            FormalArgs::new(&["x", "z", "c"]),
            vec![
                Stmt::assign("t", Expr::Tuple(vec![Expr::var("x"), Expr::var("x")])),
                Stmt::Assign {
                    lhs: Lhs::Tuple(vec![Lhs::Var("a".into()), Lhs::Var("b".into())]),
                    rhs: Expr::var("t"),
                },
                Stmt::store(Expr::var("z"), Expr::int(0), Expr::var("a")),
                Stmt::If {
                    cond: Expr::var("c"),
                    true_block: vec![Stmt::Return(Expr::binop(
                        BinOp::Add,
                        Expr::var("a"),
                        Expr::var("a"),
                    ))],
                    false_block: vec![],
                    merge: vec![Phi::new("m", Expr::var("x"), Expr::var("x"))],
                },
            ],
        )
    }

    #[test]
    fn test_use_count_seeds_formals() {
        let counts = use_count(&sample());
        assert_eq!(counts["x"], 1 + 2 + 2);
        assert_eq!(counts["z"], 2);
        assert_eq!(counts["c"], 2);
        assert_eq!(counts["a"], 3);
        assert_eq!(counts["t"], 1);
        // bound by the tuple pattern but never read
        assert!(!counts.contains_key("b"));
        assert!(!counts.contains_key("m"));
    }

    #[test]
    fn test_live_vars() {
        let live = live_vars(&sample());
        for name in ["x", "z", "c", "a", "t"] {
            assert!(live.contains(name), "{name} should be live");
        }
        assert!(!live.contains("b"));
    }
}
