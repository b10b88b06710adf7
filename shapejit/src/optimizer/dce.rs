//! Dead store and dead merge elimination.
//!
//! An assignment to a variable nobody reads is dropped when evaluating its
//! right-hand side cannot store into memory; merge entries whose result is
//! never read are dropped unconditionally.

use super::OptimizationPass;
use crate::analysis::use_count;
use crate::error::JitResult;
use crate::ir::{Lhs, Phi, Stmt, TypedExpr, TypedExprKind, TypedFn};
use std::collections::HashMap;

/// Dead code elimination over typed SSA
#[derive(Debug, Default)]
pub struct DeadCodeElimination;

impl DeadCodeElimination {
    pub fn new() -> Self {
        Self
    }
}

impl OptimizationPass for DeadCodeElimination {
    fn name(&self) -> &str {
        "dead_code_elimination"
    }

    fn optimize_function(&self, func: &mut TypedFn) -> JitResult<usize> {
        let counts = use_count(&*func);
        let pure_calls = !func.writes_memory;
        Ok(sweep(&mut func.body, &counts, pure_calls))
    }
}

fn is_used(counts: &HashMap<String, usize>, name: &str) -> bool {
    counts.get(name).is_some_and(|n| *n > 0)
}

/// Calls and maps may store when the function as a whole writes memory.
fn removable(rhs: &TypedExpr, pure_calls: bool) -> bool {
    pure_calls
        || !rhs.any(&|e: &TypedExpr| {
            matches!(
                e.kind,
                TypedExprKind::Call { .. } | TypedExprKind::Map { .. }
            )
        })
}

fn prune_phis(phis: &mut Vec<Phi<TypedExpr>>, counts: &HashMap<String, usize>) -> usize {
    let before = phis.len();
    phis.retain(|phi| is_used(counts, &phi.result));
    before - phis.len()
}

fn sweep(block: &mut Vec<Stmt<TypedExpr>>, counts: &HashMap<String, usize>, pure_calls: bool) -> usize {
    let mut removed = 0;
    block.retain(|stmt| match stmt {
        Stmt::Assign {
            lhs: Lhs::Var(name),
            rhs,
        } if !is_used(counts, name) && removable(rhs, pure_calls) => {
            removed += 1;
            false
        }
        _ => true,
    });
    for stmt in block.iter_mut() {
        match stmt {
            Stmt::If {
                true_block,
                false_block,
                merge,
                ..
            } => {
                removed += sweep(true_block, counts, pure_calls);
                removed += sweep(false_block, counts, pure_calls);
                removed += prune_phis(merge, counts);
            }
            Stmt::While {
                body,
                merge_before,
                merge_after,
                ..
            } => {
                removed += sweep(body, counts, pure_calls);
                removed += prune_phis(merge_before, counts);
                removed += prune_phis(merge_after, counts);
            }
            _ => {}
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, TypedFnId};
    use crate::types::JitType;
    use std::collections::BTreeMap;

    fn int_var(name: &str) -> TypedExpr {
        TypedExpr::var(name, JitType::INT64)
    }

    fn add(l: TypedExpr, r: TypedExpr) -> TypedExpr {
        TypedExpr::binop(BinOp::Add, l, r, JitType::INT64)
    }

    fn call() -> TypedExpr {
        TypedExpr::new(
            TypedExprKind::Call {
                target: TypedFnId(7),
                args: vec![int_var("x")],
            },
            JitType::INT64,
        )
    }

    fn function(body: Vec<Stmt<TypedExpr>>, writes_memory: bool) -> TypedFn {
        TypedFn {
            id: TypedFnId(0),
            name: "f_0".to_string(),
            untyped: "f".to_string(),
            params: vec!["x".to_string(), "c".to_string()],
            input_types: vec![JitType::INT64, JitType::BOOL],
            type_env: BTreeMap::new(),
            body,
            return_type: JitType::INT64,
            writes_memory,
        }
    }

    #[test]
    fn test_removes_unused_assign_and_merge() {
        let mut f = function(
            vec![
                Stmt::assign("dead.1", add(int_var("x"), TypedExpr::int(1))),
                Stmt::If {
                    cond: TypedExpr::var("c", JitType::BOOL),
                    true_block: vec![Stmt::assign("t.1", add(int_var("x"), TypedExpr::int(2)))],
                    false_block: vec![],
                    merge: vec![Phi::new("m.1", int_var("t.1"), int_var("x"))],
                },
                Stmt::Return(int_var("x")),
            ],
            false,
        );
        let pass = DeadCodeElimination::new();
        // first round drops dead.1 and the merge, second round t.1
        assert_eq!(pass.optimize_function(&mut f).unwrap(), 2);
        assert_eq!(pass.optimize_function(&mut f).unwrap(), 1);
        assert_eq!(pass.optimize_function(&mut f).unwrap(), 0);
        assert_eq!(f.body.len(), 2);
    }

    #[test]
    fn test_keeps_calls_in_writing_functions() {
        let mut f = function(
            vec![
                Stmt::assign("r.1", call()),
                Stmt::Return(int_var("x")),
            ],
            true,
        );
        assert_eq!(DeadCodeElimination::new().optimize_function(&mut f).unwrap(), 0);

        let mut pure = function(
            vec![
                Stmt::assign("r.1", call()),
                Stmt::Return(int_var("x")),
            ],
            false,
        );
        assert_eq!(DeadCodeElimination::new().optimize_function(&mut pure).unwrap(), 1);
    }
}
