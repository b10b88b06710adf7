//! What is statically known about the contents of array variables.
//!
//! Only three shapes of knowledge are tracked, all established at the
//! defining assignment:
//!
//! - every element equals one constant (a fill with a literal value)
//! - a rank-1 array of literal elements
//! - an arithmetic range whose start and step are atoms
//!
//! Stores through any alias would invalidate this, so functions that write
//! memory get no knowledge at all.

use crate::ir::{Const, Lhs, Stmt, TypedExpr, TypedExprKind, TypedFn};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayKnowledge {
    /// Every element of an array of `rank` is `value`
    ConstValue { value: Const, rank: usize },
    /// Rank-1 array with these literal elements
    ConstElts(Vec<Const>),
    /// `start + i * step` at position `i`
    Range { start: TypedExpr, step: TypedExpr },
}

/// Knowledge per SSA variable
pub type ArrayValues = HashMap<String, ArrayKnowledge>;

/// Collect knowledge for every array variable of `function`.
pub fn array_knowledge(function: &TypedFn) -> ArrayValues {
    let mut known = ArrayValues::new();
    if !function.writes_memory {
        collect(&function.body, &mut known);
    }
    known
}

fn collect(block: &[Stmt<TypedExpr>], known: &mut ArrayValues) {
    for stmt in block {
        match stmt {
            Stmt::Assign {
                lhs: Lhs::Var(name),
                rhs,
            } => {
                if let Some(k) = knowledge_of(rhs, known) {
                    known.insert(name.clone(), k);
                }
            }
            Stmt::If {
                true_block,
                false_block,
                ..
            } => {
                collect(true_block, known);
                collect(false_block, known);
            }
            Stmt::While { body, .. } => collect(body, known),
            _ => {}
        }
    }
}

/// Knowledge about the array `expr` evaluates to, given what is known about
/// variables.
pub fn knowledge_of(expr: &TypedExpr, known: &ArrayValues) -> Option<ArrayKnowledge> {
    match &expr.kind {
        TypedExprKind::Var(name) => known.get(name).cloned(),
        TypedExprKind::Fill { value, .. } => Some(ArrayKnowledge::ConstValue {
            value: value.as_const()?,
            rank: expr.ty.rank(),
        }),
        TypedExprKind::Array(elts) if expr.ty.rank() == 1 => elts
            .iter()
            .map(TypedExpr::as_const)
            .collect::<Option<Vec<_>>>()
            .map(ArrayKnowledge::ConstElts),
        TypedExprKind::Range { start, step, .. } if start.is_atom() && step.is_atom() => {
            Some(ArrayKnowledge::Range {
                start: (**start).clone(),
                step: (**step).clone(),
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::TypedFnId;
    use crate::types::{JitType, ScalarKind};
    use std::collections::BTreeMap;

    fn function(body: Vec<Stmt<TypedExpr>>, writes_memory: bool) -> TypedFn {
        TypedFn {
            id: TypedFnId(0),
            name: "f_0".to_string(),
            untyped: "f".to_string(),
            params: vec!["n".to_string()],
            input_types: vec![JitType::INT64],
            type_env: BTreeMap::new(),
            body,
            return_type: JitType::NoneType,
            writes_memory,
        }
    }

    fn range_of(start: TypedExpr, stop: TypedExpr) -> TypedExpr {
        TypedExpr::new(
            TypedExprKind::Range {
                start: Box::new(start),
                stop: Box::new(stop),
                step: Box::new(TypedExpr::int(2)),
            },
            JitType::array(ScalarKind::Int64, 1),
        )
    }

    #[test]
    fn test_collects_ranges_and_literals() {
        let lit = TypedExpr::new(
            TypedExprKind::Array(vec![TypedExpr::int(10), TypedExpr::int(20)]),
            JitType::array(ScalarKind::Int64, 1),
        );
        let body = vec![
            Stmt::assign("r", range_of(TypedExpr::var("n", JitType::INT64), TypedExpr::int(9))),
            Stmt::assign("l", lit),
            Stmt::Return(TypedExpr::constant(Const::None)),
        ];
        let known = array_knowledge(&function(body, false));
        assert_eq!(
            known["r"],
            ArrayKnowledge::Range {
                start: TypedExpr::var("n", JitType::INT64),
                step: TypedExpr::int(2),
            }
        );
        assert_eq!(
            known["l"],
            ArrayKnowledge::ConstElts(vec![Const::Int(10), Const::Int(20)])
        );
    }

    #[test]
    fn test_writing_functions_know_nothing() {
        let body = vec![Stmt::assign(
            "r",
            range_of(TypedExpr::int(0), TypedExpr::int(9)),
        )];
        assert!(array_knowledge(&function(body, true)).is_empty());
    }

    #[test]
    fn test_compound_start_not_tracked() {
        let start = TypedExpr::binop(
            crate::ir::BinOp::Add,
            TypedExpr::var("n", JitType::INT64),
            TypedExpr::int(1),
            JitType::INT64,
        );
        let expr = range_of(start, TypedExpr::int(9));
        assert_eq!(knowledge_of(&expr, &ArrayValues::new()), None);
    }
}
