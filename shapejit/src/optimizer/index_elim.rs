//! Index elimination.
//!
//! Replaces reads `x[i]` of arrays whose contents are statically known by
//! the element itself: a constant for fills and literal arrays, and
//! `start + i * step` for ranges. Non-literal indices into a range are
//! assumed to be in bounds.

use super::OptimizationPass;
use crate::analysis::{array_knowledge, array_values::knowledge_of, ArrayKnowledge, ArrayValues};
use crate::error::JitResult;
use crate::ir::visit::for_each_expr_mut;
use crate::ir::{BinOp, Const, TypedExpr, TypedExprKind, TypedFn};
use crate::types::JitType;
use log::trace;

/// Rewrites reads from known arrays into scalar expressions
#[derive(Debug, Default)]
pub struct IndexElimination;

impl IndexElimination {
    pub fn new() -> Self {
        Self
    }
}

impl OptimizationPass for IndexElimination {
    fn name(&self) -> &str {
        "index_elimination"
    }

    fn optimize_function(&self, func: &mut TypedFn) -> JitResult<usize> {
        let known = array_knowledge(func);
        if known.is_empty() {
            return Ok(0);
        }
        let mut changes = 0;
        for_each_expr_mut(&mut func.body, &mut |expr: &mut TypedExpr| {
            expr.rewrite(&mut |e: &mut TypedExpr| {
                if let Some(replacement) = eliminate(e, &known) {
                    trace!("index_elimination: replaced an index of type {}", e.ty);
                    *e = replacement;
                    changes += 1;
                }
            })
        });
        Ok(changes)
    }
}

fn is_int_scalar(expr: &TypedExpr) -> bool {
    matches!(&expr.ty, JitType::Scalar(kind) if kind.is_int())
}

fn literal_int(expr: &TypedExpr) -> Option<i64> {
    match expr.as_const()? {
        Const::Int(i) => Some(i),
        _ => None,
    }
}

/// Replacement for `expr` if it reads a known array
fn eliminate(expr: &TypedExpr, known: &ArrayValues) -> Option<TypedExpr> {
    let TypedExprKind::Index { value, index } = &expr.kind else {
        return None;
    };
    if !expr.ty.is_scalar() {
        return None;
    }
    match knowledge_of(value, known)? {
        ArrayKnowledge::ConstValue { value, rank } => {
            let full = match &index.kind {
                TypedExprKind::Tuple(elts) => {
                    elts.len() == rank && elts.iter().all(is_int_scalar)
                }
                _ => rank == 1 && is_int_scalar(index),
            };
            full.then(|| TypedExpr::new(TypedExprKind::Const(value), expr.ty.clone()))
        }
        ArrayKnowledge::ConstElts(elts) => {
            let i = literal_int(index)?;
            let n = elts.len() as i64;
            let j = if i < 0 { i + n } else { i };
            if !(0..n).contains(&j) {
                return None;
            }
            Some(TypedExpr::new(
                TypedExprKind::Const(elts[j as usize]),
                expr.ty.clone(),
            ))
        }
        ArrayKnowledge::Range { start, step } => {
            if !is_int_scalar(index) || literal_int(index).is_some_and(|i| i < 0) {
                return None;
            }
            range_element(start, (**index).clone(), step)
        }
    }
}

/// `start + index * step`, folded where the operands are literals; `None`
/// when folding the literals overflows
fn range_element(start: TypedExpr, index: TypedExpr, step: TypedExpr) -> Option<TypedExpr> {
    let folded_offset = match (literal_int(&index), literal_int(&step)) {
        (Some(i), Some(s)) => Some(i.checked_mul(s)?),
        _ => None,
    };
    Some(match (literal_int(&start), folded_offset) {
        (Some(s), Some(offset)) => TypedExpr::int(s.checked_add(offset)?),
        (_, Some(offset)) => TypedExpr::binop(BinOp::Add, start, TypedExpr::int(offset), JitType::INT64),
        _ => TypedExpr::binop(
            BinOp::Add,
            start,
            TypedExpr::binop(BinOp::Mult, index, step, JitType::INT64),
            JitType::INT64,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Stmt, TypedFnId};
    use crate::types::ScalarKind;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn function(body: Vec<crate::ir::Stmt<TypedExpr>>, writes_memory: bool) -> TypedFn {
        TypedFn {
            id: TypedFnId(0),
            name: "f_0".to_string(),
            untyped: "f".to_string(),
            params: vec!["n".to_string(), "i".to_string()],
            input_types: vec![JitType::INT64, JitType::INT64],
            type_env: BTreeMap::new(),
            body,
            return_type: JitType::INT64,
            writes_memory,
        }
    }

    fn index(array: &str, ty: JitType, idx: TypedExpr, elt: JitType) -> TypedExpr {
        TypedExpr::new(
            TypedExprKind::Index {
                value: Box::new(TypedExpr::var(array, ty)),
                index: Box::new(idx),
            },
            elt,
        )
    }

    fn vec_ty() -> JitType {
        JitType::array(ScalarKind::Int64, 1)
    }

    fn returned(f: &TypedFn) -> &TypedExpr {
        match f.body.last() {
            Some(Stmt::Return(e)) => e,
            other => panic!("expected a return, got {other:?}"),
        }
    }

    #[test]
    fn test_literal_array_element() {
        let lit = TypedExpr::new(
            TypedExprKind::Array(vec![TypedExpr::int(10), TypedExpr::int(20), TypedExpr::int(30)]),
            vec_ty(),
        );
        let mut f = function(
            vec![
                Stmt::assign("a", lit),
                Stmt::Return(index("a", vec_ty(), TypedExpr::int(-1), JitType::INT64)),
            ],
            false,
        );
        assert_eq!(IndexElimination::new().optimize_function(&mut f).unwrap(), 1);
        assert_eq!(returned(&f), &TypedExpr::int(30));
    }

    #[test]
    fn test_out_of_range_literal_kept() {
        let lit = TypedExpr::new(TypedExprKind::Array(vec![TypedExpr::int(1)]), vec_ty());
        let mut f = function(
            vec![
                Stmt::assign("a", lit),
                Stmt::Return(index("a", vec_ty(), TypedExpr::int(3), JitType::INT64)),
            ],
            false,
        );
        assert_eq!(IndexElimination::new().optimize_function(&mut f).unwrap(), 0);
    }

    #[test]
    fn test_fill_with_full_index() {
        let mat = JitType::array(ScalarKind::Float64, 2);
        let fill = TypedExpr::new(
            TypedExprKind::Fill {
                shape: Box::new(TypedExpr::tuple(vec![TypedExpr::int(2), TypedExpr::int(3)])),
                value: Box::new(TypedExpr::constant(Const::Float(1.5))),
            },
            mat.clone(),
        );
        let idx = TypedExpr::tuple(vec![
            TypedExpr::var("i", JitType::INT64),
            TypedExpr::int(0),
        ]);
        let mut f = function(
            vec![
                Stmt::assign("m", fill),
                Stmt::Return(index("m", mat, idx, JitType::FLOAT64)),
            ],
            false,
        );
        assert_eq!(IndexElimination::new().optimize_function(&mut f).unwrap(), 1);
        assert_eq!(returned(&f), &TypedExpr::constant(Const::Float(1.5)));
    }

    #[test]
    fn test_range_with_symbolic_index() {
        let range = TypedExpr::new(
            TypedExprKind::Range {
                start: Box::new(TypedExpr::int(5)),
                stop: Box::new(TypedExpr::var("n", JitType::INT64)),
                step: Box::new(TypedExpr::int(2)),
            },
            vec_ty(),
        );
        let mut f = function(
            vec![
                Stmt::assign("r", range),
                Stmt::Return(index(
                    "r",
                    vec_ty(),
                    TypedExpr::var("i", JitType::INT64),
                    JitType::INT64,
                )),
            ],
            false,
        );
        IndexElimination::new().optimize_function(&mut f).unwrap();
        let expected = TypedExpr::binop(
            BinOp::Add,
            TypedExpr::int(5),
            TypedExpr::binop(
                BinOp::Mult,
                TypedExpr::var("i", JitType::INT64),
                TypedExpr::int(2),
                JitType::INT64,
            ),
            JitType::INT64,
        );
        assert_eq!(returned(&f), &expected);
    }

    #[test]
    fn test_constant_range_folds() {
        let range = TypedExpr::new(
            TypedExprKind::Range {
                start: Box::new(TypedExpr::int(5)),
                stop: Box::new(TypedExpr::int(100)),
                step: Box::new(TypedExpr::int(2)),
            },
            vec_ty(),
        );
        let mut f = function(
            vec![
                Stmt::assign("r", range),
                Stmt::Return(index("r", vec_ty(), TypedExpr::int(3), JitType::INT64)),
            ],
            false,
        );
        IndexElimination::new().optimize_function(&mut f).unwrap();
        assert_eq!(returned(&f), &TypedExpr::int(11));
    }

    #[test]
    fn test_overflowing_range_fold_kept() {
        let range = TypedExpr::new(
            TypedExprKind::Range {
                start: Box::new(TypedExpr::int(1)),
                stop: Box::new(TypedExpr::int(i64::MAX)),
                step: Box::new(TypedExpr::int(i64::MAX / 2)),
            },
            vec_ty(),
        );
        let original = index("r", vec_ty(), TypedExpr::int(3), JitType::INT64);
        let mut f = function(
            vec![Stmt::assign("r", range), Stmt::Return(original.clone())],
            false,
        );
        assert_eq!(IndexElimination::new().optimize_function(&mut f).unwrap(), 0);
        assert_eq!(returned(&f), &original);
    }

    #[test]
    fn test_writing_function_untouched() {
        let lit = TypedExpr::new(TypedExprKind::Array(vec![TypedExpr::int(1)]), vec_ty());
        let mut f = function(
            vec![
                Stmt::assign("a", lit),
                Stmt::Return(index("a", vec_ty(), TypedExpr::int(0), JitType::INT64)),
            ],
            true,
        );
        assert_eq!(IndexElimination::new().optimize_function(&mut f).unwrap(), 0);
    }
}
