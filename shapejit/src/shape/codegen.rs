//! Lowering of symbolic shapes to typed IR.

use super::SymValue;
use crate::error::{JitError, JitResult};
use crate::ir::{BinOp, TypedExpr, TypedExprKind};
use crate::types::JitType;

/// Typed IR computing a result shape from a function's arguments.
///
/// Evaluate by binding `params` to the arguments, then each binding in
/// order, then `shape`.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeCode {
    pub params: Vec<String>,
    pub bindings: Vec<(String, TypedExpr)>,
    pub shape: TypedExpr,
}

/// Lower `shape` (over the free variables of `inputs`) into shape code.
///
/// A scalar result has the empty shape. Otherwise every scalar reachable
/// from the inputs is bound to `$shape{n}`, numbered like the symbolic
/// inputs.
pub fn make_shape_expr(shape: &SymValue, inputs: &[(String, JitType)]) -> JitResult<ShapeCode> {
    let params = inputs.iter().map(|(name, _)| name.clone()).collect();
    if shape.is_scalar() {
        return Ok(ShapeCode {
            params,
            bindings: Vec::new(),
            shape: TypedExpr::tuple(Vec::new()),
        });
    }

    let mut accessors = Vec::new();
    for (name, ty) in inputs {
        collect_accessors(TypedExpr::var(name, ty.clone()), &mut accessors)?;
    }
    let bindings: Vec<(String, TypedExpr)> = accessors
        .into_iter()
        .enumerate()
        .map(|(n, access)| (format!("$shape{n}"), access))
        .collect();
    let shape = lower(shape, &bindings)?;
    Ok(ShapeCode {
        params,
        bindings,
        shape,
    })
}

/// Scalar-valued accessors into `base`, in symbolic input order
fn collect_accessors(base: TypedExpr, out: &mut Vec<TypedExpr>) -> JitResult<()> {
    match base.ty.clone() {
        JitType::Scalar(_) => out.push(base),
        JitType::Array { rank, .. } => {
            let shape = TypedExpr::new(
                TypedExprKind::Shape(Box::new(base)),
                JitType::Tuple(vec![JitType::INT64; rank]),
            );
            for axis in 0..rank {
                out.push(TypedExpr::proj(shape.clone(), axis)?);
            }
        }
        JitType::Tuple(elts) => {
            for i in 0..elts.len() {
                collect_accessors(TypedExpr::proj(base.clone(), i)?, out)?;
            }
        }
        JitType::Closure { fixed, .. } => {
            for i in 0..fixed.len() {
                collect_accessors(TypedExpr::closure_elt(base.clone(), i)?, out)?;
            }
        }
        JitType::NoneType | JitType::Slice => {}
    }
    Ok(())
}

fn lower(value: &SymValue, bindings: &[(String, TypedExpr)]) -> JitResult<TypedExpr> {
    let arith = |op: BinOp, a: &SymValue, b: &SymValue| -> JitResult<TypedExpr> {
        Ok(TypedExpr::binop(
            op,
            lower(a, bindings)?,
            lower(b, bindings)?,
            JitType::INT64,
        ))
    };
    match value {
        SymValue::Const(c) => Ok(TypedExpr::int(*c)),
        SymValue::Var(n) => bindings
            .get(*n)
            .map(|(name, access)| TypedExpr::var(name, access.ty.clone()))
            .ok_or_else(|| JitError::InvalidShapeOperand(format!("no input for ${n}"))),
        SymValue::Add(a, b) => arith(BinOp::Add, a, b),
        SymValue::Sub(a, b) => arith(BinOp::Sub, a, b),
        SymValue::Mult(a, b) => arith(BinOp::Mult, a, b),
        SymValue::Div(a, b) => arith(BinOp::Div, a, b),
        SymValue::Mod(a, b) => arith(BinOp::Mod, a, b),
        SymValue::Max(a, b) => arith(BinOp::Max, a, b),
        SymValue::Dim { value, axis } => TypedExpr::proj(lower(value, bindings)?, *axis),
        SymValue::Shape(elts) | SymValue::Tuple(elts) => Ok(TypedExpr::tuple(
            elts.iter()
                .map(|e| lower(e, bindings))
                .collect::<JitResult<_>>()?,
        )),
        array @ (SymValue::ConstElts(_) | SymValue::Fill { .. } | SymValue::Range { .. }) => {
            lower(&SymValue::Shape(array.dims().unwrap_or_default()), bindings)
        }
        SymValue::UnknownScalar => Err(JitError::InvalidShapeOperand(
            "shape depends on an unknown scalar".to_string(),
        )),
        SymValue::Closure { func, .. } => Err(JitError::InvalidShapeOperand(format!(
            "closure over `{func}` in a shape"
        ))),
    }
}
