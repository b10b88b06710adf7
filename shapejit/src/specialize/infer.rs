//! Statement and expression typing.

use super::Specializer;
use crate::adverbs::{wrapper_arg_names, PrimOp};
use crate::error::{JitError, JitResult};
use crate::ir::{
    block_returns, ActualArgs, Const, Expr, Lhs, Phi, Stmt, TypedExpr, TypedExprKind, TypedFnId,
    UnaryOp,
};
use crate::linearize::{linearize, unpack_closure, Callable};
use crate::types::{num_outer_axes, JitType, ScalarKind};
use log::trace;
use std::collections::{BTreeMap, HashMap};

/// Typing state of the function being specialized
#[derive(Debug)]
pub(super) struct FunctionState {
    pub id: TypedFnId,
    name: String,
    env: HashMap<String, JitType>,
    returns: Vec<JitType>,
    pub writes_memory: bool,
}

impl FunctionState {
    pub fn new(id: TypedFnId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            env: HashMap::new(),
            returns: Vec::new(),
            writes_memory: false,
        }
    }

    pub fn bind(&mut self, name: &str, ty: JitType) {
        trace!("specialize: {}: `{name}`: {ty}", self.name);
        self.env.insert(name.to_string(), ty);
    }

    fn lookup(&self, name: &str) -> JitResult<JitType> {
        self.env
            .get(name)
            .cloned()
            .ok_or_else(|| JitError::UnboundVariable(format!("{name} (in `{}`)", self.name)))
    }

    /// Join of every typed return
    pub fn return_type(&self) -> JitResult<JitType> {
        let mut types = self.returns.iter();
        let Some(first) = types.next() else {
            return Ok(JitType::NoneType);
        };
        types.try_fold(first.clone(), |acc, t| acc.combine(t))
    }

    pub fn type_env(&self) -> BTreeMap<String, JitType> {
        self.env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

// ============================================================================
// Conversions
// ============================================================================

/// Fold a conversion of a literal where the result is exact.
fn fold_cast(value: Const, kind: ScalarKind) -> Option<Const> {
    match (value, kind) {
        (Const::Int(i), ScalarKind::Float64) => Some(Const::Float(i as f64)),
        (Const::Int(i), ScalarKind::Bool) => Some(Const::Bool(i != 0)),
        (Const::Bool(b), ScalarKind::Int64) => Some(Const::Int(b as i64)),
        (Const::Bool(b), ScalarKind::Float64) => Some(Const::Float(b as i64 as f64)),
        (Const::Float(x), ScalarKind::Int64) => Some(Const::Int(x as i64)),
        (Const::Float(x), ScalarKind::Bool) => Some(Const::Bool(x != 0.0)),
        _ => None,
    }
}

/// Convert a scalar, or an array's elements, to `kind`.
pub(crate) fn cast(expr: TypedExpr, kind: ScalarKind) -> TypedExpr {
    let ty = match &expr.ty {
        JitType::Array { rank, .. } => JitType::array(kind, *rank),
        _ => JitType::Scalar(kind),
    };
    if ty == expr.ty {
        return expr;
    }
    if let Some(folded) = expr.as_const().and_then(|c| fold_cast(c, kind)) {
        return TypedExpr::constant(folded);
    }
    TypedExpr::new(
        TypedExprKind::Cast {
            value: Box::new(expr),
            to: kind,
        },
        ty,
    )
}

/// Convert `expr` to `target`, which must be a join of its type.
pub(crate) fn coerce(expr: TypedExpr, target: &JitType) -> JitResult<TypedExpr> {
    if expr.ty == *target {
        return Ok(expr);
    }
    let from = expr.ty.clone();
    match (&from, target) {
        (JitType::Scalar(_), JitType::Scalar(kind)) => Ok(cast(expr, *kind)),
        (JitType::Array { rank: a, .. }, JitType::Array { elt, rank: b }) if a == b => {
            Ok(cast(expr, *elt))
        }
        (JitType::Tuple(src), JitType::Tuple(dst)) if src.len() == dst.len() => {
            let elts = match expr.kind {
                TypedExprKind::Tuple(elts) => elts,
                _ => (0..dst.len())
                    .map(|i| TypedExpr::proj(expr.clone(), i))
                    .collect::<JitResult<Vec<_>>>()?,
            };
            elts.into_iter()
                .zip(dst)
                .map(|(e, t)| coerce(e, t))
                .collect::<JitResult<Vec<_>>>()
                .map(TypedExpr::tuple)
        }
        _ => Err(JitError::type_error(
            format!("can't convert {from} to {target}"),
            &expr,
        )),
    }
}

/// Cast every return in `body` to the function's final return type.
pub(super) fn coerce_returns(body: &mut [Stmt<TypedExpr>], ty: &JitType) -> JitResult<()> {
    for stmt in body {
        match stmt {
            Stmt::Return(e) if e.ty != *ty => {
                let value = std::mem::replace(e, TypedExpr::constant(Const::None));
                *e = coerce(value, ty)?;
            }
            Stmt::If {
                true_block,
                false_block,
                ..
            } => {
                coerce_returns(true_block, ty)?;
                coerce_returns(false_block, ty)?;
            }
            Stmt::While { body, .. } => coerce_returns(body, ty)?,
            _ => {}
        }
    }
    Ok(())
}

/// Type of `array[index]` for an array of `elt` and `rank`.
///
/// Integer components drop an axis, slices keep it, missing trailing
/// components select the whole axis.
pub(crate) fn index_result_type(elt: ScalarKind, rank: usize, index: &JitType) -> Option<JitType> {
    let parts: Vec<&JitType> = match index {
        JitType::Tuple(parts) => parts.iter().collect(),
        other => vec![other],
    };
    if parts.len() > rank {
        return None;
    }
    let mut dropped = 0;
    for part in parts {
        match part {
            JitType::Scalar(k) if k.is_int() || *k == ScalarKind::Bool => dropped += 1,
            JitType::Slice => {}
            _ => return None,
        }
    }
    Some(JitType::array(elt, rank - dropped))
}

fn is_int_like(ty: &JitType) -> bool {
    matches!(ty, JitType::Scalar(k) if k.is_int() || *k == ScalarKind::Bool)
}

// ============================================================================
// Statements
// ============================================================================

impl Specializer<'_> {
    pub(super) fn type_block(
        &mut self,
        st: &mut FunctionState,
        block: &[Stmt<Expr>],
    ) -> JitResult<Vec<Stmt<TypedExpr>>> {
        block.iter().map(|stmt| self.type_stmt(st, stmt)).collect()
    }

    fn type_stmt(&mut self, st: &mut FunctionState, stmt: &Stmt<Expr>) -> JitResult<Stmt<TypedExpr>> {
        match stmt {
            Stmt::Assign { lhs, rhs } => {
                let rhs = self.type_expr(st, rhs)?;
                match lhs {
                    Lhs::Index { value, index } => self.type_store(st, value, index, rhs),
                    pattern => {
                        let lhs = self.bind_pattern(st, pattern, &rhs.ty)?;
                        Ok(Stmt::Assign { lhs, rhs })
                    }
                }
            }
            Stmt::If {
                cond,
                true_block,
                false_block,
                merge,
            } => {
                let cond = self.type_cond(st, cond)?;
                let true_block = self.type_block(st, true_block)?;
                let false_block = self.type_block(st, false_block)?;
                let (t_dead, f_dead) = (block_returns(&true_block), block_returns(&false_block));
                let mut typed = Vec::with_capacity(merge.len());
                for phi in merge {
                    let left = self.type_expr(st, &phi.left)?;
                    let right = self.type_expr(st, &phi.right)?;
                    let ty = match (t_dead, f_dead) {
                        (true, _) => right.ty.clone(),
                        (_, true) => left.ty.clone(),
                        _ => left.ty.combine(&right.ty)?,
                    };
                    typed.push(Phi::new(
                        phi.result.clone(),
                        coerce(left, &ty)?,
                        coerce(right, &ty)?,
                    ));
                    st.bind(&phi.result, ty);
                }
                Ok(Stmt::If {
                    cond,
                    true_block,
                    false_block,
                    merge: typed,
                })
            }
            Stmt::While {
                cond,
                body,
                merge_before,
                merge_after,
            } => self.type_loop(st, cond, body, merge_before, merge_after),
            Stmt::Return(e) => {
                let e = self.type_expr(st, e)?;
                st.returns.push(e.ty.clone());
                self.cache.note_return(st.id, &e.ty)?;
                Ok(Stmt::Return(e))
            }
        }
    }

    fn bind_pattern(
        &mut self,
        st: &mut FunctionState,
        lhs: &Lhs<Expr>,
        ty: &JitType,
    ) -> JitResult<Lhs<TypedExpr>> {
        match lhs {
            Lhs::Var(name) => {
                st.bind(name, ty.clone());
                Ok(Lhs::Var(name.clone()))
            }
            Lhs::Tuple(elts) => {
                let JitType::Tuple(types) = ty else {
                    return Err(JitError::type_error(
                        format!("can't destructure a value of type {ty}"),
                        "tuple pattern",
                    ));
                };
                if types.len() != elts.len() {
                    return Err(JitError::type_error(
                        format!(
                            "can't unpack {} values into {} targets",
                            types.len(),
                            elts.len()
                        ),
                        ty,
                    ));
                }
                elts.iter()
                    .zip(types)
                    .map(|(e, t)| self.bind_pattern(st, e, t))
                    .collect::<JitResult<Vec<_>>>()
                    .map(Lhs::Tuple)
            }
            Lhs::Index { value, index } => {
                let value = self.type_expr(st, value)?;
                let index = self.type_expr(st, index)?;
                if !value.ty.is_array() {
                    return Err(JitError::type_error("store into a non-array", &value));
                }
                st.writes_memory = true;
                Ok(Lhs::Index { value, index })
            }
        }
    }

    fn type_store(
        &mut self,
        st: &mut FunctionState,
        value: &Expr,
        index: &Expr,
        rhs: TypedExpr,
    ) -> JitResult<Stmt<TypedExpr>> {
        let value = self.type_expr(st, value)?;
        let index = self.type_expr(st, index)?;
        let JitType::Array { elt, rank } = value.ty else {
            return Err(JitError::type_error("store into a non-array", &value));
        };
        let selection = index_result_type(elt, rank, &index.ty).ok_or_else(|| {
            JitError::type_error(format!("can't index {} with {}", value.ty, index.ty), &index)
        })?;
        let rhs = match &rhs.ty {
            JitType::Scalar(_) => cast(rhs, elt),
            JitType::Array { rank, .. } if *rank == selection.rank() => cast(rhs, elt),
            other => {
                return Err(JitError::type_error(
                    format!("can't store {other} into a selection of type {selection}"),
                    &rhs,
                ))
            }
        };
        st.writes_memory = true;
        Ok(Stmt::Assign {
            lhs: Lhs::Index { value, index },
            rhs,
        })
    }

    fn type_loop(
        &mut self,
        st: &mut FunctionState,
        cond: &Expr,
        body: &[Stmt<Expr>],
        merge_before: &[Phi<Expr>],
        merge_after: &[Phi<Expr>],
    ) -> JitResult<Stmt<TypedExpr>> {
        let inits = merge_before
            .iter()
            .map(|phi| self.type_expr(st, &phi.left))
            .collect::<JitResult<Vec<_>>>()?;
        let mut header: Vec<JitType> = inits.iter().map(|e| e.ty.clone()).collect();

        // widen the carried types until the body no longer changes them
        let max_rounds = self.config.max_loop_type_iterations;
        let mut round = 0;
        let (cond, body, backs) = loop {
            for (phi, ty) in merge_before.iter().zip(&header) {
                st.bind(&phi.result, ty.clone());
            }
            let typed_cond = self.type_cond(st, cond)?;
            let typed_body = self.type_block(st, body)?;
            let backs = merge_before
                .iter()
                .map(|phi| self.type_expr(st, &phi.right))
                .collect::<JitResult<Vec<_>>>()?;
            let widened = header
                .iter()
                .zip(&backs)
                .map(|(h, b)| h.combine(&b.ty))
                .collect::<JitResult<Vec<_>>>()?;
            round += 1;
            if widened == header {
                break (typed_cond, typed_body, backs);
            }
            if round >= max_rounds {
                return Err(JitError::type_error(
                    format!("loop-carried types did not settle after {max_rounds} rounds"),
                    cond,
                ));
            }
            header = widened;
        };

        let mut typed_before = Vec::with_capacity(merge_before.len());
        for (((phi, init), back), ty) in merge_before.iter().zip(inits).zip(backs).zip(&header) {
            typed_before.push(Phi::new(
                phi.result.clone(),
                coerce(init, ty)?,
                coerce(back, ty)?,
            ));
        }
        let mut typed_after = Vec::with_capacity(merge_after.len());
        for phi in merge_after {
            let left = self.type_expr(st, &phi.left)?;
            let right = self.type_expr(st, &phi.right)?;
            let ty = left.ty.combine(&right.ty)?;
            typed_after.push(Phi::new(
                phi.result.clone(),
                coerce(left, &ty)?,
                coerce(right, &ty)?,
            ));
            st.bind(&phi.result, ty);
        }
        Ok(Stmt::While {
            cond,
            body,
            merge_before: typed_before,
            merge_after: typed_after,
        })
    }

    fn type_cond(&mut self, st: &mut FunctionState, cond: &Expr) -> JitResult<TypedExpr> {
        let cond = self.type_expr(st, cond)?;
        match cond.ty {
            JitType::Scalar(_) | JitType::NoneType => Ok(cond),
            _ => Err(JitError::type_error(
                format!("condition of type {} has no truth value", cond.ty),
                &cond,
            )),
        }
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn type_all(&mut self, st: &mut FunctionState, exprs: &[Expr]) -> JitResult<Vec<TypedExpr>> {
        exprs.iter().map(|e| self.type_expr(st, e)).collect()
    }

    fn int_operand(&mut self, st: &mut FunctionState, expr: &Expr) -> JitResult<TypedExpr> {
        let typed = self.type_expr(st, expr)?;
        if !is_int_like(&typed.ty) {
            return Err(JitError::type_error(
                format!("expected an integer, got {}", typed.ty),
                expr,
            ));
        }
        Ok(cast(typed, ScalarKind::Int64))
    }

    fn opt_int_operand(
        &mut self,
        st: &mut FunctionState,
        expr: &Option<Box<Expr>>,
    ) -> JitResult<Option<Box<TypedExpr>>> {
        expr.as_deref()
            .map(|e| self.int_operand(st, e).map(Box::new))
            .transpose()
    }

    pub(super) fn type_expr(&mut self, st: &mut FunctionState, expr: &Expr) -> JitResult<TypedExpr> {
        match expr {
            Expr::Const(c) => Ok(TypedExpr::constant(*c)),
            Expr::Var(name) => Ok(TypedExpr::var(name, st.lookup(name)?)),
            Expr::FnRef(name) => self.closure_expr(name, Vec::new()),
            Expr::Tuple(elts) => Ok(TypedExpr::tuple(self.type_all(st, elts)?)),
            Expr::TupleProj { tuple, index } => TypedExpr::proj(self.type_expr(st, tuple)?, *index),
            Expr::Array(elts) => self.array_literal(st, elts, expr),
            Expr::Range { start, stop, step } => {
                let start = self.int_operand(st, start)?;
                let stop = self.int_operand(st, stop)?;
                let step = self.int_operand(st, step)?;
                Ok(TypedExpr::new(
                    TypedExprKind::Range {
                        start: Box::new(start),
                        stop: Box::new(stop),
                        step: Box::new(step),
                    },
                    JitType::array(ScalarKind::Int64, 1),
                ))
            }
            Expr::Slice { start, stop, step } => Ok(TypedExpr::new(
                TypedExprKind::Slice {
                    start: self.opt_int_operand(st, start)?,
                    stop: self.opt_int_operand(st, stop)?,
                    step: self.opt_int_operand(st, step)?,
                },
                JitType::Slice,
            )),
            Expr::Fill { shape, value } => {
                let shape = self.type_expr(st, shape)?;
                let rank = match &shape.ty {
                    t if is_int_like(t) => 1,
                    JitType::Tuple(dims) if !dims.is_empty() && dims.iter().all(is_int_like) => {
                        dims.len()
                    }
                    other => {
                        return Err(JitError::type_error(
                            format!("array shape must be an int or a tuple of ints, got {other}"),
                            expr,
                        ))
                    }
                };
                let value = self.type_expr(st, value)?;
                let JitType::Scalar(kind) = value.ty else {
                    return Err(JitError::type_error(
                        format!("fill value must be a scalar, got {}", value.ty),
                        expr,
                    ));
                };
                Ok(TypedExpr::new(
                    TypedExprKind::Fill {
                        shape: Box::new(shape),
                        value: Box::new(value),
                    },
                    JitType::array(kind, rank),
                ))
            }
            Expr::Index { value, index } => {
                let value = self.type_expr(st, value)?;
                let index = self.type_expr(st, index)?;
                self.type_index(value, index, expr)
            }
            Expr::BinOp { op, left, right } => {
                let left = self.type_expr(st, left)?;
                let right = self.type_expr(st, right)?;
                if left.ty.is_array() || right.ty.is_array() {
                    let prim = self
                        .adverbs
                        .primitive_wrapper(self.registry, PrimOp::Binary(*op))?;
                    return self.type_map(st, Callable::Function(prim), vec![left, right], None);
                }
                let (Some(ka), Some(kb)) = (scalar_of(&left.ty), scalar_of(&right.ty)) else {
                    return Err(JitError::type_error(
                        format!(
                            "unsupported operand types {} and {} for `{}`",
                            left.ty,
                            right.ty,
                            op.symbol()
                        ),
                        expr,
                    ));
                };
                Ok(if op.is_logical() {
                    TypedExpr::binop(
                        *op,
                        cast(left, ScalarKind::Bool),
                        cast(right, ScalarKind::Bool),
                        JitType::BOOL,
                    )
                } else if op.is_comparison() {
                    let kind = ka.promote(kb);
                    TypedExpr::binop(*op, cast(left, kind), cast(right, kind), JitType::BOOL)
                } else {
                    let kind = ka.arith(kb);
                    TypedExpr::binop(
                        *op,
                        cast(left, kind),
                        cast(right, kind),
                        JitType::Scalar(kind),
                    )
                })
            }
            Expr::UnaryOp { op, operand } => {
                let operand = self.type_expr(st, operand)?;
                if operand.ty.is_array() {
                    let prim = self
                        .adverbs
                        .primitive_wrapper(self.registry, PrimOp::Unary(*op))?;
                    return self.type_map(st, Callable::Function(prim), vec![operand], None);
                }
                let Some(kind) = scalar_of(&operand.ty) else {
                    return Err(JitError::type_error(
                        format!("bad operand type {} for `{}`", operand.ty, op.symbol()),
                        expr,
                    ));
                };
                let (operand, ty) = match op {
                    UnaryOp::Neg => {
                        let kind = kind.arith(kind);
                        (cast(operand, kind), JitType::Scalar(kind))
                    }
                    UnaryOp::Not => (operand, JitType::BOOL),
                };
                Ok(TypedExpr::new(
                    TypedExprKind::UnaryOp {
                        op: *op,
                        operand: Box::new(operand),
                    },
                    ty,
                ))
            }
            Expr::Len(value) => {
                let value = self.type_expr(st, value)?;
                match &value.ty {
                    JitType::Tuple(elts) => Ok(TypedExpr::int(elts.len() as i64)),
                    JitType::Array { .. } => Ok(TypedExpr::new(
                        TypedExprKind::Len(Box::new(value)),
                        JitType::INT64,
                    )),
                    other => Err(JitError::type_error(format!("len() of {other}"), expr)),
                }
            }
            Expr::Shape(value) => {
                let value = self.type_expr(st, value)?;
                match &value.ty {
                    JitType::Array { rank, .. } => {
                        let ty = JitType::Tuple(vec![JitType::INT64; *rank]);
                        Ok(TypedExpr::new(TypedExprKind::Shape(Box::new(value)), ty))
                    }
                    JitType::Scalar(_) => Ok(TypedExpr::tuple(Vec::new())),
                    other => Err(JitError::type_error(format!("shape() of {other}"), expr)),
                }
            }
            Expr::Closure { func, args } => {
                let args = self.type_all(st, args)?;
                self.closure_expr(func, args)
            }
            Expr::Call { func, args } => {
                let callable = self.callee(st, func)?;
                let actuals = args.try_map(|a| self.type_expr(st, a))?;
                self.build_call(st, callable, actuals)
            }
            Expr::Map { func, args, axis } => {
                let callable = self.callee(st, func)?;
                let args = self.type_all(st, args)?;
                self.type_map(st, callable, args, *axis)
            }
        }
    }

    fn array_literal(
        &mut self,
        st: &mut FunctionState,
        elts: &[Expr],
        expr: &Expr,
    ) -> JitResult<TypedExpr> {
        let elts = self.type_all(st, elts)?;
        let Some(first) = elts.first() else {
            return Ok(TypedExpr::new(
                TypedExprKind::Array(Vec::new()),
                JitType::array(ScalarKind::Float64, 1),
            ));
        };
        let inner_rank = first.ty.rank();
        let mut kind: Option<ScalarKind> = None;
        for e in &elts {
            let k = e
                .ty
                .scalar_kind()
                .filter(|_| e.ty.rank() == inner_rank)
                .ok_or_else(|| {
                    JitError::type_error(
                        format!("array elements of type {} and {} don't stack", first.ty, e.ty),
                        expr,
                    )
                })?;
            kind = Some(kind.map_or(k, |prev| prev.promote(k)));
        }
        let kind = kind.unwrap_or(ScalarKind::Float64);
        let elts = elts.into_iter().map(|e| cast(e, kind)).collect();
        Ok(TypedExpr::new(
            TypedExprKind::Array(elts),
            JitType::array(kind, inner_rank + 1),
        ))
    }

    fn type_index(&mut self, value: TypedExpr, index: TypedExpr, expr: &Expr) -> JitResult<TypedExpr> {
        match &value.ty {
            JitType::Tuple(elts) => {
                let Some(i) = index.as_const().and_then(|c| c.as_int()) else {
                    return Err(JitError::type_error(
                        "tuple index must be a constant integer",
                        expr,
                    ));
                };
                let n = elts.len() as i64;
                let j = if i < 0 { i + n } else { i };
                if !(0..n).contains(&j) {
                    return Err(JitError::type_error(
                        format!("tuple index {i} out of range for {} elements", elts.len()),
                        expr,
                    ));
                }
                TypedExpr::proj(value, j as usize)
            }
            JitType::Array { elt, rank } => {
                let ty = index_result_type(*elt, *rank, &index.ty).ok_or_else(|| {
                    JitError::type_error(format!("can't index {} with {}", value.ty, index.ty), expr)
                })?;
                Ok(TypedExpr::new(
                    TypedExprKind::Index {
                        value: Box::new(value),
                        index: Box::new(index),
                    },
                    ty,
                ))
            }
            other => Err(JitError::type_error(format!("{other} is not indexable"), expr)),
        }
    }

    fn closure_expr(&mut self, func: &str, args: Vec<TypedExpr>) -> JitResult<TypedExpr> {
        self.registry.lookup(func)?;
        let fixed: Vec<JitType> = args.iter().map(|a| a.ty.clone()).collect();
        let id = self.registry.closure_identity(func, &fixed);
        Ok(TypedExpr::new(
            TypedExprKind::Closure {
                func: func.to_string(),
                id,
                args,
            },
            JitType::Closure {
                func: func.to_string(),
                fixed,
            },
        ))
    }

    /// Callable for the function position of a call or map
    fn callee(&mut self, st: &mut FunctionState, func: &Expr) -> JitResult<Callable<TypedExpr>> {
        match func {
            Expr::FnRef(name) => {
                self.registry.lookup(name)?;
                Ok(Callable::Function(name.clone()))
            }
            Expr::Closure { func, args } => {
                self.registry.lookup(func)?;
                Ok(Callable::Closure {
                    func: func.clone(),
                    fixed: self.type_all(st, args)?,
                })
            }
            other => {
                let value = self.type_expr(st, other)?;
                Callable::from_typed(value)
            }
        }
    }

    fn build_call(
        &mut self,
        st: &mut FunctionState,
        callable: Callable<TypedExpr>,
        actuals: ActualArgs<TypedExpr>,
    ) -> JitResult<TypedExpr> {
        let (untyped, lin) = linearize(self.registry, callable, actuals)?;
        let resolved = self.resolve(&untyped, lin.map(|e| e.ty.clone()), Some(st.id))?;
        st.writes_memory |= resolved.writes_memory;
        Ok(TypedExpr::new(
            TypedExprKind::Call {
                target: resolved.id,
                args: lin.supplied(),
            },
            resolved.return_type,
        ))
    }

    /// Type an elementwise application of `callable`.
    ///
    /// No array argument: a plain call. Several outer axes: a call of the
    /// nested-map wrapper. One axis: a single-axis map whose target is
    /// specialized on the element types.
    fn type_map(
        &mut self,
        st: &mut FunctionState,
        callable: Callable<TypedExpr>,
        args: Vec<TypedExpr>,
        axis: Option<usize>,
    ) -> JitResult<TypedExpr> {
        let types: Vec<JitType> = args.iter().map(|a| a.ty.clone()).collect();
        let depth = num_outer_axes(&types, axis)?;
        if depth == 0 {
            return self.build_call(st, callable, ActualArgs::positional(args));
        }
        let (func, fixed) = unpack_closure(callable);
        if depth > 1 {
            let names = wrapper_arg_names(args.len());
            let wrapper =
                self.adverbs
                    .nested_maps_with_fixed(self.registry, &func, depth, &names, fixed.len())?;
            let mut all = fixed;
            all.extend(args);
            return self.build_call(st, Callable::Function(wrapper), ActualArgs::positional(all));
        }

        let axis = axis.unwrap_or(0);
        let rank = types.iter().map(JitType::rank).max().unwrap_or(0);
        if axis >= rank {
            return Err(JitError::type_error(
                format!("axis {axis} out of range for arrays of rank {rank}"),
                &func,
            ));
        }
        let target = self.registry.lookup(&func)?;
        if target.args.starargs.is_some() {
            return Err(JitError::type_error(
                "can't map a function with variadic parameters",
                &func,
            ));
        }
        let mut elt_types: Vec<JitType> = fixed.iter().map(|e| e.ty.clone()).collect();
        elt_types.extend(types.iter().map(JitType::peel_axis));
        let lin = target
            .args
            .bind(&target.name, ActualArgs::positional(elt_types))?;
        let resolved = self.resolve(&target, lin, Some(st.id))?;
        st.writes_memory |= resolved.writes_memory;
        let ty = resolved.return_type.with_outer_axis().ok_or_else(|| {
            JitError::type_error(
                format!("map results of type {} can't be stacked", resolved.return_type),
                &func,
            )
        })?;
        Ok(TypedExpr::new(
            TypedExprKind::Map {
                target: resolved.id,
                fixed,
                args,
                axis,
            },
            ty,
        ))
    }
}

fn scalar_of(ty: &JitType) -> Option<ScalarKind> {
    match ty {
        JitType::Scalar(k) => Some(*k),
        _ => None,
    }
}
