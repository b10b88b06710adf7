//! Abstract evaluation of typed functions over symbolic values.

use super::{bind_inputs, join, unknown_of, SymValue};
use crate::error::{JitError, JitResult};
use crate::ir::{
    block_returns, Const, Lhs, Phi, Stmt, TypedExpr, TypedExprKind, TypedFn, TypedFnId, UnaryOp,
};
use crate::specialize::SpecializationCache;
use crate::types::JitType;
use crate::value::range_len;
use log::trace;
use std::collections::HashMap;

/// Rounds a loop gets before its carried values are widened
const LOOP_ROUNDS: usize = 4;

type Env = HashMap<String, SymValue>;

/// Shape evaluator over the published specializations of one session
#[derive(Debug)]
pub struct ShapeInference<'c> {
    functions: &'c SpecializationCache,
    /// Functions currently being evaluated, innermost last
    stack: Vec<TypedFnId>,
}

/// Per-function evaluation context
struct Frame<'f> {
    function: &'f TypedFn,
    env: Env,
    returns: Vec<SymValue>,
}

impl Frame<'_> {
    fn type_of(&self, name: &str) -> Option<&JitType> {
        self.function.type_env.get(name)
    }

    /// Array contents are only tracked when nothing can store into them
    fn tracks_contents(&self) -> bool {
        !self.function.writes_memory
    }
}

/// Normalized symbolic result shape of `function` over fresh inputs
pub fn call_shape_expr(functions: &SpecializationCache, function: &TypedFn) -> JitResult<SymValue> {
    let inputs = bind_inputs(&function.input_types);
    let result = ShapeInference::new(functions).eval_function(function, inputs)?;
    Ok(result.into_shape())
}

impl<'c> ShapeInference<'c> {
    pub fn new(functions: &'c SpecializationCache) -> Self {
        Self {
            functions,
            stack: Vec::new(),
        }
    }

    /// Result of `function` applied to `args` (one per parameter)
    pub fn eval_function(&mut self, function: &TypedFn, args: Vec<SymValue>) -> JitResult<SymValue> {
        if args.len() != function.params.len() {
            return Err(JitError::InvalidShapeOperand(format!(
                "`{}` takes {} arguments, got {}",
                function.name,
                function.params.len(),
                args.len()
            )));
        }
        let mut frame = Frame {
            function,
            env: function.params.iter().cloned().zip(args).collect(),
            returns: Vec::new(),
        };
        self.stack.push(function.id);
        let outcome = self.eval_block(&mut frame, &function.body);
        self.stack.pop();
        outcome?;

        let result = frame
            .returns
            .iter()
            .skip(1)
            .fold(frame.returns.first().cloned(), |acc, r| {
                acc.map(|a| join(&a, r))
            })
            .unwrap_or_else(|| unknown_of(&function.return_type));
        trace!("shape: `{}` returns {result}", function.name);
        Ok(result)
    }

    fn eval_block(&mut self, frame: &mut Frame<'_>, block: &[Stmt<TypedExpr>]) -> JitResult<()> {
        for stmt in block {
            match stmt {
                Stmt::Assign { lhs, rhs } => {
                    let value = self.eval(frame, rhs)?;
                    bind_lhs(frame, lhs, value);
                }
                Stmt::If {
                    true_block,
                    false_block,
                    merge,
                    ..
                } => {
                    let outer = frame.env.clone();
                    self.eval_block(frame, true_block)?;
                    let true_env = std::mem::replace(&mut frame.env, outer);
                    self.eval_block(frame, false_block)?;
                    let false_env = std::mem::take(&mut frame.env);
                    let (true_dead, false_dead) =
                        (block_returns(true_block), block_returns(false_block));

                    let mut env = false_env.clone();
                    env.extend(true_env.iter().map(|(k, v)| (k.clone(), v.clone())));
                    for phi in merge {
                        let left = self.eval_in(frame, &true_env, &phi.left)?;
                        let right = self.eval_in(frame, &false_env, &phi.right)?;
                        let value = match (true_dead, false_dead) {
                            (true, false) => right,
                            (false, true) => left,
                            _ => join(&left, &right),
                        };
                        env.insert(phi.result.clone(), value);
                    }
                    frame.env = env;
                }
                Stmt::While {
                    cond,
                    body,
                    merge_before,
                    merge_after,
                } => self.eval_loop(frame, cond, body, merge_before, merge_after)?,
                Stmt::Return(e) => {
                    let value = self.eval(frame, e)?;
                    frame.returns.push(value);
                }
            }
        }
        Ok(())
    }

    fn eval_loop(
        &mut self,
        frame: &mut Frame<'_>,
        cond: &TypedExpr,
        body: &[Stmt<TypedExpr>],
        merge_before: &[Phi<TypedExpr>],
        merge_after: &[Phi<TypedExpr>],
    ) -> JitResult<()> {
        let entry_env = frame.env.clone();
        let mut headers: Vec<SymValue> = merge_before
            .iter()
            .map(|phi| self.eval(frame, &phi.left))
            .collect::<JitResult<_>>()?;

        let mut settled = false;
        for _ in 0..LOOP_ROUNDS {
            frame.env = entry_env.clone();
            for (phi, value) in merge_before.iter().zip(&headers) {
                frame.env.insert(phi.result.clone(), value.clone());
            }
            self.eval(frame, cond)?;
            self.eval_block(frame, body)?;
            let mut next = Vec::with_capacity(headers.len());
            for (phi, h) in merge_before.iter().zip(&headers) {
                let back = self.eval(frame, &phi.right)?;
                next.push(join(h, &back));
            }
            if next == headers {
                settled = true;
                break;
            }
            headers = next;
        }
        if !settled {
            headers = merge_before
                .iter()
                .map(|phi| {
                    frame
                        .type_of(&phi.result)
                        .map(unknown_of)
                        .unwrap_or(SymValue::UnknownScalar)
                })
                .collect();
            frame.env = entry_env.clone();
            for (phi, value) in merge_before.iter().zip(&headers) {
                frame.env.insert(phi.result.clone(), value.clone());
            }
            self.eval_block(frame, body)?;
        }

        let body_env = std::mem::take(&mut frame.env);
        let mut env = entry_env;
        for (phi, value) in merge_before.iter().zip(headers) {
            env.insert(phi.result.clone(), value);
        }
        for phi in merge_after {
            let left = self.eval_in(frame, &env, &phi.left)?;
            let right = self.eval_in(frame, &body_env, &phi.right)?;
            env.insert(phi.result.clone(), join(&left, &right));
        }
        frame.env = env;
        Ok(())
    }

    /// Evaluate `expr` against `env` instead of the frame's own bindings
    fn eval_in(&mut self, frame: &mut Frame<'_>, env: &Env, expr: &TypedExpr) -> JitResult<SymValue> {
        let saved = std::mem::replace(&mut frame.env, env.clone());
        let value = self.eval(frame, expr);
        frame.env = saved;
        value
    }

    fn eval(&mut self, frame: &mut Frame<'_>, expr: &TypedExpr) -> JitResult<SymValue> {
        let contents = frame.tracks_contents();
        Ok(match &expr.kind {
            TypedExprKind::Const(c) => match c {
                Const::Int(i) => SymValue::Const(*i),
                Const::Bool(b) => SymValue::Const(*b as i64),
                Const::None | Const::Float(_) => SymValue::UnknownScalar,
            },
            TypedExprKind::Var(name) => frame
                .env
                .get(name)
                .cloned()
                .ok_or_else(|| JitError::UnboundVariable(name.clone()))?,
            TypedExprKind::Tuple(elts) => SymValue::Tuple(self.eval_all(frame, elts)?),
            TypedExprKind::TupleProj { tuple, index } => match self.eval(frame, tuple)? {
                SymValue::Tuple(elts) => elts
                    .into_iter()
                    .nth(*index)
                    .unwrap_or_else(|| unknown_of(&expr.ty)),
                _ => unknown_of(&expr.ty),
            },
            TypedExprKind::Array(elts) => {
                let values = self.eval_all(frame, elts)?;
                let n = SymValue::Const(values.len() as i64);
                match values.first().and_then(SymValue::dims) {
                    Some(inner) => {
                        let mut dims = vec![n];
                        dims.extend(inner);
                        SymValue::Shape(dims)
                    }
                    None if contents => SymValue::ConstElts(values),
                    None => SymValue::Shape(vec![n]),
                }
            }
            TypedExprKind::Range { start, stop, step } => {
                let start = self.eval_scalar(frame, start)?;
                let stop = self.eval_scalar(frame, stop)?;
                let step = self.eval_scalar(frame, step)?;
                let len = range_length(&start, &stop, &step);
                if contents {
                    SymValue::Range {
                        start: Box::new(start),
                        step: Box::new(step),
                        len: Box::new(len),
                    }
                } else {
                    SymValue::Shape(vec![len])
                }
            }
            TypedExprKind::Slice { .. } => SymValue::UnknownScalar,
            TypedExprKind::Fill { shape, value } => {
                let dims = match self.eval(frame, shape)? {
                    SymValue::Tuple(dims) => dims,
                    scalar => vec![scalar],
                };
                let value = self.eval(frame, value)?;
                if contents && value.is_scalar() {
                    SymValue::Fill {
                        dims,
                        value: Box::new(value),
                    }
                } else {
                    SymValue::Shape(dims)
                }
            }
            TypedExprKind::Index { value, index } => self.eval_index(frame, expr, value, index)?,
            TypedExprKind::BinOp { op, left, right } => {
                let l = self.eval_scalar(frame, left)?;
                let r = self.eval_scalar(frame, right)?;
                if is_int(&expr.ty) {
                    SymValue::arith(*op, l, r).unwrap_or(SymValue::UnknownScalar)
                } else {
                    unknown_of(&expr.ty)
                }
            }
            TypedExprKind::UnaryOp { op, operand } => {
                let v = self.eval_scalar(frame, operand)?;
                match op {
                    UnaryOp::Neg if is_int(&expr.ty) => {
                        SymValue::Sub(Box::new(SymValue::Const(0)), Box::new(v)).normalize()
                    }
                    _ => SymValue::UnknownScalar,
                }
            }
            TypedExprKind::Cast { value, .. } => {
                let v = self.eval(frame, value)?;
                match (&expr.ty, v.dims()) {
                    (JitType::Array { .. }, Some(dims)) => SymValue::Shape(dims),
                    (ty, _) if is_int(ty) && v.is_scalar() => v,
                    (ty, _) => unknown_of(ty),
                }
            }
            TypedExprKind::Len(value) => match self.eval(frame, value)? {
                SymValue::Tuple(elts) => SymValue::Const(elts.len() as i64),
                v => v
                    .dims()
                    .and_then(|d| d.into_iter().next())
                    .unwrap_or(SymValue::UnknownScalar),
            },
            TypedExprKind::Shape(value) => {
                let v = self.eval(frame, value)?;
                SymValue::Tuple(v.dims().unwrap_or_default())
            }
            TypedExprKind::Closure { func, args, .. } => SymValue::Closure {
                func: func.clone(),
                args: self.eval_all(frame, args)?,
            },
            TypedExprKind::ClosureElt { closure, index } => match self.eval(frame, closure)? {
                SymValue::Closure { args, .. } => args
                    .into_iter()
                    .nth(*index)
                    .unwrap_or_else(|| unknown_of(&expr.ty)),
                _ => unknown_of(&expr.ty),
            },
            TypedExprKind::Call { target, args } => {
                let args = self.eval_all(frame, args)?;
                self.eval_call(*target, args, &expr.ty)?
            }
            TypedExprKind::Map {
                target,
                fixed,
                args,
                axis,
            } => {
                let mut inputs = self.eval_all(frame, fixed)?;
                let mut outer = SymValue::UnknownScalar;
                let mut found_outer = false;
                for arg in args {
                    let v = self.eval(frame, arg)?;
                    if arg.ty.rank() > 0 {
                        let dims = v.dims().unwrap_or_else(|| {
                            vec![SymValue::UnknownScalar; arg.ty.rank()]
                        });
                        if !found_outer {
                            outer = dims.get(*axis).cloned().unwrap_or(SymValue::UnknownScalar);
                            found_outer = true;
                        }
                        inputs.push(peel(v, dims, *axis));
                    } else {
                        inputs.push(v);
                    }
                }
                let inner_ty = expr.ty.peel_axis();
                let inner = self.eval_call(*target, inputs, &inner_ty)?;
                let mut dims = vec![outer];
                dims.extend(inner.dims().unwrap_or_default());
                SymValue::Shape(dims)
            }
        })
    }

    fn eval_all(&mut self, frame: &mut Frame<'_>, exprs: &[TypedExpr]) -> JitResult<Vec<SymValue>> {
        exprs.iter().map(|e| self.eval(frame, e)).collect()
    }

    /// Evaluate an operand that must be a scalar
    fn eval_scalar(&mut self, frame: &mut Frame<'_>, expr: &TypedExpr) -> JitResult<SymValue> {
        match self.eval(frame, expr)? {
            SymValue::Closure { func, .. } => Err(JitError::InvalidShapeOperand(format!(
                "closure over `{func}` used as a scalar"
            ))),
            v if v.is_scalar() => Ok(v),
            _ => Ok(SymValue::UnknownScalar),
        }
    }

    fn eval_index(
        &mut self,
        frame: &mut Frame<'_>,
        expr: &TypedExpr,
        value: &TypedExpr,
        index: &TypedExpr,
    ) -> JitResult<SymValue> {
        let array = self.eval(frame, value)?;
        let idx = self.eval(frame, index)?;

        if expr.ty.rank() == 0 {
            return Ok(match (&array, &idx) {
                (SymValue::ConstElts(elts), SymValue::Const(i)) => {
                    let n = elts.len() as i64;
                    let j = if *i < 0 { i + n } else { *i };
                    usize::try_from(j)
                        .ok()
                        .and_then(|j| elts.get(j).cloned())
                        .unwrap_or(SymValue::UnknownScalar)
                }
                (SymValue::Fill { value, .. }, _) => (**value).clone(),
                (SymValue::Range { start, step, .. }, i) if i.is_scalar() => {
                    SymValue::Add(
                        start.clone(),
                        Box::new(SymValue::Mult(Box::new(i.clone()), step.clone())),
                    )
                    .normalize()
                }
                _ => unknown_of(&expr.ty),
            });
        }

        // sub-array: integer components drop their axis, slices keep it
        let Some(dims) = array.dims() else {
            return Ok(unknown_of(&expr.ty));
        };
        let components: Vec<&TypedExpr> = match &index.kind {
            TypedExprKind::Tuple(elts) => elts.iter().collect(),
            _ => vec![index],
        };
        let mut out = Vec::new();
        for (axis, dim) in dims.into_iter().enumerate() {
            match components.get(axis) {
                None => out.push(dim),
                Some(c) if c.ty == JitType::Slice => out.push(if is_full_slice(c) {
                    dim
                } else {
                    SymValue::UnknownScalar
                }),
                Some(_) => {}
            }
        }
        if out.len() != expr.ty.rank() {
            return Ok(unknown_of(&expr.ty));
        }
        Ok(SymValue::Shape(out))
    }

    fn eval_call(&mut self, target: TypedFnId, args: Vec<SymValue>, ty: &JitType) -> JitResult<SymValue> {
        if self.stack.contains(&target) {
            return Ok(unknown_of(ty));
        }
        match self.functions.get(target) {
            Ok(callee) => self.eval_function(&callee, args),
            Err(_) => Ok(unknown_of(ty)),
        }
    }
}

fn bind_lhs(frame: &mut Frame<'_>, lhs: &Lhs<TypedExpr>, value: SymValue) {
    match lhs {
        Lhs::Var(name) => {
            frame.env.insert(name.clone(), value);
        }
        Lhs::Tuple(elts) => match value {
            SymValue::Tuple(values) if values.len() == elts.len() => {
                for (lhs, v) in elts.iter().zip(values) {
                    bind_lhs(frame, lhs, v);
                }
            }
            _ => {
                for lhs in elts {
                    let unknown = unknown_for_pattern(frame, lhs);
                    bind_lhs(frame, lhs, unknown);
                }
            }
        },
        // stores change contents, never dimensions
        Lhs::Index { .. } => {}
    }
}

fn unknown_for_pattern(frame: &Frame<'_>, lhs: &Lhs<TypedExpr>) -> SymValue {
    match lhs {
        Lhs::Var(name) => frame
            .type_of(name)
            .map(unknown_of)
            .unwrap_or(SymValue::UnknownScalar),
        Lhs::Tuple(elts) => {
            SymValue::Tuple(elts.iter().map(|e| unknown_for_pattern(frame, e)).collect())
        }
        Lhs::Index { .. } => SymValue::UnknownScalar,
    }
}

fn is_int(ty: &JitType) -> bool {
    matches!(ty, JitType::Scalar(kind) if kind.is_int())
}

fn is_full_slice(expr: &TypedExpr) -> bool {
    matches!(
        &expr.kind,
        TypedExprKind::Slice {
            start: None,
            stop: None,
            step: None
        }
    )
}

/// One application's view of a mapped array argument
fn peel(value: SymValue, mut dims: Vec<SymValue>, axis: usize) -> SymValue {
    if axis < dims.len() {
        dims.remove(axis);
    }
    match value {
        SymValue::Fill { value, .. } if dims.is_empty() => *value,
        SymValue::Fill { value, .. } => SymValue::Fill { dims, value },
        _ if dims.is_empty() => SymValue::UnknownScalar,
        _ => SymValue::Shape(dims),
    }
}

/// Element count of `range(start, stop, step)`.
///
/// Exact for constant operands. With a constant positive step the
/// symbolic form is clamped at zero for empty ranges.
fn range_length(start: &SymValue, stop: &SymValue, step: &SymValue) -> SymValue {
    match (start, stop, step) {
        (SymValue::Const(a), SymValue::Const(b), SymValue::Const(s)) if *s != 0 => {
            SymValue::Const(range_len(*a, *b, *s) as i64)
        }
        (_, _, SymValue::Const(s)) if *s > 0 => SymValue::Max(
            Box::new(SymValue::Div(
                Box::new(SymValue::Add(
                    Box::new(SymValue::Sub(Box::new(stop.clone()), Box::new(start.clone()))),
                    Box::new(SymValue::Const(s - 1)),
                )),
                Box::new(SymValue::Const(*s)),
            )),
            Box::new(SymValue::Const(0)),
        )
        .normalize(),
        _ => SymValue::UnknownScalar,
    }
}
