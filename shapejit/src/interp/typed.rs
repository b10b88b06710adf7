//! Evaluator for specialized functions and shape code.

use super::{exec_block, lookup, Env, Evaluate, Flow};
use crate::error::{JitError, JitResult};
use crate::ir::{TypedExpr, TypedExprKind, TypedFn, TypedFnId};
use crate::shape::ShapeCode;
use crate::specialize::SpecializationCache;
use crate::types::{JitType, ScalarKind};
use crate::value::{ClosureValue, SliceValue, Value};

/// Runs typed IR against the specializations of one session
#[derive(Debug)]
pub struct TypedEvaluator<'c> {
    functions: &'c SpecializationCache,
}

impl<'c> TypedEvaluator<'c> {
    pub fn new(functions: &'c SpecializationCache) -> Self {
        Self { functions }
    }

    /// Call specialization `id` with its supplied arguments
    pub fn call(&mut self, id: TypedFnId, args: Vec<Value>) -> JitResult<Value> {
        let function = self.functions.get(id)?;
        self.call_fn(&function, args)
    }

    pub fn call_fn(&mut self, function: &TypedFn, args: Vec<Value>) -> JitResult<Value> {
        if args.len() != function.params.len() {
            return Err(JitError::Eval(format!(
                "`{}` takes {} arguments, got {}",
                function.name,
                function.params.len(),
                args.len()
            )));
        }
        let mut env: Env = function.params.iter().cloned().zip(args).collect();
        match exec_block(self, &mut env, &function.body)? {
            Flow::Returned(v) => Ok(v),
            Flow::FellThrough => Ok(Value::None),
        }
    }

    /// Shape computed by `code` for the given arguments
    pub fn eval_shape_code(&mut self, code: &ShapeCode, args: &[Value]) -> JitResult<Value> {
        let mut env: Env = code.params.iter().cloned().zip(args.iter().cloned()).collect();
        for (name, expr) in &code.bindings {
            let value = self.eval(&mut env, expr)?;
            env.insert(name.clone(), value);
        }
        self.eval(&mut env, &code.shape)
    }

    fn eval_all(&mut self, env: &mut Env, exprs: &[TypedExpr]) -> JitResult<Vec<Value>> {
        exprs.iter().map(|e| self.eval(env, e)).collect()
    }

    fn opt_int(&mut self, env: &mut Env, part: &Option<Box<TypedExpr>>) -> JitResult<Option<i64>> {
        part.as_ref()
            .map(|e| self.eval(env, e).and_then(|v| v.as_i64()))
            .transpose()
    }

    /// Apply `target` along `axis` of the array arguments
    fn map(
        &mut self,
        target: TypedFnId,
        fixed: Vec<Value>,
        args: &[(Value, bool)],
        axis: usize,
        result: &JitType,
    ) -> JitResult<Value> {
        let n = args
            .iter()
            .find(|(_, mapped)| *mapped)
            .map(|(v, _)| v.axis_len(axis))
            .transpose()?
            .unwrap_or(0);
        let mut results = Vec::with_capacity(n);
        for i in 0..n {
            let mut call_args = fixed.clone();
            for (v, mapped) in args {
                call_args.push(if *mapped {
                    v.slice_axis(axis, i)?
                } else {
                    v.clone()
                });
            }
            results.push(self.call(target, call_args)?);
        }
        let kind = result.scalar_kind().unwrap_or(ScalarKind::Float64);
        Value::stack(results, kind)?.cast(kind)
    }
}

/// Convert a scalar result to the kind its type names
fn conform(value: Value, ty: &JitType) -> JitResult<Value> {
    match ty {
        JitType::Scalar(kind) => value.cast(*kind),
        _ => Ok(value),
    }
}

impl Evaluate<TypedExpr> for TypedEvaluator<'_> {
    fn eval(&mut self, env: &mut Env, expr: &TypedExpr) -> JitResult<Value> {
        match &expr.kind {
            TypedExprKind::Const(c) => conform(Value::from_const(c), &expr.ty),
            TypedExprKind::Var(name) => lookup(env, name),
            TypedExprKind::Tuple(elts) => Ok(Value::Tuple(self.eval_all(env, elts)?)),
            TypedExprKind::TupleProj { tuple, index } => {
                self.eval(env, tuple)?.index(&Value::Int(*index as i64))
            }
            TypedExprKind::Array(elts) => {
                let values = self.eval_all(env, elts)?;
                let kind = expr.ty.scalar_kind().unwrap_or(ScalarKind::Float64);
                Value::stack(values, kind)?.cast(kind)
            }
            TypedExprKind::Range { start, stop, step } => {
                let start = self.eval(env, start)?.as_i64()?;
                let stop = self.eval(env, stop)?.as_i64()?;
                let step = self.eval(env, step)?.as_i64()?;
                Value::range(start, stop, step)
            }
            TypedExprKind::Slice { start, stop, step } => Ok(Value::Slice(SliceValue {
                start: self.opt_int(env, start)?,
                stop: self.opt_int(env, stop)?,
                step: self.opt_int(env, step)?,
            })),
            TypedExprKind::Fill { shape, value } => {
                let shape = self.eval(env, shape)?;
                let value = self.eval(env, value)?;
                let filled = Value::fill(&shape, &value)?;
                match expr.ty.scalar_kind() {
                    Some(kind) => filled.cast(kind),
                    None => Ok(filled),
                }
            }
            TypedExprKind::Index { value, index } => {
                let value = self.eval(env, value)?;
                let index = self.eval(env, index)?;
                value.index(&index)
            }
            TypedExprKind::BinOp { op, left, right } => {
                let l = self.eval(env, left)?;
                let r = self.eval(env, right)?;
                conform(Value::binop(*op, &l, &r)?, &expr.ty)
            }
            TypedExprKind::UnaryOp { op, operand } => {
                let v = self.eval(env, operand)?;
                conform(Value::unary(*op, &v)?, &expr.ty)
            }
            TypedExprKind::Cast { value, to } => self.eval(env, value)?.cast(*to),
            TypedExprKind::Len(value) => self.eval(env, value)?.len_value(),
            TypedExprKind::Shape(value) => Ok(self.eval(env, value)?.shape_value()),
            TypedExprKind::Closure { func, args, .. } => Ok(Value::Closure(ClosureValue {
                func: func.clone(),
                fixed: self.eval_all(env, args)?,
            })),
            TypedExprKind::ClosureElt { closure, index } => match self.eval(env, closure)? {
                Value::Closure(c) => c.fixed.get(*index).cloned().ok_or_else(|| {
                    JitError::Eval(format!("closure over `{}` has no element {index}", c.func))
                }),
                other => Err(JitError::Eval(format!("{other} is not a closure"))),
            },
            TypedExprKind::Call { target, args } => {
                let args = self.eval_all(env, args)?;
                self.call(*target, args)
            }
            TypedExprKind::Map {
                target,
                fixed,
                args,
                axis,
            } => {
                let fixed = self.eval_all(env, fixed)?;
                let mut mapped = Vec::with_capacity(args.len());
                for a in args {
                    mapped.push((self.eval(env, a)?, a.ty.is_array()));
                }
                self.map(*target, fixed, &mapped, *axis, &expr.ty)
            }
        }
    }
}
