//! Reference evaluators.
//!
//! [`Interpreter`] runs untyped SSA functions straight from the registry and
//! serves as the oracle for differential tests; [`TypedEvaluator`] runs
//! specialized functions and shape code. Both share the statement executor
//! below, so merge lists mean the same thing on either side.
//!
//! # Module Organization
//!
//! - `mod.rs`: `Flow`, the shared statement executor, the untyped interpreter
//! - `typed.rs`: `TypedEvaluator`

pub mod typed;

pub use typed::TypedEvaluator;

use crate::error::{JitError, JitResult};
use crate::ir::{ActualArgs, Expr, Lhs, Phi, Stmt};
use crate::linearize::{linearize, Callable};
use crate::registry::Registry;
use crate::types::{num_outer_axes, JitType, ScalarKind};
use crate::value::{ClosureValue, SliceValue, Value};
use log::trace;
use std::collections::HashMap;

/// Variable bindings of one activation
pub type Env = HashMap<String, Value>;

/// How a block finished
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Returned(Value),
    FellThrough,
}

/// Expression evaluation for one expression language
pub trait Evaluate<E> {
    fn eval(&mut self, env: &mut Env, expr: &E) -> JitResult<Value>;
}

/// Execute `block`, stopping at the first return.
pub fn exec_block<E, V: Evaluate<E>>(ev: &mut V, env: &mut Env, block: &[Stmt<E>]) -> JitResult<Flow> {
    for stmt in block {
        match stmt {
            Stmt::Assign { lhs, rhs } => {
                let value = ev.eval(env, rhs)?;
                assign(ev, env, lhs, value)?;
            }
            Stmt::If {
                cond,
                true_block,
                false_block,
                merge,
            } => {
                let taken = ev.eval(env, cond)?.truthy()?;
                let block = if taken { true_block } else { false_block };
                if let Flow::Returned(v) = exec_block(ev, env, block)? {
                    return Ok(Flow::Returned(v));
                }
                apply_merge(ev, env, merge, !taken)?;
            }
            Stmt::While {
                cond,
                body,
                merge_before,
                merge_after,
            } => {
                apply_merge(ev, env, merge_before, false)?;
                let mut ran = false;
                while ev.eval(env, cond)?.truthy()? {
                    ran = true;
                    if let Flow::Returned(v) = exec_block(ev, env, body)? {
                        return Ok(Flow::Returned(v));
                    }
                    apply_merge(ev, env, merge_before, true)?;
                }
                apply_merge(ev, env, merge_after, ran)?;
            }
            Stmt::Return(e) => return Ok(Flow::Returned(ev.eval(env, e)?)),
        }
    }
    Ok(Flow::FellThrough)
}

/// Parallel copy of one side of a merge list: every value is read before
/// any result is written
fn apply_merge<E, V: Evaluate<E>>(
    ev: &mut V,
    env: &mut Env,
    merge: &[Phi<E>],
    take_right: bool,
) -> JitResult<()> {
    let values = merge
        .iter()
        .map(|phi| ev.eval(env, if take_right { &phi.right } else { &phi.left }))
        .collect::<JitResult<Vec<_>>>()?;
    for (phi, value) in merge.iter().zip(values) {
        env.insert(phi.result.clone(), value);
    }
    Ok(())
}

fn assign<E, V: Evaluate<E>>(ev: &mut V, env: &mut Env, lhs: &Lhs<E>, value: Value) -> JitResult<()> {
    match lhs {
        Lhs::Var(name) => {
            env.insert(name.clone(), value);
        }
        Lhs::Tuple(elts) => {
            let Value::Tuple(values) = value else {
                return Err(JitError::Eval(format!("can't destructure {value}")));
            };
            if values.len() != elts.len() {
                return Err(JitError::Eval(format!(
                    "can't destructure {} values into {} names",
                    values.len(),
                    elts.len()
                )));
            }
            for (lhs, v) in elts.iter().zip(values) {
                assign(ev, env, lhs, v)?;
            }
        }
        Lhs::Index { value: target, index } => {
            let target = ev.eval(env, target)?;
            let index = ev.eval(env, index)?;
            target.store(&index, &value)?;
        }
    }
    Ok(())
}

pub(crate) fn lookup(env: &Env, name: &str) -> JitResult<Value> {
    env.get(name)
        .cloned()
        .ok_or_else(|| JitError::UnboundVariable(name.to_string()))
}

/// Evaluator for untyped functions
#[derive(Debug)]
pub struct Interpreter<'r> {
    registry: &'r Registry,
}

impl<'r> Interpreter<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// Call a function or closure with runtime arguments.
    pub fn call(&mut self, callable: Callable<Value>, actuals: ActualArgs<Value>) -> JitResult<Value> {
        let (function, lin) = linearize(self.registry, callable, actuals)?;
        trace!("interp: calling `{}`", function.name);
        let mut env: Env = lin.bindings().into_iter().collect();
        match exec_block(self, &mut env, &function.body)? {
            Flow::Returned(v) => Ok(v),
            Flow::FellThrough => Ok(Value::None),
        }
    }

    /// Call `name` with positional arguments
    pub fn call_fn(&mut self, name: &str, args: Vec<Value>) -> JitResult<Value> {
        self.call(Callable::function(name), ActualArgs::positional(args))
    }

    /// Elementwise application over the outer axes of `args`.
    ///
    /// Without an axis every axis is walked; with one only that axis is,
    /// and the results stack along a new outer axis.
    fn map_values(&mut self, callable: &Callable<Value>, args: Vec<Value>, axis: Option<usize>) -> JitResult<Value> {
        let types: Vec<JitType> = args.iter().map(Value::type_of).collect();
        if num_outer_axes(&types, axis)? == 0 {
            return self.call(callable.clone(), ActualArgs::positional(args));
        }
        let along = axis.unwrap_or(0);
        let n = args
            .iter()
            .find(|a| matches!(a, Value::Array(_)))
            .map(|a| a.axis_len(along))
            .transpose()?
            .unwrap_or(0);
        let mut results = Vec::with_capacity(n);
        for i in 0..n {
            let elts = args
                .iter()
                .map(|a| a.slice_axis(along, i))
                .collect::<JitResult<Vec<_>>>()?;
            results.push(match axis {
                None => self.map_values(callable, elts, None)?,
                Some(_) => self.call(callable.clone(), ActualArgs::positional(elts))?,
            });
        }
        Value::stack(results, ScalarKind::Float64)
    }
}

fn opt_int(ev: &mut Interpreter<'_>, env: &mut Env, part: &Option<Box<Expr>>) -> JitResult<Option<i64>> {
    part.as_ref()
        .map(|e| ev.eval(env, e).and_then(|v| v.as_i64()))
        .transpose()
}

impl Evaluate<Expr> for Interpreter<'_> {
    fn eval(&mut self, env: &mut Env, expr: &Expr) -> JitResult<Value> {
        match expr {
            Expr::Const(c) => Ok(Value::from_const(c)),
            Expr::Var(name) => lookup(env, name),
            Expr::FnRef(name) => {
                self.registry.lookup(name)?;
                Ok(Value::Closure(ClosureValue {
                    func: name.clone(),
                    fixed: Vec::new(),
                }))
            }
            Expr::Tuple(elts) => Ok(Value::Tuple(self.eval_all(env, elts)?)),
            Expr::TupleProj { tuple, index } => {
                self.eval(env, tuple)?.index(&Value::Int(*index as i64))
            }
            Expr::Array(elts) => {
                let values = self.eval_all(env, elts)?;
                Value::stack(values, ScalarKind::Float64)
            }
            Expr::Range { start, stop, step } => {
                let start = self.eval(env, start)?.as_i64()?;
                let stop = self.eval(env, stop)?.as_i64()?;
                let step = self.eval(env, step)?.as_i64()?;
                Value::range(start, stop, step)
            }
            Expr::Slice { start, stop, step } => Ok(Value::Slice(SliceValue {
                start: opt_int(self, env, start)?,
                stop: opt_int(self, env, stop)?,
                step: opt_int(self, env, step)?,
            })),
            Expr::Fill { shape, value } => {
                let shape = self.eval(env, shape)?;
                let value = self.eval(env, value)?;
                Value::fill(&shape, &value)
            }
            Expr::Index { value, index } => {
                let value = self.eval(env, value)?;
                let index = self.eval(env, index)?;
                value.index(&index)
            }
            Expr::BinOp { op, left, right } => {
                let l = self.eval(env, left)?;
                let r = self.eval(env, right)?;
                Value::binop(*op, &l, &r)
            }
            Expr::UnaryOp { op, operand } => Value::unary(*op, &self.eval(env, operand)?),
            Expr::Len(value) => self.eval(env, value)?.len_value(),
            Expr::Shape(value) => Ok(self.eval(env, value)?.shape_value()),
            Expr::Closure { func, args } => {
                self.registry.lookup(func)?;
                Ok(Value::Closure(ClosureValue {
                    func: func.clone(),
                    fixed: self.eval_all(env, args)?,
                }))
            }
            Expr::Call { func, args } => {
                let callable = Callable::from_value(&self.eval(env, func)?)?;
                let actuals = args.try_map(|a| self.eval(env, a))?;
                self.call(callable, actuals)
            }
            Expr::Map { func, args, axis } => {
                let callable = Callable::from_value(&self.eval(env, func)?)?;
                let args = self.eval_all(env, args)?;
                self.map_values(&callable, args, *axis)
            }
        }
    }
}

impl Interpreter<'_> {
    fn eval_all(&mut self, env: &mut Env, exprs: &[Expr]) -> JitResult<Vec<Value>> {
        exprs.iter().map(|e| self.eval(env, e)).collect()
    }
}
