//! Symbolic shapes.
//!
//! Shape inference evaluates a typed function over [`SymValue`]s instead of
//! runtime values: every scalar input and every input dimension becomes a
//! free variable `Var(n)`, and the result is an expression over those
//! variables. The shape code generator then lowers that expression back into
//! typed IR that computes the result shape from the actual arguments.
//!
//! # Module Organization
//!
//! - `mod.rs`: `SymValue`, input binding, folding and joins
//! - `inference.rs`: abstract evaluation of typed functions
//! - `codegen.rs`: lowering of symbolic shapes to typed IR
//! - `tests.rs`: Tests

pub mod codegen;
pub mod inference;

pub use codegen::{make_shape_expr, ShapeCode};
pub use inference::{call_shape_expr, ShapeInference};

use crate::ir::BinOp;
use crate::types::JitType;
use std::fmt;

/// Abstract value of shape inference
#[derive(Debug, Clone, PartialEq)]
pub enum SymValue {
    /// A scalar nothing is known about
    UnknownScalar,
    Const(i64),
    /// Free variable bound to an input scalar or input dimension
    Var(usize),
    Add(Box<SymValue>, Box<SymValue>),
    Sub(Box<SymValue>, Box<SymValue>),
    Mult(Box<SymValue>, Box<SymValue>),
    Div(Box<SymValue>, Box<SymValue>),
    Mod(Box<SymValue>, Box<SymValue>),
    Max(Box<SymValue>, Box<SymValue>),
    /// Extent `axis` of a shape tuple
    Dim { value: Box<SymValue>, axis: usize },
    /// Array with these dimensions and unknown contents
    Shape(Vec<SymValue>),
    /// Rank-1 array of known scalar elements
    ConstElts(Vec<SymValue>),
    /// Array whose every element is `value`
    Fill { dims: Vec<SymValue>, value: Box<SymValue> },
    /// `start + i * step` for `i` in `0..len`
    Range {
        start: Box<SymValue>,
        step: Box<SymValue>,
        len: Box<SymValue>,
    },
    Tuple(Vec<SymValue>),
    Closure { func: String, args: Vec<SymValue> },
}

impl SymValue {
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            SymValue::UnknownScalar
                | SymValue::Const(_)
                | SymValue::Var(_)
                | SymValue::Add(..)
                | SymValue::Sub(..)
                | SymValue::Mult(..)
                | SymValue::Div(..)
                | SymValue::Mod(..)
                | SymValue::Max(..)
                | SymValue::Dim { .. }
        )
    }

    /// Dimensions of an array value
    pub fn dims(&self) -> Option<Vec<SymValue>> {
        match self {
            SymValue::Shape(dims) | SymValue::Fill { dims, .. } => Some(dims.clone()),
            SymValue::ConstElts(elts) => Some(vec![SymValue::Const(elts.len() as i64)]),
            SymValue::Range { len, .. } => Some(vec![(**len).clone()]),
            _ => None,
        }
    }

    /// Extent `axis` of a shape tuple, folded when the tuple is explicit
    pub fn dim(value: SymValue, axis: usize) -> SymValue {
        match value {
            SymValue::Tuple(elts) | SymValue::Shape(elts) => elts
                .into_iter()
                .nth(axis)
                .unwrap_or(SymValue::UnknownScalar),
            SymValue::UnknownScalar => SymValue::UnknownScalar,
            other => SymValue::Dim {
                value: Box::new(other),
                axis,
            },
        }
    }

    /// Symbolic arithmetic node for `op`, folded; `None` for operators
    /// without a symbolic form
    pub fn arith(op: BinOp, left: SymValue, right: SymValue) -> Option<SymValue> {
        let (l, r) = (Box::new(left), Box::new(right));
        let node = match op {
            BinOp::Add => SymValue::Add(l, r),
            BinOp::Sub => SymValue::Sub(l, r),
            BinOp::Mult => SymValue::Mult(l, r),
            BinOp::Div => SymValue::Div(l, r),
            BinOp::Mod => SymValue::Mod(l, r),
            BinOp::Max => SymValue::Max(l, r),
            _ => return None,
        };
        Some(node.normalize())
    }

    /// Fold constants and algebraic identities bottom-up.
    ///
    /// Any arithmetic involving an unknown scalar is unknown. Integer
    /// division and modulo truncate toward zero.
    pub fn normalize(self) -> SymValue {
        use SymValue::*;
        match self {
            Add(a, b) => match (a.normalize(), b.normalize()) {
                (UnknownScalar, _) | (_, UnknownScalar) => UnknownScalar,
                (Const(x), Const(y)) => Const(x.wrapping_add(y)),
                (x, Const(0)) | (Const(0), x) => x,
                (x, y) => Add(Box::new(x), Box::new(y)),
            },
            Sub(a, b) => match (a.normalize(), b.normalize()) {
                (UnknownScalar, _) | (_, UnknownScalar) => UnknownScalar,
                (Const(x), Const(y)) => Const(x.wrapping_sub(y)),
                (x, Const(0)) => x,
                (x, y) if x == y => Const(0),
                (x, y) => Sub(Box::new(x), Box::new(y)),
            },
            Mult(a, b) => match (a.normalize(), b.normalize()) {
                (UnknownScalar, _) | (_, UnknownScalar) => UnknownScalar,
                (Const(x), Const(y)) => Const(x.wrapping_mul(y)),
                (_, Const(0)) | (Const(0), _) => Const(0),
                (x, Const(1)) | (Const(1), x) => x,
                (x, y) => Mult(Box::new(x), Box::new(y)),
            },
            Div(a, b) => match (a.normalize(), b.normalize()) {
                (UnknownScalar, _) | (_, UnknownScalar) => UnknownScalar,
                (Const(x), Const(y)) if y != 0 => Const(x.wrapping_div(y)),
                (x, Const(1)) => x,
                (x, y) => Div(Box::new(x), Box::new(y)),
            },
            Mod(a, b) => match (a.normalize(), b.normalize()) {
                (UnknownScalar, _) | (_, UnknownScalar) => UnknownScalar,
                (Const(x), Const(y)) if y != 0 => Const(x.wrapping_rem(y)),
                (_, Const(1)) => Const(0),
                (x, y) => Mod(Box::new(x), Box::new(y)),
            },
            Max(a, b) => match (a.normalize(), b.normalize()) {
                (UnknownScalar, _) | (_, UnknownScalar) => UnknownScalar,
                (Const(x), Const(y)) => Const(x.max(y)),
                (x, y) if x == y => x,
                (x, y) => Max(Box::new(x), Box::new(y)),
            },
            Dim { value, axis } => SymValue::dim(value.normalize(), axis),
            Shape(dims) => Shape(dims.into_iter().map(SymValue::normalize).collect()),
            ConstElts(elts) => ConstElts(elts.into_iter().map(SymValue::normalize).collect()),
            Fill { dims, value } => Fill {
                dims: dims.into_iter().map(SymValue::normalize).collect(),
                value: Box::new(value.normalize()),
            },
            Range { start, step, len } => Range {
                start: Box::new(start.normalize()),
                step: Box::new(step.normalize()),
                len: Box::new(len.normalize()),
            },
            Tuple(elts) => Tuple(elts.into_iter().map(SymValue::normalize).collect()),
            Closure { func, args } => Closure {
                func,
                args: args.into_iter().map(SymValue::normalize).collect(),
            },
            atom => atom,
        }
    }

    /// The value reported for a function result: arrays reduced to their
    /// dimensions, recursively through tuples
    pub fn into_shape(self) -> SymValue {
        match self {
            SymValue::Tuple(elts) => {
                SymValue::Tuple(elts.into_iter().map(SymValue::into_shape).collect())
            }
            other => match other.dims() {
                Some(dims) => SymValue::Shape(dims),
                None => other,
            },
        }
        .normalize()
    }

    /// True when every scalar in the value is expressible from the inputs
    pub fn is_constructible(&self) -> bool {
        use SymValue::*;
        match self {
            UnknownScalar | Closure { .. } => false,
            Const(_) | Var(_) => true,
            Add(a, b) | Sub(a, b) | Mult(a, b) | Div(a, b) | Mod(a, b) | Max(a, b) => {
                a.is_constructible() && b.is_constructible()
            }
            Dim { value, .. } => value.is_constructible(),
            Shape(elts) | Tuple(elts) => elts.iter().all(SymValue::is_constructible),
            ConstElts(_) | Fill { .. } | Range { .. } => self
                .dims()
                .is_some_and(|dims| dims.iter().all(SymValue::is_constructible)),
        }
    }
}

/// Least upper bound of two values reaching one merge point.
///
/// Equal values stay; arrays of one rank keep their dimensions joined
/// pointwise and lose their contents; tuples and closures join elementwise;
/// anything else becomes unknown.
pub fn join(a: &SymValue, b: &SymValue) -> SymValue {
    if a == b {
        return a.clone();
    }
    match (a, b) {
        (SymValue::Tuple(xs), SymValue::Tuple(ys)) if xs.len() == ys.len() => {
            SymValue::Tuple(xs.iter().zip(ys).map(|(x, y)| join(x, y)).collect())
        }
        (
            SymValue::Closure { func: f, args: xs },
            SymValue::Closure { func: g, args: ys },
        ) if f == g && xs.len() == ys.len() => SymValue::Closure {
            func: f.clone(),
            args: xs.iter().zip(ys).map(|(x, y)| join(x, y)).collect(),
        },
        _ => match (a.dims(), b.dims()) {
            (Some(xs), Some(ys)) if xs.len() == ys.len() => {
                SymValue::Shape(xs.iter().zip(&ys).map(|(x, y)| join(x, y)).collect())
            }
            _ => SymValue::UnknownScalar,
        },
    }
}

/// The value of type `ty` nothing is known about
pub fn unknown_of(ty: &JitType) -> SymValue {
    match ty {
        JitType::Array { rank, .. } => SymValue::Shape(vec![SymValue::UnknownScalar; *rank]),
        JitType::Tuple(elts) => SymValue::Tuple(elts.iter().map(unknown_of).collect()),
        JitType::Closure { func, fixed } => SymValue::Closure {
            func: func.clone(),
            args: fixed.iter().map(unknown_of).collect(),
        },
        _ => SymValue::UnknownScalar,
    }
}

/// Symbolic inputs for parameters of the given types.
///
/// Variables are numbered in traversal order: a scalar takes one, an array
/// one per dimension, tuples and closure fixed arguments recurse. Slices and
/// `None` take no variable.
pub fn bind_inputs(types: &[JitType]) -> Vec<SymValue> {
    let mut next = 0;
    types.iter().map(|ty| bind_input(ty, &mut next)).collect()
}

fn fresh(next: &mut usize) -> SymValue {
    let v = SymValue::Var(*next);
    *next += 1;
    v
}

fn bind_input(ty: &JitType, next: &mut usize) -> SymValue {
    match ty {
        JitType::Scalar(_) => fresh(next),
        JitType::Array { rank, .. } => SymValue::Shape((0..*rank).map(|_| fresh(next)).collect()),
        JitType::Tuple(elts) => SymValue::Tuple(elts.iter().map(|t| bind_input(t, next)).collect()),
        JitType::Closure { func, fixed } => SymValue::Closure {
            func: func.clone(),
            args: fixed.iter().map(|t| bind_input(t, next)).collect(),
        },
        JitType::NoneType | JitType::Slice => SymValue::UnknownScalar,
    }
}

impl fmt::Display for SymValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, elts: &[SymValue]) -> fmt::Result {
            for (i, e) in elts.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{e}")?;
            }
            Ok(())
        }
        match self {
            SymValue::UnknownScalar => write!(f, "?"),
            SymValue::Const(c) => write!(f, "{c}"),
            SymValue::Var(n) => write!(f, "${n}"),
            SymValue::Add(a, b) => write!(f, "({a} + {b})"),
            SymValue::Sub(a, b) => write!(f, "({a} - {b})"),
            SymValue::Mult(a, b) => write!(f, "({a} * {b})"),
            SymValue::Div(a, b) => write!(f, "({a} / {b})"),
            SymValue::Mod(a, b) => write!(f, "({a} % {b})"),
            SymValue::Max(a, b) => write!(f, "max({a}, {b})"),
            SymValue::Dim { value, axis } => write!(f, "{value}[{axis}]"),
            SymValue::Shape(dims) => {
                write!(f, "array[")?;
                list(f, dims)?;
                write!(f, "]")
            }
            SymValue::ConstElts(elts) => {
                write!(f, "[")?;
                list(f, elts)?;
                write!(f, "]")
            }
            SymValue::Fill { dims, value } => {
                write!(f, "fill[")?;
                list(f, dims)?;
                write!(f, "]({value})")
            }
            SymValue::Range { start, step, len } => {
                write!(f, "range({start}, step={step}, len={len})")
            }
            SymValue::Tuple(elts) => {
                write!(f, "(")?;
                list(f, elts)?;
                if elts.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            SymValue::Closure { func, args } => {
                write!(f, "closure<{func}>(")?;
                list(f, args)?;
                write!(f, ")")
            }
        }
    }
}
