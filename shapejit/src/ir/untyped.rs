//! Untyped expressions and function definitions.

use super::{ActualArgs, BinOp, Const, FormalArgs, Stmt, UnaryOp};
use serde::{Deserialize, Serialize};

/// Untyped expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Const(Const),
    Var(String),
    /// Reference to a registered function
    FnRef(String),
    Tuple(Vec<Expr>),
    TupleProj {
        tuple: Box<Expr>,
        index: usize,
    },
    /// Array literal; elements are scalars or arrays of one shape
    Array(Vec<Expr>),
    /// `range(start, stop, step)` as a rank-1 int64 array
    Range {
        start: Box<Expr>,
        stop: Box<Expr>,
        step: Box<Expr>,
    },
    /// `start:stop:step`
    Slice {
        start: Option<Box<Expr>>,
        stop: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    /// Array of the given shape (int or tuple of ints) holding `value` everywhere
    Fill {
        shape: Box<Expr>,
        value: Box<Expr>,
    },
    Index {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    BinOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Len(Box<Expr>),
    Shape(Box<Expr>),
    /// Closure over a registered function with fixed leading arguments
    Closure {
        func: String,
        args: Vec<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Box<ActualArgs<Expr>>,
    },
    /// Elementwise application; `axis: None` maps over every axis
    Map {
        func: Box<Expr>,
        args: Vec<Expr>,
        axis: Option<usize>,
    },
}

impl Expr {
    pub fn var(name: &str) -> Self {
        Expr::Var(name.to_string())
    }

    pub fn int(value: i64) -> Self {
        Expr::Const(Const::Int(value))
    }

    pub fn float(value: f64) -> Self {
        Expr::Const(Const::Float(value))
    }

    pub fn bool(value: bool) -> Self {
        Expr::Const(Const::Bool(value))
    }

    pub fn none() -> Self {
        Expr::Const(Const::None)
    }

    pub fn fn_ref(name: &str) -> Self {
        Expr::FnRef(name.to_string())
    }

    pub fn binop(op: BinOp, left: Expr, right: Expr) -> Self {
        Expr::BinOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::UnaryOp {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn index(value: Expr, index: Expr) -> Self {
        Expr::Index {
            value: Box::new(value),
            index: Box::new(index),
        }
    }

    pub fn range(start: Expr, stop: Expr, step: Expr) -> Self {
        Expr::Range {
            start: Box::new(start),
            stop: Box::new(stop),
            step: Box::new(step),
        }
    }

    pub fn fill(shape: Expr, value: Expr) -> Self {
        Expr::Fill {
            shape: Box::new(shape),
            value: Box::new(value),
        }
    }

    pub fn slice(start: Option<Expr>, stop: Option<Expr>, step: Option<Expr>) -> Self {
        Expr::Slice {
            start: start.map(Box::new),
            stop: stop.map(Box::new),
            step: step.map(Box::new),
        }
    }

    pub fn proj(tuple: Expr, index: usize) -> Self {
        Expr::TupleProj {
            tuple: Box::new(tuple),
            index,
        }
    }

    pub fn closure(func: &str, args: Vec<Expr>) -> Self {
        Expr::Closure {
            func: func.to_string(),
            args,
        }
    }

    /// Positional call of a registered function
    pub fn call(func: &str, args: Vec<Expr>) -> Self {
        Expr::Call {
            func: Box::new(Expr::fn_ref(func)),
            args: Box::new(ActualArgs::positional(args)),
        }
    }

    /// Call of an arbitrary callable expression
    pub fn call_value(func: Expr, args: ActualArgs<Expr>) -> Self {
        Expr::Call {
            func: Box::new(func),
            args: Box::new(args),
        }
    }

    pub fn map(func: Expr, args: Vec<Expr>, axis: Option<usize>) -> Self {
        Expr::Map {
            func: Box::new(func),
            args,
            axis,
        }
    }

    pub fn len(value: Expr) -> Self {
        Expr::Len(Box::new(value))
    }

    pub fn shape(value: Expr) -> Self {
        Expr::Shape(Box::new(value))
    }

    /// Constants and variables, the values SSA conversion forwards
    pub fn is_atom(&self) -> bool {
        matches!(self, Expr::Const(_) | Expr::Var(_))
    }
}

/// Front-end function definition with a structured body.
///
/// Names may be reassigned and merge lists are left empty; the SSA builder
/// turns this into an [`UntypedFn`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub args: FormalArgs,
    pub body: Vec<Stmt<Expr>>,
}

impl FunctionDef {
    pub fn new(name: &str, args: FormalArgs, body: Vec<Stmt<Expr>>) -> Self {
        Self {
            name: name.to_string(),
            args,
            body,
        }
    }
}

/// Registered untyped function in SSA form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UntypedFn {
    pub name: String,
    pub args: FormalArgs,
    pub body: Vec<Stmt<Expr>>,
}

impl UntypedFn {
    pub fn new(name: &str, args: FormalArgs, body: Vec<Stmt<Expr>>) -> Self {
        Self {
            name: name.to_string(),
            args,
            body,
        }
    }
}
