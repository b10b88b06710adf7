//! Typed expressions and specialized functions.

use super::{BinOp, Const, Stmt, UnaryOp};
use crate::error::{JitError, JitResult};
use crate::types::{JitType, ScalarKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identity of one specialization in the specialization arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypedFnId(pub usize);

impl fmt::Display for TypedFnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Typed expression: a node plus its concrete type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedExpr {
    pub kind: TypedExprKind,
    pub ty: JitType,
}

/// Typed expression node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypedExprKind {
    Const(Const),
    Var(String),
    Tuple(Vec<TypedExpr>),
    TupleProj {
        tuple: Box<TypedExpr>,
        index: usize,
    },
    Array(Vec<TypedExpr>),
    Range {
        start: Box<TypedExpr>,
        stop: Box<TypedExpr>,
        step: Box<TypedExpr>,
    },
    Slice {
        start: Option<Box<TypedExpr>>,
        stop: Option<Box<TypedExpr>>,
        step: Option<Box<TypedExpr>>,
    },
    Fill {
        shape: Box<TypedExpr>,
        value: Box<TypedExpr>,
    },
    Index {
        value: Box<TypedExpr>,
        index: Box<TypedExpr>,
    },
    /// Scalar operator; both operands already share one scalar kind
    BinOp {
        op: BinOp,
        left: Box<TypedExpr>,
        right: Box<TypedExpr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<TypedExpr>,
    },
    /// Conversion of a scalar or an array's elements
    Cast {
        value: Box<TypedExpr>,
        to: ScalarKind,
    },
    Len(Box<TypedExpr>),
    Shape(Box<TypedExpr>),
    /// Closure construction; `id` is the closure type's runtime identity
    Closure {
        func: String,
        id: usize,
        args: Vec<TypedExpr>,
    },
    /// Projection of a closure's fixed argument
    ClosureElt {
        closure: Box<TypedExpr>,
        index: usize,
    },
    /// Call of a specialization with its supplied arguments
    Call {
        target: TypedFnId,
        args: Vec<TypedExpr>,
    },
    /// Single-axis map: `fixed` is passed unchanged to every application,
    /// arrays in `args` are sliced along `axis` and scalars broadcast
    Map {
        target: TypedFnId,
        fixed: Vec<TypedExpr>,
        args: Vec<TypedExpr>,
        axis: usize,
    },
}

impl TypedExpr {
    pub fn new(kind: TypedExprKind, ty: JitType) -> Self {
        Self { kind, ty }
    }

    pub fn constant(value: Const) -> Self {
        Self::new(TypedExprKind::Const(value), value.ty())
    }

    pub fn int(value: i64) -> Self {
        Self::constant(Const::Int(value))
    }

    pub fn var(name: &str, ty: JitType) -> Self {
        Self::new(TypedExprKind::Var(name.to_string()), ty)
    }

    pub fn tuple(elts: Vec<TypedExpr>) -> Self {
        let ty = JitType::Tuple(elts.iter().map(|e| e.ty.clone()).collect());
        Self::new(TypedExprKind::Tuple(elts), ty)
    }

    /// Project element `index` of a tuple-typed expression
    pub fn proj(tuple: TypedExpr, index: usize) -> JitResult<Self> {
        let ty = match &tuple.ty {
            JitType::Tuple(elts) => elts.get(index).cloned(),
            _ => None,
        }
        .ok_or_else(|| {
            JitError::type_error(format!("no element {index} in {}", tuple.ty), &tuple)
        })?;
        Ok(Self::new(
            TypedExprKind::TupleProj {
                tuple: Box::new(tuple),
                index,
            },
            ty,
        ))
    }

    /// Project fixed argument `index` of a closure-typed expression
    pub fn closure_elt(closure: TypedExpr, index: usize) -> JitResult<Self> {
        let ty = match &closure.ty {
            JitType::Closure { fixed, .. } => fixed.get(index).cloned(),
            _ => None,
        }
        .ok_or_else(|| {
            JitError::type_error(
                format!("no fixed argument {index} in {}", closure.ty),
                &closure,
            )
        })?;
        Ok(Self::new(
            TypedExprKind::ClosureElt {
                closure: Box::new(closure),
                index,
            },
            ty,
        ))
    }

    /// Scalar binary operation on operands of one kind
    pub fn binop(op: BinOp, left: TypedExpr, right: TypedExpr, ty: JitType) -> Self {
        Self::new(
            TypedExprKind::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty,
        )
    }

    pub fn as_const(&self) -> Option<Const> {
        match &self.kind {
            TypedExprKind::Const(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_var(&self) -> Option<&str> {
        match &self.kind {
            TypedExprKind::Var(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_atom(&self) -> bool {
        matches!(self.kind, TypedExprKind::Const(_) | TypedExprKind::Var(_))
    }
}

/// A specialized function.
///
/// Published once by the specializer and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedFn {
    pub id: TypedFnId,
    /// Unique name of this specialization
    pub name: String,
    /// Name of the untyped source function
    pub untyped: String,
    /// Supplied parameters in calling order
    pub params: Vec<String>,
    pub input_types: Vec<JitType>,
    /// Type of every variable the body defines or reads
    pub type_env: BTreeMap<String, JitType>,
    pub body: Vec<Stmt<TypedExpr>>,
    pub return_type: JitType,
    /// Body stores into arrays or calls something that does
    pub writes_memory: bool,
}

impl TypedFn {
    /// Serialize the definition handed to a backend
    pub fn to_json(&self) -> JitResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| JitError::Backend(e.to_string()))
    }

    pub fn from_json(src: &str) -> JitResult<Self> {
        serde_json::from_str(src).map_err(|e| JitError::Backend(e.to_string()))
    }

    /// Typed variable references for the parameters, in calling order
    pub fn param_exprs(&self) -> Vec<TypedExpr> {
        self.params
            .iter()
            .zip(&self.input_types)
            .map(|(name, ty)| TypedExpr::var(name, ty.clone()))
            .collect()
    }
}
