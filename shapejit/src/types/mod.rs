//! Concrete types for specialization.
//!
//! A specialization is keyed by a tuple of [`JitType`]s. Only scalars,
//! fixed-rank arrays, tuples, slices and closures over these exist; there is
//! no `Any` or union, so every specialized function is monomorphic.
//!
//! # Module Organization
//!
//! - `mod.rs`: `ScalarKind`, `JitType`, promotion and merge joins
//! - `rank.rs`: adverb rank helpers (`max_rank`, `num_outer_axes`)
//! - `tests.rs`: Tests

pub mod rank;

pub use rank::{max_rank, num_outer_axes};

use crate::error::{JitError, JitResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element kind of scalars and array elements.
///
/// Variants are declared in promotion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScalarKind {
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl ScalarKind {
    /// Check if this kind is a floating point kind
    pub fn is_float(self) -> bool {
        matches!(self, ScalarKind::Float32 | ScalarKind::Float64)
    }

    /// Check if this kind is an integer kind (Bool excluded)
    pub fn is_int(self) -> bool {
        matches!(self, ScalarKind::Int32 | ScalarKind::Int64)
    }

    /// Smallest kind both operands convert to without losing range.
    ///
    /// `Int64` mixed with `Float32` widens to `Float64`.
    pub fn promote(self, other: ScalarKind) -> ScalarKind {
        let widest = self.max(other);
        let mixes_int64 = self == ScalarKind::Int64 || other == ScalarKind::Int64;
        if widest == ScalarKind::Float32 && mixes_int64 {
            ScalarKind::Float64
        } else {
            widest
        }
    }

    /// Kind produced by arithmetic on two operands of these kinds.
    pub fn arith(self, other: ScalarKind) -> ScalarKind {
        match self.promote(other) {
            ScalarKind::Bool => ScalarKind::Int64,
            kind => kind,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::Int32 => "int32",
            ScalarKind::Int64 => "int64",
            ScalarKind::Float32 => "float32",
            ScalarKind::Float64 => "float64",
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A concrete type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JitType {
    /// The type of `None`
    NoneType,
    /// Scalar value
    Scalar(ScalarKind),
    /// N-dimensional array with a fixed rank
    Array { elt: ScalarKind, rank: usize },
    /// Heterogeneous tuple
    Tuple(Vec<JitType>),
    /// Slice object (`start:stop:step`, each part optional)
    Slice,
    /// Closure over an untyped function with typed fixed arguments
    Closure { func: String, fixed: Vec<JitType> },
}

impl JitType {
    pub const BOOL: JitType = JitType::Scalar(ScalarKind::Bool);
    pub const INT64: JitType = JitType::Scalar(ScalarKind::Int64);
    pub const FLOAT64: JitType = JitType::Scalar(ScalarKind::Float64);

    /// Array type of the given element kind and rank
    pub fn array(elt: ScalarKind, rank: usize) -> Self {
        if rank == 0 {
            JitType::Scalar(elt)
        } else {
            JitType::Array { elt, rank }
        }
    }

    /// Number of array axes; 0 for everything that is not an array
    pub fn rank(&self) -> usize {
        match self {
            JitType::Array { rank, .. } => *rank,
            _ => 0,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, JitType::Scalar(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, JitType::Array { .. })
    }

    /// Scalar kind of a scalar or the element kind of an array
    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self {
            JitType::Scalar(kind) | JitType::Array { elt: kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Type of one slice along an axis of this type.
    ///
    /// Arrays lose one rank (rank 1 becomes its element scalar); every other
    /// type broadcasts unchanged.
    pub fn peel_axis(&self) -> JitType {
        match self {
            JitType::Array { elt, rank } => JitType::array(*elt, rank - 1),
            other => other.clone(),
        }
    }

    /// Type of stacking values of this type along a new outer axis.
    pub fn with_outer_axis(&self) -> Option<JitType> {
        match self {
            JitType::Scalar(kind) => Some(JitType::Array {
                elt: *kind,
                rank: 1,
            }),
            JitType::Array { elt, rank } => Some(JitType::Array {
                elt: *elt,
                rank: rank + 1,
            }),
            _ => None,
        }
    }

    /// Join of two types reaching one merge point.
    ///
    /// Equal types join to themselves, scalars promote, arrays of equal rank
    /// promote their element kinds and tuples join elementwise. Anything else
    /// has no concrete join.
    pub fn combine(&self, other: &JitType) -> JitResult<JitType> {
        if self == other {
            return Ok(self.clone());
        }
        match (self, other) {
            (JitType::Scalar(a), JitType::Scalar(b)) => Ok(JitType::Scalar(a.promote(*b))),
            (JitType::Array { elt: a, rank: ra }, JitType::Array { elt: b, rank: rb })
                if ra == rb =>
            {
                Ok(JitType::Array {
                    elt: a.promote(*b),
                    rank: *ra,
                })
            }
            (JitType::Tuple(xs), JitType::Tuple(ys)) if xs.len() == ys.len() => xs
                .iter()
                .zip(ys)
                .map(|(x, y)| x.combine(y))
                .collect::<JitResult<Vec<_>>>()
                .map(JitType::Tuple),
            _ => Err(JitError::type_error(
                format!("can't merge values of type {self} and {other}"),
                "merge",
            )),
        }
    }

    /// Short mangled form used in specialization names
    pub fn mangle(&self) -> String {
        match self {
            JitType::NoneType => "n".to_string(),
            JitType::Scalar(kind) => match kind {
                ScalarKind::Bool => "b".to_string(),
                ScalarKind::Int32 => "i32".to_string(),
                ScalarKind::Int64 => "i64".to_string(),
                ScalarKind::Float32 => "f32".to_string(),
                ScalarKind::Float64 => "f64".to_string(),
            },
            JitType::Array { elt, rank } => {
                format!("a{}{}", rank, JitType::Scalar(*elt).mangle())
            }
            JitType::Tuple(elts) => {
                let inner: Vec<String> = elts.iter().map(JitType::mangle).collect();
                format!("t{}_{}", elts.len(), inner.join("_"))
            }
            JitType::Slice => "s".to_string(),
            JitType::Closure { func, fixed } => format!("c{}_{}", fixed.len(), func),
        }
    }
}

impl fmt::Display for JitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JitType::NoneType => write!(f, "none"),
            JitType::Scalar(kind) => write!(f, "{kind}"),
            JitType::Array { elt, rank } => write!(f, "array{rank}<{elt}>"),
            JitType::Tuple(elts) => {
                write!(f, "(")?;
                for (i, t) in elts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                if elts.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            JitType::Slice => write!(f, "slice"),
            JitType::Closure { func, fixed } => {
                write!(f, "closure<{func}")?;
                for t in fixed {
                    write!(f, ", {t}")?;
                }
                write!(f, ">")
            }
        }
    }
}
