//! Error types for the specialization pipeline.
//!
//! Every fallible operation in the crate returns [`JitResult`]. The variants
//! mirror the failure classes of the pipeline:
//!
//! - binding failures at the call boundary (`ArityMismatch`, `UnexpectedKeyword`)
//! - rank and type failures during specialization (`RankMismatch`, `TypeError`)
//! - registry misses (`UnknownFunction`, `DuplicateFunction`)
//! - shape failures (`InvalidShapeOperand`)
//! - internal SSA consistency failures (`MergeInvariantViolation`)

use thiserror::Error;

/// Error raised anywhere in the JIT core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum JitError {
    /// Two array arguments of one adverb disagree on rank
    #[error("rank mismatch: adverb can't accept inputs of rank {expected} and {found}")]
    RankMismatch { expected: usize, found: usize },

    /// Arguments could not be bound to the formal parameters
    #[error("arity mismatch calling `{function}`: {detail}")]
    ArityMismatch { function: String, detail: String },

    /// A keyword argument names no formal parameter
    #[error("unexpected keyword argument `{keyword}` for `{function}`")]
    UnexpectedKeyword { function: String, keyword: String },

    /// Registry lookup miss
    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    /// A function identifier was registered twice
    #[error("function `{0}` is already registered")]
    DuplicateFunction(String),

    /// A variable was read before any definition reached it
    #[error("unbound variable `{0}`")]
    UnboundVariable(String),

    /// No concrete type can be assigned to an expression
    #[error("type error: {message} in `{expr}`")]
    TypeError { message: String, expr: String },

    /// Shape inference or shape codegen met a non-constructible shape
    #[error("invalid shape operand: {0}")]
    InvalidShapeOperand(String),

    /// A path-dependent variable was read outside its merge list
    #[error("merge invariant violated in `{function}`: `{variable}` read outside its defining block")]
    MergeInvariantViolation { function: String, variable: String },

    /// Runtime failure inside one of the reference evaluators
    #[error("evaluation error: {0}")]
    Eval(String),

    /// Failure reported by a code-emission backend
    #[error("backend error: {0}")]
    Backend(String),

    /// Malformed configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl JitError {
    /// Build a `TypeError` for the given expression.
    pub fn type_error(message: impl Into<String>, expr: impl ToString) -> Self {
        JitError::TypeError {
            message: message.into(),
            expr: expr.to_string(),
        }
    }

    /// Build an `ArityMismatch` for the given function.
    pub fn arity(function: &str, detail: impl Into<String>) -> Self {
        JitError::ArityMismatch {
            function: function.to_string(),
            detail: detail.into(),
        }
    }

    /// True for errors that describe a bad call rather than a compiler bug.
    pub fn is_user_error(&self) -> bool {
        !matches!(
            self,
            JitError::MergeInvariantViolation { .. } | JitError::Backend(_)
        )
    }
}

/// Result type for JIT operations
pub type JitResult<T> = Result<T, JitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_mismatch_message() {
        let err = JitError::RankMismatch {
            expected: 1,
            found: 2,
        };
        assert_eq!(
            err.to_string(),
            "rank mismatch: adverb can't accept inputs of rank 1 and 2"
        );
    }

    #[test]
    fn test_type_error_carries_expression() {
        let err = JitError::type_error("cannot add", "x + y");
        assert_eq!(err.to_string(), "type error: cannot add in `x + y`");
    }

    #[test]
    fn test_merge_violation_is_not_user_error() {
        let err = JitError::MergeInvariantViolation {
            function: "f".to_string(),
            variable: "y.1".to_string(),
        };
        assert!(!err.is_user_error());
        assert!(JitError::UnknownFunction("g".to_string()).is_user_error());
    }
}
