//! Intermediate representation.
//!
//! Two expression languages share one statement skeleton:
//!
//! - [`Expr`]: the untyped form produced by the front end and kept in the
//!   registry (after SSA conversion) as [`UntypedFn`] bodies
//! - [`TypedExpr`]: the typed form produced by specialization, every node
//!   annotated with its concrete [`JitType`](crate::types::JitType)
//!
//! Statements are generic over the expression type: `Stmt<Expr>` is an
//! untyped statement and `Stmt<TypedExpr>` a typed one.
//!
//! # Module Organization
//!
//! - `mod.rs`: constants, statements, merge entries, argument descriptors
//! - `ops.rs`: binary and unary operators
//! - `untyped.rs`: `Expr`, `FunctionDef`, `UntypedFn`
//! - `typed.rs`: `TypedExpr`, `TypedFn`, `TypedFnId`
//! - `visit.rs`: variable-read traversal and in-place expression rewriting
//! - `display.rs`: textual printer
//! - `tests.rs`: Tests

pub mod display;
pub mod ops;
pub mod typed;
pub mod untyped;
pub mod visit;

pub use ops::{BinOp, UnaryOp};
pub use typed::{TypedExpr, TypedExprKind, TypedFn, TypedFnId};
pub use untyped::{Expr, FunctionDef, UntypedFn};
pub use visit::ReadsVars;

use crate::types::JitType;
use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Literal constant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Const {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl Const {
    /// Concrete type of this literal
    pub fn ty(&self) -> JitType {
        match self {
            Const::None => JitType::NoneType,
            Const::Bool(_) => JitType::BOOL,
            Const::Int(_) => JitType::INT64,
            Const::Float(_) => JitType::FLOAT64,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Const::Int(i) => Some(*i),
            Const::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }
}

// ============================================================================
// Statements
// ============================================================================

/// One merge entry: `result` takes `left` when control arrives along the
/// first path and `right` when it arrives along the second.
///
/// For a conditional, left is the true branch and right the false branch.
/// For a loop's pre-loop list, left is loop entry and right the back edge;
/// for its post-loop list, left is "body never ran" and right "body ran".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phi<E> {
    pub result: String,
    pub left: E,
    pub right: E,
}

impl<E> Phi<E> {
    pub fn new(result: impl Into<String>, left: E, right: E) -> Self {
        Self {
            result: result.into(),
            left,
            right,
        }
    }
}

/// Assignment target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Lhs<E> {
    /// Bind a variable
    Var(String),
    /// Destructure a tuple
    Tuple(Vec<Lhs<E>>),
    /// Store into an array element or sub-array
    Index { value: E, index: E },
}

impl<E> Lhs<E> {
    /// Names bound by this target (indexed stores bind nothing)
    pub fn bound_names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Lhs::Var(name) => out.push(name),
            Lhs::Tuple(elts) => elts.iter().for_each(|e| e.collect_names(out)),
            Lhs::Index { .. } => {}
        }
    }
}

/// Statement, generic over the expression language
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt<E> {
    Assign {
        lhs: Lhs<E>,
        rhs: E,
    },
    If {
        cond: E,
        true_block: Vec<Stmt<E>>,
        false_block: Vec<Stmt<E>>,
        merge: Vec<Phi<E>>,
    },
    While {
        cond: E,
        body: Vec<Stmt<E>>,
        merge_before: Vec<Phi<E>>,
        merge_after: Vec<Phi<E>>,
    },
    Return(E),
}

impl<E> Stmt<E> {
    /// `name = rhs`
    pub fn assign(name: impl Into<String>, rhs: E) -> Self {
        Stmt::Assign {
            lhs: Lhs::Var(name.into()),
            rhs,
        }
    }

    /// `value[index] = rhs`
    pub fn store(value: E, index: E, rhs: E) -> Self {
        Stmt::Assign {
            lhs: Lhs::Index { value, index },
            rhs,
        }
    }

    /// Structured conditional with an empty merge list
    pub fn if_else(cond: E, true_block: Vec<Stmt<E>>, false_block: Vec<Stmt<E>>) -> Self {
        Stmt::If {
            cond,
            true_block,
            false_block,
            merge: Vec::new(),
        }
    }

    /// Structured loop with empty merge lists
    pub fn while_loop(cond: E, body: Vec<Stmt<E>>) -> Self {
        Stmt::While {
            cond,
            body,
            merge_before: Vec::new(),
            merge_after: Vec::new(),
        }
    }
}

/// True when every path through `block` ends in a `Return`.
pub fn block_returns<E>(block: &[Stmt<E>]) -> bool {
    block.iter().any(|stmt| match stmt {
        Stmt::Return(_) => true,
        Stmt::If {
            true_block,
            false_block,
            ..
        } => block_returns(true_block) && block_returns(false_block),
        _ => false,
    })
}

// ============================================================================
// Argument descriptors
// ============================================================================

/// Formal parameters of a function.
///
/// Parameter order is `nonlocals ++ positional`; closures supply the
/// nonlocals through their fixed arguments.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FormalArgs {
    /// Free variables captured by closures
    pub nonlocals: Vec<String>,
    /// Ordinary positional parameters
    pub positional: Vec<String>,
    /// Constant defaults for positional parameters
    pub defaults: Vec<(String, Const)>,
    /// Variadic capture of extra positional arguments
    pub starargs: Option<String>,
}

impl FormalArgs {
    pub fn new(positional: &[&str]) -> Self {
        Self {
            positional: positional.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Give the positional parameter `name` a constant default.
    ///
    /// Only positional parameters take defaults; a name not listed yet is
    /// appended to the positional parameters. Registration rejects a
    /// default on any other name.
    pub fn with_default(mut self, name: &str, value: Const) -> Self {
        let listed = self.positional.iter().chain(&self.nonlocals).any(|p| p == name);
        if !listed {
            self.positional.push(name.to_string());
        }
        self.defaults.push((name.to_string(), value));
        self
    }

    pub fn with_starargs(mut self, name: &str) -> Self {
        self.starargs = Some(name.to_string());
        self
    }

    pub fn with_nonlocals(mut self, names: &[&str]) -> Self {
        self.nonlocals = names.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Bindable slot names in order (nonlocals then positional)
    pub fn slot_names(&self) -> impl Iterator<Item = &String> {
        self.nonlocals.iter().chain(self.positional.iter())
    }

    /// Every name the function binds on entry, variadic capture included
    pub fn all_names(&self) -> Vec<String> {
        self.slot_names()
            .chain(self.starargs.iter())
            .cloned()
            .collect()
    }

    pub fn default_for(&self, name: &str) -> Option<&Const> {
        self.defaults
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }
}

/// Arguments at a call site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActualArgs<T> {
    pub positional: Vec<T>,
    pub keywords: Vec<(String, T)>,
    pub starargs: Option<T>,
}

impl<T> Default for ActualArgs<T> {
    fn default() -> Self {
        Self {
            positional: Vec::new(),
            keywords: Vec::new(),
            starargs: None,
        }
    }
}

impl<T> ActualArgs<T> {
    pub fn positional(args: Vec<T>) -> Self {
        Self {
            positional: args,
            ..Self::default()
        }
    }

    pub fn with_keyword(mut self, name: &str, value: T) -> Self {
        self.keywords.push((name.to_string(), value));
        self
    }

    pub fn with_starargs(mut self, value: T) -> Self {
        self.starargs = Some(value);
        self
    }

    /// Apply `f` to every argument, keeping the layout
    pub fn try_map<U, Err>(
        &self,
        mut f: impl FnMut(&T) -> Result<U, Err>,
    ) -> Result<ActualArgs<U>, Err> {
        Ok(ActualArgs {
            positional: self.positional.iter().map(&mut f).collect::<Result<_, _>>()?,
            keywords: self
                .keywords
                .iter()
                .map(|(k, v)| f(v).map(|v| (k.clone(), v)))
                .collect::<Result<_, _>>()?,
            starargs: self.starargs.as_ref().map(&mut f).transpose()?,
        })
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.keywords.len() + usize::from(self.starargs.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
