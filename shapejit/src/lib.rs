// Library code reports through the `log` facade and `JitResult`; it never prints.
#![deny(clippy::print_stderr)]

//! Type specialization and SSA pipeline for a shape-specializing array JIT.
//!
//! Untyped function definitions are registered in a [`Session`], converted to
//! SSA with explicit merge lists, and specialized per concrete argument-type
//! signature into typed functions. Shape inference predicts result shapes
//! symbolically, and a [`Backend`](backend::Backend) turns typed functions
//! into callable routines cached by the [`Jit`] driver.

// Leaf utilities
pub mod config;
pub mod error;
pub mod types;
pub mod value;

// Intermediate representation
pub mod ir;

// Front half: identities, binding, SSA
pub mod linearize;
pub mod registry;
pub mod ssa;

// Specialization
pub mod adverbs;
pub mod specialize;

// Analyses and passes over typed functions
pub mod analysis;
pub mod optimizer;
pub mod shape;

// Evaluation and dispatch
pub mod backend;
pub mod interp;
pub mod jit;
pub mod session;

pub use config::JitConfig;
pub use error::{JitError, JitResult};
pub use ir::{ActualArgs, Const, Expr, FormalArgs, FunctionDef, TypedFn, TypedFnId, UntypedFn};
pub use jit::{Jit, JitStats};
pub use linearize::Callable;
pub use session::{Session, SessionStats};
pub use types::{JitType, ScalarKind};
pub use value::Value;
