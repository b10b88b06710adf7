//! Analyses over function bodies.
//!
//! - `use_analysis.rs`: live variables and read counts
//! - `array_values.rs`: constant and range knowledge about array variables

pub mod array_values;
pub mod use_analysis;

pub use array_values::{array_knowledge, ArrayKnowledge, ArrayValues};
pub use use_analysis::{live_vars, use_count, FunctionBody};
