//! Optimization passes over typed functions.
//!
//! Passes run in a pipeline that repeats until no pass reports a change or
//! the iteration cap is reached.

mod dce;
mod index_elim;

pub use dce::DeadCodeElimination;
pub use index_elim::IndexElimination;

use crate::config::JitConfig;
use crate::error::JitResult;
use crate::ir::TypedFn;
use log::debug;

/// Optimization pass trait
pub trait OptimizationPass: std::fmt::Debug {
    /// Name of this optimization pass
    fn name(&self) -> &str;

    /// Rewrite `func` in place; returns the number of changes made
    fn optimize_function(&self, func: &mut TypedFn) -> JitResult<usize>;
}

/// Optimization pipeline
#[derive(Debug)]
pub struct OptimizationPipeline {
    passes: Vec<Box<dyn OptimizationPass>>,
    max_iterations: usize,
}

impl Default for OptimizationPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimizationPipeline {
    /// Create an empty pipeline
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            max_iterations: 10,
        }
    }

    /// Pipeline with the passes enabled in `config`
    pub fn from_config(config: &JitConfig) -> Self {
        let mut pipeline = Self::new();
        if config.index_elimination {
            pipeline.add_pass(Box::new(IndexElimination::new()));
        }
        if config.dead_code_elimination {
            pipeline.add_pass(Box::new(DeadCodeElimination::new()));
        }
        pipeline.set_max_iterations(config.max_pass_iterations);
        pipeline
    }

    /// Add a pass to the pipeline
    pub fn add_pass(&mut self, pass: Box<dyn OptimizationPass>) {
        self.passes.push(pass);
    }

    /// Set maximum iterations
    pub fn set_max_iterations(&mut self, max: usize) {
        self.max_iterations = max;
    }

    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Run the pipeline on one function
    pub fn run(&self, func: &mut TypedFn) -> JitResult<usize> {
        let mut total_changes = 0;

        for iteration in 0..self.max_iterations {
            let mut changes_this_iteration = 0;

            for pass in &self.passes {
                let changes = pass.optimize_function(func)?;
                if changes > 0 {
                    debug!(
                        "optimizer: {} made {changes} changes to `{}` (round {iteration})",
                        pass.name(),
                        func.name
                    );
                }
                changes_this_iteration += changes;
            }

            total_changes += changes_this_iteration;

            // Fixed point reached
            if changes_this_iteration == 0 {
                break;
            }
        }

        Ok(total_changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, Stmt, TypedExpr, TypedExprKind, TypedFnId};
    use crate::types::{JitType, ScalarKind};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn function(body: Vec<Stmt<TypedExpr>>) -> TypedFn {
        TypedFn {
            id: TypedFnId(0),
            name: "f_0".to_string(),
            untyped: "f".to_string(),
            params: vec!["n".to_string()],
            input_types: vec![JitType::INT64],
            type_env: BTreeMap::new(),
            body,
            return_type: JitType::INT64,
            writes_memory: false,
        }
    }

    #[test]
    fn test_pass_names() {
        let pipeline = OptimizationPipeline::from_config(&JitConfig::default());
        assert_eq!(pipeline.pass_names(), vec!["index_elimination", "dead_code_elimination"]);

        let config = JitConfig {
            index_elimination: false,
            ..JitConfig::default()
        };
        assert_eq!(
            OptimizationPipeline::from_config(&config).pass_names(),
            vec!["dead_code_elimination"]
        );
    }

    #[test]
    fn test_pipeline_reaches_fixpoint() {
        // r = range(n, 100, 3); k = r[2]; return k
        let range = TypedExpr::new(
            TypedExprKind::Range {
                start: Box::new(TypedExpr::var("n", JitType::INT64)),
                stop: Box::new(TypedExpr::int(100)),
                step: Box::new(TypedExpr::int(3)),
            },
            JitType::array(ScalarKind::Int64, 1),
        );
        let index = TypedExpr::new(
            TypedExprKind::Index {
                value: Box::new(TypedExpr::var("r", range.ty.clone())),
                index: Box::new(TypedExpr::int(2)),
            },
            JitType::INT64,
        );
        let mut f = function(vec![
            Stmt::assign("r", range),
            Stmt::assign("k", index),
            Stmt::Return(TypedExpr::var("k", JitType::INT64)),
        ]);
        let changes = OptimizationPipeline::from_config(&JitConfig::default())
            .run(&mut f)
            .unwrap();
        assert!(changes >= 2);
        // the range is gone, only the arithmetic survives
        assert_eq!(
            f.body,
            vec![
                Stmt::assign(
                    "k",
                    TypedExpr::binop(
                        BinOp::Add,
                        TypedExpr::var("n", JitType::INT64),
                        TypedExpr::int(6),
                        JitType::INT64,
                    )
                ),
                Stmt::Return(TypedExpr::var("k", JitType::INT64)),
            ]
        );
    }
}
