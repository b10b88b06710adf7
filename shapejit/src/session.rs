//! Compilation session.
//!
//! A [`Session`] owns every table that outlives a single call: the function
//! registry, the adverb memo tables, the specialization cache and the
//! statistics. Sessions are independent of each other.

use crate::adverbs::AdverbCache;
use crate::config::JitConfig;
use crate::error::JitResult;
use crate::interp::{Interpreter, TypedEvaluator};
use crate::ir::{ActualArgs, FunctionDef, TypedFn, UntypedFn};
use crate::linearize::{Callable, Linearized};
use crate::registry::Registry;
use crate::shape::{call_shape_expr, make_shape_expr, ShapeCode, SymValue};
use crate::specialize::{SpecializationCache, Specializer};
use crate::ssa;
use crate::types::JitType;
use log::{debug, warn};
use std::rc::Rc;

/// Session statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Specializations typed and published
    pub specializations_built: usize,
    /// Lookups answered by a complete cache entry
    pub cache_hits: usize,
    /// Signatures cached as failed
    pub failed_specializations: usize,
    /// Adverb and primitive wrappers registered
    pub wrappers_synthesized: usize,
    /// Rewrites reported by the optimizer pipeline
    pub optimizer_changes: usize,
    /// Shapes left uncomputed because inference or codegen failed
    pub shape_fallbacks: usize,
}

impl SessionStats {
    /// Create new empty statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge statistics from another session
    pub fn merge(&mut self, other: &SessionStats) {
        self.specializations_built += other.specializations_built;
        self.cache_hits += other.cache_hits;
        self.failed_specializations += other.failed_specializations;
        self.wrappers_synthesized += other.wrappers_synthesized;
        self.optimizer_changes += other.optimizer_changes;
        self.shape_fallbacks += other.shape_fallbacks;
    }
}

/// Registry, caches and configuration of one compilation session
#[derive(Debug, Default)]
pub struct Session {
    registry: Registry,
    adverbs: AdverbCache,
    cache: SpecializationCache,
    config: JitConfig,
    stats: SessionStats,
}

impl Session {
    pub fn new(config: JitConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &JitConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn cache(&self) -> &SpecializationCache {
        &self.cache
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            wrappers_synthesized: self.adverbs.synthesized(),
            ..self.stats.clone()
        }
    }

    /// Convert a front-end definition to SSA and register it.
    pub fn define(&mut self, def: FunctionDef) -> JitResult<Rc<UntypedFn>> {
        let function = ssa::build(def)?;
        if self.config.verify_ssa {
            ssa::verify_merges(&function)?;
        }
        debug!("session: defined `{}`", function.name);
        self.registry.register(function)
    }

    /// Register a function already in SSA form.
    pub fn register(&mut self, function: UntypedFn) -> JitResult<Rc<UntypedFn>> {
        if self.config.verify_ssa {
            ssa::verify_merges(&function)?;
        }
        self.registry.register(function)
    }

    pub fn specializer(&mut self) -> Specializer<'_> {
        Specializer {
            registry: &mut self.registry,
            adverbs: &mut self.adverbs,
            cache: &mut self.cache,
            config: &self.config,
            stats: &mut self.stats,
        }
    }

    /// Specialize `callable` for arguments of the given types
    pub fn specialize(
        &mut self,
        callable: Callable<JitType>,
        actuals: ActualArgs<JitType>,
    ) -> JitResult<Rc<TypedFn>> {
        self.specializer().specialize(callable, actuals)
    }

    /// Specialize `name` for positional arguments of the given types
    pub fn specialize_fn(&mut self, name: &str, types: &[JitType]) -> JitResult<Rc<TypedFn>> {
        self.specialize(Callable::function(name), ActualArgs::positional(types.to_vec()))
    }

    /// Specialization for a signature linearized elsewhere
    pub(crate) fn specialize_linearized(
        &mut self,
        function: &Rc<UntypedFn>,
        lin: Linearized<JitType>,
    ) -> JitResult<Rc<TypedFn>> {
        let resolved = self.specializer().resolve(function, lin, None)?;
        self.cache.get(resolved.id)
    }

    pub fn interpreter(&self) -> Interpreter<'_> {
        Interpreter::new(&self.registry)
    }

    pub fn evaluator(&self) -> TypedEvaluator<'_> {
        TypedEvaluator::new(&self.cache)
    }

    /// Symbolic result shape of a published specialization
    pub fn shape_of(&self, function: &TypedFn) -> JitResult<SymValue> {
        call_shape_expr(&self.cache, function)
    }

    /// Shape code for `function`, or `None` when its result shape can't be
    /// computed from its inputs
    pub fn shape_code(&mut self, function: &TypedFn) -> Option<ShapeCode> {
        let shape = match self.shape_of(function) {
            Ok(shape) => shape,
            Err(err) => {
                warn!("shape: inference failed for `{}`: {err}", function.name);
                self.stats.shape_fallbacks += 1;
                return None;
            }
        };
        if !shape.is_scalar() && !shape.is_constructible() {
            warn!(
                "shape: result shape {shape} of `{}` is not computable from its inputs",
                function.name
            );
            self.stats.shape_fallbacks += 1;
            return None;
        }
        let inputs: Vec<(String, JitType)> = function
            .params
            .iter()
            .cloned()
            .zip(function.input_types.iter().cloned())
            .collect();
        match make_shape_expr(&shape, &inputs) {
            Ok(code) => Some(code),
            Err(err) => {
                warn!("shape: no shape code for `{}`: {err}", function.name);
                self.stats.shape_fallbacks += 1;
                None
            }
        }
    }
}
