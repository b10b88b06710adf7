//! JIT driver.
//!
//! [`Jit`] ties a [`Session`] to a [`Backend`]: a call derives argument
//! types from the runtime values, specializes, compiles the specialization
//! once, and invokes the cached routine.

use crate::backend::{Backend, CompileRequest, CompiledRoutine, ReferenceBackend};
use crate::config::JitConfig;
use crate::error::JitResult;
use crate::ir::{ActualArgs, FunctionDef, TypedFn, TypedFnId, UntypedFn};
use crate::linearize::{linearize, Callable};
use crate::session::Session;
use crate::value::Value;
use log::debug;
use std::collections::HashMap;
use std::rc::Rc;

/// Driver statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JitStats {
    /// Routines requested from the backend
    pub compilations: usize,
    /// Calls answered by an already compiled routine
    pub routine_cache_hits: usize,
    /// Routines compiled without a precomputed shape
    pub shape_fallbacks: usize,
    /// Calls dispatched
    pub calls: usize,
}

impl JitStats {
    /// Create new empty statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge statistics from another driver
    pub fn merge(&mut self, other: &JitStats) {
        self.compilations += other.compilations;
        self.routine_cache_hits += other.routine_cache_hits;
        self.shape_fallbacks += other.shape_fallbacks;
        self.calls += other.calls;
    }
}

/// Specializing, compiling and caching call dispatcher
#[derive(Debug)]
pub struct Jit<B: Backend = ReferenceBackend> {
    session: Session,
    backend: B,
    compiled: HashMap<TypedFnId, B::Routine>,
    stats: JitStats,
}

impl Jit<ReferenceBackend> {
    /// Driver over the reference backend
    pub fn new(config: JitConfig) -> Self {
        Self::with_backend(config, ReferenceBackend::new())
    }
}

impl Default for Jit<ReferenceBackend> {
    fn default() -> Self {
        Self::new(JitConfig::default())
    }
}

impl<B: Backend> Jit<B> {
    pub fn with_backend(config: JitConfig, backend: B) -> Self {
        Self {
            session: Session::new(config),
            backend,
            compiled: HashMap::new(),
            stats: JitStats::default(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn stats(&self) -> &JitStats {
        &self.stats
    }

    /// Convert and register a front-end definition
    pub fn define(&mut self, def: FunctionDef) -> JitResult<Rc<UntypedFn>> {
        self.session.define(def)
    }

    /// Routine for `function`, compiling it on first request
    pub fn compile(&mut self, function: &Rc<TypedFn>) -> JitResult<B::Routine> {
        if let Some(routine) = self.compiled.get(&function.id) {
            self.stats.routine_cache_hits += 1;
            return Ok(routine.clone());
        }
        let shape = if self.session.config().precompute_shapes {
            let code = self.session.shape_code(function);
            if code.is_none() {
                self.stats.shape_fallbacks += 1;
            }
            code
        } else {
            None
        };
        let request = CompileRequest {
            function: Rc::clone(function),
            shape: shape.as_ref(),
            functions: self.session.cache(),
        };
        let routine = self.backend.compile(request)?;
        debug!(
            "jit: {} backend compiled `{}`",
            self.backend.name(),
            function.name
        );
        self.stats.compilations += 1;
        self.compiled.insert(function.id, routine.clone());
        Ok(routine)
    }

    /// Call `name` with positional arguments
    pub fn call(&mut self, name: &str, args: Vec<Value>) -> JitResult<Value> {
        self.call_with(Callable::function(name), ActualArgs::positional(args))
    }

    /// Call a function or closure with arbitrary arguments
    pub fn call_with(&mut self, callable: Callable<Value>, actuals: ActualArgs<Value>) -> JitResult<Value> {
        let (function, lin) = linearize(self.session.registry(), callable, actuals)?;
        let types = lin.map(Value::type_of);
        let typed = self.session.specialize_linearized(&function, types)?;
        let routine = self.compile(&typed)?;
        self.stats.calls += 1;
        routine.invoke(self.session.cache(), &lin.supplied())
    }
}
