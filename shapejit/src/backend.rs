//! Code-emission boundary.
//!
//! A [`Backend`] turns one typed function (plus, when available, the code
//! computing its result shape) into a routine the driver can call. The
//! driver caches routines by specialization identity, so a backend never
//! sees the same specialization twice.
//!
//! # Backends
//!
//! - **Reference**: hands the serialized definition to the typed evaluator
//!   and checks array results against the precomputed shape

use crate::error::{JitError, JitResult};
use crate::interp::TypedEvaluator;
use crate::ir::TypedFn;
use crate::shape::ShapeCode;
use crate::specialize::SpecializationCache;
use crate::value::Value;
use log::debug;
use std::rc::Rc;

/// Everything a backend receives for one specialization
#[derive(Debug, Clone)]
pub struct CompileRequest<'a> {
    pub function: Rc<TypedFn>,
    /// Result shape code, absent when shape inference fell back
    pub shape: Option<&'a ShapeCode>,
    /// Every published specialization, for resolving calls
    pub functions: &'a SpecializationCache,
}

/// A compiled specialization
pub trait CompiledRoutine: std::fmt::Debug {
    /// Run with the specialization's supplied arguments
    fn invoke(&self, functions: &SpecializationCache, args: &[Value]) -> JitResult<Value>;
}

/// Trait for code-emission backends
pub trait Backend: std::fmt::Debug {
    type Routine: CompiledRoutine + Clone;

    /// Backend name
    fn name(&self) -> &str;

    /// Compile one specialization
    fn compile(&mut self, request: CompileRequest<'_>) -> JitResult<Self::Routine>;
}

/// Backend executing typed IR with the reference evaluator
#[derive(Debug, Default)]
pub struct ReferenceBackend {
    compiled: usize,
}

impl ReferenceBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of routines produced so far
    pub fn compiled(&self) -> usize {
        self.compiled
    }
}

/// Routine of the reference backend
#[derive(Debug, Clone)]
pub struct ReferenceRoutine {
    function: Rc<TypedFn>,
    shape: Option<ShapeCode>,
}

impl ReferenceRoutine {
    pub fn function(&self) -> &TypedFn {
        &self.function
    }

    pub fn shape_code(&self) -> Option<&ShapeCode> {
        self.shape.as_ref()
    }
}

impl Backend for ReferenceBackend {
    type Routine = ReferenceRoutine;

    fn name(&self) -> &str {
        "reference"
    }

    fn compile(&mut self, request: CompileRequest<'_>) -> JitResult<ReferenceRoutine> {
        // the routine runs the definition as it crosses the boundary
        let serialized = request.function.to_json()?;
        let function = TypedFn::from_json(&serialized)?;
        if function != *request.function {
            return Err(JitError::Backend(format!(
                "`{}` changed in serialization",
                function.name
            )));
        }
        debug!(
            "backend: compiled `{}` ({} bytes, shape code: {})",
            function.name,
            serialized.len(),
            request.shape.is_some()
        );
        self.compiled += 1;
        Ok(ReferenceRoutine {
            function: Rc::new(function),
            shape: request.shape.cloned(),
        })
    }
}

impl CompiledRoutine for ReferenceRoutine {
    fn invoke(&self, functions: &SpecializationCache, args: &[Value]) -> JitResult<Value> {
        let mut evaluator = TypedEvaluator::new(functions);
        let result = evaluator.call_fn(&self.function, args.to_vec())?;
        if let (Some(code), Value::Array(_)) = (&self.shape, &result) {
            let expected = evaluator.eval_shape_code(code, args)?;
            let actual = result.shape_value();
            if expected != actual {
                return Err(JitError::Backend(format!(
                    "`{}` produced shape {actual}, shape code predicted {expected}",
                    self.function.name
                )));
            }
        }
        Ok(result)
    }
}
