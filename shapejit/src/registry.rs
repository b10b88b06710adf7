//! Function registry and closure identities.
//!
//! The registry is append-only: a function identifier names one immutable
//! [`UntypedFn`] for the lifetime of the session, and every distinct
//! (function, fixed-argument types) pair keeps the integer identity it was
//! first given.

use crate::error::{JitError, JitResult};
use crate::ir::UntypedFn;
use crate::types::JitType;
use std::collections::HashMap;
use std::rc::Rc;

/// Store of untyped definitions and closure identities
#[derive(Debug, Default)]
pub struct Registry {
    functions: HashMap<String, Rc<UntypedFn>>,
    closure_ids: HashMap<(String, Vec<JitType>), usize>,
    fresh_counter: usize,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a definition under its own name.
    pub fn register(&mut self, function: UntypedFn) -> JitResult<Rc<UntypedFn>> {
        if self.functions.contains_key(&function.name) {
            return Err(JitError::DuplicateFunction(function.name));
        }
        let args = &function.args;
        if let Some((name, _)) = args.defaults.iter().find(|(n, _)| !args.positional.contains(n)) {
            return Err(JitError::ArityMismatch {
                function: function.name.clone(),
                detail: format!("default for `{name}`, which is not a positional parameter"),
            });
        }
        let name = function.name.clone();
        let function = Rc::new(function);
        self.functions.insert(name, Rc::clone(&function));
        Ok(function)
    }

    pub fn lookup(&self, name: &str) -> JitResult<Rc<UntypedFn>> {
        self.functions
            .get(name)
            .cloned()
            .ok_or_else(|| JitError::UnknownFunction(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Stable identity of the closure type `(func, fixed)`.
    pub fn closure_identity(&mut self, func: &str, fixed: &[JitType]) -> usize {
        let next = self.closure_ids.len();
        *self
            .closure_ids
            .entry((func.to_string(), fixed.to_vec()))
            .or_insert(next)
    }

    /// A function name not yet in use, derived from `prefix`.
    pub fn fresh_name(&mut self, prefix: &str) -> String {
        if !self.contains(prefix) {
            return prefix.to_string();
        }
        loop {
            self.fresh_counter += 1;
            let candidate = format!("{prefix}_{}", self.fresh_counter);
            if !self.contains(&candidate) {
                return candidate;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn closure_count(&self) -> usize {
        self.closure_ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Const, Expr, FormalArgs, Stmt};
    use crate::types::ScalarKind;

    fn ident(name: &str) -> UntypedFn {
        UntypedFn::new(
            name,
            FormalArgs::new(&["x"]),
            vec![Stmt::Return(Expr::var("x"))],
        )
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = Registry::new();
        let f = registry.register(ident("ident")).unwrap();
        assert!(Rc::ptr_eq(&f, &registry.lookup("ident").unwrap()));
        assert_eq!(
            registry.lookup("nope").unwrap_err(),
            JitError::UnknownFunction("nope".to_string())
        );
    }

    #[test]
    fn test_register_duplicate_fails() {
        let mut registry = Registry::new();
        registry.register(ident("f")).unwrap();
        assert_eq!(
            registry.register(ident("f")).unwrap_err(),
            JitError::DuplicateFunction("f".to_string())
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_default_on_nonlocal_rejected() {
        let mut registry = Registry::new();
        let err = registry
            .register(UntypedFn::new(
                "shifted",
                FormalArgs::new(&["x"])
                    .with_nonlocals(&["k"])
                    .with_default("k", Const::Int(1)),
                vec![Stmt::Return(Expr::var("x"))],
            ))
            .unwrap_err();
        assert!(matches!(err, JitError::ArityMismatch { .. }), "{err}");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_closure_identity_is_stable() {
        let mut registry = Registry::new();
        let vec_ty = JitType::array(ScalarKind::Float64, 1);
        let a = registry.closure_identity("f", &[JitType::INT64]);
        let b = registry.closure_identity("f", std::slice::from_ref(&vec_ty));
        let c = registry.closure_identity("g", &[JitType::INT64]);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(registry.closure_identity("f", &[JitType::INT64]), a);
        assert_eq!(registry.closure_identity("f", &[vec_ty]), b);
        assert_eq!(registry.closure_count(), 3);
    }

    #[test]
    fn test_fresh_name_skips_taken() {
        let mut registry = Registry::new();
        assert_eq!(registry.fresh_name("w"), "w");
        registry.register(ident("w")).unwrap();
        let next = registry.fresh_name("w");
        assert_ne!(next, "w");
        assert!(next.starts_with("w_"));
    }
}
