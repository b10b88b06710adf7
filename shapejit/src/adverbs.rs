//! Adverb expansion.
//!
//! Higher-rank elementwise maps are expressed as chains of rank-1 maps: the
//! wrapper for depth `d` maps the wrapper for depth `d - 1` along axis 0,
//! bottoming out at the inner function. Wrappers are ordinary untyped
//! functions registered in the [`Registry`], so they specialize like user
//! code. Elementwise operators on arrays lower to maps over a primitive
//! wrapper holding the scalar operator.
//!
//! Both tables are write-once per key.

use crate::error::JitResult;
use crate::ir::{BinOp, Expr, FormalArgs, Stmt, UnaryOp, UntypedFn};
use crate::registry::Registry;
use log::debug;
use std::collections::HashMap;

/// Scalar operator lifted into a function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimOp {
    Binary(BinOp),
    Unary(UnaryOp),
}

impl PrimOp {
    fn name(self) -> &'static str {
        match self {
            PrimOp::Binary(op) => op.name(),
            PrimOp::Unary(op) => op.name(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NestedKey {
    inner: String,
    depth: usize,
    arg_names: Vec<String>,
    n_fixed: usize,
}

/// Memo tables for synthesized wrappers
#[derive(Debug, Default)]
pub struct AdverbCache {
    nested: HashMap<NestedKey, String>,
    primitives: HashMap<PrimOp, String>,
    synthesized: usize,
}

impl AdverbCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrapper mapping `inner` over `depth` outer axes of `arg_names`.
    ///
    /// Depth 0 is `inner` itself.
    pub fn nested_maps(
        &mut self,
        registry: &mut Registry,
        inner: &str,
        depth: usize,
        arg_names: &[String],
    ) -> JitResult<String> {
        self.nested_maps_with_fixed(registry, inner, depth, arg_names, 0)
    }

    /// Like [`nested_maps`](Self::nested_maps) for an inner closure with
    /// `n_fixed` fixed arguments; they become the wrapper's leading
    /// parameters and are threaded through unchanged to every level.
    pub fn nested_maps_with_fixed(
        &mut self,
        registry: &mut Registry,
        inner: &str,
        depth: usize,
        arg_names: &[String],
        n_fixed: usize,
    ) -> JitResult<String> {
        if depth == 0 {
            return Ok(inner.to_string());
        }
        let key = NestedKey {
            inner: inner.to_string(),
            depth,
            arg_names: arg_names.to_vec(),
            n_fixed,
        };
        if let Some(name) = self.nested.get(&key) {
            return Ok(name.clone());
        }

        let below = self.nested_maps_with_fixed(registry, inner, depth - 1, arg_names, n_fixed)?;
        let fixed_names: Vec<String> = (0..n_fixed).map(|i| format!("$c{i}")).collect();
        let func = if n_fixed == 0 {
            Expr::FnRef(below)
        } else {
            Expr::Closure {
                func: below,
                args: fixed_names.iter().map(|n| Expr::Var(n.clone())).collect(),
            }
        };
        let body = vec![Stmt::Return(Expr::map(
            func,
            arg_names.iter().map(|n| Expr::Var(n.clone())).collect(),
            Some(0),
        ))];
        let formals = FormalArgs {
            positional: fixed_names.into_iter().chain(arg_names.iter().cloned()).collect(),
            ..FormalArgs::default()
        };

        let name = registry.fresh_name(&format!("{inner}_broadcast{depth}"));
        registry.register(UntypedFn::new(&name, formals, body))?;
        debug!("adverbs: synthesized `{name}` (depth {depth} over `{inner}`)");
        self.synthesized += 1;
        self.nested.insert(key, name.clone());
        Ok(name)
    }

    /// Function applying one scalar operator to its parameters.
    pub fn primitive_wrapper(&mut self, registry: &mut Registry, op: PrimOp) -> JitResult<String> {
        if let Some(name) = self.primitives.get(&op) {
            return Ok(name.clone());
        }
        let (params, body): (&[&str], Expr) = match op {
            PrimOp::Binary(op) => (&["x", "y"], Expr::binop(op, Expr::var("x"), Expr::var("y"))),
            PrimOp::Unary(op) => (&["x"], Expr::unary(op, Expr::var("x"))),
        };
        let name = registry.fresh_name(&format!("prim_{}", op.name()));
        registry.register(UntypedFn::new(
            &name,
            FormalArgs::new(params),
            vec![Stmt::Return(body)],
        ))?;
        debug!("adverbs: synthesized primitive `{name}`");
        self.synthesized += 1;
        self.primitives.insert(op, name.clone());
        Ok(name)
    }

    /// Number of wrappers synthesized so far
    pub fn synthesized(&self) -> usize {
        self.synthesized
    }
}

/// Positional parameter names for an `n`-argument wrapper
pub fn wrapper_arg_names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("x{i}")).collect()
}
