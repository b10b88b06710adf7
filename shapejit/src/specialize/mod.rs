//! Type specialization.
//!
//! Turns an untyped SSA function plus concrete argument types into a typed
//! SSA function, memoized per signature.
//!
//! # Cache protocol
//!
//! Every signature (function identity plus one type per formal slot, `None`
//! for slots left to their default) maps to at most one [`CacheEntry`]:
//!
//! ```text
//! absent ──reserve──▶ InProgress(id) ──finish──▶ Complete(fn)
//!                            └──────────fail────▶ Failed(err)
//! ```
//!
//! The id is allocated when the placeholder is inserted, so a recursive call
//! reaching the placeholder can already reference it. Such a call sees the
//! return type recorded so far; if no return has been typed yet the call is
//! a type error. Entries are never reopened.
//!
//! # Module Organization
//!
//! - `mod.rs`: cache, keys, the [`Specializer`] entry points
//! - `infer.rs`: statement and expression typing
//! - `tests.rs`: Tests

mod infer;
#[cfg(test)]
mod tests;

use crate::adverbs::AdverbCache;
use crate::config::JitConfig;
use crate::error::{JitError, JitResult};
use crate::ir::{
    block_returns, ActualArgs, Const, Expr, Stmt, TypedExpr, TypedFn, TypedFnId, UntypedFn,
};
use crate::linearize::{linearize, Bound, Callable, Linearized};
use crate::optimizer::OptimizationPipeline;
use crate::registry::Registry;
use crate::session::SessionStats;
use crate::ssa::verify_typed;
use crate::types::JitType;
use infer::FunctionState;
use log::debug;
use std::collections::HashMap;
use std::rc::Rc;

/// Monomorphization key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpecKey {
    pub func: String,
    /// One entry per formal slot; `None` where the default applies. A
    /// variadic formal adds a trailing tuple entry.
    pub slots: Vec<Option<JitType>>,
}

impl SpecKey {
    pub fn new(func: &str, lin: &Linearized<JitType>) -> Self {
        let mut slots: Vec<Option<JitType>> = lin
            .bound
            .iter()
            .map(|b| match b {
                Bound::Arg(ty) => Some(ty.clone()),
                Bound::Default(_) => None,
            })
            .collect();
        if lin.starargs.is_some() {
            slots.push(Some(JitType::Tuple(lin.extra.clone())));
        }
        Self {
            func: func.to_string(),
            slots,
        }
    }
}

/// State of one signature
#[derive(Debug, Clone)]
pub enum CacheEntry {
    InProgress(TypedFnId),
    Complete(Rc<TypedFn>),
    Failed(JitError),
}

/// Return types seen while a specialization is being built
#[derive(Debug, Default)]
struct Pending {
    return_type: Option<JitType>,
    observed: Vec<JitType>,
}

/// Monomorphization cache and the arena of published specializations
#[derive(Debug, Default)]
pub struct SpecializationCache {
    entries: HashMap<SpecKey, CacheEntry>,
    arena: Vec<Option<Rc<TypedFn>>>,
    pending: HashMap<TypedFnId, Pending>,
}

impl SpecializationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self, key: &SpecKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// A published specialization
    pub fn get(&self, id: TypedFnId) -> JitResult<Rc<TypedFn>> {
        self.arena
            .get(id.0)
            .and_then(Option::clone)
            .ok_or_else(|| JitError::Eval(format!("specialization {id} is not available")))
    }

    /// Whether `id` may store into arrays; in-progress entries count as
    /// writing.
    pub fn writes_memory(&self, id: TypedFnId) -> bool {
        match self.arena.get(id.0) {
            Some(Some(f)) => f.writes_memory,
            _ => true,
        }
    }

    /// Number of completed specializations
    pub fn len(&self) -> usize {
        self.arena.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Completed specializations in id order
    pub fn iter(&self) -> impl Iterator<Item = &Rc<TypedFn>> {
        self.arena.iter().flatten()
    }

    fn reserve(&mut self, key: SpecKey) -> TypedFnId {
        let id = TypedFnId(self.arena.len());
        self.arena.push(None);
        self.pending.insert(id, Pending::default());
        self.entries.insert(key, CacheEntry::InProgress(id));
        id
    }

    fn finish(&mut self, key: SpecKey, function: Rc<TypedFn>) {
        let id = function.id;
        self.pending.remove(&id);
        self.arena[id.0] = Some(Rc::clone(&function));
        self.entries.insert(key, CacheEntry::Complete(function));
    }

    fn fail(&mut self, key: SpecKey, id: TypedFnId, err: JitError) {
        self.pending.remove(&id);
        self.entries.insert(key, CacheEntry::Failed(err));
    }

    /// Record a return type typed inside the in-progress function `id`
    fn note_return(&mut self, id: TypedFnId, ty: &JitType) -> JitResult<()> {
        if let Some(pending) = self.pending.get_mut(&id) {
            pending.return_type = Some(match &pending.return_type {
                Some(prev) => prev.combine(ty)?,
                None => ty.clone(),
            });
        }
        Ok(())
    }
}

/// What a call site needs to know about its target
#[derive(Debug, Clone)]
pub(crate) struct Resolved {
    pub id: TypedFnId,
    pub return_type: JitType,
    pub writes_memory: bool,
}

/// Borrowed view of the session state that specialization mutates.
pub struct Specializer<'a> {
    pub registry: &'a mut Registry,
    pub adverbs: &'a mut AdverbCache,
    pub cache: &'a mut SpecializationCache,
    pub config: &'a JitConfig,
    pub stats: &'a mut SessionStats,
}

impl std::fmt::Debug for Specializer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Specializer")
            .field("functions", &self.registry.len())
            .field("specializations", &self.cache.len())
            .finish()
    }
}

impl Specializer<'_> {
    /// Specialize `callable` for a call with arguments of the given types.
    pub fn specialize(
        &mut self,
        callable: Callable<JitType>,
        actuals: ActualArgs<JitType>,
    ) -> JitResult<Rc<TypedFn>> {
        let (untyped, lin) = linearize(self.registry, callable, actuals)?;
        let resolved = self.resolve(&untyped, lin, None)?;
        self.cache.get(resolved.id)
    }

    /// Look up or build the specialization for a linearized signature.
    ///
    /// `caller` is the in-progress function making the call, if any.
    pub(crate) fn resolve(
        &mut self,
        untyped: &Rc<UntypedFn>,
        lin: Linearized<JitType>,
        caller: Option<TypedFnId>,
    ) -> JitResult<Resolved> {
        let key = SpecKey::new(&untyped.name, &lin);
        match self.cache.entry(&key) {
            Some(CacheEntry::Complete(f)) => {
                debug!("specialize: cache hit for `{}`", f.name);
                self.stats.cache_hits += 1;
                return Ok(Resolved {
                    id: f.id,
                    return_type: f.return_type.clone(),
                    writes_memory: f.writes_memory,
                });
            }
            Some(CacheEntry::Failed(err)) => return Err(err.clone()),
            Some(CacheEntry::InProgress(id)) => {
                let id = *id;
                let pending = self.cache.pending.entry(id).or_default();
                let Some(ty) = pending.return_type.clone() else {
                    return Err(JitError::type_error(
                        format!(
                            "recursive call to `{}` before any of its returns has a type",
                            untyped.name
                        ),
                        &untyped.name,
                    ));
                };
                pending.observed.push(ty.clone());
                debug!("specialize: recursive call to in-progress {id} ({ty})");
                return Ok(Resolved {
                    id,
                    return_type: ty,
                    writes_memory: caller != Some(id),
                });
            }
            None => {}
        }

        let id = self.cache.reserve(key.clone());
        debug!(
            "specialize: building `{}` {id} for ({})",
            untyped.name,
            lin.names.join(", ")
        );
        match self.build(id, untyped, lin) {
            Ok(function) => {
                let function = Rc::new(function);
                self.stats.specializations_built += 1;
                let resolved = Resolved {
                    id,
                    return_type: function.return_type.clone(),
                    writes_memory: function.writes_memory,
                };
                self.cache.finish(key, function);
                Ok(resolved)
            }
            Err(err) => {
                debug!("specialize: `{}` {id} failed: {err}", untyped.name);
                self.stats.failed_specializations += 1;
                self.cache.fail(key, id, err.clone());
                Err(err)
            }
        }
    }

    fn build(
        &mut self,
        id: TypedFnId,
        untyped: &UntypedFn,
        lin: Linearized<JitType>,
    ) -> JitResult<TypedFn> {
        let mut state = FunctionState::new(id, &untyped.name);
        let mut body = Vec::new();
        let mut params = Vec::new();
        let mut input_types = Vec::new();

        for (name, bound) in lin.names.iter().zip(&lin.bound) {
            match bound {
                Bound::Arg(ty) => {
                    params.push(name.clone());
                    input_types.push(ty.clone());
                    state.bind(name, ty.clone());
                }
                Bound::Default(value) => {
                    state.bind(name, value.ty());
                    body.push(Stmt::assign(name.clone(), TypedExpr::constant(*value)));
                }
            }
        }
        if let Some(star) = &lin.starargs {
            let ty = JitType::Tuple(lin.extra.clone());
            params.push(star.clone());
            input_types.push(ty.clone());
            state.bind(star, ty);
        }

        let mut source = untyped.body.clone();
        if !block_returns(&source) {
            source.push(Stmt::Return(Expr::Const(Const::None)));
        }
        body.extend(self.type_block(&mut state, &source)?);

        let return_type = state.return_type()?;
        let observed = self
            .cache
            .pending
            .get(&id)
            .map(|p| p.observed.clone())
            .unwrap_or_default();
        if let Some(seen) = observed.iter().find(|t| **t != return_type) {
            return Err(JitError::type_error(
                format!("recursive call assumed return type {seen} but the function returns {return_type}"),
                &untyped.name,
            ));
        }
        infer::coerce_returns(&mut body, &return_type)?;

        let mut function = TypedFn {
            id,
            name: format!("{}_{}", untyped.name, id.0),
            untyped: untyped.name.clone(),
            params,
            input_types,
            type_env: state.type_env(),
            body,
            return_type,
            writes_memory: state.writes_memory,
        };

        if self.config.optimize {
            let changes = OptimizationPipeline::from_config(self.config).run(&mut function)?;
            self.stats.optimizer_changes += changes;
        }
        if self.config.verify_ssa {
            verify_typed(&function)?;
        }
        Ok(function)
    }
}
