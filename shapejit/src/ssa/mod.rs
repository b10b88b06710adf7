//! SSA construction and merge verification.
//!
//! [`build`] converts a [`FunctionDef`] with a structured body (names may be
//! reassigned) into an [`UntypedFn`] in SSA form:
//!
//! - every assignment of a compound value defines a fresh version `name.N`
//! - assignments of constants and variables are forwarded, so later reads
//!   (and merge entries) see the atom itself
//! - `if` gets one merge entry per variable whose binding differs between the
//!   two branch exits; a branch that always returns contributes nothing
//! - `while` gets a header version for every outer variable the body
//!   assigns, with a pre-loop merge (entry value, back-edge value) and a
//!   post-loop merge (entry value, body-exit value); a body-exit value that
//!   forwards another header of the same loop is pinned to a fresh version at
//!   the end of the body
//!
//! A variable defined in only one branch, or first defined inside a loop
//! body, is not visible after the construct.
//!
//! [`verify_merges`] checks the result: no name is defined twice and no
//! block-local name is read outside its block except through a merge list.


use crate::error::{JitError, JitResult};
use crate::ir::{block_returns, Expr, FunctionDef, Lhs, Phi, ReadsVars, Stmt, TypedFn, UntypedFn};
use log::trace;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Current binding of each source name
type Env = HashMap<String, Expr>;

/// Convert a structured definition to SSA.
pub fn build(def: FunctionDef) -> JitResult<UntypedFn> {
    let mut builder = SsaBuilder {
        function: def.name.clone(),
        versions: HashMap::new(),
    };
    let mut env: Env = def
        .args
        .all_names()
        .into_iter()
        .map(|name| (name.clone(), Expr::Var(name)))
        .collect();
    let (body, _) = builder.block(def.body, &mut env)?;
    trace!("ssa: built `{}` ({} top-level statements)", def.name, body.len());
    Ok(UntypedFn {
        name: def.name,
        args: def.args,
        body,
    })
}

struct SsaBuilder {
    function: String,
    versions: HashMap<String, usize>,
}

impl SsaBuilder {
    fn fresh(&mut self, name: &str) -> String {
        let n = self.versions.entry(name.to_string()).or_insert(0);
        *n += 1;
        format!("{name}.{n}")
    }

    /// Convert one block. Returns the statements and whether every path
    /// through the block returns; statements after a return are dropped.
    fn block(&mut self, stmts: Vec<Stmt<Expr>>, env: &mut Env) -> JitResult<(Vec<Stmt<Expr>>, bool)> {
        let mut out = Vec::new();
        for stmt in stmts {
            match stmt {
                Stmt::Assign { lhs, rhs } => self.assign(lhs, rhs, env, &mut out)?,
                Stmt::Return(e) => {
                    out.push(Stmt::Return(self.rename(&e, env)?));
                    return Ok((out, true));
                }
                Stmt::If {
                    cond,
                    true_block,
                    false_block,
                    ..
                } => {
                    if self.conditional(cond, true_block, false_block, env, &mut out)? {
                        return Ok((out, true));
                    }
                }
                Stmt::While { cond, body, .. } => self.loop_(cond, body, env, &mut out)?,
            }
        }
        Ok((out, false))
    }

    fn assign(
        &mut self,
        lhs: Lhs<Expr>,
        rhs: Expr,
        env: &mut Env,
        out: &mut Vec<Stmt<Expr>>,
    ) -> JitResult<()> {
        let rhs = self.rename(&rhs, env)?;
        match lhs {
            Lhs::Var(name) => {
                if rhs.is_atom() {
                    env.insert(name, rhs);
                } else {
                    let version = self.fresh(&name);
                    out.push(Stmt::assign(version.clone(), rhs));
                    env.insert(name, Expr::Var(version));
                }
            }
            Lhs::Index { value, index } => {
                let lhs = Lhs::Index {
                    value: self.rename(&value, env)?,
                    index: self.rename(&index, env)?,
                };
                out.push(Stmt::Assign { lhs, rhs });
            }
            pattern @ Lhs::Tuple(_) => {
                let reads = env.clone();
                let lhs = self.bind_pattern(pattern, &reads, env)?;
                out.push(Stmt::Assign { lhs, rhs });
            }
        }
        Ok(())
    }

    fn bind_pattern(&mut self, lhs: Lhs<Expr>, reads: &Env, env: &mut Env) -> JitResult<Lhs<Expr>> {
        Ok(match lhs {
            Lhs::Var(name) => {
                let version = self.fresh(&name);
                env.insert(name, Expr::Var(version.clone()));
                Lhs::Var(version)
            }
            Lhs::Tuple(elts) => Lhs::Tuple(
                elts.into_iter()
                    .map(|e| self.bind_pattern(e, reads, env))
                    .collect::<JitResult<Vec<_>>>()?,
            ),
            Lhs::Index { value, index } => Lhs::Index {
                value: self.rename(&value, reads)?,
                index: self.rename(&index, reads)?,
            },
        })
    }

    /// Returns true when both branches return.
    fn conditional(
        &mut self,
        cond: Expr,
        true_block: Vec<Stmt<Expr>>,
        false_block: Vec<Stmt<Expr>>,
        env: &mut Env,
        out: &mut Vec<Stmt<Expr>>,
    ) -> JitResult<bool> {
        let cond = self.rename(&cond, env)?;
        let mut env_t = env.clone();
        let (true_block, t_returns) = self.block(true_block, &mut env_t)?;
        let mut env_f = env.clone();
        let (false_block, f_returns) = self.block(false_block, &mut env_f)?;

        let mut merge = Vec::new();
        match (t_returns, f_returns) {
            (true, true) => {}
            (false, false) => {
                let names: BTreeSet<&String> = env_t.keys().filter(|k| env_f.contains_key(*k)).collect();
                for name in names {
                    let (left, right) = (&env_t[name], &env_f[name]);
                    if left == right {
                        env.insert(name.clone(), left.clone());
                        continue;
                    }
                    let result = self.fresh(name);
                    merge.push(Phi::new(result.clone(), left.clone(), right.clone()));
                    env.insert(name.clone(), Expr::Var(result));
                }
            }
            (t, _) => {
                // only the surviving branch reaches the join
                let live = if t { &env_f } else { &env_t };
                let names: BTreeSet<&String> = live.keys().collect();
                for name in names {
                    let value = &live[name];
                    if env.get(name) == Some(value) {
                        continue;
                    }
                    if matches!(value, Expr::Const(_)) {
                        env.insert(name.clone(), value.clone());
                        continue;
                    }
                    let result = self.fresh(name);
                    merge.push(Phi::new(result.clone(), value.clone(), value.clone()));
                    env.insert(name.clone(), Expr::Var(result));
                }
            }
        }

        out.push(Stmt::If {
            cond,
            true_block,
            false_block,
            merge,
        });
        Ok(t_returns && f_returns)
    }

    fn loop_(
        &mut self,
        cond: Expr,
        body: Vec<Stmt<Expr>>,
        env: &mut Env,
        out: &mut Vec<Stmt<Expr>>,
    ) -> JitResult<()> {
        let mut assigned = BTreeSet::new();
        assigned_names(&body, &mut assigned);
        let carried: Vec<String> = assigned.into_iter().filter(|n| env.contains_key(n)).collect();

        let mut headers = Vec::with_capacity(carried.len());
        for name in &carried {
            let header = self.fresh(name);
            let init = env[name].clone();
            env.insert(name.clone(), Expr::Var(header.clone()));
            headers.push((name, header, init));
        }

        let cond = self.rename(&cond, env)?;
        let mut env_body = env.clone();
        let (mut body, body_returns) = self.block(body, &mut env_body)?;

        let header_names: HashSet<String> = headers.iter().map(|(_, h, _)| h.clone()).collect();
        let mut merge_before = Vec::with_capacity(headers.len());
        let mut merge_after = Vec::with_capacity(headers.len());
        for (name, header, init) in headers {
            let back = match &env_body[name] {
                _ if body_returns => Expr::Var(header.clone()),
                // the back-edge copy overwrites other headers before the
                // exit merge reads them
                Expr::Var(v) if *v != header && header_names.contains(v) => {
                    let pinned = self.fresh(name);
                    body.push(Stmt::assign(pinned.clone(), Expr::Var(v.clone())));
                    Expr::Var(pinned)
                }
                value => value.clone(),
            };
            let exit = self.fresh(name);
            merge_before.push(Phi::new(header, init.clone(), back.clone()));
            merge_after.push(Phi::new(exit.clone(), init, back));
            env.insert(name.clone(), Expr::Var(exit));
        }

        out.push(Stmt::While {
            cond,
            body,
            merge_before,
            merge_after,
        });
        Ok(())
    }

    fn rename(&self, expr: &Expr, env: &Env) -> JitResult<Expr> {
        let r = |e: &Expr| self.rename(e, env);
        let rb = |e: &Expr| self.rename(e, env).map(Box::new);
        let ropt = |e: &Option<Box<Expr>>| e.as_deref().map(|e| rb(e)).transpose();
        let rall = |es: &[Expr]| es.iter().map(|e| self.rename(e, env)).collect::<JitResult<Vec<_>>>();
        Ok(match expr {
            Expr::Var(name) => env
                .get(name)
                .cloned()
                .ok_or_else(|| JitError::UnboundVariable(format!("{name} (in `{}`)", self.function)))?,
            Expr::Const(_) | Expr::FnRef(_) => expr.clone(),
            Expr::Tuple(elts) => Expr::Tuple(rall(elts)?),
            Expr::TupleProj { tuple, index } => Expr::TupleProj {
                tuple: rb(tuple)?,
                index: *index,
            },
            Expr::Array(elts) => Expr::Array(rall(elts)?),
            Expr::Range { start, stop, step } => Expr::Range {
                start: rb(start)?,
                stop: rb(stop)?,
                step: rb(step)?,
            },
            Expr::Slice { start, stop, step } => Expr::Slice {
                start: ropt(start)?,
                stop: ropt(stop)?,
                step: ropt(step)?,
            },
            Expr::Fill { shape, value } => Expr::Fill {
                shape: rb(shape)?,
                value: rb(value)?,
            },
            Expr::Index { value, index } => Expr::Index {
                value: rb(value)?,
                index: rb(index)?,
            },
            Expr::BinOp { op, left, right } => Expr::BinOp {
                op: *op,
                left: rb(left)?,
                right: rb(right)?,
            },
            Expr::UnaryOp { op, operand } => Expr::UnaryOp {
                op: *op,
                operand: rb(operand)?,
            },
            Expr::Len(e) => Expr::Len(rb(e)?),
            Expr::Shape(e) => Expr::Shape(rb(e)?),
            Expr::Closure { func, args } => Expr::Closure {
                func: func.clone(),
                args: rall(args)?,
            },
            Expr::Call { func, args } => Expr::Call {
                func: rb(func)?,
                args: Box::new(args.try_map(r)?),
            },
            Expr::Map { func, args, axis } => Expr::Map {
                func: rb(func)?,
                args: rall(args)?,
                axis: *axis,
            },
        })
    }
}

/// Names bound by plain or tuple assignments anywhere in `block`
fn assigned_names(block: &[Stmt<Expr>], out: &mut BTreeSet<String>) {
    for stmt in block {
        match stmt {
            Stmt::Assign { lhs, .. } => {
                out.extend(lhs.bound_names().into_iter().map(str::to_string));
            }
            Stmt::If {
                true_block,
                false_block,
                ..
            } => {
                assigned_names(true_block, out);
                assigned_names(false_block, out);
            }
            Stmt::While { body, .. } => assigned_names(body, out),
            Stmt::Return(_) => {}
        }
    }
}

// ============================================================================
// Verification
// ============================================================================

/// Check the merge invariant of an untyped SSA function.
pub fn verify_merges(function: &UntypedFn) -> JitResult<()> {
    verify_block(&function.name, function.args.all_names(), &function.body)
}

/// Check the merge invariant of a typed function.
pub fn verify_typed(function: &TypedFn) -> JitResult<()> {
    verify_block(&function.name, function.params.clone(), &function.body)
}

fn verify_block<E: ReadsVars>(function: &str, params: Vec<String>, body: &[Stmt<E>]) -> JitResult<()> {
    let mut verifier = Verifier {
        function,
        defined: params.iter().cloned().collect(),
    };
    let mut scope: HashSet<String> = params.into_iter().collect();
    verifier.block(body, &mut scope)
}

struct Verifier<'a> {
    function: &'a str,
    defined: HashSet<String>,
}

impl Verifier<'_> {
    fn violation(&self, variable: &str) -> JitError {
        JitError::MergeInvariantViolation {
            function: self.function.to_string(),
            variable: variable.to_string(),
        }
    }

    fn reads<R: ReadsVars + ?Sized>(&self, node: &R, scope: &HashSet<String>) -> JitResult<()> {
        let mut missing: Option<String> = None;
        node.visit_reads(&mut |v| {
            if missing.is_none() && !scope.contains(v) {
                missing = Some(v.to_string());
            }
        });
        match missing {
            Some(v) => Err(self.violation(&v)),
            None => Ok(()),
        }
    }

    fn define(&mut self, name: &str, scope: &mut HashSet<String>) -> JitResult<()> {
        if !self.defined.insert(name.to_string()) {
            return Err(self.violation(name));
        }
        scope.insert(name.to_string());
        Ok(())
    }

    fn block<E: ReadsVars>(&mut self, block: &[Stmt<E>], scope: &mut HashSet<String>) -> JitResult<()> {
        for stmt in block {
            match stmt {
                Stmt::Assign { lhs, rhs } => {
                    self.reads(rhs, scope)?;
                    self.reads(lhs, scope)?;
                    for name in lhs.bound_names() {
                        self.define(name, scope)?;
                    }
                }
                Stmt::If {
                    cond,
                    true_block,
                    false_block,
                    merge,
                } => {
                    self.reads(cond, scope)?;
                    let mut scope_t = scope.clone();
                    self.block(true_block, &mut scope_t)?;
                    let mut scope_f = scope.clone();
                    self.block(false_block, &mut scope_f)?;
                    let (t_dead, f_dead) = (block_returns(true_block), block_returns(false_block));
                    for phi in merge {
                        if !t_dead {
                            self.reads(&phi.left, &scope_t)?;
                        }
                        if !f_dead {
                            self.reads(&phi.right, &scope_f)?;
                        }
                    }
                    for phi in merge {
                        self.define(&phi.result, scope)?;
                    }
                }
                Stmt::While {
                    cond,
                    body,
                    merge_before,
                    merge_after,
                } => {
                    for phi in merge_before {
                        self.reads(&phi.left, scope)?;
                    }
                    for phi in merge_before {
                        self.define(&phi.result, scope)?;
                    }
                    self.reads(cond, scope)?;
                    let mut scope_body = scope.clone();
                    self.block(body, &mut scope_body)?;
                    for phi in merge_before {
                        self.reads(&phi.right, &scope_body)?;
                    }
                    for phi in merge_after {
                        self.reads(&phi.left, scope)?;
                        self.reads(&phi.right, &scope_body)?;
                    }
                    for phi in merge_after {
                        self.define(&phi.result, scope)?;
                    }
                }
                Stmt::Return(e) => self.reads(e, scope)?,
            }
        }
        Ok(())
    }
}
