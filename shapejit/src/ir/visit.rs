//! Traversals over expressions and statements.

use super::{Expr, Lhs, Phi, Stmt, TypedExpr, TypedExprKind};

/// Expressions that can report the variables they read.
pub trait ReadsVars {
    /// Call `f` once per variable occurrence, in evaluation order
    fn visit_reads(&self, f: &mut dyn FnMut(&str));
}

impl ReadsVars for Expr {
    fn visit_reads(&self, f: &mut dyn FnMut(&str)) {
        match self {
            Expr::Const(_) | Expr::FnRef(_) => {}
            Expr::Var(name) => f(name),
            Expr::Tuple(elts) | Expr::Array(elts) | Expr::Closure { args: elts, .. } => {
                elts.iter().for_each(|e| e.visit_reads(f))
            }
            Expr::TupleProj { tuple, .. } => tuple.visit_reads(f),
            Expr::Range { start, stop, step } => {
                start.visit_reads(f);
                stop.visit_reads(f);
                step.visit_reads(f);
            }
            Expr::Slice { start, stop, step } => {
                for part in [start, stop, step].into_iter().flatten() {
                    part.visit_reads(f);
                }
            }
            Expr::Fill { shape, value } => {
                shape.visit_reads(f);
                value.visit_reads(f);
            }
            Expr::Index { value, index } => {
                value.visit_reads(f);
                index.visit_reads(f);
            }
            Expr::BinOp { left, right, .. } => {
                left.visit_reads(f);
                right.visit_reads(f);
            }
            Expr::UnaryOp { operand, .. } => operand.visit_reads(f),
            Expr::Len(e) | Expr::Shape(e) => e.visit_reads(f),
            Expr::Call { func, args } => {
                func.visit_reads(f);
                args.positional.iter().for_each(|e| e.visit_reads(f));
                args.keywords.iter().for_each(|(_, e)| e.visit_reads(f));
                if let Some(star) = &args.starargs {
                    star.visit_reads(f);
                }
            }
            Expr::Map { func, args, .. } => {
                func.visit_reads(f);
                args.iter().for_each(|e| e.visit_reads(f));
            }
        }
    }
}

impl ReadsVars for TypedExpr {
    fn visit_reads(&self, f: &mut dyn FnMut(&str)) {
        match &self.kind {
            TypedExprKind::Const(_) => {}
            TypedExprKind::Var(name) => f(name),
            TypedExprKind::Tuple(elts)
            | TypedExprKind::Array(elts)
            | TypedExprKind::Closure { args: elts, .. }
            | TypedExprKind::Call { args: elts, .. } => elts.iter().for_each(|e| e.visit_reads(f)),
            TypedExprKind::TupleProj { tuple: e, .. }
            | TypedExprKind::ClosureElt { closure: e, .. }
            | TypedExprKind::UnaryOp { operand: e, .. }
            | TypedExprKind::Cast { value: e, .. }
            | TypedExprKind::Len(e)
            | TypedExprKind::Shape(e) => e.visit_reads(f),
            TypedExprKind::Range { start, stop, step } => {
                start.visit_reads(f);
                stop.visit_reads(f);
                step.visit_reads(f);
            }
            TypedExprKind::Slice { start, stop, step } => {
                for part in [start, stop, step].into_iter().flatten() {
                    part.visit_reads(f);
                }
            }
            TypedExprKind::Fill { shape, value } => {
                shape.visit_reads(f);
                value.visit_reads(f);
            }
            TypedExprKind::Index { value, index } => {
                value.visit_reads(f);
                index.visit_reads(f);
            }
            TypedExprKind::BinOp { left, right, .. } => {
                left.visit_reads(f);
                right.visit_reads(f);
            }
            TypedExprKind::Map { fixed, args, .. } => {
                fixed.iter().for_each(|e| e.visit_reads(f));
                args.iter().for_each(|e| e.visit_reads(f));
            }
        }
    }
}

impl<E: ReadsVars> ReadsVars for Phi<E> {
    fn visit_reads(&self, f: &mut dyn FnMut(&str)) {
        self.left.visit_reads(f);
        self.right.visit_reads(f);
    }
}

impl<E: ReadsVars> ReadsVars for Lhs<E> {
    /// Bound names are not reads; indexed-store targets are.
    fn visit_reads(&self, f: &mut dyn FnMut(&str)) {
        match self {
            Lhs::Var(_) => {}
            Lhs::Tuple(elts) => elts.iter().for_each(|e| e.visit_reads(f)),
            Lhs::Index { value, index } => {
                value.visit_reads(f);
                index.visit_reads(f);
            }
        }
    }
}

impl TypedExpr {
    /// Rewrite this expression bottom-up: children first, then `self`.
    pub fn rewrite(&mut self, f: &mut dyn FnMut(&mut TypedExpr)) {
        match &mut self.kind {
            TypedExprKind::Const(_) | TypedExprKind::Var(_) => {}
            TypedExprKind::Tuple(elts)
            | TypedExprKind::Array(elts)
            | TypedExprKind::Closure { args: elts, .. }
            | TypedExprKind::Call { args: elts, .. } => {
                elts.iter_mut().for_each(|e| e.rewrite(f))
            }
            TypedExprKind::TupleProj { tuple: e, .. }
            | TypedExprKind::ClosureElt { closure: e, .. }
            | TypedExprKind::UnaryOp { operand: e, .. }
            | TypedExprKind::Cast { value: e, .. }
            | TypedExprKind::Len(e)
            | TypedExprKind::Shape(e) => e.rewrite(f),
            TypedExprKind::Range { start, stop, step } => {
                start.rewrite(f);
                stop.rewrite(f);
                step.rewrite(f);
            }
            TypedExprKind::Slice { start, stop, step } => {
                for part in [start, stop, step].into_iter().flatten() {
                    part.rewrite(f);
                }
            }
            TypedExprKind::Fill { shape, value } => {
                shape.rewrite(f);
                value.rewrite(f);
            }
            TypedExprKind::Index { value, index } => {
                value.rewrite(f);
                index.rewrite(f);
            }
            TypedExprKind::BinOp { left, right, .. } => {
                left.rewrite(f);
                right.rewrite(f);
            }
            TypedExprKind::Map { fixed, args, .. } => {
                fixed.iter_mut().for_each(|e| e.rewrite(f));
                args.iter_mut().for_each(|e| e.rewrite(f));
            }
        }
        f(self);
    }

    /// True if any node satisfies `pred`
    pub fn any(&self, pred: &dyn Fn(&TypedExpr) -> bool) -> bool {
        if pred(self) {
            return true;
        }
        match &self.kind {
            TypedExprKind::Const(_) | TypedExprKind::Var(_) => false,
            TypedExprKind::Tuple(elts)
            | TypedExprKind::Array(elts)
            | TypedExprKind::Closure { args: elts, .. }
            | TypedExprKind::Call { args: elts, .. } => elts.iter().any(|e| e.any(pred)),
            TypedExprKind::TupleProj { tuple: e, .. }
            | TypedExprKind::ClosureElt { closure: e, .. }
            | TypedExprKind::UnaryOp { operand: e, .. }
            | TypedExprKind::Cast { value: e, .. }
            | TypedExprKind::Len(e)
            | TypedExprKind::Shape(e) => e.any(pred),
            TypedExprKind::Range { start, stop, step } => {
                start.any(pred) || stop.any(pred) || step.any(pred)
            }
            TypedExprKind::Slice { start, stop, step } => [start, stop, step]
                .into_iter()
                .flatten()
                .any(|e| e.any(pred)),
            TypedExprKind::Fill { shape, value } => shape.any(pred) || value.any(pred),
            TypedExprKind::Index { value, index } => value.any(pred) || index.any(pred),
            TypedExprKind::BinOp { left, right, .. } => left.any(pred) || right.any(pred),
            TypedExprKind::Map { fixed, args, .. } => {
                fixed.iter().any(|e| e.any(pred)) || args.iter().any(|e| e.any(pred))
            }
        }
    }
}

/// Apply `f` to every expression of every statement in `block`, nested
/// blocks and merge lists included.
pub fn for_each_expr_mut<E>(block: &mut [Stmt<E>], f: &mut dyn FnMut(&mut E)) {
    for stmt in block {
        match stmt {
            Stmt::Assign { lhs, rhs } => {
                lhs_exprs_mut(lhs, f);
                f(rhs);
            }
            Stmt::If {
                cond,
                true_block,
                false_block,
                merge,
            } => {
                f(cond);
                for_each_expr_mut(true_block, f);
                for_each_expr_mut(false_block, f);
                phis_mut(merge, f);
            }
            Stmt::While {
                cond,
                body,
                merge_before,
                merge_after,
            } => {
                phis_mut(merge_before, f);
                f(cond);
                for_each_expr_mut(body, f);
                phis_mut(merge_after, f);
            }
            Stmt::Return(e) => f(e),
        }
    }
}

fn lhs_exprs_mut<E>(lhs: &mut Lhs<E>, f: &mut dyn FnMut(&mut E)) {
    match lhs {
        Lhs::Var(_) => {}
        Lhs::Tuple(elts) => elts.iter_mut().for_each(|e| lhs_exprs_mut(e, f)),
        Lhs::Index { value, index } => {
            f(value);
            f(index);
        }
    }
}

fn phis_mut<E>(phis: &mut [Phi<E>], f: &mut dyn FnMut(&mut E)) {
    for phi in phis {
        f(&mut phi.left);
        f(&mut phi.right);
    }
}

/// Collect every variable read by `block` into `out`, in order.
pub fn block_reads<E: ReadsVars>(block: &[Stmt<E>], out: &mut Vec<String>) {
    for stmt in block {
        match stmt {
            Stmt::Assign { lhs, rhs } => {
                lhs.visit_reads(&mut |v| out.push(v.to_string()));
                rhs.visit_reads(&mut |v| out.push(v.to_string()));
            }
            Stmt::If {
                cond,
                true_block,
                false_block,
                merge,
            } => {
                cond.visit_reads(&mut |v| out.push(v.to_string()));
                block_reads(true_block, out);
                block_reads(false_block, out);
                merge
                    .iter()
                    .for_each(|phi| phi.visit_reads(&mut |v| out.push(v.to_string())));
            }
            Stmt::While {
                cond,
                body,
                merge_before,
                merge_after,
            } => {
                merge_before
                    .iter()
                    .for_each(|phi| phi.visit_reads(&mut |v| out.push(v.to_string())));
                cond.visit_reads(&mut |v| out.push(v.to_string()));
                block_reads(body, out);
                merge_after
                    .iter()
                    .for_each(|phi| phi.visit_reads(&mut |v| out.push(v.to_string())));
            }
            Stmt::Return(e) => e.visit_reads(&mut |v| out.push(v.to_string())),
        }
    }
}
