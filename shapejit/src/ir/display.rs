//! Textual printer for the IR.
//!
//! Expressions print on one line in a Python-like surface syntax; functions
//! print as indented blocks with merge lists written as `phi` lines.

use super::{
    ActualArgs, Const, Expr, Lhs, Phi, Stmt, TypedExpr, TypedExprKind, TypedFn, UntypedFn,
};
use std::fmt::{self, Display, Write};

impl Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Const::None => write!(f, "None"),
            Const::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Const::Int(i) => write!(f, "{i}"),
            Const::Float(x) => write!(f, "{x:?}"),
        }
    }
}

fn comma_list<T: Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

fn write_slice<T: Display>(
    f: &mut fmt::Formatter<'_>,
    start: &Option<Box<T>>,
    stop: &Option<Box<T>>,
    step: &Option<Box<T>>,
) -> fmt::Result {
    if let Some(s) = start {
        write!(f, "{s}")?;
    }
    write!(f, ":")?;
    if let Some(s) = stop {
        write!(f, "{s}")?;
    }
    if let Some(s) = step {
        write!(f, ":{s}")?;
    }
    Ok(())
}

impl<T: Display> Display for ActualArgs<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.positional.iter().map(|a| a.to_string()).collect();
        parts.extend(self.keywords.iter().map(|(name, a)| format!("{name}={a}")));
        if let Some(star) = &self.starargs {
            parts.push(format!("*{star}"));
        }
        f.write_str(&parts.join(", "))
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(c) => write!(f, "{c}"),
            Expr::Var(name) | Expr::FnRef(name) => write!(f, "{name}"),
            Expr::Tuple(elts) => {
                write!(f, "(")?;
                comma_list(f, elts)?;
                if elts.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Expr::TupleProj { tuple, index } => write!(f, "{tuple}.{index}"),
            Expr::Array(elts) => {
                write!(f, "[")?;
                comma_list(f, elts)?;
                write!(f, "]")
            }
            Expr::Range { start, stop, step } => write!(f, "range({start}, {stop}, {step})"),
            Expr::Slice { start, stop, step } => write_slice(f, start, stop, step),
            Expr::Fill { shape, value } => write!(f, "fill({shape}, {value})"),
            Expr::Index { value, index } => write!(f, "{value}[{index}]"),
            Expr::BinOp { op, left, right } => write!(f, "({left} {op} {right})"),
            Expr::UnaryOp { op, operand } => write!(f, "{op}{operand}"),
            Expr::Len(e) => write!(f, "len({e})"),
            Expr::Shape(e) => write!(f, "shape({e})"),
            Expr::Closure { func, args } => {
                write!(f, "closure({func}, [")?;
                comma_list(f, args)?;
                write!(f, "])")
            }
            Expr::Call { func, args } => write!(f, "{func}({args})"),
            Expr::Map { func, args, axis } => {
                write!(f, "map({func}, ")?;
                comma_list(f, args)?;
                match axis {
                    Some(axis) => write!(f, ", axis={axis})"),
                    None => write!(f, ")"),
                }
            }
        }
    }
}

impl Display for TypedExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypedExprKind::Const(c) => write!(f, "{c}"),
            TypedExprKind::Var(name) => write!(f, "{name}"),
            TypedExprKind::Tuple(elts) => {
                write!(f, "(")?;
                comma_list(f, elts)?;
                if elts.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            TypedExprKind::TupleProj { tuple, index } => write!(f, "{tuple}.{index}"),
            TypedExprKind::Array(elts) => {
                write!(f, "[")?;
                comma_list(f, elts)?;
                write!(f, "]")
            }
            TypedExprKind::Range { start, stop, step } => {
                write!(f, "range({start}, {stop}, {step})")
            }
            TypedExprKind::Slice { start, stop, step } => write_slice(f, start, stop, step),
            TypedExprKind::Fill { shape, value } => write!(f, "fill({shape}, {value})"),
            TypedExprKind::Index { value, index } => write!(f, "{value}[{index}]"),
            TypedExprKind::BinOp { op, left, right } => write!(f, "({left} {op} {right})"),
            TypedExprKind::UnaryOp { op, operand } => write!(f, "{op}{operand}"),
            TypedExprKind::Cast { value, to } => write!(f, "{to}({value})"),
            TypedExprKind::Len(e) => write!(f, "len({e})"),
            TypedExprKind::Shape(e) => write!(f, "shape({e})"),
            TypedExprKind::Closure { func, id, args } => {
                write!(f, "closure<{id}>({func}, [")?;
                comma_list(f, args)?;
                write!(f, "])")
            }
            TypedExprKind::ClosureElt { closure, index } => write!(f, "{closure}[[{index}]]"),
            TypedExprKind::Call { target, args } => {
                write!(f, "call {target}(")?;
                comma_list(f, args)?;
                write!(f, ")")
            }
            TypedExprKind::Map {
                target,
                fixed,
                args,
                axis,
            } => {
                write!(f, "map {target}([")?;
                comma_list(f, fixed)?;
                write!(f, "], ")?;
                comma_list(f, args)?;
                write!(f, ", axis={axis})")
            }
        }
    }
}

impl<E: Display> Display for Lhs<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lhs::Var(name) => write!(f, "{name}"),
            Lhs::Tuple(elts) => {
                write!(f, "(")?;
                comma_list(f, elts)?;
                write!(f, ")")
            }
            Lhs::Index { value, index } => write!(f, "{value}[{index}]"),
        }
    }
}

fn write_phis<E: Display>(
    out: &mut String,
    label: &str,
    phis: &[Phi<E>],
    indent: usize,
) -> fmt::Result {
    for phi in phis {
        writeln!(
            out,
            "{:indent$}{} = phi[{label}]({}, {})",
            "",
            phi.result,
            phi.left,
            phi.right,
            indent = indent
        )?;
    }
    Ok(())
}

/// Render a block of statements at the given indentation
pub fn write_block<E: Display>(out: &mut String, block: &[Stmt<E>], indent: usize) -> fmt::Result {
    for stmt in block {
        match stmt {
            Stmt::Assign { lhs, rhs } => {
                writeln!(out, "{:indent$}{lhs} = {rhs}", "", indent = indent)?;
            }
            Stmt::If {
                cond,
                true_block,
                false_block,
                merge,
            } => {
                writeln!(out, "{:indent$}if {cond}:", "", indent = indent)?;
                write_block(out, true_block, indent + 2)?;
                writeln!(out, "{:indent$}else:", "", indent = indent)?;
                write_block(out, false_block, indent + 2)?;
                write_phis(out, "if", merge, indent)?;
            }
            Stmt::While {
                cond,
                body,
                merge_before,
                merge_after,
            } => {
                write_phis(out, "loop", merge_before, indent)?;
                writeln!(out, "{:indent$}while {cond}:", "", indent = indent)?;
                write_block(out, body, indent + 2)?;
                write_phis(out, "exit", merge_after, indent)?;
            }
            Stmt::Return(e) => writeln!(out, "{:indent$}return {e}", "", indent = indent)?,
        }
    }
    Ok(())
}

impl Display for UntypedFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "def {}(", self.name)?;
        let names = self.args.all_names();
        comma_list(f, &names)?;
        writeln!(f, "):")?;
        let mut body = String::new();
        write_block(&mut body, &self.body, 2)?;
        f.write_str(&body)
    }
}

impl Display for TypedFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "def {}(", self.name)?;
        for (i, (name, ty)) in self.params.iter().zip(&self.input_types).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {ty}")?;
        }
        writeln!(f, ") -> {}:", self.return_type)?;
        let mut body = String::new();
        write_block(&mut body, &self.body, 2)?;
        f.write_str(&body)
    }
}
