//! Argument linearization.
//!
//! A call site supplies positional, keyword and variadic arguments, possibly
//! through a closure carrying fixed leading arguments. Linearization turns
//! that into one argument per formal slot, in formal order, with defaults
//! applied. The same algorithm ([`FormalArgs::bind`]) runs over runtime
//! values (interpretation), over types (specialization) and over typed
//! expressions (lowering calls inside typed bodies), so the three can never
//! disagree about ordering or defaulting.

use crate::error::{JitError, JitResult};
use crate::ir::{ActualArgs, Const, FormalArgs, TypedExpr, TypedExprKind, UntypedFn};
use crate::registry::Registry;
use crate::types::JitType;
use crate::value::Value;
use std::rc::Rc;

/// Something that can be called: a bare function or a closure.
#[derive(Debug, Clone, PartialEq)]
pub enum Callable<T> {
    Function(String),
    Closure { func: String, fixed: Vec<T> },
}

impl<T> Callable<T> {
    pub fn function(name: &str) -> Self {
        Callable::Function(name.to_string())
    }

    pub fn func_name(&self) -> &str {
        match self {
            Callable::Function(name) | Callable::Closure { func: name, .. } => name,
        }
    }
}

/// Split a callable into its function identity and fixed arguments.
pub fn unpack_closure<T>(callable: Callable<T>) -> (String, Vec<T>) {
    match callable {
        Callable::Function(name) => (name, Vec::new()),
        Callable::Closure { func, fixed } => (func, fixed),
    }
}

impl Callable<JitType> {
    /// Callable described by a closure type
    pub fn from_type(ty: &JitType) -> JitResult<Self> {
        match ty {
            JitType::Closure { func, fixed } => Ok(Callable::Closure {
                func: func.clone(),
                fixed: fixed.clone(),
            }),
            other => Err(JitError::type_error(
                format!("value of type {other} is not callable"),
                other,
            )),
        }
    }
}

impl Callable<Value> {
    /// Callable held by a closure value
    pub fn from_value(value: &Value) -> JitResult<Self> {
        match value {
            Value::Closure(c) => Ok(Callable::Closure {
                func: c.func.clone(),
                fixed: c.fixed.clone(),
            }),
            other => Err(JitError::Eval(format!("{other} is not callable"))),
        }
    }
}

impl Callable<TypedExpr> {
    /// Callable for a closure-typed expression; its fixed arguments become
    /// projections out of the closure value.
    pub fn from_typed(expr: TypedExpr) -> JitResult<Self> {
        let (func, count) = match &expr.ty {
            JitType::Closure { func, fixed } => (func.clone(), fixed.len()),
            other => {
                return Err(JitError::type_error(
                    format!("value of type {other} is not callable"),
                    &expr,
                ))
            }
        };
        let fixed = (0..count)
            .map(|i| TypedExpr::closure_elt(expr.clone(), i))
            .collect::<JitResult<Vec<_>>>()?;
        Ok(Callable::Closure { func, fixed })
    }
}

// ============================================================================
// Argument representations
// ============================================================================

/// Operations linearization needs from an argument representation.
pub trait ArgRepr: Clone {
    /// Representation of a constant default
    fn from_default(value: &Const) -> Self;
    /// Elements of a variadic tuple argument, `None` if it is not a tuple
    fn spread(self) -> Option<Vec<Self>>;
    /// Tuple of extra positional arguments for a variadic formal
    fn pack(items: Vec<Self>) -> Self;
}

impl ArgRepr for Value {
    fn from_default(value: &Const) -> Self {
        Value::from_const(value)
    }

    fn spread(self) -> Option<Vec<Self>> {
        match self {
            Value::Tuple(elts) => Some(elts),
            _ => None,
        }
    }

    fn pack(items: Vec<Self>) -> Self {
        Value::Tuple(items)
    }
}

impl ArgRepr for JitType {
    fn from_default(value: &Const) -> Self {
        value.ty()
    }

    fn spread(self) -> Option<Vec<Self>> {
        match self {
            JitType::Tuple(elts) => Some(elts),
            _ => None,
        }
    }

    fn pack(items: Vec<Self>) -> Self {
        JitType::Tuple(items)
    }
}

impl ArgRepr for TypedExpr {
    fn from_default(value: &Const) -> Self {
        TypedExpr::constant(*value)
    }

    fn spread(self) -> Option<Vec<Self>> {
        let JitType::Tuple(elts) = &self.ty else {
            return None;
        };
        Some(
            elts.iter()
                .enumerate()
                .map(|(index, ty)| {
                    TypedExpr::new(
                        TypedExprKind::TupleProj {
                            tuple: Box::new(self.clone()),
                            index,
                        },
                        ty.clone(),
                    )
                })
                .collect(),
        )
    }

    fn pack(items: Vec<Self>) -> Self {
        TypedExpr::tuple(items)
    }
}

// ============================================================================
// Binding
// ============================================================================

/// What fills one formal slot
#[derive(Debug, Clone, PartialEq)]
pub enum Bound<T> {
    /// Supplied by the call
    Arg(T),
    /// Omitted; the formal's default applies
    Default(Const),
}

/// Result of binding a call against formal parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Linearized<T> {
    /// Slot names, nonlocals first
    pub names: Vec<String>,
    /// One entry per slot
    pub bound: Vec<Bound<T>>,
    /// Positional arguments beyond the slots
    pub extra: Vec<T>,
    /// Name of the variadic formal, if any
    pub starargs: Option<String>,
}

impl<T: ArgRepr> Linearized<T> {
    /// Flat argument sequence: defaults materialized, extras appended
    pub fn into_flat(self) -> Vec<T> {
        let mut out: Vec<T> = self
            .bound
            .into_iter()
            .map(|b| match b {
                Bound::Arg(v) => v,
                Bound::Default(c) => T::from_default(&c),
            })
            .collect();
        out.extend(self.extra);
        out
    }

    /// Arguments a specialization receives: defaulted slots dropped, extras
    /// packed into one tuple for the variadic formal
    pub fn supplied(self) -> Vec<T> {
        let mut out: Vec<T> = self
            .bound
            .into_iter()
            .filter_map(|b| match b {
                Bound::Arg(v) => Some(v),
                Bound::Default(_) => None,
            })
            .collect();
        if self.starargs.is_some() {
            out.push(T::pack(self.extra));
        }
        out
    }

    /// Every name the callee binds on entry with its value
    pub fn bindings(self) -> Vec<(String, T)> {
        let mut out: Vec<(String, T)> = self
            .names
            .into_iter()
            .zip(self.bound)
            .map(|(name, b)| match b {
                Bound::Arg(v) => (name, v),
                Bound::Default(c) => (name, T::from_default(&c)),
            })
            .collect();
        if let Some(star) = self.starargs {
            out.push((star, T::pack(self.extra)));
        }
        out
    }
}

impl<T> Linearized<T> {
    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> Linearized<U> {
        Linearized {
            names: self.names.clone(),
            bound: self
                .bound
                .iter()
                .map(|b| match b {
                    Bound::Arg(v) => Bound::Arg(f(v)),
                    Bound::Default(c) => Bound::Default(*c),
                })
                .collect(),
            extra: self.extra.iter().map(&mut f).collect(),
            starargs: self.starargs.clone(),
        }
    }
}

impl FormalArgs {
    /// Bind call arguments to the formal slots of `function`.
    pub fn bind<T: ArgRepr>(
        &self,
        function: &str,
        actuals: ActualArgs<T>,
    ) -> JitResult<Linearized<T>> {
        let names: Vec<String> = self.slot_names().cloned().collect();
        let mut slots: Vec<Option<T>> = (0..names.len()).map(|_| None).collect();

        let mut positional = actuals.positional;
        if let Some(star) = actuals.starargs {
            let items = star
                .spread()
                .ok_or_else(|| JitError::arity(function, "variadic argument is not a tuple"))?;
            positional.extend(items);
        }

        let given = positional.len();
        let mut extra = Vec::new();
        for (i, arg) in positional.into_iter().enumerate() {
            if i < slots.len() {
                slots[i] = Some(arg);
            } else if self.starargs.is_some() {
                extra.push(arg);
            } else {
                return Err(JitError::arity(
                    function,
                    format!(
                        "takes {} positional arguments but {given} were given",
                        names.len()
                    ),
                ));
            }
        }

        for (keyword, arg) in actuals.keywords {
            let pos = names.iter().position(|n| *n == keyword).ok_or_else(|| {
                JitError::UnexpectedKeyword {
                    function: function.to_string(),
                    keyword: keyword.clone(),
                }
            })?;
            if slots[pos].is_some() {
                return Err(JitError::arity(
                    function,
                    format!("argument `{keyword}` bound twice"),
                ));
            }
            slots[pos] = Some(arg);
        }

        let bound = names
            .iter()
            .zip(slots)
            .map(|(name, slot)| match slot {
                Some(v) => Ok(Bound::Arg(v)),
                None => self
                    .default_for(name)
                    .map(|c| Bound::Default(*c))
                    .ok_or_else(|| JitError::arity(function, format!("missing argument `{name}`"))),
            })
            .collect::<JitResult<Vec<_>>>()?;

        Ok(Linearized {
            names,
            bound,
            extra,
            starargs: self.starargs.clone(),
        })
    }
}

/// Resolve `callable` and bind `actuals` (after its fixed arguments) to the
/// target's formals.
pub fn linearize<T: ArgRepr>(
    registry: &Registry,
    callable: Callable<T>,
    actuals: ActualArgs<T>,
) -> JitResult<(Rc<UntypedFn>, Linearized<T>)> {
    let (func, fixed) = unpack_closure(callable);
    let target = registry.lookup(&func)?;
    let mut positional = fixed;
    positional.extend(actuals.positional);
    let actuals = ActualArgs {
        positional,
        keywords: actuals.keywords,
        starargs: actuals.starargs,
    };
    let linearized = target.args.bind(&target.name, actuals)?;
    Ok((target, linearized))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Expr, Stmt};
    use crate::types::ScalarKind;
    use pretty_assertions::assert_eq;

    fn rest_formals() -> FormalArgs {
        FormalArgs::new(&["a", "b"])
            .with_default("b", Const::Int(2))
            .with_starargs("rest")
    }

    fn registry_with(name: &str, formals: FormalArgs) -> Registry {
        let mut registry = Registry::new();
        registry
            .register(UntypedFn::new(
                name,
                formals,
                vec![Stmt::Return(Expr::none())],
            ))
            .unwrap();
        registry
    }

    #[test]
    fn test_unknown_keyword() {
        let actuals = ActualArgs::positional(vec![Value::Int(1)]).with_keyword("c", Value::Int(5));
        let err = rest_formals().bind("f", actuals).unwrap_err();
        assert_eq!(
            err,
            JitError::UnexpectedKeyword {
                function: "f".to_string(),
                keyword: "c".to_string(),
            }
        );
    }

    #[test]
    fn test_default_applied_in_value_and_type_mode() {
        let values = rest_formals()
            .bind("f", ActualArgs::positional(vec![Value::Int(1)]))
            .unwrap();
        assert_eq!(values.into_flat(), vec![Value::Int(1), Value::Int(2)]);

        let types = rest_formals()
            .bind("f", ActualArgs::positional(vec![JitType::FLOAT64]))
            .unwrap();
        assert_eq!(types.clone().into_flat(), vec![JitType::FLOAT64, JitType::INT64]);
        assert_eq!(
            types.bound,
            vec![Bound::Arg(JitType::FLOAT64), Bound::Default(Const::Int(2))]
        );
    }

    #[test]
    fn test_supplied_drops_defaults_and_packs_extras() {
        let lin = rest_formals()
            .bind(
                "f",
                ActualArgs::positional(vec![Value::Int(1)]).with_starargs(Value::Tuple(vec![])),
            )
            .unwrap();
        assert_eq!(lin.supplied(), vec![Value::Int(1), Value::Tuple(vec![])]);

        let lin = rest_formals()
            .bind(
                "f",
                ActualArgs::positional(vec![Value::Int(1), Value::Int(3), Value::Int(4)]),
            )
            .unwrap();
        assert_eq!(lin.extra, vec![Value::Int(4)]);
        assert_eq!(
            lin.bindings(),
            vec![
                ("a".to_string(), Value::Int(1)),
                ("b".to_string(), Value::Int(3)),
                ("rest".to_string(), Value::Tuple(vec![Value::Int(4)])),
            ]
        );
    }

    #[test]
    fn test_keyword_binding() {
        let lin = rest_formals()
            .bind(
                "f",
                ActualArgs::default()
                    .with_keyword("b", JitType::BOOL)
                    .with_keyword("a", JitType::INT64),
            )
            .unwrap();
        assert_eq!(lin.into_flat(), vec![JitType::INT64, JitType::BOOL]);
    }

    #[test]
    fn test_arity_errors() {
        let formals = FormalArgs::new(&["a"]);
        let too_many = formals.bind("g", ActualArgs::positional(vec![Value::Int(1), Value::Int(2)]));
        assert!(matches!(too_many, Err(JitError::ArityMismatch { .. })));

        let missing = formals.bind::<Value>("g", ActualArgs::default());
        assert!(matches!(missing, Err(JitError::ArityMismatch { .. })));

        let twice = formals.bind(
            "g",
            ActualArgs::positional(vec![Value::Int(1)]).with_keyword("a", Value::Int(2)),
        );
        assert!(matches!(twice, Err(JitError::ArityMismatch { .. })));

        let bad_star = formals.bind("g", ActualArgs::default().with_starargs(Value::Int(1)));
        assert!(matches!(bad_star, Err(JitError::ArityMismatch { .. })));
    }

    #[test]
    fn test_starargs_spread() {
        let formals = FormalArgs::new(&["a", "b"]);
        let lin = formals
            .bind(
                "g",
                ActualArgs::positional(vec![JitType::INT64])
                    .with_starargs(JitType::Tuple(vec![JitType::FLOAT64])),
            )
            .unwrap();
        assert_eq!(lin.into_flat(), vec![JitType::INT64, JitType::FLOAT64]);
    }

    #[test]
    fn test_linearize_prepends_closure_fixed() {
        let registry = registry_with("add", FormalArgs::new(&["x", "y"]));
        let callable = Callable::Closure {
            func: "add".to_string(),
            fixed: vec![Value::Int(10)],
        };
        let (target, lin) = linearize(
            &registry,
            callable,
            ActualArgs::positional(vec![Value::Int(5)]),
        )
        .unwrap();
        assert_eq!(target.name, "add");
        assert_eq!(lin.into_flat(), vec![Value::Int(10), Value::Int(5)]);
    }

    #[test]
    fn test_unpack_forms() {
        let closure_ty = JitType::Closure {
            func: "f".to_string(),
            fixed: vec![JitType::INT64],
        };
        let (name, fixed) = unpack_closure(Callable::from_type(&closure_ty).unwrap());
        assert_eq!((name.as_str(), fixed), ("f", vec![JitType::INT64]));

        let (name, fixed) = unpack_closure(Callable::<Value>::function("g"));
        assert_eq!((name.as_str(), fixed.len()), ("g", 0));

        let typed = TypedExpr::var("k", closure_ty);
        let (name, fixed) = unpack_closure(Callable::from_typed(typed).unwrap());
        assert_eq!(name, "f");
        assert_eq!(fixed.len(), 1);
        assert_eq!(fixed[0].ty, JitType::INT64);
        assert!(matches!(fixed[0].kind, TypedExprKind::ClosureElt { index: 0, .. }));

        assert!(Callable::from_type(&JitType::array(ScalarKind::Int64, 1)).is_err());
    }
}
