//! Runtime values for the reference evaluators.
//!
//! Arrays are shared and mutable (`Rc<RefCell<_>>`): an indexed store through
//! one binding is visible through every other binding of the same array.
//! Array data is stored row-major as scalar `Value`s of the array's element
//! kind.

use crate::error::{JitError, JitResult};
use crate::ir::{BinOp, Const, UnaryOp};
use crate::types::{JitType, ScalarKind};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub type ArrayRef = Rc<RefCell<ArrayValue>>;

/// Dense n-dimensional array
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayValue {
    pub shape: Vec<usize>,
    pub elt: ScalarKind,
    pub data: Vec<Value>,
}

/// `start:stop:step` with Python semantics for omitted and negative parts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SliceValue {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosureValue {
    pub func: String,
    pub fixed: Vec<Value>,
}

/// Runtime value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Tuple(Vec<Value>),
    Array(ArrayRef),
    Slice(SliceValue),
    Closure(ClosureValue),
}

fn eval_err(msg: impl Into<String>) -> JitError {
    JitError::Eval(msg.into())
}

// ============================================================================
// Construction
// ============================================================================

impl Value {
    pub fn from_const(c: &Const) -> Self {
        match c {
            Const::None => Value::None,
            Const::Bool(b) => Value::Bool(*b),
            Const::Int(i) => Value::Int(*i),
            Const::Float(x) => Value::Float(*x),
        }
    }

    /// Array from row-major data; elements are converted to `elt`
    pub fn array(shape: Vec<usize>, elt: ScalarKind, data: Vec<Value>) -> JitResult<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(eval_err(format!(
                "array of shape {shape:?} needs {expected} elements, got {}",
                data.len()
            )));
        }
        let data = data
            .iter()
            .map(|v| v.cast(elt))
            .collect::<JitResult<Vec<_>>>()?;
        Ok(Value::Array(Rc::new(RefCell::new(ArrayValue {
            shape,
            elt,
            data,
        }))))
    }

    pub fn from_i64s(data: &[i64]) -> Self {
        Value::Array(Rc::new(RefCell::new(ArrayValue {
            shape: vec![data.len()],
            elt: ScalarKind::Int64,
            data: data.iter().map(|i| Value::Int(*i)).collect(),
        })))
    }

    pub fn from_f64s(data: &[f64]) -> Self {
        Value::Array(Rc::new(RefCell::new(ArrayValue {
            shape: vec![data.len()],
            elt: ScalarKind::Float64,
            data: data.iter().map(|x| Value::Float(*x)).collect(),
        })))
    }

    /// Rank-2 float64 array from equally long rows
    pub fn from_f64_rows(rows: &[Vec<f64>]) -> JitResult<Self> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        let data = rows
            .iter()
            .flat_map(|r| r.iter().map(|x| Value::Float(*x)))
            .collect();
        Value::array(vec![rows.len(), cols], ScalarKind::Float64, data)
    }

    /// `range(start, stop, step)` as a rank-1 int64 array
    pub fn range(start: i64, stop: i64, step: i64) -> JitResult<Self> {
        if step == 0 {
            return Err(eval_err("range step must not be zero"));
        }
        let len = range_len(start, stop, step);
        let data = (0..len as i64).map(|i| Value::Int(start + i * step)).collect();
        Value::array(vec![len], ScalarKind::Int64, data)
    }

    /// Array of the given shape (int or tuple of ints) filled with `value`
    pub fn fill(shape: &Value, value: &Value) -> JitResult<Self> {
        let dims = match shape {
            Value::Tuple(elts) => elts
                .iter()
                .map(Value::as_index_len)
                .collect::<JitResult<Vec<_>>>()?,
            other => vec![other.as_index_len()?],
        };
        let elt = value.kind()?;
        let count = dims.iter().product();
        Value::array(dims, elt, vec![value.clone(); count])
    }

    /// Stack values along a new outer axis.
    ///
    /// Scalars become a vector and equally shaped arrays gain one rank; the
    /// element kind is the promotion of all inputs. `fallback` is the element
    /// kind of an empty stack.
    pub fn stack(values: Vec<Value>, fallback: ScalarKind) -> JitResult<Self> {
        if values.is_empty() {
            return Value::array(vec![0], fallback, Vec::new());
        }
        let mut kind: Option<ScalarKind> = None;
        for v in &values {
            let k = v.kind()?;
            kind = Some(kind.map_or(k, |prev| prev.promote(k)));
        }
        let kind = kind.unwrap_or(fallback);

        if values.iter().all(Value::is_scalar) {
            return Value::array(vec![values.len()], kind, values);
        }
        let mut inner: Option<Vec<usize>> = None;
        let mut data = Vec::new();
        for v in &values {
            let Value::Array(a) = v else {
                return Err(eval_err("can't stack scalars together with arrays"));
            };
            let a = a.borrow();
            match &inner {
                Some(shape) if *shape != a.shape => {
                    return Err(eval_err(format!(
                        "can't stack arrays of shape {shape:?} and {:?}",
                        a.shape
                    )))
                }
                Some(_) => {}
                None => inner = Some(a.shape.clone()),
            }
            data.extend(a.data.iter().cloned());
        }
        let mut shape = vec![values.len()];
        shape.extend(inner.unwrap_or_default());
        Value::array(shape, kind, data)
    }
}

pub(crate) fn range_len(start: i64, stop: i64, step: i64) -> usize {
    if step > 0 && start < stop {
        ((stop - start + step - 1) / step) as usize
    } else if step < 0 && start > stop {
        ((start - stop - step - 1) / -step) as usize
    } else {
        0
    }
}

// ============================================================================
// Inspection
// ============================================================================

impl Value {
    pub fn is_scalar(&self) -> bool {
        matches!(self, Value::Bool(_) | Value::Int(_) | Value::Float(_))
    }

    /// Scalar kind of a scalar, element kind of an array
    pub fn kind(&self) -> JitResult<ScalarKind> {
        match self {
            Value::Bool(_) => Ok(ScalarKind::Bool),
            Value::Int(_) => Ok(ScalarKind::Int64),
            Value::Float(_) => Ok(ScalarKind::Float64),
            Value::Array(a) => Ok(a.borrow().elt),
            other => Err(eval_err(format!("{other} has no scalar kind"))),
        }
    }

    /// Concrete type of this value
    pub fn type_of(&self) -> JitType {
        match self {
            Value::None => JitType::NoneType,
            Value::Bool(_) => JitType::BOOL,
            Value::Int(_) => JitType::INT64,
            Value::Float(_) => JitType::FLOAT64,
            Value::Tuple(elts) => JitType::Tuple(elts.iter().map(Value::type_of).collect()),
            Value::Array(a) => {
                let a = a.borrow();
                JitType::array(a.elt, a.shape.len())
            }
            Value::Slice(_) => JitType::Slice,
            Value::Closure(c) => JitType::Closure {
                func: c.func.clone(),
                fixed: c.fixed.iter().map(Value::type_of).collect(),
            },
        }
    }

    pub fn as_i64(&self) -> JitResult<i64> {
        match self {
            Value::Int(i) => Ok(*i),
            Value::Bool(b) => Ok(*b as i64),
            other => Err(eval_err(format!("expected an integer, got {other}"))),
        }
    }

    pub fn as_f64(&self) -> JitResult<f64> {
        match self {
            Value::Int(i) => Ok(*i as f64),
            Value::Bool(b) => Ok(*b as i64 as f64),
            Value::Float(x) => Ok(*x),
            other => Err(eval_err(format!("expected a number, got {other}"))),
        }
    }

    /// Truth value of a condition
    pub fn truthy(&self) -> JitResult<bool> {
        match self {
            Value::None => Ok(false),
            Value::Bool(b) => Ok(*b),
            Value::Int(i) => Ok(*i != 0),
            Value::Float(x) => Ok(*x != 0.0),
            other => Err(eval_err(format!("{other} has no truth value"))),
        }
    }

    fn as_index_len(&self) -> JitResult<usize> {
        let n = self.as_i64()?;
        usize::try_from(n).map_err(|_| eval_err(format!("negative dimension {n}")))
    }

    /// Dimensions of an array; empty for scalars
    pub fn dims(&self) -> Vec<usize> {
        match self {
            Value::Array(a) => a.borrow().shape.clone(),
            _ => Vec::new(),
        }
    }

    /// `shape(v)` as a tuple of ints
    pub fn shape_value(&self) -> Value {
        Value::Tuple(
            self.dims()
                .into_iter()
                .map(|d| Value::Int(d as i64))
                .collect(),
        )
    }

    /// `len(v)`
    pub fn len_value(&self) -> JitResult<Value> {
        match self {
            Value::Array(a) => a
                .borrow()
                .shape
                .first()
                .map(|n| Value::Int(*n as i64))
                .ok_or_else(|| eval_err("len() of a rank-0 array")),
            Value::Tuple(elts) => Ok(Value::Int(elts.len() as i64)),
            other => Err(eval_err(format!("len() of {other}"))),
        }
    }

    /// Flattened data of an array (or the scalar itself) as floats
    pub fn flat_f64(&self) -> JitResult<Vec<f64>> {
        match self {
            Value::Array(a) => a.borrow().data.iter().map(Value::as_f64).collect(),
            other => Ok(vec![other.as_f64()?]),
        }
    }
}

// ============================================================================
// Scalar arithmetic
// ============================================================================

impl Value {
    /// Convert a scalar, or every element of an array, to `kind`
    pub fn cast(&self, kind: ScalarKind) -> JitResult<Value> {
        match self {
            Value::Array(a) => {
                let a = a.borrow();
                let data = a
                    .data
                    .iter()
                    .map(|v| v.cast(kind))
                    .collect::<JitResult<Vec<_>>>()?;
                Ok(Value::Array(Rc::new(RefCell::new(ArrayValue {
                    shape: a.shape.clone(),
                    elt: kind,
                    data,
                }))))
            }
            scalar => Ok(match kind {
                ScalarKind::Bool => Value::Bool(scalar.truthy()?),
                ScalarKind::Int32 => Value::Int(scalar.to_int()? as i32 as i64),
                ScalarKind::Int64 => Value::Int(scalar.to_int()?),
                ScalarKind::Float32 => Value::Float(scalar.as_f64()? as f32 as f64),
                ScalarKind::Float64 => Value::Float(scalar.as_f64()?),
            }),
        }
    }

    /// Integer conversion truncating floats toward zero
    fn to_int(&self) -> JitResult<i64> {
        match self {
            Value::Float(x) => Ok(*x as i64),
            other => other.as_i64(),
        }
    }

    /// Binary operator; arrays combine elementwise with scalar broadcasting
    pub fn binop(op: BinOp, left: &Value, right: &Value) -> JitResult<Value> {
        match (left, right) {
            (Value::Array(_), _) | (_, Value::Array(_)) => elementwise(op, left, right),
            _ => scalar_binop(op, left, right),
        }
    }

    pub fn unary(op: UnaryOp, operand: &Value) -> JitResult<Value> {
        match operand {
            Value::Array(a) => {
                let a = a.borrow();
                let data = a
                    .data
                    .iter()
                    .map(|v| Value::unary(op, v))
                    .collect::<JitResult<Vec<_>>>()?;
                let elt = match op {
                    UnaryOp::Not => ScalarKind::Bool,
                    UnaryOp::Neg => a.elt.arith(a.elt),
                };
                Value::array(a.shape.clone(), elt, data)
            }
            Value::Bool(b) => Ok(match op {
                UnaryOp::Neg => Value::Int(-(*b as i64)),
                UnaryOp::Not => Value::Bool(!b),
            }),
            Value::Int(i) => Ok(match op {
                UnaryOp::Neg => Value::Int(i.wrapping_neg()),
                UnaryOp::Not => Value::Bool(*i == 0),
            }),
            Value::Float(x) => Ok(match op {
                UnaryOp::Neg => Value::Float(-x),
                UnaryOp::Not => Value::Bool(*x == 0.0),
            }),
            other => Err(eval_err(format!("bad operand {other} for {}", op.name()))),
        }
    }
}

fn scalar_binop(op: BinOp, left: &Value, right: &Value) -> JitResult<Value> {
    if op.is_logical() {
        let (a, b) = (left.truthy()?, right.truthy()?);
        return Ok(Value::Bool(if op == BinOp::And { a && b } else { a || b }));
    }
    let (ka, kb) = (left.kind()?, right.kind()?);
    if op.is_comparison() {
        let ord = if ka.is_float() || kb.is_float() {
            left.as_f64()?.partial_cmp(&right.as_f64()?)
        } else {
            Some(left.as_i64()?.cmp(&right.as_i64()?))
        };
        use std::cmp::Ordering::*;
        let result = match (op, ord) {
            (BinOp::NotEq, None) => true,
            (_, None) => false,
            (BinOp::Lt, Some(o)) => o == Less,
            (BinOp::Le, Some(o)) => o != Greater,
            (BinOp::Gt, Some(o)) => o == Greater,
            (BinOp::Ge, Some(o)) => o != Less,
            (BinOp::Eq, Some(o)) => o == Equal,
            (BinOp::NotEq, Some(o)) => o != Equal,
            _ => false,
        };
        return Ok(Value::Bool(result));
    }
    let kind = ka.arith(kb);
    let result = if kind.is_float() {
        let (a, b) = (left.as_f64()?, right.as_f64()?);
        Value::Float(match op {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mult => a * b,
            BinOp::Div => a / b,
            BinOp::Max => a.max(b),
            _ => a % b,
        })
    } else {
        let (a, b) = (left.as_i64()?, right.as_i64()?);
        if matches!(op, BinOp::Div | BinOp::Mod) && b == 0 {
            return Err(eval_err("integer division by zero"));
        }
        Value::Int(match op {
            BinOp::Add => a.wrapping_add(b),
            BinOp::Sub => a.wrapping_sub(b),
            BinOp::Mult => a.wrapping_mul(b),
            BinOp::Div => a.wrapping_div(b),
            BinOp::Max => a.max(b),
            _ => a.wrapping_rem(b),
        })
    };
    result.cast(kind)
}

fn elementwise(op: BinOp, left: &Value, right: &Value) -> JitResult<Value> {
    let (ka, kb) = (left.kind()?, right.kind()?);
    let elt = if op.is_arithmetic() {
        ka.arith(kb)
    } else {
        ScalarKind::Bool
    };
    let (shape, pairs): (Vec<usize>, Vec<(Value, Value)>) = match (left, right) {
        (Value::Array(a), Value::Array(b)) => {
            let (a, b) = (a.borrow(), b.borrow());
            if a.shape != b.shape {
                return Err(eval_err(format!(
                    "shape mismatch: {:?} and {:?}",
                    a.shape, b.shape
                )));
            }
            (
                a.shape.clone(),
                a.data.iter().cloned().zip(b.data.iter().cloned()).collect(),
            )
        }
        (Value::Array(a), s) => {
            let a = a.borrow();
            (
                a.shape.clone(),
                a.data.iter().map(|v| (v.clone(), s.clone())).collect(),
            )
        }
        (s, Value::Array(b)) => {
            let b = b.borrow();
            (
                b.shape.clone(),
                b.data.iter().map(|v| (s.clone(), v.clone())).collect(),
            )
        }
        _ => return scalar_binop(op, left, right),
    };
    let data = pairs
        .iter()
        .map(|(a, b)| scalar_binop(op, a, b))
        .collect::<JitResult<Vec<_>>>()?;
    Value::array(shape, elt, data)
}

// ============================================================================
// Indexing
// ============================================================================

/// Position along one axis selected by an index
#[derive(Debug, Clone)]
enum Component {
    At(usize),
    Span(Vec<usize>),
}

fn normalize_index(i: i64, n: usize) -> JitResult<usize> {
    let j = if i < 0 { i + n as i64 } else { i };
    if j < 0 || j >= n as i64 {
        return Err(eval_err(format!("index {i} out of bounds for axis of length {n}")));
    }
    Ok(j as usize)
}

impl SliceValue {
    /// Positions selected on an axis of length `n`
    pub fn indices(&self, n: usize) -> JitResult<Vec<usize>> {
        let step = self.step.unwrap_or(1);
        if step == 0 {
            return Err(eval_err("slice step must not be zero"));
        }
        let n = n as i64;
        let wrap = |v: i64| if v < 0 { v + n } else { v };
        let mut out = Vec::new();
        if step > 0 {
            let start = self.start.map(|v| wrap(v).clamp(0, n)).unwrap_or(0);
            let stop = self.stop.map(|v| wrap(v).clamp(0, n)).unwrap_or(n);
            let mut i = start;
            while i < stop {
                out.push(i as usize);
                i += step;
            }
        } else {
            let start = self.start.map(|v| wrap(v).clamp(-1, n - 1)).unwrap_or(n - 1);
            let stop = self.stop.map(|v| wrap(v).clamp(-1, n - 1)).unwrap_or(-1);
            let mut i = start;
            while i > stop {
                out.push(i as usize);
                i += step;
            }
        }
        Ok(out)
    }
}

impl ArrayValue {
    fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.shape.len()];
        for axis in (0..self.shape.len().saturating_sub(1)).rev() {
            strides[axis] = strides[axis + 1] * self.shape[axis + 1];
        }
        strides
    }

    fn components(&self, index: &Value) -> JitResult<Vec<Component>> {
        let parts: Vec<&Value> = match index {
            Value::Tuple(elts) => elts.iter().collect(),
            other => vec![other],
        };
        if parts.len() > self.shape.len() {
            return Err(eval_err(format!(
                "too many indices ({}) for array of rank {}",
                parts.len(),
                self.shape.len()
            )));
        }
        let mut comps = Vec::with_capacity(self.shape.len());
        for (axis, &n) in self.shape.iter().enumerate() {
            comps.push(match parts.get(axis) {
                Some(Value::Slice(s)) => Component::Span(s.indices(n)?),
                Some(v) => Component::At(normalize_index(v.as_i64()?, n)?),
                None => Component::Span((0..n).collect()),
            });
        }
        Ok(comps)
    }

    /// Result shape and flat source offsets of a selection, row-major
    fn select(&self, comps: &[Component]) -> (Vec<usize>, Vec<usize>) {
        let strides = self.strides();
        let mut shape = Vec::new();
        let mut offsets = vec![0usize];
        for (axis, comp) in comps.iter().enumerate() {
            let positions: Vec<usize> = match comp {
                Component::At(i) => vec![*i],
                Component::Span(v) => {
                    shape.push(v.len());
                    v.clone()
                }
            };
            let stride = strides[axis];
            offsets = offsets
                .iter()
                .flat_map(|base| positions.iter().map(move |p| base + p * stride))
                .collect();
        }
        (shape, offsets)
    }

    fn gather(&self, comps: &[Component]) -> JitResult<Value> {
        let (shape, offsets) = self.select(comps);
        if shape.is_empty() && comps.iter().all(|c| matches!(c, Component::At(_))) {
            return Ok(self.data[offsets[0]].clone());
        }
        let data = offsets.iter().map(|o| self.data[*o].clone()).collect();
        Value::array(shape, self.elt, data)
    }
}

impl Value {
    /// `value[index]`
    pub fn index(&self, index: &Value) -> JitResult<Value> {
        match self {
            Value::Tuple(elts) => {
                let i = normalize_index(index.as_i64()?, elts.len())?;
                Ok(elts[i].clone())
            }
            Value::Array(a) => {
                let a = a.borrow();
                let comps = a.components(index)?;
                a.gather(&comps)
            }
            other => Err(eval_err(format!("{other} is not indexable"))),
        }
    }

    /// `value[index] = rhs`; scalars broadcast over the selection
    pub fn store(&self, index: &Value, rhs: &Value) -> JitResult<()> {
        let Value::Array(a) = self else {
            return Err(eval_err(format!("can't store into {self}")));
        };
        let source: Option<Vec<Value>> = match rhs {
            Value::Array(r) => {
                // copy first: `rhs` may alias `self`
                Some(r.borrow().data.clone())
            }
            _ => None,
        };
        let mut a = a.borrow_mut();
        let comps = a.components(index)?;
        let (_, offsets) = a.select(&comps);
        let elt = a.elt;
        match source {
            Some(data) => {
                if data.len() != offsets.len() {
                    return Err(eval_err(format!(
                        "can't store {} elements into a selection of {}",
                        data.len(),
                        offsets.len()
                    )));
                }
                for (o, v) in offsets.iter().zip(data) {
                    a.data[*o] = v.cast(elt)?;
                }
            }
            None => {
                let v = rhs.cast(elt)?;
                for o in offsets {
                    a.data[o] = v.clone();
                }
            }
        }
        Ok(())
    }

    /// Length of `axis`
    pub fn axis_len(&self, axis: usize) -> JitResult<usize> {
        match self {
            Value::Array(a) => a
                .borrow()
                .shape
                .get(axis)
                .copied()
                .ok_or_else(|| eval_err(format!("no axis {axis}"))),
            other => Err(eval_err(format!("{other} has no axis {axis}"))),
        }
    }

    /// Element `i` along `axis`, dropping that axis
    pub fn slice_axis(&self, axis: usize, i: usize) -> JitResult<Value> {
        let Value::Array(a) = self else {
            return Ok(self.clone());
        };
        let a = a.borrow();
        if axis >= a.shape.len() {
            return Err(eval_err(format!("no axis {axis} in rank {}", a.shape.len())));
        }
        let comps: Vec<Component> = a
            .shape
            .iter()
            .enumerate()
            .map(|(k, &n)| {
                if k == axis {
                    Component::At(i)
                } else {
                    Component::Span((0..n).collect())
                }
            })
            .collect();
        a.gather(&comps)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Tuple(elts) => {
                write!(f, "(")?;
                for (i, v) in elts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, ")")
            }
            Value::Array(a) => {
                let a = a.borrow();
                write!(f, "array{:?}<{}>", a.shape, a.elt)
            }
            Value::Slice(s) => write!(f, "slice({:?}, {:?}, {:?})", s.start, s.stop, s.step),
            Value::Closure(c) => write!(f, "closure({}, {} fixed)", c.func, c.fixed.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(v: &Value) -> Vec<i64> {
        match v {
            Value::Array(a) => a.borrow().data.iter().map(|x| x.as_i64().unwrap()).collect(),
            other => vec![other.as_i64().unwrap()],
        }
    }

    #[test]
    fn test_scalar_promotion() {
        let v = Value::binop(BinOp::Add, &Value::Int(1), &Value::Float(0.5)).unwrap();
        assert_eq!(v, Value::Float(1.5));
        let v = Value::binop(BinOp::Add, &Value::Bool(true), &Value::Bool(true)).unwrap();
        assert_eq!(v, Value::Int(2));
    }

    #[test]
    fn test_integer_division_truncates() {
        let v = Value::binop(BinOp::Div, &Value::Int(-7), &Value::Int(2)).unwrap();
        assert_eq!(v, Value::Int(-3));
        assert!(Value::binop(BinOp::Mod, &Value::Int(1), &Value::Int(0)).is_err());
    }

    #[test]
    fn test_range_lengths() {
        assert_eq!(ints(&Value::range(5, 12, 2).unwrap()), vec![5, 7, 9, 11]);
        assert_eq!(ints(&Value::range(3, 0, -1).unwrap()), vec![3, 2, 1]);
        assert_eq!(Value::range(3, 3, 1).unwrap().dims(), vec![0]);
        assert!(Value::range(0, 3, 0).is_err());
    }

    #[test]
    fn test_index_and_slice() {
        let m = Value::array(
            vec![2, 3],
            ScalarKind::Int64,
            (0..6).map(Value::Int).collect(),
        )
        .unwrap();
        assert_eq!(ints(&m.index(&Value::Int(1)).unwrap()), vec![3, 4, 5]);
        let idx = Value::Tuple(vec![Value::Int(-1), Value::Int(0)]);
        assert_eq!(m.index(&idx).unwrap(), Value::Int(3));
        let col = Value::Tuple(vec![
            Value::Slice(SliceValue::default()),
            Value::Int(2),
        ]);
        assert_eq!(ints(&m.index(&col).unwrap()), vec![2, 5]);
        let rev = SliceValue {
            step: Some(-1),
            ..SliceValue::default()
        };
        assert_eq!(rev.indices(3).unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn test_store_is_shared() {
        let a = Value::from_i64s(&[1, 2, 3]);
        let alias = a.clone();
        a.store(&Value::Int(0), &Value::Float(9.7)).unwrap();
        assert_eq!(ints(&alias), vec![9, 2, 3]);
        a.store(&Value::Slice(SliceValue::default()), &Value::Int(0))
            .unwrap();
        assert_eq!(ints(&alias), vec![0, 0, 0]);
    }

    #[test]
    fn test_slice_axis_and_stack() {
        let m = Value::from_f64_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let col = m.slice_axis(1, 0).unwrap();
        assert_eq!(col.flat_f64().unwrap(), vec![1.0, 3.0]);
        let rows: Vec<Value> = (0..2).map(|i| m.slice_axis(0, i).unwrap()).collect();
        let back = Value::stack(rows, ScalarKind::Float64).unwrap();
        assert_eq!(back, m);
        let mixed = Value::stack(vec![Value::Int(1), Value::Float(2.5)], ScalarKind::Int64)
            .unwrap();
        assert_eq!(mixed.type_of(), JitType::array(ScalarKind::Float64, 1));
    }

    #[test]
    fn test_elementwise_broadcast() {
        let v = Value::from_i64s(&[1, 2, 3]);
        let doubled = Value::binop(BinOp::Mult, &v, &Value::Int(2)).unwrap();
        assert_eq!(ints(&doubled), vec![2, 4, 6]);
        let mask = Value::binop(BinOp::Gt, &v, &Value::Int(1)).unwrap();
        assert_eq!(mask.type_of(), JitType::array(ScalarKind::Bool, 1));
        let other = Value::from_i64s(&[1, 2]);
        assert!(Value::binop(BinOp::Add, &v, &other).is_err());
    }

    #[test]
    fn test_fill_and_cast() {
        let z = Value::fill(&Value::Tuple(vec![Value::Int(2), Value::Int(2)]), &Value::Float(0.0))
            .unwrap();
        assert_eq!(z.type_of(), JitType::array(ScalarKind::Float64, 2));
        assert_eq!(Value::Float(-2.7).cast(ScalarKind::Int64).unwrap(), Value::Int(-2));
        assert_eq!(Value::Int(3).cast(ScalarKind::Bool).unwrap(), Value::Bool(true));
    }
}
