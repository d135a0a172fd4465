//! This module defines the value model shared by parsed forms and evaluation results.
//! The main enum, [`Value`], covers integers, floats, booleans, strings, symbols and
//! compounds (what the reader produces) plus closures, built-in procedures and the
//! unspecified value (what only evaluation produces). Ergonomic helper functions such as
//! [`val`], [`sym`] and [`nil`] build values in code and tests, and conversion traits
//! connect common Rust types to `Value`.
//!
//! Compound and string payloads are reference counted. Cloning a value never copies the
//! elements, which is what makes `eq?` identity observable and keeps quoted forms immutable.
//! Equality comes in three strengths: [`Value::is_eq`] (identity), `==` / [`Value::is_eqv`]
//! (same type and value) and [`Value::is_equal`] (deep structural, numerically coercing).

use std::fmt;
use std::rc::Rc;

use crate::Error;
use crate::builtinops::BuiltinOp;
use crate::evaluator::Environment;

/// Type alias for exact numbers in the interpreter
pub(crate) type NumberType = i64;

/// A numeric operand: the two members of the supported numeric tower.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Integer(NumberType),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Integer(n) => n as f64,
            Number::Float(f) => f,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Number::Integer(n) => n == 0,
            Number::Float(f) => f == 0.0,
        }
    }

    /// Numeric comparison across integers and floats
    pub fn partial_cmp_num(self, other: Number) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

/// A user-defined procedure: parameters, a single body form and the environment that was
/// current when the `lambda` was evaluated.
pub struct Procedure {
    pub params: Vec<String>,
    pub body: Value,
    pub env: Environment,
}

impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Procedure(params={:?}, body={:?})", self.params, self.body)
    }
}

/// Core value type in the interpreter
///
/// To build a form, use the ergonomic helper functions:
/// - `val(42)` for values, `sym("name")` for symbols, `nil()` for empty lists
/// - `val([1, 2, 3])` for homogeneous lists
/// - `val(vec![sym("op"), val(42)])` for mixed lists
#[derive(Clone)]
pub enum Value {
    Integer(NumberType),
    Float(f64),
    Bool(bool),
    /// String literals; shared so that identity is distinct from content
    String(Rc<str>),
    /// Symbols (identifiers), compared by name
    Symbol(String),
    /// Compounds: calls in source, flat lists at runtime. The empty list is nil.
    List(Rc<[Value]>),
    /// Closures created by `lambda`
    Procedure(Rc<Procedure>),
    /// Built-in procedures from the standard library or host registration
    BuiltinFunction(Rc<BuiltinOp>),
    /// Unspecified values (e.g., the result of an empty `begin`)
    /// These values never equal themselves or any other value
    Unspecified,
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "Integer({n})"),
            Value::Float(x) => write!(f, "Float({x:?})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::List(list) => {
                write!(f, "List(")?;
                for (i, v) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v:?}")?;
                }
                write!(f, ")")
            }
            Value::Procedure(p) => write!(f, "{p:?}"),
            Value::BuiltinFunction(op) => write!(f, "BuiltinFunction({})", op.scheme_id),
            Value::Unspecified => write!(f, "Unspecified"),
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        match n {
            Number::Integer(i) => Value::Integer(i),
            Number::Float(x) => Value::Float(x),
        }
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Integer(n as NumberType)
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(NumberType); // Special case - no casting
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::list(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::list(arr.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value> + Clone> From<&[T]> for Value {
    fn from(slice: &[T]) -> Self {
        Value::list(slice.iter().cloned().map(Into::into).collect())
    }
}

// Fallible conversions from `Value` back into primitive Rust types, used by the typed
// builtin adapters.

impl TryFrom<Value> for NumberType {
    type Error = Error;

    fn try_from(value: Value) -> Result<NumberType, Error> {
        match value {
            Value::Integer(n) => Ok(n),
            other => Err(Error::TypeError(format!(
                "expected integer, got {}",
                other.type_name()
            ))),
        }
    }
}

impl TryFrom<Value> for Number {
    type Error = Error;

    fn try_from(value: Value) -> Result<Number, Error> {
        value.as_number().ok_or_else(|| {
            Error::TypeError(format!("expected number, got {}", value.type_name()))
        })
    }
}

impl TryFrom<Value> for f64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<f64, Error> {
        Number::try_from(value).map(Number::as_f64)
    }
}

///   Helper function for creating symbols - works great in mixed lists!
pub fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating Values - works great in mixed lists!
/// Accepts any type that can be converted to Value
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for creating empty lists (nil)
pub fn nil() -> Value {
    Value::list(Vec::new())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{n}"),
            Value::Float(x) if x.is_nan() => write!(f, "+nan.0"),
            Value::Float(x) if x.is_infinite() => {
                write!(f, "{}", if *x > 0.0 { "+inf.0" } else { "-inf.0" })
            }
            // Debug formatting keeps the decimal point, so `5.0` reads back as a float
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Value::String(s) => {
                write!(f, "\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        '\r' => write!(f, "\\r")?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"")
            }
            Value::Symbol(s) => write!(f, "{s}"),
            Value::List(elements) => {
                write!(f, "(")?;
                for (i, elem) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, ")")
            }
            Value::Procedure(_) => write!(f, "#<procedure>"),
            Value::BuiltinFunction(op) => write!(f, "#<builtin:{}>", op.scheme_id),
            Value::Unspecified => write!(f, "#<unspecified>"),
        }
    }
}

impl Value {
    /// Build a compound from its elements
    pub fn list(elements: Vec<Value>) -> Value {
        Value::List(Rc::from(elements))
    }

    /// Check if a value represents nil (empty list)
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::List(list) if list.is_empty())
    }

    /// Only `#f` is false
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Bool(false))
    }

    pub fn is_procedure(&self) -> bool {
        matches!(self, Value::Procedure(_) | Value::BuiltinFunction(_))
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Integer(n) => Some(Number::Integer(*n)),
            Value::Float(x) => Some(Number::Float(*x)),
            _ => None,
        }
    }

    /// Short type description used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Bool(_) => "boolean",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::List(_) => "list",
            Value::Procedure(_) | Value::BuiltinFunction(_) => "procedure",
            Value::Unspecified => "unspecified",
        }
    }

    /// `eq?`: identity. Immediate values (numbers of the same type, booleans, symbols,
    /// the empty list) are identical when their values match; strings, non-empty lists and
    /// procedures only when they are the same object.
    pub fn is_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            // Bitwise, so a NaN is identical to itself
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::String(a), Value::String(b)) => Rc::ptr_eq(a, b),
            (Value::List(a), Value::List(b)) => {
                (a.is_empty() && b.is_empty()) || std::ptr::eq(a.as_ptr(), b.as_ptr())
            }
            (Value::Procedure(a), Value::Procedure(b)) => Rc::ptr_eq(a, b),
            (Value::BuiltinFunction(a), Value::BuiltinFunction(b)) => a.scheme_id == b.scheme_id,
            _ => false,
        }
    }

    /// `eqv?`: same type and same value; strings by content, lists element-wise
    pub fn is_eqv(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b || a.to_bits() == b.to_bits(),
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.is_eqv(y))
            }
            (Value::Procedure(_), Value::Procedure(_))
            | (Value::BuiltinFunction(_), Value::BuiltinFunction(_)) => self.is_eq(other),
            _ => false, // Unspecified and mixed types
        }
    }

    /// `equal?`: deep structural equality; numbers compare numerically across types
    pub fn is_equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.is_equal(y))
            }
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => a.partial_cmp_num(b) == Some(std::cmp::Ordering::Equal),
                _ => self.is_eqv(other),
            },
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.is_eqv(other)
    }
}
