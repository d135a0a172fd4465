//! Built-in procedures registry.
//!
//! Every standard procedure is described by a [`BuiltinOp`]: its Scheme identifier, its
//! [`Arity`] and its implementation. [`standard_library`] builds the whole set, and the
//! evaluator binds it into each root environment.
//!
//! ```scheme
//! (+ 1 2.5)              ; => 3.5, integers widen when a float is involved
//! (/ 5 2)                ; => 2.5, division always yields a float
//! (eqv? "a" "a")         ; => #t, but (eq? "a" "a") => #f
//! (map (lambda (x) (* x x)) '(1 2 3))
//! ```
//!
//! ## Error Handling
//!
//! - **Arity Checking**: the declared arity is validated before the implementation runs
//!   (`ArityMismatch`)
//! - **Type Safety**: operations reject incorrect types (`TypeError`); booleans are never numbers
//! - **Overflow Detection**: integer arithmetic reports overflow instead of wrapping (`BuiltinError`)
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** with typed parameters (`i64`, `f64`, `Number`, `&str`,
//!    `Value` or one of the iterator types) and a result convertible into `Value`
//! 2. **Add it to `standard_library`** with [`fixed`] or [`variadic`]; procedures that call
//!    back into the evaluator use [`higher_order`] and the raw `(args, evaluator)` signature
//! 3. **Add tests** covering edge cases and error conditions

use crate::Error;
use crate::ast::{Number, NumberType, Value};
use crate::evaluator::intooperation::{IntoOperation, IntoVariadicOperation, OperationFn};
use crate::evaluator::{Arity, Evaluator, ListIter, NumIter, StringIter, ValueIter};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::io::Write;
use std::rc::Rc;

/// Where `display` and `newline` write
pub type Output = Rc<RefCell<dyn Write>>;

/// Definition of a built-in procedure
pub struct BuiltinOp {
    /// The Scheme identifier for this operation
    pub scheme_id: String,
    /// Expected number of arguments
    pub arity: Arity,
    func: Rc<OperationFn>,
}

impl std::fmt::Debug for BuiltinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinOp")
            .field("scheme_id", &self.scheme_id)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        // Compare operations by their scheme_id, which uniquely identifies them
        self.scheme_id == other.scheme_id
    }
}

impl BuiltinOp {
    pub fn new(scheme_id: impl Into<String>, arity: Arity, func: Rc<OperationFn>) -> Self {
        BuiltinOp {
            scheme_id: scheme_id.into(),
            arity,
            func,
        }
    }

    /// Validate the argument count, then run the implementation
    pub fn call(&self, args: Vec<Value>, evaluator: Evaluator) -> Result<Value, Error> {
        self.arity.validate(args.len())?;
        (self.func)(args, evaluator)
    }
}

fn fixed<Args, F>(scheme_id: &'static str, f: F) -> BuiltinOp
where
    F: IntoOperation<Args>,
{
    BuiltinOp::new(
        scheme_id,
        Arity::Exact(<F as IntoOperation<Args>>::ARITY),
        f.into_operation(),
    )
}

fn variadic<Args, F>(scheme_id: &'static str, arity: Arity, f: F) -> BuiltinOp
where
    F: IntoVariadicOperation<Args>,
{
    BuiltinOp::new(scheme_id, arity, f.into_variadic_operation())
}

fn higher_order(
    scheme_id: &'static str,
    arity: Arity,
    f: fn(Vec<Value>, Evaluator) -> Result<Value, Error>,
) -> BuiltinOp {
    BuiltinOp::new(scheme_id, arity, Rc::new(f))
}

//
// Builtin Function Implementations
//

fn overflow(operation: &str) -> Error {
    Error::BuiltinError(format!("Integer overflow in {operation}"))
}

fn division_by_zero() -> Error {
    Error::BuiltinError("division by zero".to_owned())
}

// Integer op when both operands are integers, float op otherwise
macro_rules! numeric_binary {
    ($name:ident, $checked:ident, $op:tt, $desc:expr) => {
        fn $name(a: Number, b: Number) -> Result<Number, Error> {
            match (a, b) {
                (Number::Integer(x), Number::Integer(y)) => x
                    .$checked(y)
                    .map(Number::Integer)
                    .ok_or_else(|| overflow($desc)),
                _ => Ok(Number::Float(a.as_f64() $op b.as_f64())),
            }
        }
    };
}

numeric_binary!(add2, checked_add, +, "addition");
numeric_binary!(sub2, checked_sub, -, "subtraction");
numeric_binary!(mul2, checked_mul, *, "multiplication");

fn builtin_add(mut args: NumIter<'_>) -> Result<Number, Error> {
    args.try_fold(Number::Integer(0), add2)
}

fn builtin_mul(mut args: NumIter<'_>) -> Result<Number, Error> {
    args.try_fold(Number::Integer(1), mul2)
}

fn builtin_sub(first: Number, mut rest: NumIter<'_>) -> Result<Number, Error> {
    if rest.len() == 0 {
        return match first {
            Number::Integer(n) => n
                .checked_neg()
                .map(Number::Integer)
                .ok_or_else(|| overflow("negation")),
            Number::Float(x) => Ok(Number::Float(-x)),
        };
    }
    rest.try_fold(first, sub2)
}

fn builtin_div(first: Number, rest: NumIter<'_>) -> Result<f64, Error> {
    let (mut result, divisors) = if rest.len() == 0 {
        (1.0, vec![first])
    } else {
        (first.as_f64(), rest.collect())
    };
    for divisor in divisors {
        if divisor.is_zero() {
            return Err(division_by_zero());
        }
        result /= divisor.as_f64();
    }
    Ok(result)
}

fn builtin_quotient(a: NumberType, b: NumberType) -> Result<NumberType, Error> {
    if b == 0 {
        return Err(division_by_zero());
    }
    a.checked_div(b).ok_or_else(|| overflow("quotient"))
}

/// Remainder with the sign of the dividend
fn builtin_remainder(a: NumberType, b: NumberType) -> Result<NumberType, Error> {
    if b == 0 {
        return Err(division_by_zero());
    }
    Ok(a.wrapping_rem(b))
}

/// Remainder with the sign of the divisor
fn builtin_modulo(a: NumberType, b: NumberType) -> Result<NumberType, Error> {
    let r = builtin_remainder(a, b)?;
    if r != 0 && (r < 0) != (b < 0) {
        Ok(r + b)
    } else {
        Ok(r)
    }
}

fn builtin_abs(n: Number) -> Result<Number, Error> {
    match n {
        Number::Integer(i) => i
            .checked_abs()
            .map(Number::Integer)
            .ok_or_else(|| overflow("abs")),
        Number::Float(x) => Ok(Number::Float(x.abs())),
    }
}

fn builtin_expt(base: Number, exponent: Number) -> Result<Number, Error> {
    match (base, exponent) {
        (Number::Integer(b), Number::Integer(e)) if e >= 0 => {
            let e = u32::try_from(e).map_err(|_| overflow("exponentiation"))?;
            b.checked_pow(e)
                .map(Number::Integer)
                .ok_or_else(|| overflow("exponentiation"))
        }
        _ => Ok(Number::Float(base.as_f64().powf(exponent.as_f64()))),
    }
}

fn pick(first: Number, rest: NumIter<'_>, keep: Ordering) -> Number {
    rest.fold(first, |best, n| {
        if n.partial_cmp_num(best) == Some(keep) {
            n
        } else {
            best
        }
    })
}

fn builtin_max(first: Number, rest: NumIter<'_>) -> Number {
    pick(first, rest, Ordering::Greater)
}

fn builtin_min(first: Number, rest: NumIter<'_>) -> Number {
    pick(first, rest, Ordering::Less)
}

fn float_to_integer(x: f64) -> Result<Value, Error> {
    // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive
    if x.is_finite() && x >= NumberType::MIN as f64 && x < NumberType::MAX as f64 {
        Ok(Value::Integer(x as NumberType))
    } else {
        Err(Error::BuiltinError(format!(
            "trunc: {x} is out of integer range"
        )))
    }
}

/// `(trunc x)` drops the fraction; `(trunc x digits)` keeps `digits` decimal places.
/// Zero or negative digits yield an integer.
fn builtin_trunc(value: Number, mut digits: NumIter<'_>) -> Result<Value, Error> {
    let digits = match digits.next() {
        None => 0,
        Some(Number::Integer(d)) => d,
        Some(Number::Float(_)) => {
            return Err(Error::TypeError("trunc: digits must be an integer".into()));
        }
    };
    let scale = |d: NumberType| i32::try_from(d).map(|d| 10f64.powi(d));

    match value {
        Number::Integer(n) if digits >= 0 => Ok(Value::Integer(n)),
        Number::Integer(n) => {
            let p = u32::try_from(digits.unsigned_abs())
                .ok()
                .and_then(|d| 10i64.checked_pow(d));
            Ok(Value::Integer(p.map_or(0, |p| n / p * p)))
        }
        Number::Float(x) if digits > 0 => {
            let p = scale(digits).map_err(|_| overflow("trunc"))?;
            Ok(Value::Float((x * p).trunc() / p))
        }
        Number::Float(x) => {
            let p = scale(digits.saturating_neg()).map_err(|_| overflow("trunc"))?;
            float_to_integer((x / p).trunc() * p)
        }
    }
}

// Unary float functions; NaN out of a non-NaN argument means the argument was out of domain
macro_rules! math_function {
    ($name:ident, $method:ident, $id:expr) => {
        fn $name(x: f64) -> Result<f64, Error> {
            let result = x.$method();
            if result.is_nan() && !x.is_nan() {
                return Err(Error::BuiltinError(format!(
                    concat!($id, ": argument out of domain: {}"),
                    x
                )));
            }
            Ok(result)
        }
    };
}

math_function!(builtin_sqrt, sqrt, "sqrt");
math_function!(builtin_sin, sin, "sin");
math_function!(builtin_cos, cos, "cos");
math_function!(builtin_tan, tan, "tan");
math_function!(builtin_asin, asin, "asin");
math_function!(builtin_acos, acos, "acos");
math_function!(builtin_atan, atan, "atan");
math_function!(builtin_sinh, sinh, "sinh");
math_function!(builtin_cosh, cosh, "cosh");
math_function!(builtin_tanh, tanh, "tanh");
math_function!(builtin_asinh, asinh, "asinh");
math_function!(builtin_acosh, acosh, "acosh");
math_function!(builtin_atanh, atanh, "atanh");
math_function!(builtin_log, ln, "log");
math_function!(builtin_log10, log10, "log10");
math_function!(builtin_log2, log2, "log2");

fn builtin_atan2(y: f64, x: f64) -> f64 {
    y.atan2(x)
}

// Macro to generate chained numeric comparison functions
macro_rules! numeric_comparison {
    ($name:ident, $op:tt) => {
        fn $name(first: Number, rest: NumIter<'_>) -> bool {
            // All adjacent pairs must satisfy the comparison
            let mut prev = first;
            for current in rest {
                match prev.partial_cmp_num(current) {
                    Some(ordering) if ordering $op Ordering::Equal => prev = current,
                    _ => return false,
                }
            }
            true
        }
    };
}

numeric_comparison!(builtin_num_eq, ==);
numeric_comparison!(builtin_lt, <);
numeric_comparison!(builtin_gt, >);
numeric_comparison!(builtin_le, <=);
numeric_comparison!(builtin_ge, >=);

fn builtin_eq(a: Value, b: Value) -> bool {
    a.is_eq(&b)
}

fn builtin_eqv(a: Value, b: Value) -> bool {
    a.is_eqv(&b)
}

fn builtin_equal(a: Value, b: Value) -> bool {
    a.is_equal(&b)
}

fn builtin_not(value: Value) -> bool {
    !value.is_truthy()
}

fn compare_to_zero(n: Number) -> Option<Ordering> {
    n.partial_cmp_num(Number::Integer(0))
}

fn builtin_car(mut list: ValueIter<'_>) -> Result<Value, Error> {
    match list.next() {
        Some(first) => Ok(first.clone()),
        None => Err(Error::BuiltinError("car of empty list".into())),
    }
}

fn builtin_cdr(mut list: ValueIter<'_>) -> Result<Value, Error> {
    let Some(_) = list.next() else {
        return Err(Error::BuiltinError("cdr of empty list".into()));
    };
    Ok(Value::list(list.as_slice().to_vec()))
}

fn builtin_cons(first: Value, rest: Value) -> Result<Value, Error> {
    match rest {
        Value::List(tail) => {
            let mut new_list = Vec::with_capacity(tail.len() + 1);
            new_list.push(first);
            new_list.extend_from_slice(&tail);
            Ok(Value::list(new_list))
        }
        other => Err(Error::TypeError(format!(
            "cons requires a list as second argument, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_list(args: ValueIter<'_>) -> Value {
    Value::list(args.as_slice().to_vec())
}

fn builtin_length(value: Value) -> Result<NumberType, Error> {
    let len = match &value {
        Value::List(items) => items.len(),
        Value::String(s) => s.chars().count(),
        other => {
            return Err(Error::TypeError(format!(
                "length requires a list or string, got {}",
                other.type_name()
            )));
        }
    };
    NumberType::try_from(len).map_err(|_| overflow("length"))
}

fn builtin_append(lists: ListIter<'_>) -> Value {
    Value::list(lists.flat_map(|items| items.iter().cloned()).collect())
}

fn builtin_string_append(args: StringIter<'_>) -> String {
    args.collect()
}

fn builtin_begin(args: ValueIter<'_>) -> Value {
    args.as_slice().last().cloned().unwrap_or(Value::Unspecified)
}

fn builtin_error(args: ValueIter<'_>) -> Result<Value, Error> {
    let parts: Vec<String> = args
        .map(|value| match value {
            Value::String(s) => s.to_string(),
            _ => format!("{value}"),
        })
        .collect();

    let message = if parts.is_empty() {
        "Error".to_string()
    } else {
        parts.join(" ")
    };

    Err(Error::BuiltinError(message))
}

/// Destructure an owned argument vector whose length the arity check already fixed
fn take_args<const N: usize>(args: Vec<Value>) -> Result<[Value; N], Error> {
    <[Value; N]>::try_from(args).map_err(|args| Error::arity_error(N, args.len()))
}

fn list_operand<'a>(operation: &str, value: &'a Value) -> Result<&'a [Value], Error> {
    match value {
        Value::List(items) => Ok(items),
        other => Err(Error::TypeError(format!(
            "{operation} requires a list, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_map(args: Vec<Value>, evaluator: Evaluator) -> Result<Value, Error> {
    let [func, list] = take_args(args)?;
    list_operand("map", &list)?
        .iter()
        .map(|item| evaluator.apply(&func, vec![item.clone()]))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::list)
}

fn builtin_filter(args: Vec<Value>, evaluator: Evaluator) -> Result<Value, Error> {
    let [func, list] = take_args(args)?;
    let mut kept = Vec::new();
    for item in list_operand("filter", &list)? {
        if evaluator.apply(&func, vec![item.clone()])?.is_truthy() {
            kept.push(item.clone());
        }
    }
    Ok(Value::list(kept))
}

/// `(reduce f list init)`: left fold calling `(f acc item)`
fn builtin_reduce(args: Vec<Value>, evaluator: Evaluator) -> Result<Value, Error> {
    let [func, list, init] = take_args(args)?;
    list_operand("reduce", &list)?
        .iter()
        .try_fold(init, |acc, item| {
            evaluator.apply(&func, vec![acc, item.clone()])
        })
}

fn builtin_apply(args: Vec<Value>, evaluator: Evaluator) -> Result<Value, Error> {
    let [func, list] = take_args(args)?;
    let operands = list_operand("apply", &list)?.to_vec();
    evaluator.apply(&func, operands)
}

fn write_output(output: &Output, text: &str) -> Result<(), Error> {
    let mut sink = output.borrow_mut();
    sink.write_all(text.as_bytes())
        .and_then(|()| sink.flush())
        .map_err(|err| Error::BuiltinError(format!("output failed: {err}")))
}

/// Build the standard library; `display` and `newline` write to `output`
pub fn standard_library(output: &Output) -> Vec<BuiltinOp> {
    let display_output = Rc::clone(output);
    let newline_output = Rc::clone(output);

    vec![
        // Arithmetic operations
        variadic::<(NumIter<'static>,), _>("+", Arity::Any, builtin_add),
        variadic::<(NumIter<'static>,), _>("*", Arity::Any, builtin_mul),
        variadic::<(Number, NumIter<'static>), _>("-", Arity::AtLeast(1), builtin_sub),
        variadic::<(Number, NumIter<'static>), _>("/", Arity::AtLeast(1), builtin_div),
        fixed::<(NumberType, NumberType), _>("quotient", builtin_quotient),
        fixed::<(NumberType, NumberType), _>("remainder", builtin_remainder),
        fixed::<(NumberType, NumberType), _>("modulo", builtin_modulo),
        fixed::<(Number,), _>("abs", builtin_abs),
        fixed::<(Number, Number), _>("expt", builtin_expt),
        variadic::<(Number, NumIter<'static>), _>("min", Arity::AtLeast(1), builtin_min),
        variadic::<(Number, NumIter<'static>), _>("max", Arity::AtLeast(1), builtin_max),
        variadic::<(Number, NumIter<'static>), _>("trunc", Arity::Range(1, 2), builtin_trunc),
        // Math functions
        fixed::<(f64,), _>("sqrt", builtin_sqrt),
        fixed::<(f64,), _>("sin", builtin_sin),
        fixed::<(f64,), _>("cos", builtin_cos),
        fixed::<(f64,), _>("tan", builtin_tan),
        fixed::<(f64,), _>("asin", builtin_asin),
        fixed::<(f64,), _>("acos", builtin_acos),
        fixed::<(f64,), _>("atan", builtin_atan),
        fixed::<(f64,), _>("sinh", builtin_sinh),
        fixed::<(f64,), _>("cosh", builtin_cosh),
        fixed::<(f64,), _>("tanh", builtin_tanh),
        fixed::<(f64,), _>("asinh", builtin_asinh),
        fixed::<(f64,), _>("acosh", builtin_acosh),
        fixed::<(f64,), _>("atanh", builtin_atanh),
        fixed::<(f64,), _>("log", builtin_log),
        fixed::<(f64,), _>("log10", builtin_log10),
        fixed::<(f64,), _>("log2", builtin_log2),
        fixed::<(f64, f64), _>("atan2", builtin_atan2),
        // Comparison operations
        variadic::<(Number, NumIter<'static>), _>("=", Arity::AtLeast(2), builtin_num_eq),
        variadic::<(Number, NumIter<'static>), _>("<", Arity::AtLeast(2), builtin_lt),
        variadic::<(Number, NumIter<'static>), _>(">", Arity::AtLeast(2), builtin_gt),
        variadic::<(Number, NumIter<'static>), _>("<=", Arity::AtLeast(2), builtin_le),
        variadic::<(Number, NumIter<'static>), _>(">=", Arity::AtLeast(2), builtin_ge),
        // Equality and logic
        fixed::<(Value, Value), _>("eq?", builtin_eq),
        fixed::<(Value, Value), _>("eqv?", builtin_eqv),
        fixed::<(Value, Value), _>("equal?", builtin_equal),
        fixed::<(Value,), _>("not", builtin_not),
        // Type predicates
        fixed::<(Value,), _>("list?", |v: Value| matches!(v, Value::List(_))),
        fixed::<(Value,), _>("pair?", |v: Value| {
            matches!(v, Value::List(_)) && !v.is_nil()
        }),
        fixed::<(Value,), _>("null?", |v: Value| v.is_nil()),
        fixed::<(Value,), _>("boolean?", |v: Value| matches!(v, Value::Bool(_))),
        fixed::<(Value,), _>("integer?", |v: Value| matches!(v, Value::Integer(_))),
        fixed::<(Value,), _>("number?", |v: Value| v.as_number().is_some()),
        fixed::<(Value,), _>("string?", |v: Value| matches!(v, Value::String(_))),
        fixed::<(Value,), _>("symbol?", |v: Value| matches!(v, Value::Symbol(_))),
        fixed::<(Value,), _>("procedure?", |v: Value| v.is_procedure()),
        // Numeric predicates
        fixed::<(NumberType,), _>("even?", |n: NumberType| n % 2 == 0),
        fixed::<(NumberType,), _>("odd?", |n: NumberType| n % 2 != 0),
        fixed::<(Number,), _>("positive?", |n: Number| {
            compare_to_zero(n) == Some(Ordering::Greater)
        }),
        fixed::<(Number,), _>("negative?", |n: Number| {
            compare_to_zero(n) == Some(Ordering::Less)
        }),
        fixed::<(Number,), _>("zero?", Number::is_zero),
        // List operations
        fixed::<(ValueIter<'static>,), _>("car", builtin_car),
        fixed::<(ValueIter<'static>,), _>("cdr", builtin_cdr),
        fixed::<(Value, Value), _>("cons", builtin_cons),
        variadic::<(ValueIter<'static>,), _>("list", Arity::Any, builtin_list),
        fixed::<(Value,), _>("length", builtin_length),
        variadic::<(ListIter<'static>,), _>("append", Arity::Any, builtin_append),
        // String operations
        variadic::<(StringIter<'static>,), _>("string-append", Arity::Any, builtin_string_append),
        // Higher-order procedures
        higher_order("map", Arity::Exact(2), builtin_map),
        higher_order("filter", Arity::Exact(2), builtin_filter),
        higher_order("reduce", Arity::Exact(3), builtin_reduce),
        higher_order("apply", Arity::Exact(2), builtin_apply),
        // Sequencing
        variadic::<(ValueIter<'static>,), _>("begin", Arity::Any, builtin_begin),
        // Output
        fixed::<(Value,), _>("display", move |value: Value| -> Result<Value, Error> {
            match &value {
                Value::String(s) => write_output(&display_output, s)?,
                other => write_output(&display_output, &other.to_string())?,
            }
            Ok(value)
        }),
        fixed::<(), _>("newline", move || -> Result<Value, Error> {
            write_output(&newline_output, "\n")?;
            Ok(Value::Unspecified)
        }),
        // Error handling
        variadic::<(ValueIter<'static>,), _>("error", Arity::Any, builtin_error),
    ]
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{nil, sym, val};

    /// Micro-helper for success cases in comprehensive tests
    fn success<T: Into<Value>>(value: T) -> Option<Value> {
        Some(val(value))
    }

    fn null_output() -> Output {
        Rc::new(RefCell::new(std::io::sink()))
    }

    fn find_op(name: &str) -> BuiltinOp {
        standard_library(&null_output())
            .into_iter()
            .find(|op| op.scheme_id == name)
            .unwrap_or_else(|| panic!("builtin not found: {name}"))
    }

    fn builtin(name: &str) -> Value {
        Value::BuiltinFunction(Rc::new(find_op(name)))
    }

    /// Invoke a builtin through the registry, arity check included
    fn call_builtin(name: &str, args: &[Value]) -> Result<Value, Error> {
        find_op(name).call(args.to_vec(), Evaluator::default())
    }

    #[test]
    fn test_builtin_ops_registry() {
        let ops = standard_library(&null_output());

        // Identifiers are unique
        let mut ids: Vec<&str> = ops.iter().map(|op| op.scheme_id.as_str()).collect();
        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), total);

        for (name, arity) in [
            ("+", Arity::Any),
            ("-", Arity::AtLeast(1)),
            ("/", Arity::AtLeast(1)),
            ("=", Arity::AtLeast(2)),
            ("not", Arity::Exact(1)),
            ("atan2", Arity::Exact(2)),
            ("trunc", Arity::Range(1, 2)),
            ("reduce", Arity::Exact(3)),
            ("newline", Arity::Exact(0)),
            ("begin", Arity::Any),
        ] {
            assert_eq!(find_op(name).arity, arity, "arity of {name}");
        }

        // Special forms are not procedures
        for keyword in ["quote", "if", "define", "lambda", "exit"] {
            assert!(ops.iter().all(|op| op.scheme_id != keyword));
        }
    }

    /// Macro to create test cases, invoking builtins via the registry.
    macro_rules! test {
        ($name:expr, $args:expr, $expected:expr) => {
            ($name, call_builtin($name, $args), $expected)
        };
    }

    #[test]
    #[expect(clippy::too_many_lines)] // Comprehensive test coverage is intentionally thorough
    fn test_builtin_function_implementations() {
        type TestCase = (&'static str, Result<Value, Error>, Option<Value>);

        let int_list = val([1, 2, 3]);
        let many_ones: Vec<Value> = (0..100).map(|_| val(1)).collect();
        let all_fives: Vec<Value> = (0..10).map(|_| val(5)).collect();
        let mut mostly_fives = all_fives.clone();
        mostly_fives.push(val(6));
        let mixed = val([val(1), val("hello"), val(true), nil()]);

        let test_cases: Vec<TestCase> = vec![
            // =================================================================
            // ARITHMETIC
            // =================================================================
            test!("+", &[], success(0)),
            test!("+", &[val(5)], success(5)),
            test!("+", &[val(1), val(2), val(3)], success(6)),
            test!("+", &[val(1), val(2.5)], success(3.5)),
            test!("+", &[val(1.5), val(2), val(-8)], success(-4.5)),
            test!("+", &[val("not a number")], None),
            test!("+", &[val(1), val(true)], None),
            test!("+", &many_ones, success(100)),
            test!("-", &[val(5)], success(-5)),
            test!("-", &[val(10), val(3), val(2)], success(5)),
            test!("-", &[val(1), val(0.5)], success(0.5)),
            test!("-", &[], None),
            test!("-", &[val(5), val(false)], None),
            test!("*", &[], success(1)),
            test!("*", &[val(2), val(3), val(4)], success(24)),
            test!("*", &[val(2), val(1.5)], success(3.0)),
            test!("*", &[val(2), nil()], None),
            test!("/", &[val(5), val(2)], success(2.5)),
            test!("/", &[val(3)], success(1.0 / 3.0)),
            test!("/", &[val(100), val(5), val(2)], success(10.0)),
            test!("/", &[val(1), val(0)], None),
            test!("/", &[val(1), val(0.0)], None),
            test!("/", &[val(0)], None),
            test!("/", &[], None),
            // Integer overflow cases (should fail)
            test!("+", &[val(NumberType::MAX), val(1)], None),
            test!("*", &[val(NumberType::MAX), val(2)], None),
            test!("-", &[val(NumberType::MIN)], None),
            test!("-", &[val(NumberType::MIN), val(1)], None),
            test!("abs", &[val(NumberType::MIN)], None),
            test!("quotient", &[val(NumberType::MIN), val(-1)], None),
            // Overflow is an integer concern only
            test!("+", &[val(NumberType::MAX), val(1.0)], success(NumberType::MAX as f64 + 1.0)),
            // Boundary values (should succeed)
            test!("+", &[val(NumberType::MAX), val(0)], success(NumberType::MAX)),
            test!("-", &[val(NumberType::MIN), val(0)], success(NumberType::MIN)),
            test!("remainder", &[val(NumberType::MIN), val(-1)], success(0)),
            // Integer division family
            test!("quotient", &[val(17), val(5)], success(3)),
            test!("quotient", &[val(-17), val(5)], success(-3)),
            test!("remainder", &[val(17), val(-5)], success(2)),
            test!("remainder", &[val(-17), val(5)], success(-2)),
            test!("modulo", &[val(17), val(-5)], success(-3)),
            test!("modulo", &[val(-17), val(5)], success(3)),
            test!("modulo", &[val(-15), val(5)], success(0)),
            test!("modulo", &[val(5), val(0)], None),
            test!("quotient", &[val(5.0), val(2)], None),
            test!("quotient", &[val(5)], None),
            // abs / expt / min / max / trunc
            test!("abs", &[val(-7)], success(7)),
            test!("abs", &[val(-0.25)], success(0.25)),
            test!("expt", &[val(2), val(10)], success(1024)),
            test!("expt", &[val(2), val(0)], success(1)),
            test!("expt", &[val(2.0), val(3)], success(8.0)),
            test!("expt", &[val(10), val(-2)], success(0.01)),
            test!("expt", &[val(3), val(40)], None),
            test!("max", &[val(5)], success(5)),
            test!("max", &[val(3), val(1), val(2)], success(3)),
            test!("max", &[val(1), val(2.5)], success(2.5)),
            test!("min", &[val(-5), val(-1), val(-10)], success(-10)),
            test!("min", &[val(2), val(0.5), val(1)], success(0.5)),
            test!("max", &[], None),
            test!("min", &[val(true)], None),
            test!("max", &[val(1), val("hello")], None),
            test!("trunc", &[val(9.99)], success(9)),
            test!("trunc", &[val(-9.99)], success(-9)),
            test!("trunc", &[val(1.23456), val(3)], success(1.234)),
            test!("trunc", &[val(1234.5), val(-2)], success(1200)),
            test!("trunc", &[val(1234), val(-2)], success(1200)),
            test!("trunc", &[val(1234), val(2)], success(1234)),
            test!("trunc", &[val(1e300)], None),
            test!("trunc", &[val(1.5), val(1.5)], None),
            test!("trunc", &[val(1.5), val(1), val(2)], None),
            // =================================================================
            // MATH
            // =================================================================
            test!("sqrt", &[val(16)], success(4.0)),
            test!("sqrt", &[val(2.25)], success(1.5)),
            test!("sqrt", &[val(-4)], None),
            test!("sin", &[val(0)], success(0.0)),
            test!("cos", &[val(0)], success(1.0)),
            test!("atan", &[val(0)], success(0.0)),
            test!("asin", &[val(2)], None),
            test!("acosh", &[val(1)], success(0.0)),
            test!("log", &[val(1)], success(0.0)),
            test!("log10", &[val(1000)], success(3.0)),
            test!("log2", &[val(8)], success(3.0)),
            test!("log", &[val(-1)], None),
            test!("atan2", &[val(0), val(1)], success(0.0)),
            test!("sqrt", &[val("4")], None),
            test!("sqrt", &[], None),
            // =================================================================
            // COMPARISON
            // =================================================================
            test!(">", &[val(7), val(3)], success(true)),
            test!(">", &[val(4), val(4)], success(false)),
            test!(">", &[val(9), val(6), val(2)], success(true)),
            test!(">", &[val(9), val(6), val(7)], success(false)),
            test!(">", &[val(5)], None),
            test!(">", &[val("a"), val(3)], None),
            test!(">=", &[val(7), val(7)], success(true)),
            test!("<", &[val(1), val(2), val(3)], success(true)),
            test!("<", &[val(1), val(3), val(2)], success(false)),
            test!("<", &[val(1), val(1.5)], success(true)),
            test!("<=", &[val(3), val(3)], success(true)),
            test!("=", &[val(12), val(12)], success(true)),
            test!("=", &[val(5), val(5.0)], success(true)),
            test!("=", &[val(9), val(9), val(4)], success(false)),
            test!("=", &all_fives, success(true)),
            test!("=", &mostly_fives, success(false)),
            test!("=", &[val(f64::NAN), val(f64::NAN)], success(false)),
            test!("<", &[val(NumberType::MIN), val(NumberType::MAX)], success(true)),
            // =================================================================
            // EQUALITY
            // =================================================================
            test!("eq?", &[sym("a"), sym("a")], success(true)),
            test!("eq?", &[val(2), val(2)], success(true)),
            test!("eq?", &[val(2), val(2.0)], success(false)),
            test!("eq?", &[val(""), val("")], success(false)),
            test!("eq?", &[nil(), nil()], success(true)),
            test!("eq?", &[val([1]), val([1])], success(false)),
            test!("eq?", &[int_list.clone(), int_list.clone()], success(true)),
            test!("eqv?", &[val("a"), val("a")], success(true)),
            test!("eqv?", &[val([1]), val([1])], success(true)),
            test!("eqv?", &[val(1), val(1.0)], success(false)),
            test!("equal?", &[val(2), val(2.0)], success(true)),
            test!("equal?", &[val([val(1), val("x")]), val([val(1.0), val("x")])], success(true)),
            test!("equal?", &[val(5), val("5")], success(false)),
            test!("equal?", &[val(0), val(false)], success(false)),
            test!("equal?", &[val(""), nil()], success(false)),
            test!("equal?", &[val(5)], None),
            test!("equal?", &[val(5), val(3), val(1)], None),
            // =================================================================
            // LOGIC AND PREDICATES
            // =================================================================
            test!("not", &[val(false)], success(true)),
            test!("not", &[val(true)], success(false)),
            test!("not", &[val(0)], success(false)),
            test!("not", &[nil()], success(false)),
            test!("not", &[], None),
            test!("not", &[val(true), val(false)], None),
            test!("list?", &[nil()], success(true)),
            test!("pair?", &[nil()], success(false)),
            test!("pair?", &[val([1])], success(true)),
            test!("null?", &[nil()], success(true)),
            test!("null?", &[val("")], success(false)),
            test!("null?", &[val(false)], success(false)),
            test!("boolean?", &[val(false)], success(true)),
            test!("integer?", &[val(1)], success(true)),
            test!("integer?", &[val(1.0)], success(false)),
            test!("number?", &[val(1.0)], success(true)),
            test!("number?", &[val("1")], success(false)),
            test!("string?", &[val("1")], success(true)),
            test!("symbol?", &[sym("x")], success(true)),
            test!("symbol?", &[val("x")], success(false)),
            test!("procedure?", &[val(1)], success(false)),
            test!("even?", &[val(0)], success(true)),
            test!("even?", &[val(-3)], success(false)),
            test!("odd?", &[val(-3)], success(true)),
            test!("odd?", &[val(2.0)], None),
            test!("positive?", &[val(0)], success(false)),
            test!("positive?", &[val(0.1)], success(true)),
            test!("negative?", &[val(-1)], success(true)),
            test!("zero?", &[val(0)], success(true)),
            test!("zero?", &[val(-0.0)], success(true)),
            test!("zero?", &[val([0])], None),
            // =================================================================
            // LISTS
            // =================================================================
            test!("car", &[val([1, 2, 3])], success(1)),
            test!("car", &[val([val([1]), val(2)])], success([1])),
            test!("car", &[], None),
            test!("car", &[int_list.clone(), int_list.clone()], None),
            test!("car", &[nil()], None),
            test!("car", &[val(42)], None),
            test!("cdr", &[val([1, 2, 3])], success([2, 3])),
            test!("cdr", &[val(["only"])], Some(nil())),
            test!("cdr", &[nil()], None),
            test!("cdr", &[val(true)], None),
            test!("car", std::slice::from_ref(&mixed), success(1)),
            test!("cdr", std::slice::from_ref(&mixed), success([val("hello"), val(true), nil()])),
            test!("cons", &[val(0), val([1, 2])], success([0, 1, 2])),
            test!("cons", &[val("first"), nil()], success(["first"])),
            test!("cons", &[val([1]), val([2])], success([val([1]), val(2)])),
            test!("cons", &[val(1)], None),
            test!("cons", &[val(1), val(2)], None),
            test!("cons", &[val(1), val("not a list")], None),
            test!("list", &[], Some(nil())),
            test!("list", &[val(1), val("hello"), val(true)], success([val(1), val("hello"), val(true)])),
            test!("length", &[int_list.clone()], success(3)),
            test!("length", &[nil()], success(0)),
            test!("length", &[val("héllo")], success(5)),
            test!("length", &[sym("abc")], None),
            test!("append", &[], Some(nil())),
            test!("append", &[val([1]), nil(), val([2, 3])], success([1, 2, 3])),
            test!("append", &[val([val([1])]), val([2])], success([val([1]), val(2)])),
            test!("append", &[val([1]), val(2)], None),
            // =================================================================
            // STRINGS, SEQUENCING, ERRORS
            // =================================================================
            test!("string-append", &[], success("")),
            test!("string-append", &[val("hello"), val(" "), val("world")], success("hello world")),
            test!("string-append", &[val("hello"), val(123)], None),
            test!("string-append", &[sym("a")], None),
            test!("begin", &[val(1), val(2)], success(2)),
            test!("begin", &[int_list], success([1, 2, 3])),
            test!("error", &[], None),
            test!("error", &[val("test error")], None),
            test!("error", &[val("Error:"), val("Something went wrong")], None),
            // =================================================================
            // HIGHER-ORDER WITH BUILTIN PROCEDURES
            // =================================================================
            test!("apply", &[builtin("+"), val([1, 2, 3])], success(6)),
            test!("apply", &[builtin("+"), val(1)], None),
            test!("map", &[builtin("abs"), val([-1, 2, -3])], success([1, 2, 3])),
            test!("map", &[builtin("abs"), nil()], Some(nil())),
            test!("map", &[builtin("abs"), val("abc")], None),
            test!("filter", &[builtin("even?"), val([1, 2, 3, 4])], success([2, 4])),
            test!("reduce", &[builtin("+"), val([1, 2, 3]), val(10)], success(16)),
            test!("reduce", &[builtin("-"), val([1, 2]), val(10)], success(7)),
            test!("reduce", &[builtin("+"), val([1, 2])], None),
            test!("map", &[val(1), val([1])], None),
        ];

        for (test_expr, result, expected) in test_cases {
            match (result, expected) {
                (Ok(actual), Some(expected_val)) => {
                    assert_eq!(actual, expected_val, "Failed for test case: {test_expr}");
                }
                (Err(_), None) => {} // Expected error
                (actual, expected) => panic!(
                    "Unexpected result for test case: {test_expr}\nGot: {actual:?}, Expected: {expected:?}"
                ),
            }
        }
    }

    #[test]
    fn test_error_message_construction() {
        type ErrorTest = (Vec<Value>, &'static str);
        let test_cases: Vec<ErrorTest> = vec![
            (vec![], "Error"),
            (vec![val("Simple message")], "Simple message"),
            (vec![val("Code:"), val(404), val("Not Found")], "Code: 404 Not Found"),
            (vec![val(true), val(4.5), sym("mixed"), nil()], "#t 4.5 mixed ()"),
        ];

        for (args, expected_msg) in test_cases {
            match call_builtin("error", &args).unwrap_err() {
                Error::BuiltinError(msg) => {
                    assert_eq!(msg, expected_msg, "Failed for args: {args:?}");
                }
                other => panic!("Expected BuiltinError for args: {args:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_error_kinds() {
        assert!(matches!(
            call_builtin("car", &[val(1)]),
            Err(Error::TypeError(msg)) if msg == "expected list, got integer"
        ));
        assert!(matches!(
            call_builtin("+", &[val(1), val(true)]),
            Err(Error::TypeError(msg)) if msg == "expected number, got boolean"
        ));
        assert!(matches!(
            call_builtin("not", &[]),
            Err(Error::ArityMismatch { expected: Arity::Exact(1), got: 0 })
        ));
        assert!(matches!(
            call_builtin("*", &[val(NumberType::MAX), val(2)]),
            Err(Error::BuiltinError(msg)) if msg == "Integer overflow in multiplication"
        ));
        assert!(matches!(
            call_builtin("quotient", &[val(1), val(0)]),
            Err(Error::BuiltinError(msg)) if msg == "division by zero"
        ));
    }

    #[test]
    fn test_display_writes_to_output() {
        let buffer = Rc::new(RefCell::new(Vec::<u8>::new()));
        let output: Output = buffer.clone();
        let ops = standard_library(&output);
        let call = |name: &str, args: Vec<Value>| {
            ops.iter()
                .find(|op| op.scheme_id == name)
                .unwrap()
                .call(args, Evaluator::default())
        };

        // display returns its argument; strings are written raw
        assert_eq!(call("display", vec![val("a \"b\"")]).unwrap(), val("a \"b\""));
        call("newline", vec![]).unwrap();
        call("display", vec![val([val(1), val(2.0), val("s")])]).unwrap();
        call("display", vec![val(false)]).unwrap();
        assert!(call("newline", vec![val(1)]).is_err());

        let written = String::from_utf8(buffer.borrow().clone()).unwrap();
        assert_eq!(written, "a \"b\"\n(1 2.0 \"s\")#f");
    }
}
