use crate::Error;
use crate::ast::{Number, Value};
use crate::evaluator::Evaluator;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::rc::Rc;

// NOTE: This module is internal plumbing for the evaluator.
// It defines the adapter layer that turns strongly-typed Rust
// functions into the erased `OperationFn` used at runtime.
//
// External users should interact with `Environment` and the
// registration APIs in `evaluator.rs`.

/// Canonical erased builtin function type used by the evaluator.
///
/// Builtins receive ownership of their argument vector, enabling
/// implementations that consume or rearrange arguments if desired.
/// The [`Evaluator`] is the caller's evaluation context; higher-order
/// builtins use it to apply procedures without resetting the depth
/// budget. Typed adapters ignore it.
pub type OperationFn = dyn Fn(Vec<Value>, Evaluator) -> Result<Value, Error>;

// =====================================================================
// Fixed-arity argument conversion
// =====================================================================

/// Core trait used by the fixed-arity adapters to turn `Value` nodes
/// into strongly-typed parameters.
///
/// The associated `Param<'a>` type is the parameter type as seen by
/// the builtin for a given lifetime of the local `Value` slots used
/// during argument conversion.
pub trait FromParam {
    type Param<'a>;

    /// Convert a single argument into this parameter type, either borrowing
    /// from it (`&str`, iterators) or moving it out (`Value`, numbers).
    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error>;
}

impl FromParam for Value {
    type Param<'a> = Value;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error> {
        Ok(std::mem::replace(value, Value::Unspecified))
    }
}

// Blanket implementation for by-value primitive parameters obtainable via
// `TryFrom<Value>` (see `ast.rs`): `i64`, `f64` and `Number`.
impl<T> FromParam for T
where
    Value: TryInto<T, Error = Error>,
{
    type Param<'a> = T;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error> {
        let owned = std::mem::replace(value, Value::Unspecified);
        <Value as TryInto<T>>::try_into(owned)
    }
}

impl FromParam for &str {
    type Param<'a> = &'a str;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error> {
        let value: &'a Value = value;
        if let Value::String(s) = value {
            Ok(&**s)
        } else {
            Err(Error::TypeError(format!(
                "expected string, got {}",
                value.type_name()
            )))
        }
    }
}

impl<'b, K> FromParam for TypedValueIter<'b, K>
where
    K: ValueElementKind,
{
    type Param<'a> = TypedValueIter<'a, K>;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error> {
        let value: &'a Value = value;
        if let Value::List(items) = value {
            TypedValueIter::<K>::new(&items[..])
        } else {
            Err(Error::TypeError(format!(
                "expected list, got {}",
                value.type_name()
            )))
        }
    }
}

// =====================================================================
// Generic typed iterator built on top of the standard slice iterator
// =====================================================================

/// Describes how to view a `Value` slice as a typed iterator.
/// Implementations validate the whole slice up front and then map
/// each `Value` to the element type.
#[doc(hidden)]
pub trait ValueElementKind {
    type Item<'a>;

    fn precheck(slice: &[Value]) -> Result<(), Error>;
    fn project<'a>(v: &'a Value) -> Self::Item<'a>;
}

/// Generic iterator over a list of `Value`s, parameterized by a
/// [`ValueElementKind`] that determines the element type and
/// validation.
#[doc(hidden)]
pub struct TypedValueIter<'a, K: ValueElementKind> {
    inner: std::slice::Iter<'a, Value>,
    _marker: PhantomData<K>,
}

impl<'a, K> TypedValueIter<'a, K>
where
    K: ValueElementKind,
{
    pub(crate) fn new(values: &'a [Value]) -> Result<Self, Error> {
        K::precheck(values)?;
        Ok(TypedValueIter {
            inner: values.iter(),
            _marker: PhantomData,
        })
    }

    /// The unconsumed elements
    pub(crate) fn as_slice(&self) -> &'a [Value] {
        self.inner.as_slice()
    }
}

impl<'a, K> Iterator for TypedValueIter<'a, K>
where
    K: ValueElementKind,
{
    type Item = K::Item<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let v = self.inner.next()?;
        Some(K::project(v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<'a, K> ExactSizeIterator for TypedValueIter<'a, K> where K: ValueElementKind {}
impl<'a, K> FusedIterator for TypedValueIter<'a, K> where K: ValueElementKind {}

fn check_all(slice: &[Value], expected: &str, ok: impl Fn(&Value) -> bool) -> Result<(), Error> {
    match slice.iter().find(|v| !ok(v)) {
        Some(bad) => Err(Error::TypeError(format!(
            "expected {expected}, got {}",
            bad.type_name()
        ))),
        None => Ok(()),
    }
}

#[doc(hidden)]
pub struct ValueKind;

impl ValueElementKind for ValueKind {
    type Item<'a> = &'a Value;

    fn precheck(_slice: &[Value]) -> Result<(), Error> {
        Ok(())
    }

    fn project<'a>(v: &'a Value) -> Self::Item<'a> {
        v
    }
}

#[doc(hidden)]
pub struct NumberKind;

impl ValueElementKind for NumberKind {
    type Item<'a> = Number;

    fn precheck(slice: &[Value]) -> Result<(), Error> {
        check_all(slice, "number", |v| v.as_number().is_some())
    }

    fn project<'a>(v: &'a Value) -> Self::Item<'a> {
        match v.as_number() {
            Some(n) => n,
            None => {
                debug_assert!(false, "NumberKind::project saw non-number after precheck");
                unreachable!("NumberKind invariant violated")
            }
        }
    }
}

#[doc(hidden)]
pub struct StringKind;

impl ValueElementKind for StringKind {
    type Item<'a> = &'a str;

    fn precheck(slice: &[Value]) -> Result<(), Error> {
        check_all(slice, "string", |v| matches!(v, Value::String(_)))
    }

    fn project<'a>(v: &'a Value) -> Self::Item<'a> {
        if let Value::String(s) = v {
            &**s
        } else {
            debug_assert!(false, "StringKind::project saw non-string after precheck");
            unreachable!("StringKind invariant violated")
        }
    }
}

#[doc(hidden)]
pub struct ListKind;

impl ValueElementKind for ListKind {
    type Item<'a> = &'a [Value];

    fn precheck(slice: &[Value]) -> Result<(), Error> {
        check_all(slice, "list", |v| matches!(v, Value::List(_)))
    }

    fn project<'a>(v: &'a Value) -> Self::Item<'a> {
        if let Value::List(items) = v {
            &items[..]
        } else {
            debug_assert!(false, "ListKind::project saw non-list after precheck");
            unreachable!("ListKind invariant violated")
        }
    }
}

/// Borrowed iterator over a sequence of `Value` references.
pub type ValueIter<'a> = TypedValueIter<'a, ValueKind>;

/// Borrowed iterator over numeric arguments, narrowed to [`Number`].
pub type NumIter<'a> = TypedValueIter<'a, NumberKind>;

/// Borrowed iterator over string arguments, narrowed to `&str`.
pub type StringIter<'a> = TypedValueIter<'a, StringKind>;

/// Borrowed iterator over list arguments, narrowed to element slices.
pub type ListIter<'a> = TypedValueIter<'a, ListKind>;

// =====================================================================
// Rest-parameter support for variadic operations
// =====================================================================

/// Core trait used to construct rest-parameter values from a slice of
/// arguments.
pub trait FromRest {
    type Param<'a>;

    fn from_rest<'a>(slice: &'a [Value]) -> Result<Self::Param<'a>, Error>;
}

impl<K> FromRest for TypedValueIter<'static, K>
where
    K: ValueElementKind,
{
    type Param<'a> = TypedValueIter<'a, K>;

    fn from_rest<'a>(slice: &'a [Value]) -> Result<Self::Param<'a>, Error> {
        TypedValueIter::<K>::new(slice)
    }
}

// =====================================================================
// Return-type adaptation for builtin functions
// =====================================================================

/// Normalizes builtin return types to the canonical `Result<Value, Error>`.
pub trait IntoValueResult {
    fn into_value_result(self) -> Result<Value, Error>;
}

impl<T> IntoValueResult for Result<T, Error>
where
    T: Into<Value>,
{
    fn into_value_result(self) -> Result<Value, Error> {
        self.map(Into::into)
    }
}

impl<T> IntoValueResult for T
where
    T: Into<Value>,
{
    fn into_value_result(self) -> Result<Value, Error> {
        Ok(self.into())
    }
}

/// Converts strongly-typed Rust functions or closures into the erased
/// [`OperationFn`], parameterized by an argument tuple type.
pub trait IntoOperation<Args> {
    /// Number of Rust parameters, i.e. the exact arity of the builtin
    const ARITY: usize;

    fn into_operation(self) -> Rc<OperationFn>;
}

/// Converts functions whose last parameter is a rest iterator
/// (`ValueIter<'a>`, `NumIter<'a>`, `StringIter<'a>` or `ListIter<'a>`),
/// optionally after a fixed prefix of `FromParam` parameters.
pub trait IntoVariadicOperation<Args> {
    fn into_variadic_operation(self) -> Rc<OperationFn>;
}

// =====================================================================
// Variadic adapters using iterator-based rest parameters
// =====================================================================

impl<F, I, R> IntoVariadicOperation<(I,)> for F
where
    I: FromRest,
    F: for<'a> Fn(<I as FromRest>::Param<'a>) -> R + 'static,
    R: IntoValueResult,
{
    fn into_variadic_operation(self) -> Rc<OperationFn> {
        Rc::new(move |args: Vec<Value>, _: Evaluator| {
            let rest_param: <I as FromRest>::Param<'_> = <I as FromRest>::from_rest(&args[..])?;
            let result: R = (self)(rest_param);
            result.into_value_result()
        })
    }
}

/// Implements `IntoVariadicOperation` for a fixed prefix of `FromParam`
/// parameters followed by a single rest parameter.
macro_rules! impl_into_variadic_operation_for_prefix_and_rest {
    ($prefix:expr, $( $v:ident, $p:ident : $A:ident ),+ ) => {
        impl<F, I, R, $( $A ),+> IntoVariadicOperation<( $( $A, )+ I, )> for F
        where
            I: FromRest,
            $( $A: FromParam, )+
            F: for<'a> Fn(
                    $( <$A as FromParam>::Param<'a> ),+,
                    <I as FromRest>::Param<'a>,
                ) -> R
                + 'static,
            R: IntoValueResult,
        {
            fn into_variadic_operation(self) -> Rc<OperationFn> {
                Rc::new(move |mut args: Vec<Value>, _: Evaluator| {
                    let len = args.len();
                    match args.as_mut_slice() {
                        &mut [ $( ref mut $v ),+, ref mut rest @ .. ] => {
                            $(
                                let $p: <$A as FromParam>::Param<'_> =
                                    <$A as FromParam>::from_arg($v)?;
                            )+

                            let rest_param: <I as FromRest>::Param<'_> =
                                <I as FromRest>::from_rest(&*rest)?;

                            let result: R = (self)( $( $p ),+, rest_param );
                            result.into_value_result()
                        }
                        _ => Err(Error::ArityMismatch {
                            expected: crate::evaluator::Arity::AtLeast($prefix),
                            got: len,
                        }),
                    }
                })
            }
        }
    };
}

impl_into_variadic_operation_for_prefix_and_rest!(1, v0, p0: A1);
impl_into_variadic_operation_for_prefix_and_rest!(2, v0, p0: A1, v1, p1: A2);

// =====================================================================
// Fixed-arity adapters
// =====================================================================

/// Implements `IntoOperation` for functions of various arities.
///
/// Performs arity checking up front, then destructures the owned
/// `Vec<Value>` into local `Value` slots so that `FromParam` can either
/// borrow from or consume each argument before invoking the builtin.
macro_rules! impl_into_operation_for_arity {
    ($arity:expr, $( $v:ident, $p:ident : $A:ident ),+ ) => {
        impl<F, R, $( $A ),+> IntoOperation<( $( $A, )+ )> for F
        where
            F: for<'a> Fn( $( <$A as FromParam>::Param<'a> ),+ ) -> R + 'static,
            $( $A: FromParam, )+
            R: IntoValueResult,
        {
            const ARITY: usize = $arity;

            fn into_operation(self) -> Rc<OperationFn> {
                Rc::new(move |mut args: Vec<Value>, _: Evaluator| {
                    let len = args.len();
                    match args.as_mut_slice() {
                        &mut [ $( ref mut $v ),+ ] => {
                            $(
                                let $p: <$A as FromParam>::Param<'_> =
                                    <$A as FromParam>::from_arg($v)?;
                            )+

                            let result: R = (self)( $( $p ),+ );
                            result.into_value_result()
                        }
                        _ => Err(Error::arity_error($arity, len)),
                    }
                })
            }
        }
    };
}

// 0-arg functions / closures
impl<F, R> IntoOperation<()> for F
where
    F: Fn() -> R + 'static,
    R: IntoValueResult,
{
    const ARITY: usize = 0;

    fn into_operation(self) -> Rc<OperationFn> {
        Rc::new(move |args: Vec<Value>, _: Evaluator| {
            if !args.is_empty() {
                return Err(Error::arity_error(0, args.len()));
            }

            let result: R = (self)();
            result.into_value_result()
        })
    }
}

impl_into_operation_for_arity!(1, v0, p0: A1);
impl_into_operation_for_arity!(2, v0, p0: A1, v1, p1: A2);
impl_into_operation_for_arity!(3, v0, p0: A1, v1, p1: A2, v2, p2: A3);
