use crate::Error;
use crate::MAX_EVAL_DEPTH;
use crate::ast::{Procedure, Value};
use crate::builtinops::{BuiltinOp, Output, standard_library};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace};

pub mod intooperation;

use intooperation::{IntoOperation, IntoVariadicOperation, OperationFn};
pub use intooperation::{ListIter, NumIter, StringIter, ValueIter};

/// Number of arguments a procedure accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    /// Inclusive bounds
    Range(usize, usize),
    Any,
}

impl Arity {
    /// Check an argument count against this arity
    pub fn validate(self, got: usize) -> Result<(), Error> {
        let ok = match self {
            Arity::Exact(n) => got == n,
            Arity::AtLeast(n) => got >= n,
            Arity::Range(lo, hi) => (lo..=hi).contains(&got),
            Arity::Any => true,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::ArityMismatch {
                expected: self,
                got,
            })
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "exactly {n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Range(lo, hi) => write!(f, "between {lo} and {hi}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

struct Frame {
    bindings: HashMap<String, Value>,
    parent: Option<Environment>,
}

/// Environment for variable bindings: a chain of frames, innermost first.
///
/// Cloning an `Environment` shares the frame. Closures hold their defining
/// environment this way, so later `define`s in that frame are visible to them
/// (which is what makes recursion through `define` work). A closure stored in
/// the frame it captures forms a reference cycle that is only reclaimed when the
/// process ends.
#[derive(Clone)]
pub struct Environment(Rc<RefCell<Frame>>);

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}

impl fmt::Debug for Environment {
    // Bindings may contain closures over this very frame, so only the shape is printed
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frame = self.0.borrow();
        let mut names: Vec<&String> = frame.bindings.keys().collect();
        names.sort();
        f.debug_struct("Environment")
            .field("bindings", &names)
            .field("has_parent", &frame.parent.is_some())
            .finish()
    }
}

impl Environment {
    /// An empty root frame
    pub fn new() -> Self {
        Environment(Rc::new(RefCell::new(Frame {
            bindings: HashMap::new(),
            parent: None,
        })))
    }

    /// An empty frame in front of `parent`
    pub fn with_parent(parent: &Environment) -> Self {
        Environment(Rc::new(RefCell::new(Frame {
            bindings: HashMap::new(),
            parent: Some(parent.clone()),
        })))
    }

    /// Bind `name` in this frame, replacing any previous binding here
    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.0.borrow_mut().bindings.insert(name.into(), value);
    }

    /// Look `name` up, innermost frame first
    pub fn get(&self, name: &str) -> Option<Value> {
        let mut current = self.clone();
        loop {
            let parent = {
                let frame = current.0.borrow();
                if let Some(value) = frame.bindings.get(name) {
                    return Some(value.clone());
                }
                frame.parent.clone()
            };
            current = parent?;
        }
    }

    /// Like [`Environment::get`], failing with `UnboundSymbol`
    pub fn lookup(&self, name: &str) -> Result<Value, Error> {
        self.get(name)
            .ok_or_else(|| Error::UnboundSymbol(name.to_owned()))
    }

    /// A new frame in front of this one binding `params` to `args` positionally
    pub fn extend(&self, params: &[String], args: Vec<Value>) -> Result<Environment, Error> {
        if params.len() != args.len() {
            return Err(Error::arity_error(params.len(), args.len()));
        }
        let frame = Environment::with_parent(self);
        {
            let mut inner = frame.0.borrow_mut();
            for (param, arg) in params.iter().zip(args) {
                inner.bindings.insert(param.clone(), arg);
            }
        }
        Ok(frame)
    }

    /// Whether both handles refer to the same frame
    pub fn ptr_eq(&self, other: &Environment) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn define_builtin(&self, op: BuiltinOp) {
        self.define(op.scheme_id.clone(), Value::BuiltinFunction(Rc::new(op)));
    }

    /// Register a custom builtin function working directly on the argument slice.
    ///
    /// This is the low-level API; it accepts any number of arguments. For most
    /// new code, prefer the typed [`Environment::register_builtin_operation`].
    ///
    /// # Example
    /// ```
    /// use schemer::evaluator::create_global_env;
    /// use schemer::ast::Value;
    /// use schemer::Error;
    ///
    /// fn arg_count(args: &[Value]) -> Result<Value, Error> {
    ///     Ok(Value::Integer(args.len() as i64))
    /// }
    ///
    /// let env = create_global_env();
    /// env.register_builtin_function("arg-count", arg_count);
    /// ```
    pub fn register_builtin_function(&self, name: &str, func: fn(&[Value]) -> Result<Value, Error>) {
        let wrapped: Rc<OperationFn> = Rc::new(move |args: Vec<Value>, _: Evaluator| func(&args));
        self.define_builtin(BuiltinOp::new(name, Arity::Any, wrapped));
    }

    /// Register a strongly-typed Rust function as a builtin operation using
    /// automatic argument extraction and result conversion.
    ///
    /// ```rust,ignore
    /// fn add(a: i64, b: i64) -> i64 { a + b }
    /// let env = schemer::evaluator::create_global_env();
    /// env.register_builtin_operation::<(i64, i64), _>("add", add);
    /// ```
    ///
    /// Supported parameter types:
    /// - `i64` (integer), `f64` (any number, widened), [`crate::ast::Number`]
    /// - `&str` (borrowed string contents)
    /// - `Value` (owned access to the raw value)
    /// - `ValueIter<'_>`, `NumIter<'_>`, `StringIter<'_>`, `ListIter<'_>` (elements of a list argument)
    ///
    /// Return types: anything `Into<Value>`, or `Result<T, Error>` of one.
    /// The arity is exactly the number of Rust parameters and is checked before the
    /// call; conversion failures are `TypeError`s.
    pub fn register_builtin_operation<Args, F>(&self, name: &str, func: F)
    where
        F: IntoOperation<Args>,
    {
        let arity = Arity::Exact(<F as IntoOperation<Args>>::ARITY);
        self.define_builtin(BuiltinOp::new(name, arity, func.into_operation()));
    }

    /// Register a variadic builtin operation with explicit arity metadata.
    ///
    /// The last Rust parameter is a rest iterator (`ValueIter<'_>`, `NumIter<'_>`,
    /// `StringIter<'_>` or `ListIter<'_>`), optionally after one or two fixed
    /// parameters. The provided [`Arity`] is validated against the total number
    /// of arguments at call time.
    pub fn register_variadic_builtin_operation<Args, F>(&self, name: &str, arity: Arity, func: F)
    where
        F: IntoVariadicOperation<Args>,
    {
        self.define_builtin(BuiltinOp::new(name, arity, func.into_variadic_operation()));
    }

    /// Get all bindings in this environment and its parents
    /// Returns a Vec of (name, value) pairs sorted by name
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut bindings = HashMap::new();
        let frame = self.0.borrow();

        // Start with parent bindings (so they can be overridden by local bindings)
        if let Some(parent) = &frame.parent {
            for (name, value) in parent.get_all_bindings() {
                bindings.insert(name, value);
            }
        }

        for (name, value) in &frame.bindings {
            bindings.insert(name.clone(), value.clone());
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

/// Evaluation context: how deep the current evaluation is and how deep it may go.
///
/// It is `Copy`; each nested evaluation works on a copy one level deeper, and
/// builtins receive the caller's copy so that procedures they apply are charged
/// against the same budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluator {
    depth: usize,
    max_depth: usize,
}

impl Default for Evaluator {
    fn default() -> Self {
        Evaluator::new(MAX_EVAL_DEPTH)
    }
}

type SpecialForm = fn(Evaluator, &[Value], &Environment) -> Result<Value, Error>;

/// Keywords recognised in head position before any environment lookup
const SPECIAL_FORMS: &[(&str, SpecialForm)] = &[
    ("quote", eval_quote),
    ("if", eval_if),
    ("define", eval_define),
    ("lambda", eval_lambda),
    ("exit", eval_exit),
];

fn find_special_form(name: &str) -> Option<SpecialForm> {
    SPECIAL_FORMS
        .iter()
        .find(|(keyword, _)| *keyword == name)
        .map(|(_, form)| *form)
}

impl Evaluator {
    pub fn new(max_depth: usize) -> Self {
        Evaluator {
            depth: 0,
            max_depth,
        }
    }

    fn descend(self) -> Result<Evaluator, Error> {
        if self.depth >= self.max_depth {
            return Err(Error::DepthLimitExceeded(self.max_depth));
        }
        Ok(Evaluator {
            depth: self.depth + 1,
            ..self
        })
    }

    /// Evaluate a form in `env`
    pub fn eval(self, form: &Value, env: &Environment) -> Result<Value, Error> {
        let inner = self.descend()?;
        match form {
            Value::Symbol(name) => env.lookup(name),
            Value::List(elements) => inner.eval_compound(elements, env),
            // Atoms and procedure values evaluate to themselves
            Value::Integer(_)
            | Value::Float(_)
            | Value::Bool(_)
            | Value::String(_)
            | Value::Procedure(_)
            | Value::BuiltinFunction(_)
            | Value::Unspecified => Ok(form.clone()),
        }
    }

    fn eval_compound(self, elements: &[Value], env: &Environment) -> Result<Value, Error> {
        let Some((head, arg_exprs)) = elements.split_first() else {
            return Err(Error::NotCallable("()".to_owned()));
        };

        if let Value::Symbol(name) = head
            && let Some(special_form) = find_special_form(name)
        {
            return special_form(self, arg_exprs, env);
        }

        let func = self.eval(head, env)?;
        let args = arg_exprs
            .iter()
            .map(|arg| self.eval(arg, env))
            .collect::<Result<Vec<_>, _>>()?;
        self.apply(&func, args)
    }

    /// Invoke a procedure value on already-evaluated arguments
    pub fn apply(self, func: &Value, args: Vec<Value>) -> Result<Value, Error> {
        match func {
            Value::BuiltinFunction(op) => op.call(args, self),
            Value::Procedure(procedure) => {
                trace!(params = ?procedure.params, args = args.len(), "applying procedure");
                let frame = procedure.env.extend(&procedure.params, args)?;
                self.eval(&procedure.body, &frame)
            }
            other => Err(Error::NotCallable(other.to_string())),
        }
    }
}

/// Evaluate a form with a fresh default [`Evaluator`]
pub fn eval(form: &Value, env: &Environment) -> Result<Value, Error> {
    Evaluator::default().eval(form, env)
}

fn eval_quote(_: Evaluator, args: &[Value], _: &Environment) -> Result<Value, Error> {
    match args {
        [form] => Ok(form.clone()),
        _ => Err(Error::malformed(
            "quote",
            format!("expected 1 operand, got {}", args.len()),
        )),
    }
}

fn eval_if(evaluator: Evaluator, args: &[Value], env: &Environment) -> Result<Value, Error> {
    match args {
        [test, consequent, alternative] => {
            let branch = if evaluator.eval(test, env)?.is_truthy() {
                consequent
            } else {
                alternative
            };
            evaluator.eval(branch, env)
        }
        _ => Err(Error::malformed(
            "if",
            format!("expected test, consequent and alternative, got {} operands", args.len()),
        )),
    }
}

fn eval_define(evaluator: Evaluator, args: &[Value], env: &Environment) -> Result<Value, Error> {
    match args {
        [Value::Symbol(name), expr] => {
            let value = evaluator.eval(expr, env)?;
            debug!(name = %name, "define");
            env.define(name.clone(), value.clone());
            Ok(value)
        }
        [other, _] => Err(Error::malformed(
            "define",
            format!("expected a symbol to bind, got {other}"),
        )),
        _ => Err(Error::malformed(
            "define",
            format!("expected a symbol and an expression, got {} operands", args.len()),
        )),
    }
}

fn eval_lambda(_: Evaluator, args: &[Value], env: &Environment) -> Result<Value, Error> {
    let [params, body] = args else {
        return Err(Error::malformed(
            "lambda",
            format!("expected a parameter list and one body, got {} operands", args.len()),
        ));
    };
    let Value::List(param_list) = params else {
        return Err(Error::malformed(
            "lambda",
            format!("parameters must be a list, got {params}"),
        ));
    };

    let mut names: Vec<String> = Vec::with_capacity(param_list.len());
    for param in param_list.iter() {
        match param {
            Value::Symbol(name) if names.contains(name) => {
                return Err(Error::malformed(
                    "lambda",
                    format!("duplicate parameter name: {name}"),
                ));
            }
            Value::Symbol(name) => names.push(name.clone()),
            other => {
                return Err(Error::malformed(
                    "lambda",
                    format!("parameters must be symbols, got {other}"),
                ));
            }
        }
    }

    Ok(Value::Procedure(Rc::new(Procedure {
        params: names,
        body: body.clone(),
        env: env.clone(),
    })))
}

fn eval_exit(evaluator: Evaluator, args: &[Value], env: &Environment) -> Result<Value, Error> {
    let code = match args {
        [] => 0,
        [expr] => match evaluator.eval(expr, env)? {
            Value::Integer(n) => i32::try_from(n)
                .map_err(|_| Error::BuiltinError(format!("exit code out of range: {n}")))?,
            other => {
                return Err(Error::TypeError(format!(
                    "exit code must be an integer, got {}",
                    other.type_name()
                )));
            }
        },
        _ => {
            return Err(Error::malformed(
                "exit",
                format!("expected at most 1 operand, got {}", args.len()),
            ));
        }
    };
    debug!(code, "exit requested");
    Err(Error::Exit(code))
}

/// Create a root environment holding the standard library, writing output to `output`
pub fn create_global_env_with_output(output: Output) -> Environment {
    let env = Environment::new();
    for op in standard_library(&output) {
        env.define_builtin(op);
    }
    env
}

/// Create a root environment holding the standard library, writing output to stdout
pub fn create_global_env() -> Environment {
    let stdout: Output = Rc::new(RefCell::new(std::io::stdout()));
    create_global_env_with_output(stdout)
}
