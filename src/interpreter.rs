//! An interpreter session: one root environment, one output sink, one set of limits.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use tracing::debug;

use crate::ast::Value;
use crate::builtinops::Output;
use crate::evaluator::{Environment, Evaluator, create_global_env_with_output};
use crate::scheme::{Reader, parse_program_with_config, tokenize_bytes};
use crate::{Config, Error};

/// Owns the global environment for a sequence of evaluations.
///
/// Definitions made by one call are visible to the next:
///
/// ```
/// use schemer::Interpreter;
/// use schemer::ast::val;
///
/// let mut interpreter = Interpreter::new();
/// interpreter.eval_str("(define square (lambda (x) (* x x)))").unwrap();
/// assert_eq!(interpreter.eval_str("(square 12)").unwrap(), val(144));
/// ```
pub struct Interpreter {
    env: Environment,
    evaluator: Evaluator,
    config: Config,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Interpreter {
    /// Default limits, `display` writing to stdout
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let stdout: Output = Rc::new(RefCell::new(io::stdout()));
        Self::with_output(config, stdout)
    }

    /// `display` and `newline` write to `output` instead of stdout
    pub fn with_output(config: Config, output: Output) -> Self {
        Interpreter {
            env: create_global_env_with_output(output),
            evaluator: Evaluator::new(config.max_eval_depth),
            config,
        }
    }

    /// The root environment, for host registrations and introspection
    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Evaluate an already-read form in the root environment
    pub fn eval(&mut self, form: &Value) -> Result<Value, Error> {
        self.evaluator.eval(form, &self.env)
    }

    /// Read and evaluate every top-level form, returning the last value.
    ///
    /// Evaluation stops at the first error; definitions made before it are kept.
    /// A program with no forms evaluates to the unspecified value.
    pub fn eval_str(&mut self, source: &str) -> Result<Value, Error> {
        let forms = parse_program_with_config(source, &self.config)?;
        debug!(forms = forms.len(), "evaluating program");
        self.eval_forms(&forms)
    }

    /// Like [`Interpreter::eval_str`], for raw bytes that must be valid UTF-8
    pub fn run(&mut self, source: &[u8]) -> Result<Value, Error> {
        let forms = Reader::with_max_depth(tokenize_bytes(source)?, self.config.max_parse_depth)
            .read_all()?;
        debug!(forms = forms.len(), "running program");
        self.eval_forms(&forms)
    }

    fn eval_forms(&mut self, forms: &[Value]) -> Result<Value, Error> {
        let mut last = Value::Unspecified;
        for form in forms {
            last = self.eval(form)?;
        }
        Ok(last)
    }
}
