//! Schemer - a minimal Scheme-subset evaluator
//!
//! This crate reads parenthesized Scheme programs, represents them as a tree of
//! [`ast::Value`] forms and evaluates those forms against a chained lexical environment
//! with first-class closures.
//!
//! ```scheme
//! (begin
//!   (define make-adder (lambda (n) (lambda (x) (+ x n))))
//!   ((make-adder 5) 3))            ; => 8
//! (/ 5 2)                          ; => 2.5
//! (display "(+ 1 (2))")            ; strings are never re-tokenized
//! ```
//!
//! ## Semantics
//!
//! - Only `#f` is false; `0`, `""` and `'()` are all true.
//! - Integers stay integral until a float operand is involved; `/` always yields a float.
//! - Lists are flat ordered sequences. There are no dotted pairs.
//! - `lambda` captures the defining environment by reference, so closures see later
//!   definitions in that environment (recursion through `define` works).
//! - Every built-in declares its arity and is checked before it runs.
//!
//! ## Modules
//!
//! - `scheme`: tokenizer and reader producing forms from text
//! - `ast`: the value model shared by forms and runtime results
//! - `evaluator`: environments, special forms and procedure application
//! - `builtinops`: the standard library registry
//! - `interpreter`: a session owning the root environment and output sink

use crate::evaluator::Arity;

/// Maximum reader nesting depth; deeper input is rejected instead of exhausting the stack
pub const MAX_PARSE_DEPTH: usize = 128;

/// Maximum evaluation depth (nested `eval` calls, including procedure bodies).
///
/// A non-tail procedure call costs about three levels: the call form, the body, and the
/// argument or branch holding the next call. The default therefore allows roughly 170
/// levels of Scheme recursion, which stays well inside a 2 MB thread stack in debug builds.
pub const MAX_EVAL_DEPTH: usize = 512;

/// Session limits. Defaults come from [`MAX_PARSE_DEPTH`] and [`MAX_EVAL_DEPTH`].
///
/// `max_eval_depth` counts `eval` calls, not Scheme procedure calls; budget about three
/// per level of recursion. Raising it far past the default needs a larger thread stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub max_parse_depth: usize,
    pub max_eval_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_parse_depth: MAX_PARSE_DEPTH,
            max_eval_depth: MAX_EVAL_DEPTH,
        }
    }
}

/// Categorizes the different kinds of reader failures.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ParseErrorKind {
    /// Tokens ran out while a form was still expected (unclosed `(` or `"`, empty input)
    UnexpectedEof,
    /// A `)` appeared where a form was expected
    UnexpectedCloseParen,
    /// Malformed literal content, such as an unknown string escape
    InvalidSyntax,
    /// Nesting exceeded the configured parse depth
    TooDeeplyNested,
    /// Extra input after a complete form where exactly one form was requested
    TrailingContent,
}

/// A structured error describing a reader failure.
#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// The offending token, if one was identified
    pub found: Option<String>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, message: impl Into<String>, found: Option<String>) -> Self {
        ParseError {
            kind,
            message: message.into(),
            found,
        }
    }
}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Source bytes could not be decoded as text
    #[error("LexError: {0}")]
    LexError(String),
    #[error("ParseError: {0}")]
    ParseError(#[from] ParseError),
    #[error("Unbound symbol: {0}")]
    UnboundSymbol(String),
    #[error("MalformedSpecialForm: {form}: {message}")]
    MalformedSpecialForm { form: &'static str, message: String },
    #[error("ArityMismatch: expected {expected} arguments, got {got}")]
    ArityMismatch { expected: Arity, got: usize },
    #[error("NotCallable: {0}")]
    NotCallable(String),
    /// A built-in received an argument of the wrong type
    #[error("Type error: {0}")]
    TypeError(String),
    /// Any other failure raised inside a built-in, including `(error ...)`
    #[error("Error: {0}")]
    BuiltinError(String),
    #[error("Evaluation depth limit exceeded (max: {0})")]
    DepthLimitExceeded(usize),
    /// `(exit)` was evaluated; the session owner decides how to terminate
    #[error("exit requested with code {0}")]
    Exit(i32),
}

impl Error {
    /// Create an ArityMismatch for a fixed number of expected arguments
    pub fn arity_error(expected: usize, got: usize) -> Self {
        Error::ArityMismatch {
            expected: Arity::Exact(expected),
            got,
        }
    }

    pub(crate) fn malformed(form: &'static str, message: impl Into<String>) -> Self {
        Error::MalformedSpecialForm {
            form,
            message: message.into(),
        }
    }

    pub(crate) fn parse(kind: ParseErrorKind, message: impl Into<String>, found: Option<String>) -> Self {
        Error::ParseError(ParseError::new(kind, message, found))
    }
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod interpreter;
pub mod scheme;

pub use interpreter::Interpreter;
