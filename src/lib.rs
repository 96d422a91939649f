//! scopelisp - a small tree-walking Lisp with lexical `let` scoping
//!
//! The interpreter is built around an environment chain: every scope kind
//! implements the [`environment::Env`] capability, resolves names locally
//! first and then delegates to exactly one enclosing environment, ending at
//! the [`environment::GlobalEnv`] root.
//!
//! ```scheme
//! (define a 1)
//! (let ((a 2) (b a))   ; b sees the outer a: bindings are parallel
//!   (list a b))        ; => (2 1)
//!
//! (defun area (w h) (* w h))
//! (defun area (s) (* s s))      ; merged as a second overload
//! (list (area 2 3) (area 4))    ; => (6 16)
//! ```
//!
//! Symbols may carry a declared slot kind (`n:int`, `flag:bool`, ...). The kind
//! selects a typed binding slot that rejects values of any other type on
//! `define`, `let` and `set!`.
//!
//! ## Modules
//!
//! - `scheme`: S-expression parsing from text
//! - `evaluator`: generic evaluation entry point and special forms
//! - `environment`: the environment capability, binding slots and the global root
//! - `scope`: `let` scopes, their constructors and the body evaluator
//! - `function`: overloadable function values
//! - `builtinops`: registry of primitives and special forms

/// Maximum parsing depth to prevent stack overflow attacks
pub const MAX_PARSE_DEPTH: usize = 32;

/// Maximum evaluation depth to prevent stack overflow in recursive evaluation
/// Set higher than parse depth to allow for nested function applications
pub const MAX_EVAL_DEPTH: usize = 64;

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("ParseError: {0}")]
    ParseError(String),
    #[error("EvaluationError: {0}")]
    EvalError(String),
    #[error("Type error: {0}")]
    TypeError(String),
    #[error("Unbound variable: {0}")]
    UnboundVariable(String),
    #[error("{}", format_arity(*expected, *got, expression.as_deref()))]
    ArityError {
        expected: usize,
        got: usize,
        expression: Option<String>, // Optional expression context
    },
    /// A special form received arguments of the wrong shape
    #[error("Malformed arguments: {0}")]
    MalformedArguments(String),
    /// A name was declared twice in the same scope
    #[error("Duplicate name: local name {0} already exists")]
    DuplicateName(String),
    /// A name is bound locally as a different kind of binding
    #[error("Kind conflict: {name} is defined as a {bound_as}")]
    KindConflict { name: String, bound_as: &'static str },
}

fn format_arity(expected: usize, got: usize, expression: Option<&str>) -> String {
    match expression {
        Some(expr) => {
            format!("ArityError: expression {expr}: expected {expected} arguments, got {got}")
        }
        None => format!("ArityError: function expected {expected} arguments but got {got}"),
    }
}

impl Error {
    /// Create an ArityError without expression context
    pub fn arity_error(expected: usize, got: usize) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: None,
        }
    }

    /// Create an ArityError with expression context
    pub fn arity_error_with_expr(expected: usize, got: usize, expression: String) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: Some(expression),
        }
    }
}

pub mod ast;
pub mod builtinops;
pub mod environment;
pub mod evaluator;
pub mod function;
pub mod scope;

#[cfg(feature = "scheme")]
pub mod scheme;
