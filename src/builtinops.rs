//! Built-in operations registry.
//!
//! Every primitive and special form is defined once here, with its Scheme
//! identifier and arity. The parser resolves applications of these names to
//! [`Value::PrecompiledOp`] nodes; the evaluator seeds the global environment
//! with the function entries so they can also be passed around as values.
//!
//! ```scheme
//! (not #t)           ; logical negation
//! (+ 1 2 3)          ; arithmetic
//! (equal? "a" "b")   ; equality test
//! ```
//!
//! ## Functions vs Special Forms
//!
//! - **Functions**: Evaluate all arguments before application (e.g., `+`, `not`, `car`)
//! - **Special Forms**: Control evaluation of arguments (e.g., `if`, `let`, `define`)
//!
//! ## Error Handling
//!
//! Operations are strict:
//!
//! - **Type Safety**: Operations reject incorrect types (e.g., `(not 42)` errors)
//! - **No Coercion**: Numbers don't become strings, no "truthiness" conversions
//! - **Overflow Detection**: Arithmetic operations detect and report overflow
//! - **Arity Checking**: Strict argument count validation for all functions

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use crate::Error;
use crate::ast::{BuiltinFn, NumberType, Value};
use crate::environment::EnvRef;
use crate::evaluator::{
    eval_and, eval_begin, eval_define, eval_defun, eval_if, eval_lambda, eval_let, eval_or,
    eval_quote, eval_set,
};

/// Signature of special forms: unevaluated arguments, the current
/// environment and the current evaluation depth
pub type SpecialFormFn = fn(&[Value], &EnvRef, usize) -> Result<Value, Error>;

/// Accepted argument counts of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly n arguments
    Exact(usize),
    /// At least n arguments
    AtLeast(usize),
    /// Any number of arguments
    Any,
}

impl Arity {
    pub(crate) fn validate(self, arg_count: usize) -> Result<(), Error> {
        match self {
            Arity::Exact(n) if arg_count != n => Err(Error::arity_error(n, arg_count)),
            Arity::AtLeast(n) if arg_count < n => Err(Error::arity_error(n, arg_count)),
            _ => Ok(()),
        }
    }
}

/// Represents the implementation of a built-in expression (function or special form)
#[derive(Clone, Copy)]
pub enum OpKind {
    /// Regular function that takes evaluated arguments
    Function(BuiltinFn),
    /// Special form that receives its arguments unevaluated
    SpecialForm(SpecialFormFn),
}

impl fmt::Debug for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::SpecialForm(_) => write!(f, "SpecialForm(<fn>)"),
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    /// The Scheme identifier for this operation
    pub scheme_id: &'static str,
    /// The implementation of this operation (function or special form)
    pub op_kind: OpKind,
    /// Expected number of arguments
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        // scheme_id uniquely identifies an operation
        self.scheme_id == other.scheme_id
    }
}

impl BuiltinOp {
    /// Check if this operation is a special form
    pub(crate) fn is_special_form(&self) -> bool {
        matches!(self.op_kind, OpKind::SpecialForm(_))
    }

    /// Check if the given number of arguments is valid for this operation
    pub(crate) fn validate_arity(&self, arg_count: usize) -> Result<(), Error> {
        self.arity.validate(arg_count)
    }
}

//
// Argument helpers
//

fn numbers(op: &str, args: &[Value]) -> Result<Vec<NumberType>, Error> {
    args.iter()
        .map(|arg| match arg {
            Value::Number(n) => Ok(*n),
            other => Err(Error::TypeError(format!(
                "{op} requires numbers, got {} {other}",
                other.type_name()
            ))),
        })
        .collect()
}

fn list_arg<'a>(op: &str, arg: &'a Value) -> Result<&'a [Value], Error> {
    match arg {
        Value::List(elements) => Ok(elements),
        other => Err(Error::TypeError(format!(
            "{op} requires a list, got {} {other}",
            other.type_name()
        ))),
    }
}

//
// Builtin Function Implementations
//

// Chained numeric comparisons: every adjacent pair must satisfy the operator
macro_rules! numeric_comparison {
    ($name:ident, $op:tt, $op_str:expr) => {
        fn $name(args: &[Value]) -> Result<Value, Error> {
            // At least two operands; a single one has no pair to compare
            Arity::AtLeast(2).validate(args.len())?;
            let nums = numbers($op_str, args)?;
            Ok(Value::Bool(nums.windows(2).all(|pair| pair[0] $op pair[1])))
        }
    };
}

numeric_comparison!(builtin_eq, ==, "=");
numeric_comparison!(builtin_lt, <, "<");
numeric_comparison!(builtin_gt, >, ">");
numeric_comparison!(builtin_le, <=, "<=");
numeric_comparison!(builtin_ge, >=, ">=");

fn builtin_add(args: &[Value]) -> Result<Value, Error> {
    let mut sum: NumberType = 0;
    for n in numbers("+", args)? {
        sum = sum
            .checked_add(n)
            .ok_or_else(|| Error::EvalError("Integer overflow in addition".into()))?;
    }
    Ok(Value::Number(sum))
}

fn builtin_sub(args: &[Value]) -> Result<Value, Error> {
    let nums = numbers("-", args)?;
    let result = match nums.as_slice() {
        [] => return Err(Error::arity_error(1, 0)),
        [only] => only
            .checked_neg()
            .ok_or_else(|| Error::EvalError("Integer overflow in negation".into()))?,
        [first, rest @ ..] => {
            let mut result = *first;
            for n in rest {
                result = result
                    .checked_sub(*n)
                    .ok_or_else(|| Error::EvalError("Integer overflow in subtraction".into()))?;
            }
            result
        }
    };
    Ok(Value::Number(result))
}

// At least one factor: there is no empty product
fn builtin_mul(args: &[Value]) -> Result<Value, Error> {
    Arity::AtLeast(1).validate(args.len())?;
    let mut product: NumberType = 1;
    for n in numbers("*", args)? {
        product = product
            .checked_mul(n)
            .ok_or_else(|| Error::EvalError("Integer overflow in multiplication".into()))?;
    }
    Ok(Value::Number(product))
}

fn builtin_max(args: &[Value]) -> Result<Value, Error> {
    Arity::AtLeast(1).validate(args.len())?;
    numbers("max", args)?
        .into_iter()
        .max()
        .map(Value::Number)
        .ok_or_else(|| Error::arity_error(1, 0))
}

fn builtin_min(args: &[Value]) -> Result<Value, Error> {
    Arity::AtLeast(1).validate(args.len())?;
    numbers("min", args)?
        .into_iter()
        .min()
        .map(Value::Number)
        .ok_or_else(|| Error::arity_error(1, 0))
}

fn builtin_car(args: &[Value]) -> Result<Value, Error> {
    match args {
        [list] => list_arg("car", list)?
            .first()
            .cloned()
            .ok_or_else(|| Error::EvalError("car of empty list".into())),
        _ => Err(Error::arity_error(1, args.len())),
    }
}

fn builtin_cdr(args: &[Value]) -> Result<Value, Error> {
    match args {
        [list] => match list_arg("cdr", list)? {
            [] => Err(Error::EvalError("cdr of empty list".into())),
            [_, rest @ ..] => Ok(Value::List(rest.to_vec())),
        },
        _ => Err(Error::arity_error(1, args.len())),
    }
}

fn builtin_cons(args: &[Value]) -> Result<Value, Error> {
    match args {
        [first, Value::List(tail)] => {
            let mut new_list = Vec::with_capacity(tail.len() + 1);
            new_list.push(first.clone());
            new_list.extend_from_slice(tail);
            Ok(Value::List(new_list))
        }
        // No improper lists
        [_, _] => Err(Error::TypeError(
            "cons requires a list as second argument".to_owned(),
        )),
        _ => Err(Error::arity_error(2, args.len())),
    }
}

fn builtin_list(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::List(args.to_vec()))
}

fn builtin_null(args: &[Value]) -> Result<Value, Error> {
    match args {
        [value] => Ok(Value::Bool(value.is_nil())),
        _ => Err(Error::arity_error(1, args.len())),
    }
}

fn builtin_not(args: &[Value]) -> Result<Value, Error> {
    match args {
        [Value::Bool(b)] => Ok(Value::Bool(!b)),
        [_] => Err(Error::TypeError(
            "not requires a boolean argument".to_owned(),
        )),
        _ => Err(Error::arity_error(1, args.len())),
    }
}

fn builtin_equal(args: &[Value]) -> Result<Value, Error> {
    match args {
        // Structural equality between values of the same comparable type
        [first, second] => match (first, second) {
            (Value::Bool(_), Value::Bool(_))
            | (Value::Number(_), Value::Number(_))
            | (Value::String(_), Value::String(_))
            | (Value::Symbol(_), Value::Symbol(_))
            | (Value::List(_), Value::List(_)) => Ok(Value::Bool(first == second)),
            _ => Err(Error::TypeError(format!(
                "equal? requires arguments of the same comparable type, got {} and {}",
                first.type_name(),
                second.type_name()
            ))),
        },
        _ => Err(Error::arity_error(2, args.len())),
    }
}

fn builtin_string_append(args: &[Value]) -> Result<Value, Error> {
    let mut result = String::new();
    for arg in args {
        match arg {
            Value::String(s) => result.push_str(s),
            other => {
                return Err(Error::TypeError(format!(
                    "string-append requires strings, got {} {other}",
                    other.type_name()
                )));
            }
        }
    }
    Ok(Value::String(result))
}

fn builtin_error(args: &[Value]) -> Result<Value, Error> {
    let parts: Vec<String> = args
        .iter()
        .map(|value| match value {
            Value::String(s) => s.clone(),
            _ => format!("{value}"),
        })
        .collect();

    let message = if parts.is_empty() {
        "Error".to_string()
    } else {
        parts.join(" ")
    };

    Err(Error::EvalError(message))
}

/// The quote form, which the parser also produces for `'x`
static QUOTE_OP: BuiltinOp = BuiltinOp {
    scheme_id: "quote",
    op_kind: OpKind::SpecialForm(eval_quote),
    arity: Arity::Exact(1),
};

/// Global registry of all other built-in operations
static BUILTIN_OPS: &[BuiltinOp] = &[
    // Arithmetic operations
    BuiltinOp {
        scheme_id: "+",
        op_kind: OpKind::Function(builtin_add),
        arity: Arity::Any,
    },
    BuiltinOp {
        scheme_id: "-",
        op_kind: OpKind::Function(builtin_sub),
        arity: Arity::AtLeast(1),
    },
    BuiltinOp {
        scheme_id: "*",
        op_kind: OpKind::Function(builtin_mul),
        arity: Arity::AtLeast(1),
    },
    // Comparison operations
    BuiltinOp {
        scheme_id: ">",
        op_kind: OpKind::Function(builtin_gt),
        arity: Arity::AtLeast(2),
    },
    BuiltinOp {
        scheme_id: ">=",
        op_kind: OpKind::Function(builtin_ge),
        arity: Arity::AtLeast(2),
    },
    BuiltinOp {
        scheme_id: "<",
        op_kind: OpKind::Function(builtin_lt),
        arity: Arity::AtLeast(2),
    },
    BuiltinOp {
        scheme_id: "<=",
        op_kind: OpKind::Function(builtin_le),
        arity: Arity::AtLeast(2),
    },
    BuiltinOp {
        scheme_id: "=",
        op_kind: OpKind::Function(builtin_eq),
        arity: Arity::AtLeast(2),
    },
    BuiltinOp {
        scheme_id: "equal?",
        op_kind: OpKind::Function(builtin_equal),
        arity: Arity::Exact(2),
    },
    // Logical operations
    BuiltinOp {
        scheme_id: "not",
        op_kind: OpKind::Function(builtin_not),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        scheme_id: "and",
        op_kind: OpKind::SpecialForm(eval_and),
        arity: Arity::AtLeast(1),
    },
    BuiltinOp {
        scheme_id: "or",
        op_kind: OpKind::SpecialForm(eval_or),
        arity: Arity::AtLeast(1),
    },
    // Control flow
    BuiltinOp {
        scheme_id: "if",
        op_kind: OpKind::SpecialForm(eval_if),
        arity: Arity::Exact(3),
    },
    BuiltinOp {
        scheme_id: "begin",
        op_kind: OpKind::SpecialForm(eval_begin),
        arity: Arity::Any,
    },
    // Binding forms
    BuiltinOp {
        scheme_id: "define",
        op_kind: OpKind::SpecialForm(eval_define),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        scheme_id: "set!",
        op_kind: OpKind::SpecialForm(eval_set),
        arity: Arity::Exact(2),
    },
    // Fixed-arity parameter lists only; duplicate parameter names are rejected
    BuiltinOp {
        scheme_id: "lambda",
        op_kind: OpKind::SpecialForm(eval_lambda),
        arity: Arity::AtLeast(2),
    },
    BuiltinOp {
        scheme_id: "defun",
        op_kind: OpKind::SpecialForm(eval_defun),
        arity: Arity::AtLeast(3),
    },
    // `(let)` must reach the form itself so it reports malformed arguments
    BuiltinOp {
        scheme_id: "let",
        op_kind: OpKind::SpecialForm(eval_let),
        arity: Arity::Any,
    },
    // List operations
    BuiltinOp {
        scheme_id: "car",
        op_kind: OpKind::Function(builtin_car),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        scheme_id: "cdr",
        op_kind: OpKind::Function(builtin_cdr),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        scheme_id: "cons",
        op_kind: OpKind::Function(builtin_cons),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        scheme_id: "list",
        op_kind: OpKind::Function(builtin_list),
        arity: Arity::Any,
    },
    BuiltinOp {
        scheme_id: "null?",
        op_kind: OpKind::Function(builtin_null),
        arity: Arity::Exact(1),
    },
    // String operations
    BuiltinOp {
        scheme_id: "string-append",
        op_kind: OpKind::Function(builtin_string_append),
        arity: Arity::Any,
    },
    // Math operations
    BuiltinOp {
        scheme_id: "max",
        op_kind: OpKind::Function(builtin_max),
        arity: Arity::AtLeast(1),
    },
    BuiltinOp {
        scheme_id: "min",
        op_kind: OpKind::Function(builtin_min),
        arity: Arity::AtLeast(1),
    },
    // Error handling
    BuiltinOp {
        scheme_id: "error",
        op_kind: OpKind::Function(builtin_error),
        arity: Arity::Any,
    },
];

/// Lazy static map from scheme_id to BuiltinOp (private - use find_scheme_op)
static BUILTIN_SCHEME: LazyLock<HashMap<&'static str, &'static BuiltinOp>> =
    LazyLock::new(|| get_builtin_ops().map(|op| (op.scheme_id, op)).collect());

/// All builtin operations, quote included
pub(crate) fn get_builtin_ops() -> impl Iterator<Item = &'static BuiltinOp> {
    std::iter::once(&QUOTE_OP).chain(BUILTIN_OPS.iter())
}

/// Find a builtin operation by its Scheme identifier
pub(crate) fn find_scheme_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_SCHEME.get(id).copied()
}

/// Get the quote builtin operation
#[cfg(feature = "scheme")]
pub(crate) fn get_quote_op() -> &'static BuiltinOp {
    &QUOTE_OP
}
