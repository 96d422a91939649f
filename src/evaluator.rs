use std::rc::Rc;

use crate::Error;
use crate::MAX_EVAL_DEPTH;
use crate::ast::{Atom, Value};
use crate::builtinops::{OpKind, get_builtin_ops};
use crate::environment::{EnvRef, GlobalEnv, Slot, annotate_type_error};
use crate::function::{Function, Functor};
use crate::scope::{eval_body_with_depth, let_task};

/// Evaluate an S-expression (public API)
pub fn eval(expr: &Value, env: &EnvRef) -> Result<Value, Error> {
    eval_with_depth_tracking(expr, env, 0)
}

/// Evaluate an S-expression with depth tracking to prevent stack overflow
pub(crate) fn eval_with_depth_tracking(
    expr: &Value,
    env: &EnvRef,
    depth: usize,
) -> Result<Value, Error> {
    if depth >= MAX_EVAL_DEPTH {
        return Err(Error::EvalError(format!(
            "Evaluation depth limit exceeded (max: {MAX_EVAL_DEPTH})"
        )));
    }
    match expr {
        // Self-evaluating forms (empty lists are NOT self-evaluating for strict semantics)
        Value::Number(_)
        | Value::String(_)
        | Value::Bool(_)
        | Value::BuiltinFunction { .. }
        | Value::Function(_)
        | Value::Unspecified => Ok(expr.clone()),

        Value::Symbol(atom) => env
            .lookup(&atom.name)
            .ok_or_else(|| Error::UnboundVariable(atom.name.clone())),

        // Builtins and special forms resolved by the parser; special form arity
        // was validated at parse time
        Value::PrecompiledOp { op, args, .. } => match &op.op_kind {
            OpKind::Function(f) => match env.lookup(op.scheme_id) {
                // A local variable or function shadows the builtin
                Some(shadow) if !is_builtin(&shadow, op.scheme_id) => {
                    let args = eval_args(args, env, depth + 1)?;
                    apply(&shadow, args, depth).map_err(|err| add_context(err, expr))
                }
                _ => {
                    if let Err(Error::ArityError { expected, got, .. }) =
                        op.validate_arity(args.len())
                    {
                        return Err(Error::arity_error_with_expr(expected, got, expr.to_string()));
                    }
                    let evaluated_args = eval_args(args, env, depth)?;
                    f(&evaluated_args)
                }
            },
            // Special forms receive their arguments unevaluated
            OpKind::SpecialForm(special_form) => special_form(args, env, depth),
        },

        Value::List(elements) => {
            eval_list(elements, env, depth).map_err(|err| add_context(err, expr))
        }
    }
}

/// Helper function to add expression context to errors
fn add_context(error: Error, expr: &Value) -> Error {
    let context = format!("while evaluating: {expr}");
    match error {
        Error::EvalError(msg) => Error::EvalError(format!("{msg}\n  Context: {context}")),
        Error::TypeError(msg) => Error::TypeError(format!("{msg}\n  Context: {context}")),
        // The remaining kinds carry their own context
        other => other,
    }
}

fn eval_args(args: &[Value], env: &EnvRef, depth: usize) -> Result<Vec<Value>, Error> {
    args.iter()
        .map(|arg| eval_with_depth_tracking(arg, env, depth + 1))
        .collect()
}

/// Evaluate a dynamic application. Unshadowed builtin applications never get
/// here; the parser resolved them to PrecompiledOps.
fn eval_list(elements: &[Value], env: &EnvRef, depth: usize) -> Result<Value, Error> {
    match elements {
        [] => Err(Error::EvalError("Cannot evaluate empty list".to_owned())),

        [func_expr, arg_exprs @ ..] => {
            let func = eval_with_depth_tracking(func_expr, env, depth + 1)?;
            let args = eval_args(arg_exprs, env, depth + 1)?;
            apply(&func, args, depth)
        }
    }
}

fn apply(func: &Value, args: Vec<Value>, depth: usize) -> Result<Value, Error> {
    match func {
        Value::BuiltinFunction { func, .. } => func(&args),
        Value::Function(function) => function.call(args, depth + 1),
        _ => Err(Error::TypeError(format!(
            "Cannot apply non-function: {func}"
        ))),
    }
}

fn is_builtin(value: &Value, scheme_id: &str) -> bool {
    matches!(value, Value::BuiltinFunction { id, .. } if id == scheme_id)
}

/// Evaluate quote special form
pub(crate) fn eval_quote(args: &[Value], _env: &EnvRef, _depth: usize) -> Result<Value, Error> {
    match args {
        [expr] => Ok(expr.clone()), // Quote content is already unoptimized during parsing
        _ => Err(Error::arity_error(1, args.len())),
    }
}

/// Evaluate define special form: declare a variable in the current environment
pub(crate) fn eval_define(args: &[Value], env: &EnvRef, depth: usize) -> Result<Value, Error> {
    match args {
        [Value::Symbol(atom), expr] => {
            let value = eval_with_depth_tracking(expr, env, depth + 1)?;
            let slot = Slot::with_value(atom.kind, value)
                .map_err(|err| annotate_type_error(err, &atom.name))?;
            env.defvar(&atom.name, slot)?;
            Ok(Value::Unspecified)
        }
        [_, _] => Err(Error::TypeError("define requires a symbol".to_owned())),
        _ => Err(Error::arity_error(2, args.len())),
    }
}

/// Evaluate set! special form: assign to the nearest enclosing variable
pub(crate) fn eval_set(args: &[Value], env: &EnvRef, depth: usize) -> Result<Value, Error> {
    match args {
        [Value::Symbol(atom), expr] => {
            let value = eval_with_depth_tracking(expr, env, depth + 1)?;
            env.setvar(&atom.name, value)?;
            Ok(Value::Unspecified)
        }
        [_, _] => Err(Error::TypeError("set! requires a symbol".to_owned())),
        _ => Err(Error::arity_error(2, args.len())),
    }
}

/// Evaluate if special form
pub(crate) fn eval_if(args: &[Value], env: &EnvRef, depth: usize) -> Result<Value, Error> {
    match args {
        [condition_expr, then_expr, else_expr] => {
            let condition = eval_with_depth_tracking(condition_expr, env, depth + 1)?;
            match condition {
                Value::Bool(true) => eval_with_depth_tracking(then_expr, env, depth + 1),
                Value::Bool(false) => eval_with_depth_tracking(else_expr, env, depth + 1),
                _ => Err(Error::TypeError(
                    "if condition must be a boolean".to_owned(),
                )),
            }
        }
        _ => Err(Error::arity_error(3, args.len())),
    }
}

/// Collect the parameter atoms of a lambda or defun
fn parse_params(params: &Value) -> Result<Vec<Atom>, Error> {
    let Value::List(params) = params else {
        return Err(Error::TypeError("Lambda parameters must be a list".to_owned()));
    };

    params
        .iter()
        .map(|param| match param {
            Value::Symbol(atom) => Ok(atom.clone()),
            _ => Err(Error::TypeError("Lambda parameters must be symbols".to_owned())),
        })
        .collect()
}

/// Evaluate lambda special form: `(lambda (params...) body...)`
pub(crate) fn eval_lambda(args: &[Value], env: &EnvRef, _depth: usize) -> Result<Value, Error> {
    match args {
        [params, body @ ..] if !body.is_empty() => {
            // Only fixed-arity parameter lists; (lambda args body) is rejected
            let functor = Functor::new(parse_params(params)?, body.to_vec())?;
            Ok(Value::Function(Rc::new(Function::new(
                "lambda",
                functor,
                Rc::clone(env),
            ))))
        }
        _ => Err(Error::arity_error(2, args.len())),
    }
}

/// Evaluate defun special form: `(defun name (params...) body...)`.
/// Defining an existing function again merges a new overload.
pub(crate) fn eval_defun(args: &[Value], env: &EnvRef, _depth: usize) -> Result<Value, Error> {
    match args {
        [Value::Symbol(name), params, body @ ..] if !body.is_empty() => {
            let functor = Functor::new(parse_params(params)?, body.to_vec())?;
            Rc::clone(env).defun(&name.name, functor)?;
            Ok(Value::Unspecified)
        }
        [_, _, _, ..] => Err(Error::TypeError("defun requires a symbol".to_owned())),
        _ => Err(Error::arity_error(3, args.len())),
    }
}

/// Evaluate begin special form: the body sequence in the current environment
pub(crate) fn eval_begin(args: &[Value], env: &EnvRef, depth: usize) -> Result<Value, Error> {
    eval_body_with_depth(args, env, depth)
}

/// Evaluate let special form: build a fresh scope and run the body in it
pub(crate) fn eval_let(args: &[Value], env: &EnvRef, depth: usize) -> Result<Value, Error> {
    let_task(args)?.run_with_depth(env, depth)
}

/// Check if a value is obviously non-boolean (before evaluation)
fn is_obviously_non_boolean(value: &Value) -> bool {
    match value {
        Value::Number(_) | Value::String(_) | Value::Unspecified => true,
        Value::Bool(_)
        | Value::List(_)
        | Value::PrecompiledOp { .. }
        | Value::Symbol(_)
        | Value::BuiltinFunction { .. }
        | Value::Function(_) => false, // could evaluate to a boolean
    }
}

macro_rules! boolean_logic_op {
    ($name:ident, $op_name:expr, $short_circuit:literal, $default:literal) => {
        pub(crate) fn $name(args: &[Value], env: &EnvRef, depth: usize) -> Result<Value, Error> {
            if args.is_empty() {
                return Err(Error::arity_error(1, 0));
            }

            // Reject literal non-booleans up front so short-circuiting can't hide them
            for arg in args.iter() {
                if is_obviously_non_boolean(arg) {
                    return Err(Error::TypeError(
                        concat!("'", $op_name, "' requires boolean arguments (no truthiness)")
                            .to_string(),
                    ));
                }
            }

            for arg in args.iter() {
                let result = eval_with_depth_tracking(arg, env, depth + 1)?;
                match result {
                    Value::Bool($short_circuit) => return Ok(Value::Bool($short_circuit)),
                    Value::Bool(_) => continue,
                    _ => {
                        return Err(Error::TypeError(
                            concat!("'", $op_name, "' requires boolean arguments (no truthiness)")
                                .to_string(),
                        ));
                    }
                }
            }

            Ok(Value::Bool($default))
        }
    };
}

boolean_logic_op!(eval_and, "and", false, true);
boolean_logic_op!(eval_or, "or", true, false);

/// Create a global environment with built-in functions
pub fn create_global_env() -> Rc<GlobalEnv> {
    let env = GlobalEnv::new();

    for builtin_op in get_builtin_ops() {
        if let OpKind::Function(func) = &builtin_op.op_kind {
            env.register_builtin_function(builtin_op.scheme_id, *func);
        }
    }

    Rc::new(env)
}
