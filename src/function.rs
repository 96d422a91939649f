//! Overloadable function values.
//!
//! A [`Function`] is a named set of [`Functor`]s closed over the environment it
//! was defined in. `defun` on an existing function merges a new functor into
//! that set instead of replacing it; calls pick the functor whose parameter
//! count matches the argument count.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::Error;
use crate::ast::{Atom, Value};
use crate::environment::{Env, EnvRef, Slot, annotate_type_error};
use crate::scope::Scope;

/// One implementation: parameter atoms and a body sequence
#[derive(Debug, Clone, PartialEq)]
pub struct Functor {
    params: Vec<Atom>,
    body: Vec<Value>,
}

impl Functor {
    /// Fails if two parameters share a name
    pub fn new(params: Vec<Atom>, body: Vec<Value>) -> Result<Self, Error> {
        for (i, param) in params.iter().enumerate() {
            if params[..i].iter().any(|earlier| earlier.name == param.name) {
                return Err(Error::DuplicateName(param.name.clone()));
            }
        }
        Ok(Functor { params, body })
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

pub struct Function {
    name: String,
    overloads: RefCell<Vec<Functor>>,
    env: EnvRef,
}

impl Function {
    pub fn new(name: &str, functor: Functor, env: EnvRef) -> Self {
        Function {
            name: name.to_owned(),
            overloads: RefCell::new(vec![functor]),
            env,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameter counts of every overload, in definition order
    pub fn arities(&self) -> Vec<usize> {
        self.overloads.borrow().iter().map(Functor::arity).collect()
    }

    /// Merge an additional implementation. An overload never replaces an
    /// existing one, so a second functor of the same arity is rejected.
    pub fn overload(&self, functor: Functor) -> Result<(), Error> {
        let mut overloads = self.overloads.borrow_mut();
        if overloads.iter().any(|f| f.arity() == functor.arity()) {
            return Err(Error::EvalError(format!(
                "function {} already has an overload taking {} arguments",
                self.name,
                functor.arity()
            )));
        }
        overloads.push(functor);
        Ok(())
    }

    fn select(&self, argc: usize) -> Result<Functor, Error> {
        let overloads = self.overloads.borrow();
        if let Some(functor) = overloads.iter().find(|f| f.arity() == argc) {
            return Ok(functor.clone());
        }
        match overloads.as_slice() {
            [only] => Err(Error::arity_error(only.arity(), argc)),
            _ => Err(Error::EvalError(format!(
                "no overload of {} takes {argc} arguments (available: {:?})",
                self.name,
                overloads.iter().map(Functor::arity).collect::<Vec<_>>()
            ))),
        }
    }

    /// Apply to already evaluated arguments.
    ///
    /// The body runs in a fresh scope holding the parameters, whose enclosing
    /// environment is the one the function was defined in.
    pub(crate) fn call(&self, args: Vec<Value>, depth: usize) -> Result<Value, Error> {
        let functor = self.select(args.len())?;
        tracing::trace!(name = %self.name, arity = functor.arity(), "calling function");

        let scope = Scope::new(functor.body.clone());
        for (param, arg) in functor.params.iter().zip(args) {
            let slot =
                Slot::with_value(param.kind, arg).map_err(|err| annotate_type_error(err, &param.name))?;
            scope.defvar(&param.name, slot)?;
        }

        Rc::new(scope)
            .eval_with_depth(Rc::clone(&self.env), depth)
            .map_err(|err| match err {
                Error::EvalError(msg) => {
                    Error::EvalError(format!("{msg}\n  In function: {}", self.name))
                }
                Error::TypeError(msg) => {
                    Error::TypeError(format!("{msg}\n  In function: {}", self.name))
                }
                other => other,
            })
    }
}

impl fmt::Debug for Function {
    // The closed-over environment is left out: it may hold this function
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("arities", &self.arities())
            .finish_non_exhaustive()
    }
}
