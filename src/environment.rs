//! The environment capability and its root implementation.
//!
//! Every scope kind implements [`Env`]: names resolve in the local frame first
//! and then through exactly one enclosing environment. [`GlobalEnv`] is the
//! root of every chain; [`crate::scope::Scope`] is the nested `let` scope.
//!
//! A local entry is a [`Binding`]: either a typed variable [`Slot`] or an
//! overloadable [`Function`]. Kind conflicts between the two are exhaustive
//! matches on that enum.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

pub use crate::ast::SlotKind;
use crate::Error;
use crate::ast::{BuiltinFn, Value};
use crate::function::{Function, Functor};

/// Shared handle to any environment in a chain
pub type EnvRef = Rc<dyn Env>;

/// Name resolution and mutation contract shared by every scope kind.
///
/// Lookups return `None` when no environment in the chain binds the name;
/// callers decide whether that is an error.
pub trait Env: fmt::Debug {
    /// Resolve `name` locally, then through the enclosing environment
    fn lookup(&self, name: &str) -> Option<Value>;

    /// Resolve `name` in this environment's own frame only
    fn local(&self, name: &str) -> Option<Value>;

    /// Resolve `name` starting at the enclosing environment, skipping the local frame
    fn global(&self, name: &str) -> Option<Value>;

    /// Declare a variable. Fails if `name` is already bound locally.
    fn defvar(&self, name: &str, slot: Slot) -> Result<(), Error>;

    /// Declare a function, or merge `functor` into an existing local function
    /// of the same name as an additional overload.
    fn defun(self: Rc<Self>, name: &str, functor: Functor) -> Result<(), Error>;

    /// Assign to the nearest variable named `name` along the chain
    fn setvar(&self, name: &str, value: Value) -> Result<(), Error>;
}

/// A mutable, type-tagged cell holding one variable's current value
#[derive(Debug, Clone)]
pub struct Slot {
    kind: SlotKind,
    value: Value,
}

impl Slot {
    /// Create a slot of `kind` holding `value`
    pub fn with_value(kind: SlotKind, value: Value) -> Result<Self, Error> {
        let mut slot = Slot {
            kind,
            value: Value::Unspecified,
        };
        slot.set(value)?;
        Ok(slot)
    }

    pub fn kind(&self) -> SlotKind {
        self.kind
    }

    pub fn get(&self) -> Value {
        self.value.clone()
    }

    /// Replace the current value. Typed slots reject values of another type.
    pub fn set(&mut self, value: Value) -> Result<(), Error> {
        if !self.kind.admits(&value) {
            return Err(Error::TypeError(format!(
                "cannot store {} value {value} in a slot of kind {}",
                value.type_name(),
                self.kind
            )));
        }
        self.value = value;
        Ok(())
    }
}

/// One local entry: a variable slot or a function
#[derive(Debug, Clone)]
pub enum Binding {
    Var(Slot),
    Func(Rc<Function>),
}

impl Binding {
    fn value(&self) -> Value {
        match self {
            Binding::Var(slot) => slot.get(),
            Binding::Func(function) => Value::Function(Rc::clone(function)),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Binding::Var(_) => "variable",
            Binding::Func(_) => "function",
        }
    }
}

/// Local name mapping owned by a single environment
#[derive(Default)]
pub(crate) struct Frame {
    bindings: RefCell<HashMap<String, Binding>>,
}

impl Frame {
    pub(crate) fn get(&self, name: &str) -> Option<Value> {
        self.bindings.borrow().get(name).map(Binding::value)
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.bindings.borrow().contains_key(name)
    }

    pub(crate) fn defvar(&self, name: &str, slot: Slot) -> Result<(), Error> {
        let mut bindings = self.bindings.borrow_mut();
        if bindings.contains_key(name) {
            return Err(Error::DuplicateName(name.to_owned()));
        }
        tracing::trace!(name, kind = %slot.kind(), "defvar");
        bindings.insert(name.to_owned(), Binding::Var(slot));
        Ok(())
    }

    /// `home` is the environment a newly created function closes over
    pub(crate) fn defun(&self, name: &str, functor: Functor, home: EnvRef) -> Result<(), Error> {
        let mut bindings = self.bindings.borrow_mut();
        match bindings.get(name) {
            Some(Binding::Func(function)) => {
                tracing::trace!(name, arity = functor.arity(), "merging overload");
                function.overload(functor)
            }
            Some(var @ Binding::Var(_)) => Err(Error::KindConflict {
                name: name.to_owned(),
                bound_as: var.kind_name(),
            }),
            None => {
                tracing::trace!(name, arity = functor.arity(), "defun");
                let function = Function::new(name, functor, home);
                bindings.insert(name.to_owned(), Binding::Func(Rc::new(function)));
                Ok(())
            }
        }
    }

    /// Assign to a local variable. The caller checks `contains` first.
    pub(crate) fn set(&self, name: &str, value: Value) -> Result<(), Error> {
        match self.bindings.borrow_mut().get_mut(name) {
            Some(Binding::Var(slot)) => slot
                .set(value)
                .map_err(|err| annotate_type_error(err, name)),
            Some(func @ Binding::Func(_)) => Err(Error::KindConflict {
                name: name.to_owned(),
                bound_as: func.kind_name(),
            }),
            None => Err(Error::UnboundVariable(name.to_owned())),
        }
    }

    /// Insert or replace without the duplicate check (host-side registration)
    fn insert(&self, name: &str, binding: Binding) {
        self.bindings.borrow_mut().insert(name.to_owned(), binding);
    }

    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.bindings.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    fn entries(&self) -> Vec<(String, Value)> {
        self.bindings
            .borrow()
            .iter()
            .map(|(name, binding)| (name.clone(), binding.value()))
            .collect()
    }
}

impl fmt::Debug for Frame {
    // Names only: functions close over their environment, so printing values could recurse
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

pub(crate) fn annotate_type_error(err: Error, name: &str) -> Error {
    match err {
        Error::TypeError(msg) => Error::TypeError(format!("{name}: {msg}")),
        other => other,
    }
}

/// Root environment: holds the builtin table and top-level definitions.
///
/// It has no enclosing environment, so delegation stops here: `global` finds
/// nothing and `setvar` of an unknown name fails with `UnboundVariable`.
#[derive(Debug, Default)]
pub struct GlobalEnv {
    frame: Frame,
}

impl GlobalEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom builtin function for use by evaluated code.
    ///
    /// Registration replaces any existing binding of the same name.
    ///
    /// # Example
    /// ```
    /// use scopelisp::evaluator::create_global_env;
    /// use scopelisp::ast::Value;
    /// use scopelisp::Error;
    ///
    /// fn answer(_args: &[Value]) -> Result<Value, Error> {
    ///     Ok(Value::Number(42))
    /// }
    ///
    /// let env = create_global_env();
    /// env.register_builtin_function("answer", answer);
    /// ```
    pub fn register_builtin_function(&self, name: &str, func: BuiltinFn) {
        let builtin = Value::BuiltinFunction {
            id: name.to_owned(),
            func,
        };
        // Builtins always satisfy the fn kind
        let slot = Slot {
            kind: SlotKind::Fn,
            value: builtin,
        };
        self.frame.insert(name, Binding::Var(slot));
    }

    /// Get all bindings as (name, value) pairs sorted by name
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut result = self.frame.entries();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

impl Env for GlobalEnv {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.local(name)
    }

    fn local(&self, name: &str) -> Option<Value> {
        self.frame.get(name)
    }

    fn global(&self, _name: &str) -> Option<Value> {
        None
    }

    fn defvar(&self, name: &str, slot: Slot) -> Result<(), Error> {
        self.frame.defvar(name, slot)
    }

    fn defun(self: Rc<Self>, name: &str, functor: Functor) -> Result<(), Error> {
        let home: EnvRef = self.clone();
        self.frame.defun(name, functor, home)
    }

    fn setvar(&self, name: &str, value: Value) -> Result<(), Error> {
        if self.frame.contains(name) {
            self.frame.set(name, value)
        } else {
            Err(Error::UnboundVariable(name.to_owned()))
        }
    }
}
