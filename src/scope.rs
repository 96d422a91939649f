//! `let` scopes.
//!
//! A [`Scope`] owns a local frame and a body, and goes through two states:
//! *constructed* (locals populated, no enclosing environment yet) and *active*
//! (enclosing environment installed, body evaluating or done). The enclosing
//! reference is installed once, when the body starts evaluating.
//!
//! Two constructors build scopes from a `((name init) ...) body...` form:
//!
//! - [`let_scope`] builds the scope eagerly and hands it back unevaluated.
//! - [`let_task`] validates the form and returns a reusable [`LetTask`]; each
//!   [`LetTask::run`] builds a fresh scope against the given environment and
//!   evaluates the body in it.
//!
//! Initializers are always evaluated in the caller's environment, never in the
//! scope under construction, so bindings in one list cannot see each other.

use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

use crate::Error;
use crate::ast::{Atom, Value, nil};
use crate::environment::{Env, EnvRef, Frame, Slot, annotate_type_error};
use crate::evaluator::eval_with_depth_tracking;
use crate::function::Functor;

pub struct Scope {
    local: Frame,
    body: Vec<Value>,
    parent: OnceCell<EnvRef>,
}

impl Scope {
    /// A constructed scope with an empty frame
    pub fn new(body: Vec<Value>) -> Self {
        Scope {
            local: Frame::default(),
            body,
            parent: OnceCell::new(),
        }
    }

    pub fn body(&self) -> &[Value] {
        &self.body
    }

    /// Whether the enclosing environment has been installed
    pub fn is_active(&self) -> bool {
        self.parent.get().is_some()
    }

    /// Names bound in this scope's own frame, sorted
    pub fn local_names(&self) -> Vec<String> {
        self.local.names()
    }

    /// Activate the scope under `parent` and evaluate its body
    pub fn eval(self: Rc<Self>, parent: EnvRef) -> Result<Value, Error> {
        self.eval_with_depth(parent, 0)
    }

    pub(crate) fn eval_with_depth(self: Rc<Self>, parent: EnvRef, depth: usize) -> Result<Value, Error> {
        if self.parent.set(parent).is_err() {
            return Err(Error::EvalError("scope is already active".to_owned()));
        }
        tracing::trace!(locals = ?self.local, "scope active");

        let env: EnvRef = self.clone();
        eval_body_with_depth(&self.body, &env, depth)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("local", &self.local)
            .field("body", &self.body)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Env for Scope {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.local(name).or_else(|| self.global(name))
    }

    fn local(&self, name: &str) -> Option<Value> {
        self.local.get(name)
    }

    fn global(&self, name: &str) -> Option<Value> {
        self.parent.get().and_then(|parent| parent.lookup(name))
    }

    fn defvar(&self, name: &str, slot: Slot) -> Result<(), Error> {
        self.local.defvar(name, slot)
    }

    fn defun(self: Rc<Self>, name: &str, functor: Functor) -> Result<(), Error> {
        let home: EnvRef = self.clone();
        self.local.defun(name, functor, home)
    }

    fn setvar(&self, name: &str, value: Value) -> Result<(), Error> {
        if self.local.contains(name) {
            return self.local.set(name, value);
        }
        match self.parent.get() {
            Some(parent) => {
                tracing::trace!(name, "setvar delegated to enclosing environment");
                parent.setvar(name, value)
            }
            // A constructed scope has nowhere to delegate to yet
            None => Err(Error::UnboundVariable(name.to_owned())),
        }
    }
}

/// Split `let` arguments into the binding list and the body
fn split_let_args(args: &[Value]) -> Result<(&[Value], &[Value]), Error> {
    match args {
        [] => Err(Error::MalformedArguments(
            "let args error: expect a binding list but got an empty let form (let)".to_owned(),
        )),
        [Value::List(bindings), body @ ..] => Ok((bindings, body)),
        [other, ..] => Err(Error::MalformedArguments(format!(
            "let args error: expect a binding list but got {other}"
        ))),
    }
}

/// Extract `(atom initializer)` from one binding
fn binding_pair(binding: &Value) -> Result<(Atom, &Value), Error> {
    match binding {
        Value::List(pair) => match pair.as_slice() {
            [Value::Symbol(atom), init] => Ok((atom.clone(), init)),
            _ => Err(malformed_binding(binding)),
        },
        _ => Err(malformed_binding(binding)),
    }
}

fn malformed_binding(binding: &Value) -> Error {
    Error::MalformedArguments(format!(
        "let binding error: expect (name value) but got {binding}"
    ))
}

/// Evaluate every initializer against `env` and bind the results in a new,
/// constructed scope. The first failure aborts the remaining bindings.
fn build_scope(
    bindings: &[Value],
    body: Vec<Value>,
    env: &EnvRef,
    depth: usize,
) -> Result<Scope, Error> {
    let scope = Scope::new(body);
    for binding in bindings {
        let (atom, init) = binding_pair(binding)?;
        let value = eval_with_depth_tracking(init, env, depth + 1)?;
        let slot =
            Slot::with_value(atom.kind, value).map_err(|err| annotate_type_error(err, &atom.name))?;
        scope.defvar(&atom.name, slot)?;
    }
    tracing::debug!(bindings = bindings.len(), "let scope constructed");
    Ok(scope)
}

/// Build a scope from `let` arguments without evaluating its body.
///
/// Initializers are evaluated against `env`. The returned scope is in its
/// constructed state; [`Scope::eval`] activates it.
pub fn let_scope(args: &[Value], env: &EnvRef) -> Result<Scope, Error> {
    let (bindings, body) = split_let_args(args)?;
    build_scope(bindings, body.to_vec(), env, 0)
}

/// Validate `let` arguments and capture them in a reusable task
pub fn let_task(args: &[Value]) -> Result<LetTask, Error> {
    let (bindings, body) = split_let_args(args)?;
    Ok(LetTask {
        bindings: bindings.to_vec(),
        body: body.to_vec(),
    })
}

/// A deferred `let`: binding list and body captured by value
#[derive(Debug, Clone, PartialEq)]
pub struct LetTask {
    bindings: Vec<Value>,
    body: Vec<Value>,
}

impl LetTask {
    /// Build a fresh scope against `env` and evaluate the body in it
    pub fn run(&self, env: &EnvRef) -> Result<Value, Error> {
        self.run_with_depth(env, 0)
    }

    pub(crate) fn run_with_depth(&self, env: &EnvRef, depth: usize) -> Result<Value, Error> {
        let scope = build_scope(&self.bindings, self.body.clone(), env, depth)?;
        Rc::new(scope).eval_with_depth(Rc::clone(env), depth)
    }
}

/// Evaluate `body` left to right in `env`, returning the last result.
///
/// An empty body yields nil. The first error stops evaluation.
pub fn eval_body(body: &[Value], env: &EnvRef) -> Result<Value, Error> {
    eval_body_with_depth(body, env, 0)
}

pub(crate) fn eval_body_with_depth(
    body: &[Value],
    env: &EnvRef,
    depth: usize,
) -> Result<Value, Error> {
    match body {
        [] => Ok(nil()),
        [only] => eval_with_depth_tracking(only, env, depth + 1),
        [effects @ .., last] => {
            for expr in effects {
                eval_with_depth_tracking(expr, env, depth + 1)?;
            }
            eval_with_depth_tracking(last, env, depth + 1)
        }
    }
}

#[cfg(all(test, feature = "scheme"))]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{SlotKind, sym, val};
    use crate::environment::GlobalEnv;
    use crate::evaluator::create_global_env;
    use crate::scheme::parse_scheme;
    use std::cell::Cell;

    /// Parse `(let ...)` source and return the raw argument list
    fn let_args(src: &str) -> Vec<Value> {
        match parse_scheme(src).unwrap() {
            Value::PrecompiledOp { op_id, args, .. } if op_id == "let" => args,
            other => panic!("expected a let form, got {other:?}"),
        }
    }

    fn root_with(bindings: &[(&str, Value)]) -> EnvRef {
        let env = create_global_env();
        for (name, value) in bindings {
            env.defvar(name, Slot::with_value(SlotKind::Any, value.clone()).unwrap())
                .unwrap();
        }
        env
    }

    #[test]
    fn test_let_scope_is_constructed_not_active() {
        let env = root_with(&[]);
        let scope = let_scope(&let_args("(let ((a 1) (b 2)) (+ a b))"), &env).unwrap();

        assert!(!scope.is_active());
        assert_eq!(scope.local_names(), vec!["a", "b"]);
        assert_eq!(scope.local("a"), Some(val(1)));
        // No enclosing environment yet
        assert_eq!(scope.global("+"), None);
        assert_eq!(scope.body().len(), 1);

        let scope = Rc::new(scope);
        assert_eq!(scope.clone().eval(env).unwrap(), val(3));
        assert!(scope.is_active());
    }

    #[test]
    fn test_scope_activates_once() {
        let env = root_with(&[]);
        let scope = Rc::new(let_scope(&let_args("(let ((a 1)) a)"), &env).unwrap());
        scope.clone().eval(env.clone()).unwrap();
        assert!(matches!(scope.eval(env), Err(Error::EvalError(_))));
    }

    #[test]
    fn test_initializers_see_caller_env_only() {
        let env = root_with(&[("a", val(100))]);
        let scope = let_scope(&let_args("(let ((a 1) (b a)) b)"), &env).unwrap();
        assert_eq!(scope.local("b"), Some(val(100)));
    }

    #[test]
    fn test_eager_form_errors() {
        let env = root_with(&[]);
        assert!(matches!(
            let_scope(&[], &env),
            Err(Error::MalformedArguments(_))
        ));
        assert!(matches!(
            let_scope(&[val(1), sym("x")], &env),
            Err(Error::MalformedArguments(_))
        ));
        assert!(matches!(
            let_scope(&let_args("(let ((a 1) (a 2)) a)"), &env),
            Err(Error::DuplicateName(name)) if name == "a"
        ));
        assert!(matches!(
            let_scope(&let_args("(let ((a missing)) a)"), &env),
            Err(Error::UnboundVariable(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_malformed_binding_pairs() {
        let env = root_with(&[]);
        for src in [
            "(let (a) a)",
            "(let ((a)) a)",
            "(let ((a 1 2)) a)",
            "(let ((\"a\" 1)) 1)",
            "(let ((1 2)) 1)",
        ] {
            let result = let_task(&let_args(src)).unwrap().run(&env);
            assert!(
                matches!(result, Err(Error::MalformedArguments(_))),
                "{src}: expected malformed arguments, got {result:?}"
            );
        }
    }

    #[test]
    fn test_let_task_validates_immediately() {
        assert!(matches!(let_task(&[]), Err(Error::MalformedArguments(_))));
        assert!(matches!(
            let_task(&[val(42)]),
            Err(Error::MalformedArguments(_))
        ));
        // Binding pair shape is only checked when the task runs
        assert!(let_task(&let_args("(let (oops) 1)")).is_ok());
    }

    #[test]
    fn test_let_task_runs_fresh_each_time() {
        let env = root_with(&[("counter", val(0))]);
        let task = let_task(&let_args(
            "(let ((seen counter)) (set! counter (+ counter 1)) seen)",
        ))
        .unwrap();

        assert_eq!(task.run(&env).unwrap(), val(0));
        assert_eq!(task.run(&env).unwrap(), val(1));
        assert_eq!(task.run(&env).unwrap(), val(2));
        assert_eq!(env.lookup("counter"), Some(val(3)));
    }

    #[test]
    fn test_builtin_named_binding() {
        let env = root_with(&[]);
        let task = let_task(&let_args("(let ((list 5)) list)")).unwrap();
        assert_eq!(task.run(&env).unwrap(), val(5));
    }

    #[test]
    fn test_typed_binding() {
        let env = root_with(&[]);
        let ok = let_task(&let_args("(let ((n:int 5)) n)")).unwrap();
        assert_eq!(ok.run(&env).unwrap(), val(5));

        let bad = let_task(&let_args("(let ((n:int \"five\")) n)")).unwrap();
        assert!(matches!(bad.run(&env), Err(Error::TypeError(_))));

        let reassign = let_task(&let_args("(let ((n:int 5)) (set! n #t) n)")).unwrap();
        assert!(matches!(reassign.run(&env), Err(Error::TypeError(_))));
    }

    #[test]
    fn test_scope_setvar_delegates() {
        let env = root_with(&[("outer", val(1))]);
        let scope = Rc::new(let_scope(&let_args("(let ((inner 2)))"), &env).unwrap());
        // Not active: delegation has no target
        assert_eq!(
            scope.setvar("outer", val(5)),
            Err(Error::UnboundVariable("outer".to_owned()))
        );

        scope.clone().eval(env.clone()).unwrap();
        scope.setvar("inner", val(3)).unwrap();
        scope.setvar("outer", val(4)).unwrap();
        assert_eq!(scope.local("inner"), Some(val(3)));
        assert_eq!(scope.local("outer"), None);
        assert_eq!(env.lookup("outer"), Some(val(4)));
        assert_eq!(
            scope.setvar("nowhere", val(0)),
            Err(Error::UnboundVariable("nowhere".to_owned()))
        );
    }

    #[test]
    fn test_scope_lookup_local_global() {
        let env = root_with(&[("x", val("outer"))]);
        let scope = Rc::new(let_scope(&let_args("(let ((x \"inner\")))"), &env).unwrap());
        scope.clone().eval(env).unwrap();

        assert_eq!(scope.lookup("x"), Some(val("inner")));
        assert_eq!(scope.local("x"), Some(val("inner")));
        assert_eq!(scope.global("x"), Some(val("outer")));
        assert!(scope.local("car").is_none());
        assert!(scope.lookup("car").is_some());
    }

    #[test]
    fn test_scope_defun_kind_conflict() {
        let env = root_with(&[]);
        let scope = Rc::new(let_scope(&let_args("(let ((v 1)))"), &env).unwrap());
        let functor = Functor::new(vec![], vec![val(1)]).unwrap();
        assert!(matches!(
            scope.clone().defun("v", functor.clone()),
            Err(Error::KindConflict { .. })
        ));
        scope.clone().defun("f", functor).unwrap();
        assert!(matches!(
            scope.defvar("f", Slot::with_value(SlotKind::Any, val(0)).unwrap()),
            Err(Error::DuplicateName(_))
        ));
    }

    /// Environment that records every lookup and otherwise delegates to a root
    #[derive(Debug)]
    struct CountingEnv {
        inner: Rc<GlobalEnv>,
        lookups: Cell<usize>,
    }

    impl Env for CountingEnv {
        fn lookup(&self, name: &str) -> Option<Value> {
            self.lookups.set(self.lookups.get() + 1);
            self.inner.lookup(name)
        }
        fn local(&self, name: &str) -> Option<Value> {
            self.inner.local(name)
        }
        fn global(&self, name: &str) -> Option<Value> {
            self.inner.global(name)
        }
        fn defvar(&self, name: &str, slot: Slot) -> Result<(), Error> {
            self.inner.defvar(name, slot)
        }
        fn defun(self: Rc<Self>, name: &str, functor: Functor) -> Result<(), Error> {
            Rc::clone(&self.inner).defun(name, functor)
        }
        fn setvar(&self, name: &str, value: Value) -> Result<(), Error> {
            self.inner.setvar(name, value)
        }
    }

    #[test]
    fn test_sequencing_stops_at_first_error() {
        let counting = Rc::new(CountingEnv {
            inner: create_global_env(),
            lookups: Cell::new(0),
        });
        let env: EnvRef = counting.clone();
        let body = vec![sym("car"), sym("missing"), sym("cdr")];

        assert_eq!(
            eval_body(&body, &env),
            Err(Error::UnboundVariable("missing".to_owned()))
        );
        // `cdr` was never looked up
        assert_eq!(counting.lookups.get(), 2);
    }

    #[test]
    fn test_eval_body_shapes() {
        let env = root_with(&[]);
        assert_eq!(eval_body(&[], &env).unwrap(), nil());
        assert_eq!(eval_body(&[val(1)], &env).unwrap(), val(1));
        assert_eq!(eval_body(&[val(1), val(2), val(3)], &env).unwrap(), val(3));
    }
}
