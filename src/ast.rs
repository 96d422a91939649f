//! Core AST types. The main enum, [`Value`], covers every datum the interpreter
//! reads or produces: numbers, symbols, strings, booleans, lists, precompiled
//! operator applications and callables. Symbols are [`Atom`]s, which carry a
//! declared [`SlotKind`] next to their name; the kind decides what a binding
//! slot created for that name will accept.
//!
//! Ergonomic helpers such as [`val`], [`sym`] and [`nil`] keep AST construction
//! in tests short.

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use crate::builtinops::BuiltinOp;
use crate::function::Function;

/// Type alias for number values in interpreter
pub(crate) type NumberType = i64;

/// Allowed non-alphanumeric characters in symbol names
pub(crate) const SYMBOL_SPECIAL_CHARS: &str = "+-*/<>=!?_$";

/// Separator between a symbol's name and its declared kind (`n:int`)
pub(crate) const KIND_SEPARATOR: char = ':';

/// Check if a string is a valid symbol name
/// Valid: non-empty, no leading digit, no "-digit" prefix, alphanumeric + SYMBOL_SPECIAL_CHARS
pub(crate) fn is_valid_symbol(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        None => false,
        Some(first_char) => {
            if first_char.is_ascii_digit() {
                return false;
            }

            if first_char == '-'
                && let Some(second_char) = chars.next()
                && second_char.is_ascii_digit()
            {
                return false;
            }

            name.chars()
                .all(|c| c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c))
        }
    }
}

/// Declared kind of a symbol, selecting the representation of its binding slot.
///
/// The set is closed: every slot is one of these kinds, fixed when the slot is
/// created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SlotKind {
    /// No declared kind; the slot accepts any value
    #[default]
    Any,
    Int,
    Bool,
    String,
    List,
    /// Builtin or user-defined callables
    Fn,
}

impl SlotKind {
    pub fn name(self) -> &'static str {
        match self {
            SlotKind::Any => "any",
            SlotKind::Int => "int",
            SlotKind::Bool => "bool",
            SlotKind::String => "string",
            SlotKind::List => "list",
            SlotKind::Fn => "fn",
        }
    }

    /// Whether a slot of this kind may hold `value`
    pub fn admits(self, value: &Value) -> bool {
        match self {
            SlotKind::Any => true,
            SlotKind::Int => matches!(value, Value::Number(_)),
            SlotKind::Bool => matches!(value, Value::Bool(_)),
            SlotKind::String => matches!(value, Value::String(_)),
            SlotKind::List => matches!(value, Value::List(_)),
            SlotKind::Fn => matches!(value, Value::BuiltinFunction { .. } | Value::Function(_)),
        }
    }
}

impl FromStr for SlotKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "any" => Ok(SlotKind::Any),
            "int" => Ok(SlotKind::Int),
            "bool" => Ok(SlotKind::Bool),
            "string" => Ok(SlotKind::String),
            "list" => Ok(SlotKind::List),
            "fn" => Ok(SlotKind::Fn),
            other => Err(format!("unknown slot kind '{other}'")),
        }
    }
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A symbol: a name plus its declared slot kind. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Atom {
    pub name: String,
    pub kind: SlotKind,
}

impl Atom {
    /// An atom without a declared kind
    pub fn new(name: impl Into<String>) -> Self {
        Atom {
            name: name.into(),
            kind: SlotKind::Any,
        }
    }

    pub fn typed(name: impl Into<String>, kind: SlotKind) -> Self {
        Atom {
            name: name.into(),
            kind,
        }
    }

    /// Parse `name` or `name:kind`. Returns `None` if the name part is not a
    /// valid symbol or the kind is unknown.
    pub(crate) fn parse(text: &str) -> Option<Self> {
        let (name, kind) = match text.split_once(KIND_SEPARATOR) {
            Some((name, kind)) => (name, kind.parse().ok()?),
            None => (text, SlotKind::Any),
        };
        is_valid_symbol(name).then(|| Atom::typed(name, kind))
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SlotKind::Any => write!(f, "{}", self.name),
            kind => write!(f, "{}{KIND_SEPARATOR}{kind}", self.name),
        }
    }
}

/// Canonical signature of builtin primitives
pub type BuiltinFn = fn(&[Value]) -> Result<Value, crate::Error>;

/// Core AST type in interpreter
///
/// To build an AST, use the ergonomic helper functions:
/// - `val(42)` for values, `sym("name")` for symbols, `nil()` for empty lists
/// - `val([1, 2, 3])` for homogeneous lists
/// - `val(vec![sym("op"), val(42)])` for mixed lists
#[derive(Clone)]
pub enum Value {
    /// Numbers (integers only)
    Number(NumberType),
    /// Symbols (identifiers with their declared kind)
    Symbol(Atom),
    /// String literals
    String(String),
    /// Boolean values
    Bool(bool),
    /// Lists (empty list represents nil)
    List(Vec<Value>),
    /// Operator applications resolved against the builtin registry at parse time
    PrecompiledOp {
        op: &'static BuiltinOp,
        op_id: String,
        args: Vec<Value>,
    },
    /// Built-in functions called through a symbol; compared by id
    BuiltinFunction { id: String, func: BuiltinFn },
    /// User-defined, overloadable functions
    Function(Rc<Function>),
    /// Unspecified values (e.g., return value of define)
    /// These values never equal themselves or any other value
    Unspecified,
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Symbol(atom) => write!(f, "Symbol({atom})"),
            Value::String(s) => write!(f, "String(\"{s}\")"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::List(list) => {
                write!(f, "List(")?;
                for (i, v) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v:?}")?;
                }
                write!(f, ")")
            }
            Value::PrecompiledOp { op_id, args, .. } => {
                write!(f, "PrecompiledOp({op_id}, args=[")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a:?}")?;
                }
                write!(f, "])")
            }
            Value::BuiltinFunction { id, .. } => write!(f, "BuiltinFunction({id})"),
            Value::Function(function) => write!(f, "{function:?}"),
            Value::Unspecified => write!(f, "Unspecified"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Atom> for Value {
    fn from(atom: Atom) -> Self {
        Value::Symbol(atom)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Number(NumberType::from(n))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(NumberType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::List(arr.into_iter().map(Into::into).collect())
    }
}

/// Helper function for creating untyped symbols
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(Atom::new(name.as_ref()))
}

/// Helper function for creating Values from anything convertible
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for creating empty lists (nil)
pub fn nil() -> Value {
    Value::List(vec![])
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Symbol(atom) => write!(f, "{atom}"),
            Value::String(s) => {
                write!(f, "\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        '\r' => write!(f, "\\r")?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"")
            }
            Value::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Value::List(elements) => {
                write!(f, "(")?;
                for (i, elem) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, ")")
            }
            Value::BuiltinFunction { id, .. } => write!(f, "#<builtin-function:{id}>"),
            // Printed as the list it was parsed from, so output re-parses
            Value::PrecompiledOp { .. } => write!(f, "{}", self.to_uncompiled_form()),
            Value::Function(function) => write!(f, "#<function:{}>", function.name()),
            Value::Unspecified => write!(f, "#<unspecified>"),
        }
    }
}

impl Value {
    /// Convert PrecompiledOp back to List form
    pub(crate) fn to_uncompiled_form(&self) -> Value {
        match self {
            Value::PrecompiledOp { op, args, .. } => {
                let mut elements = vec![Value::Symbol(Atom::new(op.scheme_id))];
                elements.extend(args.iter().map(Value::to_uncompiled_form));
                Value::List(elements)
            }
            Value::List(elements) => {
                Value::List(elements.iter().map(Value::to_uncompiled_form).collect())
            }
            other => other.clone(),
        }
    }

    /// Check if a value represents nil (empty list)
    pub(crate) fn is_nil(&self) -> bool {
        matches!(self, Value::List(list) if list.is_empty())
    }

    /// Short type name used in error messages
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "int",
            Value::Symbol(_) => "symbol",
            Value::String(_) => "string",
            Value::Bool(_) => "bool",
            Value::List(_) => "list",
            Value::PrecompiledOp { .. } => "expression",
            Value::BuiltinFunction { .. } | Value::Function(_) => "fn",
            Value::Unspecified => "unspecified",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (
                Value::PrecompiledOp {
                    op_id: id1,
                    args: args1,
                    ..
                },
                Value::PrecompiledOp {
                    op_id: id2,
                    args: args2,
                    ..
                },
            ) => id1 == id2 && args1 == args2,
            (Value::BuiltinFunction { id: id1, .. }, Value::BuiltinFunction { id: id2, .. }) => {
                id1 == id2
            }
            // Functions have identity: overloads merged later are visible through every handle
            (Value::Function(f1), Value::Function(f2)) => Rc::ptr_eq(f1, f2),
            _ => false, // Unspecified never equals anything; different variants never equal
        }
    }
}
