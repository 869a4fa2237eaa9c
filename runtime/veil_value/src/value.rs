//! The tagged value type.
//!
//! Scalars are plain data; lists, dictionaries, blobs, and partials are
//! reference-counted handles, so cloning a `Value` is always cheap and
//! container clones share identity. The enum is closed: embedders extend
//! the runtime through functions, not new value kinds.

use std::rc::Rc;

use crate::blob::BlobHandle;
use crate::cmp::values_equal;
use crate::dict::DictHandle;
use crate::error::{not_a_float, not_a_number, not_a_string, Vres};
use crate::func::PartialHandle;
use crate::list::ListHandle;
use crate::number::{format_float, parse_leading_number};

/// A script value.
#[derive(Clone, Debug)]
pub enum Value {
    Number(i64),
    Float(f64),
    Bool(bool),
    /// The null/none singleton.
    Null,
    /// Immutable string; clones share the buffer.
    Str(Rc<str>),
    List(ListHandle),
    Dict(DictHandle),
    Blob(BlobHandle),
    /// A function reference by name.
    Func(Rc<str>),
    /// A closure: function plus bound arguments and/or `self` dictionary.
    Partial(PartialHandle),
    /// Placeholder produced by parse-without-evaluate; never escapes a
    /// successful evaluation.
    Unknown,
}

impl Value {
    /// Build a string value.
    #[inline]
    pub fn str(s: impl AsRef<str>) -> Value {
        Value::Str(Rc::from(s.as_ref()))
    }

    /// Kind name as used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "Number",
            Value::Float(_) => "Float",
            Value::Bool(_) => "Boolean",
            Value::Null => "Null",
            Value::Str(_) => "String",
            Value::List(_) => "List",
            Value::Dict(_) => "Dictionary",
            Value::Blob(_) => "Blob",
            Value::Func(_) | Value::Partial(_) => "Funcref",
            Value::Unknown => "Unknown",
        }
    }

    /// Type code exposed to scripts by `type()`.
    pub fn type_code(&self) -> i64 {
        match self {
            Value::Number(_) => 0,
            Value::Str(_) => 1,
            Value::Func(_) | Value::Partial(_) => 2,
            Value::List(_) => 3,
            Value::Dict(_) => 4,
            Value::Float(_) => 5,
            Value::Bool(_) => 6,
            Value::Null => 7,
            Value::Blob(_) => 10,
            Value::Unknown => -1,
        }
    }

    /// Numeric coercion. Strings parse a leading number, booleans and null
    /// map to 1/0, floats and containers refuse.
    pub fn to_number(&self) -> Vres<i64> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::Null => Ok(0),
            Value::Str(s) => Ok(parse_leading_number(s)),
            other => Err(not_a_number(other.kind_name())),
        }
    }

    /// Float coercion: numbers promote, anything else (strings included)
    /// refuses.
    pub fn to_float(&self) -> Vres<f64> {
        match self {
            Value::Float(f) => Ok(*f),
            Value::Number(n) => {
                #[expect(clippy::cast_precision_loss, reason = "script semantics: promotion is lossy past 2^53")]
                let promoted = *n as f64;
                Ok(promoted)
            }
            other => Err(not_a_float(other.kind_name())),
        }
    }

    /// String coercion as used by concatenation and indexing contexts.
    pub fn coerce_string(&self) -> Vres<Rc<str>> {
        match self {
            Value::Str(s) => Ok(Rc::clone(s)),
            Value::Number(n) => Ok(Rc::from(n.to_string().as_str())),
            Value::Float(f) => Ok(Rc::from(format_float(*f).as_str())),
            Value::Bool(b) => Ok(Rc::from(if *b { "true" } else { "false" })),
            Value::Null => Ok(Rc::from("null")),
            other => Err(not_a_string(other.kind_name())),
        }
    }

    /// Condition coercion: numeric, compared against zero.
    #[inline]
    pub fn truthy(&self) -> Vres<bool> {
        Ok(self.to_number()? != 0)
    }

    /// True for values that can be called.
    #[inline]
    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Func(_) | Value::Partial(_))
    }

    /// The referenced function name, for `Func` and `Partial` values.
    pub fn func_name(&self) -> Option<Rc<str>> {
        match self {
            Value::Func(name) => Some(Rc::clone(name)),
            Value::Partial(p) => Some(p.func_name()),
            _ => None,
        }
    }

    /// Container identity, when both sides are containers of the same kind.
    pub fn same_instance(&self, other: &Value) -> Option<bool> {
        match (self, other) {
            (Value::List(a), Value::List(b)) => Some(a.ptr_eq(b)),
            (Value::Dict(a), Value::Dict(b)) => Some(a.ptr_eq(b)),
            (Value::Blob(a), Value::Blob(b)) => Some(a.ptr_eq(b)),
            _ => None,
        }
    }
}

/// Structural equality with scripting-language semantics: numbers compare
/// across Number/Float/Bool/Null kinds, containers compare item-wise with
/// identity short-circuit and a recursion ceiling. Case-sensitive.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        values_equal(self, other, false)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Value {
        Value::Number(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Value {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Str(Rc::from(s.as_str()))
    }
}
