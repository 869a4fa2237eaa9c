//! Error types for evaluation.
//!
//! `ErrorKind` provides typed error categories; factory functions populate
//! both `kind` and `message` so callers can match on the category without
//! parsing strings. Syntax errors additionally carry the byte offset where
//! scanning stopped, which the embedding host can point at.
//!
//! Quiet mode (probing lookups, `exists()`) only suppresses *reporting* of
//! `Undefined` errors; the error value itself is still returned so callers
//! can distinguish "absent" from "present".

use std::fmt;

use veil_value::{ValueError, ValueErrorKind};

/// Result of an evaluation step.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed error category.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed expression text: unterminated literal, missing bracket,
    /// trailing characters.
    Syntax,
    /// An operation received a value of the wrong kind.
    Type,
    /// Unresolved variable, key, or function. Honors quiet mode.
    Undefined,
    /// Index or slice outside the container, or a slice length mismatch.
    Range,
    /// Write through a locked value or scope. Names the target.
    Locked,
    /// Expression recursion past the ceiling. Never quiet.
    ExprNesting,
    /// Function call nesting past the ceiling.
    CallDepth,
    /// Deep copy or deep lock past the nesting ceiling.
    NestedTooDeep,
    /// Wrong number of call arguments.
    ArgCount,
    /// Call argument of the wrong shape.
    ArgType,
    /// The host requested an interrupt.
    Interrupted,
    /// A host bridge operation failed.
    Host,
}

/// Error produced during evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    /// Byte offset into the source text, when one is known.
    pub pos: Option<usize>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Error {
        Error { kind, message: message.into(), pos: None }
    }

    /// Attach a source position, keeping an earlier one if already set.
    #[must_use]
    pub fn at(mut self, pos: usize) -> Error {
        if self.pos.is_none() {
            self.pos = Some(pos);
        }
        self
    }

    /// True when quiet mode suppresses reporting this error.
    #[inline]
    pub fn is_quietable(&self) -> bool {
        self.kind == ErrorKind::Undefined
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Error {}

impl From<ValueError> for Error {
    fn from(err: ValueError) -> Error {
        let kind = match err.kind {
            ValueErrorKind::WrongType => ErrorKind::Type,
            ValueErrorKind::Locked | ValueErrorKind::Fixed => ErrorKind::Locked,
            ValueErrorKind::Range => ErrorKind::Range,
            ValueErrorKind::NestedTooDeep => ErrorKind::NestedTooDeep,
        };
        Error::new(kind, err.message)
    }
}

// Factory functions

/// Malformed expression; `what` describes the missing or broken piece.
pub fn syntax(what: impl fmt::Display, pos: usize) -> Error {
    Error::new(ErrorKind::Syntax, format!("invalid expression: {what}")).at(pos)
}

/// The expression ended but input remains.
pub fn trailing(rest: &str, pos: usize) -> Error {
    Error::new(ErrorKind::Syntax, format!("trailing characters: {rest}")).at(pos)
}

/// Unterminated string, blob, or interpolation span.
pub fn unterminated(what: &str, pos: usize) -> Error {
    Error::new(ErrorKind::Syntax, format!("unterminated {what}")).at(pos)
}

/// Generic operand/operation mismatch.
pub fn type_error(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Type, message)
}

/// `op` cannot be applied to a value of kind `got`.
pub fn wrong_operand(op: &str, got: &str) -> Error {
    Error::new(ErrorKind::Type, format!("cannot use {op} with a {got}"))
}

/// A value of kind `got` cannot be indexed.
pub fn not_indexable(got: &str) -> Error {
    Error::new(ErrorKind::Type, format!("cannot index a {got}"))
}

/// A value of kind `got` cannot be called.
pub fn not_callable(got: &str) -> Error {
    Error::new(ErrorKind::Type, format!("cannot call a {got}"))
}

/// Unknown variable.
pub fn undefined_var(name: &str) -> Error {
    Error::new(ErrorKind::Undefined, format!("undefined variable: {name}"))
}

/// Unknown dictionary key.
pub fn undefined_key(key: &str) -> Error {
    Error::new(ErrorKind::Undefined, format!("key not present in dictionary: {key}"))
}

/// Unknown function.
pub fn unknown_function(name: &str) -> Error {
    Error::new(ErrorKind::Undefined, format!("unknown function: {name}"))
}

/// Invalid name for a function or variable.
pub fn invalid_name(name: &str) -> Error {
    Error::new(ErrorKind::Syntax, format!("invalid name: {name}"))
}

/// Unknown host option.
pub fn unknown_option(name: &str) -> Error {
    Error::new(ErrorKind::Undefined, format!("unknown option: &{name}"))
}

/// List index outside the list.
pub fn list_index(index: i64) -> Error {
    Error::new(ErrorKind::Range, format!("list index out of range: {index}"))
}

/// Blob index outside the blob.
pub fn blob_index(index: i64) -> Error {
    Error::new(ErrorKind::Range, format!("blob index out of range: {index}"))
}

/// Range assignment with mismatched lengths.
pub fn range_length() -> Error {
    Error::new(ErrorKind::Range, "list value does not match the range length")
}

/// Write to a read-only reserved name.
pub fn read_only(name: &str) -> Error {
    Error::new(ErrorKind::Locked, format!("cannot change read-only variable: {name}"))
}

/// A variable may not shadow a builtin function.
pub fn shadows_builtin(name: &str) -> Error {
    Error::new(ErrorKind::Type, format!("variable name conflicts with a function: {name}"))
}

/// Expression recursion ceiling hit.
pub fn expr_nesting() -> Error {
    Error::new(ErrorKind::ExprNesting, "expression recursion limit reached")
}

/// Call depth ceiling hit.
pub fn call_depth() -> Error {
    Error::new(ErrorKind::CallDepth, "function call depth limit reached")
}

/// Wrong argument count for `name`.
pub fn arg_count(name: &str, expected: &str, got: usize) -> Error {
    Error::new(ErrorKind::ArgCount, format!("{name} expects {expected} arguments, got {got}"))
}

/// Wrong argument kind for `name`.
pub fn arg_type(name: &str, wanted: &str, got: &str) -> Error {
    Error::new(ErrorKind::ArgType, format!("{name} expects a {wanted} argument, got a {got}"))
}

/// The host interrupt flag was observed at a checkpoint.
pub fn interrupted() -> Error {
    Error::new(ErrorKind::Interrupted, "interrupted")
}

/// A host bridge call failed.
pub fn host_error(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Host, message)
}
