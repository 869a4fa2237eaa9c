//! Error types for value-layer operations.
//!
//! Coercions, locked-container writes, index range checks, and depth-limited
//! walks (deep copy, deep lock) all fail with a [`ValueError`]. The evaluator
//! crate converts these into its own error type, attaching source positions.
//!
//! Factory functions populate both `kind` and `message` so callers can match
//! on the category without parsing strings.

use std::fmt;

/// Result of a value-layer operation.
pub type Vres<T> = Result<T, ValueError>;

/// Typed error category.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValueErrorKind {
    /// A coercion or operation received a value of the wrong kind.
    WrongType,
    /// A write went through a locked value.
    Locked,
    /// A write went through a fixed (permanently locked) value.
    Fixed,
    /// An index or slice fell outside the container.
    Range,
    /// A depth-limited walk exceeded its nesting ceiling.
    NestedTooDeep,
}

/// Error produced by value-layer operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValueError {
    pub kind: ValueErrorKind,
    pub message: String,
}

impl ValueError {
    pub fn new(kind: ValueErrorKind, message: impl Into<String>) -> Self {
        ValueError { kind, message: message.into() }
    }
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValueError {}

// Factory functions

/// A value of kind `got` appeared where a Number is required.
pub fn not_a_number(got: &str) -> ValueError {
    ValueError::new(ValueErrorKind::WrongType, format!("cannot use a {got} as a Number"))
}

/// A value of kind `got` appeared where a Float is required.
pub fn not_a_float(got: &str) -> ValueError {
    ValueError::new(ValueErrorKind::WrongType, format!("cannot use a {got} as a Float"))
}

/// A value of kind `got` appeared where a String is required.
pub fn not_a_string(got: &str) -> ValueError {
    ValueError::new(ValueErrorKind::WrongType, format!("cannot use a {got} as a String"))
}

/// Write through a locked value.
pub fn locked(what: &str) -> ValueError {
    ValueError::new(ValueErrorKind::Locked, format!("value is locked: {what}"))
}

/// Write through a fixed value (cannot ever be unlocked).
pub fn fixed(what: &str) -> ValueError {
    ValueError::new(ValueErrorKind::Fixed, format!("cannot change value of {what}"))
}

/// Deep copy exceeded the nesting ceiling.
pub fn copy_nested_too_deep() -> ValueError {
    ValueError::new(ValueErrorKind::NestedTooDeep, "variable nested too deep for making a copy")
}

/// Deep lock/unlock exceeded the nesting ceiling.
pub fn lock_nested_too_deep() -> ValueError {
    ValueError::new(ValueErrorKind::NestedTooDeep, "variable nested too deep for (un)lock")
}
