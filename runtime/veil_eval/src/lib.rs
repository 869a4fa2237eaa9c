//! The Veil expression interpreter.
//!
//! This crate evaluates Veil expressions against a mutable variable
//! universe: scoped dictionaries (`g:`, `b:`, `w:`, `t:`, `s:`, `l:`,
//! `a:`, `v:`), user functions and lambdas, and shared container values
//! from [`veil_value`]. Parsing and evaluation are fused: one
//! recursive-descent pass over the source text both consumes syntax and
//! produces the value, with untaken conditional branches parsed but not
//! evaluated.
//!
//! The embedding surface is [`Interpreter`]: expression entry points
//! (`evaluate` and its coercing variants), lvalue resolution and
//! assignment, the iteration protocols host loops build on, callable
//! dispatch, and explicit garbage collection of container cycles. The
//! host side of the boundary (options, registers, pattern matching,
//! messages, autoload) is the [`Host`] trait.

mod builtins;
mod error;
mod expr;
mod func;
mod gc;
mod host;
mod interp;
mod iter;
mod lex;
mod lval;
mod scope;
mod stack;

#[cfg(test)]
mod tests;

pub use builtins::{BuiltinFn, BuiltinTable};
pub use error::{Error, ErrorKind, Result};
pub use func::{CallArgs, Callback, CallbackOutcome};
pub use host::{Host, MessageKind, NullHost, OptionScope};
pub use interp::{Interpreter, RootId};
pub use iter::{FilterMapMode, ForCursor};
pub use lval::{AssignOp, Lval, LvalFlags};

pub use veil_value::{render_echo, render_string, Heap, SweepStats, Value};
