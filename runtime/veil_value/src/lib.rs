//! Veil Value - data model for the Veil runtime.
//!
//! This crate defines the tagged value type and the shared mutable
//! containers (lists, dictionaries, blobs) that Veil scripts operate on,
//! together with the services the evaluator layers on top of them:
//!
//! # Architecture
//!
//! - `Value`: closed tagged enum; scalars are plain data, containers are
//!   reference-counted handles with identity semantics
//! - `Heap`: allocation roster for lists and dictionaries; owns the epoch
//!   counter shared by garbage collection and deep-copy passes, and the
//!   unreachable-cycle sweep
//! - `Marker`: epoch-stamping graph walk used by the collector's mark phase
//! - watchers: index cursors registered on lists so live iterators survive
//!   concurrent removal; change callbacks registered on dictionaries
//! - `copy`/`cmp`/`render`: deep copy with shared-substructure reuse,
//!   structural equality with a recursion ceiling, and display/source
//!   rendering
//!
//! Everything here is single-threaded by design: handles are `Rc` and none
//! of the types are `Send`.

mod blob;
mod cmp;
mod copy;
mod dict;
mod error;
mod func;
mod heap;
mod list;
mod lock;
mod number;
mod render;
mod value;

#[cfg(test)]
mod tests;

pub use blob::BlobHandle;
pub use cmp::values_equal;
pub use copy::{deep_copy, shallow_copy, CopyPass, COPY_DEPTH_MAX};
pub use dict::{DictHandle, DictWatcher, ScopeKind};
pub use error::{ValueError, ValueErrorKind, Vres};
pub use func::PartialHandle;
pub use heap::{Epoch, GcAbort, Heap, Marker, SweepStats};
pub use list::{ListHandle, WatchGuard};
pub use lock::{lock_value, VarLock, LOCK_DEPTH_MAX};
pub use number::{format_float, parse_leading_number, scan_float, scan_number, str_to_float, ScannedNumber};
pub use render::{render_echo, render_string};
pub use value::Value;
