//! Lock states for containers.
//!
//! A container is `Unlocked`, `Locked` (scripts may unlock it again), or
//! `Fixed` (interpreter-owned, never unlockable; scope dictionaries use
//! this). Locking applies to the container, not to the binding that holds
//! it: a locked list can be rebound, but not mutated.

use crate::error::{lock_nested_too_deep, Vres};
use crate::value::Value;

/// Maximum container nesting for a deep lock/unlock walk.
pub const LOCK_DEPTH_MAX: usize = 100;

/// Mutation permission of a container.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VarLock {
    #[default]
    Unlocked,
    /// Locked by a script; may be unlocked again.
    Locked,
    /// Locked forever by the interpreter.
    Fixed,
}

impl VarLock {
    /// True for both `Locked` and `Fixed`.
    #[inline]
    pub fn is_locked(self) -> bool {
        !matches!(self, VarLock::Unlocked)
    }

    /// Apply a lock/unlock request, leaving `Fixed` untouched.
    #[inline]
    pub fn apply(self, lock: bool) -> VarLock {
        match self {
            VarLock::Fixed => VarLock::Fixed,
            _ if lock => VarLock::Locked,
            _ => VarLock::Unlocked,
        }
    }
}

/// Lock or unlock `value` and, depth permitting, the containers inside it.
///
/// `depth` counts container levels: 1 locks only the value's own container,
/// 2 also locks containers stored directly in it, and a negative depth has
/// no ceiling. Cycles are cut off by the nesting guard, which errors at
/// [`LOCK_DEPTH_MAX`] levels.
pub fn lock_value(value: &Value, depth: i64, lock: bool) -> Vres<()> {
    lock_inner(value, depth, lock, 0)
}

fn lock_inner(value: &Value, depth: i64, lock: bool, nesting: usize) -> Vres<()> {
    if nesting >= LOCK_DEPTH_MAX {
        return Err(lock_nested_too_deep());
    }
    if depth == 0 {
        return Ok(());
    }
    let descend = depth < 0 || depth > 1;
    match value {
        Value::List(list) => {
            list.apply_lock(lock);
            if descend {
                let items = list.borrow_items();
                for item in items.iter() {
                    lock_inner(item, depth.wrapping_sub(1), lock, nesting + 1)?;
                }
            }
        }
        Value::Dict(dict) => {
            dict.apply_lock(lock);
            if descend {
                let entries = dict.borrow_entries();
                for item in entries.values() {
                    lock_inner(item, depth.wrapping_sub(1), lock, nesting + 1)?;
                }
            }
        }
        Value::Blob(blob) => {
            blob.apply_lock(lock);
        }
        _ => {}
    }
    Ok(())
}
