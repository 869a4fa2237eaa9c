//! Allocation roster and cycle collection.
//!
//! Reference counting frees most containers the moment the last handle
//! drops. Containers that reference each other in a cycle never reach zero
//! on their own; the [`Heap`] keeps a weak entry for every list and
//! dictionary ever allocated so a mark-and-sweep pass can find them without
//! walking the variable graph.
//!
//! One monotonically increasing epoch counter serves both the collector's
//! mark phase and deep-copy passes: a container stamped with the current
//! epoch has already been visited this pass, which is what makes cyclic
//! structures safe to traverse.
//!
//! The sweep runs in two passes. Pass one upgrades every weak entry (so no
//! shell can be freed while its neighbors are still being inspected) and
//! drains the contents of every unmarked container into a holding pen. Pass
//! two drops the pen and the upgraded handles, letting reference counts
//! finish the job, then prunes dead roster entries.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::dict::{DictCore, DictHandle, DictWatcher};
use crate::list::{ListCore, ListHandle};
use crate::value::Value;

/// Pass stamp for mark and copy traversals. Fresh values come from
/// [`Heap::next_epoch`]; containers start at 0, which no pass ever uses.
pub type Epoch = u64;

/// The mark phase could not borrow a container because a mutation is live
/// somewhere on the stack. The whole collection must be skipped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GcAbort;

impl fmt::Display for GcAbort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("garbage collection aborted: a container is in use")
    }
}

/// What one sweep freed and what it left alive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub swept_lists: usize,
    pub swept_dicts: usize,
    pub live_lists: usize,
    pub live_dicts: usize,
}

impl SweepStats {
    /// True when the sweep reclaimed anything.
    #[inline]
    pub fn freed_any(&self) -> bool {
        self.swept_lists > 0 || self.swept_dicts > 0
    }
}

/// Registry of every live list and dictionary, plus the shared epoch
/// counter. Owned by the interpreter; containers do not point back at it.
#[derive(Default)]
pub struct Heap {
    lists: RefCell<Vec<Weak<ListCore>>>,
    dicts: RefCell<Vec<Weak<DictCore>>>,
    epoch: Cell<Epoch>,
}

impl Heap {
    pub fn new() -> Heap {
        Heap::default()
    }

    /// Allocate a list and record it in the roster.
    pub fn new_list(&self, items: Vec<Value>) -> ListHandle {
        let list = ListHandle::new_unregistered(items);
        self.lists.borrow_mut().push(list.weak());
        list
    }

    /// Allocate a dictionary and record it in the roster.
    pub fn new_dict(&self, entries: Vec<(Rc<str>, Value)>) -> DictHandle {
        let dict = DictHandle::new_unregistered(entries);
        self.dicts.borrow_mut().push(dict.weak());
        dict
    }

    /// A fresh, never-before-used pass stamp.
    pub fn next_epoch(&self) -> Epoch {
        let epoch = self.epoch.get().wrapping_add(1);
        self.epoch.set(epoch);
        epoch
    }

    /// Containers currently alive, for diagnostics.
    pub fn live_counts(&self) -> (usize, usize) {
        let lists = self.lists.borrow().iter().filter(|w| w.strong_count() > 0).count();
        let dicts = self.dicts.borrow().iter().filter(|w| w.strong_count() > 0).count();
        (lists, dicts)
    }

    /// Free every container not stamped with `epoch` by the mark phase.
    ///
    /// Lists with a registered watcher are exempt: a live `for` cursor is a
    /// dependency the reference count does not capture.
    pub fn sweep(&self, epoch: Epoch) -> SweepStats {
        let mut stats = SweepStats::default();

        // Upgrade everything first so draining one container's contents can
        // never free a shell the loop has yet to visit.
        let lists: Vec<ListHandle> = self
            .lists
            .borrow()
            .iter()
            .filter_map(|w| w.upgrade().map(ListHandle::from_core))
            .collect();
        let dicts: Vec<DictHandle> = self
            .dicts
            .borrow()
            .iter()
            .filter_map(|w| w.upgrade().map(DictHandle::from_core))
            .collect();

        // Pass 1: drain contents of unreferenced containers into a pen.
        // The values keep their own refcounts until the pen drops.
        let mut pen: Vec<Value> = Vec::new();
        let mut watcher_pen: Vec<DictWatcher> = Vec::new();
        for dict in &dicts {
            if dict.mark() != epoch {
                let (values, watchers) = dict.drain_for_sweep();
                pen.extend(values);
                watcher_pen.extend(watchers);
                stats.swept_dicts += 1;
            } else {
                stats.live_dicts += 1;
            }
        }
        for list in &lists {
            if list.mark() != epoch && !list.has_watchers() {
                pen.extend(list.drain_for_sweep());
                stats.swept_lists += 1;
            } else {
                stats.live_lists += 1;
            }
        }

        // Pass 2: drop the pen, then the shells. Cyclic references died
        // with the pen, so the upgraded handles are now the last ones for
        // every swept container.
        drop(watcher_pen);
        drop(pen);
        drop(lists);
        drop(dicts);

        self.lists.borrow_mut().retain(|w| w.strong_count() > 0);
        self.dicts.borrow_mut().retain(|w| w.strong_count() > 0);
        stats
    }
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (lists, dicts) = self.live_counts();
        f.debug_struct("Heap")
            .field("lists", &lists)
            .field("dicts", &dicts)
            .field("epoch", &self.epoch.get())
            .finish()
    }
}

/// Epoch-stamping graph walk used by the collector's mark phase.
///
/// Stamping happens before a container's contents are visited, so a cycle
/// terminates: the second encounter sees the current epoch and stops. The
/// walk keeps an explicit worklist instead of recursing, which makes its
/// depth independent of the structure's nesting.
pub struct Marker {
    epoch: Epoch,
}

impl Marker {
    pub fn new(epoch: Epoch) -> Marker {
        Marker { epoch }
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Stamp every container reachable from `value`.
    ///
    /// Fails with [`GcAbort`] when a container's contents are mutably
    /// borrowed; the caller must then skip the sweep entirely.
    pub fn mark_value(&self, value: &Value) -> Result<(), GcAbort> {
        let mut work: Vec<Value> = vec![value.clone()];
        while let Some(item) = work.pop() {
            match item {
                Value::List(list) => self.push_list(&list, &mut work)?,
                Value::Dict(dict) => self.push_dict(&dict, &mut work)?,
                Value::Partial(partial) => {
                    for arg in partial.bound_args() {
                        work.push(arg.clone());
                    }
                    if let Some(dict) = partial.self_dict() {
                        work.push(Value::Dict(dict.clone()));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Stamp every container reachable from `dict`.
    pub fn mark_dict(&self, dict: &DictHandle) -> Result<(), GcAbort> {
        self.mark_value(&Value::Dict(dict.clone()))
    }

    /// Stamp every container reachable from `list`.
    pub fn mark_list(&self, list: &ListHandle) -> Result<(), GcAbort> {
        self.mark_value(&Value::List(list.clone()))
    }

    fn push_list(&self, list: &ListHandle, work: &mut Vec<Value>) -> Result<(), GcAbort> {
        if list.mark() == self.epoch {
            return Ok(());
        }
        list.set_mark(self.epoch);
        let Some(items) = list.try_borrow_items() else {
            return Err(GcAbort);
        };
        for item in items.iter() {
            if wants_visit(item) {
                work.push(item.clone());
            }
        }
        Ok(())
    }

    fn push_dict(&self, dict: &DictHandle, work: &mut Vec<Value>) -> Result<(), GcAbort> {
        if dict.mark() == self.epoch {
            return Ok(());
        }
        dict.set_mark(self.epoch);
        let Some(entries) = dict.try_borrow_entries() else {
            return Err(GcAbort);
        };
        for item in entries.values() {
            if wants_visit(item) {
                work.push(item.clone());
            }
        }
        drop(entries);
        // Watcher callbacks are reachable through the dictionary.
        for callback in dict.watcher_callbacks() {
            if wants_visit(&callback) {
                work.push(callback);
            }
        }
        Ok(())
    }
}

/// Only containers and partials can lead to further containers.
fn wants_visit(value: &Value) -> bool {
    matches!(value, Value::List(_) | Value::Dict(_) | Value::Partial(_))
}
