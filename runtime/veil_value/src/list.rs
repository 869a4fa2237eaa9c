//! Shared mutable lists.
//!
//! A [`ListHandle`] is a reference-counted handle with identity semantics:
//! clones share the same storage. Live iterators register *watchers*, index
//! cursors the list itself adjusts when items are inserted or removed, so
//! removing the element under a cursor leaves the cursor on the element
//! that slides into its place.
//!
//! Metadata (lock state, GC mark, copy link) lives outside the item borrow
//! so the collector and the deep-copier can stamp a list that is being
//! iterated elsewhere.

use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::Vres;
use crate::heap::{Epoch, Heap};
use crate::lock::VarLock;
use crate::value::Value;

pub(crate) struct ListCore {
    lock: Cell<VarLock>,
    mark: Cell<Epoch>,
    copy_of: RefCell<Option<Weak<ListCore>>>,
    body: RefCell<ListBody>,
}

#[derive(Default)]
struct ListBody {
    items: Vec<Value>,
    watchers: Vec<Weak<Cell<usize>>>,
}

/// Reference-counted list handle.
#[derive(Clone)]
pub struct ListHandle(Rc<ListCore>);

/// Resolve a possibly-negative index against `len`; negative counts from
/// the end. Out of range yields `None`.
pub(crate) fn resolve_index(len: usize, index: i64) -> Option<usize> {
    let n = i64::try_from(len).ok()?;
    let real = if index < 0 { index.checked_add(n)? } else { index };
    if (0..n).contains(&real) {
        usize::try_from(real).ok()
    } else {
        None
    }
}

impl ListHandle {
    /// Used by [`Heap::new_list`]; lists are only built through the heap so
    /// every one of them is known to the sweep.
    pub(crate) fn new_unregistered(items: Vec<Value>) -> ListHandle {
        ListHandle(Rc::new(ListCore {
            lock: Cell::new(VarLock::Unlocked),
            mark: Cell::new(0),
            copy_of: RefCell::new(None),
            body: RefCell::new(ListBody { items, watchers: Vec::new() }),
        }))
    }

    pub(crate) fn weak(&self) -> Weak<ListCore> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn from_core(core: Rc<ListCore>) -> ListHandle {
        ListHandle(core)
    }

    /// Identity comparison.
    #[inline]
    pub fn ptr_eq(&self, other: &ListHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Stable address, used as an identity key.
    #[inline]
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub fn len(&self) -> usize {
        self.0.body.borrow().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.body.borrow().items.is_empty()
    }

    /// Borrow the items read-only. Callers must not hold this across script
    /// callbacks.
    pub fn borrow_items(&self) -> Ref<'_, Vec<Value>> {
        Ref::map(self.0.body.borrow(), |b| &b.items)
    }

    pub(crate) fn try_borrow_items(&self) -> Option<Ref<'_, Vec<Value>>> {
        match self.0.body.try_borrow() {
            Ok(b) => Some(Ref::map(b, |b| &b.items)),
            Err(_) => None,
        }
    }

    /// Item at a possibly-negative index.
    pub fn get(&self, index: i64) -> Option<Value> {
        let body = self.0.body.borrow();
        let at = resolve_index(body.items.len(), index)?;
        body.items.get(at).cloned()
    }

    /// Resolve a possibly-negative index against the current length.
    pub fn resolve(&self, index: i64) -> Option<usize> {
        resolve_index(self.len(), index)
    }

    pub fn snapshot(&self) -> Vec<Value> {
        self.0.body.borrow().items.clone()
    }

    // Mutators. Lock checks happen at the call site, before the mutation.

    pub fn push(&self, value: Value) {
        self.0.body.borrow_mut().items.push(value);
    }

    pub fn set_at(&self, at: usize, value: Value) {
        let mut body = self.0.body.borrow_mut();
        if at < body.items.len() {
            body.items[at] = value;
        }
    }

    /// Insert before `at`; cursors at or past the insertion point shift
    /// right so they keep pointing at the same element.
    pub fn insert_at(&self, at: usize, value: Value) {
        let mut body = self.0.body.borrow_mut();
        let at = at.min(body.items.len());
        body.items.insert(at, value);
        adjust_watchers(&mut body.watchers, |pos| if pos >= at { pos + 1 } else { pos });
    }

    /// Remove the item at `at`. A cursor sitting on `at` stays put, now
    /// addressing the element that slid in; cursors past it step back.
    pub fn remove_at(&self, at: usize) -> Option<Value> {
        let mut body = self.0.body.borrow_mut();
        if at >= body.items.len() {
            return None;
        }
        let removed = body.items.remove(at);
        adjust_watchers(&mut body.watchers, |pos| if pos > at { pos - 1 } else { pos });
        Some(removed)
    }

    /// Remove `start..=end` inclusive. Cursors inside the span move to the
    /// element after it; cursors past the span step back by its length.
    pub fn remove_span(&self, start: usize, end: usize) -> Vec<Value> {
        let mut body = self.0.body.borrow_mut();
        let len = body.items.len();
        if start >= len || end < start {
            return Vec::new();
        }
        let end = end.min(len - 1);
        let removed: Vec<Value> = body.items.drain(start..=end).collect();
        let count = removed.len();
        adjust_watchers(&mut body.watchers, |pos| {
            if pos > end {
                pos - count
            } else if pos >= start {
                start
            } else {
                pos
            }
        });
        removed
    }

    /// Append a snapshot of `other` (safe when `other` is this list).
    pub fn extend_from(&self, other: &ListHandle) {
        let added = other.snapshot();
        self.0.body.borrow_mut().items.extend(added);
    }

    /// New list holding both operands' items, shallow-copied.
    pub fn concat(&self, other: &ListHandle, heap: &Heap) -> ListHandle {
        let mut items = self.snapshot();
        items.extend(other.snapshot());
        heap.new_list(items)
    }

    /// New list of `start..end` (exclusive), bounds already clamped.
    pub fn slice(&self, start: usize, end: usize, heap: &Heap) -> ListHandle {
        let body = self.0.body.borrow();
        let end = end.min(body.items.len());
        let items = if start < end { body.items[start..end].to_vec() } else { Vec::new() };
        drop(body);
        heap.new_list(items)
    }

    // Locks

    pub fn lock_state(&self) -> VarLock {
        self.0.lock.get()
    }

    pub fn set_lock(&self, lock: VarLock) {
        self.0.lock.set(lock);
    }

    pub fn apply_lock(&self, lock: bool) {
        self.0.lock.set(self.0.lock.get().apply(lock));
    }

    /// Error when the list may not be mutated; `what` names the target.
    pub fn check_lock(&self, what: &str) -> Vres<()> {
        match self.0.lock.get() {
            VarLock::Unlocked => Ok(()),
            VarLock::Locked => Err(crate::error::locked(what)),
            VarLock::Fixed => Err(crate::error::fixed(what)),
        }
    }

    // Watchers

    /// Register a cursor starting at `start` and return its guard; dropping
    /// the guard unregisters.
    pub fn watch(&self, start: usize) -> WatchGuard {
        let cursor = Rc::new(Cell::new(start));
        self.0.body.borrow_mut().watchers.push(Rc::downgrade(&cursor));
        WatchGuard { list: self.clone(), cursor }
    }

    /// True when a live cursor is registered; the sweep leaves such lists
    /// alone.
    pub fn has_watchers(&self) -> bool {
        let mut body = self.0.body.borrow_mut();
        body.watchers.retain(|w| w.strong_count() > 0);
        !body.watchers.is_empty()
    }

    fn unwatch(&self, cursor: &Rc<Cell<usize>>) {
        let mut body = self.0.body.borrow_mut();
        body.watchers.retain(|w| w.strong_count() > 0 && !w.ptr_eq(&Rc::downgrade(cursor)));
    }

    // GC / copy metadata (no body borrow involved)

    pub(crate) fn mark(&self) -> Epoch {
        self.0.mark.get()
    }

    pub(crate) fn set_mark(&self, epoch: Epoch) {
        self.0.mark.set(epoch);
    }

    pub(crate) fn copy_link(&self) -> Option<ListHandle> {
        self.0.copy_of.borrow().as_ref().and_then(Weak::upgrade).map(ListHandle)
    }

    pub(crate) fn set_copy_link(&self, copy: &ListHandle) {
        *self.0.copy_of.borrow_mut() = Some(Rc::downgrade(&copy.0));
    }

    /// Drain the items, keeping the shell alive (sweep pass one).
    pub(crate) fn drain_for_sweep(&self) -> Vec<Value> {
        let mut body = self.0.body.borrow_mut();
        std::mem::take(&mut body.items)
    }

    /// Hold the body mutably, simulating an in-progress mutation.
    #[cfg(test)]
    pub(crate) fn hold_mut_for_test(&self) -> std::cell::RefMut<'_, Vec<Value>> {
        std::cell::RefMut::map(self.0.body.borrow_mut(), |b| &mut b.items)
    }
}

fn adjust_watchers(watchers: &mut Vec<Weak<Cell<usize>>>, fix: impl Fn(usize) -> usize) {
    watchers.retain(|w| {
        let Some(cursor) = w.upgrade() else { return false };
        cursor.set(fix(cursor.get()));
        true
    });
}

/// Keeps a list cursor registered; unregisters on drop.
pub struct WatchGuard {
    list: ListHandle,
    cursor: Rc<Cell<usize>>,
}

impl WatchGuard {
    pub fn position(&self) -> usize {
        self.cursor.get()
    }

    pub fn set_position(&self, pos: usize) {
        self.cursor.set(pos);
    }

    pub fn list(&self) -> &ListHandle {
        &self.list
    }
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.list.unwatch(&self.cursor);
    }
}

impl fmt::Debug for ListHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.body.try_borrow() {
            Ok(body) => f.debug_list().entries(body.items.iter()).finish(),
            Err(_) => f.write_str("[<borrowed>]"),
        }
    }
}
