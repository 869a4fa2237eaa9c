//! Shared mutable dictionaries.
//!
//! Insertion-ordered: iteration, `keys()`, and rendering all follow the
//! order keys were first added. A dictionary may be tagged as a scope
//! (global, buffer-local, function arguments, ...), which the resolver and
//! assignment paths consult for their extra rules.
//!
//! Change watchers are stored here but fired by the evaluator after a
//! successful mutation; the container only matches keys against patterns.

use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;

use crate::error::Vres;
use crate::heap::Epoch;
use crate::lock::VarLock;
use crate::value::Value;

type Entries = IndexMap<Rc<str>, Value, FxBuildHasher>;

/// What a scope-tagged dictionary stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Buffer,
    Window,
    Tab,
    Script,
    /// `l:` locals of one call frame.
    FuncLocal,
    /// `a:` arguments of one call frame.
    FuncArgs,
    /// The reserved `v:` table.
    Reserved,
}

/// A change callback registered on a dictionary.
///
/// `pattern` matches keys exactly, or as a prefix when it ends in `*`.
#[derive(Clone)]
pub struct DictWatcher {
    pub pattern: Rc<str>,
    pub callback: Value,
}

impl DictWatcher {
    pub fn matches(&self, key: &str) -> bool {
        match self.pattern.strip_suffix('*') {
            Some(prefix) => key.starts_with(prefix),
            None => *self.pattern == *key,
        }
    }
}

pub(crate) struct DictCore {
    lock: Cell<VarLock>,
    scope: Cell<Option<ScopeKind>>,
    mark: Cell<Epoch>,
    copy_of: RefCell<Option<Weak<DictCore>>>,
    body: RefCell<DictBody>,
}

#[derive(Default)]
struct DictBody {
    entries: Entries,
    watchers: Vec<DictWatcher>,
}

/// Reference-counted dictionary handle.
#[derive(Clone)]
pub struct DictHandle(Rc<DictCore>);

impl DictHandle {
    /// Used by [`crate::heap::Heap::new_dict`]; dictionaries are only built through the
    /// heap so every one of them is known to the sweep.
    pub(crate) fn new_unregistered(entries: Vec<(Rc<str>, Value)>) -> DictHandle {
        let mut map = Entries::default();
        for (k, v) in entries {
            map.insert(k, v);
        }
        DictHandle(Rc::new(DictCore {
            lock: Cell::new(VarLock::Unlocked),
            scope: Cell::new(None),
            mark: Cell::new(0),
            copy_of: RefCell::new(None),
            body: RefCell::new(DictBody { entries: map, watchers: Vec::new() }),
        }))
    }

    pub(crate) fn weak(&self) -> Weak<DictCore> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn from_core(core: Rc<DictCore>) -> DictHandle {
        DictHandle(core)
    }

    #[inline]
    pub fn ptr_eq(&self, other: &DictHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    #[inline]
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub fn len(&self) -> usize {
        self.0.body.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.body.borrow().entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.body.borrow().entries.get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.body.borrow().entries.contains_key(key)
    }

    /// Borrow the entries read-only. Callers must not hold this across
    /// script callbacks.
    pub fn borrow_entries(&self) -> Ref<'_, Entries> {
        Ref::map(self.0.body.borrow(), |b| &b.entries)
    }

    pub(crate) fn try_borrow_entries(&self) -> Option<Ref<'_, Entries>> {
        match self.0.body.try_borrow() {
            Ok(b) => Some(Ref::map(b, |b| &b.entries)),
            Err(_) => None,
        }
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<Rc<str>> {
        self.0.body.borrow().entries.keys().cloned().collect()
    }

    /// `(key, value)` pairs in insertion order.
    pub fn snapshot(&self) -> Vec<(Rc<str>, Value)> {
        self.0.body.borrow().entries.iter().map(|(k, v)| (Rc::clone(k), v.clone())).collect()
    }

    // Mutators. Lock checks happen at the call site.

    /// Insert or overwrite; overwriting keeps the key's original position.
    /// Returns the previous value, if any.
    pub fn insert(&self, key: Rc<str>, value: Value) -> Option<Value> {
        self.0.body.borrow_mut().entries.insert(key, value)
    }

    /// Remove, preserving the order of the remaining entries.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.body.borrow_mut().entries.shift_remove(key)
    }

    // Scope tagging

    pub fn scope(&self) -> Option<ScopeKind> {
        self.0.scope.get()
    }

    pub fn set_scope(&self, scope: ScopeKind) {
        self.0.scope.set(Some(scope));
    }

    pub fn is_scope(&self) -> bool {
        self.0.scope.get().is_some()
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

    pub fn check_lock(&self, what: &str) -> Vres<()> {
        match self.0.lock.get() {
            VarLock::Unlocked => Ok(()),
            VarLock::Locked => Err(crate::error::locked(what)),
            VarLock::Fixed => Err(crate::error::fixed(what)),
        }
    }

    // Change watchers

    pub fn add_watcher(&self, watcher: DictWatcher) {
        self.0.body.borrow_mut().watchers.push(watcher);
    }

    /// Remove the first watcher with the same pattern and callback value.
    /// Returns whether one was removed.
    pub fn remove_watcher(&self, pattern: &str, callback: &Value) -> bool {
        let mut body = self.0.body.borrow_mut();
        let before = body.watchers.len();
        let mut removed = false;
        body.watchers.retain(|w| {
            if removed {
                return true;
            }
            let is_match = *w.pattern == *pattern && callbacks_alias(&w.callback, callback);
            removed = removed || is_match;
            !is_match
        });
        body.watchers.len() != before
    }

    pub fn has_watchers(&self) -> bool {
        !self.0.body.borrow().watchers.is_empty()
    }

    /// Watchers whose pattern matches `key`, cloned so the caller can fire
    /// them without holding a borrow.
    pub fn watchers_matching(&self, key: &str) -> Vec<DictWatcher> {
        self.0.body.borrow().watchers.iter().filter(|w| w.matches(key)).cloned().collect()
    }

    /// Watcher callbacks, for GC rooting.
    pub fn watcher_callbacks(&self) -> Vec<Value> {
        self.0.body.borrow().watchers.iter().map(|w| w.callback.clone()).collect()
    }

    // GC / copy metadata

    pub(crate) fn mark(&self) -> Epoch {
        self.0.mark.get()
    }

    pub(crate) fn set_mark(&self, epoch: Epoch) {
        self.0.mark.set(epoch);
    }

    pub(crate) fn copy_link(&self) -> Option<DictHandle> {
        self.0.copy_of.borrow().as_ref().and_then(Weak::upgrade).map(DictHandle)
    }

    pub(crate) fn set_copy_link(&self, copy: &DictHandle) {
        *self.0.copy_of.borrow_mut() = Some(Rc::downgrade(&copy.0));
    }

    /// Drain entries and watchers, keeping the shell alive (sweep pass one).
    pub(crate) fn drain_for_sweep(&self) -> (Vec<Value>, Vec<DictWatcher>) {
        let mut body = self.0.body.borrow_mut();
        let entries = std::mem::take(&mut body.entries);
        let watchers = std::mem::take(&mut body.watchers);
        (entries.into_values().collect(), watchers)
    }
}

/// Two callback values alias when they name the same function and bind the
/// same partial instance.
fn callbacks_alias(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Func(x), Value::Func(y)) => x == y,
        (Value::Partial(x), Value::Partial(y)) => x.ptr_eq(y),
        _ => false,
    }
}

impl fmt::Debug for DictHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.body.try_borrow() {
            Ok(body) => f.debug_map().entries(body.entries.iter()).finish(),
            Err(_) => f.write_str("{<borrowed>}"),
        }
    }
}
