//! Iteration protocols: `for` cursors and the filter/map family.
//!
//! A list cursor is a registered watcher: the list adjusts it when items
//! are inserted or removed, so removing the current element mid-loop makes
//! the cursor land on the next element instead of skipping one. Blob and
//! string cursors iterate a snapshot.
//!
//! `filter_map` drives `filter`/`map`/`mapnew`/`foreach`: it binds the
//! reserved `v:key`/`v:val` around each item (saved and restored even on
//! error), transiently locks the container against script mutation for the
//! duration of the walk, and applies the per-mode result rules.

use std::fmt;
use std::rc::Rc;

use smallvec::smallvec;

use veil_value::{BlobHandle, DictHandle, ListHandle, Value, VarLock};

use crate::error::{self, Result};
use crate::interp::Interpreter;
use crate::lval::byte_value;

/// A `for` loop cursor over one iterable value.
pub struct ForCursor(Inner);

enum Inner {
    List(veil_value::WatchGuard),
    Blob { bytes: Vec<u8>, pos: usize },
    Str { text: String, pos: usize },
}

impl ForCursor {
    /// The next element, or `None` when the iteration is done.
    pub fn next(&mut self) -> Option<Value> {
        match &mut self.0 {
            Inner::List(guard) => {
                let pos = guard.position();
                let item = guard.list().get(i64::try_from(pos).ok()?)?;
                guard.set_position(pos + 1);
                Some(item)
            }
            Inner::Blob { bytes, pos } => {
                let byte = bytes.get(*pos).copied()?;
                *pos += 1;
                Some(Value::Number(i64::from(byte)))
            }
            Inner::Str { text, pos } => {
                let ch = text[*pos..].chars().next()?;
                *pos += ch.len_utf8();
                Some(Value::str(ch.to_string()))
            }
        }
    }
}

impl fmt::Debug for ForCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (kind, pos) = match &self.0 {
            Inner::List(guard) => ("list", guard.position()),
            Inner::Blob { pos, .. } => ("blob", *pos),
            Inner::Str { pos, .. } => ("string", *pos),
        };
        f.debug_struct("ForCursor").field("kind", &kind).field("pos", &pos).finish()
    }
}

/// Which of the filter/map family a walk implements.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterMapMode {
    /// Keep items whose result is truthy; removes in place.
    Filter,
    /// Replace each item with its result, in place.
    Map,
    /// Build a fresh sibling container; the source is untouched.
    MapNew,
    /// Evaluate for side effects, results discarded.
    Foreach,
}

impl FilterMapMode {
    fn mutates(self) -> bool {
        matches!(self, FilterMapMode::Filter | FilterMapMode::Map)
    }
}

impl Interpreter {
    /// Build an iteration cursor over `value` for a host `for` loop.
    pub fn for_cursor(&self, value: &Value) -> Result<ForCursor> {
        match value {
            Value::List(list) => Ok(ForCursor(Inner::List(list.watch(0)))),
            Value::Blob(blob) => Ok(ForCursor(Inner::Blob { bytes: blob.snapshot(), pos: 0 })),
            Value::Str(s) => Ok(ForCursor(Inner::Str { text: (**s).to_owned(), pos: 0 })),
            other => Err(error::type_error(format!("cannot iterate over a {}", other.kind_name()))),
        }
    }

    /// Drive one filter/map walk over `target`.
    ///
    /// `func` is either a callable (invoked with `(key, val)`) or a string
    /// holding expression text re-evaluated per item with `v:key`/`v:val`
    /// bound.
    pub fn filter_map(&self, target: &Value, mode: FilterMapMode, func: &Value) -> Result<Value> {
        let _busy = self.busy_guard();
        let _saved = VvSave::capture(self);
        match target {
            Value::List(list) => self.fm_list(list, mode, func),
            Value::Dict(dict) => self.fm_dict(dict, mode, func),
            Value::Blob(blob) => self.fm_blob(blob, mode, func),
            Value::Str(s) => self.fm_str(s, mode, func),
            other => Err(error::arg_type("filter/map", "List, Dictionary, Blob or String", other.kind_name())),
        }
    }

    /// One item: bind `v:key`/`v:val`, evaluate the expression text or
    /// invoke the callable.
    fn fm_item(&self, func: &Value, key: Value, val: Value) -> Result<Value> {
        self.check_interrupt()?;
        self.vvars.insert(Rc::from("key"), key.clone());
        self.vvars.insert(Rc::from("val"), val.clone());
        match func {
            Value::Str(text) => self.eval_nested(text),
            callable => self.call(callable, smallvec![key, val], None),
        }
    }

    fn fm_list(&self, list: &ListHandle, mode: FilterMapMode, func: &Value) -> Result<Value> {
        if mode.mutates() {
            list.check_lock("list")?;
        }
        let _lock = TransientLock::hold(Prior::List(list.clone(), list.lock_state()));
        let mut fresh: Vec<Value> = Vec::new();
        let guard = list.watch(0);
        loop {
            let pos = guard.position();
            let Some(item) = list.get(i64::try_from(pos).unwrap_or(i64::MAX)) else {
                break;
            };
            guard.set_position(pos + 1);
            let result = self.fm_item(func, Value::Number(i64::try_from(pos).unwrap_or(i64::MAX)), item)?;
            match mode {
                FilterMapMode::Filter => {
                    if !result.truthy()? {
                        // The watcher pulls the cursor back onto the
                        // element that slides into this slot.
                        list.remove_at(pos);
                    }
                }
                FilterMapMode::Map => list.set_at(pos, result),
                FilterMapMode::MapNew => fresh.push(result),
                FilterMapMode::Foreach => {}
            }
        }
        drop(guard);
        if mode == FilterMapMode::MapNew {
            return Ok(Value::List(self.heap.new_list(fresh)));
        }
        Ok(Value::List(list.clone()))
    }

    fn fm_dict(&self, dict: &DictHandle, mode: FilterMapMode, func: &Value) -> Result<Value> {
        if mode.mutates() {
            dict.check_lock("dictionary")?;
        }
        let _lock = TransientLock::hold(Prior::Dict(dict.clone(), dict.lock_state()));
        let mut fresh: Vec<(Rc<str>, Value)> = Vec::new();
        for (key, val) in dict.snapshot() {
            let result = self.fm_item(func, Value::Str(Rc::clone(&key)), val)?;
            match mode {
                FilterMapMode::Filter => {
                    if !result.truthy()? {
                        dict.remove(&key);
                    }
                }
                FilterMapMode::Map => {
                    dict.insert(key, result);
                }
                FilterMapMode::MapNew => fresh.push((key, result)),
                FilterMapMode::Foreach => {}
            }
        }
        if mode == FilterMapMode::MapNew {
            return Ok(Value::Dict(self.heap.new_dict(fresh)));
        }
        Ok(Value::Dict(dict.clone()))
    }

    fn fm_blob(&self, blob: &BlobHandle, mode: FilterMapMode, func: &Value) -> Result<Value> {
        if mode.mutates() {
            blob.check_lock("blob")?;
        }
        let _lock = TransientLock::hold(Prior::Blob(blob.clone(), blob.lock_state()));
        let bytes = blob.snapshot();
        let mut fresh: Vec<u8> = Vec::new();
        let mut falsy: Vec<usize> = Vec::new();
        for (at, byte) in bytes.iter().enumerate() {
            let key = Value::Number(i64::try_from(at).unwrap_or(i64::MAX));
            let result = self.fm_item(func, key, Value::Number(i64::from(*byte)))?;
            match mode {
                FilterMapMode::Filter => {
                    if !result.truthy()? {
                        falsy.push(at);
                    }
                }
                FilterMapMode::Map => blob.set_at(at, byte_value(&result)?),
                FilterMapMode::MapNew => fresh.push(byte_value(&result)?),
                FilterMapMode::Foreach => {}
            }
        }
        // Splice falsy bytes out back to front so indices stay valid.
        for at in falsy.into_iter().rev() {
            blob.remove_span(at, at);
        }
        if mode == FilterMapMode::MapNew {
            return Ok(Value::Blob(BlobHandle::new(fresh)));
        }
        Ok(Value::Blob(blob.clone()))
    }

    /// Strings are immutable: every mode but `foreach` builds a new one.
    fn fm_str(&self, text: &Rc<str>, mode: FilterMapMode, func: &Value) -> Result<Value> {
        let mut out = String::new();
        for (at, ch) in text.chars().enumerate() {
            let key = Value::Number(i64::try_from(at).unwrap_or(i64::MAX));
            let item = Value::str(ch.to_string());
            let result = self.fm_item(func, key, item.clone())?;
            match mode {
                FilterMapMode::Filter => {
                    if result.truthy()? {
                        out.push(ch);
                    }
                }
                FilterMapMode::Map | FilterMapMode::MapNew => match result {
                    Value::Str(piece) => out.push_str(&piece),
                    other => {
                        return Err(error::arg_type("map", "String result", other.kind_name()));
                    }
                },
                FilterMapMode::Foreach => {}
            }
        }
        if mode == FilterMapMode::Foreach {
            return Ok(Value::Str(Rc::clone(text)));
        }
        Ok(Value::str(out))
    }
}

/// Previous `v:key`/`v:val`, restored when the walk unwinds.
struct VvSave<'i> {
    interp: &'i Interpreter,
    key: Option<Value>,
    val: Option<Value>,
}

impl<'i> VvSave<'i> {
    fn capture(interp: &'i Interpreter) -> VvSave<'i> {
        VvSave {
            interp,
            key: interp.vvars.get("key"),
            val: interp.vvars.get("val"),
        }
    }
}

impl Drop for VvSave<'_> {
    fn drop(&mut self) {
        match self.key.take() {
            Some(key) => {
                self.interp.vvars.insert(Rc::from("key"), key);
            }
            None => {
                self.interp.vvars.remove("key");
            }
        }
        match self.val.take() {
            Some(val) => {
                self.interp.vvars.insert(Rc::from("val"), val);
            }
            None => {
                self.interp.vvars.remove("val");
            }
        }
    }
}

enum Prior {
    List(ListHandle, VarLock),
    Dict(DictHandle, VarLock),
    Blob(BlobHandle, VarLock),
}

/// Locks a container for the duration of a walk, restoring the previous
/// lock state on all exits.
struct TransientLock(Prior);

impl TransientLock {
    fn hold(prior: Prior) -> TransientLock {
        match &prior {
            Prior::List(list, _) => list.set_lock(VarLock::Locked),
            Prior::Dict(dict, _) => dict.set_lock(VarLock::Locked),
            Prior::Blob(blob, _) => blob.set_lock(VarLock::Locked),
        }
        TransientLock(prior)
    }
}

impl Drop for TransientLock {
    fn drop(&mut self) {
        match &self.0 {
            Prior::List(list, lock) => list.set_lock(*lock),
            Prior::Dict(dict, lock) => dict.set_lock(*lock),
            Prior::Blob(blob, lock) => blob.set_lock(*lock),
        }
    }
}
