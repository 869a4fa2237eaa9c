//! Shallow and deep copies.
//!
//! A shallow copy makes a new container whose items are cheap clones of the
//! originals, so nested containers stay shared. A deep copy duplicates
//! nested lists and dictionaries too; the pass carries an epoch so a
//! container reached twice (shared substructure, or a cycle) maps to one
//! copy instead of being expanded into a tree. Blobs duplicate their bytes
//! in both modes; partials are reference copies in both modes.
//!
//! Copies always start out unlocked, whatever the original's lock state.

use std::cell::Cell;

use crate::blob::BlobHandle;
use crate::error::{copy_nested_too_deep, Vres};
use crate::heap::{Epoch, Heap};
use crate::value::Value;

/// Maximum container nesting for one deep-copy pass.
pub const COPY_DEPTH_MAX: usize = 100;

/// Copy slice of `value`: new top-level container, shared children.
pub fn shallow_copy(value: &Value, heap: &Heap) -> Value {
    match value {
        Value::List(list) => Value::List(heap.new_list(list.snapshot())),
        Value::Dict(dict) => Value::Dict(heap.new_dict(dict.snapshot())),
        Value::Blob(blob) => Value::Blob(BlobHandle::new(blob.snapshot())),
        other => other.clone(),
    }
}

/// Recursively duplicate `value` with one fresh pass.
pub fn deep_copy(value: &Value, heap: &Heap) -> Vres<Value> {
    CopyPass::new(heap).copy_value(value)
}

/// State of one deep-copy traversal.
///
/// The pass stamps every container it copies with its epoch and links the
/// original to the copy; re-encountering a stamped container returns that
/// linked copy, which preserves sharing and terminates cycles. A failed
/// pass may leave partially built cyclic copies behind; they are ordinary
/// unreachable cycles and the next collection reclaims them.
pub struct CopyPass<'h> {
    heap: &'h Heap,
    epoch: Epoch,
    depth: Cell<usize>,
}

impl<'h> CopyPass<'h> {
    pub fn new(heap: &'h Heap) -> CopyPass<'h> {
        CopyPass { heap, epoch: heap.next_epoch(), depth: Cell::new(0) }
    }

    /// Deep-copy one value within this pass.
    pub fn copy_value(&self, value: &Value) -> Vres<Value> {
        if self.depth.get() >= COPY_DEPTH_MAX {
            return Err(copy_nested_too_deep());
        }
        self.depth.set(self.depth.get() + 1);
        let copied = self.copy_inner(value);
        self.depth.set(self.depth.get() - 1);
        copied
    }

    fn copy_inner(&self, value: &Value) -> Vres<Value> {
        match value {
            Value::List(list) => {
                // A list already stamped this pass has its copy linked;
                // reuse it so `copy[0] is copy[1]` holds where it did in
                // the original.
                if list.mark() == self.epoch {
                    if let Some(copy) = list.copy_link() {
                        return Ok(Value::List(copy));
                    }
                }
                let copy = self.heap.new_list(Vec::new());
                list.set_mark(self.epoch);
                list.set_copy_link(&copy);
                for item in list.snapshot() {
                    copy.push(self.copy_value(&item)?);
                }
                Ok(Value::List(copy))
            }
            Value::Dict(dict) => {
                if dict.mark() == self.epoch {
                    if let Some(copy) = dict.copy_link() {
                        return Ok(Value::Dict(copy));
                    }
                }
                let copy = self.heap.new_dict(Vec::new());
                dict.set_mark(self.epoch);
                dict.set_copy_link(&copy);
                for (key, item) in dict.snapshot() {
                    copy.insert(key, self.copy_value(&item)?);
                }
                Ok(Value::Dict(copy))
            }
            Value::Blob(blob) => Ok(Value::Blob(BlobHandle::new(blob.snapshot()))),
            other => Ok(other.clone()),
        }
    }
}
