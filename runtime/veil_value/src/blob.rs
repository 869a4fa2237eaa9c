//! Shared mutable byte buffers.
//!
//! Blobs carry no references, so they stay out of the garbage collector's
//! roster entirely; reference counting alone reclaims them.

use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::error::Vres;
use crate::list::resolve_index;
use crate::lock::VarLock;

struct BlobCore {
    lock: Cell<VarLock>,
    bytes: RefCell<Vec<u8>>,
}

/// Reference-counted blob handle.
#[derive(Clone)]
pub struct BlobHandle(Rc<BlobCore>);

impl BlobHandle {
    pub fn new(bytes: Vec<u8>) -> BlobHandle {
        BlobHandle(Rc::new(BlobCore { lock: Cell::new(VarLock::Unlocked), bytes: RefCell::new(bytes) }))
    }

    #[inline]
    pub fn ptr_eq(&self, other: &BlobHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn len(&self) -> usize {
        self.0.bytes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.bytes.borrow().is_empty()
    }

    pub fn borrow_bytes(&self) -> Ref<'_, Vec<u8>> {
        self.0.bytes.borrow()
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.0.bytes.borrow().clone()
    }

    /// Byte at a possibly-negative index.
    pub fn get(&self, index: i64) -> Option<u8> {
        let bytes = self.0.bytes.borrow();
        let at = resolve_index(bytes.len(), index)?;
        bytes.get(at).copied()
    }

    /// Resolve a possibly-negative index against the current length.
    pub fn resolve(&self, index: i64) -> Option<usize> {
        resolve_index(self.len(), index)
    }

    // Mutators. Lock checks happen at the call site.

    /// Write a byte at `at`, or append when `at` equals the length.
    pub fn set_at(&self, at: usize, byte: u8) {
        let mut bytes = self.0.bytes.borrow_mut();
        if at == bytes.len() {
            bytes.push(byte);
        } else if at < bytes.len() {
            bytes[at] = byte;
        }
    }

    /// Insert a byte before `at`, or append when `at` equals the length.
    pub fn insert_at(&self, at: usize, byte: u8) {
        let mut bytes = self.0.bytes.borrow_mut();
        let at = at.min(bytes.len());
        bytes.insert(at, byte);
    }

    /// Replace `start..=end` with `new`, which must have the same length.
    pub fn write_span(&self, start: usize, new: &[u8]) {
        let mut bytes = self.0.bytes.borrow_mut();
        let end = start.saturating_add(new.len()).min(bytes.len());
        bytes[start..end].copy_from_slice(&new[..end.saturating_sub(start)]);
    }

    /// Remove `start..=end` inclusive.
    pub fn remove_span(&self, start: usize, end: usize) {
        let mut bytes = self.0.bytes.borrow_mut();
        if start < bytes.len() && start <= end {
            let end = end.min(bytes.len().saturating_sub(1));
            bytes.drain(start..=end);
        }
    }

    /// New blob of `start..end` (exclusive), bounds already clamped.
    pub fn slice(&self, start: usize, end: usize) -> BlobHandle {
        let bytes = self.0.bytes.borrow();
        let end = end.min(bytes.len());
        let out = if start < end { bytes[start..end].to_vec() } else { Vec::new() };
        drop(bytes);
        BlobHandle::new(out)
    }

    /// New blob holding both operands' bytes.
    pub fn concat(&self, other: &BlobHandle) -> BlobHandle {
        let mut out = self.snapshot();
        out.extend(other.snapshot());
        BlobHandle::new(out)
    }

    pub fn bytes_equal(&self, other: &BlobHandle) -> bool {
        self.ptr_eq(other) || *self.0.bytes.borrow() == *other.0.bytes.borrow()
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
}

impl fmt::Debug for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0z")?;
        for b in self.0.bytes.borrow().iter() {
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}
