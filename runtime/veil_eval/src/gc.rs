//! Cycle collection orchestration.
//!
//! Reference counting reclaims acyclic garbage the moment the last handle
//! drops; this module runs the mark phase over the interpreter's roots and
//! hands the epoch to the heap's sweep to break cycles. Collection only
//! happens at safe points: while any evaluation, call, or iteration driver
//! is on the stack the request is recorded and honored at the next
//! outermost entry point.

use tracing::{debug, instrument};

use veil_value::{GcAbort, Marker, SweepStats, Value};

use crate::func::Frame;
use crate::host::MessageKind;
use crate::interp::{Interpreter, RootId};

impl Interpreter {
    /// Collect cyclic garbage now, or defer when evaluation is live.
    ///
    /// Returns the sweep statistics, or `None` when the collection was
    /// deferred or aborted. With `verbose`, the outcome also goes to the
    /// host message sink.
    #[instrument(level = "debug", skip_all)]
    pub fn run_gc(&self, verbose: bool) -> Option<SweepStats> {
        if self.busy.get() > 0 || self.expr_depth.get() > 0 || self.call_nesting.get() > 0 {
            self.gc_wanted.set(true);
            debug!("collection deferred: evaluation in progress");
            return None;
        }
        self.gc_wanted.set(false);

        let epoch = self.heap.next_epoch();
        let marker = Marker::new(epoch);
        if let Err(GcAbort) = self.mark_roots(&marker) {
            debug!("collection aborted: a container is borrowed");
            if verbose {
                self.host.message(MessageKind::Warning, &GcAbort.to_string());
            }
            return None;
        }

        let stats = self.heap.sweep(epoch);
        debug!(
            swept_lists = stats.swept_lists,
            swept_dicts = stats.swept_dicts,
            live_lists = stats.live_lists,
            live_dicts = stats.live_dicts,
            "collection finished"
        );
        if verbose {
            self.host.message(
                MessageKind::Info,
                &format!(
                    "collected {} lists and {} dictionaries ({} live)",
                    stats.swept_lists,
                    stats.swept_dicts,
                    stats.live_lists + stats.live_dicts,
                ),
            );
        }
        Some(stats)
    }

    /// Run a deferred collection if one was requested and evaluation has
    /// fully unwound.
    pub(crate) fn maybe_collect(&self) {
        if self.gc_wanted.get() {
            let _ = self.run_gc(false);
        }
    }

    /// Request a collection at the next safe point.
    pub fn request_gc(&self) {
        self.gc_wanted.set(true);
    }

    /// Keep `value` alive across collections (host-held timer or channel
    /// callbacks). The returned ticket releases it.
    pub fn add_gc_root(&self, value: Value) -> RootId {
        let id = RootId(self.root_seq.get() + 1);
        self.root_seq.set(id.0);
        self.extra_roots.borrow_mut().push((id, value));
        id
    }

    /// Release a root registered with [`Interpreter::add_gc_root`].
    pub fn remove_gc_root(&self, id: RootId) {
        self.extra_roots.borrow_mut().retain(|(held, _)| *held != id);
    }

    /// Stamp every container reachable from interpreter state.
    fn mark_roots(&self, marker: &Marker) -> Result<(), GcAbort> {
        marker.mark_dict(&self.globals)?;
        marker.mark_dict(&self.vvars)?;
        for table in [&self.scripts, &self.buffers, &self.windows, &self.tabs] {
            for dict in table.borrow().values() {
                marker.mark_dict(dict)?;
            }
        }
        for frame in self.frames.borrow().iter() {
            mark_frame(marker, frame)?;
        }
        for func in self.functions.borrow().values() {
            if let Some(frame) = &func.captured {
                mark_frame(marker, frame)?;
            }
        }
        for (_, value) in self.extra_roots.borrow().iter() {
            marker.mark_value(value)?;
        }
        Ok(())
    }
}

/// Mark one frame and the chain it captured.
fn mark_frame(marker: &Marker, frame: &Frame) -> Result<(), GcAbort> {
    marker.mark_dict(&frame.args)?;
    marker.mark_dict(&frame.locals)?;
    if let Some(dict) = &frame.self_dict {
        marker.mark_dict(dict)?;
    }
    match &frame.captured {
        Some(outer) => mark_frame(marker, outer),
        None => Ok(()),
    }
}
