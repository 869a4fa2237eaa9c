//! The interpreter context.
//!
//! One [`Interpreter`] owns everything that was ambient state in a
//! classic single-instance design: the heap roster, every scope
//! dictionary, the script stack, active call frames, the function
//! registry, the builtin table, and the host bridge. Entry points take
//! `&self`; all mutation happens through interior mutability because
//! script callbacks re-enter the interpreter while an outer evaluation is
//! on the stack.
//!
//! Submodules hang their operations off this type: `scope` for name
//! resolution, `expr` for evaluation, `lval` for assignment, `func` for
//! calls, `iter` for iteration drivers, `gc` for collection.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};

use veil_value::{DictHandle, Heap, ScopeKind, Value, VarLock};

use crate::builtins::BuiltinTable;
use crate::error::{self, Error, Result};
use crate::expr::ExprEval;
use crate::func::{Frame, Function};
use crate::host::{Host, MessageKind, NullHost};

/// Expression recursion ceiling.
pub(crate) const EXPR_DEPTH_MAX: u32 = 1000;

/// Function call nesting ceiling.
pub(crate) const CALL_DEPTH_MAX: u32 = 100;

/// The Veil expression runtime.
pub struct Interpreter {
    pub(crate) heap: Heap,
    pub(crate) host: Rc<dyn Host>,

    // Scopes
    pub(crate) globals: DictHandle,
    pub(crate) vvars: DictHandle,
    pub(crate) scripts: RefCell<FxHashMap<u64, DictHandle>>,
    pub(crate) script_stack: RefCell<Vec<u64>>,
    pub(crate) buffers: RefCell<FxHashMap<u64, DictHandle>>,
    pub(crate) windows: RefCell<FxHashMap<u64, DictHandle>>,
    pub(crate) tabs: RefCell<FxHashMap<u64, DictHandle>>,
    pub(crate) cur_buffer: Cell<Option<u64>>,
    pub(crate) cur_window: Cell<Option<u64>>,
    pub(crate) cur_tab: Cell<Option<u64>>,

    // Calls
    pub(crate) frames: RefCell<Vec<Rc<Frame>>>,
    pub(crate) functions: RefCell<FxHashMap<Rc<str>, Rc<Function>>>,
    pub(crate) lambda_seq: Cell<u64>,
    pub(crate) builtins: RefCell<BuiltinTable>,

    // Evaluation state
    pub(crate) ignore_case: Cell<bool>,
    pub(crate) sandbox: Cell<bool>,
    pub(crate) expr_depth: Cell<u32>,
    pub(crate) call_nesting: Cell<u32>,
    /// Nested evaluation entries and iteration drivers; nonzero defers GC.
    pub(crate) busy: Cell<u32>,
    pub(crate) gc_wanted: Cell<bool>,
    pub(crate) emitted: Cell<bool>,
    pub(crate) autoload_tried: RefCell<FxHashSet<String>>,

    // Extra GC roots registered by the host (timer callbacks and such)
    pub(crate) extra_roots: RefCell<Vec<(RootId, Value)>>,
    pub(crate) root_seq: Cell<u64>,

    // Consecutive-failure counts for dictionary change watchers, keyed by
    // (dictionary identity, pattern)
    pub(crate) watcher_strikes: RefCell<FxHashMap<(usize, String), u32>>,
}

/// Ticket for a host-registered GC root.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RootId(pub(crate) u64);

impl Interpreter {
    /// Build an interpreter bound to `host`.
    pub fn new(host: Rc<dyn Host>) -> Interpreter {
        let heap = Heap::new();
        let globals = heap.new_dict(Vec::new());
        globals.set_scope(ScopeKind::Global);
        globals.set_lock(VarLock::Unlocked);
        let vvars = crate::scope::init_reserved(&heap);

        Interpreter {
            heap,
            host,
            globals,
            vvars,
            scripts: RefCell::new(FxHashMap::default()),
            script_stack: RefCell::new(Vec::new()),
            buffers: RefCell::new(FxHashMap::default()),
            windows: RefCell::new(FxHashMap::default()),
            tabs: RefCell::new(FxHashMap::default()),
            cur_buffer: Cell::new(None),
            cur_window: Cell::new(None),
            cur_tab: Cell::new(None),
            frames: RefCell::new(Vec::new()),
            functions: RefCell::new(FxHashMap::default()),
            lambda_seq: Cell::new(0),
            builtins: RefCell::new(BuiltinTable::core()),
            ignore_case: Cell::new(false),
            sandbox: Cell::new(false),
            expr_depth: Cell::new(0),
            call_nesting: Cell::new(0),
            busy: Cell::new(0),
            gc_wanted: Cell::new(false),
            emitted: Cell::new(false),
            autoload_tried: RefCell::new(FxHashSet::default()),
            extra_roots: RefCell::new(Vec::new()),
            root_seq: Cell::new(0),
            watcher_strikes: RefCell::new(FxHashMap::default()),
        }
    }

    /// Interpreter with a no-op host; used by tests and minimal embedders.
    pub fn new_bare() -> Interpreter {
        Interpreter::new(Rc::new(NullHost))
    }

    /// The heap, for embedders that build container values directly.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Ambient default for unmodified string comparisons.
    pub fn set_ignore_case(&self, ignore_case: bool) {
        self.ignore_case.set(ignore_case);
    }

    /// Sandbox mode: reserved names flagged sandbox-read-only refuse
    /// writes while this is set.
    pub fn set_sandbox(&self, sandbox: bool) {
        self.sandbox.set(sandbox);
    }

    // Evaluation entry points

    /// Evaluate a whole expression string.
    pub fn evaluate(&self, src: &str) -> Result<Value> {
        self.eval_entry(src, false)
    }

    /// Evaluate without reporting resolution misses; the error is still
    /// returned. Probing callers (`exists()`) use this.
    pub fn evaluate_quiet(&self, src: &str) -> Result<Value> {
        self.eval_entry(src, true)
    }

    /// Evaluate and coerce to a condition.
    pub fn evaluate_to_bool(&self, src: &str) -> Result<bool> {
        let value = self.evaluate(src)?;
        Ok(value.truthy()?)
    }

    /// Evaluate and coerce to a string.
    pub fn evaluate_to_string(&self, src: &str) -> Result<String> {
        let value = self.evaluate(src)?;
        Ok(value.coerce_string()?.to_string())
    }

    /// Evaluate and coerce to a number.
    pub fn evaluate_to_number(&self, src: &str) -> Result<i64> {
        let value = self.evaluate(src)?;
        Ok(value.to_number()?)
    }

    fn eval_entry(&self, src: &str, quiet: bool) -> Result<Value> {
        let outermost = self.busy.get() == 0;
        if outermost {
            self.emitted.set(false);
        }
        let result = {
            let _busy = self.busy_guard();
            self.check_interrupt().and_then(|()| {
                let mut ev = ExprEval::new(self, src);
                ev.eval_whole()
            })
        };
        if let Err(err) = &result {
            self.report(err, quiet);
        }
        if outermost {
            self.maybe_collect();
        }
        result
    }

    /// Evaluate a nested expression (callback bodies, stored expression
    /// text) without resetting outer error bookkeeping.
    pub(crate) fn eval_nested(&self, src: &str) -> Result<Value> {
        let _busy = self.busy_guard();
        let mut ev = ExprEval::new(self, src);
        ev.eval_whole()
    }

    // Script scope lifecycle

    /// Push script `id` as the currently executing script, allocating its
    /// `s:` dictionary on first entry.
    pub fn enter_script(&self, id: u64) {
        self.scripts.borrow_mut().entry(id).or_insert_with(|| {
            let dict = self.heap.new_dict(Vec::new());
            dict.set_scope(ScopeKind::Script);
            dict
        });
        self.script_stack.borrow_mut().push(id);
    }

    /// Pop the current script. The `s:` dictionary stays allocated for
    /// later re-entry.
    pub fn leave_script(&self) {
        self.script_stack.borrow_mut().pop();
    }

    // Buffer/window/tab scope lifecycle

    /// Create (or fetch) the `b:` dictionary for buffer `id` and make it a
    /// GC root.
    pub fn attach_buffer(&self, id: u64) -> DictHandle {
        attach(&self.heap, &self.buffers, id, ScopeKind::Buffer)
    }

    /// Drop the interpreter's reference to buffer `id`'s dictionary.
    /// Scripted references may keep it alive; it stops being a GC root.
    pub fn detach_buffer(&self, id: u64) {
        self.buffers.borrow_mut().remove(&id);
        if self.cur_buffer.get() == Some(id) {
            self.cur_buffer.set(None);
        }
    }

    /// Make buffer `id` current for `b:` resolution, attaching if needed.
    pub fn set_current_buffer(&self, id: u64) -> DictHandle {
        let dict = self.attach_buffer(id);
        self.cur_buffer.set(Some(id));
        dict
    }

    /// Create (or fetch) the `w:` dictionary for window `id`.
    pub fn attach_window(&self, id: u64) -> DictHandle {
        attach(&self.heap, &self.windows, id, ScopeKind::Window)
    }

    pub fn detach_window(&self, id: u64) {
        self.windows.borrow_mut().remove(&id);
        if self.cur_window.get() == Some(id) {
            self.cur_window.set(None);
        }
    }

    pub fn set_current_window(&self, id: u64) -> DictHandle {
        let dict = self.attach_window(id);
        self.cur_window.set(Some(id));
        dict
    }

    /// Create (or fetch) the `t:` dictionary for tab `id`.
    pub fn attach_tab(&self, id: u64) -> DictHandle {
        attach(&self.heap, &self.tabs, id, ScopeKind::Tab)
    }

    pub fn detach_tab(&self, id: u64) {
        self.tabs.borrow_mut().remove(&id);
        if self.cur_tab.get() == Some(id) {
            self.cur_tab.set(None);
        }
    }

    pub fn set_current_tab(&self, id: u64) -> DictHandle {
        let dict = self.attach_tab(id);
        self.cur_tab.set(Some(id));
        dict
    }

    // Interrupts and error reporting

    /// Fail when the host has requested an interrupt.
    pub fn check_interrupt(&self) -> Result<()> {
        if self.host.interrupted() {
            Err(error::interrupted())
        } else {
            Ok(())
        }
    }

    /// Send `err` to the message sink, once per outer evaluation. Quiet
    /// mode swallows resolution misses only.
    pub(crate) fn report(&self, err: &Error, quiet: bool) {
        if self.emitted.get() {
            return;
        }
        if quiet && err.is_quietable() {
            return;
        }
        self.emitted.set(true);
        self.vvars.insert(Rc::from("errmsg"), Value::str(&err.message));
        self.host.message(MessageKind::Error, &err.message);
    }

    // Depth accounting

    pub(crate) fn expr_depth_guard(&self) -> Result<DepthGuard<'_>> {
        let depth = self.expr_depth.get() + 1;
        if depth > EXPR_DEPTH_MAX {
            return Err(error::expr_nesting());
        }
        self.expr_depth.set(depth);
        Ok(DepthGuard { cell: &self.expr_depth })
    }

    pub(crate) fn call_depth_guard(&self) -> Result<DepthGuard<'_>> {
        let depth = self.call_nesting.get() + 1;
        if depth > CALL_DEPTH_MAX {
            return Err(error::call_depth());
        }
        self.call_nesting.set(depth);
        Ok(DepthGuard { cell: &self.call_nesting })
    }

    pub(crate) fn busy_guard(&self) -> BusyGuard<'_> {
        self.busy.set(self.busy.get() + 1);
        BusyGuard { cell: &self.busy }
    }
}

fn attach(
    heap: &Heap,
    table: &RefCell<FxHashMap<u64, DictHandle>>,
    id: u64,
    scope: ScopeKind,
) -> DictHandle {
    table
        .borrow_mut()
        .entry(id)
        .or_insert_with(|| {
            let dict = heap.new_dict(Vec::new());
            dict.set_scope(scope);
            dict
        })
        .clone()
}

impl Drop for Interpreter {
    /// Final quiet collection so cyclic script data does not outlive the
    /// interpreter.
    fn drop(&mut self) {
        self.busy.set(0);
        let _ = self.run_gc(false);
    }
}

/// Restores a depth counter on unwind.
pub(crate) struct DepthGuard<'i> {
    cell: &'i Cell<u32>,
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.cell.set(self.cell.get().saturating_sub(1));
    }
}

/// Marks an evaluation or iteration as live for GC deferral.
pub(crate) struct BusyGuard<'i> {
    cell: &'i Cell<u32>,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.cell.set(self.cell.get().saturating_sub(1));
    }
}
