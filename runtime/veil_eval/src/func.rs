//! Function calls, closures, and call frames.
//!
//! The registry holds user-defined functions: host-registered natives and
//! lambda literals, which auto-register under generated `<lambda>N` names
//! and capture the frame chain live at their creation. Builtins dispatch
//! through their own table and never get a frame.
//!
//! Name rule: all-lowercase names are builtin names. A user function must
//! start with an uppercase letter, be `s:`-prefixed, contain `#`
//! (autoload), or be a `<lambda>` - enforced at registration and at call.

use std::cell::Cell;
use std::rc::Rc;

use smallvec::SmallVec;
use tracing::instrument;

use veil_value::{deep_copy, DictHandle, PartialHandle, ScopeKind, Value};

use crate::error::{self, Result};
use crate::host::MessageKind;
use crate::interp::Interpreter;

/// Evaluated call arguments.
pub type CallArgs = SmallVec<[Value; 8]>;

/// Host-native function body.
pub type NativeFn = Rc<dyn Fn(&Interpreter, &[Value]) -> Result<Value>>;

pub(crate) enum FuncBody {
    /// Implemented by the embedder; called with the evaluated arguments,
    /// no frame is pushed.
    Native(NativeFn),
    /// Lambda body text, re-parsed on each call under a fresh frame.
    Expr(Rc<str>),
}

/// A user-defined function record.
pub(crate) struct Function {
    pub(crate) name: Rc<str>,
    pub(crate) params: Vec<Rc<str>>,
    pub(crate) varargs: bool,
    pub(crate) body: FuncBody,
    /// Frame chain captured at creation; lambdas only.
    pub(crate) captured: Option<Rc<Frame>>,
}

/// One active call: its argument and local dictionaries, the bound
/// receiver, and the chain of captured frames for closure lookups. Frames
/// are shared (`Rc`) so a lambda created inside the call keeps the frame
/// alive after it returns.
pub(crate) struct Frame {
    pub(crate) args: DictHandle,
    pub(crate) locals: DictHandle,
    pub(crate) self_dict: Option<DictHandle>,
    pub(crate) captured: Option<Rc<Frame>>,
}

/// True when `name` belongs to the builtin namespace.
pub(crate) fn is_builtin_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| c.is_ascii_lowercase() || c == '_')
}

/// True when `name` is acceptable for a user-defined function.
pub(crate) fn valid_user_func_name(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_uppercase())
        || name.starts_with("s:")
        || name.starts_with("<lambda>")
        || name.contains('#')
}

impl Interpreter {
    /// Register a host-native function under `name`.
    ///
    /// `params` are the declared parameter names; with `varargs`, extra
    /// arguments are allowed past them. The name must be a valid
    /// user-function name (not all-lowercase, which is the builtin
    /// namespace).
    pub fn register_function(
        &self,
        name: &str,
        params: &[&str],
        varargs: bool,
        body: impl Fn(&Interpreter, &[Value]) -> Result<Value> + 'static,
    ) -> Result<()> {
        if !valid_user_func_name(name) {
            return Err(error::invalid_name(name));
        }
        let func = Function {
            name: Rc::from(name),
            params: params.iter().map(|p| Rc::from(*p)).collect(),
            varargs,
            body: FuncBody::Native(Rc::new(body)),
            captured: None,
        };
        self.functions.borrow_mut().insert(Rc::from(name), Rc::new(func));
        Ok(())
    }

    /// Register a lambda body and return its generated name.
    pub(crate) fn register_lambda(&self, params: Vec<Rc<str>>, body: &str) -> Rc<str> {
        let seq = self.lambda_seq.get() + 1;
        self.lambda_seq.set(seq);
        let name: Rc<str> = Rc::from(format!("<lambda>{seq}"));
        let func = Function {
            name: Rc::clone(&name),
            params,
            varargs: false,
            body: FuncBody::Expr(Rc::from(body)),
            captured: self.current_frame(),
        };
        self.functions.borrow_mut().insert(Rc::clone(&name), Rc::new(func));
        name
    }

    /// True when `name` names a callable builtin or user function.
    pub(crate) fn func_exists(&self, name: &str) -> bool {
        if is_builtin_name(name) && self.builtins.borrow().contains(name) {
            return true;
        }
        self.functions.borrow().contains_key(name)
    }

    /// Call a callable value or a function name held in a string.
    ///
    /// `self_dict` is the receiver from method-call sugar; an explicit
    /// binding on a partial wins over it.
    pub fn call(&self, callable: &Value, args: CallArgs, self_dict: Option<DictHandle>) -> Result<Value> {
        match callable {
            Value::Func(name) | Value::Str(name) => self.call_name(name, args, self_dict),
            Value::Partial(partial) => {
                let mut full: CallArgs = partial.bound_args().iter().cloned().collect();
                full.extend(args);
                let bound = partial.self_dict().cloned().or(self_dict);
                self.call_name(&partial.func_name(), full, bound)
            }
            other => Err(error::not_callable(other.kind_name())),
        }
    }

    /// Call by name: builtin namespace first, then the user registry with
    /// an autoload retry for `#` names.
    #[instrument(level = "debug", skip_all, fields(name = %name))]
    pub(crate) fn call_name(&self, name: &str, args: CallArgs, self_dict: Option<DictHandle>) -> Result<Value> {
        self.check_interrupt()?;
        if is_builtin_name(name) {
            let Some(builtin) = self.builtins.borrow().get(name) else {
                return Err(error::unknown_function(name));
            };
            let mut args = args;
            return builtin(self, &mut args);
        }

        let mut func = self.functions.borrow().get(name).cloned();
        if func.is_none() && name.contains('#') && self.script_autoload(name) {
            func = self.functions.borrow().get(name).cloned();
        }
        let Some(func) = func else {
            return Err(error::unknown_function(name));
        };
        self.call_user(&func, args, self_dict)
    }

    fn call_user(&self, func: &Function, args: CallArgs, self_dict: Option<DictHandle>) -> Result<Value> {
        let _depth = self.call_depth_guard()?;

        if args.len() < func.params.len() {
            return Err(error::arg_count(&func.name, &format!("at least {}", func.params.len()), args.len()));
        }
        if args.len() > func.params.len() && !func.varargs {
            return Err(error::arg_count(&func.name, &func.params.len().to_string(), args.len()));
        }

        match &func.body {
            FuncBody::Native(native) => native(self, &args),
            FuncBody::Expr(body) => {
                let frame = self.push_frame(func, &args, self_dict);
                let result = self.eval_nested(body);
                self.pop_frame();
                drop(frame);
                result
            }
        }
    }

    /// Build and push the frame for one call: named parameters plus the
    /// varargs entries `a:0` (count), `a:000` (list), `a:1` and up.
    fn push_frame(&self, func: &Function, args: &[Value], self_dict: Option<DictHandle>) -> Rc<Frame> {
        let mut entries: Vec<(Rc<str>, Value)> =
            func.params.iter().cloned().zip(args.iter().cloned()).collect();
        if func.varargs {
            let extra = &args[func.params.len()..];
            entries.push((Rc::from("0"), Value::Number(i64::try_from(extra.len()).unwrap_or(i64::MAX))));
            entries.push((Rc::from("000"), Value::List(self.heap.new_list(extra.to_vec()))));
            for (i, value) in extra.iter().enumerate() {
                entries.push((Rc::from((i + 1).to_string().as_str()), value.clone()));
            }
        }
        let arg_dict = self.heap.new_dict(entries);
        arg_dict.set_scope(ScopeKind::FuncArgs);
        let locals = self.heap.new_dict(Vec::new());
        locals.set_scope(ScopeKind::FuncLocal);

        let frame = Rc::new(Frame {
            args: arg_dict,
            locals,
            self_dict,
            captured: func.captured.clone(),
        });
        self.frames.borrow_mut().push(Rc::clone(&frame));
        frame
    }

    fn pop_frame(&self) {
        self.frames.borrow_mut().pop();
    }

    /// Build a partial from a callable, binding arguments (deep-copied in)
    /// and/or a receiver dictionary.
    pub(crate) fn make_partial(
        &self,
        callable: &Value,
        extra_args: &[Value],
        self_dict: Option<DictHandle>,
    ) -> Result<Value> {
        let (name, mut bound, inherited_self) = match callable {
            Value::Func(name) | Value::Str(name) => (Rc::clone(name), Vec::new(), None),
            Value::Partial(p) => (p.func_name(), p.bound_args().to_vec(), p.self_dict().cloned()),
            other => return Err(error::not_callable(other.kind_name())),
        };
        if !self.func_exists(&name) && !name.contains('#') {
            return Err(error::unknown_function(&name));
        }
        for arg in extra_args {
            bound.push(deep_copy(arg, &self.heap)?);
        }
        let self_dict = self_dict.or(inherited_self);
        if bound.is_empty() && self_dict.is_none() {
            return Ok(Value::Func(name));
        }
        Ok(Value::Partial(PartialHandle::new(name, bound, self_dict)))
    }

    /// Call `callable`, containing any error: it is reported through the
    /// message sink instead of propagating.
    pub(crate) fn invoke_contained(&self, callable: &Value, args: CallArgs) -> Option<Value> {
        match self.call(callable, args, None) {
            Ok(value) => Some(value),
            Err(err) => {
                self.host.message(MessageKind::Error, &format!("error in callback: {err}"));
                None
            }
        }
    }
}

/// A callable registered for host events (timers, process I/O), with a
/// consecutive-failure streak.
pub struct Callback {
    value: Value,
    strikes: Cell<u32>,
}

/// What one callback invocation produced.
#[derive(Clone, Debug, PartialEq)]
pub enum CallbackOutcome {
    Success(Value),
    /// The callback errored; the error was reported, the streak continues.
    Errored,
    /// Three consecutive invocations errored; the host should unregister
    /// this callback.
    Disable,
}

/// Consecutive failures after which a callback is disabled.
pub(crate) const CALLBACK_STRIKES: u32 = 3;

impl Callback {
    pub fn new(value: Value) -> Callback {
        Callback { value, strikes: Cell::new(0) }
    }

    /// The wrapped callable, for GC rooting.
    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl Interpreter {
    /// Invoke a host-event callback with error containment: errors are
    /// reported, never propagated, and three consecutive failures ask the
    /// host to unregister the callback. A success resets the streak.
    pub fn invoke_callback(&self, callback: &Callback, args: CallArgs) -> CallbackOutcome {
        match self.call(&callback.value, args, None) {
            Ok(value) => {
                callback.strikes.set(0);
                CallbackOutcome::Success(value)
            }
            Err(err) => {
                self.host.message(MessageKind::Error, &format!("error in callback: {err}"));
                let strikes = callback.strikes.get() + 1;
                callback.strikes.set(strikes);
                if strikes >= CALLBACK_STRIKES {
                    CallbackOutcome::Disable
                } else {
                    CallbackOutcome::Errored
                }
            }
        }
    }
}
