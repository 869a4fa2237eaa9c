//! Name resolution across the coexisting variable scopes.
//!
//! A name is `prefix:rest` where the prefix picks the backing dictionary:
//! `g:` global, `b:`/`w:`/`t:` the current buffer/window/tab, `s:` the
//! currently executing script, `l:`/`a:` the active call frame's locals
//! and arguments, `v:` the reserved table. An unprefixed name is
//! function-local inside a call (falling through to the frames a lambda
//! captured), global otherwise.
//!
//! A bare marker (`b:` with nothing after it) resolves to the scope
//! dictionary itself as a first-class value.
//!
//! A global miss on a name containing `#` fires the autoload hook once per
//! dotted prefix; the attempt is recorded so later misses do not re-fire.

use std::rc::Rc;

use bitflags::bitflags;
use tracing::debug;

use veil_value::{DictHandle, Heap, ScopeKind, Value};

use crate::error::{self, Result};
use crate::func::Frame;
use crate::interp::Interpreter;

/// Scope named by a prefix, or the implicit scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ScopePrefix {
    Implicit,
    Global,
    Buffer,
    Window,
    Tab,
    Script,
    Local,
    Args,
    Reserved,
}

bitflags! {
    /// Per-entry restrictions in the reserved `v:` table.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub(crate) struct VvFlags: u8 {
        /// Never writable by scripts.
        const RO = 1 << 0;
        /// Writable only outside the sandbox.
        const RO_SBX = 1 << 1;
    }
}

/// Restrictions for a known reserved name; `None` means the name does not
/// exist in `v:` at all (new keys can never be created there).
pub(crate) fn reserved_flags(name: &str) -> Option<VvFlags> {
    match name {
        "true" | "false" | "null" | "key" | "val" | "version" => Some(VvFlags::RO),
        "count" => Some(VvFlags::RO_SBX),
        "errmsg" => Some(VvFlags::empty()),
        _ => None,
    }
}

/// Build the reserved `v:` table. `version` is materialized lazily on
/// first read; everything else is eagerly present.
pub(crate) fn init_reserved(heap: &Heap) -> DictHandle {
    let dict = heap.new_dict(vec![
        (Rc::from("true"), Value::Bool(true)),
        (Rc::from("false"), Value::Bool(false)),
        (Rc::from("null"), Value::Null),
        (Rc::from("key"), Value::Number(0)),
        (Rc::from("val"), Value::Number(0)),
        (Rc::from("count"), Value::Number(0)),
        (Rc::from("errmsg"), Value::str("")),
    ]);
    dict.set_scope(ScopeKind::Reserved);
    dict
}

/// Value for a lazily materialized reserved name.
fn reserved_lazy(name: &str) -> Option<Value> {
    if name == "version" {
        let mut parts = env!("CARGO_PKG_VERSION").split(['.', '-']);
        let mut version: i64 = 0;
        for _ in 0..3 {
            let piece = parts.next().unwrap_or("0");
            version = version * 100 + veil_value::parse_leading_number(piece);
        }
        return Some(Value::Number(version));
    }
    None
}

/// Split a scope marker off `name`. Only single-letter markers followed by
/// `:` count; `autoload#fn` style names have no marker.
pub(crate) fn split_scope(name: &str) -> (ScopePrefix, &str) {
    let Some(rest) = name.get(2..).filter(|_| name.as_bytes().get(1) == Some(&b':')) else {
        return (ScopePrefix::Implicit, name);
    };
    match name.as_bytes()[0] {
        b'g' => (ScopePrefix::Global, rest),
        b'b' => (ScopePrefix::Buffer, rest),
        b'w' => (ScopePrefix::Window, rest),
        b't' => (ScopePrefix::Tab, rest),
        b's' => (ScopePrefix::Script, rest),
        b'l' => (ScopePrefix::Local, rest),
        b'a' => (ScopePrefix::Args, rest),
        b'v' => (ScopePrefix::Reserved, rest),
        _ => (ScopePrefix::Implicit, name),
    }
}

/// Check the shape of a variable name after the scope marker.
///
/// The first char may not be `:` or `#`; an embedded `:` never appears;
/// `#` is only valid for global or unprefixed names (autoload).
pub(crate) fn check_name(prefix: ScopePrefix, rest: &str) -> Result<()> {
    if rest.starts_with(':') || rest.starts_with('#') || rest.contains(':') {
        return Err(error::invalid_name(rest));
    }
    if rest.contains('#') && !matches!(prefix, ScopePrefix::Global | ScopePrefix::Implicit) {
        return Err(error::invalid_name(rest));
    }
    Ok(())
}

/// True when `key` may be created inside a scope dictionary.
pub(crate) fn valid_scope_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with(|c: char| c.is_ascii_digit())
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '#')
}

impl Interpreter {
    /// The active call frame, if any.
    pub(crate) fn current_frame(&self) -> Option<Rc<Frame>> {
        self.frames.borrow().last().cloned()
    }

    /// The scope dictionary a prefix names right now.
    pub(crate) fn scope_dict(&self, prefix: ScopePrefix) -> Result<DictHandle> {
        match prefix {
            ScopePrefix::Global | ScopePrefix::Implicit => Ok(self.globals.clone()),
            ScopePrefix::Reserved => Ok(self.vvars.clone()),
            ScopePrefix::Buffer => self
                .cur_buffer
                .get()
                .and_then(|id| self.buffers.borrow().get(&id).cloned())
                .ok_or_else(|| error::undefined_var("b:")),
            ScopePrefix::Window => self
                .cur_window
                .get()
                .and_then(|id| self.windows.borrow().get(&id).cloned())
                .ok_or_else(|| error::undefined_var("w:")),
            ScopePrefix::Tab => self
                .cur_tab
                .get()
                .and_then(|id| self.tabs.borrow().get(&id).cloned())
                .ok_or_else(|| error::undefined_var("t:")),
            ScopePrefix::Script => self
                .script_stack
                .borrow()
                .last()
                .and_then(|id| self.scripts.borrow().get(id).cloned())
                .ok_or_else(|| error::undefined_var("s:")),
            ScopePrefix::Local => self
                .current_frame()
                .map(|f| f.locals.clone())
                .ok_or_else(|| error::undefined_var("l:")),
            ScopePrefix::Args => self
                .current_frame()
                .map(|f| f.args.clone())
                .ok_or_else(|| error::undefined_var("a:")),
        }
    }

    /// Read variable `name`, resolving its scope marker.
    pub(crate) fn get_var(&self, name: &str) -> Result<Value> {
        self.get_var_ex(name, true)
    }

    /// Variable read with autoload control; lvalue resolution passes
    /// `autoload = false` for unlet targets.
    pub(crate) fn get_var_ex(&self, name: &str, autoload: bool) -> Result<Value> {
        let (prefix, rest) = split_scope(name);
        check_name(prefix, rest)?;

        // A bare marker is the scope dictionary itself.
        if rest.is_empty() && prefix != ScopePrefix::Implicit {
            return Ok(Value::Dict(self.scope_dict(prefix)?));
        }

        match prefix {
            ScopePrefix::Implicit => {
                // `true`/`false`/`null` resolve as bare words through `v:`
                // and cannot be shadowed.
                if matches!(rest, "true" | "false" | "null") {
                    return self.reserved_get(rest);
                }
                if let Some(frame) = self.current_frame() {
                    return frame_lookup(&frame, rest).ok_or_else(|| error::undefined_var(name));
                }
                self.global_get(rest, autoload).ok_or_else(|| error::undefined_var(name))
            }
            ScopePrefix::Global => {
                self.global_get(rest, autoload).ok_or_else(|| error::undefined_var(name))
            }
            ScopePrefix::Reserved => self.reserved_get(rest),
            _ => {
                let dict = self.scope_dict(prefix)?;
                dict.get(rest).ok_or_else(|| error::undefined_var(name))
            }
        }
    }

    /// True when `name` currently resolves.
    pub(crate) fn var_exists(&self, name: &str) -> bool {
        self.get_var(name).is_ok()
    }

    fn reserved_get(&self, name: &str) -> Result<Value> {
        if let Some(value) = self.vvars.get(name) {
            return Ok(value);
        }
        if reserved_flags(name).is_some() {
            if let Some(value) = reserved_lazy(name) {
                self.vvars.insert(Rc::from(name), value.clone());
                return Ok(value);
            }
        }
        Err(error::undefined_var(&format!("v:{name}")))
    }

    /// Global lookup with the one-shot autoload hook.
    fn global_get(&self, name: &str, autoload: bool) -> Option<Value> {
        if let Some(value) = self.globals.get(name) {
            return Some(value);
        }
        if autoload && name.contains('#') && self.script_autoload(name) {
            return self.globals.get(name);
        }
        None
    }

    /// Fire the autoload hook for `name`'s prefix, once. Returns true when
    /// the host newly loaded the script, making a retry worthwhile.
    pub(crate) fn script_autoload(&self, name: &str) -> bool {
        let Some((prefix, _)) = name.rsplit_once('#') else {
            return false;
        };
        if prefix.is_empty() || !self.autoload_tried.borrow_mut().insert(prefix.to_owned()) {
            return false;
        }
        let path = format!("autoload/{}.veil", prefix.replace('#', "/"));
        let loaded = self.host.load_autoload(&path);
        debug!(path, loaded, "autoload attempt");
        loaded
    }
}

/// Look up an unprefixed name inside a call frame: locals, then arguments,
/// then the bound receiver, then the captured frame chain.
pub(crate) fn frame_lookup(frame: &Frame, name: &str) -> Option<Value> {
    if let Some(value) = frame.locals.get(name) {
        return Some(value);
    }
    if let Some(value) = frame.args.get(name) {
        return Some(value);
    }
    if name == "self" {
        if let Some(dict) = &frame.self_dict {
            return Some(Value::Dict(dict.clone()));
        }
    }
    match &frame.captured {
        Some(outer) => frame_lookup(outer, name),
        None => None,
    }
}
