//! Lvalue resolution, assignment, and unlet.
//!
//! An assignment target is a scope-prefixed name followed by any number of
//! `.key` / `[idx]` / `[a : b]` segments. Resolution walks the path with
//! the expression evaluator (index expressions are full expressions),
//! checking kinds and locks along the way, and lands on one `Place`: a
//! whole variable, a dictionary entry, a list item or range, or a blob
//! byte or range. The store then applies the operator semantics to that
//! place.
//!
//! Dictionary mutations through an lvalue fire the dictionary's change
//! watchers afterwards, under callback-error containment with the
//! three-strike removal rule.

use std::rc::Rc;

use bitflags::bitflags;
use smallvec::smallvec;

use veil_value::{BlobHandle, DictHandle, DictWatcher, ListHandle, ScopeKind, Value};

use crate::error::{self, Result};
use crate::expr::{apply_binop, BinOp, ExprEval};
use crate::func::CallArgs;
use crate::interp::Interpreter;
use crate::lex;
use crate::scope::{reserved_flags, split_scope, valid_scope_key, ScopePrefix, VvFlags};

bitflags! {
    /// Modifiers for lvalue resolution.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct LvalFlags: u8 {
        /// Resolution misses produce no message (still returned).
        const QUIET = 1 << 0;
        /// Never fire the autoload hook while resolving the base name.
        const NO_AUTOLOAD = 1 << 1;
        /// Target of an unlet: the final key need not exist and nothing
        /// may be created along the way.
        const UNLET = 1 << 2;
        /// Forbid creating a new variable or dictionary key.
        const NO_DECL = 1 << 3;
    }
}

/// Assignment operator, `=` or one of the compound forms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
}

impl AssignOp {
    /// The binary operator behind a compound form.
    fn binop(self) -> Option<BinOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::Add => Some(BinOp::Add),
            AssignOp::Sub => Some(BinOp::Sub),
            AssignOp::Mul => Some(BinOp::Mul),
            AssignOp::Div => Some(BinOp::Div),
            AssignOp::Mod => Some(BinOp::Mod),
            AssignOp::Concat => Some(BinOp::Concat),
        }
    }
}

/// The assignable place a target path resolved to.
enum Place {
    Var(String),
    Entry { dict: DictHandle, key: Rc<str> },
    Item { list: ListHandle, index: usize },
    /// `[a : b]`; `end` is the resolved inclusive upper bound, `None` for
    /// an open range running to the end of the list.
    Span { list: ListHandle, start: usize, end: Option<usize> },
    Byte { blob: BlobHandle, index: usize },
    Bytes { blob: BlobHandle, start: usize, end: usize },
}

/// A resolved assignment target.
pub struct Lval {
    place: Place,
    flags: LvalFlags,
}

impl Interpreter {
    /// Resolve an assignment target path; the whole string must be
    /// consumed.
    pub fn resolve_lvalue(&self, target: &str, flags: LvalFlags) -> Result<Lval> {
        let mut ev = ExprEval::new(self, target);
        ev.skip_ws();
        let lval = self.resolve_lval_at(&mut ev, flags)?;
        ev.skip_ws();
        if !ev.at_end() {
            return Err(error::trailing(ev.rest(), ev.pos()));
        }
        Ok(lval)
    }

    /// Resolve a target path starting at the evaluator's cursor, leaving
    /// the cursor after the last path segment.
    pub(crate) fn resolve_lval_at(&self, ev: &mut ExprEval<'_>, flags: LvalFlags) -> Result<Lval> {
        let Some(name) = ev.parse_name(true)? else {
            return Err(error::syntax("assignment target", ev.pos()));
        };
        let mut place = Place::Var(name);
        loop {
            match ev.peek() {
                Some('[') => {
                    let base = self.descend(&place, flags, true)?;
                    place = self.index_segment(ev, base, flags)?;
                }
                Some('.') if is_key_start(ev) => {
                    let base = self.descend(&place, flags, false)?;
                    let Value::Dict(dict) = base else {
                        return Err(error::not_indexable(base.kind_name()));
                    };
                    ev.eat('.');
                    let len = lex::ident_len(ev.rest());
                    let key: Rc<str> = Rc::from(&ev.rest()[..len]);
                    ev.advance(len);
                    place = Place::Entry { dict, key };
                }
                _ => break,
            }
        }
        Ok(Lval { place, flags })
    }

    /// Read the container an intermediate path segment descends into,
    /// auto-vivifying Null to an empty list under `[`.
    fn descend(&self, place: &Place, flags: LvalFlags, indexing: bool) -> Result<Value> {
        let value = match place {
            Place::Var(name) => {
                self.get_var_ex(name, !flags.contains(LvalFlags::NO_AUTOLOAD))?
            }
            Place::Entry { dict, key } => {
                dict.get(key).ok_or_else(|| error::undefined_key(key))?
            }
            Place::Item { list, index } => {
                let at = i64::try_from(*index).unwrap_or(i64::MAX);
                list.get(at).ok_or_else(|| error::list_index(at))?
            }
            _ => return Err(error::type_error("cannot index through a range")),
        };
        if indexing && matches!(value, Value::Null) && !flags.contains(LvalFlags::UNLET) {
            let fresh = Value::List(self.heap.new_list(Vec::new()));
            self.write_through(place, fresh.clone())?;
            return Ok(fresh);
        }
        // A locked container anywhere on the path blocks the write.
        match &value {
            Value::List(list) => list.check_lock(place_name(place))?,
            Value::Dict(dict) => dict.check_lock(place_name(place))?,
            Value::Blob(blob) => blob.check_lock(place_name(place))?,
            _ => {}
        }
        Ok(value)
    }

    /// Parse one `[idx]` / `[a : b]` segment against `base`.
    fn index_segment(&self, ev: &mut ExprEval<'_>, base: Value, flags: LvalFlags) -> Result<Place> {
        ev.eat('[');
        ev.skip_ws();
        let mut lower: Option<i64> = None;
        let mut span = false;
        if ev.eat(':') {
            span = true;
        } else {
            let value = ev.sub_expr(true)?;
            ev.skip_ws();
            if ev.eat(':') {
                span = true;
            }
            lower = Some(match &base {
                Value::Dict(_) if !span => 0,
                _ => value.to_number()?,
            });
            if let (Value::Dict(dict), false) = (&base, span) {
                let key = value.coerce_string()?;
                ev.skip_ws();
                ev.expect(']', "closing ']'")?;
                return Ok(Place::Entry { dict: dict.clone(), key });
            }
        }
        let upper = if span {
            ev.skip_ws();
            if ev.peek() == Some(']') {
                None
            } else {
                Some(ev.sub_expr(true)?.to_number()?)
            }
        } else {
            None
        };
        ev.skip_ws();
        ev.expect(']', "closing ']'")?;

        match base {
            Value::List(list) => {
                if span {
                    let start = resolve_span_start(list.len(), lower)?;
                    let end = upper
                        .map(|hi| {
                            list.resolve(hi).ok_or_else(|| error::list_index(hi))
                        })
                        .transpose()?;
                    Ok(Place::Span { list, start, end })
                } else {
                    let idx = lower.unwrap_or(0);
                    let len = list.len();
                    let at = match list.resolve(idx) {
                        Some(at) => at,
                        // One past the end appends on plain assignment.
                        None if usize::try_from(idx) == Ok(len) && !flags.contains(LvalFlags::UNLET) => len,
                        None => return Err(error::list_index(idx)),
                    };
                    Ok(Place::Item { list, index: at })
                }
            }
            Value::Blob(blob) => {
                if span {
                    let start = resolve_span_start(blob.len(), lower)?;
                    let end = match upper {
                        Some(hi) => blob.resolve(hi).ok_or_else(|| error::blob_index(hi))?,
                        None => blob.len().checked_sub(1).ok_or_else(error::range_length)?,
                    };
                    Ok(Place::Bytes { blob, start, end })
                } else {
                    let idx = lower.unwrap_or(0);
                    let len = blob.len();
                    let at = match blob.resolve(idx) {
                        Some(at) => at,
                        None if usize::try_from(idx) == Ok(len) && !flags.contains(LvalFlags::UNLET) => len,
                        None => return Err(error::blob_index(idx)),
                    };
                    Ok(Place::Byte { blob, index: at })
                }
            }
            Value::Dict(_) => Err(error::type_error("cannot slice a Dictionary")),
            other => Err(error::not_indexable(other.kind_name())),
        }
    }

    /// Assign `value` to `target` with operator `op`.
    pub fn assign(&self, target: &str, op: AssignOp, value: Value) -> Result<()> {
        let mut flags = LvalFlags::empty();
        if op != AssignOp::Assign {
            flags |= LvalFlags::NO_DECL;
        }
        let result = {
            let _busy = self.busy_guard();
            self.resolve_lvalue(target, flags)
                .and_then(|lval| self.store(&lval, op, value))
        };
        if let Err(err) = &result {
            self.report(err, false);
        }
        if self.busy.get() == 0 {
            self.maybe_collect();
        }
        result
    }

    /// Remove the target: a whole variable, a dictionary entry, a list
    /// item or range, or a blob range.
    pub fn unlet(&self, target: &str, flags: LvalFlags) -> Result<()> {
        let flags = flags | LvalFlags::UNLET | LvalFlags::NO_AUTOLOAD;
        let result = {
            let _busy = self.busy_guard();
            self.resolve_lvalue(target, flags)
                .and_then(|lval| self.unlet_place(&lval))
        };
        if let Err(err) = &result {
            self.report(err, flags.contains(LvalFlags::QUIET));
        }
        result
    }

    /// Apply `op` and write to the resolved place.
    fn store(&self, lval: &Lval, op: AssignOp, value: Value) -> Result<()> {
        match &lval.place {
            Place::Var(name) => {
                if let Some(binop) = op.binop() {
                    let current = self.get_var(name)?;
                    // List += extends in place; no store needed.
                    if binop == BinOp::Add {
                        if let (Value::List(cur), Value::List(new)) = (&current, &value) {
                            cur.check_lock(name)?;
                            cur.extend_from(new);
                            return Ok(());
                        }
                    }
                    let combined = apply_binop(self, binop, &current, &value)?;
                    self.set_var(name, combined)
                } else {
                    self.set_var(name, value)
                }
            }
            Place::Entry { dict, key } => {
                let old = dict.get(key);
                if old.is_none() && lval.flags.contains(LvalFlags::NO_DECL) {
                    return Err(error::undefined_key(key));
                }
                self.check_scope_store(dict, key, old.is_none())?;
                let new = match (op.binop(), &old) {
                    (Some(binop), Some(current)) => {
                        if binop == BinOp::Add {
                            if let (Value::List(cur), Value::List(ext)) = (current, &value) {
                                cur.check_lock(key)?;
                                cur.extend_from(ext);
                                return Ok(());
                            }
                        }
                        apply_binop(self, binop, current, &value)?
                    }
                    (Some(_), None) => return Err(error::undefined_key(key)),
                    (None, _) => value,
                };
                self.dict_store(dict, Rc::clone(key), new);
                Ok(())
            }
            Place::Item { list, index } => {
                list.check_lock("list")?;
                let len = list.len();
                if *index == len {
                    if op != AssignOp::Assign {
                        return Err(error::list_index(i64::try_from(len).unwrap_or(i64::MAX)));
                    }
                    list.insert_at(len, value);
                    return Ok(());
                }
                let new = match op.binop() {
                    Some(binop) => {
                        let at = i64::try_from(*index).unwrap_or(i64::MAX);
                        let current = list.get(at).ok_or_else(|| error::list_index(at))?;
                        apply_binop(self, binop, &current, &value)?
                    }
                    None => value,
                };
                list.set_at(*index, new);
                Ok(())
            }
            Place::Span { list, start, end } => self.store_span(list, *start, *end, op, &value),
            Place::Byte { blob, index } => {
                blob.check_lock("blob")?;
                let byte = match op.binop() {
                    Some(binop) => {
                        let at = i64::try_from(*index).unwrap_or(i64::MAX);
                        let current = blob
                            .get(at)
                            .map(|b| Value::Number(i64::from(b)))
                            .ok_or_else(|| error::blob_index(at))?;
                        apply_binop(self, binop, &current, &value)?
                    }
                    None => value,
                };
                blob.set_at(*index, byte_value(&byte)?);
                Ok(())
            }
            Place::Bytes { blob, start, end } => {
                blob.check_lock("blob")?;
                let Value::Blob(new) = &value else {
                    return Err(error::arg_type("range assignment", "Blob", value.kind_name()));
                };
                if op != AssignOp::Assign {
                    return Err(error::type_error("compound assignment to a blob range"));
                }
                if new.len() != end - start + 1 {
                    return Err(error::range_length());
                }
                blob.write_span(*start, &new.snapshot());
                Ok(())
            }
        }
    }

    /// List range store: plain `=` requires matching length, except that
    /// an open range may extend the list; compound ops apply item-wise.
    fn store_span(
        &self,
        list: &ListHandle,
        start: usize,
        end: Option<usize>,
        op: AssignOp,
        value: &Value,
    ) -> Result<()> {
        list.check_lock("list")?;
        let Value::List(items) = value else {
            return Err(error::arg_type("range assignment", "List", value.kind_name()));
        };
        let items = items.snapshot();
        let len = list.len();
        let end = match end {
            Some(end) => {
                if end < start || end >= len {
                    return Err(error::range_length());
                }
                if items.len() != end - start + 1 {
                    return Err(error::range_length());
                }
                end
            }
            None => {
                // Open range: replace to the end, extra items extend.
                if start > len || items.len() < len - start {
                    return Err(error::range_length());
                }
                len.saturating_sub(1).max(start)
            }
        };
        for (offset, item) in items.into_iter().enumerate() {
            let at = start + offset;
            let new = match op.binop() {
                Some(binop) => {
                    let idx = i64::try_from(at).unwrap_or(i64::MAX);
                    let current = list.get(idx).ok_or_else(|| error::list_index(idx))?;
                    apply_binop(self, binop, &current, &item)?
                }
                None => item,
            };
            if at < list.len() && at <= end {
                list.set_at(at, new);
            } else {
                list.insert_at(list.len(), new);
            }
        }
        Ok(())
    }

    fn unlet_place(&self, lval: &Lval) -> Result<()> {
        match &lval.place {
            Place::Var(name) => self.unlet_var(name),
            Place::Entry { dict, key } => {
                dict.check_lock(key)?;
                if dict.scope() == Some(ScopeKind::Reserved) || dict.scope() == Some(ScopeKind::FuncArgs) {
                    return Err(error::read_only(key));
                }
                let old = dict.remove(key).ok_or_else(|| error::undefined_key(key))?;
                self.notify_watchers(dict, key, Some(old), None);
                Ok(())
            }
            Place::Item { list, index } => {
                list.check_lock("list")?;
                let at = i64::try_from(*index).unwrap_or(i64::MAX);
                if list.remove_at(*index).is_none() {
                    return Err(error::list_index(at));
                }
                Ok(())
            }
            Place::Span { list, start, end } => {
                list.check_lock("list")?;
                let end = end.unwrap_or_else(|| list.len().saturating_sub(1));
                if end < *start || end >= list.len() {
                    return Err(error::range_length());
                }
                list.remove_span(*start, end);
                Ok(())
            }
            Place::Byte { blob, index } => {
                blob.check_lock("blob")?;
                if *index >= blob.len() {
                    return Err(error::blob_index(i64::try_from(*index).unwrap_or(i64::MAX)));
                }
                blob.remove_span(*index, *index);
                Ok(())
            }
            Place::Bytes { blob, start, end } => {
                blob.check_lock("blob")?;
                blob.remove_span(*start, *end);
                Ok(())
            }
        }
    }

    /// Remove a whole variable from its scope dictionary.
    fn unlet_var(&self, name: &str) -> Result<()> {
        let (prefix, rest) = split_scope(name);
        if rest.is_empty() {
            return Err(error::type_error("cannot unlet a scope dictionary"));
        }
        if matches!(prefix, ScopePrefix::Reserved | ScopePrefix::Args) {
            return Err(error::read_only(name));
        }
        let dict = match prefix {
            ScopePrefix::Implicit => match self.current_frame() {
                Some(frame) if frame.locals.contains_key(rest) => frame.locals.clone(),
                Some(_) | None => self.globals.clone(),
            },
            other => self.scope_dict(other)?,
        };
        dict.check_lock(name)?;
        let old = dict.remove(rest).ok_or_else(|| error::undefined_var(name))?;
        self.notify_watchers(&dict, rest, Some(old), None);
        Ok(())
    }

    /// Write variable `name`, enforcing scope rules.
    pub fn set_var(&self, name: &str, value: Value) -> Result<()> {
        let (prefix, rest) = split_scope(name);
        crate::scope::check_name(prefix, rest)?;
        if rest.is_empty() {
            return Err(error::type_error("cannot assign to a scope dictionary"));
        }
        if value.is_callable()
            && crate::func::is_builtin_name(rest)
            && self.builtins.borrow().contains(rest)
        {
            return Err(error::shadows_builtin(rest));
        }

        let dict = match prefix {
            ScopePrefix::Reserved => {
                self.check_reserved_store(rest)?;
                self.vvars.clone()
            }
            ScopePrefix::Args => {
                let dict = self.scope_dict(ScopePrefix::Args)?;
                if !dict.contains_key(rest) {
                    return Err(error::read_only(name));
                }
                dict
            }
            ScopePrefix::Implicit => match self.current_frame() {
                Some(frame) => frame.locals.clone(),
                None => self.globals.clone(),
            },
            other => self.scope_dict(other)?,
        };
        if dict.is_scope() && !valid_scope_key(rest) {
            return Err(error::invalid_name(name));
        }
        dict.check_lock(name)?;
        self.dict_store(&dict, Rc::from(rest), value);
        Ok(())
    }

    /// Scope-contract checks for storing `key` into `dict` through an
    /// indexed lvalue (`g:['x']`, `d.k`, ...).
    fn check_scope_store(&self, dict: &DictHandle, key: &str, creating: bool) -> Result<()> {
        match dict.scope() {
            Some(ScopeKind::Reserved) => self.check_reserved_store(key),
            Some(ScopeKind::FuncArgs) if creating => Err(error::read_only(key)),
            Some(_) if !valid_scope_key(key) => Err(error::invalid_name(key)),
            _ => Ok(()),
        }
    }

    fn check_reserved_store(&self, key: &str) -> Result<()> {
        let name = || format!("v:{key}");
        match reserved_flags(key) {
            None => Err(error::read_only(&name())),
            Some(flags) if flags.contains(VvFlags::RO) => Err(error::read_only(&name())),
            Some(flags) if flags.contains(VvFlags::RO_SBX) && self.sandbox.get() => {
                Err(error::read_only(&name()))
            }
            Some(_) => Ok(()),
        }
    }

    /// Insert into a dictionary and fire its change watchers.
    fn dict_store(&self, dict: &DictHandle, key: Rc<str>, value: Value) {
        if !dict.has_watchers() {
            dict.insert(key, value);
            return;
        }
        let old = dict.insert(Rc::clone(&key), value.clone());
        self.notify_watchers(dict, &key, old, Some(value));
    }

    /// Run every watcher matching `key` with `(dict, key, info)` where the
    /// info dictionary carries the old and new values. A watcher erroring
    /// three times in a row is removed.
    pub(crate) fn notify_watchers(
        &self,
        dict: &DictHandle,
        key: &str,
        old: Option<Value>,
        new: Option<Value>,
    ) {
        if !dict.has_watchers() {
            return;
        }
        let mut info: Vec<(Rc<str>, Value)> = Vec::new();
        if let Some(old) = old {
            info.push((Rc::from("old"), old));
        }
        if let Some(new) = new {
            info.push((Rc::from("new"), new));
        }
        let info = self.heap.new_dict(info);

        for watcher in dict.watchers_matching(key) {
            let args: CallArgs = smallvec![
                Value::Dict(dict.clone()),
                Value::str(key),
                Value::Dict(info.clone()),
            ];
            let strike_key = (dict.id(), watcher.pattern.to_string());
            if self.invoke_contained(&watcher.callback, args).is_some() {
                self.watcher_strikes.borrow_mut().remove(&strike_key);
                continue;
            }
            let strikes = self.watcher_strikes.borrow().get(&strike_key).copied().unwrap_or(0) + 1;
            if strikes >= crate::func::CALLBACK_STRIKES {
                dict.remove_watcher(&watcher.pattern, &watcher.callback);
                self.watcher_strikes.borrow_mut().remove(&strike_key);
            } else {
                self.watcher_strikes.borrow_mut().insert(strike_key, strikes);
            }
        }
    }

    /// Register a change watcher on `dict`; `pattern` matches keys
    /// exactly, or as a prefix when it ends in `*`.
    pub fn add_dict_watcher(&self, dict: &DictHandle, pattern: &str, callback: Value) -> Result<()> {
        if !callback.is_callable() {
            return Err(error::arg_type("watcher", "Func", callback.kind_name()));
        }
        dict.add_watcher(DictWatcher { pattern: Rc::from(pattern), callback });
        Ok(())
    }

    /// Remove a previously registered watcher; false when no watcher with
    /// that pattern and callback exists.
    pub fn remove_dict_watcher(&self, dict: &DictHandle, pattern: &str, callback: &Value) -> bool {
        self.watcher_strikes.borrow_mut().remove(&(dict.id(), pattern.to_string()));
        dict.remove_watcher(pattern, callback)
    }

    /// Write back through a place without operator or watcher machinery;
    /// auto-vivification only.
    fn write_through(&self, place: &Place, value: Value) -> Result<()> {
        match place {
            Place::Var(name) => self.set_var(name, value),
            Place::Entry { dict, key } => {
                dict.check_lock(key)?;
                dict.insert(Rc::clone(key), value);
                Ok(())
            }
            Place::Item { list, index } => {
                list.check_lock("list")?;
                list.set_at(*index, value);
                Ok(())
            }
            _ => Err(error::type_error("cannot index through a range")),
        }
    }
}

/// True when the char after `.` starts a dictionary key.
fn is_key_start(ev: &ExprEval<'_>) -> bool {
    ev.rest()[1..].starts_with(lex::is_ident_start)
}

/// Describe a place for lock error messages.
fn place_name(place: &Place) -> &str {
    match place {
        Place::Var(name) => name,
        Place::Entry { key, .. } => key,
        _ => "list",
    }
}

/// Resolved start of a span target, defaulting to 0.
fn resolve_span_start(len: usize, lower: Option<i64>) -> Result<usize> {
    let Some(lower) = lower else { return Ok(0) };
    if lower >= 0 {
        let at = usize::try_from(lower).unwrap_or(usize::MAX);
        if at > len {
            return Err(error::list_index(lower));
        }
        return Ok(at);
    }
    let n = i64::try_from(len).unwrap_or(i64::MAX);
    usize::try_from(lower + n).map_err(|_| error::list_index(lower))
}

/// A blob write value must be a Number in byte range.
pub(crate) fn byte_value(value: &Value) -> Result<u8> {
    let n = value.to_number()?;
    u8::try_from(n).map_err(|_| error::type_error(format!("blob byte out of range: {n}")))
}
