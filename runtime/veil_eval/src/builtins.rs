//! The builtin function namespace.
//!
//! Builtin names are all-lowercase and resolve before the user registry;
//! the core set here is what the runtime itself depends on, and hosts add
//! their own entries on top through [`Interpreter::register_builtin`].

use rustc_hash::FxHashMap;

use veil_value::{deep_copy, lock_value, render_string, shallow_copy, BlobHandle, DictHandle, ListHandle, Value};

use crate::error::{self, Result};
use crate::func::{is_builtin_name, valid_user_func_name, CallArgs};
use crate::host::OptionScope;
use crate::interp::Interpreter;
use crate::iter::FilterMapMode;
use crate::lval::byte_value;

/// Signature of one builtin: borrows the interpreter and its argument row.
pub type BuiltinFn = fn(&Interpreter, &mut CallArgs) -> Result<Value>;

/// Name → implementation map for the builtin namespace.
pub struct BuiltinTable {
    entries: FxHashMap<Box<str>, BuiltinFn>,
}

impl BuiltinTable {
    /// The core set the runtime installs on construction.
    pub fn core() -> BuiltinTable {
        let mut table = BuiltinTable { entries: FxHashMap::default() };
        let core: &[(&str, BuiltinFn)] = &[
            ("function", bi_function),
            ("call", bi_call),
            ("filter", bi_filter),
            ("map", bi_map),
            ("mapnew", bi_mapnew),
            ("foreach", bi_foreach),
            ("copy", bi_copy),
            ("deepcopy", bi_deepcopy),
            ("string", bi_string),
            ("len", bi_len),
            ("empty", bi_empty),
            ("type", bi_type),
            ("exists", bi_exists),
            ("add", bi_add),
            ("insert", bi_insert),
            ("remove", bi_remove),
            ("extend", bi_extend),
            ("has_key", bi_has_key),
            ("keys", bi_keys),
            ("values", bi_values),
            ("items", bi_items),
            ("lock", bi_lock),
            ("unlock", bi_unlock),
            ("islocked", bi_islocked),
            ("garbagecollect", bi_garbagecollect),
        ];
        for (name, func) in core {
            table.entries.insert(Box::from(*name), *func);
        }
        table
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<BuiltinFn> {
        self.entries.get(name).copied()
    }

    fn insert(&mut self, name: &str, func: BuiltinFn) {
        self.entries.insert(Box::from(name), func);
    }
}

impl Interpreter {
    /// Add a host builtin. The name must fit the builtin namespace
    /// (lowercase letters and underscores).
    pub fn register_builtin(&self, name: &str, func: BuiltinFn) -> Result<()> {
        if !is_builtin_name(name) {
            return Err(error::invalid_name(name));
        }
        self.builtins.borrow_mut().insert(name, func);
        Ok(())
    }
}

fn arity(name: &str, args: &CallArgs, min: usize, max: usize) -> Result<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{min} to {max}")
        };
        return Err(error::arg_count(name, &expected, args.len()));
    }
    Ok(())
}

fn as_list<'a>(name: &str, value: &'a Value) -> Result<&'a ListHandle> {
    match value {
        Value::List(list) => Ok(list),
        other => Err(error::arg_type(name, "List", other.kind_name())),
    }
}

fn as_dict<'a>(name: &str, value: &'a Value) -> Result<&'a DictHandle> {
    match value {
        Value::Dict(dict) => Ok(dict),
        other => Err(error::arg_type(name, "Dictionary", other.kind_name())),
    }
}

fn resolve_list_index(list: &ListHandle, index: i64) -> Result<usize> {
    list.resolve(index).ok_or_else(|| error::list_index(index))
}

fn resolve_blob_index(blob: &BlobHandle, index: i64) -> Result<usize> {
    blob.resolve(index).ok_or_else(|| error::blob_index(index))
}

fn bi_function(interp: &Interpreter, args: &mut CallArgs) -> Result<Value> {
    arity("function", args, 1, 3)?;
    if let Value::Str(name) = &args[0] {
        if !is_builtin_name(name) && !valid_user_func_name(name) {
            return Err(error::invalid_name(name));
        }
    }
    let mut bound: Vec<Value> = Vec::new();
    let mut self_dict = None;
    for extra in &args[1..] {
        match extra {
            Value::List(list) => bound = list.snapshot(),
            Value::Dict(dict) => self_dict = Some(dict.clone()),
            other => return Err(error::arg_type("function", "List or Dictionary", other.kind_name())),
        }
    }
    interp.make_partial(&args[0], &bound, self_dict)
}

fn bi_call(interp: &Interpreter, args: &mut CallArgs) -> Result<Value> {
    arity("call", args, 2, 3)?;
    let list = as_list("call", &args[1])?;
    let call_args: CallArgs = list.snapshot().into_iter().collect();
    let self_dict = match args.get(2) {
        Some(value) => Some(as_dict("call", value)?.clone()),
        None => None,
    };
    interp.call(&args[0], call_args, self_dict)
}

fn bi_filter(interp: &Interpreter, args: &mut CallArgs) -> Result<Value> {
    arity("filter", args, 2, 2)?;
    interp.filter_map(&args[0], FilterMapMode::Filter, &args[1])
}

fn bi_map(interp: &Interpreter, args: &mut CallArgs) -> Result<Value> {
    arity("map", args, 2, 2)?;
    interp.filter_map(&args[0], FilterMapMode::Map, &args[1])
}

fn bi_mapnew(interp: &Interpreter, args: &mut CallArgs) -> Result<Value> {
    arity("mapnew", args, 2, 2)?;
    interp.filter_map(&args[0], FilterMapMode::MapNew, &args[1])
}

fn bi_foreach(interp: &Interpreter, args: &mut CallArgs) -> Result<Value> {
    arity("foreach", args, 2, 2)?;
    interp.filter_map(&args[0], FilterMapMode::Foreach, &args[1])
}

fn bi_copy(interp: &Interpreter, args: &mut CallArgs) -> Result<Value> {
    arity("copy", args, 1, 1)?;
    Ok(shallow_copy(&args[0], &interp.heap))
}

fn bi_deepcopy(interp: &Interpreter, args: &mut CallArgs) -> Result<Value> {
    arity("deepcopy", args, 1, 1)?;
    Ok(deep_copy(&args[0], &interp.heap)?)
}

fn bi_string(_interp: &Interpreter, args: &mut CallArgs) -> Result<Value> {
    arity("string", args, 1, 1)?;
    Ok(Value::str(render_string(&args[0])))
}

fn bi_len(_interp: &Interpreter, args: &mut CallArgs) -> Result<Value> {
    arity("len", args, 1, 1)?;
    let len = match &args[0] {
        Value::Str(s) => s.len(),
        Value::List(list) => list.len(),
        Value::Dict(dict) => dict.len(),
        Value::Blob(blob) => blob.len(),
        Value::Number(n) => n.to_string().len(),
        other => return Err(error::arg_type("len", "String, List, Dictionary or Blob", other.kind_name())),
    };
    Ok(Value::Number(i64::try_from(len).unwrap_or(i64::MAX)))
}

fn bi_empty(_interp: &Interpreter, args: &mut CallArgs) -> Result<Value> {
    arity("empty", args, 1, 1)?;
    let empty = match &args[0] {
        Value::Str(s) => s.is_empty(),
        Value::List(list) => list.is_empty(),
        Value::Dict(dict) => dict.is_empty(),
        Value::Blob(blob) => blob.is_empty(),
        Value::Number(n) => *n == 0,
        Value::Float(f) => *f == 0.0,
        Value::Bool(b) => !*b,
        Value::Null => true,
        Value::Func(_) | Value::Partial(_) | Value::Unknown => false,
    };
    Ok(Value::Bool(empty))
}

fn bi_type(_interp: &Interpreter, args: &mut CallArgs) -> Result<Value> {
    arity("type", args, 1, 1)?;
    Ok(Value::Number(args[0].type_code()))
}

/// Quiet existence probe: `*name` for functions, `&name` for options,
/// anything else is a variable name.
fn bi_exists(interp: &Interpreter, args: &mut CallArgs) -> Result<Value> {
    arity("exists", args, 1, 1)?;
    let probe = args[0].coerce_string()?;
    let found = if let Some(name) = probe.strip_prefix('*') {
        interp.func_exists(name)
    } else if let Some(option) = probe.strip_prefix('&') {
        let (scope, name) = match option.split_once(':') {
            Some(("l", rest)) => (OptionScope::Local, rest),
            Some(("g", rest)) => (OptionScope::Global, rest),
            _ => (OptionScope::Auto, option),
        };
        interp.host.get_option(name, scope).is_some()
    } else {
        interp.var_exists(&probe)
    };
    Ok(Value::Bool(found))
}

fn bi_add(_interp: &Interpreter, args: &mut CallArgs) -> Result<Value> {
    arity("add", args, 2, 2)?;
    match &args[0] {
        Value::List(list) => {
            list.check_lock("list")?;
            list.push(args[1].clone());
        }
        Value::Blob(blob) => {
            blob.check_lock("blob")?;
            let len = blob.len();
            blob.set_at(len, byte_value(&args[1])?);
        }
        other => return Err(error::arg_type("add", "List or Blob", other.kind_name())),
    }
    Ok(args[0].clone())
}

fn bi_insert(_interp: &Interpreter, args: &mut CallArgs) -> Result<Value> {
    arity("insert", args, 2, 3)?;
    let before = match args.get(2) {
        Some(value) => value.to_number()?,
        None => 0,
    };
    match &args[0] {
        Value::List(list) => {
            list.check_lock("list")?;
            let at = if usize::try_from(before) == Ok(list.len()) {
                list.len()
            } else {
                resolve_list_index(list, before)?
            };
            list.insert_at(at, args[1].clone());
        }
        Value::Blob(blob) => {
            blob.check_lock("blob")?;
            let byte = byte_value(&args[1])?;
            let at = if usize::try_from(before) == Ok(blob.len()) {
                blob.len()
            } else {
                resolve_blob_index(blob, before)?
            };
            blob.insert_at(at, byte);
        }
        other => return Err(error::arg_type("insert", "List or Blob", other.kind_name())),
    }
    Ok(args[0].clone())
}

/// `remove(list, idx)`, `remove(list, from, to)`, `remove(dict, key)`,
/// `remove(blob, idx)` or `remove(blob, from, to)`. Single-index forms
/// return the removed element, range forms a container of them.
fn bi_remove(interp: &Interpreter, args: &mut CallArgs) -> Result<Value> {
    arity("remove", args, 2, 3)?;
    match &args[0] {
        Value::List(list) => {
            list.check_lock("list")?;
            let raw = args[1].to_number()?;
            let from = resolve_list_index(list, raw)?;
            match args.get(2) {
                None => list.remove_at(from).ok_or_else(|| error::list_index(raw)),
                Some(to) => {
                    let to = resolve_list_index(list, to.to_number()?)?;
                    if to < from {
                        return Err(error::range_length());
                    }
                    let removed = list.remove_span(from, to);
                    Ok(Value::List(interp.heap.new_list(removed)))
                }
            }
        }
        Value::Dict(dict) => {
            if args.len() > 2 {
                return Err(error::arg_count("remove", "2", args.len()));
            }
            dict.check_lock("dictionary")?;
            let key = args[1].coerce_string()?;
            dict.remove(&key).ok_or_else(|| error::undefined_key(&key))
        }
        Value::Blob(blob) => {
            blob.check_lock("blob")?;
            let from = resolve_blob_index(blob, args[1].to_number()?)?;
            match args.get(2) {
                None => {
                    let bytes = blob.snapshot();
                    blob.remove_span(from, from);
                    Ok(Value::Number(i64::from(bytes[from])))
                }
                Some(to) => {
                    let to = resolve_blob_index(blob, to.to_number()?)?;
                    if to < from {
                        return Err(error::range_length());
                    }
                    let removed = blob.snapshot()[from..=to].to_vec();
                    blob.remove_span(from, to);
                    Ok(Value::Blob(BlobHandle::new(removed)))
                }
            }
        }
        other => Err(error::arg_type("remove", "List, Dictionary or Blob", other.kind_name())),
    }
}

/// `extend(list, list [, before])` or `extend(dict, dict [, mode])` with
/// mode `"force"` (default), `"keep"` or `"error"`. Mutates and returns
/// the first argument.
fn bi_extend(_interp: &Interpreter, args: &mut CallArgs) -> Result<Value> {
    arity("extend", args, 2, 3)?;
    match (&args[0], &args[1]) {
        (Value::List(target), Value::List(source)) => {
            target.check_lock("list")?;
            match args.get(2) {
                None => target.extend_from(source),
                Some(before) => {
                    let before = before.to_number()?;
                    let mut at = if usize::try_from(before) == Ok(target.len()) {
                        target.len()
                    } else {
                        resolve_list_index(target, before)?
                    };
                    for item in source.snapshot() {
                        target.insert_at(at, item);
                        at += 1;
                    }
                }
            }
        }
        (Value::Dict(target), Value::Dict(source)) => {
            target.check_lock("dictionary")?;
            let mode = match args.get(2) {
                Some(value) => value.coerce_string()?,
                None => std::rc::Rc::from("force"),
            };
            if !matches!(&*mode, "force" | "keep" | "error") {
                return Err(error::arg_type("extend", "\"keep\", \"force\" or \"error\"", &mode));
            }
            for (key, value) in source.snapshot() {
                let present = target.contains_key(&key);
                match &*mode {
                    "keep" if present => {}
                    "error" if present => {
                        return Err(error::type_error(format!("key already exists: {key}")));
                    }
                    _ => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (Value::List(_) | Value::Dict(_), other) | (other, _) => {
            return Err(error::arg_type("extend", "two Lists or two Dictionaries", other.kind_name()));
        }
    }
    Ok(args[0].clone())
}

fn bi_has_key(_interp: &Interpreter, args: &mut CallArgs) -> Result<Value> {
    arity("has_key", args, 2, 2)?;
    let dict = as_dict("has_key", &args[0])?;
    let key = args[1].coerce_string()?;
    Ok(Value::Bool(dict.contains_key(&key)))
}

fn bi_keys(interp: &Interpreter, args: &mut CallArgs) -> Result<Value> {
    arity("keys", args, 1, 1)?;
    let dict = as_dict("keys", &args[0])?;
    let keys = dict.keys().into_iter().map(Value::Str).collect();
    Ok(Value::List(interp.heap.new_list(keys)))
}

fn bi_values(interp: &Interpreter, args: &mut CallArgs) -> Result<Value> {
    arity("values", args, 1, 1)?;
    let dict = as_dict("values", &args[0])?;
    let values = dict.snapshot().into_iter().map(|(_, value)| value).collect();
    Ok(Value::List(interp.heap.new_list(values)))
}

fn bi_items(interp: &Interpreter, args: &mut CallArgs) -> Result<Value> {
    arity("items", args, 1, 1)?;
    let dict = as_dict("items", &args[0])?;
    let items = dict
        .snapshot()
        .into_iter()
        .map(|(key, value)| Value::List(interp.heap.new_list(vec![Value::Str(key), value])))
        .collect();
    Ok(Value::List(interp.heap.new_list(items)))
}

fn lock_depth(name: &str, args: &CallArgs) -> Result<i64> {
    match args.get(1) {
        Some(value) => {
            let depth = value.to_number()?;
            if depth < 1 {
                return Err(error::arg_type(name, "a positive depth", &depth.to_string()));
            }
            Ok(depth)
        }
        None => Ok(2),
    }
}

fn bi_lock(_interp: &Interpreter, args: &mut CallArgs) -> Result<Value> {
    arity("lock", args, 1, 2)?;
    lock_value(&args[0], lock_depth("lock", args)?, true)?;
    Ok(args[0].clone())
}

fn bi_unlock(_interp: &Interpreter, args: &mut CallArgs) -> Result<Value> {
    arity("unlock", args, 1, 2)?;
    lock_value(&args[0], lock_depth("unlock", args)?, false)?;
    Ok(args[0].clone())
}

fn bi_islocked(_interp: &Interpreter, args: &mut CallArgs) -> Result<Value> {
    arity("islocked", args, 1, 1)?;
    let locked = match &args[0] {
        Value::List(list) => list.lock_state().is_locked(),
        Value::Dict(dict) => dict.lock_state().is_locked(),
        Value::Blob(blob) => blob.lock_state().is_locked(),
        _ => false,
    };
    Ok(Value::Bool(locked))
}

/// Requests a collection; it runs when the interpreter next goes idle.
fn bi_garbagecollect(interp: &Interpreter, args: &mut CallArgs) -> Result<Value> {
    arity("garbagecollect", args, 0, 0)?;
    interp.request_gc();
    Ok(Value::Null)
}
