//! Display rendering of values.
//!
//! Two forms share one walker. The *string* form is re-parseable source
//! text: strings come out single-quoted with embedded quotes doubled, so
//! `evaluate(render_string(v))` rebuilds `v` for scalar and flat container
//! values. The *echo* form differs only at the top level, where a string
//! prints bare.
//!
//! A container that appears inside itself renders as `[...]` or `{...}` at
//! the point of re-entry; the walker tracks the containers on the current
//! path, so sibling repeats of a shared container still render in full.

use rustc_hash::FxHashSet;

use crate::func::PartialHandle;
use crate::number::format_float;
use crate::value::Value;

/// Render `value` as re-parseable source text.
pub fn render_string(value: &Value) -> String {
    let mut out = String::new();
    let mut path = FxHashSet::default();
    write_value(&mut out, value, &mut path);
    out
}

/// Render `value` for display: top-level strings print without quotes.
pub fn render_echo(value: &Value) -> String {
    match value {
        Value::Str(s) => (**s).to_owned(),
        other => render_string(other),
    }
}

fn write_value(out: &mut String, value: &Value, path: &mut FxHashSet<usize>) {
    match value {
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::Float(f) => out.push_str(&format_float(*f)),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Null => out.push_str("null"),
        Value::Unknown => out.push_str("unknown"),
        Value::Str(s) => write_quoted(out, s),
        Value::Func(name) => {
            out.push_str("function(");
            write_quoted(out, name);
            out.push(')');
        }
        Value::Partial(p) => write_partial(out, p, path),
        Value::Blob(blob) => {
            out.push_str("0z");
            for byte in blob.borrow_bytes().iter() {
                out.push_str(&format!("{byte:02X}"));
            }
        }
        Value::List(list) => {
            if !path.insert(list.id()) {
                out.push_str("[...]");
                return;
            }
            out.push('[');
            let items = list.snapshot();
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(out, item, path);
            }
            out.push(']');
            path.remove(&list.id());
        }
        Value::Dict(dict) => {
            if !path.insert(dict.id()) {
                out.push_str("{...}");
                return;
            }
            out.push('{');
            let entries = dict.snapshot();
            for (i, (key, item)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_quoted(out, key);
                out.push_str(": ");
                write_value(out, item, path);
            }
            out.push('}');
            path.remove(&dict.id());
        }
    }
}

/// `function('name')`, plus bound arguments and/or the bound dictionary.
fn write_partial(out: &mut String, partial: &PartialHandle, path: &mut FxHashSet<usize>) {
    out.push_str("function(");
    write_quoted(out, &partial.func_name());
    let args = partial.bound_args();
    if !args.is_empty() {
        out.push_str(", [");
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            write_value(out, arg, path);
        }
        out.push(']');
    }
    if let Some(dict) = partial.self_dict() {
        out.push_str(", ");
        write_value(out, &Value::Dict(dict.clone()), path);
    }
    out.push(')');
}

/// Single-quoted form: embedded quotes double.
fn write_quoted(out: &mut String, s: &str) {
    out.push('\'');
    for ch in s.chars() {
        if ch == '\'' {
            out.push_str("''");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
}
