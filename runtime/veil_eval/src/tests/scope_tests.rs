//! Tests for scope resolution, the reserved table, and autoload.

use std::cell::Cell;
use std::rc::Rc;

use pretty_assertions::assert_eq;

use veil_value::Value;

use crate::error::ErrorKind;
use crate::host::{Host, MessageKind, OptionScope};
use crate::interp::Interpreter;

#[test]
fn test_global_scope_round_trip() {
    let interp = Interpreter::new_bare();
    interp.set_var("g:x", Value::Number(5)).unwrap();
    assert_eq!(interp.evaluate_to_number("g:x").unwrap(), 5);
    // Unprefixed names are global outside a call.
    assert_eq!(interp.evaluate_to_number("x").unwrap(), 5);
}

#[test]
fn test_implicit_assignment_lands_in_globals() {
    let interp = Interpreter::new_bare();
    interp.set_var("count_things", Value::Number(1)).unwrap();
    assert_eq!(interp.evaluate_to_number("g:count_things").unwrap(), 1);
}

#[test]
fn test_bare_marker_is_the_scope_dict() {
    let interp = Interpreter::new_bare();
    interp.set_var("g:x", Value::Number(1)).unwrap();
    assert_eq!(interp.evaluate_to_number("g:['x']").unwrap(), 1);
    assert_eq!(interp.evaluate_to_number("type(g:)").unwrap(), 4);
}

#[test]
fn test_script_scope_follows_execution() {
    let interp = Interpreter::new_bare();
    interp.enter_script(1);
    interp.set_var("s:local", Value::Number(10)).unwrap();
    interp.enter_script(2);
    interp.set_var("s:local", Value::Number(20)).unwrap();
    assert_eq!(interp.evaluate_to_number("s:local").unwrap(), 20);
    interp.leave_script();
    assert_eq!(interp.evaluate_to_number("s:local").unwrap(), 10);
    interp.leave_script();
    let err = interp.evaluate("s:local").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Undefined);
}

#[test]
fn test_buffer_scope_tracks_current_buffer() {
    let interp = Interpreter::new_bare();
    interp.set_current_buffer(1);
    interp.set_var("b:mark", Value::Number(1)).unwrap();
    interp.set_current_buffer(2);
    assert!(interp.evaluate("b:mark").is_err());
    interp.set_var("b:mark", Value::Number(2)).unwrap();
    assert_eq!(interp.evaluate_to_number("b:mark").unwrap(), 2);
    interp.set_current_buffer(1);
    assert_eq!(interp.evaluate_to_number("b:mark").unwrap(), 1);
}

#[test]
fn test_detach_drops_buffer_variables() {
    let interp = Interpreter::new_bare();
    interp.set_current_buffer(7);
    interp.set_var("b:x", Value::Number(1)).unwrap();
    interp.detach_buffer(7);
    interp.set_current_buffer(7);
    assert!(interp.evaluate("b:x").is_err());
}

#[test]
fn test_local_scopes_require_a_frame() {
    let interp = Interpreter::new_bare();
    let err = interp.evaluate("l:x").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Undefined);
    assert!(interp.evaluate("a:x").is_err());
}

#[test]
fn test_reserved_table_is_read_only() {
    let interp = Interpreter::new_bare();
    let err = interp.set_var("v:true", Value::Number(0)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Locked);
    // New keys can never be created in v:.
    assert!(interp.set_var("v:made_up", Value::Number(1)).is_err());
    // errmsg stays writable.
    interp.set_var("v:errmsg", Value::str("oops")).unwrap();
    assert_eq!(interp.evaluate_to_string("v:errmsg").unwrap(), "oops");
}

#[test]
fn test_sandbox_blocks_count_writes() {
    let interp = Interpreter::new_bare();
    interp.set_var("v:count", Value::Number(3)).unwrap();
    interp.set_sandbox(true);
    let err = interp.set_var("v:count", Value::Number(4)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Locked);
    interp.set_sandbox(false);
    interp.set_var("v:count", Value::Number(4)).unwrap();
}

#[test]
fn test_version_materializes_lazily() {
    let interp = Interpreter::new_bare();
    let version = interp.evaluate_to_number("v:version").unwrap();
    assert!(version > 0);
}

#[test]
fn test_errmsg_captures_last_error() {
    let interp = Interpreter::new_bare();
    let _ = interp.evaluate("1 +");
    let msg = interp.evaluate_to_string("v:errmsg").unwrap();
    assert!(!msg.is_empty());
}

#[test]
fn test_invalid_names_are_rejected() {
    let interp = Interpreter::new_bare();
    assert!(interp.set_var("g:bad:name", Value::Number(1)).is_err());
    assert!(interp.set_var("s:auto#load", Value::Number(1)).is_err());
}

struct CountingHost {
    autoloads: Cell<u32>,
    last_path: std::cell::RefCell<String>,
}

impl Host for CountingHost {
    fn load_autoload(&self, path: &str) -> bool {
        self.autoloads.set(self.autoloads.get() + 1);
        *self.last_path.borrow_mut() = path.to_owned();
        false
    }

    fn message(&self, _kind: MessageKind, _text: &str) {}
}

#[test]
fn test_autoload_fires_once_per_prefix() {
    let host = Rc::new(CountingHost { autoloads: Cell::new(0), last_path: std::cell::RefCell::new(String::new()) });
    let interp = Interpreter::new(host.clone());
    assert!(interp.evaluate("mylib#util#helper").is_err());
    assert_eq!(host.autoloads.get(), 1);
    assert_eq!(*host.last_path.borrow(), "autoload/mylib/util.veil");
    // The failed attempt is remembered.
    assert!(interp.evaluate("mylib#util#helper").is_err());
    assert_eq!(host.autoloads.get(), 1);
}

struct OptionHost;

impl Host for OptionHost {
    fn get_option(&self, name: &str, _scope: OptionScope) -> Option<Value> {
        (name == "shiftwidth").then_some(Value::Number(42))
    }
}

#[test]
fn test_option_references_go_through_the_host() {
    let interp = Interpreter::new(Rc::new(OptionHost));
    assert_eq!(interp.evaluate_to_number("&shiftwidth").unwrap(), 42);
    assert_eq!(interp.evaluate_to_number("&g:shiftwidth").unwrap(), 42);
    let err = interp.evaluate("&nosuchoption").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Undefined);
}
