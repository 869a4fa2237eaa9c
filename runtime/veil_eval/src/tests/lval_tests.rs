//! Tests for lvalue resolution, assignment, unlet, and dict watchers.

use std::cell::RefCell;
use std::rc::Rc;

use pretty_assertions::assert_eq;

use veil_value::Value;

use crate::error::ErrorKind;
use crate::host::{Host, MessageKind};
use crate::interp::Interpreter;
use crate::lval::{AssignOp, LvalFlags};

fn with_list(items: Vec<i64>) -> Interpreter {
    let interp = Interpreter::new_bare();
    let items = items.into_iter().map(Value::Number).collect();
    let list = interp.heap().new_list(items);
    interp.set_var("g:l", Value::List(list)).unwrap();
    interp
}

#[test]
fn test_plain_and_compound_assignment() {
    let interp = Interpreter::new_bare();
    interp.assign("g:x", AssignOp::Assign, Value::Number(1)).unwrap();
    interp.assign("g:x", AssignOp::Add, Value::Number(2)).unwrap();
    assert_eq!(interp.evaluate_to_number("g:x").unwrap(), 3);
    interp.assign("g:x", AssignOp::Mul, Value::Number(4)).unwrap();
    assert_eq!(interp.evaluate_to_number("g:x").unwrap(), 12);
    interp.assign("g:s", AssignOp::Assign, Value::str("a")).unwrap();
    interp.assign("g:s", AssignOp::Concat, Value::str("b")).unwrap();
    assert_eq!(interp.evaluate_to_string("g:s").unwrap(), "ab");
}

#[test]
fn test_compound_assignment_requires_an_existing_variable() {
    let interp = Interpreter::new_bare();
    let err = interp.assign("g:fresh", AssignOp::Add, Value::Number(1)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Undefined);
}

#[test]
fn test_compound_add_extends_a_list_in_place() {
    let interp = with_list(vec![1]);
    let before = interp.evaluate("g:l").unwrap();
    let extra = Value::List(interp.heap().new_list(vec![Value::Number(2)]));
    interp.assign("g:l", AssignOp::Add, extra).unwrap();
    let after = interp.evaluate("g:l").unwrap();
    // Same instance, grown.
    assert_eq!(before.same_instance(&after), Some(true));
    assert_eq!(interp.evaluate_to_number("len(g:l)").unwrap(), 2);
}

#[test]
fn test_list_element_assignment() {
    let interp = with_list(vec![10, 20, 30]);
    interp.assign("g:l[1]", AssignOp::Assign, Value::Number(99)).unwrap();
    assert_eq!(interp.evaluate_to_number("g:l[1]").unwrap(), 99);
    interp.assign("g:l[-1]", AssignOp::Assign, Value::Number(7)).unwrap();
    assert_eq!(interp.evaluate_to_number("g:l[2]").unwrap(), 7);
    interp.assign("g:l[0]", AssignOp::Add, Value::Number(5)).unwrap();
    assert_eq!(interp.evaluate_to_number("g:l[0]").unwrap(), 15);
}

#[test]
fn test_one_past_end_appends_on_plain_assignment() {
    let interp = with_list(vec![1, 2]);
    interp.assign("g:l[2]", AssignOp::Assign, Value::Number(3)).unwrap();
    assert_eq!(interp.evaluate_to_number("len(g:l)").unwrap(), 3);
    let err = interp.assign("g:l[5]", AssignOp::Assign, Value::Number(9)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Range);
}

#[test]
fn test_range_assignment_checks_length() {
    let interp = with_list(vec![1, 2, 3, 4]);
    let pair = Value::List(interp.heap().new_list(vec![Value::Number(8), Value::Number(9)]));
    interp.assign("g:l[1:2]", AssignOp::Assign, pair).unwrap();
    assert_eq!(interp.evaluate_to_number("g:l[1]").unwrap(), 8);
    assert_eq!(interp.evaluate_to_number("g:l[2]").unwrap(), 9);

    let short = Value::List(interp.heap().new_list(vec![Value::Number(0)]));
    let err = interp.assign("g:l[1:2]", AssignOp::Assign, short).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Range);
}

#[test]
fn test_open_range_assignment_may_extend() {
    let interp = with_list(vec![1, 2, 3]);
    let tail = Value::List(interp.heap().new_list(vec![
        Value::Number(7),
        Value::Number(8),
        Value::Number(9),
    ]));
    interp.assign("g:l[2:]", AssignOp::Assign, tail).unwrap();
    assert_eq!(interp.evaluate_to_number("len(g:l)").unwrap(), 5);
    assert_eq!(interp.evaluate_to_number("g:l[2]").unwrap(), 7);
    assert_eq!(interp.evaluate_to_number("g:l[4]").unwrap(), 9);

    // Too few values for the remainder refuses.
    let interp = with_list(vec![1, 2, 3]);
    let empty = Value::List(interp.heap().new_list(Vec::new()));
    let err = interp.assign("g:l[1:]", AssignOp::Assign, empty).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Range);
}

#[test]
fn test_dict_entry_assignment() {
    let interp = Interpreter::new_bare();
    let dict = interp.heap().new_dict(Vec::new());
    interp.set_var("g:d", Value::Dict(dict)).unwrap();
    interp.assign("g:d.count", AssignOp::Assign, Value::Number(1)).unwrap();
    interp.assign("g:d['count']", AssignOp::Add, Value::Number(2)).unwrap();
    assert_eq!(interp.evaluate_to_number("g:d.count").unwrap(), 3);
    // Compound assignment to a missing key refuses to create it.
    let err = interp.assign("g:d.other", AssignOp::Add, Value::Number(1)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Undefined);
}

#[test]
fn test_null_autovivifies_to_a_list() {
    let interp = Interpreter::new_bare();
    interp.set_var("g:n", Value::Null).unwrap();
    interp.assign("g:n[0]", AssignOp::Assign, Value::Number(1)).unwrap();
    assert_eq!(interp.evaluate_to_number("type(g:n)").unwrap(), 3);
    assert_eq!(interp.evaluate_to_number("g:n[0]").unwrap(), 1);
}

#[test]
fn test_blob_byte_assignment() {
    let interp = Interpreter::new_bare();
    interp.set_var("g:b", Value::Blob(veil_value::BlobHandle::new(vec![1, 2]))).unwrap();
    interp.assign("g:b[0]", AssignOp::Assign, Value::Number(0xFF)).unwrap();
    assert_eq!(interp.evaluate_to_number("g:b[0]").unwrap(), 0xFF);
    // Appending one past the end.
    interp.assign("g:b[2]", AssignOp::Assign, Value::Number(3)).unwrap();
    assert_eq!(interp.evaluate_to_number("len(g:b)").unwrap(), 3);
    // A byte must fit in 0..=255.
    assert!(interp.assign("g:b[0]", AssignOp::Assign, Value::Number(300)).is_err());
}

#[test]
fn test_unlet() {
    let interp = Interpreter::new_bare();
    interp.set_var("g:x", Value::Number(1)).unwrap();
    interp.unlet("g:x", LvalFlags::empty()).unwrap();
    assert!(interp.evaluate_quiet("g:x").is_err());
    // Unletting a missing variable errors; the quiet flag keeps the sink
    // silent but the error still surfaces.
    assert!(interp.unlet("g:x", LvalFlags::QUIET).is_err());
}

#[test]
fn test_unlet_dict_key_and_list_item() {
    let interp = with_list(vec![1, 2, 3]);
    interp.unlet("g:l[1]", LvalFlags::empty()).unwrap();
    assert_eq!(interp.evaluate_to_number("len(g:l)").unwrap(), 2);
    assert_eq!(interp.evaluate_to_number("g:l[1]").unwrap(), 3);

    let dict = interp.heap().new_dict(vec![(Rc::from("k"), Value::Number(1))]);
    interp.set_var("g:d", Value::Dict(dict)).unwrap();
    interp.unlet("g:d.k", LvalFlags::empty()).unwrap();
    assert!(!interp.evaluate_to_bool("has_key(g:d, 'k')").unwrap());
}

#[test]
fn test_unlet_range() {
    let interp = with_list(vec![1, 2, 3, 4]);
    interp.unlet("g:l[1:2]", LvalFlags::empty()).unwrap();
    assert_eq!(interp.evaluate_to_number("len(g:l)").unwrap(), 2);
    assert_eq!(interp.evaluate_to_number("g:l[1]").unwrap(), 4);
}

#[test]
fn test_locked_list_refuses_writes() {
    let interp = with_list(vec![1, 2]);
    interp.evaluate("lock(g:l)").unwrap();
    let err = interp.assign("g:l[0]", AssignOp::Assign, Value::Number(9)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Locked);
    interp.evaluate("unlock(g:l)").unwrap();
    interp.assign("g:l[0]", AssignOp::Assign, Value::Number(9)).unwrap();
}

#[test]
fn test_lock_checks_walk_the_whole_path() {
    let interp = Interpreter::new_bare();
    let inner = interp.heap().new_list(vec![Value::Number(1)]);
    let outer = interp.heap().new_dict(vec![(Rc::from("inner"), Value::List(inner))]);
    interp.set_var("g:d", Value::Dict(outer)).unwrap();
    // Deep lock reaches the nested list.
    interp.evaluate("lock(g:d)").unwrap();
    let err = interp.assign("g:d.inner[0]", AssignOp::Assign, Value::Number(2)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Locked);
}

#[test]
fn test_reserved_entries_refuse_assignment() {
    let interp = Interpreter::new_bare();
    let err = interp.assign("v:true", AssignOp::Assign, Value::Number(0)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Locked);
}

#[test]
fn test_callable_cannot_shadow_a_builtin() {
    let interp = Interpreter::new_bare();
    let err = interp.set_var("len", Value::Func(Rc::from("Other"))).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Type);
    // Non-callable values are fine under that name.
    interp.set_var("g:len", Value::Number(1)).unwrap();
}

#[test]
fn test_resolve_lvalue_rejects_trailing_text() {
    let interp = with_list(vec![1]);
    assert!(interp.resolve_lvalue("g:l[0] junk", LvalFlags::empty()).is_err());
    assert!(interp.resolve_lvalue("g:l[", LvalFlags::empty()).is_err());
}

#[test]
fn test_dict_watcher_fires_with_old_and_new() {
    let interp = Interpreter::new_bare();
    let log: Rc<RefCell<Vec<(String, Value, Value)>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    interp
        .register_function("Watch", &["d", "k", "i"], false, move |_, args| {
            let key = args[1].coerce_string()?.to_string();
            let Value::Dict(info) = &args[2] else { panic!("expected info dict") };
            let old = info.get("old").unwrap_or(Value::Null);
            let new = info.get("new").unwrap_or(Value::Null);
            sink.borrow_mut().push((key, old, new));
            Ok(Value::Null)
        })
        .unwrap();

    let dict = interp.heap().new_dict(Vec::new());
    interp.add_dict_watcher(&dict, "count*", Value::Func(Rc::from("Watch"))).unwrap();
    interp.set_var("g:d", Value::Dict(dict)).unwrap();

    interp.assign("g:d.counter", AssignOp::Assign, Value::Number(1)).unwrap();
    interp.assign("g:d.counter", AssignOp::Assign, Value::Number(2)).unwrap();
    interp.assign("g:d.unrelated", AssignOp::Assign, Value::Number(0)).unwrap();
    interp.unlet("g:d.counter", LvalFlags::empty()).unwrap();

    let log = log.borrow();
    assert_eq!(log.len(), 3);
    assert_eq!(log[0], ("counter".to_owned(), Value::Null, Value::Number(1)));
    assert_eq!(log[1], ("counter".to_owned(), Value::Number(1), Value::Number(2)));
    // Deletion reports the old value with no new one.
    assert_eq!(log[2].0, "counter");
    assert_eq!(log[2].1, Value::Number(2));
}

struct RecordingHost {
    errors: RefCell<Vec<String>>,
}

impl Host for RecordingHost {
    fn message(&self, kind: MessageKind, text: &str) {
        if kind == MessageKind::Error {
            self.errors.borrow_mut().push(text.to_owned());
        }
    }
}

#[test]
fn test_failing_watcher_is_disabled_after_three_strikes() {
    let host = Rc::new(RecordingHost { errors: RefCell::new(Vec::new()) });
    let interp = Interpreter::new(host.clone());
    interp
        .register_function("Bad", &["d", "k", "i"], false, |_, _| {
            Err(crate::error::type_error("watcher failure"))
        })
        .unwrap();

    let dict = interp.heap().new_dict(Vec::new());
    interp.add_dict_watcher(&dict, "x", Value::Func(Rc::from("Bad"))).unwrap();
    interp.set_var("g:d", Value::Dict(dict.clone())).unwrap();

    for i in 0..5 {
        interp.assign("g:d.x", AssignOp::Assign, Value::Number(i)).unwrap();
    }
    // Three contained failures, then the watcher is unregistered.
    let contained = host.errors.borrow().iter().filter(|m| m.contains("watcher failure")).count();
    assert_eq!(contained, 3);
    assert!(!dict.has_watchers());
}

#[test]
fn test_remove_dict_watcher() {
    let interp = Interpreter::new_bare();
    interp.register_function("Noop", &["d", "k", "i"], false, |_, _| Ok(Value::Null)).unwrap();
    let dict = interp.heap().new_dict(Vec::new());
    let callback = Value::Func(Rc::from("Noop"));
    interp.add_dict_watcher(&dict, "k", callback.clone()).unwrap();
    assert!(interp.remove_dict_watcher(&dict, "k", &callback));
    assert!(!interp.remove_dict_watcher(&dict, "k", &callback));
}
