//! Tests for `for` cursors and the filter/map family.

use std::cell::RefCell;
use std::rc::Rc;

use pretty_assertions::assert_eq;

use veil_value::{BlobHandle, Value};

use crate::error::ErrorKind;
use crate::interp::Interpreter;
use crate::iter::FilterMapMode;

fn number_list(interp: &Interpreter, items: &[i64]) -> Value {
    let items = items.iter().copied().map(Value::Number).collect();
    Value::List(interp.heap().new_list(items))
}

#[test]
fn test_list_cursor_yields_in_order() {
    let interp = Interpreter::new_bare();
    let list = number_list(&interp, &[1, 2, 3]);
    let mut cursor = interp.for_cursor(&list).unwrap();
    let mut seen = Vec::new();
    while let Some(item) = cursor.next() {
        seen.push(item.to_number().unwrap());
    }
    assert_eq!(seen, vec![1, 2, 3]);
}

#[test]
fn test_list_cursor_adjusts_for_mid_loop_removal() {
    let interp = Interpreter::new_bare();
    let list = interp.heap().new_list(vec![
        Value::Number(1),
        Value::Number(2),
        Value::Number(3),
        Value::Number(4),
    ]);
    let mut cursor = interp.for_cursor(&Value::List(list.clone())).unwrap();
    let mut seen = Vec::new();
    while let Some(item) = cursor.next() {
        let n = item.to_number().unwrap();
        seen.push(n);
        if n == 2 {
            // Removing an element behind the cursor shifts it back so no
            // element is skipped.
            list.remove_at(0);
        }
    }
    assert_eq!(seen, vec![1, 2, 3, 4]);
}

#[test]
fn test_removal_ahead_of_the_cursor() {
    let interp = Interpreter::new_bare();
    let list = interp.heap().new_list(vec![
        Value::Number(1),
        Value::Number(2),
        Value::Number(3),
    ]);
    let mut cursor = interp.for_cursor(&Value::List(list.clone())).unwrap();
    let first = cursor.next().unwrap();
    assert_eq!(first, Value::Number(1));
    list.remove_at(2);
    let mut rest = Vec::new();
    while let Some(item) = cursor.next() {
        rest.push(item.to_number().unwrap());
    }
    assert_eq!(rest, vec![2]);
}

#[test]
fn test_blob_cursor_yields_bytes() {
    let interp = Interpreter::new_bare();
    let blob = Value::Blob(BlobHandle::new(vec![0xAB, 0x01]));
    let mut cursor = interp.for_cursor(&blob).unwrap();
    assert_eq!(cursor.next(), Some(Value::Number(0xAB)));
    assert_eq!(cursor.next(), Some(Value::Number(1)));
    assert_eq!(cursor.next(), None);
}

#[test]
fn test_string_cursor_yields_characters() {
    let interp = Interpreter::new_bare();
    let mut cursor = interp.for_cursor(&Value::str("héj")).unwrap();
    assert_eq!(cursor.next(), Some(Value::str("h")));
    assert_eq!(cursor.next(), Some(Value::str("é")));
    assert_eq!(cursor.next(), Some(Value::str("j")));
    assert_eq!(cursor.next(), None);
}

#[test]
fn test_for_cursor_debug_shows_progress() {
    let interp = Interpreter::new_bare();
    let mut cursor = interp.for_cursor(&Value::str("ab")).unwrap();
    cursor.next();
    assert_eq!(format!("{cursor:?}"), "ForCursor { kind: \"string\", pos: 1 }");
}

#[test]
fn test_for_cursor_refuses_scalars() {
    let interp = Interpreter::new_bare();
    let err = interp.for_cursor(&Value::Number(1)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Type);
}

#[test]
fn test_filter_list_in_place() {
    let interp = Interpreter::new_bare();
    let list = number_list(&interp, &[1, 2, 3, 4, 5]);
    interp.set_var("g:l", list.clone()).unwrap();
    let result = interp.evaluate("filter(g:l, 'v:val % 2')").unwrap();
    // Same instance, mutated in place.
    assert_eq!(result.same_instance(&list), Some(true));
    let Value::List(handle) = &list else { unreachable!() };
    assert_eq!(handle.snapshot(), vec![Value::Number(1), Value::Number(3), Value::Number(5)]);
}

#[test]
fn test_map_list_with_lambda() {
    let interp = Interpreter::new_bare();
    interp.set_var("g:l", number_list(&interp, &[1, 2, 3])).unwrap();
    interp.evaluate("map(g:l, {k, v -> v * 10})").unwrap();
    assert_eq!(interp.evaluate_to_number("g:l[2]").unwrap(), 30);
}

#[test]
fn test_map_expression_sees_key_and_val() {
    let interp = Interpreter::new_bare();
    interp.set_var("g:l", number_list(&interp, &[10, 20])).unwrap();
    interp.evaluate("map(g:l, 'v:key')").unwrap();
    assert_eq!(interp.evaluate_to_number("g:l[0]").unwrap(), 0);
    assert_eq!(interp.evaluate_to_number("g:l[1]").unwrap(), 1);
}

#[test]
fn test_mapnew_leaves_the_source_untouched() {
    let interp = Interpreter::new_bare();
    interp.set_var("g:l", number_list(&interp, &[1, 2])).unwrap();
    let fresh = interp.evaluate("mapnew(g:l, 'v:val + 1')").unwrap();
    let original = interp.evaluate("g:l").unwrap();
    assert_eq!(fresh.same_instance(&original), Some(false));
    assert_eq!(interp.evaluate_to_number("g:l[0]").unwrap(), 1);
    let Value::List(fresh) = fresh else { unreachable!() };
    assert_eq!(fresh.snapshot(), vec![Value::Number(2), Value::Number(3)]);
}

#[test]
fn test_foreach_runs_for_side_effects() {
    let interp = Interpreter::new_bare();
    let seen: Rc<RefCell<Vec<(i64, i64)>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    interp
        .register_function("Note", &["k", "v"], false, move |_, args| {
            sink.borrow_mut().push((args[0].to_number()?, args[1].to_number()?));
            Ok(Value::Null)
        })
        .unwrap();
    interp.set_var("g:l", number_list(&interp, &[7, 8])).unwrap();
    interp.evaluate("foreach(g:l, function('Note'))").unwrap();
    assert_eq!(*seen.borrow(), vec![(0, 7), (1, 8)]);
    // The list is untouched.
    assert_eq!(interp.evaluate_to_number("g:l[0]").unwrap(), 7);
}

#[test]
fn test_filter_dict_removes_falsy_entries() {
    let interp = Interpreter::new_bare();
    let dict = interp.heap().new_dict(vec![
        (Rc::from("keep"), Value::Number(1)),
        (Rc::from("drop"), Value::Number(0)),
    ]);
    interp.set_var("g:d", Value::Dict(dict)).unwrap();
    interp.evaluate("filter(g:d, 'v:val')").unwrap();
    assert!(interp.evaluate_to_bool("has_key(g:d, 'keep')").unwrap());
    assert!(!interp.evaluate_to_bool("has_key(g:d, 'drop')").unwrap());
}

#[test]
fn test_map_dict_sees_string_keys() {
    let interp = Interpreter::new_bare();
    let dict = interp.heap().new_dict(vec![(Rc::from("a"), Value::Number(1))]);
    interp.set_var("g:d", Value::Dict(dict)).unwrap();
    interp.evaluate("map(g:d, 'v:key . v:val')").unwrap();
    assert_eq!(interp.evaluate_to_string("g:d.a").unwrap(), "a1");
}

#[test]
fn test_blob_map_validates_bytes() {
    let interp = Interpreter::new_bare();
    interp.set_var("g:b", Value::Blob(BlobHandle::new(vec![1, 2]))).unwrap();
    interp.evaluate("map(g:b, 'v:val * 2')").unwrap();
    let Value::Blob(blob) = interp.evaluate("g:b").unwrap() else { unreachable!() };
    assert_eq!(blob.snapshot(), vec![2, 4]);
    let err = interp.evaluate("map(g:b, 'v:val + 300')").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Type);
}

#[test]
fn test_blob_filter_drops_bytes() {
    let interp = Interpreter::new_bare();
    interp.set_var("g:b", Value::Blob(BlobHandle::new(vec![0, 5, 0, 7]))).unwrap();
    interp.evaluate("filter(g:b, 'v:val')").unwrap();
    let Value::Blob(blob) = interp.evaluate("g:b").unwrap() else { unreachable!() };
    assert_eq!(blob.snapshot(), vec![5, 7]);
}

#[test]
fn test_string_filter_and_map_build_new_strings() {
    let interp = Interpreter::new_bare();
    assert_eq!(interp.evaluate_to_string("filter('banana', \"v:val == 'a'\")").unwrap(), "aaa");
    assert_eq!(interp.evaluate_to_string("mapnew('ab', \"v:val . '-'\")").unwrap(), "a-b-");
    // Map over a string must produce string pieces.
    let err = interp.evaluate("map('ab', 'v:key')").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ArgType);
}

#[test]
fn test_key_and_val_are_restored_after_the_walk() {
    let interp = Interpreter::new_bare();
    interp.set_var("g:l", number_list(&interp, &[1, 2])).unwrap();
    interp.evaluate("map(g:l, 'v:val')").unwrap();
    assert_eq!(interp.evaluate_to_number("v:key").unwrap(), 0);
    assert_eq!(interp.evaluate_to_number("v:val").unwrap(), 0);
}

#[test]
fn test_container_is_locked_during_the_walk() {
    let interp = Interpreter::new_bare();
    interp.set_var("g:l", number_list(&interp, &[1, 2])).unwrap();
    let err = interp.evaluate("foreach(g:l, 'add(g:l, 99)')").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Locked);
    // The transient lock is released on the error path.
    interp.evaluate("add(g:l, 3)").unwrap();
    assert_eq!(interp.evaluate_to_number("len(g:l)").unwrap(), 3);
}

#[test]
fn test_filter_refuses_an_already_locked_container() {
    let interp = Interpreter::new_bare();
    interp.set_var("g:l", number_list(&interp, &[1])).unwrap();
    interp.evaluate("lock(g:l)").unwrap();
    let err = interp.evaluate("filter(g:l, 'v:val')").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Locked);
    // Read-only walks still run.
    interp.evaluate("mapnew(g:l, 'v:val')").unwrap();
}

#[test]
fn test_filter_map_api_mode() {
    let interp = Interpreter::new_bare();
    let list = number_list(&interp, &[1, 2, 3]);
    let fresh = interp
        .filter_map(&list, FilterMapMode::MapNew, &Value::str("v:val * v:val"))
        .unwrap();
    let Value::List(fresh) = fresh else { unreachable!() };
    assert_eq!(fresh.snapshot(), vec![Value::Number(1), Value::Number(4), Value::Number(9)]);
}
