//! Tests for cycle collection: roots, deferral, and watcher exemption.

use pretty_assertions::assert_eq;

use veil_value::Value;

use crate::interp::Interpreter;
use crate::lval::LvalFlags;

/// Builds a list that holds itself and drops the local handle, leaving the
/// cycle reachable only through `g:cycle` (or not at all once unlet).
fn plant_cycle(interp: &Interpreter) {
    let list = interp.heap().new_list(Vec::new());
    list.push(Value::List(list.clone()));
    interp.set_var("g:cycle", Value::List(list)).unwrap();
}

#[test]
fn test_reachable_cycle_survives_a_sweep() {
    let interp = Interpreter::new_bare();
    plant_cycle(&interp);
    let stats = interp.run_gc(false).unwrap();
    assert_eq!(stats.swept_lists, 0);
    assert!(interp.evaluate_to_bool("g:cycle[0] is g:cycle").unwrap());
}

#[test]
fn test_unreachable_cycle_is_swept() {
    let interp = Interpreter::new_bare();
    plant_cycle(&interp);
    let (lists_before, _) = interp.heap().live_counts();
    interp.unlet("g:cycle", LvalFlags::empty()).unwrap();
    let stats = interp.run_gc(false).unwrap();
    assert_eq!(stats.swept_lists, 1);
    let (lists_after, _) = interp.heap().live_counts();
    assert_eq!(lists_after, lists_before - 1);
}

#[test]
fn test_extra_roots_pin_a_cycle() {
    let interp = Interpreter::new_bare();
    let list = interp.heap().new_list(Vec::new());
    list.push(Value::List(list.clone()));
    let root = interp.add_gc_root(Value::List(list.clone()));
    drop(list);

    let stats = interp.run_gc(false).unwrap();
    assert_eq!(stats.swept_lists, 0);

    interp.remove_gc_root(root);
    let stats = interp.run_gc(false).unwrap();
    assert_eq!(stats.swept_lists, 1);
}

#[test]
fn test_watched_list_is_exempt_from_the_sweep() {
    let interp = Interpreter::new_bare();
    let list = interp.heap().new_list(vec![Value::Number(1)]);
    list.push(Value::List(list.clone()));
    let cursor = interp.for_cursor(&Value::List(list.clone())).unwrap();
    drop(list);

    // Unreachable from any root, but a live cursor holds it open.
    let stats = interp.run_gc(false).unwrap();
    assert_eq!(stats.swept_lists, 0);

    drop(cursor);
    let stats = interp.run_gc(false).unwrap();
    assert_eq!(stats.swept_lists, 1);
}

#[test]
fn test_collection_defers_while_evaluating() {
    let interp = Interpreter::new_bare();
    plant_cycle(&interp);
    interp.unlet("g:cycle", LvalFlags::empty()).unwrap();
    let (lists_before, _) = interp.heap().live_counts();
    interp
        .register_function("Collect", &[], false, |interp, _| {
            // Mid-call the collector must refuse to run.
            assert!(interp.run_gc(false).is_none());
            Ok(Value::Null)
        })
        .unwrap();
    interp.evaluate("Collect()").unwrap();
    // The deferred request ran once the evaluation unwound.
    let (lists_after, _) = interp.heap().live_counts();
    assert_eq!(lists_after, lists_before - 1);
}

#[test]
fn test_garbagecollect_builtin_requests_a_deferred_pass() {
    let interp = Interpreter::new_bare();
    plant_cycle(&interp);
    interp.unlet("g:cycle", LvalFlags::empty()).unwrap();
    let (lists_before, _) = interp.heap().live_counts();
    // The builtin defers to the end of this evaluation, which then sweeps.
    interp.evaluate("garbagecollect()").unwrap();
    let (lists_after, _) = interp.heap().live_counts();
    assert_eq!(lists_after, lists_before - 1);
}

#[test]
fn test_cross_container_cycle_is_swept_together() {
    let interp = Interpreter::new_bare();
    let list = interp.heap().new_list(Vec::new());
    let dict = interp.heap().new_dict(vec![(std::rc::Rc::from("back"), Value::List(list.clone()))]);
    list.push(Value::Dict(dict.clone()));
    drop(list);
    drop(dict);
    let stats = interp.run_gc(false).unwrap();
    assert_eq!(stats.swept_lists, 1);
    assert_eq!(stats.swept_dicts, 1);
}
