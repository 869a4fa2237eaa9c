//! Tests for structural equality semantics.

use crate::cmp::values_equal;
use crate::func::PartialHandle;
use crate::heap::Heap;
use crate::value::Value;

fn eq(a: &Value, b: &Value) -> bool {
    values_equal(a, b, false)
}

#[test]
fn test_numeric_family_cross_compares() {
    assert!(eq(&Value::Number(1), &Value::Bool(true)));
    assert!(eq(&Value::Bool(false), &Value::Number(0)));
    assert!(!eq(&Value::Number(2), &Value::Bool(true)));
    assert!(eq(&Value::Number(2), &Value::Float(2.0)));
    assert!(eq(&Value::Float(2.0), &Value::Number(2)));
    assert!(!eq(&Value::Float(2.5), &Value::Number(2)));
}

#[test]
fn test_null_equals_only_null() {
    assert!(eq(&Value::Null, &Value::Null));
    assert!(!eq(&Value::Null, &Value::Number(0)));
    assert!(!eq(&Value::Null, &Value::Bool(false)));
    assert!(!eq(&Value::Null, &Value::str("")));
}

#[test]
fn test_string_number_kinds_differ() {
    // Operator-level coercion is the evaluator's job; structural equality
    // keeps String and Number apart.
    assert!(!eq(&Value::Number(1), &Value::str("1")));
}

#[test]
fn test_string_case_flag() {
    let a = Value::str("Abc");
    let b = Value::str("abC");
    assert!(!values_equal(&a, &b, false));
    assert!(values_equal(&a, &b, true));
}

#[test]
fn test_case_flag_reaches_into_containers() {
    let heap = Heap::new();
    let a = Value::List(heap.new_list(vec![Value::str("X")]));
    let b = Value::List(heap.new_list(vec![Value::str("x")]));
    assert!(!values_equal(&a, &b, false));
    assert!(values_equal(&a, &b, true));
}

#[test]
fn test_list_and_dict_structural() {
    let heap = Heap::new();
    let a = Value::List(heap.new_list(vec![Value::Number(1), Value::str("s")]));
    let b = Value::List(heap.new_list(vec![Value::Number(1), Value::str("s")]));
    let c = Value::List(heap.new_list(vec![Value::Number(1)]));
    assert!(eq(&a, &b));
    assert!(!eq(&a, &c));

    let d1 = heap.new_dict(vec![("x".into(), Value::Number(1))]);
    let d2 = heap.new_dict(vec![("x".into(), Value::Number(1))]);
    let d3 = heap.new_dict(vec![("x".into(), Value::Number(2))]);
    assert!(eq(&Value::Dict(d1.clone()), &Value::Dict(d2)));
    assert!(!eq(&Value::Dict(d1), &Value::Dict(d3)));
}

#[test]
fn test_dict_order_does_not_matter_for_equality() {
    let heap = Heap::new();
    let a = heap.new_dict(vec![("x".into(), Value::Number(1)), ("y".into(), Value::Number(2))]);
    let b = heap.new_dict(vec![("y".into(), Value::Number(2)), ("x".into(), Value::Number(1))]);
    assert!(eq(&Value::Dict(a), &Value::Dict(b)));
}

#[test]
fn test_mixed_container_kinds_unequal() {
    let heap = Heap::new();
    let list = Value::List(heap.new_list(vec![]));
    let dict = Value::Dict(heap.new_dict(vec![]));
    let blob = Value::Blob(crate::blob::BlobHandle::new(vec![]));
    assert!(!eq(&list, &dict));
    assert!(!eq(&list, &blob));
    assert!(!eq(&dict, &blob));
}

#[test]
fn test_identity_short_circuits_cyclic_compare() {
    let heap = Heap::new();
    let list = heap.new_list(vec![]);
    list.push(Value::List(list.clone()));
    let v = Value::List(list.clone());
    assert!(eq(&v, &v.clone()));
    list.drain_for_sweep();
}

#[test]
fn test_recursion_ceiling_reports_equal() {
    let heap = Heap::new();
    // Two distinct self-referential lists: every level recurses into
    // another pair of non-identical lists, so only the ceiling stops it.
    let a = heap.new_list(vec![]);
    a.push(Value::List(a.clone()));
    let b = heap.new_list(vec![]);
    b.push(Value::List(b.clone()));
    assert!(eq(&Value::List(a.clone()), &Value::List(b.clone())));
    a.drain_for_sweep();
    b.drain_for_sweep();
}

#[test]
fn test_blob_equality_by_content() {
    let a = Value::Blob(crate::blob::BlobHandle::new(vec![1, 2]));
    let b = Value::Blob(crate::blob::BlobHandle::new(vec![1, 2]));
    let c = Value::Blob(crate::blob::BlobHandle::new(vec![1, 3]));
    assert!(eq(&a, &b));
    assert!(!eq(&a, &c));
}

#[test]
fn test_func_and_partial_equality() {
    let heap = Heap::new();
    let f = Value::Func("F".into());
    let g = Value::Func("G".into());
    assert!(eq(&f, &f.clone()));
    assert!(!eq(&f, &g));

    // A bare reference equals a partial binding nothing.
    let bare_partial = Value::Partial(PartialHandle::new("F".into(), vec![], None));
    assert!(eq(&f, &bare_partial));

    // Bound arguments compare pointwise.
    let p1 = Value::Partial(PartialHandle::new("F".into(), vec![Value::Number(1)], None));
    let p2 = Value::Partial(PartialHandle::new("F".into(), vec![Value::Number(1)], None));
    let p3 = Value::Partial(PartialHandle::new("F".into(), vec![Value::Number(2)], None));
    assert!(eq(&p1, &p2));
    assert!(!eq(&p1, &p3));
    assert!(!eq(&p1, &bare_partial));

    // Bound dictionaries compare by identity, not structure.
    let d1 = heap.new_dict(vec![]);
    let d2 = heap.new_dict(vec![]);
    let m1 = Value::Partial(PartialHandle::new("F".into(), vec![], Some(d1.clone())));
    let m2 = Value::Partial(PartialHandle::new("F".into(), vec![], Some(d1)));
    let m3 = Value::Partial(PartialHandle::new("F".into(), vec![], Some(d2)));
    assert!(eq(&m1, &m2));
    assert!(!eq(&m1, &m3));
    assert!(!eq(&m1, &bare_partial));
}

#[test]
fn test_func_never_equals_non_func() {
    let f = Value::Func("F".into());
    assert!(!eq(&f, &Value::str("F")));
    assert!(!eq(&f, &Value::Number(0)));
}
