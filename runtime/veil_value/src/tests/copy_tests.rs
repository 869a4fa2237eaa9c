//! Tests for shallow and deep copies, including shared and cyclic shapes.

use pretty_assertions::assert_eq;

use crate::copy::{deep_copy, shallow_copy};
use crate::error::ValueErrorKind;
use crate::heap::Heap;
use crate::value::Value;

#[test]
fn test_shallow_copy_shares_children() {
    let heap = Heap::new();
    let inner = heap.new_list(vec![Value::Number(1)]);
    let outer = heap.new_list(vec![Value::List(inner.clone())]);
    let copy = shallow_copy(&Value::List(outer.clone()), &heap);

    let Value::List(copy) = copy else { panic!("expected list") };
    assert!(!copy.ptr_eq(&outer));
    inner.push(Value::Number(2));
    // The nested list is shared, so the copy sees the mutation.
    match copy.get(0) {
        Some(Value::List(l)) => assert_eq!(l.len(), 2),
        other => panic!("expected list item, got {other:?}"),
    }
}

#[test]
fn test_deep_copy_is_independent() {
    let heap = Heap::new();
    let inner = heap.new_list(vec![Value::Number(1)]);
    let outer = heap.new_list(vec![Value::List(inner.clone()), Value::str("s")]);
    let original = Value::List(outer.clone());
    let copy = deep_copy(&original, &heap).unwrap();

    assert_eq!(copy, original);
    inner.push(Value::Number(2));
    // Mutating the original leaves the copy untouched.
    let Value::List(copy) = copy else { panic!("expected list") };
    match copy.get(0) {
        Some(Value::List(l)) => assert_eq!(l.len(), 1),
        other => panic!("expected list item, got {other:?}"),
    }
}

#[test]
fn test_deep_copy_preserves_sharing() {
    let heap = Heap::new();
    let shared = heap.new_list(vec![Value::Number(7)]);
    let outer = heap.new_list(vec![Value::List(shared.clone()), Value::List(shared.clone())]);
    let copy = deep_copy(&Value::List(outer), &heap).unwrap();

    let Value::List(copy) = copy else { panic!("expected list") };
    let (Some(Value::List(a)), Some(Value::List(b))) = (copy.get(0), copy.get(1)) else {
        panic!("expected two list items");
    };
    // `copy[0] is copy[1]` holds because the original items were one list.
    assert!(a.ptr_eq(&b));
    assert!(!a.ptr_eq(&shared));
}

#[test]
fn test_deep_copy_preserves_cycles() {
    let heap = Heap::new();
    let list = heap.new_list(vec![Value::Number(1)]);
    list.push(Value::List(list.clone()));

    let copy = deep_copy(&Value::List(list.clone()), &heap).unwrap();
    let Value::List(copy) = copy else { panic!("expected list") };
    match copy.get(1) {
        // The copy's self-reference points at the copy, not the original.
        Some(Value::List(inner)) => {
            assert!(inner.ptr_eq(&copy));
            assert!(!inner.ptr_eq(&list));
        }
        other => panic!("expected list item, got {other:?}"),
    }

    list.drain_for_sweep();
    copy.drain_for_sweep();
}

#[test]
fn test_deep_copy_dict_cycle() {
    let heap = Heap::new();
    let dict = heap.new_dict(vec![("n".into(), Value::Number(1))]);
    dict.insert("me".into(), Value::Dict(dict.clone()));

    let copy = deep_copy(&Value::Dict(dict.clone()), &heap).unwrap();
    let Value::Dict(copy) = copy else { panic!("expected dict") };
    match copy.get("me") {
        Some(Value::Dict(inner)) => assert!(inner.ptr_eq(&copy)),
        other => panic!("expected dict entry, got {other:?}"),
    }

    dict.drain_for_sweep();
    copy.drain_for_sweep();
}

#[test]
fn test_deep_copy_depth_ceiling() {
    let heap = Heap::new();
    // 101 nested lists: copying the innermost exceeds the ceiling.
    let mut value = Value::List(heap.new_list(vec![]));
    for _ in 0..100 {
        value = Value::List(heap.new_list(vec![value]));
    }
    let err = deep_copy(&value, &heap).unwrap_err();
    assert_eq!(err.kind, ValueErrorKind::NestedTooDeep);

    // 100 levels is still within bounds.
    let mut value = Value::List(heap.new_list(vec![]));
    for _ in 0..99 {
        value = Value::List(heap.new_list(vec![value]));
    }
    assert!(deep_copy(&value, &heap).is_ok());
}

#[test]
fn test_copies_start_unlocked() {
    let heap = Heap::new();
    let list = heap.new_list(vec![Value::Number(1)]);
    list.set_lock(crate::lock::VarLock::Locked);
    let copy = deep_copy(&Value::List(list), &heap).unwrap();
    let Value::List(copy) = copy else { panic!("expected list") };
    assert_eq!(copy.lock_state(), crate::lock::VarLock::Unlocked);
}

#[test]
fn test_blob_copies_duplicate_bytes() {
    let heap = Heap::new();
    let blob = crate::blob::BlobHandle::new(vec![1, 2]);
    let shallow = shallow_copy(&Value::Blob(blob.clone()), &heap);
    let deep = deep_copy(&Value::Blob(blob.clone()), &heap).unwrap();
    blob.set_at(0, 9);
    for copy in [shallow, deep] {
        let Value::Blob(b) = copy else { panic!("expected blob") };
        assert!(!b.ptr_eq(&blob));
        assert_eq!(b.snapshot(), vec![1, 2]);
    }
}
