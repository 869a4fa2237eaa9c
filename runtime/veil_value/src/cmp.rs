//! Structural equality.
//!
//! Scalars of the numeric family (Number, Bool, Float) compare across
//! kinds; Null equals only Null. Containers compare item-wise with an
//! identity short-circuit. Comparisons nested past the ceiling are declared
//! equal rather than looping forever on recursive structures.

use crate::dict::DictHandle;
use crate::func::PartialHandle;
use crate::value::Value;

/// Nesting depth at which container comparison gives up and reports equal.
const EQUAL_RECURSE_LIMIT: usize = 1000;

/// Structural equality between two values.
///
/// `ignore_case` applies to every string comparison in the walk, including
/// strings inside containers.
pub fn values_equal(a: &Value, b: &Value, ignore_case: bool) -> bool {
    equal_at(a, b, ignore_case, 0)
}

fn equal_at(a: &Value, b: &Value, ic: bool, depth: usize) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Bool(y)) | (Value::Bool(y), Value::Number(x)) => *x == i64::from(*y),
        // partial_cmp keeps IEEE semantics (NaN != NaN, -0.0 == 0.0)
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y) == Some(std::cmp::Ordering::Equal),
        (Value::Float(f), Value::Number(n)) | (Value::Number(n), Value::Float(f)) => {
            #[expect(clippy::cast_precision_loss, reason = "script semantics: promotion is lossy past 2^53")]
            let promoted = *n as f64;
            f.partial_cmp(&promoted) == Some(std::cmp::Ordering::Equal)
        }
        (Value::Null, Value::Null) => true,
        (Value::Str(x), Value::Str(y)) => strings_equal(x, y, ic),
        (Value::List(x), Value::List(y)) => {
            if x.ptr_eq(y) {
                return true;
            }
            if depth >= EQUAL_RECURSE_LIMIT {
                return true;
            }
            let xs = x.borrow_items();
            let ys = y.borrow_items();
            xs.len() == ys.len()
                && xs.iter().zip(ys.iter()).all(|(i, j)| equal_at(i, j, ic, depth + 1))
        }
        (Value::Dict(x), Value::Dict(y)) => {
            if x.ptr_eq(y) {
                return true;
            }
            if depth >= EQUAL_RECURSE_LIMIT {
                return true;
            }
            let xs = x.borrow_entries();
            let ys = y.borrow_entries();
            xs.len() == ys.len()
                && xs.iter().all(|(key, i)| match ys.get(key) {
                    Some(j) => equal_at(i, j, ic, depth + 1),
                    None => false,
                })
        }
        (Value::Blob(x), Value::Blob(y)) => x.bytes_equal(y),
        (Value::Func(_) | Value::Partial(_), Value::Func(_) | Value::Partial(_)) => {
            funcs_equal(a, b, ic, depth)
        }
        _ => false,
    }
}

fn strings_equal(a: &str, b: &str, ic: bool) -> bool {
    if ic {
        a.to_lowercase() == b.to_lowercase()
    } else {
        a == b
    }
}

/// Function references compare by name; partials additionally require the
/// same bound `self` dictionary instance and pointwise-equal bound
/// arguments. A bare reference equals a partial that binds nothing.
fn funcs_equal(a: &Value, b: &Value, ic: bool, depth: usize) -> bool {
    let (name_a, partial_a) = func_parts(a);
    let (name_b, partial_b) = func_parts(b);
    let (Some(name_a), Some(name_b)) = (name_a, name_b) else {
        return false;
    };
    if *name_a != *name_b {
        return false;
    }

    let self_a = partial_a.and_then(PartialHandle::self_dict);
    let self_b = partial_b.and_then(PartialHandle::self_dict);
    if !same_dict(self_a, self_b) {
        return false;
    }

    let args_a = partial_a.map_or(&[][..], PartialHandle::bound_args);
    let args_b = partial_b.map_or(&[][..], PartialHandle::bound_args);
    args_a.len() == args_b.len()
        && args_a.iter().zip(args_b.iter()).all(|(i, j)| equal_at(i, j, ic, depth + 1))
}

fn func_parts(value: &Value) -> (Option<std::rc::Rc<str>>, Option<&PartialHandle>) {
    match value {
        Value::Func(name) => (Some(std::rc::Rc::clone(name)), None),
        Value::Partial(p) => (Some(p.func_name()), Some(p)),
        _ => (None, None),
    }
}

fn same_dict(a: Option<&DictHandle>, b: Option<&DictHandle>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => x.ptr_eq(y),
        _ => false,
    }
}
