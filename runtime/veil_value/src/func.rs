//! Partials: function references with bound state.
//!
//! A partial pairs a function name with pre-bound positional arguments
//! and/or a bound `self` dictionary. Partials are immutable once built;
//! calling one prepends the bound arguments and installs the dictionary.

use std::fmt;
use std::rc::Rc;

use crate::dict::DictHandle;
use crate::value::Value;

struct PartialInner {
    func: Rc<str>,
    bound_args: Vec<Value>,
    self_dict: Option<DictHandle>,
}

/// Reference-counted, immutable partial.
#[derive(Clone)]
pub struct PartialHandle(Rc<PartialInner>);

impl PartialHandle {
    pub fn new(func: Rc<str>, bound_args: Vec<Value>, self_dict: Option<DictHandle>) -> PartialHandle {
        PartialHandle(Rc::new(PartialInner { func, bound_args, self_dict }))
    }

    /// The underlying function name.
    pub fn func_name(&self) -> Rc<str> {
        Rc::clone(&self.0.func)
    }

    pub fn bound_args(&self) -> &[Value] {
        &self.0.bound_args
    }

    pub fn self_dict(&self) -> Option<&DictHandle> {
        self.0.self_dict.as_ref()
    }

    #[inline]
    pub fn ptr_eq(&self, other: &PartialHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Same partial with `self` replaced; used by method-call binding.
    pub fn with_self_dict(&self, dict: DictHandle) -> PartialHandle {
        PartialHandle(Rc::new(PartialInner {
            func: Rc::clone(&self.0.func),
            bound_args: self.0.bound_args.clone(),
            self_dict: Some(dict),
        }))
    }
}

impl fmt::Debug for PartialHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partial")
            .field("func", &self.0.func)
            .field("bound_args", &self.0.bound_args.len())
            .field("self", &self.0.self_dict.is_some())
            .finish()
    }
}
