//! Stack safety for deep recursion.
//!
//! The expression ladder and the deep-copy/lock walks recurse once per
//! nesting level. The logical recursion ceilings keep runaway input out,
//! but a ceiling of 1000 ladder levels can still exceed a small OS stack,
//! so recursive entry points grow the stack on demand.
//!
//! Native targets use `stacker`; WASM manages its own stack and gets a
//! passthrough.

/// Minimum stack space to keep available (100KB red zone).
const RED_ZONE: usize = 100 * 1024;

/// Stack space to allocate when growing (1MB).
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Ensure sufficient stack space is available before executing `f`.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

/// WASM version - just call directly.
#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
