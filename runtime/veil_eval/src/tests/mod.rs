//! Interpreter test modules.
//!
//! Each file covers one component; small scanner tests stay inline in
//! `lex.rs`.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod gc_tests;
mod iter_tests;
mod lval_tests;
mod scope_tests;
