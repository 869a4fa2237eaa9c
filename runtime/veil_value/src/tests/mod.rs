//! Test modules relocated from implementation files.
//!
//! Inline test modules that outgrow their implementation files live here;
//! small ones (number parsing) stay next to their code.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod cmp_tests;
mod copy_tests;
