//! Line-oriented host for the Veil expression runtime.
//!
//! The `veil` binary runs script files, evaluates one-off expressions, and
//! offers a small REPL. This library is the reusable part: [`CliHost`]
//! implements the runtime's host bridge with a regex pattern engine,
//! in-memory options and registers, and filesystem autoload; [`Session`]
//! wraps an interpreter with the line-command grammar (`let`, `unlet`,
//! `echo`, `call`, bare expressions).

pub mod host;
pub mod report;
pub mod session;

pub use host::CliHost;
pub use session::{CliError, Session};
