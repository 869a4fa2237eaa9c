//! Host bridge.
//!
//! The runtime is embedded: options, registers, autoload script loading,
//! the pattern engine behind the match operators, and the message sink all
//! belong to the host application. The [`Host`] trait is that boundary.
//! Every method has a conservative default so tests and minimal embedders
//! can start from [`NullHost`].

use tracing::debug;

use veil_value::Value;

/// Which flavor of an option an access names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptionScope {
    /// Bare `&name`: the host picks its effective value.
    Auto,
    /// `&g:name`.
    Global,
    /// `&l:name`.
    Local,
}

/// Category of a message sent to the host sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Info,
    Warning,
    Error,
}

/// Services the embedding application provides to the runtime.
pub trait Host {
    /// Read an option value; `None` means the option does not exist.
    fn get_option(&self, name: &str, scope: OptionScope) -> Option<Value> {
        let _ = (name, scope);
        None
    }

    /// Write an option value.
    fn set_option(&self, name: &str, scope: OptionScope, value: &Value) -> Result<(), String> {
        let _ = (scope, value);
        Err(format!("unknown option: {name}"))
    }

    /// Contents of register `name`; `None` means the register is empty.
    fn get_register(&self, name: char) -> Option<String> {
        let _ = name;
        None
    }

    /// Load the autoload script unit at `path` (relative, `a/b.veil`
    /// style). Returns true only when the script was newly loaded, so the
    /// resolver knows a retry is worthwhile.
    fn load_autoload(&self, path: &str) -> bool {
        let _ = path;
        false
    }

    /// Match `text` against the host's pattern dialect.
    fn pattern_matches(&self, pattern: &str, text: &str, ignore_case: bool) -> Result<bool, String> {
        let _ = (text, ignore_case);
        Err(format!("no pattern engine for: {pattern}"))
    }

    /// Message sink. The default forwards to `tracing` so embedders that
    /// never look at messages still leave a trail.
    fn message(&self, kind: MessageKind, text: &str) {
        debug!(?kind, text, "host message");
    }

    /// True when the host wants the current evaluation to stop. Polled at
    /// iteration boundaries and call entry, never mid-expression.
    fn interrupted(&self) -> bool {
        false
    }
}

/// Host with nothing attached; every default applies.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullHost;

impl Host for NullHost {}
