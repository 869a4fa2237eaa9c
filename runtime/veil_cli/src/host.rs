//! The CLI's side of the host bridge.
//!
//! Options and registers live in plain in-memory maps. The pattern engine
//! behind `=~`/`!~` is `regex`, with compiled patterns cached per
//! (pattern, case) pair. Autoload reads `autoload/…​.veil` files under a
//! configurable root and feeds their lines back through the line grammar,
//! which requires a back-reference to the interpreter; the host holds it
//! weakly so dropping the session tears everything down.

use std::cell::{Cell, RefCell};
use std::fs;
use std::path::PathBuf;
use std::rc::Weak;

use regex::Regex;
use rustc_hash::FxHashMap;
use tracing::debug;

use veil_eval::{Host, Interpreter, MessageKind, OptionScope, Value};

use crate::session;

/// Host bridge backed by memory and the local filesystem.
pub struct CliHost {
    autoload_root: Option<PathBuf>,
    options: RefCell<FxHashMap<String, Value>>,
    registers: RefCell<FxHashMap<char, String>>,
    patterns: RefCell<FxHashMap<(String, bool), Regex>>,
    interp: RefCell<Weak<Interpreter>>,
    script_seq: Cell<u64>,
}

impl CliHost {
    /// A host that resolves autoload paths under `autoload_root`; `None`
    /// disables autoload entirely.
    pub fn new(autoload_root: Option<PathBuf>) -> CliHost {
        CliHost {
            autoload_root,
            options: RefCell::new(FxHashMap::default()),
            registers: RefCell::new(FxHashMap::default()),
            patterns: RefCell::new(FxHashMap::default()),
            interp: RefCell::new(Weak::new()),
            script_seq: Cell::new(0),
        }
    }

    /// Attach the interpreter the autoload path re-enters. Called once by
    /// [`crate::Session`] right after construction.
    pub(crate) fn bind(&self, interp: Weak<Interpreter>) {
        *self.interp.borrow_mut() = interp;
    }

    /// A fresh script id for `enter_script`.
    pub fn next_script_id(&self) -> u64 {
        let id = self.script_seq.get() + 1;
        self.script_seq.set(id);
        id
    }

    /// Seed or overwrite an option value.
    pub fn put_option(&self, name: &str, value: Value) {
        self.options.borrow_mut().insert(name.to_owned(), value);
    }

    /// Seed or overwrite a register.
    pub fn put_register(&self, name: char, text: &str) {
        self.registers.borrow_mut().insert(name, text.to_owned());
    }
}

impl Host for CliHost {
    /// One flat option store; the CLI does not distinguish local from
    /// global values.
    fn get_option(&self, name: &str, _scope: OptionScope) -> Option<Value> {
        self.options.borrow().get(name).cloned()
    }

    fn set_option(&self, name: &str, _scope: OptionScope, value: &Value) -> Result<(), String> {
        self.options.borrow_mut().insert(name.to_owned(), value.clone());
        Ok(())
    }

    fn get_register(&self, name: char) -> Option<String> {
        self.registers.borrow().get(&name).cloned()
    }

    fn load_autoload(&self, path: &str) -> bool {
        let Some(root) = &self.autoload_root else {
            return false;
        };
        let full = root.join(path);
        let Ok(source) = fs::read_to_string(&full) else {
            debug!(path, "autoload script not found");
            return false;
        };
        let Some(interp) = self.interp.borrow().upgrade() else {
            return false;
        };
        debug!(path, "loading autoload script");
        let id = self.next_script_id();
        interp.enter_script(id);
        for (at, line) in source.lines().enumerate() {
            match session::run_line(&interp, line) {
                Ok(Some(out)) => println!("{out}"),
                Ok(None) => {}
                Err(err) => {
                    eprintln!("error: {}:{}: {err}", full.display(), at + 1);
                    break;
                }
            }
        }
        interp.leave_script();
        true
    }

    fn pattern_matches(&self, pattern: &str, text: &str, ignore_case: bool) -> Result<bool, String> {
        let key = (pattern.to_owned(), ignore_case);
        if let Some(re) = self.patterns.borrow().get(&key) {
            return Ok(re.is_match(text));
        }
        let source = if ignore_case {
            format!("(?i){pattern}")
        } else {
            pattern.to_owned()
        };
        let re = Regex::new(&source).map_err(|err| format!("invalid pattern: {err}"))?;
        let matched = re.is_match(text);
        self.patterns.borrow_mut().insert(key, re);
        Ok(matched)
    }

    fn message(&self, kind: MessageKind, text: &str) {
        match kind {
            MessageKind::Info => println!("{text}"),
            MessageKind::Warning => eprintln!("warning: {text}"),
            MessageKind::Error => eprintln!("error: {text}"),
        }
    }
}
