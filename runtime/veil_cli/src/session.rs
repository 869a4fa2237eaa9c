//! The line-command grammar and script driver.
//!
//! One line is a comment (leading `"`), a command (`let`, `unlet`,
//! `echo`, `call`), or a bare expression that echoes its value. Error
//! positions are shifted to byte offsets within the whole line so callers
//! can point at the source.

use std::path::PathBuf;
use std::rc::Rc;

use veil_eval::{render_echo, AssignOp, Error, ErrorKind, Interpreter, LvalFlags};

use crate::host::CliHost;

/// Errors the session surfaces to the binary.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Eval(#[from] Error),
    #[error("line {line}: {err}")]
    Script {
        /// 1-based line number within the script.
        line: usize,
        #[source]
        err: Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// An interpreter plus the CLI host it talks to.
pub struct Session {
    interp: Rc<Interpreter>,
    host: Rc<CliHost>,
}

impl Session {
    /// Session with autoload disabled.
    pub fn new() -> Session {
        Session::with_root(None)
    }

    /// Session resolving `autoload/…` paths under `root`.
    pub fn with_root(root: Option<PathBuf>) -> Session {
        let host = Rc::new(CliHost::new(root));
        let interp = Rc::new(Interpreter::new(host.clone()));
        host.bind(Rc::downgrade(&interp));
        Session { interp, host }
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interp
    }

    pub fn host(&self) -> &CliHost {
        &self.host
    }

    /// Run one line; `Some` is text to show the user.
    pub fn run_line(&self, line: &str) -> Result<Option<String>, Error> {
        run_line(&self.interp, line)
    }

    /// Run a whole script under its own `s:` scope, printing command
    /// output as it goes. Stops at the first failing line.
    pub fn run_script(&self, source: &str) -> Result<(), CliError> {
        self.interp.enter_script(self.host.next_script_id());
        let mut result = Ok(());
        for (at, line) in source.lines().enumerate() {
            match run_line(&self.interp, line) {
                Ok(Some(out)) => println!("{out}"),
                Ok(None) => {}
                Err(err) => {
                    result = Err(CliError::Script { line: at + 1, err });
                    break;
                }
            }
        }
        self.interp.leave_script();
        result
    }
}

impl Default for Session {
    fn default() -> Session {
        Session::new()
    }
}

/// Execute one line against `interp`.
pub fn run_line(interp: &Interpreter, line: &str) -> Result<Option<String>, Error> {
    let trimmed = line.trim_end();
    let indent = trimmed.len() - trimmed.trim_start().len();
    let trimmed = trimmed.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('"') {
        return Ok(None);
    }

    let cmd_end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
    let (cmd, tail) = trimmed.split_at(cmd_end);
    let rest = tail.trim_start();
    let rest_off = indent + cmd_end + (tail.len() - rest.len());

    match cmd {
        "let" => {
            let Some((target, op, expr_off)) = split_assignment(rest) else {
                return Err(Error::new(ErrorKind::Syntax, "let requires 'target = expression'")
                    .at(rest_off));
            };
            let value = interp
                .evaluate(&rest[expr_off..])
                .map_err(|err| shift(err, rest_off + expr_off))?;
            interp
                .assign(target, op, value)
                .map_err(|err| shift(err, rest_off))?;
            Ok(None)
        }
        "unlet" | "unlet!" => {
            if rest.is_empty() {
                return Err(Error::new(ErrorKind::Syntax, "unlet requires a target").at(rest_off));
            }
            let bang = cmd == "unlet!";
            let flags = if bang { LvalFlags::QUIET } else { LvalFlags::empty() };
            for target in rest.split_whitespace() {
                match interp.unlet(target, flags) {
                    Ok(()) => {}
                    Err(err) if bang && err.kind == ErrorKind::Undefined => {}
                    Err(err) => return Err(shift(err, rest_off)),
                }
            }
            Ok(None)
        }
        "echo" => {
            if rest.is_empty() {
                return Ok(Some(String::new()));
            }
            let value = interp.evaluate(rest).map_err(|err| shift(err, rest_off))?;
            Ok(Some(render_echo(&value)))
        }
        "call" => {
            if rest.is_empty() {
                return Err(Error::new(ErrorKind::Syntax, "call requires an expression").at(rest_off));
            }
            interp.evaluate(rest).map_err(|err| shift(err, rest_off))?;
            Ok(None)
        }
        _ => {
            let value = interp.evaluate(trimmed).map_err(|err| shift(err, indent))?;
            Ok(Some(render_echo(&value)))
        }
    }
}

/// Split `target <op>= expression`; returns the target slice, the
/// operator, and the byte offset where the expression starts. Brackets
/// and string literals inside the target are skipped, and comparison
/// operators (`==`, `=~`, `!=`, `<=`, `>=`) never count as assignment.
fn split_assignment(rest: &str) -> Option<(&str, AssignOp, usize)> {
    let bytes = rest.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' && q == b'"' {
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match b {
            b'\'' | b'"' => quote = Some(b),
            b'[' | b'(' | b'{' => depth += 1,
            b']' | b')' | b'}' => depth = depth.saturating_sub(1),
            b'=' if depth == 0 => {
                if matches!(bytes.get(i + 1), Some(b'=' | b'~')) {
                    i += 2;
                    continue;
                }
                let (op, cut) = match i.checked_sub(1).map(|p| bytes[p]) {
                    Some(b'+') => (AssignOp::Add, 1),
                    Some(b'-') => (AssignOp::Sub, 1),
                    Some(b'*') => (AssignOp::Mul, 1),
                    Some(b'/') => (AssignOp::Div, 1),
                    Some(b'%') => (AssignOp::Mod, 1),
                    Some(b'.') => {
                        if i >= 2 && bytes[i - 2] == b'.' {
                            (AssignOp::Concat, 2)
                        } else {
                            (AssignOp::Concat, 1)
                        }
                    }
                    Some(b'!' | b'<' | b'>' | b'=') => {
                        i += 1;
                        continue;
                    }
                    _ => (AssignOp::Assign, 0),
                };
                let target = rest[..i - cut].trim();
                if target.is_empty() {
                    return None;
                }
                return Some((target, op, i + 1));
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Move an error's position from a sliced expression into line space.
fn shift(mut err: Error, by: usize) -> Error {
    err.pos = err.pos.map(|pos| pos + by);
    err
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use veil_eval::AssignOp;

    use super::split_assignment;

    #[test]
    fn test_split_plain_assignment() {
        let (target, op, off) = split_assignment("g:x = 1 + 2").unwrap();
        assert_eq!(target, "g:x");
        assert_eq!(op, AssignOp::Assign);
        assert_eq!(&"g:x = 1 + 2"[off..], " 1 + 2");
    }

    #[test]
    fn test_split_compound_operators() {
        assert_eq!(split_assignment("x += 1").unwrap().1, AssignOp::Add);
        assert_eq!(split_assignment("x -= 1").unwrap().1, AssignOp::Sub);
        assert_eq!(split_assignment("x *= 2").unwrap().1, AssignOp::Mul);
        assert_eq!(split_assignment("x /= 2").unwrap().1, AssignOp::Div);
        assert_eq!(split_assignment("x %= 2").unwrap().1, AssignOp::Mod);
        assert_eq!(split_assignment("x .= 'a'").unwrap().1, AssignOp::Concat);
        assert_eq!(split_assignment("x ..= 'a'").unwrap().1, AssignOp::Concat);
    }

    #[test]
    fn test_split_skips_equals_inside_the_target_index() {
        let (target, op, _) = split_assignment("d[a == 1] = 2").unwrap();
        assert_eq!(target, "d[a == 1]");
        assert_eq!(op, AssignOp::Assign);
    }

    #[test]
    fn test_split_rejects_lines_without_assignment() {
        assert!(split_assignment("1 == 2").is_none());
        assert!(split_assignment("x").is_none());
        assert!(split_assignment("= 1").is_none());
    }
}
