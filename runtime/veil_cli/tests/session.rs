//! End-to-end tests for the session line grammar and the CLI host.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;

use pretty_assertions::assert_eq;

use veil_cli::Session;
use veil_eval::{ErrorKind, Value};

#[test]
fn test_let_and_echo_round_trip() {
    let session = Session::new();
    assert_eq!(session.run_line("let g:x = 40").unwrap(), None);
    assert_eq!(session.run_line("echo g:x + 2").unwrap(), Some("42".into()));
}

#[test]
fn test_compound_let() {
    let session = Session::new();
    session.run_line("let g:x = 10").unwrap();
    session.run_line("let g:x += 5").unwrap();
    session.run_line("let g:x .= '!'").unwrap();
    assert_eq!(session.run_line("echo g:x").unwrap(), Some("15!".into()));
}

#[test]
fn test_let_through_an_indexed_target() {
    let session = Session::new();
    session.run_line("let g:d = {'items': [1, 2, 3]}").unwrap();
    session.run_line("let g:d.items[1] *= 10").unwrap();
    assert_eq!(session.run_line("echo g:d.items").unwrap(), Some("[1, 20, 3]".into()));
}

#[test]
fn test_bare_expression_echoes() {
    let session = Session::new();
    assert_eq!(session.run_line("'a' . 'b'").unwrap(), Some("ab".into()));
    // Top-level strings print without quotes; nested ones keep them.
    assert_eq!(session.run_line("['a']").unwrap(), Some("['a']".into()));
}

#[test]
fn test_comments_and_blanks_produce_nothing() {
    let session = Session::new();
    assert_eq!(session.run_line("").unwrap(), None);
    assert_eq!(session.run_line("   ").unwrap(), None);
    assert_eq!(session.run_line("\" a comment").unwrap(), None);
}

#[test]
fn test_unlet_and_bang() {
    let session = Session::new();
    session.run_line("let g:x = 1").unwrap();
    session.run_line("unlet g:x").unwrap();
    let err = session.run_line("echo g:x").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Undefined);
    // Plain unlet on a missing name fails, the bang form does not.
    let err = session.run_line("unlet g:x").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Undefined);
    session.run_line("unlet! g:x").unwrap();
}

#[test]
fn test_call_discards_output() {
    let session = Session::new();
    session.run_line("let g:l = []").unwrap();
    assert_eq!(session.run_line("call add(g:l, 7)").unwrap(), None);
    assert_eq!(session.run_line("echo g:l").unwrap(), Some("[7]".into()));
}

#[test]
fn test_error_positions_land_in_line_space() {
    let session = Session::new();
    let err = session.run_line("echo 1 + )").unwrap_err();
    // The bad token sits at byte 9 of the whole line.
    assert_eq!(err.pos, Some(9));
}

#[test]
fn test_regex_pattern_engine() {
    let session = Session::new();
    assert_eq!(session.run_line("'hello' =~ 'l+o'").unwrap(), Some("true".into()));
    assert_eq!(session.run_line("'hello' !~ 'z'").unwrap(), Some("true".into()));
    // The ? modifier forces case-insensitive matching.
    assert_eq!(session.run_line("'HELLO' =~ 'hello'").unwrap(), Some("false".into()));
    assert_eq!(session.run_line("'HELLO' =~? 'hello'").unwrap(), Some("true".into()));
    // A malformed pattern surfaces as a host error.
    let err = session.run_line("'x' =~ '('").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Host);
}

#[test]
fn test_registers_and_options_come_from_the_host() {
    let session = Session::new();
    session.host().put_register('a', "stored");
    assert_eq!(session.run_line("echo @a").unwrap(), Some("stored".into()));
    session.host().put_option("shiftwidth", Value::Number(4));
    assert_eq!(session.run_line("echo &shiftwidth * 2").unwrap(), Some("8".into()));
    let err = session.run_line("echo &missing").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Undefined);
}

#[test]
fn test_run_script_reports_the_failing_line() {
    let session = Session::new();
    let script = "let g:x = 1\nlet g:x += 1\necho undefined_name\n";
    let err = session.run_script(script).unwrap_err();
    let veil_cli::CliError::Script { line, err } = err else {
        panic!("expected a script error, got {err:?}");
    };
    assert_eq!(line, 3);
    assert_eq!(err.kind, ErrorKind::Undefined);
    // Lines before the failure ran.
    assert_eq!(session.run_line("echo g:x").unwrap(), Some("2".into()));
}

#[test]
fn test_script_scope_is_per_script() {
    let session = Session::new();
    session.run_script("let s:hidden = 1\nlet g:seen = s:hidden + 1\n").unwrap();
    assert_eq!(session.run_line("echo g:seen").unwrap(), Some("2".into()));
    // Outside any script there is no s: scope.
    let err = session.run_line("echo s:hidden").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Undefined);
}

#[test]
fn test_autoload_loads_from_the_root() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("autoload")).unwrap();
    fs::write(dir.path().join("autoload/mylib.veil"), "let mylib#answer = 42\n").unwrap();

    let session = Session::with_root(Some(dir.path().to_path_buf()));
    assert_eq!(session.run_line("echo mylib#answer").unwrap(), Some("42".into()));
    // A name the script never defines still fails after the load.
    let err = session.run_line("echo mylib#other").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Undefined);
}
