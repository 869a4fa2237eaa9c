//! Positioned error rendering with `ariadne`.

use ariadne::{Config, Label, Report, ReportKind, Source};

use veil_eval::{Error, ErrorKind};

/// Render `err` against the source text it came from. Falls back to a
/// plain one-liner when no position is known or rendering fails.
pub fn render(name: &str, src: &str, err: &Error) -> String {
    let Some(pos) = err.pos else {
        return format!("error: {err}\n");
    };
    let pos = pos.min(src.len());
    let end = src[pos..]
        .chars()
        .next()
        .map_or(pos, |ch| pos + ch.len_utf8());

    let mut buf = Vec::new();
    let report = Report::build(ReportKind::Error, name, pos)
        .with_config(Config::default().with_color(false))
        .with_message(&err.message)
        .with_label(Label::new((name, pos..end)).with_message(kind_label(err.kind)))
        .finish();
    if report.write((name, Source::from(src)), &mut buf).is_err() {
        return format!("error: {err}\n");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Syntax => "syntax error here",
        ErrorKind::Type => "type error here",
        ErrorKind::Undefined => "unresolved name",
        ErrorKind::Range => "out of range",
        ErrorKind::Locked => "locked value",
        ErrorKind::ExprNesting => "expression too deep",
        ErrorKind::CallDepth => "call stack too deep",
        ErrorKind::NestedTooDeep => "structure too deep",
        ErrorKind::ArgCount => "wrong argument count",
        ErrorKind::ArgType => "wrong argument kind",
        ErrorKind::Interrupted => "interrupted",
        ErrorKind::Host => "host failure",
    }
}
