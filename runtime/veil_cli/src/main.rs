//! The `veil` binary: script runner, one-shot evaluator, and REPL.

use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use veil_cli::{report, CliError, Session};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("VEIL_LOG"))
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    match args.get(1).map(String::as_str) {
        None | Some("repl") => repl(),
        Some("run") => match args.get(2) {
            Some(path) => run_file(path),
            None => usage_error("veil run <file.veil>"),
        },
        Some("eval") => match args.get(2) {
            Some(expr) => eval_expr(expr),
            None => usage_error("veil eval <expression>"),
        },
        Some("-h" | "--help" | "help") => {
            print_usage();
            ExitCode::SUCCESS
        }
        Some(path) if path.ends_with(".veil") => run_file(path),
        Some(other) => {
            eprintln!("unknown command: {other}");
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    eprintln!("Veil {}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  veil run <file.veil>    Run a script file");
    eprintln!("  veil eval <expression>  Evaluate one expression and print it");
    eprintln!("  veil repl               Interactive session (default)");
    eprintln!("  veil <file.veil>        Shorthand for run");
    eprintln!();
    eprintln!("Set VEIL_LOG (e.g. VEIL_LOG=debug) for runtime tracing.");
}

fn usage_error(usage: &str) -> ExitCode {
    eprintln!("Usage: {usage}");
    ExitCode::FAILURE
}

fn run_file(path: &str) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: cannot read {path}: {err}");
            return ExitCode::FAILURE;
        }
    };
    let root = Path::new(path).parent().map(Path::to_path_buf);
    let session = Session::with_root(root);
    match session.run_script(&source) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Script { line, err }) => {
            let text = source.lines().nth(line - 1).unwrap_or("");
            eprintln!("error: {path}:{line}:");
            eprint!("{}", report::render(path, text, &err));
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn eval_expr(expr: &str) -> ExitCode {
    let session = Session::with_root(env::current_dir().ok());
    match session.run_line(expr) {
        Ok(Some(out)) => {
            println!("{out}");
            ExitCode::SUCCESS
        }
        Ok(None) => ExitCode::SUCCESS,
        Err(err) => {
            eprint!("{}", report::render("expression", expr, &err));
            ExitCode::FAILURE
        }
    }
}

fn repl() -> ExitCode {
    let session = Session::with_root(env::current_dir().ok());
    println!("Veil {} (:help for commands, :quit to leave)", env!("CARGO_PKG_VERSION"));

    loop {
        print!("> ");
        let _ = io::stdout().flush();

        let mut input = String::new();
        match io::stdin().read_line(&mut input) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let line = input.trim();

        match line {
            ":quit" | ":q" => break,
            ":help" | ":h" => {
                println!("Commands:");
                println!("  :quit, :q          Exit");
                println!("  :help, :h          Show this help");
                println!("  let <t> <op> <e>   Assign (=, +=, -=, *=, /=, %=, .=, ..=)");
                println!("  unlet[!] <t>...    Remove variables");
                println!("  echo <expr>        Print a value");
                println!("  call <expr>        Evaluate, discard the result");
                println!("  <expr>             Evaluate and print");
            }
            "" => {}
            _ => match session.run_line(line) {
                Ok(Some(out)) => println!("{out}"),
                Ok(None) => {}
                Err(err) => eprint!("{}", report::render("repl", line, &err)),
            },
        }
    }
    ExitCode::SUCCESS
}
