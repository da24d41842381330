//! kokoki - command-line driver for the Kokoki language.
//!
//! Usage:
//!   kokoki                # interactive REPL, prompt shows stack depth
//!   kokoki program.kok    # read, compile, and run a single source file
//!
//! This binary is the external collaborator the language itself stays
//! silent about: it only calls `kokoki_vm::eval` on a `Context` it owns,
//! the same host-embedding entry point any other driver would use.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use kokoki_core::Value;
use kokoki_vm::{Context, EvalError, eval};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

#[derive(Parser)]
#[command(name = "kokoki")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Kokoki: a stack-based concatenative language")]
struct Args {
    /// Source file to read, compile, and run. Omit to start the REPL.
    file: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("KOKOKI_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("kokoki=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match args.file {
        Some(path) => run_file(&path),
        None => {
            run_repl();
            ExitCode::SUCCESS
        }
    }
}

/// Reads a single source file, evaluates it against a fresh context, and
/// reports failure through the process exit code (spec §6: "Exit code 0
/// on success, nonzero if any evaluation reported a failure").
fn run_file(path: &std::path::Path) -> ExitCode {
    tracing::info!(file = %path.display(), "running source file");
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("kokoki: {}: {e}", path.display());
            return ExitCode::FAILURE;
        }
    };

    let mut ctx = Context::new();
    if let Err(e) = eval(&mut ctx, &source) {
        eprintln!("kokoki: {e}");
        return ExitCode::FAILURE;
    }

    if ctx.stack.iter().any(|v| matches!(v, Value::Error(_))) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Interactive loop: one `Context` persists across lines, so definitions
/// and ref-cells from earlier input stay visible, same as a `use`'d file
/// does. The prompt reports the operand stack's current depth rather than
/// its contents, which can grow arbitrarily wide.
fn run_repl() {
    tracing::info!("starting interactive session");
    let mut ctx = Context::new();
    let mut editor = DefaultEditor::new().expect("failed to initialize line editor");

    loop {
        let prompt = format!("{}> ", ctx.stack.depth());
        match editor.readline(&prompt) {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line.as_str());
                match eval(&mut ctx, &line) {
                    Ok(()) => {
                        if let Some(top) = ctx.stack.top() {
                            println!("{top:?}");
                        }
                    }
                    Err(e @ EvalError::Compile(_)) => eprintln!("{e}"),
                    Err(e @ EvalError::Fault(_)) => {
                        eprintln!("{e}");
                        break;
                    }
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("kokoki: {e}");
                break;
            }
        }
    }
}
