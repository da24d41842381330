//! Host-collaborating natives: `slurp`, `nl`, `read`, `dump`, `eval`,
//! `use` (spec §4.5/§6). These are the only natives that touch the
//! filesystem or standard streams — every I/O failure becomes a
//! `Value::Error` on the stack rather than a `Fault`, since a missing
//! file or a closed stdin is an ordinary, recoverable condition for a
//! running program, not a reason to abort the whole evaluation.

use std::io::{self, BufRead};

use kokoki_core::Value;

use crate::context::Context;
use crate::error::{Fault, push_error, underflow_message};
use crate::interp::{self, EvalError};

fn pop_string(ctx: &mut Context, op: &str) -> Option<String> {
    match ctx.stack.pop() {
        Some(Value::String(s)) => Some(String::from_utf8_lossy(&s).into_owned()),
        Some(other) => {
            push_error(
                &mut ctx.stack,
                format!("{op}: expected a string, found {}", other.type_name()),
            );
            None
        }
        None => unreachable!("caller already checked depth"),
    }
}

pub fn nl(_ctx: &mut Context) -> Result<(), Fault> {
    println!();
    Ok(())
}

pub fn slurp(ctx: &mut Context) -> Result<(), Fault> {
    if ctx.stack.depth() < 1 {
        let depth = ctx.stack.depth();
        push_error(&mut ctx.stack, underflow_message("slurp", 1, depth));
        return Ok(());
    }
    let Some(path) = pop_string(ctx, "slurp") else {
        return Ok(());
    };
    match std::fs::read_to_string(&path) {
        Ok(text) => ctx.stack.push(Value::string(text.into_bytes())),
        Err(e) => push_error(&mut ctx.stack, format!("slurp: {path}: {e}")),
    }
    Ok(())
}

/// Reads one line from stdin, stripping the trailing newline. Pushes
/// `eof` at end of input rather than an error — running out of input is
/// an expected terminal condition for a line-oriented native, not a
/// failure.
pub fn read(ctx: &mut Context) -> Result<(), Fault> {
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) => ctx.stack.push(Value::Eof),
        Ok(_) => {
            if line.ends_with('\n') {
                line.pop();
                if line.ends_with('\r') {
                    line.pop();
                }
            }
            ctx.stack.push(Value::string(line.into_bytes()));
        }
        Err(e) => push_error(&mut ctx.stack, format!("read: {e}")),
    }
    Ok(())
}

/// Prints a value's full debug representation followed by a newline,
/// for inspecting structure (`dump`) rather than `print`'s unquoted,
/// unterminated rendering for user-facing output.
pub fn dump(ctx: &mut Context) -> Result<(), Fault> {
    if ctx.stack.depth() < 1 {
        let depth = ctx.stack.depth();
        push_error(&mut ctx.stack, underflow_message("dump", 1, depth));
        return Ok(());
    }
    let v = ctx.stack.pop().unwrap();
    println!("{}", interp::render(&v));
    Ok(())
}

pub fn eval_native(ctx: &mut Context) -> Result<(), Fault> {
    if ctx.stack.depth() < 1 {
        let depth = ctx.stack.depth();
        push_error(&mut ctx.stack, underflow_message("eval", 1, depth));
        return Ok(());
    }
    let Some(source) = pop_string(ctx, "eval") else {
        return Ok(());
    };
    run_nested(ctx, &source)
}

pub fn use_native(ctx: &mut Context) -> Result<(), Fault> {
    if ctx.stack.depth() < 1 {
        let depth = ctx.stack.depth();
        push_error(&mut ctx.stack, underflow_message("use", 1, depth));
        return Ok(());
    }
    let Some(path) = pop_string(ctx, "use") else {
        return Ok(());
    };
    match std::fs::read_to_string(&path) {
        Ok(text) => run_nested(ctx, &text),
        Err(e) => {
            push_error(&mut ctx.stack, format!("use: {path}: {e}"));
            Ok(())
        }
    }
}

fn run_nested(ctx: &mut Context, source: &str) -> Result<(), Fault> {
    match interp::eval(ctx, source) {
        Ok(()) => Ok(()),
        Err(EvalError::Compile(e)) => {
            push_error(&mut ctx.stack, format!("eval: {e}"));
            Ok(())
        }
        Err(EvalError::Fault(f)) => Err(f),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn slurp_missing_file_is_non_fatal() {
        let mut ctx = Context::new();
        ctx.stack.push(Value::string(*b"/does/not/exist/kokoki-test"));
        slurp(&mut ctx).unwrap();
        assert!(matches!(ctx.stack.pop(), Some(Value::Error(_))));
    }

    #[test]
    fn slurp_reads_an_existing_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "hello from disk").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let mut ctx = Context::new();
        ctx.stack.push(Value::string(path.into_bytes()));
        slurp(&mut ctx).unwrap();
        assert_eq!(ctx.stack.pop(), Some(Value::string(*b"hello from disk")));
    }

    #[test]
    fn use_loads_a_file_and_leaves_its_definitions_callable() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, ": sq dup * ;").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let mut ctx = Context::new();
        ctx.stack.push(Value::string(path.into_bytes()));
        use_native(&mut ctx).unwrap();
        assert_eq!(ctx.stack.depth(), 0, "loading definitions leaves nothing on the stack");

        interp::eval(&mut ctx, "9 sq").unwrap();
        assert_eq!(ctx.stack.pop(), Some(Value::Number(81.0)));
    }

    #[test]
    fn eval_runs_nested_source_against_same_context() {
        let mut ctx = Context::new();
        ctx.stack.push(Value::string(*b"1 2 +"));
        eval_native(&mut ctx).unwrap();
        assert_eq!(ctx.stack.pop(), Some(Value::Number(3.0)));
    }

    #[test]
    fn eval_compile_error_is_non_fatal() {
        let mut ctx = Context::new();
        ctx.stack.push(Value::string(*b"then"));
        eval_native(&mut ctx).unwrap();
        assert!(matches!(ctx.stack.pop(), Some(Value::Error(_))));
    }
}
