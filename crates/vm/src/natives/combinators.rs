//! Control-structure natives beyond the compiler's built-in `if`:
//! `cond`, `while`, `times`, `each`, `fold`, `foldi`, `filter` (spec
//! §4.5). Every one of these takes a `code-address` value (produced by a
//! `[ ... ]` quotation with an operator inside, spec §4.1) and drives it
//! with [`call_quotation`], which runs synchronously to the quotation's
//! own `RETURN`.
//!
//! Arrays are snapshotted into a plain `Vec` before iterating: a
//! quotation is free to mutate the very array it was handed (`adel`,
//! `aset`, recursive `each`, ...), and driving the loop off a live
//! `RefCell` borrow would either panic on re-entry or silently iterate
//! a half-mutated collection.

use kokoki_core::Value;

use crate::context::Context;
use crate::error::{Fault, push_error, underflow_message};
use crate::interp::call_quotation;

fn pop_code_address(ctx: &mut Context, op: &str) -> Option<u32> {
    match ctx.stack.pop() {
        Some(Value::CodeAddress(a)) => Some(a),
        Some(other) => {
            push_error(
                &mut ctx.stack,
                format!("{op}: expected a quotation, found {}", other.type_name()),
            );
            None
        }
        None => unreachable!("caller already checked depth"),
    }
}

fn pop_array_snapshot(ctx: &mut Context, op: &str) -> Option<Vec<Value>> {
    match ctx.stack.pop() {
        Some(Value::Array(handle)) => Some(handle.borrow().clone()),
        Some(other) => {
            push_error(
                &mut ctx.stack,
                format!("{op}: expected an array, found {}", other.type_name()),
            );
            None
        }
        None => unreachable!("caller already checked depth"),
    }
}

/// `each`: `(array quotation --)`. Runs the quotation once per element
/// for its side effect and replaces each element with whatever the
/// quotation leaves on top of the stack (spec's worked example is
/// map-like, not purely side-effecting).
pub fn each(ctx: &mut Context) -> Result<(), Fault> {
    if ctx.stack.depth() < 2 {
        let depth = ctx.stack.depth();
        push_error(&mut ctx.stack, underflow_message("each", 2, depth));
        return Ok(());
    }
    let Some(addr) = pop_code_address(ctx, "each") else {
        return Ok(());
    };
    let array = match ctx.stack.pop() {
        Some(Value::Array(handle)) => handle,
        Some(other) => {
            push_error(
                &mut ctx.stack,
                format!("each: expected an array, found {}", other.type_name()),
            );
            return Ok(());
        }
        None => unreachable!("caller already checked depth"),
    };
    let items = array.borrow().clone();
    let mut mapped = Vec::with_capacity(items.len());
    for item in items {
        ctx.stack.push(item);
        call_quotation(ctx, addr)?;
        match ctx.stack.pop() {
            Some(v) => mapped.push(v),
            None => {
                push_error(&mut ctx.stack, "each: quotation consumed the stack");
                return Ok(());
            }
        }
    }
    *array.borrow_mut() = mapped;
    ctx.stack.push(Value::Array(array));
    Ok(())
}

/// `filter`: `(array quotation -- array)`. Keeps the original elements
/// for which the quotation leaves a truthy value on top.
pub fn filter(ctx: &mut Context) -> Result<(), Fault> {
    if ctx.stack.depth() < 2 {
        let depth = ctx.stack.depth();
        push_error(&mut ctx.stack, underflow_message("filter", 2, depth));
        return Ok(());
    }
    let Some(addr) = pop_code_address(ctx, "filter") else {
        return Ok(());
    };
    let Some(items) = pop_array_snapshot(ctx, "filter") else {
        return Ok(());
    };
    let mut kept = Vec::new();
    for item in items {
        ctx.stack.push(item.clone());
        call_quotation(ctx, addr)?;
        let keep = ctx.stack.pop().map(|v| v.is_truthy()).unwrap_or(false);
        if keep {
            kept.push(item);
        }
    }
    ctx.stack.push(Value::array(kept));
    Ok(())
}

/// `fold`: `(array init quotation -- result)`. The quotation sees
/// `(acc item --)` and must leave the new accumulator on top.
pub fn fold(ctx: &mut Context) -> Result<(), Fault> {
    if ctx.stack.depth() < 3 {
        let depth = ctx.stack.depth();
        push_error(&mut ctx.stack, underflow_message("fold", 3, depth));
        return Ok(());
    }
    let Some(addr) = pop_code_address(ctx, "fold") else {
        return Ok(());
    };
    let mut acc = ctx.stack.pop().unwrap();
    let Some(items) = pop_array_snapshot(ctx, "fold") else {
        return Ok(());
    };
    for item in items {
        ctx.stack.push(acc);
        ctx.stack.push(item);
        call_quotation(ctx, addr)?;
        match ctx.stack.pop() {
            Some(v) => acc = v,
            None => {
                push_error(&mut ctx.stack, "fold: quotation consumed the stack");
                return Ok(());
            }
        }
    }
    ctx.stack.push(acc);
    Ok(())
}

/// `foldi`: like `fold`, but the quotation also sees the element's
/// index: `(acc index item --)`.
pub fn foldi(ctx: &mut Context) -> Result<(), Fault> {
    if ctx.stack.depth() < 3 {
        let depth = ctx.stack.depth();
        push_error(&mut ctx.stack, underflow_message("foldi", 3, depth));
        return Ok(());
    }
    let Some(addr) = pop_code_address(ctx, "foldi") else {
        return Ok(());
    };
    let mut acc = ctx.stack.pop().unwrap();
    let Some(items) = pop_array_snapshot(ctx, "foldi") else {
        return Ok(());
    };
    for (i, item) in items.into_iter().enumerate() {
        ctx.stack.push(acc);
        ctx.stack.push(Value::Number(i as f64));
        ctx.stack.push(item);
        call_quotation(ctx, addr)?;
        match ctx.stack.pop() {
            Some(v) => acc = v,
            None => {
                push_error(&mut ctx.stack, "foldi: quotation consumed the stack");
                return Ok(());
            }
        }
    }
    ctx.stack.push(acc);
    Ok(())
}

/// `times`: `(n quotation --)`. Runs a zero-arity quotation `n` times.
pub fn times(ctx: &mut Context) -> Result<(), Fault> {
    if ctx.stack.depth() < 2 {
        let depth = ctx.stack.depth();
        push_error(&mut ctx.stack, underflow_message("times", 2, depth));
        return Ok(());
    }
    let Some(addr) = pop_code_address(ctx, "times") else {
        return Ok(());
    };
    let n = match ctx.stack.pop() {
        Some(Value::Number(n)) if n >= 0.0 => n as u64,
        Some(other) => {
            push_error(
                &mut ctx.stack,
                format!("times: expected a non-negative number, found {}", other.type_name()),
            );
            return Ok(());
        }
        None => unreachable!("caller already checked depth"),
    };
    for _ in 0..n {
        call_quotation(ctx, addr)?;
    }
    Ok(())
}

/// `while`: `(cond-quotation body-quotation --)`. Both quotations are
/// zero-arity; `cond` must leave a value on top to test for truthiness.
pub fn while_loop(ctx: &mut Context) -> Result<(), Fault> {
    if ctx.stack.depth() < 2 {
        let depth = ctx.stack.depth();
        push_error(&mut ctx.stack, underflow_message("while", 2, depth));
        return Ok(());
    }
    let Some(body_addr) = pop_code_address(ctx, "while") else {
        return Ok(());
    };
    let Some(cond_addr) = pop_code_address(ctx, "while") else {
        return Ok(());
    };
    loop {
        call_quotation(ctx, cond_addr)?;
        let keep_going = match ctx.stack.pop() {
            Some(v) => v.is_truthy(),
            None => {
                push_error(&mut ctx.stack, "while: condition quotation consumed the stack");
                return Ok(());
            }
        };
        if !keep_going {
            return Ok(());
        }
        call_quotation(ctx, body_addr)?;
    }
}

/// `cond`: `(cases --)`. `cases` is an array of two-element arrays
/// `[test-quotation, body-quotation]`; the first `test` that comes back
/// truthy has its `body` run, and `cond` stops there. No match is a
/// silent no-op, there being no explicit "else" case in the cases array.
pub fn cond(ctx: &mut Context) -> Result<(), Fault> {
    if ctx.stack.depth() < 1 {
        let depth = ctx.stack.depth();
        push_error(&mut ctx.stack, underflow_message("cond", 1, depth));
        return Ok(());
    }
    let Some(cases) = pop_array_snapshot(ctx, "cond") else {
        return Ok(());
    };
    for case in cases {
        let Value::Array(pair) = case else {
            push_error(&mut ctx.stack, "cond: expected each case to be a 2-element array");
            return Ok(());
        };
        let pair = pair.borrow();
        if pair.len() != 2 {
            push_error(&mut ctx.stack, "cond: expected each case to be a 2-element array");
            return Ok(());
        }
        let (test_addr, body_addr) = match (&pair[0], &pair[1]) {
            (Value::CodeAddress(t), Value::CodeAddress(b)) => (*t, *b),
            _ => {
                push_error(&mut ctx.stack, "cond: expected two quotations per case");
                return Ok(());
            }
        };
        drop(pair);
        call_quotation(ctx, test_addr)?;
        let matched = match ctx.stack.pop() {
            Some(v) => v.is_truthy(),
            None => {
                push_error(&mut ctx.stack, "cond: test quotation consumed the stack");
                return Ok(());
            }
        };
        if matched {
            call_quotation(ctx, body_addr)?;
            return Ok(());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn times_rejects_negative_count() {
        let mut ctx = Context::new();
        ctx.stack.push(Value::Number(-1.0));
        ctx.stack.push(Value::CodeAddress(0));
        times(&mut ctx).unwrap();
        assert!(matches!(ctx.stack.pop(), Some(Value::Error(_))));
    }

    #[test]
    fn filter_rejects_non_array() {
        let mut ctx = Context::new();
        ctx.stack.push(Value::Number(1.0));
        ctx.stack.push(Value::CodeAddress(0));
        filter(&mut ctx).unwrap();
        assert!(matches!(ctx.stack.pop(), Some(Value::Error(_))));
    }
}
