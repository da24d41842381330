//! Reference-cell natives: `?`, `!`, `!!`, `!?` (spec §4.5).
//!
//! A `ref-name` (`@foo`) and a plain `name` (`foo`) share one name table
//! — spec §3 describes a single table per context — but never collide:
//! the two tags hash and compare independently, so binding `@foo` never
//! shadows a word definition named `foo`.
//!
//! `!` and `!?` mutate an existing cell's contents in place rather than
//! replacing the table entry, so anything that captured the cell through
//! an earlier `?`... well, nothing captures cells directly today (`?`
//! only reads the current value out), but `!!` does hold the `Rc` across
//! its call into the quotation, and that identity has to survive `!`
//! calls racing in from elsewhere in the same evaluation.

use kokoki_core::Value;

use crate::context::Context;
use crate::error::{Fault, push_error, underflow_message};
use crate::interp::call_quotation;

fn pop_ref_name(ctx: &mut Context, op: &str) -> Option<Value> {
    match ctx.stack.pop() {
        Some(v @ Value::RefName(_)) => Some(v),
        Some(other) => {
            push_error(
                &mut ctx.stack,
                format!("{op}: expected a ref-name, found {}", other.type_name()),
            );
            None
        }
        None => unreachable!("caller already checked depth"),
    }
}

pub fn deref(ctx: &mut Context) -> Result<(), Fault> {
    if ctx.stack.depth() < 1 {
        let depth = ctx.stack.depth();
        push_error(&mut ctx.stack, underflow_message("?", 1, depth));
        return Ok(());
    }
    let Some(key) = pop_ref_name(ctx, "?") else {
        return Ok(());
    };
    match ctx.names.get(&key) {
        Value::RefValue(cell) => {
            let v = cell.borrow().clone();
            ctx.stack.push(v);
        }
        Value::Nil => push_error(&mut ctx.stack, "?: unbound reference"),
        other => push_error(
            &mut ctx.stack,
            format!("?: expected a ref-value, found {}", other.type_name()),
        ),
    }
    Ok(())
}

pub fn assign(ctx: &mut Context) -> Result<(), Fault> {
    if ctx.stack.depth() < 2 {
        let depth = ctx.stack.depth();
        push_error(&mut ctx.stack, underflow_message("!", 2, depth));
        return Ok(());
    }
    let value = ctx.stack.pop().unwrap();
    let Some(key) = pop_ref_name(ctx, "!") else {
        return Ok(());
    };
    match ctx.names.get(&key) {
        Value::RefValue(cell) => *cell.borrow_mut() = value,
        _ => ctx.names.insert(key, Value::cell(value)).map_err(Fault::new)?,
    }
    Ok(())
}

/// `!!`: pop a ref-name and a quotation, call the quotation with the
/// cell's current value on the stack, and store whatever it leaves on
/// top back into the cell.
pub fn update(ctx: &mut Context) -> Result<(), Fault> {
    if ctx.stack.depth() < 2 {
        let depth = ctx.stack.depth();
        push_error(&mut ctx.stack, underflow_message("!!", 2, depth));
        return Ok(());
    }
    let quotation = ctx.stack.pop().unwrap();
    let Some(key) = pop_ref_name(ctx, "!!") else {
        return Ok(());
    };
    let addr = match quotation {
        Value::CodeAddress(a) => a,
        other => {
            push_error(
                &mut ctx.stack,
                format!("!!: expected a code-address, found {}", other.type_name()),
            );
            return Ok(());
        }
    };
    let cell = match ctx.names.get(&key) {
        Value::RefValue(cell) => cell,
        _ => {
            push_error(&mut ctx.stack, "!!: unbound reference");
            return Ok(());
        }
    };
    let old = cell.borrow().clone();
    ctx.stack.push(old);
    call_quotation(ctx, addr)?;
    match ctx.stack.pop() {
        Some(new_value) => *cell.borrow_mut() = new_value,
        None => push_error(
            &mut ctx.stack,
            "!!: quotation left nothing on the stack to store",
        ),
    }
    Ok(())
}

/// `!?`: bind only if the ref-name has no cell yet; a no-op otherwise.
pub fn assign_if_unbound(ctx: &mut Context) -> Result<(), Fault> {
    if ctx.stack.depth() < 2 {
        let depth = ctx.stack.depth();
        push_error(&mut ctx.stack, underflow_message("!?", 2, depth));
        return Ok(());
    }
    let value = ctx.stack.pop().unwrap();
    let Some(key) = pop_ref_name(ctx, "!?") else {
        return Ok(());
    };
    if !matches!(ctx.names.get(&key), Value::RefValue(_)) {
        ctx.names.insert(key, Value::cell(value)).map_err(Fault::new)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_then_deref_round_trips() {
        let mut ctx = Context::new();
        ctx.stack.push(Value::RefName((*b"x").into()));
        ctx.stack.push(Value::Number(42.0));
        assign(&mut ctx).unwrap();
        assert!(ctx.stack.is_empty());

        ctx.stack.push(Value::RefName((*b"x").into()));
        deref(&mut ctx).unwrap();
        assert_eq!(ctx.stack.pop(), Some(Value::Number(42.0)));
    }

    #[test]
    fn assign_if_unbound_does_not_clobber() {
        let mut ctx = Context::new();
        ctx.stack.push(Value::RefName((*b"x").into()));
        ctx.stack.push(Value::Number(1.0));
        assign(&mut ctx).unwrap();

        ctx.stack.push(Value::RefName((*b"x").into()));
        ctx.stack.push(Value::Number(99.0));
        assign_if_unbound(&mut ctx).unwrap();

        ctx.stack.push(Value::RefName((*b"x").into()));
        deref(&mut ctx).unwrap();
        assert_eq!(ctx.stack.pop(), Some(Value::Number(1.0)));
    }

    #[test]
    fn deref_unbound_pushes_error() {
        let mut ctx = Context::new();
        ctx.stack.push(Value::RefName((*b"missing").into()));
        deref(&mut ctx).unwrap();
        assert!(matches!(ctx.stack.pop(), Some(Value::Error(_))));
    }
}
