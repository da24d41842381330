//! String/array/hashmap natives: `cat`, `sort`, `compare`, `len`,
//! `aget`, `aset`, `adel`, `slice`, `reverse`, `copy` (spec §4.5).
//!
//! Most of these dispatch on the popped value's tag rather than having
//! separate string/array entry points — the native name is the same
//! either way (`len` on a string counts bytes, `len` on an array counts
//! elements), mirroring how the spec lists one native per operation
//! rather than one per container.

use std::cmp::Ordering;

use kokoki_core::Value;

use crate::context::Context;
use crate::error::{Fault, push_error, underflow_message};

fn value_cmp(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.as_ref().cmp(y.as_ref()),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.type_name().cmp(b.type_name()),
    }
}

pub fn len(ctx: &mut Context) -> Result<(), Fault> {
    if ctx.stack.depth() < 1 {
        let depth = ctx.stack.depth();
        push_error(&mut ctx.stack, underflow_message("len", 1, depth));
        return Ok(());
    }
    let v = ctx.stack.pop().unwrap();
    let n = match &v {
        Value::String(s) => s.len(),
        Value::Array(a) => a.borrow().len(),
        Value::Hashmap(h) => h.borrow().len(),
        other => {
            push_error(&mut ctx.stack, format!("len: unsupported type {}", other.type_name()));
            return Ok(());
        }
    };
    ctx.stack.push(Value::Number(n as f64));
    Ok(())
}

pub fn cat(ctx: &mut Context) -> Result<(), Fault> {
    if ctx.stack.depth() < 2 {
        let depth = ctx.stack.depth();
        push_error(&mut ctx.stack, underflow_message("cat", 2, depth));
        return Ok(());
    }
    let b = ctx.stack.pop().unwrap();
    let a = ctx.stack.pop().unwrap();
    match (&a, &b) {
        (Value::String(x), Value::String(y)) => {
            let mut bytes = x.to_vec();
            bytes.extend_from_slice(y);
            ctx.stack.push(Value::string(bytes));
        }
        (Value::Array(x), Value::Array(y)) => {
            let mut items = x.borrow().clone();
            items.extend(y.borrow().iter().cloned());
            ctx.stack.push(Value::array(items));
        }
        _ => push_error(
            &mut ctx.stack,
            format!("cat: incompatible types {} and {}", a.type_name(), b.type_name()),
        ),
    }
    Ok(())
}

pub fn compare(ctx: &mut Context) -> Result<(), Fault> {
    if ctx.stack.depth() < 2 {
        let depth = ctx.stack.depth();
        push_error(&mut ctx.stack, underflow_message("compare", 2, depth));
        return Ok(());
    }
    let b = ctx.stack.pop().unwrap();
    let a = ctx.stack.pop().unwrap();
    let ord = match value_cmp(&a, &b) {
        Ordering::Less => -1.0,
        Ordering::Equal => 0.0,
        Ordering::Greater => 1.0,
    };
    ctx.stack.push(Value::Number(ord));
    Ok(())
}

pub fn sort(ctx: &mut Context) -> Result<(), Fault> {
    if ctx.stack.depth() < 1 {
        let depth = ctx.stack.depth();
        push_error(&mut ctx.stack, underflow_message("sort", 1, depth));
        return Ok(());
    }
    match ctx.stack.top() {
        Some(Value::Array(handle)) => {
            handle.borrow_mut().sort_by(value_cmp);
        }
        Some(other) => {
            let msg = format!("sort: expected an array, found {}", other.type_name());
            ctx.stack.pop();
            push_error(&mut ctx.stack, msg);
        }
        None => unreachable!("caller already checked depth"),
    }
    Ok(())
}

fn as_usize_index(v: &Value) -> Option<usize> {
    match v {
        Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 => Some(*n as usize),
        _ => None,
    }
}

pub fn aget(ctx: &mut Context) -> Result<(), Fault> {
    if ctx.stack.depth() < 2 {
        let depth = ctx.stack.depth();
        push_error(&mut ctx.stack, underflow_message("aget", 2, depth));
        return Ok(());
    }
    let key = ctx.stack.pop().unwrap();
    let coll = ctx.stack.pop().unwrap();
    match &coll {
        Value::Array(a) => match as_usize_index(&key) {
            Some(i) => match a.borrow().get(i) {
                Some(v) => ctx.stack.push(v.clone()),
                None => push_error(&mut ctx.stack, format!("aget: index {i} out of range")),
            },
            None => push_error(&mut ctx.stack, "aget: expected a non-negative integer index"),
        },
        Value::String(s) => match as_usize_index(&key) {
            Some(i) => match s.get(i) {
                Some(&byte) => ctx.stack.push(Value::string(vec![byte])),
                None => push_error(&mut ctx.stack, format!("aget: index {i} out of range")),
            },
            None => push_error(&mut ctx.stack, "aget: expected a non-negative integer index"),
        },
        Value::Hashmap(h) => ctx.stack.push(h.borrow().get(&key)),
        other => push_error(&mut ctx.stack, format!("aget: unsupported type {}", other.type_name())),
    }
    Ok(())
}

pub fn aset(ctx: &mut Context) -> Result<(), Fault> {
    if ctx.stack.depth() < 3 {
        let depth = ctx.stack.depth();
        push_error(&mut ctx.stack, underflow_message("aset", 3, depth));
        return Ok(());
    }
    let value = ctx.stack.pop().unwrap();
    let key = ctx.stack.pop().unwrap();
    match ctx.stack.top() {
        Some(Value::Array(a)) => match as_usize_index(&key) {
            Some(i) if i < a.borrow().len() => a.borrow_mut()[i] = value,
            _ => push_error(&mut ctx.stack, "aset: index out of range"),
        },
        Some(Value::Hashmap(h)) => {
            h.borrow_mut().insert(key, value).map_err(Fault::new)?;
        }
        Some(other) => {
            let msg = format!("aset: unsupported type {}", other.type_name());
            push_error(&mut ctx.stack, msg);
        }
        None => unreachable!("caller already checked depth"),
    }
    Ok(())
}

pub fn adel(ctx: &mut Context) -> Result<(), Fault> {
    if ctx.stack.depth() < 2 {
        let depth = ctx.stack.depth();
        push_error(&mut ctx.stack, underflow_message("adel", 2, depth));
        return Ok(());
    }
    let key = ctx.stack.pop().unwrap();
    match ctx.stack.top() {
        Some(Value::Array(a)) => match as_usize_index(&key) {
            Some(i) if i < a.borrow().len() => {
                a.borrow_mut().remove(i);
            }
            _ => push_error(&mut ctx.stack, "adel: index out of range"),
        },
        Some(Value::Hashmap(h)) => {
            h.borrow_mut().remove(&key);
        }
        Some(other) => {
            let msg = format!("adel: unsupported type {}", other.type_name());
            push_error(&mut ctx.stack, msg);
        }
        None => unreachable!("caller already checked depth"),
    }
    Ok(())
}

pub fn slice(ctx: &mut Context) -> Result<(), Fault> {
    if ctx.stack.depth() < 3 {
        let depth = ctx.stack.depth();
        push_error(&mut ctx.stack, underflow_message("slice", 3, depth));
        return Ok(());
    }
    let end = ctx.stack.pop().unwrap();
    let start = ctx.stack.pop().unwrap();
    let coll = ctx.stack.pop().unwrap();
    let (Some(start), Some(end)) = (as_usize_index(&start), as_usize_index(&end)) else {
        push_error(&mut ctx.stack, "slice: expected non-negative integer bounds");
        return Ok(());
    };
    match &coll {
        Value::Array(a) => {
            let items = a.borrow();
            match items.get(start..end.min(items.len())) {
                Some(sub) if start <= end => ctx.stack.push(Value::array(sub.to_vec())),
                _ => {
                    drop(items);
                    push_error(&mut ctx.stack, "slice: range out of bounds");
                }
            }
        }
        Value::String(s) => match s.get(start..end.min(s.len())) {
            Some(sub) if start <= end => ctx.stack.push(Value::string(sub.to_vec())),
            _ => push_error(&mut ctx.stack, "slice: range out of bounds"),
        },
        other => push_error(&mut ctx.stack, format!("slice: unsupported type {}", other.type_name())),
    }
    Ok(())
}

pub fn reverse(ctx: &mut Context) -> Result<(), Fault> {
    if ctx.stack.depth() < 1 {
        let depth = ctx.stack.depth();
        push_error(&mut ctx.stack, underflow_message("reverse", 1, depth));
        return Ok(());
    }
    let v = ctx.stack.pop().unwrap();
    match &v {
        Value::Array(a) => {
            let mut items = a.borrow().clone();
            items.reverse();
            ctx.stack.push(Value::array(items));
        }
        Value::String(s) => {
            let mut bytes = s.to_vec();
            bytes.reverse();
            ctx.stack.push(Value::string(bytes));
        }
        other => push_error(&mut ctx.stack, format!("reverse: unsupported type {}", other.type_name())),
    }
    Ok(())
}

pub fn copy(ctx: &mut Context) -> Result<(), Fault> {
    if ctx.stack.depth() < 1 {
        let depth = ctx.stack.depth();
        push_error(&mut ctx.stack, underflow_message("copy", 1, depth));
        return Ok(());
    }
    let v = ctx.stack.pop().unwrap();
    ctx.stack.push(v.deep_copy());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn len_counts_array_elements() {
        let mut ctx = Context::new();
        ctx.stack.push(Value::array(vec![Value::Number(1.0), Value::Number(2.0)]));
        len(&mut ctx).unwrap();
        assert_eq!(ctx.stack.pop(), Some(Value::Number(2.0)));
    }

    #[test]
    fn cat_concatenates_strings() {
        let mut ctx = Context::new();
        ctx.stack.push(Value::string(*b"foo"));
        ctx.stack.push(Value::string(*b"bar"));
        cat(&mut ctx).unwrap();
        assert_eq!(ctx.stack.pop(), Some(Value::string(*b"foobar")));
    }

    #[test]
    fn copy_produces_equal_but_distinct_array() {
        let mut ctx = Context::new();
        ctx.stack.push(Value::array(vec![Value::Number(1.0)]));
        copy(&mut ctx).unwrap();
        let copied = ctx.stack.pop().unwrap();
        if let Value::Array(handle) = &copied {
            assert_eq!(handle.borrow().as_slice(), &[Value::Number(1.0)]);
        } else {
            panic!("expected array");
        }
    }

    #[test]
    fn aget_out_of_range_is_non_fatal() {
        let mut ctx = Context::new();
        ctx.stack.push(Value::array(vec![Value::Number(1.0)]));
        ctx.stack.push(Value::Number(5.0));
        aget(&mut ctx).unwrap();
        assert!(matches!(ctx.stack.pop(), Some(Value::Error(_))));
    }
}
