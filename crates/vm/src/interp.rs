//! Fetch-decode-execute loop (spec §4.3).
//!
//! One `step` function drives both the top-level runner ([`run_from`],
//! which stops at `END`) and [`call_quotation`] (which stops when the
//! synthetic return frame it pushes comes back off the return stack) —
//! the teacher's codegen has no VM to speak of (it emits LLVM IR and lets
//! clang do the fetching), so this loop is grounded more in spec §4.3's
//! own opcode table than in any one teacher file; the non-fatal-error
//! convention (push a `Value::Error`, keep going) is lifted from the
//! teacher's thread-local error slot (`error.rs`) without the FFI plumbing.

use kokoki_core::{DynSeq, NameTable, Opcode, Value, decode_address, decode_invoke_index};

use crate::context::Context;
use crate::error::{Fault, push_error, underflow_message};
use crate::natives::invoke_native;

/// A code address past the 24-bit address space (spec §4.3: addresses
/// are 3 bytes), used as the sentinel return target for
/// [`call_quotation`] so it can never be mistaken for a real `CALL` site.
const SENTINEL_RETURN: u32 = u32::MAX;

#[derive(Debug)]
pub enum EvalError {
    Compile(kokoki_compiler::CompileError),
    Fault(Fault),
}

impl From<Fault> for EvalError {
    fn from(f: Fault) -> Self {
        EvalError::Fault(f)
    }
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalError::Compile(e) => write!(f, "compile error: {e}"),
            EvalError::Fault(e) => write!(f, "fatal error: {e}"),
        }
    }
}

/// Compile `source` onto the context's bytecode buffer and execute the
/// newly-added chunk (spec §6 `eval(ctx, source)`).
pub fn eval(ctx: &mut Context, source: &str) -> Result<(), EvalError> {
    let resume_at = if ctx.code.top() == Some(&Opcode::End.as_byte()) {
        ctx.code.depth() as u32 - 1
    } else {
        ctx.code.depth() as u32
    };
    tracing::debug!(bytes_before = ctx.code.depth(), "compiling chunk");
    kokoki_compiler::compile_eval(source, &mut ctx.code, &mut ctx.names)
        .map_err(EvalError::Compile)?;
    run_from(ctx, resume_at).map_err(EvalError::Fault)
}

/// Run from `pc` until `END`.
pub fn run_from(ctx: &mut Context, start: u32) -> Result<(), Fault> {
    let mut pc = start;
    loop {
        match step(ctx, pc)? {
            Step::Continue(next) => pc = next,
            Step::Halted => return Ok(()),
        }
    }
}

/// Synchronously run the word/quotation starting at `addr` to its
/// matching `RETURN`, used by natives (`each`, `fold`, `filter`, `while`,
/// `times`, `cond`, `!!`) that need to call back into compiled code.
pub fn call_quotation(ctx: &mut Context, addr: u32) -> Result<(), Fault> {
    let depth_before = ctx.returns.depth();
    ctx.returns.push(SENTINEL_RETURN);
    let mut pc = addr;
    loop {
        if ctx.returns.depth() == depth_before {
            return Ok(());
        }
        match step(ctx, pc)? {
            Step::Continue(next) => pc = next,
            Step::Halted => {
                return Err(Fault::new(
                    "quotation ran off the end of the bytecode buffer",
                ));
            }
        }
    }
}

enum Step {
    Continue(u32),
    Halted,
}

fn step(ctx: &mut Context, pc: u32) -> Result<Step, Fault> {
    let Some(&byte) = ctx.code.as_slice().get(pc as usize) else {
        return Err(Fault::new(format!("program counter {pc} ran off the buffer")));
    };
    let Some(op) = Opcode::from_byte(byte) else {
        return Err(Fault::new(format!("invalid opcode byte 0x{byte:02x} at {pc}")));
    };
    let mut pc = pc + 1;

    macro_rules! underflow_guard {
        ($name:expr) => {
            if ctx.stack.depth() < op.min_stack_depth() {
                let depth = ctx.stack.depth();
                push_error(
                    &mut ctx.stack,
                    underflow_message($name, op.min_stack_depth(), depth),
                );
                return Ok(Step::Continue(pc));
            }
        };
    }

    match op {
        Opcode::End => return Ok(Step::Halted),
        Opcode::Jmp => {
            pc = decode_address(&ctx.code.as_slice()[pc as usize..]);
        }
        Opcode::JmpTrue | Opcode::JmpFalse => {
            let target = decode_address(&ctx.code.as_slice()[pc as usize..]);
            pc += 3;
            underflow_guard!(if op == Opcode::JmpTrue { "jmp_true" } else { "jmp_false" });
            let cond = ctx.stack.pop().unwrap();
            let take = cond.is_truthy() == (op == Opcode::JmpTrue);
            if take {
                pc = target;
            }
        }
        Opcode::Call => {
            let target = decode_address(&ctx.code.as_slice()[pc as usize..]);
            pc += 3;
            ctx.returns.push(pc);
            pc = target;
        }
        Opcode::Return => match ctx.returns.pop() {
            Some(addr) => pc = addr,
            None => return Err(Fault::new("return stack underflow (malformed bytecode)")),
        },
        Opcode::Invoke => {
            let idx = decode_invoke_index(&ctx.code.as_slice()[pc as usize..]);
            pc += 2;
            let tail_before = ctx.code.depth() as u32;
            invoke_native(ctx, idx)?;
            let tail_after = ctx.code.depth() as u32;
            // `eval`/`use` compile and already run nested source by
            // rewinding this same trailing `END` and re-extending the
            // buffer past it. When that happens right where this
            // `INVOKE` was about to resume (nothing queued after it but
            // the old `END`), resume at the new tail instead of
            // replaying the bytes the native already ran.
            if tail_after != tail_before && pc + 1 == tail_before {
                pc = tail_after - 1;
            }
        }

        Opcode::PushNil => ctx.stack.push(Value::Nil),
        Opcode::PushTrue => ctx.stack.push(Value::Bool(true)),
        Opcode::PushFalse => ctx.stack.push(Value::Bool(false)),
        Opcode::PushInt8 => {
            let v = ctx.code.as_slice()[pc as usize] as i8;
            pc += 1;
            ctx.stack.push(Value::Number(v as f64));
        }
        Opcode::PushInt16 => {
            let bytes = &ctx.code.as_slice()[pc as usize..pc as usize + 2];
            let v = i16::from_le_bytes([bytes[0], bytes[1]]);
            pc += 2;
            ctx.stack.push(Value::Number(v as f64));
        }
        Opcode::PushNumber => {
            let bytes = &ctx.code.as_slice()[pc as usize..pc as usize + 8];
            let v = f64::from_le_bytes(bytes.try_into().expect("8 bytes"));
            pc += 8;
            ctx.stack.push(Value::Number(v));
        }
        Opcode::PushString | Opcode::PushStringLong => {
            let (bytes, new_pc) = read_length_prefixed(&ctx.code, pc, op == Opcode::PushStringLong);
            pc = new_pc;
            ctx.stack.push(Value::string(bytes));
        }
        Opcode::PushName | Opcode::PushNameLong => {
            let (bytes, new_pc) = read_length_prefixed(&ctx.code, pc, op == Opcode::PushNameLong);
            pc = new_pc;
            ctx.stack.push(Value::name(bytes));
        }
        Opcode::PushRefName | Opcode::PushRefNameLong => {
            let (bytes, new_pc) = read_length_prefixed(&ctx.code, pc, op == Opcode::PushRefNameLong);
            pc = new_pc;
            ctx.stack.push(Value::RefName(bytes.into()));
        }
        Opcode::PushCodeAddress => {
            let addr = decode_address(&ctx.code.as_slice()[pc as usize..]);
            pc += 3;
            ctx.stack.push(Value::CodeAddress(addr));
        }
        Opcode::PushArray => ctx.stack.push(Value::array(Vec::new())),
        Opcode::PushHashmap => ctx.stack.push(Value::hashmap(NameTable::new())),

        Opcode::Plus
        | Opcode::Minus
        | Opcode::Mul
        | Opcode::Div
        | Opcode::Mod
        | Opcode::Shl
        | Opcode::Shr
        | Opcode::Lt
        | Opcode::Gt
        | Opcode::Lte
        | Opcode::Gte
        | Opcode::Eq
        | Opcode::And
        | Opcode::Or
        | Opcode::Dup
        | Opcode::Drop
        | Opcode::Swap
        | Opcode::Rot
        | Opcode::Over
        | Opcode::Nip
        | Opcode::Tuck
        | Opcode::PickN
        | Opcode::MoveN
        | Opcode::Print => step_body(ctx, op)?,

        Opcode::Pick1 | Opcode::Pick2 | Opcode::Pick3 | Opcode::Pick4 | Opcode::Pick5 => {
            underflow_guard!("pick");
            let k = pick_move_literal_index(op);
            let v = ctx.stack.peek_from_top(k).unwrap().clone();
            ctx.stack.push(v);
        }
        Opcode::Move1 | Opcode::Move2 | Opcode::Move3 | Opcode::Move4 | Opcode::Move5 => {
            underflow_guard!("move");
            let k = pick_move_literal_index(op);
            let v = ctx.stack.remove_from_top(k).unwrap();
            ctx.stack.push(v);
        }

        Opcode::APush => {
            underflow_guard!("apush");
            let item = ctx.stack.pop().unwrap();
            match ctx.stack.top() {
                Some(Value::Array(handle)) => handle.borrow_mut().push(item),
                Some(other) => {
                    let msg = format!("apush: expected array, found {}", other.type_name());
                    push_error(&mut ctx.stack, msg);
                }
                None => unreachable!("underflow_guard already checked depth"),
            }
        }
        Opcode::HmPut => {
            underflow_guard!("hmput");
            let value = ctx.stack.pop().unwrap();
            let key = ctx.stack.pop().unwrap();
            match ctx.stack.top() {
                Some(Value::Hashmap(handle)) => {
                    handle
                        .borrow_mut()
                        .insert(key, value)
                        .map_err(Fault::new)?;
                }
                Some(other) => {
                    let msg = format!("hmput: expected hashmap, found {}", other.type_name());
                    push_error(&mut ctx.stack, msg);
                }
                None => unreachable!("underflow_guard already checked depth"),
            }
        }
    }

    Ok(Step::Continue(pc))
}

fn pick_move_literal_index(op: Opcode) -> usize {
    match op {
        Opcode::Pick1 | Opcode::Move1 => 1,
        Opcode::Pick2 | Opcode::Move2 => 2,
        Opcode::Pick3 | Opcode::Move3 => 3,
        Opcode::Pick4 | Opcode::Move4 => 4,
        Opcode::Pick5 | Opcode::Move5 => 5,
        _ => unreachable!("only called for literal pick/move opcodes"),
    }
}

fn as_index(v: &Value) -> Option<usize> {
    match v {
        Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 => Some(*n as usize),
        _ => None,
    }
}

/// Run the stack-effect of a direct-opcode native by its own alias index
/// (spec §4.5: "alias natives for all direct-opcode forms"), so `INVOKE`
/// on e.g. `dup` behaves exactly like the inlined `DUP` opcode would.
pub(crate) fn execute_alias(ctx: &mut Context, op: Opcode) -> Result<(), Fault> {
    match step_body(ctx, op) {
        Ok(()) => Ok(()),
        Err(fault) => Err(fault),
    }
}

fn step_body(ctx: &mut Context, op: Opcode) -> Result<(), Fault> {
    macro_rules! guard {
        ($name:expr) => {
            if ctx.stack.depth() < op.min_stack_depth() {
                let depth = ctx.stack.depth();
                push_error(&mut ctx.stack, underflow_message($name, op.min_stack_depth(), depth));
                return Ok(());
            }
        };
    }
    match op {
        Opcode::Plus => binary_number(ctx, "+", |a, b| a + b),
        Opcode::Minus => binary_number(ctx, "-", |a, b| a - b),
        Opcode::Mul => binary_number(ctx, "*", |a, b| a * b),
        Opcode::Div => binary_number(ctx, "/", |a, b| a / b),
        Opcode::Mod => binary_int(ctx, "mod", |a, b| if b == 0 { 0 } else { a % b }),
        Opcode::Shl => binary_int(ctx, "shl", |a, b| a << (b & 63)),
        Opcode::Shr => binary_int(ctx, "shr", |a, b| a >> (b & 63)),
        Opcode::Lt => compare(ctx, "<", |o| o == std::cmp::Ordering::Less),
        Opcode::Gt => compare(ctx, ">", |o| o == std::cmp::Ordering::Greater),
        Opcode::Lte => compare(ctx, "<=", |o| o != std::cmp::Ordering::Greater),
        Opcode::Gte => compare(ctx, ">=", |o| o != std::cmp::Ordering::Less),
        Opcode::Eq => {
            guard!("=");
            let b = ctx.stack.pop().unwrap();
            let a = ctx.stack.pop().unwrap();
            ctx.stack.push(Value::Bool(a == b));
        }
        Opcode::And => {
            guard!("and");
            let b = ctx.stack.pop().unwrap();
            let a = ctx.stack.pop().unwrap();
            ctx.stack.push(Value::Bool(a.is_truthy() && b.is_truthy()));
        }
        Opcode::Or => {
            guard!("or");
            let b = ctx.stack.pop().unwrap();
            let a = ctx.stack.pop().unwrap();
            ctx.stack.push(Value::Bool(a.is_truthy() || b.is_truthy()));
        }
        Opcode::Dup => {
            guard!("dup");
            let top = ctx.stack.top().unwrap().clone();
            ctx.stack.push(top);
        }
        Opcode::Drop => {
            guard!("drop");
            ctx.stack.pop();
        }
        Opcode::Swap => {
            guard!("swap");
            let b = ctx.stack.pop().unwrap();
            let a = ctx.stack.pop().unwrap();
            ctx.stack.push(b);
            ctx.stack.push(a);
        }
        Opcode::Rot => {
            guard!("rot");
            let a = ctx.stack.remove_from_top(2).unwrap();
            ctx.stack.push(a);
        }
        Opcode::Over => {
            guard!("over");
            let a = ctx.stack.peek_from_top(1).unwrap().clone();
            ctx.stack.push(a);
        }
        Opcode::Nip => {
            guard!("nip");
            ctx.stack.remove_from_top(1);
        }
        Opcode::Tuck => {
            guard!("tuck");
            let b = ctx.stack.pop().unwrap();
            let a = ctx.stack.pop().unwrap();
            ctx.stack.push(b.clone());
            ctx.stack.push(a);
            ctx.stack.push(b);
        }
        Opcode::PickN => {
            guard!("pick");
            let n = ctx.stack.pop().unwrap();
            match as_index(&n) {
                Some(k) if ctx.stack.depth() > k => {
                    let v = ctx.stack.peek_from_top(k).unwrap().clone();
                    ctx.stack.push(v);
                }
                _ => push_error(&mut ctx.stack, "pick: index out of range"),
            }
        }
        Opcode::MoveN => {
            guard!("move");
            let n = ctx.stack.pop().unwrap();
            match as_index(&n) {
                Some(k) if ctx.stack.depth() > k => {
                    let v = ctx.stack.remove_from_top(k).unwrap();
                    ctx.stack.push(v);
                }
                _ => push_error(&mut ctx.stack, "move: index out of range"),
            }
        }
        Opcode::Print => {
            guard!("print");
            let v = ctx.stack.pop().unwrap();
            print_value(&v);
        }
        other => {
            return Err(Fault::new(format!(
                "{other:?} has no native-invoke alias"
            )));
        }
    }
    Ok(())
}

fn binary_number(ctx: &mut Context, name: &str, f: impl Fn(f64, f64) -> f64) {
    if ctx.stack.depth() < 2 {
        let depth = ctx.stack.depth();
        push_error(&mut ctx.stack, underflow_message(name, 2, depth));
        return;
    }
    let b = ctx.stack.pop().unwrap();
    let a = ctx.stack.pop().unwrap();
    match (&a, &b) {
        (Value::Number(x), Value::Number(y)) => ctx.stack.push(Value::Number(f(*x, *y))),
        _ => push_error(
            &mut ctx.stack,
            format!("{name}: expected two numbers, found {} and {}", a.type_name(), b.type_name()),
        ),
    }
}

fn binary_int(ctx: &mut Context, name: &str, f: impl Fn(i64, i64) -> i64) {
    if ctx.stack.depth() < 2 {
        let depth = ctx.stack.depth();
        push_error(&mut ctx.stack, underflow_message(name, 2, depth));
        return;
    }
    let b = ctx.stack.pop().unwrap();
    let a = ctx.stack.pop().unwrap();
    match (&a, &b) {
        (Value::Number(x), Value::Number(y)) => {
            ctx.stack.push(Value::Number(f(*x as i64, *y as i64) as f64))
        }
        _ => push_error(
            &mut ctx.stack,
            format!("{name}: expected two numbers, found {} and {}", a.type_name(), b.type_name()),
        ),
    }
}

fn compare(ctx: &mut Context, name: &str, accept: impl Fn(std::cmp::Ordering) -> bool) {
    if ctx.stack.depth() < 2 {
        let depth = ctx.stack.depth();
        push_error(&mut ctx.stack, underflow_message(name, 2, depth));
        return;
    }
    let b = ctx.stack.pop().unwrap();
    let a = ctx.stack.pop().unwrap();
    match (&a, &b) {
        (Value::Number(x), Value::Number(y)) => match x.partial_cmp(y) {
            Some(ord) => ctx.stack.push(Value::Bool(accept(ord))),
            None => push_error(&mut ctx.stack, format!("{name}: NaN is not ordered")),
        },
        _ => push_error(
            &mut ctx.stack,
            format!("{name}: expected two numbers, found {} and {}", a.type_name(), b.type_name()),
        ),
    }
}

fn read_length_prefixed(code: &DynSeq<u8>, pc: u32, long: bool) -> (Vec<u8>, u32) {
    let bytes = code.as_slice();
    let mut pos = pc as usize;
    let len = if long {
        let raw = &bytes[pos..pos + 4];
        pos += 4;
        u32::from_le_bytes(raw.try_into().expect("4 bytes")) as usize
    } else {
        let raw = bytes[pos];
        pos += 1;
        raw as usize
    };
    let payload = bytes[pos..pos + len].to_vec();
    (payload, (pos + len) as u32)
}

fn print_value(v: &Value) {
    use std::io::Write;
    let text = match v {
        Value::String(s) => String::from_utf8_lossy(s).into_owned(),
        Value::Name(s) => String::from_utf8_lossy(s).into_owned(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Nil => "nil".to_string(),
        other => format!("{other:?}"),
    };
    print!("{text}");
    let _ = std::io::stdout().flush();
}

/// Exposed for the natives that render values directly (`dump`).
pub(crate) fn render(v: &Value) -> String {
    match v {
        Value::String(s) => String::from_utf8_lossy(s).into_owned(),
        other => format!("{other:?}"),
    }
}
