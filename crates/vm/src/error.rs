//! Runtime error handling.
//!
//! Unlike the teacher's `error.rs` (a thread-local slot FFI functions poke
//! so a panic across the LLVM/Rust boundary never unwinds into generated
//! code), Kokoki's VM is a plain Rust call stack with no FFI boundary to
//! protect — so runtime faults are ordinary values, not global state.
//!
//! Spec §7 splits runtime failures in two:
//! - Most faults (underflow, a type mismatch inside a native, an
//!   out-of-bounds index) are *non-fatal*: they push a `Value::Error`
//!   onto the operand stack and execution continues at the next opcode.
//! - Host allocation failure is *fatal*: there's nothing sensible left to
//!   push a value onto, so it aborts the whole evaluation instead.
//! [`push_error`] covers the first; [`Fault`] covers the second.

use kokoki_core::{DynSeq, Value};

/// Unrecoverable: the caller of [`crate::interp::run`] should stop and
/// surface this rather than attempt to keep interpreting.
#[derive(Debug, Clone, PartialEq)]
pub struct Fault(pub String);

impl Fault {
    pub fn new(message: impl Into<String>) -> Self {
        Fault(message.into())
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for Fault {}

/// Push a non-fatal runtime error value and move on. Every direct-opcode
/// and native implementation that hits underflow, a wrong-typed operand,
/// or an out-of-range index goes through this instead of panicking.
pub fn push_error(stack: &mut DynSeq<Value>, message: impl Into<String>) {
    stack.push(Value::error(message.into()));
}

pub fn underflow_message(op_name: &str, required: usize, actual: usize) -> String {
    format!("Stack underflow! {op_name} needs {required}, found {actual}")
}
