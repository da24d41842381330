//! Kokoki VM
//!
//! The bytecode interpreter: a [`Context`] holds the operand stack, the
//! return-address stack, the bytecode buffer, and the name table;
//! [`eval`] compiles new source onto that buffer (via `kokoki_compiler`)
//! and runs the newly-added chunk. Everything past that point — opcode
//! dispatch, the native operation catalogue, runtime error handling —
//! lives in this crate rather than the compiler, matching the teacher's
//! split between a codegen crate and a runtime crate that executes what
//! it produced.

pub mod config;
pub mod context;
pub mod error;
pub mod interp;
pub mod natives;

pub use config::VmConfig;
pub use context::Context;
pub use error::Fault;
pub use interp::{EvalError, eval};

#[cfg(test)]
mod tests {
    use super::*;
    use kokoki_core::Value;

    #[test]
    fn arithmetic_end_to_end() {
        let mut ctx = Context::new();
        eval(&mut ctx, "2 3 +").ok().unwrap();
        assert_eq!(ctx.stack.pop(), Some(Value::Number(5.0)));
    }

    #[test]
    fn stack_underflow_reports_exact_message() {
        let mut ctx = Context::new();
        eval(&mut ctx, "1 move").ok().unwrap();
        match ctx.stack.pop() {
            Some(Value::Error(e)) => assert!(e.contains("Stack underflow!")),
            other => panic!("expected underflow error, got {other:?}"),
        }
    }

    #[test]
    fn definition_then_call() {
        let mut ctx = Context::new();
        eval(&mut ctx, ": square dup * ;").ok().unwrap();
        eval(&mut ctx, "5 square").ok().unwrap();
        assert_eq!(ctx.stack.pop(), Some(Value::Number(25.0)));
    }

    #[test]
    fn if_else_then_takes_the_right_branch() {
        let mut ctx = Context::new();
        eval(&mut ctx, "1 0 > if 111 else 222 then").ok().unwrap();
        assert_eq!(ctx.stack.pop(), Some(Value::Number(111.0)));
    }

    #[test]
    fn pure_literal_array_is_a_data_array() {
        let mut ctx = Context::new();
        eval(&mut ctx, "[ 1 2 3 ] len").ok().unwrap();
        assert_eq!(ctx.stack.pop(), Some(Value::Number(3.0)));
    }

    #[test]
    fn ref_cell_round_trip_through_eval() {
        let mut ctx = Context::new();
        eval(&mut ctx, "@x 10 ! @x ?").ok().unwrap();
        assert_eq!(ctx.stack.pop(), Some(Value::Number(10.0)));
    }

    #[test]
    fn each_maps_a_quotation_over_an_array() {
        let mut ctx = Context::new();
        eval(&mut ctx, "[ 1 2 3 ] [ 1 + ] each").ok().unwrap();
        let top = ctx.stack.pop().unwrap();
        if let Value::Array(handle) = top {
            assert_eq!(
                handle.borrow().as_slice(),
                &[Value::Number(2.0), Value::Number(3.0), Value::Number(4.0)]
            );
        } else {
            panic!("expected an array, got {top:?}");
        }
    }

    #[test]
    fn fold_sums_an_array() {
        let mut ctx = Context::new();
        eval(&mut ctx, "[ 1 2 3 4 ] 0 [ + ] fold").ok().unwrap();
        assert_eq!(ctx.stack.pop(), Some(Value::Number(10.0)));
    }
}
