//! The execution environment (spec §3 "Context").
//!
//! One `Context` per session: the operand stack, the return-address
//! stack, the bytecode buffer, and the name table, created once and
//! extended monotonically across successive evaluations. Compilation and
//! execution alternate on the very same buffers — `kokoki_compiler`
//! appends to `code` and binds into `names`; `interp` reads `code` and
//! reads/writes `names` for ref-cells.

use kokoki_core::{DynSeq, NameTable, Value};

use crate::config::VmConfig;

pub struct Context {
    pub stack: DynSeq<Value>,
    pub returns: DynSeq<u32>,
    pub code: DynSeq<u8>,
    pub names: NameTable,
}

impl Context {
    pub fn new() -> Self {
        Self::with_config(&VmConfig::default())
    }

    pub fn with_config(config: &VmConfig) -> Self {
        Context {
            stack: DynSeq::with_capacity(config.stack_capacity),
            returns: DynSeq::with_capacity(config.return_stack_capacity),
            code: DynSeq::with_capacity(config.code_capacity),
            names: NameTable::new(),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_context_has_empty_buffers() {
        let ctx = Context::new();
        assert!(ctx.stack.is_empty());
        assert!(ctx.returns.is_empty());
        assert!(ctx.code.is_empty());
        assert!(ctx.names.is_empty());
    }
}
