//! VM configuration.
//!
//! The teacher's compiler crate carries a `CompilerConfig` for tuning an
//! otherwise code-free surface (external builtins, optimization level);
//! Kokoki has no such knobs for the compiler, so the equivalent ambient
//! concern lands here instead, tuning the growable buffers a `Context`
//! starts with. Loaded from TOML via `serde`, the same stack the teacher
//! reaches for.

use serde::Deserialize;

const DEFAULT_STACK_CAPACITY: usize = 256;
const DEFAULT_RETURN_STACK_CAPACITY: usize = 64;
const DEFAULT_CODE_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Initial capacity of the operand stack.
    pub stack_capacity: usize,
    /// Initial capacity of the return-address stack.
    pub return_stack_capacity: usize,
    /// Initial capacity, in bytes, of the bytecode buffer.
    pub code_capacity: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            stack_capacity: DEFAULT_STACK_CAPACITY,
            return_stack_capacity: DEFAULT_RETURN_STACK_CAPACITY,
            code_capacity: DEFAULT_CODE_CAPACITY,
        }
    }
}

impl VmConfig {
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_nonzero() {
        let cfg = VmConfig::default();
        assert!(cfg.stack_capacity > 0);
        assert!(cfg.return_stack_capacity > 0);
        assert!(cfg.code_capacity > 0);
    }

    #[test]
    fn partial_toml_overrides_only_given_fields() {
        let cfg = VmConfig::from_toml("stack_capacity = 1024").unwrap();
        assert_eq!(cfg.stack_capacity, 1024);
        assert_eq!(cfg.return_stack_capacity, DEFAULT_RETURN_STACK_CAPACITY);
    }
}
