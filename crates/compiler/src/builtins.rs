//! Compile-time resolution against the native operation catalogue.
//!
//! The canonical name/opcode table lives in `kokoki_core::natives` so the
//! compiler and the VM share one ordering; this module is the compiler's
//! thin view onto it (spec §4.2 step 2: "if the name matches a native
//! entry, either emit the native's direct opcode ... or `INVOKE`").

use kokoki_core::{Opcode, natives};

pub enum NativeResolution {
    /// Inline this opcode directly instead of a push + dispatch.
    Direct(Opcode),
    /// Emit `INVOKE <index>`.
    Invoke(u16),
}

pub fn resolve_native(name: &str) -> Option<NativeResolution> {
    let index = natives::index_of(name)?;
    let entry = natives::entry_at(index)?;
    Some(match entry.direct_opcode {
        Some(op) => NativeResolution::Direct(op),
        None => NativeResolution::Invoke(index as u16),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plus_resolves_direct() {
        assert!(matches!(
            resolve_native("+"),
            Some(NativeResolution::Direct(Opcode::Plus))
        ));
    }

    #[test]
    fn each_resolves_invoke() {
        assert!(matches!(resolve_native("each"), Some(NativeResolution::Invoke(_))));
    }

    #[test]
    fn unknown_name_resolves_to_none() {
        assert!(resolve_native("no-such-native").is_none());
    }
}
