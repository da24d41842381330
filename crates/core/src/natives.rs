//! The native operation catalogue (spec §4.5).
//!
//! This is the single source of truth for "what natives exist, in what
//! order, and which ones the compiler inlines as a direct opcode instead
//! of an `INVOKE`". The compiler consults [`NATIVE_TABLE`] during name
//! resolution (spec §4.2 step 2); the VM's native function array
//! (`kokoki-vm::natives::NATIVE_FNS`) is built in the same order, indexed
//! by position, and a test in that crate asserts the two stay the same
//! length.
//!
//! Direct-opcode entries still get a table slot ("alias natives for all
//! direct-opcode forms", spec §4.5) so `INVOKE` can reach them uniformly
//! even though the compiler's normal path inlines the opcode instead.

use crate::opcode::Opcode;

pub struct NativeEntry {
    pub name: &'static str,
    pub direct_opcode: Option<Opcode>,
}

macro_rules! native_table {
    ($($name:expr => $opcode:expr),* $(,)?) => {
        pub const NATIVE_TABLE: &[NativeEntry] = &[
            $(NativeEntry { name: $name, direct_opcode: $opcode }),*
        ];
    };
}

native_table! {
    // Arithmetic / comparison / logic — inlined as direct opcodes.
    "+" => Some(Opcode::Plus),
    "-" => Some(Opcode::Minus),
    "*" => Some(Opcode::Mul),
    "/" => Some(Opcode::Div),
    "mod" => Some(Opcode::Mod),
    "<" => Some(Opcode::Lt),
    ">" => Some(Opcode::Gt),
    "<=" => Some(Opcode::Lte),
    ">=" => Some(Opcode::Gte),
    "shl" => Some(Opcode::Shl),
    "shr" => Some(Opcode::Shr),
    "=" => Some(Opcode::Eq),
    "and" => Some(Opcode::And),
    "or" => Some(Opcode::Or),

    // Stack manipulation — inlined as direct opcodes.
    "dup" => Some(Opcode::Dup),
    "drop" => Some(Opcode::Drop),
    "swap" => Some(Opcode::Swap),
    "rot" => Some(Opcode::Rot),
    "over" => Some(Opcode::Over),
    "nip" => Some(Opcode::Nip),
    "tuck" => Some(Opcode::Tuck),
    "pick" => Some(Opcode::PickN),
    "move" => Some(Opcode::MoveN),

    // Debug — inlined.
    "print" => Some(Opcode::Print),

    // I/O (host collaborators, spec §1/§6) — INVOKE only.
    "slurp" => None,
    "nl" => None,
    "read" => None,
    "dump" => None,
    "eval" => None,
    "use" => None,

    // String/array operations — INVOKE only.
    "cat" => None,
    "sort" => None,
    "compare" => None,
    "len" => None,
    "aget" => None,
    "aset" => None,
    "adel" => None,
    "slice" => None,
    "reverse" => None,

    // Reference-cell operations — INVOKE only.
    "?" => None,
    "!" => None,
    "!!" => None,
    "!?" => None,

    // Control structures beyond the compiler's `if` — INVOKE only.
    "cond" => None,
    "while" => None,
    "times" => None,
    "each" => None,
    "fold" => None,
    "foldi" => None,
    "filter" => None,

    // Copying — INVOKE only.
    "copy" => None,
}

pub fn index_of(name: &str) -> Option<usize> {
    NATIVE_TABLE.iter().position(|e| e.name == name)
}

pub fn entry_at(index: usize) -> Option<&'static NativeEntry> {
    NATIVE_TABLE.get(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for entry in NATIVE_TABLE {
            assert!(seen.insert(entry.name), "duplicate native name {}", entry.name);
        }
    }

    #[test]
    fn index_lookup_round_trips() {
        for (i, entry) in NATIVE_TABLE.iter().enumerate() {
            assert_eq!(index_of(entry.name), Some(i));
        }
    }
}
