//! Kokoki Core: the value model, the growable sequence, and the
//! open-addressed name table shared by the compiler and the VM.
//!
//! Key design principles:
//! - `Value`: what a Kokoki program talks about (numbers, strings,
//!   arrays, ref cells, code addresses, ...).
//! - `DynSeq`: the one growable-sequence primitive behind the operand
//!   stack, the return stack, the bytecode buffer, and array contents.
//! - `NameTable`: the linear-probing hash table that backs both word
//!   binding at compile time and the `hashmap` value tag at runtime.
//!
//! This crate has no dependencies and no concurrency primitives: the
//! language itself has no concurrency (spec Non-goals), so there is
//! nothing here that needs to cross a thread boundary.

pub mod name_table;
pub mod natives;
pub mod opcode;
pub mod sequence;
pub mod value;

pub use name_table::NameTable;
pub use natives::{NATIVE_TABLE, NativeEntry};
pub use opcode::{
    ADDRESS_WIDTH, INVOKE_INDEX_WIDTH, Opcode, decode_address, decode_invoke_index,
    encode_address, encode_invoke_index,
};
pub use sequence::DynSeq;
pub use value::{ArrayHandle, HashmapHandle, RefHandle, Value};
