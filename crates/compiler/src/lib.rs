//! Kokoki Compiler
//!
//! Turns source text into bytecode for `kokoki-vm`, one chunk at a time.
//! There's no separate parse phase: [`reader`] streams tokens and
//! [`compiler`] consumes them directly, emitting bytes into the shared
//! buffer the VM owns and executes from. This mirrors how the REPL
//! actually uses it — compile a line, run it, compile the next line onto
//! the same buffer — rather than compiling a whole program up front.

pub mod builtins;
pub mod compiler;
pub mod error;
pub mod reader;

pub use builtins::{NativeResolution, resolve_native};
pub use compiler::compile_eval;
pub use error::CompileError;
pub use reader::{Reader, Token, TokenKind};
