//! The single-pass compiler (spec §4.2).
//!
//! Mirrors the shape of the teacher's codegen pass (`crates/compiler/src/
//! codegen.rs` in the teacher repo: one token/AST-node in, bytes appended
//! to a shared buffer, a hand-rolled error type out) but walks tokens
//! directly instead of an AST — Kokoki has no separate parse tree, since
//! the grammar is simple enough to drive straight off the token stream and
//! the compiler has to be re-entrant on a shared bytecode buffer anyway
//! (new top-level input extends, never replaces, what's already there).
//!
//! Name resolution order per token (spec §4.2 step 2): a bound user word
//! compiles to `CALL`; otherwise a native's direct opcode is inlined;
//! otherwise `INVOKE <index>`; otherwise a compile error.

use crate::error::CompileError;
use crate::reader::{Reader, Token, TokenKind};
use crate::resolve_native;
use crate::NativeResolution;
use kokoki_core::{DynSeq, NameTable, Opcode, Value, encode_address, encode_invoke_index};

/// Compile `source` as a new top-level chunk, appending to `code` and
/// updating `names` with any new word bindings. `code` is expected to
/// already hold zero or more previously-compiled chunks, each ending in
/// `END`; this call rewinds over the trailing `END` so the new chunk's
/// bytecode is reachable by simply falling through from whatever used to
/// be the last instruction, then re-adds it.
///
/// On error the buffer is restored to exactly what it held on entry (with
/// its `END` reinstated), so a failed `eval` never leaves the shared
/// context in a state where a subsequent compile would append after a
/// dangling, `END`-less fragment.
pub fn compile_eval(
    source: &str,
    code: &mut DynSeq<u8>,
    names: &mut NameTable,
) -> Result<(), CompileError> {
    rewind_trailing_end(code);
    let pre_eval_len = code.depth();

    let mut compiler = Compiler {
        reader: Reader::new(source),
        code,
        names,
        pending: None,
    };
    let result = compiler.run();

    match result {
        Ok(()) => {
            emit_byte(code, Opcode::End);
            Ok(())
        }
        Err(e) => {
            code.truncate(pre_eval_len);
            emit_byte(code, Opcode::End);
            Err(e)
        }
    }
}

fn rewind_trailing_end(code: &mut DynSeq<u8>) {
    if code.top() == Some(&Opcode::End.as_byte()) {
        code.truncate(code.depth() - 1);
    }
}

fn emit_byte(code: &mut DynSeq<u8>, op: Opcode) {
    code.push(op.as_byte());
}

struct Compiler<'a> {
    reader: Reader<'a>,
    code: &'a mut DynSeq<u8>,
    names: &'a mut NameTable,
    /// A token read for lookahead (the pick/move peephole) that hasn't
    /// been compiled yet; the next `take_token` returns it before asking
    /// the reader for anything new.
    pending: Option<Token>,
}

/// What ends a run of [`Compiler::compile_until`]; carried separately from
/// the termination closure only so callers can tell which alternative
/// terminator (`else` vs `then`) actually fired.
enum Stop {
    Eof,
    DefEnd,
    Else,
    Then,
    ArrayEnd,
}

impl<'a> Compiler<'a> {
    fn run(&mut self) -> Result<(), CompileError> {
        self.compile_until(Mode::Toplevel)?;
        Ok(())
    }

    fn take_token(&mut self) -> Token {
        self.pending.take().unwrap_or_else(|| self.reader.next_token())
    }

    fn emit(&mut self, op: Opcode) {
        self.code.push(op.as_byte());
    }

    fn emit_operand(&mut self, bytes: &[u8]) {
        self.code.extend_bytes(bytes);
    }

    /// Reserve 4 bytes (opcode + 3-byte address) for a forward jump,
    /// returning the offset of the opcode byte so [`Self::patch_jump`] can
    /// fill in the real target once it's known.
    fn emit_placeholder_jump(&mut self, op: Opcode) -> usize {
        let offset = self.code.depth();
        self.emit(op);
        self.emit_operand(&[0, 0, 0]);
        offset
    }

    fn patch_jump(&mut self, offset: usize, target: u32) {
        tracing::debug!(offset, target, "back-patching jump");
        self.code.write_at(offset + 1, &encode_address(target));
    }

    fn here(&self) -> u32 {
        self.code.depth() as u32
    }

    /// Drive tokens through [`Self::compile_token`] until one matches the
    /// mode's terminator, returning which one.
    fn compile_until(&mut self, mode: Mode) -> Result<Stop, CompileError> {
        loop {
            let token = self.take_token();
            match (&mode, &token.kind) {
                (Mode::Toplevel, TokenKind::Eof) => return Ok(Stop::Eof),
                (Mode::Definition, TokenKind::DefEnd) => return Ok(Stop::DefEnd),
                (Mode::IfBranch, TokenKind::Name(n)) if n.as_slice() == b"else" => {
                    return Ok(Stop::Else);
                }
                (Mode::IfBranch, TokenKind::Name(n)) if n.as_slice() == b"then" => {
                    return Ok(Stop::Then);
                }
                (Mode::ElseBranch, TokenKind::Name(n)) if n.as_slice() == b"then" => {
                    return Ok(Stop::Then);
                }
                (Mode::Quotation, TokenKind::ArrayEnd) => return Ok(Stop::ArrayEnd),
                (_, TokenKind::Eof) => {
                    return Err(CompileError::new(
                        "unexpected end of input",
                        token.line,
                        token.column,
                    ));
                }
                (_, TokenKind::Error(message)) => {
                    return Err(CompileError::new(message.clone(), token.line, token.column));
                }
                _ => self.compile_token(token)?,
            }
        }
    }

    fn compile_token(&mut self, token: Token) -> Result<(), CompileError> {
        let (line, column) = (token.line, token.column);
        match token.kind {
            TokenKind::Number(n) => self.compile_number(n),
            TokenKind::String(bytes) => Ok(self.emit_string(&bytes)),
            TokenKind::Nil => Ok(self.emit(Opcode::PushNil)),
            TokenKind::True => Ok(self.emit(Opcode::PushTrue)),
            TokenKind::False => Ok(self.emit(Opcode::PushFalse)),
            TokenKind::RefName(bytes) => Ok(self.emit_refname(&bytes)),
            TokenKind::Name(bytes) if bytes.as_slice() == b"if" => self.compile_if(),
            TokenKind::Name(bytes) if bytes.as_slice() == b"then" || bytes.as_slice() == b"else" => {
                Err(CompileError::new(
                    format!(
                        "'{}' without a matching 'if'",
                        String::from_utf8_lossy(&bytes)
                    ),
                    line,
                    column,
                ))
            }
            TokenKind::Name(bytes) => self.compile_name(&bytes, line, column),
            TokenKind::DefStart => self.compile_definition(line, column),
            TokenKind::ArrayStart => self.compile_array_literal(),
            TokenKind::HashmapStart => self.compile_hashmap_literal(),
            TokenKind::DefEnd => Err(CompileError::new("unexpected ';'", line, column)),
            TokenKind::ArrayEnd => Err(CompileError::new("unexpected ']'", line, column)),
            TokenKind::HashmapEnd => Err(CompileError::new("unexpected '}'", line, column)),
            TokenKind::Comma => Err(CompileError::new("unexpected ','", line, column)),
            TokenKind::Eof => Err(CompileError::new("unexpected end of input", line, column)),
            TokenKind::Error(message) => Err(CompileError::new(message, line, column)),
        }
    }

    /// A literal integer in `1..=5` immediately followed by `pick`/`move`
    /// compiles to the dedicated single-byte opcode instead of a push plus
    /// `INVOKE` (spec §4.2, §9). The lookahead token is consumed only when
    /// it matches; otherwise it's held in `pending` so the caller's next
    /// `take_token` sees it untouched.
    fn compile_number(&mut self, n: f64) -> Result<(), CompileError> {
        if let Some(k) = as_pick_move_literal(n) {
            let lookahead = self.take_token();
            match &lookahead.kind {
                TokenKind::Name(name) if name.as_slice() == b"pick" => {
                    self.emit(Opcode::pick_literal(k).expect("k in 1..=5"));
                    return Ok(());
                }
                TokenKind::Name(name) if name.as_slice() == b"move" => {
                    self.emit(Opcode::move_literal(k).expect("k in 1..=5"));
                    return Ok(());
                }
                _ => {
                    self.emit_number(n);
                    self.pending = Some(lookahead);
                    return Ok(());
                }
            }
        }
        self.emit_number(n);
        Ok(())
    }

    fn emit_number(&mut self, n: f64) {
        if n.fract() == 0.0 {
            if let Some(i8v) = int_fits::<i8>(n) {
                self.emit(Opcode::PushInt8);
                self.emit_operand(&i8v.to_le_bytes());
                return;
            }
            if let Some(i16v) = int_fits::<i16>(n) {
                self.emit(Opcode::PushInt16);
                self.emit_operand(&i16v.to_le_bytes());
                return;
            }
        }
        self.emit(Opcode::PushNumber);
        self.emit_operand(&n.to_le_bytes());
    }

    fn emit_string(&mut self, bytes: &[u8]) {
        emit_length_prefixed(self.code, Opcode::PushString, Opcode::PushStringLong, bytes);
    }

    fn emit_refname(&mut self, bytes: &[u8]) {
        emit_length_prefixed(self.code, Opcode::PushRefName, Opcode::PushRefNameLong, bytes);
    }

    fn compile_name(&mut self, bytes: &[u8], line: usize, column: usize) -> Result<(), CompileError> {
        let key = Value::name(Vec::from(bytes));
        match self.names.get(&key) {
            Value::CodeAddress(addr) => {
                self.emit(Opcode::Call);
                self.emit_operand(&encode_address(addr));
                Ok(())
            }
            Value::Nil => {
                let text = std::str::from_utf8(bytes).map_err(|_| {
                    CompileError::new("name is not valid UTF-8", line, column)
                })?;
                match resolve_native(text) {
                    Some(NativeResolution::Direct(op)) => {
                        self.emit(op);
                        Ok(())
                    }
                    Some(NativeResolution::Invoke(index)) => {
                        self.emit(Opcode::Invoke);
                        self.emit_operand(&encode_invoke_index(index));
                        Ok(())
                    }
                    None => Err(CompileError::new(
                        format!("unknown name '{text}'"),
                        line,
                        column,
                    )),
                }
            }
            _ => unreachable!("word bindings are always code addresses"),
        }
    }

    fn compile_if(&mut self) -> Result<(), CompileError> {
        let false_jump = self.emit_placeholder_jump(Opcode::JmpFalse);
        match self.compile_until(Mode::IfBranch)? {
            Stop::Then => {
                self.patch_jump(false_jump, self.here());
                Ok(())
            }
            Stop::Else => {
                let skip_else = self.emit_placeholder_jump(Opcode::Jmp);
                self.patch_jump(false_jump, self.here());
                self.compile_until(Mode::ElseBranch)?;
                self.patch_jump(skip_else, self.here());
                Ok(())
            }
            _ => unreachable!("Mode::IfBranch only stops on 'else' or 'then'"),
        }
    }

    /// `: name ... ;`. Definitions are textual-order only (spec §4.2,
    /// §9): the name isn't bound until the body is fully compiled, so a
    /// reference to the word from inside its own body resolves as if the
    /// word didn't exist yet.
    fn compile_definition(&mut self, def_line: usize, def_column: usize) -> Result<(), CompileError> {
        let skip_body = self.emit_placeholder_jump(Opcode::Jmp);
        let body_start = self.here();

        let name_token = self.take_token();
        let name = match name_token.kind {
            TokenKind::Name(bytes) => bytes,
            _ => {
                return Err(CompileError::new(
                    "expected a word name after ':'",
                    name_token.line,
                    name_token.column,
                ));
            }
        };

        self.compile_until(Mode::Definition)?;
        self.emit(Opcode::Return);
        self.patch_jump(skip_body, self.here());

        self.names
            .insert(Value::name(name), Value::CodeAddress(body_start))
            .map_err(|e| CompileError::new(e, def_line, def_column))?;
        Ok(())
    }

    /// Look ahead (without consuming, via snapshot/restore) to decide
    /// whether a `[...]` is a plain data array or a quotation: if every
    /// token inside is itself a self-contained literal (numbers, strings,
    /// booleans, nil, ref-names, or nested literal brackets), it's data;
    /// the presence of any name/operator means the bracket has to run
    /// code to produce its contents, so it compiles as a nameless word
    /// instead and leaves its code-address on the stack.
    fn bracket_is_pure_literal(&mut self) -> bool {
        let snapshot = self.reader.snapshot();
        debug_assert!(self.pending.is_none(), "bracket classification starts clean");
        let mut depth: usize = 0;
        let pure = loop {
            let token = self.reader.next_token();
            match token.kind {
                TokenKind::ArrayStart | TokenKind::HashmapStart => depth += 1,
                TokenKind::ArrayEnd | TokenKind::HashmapEnd => {
                    if depth == 0 {
                        break true;
                    }
                    depth -= 1;
                }
                TokenKind::Eof => break false,
                TokenKind::Number(_)
                | TokenKind::String(_)
                | TokenKind::Nil
                | TokenKind::True
                | TokenKind::False
                | TokenKind::RefName(_)
                | TokenKind::Comma => {}
                _ => {
                    if depth == 0 {
                        break false;
                    }
                }
            }
        };
        self.reader.restore(snapshot);
        pure
    }

    fn compile_array_literal(&mut self) -> Result<(), CompileError> {
        if self.bracket_is_pure_literal() {
            self.emit(Opcode::PushArray);
            self.compile_literal_items(TokenKind::ArrayEnd)
        } else {
            self.compile_quotation()
        }
    }

    fn compile_hashmap_literal(&mut self) -> Result<(), CompileError> {
        self.emit(Opcode::PushHashmap);
        loop {
            let token = self.take_token();
            match token.kind {
                TokenKind::HashmapEnd => return Ok(()),
                TokenKind::Comma => continue,
                TokenKind::Eof => {
                    return Err(CompileError::new(
                        "unexpected end of input, expected '}'",
                        token.line,
                        token.column,
                    ));
                }
                TokenKind::Error(message) => {
                    return Err(CompileError::new(message, token.line, token.column));
                }
                _ => {
                    self.compile_token(token)?;
                    let value = self.take_token();
                    match value.kind {
                        TokenKind::Eof => {
                            return Err(CompileError::new(
                                "unexpected end of input, expected a hashmap value",
                                value.line,
                                value.column,
                            ));
                        }
                        TokenKind::Error(message) => {
                            return Err(CompileError::new(message, value.line, value.column));
                        }
                        _ => self.compile_token(value)?,
                    }
                    self.emit(Opcode::HmPut);
                }
            }
        }
    }

    /// Emit `PUSH_ARRAY`'s contents: each item is exactly one token (a
    /// literal or a nested `[...]`/`{...}`), immediately `APUSH`ed.
    /// Commas are accepted but cosmetic, matching both the `[1, 2, 3]` and
    /// `[1 2 3]` spellings the syntax summary allows.
    fn compile_literal_items(&mut self, end: TokenKind) -> Result<(), CompileError> {
        loop {
            let token = self.take_token();
            if token.kind == end {
                return Ok(());
            }
            match token.kind {
                TokenKind::Comma => continue,
                TokenKind::Eof => {
                    return Err(CompileError::new(
                        "unexpected end of input, expected ']'",
                        token.line,
                        token.column,
                    ));
                }
                TokenKind::Error(message) => {
                    return Err(CompileError::new(message, token.line, token.column));
                }
                _ => {
                    self.compile_token(token)?;
                    self.emit(Opcode::APush);
                }
            }
        }
    }

    /// Compile a nameless word: a forward jump over the body, the body
    /// itself terminated by `end`, a `RETURN`, and then a `PUSH_CODE_
    /// ADDRESS` of the body's start — the value `each`/`filter`/`fold`
    /// actually `CALL`.
    fn compile_quotation(&mut self) -> Result<(), CompileError> {
        let skip_body = self.emit_placeholder_jump(Opcode::Jmp);
        let body_start = self.here();
        self.compile_until(Mode::Quotation)?;
        self.emit(Opcode::Return);
        self.patch_jump(skip_body, self.here());
        self.emit(Opcode::PushCodeAddress);
        self.emit_operand(&encode_address(body_start));
        Ok(())
    }
}

/// Length-prefixed push: one byte + payload under 256 bytes, else a
/// 4-byte little-endian length + payload.
fn emit_length_prefixed(code: &mut DynSeq<u8>, short: Opcode, long: Opcode, bytes: &[u8]) {
    if let Ok(len) = u8::try_from(bytes.len()) {
        code.push(short.as_byte());
        code.push(len);
    } else {
        code.push(long.as_byte());
        code.extend_bytes(&(bytes.len() as u32).to_le_bytes());
    }
    code.extend_bytes(bytes);
}

fn as_pick_move_literal(n: f64) -> Option<u8> {
    if n.fract() == 0.0 && (1.0..=5.0).contains(&n) {
        Some(n as u8)
    } else {
        None
    }
}

fn int_fits<T>(n: f64) -> Option<T>
where
    T: TryFrom<i64>,
{
    let as_i64 = n as i64;
    if as_i64 as f64 != n {
        return None;
    }
    T::try_from(as_i64).ok()
}

#[derive(Clone, PartialEq)]
enum Mode {
    Toplevel,
    Definition,
    IfBranch,
    ElseBranch,
    Quotation,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(source: &str) -> (Vec<u8>, NameTable) {
        let mut code = DynSeq::new();
        let mut names = NameTable::new();
        compile_eval(source, &mut code, &mut names).expect("compiles");
        (code.as_slice().to_vec(), names)
    }

    #[test]
    fn arithmetic_uses_direct_opcodes() {
        let (bytes, _) = compile("1 2 +");
        assert_eq!(
            bytes,
            vec![
                Opcode::PushInt8.as_byte(),
                1,
                Opcode::PushInt8.as_byte(),
                2,
                Opcode::Plus.as_byte(),
                Opcode::End.as_byte(),
            ]
        );
    }

    #[test]
    fn pick_move_peephole_fires() {
        let (bytes, _) = compile("3 pick");
        assert_eq!(bytes, vec![Opcode::Pick3.as_byte(), Opcode::End.as_byte()]);
    }

    #[test]
    fn non_matching_lookahead_emits_both() {
        let (bytes, _) = compile("3 dup");
        assert_eq!(
            bytes,
            vec![
                Opcode::PushInt8.as_byte(),
                3,
                Opcode::Dup.as_byte(),
                Opcode::End.as_byte(),
            ]
        );
    }

    #[test]
    fn definition_binds_a_code_address() {
        let (bytes, names) = compile(": sq dup * ;");
        // JMP over body, body (DUP, MUL, RETURN), END.
        assert_eq!(bytes[0], Opcode::Jmp.as_byte());
        let body_addr = kokoki_core::decode_address(&bytes[1..4]);
        assert_eq!(bytes[body_addr as usize], Opcode::Dup.as_byte());
        assert_eq!(names.get(&Value::name(*b"sq")), Value::CodeAddress(body_addr));
    }

    #[test]
    fn re_entrant_eval_rewinds_trailing_end() {
        let mut code = DynSeq::new();
        let mut names = NameTable::new();
        compile_eval("1", &mut code, &mut names).unwrap();
        assert_eq!(code.as_slice().last(), Some(&Opcode::End.as_byte()));
        let len_before = code.depth();
        compile_eval("2", &mut code, &mut names).unwrap();
        // Only one END byte should have been added net (the old one was
        // rewound before the new chunk, and a fresh one appended after).
        assert_eq!(code.depth(), len_before + 2);
        assert_eq!(code.as_slice().last(), Some(&Opcode::End.as_byte()));
    }

    #[test]
    fn pure_literal_array_compiles_to_data() {
        let (bytes, _) = compile("[1 2 3]");
        assert_eq!(bytes[0], Opcode::PushArray.as_byte());
        assert!(!bytes.contains(&Opcode::Jmp.as_byte()));
    }

    #[test]
    fn array_with_operator_compiles_to_quotation() {
        let (bytes, _) = compile("[2 *]");
        assert_eq!(bytes[0], Opcode::Jmp.as_byte());
        assert!(bytes.contains(&Opcode::PushCodeAddress.as_byte()));
        assert!(bytes.contains(&Opcode::Mul.as_byte()));
    }

    #[test]
    fn if_then_patches_false_jump_to_after_branch() {
        let (bytes, _) = compile("1 if 2 then");
        assert_eq!(bytes[1], Opcode::JmpFalse.as_byte());
        let target = kokoki_core::decode_address(&bytes[2..5]);
        assert_eq!(target as usize, bytes.len() - 1);
    }

    #[test]
    fn if_else_then_patches_both_jumps() {
        let (bytes, _) = compile("1 if 2 else 3 then");
        assert_eq!(bytes[1], Opcode::JmpFalse.as_byte());
        let false_target = kokoki_core::decode_address(&bytes[2..5]) as usize;
        assert_eq!(bytes[false_target], Opcode::Jmp.as_byte());
    }

    #[test]
    fn unknown_name_is_a_compile_error() {
        let mut code = DynSeq::new();
        let mut names = NameTable::new();
        let err = compile_eval("frobnicate", &mut code, &mut names).unwrap_err();
        assert!(err.message.contains("frobnicate"));
        // The buffer is left valid (still ends in END) for the next eval.
        assert_eq!(code.as_slice(), &[Opcode::End.as_byte()]);
    }

    #[test]
    fn hashmap_literal_emits_put_per_pair() {
        let (bytes, _) = compile(r#"{ "a" 1 }"#);
        assert_eq!(bytes[0], Opcode::PushHashmap.as_byte());
        assert!(bytes.contains(&Opcode::HmPut.as_byte()));
    }
}
