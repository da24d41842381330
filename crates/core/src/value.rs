//! The tagged runtime value.
//!
//! Every value a Kokoki program can hold, push, or bind is one `Value`.
//! The variant *is* the tag described in the data model; there is no
//! separate discriminant byte to keep in sync with a payload union, since
//! Rust's enum already guarantees exactly one active payload at a time.

use crate::name_table::NameTable;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Shared handle to a growable array of values.
///
/// Arrays alias: cloning a `Value::Array` clones the `Rc`, not the
/// contents, so mutation through one alias is visible through the others.
pub type ArrayHandle = Rc<RefCell<Vec<Value>>>;

/// Shared handle to an open-addressed name table used as a hashmap value.
pub type HashmapHandle = Rc<RefCell<NameTable>>;

/// Shared handle to a single mutable cell, addressed by a `ref-name`.
pub type RefHandle = Rc<RefCell<Value>>;

#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    /// Immutable byte string. `Rc<[u8]>` makes clones (every stack push is
    /// a clone) O(1) without requiring the content to be UTF-8.
    String(Rc<[u8]>),
    /// An identifier used for lookup, e.g. the word name bound at `: name`.
    Name(Rc<[u8]>),
    /// A named-cell reference written `@foo` in source.
    RefName(Rc<[u8]>),
    Array(ArrayHandle),
    Hashmap(HashmapHandle),
    /// Index into the VM's native operation table.
    Native(usize),
    RefValue(RefHandle),
    /// Offset of a compiled word's first instruction in the bytecode buffer.
    CodeAddress(u32),
    Error(Rc<str>),
    Eof,
    /// Deferred-execution handle used only inside the VM while a native
    /// like `each`/`fold`/`filter` is iterating a quotation. Never
    /// produced by the compiler and never observable on a program's own
    /// operand stack.
    Block(Rc<Vec<Value>>),
}

impl Value {
    pub fn string(bytes: impl Into<Rc<[u8]>>) -> Self {
        Value::String(bytes.into())
    }

    pub fn name(bytes: impl Into<Rc<[u8]>>) -> Self {
        Value::Name(bytes.into())
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Value::Error(Rc::from(msg.into()))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn hashmap(table: NameTable) -> Self {
        Value::Hashmap(Rc::new(RefCell::new(table)))
    }

    pub fn cell(initial: Value) -> Self {
        Value::RefValue(Rc::new(RefCell::new(initial)))
    }

    /// A value is falsy iff its tag is `nil` or `false`; every other tag,
    /// including the number zero, is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Name(_) => "name",
            Value::RefName(_) => "ref-name",
            Value::Array(_) => "array",
            Value::Hashmap(_) => "hashmap",
            Value::Native(_) => "native",
            Value::RefValue(_) => "ref-value",
            Value::CodeAddress(_) => "code-address",
            Value::Error(_) => "error",
            Value::Eof => "eof",
            Value::Block(_) => "block",
        }
    }

    /// Deep copy: containers are duplicated rather than aliased.
    /// `eq(v, copy(v))` holds for any `v` (spec testable property).
    pub fn deep_copy(&self) -> Value {
        match self {
            Value::Array(a) => {
                let copied: Vec<Value> = a.borrow().iter().map(Value::deep_copy).collect();
                Value::array(copied)
            }
            Value::Hashmap(h) => Value::hashmap(h.borrow().deep_copy()),
            Value::RefValue(r) => Value::cell(r.borrow().deep_copy()),
            Value::Block(b) => Value::Block(Rc::new(b.iter().map(Value::deep_copy).collect())),
            other => other.clone(),
        }
    }
}

impl PartialEq for Value {
    /// Structural equality: identical tag and either identical primitive
    /// value, byte-identical strings, or element-wise recursive equality
    /// for arrays. Numbers use host float semantics (NaN != NaN).
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) | (Value::Eof, Value::Eof) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Name(a), Value::Name(b)) => a == b,
            (Value::RefName(a), Value::RefName(b)) => a == b,
            (Value::Native(a), Value::Native(b)) => a == b,
            (Value::CodeAddress(a), Value::CodeAddress(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (Value::Hashmap(a), Value::Hashmap(b)) => Rc::ptr_eq(a, b),
            (Value::RefValue(a), Value::RefValue(b)) => Rc::ptr_eq(a, b),
            (Value::Block(a), Value::Block(b)) => Rc::ptr_eq(a, b) || **a == **b,
            _ => false,
        }
    }
}

/// Hash is defined only for hashable tags (everything except the
/// container/sentinel tags below, which fall back to an arbitrary
/// constant). Containers hash by object identity, per spec §4.4/§9 — this
/// is what makes a hashmap usable as a hashmap key at all, in contrast to
/// the constant-hash bug the source shipped.
impl Value {
    pub fn hash_value(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        match self {
            Value::Nil => 0u8.hash(&mut hasher),
            Value::Bool(b) => {
                1u8.hash(&mut hasher);
                b.hash(&mut hasher);
            }
            Value::Number(n) => {
                2u8.hash(&mut hasher);
                n.to_bits().hash(&mut hasher);
            }
            Value::String(s) => {
                3u8.hash(&mut hasher);
                s.hash(&mut hasher);
            }
            Value::Name(s) => {
                4u8.hash(&mut hasher);
                s.hash(&mut hasher);
            }
            Value::RefName(s) => {
                5u8.hash(&mut hasher);
                s.hash(&mut hasher);
            }
            Value::Native(i) => {
                6u8.hash(&mut hasher);
                i.hash(&mut hasher);
            }
            Value::CodeAddress(a) => {
                7u8.hash(&mut hasher);
                a.hash(&mut hasher);
            }
            Value::Array(a) => {
                8u8.hash(&mut hasher);
                (Rc::as_ptr(a) as usize).hash(&mut hasher);
            }
            Value::Hashmap(h) => {
                9u8.hash(&mut hasher);
                (Rc::as_ptr(h) as usize).hash(&mut hasher);
            }
            Value::RefValue(r) => {
                10u8.hash(&mut hasher);
                (Rc::as_ptr(r) as usize).hash(&mut hasher);
            }
            // Error, Eof, Block: arbitrary constant, not meaningfully hashable.
            Value::Error(_) | Value::Eof | Value::Block(_) => 0xDEAD_BEEFu64.hash(&mut hasher),
        }
        hasher.finish()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{:?}", String::from_utf8_lossy(s)),
            Value::Name(s) => write!(f, "{}", String::from_utf8_lossy(s)),
            Value::RefName(s) => write!(f, "@{}", String::from_utf8_lossy(s)),
            Value::Array(a) => write!(f, "{:?}", a.borrow()),
            Value::Hashmap(_) => write!(f, "<hashmap>"),
            Value::Native(i) => write!(f, "<native #{i}>"),
            Value::RefValue(r) => write!(f, "<ref {:?}>", r.borrow()),
            Value::CodeAddress(a) => write!(f, "<code @{a}>"),
            Value::Error(e) => write!(f, "error: {e}"),
            Value::Eof => write!(f, "<eof>"),
            Value::Block(_) => write!(f, "<block>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_copy_is_equal_but_distinct() {
        let v = Value::array(vec![Value::Number(1.0), Value::string(*b"hi")]);
        let copy = v.deep_copy();
        assert_eq!(v, copy);
        if let (Value::Array(a), Value::Array(b)) = (&v, &copy) {
            assert!(!Rc::ptr_eq(a, b));
        } else {
            panic!("expected arrays");
        }
    }

    #[test]
    fn truthiness_matches_spec() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(Value::Number(0.0).is_truthy());
        assert!(Value::Eof.is_truthy());
    }

    #[test]
    fn nan_is_not_equal_to_itself() {
        let nan = Value::Number(f64::NAN);
        assert_ne!(nan, nan.clone());
    }

    #[test]
    fn arrays_compare_structurally() {
        let a = Value::array(vec![Value::Number(1.0), Value::Number(2.0)]);
        let b = Value::array(vec![Value::Number(1.0), Value::Number(2.0)]);
        assert_eq!(a, b);
    }

    #[test]
    fn hashmaps_compare_by_identity() {
        let a = Value::hashmap(NameTable::new());
        let b = Value::hashmap(NameTable::new());
        assert_ne!(a, b);
        assert_eq!(a.clone(), a);
    }
}
