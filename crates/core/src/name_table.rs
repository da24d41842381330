//! Open-addressed name table with linear probing.
//!
//! Backs both the compiler's word-binding table (name → code-address) and
//! the `hashmap` value tag. Keys and values are arbitrary `Value`s;
//! equality and hashing follow the rules in `value.rs`.
//!
//! Growth mirrors the spec: initial capacity 64, grow by a factor of
//! roughly 1.62 once the load factor reaches 1.0 (i.e. once every slot
//! would otherwise be used). `nil` is reserved as the "missing" sentinel
//! returned by `get`, so a name may not be bound to `nil` — callers that
//! need to represent "no value" should use a different tag.

use crate::value::Value;

const INITIAL_CAPACITY: usize = 64;
const GROWTH_FACTOR: f64 = 1.62;

#[derive(Clone)]
enum Slot {
    Empty,
    Used(Value, Value),
}

#[derive(Clone)]
pub struct NameTable {
    slots: Vec<Slot>,
    len: usize,
}

impl Default for NameTable {
    fn default() -> Self {
        Self::new()
    }
}

impl NameTable {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        NameTable {
            slots: (0..capacity).map(|_| Slot::Empty).collect(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn probe_index(&self, key: &Value) -> usize {
        (key.hash_value() as usize) % self.slots.len()
    }

    /// Look up `key`. Returns `nil` (the missing sentinel) if unbound.
    pub fn get(&self, key: &Value) -> Value {
        let cap = self.slots.len();
        let start = self.probe_index(key);
        for step in 0..cap {
            let idx = (start + step) % cap;
            match &self.slots[idx] {
                Slot::Empty => return Value::Nil,
                Slot::Used(k, v) => {
                    if k == key {
                        return v.clone();
                    }
                }
            }
        }
        Value::Nil
    }

    pub fn contains(&self, key: &Value) -> bool {
        !matches!(self.get(key), Value::Nil)
    }

    /// Insert or overwrite a binding. Growing happens *before* insertion
    /// once the load factor would reach 1.0, so a full linear-probe
    /// traversal without success is always a real bug, not a capacity
    /// problem, and is reported as a fatal insertion error.
    pub fn insert(&mut self, key: Value, value: Value) -> Result<(), String> {
        if self.len + 1 >= self.slots.len() {
            self.grow();
        }
        self.insert_no_grow(key, value)
    }

    fn insert_no_grow(&mut self, key: Value, value: Value) -> Result<(), String> {
        let cap = self.slots.len();
        let start = self.probe_index(&key);
        for step in 0..cap {
            let idx = (start + step) % cap;
            match &mut self.slots[idx] {
                Slot::Empty => {
                    self.slots[idx] = Slot::Used(key, value);
                    self.len += 1;
                    return Ok(());
                }
                Slot::Used(k, v) => {
                    if *k == key {
                        *v = value;
                        return Ok(());
                    }
                }
            }
        }
        Err("name table insertion failed: no empty slot found".to_string())
    }

    fn grow(&mut self) {
        let new_capacity = ((self.slots.len() as f64) * GROWTH_FACTOR).ceil() as usize;
        let old = std::mem::replace(&mut self.slots, (0..new_capacity).map(|_| Slot::Empty).collect());
        self.len = 0;
        for slot in old {
            if let Slot::Used(k, v) = slot {
                self.insert_no_grow(k, v).expect("rehash into larger table cannot fail");
            }
        }
    }

    /// Remove a binding, using backward-shift deletion to keep the probe
    /// chain intact (no tombstones).
    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        let cap = self.slots.len();
        let start = self.probe_index(key);
        let mut found_idx = None;
        for step in 0..cap {
            let idx = (start + step) % cap;
            match &self.slots[idx] {
                Slot::Empty => break,
                Slot::Used(k, _) if k == key => {
                    found_idx = Some(idx);
                    break;
                }
                Slot::Used(_, _) => continue,
            }
        }
        let removed_idx = found_idx?;
        let removed_value = match std::mem::replace(&mut self.slots[removed_idx], Slot::Empty) {
            Slot::Used(_, v) => v,
            Slot::Empty => unreachable!(),
        };
        self.len -= 1;

        // Backward shift: re-home any entry in the same probe cluster that
        // could now be unreachable because of the empty slot we just made.
        let mut hole = removed_idx;
        let mut scan = (removed_idx + 1) % cap;
        loop {
            match std::mem::replace(&mut self.slots[scan], Slot::Empty) {
                Slot::Empty => break,
                Slot::Used(k, v) => {
                    let ideal = self.probe_index(&k);
                    let displaces = Self::in_probe_range(ideal, hole, scan, cap);
                    if displaces {
                        self.slots[hole] = Slot::Used(k, v);
                        hole = scan;
                    } else {
                        self.slots[scan] = Slot::Used(k, v);
                    }
                }
            }
            scan = (scan + 1) % cap;
            if scan == removed_idx {
                break;
            }
        }
        Some(removed_value)
    }

    /// True if moving the entry whose ideal slot is `ideal` into `hole`
    /// keeps it reachable by linear probing from `ideal`, given it
    /// currently lives at `at`.
    fn in_probe_range(ideal: usize, hole: usize, at: usize, cap: usize) -> bool {
        let dist = |a: usize, b: usize| (b + cap - a) % cap;
        dist(ideal, hole) <= dist(ideal, at)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.slots.iter().filter_map(|s| match s {
            Slot::Used(k, v) => Some((k, v)),
            Slot::Empty => None,
        })
    }

    pub fn deep_copy(&self) -> NameTable {
        let mut copy = NameTable::with_capacity(self.slots.len());
        for (k, v) in self.iter() {
            copy.insert(k.deep_copy(), v.deep_copy())
                .expect("copy into freshly sized table cannot fail");
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get_round_trip() {
        let mut t = NameTable::new();
        t.insert(Value::name(*b"x"), Value::Number(42.0)).unwrap();
        assert_eq!(t.get(&Value::name(*b"x")), Value::Number(42.0));
        assert_eq!(t.get(&Value::name(*b"y")), Value::Nil);
    }

    #[test]
    fn overwrite_keeps_len() {
        let mut t = NameTable::new();
        t.insert(Value::name(*b"x"), Value::Number(1.0)).unwrap();
        t.insert(Value::name(*b"x"), Value::Number(2.0)).unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(t.get(&Value::name(*b"x")), Value::Number(2.0));
    }

    #[test]
    fn grows_past_initial_capacity() {
        let mut t = NameTable::new();
        for i in 0..200 {
            t.insert(Value::Number(i as f64), Value::Number(i as f64))
                .unwrap();
        }
        assert_eq!(t.len(), 200);
        assert!(t.capacity() > 64);
        for i in 0..200 {
            assert_eq!(t.get(&Value::Number(i as f64)), Value::Number(i as f64));
        }
    }

    #[test]
    fn remove_keeps_probe_chain_intact() {
        let mut t = NameTable::with_capacity(8);
        for i in 0..6 {
            t.insert(Value::Number(i as f64), Value::Number(i as f64))
                .unwrap();
        }
        t.remove(&Value::Number(2.0));
        for i in 0..6 {
            if i == 2 {
                assert_eq!(t.get(&Value::Number(i as f64)), Value::Nil);
            } else {
                assert_eq!(t.get(&Value::Number(i as f64)), Value::Number(i as f64));
            }
        }
    }
}
