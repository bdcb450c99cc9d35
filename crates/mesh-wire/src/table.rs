//! The two per-message tables.
//!
//! [`StringTable`] deduplicates strings: each distinct value gets exactly one
//! 1-based index, assigned on first use. Index 0 is reserved for "absent".
//!
//! [`ObjectTable`] records heap objects in the order they were first
//! written or read. The first encounter of an object assigns the next
//! 0-based slot; every later encounter is written as `-(slot + 1)`.
//!
//! Both tables live for exactly one message and are dropped with the
//! reader or writer that owns them.

use std::hash::Hash;

use rustc_hash::FxHashMap;

use crate::error::WireError;

// ---------------------------------------------------------------------------
// StringTable
// ---------------------------------------------------------------------------

/// Interned strings in first-use order.
#[derive(Debug, Default)]
pub struct StringTable {
    entries: Vec<String>,
    index: FxHashMap<String, usize>,
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from entries read off the wire.
    ///
    /// Duplicates are tolerated when reading; lookups go by position.
    pub fn from_entries(entries: Vec<String>) -> Self {
        let mut index = FxHashMap::default();
        for (i, s) in entries.iter().enumerate() {
            index.entry(s.clone()).or_insert(i + 1);
        }
        StringTable { entries, index }
    }

    /// Return the 1-based index of `s`, adding it if this is its first use.
    pub fn intern(&mut self, s: &str) -> usize {
        if let Some(&idx) = self.index.get(s) {
            return idx;
        }
        self.entries.push(s.to_string());
        let idx = self.entries.len();
        self.index.insert(s.to_string(), idx);
        idx
    }

    /// Look up a 1-based index. `0` yields `None`.
    pub fn get(&self, index: i32) -> Result<Option<&str>, WireError> {
        if index == 0 {
            return Ok(None);
        }
        if index < 0 || index as usize > self.entries.len() {
            return Err(WireError::StringIndexOutOfRange {
                index,
                len: self.entries.len(),
            });
        }
        Ok(Some(self.entries[index as usize - 1].as_str()))
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// ObjectTable
// ---------------------------------------------------------------------------

/// Object slots in first-encounter order.
///
/// `K` is whatever identifies an object to the caller (an arena id on both
/// sides of the wire in this codebase).
#[derive(Debug)]
pub struct ObjectTable<K> {
    slots: Vec<K>,
    seen: FxHashMap<K, usize>,
}

impl<K: Copy + Eq + Hash> Default for ObjectTable<K> {
    fn default() -> Self {
        ObjectTable {
            slots: Vec::new(),
            seen: FxHashMap::default(),
        }
    }
}

impl<K: Copy + Eq + Hash> ObjectTable<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the next slot to `key`. Returns the slot.
    pub fn push(&mut self, key: K) -> usize {
        let slot = self.slots.len();
        self.slots.push(key);
        self.seen.insert(key, slot);
        slot
    }

    /// The slot previously assigned to `key`, if any.
    pub fn slot_of(&self, key: K) -> Option<usize> {
        self.seen.get(&key).copied()
    }

    /// Resolve a slot back to its key. Out of range is fatal corruption.
    pub fn resolve(&self, slot: usize) -> Result<K, WireError> {
        self.slots
            .get(slot)
            .copied()
            .ok_or(WireError::BackReferenceOutOfRange {
                slot,
                len: self.slots.len(),
            })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Encode a slot as its negative back-reference token value.
pub fn back_reference(slot: usize) -> i32 {
    -(slot as i32 + 1)
}
