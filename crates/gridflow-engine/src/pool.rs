//! The workbook's interned string pool: a monotonic, append-only vector of
//! boxed strings plus a name-to-id index.
//!
//! `intern`/`append` take the write lock; `get` takes only the read lock, so
//! concurrent readers during `calculate` never contend with each other (they
//! only ever contend with the rare write that a formula result introduces a
//! new string).

use std::collections::HashMap;
use std::sync::RwLock;

/// Sentinel id for the empty string. Never assigned to a real entry.
pub const EMPTY_STRING_ID: u32 = u32::MAX;

struct PoolInner {
    strings: Vec<Box<str>>,
    index: HashMap<Box<str>, u32>,
}

pub struct StringPool {
    inner: RwLock<PoolInner>,
}

impl Default for StringPool {
    fn default() -> Self {
        Self::new()
    }
}

impl StringPool {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(PoolInner {
                strings: Vec::new(),
                index: HashMap::new(),
            }),
        }
    }

    /// Dedupe-or-insert. The empty string always resolves to
    /// [`EMPTY_STRING_ID`] without occupying a slot.
    pub fn intern(&self, s: &str) -> u32 {
        if s.is_empty() {
            return EMPTY_STRING_ID;
        }
        if let Some(&id) = self.inner.read().unwrap().index.get(s) {
            return id;
        }
        let mut inner = self.inner.write().unwrap();
        if let Some(&id) = inner.index.get(s) {
            return id;
        }
        let id = inner.strings.len() as u32;
        let boxed: Box<str> = s.into();
        inner.strings.push(boxed.clone());
        inner.index.insert(boxed, id);
        id
    }

    /// Always inserts a fresh slot, skipping the dedup probe.
    pub fn append(&self, s: &str) -> u32 {
        if s.is_empty() {
            return EMPTY_STRING_ID;
        }
        let mut inner = self.inner.write().unwrap();
        let id = inner.strings.len() as u32;
        let boxed: Box<str> = s.into();
        inner.strings.push(boxed.clone());
        inner.index.insert(boxed, id);
        id
    }

    pub fn get(&self, id: u32) -> Option<String> {
        if id == EMPTY_STRING_ID {
            return Some(String::new());
        }
        let inner = self.inner.read().unwrap();
        inner.strings.get(id as usize).map(|s| s.to_string())
    }
}

impl gridflow_parse::StringLookup for StringPool {
    fn lookup(&self, id: u32) -> Option<String> {
        self.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_dedupes_identical_strings() {
        let pool = StringPool::new();
        let a = pool.intern("total");
        let b = pool.intern("total");
        assert_eq!(a, b);
    }

    #[test]
    fn append_always_allocates_a_new_slot() {
        let pool = StringPool::new();
        let a = pool.append("x");
        let b = pool.append("x");
        assert_ne!(a, b);
    }

    #[test]
    fn empty_string_uses_the_sentinel_id_without_a_slot() {
        let pool = StringPool::new();
        assert_eq!(pool.intern(""), EMPTY_STRING_ID);
        assert_eq!(pool.get(EMPTY_STRING_ID), Some(String::new()));
    }

    #[test]
    fn ids_are_never_recycled_across_inserts() {
        let pool = StringPool::new();
        let a = pool.intern("a");
        let b = pool.intern("b");
        assert!(b > a);
        assert_eq!(pool.get(a), Some("a".to_string()));
    }
}
