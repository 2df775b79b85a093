//! Symbol table for scanned names
//!
//! Interning pool with deduplication for element names, attribute names
//! and entity names. All text is copied into one contiguous buffer;
//! entries are (offset, length) pairs and a hash index resolves lookups
//! (a hash bucket holds a list of IDs to handle rare collisions).
//!
//! Scanning the same name twice yields the same `Symbol`, so callers can
//! compare names by ID instead of by text.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Interned name. Identity comparison (`==`) is comparison of the
/// underlying text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symbol(u32);

impl Symbol {
    /// The reserved empty symbol (ID 0).
    pub const EMPTY: Symbol = Symbol(0);

    /// Raw pool ID, stable for the lifetime of the table.
    pub fn id(self) -> u32 {
        self.0
    }
}

/// Interning pool.
///
/// Memory layout:
/// - `entries`: (offset, length) into `data` for each symbol ID
/// - `data`: contiguous buffer holding every interned string
/// - `hash_index`: hash of content -> list of IDs with that hash
#[derive(Debug)]
pub struct SymbolTable {
    entries: Vec<(u32, u32)>,
    data: String,
    hash_index: HashMap<u64, Vec<u32>>,
    /// Reused when interning out of a `[char]` run.
    scratch: String,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// Create an empty table. Entry 0 is reserved for the empty string.
    pub fn new() -> Self {
        SymbolTable {
            entries: vec![(0, 0)],
            data: String::with_capacity(4096),
            hash_index: HashMap::new(),
            scratch: String::new(),
        }
    }

    #[inline]
    fn compute_hash(s: &str) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        let mut hasher = DefaultHasher::new();
        s.hash(&mut hasher);
        hasher.finish()
    }

    /// Intern a string, returning the existing ID when the same text was
    /// seen before.
    pub fn add_str(&mut self, s: &str) -> Symbol {
        if s.is_empty() {
            return Symbol::EMPTY;
        }

        let hash = Self::compute_hash(s);

        if let Some(ids) = self.hash_index.get(&hash) {
            for &id in ids {
                if self.entry_text(id) == s {
                    return Symbol(id);
                }
            }
        }

        let offset = self.data.len() as u32;
        self.data.push_str(s);

        let id = self.entries.len() as u32;
        self.entries.push((offset, s.len() as u32));
        self.hash_index.entry(hash).or_default().push(id);

        Symbol(id)
    }

    /// Intern a run out of a scanner buffer.
    pub fn add_symbol(&mut self, ch: &[char], offset: usize, length: usize) -> Symbol {
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        scratch.extend(&ch[offset..offset + length]);
        let sym = self.add_str(&scratch);
        self.scratch = scratch;
        sym
    }

    /// Resolve a symbol back to its text.
    pub fn resolve(&self, sym: Symbol) -> &str {
        self.entry_text(sym.0)
    }

    fn entry_text(&self, id: u32) -> &str {
        let (offset, len) = self.entries[id as usize];
        &self.data[offset as usize..(offset + len) as usize]
    }

    /// Number of entries, including the reserved empty symbol.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_str() {
        let mut table = SymbolTable::new();
        let sym = table.add_str("hello");
        assert!(sym.id() > 0);
        assert_eq!(table.resolve(sym), "hello");
    }

    #[test]
    fn test_dedupes() {
        let mut table = SymbolTable::new();
        let a = table.add_str("name");
        let b = table.add_str("name");
        assert_eq!(a, b);
        let c = table.add_str("other");
        assert_ne!(a, c);
    }

    #[test]
    fn test_add_symbol_from_chars() {
        let mut table = SymbolTable::new();
        let ch: Vec<char> = "xx:local-name yy".chars().collect();
        let sym = table.add_symbol(&ch, 3, 10);
        assert_eq!(table.resolve(sym), "local-name");
        // Same text through the str path dedupes against the char path.
        assert_eq!(table.add_str("local-name"), sym);
    }

    #[test]
    fn test_empty_symbol() {
        let mut table = SymbolTable::new();
        assert_eq!(table.add_str(""), Symbol::EMPTY);
        assert_eq!(table.resolve(Symbol::EMPTY), "");
        assert!(table.is_empty());
    }

    #[test]
    fn test_non_ascii() {
        let mut table = SymbolTable::new();
        let ch: Vec<char> = "héllo".chars().collect();
        let sym = table.add_symbol(&ch, 0, 5);
        assert_eq!(table.resolve(sym), "héllo");
    }
}
