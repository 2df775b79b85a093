//! Per-entity scan state
//!
//! Each entity being scanned (the document entity, an external parsed
//! entity, an expanded internal entity) carries its own read-ahead buffer
//! and cursor. The scanning engine only ever works on the entity at the
//! top of the stack; suspended entities keep their state here until the
//! nested entity ends.

use std::fmt;
use std::io;

use crate::core::decoder::{Encoding, StringCharReader};

/// Default read-ahead buffer, in characters.
pub const DEFAULT_BUFFER_SIZE: usize = 2048;

/// Chunk size used while an external entity's start is still
/// encoding-sensitive (the declaration has not been parsed yet), so a
/// wrong initial encoding guess wastes at most this much input.
pub const XMLDECL_BUFFER_SIZE: usize = 64;

/// Provider of decoded characters for one entity.
///
/// `Ok(0)` means the entity's text is exhausted; it is not a transient
/// condition and refills do not retry after it.
pub trait CharRead {
    fn read(&mut self, buf: &mut [char]) -> io::Result<usize>;

    /// Switch the decode encoding once the entity's declaration names one.
    /// Ignored by sources that do not decode bytes.
    fn set_encoding(&mut self, _encoding: Encoding) -> io::Result<()> {
        Ok(())
    }
}

/// Identifiers naming an entity, carried for diagnostics only.
#[derive(Debug, Clone, Default)]
pub struct EntityLocation {
    /// Entity name (`None` for the document entity).
    pub name: Option<String>,
    pub public_id: Option<String>,
    /// System id exactly as written in the declaration.
    pub system_id: Option<String>,
    /// Base against which `system_id` resolves.
    pub base_system_id: Option<String>,
}

/// Buffer, cursor and line/column state for one entity.
pub struct ScannedEntity {
    /// Read-ahead buffer. Only `ch[..count]` is meaningful.
    pub(crate) ch: Vec<char>,
    /// Next character to hand out; `position <= count` always.
    pub(crate) position: usize,
    /// Characters currently buffered.
    pub(crate) count: usize,

    /// 1-based, advisory. Maintained on the normalization paths.
    pub(crate) line_number: u64,
    pub(crate) column_number: u64,

    /// External entities get line-end normalization; internal entities
    /// are replayed verbatim.
    pub(crate) is_external: bool,
    /// Set while scanning a literal that this entity started inside of;
    /// makes the closing quote invisible to `scan_literal`.
    pub(crate) literal: bool,
    /// False while the entity start is encoding-sensitive; limits refills
    /// to `XMLDECL_BUFFER_SIZE` characters.
    pub(crate) may_read_chunks: bool,

    pub(crate) location: EntityLocation,
    pub(crate) source: Box<dyn CharRead>,
}

impl ScannedEntity {
    /// External entity over an arbitrary character source. Starts in
    /// small-chunk mode until `set_may_read_chunks(true)`.
    pub fn external(location: EntityLocation, source: Box<dyn CharRead>) -> Self {
        Self::with_capacity(location, source, true, DEFAULT_BUFFER_SIZE)
    }

    /// Internal entity replaying already-decoded text verbatim.
    pub fn internal(location: EntityLocation, text: &str) -> Self {
        Self::with_capacity(
            location,
            Box::new(StringCharReader::new(text)),
            false,
            DEFAULT_BUFFER_SIZE,
        )
    }

    /// Constructor with an explicit buffer capacity, mainly for tests
    /// that exercise refill boundaries.
    pub fn with_capacity(
        location: EntityLocation,
        source: Box<dyn CharRead>,
        is_external: bool,
        capacity: usize,
    ) -> Self {
        ScannedEntity {
            ch: vec!['\0'; capacity],
            position: 0,
            count: 0,
            line_number: 1,
            column_number: 1,
            is_external,
            literal: false,
            may_read_chunks: !is_external,
            location,
            source,
        }
    }

    pub fn is_external(&self) -> bool {
        self.is_external
    }

    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    pub fn column_number(&self) -> u64 {
        self.column_number
    }

    pub fn location(&self) -> &EntityLocation {
        &self.location
    }

    /// Current buffer size in characters; grows when a single token
    /// outgrows it.
    pub fn buffer_capacity(&self) -> usize {
        self.ch.len()
    }

    pub fn set_literal(&mut self, literal: bool) {
        self.literal = literal;
    }

    /// Allow full-buffer refills. Called once the entity's declaration
    /// (if any) has been scanned.
    pub fn set_may_read_chunks(&mut self, may_read_chunks: bool) {
        self.may_read_chunks = may_read_chunks;
    }

    /// Moves the run `[offset, position)` to the front of the buffer,
    /// doubling the buffer first when the run fills it completely.
    pub(crate) fn shift_to_front(&mut self, offset: usize) {
        let length = self.position - offset;
        if length == self.ch.len() {
            let mut larger = vec!['\0'; self.ch.len() * 2];
            larger[..length].copy_from_slice(&self.ch[offset..offset + length]);
            self.ch = larger;
        } else {
            self.ch.copy_within(offset..offset + length, 0);
        }
    }
}

impl fmt::Debug for ScannedEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScannedEntity")
            .field("position", &self.position)
            .field("count", &self.count)
            .field("line", &self.line_number)
            .field("column", &self.column_number)
            .field("is_external", &self.is_external)
            .field("literal", &self.literal)
            .field("may_read_chunks", &self.may_read_chunks)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_entity_defaults() {
        let e = ScannedEntity::internal(EntityLocation::default(), "abc");
        assert!(!e.is_external());
        assert!(e.may_read_chunks);
        assert_eq!(e.line_number(), 1);
        assert_eq!(e.column_number(), 1);
        assert_eq!(e.count, 0);
    }

    #[test]
    fn test_external_starts_in_decl_mode() {
        let source = Box::new(StringCharReader::new("<?xml?>"));
        let mut e = ScannedEntity::external(EntityLocation::default(), source);
        assert!(e.is_external());
        assert!(!e.may_read_chunks);
        e.set_may_read_chunks(true);
        assert!(e.may_read_chunks);
    }

    #[test]
    fn test_shift_to_front_compacts() {
        let source = Box::new(StringCharReader::new(""));
        let mut e =
            ScannedEntity::with_capacity(EntityLocation::default(), source, false, 8);
        e.ch[..6].copy_from_slice(&['x', 'x', 'a', 'b', 'c', 'd']);
        e.count = 6;
        e.position = 6;
        e.shift_to_front(2);
        assert_eq!(&e.ch[..4], &['a', 'b', 'c', 'd']);
        assert_eq!(e.ch.len(), 8);
    }

    #[test]
    fn test_shift_to_front_grows_when_full() {
        let source = Box::new(StringCharReader::new(""));
        let mut e =
            ScannedEntity::with_capacity(EntityLocation::default(), source, false, 4);
        e.ch.copy_from_slice(&['a', 'b', 'c', 'd']);
        e.count = 4;
        e.position = 4;
        e.shift_to_front(0);
        assert_eq!(e.ch.len(), 8);
        assert_eq!(&e.ch[..4], &['a', 'b', 'c', 'd']);
    }
}
