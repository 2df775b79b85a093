//! Core scanning primitives
//!
//! This module contains the building blocks of the entity scanner:
//! - Chars: XML 1.0/1.1 character classes and line-break predicates
//! - Symbols: interning pool for scanned names
//! - Entity: per-entity buffer, cursor and line/column state
//! - Decoder: byte-stream character sources with switchable encodings
//! - Manager: the entity-stack interface crossed by boundary refills
//! - Scanner: the version-parameterized scanning engine

pub mod chars;
pub mod decoder;
pub mod entity;
pub mod manager;
pub mod scanner;
pub mod symbols;
