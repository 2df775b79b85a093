//! xmlscan - Streaming character-level scanner for XML 1.0/1.1
//!
//! Turns a stack of nested entities (the document entity plus expanded
//! internal and external entities) into the lexical primitives a markup
//! parser consumes:
//! - Single characters: peek/scan/skip with line-end normalization
//! - Names, Nmtokens and qualified names, interned through a symbol table
//! - Quoted literals and character-data runs
//! - Delimiter-terminated blocks (comments, CDATA sections, PI data)
//!
//! One engine serves both grammar generations: the XML 1.0 and 1.1
//! character classes and line-break rules are injected as an
//! [`XmlVersion`] at construction time.
//!
//! ```
//! use xmlscan::{EntityLocation, EntityScanner, ScannedEntity, SimpleEntityStack, XmlVersion};
//!
//! let entity = ScannedEntity::internal(EntityLocation::default(), "<doc/>");
//! let mut scanner = EntityScanner::new(XmlVersion::V1_0, entity, SimpleEntityStack::new());
//! assert!(scanner.skip_char('<').unwrap());
//! let name = scanner.scan_name().unwrap().unwrap();
//! assert_eq!(scanner.symbols().resolve(name), "doc");
//! ```

pub mod core;
pub mod error;

pub use crate::core::chars::XmlVersion;
pub use crate::core::decoder::{DecodingReader, Encoding, StringCharReader};
pub use crate::core::entity::{CharRead, EntityLocation, ScannedEntity};
pub use crate::core::manager::{EntityStack, SimpleEntityStack};
pub use crate::core::scanner::{DataRun, EntityScanner, QName};
pub use crate::core::symbols::{Symbol, SymbolTable};
pub use crate::error::ScanError;
