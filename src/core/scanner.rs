//! The scanning engine
//!
//! `EntityScanner` hands lexical primitives to a markup parser: single
//! characters, interned names, quoted literals, content runs and
//! delimiter-terminated data blocks. It works from the read-ahead buffer
//! of the current entity and refills through `load`, the one primitive
//! that touches the character source and the one place an entity
//! boundary can be crossed.
//!
//! Line-end normalization happens on the fly for external entities:
//! every recognized line break is delivered as `\n`, two-character
//! sequences collapse to one, and runs of breaks are rewritten in place
//! so bulk operations can hand out contiguous normalized slices.
//! Internal entities are replayed verbatim. Which code points count as
//! breaks (and everything else the XML 1.0 and 1.1 grammars disagree
//! on) comes from the injected `XmlVersion`.

use tracing::trace;

use crate::core::chars::{XmlVersion, LINE_SEPARATOR, NEL};
use crate::core::decoder::Encoding;
use crate::core::entity::{ScannedEntity, XMLDECL_BUFFER_SIZE};
use crate::core::manager::EntityStack;
use crate::core::symbols::{Symbol, SymbolTable};
use crate::error::{Result, ScanError};

/// Qualified name, split at the first `:`. `prefix` is `None` when the
/// raw name has no colon, in which case `local` equals `raw`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QName {
    pub prefix: Option<Symbol>,
    pub local: Symbol,
    pub raw: Symbol,
}

/// Outcome of one `scan_data` pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataRun {
    /// Delimiter found and consumed; the text before it was appended.
    Found,
    /// The pass stopped early (buffer boundary or a line break needing
    /// normalization); call again to keep scanning.
    Continue,
    /// Stopped at a character outside the Char production; it is the
    /// next unconsumed character.
    InvalidChar,
    /// Input ended before the delimiter; the remainder was appended.
    Exhausted,
}

/// Result of the leading line-break normalization shared by the bulk
/// operations.
struct NewlineRun {
    offset: usize,
    newlines: usize,
    /// The run reached the last buffered character; the caller should
    /// emit it and report the next character as unknown.
    at_buffer_end: bool,
}

/// Character-level scanner over a stack of nested entities.
pub struct EntityScanner<S: EntityStack> {
    version: XmlVersion,
    entity: ScannedEntity,
    stack: S,
    symbols: SymbolTable,
}

impl<S: EntityStack> EntityScanner<S> {
    pub fn new(version: XmlVersion, entity: ScannedEntity, stack: S) -> Self {
        EntityScanner {
            version,
            entity,
            stack,
            symbols: SymbolTable::new(),
        }
    }

    pub fn version(&self) -> XmlVersion {
        self.version
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }

    /// The entity currently being scanned.
    pub fn current_entity(&self) -> &ScannedEntity {
        &self.entity
    }

    pub fn stack(&self) -> &S {
        &self.stack
    }

    pub fn line_number(&self) -> u64 {
        self.entity.line_number
    }

    pub fn column_number(&self) -> u64 {
        self.entity.column_number
    }

    pub fn is_external(&self) -> bool {
        self.entity.is_external
    }

    pub fn public_id(&self) -> Option<&str> {
        self.entity.location.public_id.as_deref()
    }

    pub fn literal_system_id(&self) -> Option<&str> {
        self.entity.location.system_id.as_deref()
    }

    pub fn base_system_id(&self) -> Option<&str> {
        self.entity.location.base_system_id.as_deref()
    }

    /// Marks the current entity as expanded inside a literal, making its
    /// own quote characters ordinary data for `scan_literal`.
    pub fn set_literal(&mut self, literal: bool) {
        self.entity.set_literal(literal);
    }

    /// Allow full-buffer refills once the entity's declaration (if any)
    /// has been scanned.
    pub fn set_may_read_chunks(&mut self, may_read_chunks: bool) {
        self.entity.set_may_read_chunks(may_read_chunks);
    }

    /// Switch the current entity's decode encoding, once its declaration
    /// names one. Characters already buffered are unaffected.
    pub fn set_encoding(&mut self, encoding: Encoding) -> Result<()> {
        self.entity.source.set_encoding(encoding)?;
        Ok(())
    }

    /// Suspend the current entity and scan `entity` until it ends; the
    /// suspended entity resumes where it left off.
    pub fn start_entity(&mut self, entity: ScannedEntity) {
        trace!("starting nested entity");
        let suspended = std::mem::replace(&mut self.entity, entity);
        self.stack.push_entity(suspended);
    }

    /// Refill the buffer at `offset`, preserving `ch[..offset]`.
    ///
    /// Returns `Ok(false)` when characters were read into the current
    /// entity and `Ok(true)` when the current entity ended instead. With
    /// `change_entity` set, an ended entity is replaced by the top of the
    /// stack (recursing through entities that are immediately empty);
    /// an empty stack is `Err(ScanError::UnexpectedEof)`.
    fn load(&mut self, offset: usize, change_entity: bool) -> Result<bool> {
        let n = {
            let e = &mut self.entity;
            // Small reads while the entity start is encoding-sensitive.
            let limit = if e.may_read_chunks {
                e.ch.len()
            } else {
                (offset + XMLDECL_BUFFER_SIZE).min(e.ch.len())
            };
            e.source.read(&mut e.ch[offset..limit])?
        };
        trace!(offset, read = n, "refill");
        let mut entity_changed = false;
        if n > 0 {
            self.entity.count = offset + n;
            self.entity.position = offset;
            debug_assert!(self.entity.count <= self.entity.ch.len());
        } else {
            self.entity.count = offset;
            self.entity.position = offset;
            entity_changed = true;
            if change_entity {
                match self.stack.pop_entity() {
                    Some(next) => {
                        trace!("entity ended, resuming suspended entity");
                        self.entity = next;
                        if self.entity.position == self.entity.count {
                            self.load(0, true)?;
                        }
                    }
                    None => {
                        trace!("entity ended, no further input");
                        return Err(ScanError::UnexpectedEof);
                    }
                }
            }
        }
        Ok(entity_changed)
    }

    /// Look at the next character without consuming it. In an external
    /// entity every line-break opener reads as `\n`.
    pub fn peek_char(&mut self) -> Result<char> {
        if self.entity.position == self.entity.count {
            self.load(0, true)?;
        }
        let c = self.entity.ch[self.entity.position];
        if self.entity.is_external && self.version.is_external_break(c) {
            Ok('\n')
        } else {
            Ok(c)
        }
    }

    /// Consume and return one character, normalizing line breaks in
    /// external entities (a two-character break collapses to one `\n`).
    pub fn scan_char(&mut self) -> Result<char> {
        if self.entity.position == self.entity.count {
            self.load(0, true)?;
        }
        let mut c = self.entity.ch[self.entity.position];
        self.entity.position += 1;
        let external = self.entity.is_external;
        if c == '\n' || (external && self.version.is_external_break(c)) {
            self.entity.line_number += 1;
            self.entity.column_number = 1;
            if self.entity.position == self.entity.count {
                self.entity.ch[0] = c;
                self.load(1, false)?;
            }
            if external
                && self.version.collapses_lf(c)
                && self.entity.position < self.entity.count
                && self.entity.ch[self.entity.position] == '\n'
            {
                self.entity.position += 1;
            }
            c = '\n';
        }
        self.entity.column_number += 1;
        Ok(c)
    }

    /// Consume the next character if it equals `c`. Asking for `\n` also
    /// matches any external line break, consuming the whole sequence.
    pub fn skip_char(&mut self, c: char) -> Result<bool> {
        if self.entity.position == self.entity.count {
            self.load(0, true)?;
        }
        let cc = self.entity.ch[self.entity.position];
        if cc == c {
            self.entity.position += 1;
            if c == '\n' {
                self.entity.line_number += 1;
                self.entity.column_number = 1;
            } else {
                self.entity.column_number += 1;
            }
            Ok(true)
        } else if c == '\n' && self.entity.is_external && self.version.is_external_break(cc) {
            self.entity.position += 1;
            if self.version.collapses_lf(cc) {
                if self.entity.position == self.entity.count {
                    self.entity.ch[0] = cc;
                    self.load(1, false)?;
                }
                if self.entity.position < self.entity.count
                    && self.entity.ch[self.entity.position] == '\n'
                {
                    self.entity.position += 1;
                }
            }
            self.entity.line_number += 1;
            self.entity.column_number = 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Consume a run of white space. Returns whether anything was
    /// consumed. May cross entity boundaries mid-run.
    pub fn skip_spaces(&mut self) -> Result<bool> {
        if self.entity.position == self.entity.count {
            self.load(0, true)?;
        }
        let mut c = self.entity.ch[self.entity.position];
        if !self.version.is_space(c) {
            return Ok(false);
        }
        let external = self.entity.is_external;
        loop {
            let mut entity_changed = false;
            if c == '\n' || (external && self.version.is_external_break(c)) {
                self.entity.line_number += 1;
                self.entity.column_number = 1;
                if self.entity.position + 1 == self.entity.count {
                    self.entity.ch[0] = c;
                    entity_changed = self.load(1, true)?;
                    if !entity_changed {
                        // load left position at 1; the break is at 0.
                        self.entity.position = 0;
                    }
                }
                if external
                    && self.version.collapses_lf(c)
                    && self.entity.position + 1 < self.entity.count
                    && self.entity.ch[self.entity.position + 1] == '\n'
                {
                    self.entity.position += 1;
                }
            } else {
                self.entity.column_number += 1;
            }
            if !entity_changed {
                self.entity.position += 1;
            }
            if self.entity.position == self.entity.count {
                self.load(0, true)?;
            }
            c = self.entity.ch[self.entity.position];
            if !self.version.is_space(c) {
                break;
            }
        }
        Ok(true)
    }

    /// Consume `s` if the input starts with it; otherwise consume
    /// nothing. `s` must not contain line breaks.
    pub fn skip_string(&mut self, s: &str) -> Result<bool> {
        if self.entity.position == self.entity.count {
            self.load(0, true)?;
        }
        let length = s.chars().count();
        for (i, expected) in s.chars().enumerate() {
            let c = self.entity.ch[self.entity.position];
            self.entity.position += 1;
            if c != expected {
                self.entity.position -= i + 1;
                return Ok(false);
            }
            if i + 1 < length && self.entity.position == self.entity.count {
                // Keep the matched prefix at the front across the refill.
                let count = self.entity.count;
                self.entity.ch.copy_within(count - i - 1..count, 0);
                if self.load(i + 1, false)? {
                    self.entity.position -= i + 1;
                    return Ok(false);
                }
            }
        }
        self.entity.column_number += length as u64;
        Ok(true)
    }

    /// Scan a Name. `None` when the next character cannot start one;
    /// nothing is consumed in that case.
    pub fn scan_name(&mut self) -> Result<Option<Symbol>> {
        if self.entity.position == self.entity.count {
            self.load(0, true)?;
        }
        let mut offset = self.entity.position;
        if self.version.is_name_start(self.entity.ch[offset]) {
            self.entity.position += 1;
            if self.entity.position == self.entity.count {
                self.entity.ch[0] = self.entity.ch[offset];
                offset = 0;
                if self.load(1, false)? {
                    self.entity.column_number += 1;
                    let symbol = self.symbols.add_symbol(&self.entity.ch, 0, 1);
                    return Ok(Some(symbol));
                }
            }
            while self.version.is_name(self.entity.ch[self.entity.position]) {
                self.entity.position += 1;
                if self.entity.position == self.entity.count {
                    let length = self.entity.position - offset;
                    self.entity.shift_to_front(offset);
                    offset = 0;
                    if self.load(length, false)? {
                        break;
                    }
                }
            }
        }
        let length = self.entity.position - offset;
        self.entity.column_number += length as u64;
        if length > 0 {
            Ok(Some(self.symbols.add_symbol(&self.entity.ch, offset, length)))
        } else {
            Ok(None)
        }
    }

    /// Scan an Nmtoken (any run of name characters).
    pub fn scan_nmtoken(&mut self) -> Result<Option<Symbol>> {
        if self.entity.position == self.entity.count {
            self.load(0, true)?;
        }
        let mut offset = self.entity.position;
        while self.version.is_name(self.entity.ch[self.entity.position]) {
            self.entity.position += 1;
            if self.entity.position == self.entity.count {
                let length = self.entity.position - offset;
                self.entity.shift_to_front(offset);
                offset = 0;
                if self.load(length, false)? {
                    break;
                }
            }
        }
        let length = self.entity.position - offset;
        self.entity.column_number += length as u64;
        if length > 0 {
            Ok(Some(self.symbols.add_symbol(&self.entity.ch, offset, length)))
        } else {
            Ok(None)
        }
    }

    /// Scan a qualified name, splitting at the first `:`. A second colon
    /// ends the name and is left unconsumed.
    pub fn scan_qname(&mut self) -> Result<Option<QName>> {
        if self.entity.position == self.entity.count {
            self.load(0, true)?;
        }
        let mut offset = self.entity.position;
        if self.version.is_name_start(self.entity.ch[offset]) {
            self.entity.position += 1;
            if self.entity.position == self.entity.count {
                self.entity.ch[0] = self.entity.ch[offset];
                offset = 0;
                if self.load(1, false)? {
                    self.entity.column_number += 1;
                    let name = self.symbols.add_symbol(&self.entity.ch, 0, 1);
                    return Ok(Some(QName {
                        prefix: None,
                        local: name,
                        raw: name,
                    }));
                }
            }
            let mut index: Option<usize> = None;
            while self.version.is_name(self.entity.ch[self.entity.position]) {
                let c = self.entity.ch[self.entity.position];
                if c == ':' {
                    if index.is_some() {
                        break;
                    }
                    index = Some(self.entity.position);
                }
                self.entity.position += 1;
                if self.entity.position == self.entity.count {
                    let length = self.entity.position - offset;
                    self.entity.shift_to_front(offset);
                    if let Some(i) = index.as_mut() {
                        *i -= offset;
                    }
                    offset = 0;
                    if self.load(length, false)? {
                        break;
                    }
                }
            }
            let length = self.entity.position - offset;
            self.entity.column_number += length as u64;
            if length > 0 {
                let raw = self.symbols.add_symbol(&self.entity.ch, offset, length);
                let (prefix, local) = match index {
                    Some(i) => {
                        let prefix_length = i - offset;
                        let prefix =
                            self.symbols.add_symbol(&self.entity.ch, offset, prefix_length);
                        let local = self.symbols.add_symbol(
                            &self.entity.ch,
                            i + 1,
                            length - prefix_length - 1,
                        );
                        (Some(prefix), local)
                    }
                    None => (None, raw),
                };
                return Ok(Some(QName { prefix, local, raw }));
            }
        }
        Ok(None)
    }

    /// Scan character data up to the next markup, line break needing
    /// normalization, or buffer boundary. Appends to `content` and
    /// returns the next (unconsumed) character; `None` when it is not
    /// known without another refill.
    pub fn scan_content(&mut self, content: &mut String) -> Result<Option<char>> {
        if self.entity.position == self.entity.count {
            self.load(0, true)?;
        } else if self.entity.position + 1 == self.entity.count {
            self.entity.ch[0] = self.entity.ch[self.entity.count - 1];
            self.load(1, false)?;
            self.entity.position = 0;
        }

        let run = self.normalize_newlines()?;
        let offset = run.offset;
        if run.at_buffer_end {
            let length = self.entity.position - offset;
            content.extend(&self.entity.ch[offset..offset + length]);
            return Ok(None);
        }

        while self.entity.position < self.entity.count {
            let c = self.entity.ch[self.entity.position];
            self.entity.position += 1;
            if !self.is_content_char(c) {
                self.entity.position -= 1;
                break;
            }
        }
        let length = self.entity.position - offset;
        self.bump_column(length, run.newlines);
        content.extend(&self.entity.ch[offset..offset + length]);

        if self.entity.position != self.entity.count {
            let c = self.entity.ch[self.entity.position];
            if self.entity.is_external && self.version.is_external_break(c) {
                Ok(Some('\n'))
            } else {
                Ok(Some(c))
            }
        } else {
            Ok(None)
        }
    }

    /// Scan a literal value up to the closing `quote`, a `%`, invalid
    /// data, a line break needing normalization, or the buffer boundary.
    /// When the current entity was expanded inside this literal
    /// (`set_literal`), quote characters are ordinary data.
    pub fn scan_literal(&mut self, quote: char, content: &mut String) -> Result<Option<char>> {
        if self.entity.position == self.entity.count {
            self.load(0, true)?;
        } else if self.entity.position + 1 == self.entity.count {
            self.entity.ch[0] = self.entity.ch[self.entity.count - 1];
            self.load(1, false)?;
            self.entity.position = 0;
        }

        let run = self.normalize_newlines()?;
        let offset = run.offset;
        if run.at_buffer_end {
            let length = self.entity.position - offset;
            content.extend(&self.entity.ch[offset..offset + length]);
            return Ok(None);
        }

        let external = self.entity.is_external;
        while self.entity.position < self.entity.count {
            let c = self.entity.ch[self.entity.position];
            self.entity.position += 1;
            if (c == quote && (!self.entity.literal || external))
                || c == '%'
                || !self.is_content_char(c)
            {
                self.entity.position -= 1;
                break;
            }
        }
        let length = self.entity.position - offset;
        self.bump_column(length, run.newlines);
        content.extend(&self.entity.ch[offset..offset + length]);

        if self.entity.position != self.entity.count {
            let c = self.entity.ch[self.entity.position];
            // Do not signal the end of the literal off this entity's own
            // closing quote while expanding inside the literal.
            if c == quote && self.entity.literal {
                Ok(None)
            } else {
                Ok(Some(c))
            }
        } else {
            Ok(None)
        }
    }

    /// Scan character data up to `delimiter`, appending to `buffer`. One
    /// pass per call; the tail-shift refill guarantees a delimiter
    /// straddling a buffer boundary is still found, provided the buffer
    /// is larger than the delimiter.
    pub fn scan_data(&mut self, delimiter: &str, buffer: &mut String) -> Result<DataRun> {
        let delim: Vec<char> = delimiter.chars().collect();
        let delim_len = delim.len();
        debug_assert!(delim_len > 0);
        let first = delim[0];

        if self.entity.position == self.entity.count {
            self.load(0, true)?;
        }

        // Keep more than a delimiter's worth of characters buffered,
        // shifting the unread tail to the front.
        let mut entity_ended = false;
        while self.entity.position + delim_len >= self.entity.count && !entity_ended {
            let remaining = self.entity.count - self.entity.position;
            let position = self.entity.position;
            self.entity.ch.copy_within(position..position + remaining, 0);
            entity_ended = self.load(remaining, false)?;
            self.entity.position = 0;
        }
        if self.entity.position + delim_len >= self.entity.count {
            // The entity ended without room for a delimiter, e.g. a file
            // ending in an unterminated comment.
            let length = self.entity.count - self.entity.position;
            buffer.extend(&self.entity.ch[self.entity.position..self.entity.position + length]);
            self.entity.column_number += self.entity.count as u64;
            self.entity.position = self.entity.count;
            match self.load(0, true) {
                Err(ScanError::UnexpectedEof) => {}
                other => {
                    other?;
                }
            }
            return Ok(DataRun::Exhausted);
        }

        let run = self.normalize_newlines()?;
        let offset = run.offset;
        if run.at_buffer_end {
            let length = self.entity.position - offset;
            buffer.extend(&self.entity.ch[offset..offset + length]);
            return Ok(DataRun::Continue);
        }

        let external = self.entity.is_external;
        let mut found = false;
        'outer: while self.entity.position < self.entity.count {
            let mut c = self.entity.ch[self.entity.position];
            self.entity.position += 1;
            if c == first {
                // Looks like the delimiter; match the rest of it.
                let delim_offset = self.entity.position - 1;
                for (i, &expected) in delim.iter().enumerate().skip(1) {
                    if self.entity.position == self.entity.count {
                        self.entity.position -= i;
                        break 'outer;
                    }
                    c = self.entity.ch[self.entity.position];
                    self.entity.position += 1;
                    if expected != c {
                        self.entity.position -= 1;
                        break;
                    }
                }
                if self.entity.position == delim_offset + delim_len {
                    found = true;
                    break;
                }
            } else if c == '\n' || (external && self.version.is_external_break(c)) {
                self.entity.position -= 1;
                break;
            } else if self.version.is_invalid(c) {
                self.entity.position -= 1;
                let length = self.entity.position - offset;
                self.bump_column(length, run.newlines);
                buffer.extend(&self.entity.ch[offset..offset + length]);
                return Ok(DataRun::InvalidChar);
            }
        }
        let mut length = self.entity.position - offset;
        self.bump_column(length, run.newlines);
        if found {
            length -= delim_len;
        }
        buffer.extend(&self.entity.ch[offset..offset + length]);

        Ok(if found { DataRun::Found } else { DataRun::Continue })
    }

    /// Normalize the leading run of line breaks in place: consume each
    /// break, collapse two-character sequences, rewrite every slot of
    /// the run to `\n` and bump the line number. Shared by the bulk
    /// operations; a no-op unless the next character opens a break.
    fn normalize_newlines(&mut self) -> Result<NewlineRun> {
        let mut offset = self.entity.position;
        let mut newlines = 0usize;
        let external = self.entity.is_external;
        let first = self.entity.ch[offset];
        if first == '\n' || (external && self.version.is_external_break(first)) {
            loop {
                let c = self.entity.ch[self.entity.position];
                self.entity.position += 1;
                if external && self.version.collapses_lf(c) {
                    newlines += 1;
                    self.entity.line_number += 1;
                    self.entity.column_number = 1;
                    if self.entity.position == self.entity.count {
                        offset = 0;
                        self.entity.position = newlines;
                        if self.load(newlines, false)? {
                            break;
                        }
                    }
                    if self.entity.position < self.entity.count
                        && self.entity.ch[self.entity.position] == '\n'
                    {
                        self.entity.position += 1;
                        offset += 1;
                    } else {
                        // Lone opener occupies one slot but counts the
                        // pair's worth for the column math.
                        newlines += 1;
                    }
                } else if c == '\n' || (external && self.version.is_external_break(c)) {
                    newlines += 1;
                    self.entity.line_number += 1;
                    self.entity.column_number = 1;
                    if self.entity.position == self.entity.count {
                        offset = 0;
                        self.entity.position = newlines;
                        if self.load(newlines, false)? {
                            break;
                        }
                    }
                } else {
                    self.entity.position -= 1;
                    break;
                }
                if self.entity.position + 1 >= self.entity.count {
                    break;
                }
            }
            for i in offset..self.entity.position {
                self.entity.ch[i] = '\n';
            }
        }
        Ok(NewlineRun {
            offset,
            newlines,
            at_buffer_end: newlines > 0 && self.entity.position + 1 == self.entity.count,
        })
    }

    /// Content-run continuation: the version's content class, plus NEL
    /// and LINE SEPARATOR under 1.1 (the leading normalization deals
    /// with them; mid-run they do not stop the scan).
    fn is_content_char(&self, c: char) -> bool {
        self.version.is_content(c)
            || (self.version == XmlVersion::V1_1 && (c == NEL || c == LINE_SEPARATOR))
    }

    /// Column bookkeeping for bulk runs. `newlines` can exceed the run
    /// length by one for a lone two-character-break opener, so this
    /// saturates instead of underflowing. Columns are advisory.
    fn bump_column(&mut self, length: usize, newlines: usize) {
        self.entity.column_number = self
            .entity
            .column_number
            .saturating_add_signed(length as i64 - newlines as i64);
    }
}
