//! Byte-stream character sources
//!
//! External entities arrive as byte streams plus a named encoding; the
//! scanner wants decoded `char`s. `DecodingReader` decodes incrementally,
//! carrying partial multi-byte sequences (and UTF-16 surrogate pairs)
//! across byte refills, and can switch encodings mid-stream once the
//! entity's own declaration names one.
//!
//! Encoding *detection* (BOM sniffing) is a resolver concern and lives
//! outside this crate; the caller names the initial encoding.

use std::io::{self, Read};

use crate::core::entity::CharRead;

/// Character encodings the decoder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Utf16Le,
    Utf16Be,
    Latin1,
    Ascii,
}

impl Encoding {
    /// Map an encoding declaration label (case-insensitive) to a decoder.
    pub fn from_label(label: &str) -> Option<Encoding> {
        match label.to_ascii_uppercase().as_str() {
            "UTF-8" => Some(Encoding::Utf8),
            "UTF-16LE" => Some(Encoding::Utf16Le),
            "UTF-16BE" => Some(Encoding::Utf16Be),
            "ISO-8859-1" | "LATIN1" => Some(Encoding::Latin1),
            "US-ASCII" | "ASCII" => Some(Encoding::Ascii),
            _ => None,
        }
    }
}

/// In-memory character source for internal entities and tests.
#[derive(Debug)]
pub struct StringCharReader {
    chars: Vec<char>,
    pos: usize,
}

impl StringCharReader {
    pub fn new(text: &str) -> Self {
        StringCharReader {
            chars: text.chars().collect(),
            pos: 0,
        }
    }
}

impl CharRead for StringCharReader {
    fn read(&mut self, buf: &mut [char]) -> io::Result<usize> {
        let remaining = self.chars.len() - self.pos;
        let n = remaining.min(buf.len());
        buf[..n].copy_from_slice(&self.chars[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

const RAW_BUFFER_SIZE: usize = 4096;

/// Outcome of decoding one character from buffered bytes.
enum DecodeStep {
    /// Decoded `char`, consuming this many bytes.
    Char(char, usize),
    /// The buffered bytes end mid-sequence.
    NeedMore,
    Invalid(&'static str),
}

/// Incremental decoder over any `io::Read`.
pub struct DecodingReader<R: Read> {
    inner: R,
    encoding: Encoding,
    buf: Box<[u8]>,
    start: usize,
    end: usize,
    eof: bool,
}

impl<R: Read> DecodingReader<R> {
    pub fn new(inner: R, encoding: Encoding) -> Self {
        DecodingReader {
            inner,
            encoding,
            buf: vec![0u8; RAW_BUFFER_SIZE].into_boxed_slice(),
            start: 0,
            end: 0,
            eof: false,
        }
    }

    /// Compact pending bytes to the front and read more after them.
    fn fill(&mut self) -> io::Result<()> {
        if self.start > 0 {
            self.buf.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
        let n = self.inner.read(&mut self.buf[self.end..])?;
        if n == 0 {
            self.eof = true;
        }
        self.end += n;
        Ok(())
    }

    fn pending(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }
}

impl<R: Read> CharRead for DecodingReader<R> {
    fn read(&mut self, out: &mut [char]) -> io::Result<usize> {
        let mut n = 0;
        while n < out.len() {
            // A complete sequence is at most 4 bytes in every encoding.
            if self.end - self.start < 4 && !self.eof {
                self.fill()?;
            }
            if self.start == self.end {
                break;
            }
            match decode_one(self.encoding, self.pending()) {
                DecodeStep::Char(c, used) => {
                    out[n] = c;
                    n += 1;
                    self.start += used;
                }
                DecodeStep::NeedMore => {
                    if self.eof {
                        // Report what was decoded; the error recurs on the
                        // next call because no bytes were consumed.
                        if n > 0 {
                            return Ok(n);
                        }
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "byte stream ends inside a character sequence",
                        ));
                    }
                    self.fill()?;
                }
                DecodeStep::Invalid(msg) => {
                    if n > 0 {
                        return Ok(n);
                    }
                    return Err(io::Error::new(io::ErrorKind::InvalidData, msg));
                }
            }
        }
        Ok(n)
    }

    fn set_encoding(&mut self, encoding: Encoding) -> io::Result<()> {
        self.encoding = encoding;
        Ok(())
    }
}

fn decode_one(encoding: Encoding, bytes: &[u8]) -> DecodeStep {
    match encoding {
        Encoding::Utf8 => decode_utf8(bytes),
        Encoding::Utf16Le => decode_utf16(bytes, u16::from_le_bytes),
        Encoding::Utf16Be => decode_utf16(bytes, u16::from_be_bytes),
        Encoding::Latin1 => DecodeStep::Char(char::from(bytes[0]), 1),
        Encoding::Ascii => {
            if bytes[0] < 0x80 {
                DecodeStep::Char(char::from(bytes[0]), 1)
            } else {
                DecodeStep::Invalid("byte outside US-ASCII range")
            }
        }
    }
}

fn decode_utf8(bytes: &[u8]) -> DecodeStep {
    let lead = bytes[0];
    let (len, init) = match lead {
        0x00..=0x7F => return DecodeStep::Char(char::from(lead), 1),
        0xC2..=0xDF => (2, (lead & 0x1F) as u32),
        0xE0..=0xEF => (3, (lead & 0x0F) as u32),
        0xF0..=0xF4 => (4, (lead & 0x07) as u32),
        _ => return DecodeStep::Invalid("invalid UTF-8 lead byte"),
    };
    if bytes.len() < len {
        return DecodeStep::NeedMore;
    }
    let mut cp = init;
    for &b in &bytes[1..len] {
        if b & 0xC0 != 0x80 {
            return DecodeStep::Invalid("invalid UTF-8 continuation byte");
        }
        cp = (cp << 6) | (b & 0x3F) as u32;
    }
    match char::from_u32(cp) {
        // Reject overlong forms that slipped past the lead-byte ranges.
        Some(c) if c.len_utf8() == len => DecodeStep::Char(c, len),
        _ => DecodeStep::Invalid("invalid UTF-8 sequence"),
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> DecodeStep {
    if bytes.len() < 2 {
        return DecodeStep::NeedMore;
    }
    let hi = unit([bytes[0], bytes[1]]);
    match hi {
        0xD800..=0xDBFF => {
            if bytes.len() < 4 {
                return DecodeStep::NeedMore;
            }
            let lo = unit([bytes[2], bytes[3]]);
            if !(0xDC00..=0xDFFF).contains(&lo) {
                return DecodeStep::Invalid("unpaired UTF-16 high surrogate");
            }
            let cp = 0x1_0000 + (((hi as u32 - 0xD800) << 10) | (lo as u32 - 0xDC00));
            match char::from_u32(cp) {
                Some(c) => DecodeStep::Char(c, 4),
                None => DecodeStep::Invalid("invalid UTF-16 surrogate pair"),
            }
        }
        0xDC00..=0xDFFF => DecodeStep::Invalid("unpaired UTF-16 low surrogate"),
        _ => match char::from_u32(hi as u32) {
            Some(c) => DecodeStep::Char(c, 2),
            None => DecodeStep::Invalid("invalid UTF-16 code unit"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(reader: &mut dyn CharRead) -> String {
        let mut buf = ['\0'; 16];
        let mut out = String::new();
        loop {
            let n = reader.read(&mut buf).expect("read failed");
            if n == 0 {
                break;
            }
            out.extend(&buf[..n]);
        }
        out
    }

    #[test]
    fn test_string_reader() {
        let mut r = StringCharReader::new("abc");
        assert_eq!(read_all(&mut r), "abc");
        let mut buf = ['\0'; 4];
        assert_eq!(r.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_utf8_multibyte() {
        let text = "a\u{00E9}\u{4E2D}\u{1F600}";
        let mut r = DecodingReader::new(text.as_bytes(), Encoding::Utf8);
        assert_eq!(read_all(&mut r), text);
    }

    #[test]
    fn test_utf8_truncated_sequence() {
        // Lead byte of a 3-byte sequence, stream ends after one byte.
        let bytes: &[u8] = &[b'a', 0xE4];
        let mut r = DecodingReader::new(bytes, Encoding::Utf8);
        let mut buf = ['\0'; 4];
        assert_eq!(r.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 'a');
        assert!(r.read(&mut buf).is_err());
    }

    #[test]
    fn test_utf16le_with_surrogates() {
        let text = "hi\u{1D11E}!";
        let bytes: Vec<u8> = text
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes())
            .collect();
        let mut r = DecodingReader::new(&bytes[..], Encoding::Utf16Le);
        assert_eq!(read_all(&mut r), text);
    }

    #[test]
    fn test_utf16be() {
        let text = "<?xml";
        let bytes: Vec<u8> = text
            .encode_utf16()
            .flat_map(|u| u.to_be_bytes())
            .collect();
        let mut r = DecodingReader::new(&bytes[..], Encoding::Utf16Be);
        assert_eq!(read_all(&mut r), text);
    }

    #[test]
    fn test_latin1_and_ascii() {
        let bytes: &[u8] = &[b'a', 0xE9];
        let mut r = DecodingReader::new(bytes, Encoding::Latin1);
        assert_eq!(read_all(&mut r), "a\u{00E9}");

        let mut r = DecodingReader::new(bytes, Encoding::Ascii);
        let mut buf = ['\0'; 4];
        assert_eq!(r.read(&mut buf[..1]).unwrap(), 1);
        assert!(r.read(&mut buf).is_err());
    }

    #[test]
    fn test_switch_encoding_midstream() {
        // ASCII prologue, then the declared encoding takes over.
        let bytes: Vec<u8> = [b"ok" as &[u8], &[0xE9]].concat();
        let mut r = DecodingReader::new(&bytes[..], Encoding::Ascii);
        let mut buf = ['\0'; 2];
        assert_eq!(r.read(&mut buf).unwrap(), 2);
        r.set_encoding(Encoding::Latin1).unwrap();
        let mut rest = ['\0'; 2];
        assert_eq!(r.read(&mut rest).unwrap(), 1);
        assert_eq!(rest[0], '\u{00E9}');
    }

    #[test]
    fn test_encoding_labels() {
        assert_eq!(Encoding::from_label("utf-8"), Some(Encoding::Utf8));
        assert_eq!(Encoding::from_label("ISO-8859-1"), Some(Encoding::Latin1));
        assert_eq!(Encoding::from_label("EBCDIC"), None);
    }
}
