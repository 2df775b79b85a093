//! Scanner error types.

use thiserror::Error;

/// Errors surfaced by scanner operations.
///
/// I/O failures from the underlying character source are propagated
/// unchanged. `UnexpectedEof` is the one terminal condition the scanner
/// raises itself: a refill crossed the last entity boundary and the
/// entity stack had nothing further to offer.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Read failure (or malformed byte sequence) from the character source.
    #[error("input source error: {0}")]
    Io(#[from] std::io::Error),

    /// Input ran out where the grammar still expected characters.
    #[error("unexpected end of input")]
    UnexpectedEof,
}

impl ScanError {
    /// True when the error marks the end of all input rather than a
    /// transport failure.
    pub fn is_eof(&self) -> bool {
        matches!(self, ScanError::UnexpectedEof)
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
