//! Errors raised while tokenizing or walking a wire stream.
//!
//! Every variant is a format error: the stream is unusable and the whole
//! decode is aborted. None of them are retried.

use thiserror::Error;

/// A malformed, truncated, or incompatible wire stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// The header version is not the one this codec speaks.
    #[error("incompatible stream version {found} (this endpoint speaks version {expected})")]
    IncompatibleVersion { found: i32, expected: i32 },
    /// The header could not be parsed at all.
    #[error("malformed stream header: {0}")]
    MalformedHeader(String),
    /// The flags field has bits this codec does not understand.
    #[error("unsupported stream flags 0x{0:x}")]
    UnsupportedFlags(i32),
    /// The last token is not followed by a separator.
    #[error("stream is not terminated by a separator")]
    Unterminated,
    /// A read was attempted past the last token.
    #[error("read past end of stream at token {0}")]
    UnexpectedEnd(usize),
    /// A token could not be parsed as the expected kind.
    #[error("invalid {expected} token {token:?} at position {pos}")]
    InvalidToken {
        pos: usize,
        expected: &'static str,
        token: String,
    },
    /// A string index points outside the string table.
    #[error("string table index {index} out of range (table has {len} entries)")]
    StringIndexOutOfRange { index: i32, len: usize },
    /// A negative back-reference points at an object slot never assigned.
    #[error("back-reference to object slot {slot} out of range ({len} objects decoded)")]
    BackReferenceOutOfRange { slot: usize, len: usize },
    /// A string-table entry contains an unknown or dangling escape.
    #[error("invalid escape sequence {0:?} in string table")]
    InvalidEscape(String),
    /// Tokens remain after the message was fully decoded.
    #[error("{0} unexpected trailing token(s) after end of message")]
    TrailingTokens(usize),
}
