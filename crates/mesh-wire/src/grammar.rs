//! Token grammar of the wire format.
//!
//! Tokens are separated (and terminated) by [`SEPARATOR`]. Only string-table
//! entries can contain arbitrary text, so they are the only tokens that are
//! escaped. Every other token is a decimal number or a float literal.

use std::borrow::Cow;

use crate::error::WireError;

// ── Versioning ───────────────────────────────────────────────────────────

/// The only stream version this codec reads or writes.
pub const SERIALIZATION_STREAM_VERSION: i32 = 7;

// ── Reserved characters ──────────────────────────────────────────────────

/// Terminates every token (ASCII unit separator).
pub const SEPARATOR: char = '\u{1F}';

/// Introduces an escape sequence inside a string-table entry.
pub const ESCAPE: char = '\\';

// Escape sequences: `\\` is a literal escape, `\!` the separator, `\0` NUL.
const ESCAPED_SEPARATOR: char = '!';
const ESCAPED_NUL: char = '0';

// ── Flags ────────────────────────────────────────────────────────────────

/// String-table type entries carry obfuscated ids instead of class names.
pub const FLAG_ELIDE_TYPE_NAMES: i32 = 0x1;

const KNOWN_FLAGS: i32 = FLAG_ELIDE_TYPE_NAMES;

/// The header flag bitmask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags(i32);

impl Flags {
    pub const NONE: Flags = Flags(0);

    /// Validate a raw header value, rejecting unknown bits.
    pub fn from_bits(bits: i32) -> Result<Flags, WireError> {
        if bits & !KNOWN_FLAGS != 0 {
            return Err(WireError::UnsupportedFlags(bits));
        }
        Ok(Flags(bits))
    }

    pub fn bits(self) -> i32 {
        self.0
    }

    pub fn elide_type_names(self) -> bool {
        self.0 & FLAG_ELIDE_TYPE_NAMES != 0
    }

    pub fn with_elided_type_names(self, elide: bool) -> Flags {
        if elide {
            Flags(self.0 | FLAG_ELIDE_TYPE_NAMES)
        } else {
            Flags(self.0 & !FLAG_ELIDE_TYPE_NAMES)
        }
    }
}

// ── Escaping ─────────────────────────────────────────────────────────────

/// Escape a string-table entry so it can be placed between separators.
pub fn escape(s: &str) -> Cow<'_, str> {
    if !s.chars().any(|c| c == SEPARATOR || c == ESCAPE || c == '\0') {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            SEPARATOR => {
                out.push(ESCAPE);
                out.push(ESCAPED_SEPARATOR);
            }
            ESCAPE => {
                out.push(ESCAPE);
                out.push(ESCAPE);
            }
            '\0' => {
                out.push(ESCAPE);
                out.push(ESCAPED_NUL);
            }
            other => out.push(other),
        }
    }
    Cow::Owned(out)
}

/// Reverse [`escape`]. Unknown or dangling escapes are a format error.
pub fn unescape(s: &str) -> Result<Cow<'_, str>, WireError> {
    if !s.contains(ESCAPE) {
        return Ok(Cow::Borrowed(s));
    }
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != ESCAPE {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(ESCAPE) => out.push(ESCAPE),
            Some(ESCAPED_SEPARATOR) => out.push(SEPARATOR),
            Some(ESCAPED_NUL) => out.push('\0'),
            Some(other) => return Err(WireError::InvalidEscape(format!("{ESCAPE}{other}"))),
            None => return Err(WireError::InvalidEscape(ESCAPE.to_string())),
        }
    }
    Ok(Cow::Owned(out))
}

// ── Tokenizing ───────────────────────────────────────────────────────────

/// Split a complete message into its tokens.
///
/// Every token is terminated by a separator, so the text after the final
/// separator must be empty.
pub fn tokenize(wire: &str) -> Result<Vec<&str>, WireError> {
    let mut tokens: Vec<&str> = wire.split(SEPARATOR).collect();
    match tokens.pop() {
        Some("") => Ok(tokens),
        _ => Err(WireError::Unterminated),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_passes_plain_text_through() {
        assert!(matches!(escape("hello world"), Cow::Borrowed("hello world")));
        assert_eq!(unescape("hello world").unwrap(), "hello world");
    }

    #[test]
    fn raw_backslash_round_trips() {
        let input = "Raw backslash \\";
        let escaped = escape(input);
        assert_eq!(escaped, "Raw backslash \\\\");
        assert_eq!(unescape(&escaped).unwrap(), input);
    }

    #[test]
    fn escaped_separator_decodes_to_single_separator() {
        let decoded = unescape("a\\!b").unwrap();
        assert_eq!(decoded, format!("a{SEPARATOR}b"));
        assert_eq!(decoded.chars().filter(|c| *c == SEPARATOR).count(), 1);
    }

    #[test]
    fn separator_nul_and_unicode_round_trip() {
        let input = format!("x{SEPARATOR}y\0z \u{1F600} \\! caf\u{E9}");
        let escaped = escape(&input);
        assert!(!escaped.contains(SEPARATOR));
        assert!(!escaped.contains('\0'));
        assert_eq!(unescape(&escaped).unwrap(), input);
    }

    #[test]
    fn unescape_rejects_unknown_and_dangling_escapes() {
        assert_eq!(
            unescape("bad\\q"),
            Err(WireError::InvalidEscape("\\q".to_string()))
        );
        assert_eq!(
            unescape("dangling\\"),
            Err(WireError::InvalidEscape("\\".to_string()))
        );
    }

    #[test]
    fn flags_reject_unknown_bits() {
        assert!(Flags::from_bits(0).is_ok());
        assert!(Flags::from_bits(FLAG_ELIDE_TYPE_NAMES).unwrap().elide_type_names());
        assert_eq!(Flags::from_bits(0x4), Err(WireError::UnsupportedFlags(0x4)));
        let flags = Flags::NONE.with_elided_type_names(true);
        assert_eq!(flags.bits(), FLAG_ELIDE_TYPE_NAMES);
        assert_eq!(flags.with_elided_type_names(false), Flags::NONE);
    }

    #[test]
    fn tokenize_requires_trailing_separator() {
        let wire = format!("7{SEPARATOR}0{SEPARATOR}");
        assert_eq!(tokenize(&wire).unwrap(), vec!["7", "0"]);
        assert!(tokenize("").unwrap().is_empty());
        assert_eq!(
            tokenize(&format!("7{SEPARATOR}0")),
            Err(WireError::Unterminated)
        );
        assert!(tokenize(&SEPARATOR.to_string()).unwrap() == vec![""]);
    }
}
