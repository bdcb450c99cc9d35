//! Decoding cursor over a complete wire message.
//!
//! [`prepare_to_read`] validates the header, materializes the string table,
//! and leaves the cursor at the first body token. Every `read_*` call then
//! consumes exactly one token. Because the body is not length-prefixed per
//! object, callers drive the cursor from the declared type at each position.

use std::hash::Hash;
use std::str::FromStr;

use crate::error::WireError;
use crate::grammar::{tokenize, unescape, Flags, SEPARATOR, SERIALIZATION_STREAM_VERSION};
use crate::table::{ObjectTable, StringTable};

/// What an object-reference token resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectToken<K> {
    /// `0`: a null reference.
    Null,
    /// A negative token: an object decoded earlier in this stream.
    BackRef(K),
    /// A positive token: the serialized type string of a new instance whose
    /// body follows.
    New(String),
}

/// Stateful reader over one message.
///
/// `K` is the caller's object identity, recorded with [`StreamReader::remember`]
/// so back-references can be resolved.
#[derive(Debug)]
pub struct StreamReader<'a, K> {
    tokens: Vec<&'a str>,
    pos: usize,
    version: i32,
    flags: Flags,
    strings: StringTable,
    objects: ObjectTable<K>,
}

/// Validate the header of `wire` and position a reader at the body.
///
/// The version is checked before anything else, so an incompatible peer is
/// reported as such even if the rest of its message would not parse or is
/// not terminated.
pub fn prepare_to_read<K: Copy + Eq + Hash>(wire: &str) -> Result<StreamReader<'_, K>, WireError> {
    let version_token = wire.split(SEPARATOR).next().unwrap_or(wire);
    if version_token.is_empty() {
        return Err(WireError::MalformedHeader("empty stream".to_string()));
    }
    let version: i32 = version_token
        .parse()
        .map_err(|_| WireError::MalformedHeader(format!("bad version token {version_token:?}")))?;
    if version != SERIALIZATION_STREAM_VERSION {
        return Err(WireError::IncompatibleVersion {
            found: version,
            expected: SERIALIZATION_STREAM_VERSION,
        });
    }

    let tokens = tokenize(wire)?;
    let flags_token = tokens
        .get(1)
        .ok_or_else(|| WireError::MalformedHeader("missing flags".to_string()))?;
    let flags: i32 = flags_token
        .parse()
        .map_err(|_| WireError::MalformedHeader(format!("bad flags token {flags_token:?}")))?;
    let flags = Flags::from_bits(flags)?;

    let count_token = tokens
        .get(2)
        .ok_or_else(|| WireError::MalformedHeader("missing string table size".to_string()))?;
    let count: usize = count_token.parse().map_err(|_| {
        WireError::MalformedHeader(format!("bad string table size {count_token:?}"))
    })?;
    let body_start = 3usize
        .checked_add(count)
        .filter(|end| *end <= tokens.len())
        .ok_or_else(|| {
            WireError::MalformedHeader(format!(
                "string table declares {count} entries but only {} tokens follow",
                tokens.len() - 3
            ))
        })?;

    let entries = tokens[3..body_start]
        .iter()
        .map(|raw| unescape(raw).map(|s| s.into_owned()))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::trace!(
        version,
        flags = flags.bits(),
        strings = entries.len(),
        body_tokens = tokens.len() - body_start,
        "prepared wire stream"
    );

    Ok(StreamReader {
        tokens,
        pos: body_start,
        version,
        flags,
        strings: StringTable::from_entries(entries),
        objects: ObjectTable::new(),
    })
}

impl<'a, K: Copy + Eq + Hash> StreamReader<'a, K> {
    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn strings(&self) -> &StringTable {
        &self.strings
    }

    /// Index of the next token to be read.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn has_remaining(&self) -> bool {
        self.pos < self.tokens.len()
    }

    /// Number of body tokens not yet consumed.
    pub fn remaining(&self) -> usize {
        self.tokens.len() - self.pos
    }

    /// Fail if any body token has not been consumed.
    pub fn expect_end(&self) -> Result<(), WireError> {
        match self.tokens.len() - self.pos {
            0 => Ok(()),
            n => Err(WireError::TrailingTokens(n)),
        }
    }

    // ── Raw tokens ────────────────────────────────────────────────────

    fn next_token(&mut self) -> Result<(usize, &'a str), WireError> {
        let pos = self.pos;
        let token = self
            .tokens
            .get(pos)
            .copied()
            .ok_or(WireError::UnexpectedEnd(pos))?;
        self.pos += 1;
        Ok((pos, token))
    }

    fn parse_next<T: FromStr>(&mut self, expected: &'static str) -> Result<T, WireError> {
        let (pos, token) = self.next_token()?;
        token.parse().map_err(|_| WireError::InvalidToken {
            pos,
            expected,
            token: token.to_string(),
        })
    }

    // ── Primitives ────────────────────────────────────────────────────

    pub fn read_bool(&mut self) -> Result<bool, WireError> {
        let (pos, token) = self.next_token()?;
        match token {
            "1" => Ok(true),
            "0" => Ok(false),
            other => Err(WireError::InvalidToken {
                pos,
                expected: "boolean",
                token: other.to_string(),
            }),
        }
    }

    pub fn read_byte(&mut self) -> Result<i8, WireError> {
        self.parse_next("byte")
    }

    pub fn read_short(&mut self) -> Result<i16, WireError> {
        self.parse_next("short")
    }

    pub fn read_int(&mut self) -> Result<i32, WireError> {
        self.parse_next("int")
    }

    pub fn read_long(&mut self) -> Result<i64, WireError> {
        self.parse_next("long")
    }

    pub fn read_float(&mut self) -> Result<f32, WireError> {
        self.parse_next("float")
    }

    pub fn read_double(&mut self) -> Result<f64, WireError> {
        self.parse_next("double")
    }

    /// A `char` travels as its decimal code point.
    pub fn read_char(&mut self) -> Result<char, WireError> {
        let (pos, token) = self.next_token()?;
        token
            .parse::<u32>()
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| WireError::InvalidToken {
                pos,
                expected: "char",
                token: token.to_string(),
            })
    }

    // ── Strings and objects ───────────────────────────────────────────

    /// Read a string-table index. Index 0 is `None`.
    pub fn read_string(&mut self) -> Result<Option<String>, WireError> {
        let index = self.read_int()?;
        Ok(self.strings.get(index)?.map(str::to_string))
    }

    /// Read a string that must be present.
    pub fn read_required_string(&mut self, what: &'static str) -> Result<String, WireError> {
        let pos = self.pos;
        self.read_string()?.ok_or(WireError::InvalidToken {
            pos,
            expected: what,
            token: "0".to_string(),
        })
    }

    /// Read an object reference token.
    ///
    /// For [`ObjectToken::New`] the caller must call [`remember`](Self::remember)
    /// before decoding the instance body if the instance is a heap object, so
    /// references from inside its own body resolve to it.
    pub fn read_object_token(&mut self) -> Result<ObjectToken<K>, WireError> {
        let pos = self.pos;
        let token = self.read_int()?;
        if token == 0 {
            return Ok(ObjectToken::Null);
        }
        if token < 0 {
            let slot = (-(token as i64) - 1) as usize;
            return self.objects.resolve(slot).map(ObjectToken::BackRef);
        }
        match self.strings.get(token)? {
            Some(type_string) => Ok(ObjectToken::New(type_string.to_string())),
            None => Err(WireError::InvalidToken {
                pos,
                expected: "type string",
                token: token.to_string(),
            }),
        }
    }

    /// Assign the next object slot to `key`.
    pub fn remember(&mut self, key: K) -> usize {
        self.objects.push(key)
    }

    pub fn objects_read(&self) -> usize {
        self.objects.len()
    }
}
