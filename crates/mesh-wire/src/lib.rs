//! Mesh RPC wire format.
//!
//! A Mesh RPC message is a single line-oriented text string made of tokens,
//! each terminated by [`SEPARATOR`]:
//!
//! ```text
//! <version> <flags> <N> <str1> ... <strN> <body tokens...>
//! ```
//!
//! The header carries the protocol version and a flag bitmask, followed by a
//! deduplicated string table. The body is a flat sequence of primitive
//! tokens, 1-based string-table indices, and object references. The body is
//! not self-describing: a reader must know, from the declared type at each
//! position, which kind of token comes next.
//!
//! ## Modules
//!
//! - [`grammar`]: constants, flags, and string-table escaping
//! - [`table`]: string interning and the object back-reference table
//! - [`reader`]: [`StreamReader`], the decoding cursor
//! - [`writer`]: [`StreamWriter`], the symmetric encoder
//! - [`error`]: [`WireError`]

pub mod error;
pub mod grammar;
pub mod reader;
pub mod table;
pub mod writer;

pub use error::WireError;
pub use grammar::{
    escape, unescape, Flags, ESCAPE, FLAG_ELIDE_TYPE_NAMES, SEPARATOR,
    SERIALIZATION_STREAM_VERSION,
};
pub use reader::{prepare_to_read, ObjectToken, StreamReader};
pub use table::{ObjectTable, StringTable};
pub use writer::{StreamWriter, WriteObject};
