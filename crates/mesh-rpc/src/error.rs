//! Error types for the RPC layer.
//!
//! `RpcError` is what a decode or encode pass returns. Each variant is a
//! distinct rejection class so callers can tell a corrupt stream from a
//! stale peer, a forbidden type, or a well-formed payload whose generic
//! structure is wrong. `ConfigError` covers loading manifests and policies
//! and never arises while handling a request.

use std::path::PathBuf;

use mesh_wire::error::WireError;
use thiserror::Error;

use crate::parse::ParseTypeError;
use crate::registry::RegistryError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RpcError {
    /// Corrupt, truncated, or incompatible-version stream.
    #[error("malformed stream: {0}")]
    Format(#[from] WireError),

    /// Structurally invalid content the token layer cannot see: an unknown
    /// type string, a non-instantiable class, a negative count.
    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("version skew for `{type_name}`: expected signature {expected}, found {found}")]
    VersionSkew {
        type_name: String,
        expected: String,
        found: String,
    },

    #[error(transparent)]
    Policy(#[from] PolicyViolation),

    #[error(transparent)]
    Shape(#[from] ShapeError),

    /// The call does not match the target interface or any of its methods.
    #[error("incompatible remote call: {message}")]
    Incompatible {
        message: String,
        #[source]
        cause: Option<Box<RpcError>>,
    },

    /// An application fault that the method does not declare.
    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl RpcError {
    pub fn malformed(message: impl Into<String>) -> Self {
        RpcError::Malformed(message.into())
    }

    pub fn incompatible(message: impl Into<String>) -> Self {
        RpcError::Incompatible {
            message: message.into(),
            cause: None,
        }
    }

    /// Wrap `cause` as the reason a call is incompatible.
    pub fn incompatible_because(message: impl Into<String>, cause: RpcError) -> Self {
        RpcError::Incompatible {
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    /// Short machine-readable name of the rejection class.
    pub fn kind(&self) -> &'static str {
        match self {
            RpcError::Format(_) | RpcError::Malformed(_) => "format",
            RpcError::VersionSkew { .. } => "version-skew",
            RpcError::Policy(_) => "policy",
            RpcError::Shape(_) => "shape",
            RpcError::Incompatible { .. } => "incompatible",
            RpcError::Unexpected(_) => "unexpected",
        }
    }
}

/// A type the serialization policy forbids in this direction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("type `{0}` is not allowed to be serialized")]
    NotSerializable(String),
    #[error("type `{0}` is not allowed to be deserialized")]
    NotDeserializable(String),
    #[error("type `{0}` has no obfuscated id")]
    NoTypeId(String),
    #[error("unknown obfuscated type id `{0}`")]
    UnknownTypeId(String),
}

/// A decoded value whose runtime structure does not match its declared
/// type. `path` locates it from the root of the call, e.g.
/// `arg[0].element[2].value`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("type-shape violation at {path}: expected {expected}, found {actual}")]
pub struct ShapeError {
    pub path: String,
    pub expected: String,
    pub actual: String,
}

/// Failure to load a manifest or policy.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("failed to write TOML: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("{context}: {source}")]
    Type {
        context: String,
        #[source]
        source: ParseTypeError,
    },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("obfuscated id `{id}` is assigned to both `{first}` and `{second}`")]
    DuplicateTypeId {
        id: String,
        first: String,
        second: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let shape = RpcError::from(ShapeError {
            path: "arg[0].element[1]".to_string(),
            expected: "Integer".to_string(),
            actual: "HashMap".to_string(),
        });
        assert_eq!(
            shape.to_string(),
            "type-shape violation at arg[0].element[1]: expected Integer, found HashMap"
        );
        assert_eq!(shape.kind(), "shape");

        let wrapped = RpcError::incompatible_because(
            "no method `add(int)` on `Sum`",
            RpcError::malformed("boom"),
        );
        assert_eq!(wrapped.kind(), "incompatible");
        let source = std::error::Error::source(&wrapped).map(|e| e.to_string());
        assert_eq!(source.as_deref(), Some("malformed payload: boom"));

        let skew = RpcError::VersionSkew {
            type_name: "Point".to_string(),
            expected: "aaa".to_string(),
            found: "bbb".to_string(),
        };
        assert_eq!(
            skew.to_string(),
            "version skew for `Point`: expected signature aaa, found bbb"
        );
        assert_eq!(
            RpcError::from(PolicyViolation::NotDeserializable("Secret".to_string())).kind(),
            "policy"
        );
    }
}
