//! Mesh RPC: object-graph codec and type-shape verification.
//!
//! Calls travel as [`mesh_wire`] token streams. This crate gives those
//! tokens meaning: it knows which classes exist and how their instances are
//! laid out ([`registry`]), which of them may cross the wire
//! ([`policy`]), how to turn a stream into a heap of objects and back
//! ([`codec`]), and whether a decoded value really has the generic shape
//! the called method declares ([`verify`]).
//!
//! Type erasure means the stream only names runtime classes. A `List` on
//! the wire says nothing about its elements, so every decoded argument is
//! checked against the full declared type before a [`Service`] sees it.
//!
//! ## Modules
//!
//! - [`ty`], [`parse`]: declared type expressions and their text syntax
//! - [`registry`]: classes, interfaces, layouts, subtyping
//! - [`signature`]: per-class version signatures
//! - [`policy`]: the serialization policy
//! - [`value`]: runtime values and the object heap
//! - [`codec`]: [`Decoder`] and [`Encoder`]
//! - [`verify`]: the type-shape verifier
//! - [`method`]: method resolution and the signature cache
//! - [`envelope`], [`service`]: requests, responses and dispatch
//! - [`manifest`]: TOML class and interface declarations

pub mod codec;
pub mod context;
pub mod envelope;
pub mod error;
pub mod manifest;
pub mod method;
pub mod parse;
pub mod policy;
pub mod registry;
pub mod service;
pub mod signature;
pub mod ty;
pub mod value;
pub mod verify;

pub use codec::{Decoder, Encoder};
pub use context::RpcContext;
pub use envelope::{
    decode_request, decode_response, encode_incompatible, encode_request, encode_response,
    Outcome, RpcRequest, RpcResponse,
};
pub use error::{ConfigError, PolicyViolation, RpcError, ShapeError};
pub use manifest::{load_manifest, parse_manifest, Manifest};
pub use method::{MethodCache, ResolvedMethod};
pub use parse::{parse_type, ParseTypeError};
pub use policy::{SerializationPolicy, TypeRule};
pub use registry::{ClassDef, ClassKind, Layout, MethodDef, TypeRegistry};
pub use service::{RpcServer, Service, ServiceFault};
pub use signature::Signatures;
pub use ty::{Prim, TypeEnv, TypeExpr, TypeParam};
pub use value::{graph_eq, Heap, ObjId, Value};
pub use verify::verify_value;
