//! Long-lived state shared by every call an endpoint handles.

use std::sync::Arc;

use mesh_wire::Flags;

use crate::error::RpcError;
use crate::method::{MethodCache, ResolvedMethod};
use crate::policy::SerializationPolicy;
use crate::registry::TypeRegistry;
use crate::signature::{split_type_string, Signatures};
use crate::ty::Prim;

/// Registry, policy, signatures and method cache for one endpoint.
///
/// Cloning is cheap; every clone shares the same immutable tables and the
/// same method cache.
#[derive(Debug, Clone)]
pub struct RpcContext {
    registry: Arc<TypeRegistry>,
    policy: Arc<SerializationPolicy>,
    signatures: Arc<Signatures>,
    methods: Arc<MethodCache>,
    elide_type_names: bool,
}

impl RpcContext {
    pub fn new(registry: TypeRegistry, policy: SerializationPolicy) -> Self {
        let signatures = Signatures::build(&registry);
        RpcContext {
            registry: Arc::new(registry),
            policy: Arc::new(policy),
            signatures: Arc::new(signatures),
            methods: Arc::new(MethodCache::new()),
            elide_type_names: false,
        }
    }

    /// Write obfuscated ids instead of class names in outgoing streams.
    pub fn with_elided_type_names(mut self, elide: bool) -> Self {
        self.elide_type_names = elide;
        self
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &SerializationPolicy {
        &self.policy
    }

    pub fn signatures(&self) -> &Signatures {
        &self.signatures
    }

    pub fn methods(&self) -> &MethodCache {
        &self.methods
    }

    pub fn flags(&self) -> Flags {
        Flags::NONE.with_elided_type_names(self.elide_type_names)
    }

    pub fn method(
        &self,
        interface: &str,
        name: &str,
        param_types: &[&str],
    ) -> Result<Arc<ResolvedMethod>, RpcError> {
        let param_types: Vec<String> = param_types.iter().map(|s| s.to_string()).collect();
        self.methods
            .resolve(&self.registry, interface, name, &param_types)
    }

    // ── Type strings ──────────────────────────────────────────────────

    /// The serialized type string of `class` for an outgoing stream.
    pub fn type_string(&self, class: &str, flags: Flags) -> Result<String, RpcError> {
        let signature = self
            .signatures
            .signature(class)
            .ok_or_else(|| RpcError::malformed(format!("no signature for unknown class `{class}`")))?;
        let name = if flags.elide_type_names() {
            self.policy.type_id_for(class)?
        } else {
            class.to_string()
        };
        Ok(format!("{name}/{signature}"))
    }

    /// The parameter type string of an erased parameter type. Primitives
    /// are written bare. Parameter types are often interfaces, which have no
    /// obfuscated id; those keep their name even when names are elided.
    pub fn param_type_string(&self, erased: &str, flags: Flags) -> Result<String, RpcError> {
        if Prim::from_name(erased).is_some() {
            return Ok(erased.to_string());
        }
        if flags.elide_type_names() && self.policy.type_id_for(erased).is_err() {
            return self.type_string(erased, Flags::NONE);
        }
        self.type_string(erased, flags)
    }

    /// Resolve a type string read from the wire to a class name.
    ///
    /// The class must be known locally and carry the local signature. With
    /// `check_policy`, it must also be deserializable.
    pub fn resolve_type_string(
        &self,
        type_string: &str,
        flags: Flags,
        check_policy: bool,
    ) -> Result<String, RpcError> {
        let (name, signature) = split_type_string(type_string).ok_or_else(|| {
            RpcError::malformed(format!("type string {type_string:?} has no signature"))
        })?;
        let class = match self.policy.type_for_id(name) {
            Ok(class) if flags.elide_type_names() => class,
            // Parameter types without an id travel under their own name.
            Err(_) if flags.elide_type_names() && !check_policy && self.registry.is_known(name) => {
                name.to_string()
            }
            Err(err) if flags.elide_type_names() => return Err(err.into()),
            _ => name.to_string(),
        };
        if !self.registry.is_known(&class) || Prim::from_name(&class).is_some() {
            return Err(RpcError::malformed(format!("unknown type `{class}`")));
        }
        if check_policy {
            self.policy.check_deserialize(&class)?;
        }
        let local = self
            .signatures
            .signature(&class)
            .ok_or_else(|| RpcError::malformed(format!("unknown type `{class}`")))?;
        if local != signature {
            tracing::debug!(class = %class, expected = %local, found = %signature, "version skew");
            return Err(RpcError::VersionSkew {
                type_name: class,
                expected: local,
                found: signature.to_string(),
            });
        }
        Ok(class)
    }

    /// Resolve a parameter type string: a bare primitive or a type string.
    pub fn resolve_param_type(&self, s: &str, flags: Flags) -> Result<String, RpcError> {
        match Prim::from_name(s) {
            Some(Prim::Void) => Err(RpcError::malformed("void parameter type")),
            Some(_) => Ok(s.to_string()),
            None => self.resolve_type_string(s, flags, false),
        }
    }
}
