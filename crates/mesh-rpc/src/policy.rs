//! Serialization policy: which types may cross the wire, in which
//! direction, and under which obfuscated id.
//!
//! A policy is loaded once per endpoint and shared read-only. Types with no
//! rule are denied in both directions. `String`, the boxed primitives, the
//! primitives themselves and `IncompatibleRemoteServiceException` are
//! always allowed; an array is allowed when its innermost component is.
//!
//! On disk a policy is a TOML table keyed by class name:
//!
//! ```toml
//! [types."ArrayList"]
//! serialize = true
//! deserialize = true
//! id = "T3"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, PolicyViolation};
use crate::registry::{array_component, ClassKind, TypeRegistry, INCOMPATIBLE_EXCEPTION};
use crate::ty::Prim;

/// Rule for one type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRule {
    #[serde(default)]
    pub serialize: bool,
    #[serde(default)]
    pub deserialize: bool,
    /// Stand-in for the class name when type names are elided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl TypeRule {
    pub fn both() -> Self {
        TypeRule {
            serialize: true,
            deserialize: true,
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PolicyFile {
    #[serde(default)]
    types: BTreeMap<String, TypeRule>,
}

#[derive(Debug, Clone, Default)]
pub struct SerializationPolicy {
    rules: BTreeMap<String, TypeRule>,
    by_id: FxHashMap<String, String>,
}

/// Types every policy permits.
fn always_allowed(name: &str) -> bool {
    name == "String"
        || name == INCOMPATIBLE_EXCEPTION
        || Prim::from_name(name).is_some()
        || Prim::ALL.iter().any(|p| p.boxed_class() == Some(name))
}

/// Strip every array level from a class name.
fn innermost(mut name: &str) -> (&str, usize) {
    let mut dims = 0;
    while let Some(component) = array_component(name) {
        name = component;
        dims += 1;
    }
    (name, dims)
}

impl SerializationPolicy {
    /// Build a policy from explicit rules. Obfuscated ids must be unique.
    pub fn from_rules(
        rules: impl IntoIterator<Item = (String, TypeRule)>,
    ) -> Result<Self, ConfigError> {
        let rules: BTreeMap<String, TypeRule> = rules.into_iter().collect();
        let mut by_id: FxHashMap<String, String> = FxHashMap::default();
        for (name, rule) in &rules {
            let Some(id) = &rule.id else { continue };
            if let Some(first) = by_id.insert(id.clone(), name.clone()) {
                return Err(ConfigError::DuplicateTypeId {
                    id: id.clone(),
                    first,
                    second: name.clone(),
                });
            }
        }
        Ok(SerializationPolicy { rules, by_id })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: PolicyFile = toml::from_str(content)?;
        Self::from_rules(file.types)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        let file = PolicyFile {
            types: self.rules.clone(),
        };
        Ok(toml::to_string(&file)?)
    }

    /// A policy allowing every instantiable class in `registry` both ways.
    /// With `with_ids`, classes get ids `T0`, `T1`, ... in name order.
    pub fn permissive(registry: &TypeRegistry, with_ids: bool) -> Self {
        let rules = registry
            .classes()
            .into_iter()
            .filter(|def| def.kind == ClassKind::Class)
            .enumerate()
            .map(|(n, def)| {
                let rule = TypeRule::both();
                let rule = if with_ids {
                    rule.with_id(format!("T{n}"))
                } else {
                    rule
                };
                (def.name.clone(), rule)
            });
        // Ids generated from distinct indices cannot collide.
        Self::from_rules(rules).unwrap_or_default()
    }

    pub fn rule(&self, name: &str) -> Option<&TypeRule> {
        self.rules.get(name)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn can_serialize(&self, name: &str) -> bool {
        let (name, _) = innermost(name);
        always_allowed(name) || self.rules.get(name).is_some_and(|r| r.serialize)
    }

    pub fn can_deserialize(&self, name: &str) -> bool {
        let (name, _) = innermost(name);
        always_allowed(name) || self.rules.get(name).is_some_and(|r| r.deserialize)
    }

    pub fn check_serialize(&self, name: &str) -> Result<(), PolicyViolation> {
        if self.can_serialize(name) {
            Ok(())
        } else {
            Err(PolicyViolation::NotSerializable(name.to_string()))
        }
    }

    pub fn check_deserialize(&self, name: &str) -> Result<(), PolicyViolation> {
        if self.can_deserialize(name) {
            Ok(())
        } else {
            Err(PolicyViolation::NotDeserializable(name.to_string()))
        }
    }

    /// The obfuscated id for `name`. Always-allowed types without a rule
    /// use their own name; arrays use their component's id plus `[]`.
    pub fn type_id_for(&self, name: &str) -> Result<String, PolicyViolation> {
        let (inner, dims) = innermost(name);
        let id = match self.rules.get(inner).and_then(|r| r.id.as_deref()) {
            Some(id) => id,
            None if always_allowed(inner) => inner,
            None => return Err(PolicyViolation::NoTypeId(name.to_string())),
        };
        Ok(format!("{id}{}", "[]".repeat(dims)))
    }

    /// The class name behind an obfuscated id.
    pub fn type_for_id(&self, id: &str) -> Result<String, PolicyViolation> {
        let (inner, dims) = innermost(id);
        let name = match self.by_id.get(inner) {
            Some(name) => name.as_str(),
            None if always_allowed(inner) => inner,
            None => return Err(PolicyViolation::UnknownTypeId(id.to_string())),
        };
        Ok(format!("{name}{}", "[]".repeat(dims)))
    }
}
