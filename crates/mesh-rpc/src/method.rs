//! Method resolution and the process-wide signature cache.
//!
//! A call names an interface, a method, and the erased types of its
//! parameters. Resolution finds the declaration (possibly inherited from a
//! super-interface) and builds the type environment its generic signature
//! is read in: the target interface's own parameters are open, the declaring
//! interface's parameters are bound to what the target passes up the
//! hierarchy, and the method's own type parameters are open on top.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::RpcError;
use crate::registry::{erase, ClassDef, ClassKind, MethodDef, SuperView, TypeRegistry};
use crate::ty::{TypeEnv, TypeExpr, TypeParam};

/// A method declaration with everything needed to check a call to it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMethod {
    /// The interface the call was made through.
    pub interface: String,
    /// The interface that declares the method.
    pub declaring: String,
    pub method: MethodDef,
    pub env: TypeEnv,
    /// Erased parameter types, as written in a request.
    pub param_types: Vec<String>,
}

impl ResolvedMethod {
    pub fn name(&self) -> &str {
        &self.method.name
    }

    pub fn returns(&self) -> &TypeExpr {
        &self.method.returns
    }

    /// `Iface.name(a, b)`
    pub fn display_name(&self) -> String {
        format!(
            "{}.{}({})",
            self.interface,
            self.method.name,
            self.param_types.join(", ")
        )
    }
}

type MethodKey = (String, String, Vec<String>);

/// Resolved methods keyed by interface, name and erased parameter types.
/// Entries are immutable once inserted; failures are not cached.
#[derive(Debug, Default)]
pub struct MethodCache {
    entries: RwLock<FxHashMap<MethodKey, Arc<ResolvedMethod>>>,
}

impl MethodCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn resolve(
        &self,
        registry: &TypeRegistry,
        interface: &str,
        name: &str,
        param_types: &[String],
    ) -> Result<Arc<ResolvedMethod>, RpcError> {
        let key = (interface.to_string(), name.to_string(), param_types.to_vec());
        if let Some(found) = self.entries.read().get(&key) {
            return Ok(Arc::clone(found));
        }

        let resolved = Arc::new(resolve_method(registry, interface, name, param_types)?);
        tracing::debug!(method = %resolved.display_name(), declaring = %resolved.declaring, "resolved method");
        let mut entries = self.entries.write();
        Ok(Arc::clone(entries.entry(key).or_insert(resolved)))
    }
}

/// The interface and all its super-interfaces, nearest first.
fn interface_hierarchy<'r>(registry: &'r TypeRegistry, interface: &'r ClassDef) -> Vec<&'r ClassDef> {
    let mut out = vec![interface];
    let mut i = 0;
    while i < out.len() {
        let supers: Vec<&ClassDef> = out[i]
            .supertypes
            .iter()
            .filter_map(TypeExpr::class_name)
            .filter_map(|n| registry.get(n))
            .collect();
        for s in supers {
            if !out.iter().any(|d| d.name == s.name) {
                out.push(s);
            }
        }
        i += 1;
    }
    out
}

/// The environment a method's signature is read in.
fn method_env(
    registry: &TypeRegistry,
    target: &ClassDef,
    declaring: &ClassDef,
    method: &MethodDef,
) -> TypeEnv {
    let mut env = TypeEnv::new();
    if target.name == declaring.name {
        for p in &target.params {
            env.declare(p);
        }
    } else {
        // The target's parameters are renamed so they cannot collide with
        // the declaring interface's.
        let rename: FxHashMap<String, TypeExpr> = target
            .params
            .iter()
            .map(|p| (p.name.clone(), TypeExpr::var(qualified(&target.name, &p.name))))
            .collect();
        for p in &target.params {
            env.declare(&TypeParam::bounded(
                qualified(&target.name, &p.name),
                p.bounds.iter().map(|b| b.subst(&rename)).collect(),
            ));
        }
        match registry.supertype_args(&target.name, &declaring.name) {
            Some(SuperView::Args(args)) if args.len() == declaring.params.len() => {
                for (p, a) in declaring.params.iter().zip(args) {
                    env.bind(p.name.clone(), a.subst(&rename));
                }
            }
            _ => {
                for p in &declaring.params {
                    env.declare(p);
                }
            }
        }
    }
    for tp in &method.type_params {
        env.declare(tp);
    }
    env
}

fn qualified(class: &str, param: &str) -> String {
    format!("{class}::{param}")
}

fn resolve_method(
    registry: &TypeRegistry,
    interface: &str,
    name: &str,
    param_types: &[String],
) -> Result<ResolvedMethod, RpcError> {
    let target = registry
        .get(interface)
        .ok_or_else(|| RpcError::incompatible(format!("unknown interface `{interface}`")))?;
    if target.kind != ClassKind::Interface {
        return Err(RpcError::incompatible(format!("`{interface}` is not an interface")));
    }

    for declaring in interface_hierarchy(registry, target) {
        for method in declaring.methods.iter().filter(|m| m.name == name) {
            if method.params.len() != param_types.len() {
                continue;
            }
            let env = method_env(registry, target, declaring, method);
            let erased: Vec<String> = method.params.iter().map(|p| erase(p, &env)).collect();
            if erased == param_types {
                return Ok(ResolvedMethod {
                    interface: interface.to_string(),
                    declaring: declaring.name.clone(),
                    method: method.clone(),
                    env,
                    param_types: erased,
                });
            }
        }
    }

    Err(RpcError::incompatible(format!(
        "`{interface}` has no method `{name}({})`",
        param_types.join(", ")
    )))
}
