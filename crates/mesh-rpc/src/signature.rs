//! Version signatures and serialized type strings.
//!
//! A class's signature is a hash of everything that determines its wire
//! shape: its name, its layout, the name and erased type of every field
//! including inherited ones, and recursively the shapes of the classes
//! those fields are declared as. Two peers that agree on a class's
//! signature agree on how its instances are written. The serialized type
//! string of a class is `name/signature`, or `id/signature` when type names
//! are elided.

use std::fmt::Write as _;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rustc_hash::{FxHashMap, FxHashSet};
use sha2::{Digest, Sha256};

use crate::registry::{array_component, erase, ClassKind, Shape, TypeRegistry};
use crate::ty::Prim;

/// Bytes of the SHA-256 digest kept in a signature.
const SIGNATURE_BYTES: usize = 9;

fn digest(input: &str) -> String {
    let hash = Sha256::digest(input.as_bytes());
    URL_SAFE_NO_PAD.encode(&hash[..SIGNATURE_BYTES])
}

/// Split a serialized type string into name (or id) and signature.
pub fn split_type_string(s: &str) -> Option<(&str, &str)> {
    let (name, sig) = s.rsplit_once('/')?;
    (!name.is_empty() && !sig.is_empty()).then_some((name, sig))
}

/// Precomputed signatures for every class in a registry.
#[derive(Debug, Clone, Default)]
pub struct Signatures {
    by_class: FxHashMap<String, String>,
}

impl Signatures {
    pub fn build(registry: &TypeRegistry) -> Self {
        let by_class = registry
            .classes()
            .into_iter()
            .map(|def| (def.name.clone(), class_signature(registry, &def.name)))
            .collect();
        Signatures { by_class }
    }

    /// The signature of a class or array class. Arrays hash their
    /// component's signature and are computed on demand.
    pub fn signature(&self, name: &str) -> Option<String> {
        if let Some(component) = array_component(name) {
            let inner = match Prim::from_name(component) {
                Some(p) => p.name().to_string(),
                None => self.signature(component)?,
            };
            return Some(digest(&format!("array\n{inner}\n")));
        }
        self.by_class.get(name).cloned()
    }

    /// `name/signature` for a known class.
    pub fn type_string(&self, name: &str) -> Option<String> {
        self.signature(name).map(|sig| format!("{name}/{sig}"))
    }
}

fn class_signature(registry: &TypeRegistry, name: &str) -> String {
    let mut input = String::new();
    describe_class(registry, name, &mut FxHashSet::default(), &mut input);
    digest(&input)
}

/// Append the shape of `name`, then the shape of every class its slots are
/// declared as. A class already described contributes only its name.
fn describe_class(registry: &TypeRegistry, name: &str, seen: &mut FxHashSet<String>, input: &mut String) {
    let _ = writeln!(input, "{name}");
    if !seen.insert(name.to_string()) {
        input.push_str("seen\n");
        return;
    }
    let Some(def) = registry.get(name) else {
        return;
    };
    let mut slots = Vec::new();
    match def.kind {
        ClassKind::Interface => input.push_str("interface\n"),
        ClassKind::Abstract => input.push_str("abstract\n"),
        ClassKind::Class => match registry.instance_shape(name) {
            Ok(Shape::Fields(fields)) => {
                input.push_str("fields\n");
                for (owner, field) in fields {
                    let ty = erase(&field.ty, &owner.own_env());
                    let _ = writeln!(input, "{}.{}:{}", owner.name, field.name, ty);
                    slots.push(ty);
                }
            }
            Ok(Shape::String) => input.push_str("string\n"),
            Ok(Shape::Boxed(p)) => {
                let _ = writeln!(input, "boxed:{}", p.name());
            }
            Ok(Shape::Sequence { owner, element }) => {
                let element = erase(element, &owner.own_env());
                let _ = writeln!(input, "sequence:{element}");
                slots.push(element);
            }
            Ok(Shape::Map { owner, key, value }) => {
                let env = owner.own_env();
                let (key, value) = (erase(key, &env), erase(value, &env));
                let _ = writeln!(input, "map:{key}:{value}");
                slots.extend([key, value]);
            }
            Ok(Shape::Array(_)) | Err(_) => input.push_str("invalid\n"),
        },
    }
    for slot in slots {
        let mut class = slot.as_str();
        while let Some(component) = array_component(class) {
            class = component;
        }
        if Prim::from_name(class).is_none() {
            describe_class(registry, class, seen, input);
        }
    }
}
