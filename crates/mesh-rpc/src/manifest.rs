//! TOML manifests declaring the classes and interfaces of a service.
//!
//! ```toml
//! [[class]]
//! name = "Pair"
//! params = ["A", "B extends Comparable<B>"]
//! fields = [{ name = "first", type = "A" }, { name = "second", type = "B" }]
//!
//! [[class]]
//! name = "Bag"
//! params = ["E"]
//! implements = ["Collection<E>"]
//! layout = { kind = "sequence", element = "E" }
//!
//! [[interface]]
//! name = "Sum"
//! methods = [{ name = "add", params = ["int"], returns = "int" }]
//! ```
//!
//! Types are written in the syntax of [`crate::parse`]. Declared classes are
//! added on top of the built-in library types.

use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::parse::{parse_type, parse_type_params_in, ParseTypeError};
use crate::registry::{ClassDef, ClassKind, FieldDef, Layout, MethodDef, TypeRegistry, OBJECT};
use crate::ty::{TypeExpr, TypeParam};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default, rename = "class")]
    pub classes: Vec<ClassDecl>,
    #[serde(default, rename = "interface")]
    pub interfaces: Vec<InterfaceDecl>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassDecl {
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
    /// Superclass; `Object` when absent.
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub implements: Vec<String>,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
    #[serde(default)]
    pub layout: LayoutDecl,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LayoutDecl {
    #[default]
    Fields,
    Sequence {
        element: String,
    },
    Map {
        key: String,
        value: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterfaceDecl {
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub extends: Vec<String>,
    #[serde(default)]
    pub methods: Vec<MethodDecl>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MethodDecl {
    pub name: String,
    #[serde(default)]
    pub type_params: Vec<String>,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default = "void")]
    pub returns: String,
    #[serde(default)]
    pub throws: Vec<String>,
}

fn void() -> String {
    "void".to_string()
}

impl Manifest {
    pub fn from_str(content: &str) -> Result<Manifest, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Manifest, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str(&content)
    }

    /// Build and validate a registry of the built-ins plus every declaration.
    pub fn to_registry(&self) -> Result<TypeRegistry, ConfigError> {
        let mut registry = TypeRegistry::with_builtins();
        for decl in &self.classes {
            registry.insert(decl.to_class_def()?)?;
        }
        for decl in &self.interfaces {
            registry.insert(decl.to_class_def()?)?;
        }
        registry.validate()?;
        tracing::debug!(
            classes = self.classes.len(),
            interfaces = self.interfaces.len(),
            "loaded manifest"
        );
        Ok(registry)
    }
}

// ── Lowering ──────────────────────────────────────────────────────────

fn type_error(context: String) -> impl FnOnce(ParseTypeError) -> ConfigError {
    move |source| ConfigError::Type { context, source }
}

fn lower_params(owner: &str, decls: &[String], outer: &[&str]) -> Result<Vec<TypeParam>, ConfigError> {
    parse_type_params_in(decls, outer).map_err(type_error(format!("type parameters of `{owner}`")))
}

fn lower_type(src: &str, vars: &[&str], context: impl FnOnce() -> String) -> Result<TypeExpr, ConfigError> {
    parse_type(src, vars).map_err(|source| ConfigError::Type {
        context: context(),
        source,
    })
}

fn names(params: &[TypeParam]) -> Vec<&str> {
    params.iter().map(|p| p.name.as_str()).collect()
}

impl ClassDecl {
    fn to_class_def(&self) -> Result<ClassDef, ConfigError> {
        let name = &self.name;
        let params = lower_params(name, &self.params, &[])?;
        let vars = names(&params);

        let superclass = match &self.extends {
            Some(sup) => lower_type(sup, &vars, || format!("superclass of `{name}`"))?,
            None => TypeExpr::con(OBJECT),
        };
        let mut supertypes = Vec::with_capacity(1 + self.implements.len());
        if name != OBJECT {
            supertypes.push(superclass);
        }
        for iface in &self.implements {
            supertypes.push(lower_type(iface, &vars, || {
                format!("interface `{iface}` of `{name}`")
            })?);
        }

        let fields = self
            .fields
            .iter()
            .map(|f| {
                let ty = lower_type(&f.ty, &vars, || format!("field `{name}.{}`", f.name))?;
                Ok(FieldDef::new(f.name.clone(), ty))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let layout = match &self.layout {
            LayoutDecl::Fields => Layout::Fields,
            LayoutDecl::Sequence { element } => Layout::Sequence(lower_type(element, &vars, || {
                format!("element type of `{name}`")
            })?),
            LayoutDecl::Map { key, value } => Layout::Map(
                lower_type(key, &vars, || format!("key type of `{name}`"))?,
                lower_type(value, &vars, || format!("value type of `{name}`"))?,
            ),
        };

        let kind = if self.is_abstract {
            ClassKind::Abstract
        } else {
            ClassKind::Class
        };
        Ok(ClassDef {
            name: name.clone(),
            kind,
            params,
            supertypes,
            fields,
            layout,
            methods: Vec::new(),
        })
    }
}

impl InterfaceDecl {
    fn to_class_def(&self) -> Result<ClassDef, ConfigError> {
        let name = &self.name;
        let params = lower_params(name, &self.params, &[])?;
        let vars = names(&params);

        let mut def = ClassDef::interface(name.clone());
        for sup in &self.extends {
            def = def.extends(lower_type(sup, &vars, || {
                format!("super-interface `{sup}` of `{name}`")
            })?);
        }
        for m in &self.methods {
            def = def.method(m.to_method_def(name, &vars)?);
        }
        def.params = params;
        Ok(def)
    }
}

impl MethodDecl {
    fn to_method_def(&self, owner: &str, outer: &[&str]) -> Result<MethodDef, ConfigError> {
        let qualified = format!("{owner}.{}", self.name);
        let type_params = lower_params(&qualified, &self.type_params, outer)?;
        let mut vars = outer.to_vec();
        vars.extend(names(&type_params));

        let params = self
            .params
            .iter()
            .enumerate()
            .map(|(i, p)| lower_type(p, &vars, || format!("parameter {i} of `{qualified}`")))
            .collect::<Result<Vec<_>, _>>()?;
        let returns = lower_type(&self.returns, &vars, || format!("return type of `{qualified}`"))?;
        let throws = self
            .throws
            .iter()
            .map(|t| lower_type(t, &vars, || format!("failure type of `{qualified}`")))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MethodDef::new(self.name.clone(), params, returns)
            .with_type_params(type_params)
            .with_throws(throws))
    }
}

/// Parse manifest text into a validated registry.
pub fn parse_manifest(content: &str) -> Result<TypeRegistry, ConfigError> {
    Manifest::from_str(content)?.to_registry()
}

/// Read a manifest file into a validated registry.
pub fn load_manifest(path: &Path) -> Result<TypeRegistry, ConfigError> {
    Manifest::from_file(path)?.to_registry()
}
