//! The type registry: every class and interface a peer may name.
//!
//! A `ClassDef` records what the static type system knows about a class:
//! its type parameters, declared supertypes (with their type arguments),
//! its fields in wire order, and how its instances are laid out on the
//! wire. The registry answers the questions the codec and the verifier
//! need: assignability between erased names, how a supertype's type
//! arguments are expressed in a subtype's parameters, and the concrete
//! slots of an instantiable class.

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::ty::{Prim, TypeEnv, TypeExpr, TypeParam};

/// Hierarchies deeper than this are treated as cyclic.
const MAX_HIERARCHY_DEPTH: usize = 64;

/// Suffix that marks an array class name, `int[]`, `List[][]`.
pub const ARRAY_SUFFIX: &str = "[]";

/// The class every reference type is assignable to.
pub const OBJECT: &str = "Object";

/// What the server sends back when a call cannot be matched to a method.
pub const INCOMPATIBLE_EXCEPTION: &str = "IncompatibleRemoteServiceException";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("unknown class `{0}`")]
    UnknownClass(String),
    #[error("class `{0}` is declared more than once")]
    Duplicate(String),
    #[error("`{0}` is abstract or an interface and has no instances")]
    NotInstantiable(String),
    #[error("invalid declaration of `{class}`: {message}")]
    Invalid { class: String, message: String },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClassKind {
    Class,
    Abstract,
    Interface,
}

/// How instances of a class are laid out on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Layout {
    /// Declared fields, superclass fields first. A class with this layout
    /// and no fields of its own inherits its superclass's layout.
    Fields,
    /// A string-table index.
    String,
    /// A single primitive token.
    Boxed(Prim),
    /// An element count followed by that many elements of the given type.
    Sequence(TypeExpr),
    /// An entry count followed by alternating keys and values.
    Map(TypeExpr, TypeExpr),
}

impl Layout {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Layout::Fields => "fields",
            Layout::String => "string",
            Layout::Boxed(_) => "boxed",
            Layout::Sequence(_) => "sequence",
            Layout::Map(..) => "map",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeExpr,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: TypeExpr) -> Self {
        FieldDef {
            name: name.into(),
            ty,
        }
    }
}

/// A remote method declared on an interface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodDef {
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub params: Vec<TypeExpr>,
    pub returns: TypeExpr,
    pub throws: Vec<TypeExpr>,
}

impl MethodDef {
    pub fn new(name: impl Into<String>, params: Vec<TypeExpr>, returns: TypeExpr) -> Self {
        MethodDef {
            name: name.into(),
            type_params: Vec::new(),
            params,
            returns,
            throws: Vec::new(),
        }
    }

    pub fn with_type_params(mut self, type_params: Vec<TypeParam>) -> Self {
        self.type_params = type_params;
        self
    }

    pub fn with_throws(mut self, throws: Vec<TypeExpr>) -> Self {
        self.throws = throws;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassDef {
    pub name: String,
    pub kind: ClassKind,
    pub params: Vec<TypeParam>,
    /// Superclass (if any) and implemented interfaces, each with the type
    /// arguments this class passes to it.
    pub supertypes: Vec<TypeExpr>,
    pub fields: Vec<FieldDef>,
    pub layout: Layout,
    pub methods: Vec<MethodDef>,
}

impl ClassDef {
    pub fn class(name: impl Into<String>) -> Self {
        ClassDef {
            name: name.into(),
            kind: ClassKind::Class,
            params: Vec::new(),
            supertypes: Vec::new(),
            fields: Vec::new(),
            layout: Layout::Fields,
            methods: Vec::new(),
        }
    }

    pub fn interface(name: impl Into<String>) -> Self {
        ClassDef {
            kind: ClassKind::Interface,
            ..ClassDef::class(name)
        }
    }

    pub fn abstract_class(name: impl Into<String>) -> Self {
        ClassDef {
            kind: ClassKind::Abstract,
            ..ClassDef::class(name)
        }
    }

    pub fn params(mut self, params: &[&str]) -> Self {
        self.params = params.iter().map(|p| TypeParam::new(*p)).collect();
        self
    }

    pub fn extends(mut self, supertype: TypeExpr) -> Self {
        self.supertypes.push(supertype);
        self
    }

    pub fn field(mut self, name: &str, ty: TypeExpr) -> Self {
        self.fields.push(FieldDef::new(name, ty));
        self
    }

    pub fn layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn method(mut self, method: MethodDef) -> Self {
        self.methods.push(method);
        self
    }

    pub fn is_generic(&self) -> bool {
        !self.params.is_empty()
    }

    /// An environment in which this class's own parameters are open and
    /// bounded by their declarations.
    pub fn own_env(&self) -> TypeEnv {
        let mut env = TypeEnv::new();
        for p in &self.params {
            env.declare(p);
        }
        env
    }

    /// Map this class's parameters to the given arguments.
    pub fn bind_params(&self, args: &[TypeExpr]) -> FxHashMap<String, TypeExpr> {
        self.params
            .iter()
            .zip(args)
            .map(|(p, a)| (p.name.clone(), a.clone()))
            .collect()
    }
}

/// Type arguments a subclass passes to one of its supertypes, expressed in
/// the subclass's own type parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SuperView {
    /// Some class on the path extends a generic supertype raw.
    Raw,
    Args(Vec<TypeExpr>),
}

/// The concrete wire slots of an instantiable class.
#[derive(Debug, PartialEq)]
pub enum Shape<'r> {
    /// Every field with the class that declares it, superclass first.
    Fields(Vec<(&'r ClassDef, &'r FieldDef)>),
    String,
    Boxed(Prim),
    Sequence {
        owner: &'r ClassDef,
        element: &'r TypeExpr,
    },
    Map {
        owner: &'r ClassDef,
        key: &'r TypeExpr,
        value: &'r TypeExpr,
    },
    /// The erased component type.
    Array(TypeExpr),
}

/// If `name` is an array class, its component class name.
pub fn array_component(name: &str) -> Option<&str> {
    name.strip_suffix(ARRAY_SUFFIX)
}

/// The erased declared type corresponding to a runtime class name.
pub fn erased_type(name: &str) -> TypeExpr {
    if let Some(component) = array_component(name) {
        return TypeExpr::array(erased_type(component));
    }
    match Prim::from_name(name) {
        Some(p) => TypeExpr::Prim(p),
        None => TypeExpr::con(name),
    }
}

/// The erasure of `ty` under `env`: unresolved variables erase to their
/// first bound, or to `Object`.
pub fn erase(ty: &TypeExpr, env: &TypeEnv) -> String {
    erase_at(ty, env, 0)
}

fn erase_at(ty: &TypeExpr, env: &TypeEnv, depth: usize) -> String {
    match ty {
        TypeExpr::Prim(p) => p.name().to_string(),
        TypeExpr::Con(name) | TypeExpr::App(name, _) => name.clone(),
        TypeExpr::Var(_) if depth >= MAX_HIERARCHY_DEPTH => OBJECT.to_string(),
        TypeExpr::Var(v) => match env.binding(v) {
            Some(bound) => erase_at(bound, env, depth + 1),
            None => match env.bounds(v).and_then(|b| b.first()) {
                Some(first) => erase_at(first, env, depth + 1),
                None => OBJECT.to_string(),
            },
        },
        TypeExpr::Wildcard(w) => match &w.upper {
            Some(upper) => erase_at(upper, env, depth + 1),
            None => OBJECT.to_string(),
        },
        TypeExpr::Array(component) => {
            format!("{}{}", erase_at(component, env, depth + 1), ARRAY_SUFFIX)
        }
    }
}

// ---------------------------------------------------------------------------
// TypeRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    classes: FxHashMap<String, ClassDef>,
}

impl TypeRegistry {
    /// An empty registry. Most callers want [`TypeRegistry::with_builtins`].
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the library classes every peer knows: `Object`,
    /// `String`, the boxed primitives, the collection interfaces and their
    /// standard implementations, and the throwable hierarchy.
    pub fn with_builtins() -> Self {
        let mut reg = TypeRegistry::new();
        for def in builtin_classes() {
            reg.classes.insert(def.name.clone(), def);
        }
        reg
    }

    pub fn insert(&mut self, def: ClassDef) -> Result<(), RegistryError> {
        if self.classes.contains_key(&def.name) {
            return Err(RegistryError::Duplicate(def.name));
        }
        self.classes.insert(def.name.clone(), def);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ClassDef> {
        self.classes.get(name)
    }

    pub fn class(&self, name: &str) -> Result<&ClassDef, RegistryError> {
        self.get(name)
            .ok_or_else(|| RegistryError::UnknownClass(name.to_string()))
    }

    /// All declared classes, sorted by name.
    pub fn classes(&self) -> Vec<&ClassDef> {
        let mut all: Vec<&ClassDef> = self.classes.values().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Whether `name` is a declared class, a primitive, or an array of one.
    pub fn is_known(&self, name: &str) -> bool {
        match array_component(name) {
            Some(component) => self.is_known(component),
            None => {
                Prim::from_name(name).is_some_and(|p| p != Prim::Void)
                    || self.classes.contains_key(name)
            }
        }
    }

    pub fn is_generic(&self, name: &str) -> bool {
        self.get(name).is_some_and(ClassDef::is_generic)
    }

    pub fn is_interface(&self, name: &str) -> bool {
        self.get(name).is_some_and(|c| c.kind == ClassKind::Interface)
    }

    /// The first non-interface supertype.
    pub fn superclass(&self, name: &str) -> Option<&ClassDef> {
        let def = self.get(name)?;
        def.supertypes
            .iter()
            .filter_map(TypeExpr::class_name)
            .filter_map(|n| self.get(n))
            .find(|s| s.kind != ClassKind::Interface)
    }

    // ── Subtyping ─────────────────────────────────────────────────────

    /// Whether a value of runtime class `sub` may stand where `sup` is
    /// declared. Both are erased names.
    pub fn is_assignable(&self, sub: &str, sup: &str) -> bool {
        if sub == sup {
            return true;
        }
        match (array_component(sub), array_component(sup)) {
            (Some(sub_c), Some(sup_c)) => {
                // Primitive arrays are only assignable to themselves.
                if Prim::from_name(sub_c).is_some() || Prim::from_name(sup_c).is_some() {
                    return false;
                }
                return self.is_assignable(sub_c, sup_c);
            }
            (Some(_), None) => return sup == OBJECT,
            (None, Some(_)) => return false,
            (None, None) => {}
        }
        if Prim::from_name(sub).is_some() || Prim::from_name(sup).is_some() {
            return false;
        }
        if sup == OBJECT {
            return self.classes.contains_key(sub);
        }
        let mut seen = FxHashSet::default();
        let mut stack = vec![sub];
        while let Some(name) = stack.pop() {
            if !seen.insert(name) {
                continue;
            }
            let Some(def) = self.get(name) else { continue };
            for s in def.supertypes.iter().filter_map(TypeExpr::class_name) {
                if s == sup {
                    return true;
                }
                stack.push(s);
            }
        }
        false
    }

    /// The type arguments `sub` passes to its supertype `sup`, written in
    /// terms of `sub`'s own parameters. `None` when `sup` is not a
    /// supertype of `sub`.
    ///
    /// For `sub == sup` the result is `sub`'s parameters as variables.
    pub fn supertype_args(&self, sub: &str, sup: &str) -> Option<SuperView> {
        self.supertype_args_at(sub, sup, 0)
    }

    fn supertype_args_at(&self, sub: &str, sup: &str, depth: usize) -> Option<SuperView> {
        if depth > MAX_HIERARCHY_DEPTH {
            return None;
        }
        if array_component(sub).is_some() {
            return self.is_assignable(sub, sup).then(|| SuperView::Args(Vec::new()));
        }
        let def = self.get(sub)?;
        if sub == sup {
            return Some(SuperView::Args(
                def.params.iter().map(|p| TypeExpr::var(&p.name)).collect(),
            ));
        }
        for st in &def.supertypes {
            let Some(st_name) = st.class_name() else { continue };
            let st_args: &[TypeExpr] = match st {
                TypeExpr::App(_, args) => args,
                _ => &[],
            };
            let raw_step = st_args.is_empty() && self.is_generic(st_name);
            if st_name == sup {
                return Some(if raw_step {
                    SuperView::Raw
                } else {
                    SuperView::Args(st_args.to_vec())
                });
            }
            match self.supertype_args_at(st_name, sup, depth + 1) {
                None => continue,
                Some(SuperView::Raw) => return Some(SuperView::Raw),
                Some(SuperView::Args(args)) => {
                    if raw_step && args.iter().any(TypeExpr::has_vars) {
                        return Some(SuperView::Raw);
                    }
                    let Some(st_def) = self.get(st_name) else { continue };
                    let map = st_def.bind_params(st_args);
                    return Some(SuperView::Args(args.iter().map(|a| a.subst(&map)).collect()));
                }
            }
        }
        if sup == OBJECT {
            return Some(SuperView::Args(Vec::new()));
        }
        None
    }

    // ── Instances ─────────────────────────────────────────────────────

    /// The wire slots of an instance of `name`.
    pub fn instance_shape(&self, name: &str) -> Result<Shape<'_>, RegistryError> {
        if let Some(component) = array_component(name) {
            if !self.is_known(component) {
                return Err(RegistryError::UnknownClass(name.to_string()));
            }
            return Ok(Shape::Array(erased_type(component)));
        }
        let def = self.class(name)?;
        if def.kind != ClassKind::Class {
            return Err(RegistryError::NotInstantiable(name.to_string()));
        }

        let mut chain: Vec<&ClassDef> = Vec::new();
        let mut current = Some(def);
        while let Some(c) = current {
            let container = match &c.layout {
                Layout::Fields => None,
                Layout::String => return Ok(Shape::String),
                Layout::Boxed(p) => return Ok(Shape::Boxed(*p)),
                Layout::Sequence(element) => Some(Shape::Sequence { owner: c, element }),
                Layout::Map(key, value) => Some(Shape::Map { owner: c, key, value }),
            };
            if let Some(shape) = container {
                if let Some(sub) = chain.iter().find(|d| !d.fields.is_empty()) {
                    return Err(RegistryError::Invalid {
                        class: sub.name.clone(),
                        message: format!("fields cannot be added to container `{}`", c.name),
                    });
                }
                return Ok(shape);
            }
            chain.push(c);
            if chain.len() > MAX_HIERARCHY_DEPTH {
                return Err(RegistryError::Invalid {
                    class: name.to_string(),
                    message: "superclass chain is cyclic".to_string(),
                });
            }
            current = self.superclass(&c.name);
        }

        Ok(Shape::Fields(
            chain
                .iter()
                .rev()
                .flat_map(|c| c.fields.iter().map(move |f| (*c, f)))
                .collect(),
        ))
    }

    // ── Validation ────────────────────────────────────────────────────

    /// Check that every declaration refers only to known classes with the
    /// right number of type arguments, and that hierarchies are sound.
    pub fn validate(&self) -> Result<(), RegistryError> {
        for def in self.classes() {
            self.validate_class(def)?;
        }
        Ok(())
    }

    fn validate_class(&self, def: &ClassDef) -> Result<(), RegistryError> {
        let invalid = |message: String| RegistryError::Invalid {
            class: def.name.clone(),
            message,
        };

        let class_scope: Vec<&str> = def.params.iter().map(|p| p.name.as_str()).collect();
        let mut superclasses = 0;
        for st in &def.supertypes {
            let name = st
                .class_name()
                .ok_or_else(|| invalid(format!("supertype `{st}` is not a class")))?;
            self.check_type(def, &class_scope, st)?;
            let st_def = self.class(name)?;
            match (def.kind, st_def.kind) {
                (ClassKind::Interface, ClassKind::Interface) => {}
                (ClassKind::Interface, _) => {
                    return Err(invalid(format!("interface cannot extend class `{name}`")))
                }
                (_, ClassKind::Interface) => {}
                _ => superclasses += 1,
            }
        }
        if superclasses > 1 {
            return Err(invalid("more than one superclass".to_string()));
        }
        if self.is_assignable_strict(&def.name) {
            return Err(invalid("cyclic inheritance".to_string()));
        }

        for p in &def.params {
            for b in &p.bounds {
                self.check_type(def, &class_scope, b)?;
            }
        }
        for f in &def.fields {
            if f.ty == TypeExpr::void() {
                return Err(invalid(format!("field `{}` cannot be void", f.name)));
            }
            self.check_type(def, &class_scope, &f.ty)?;
        }
        match &def.layout {
            Layout::Sequence(e) => self.check_type(def, &class_scope, e)?,
            Layout::Map(k, v) => {
                self.check_type(def, &class_scope, k)?;
                self.check_type(def, &class_scope, v)?;
            }
            _ => {}
        }
        if def.kind == ClassKind::Class {
            self.instance_shape(&def.name)?;
        }
        for m in &def.methods {
            let mut scope = class_scope.clone();
            scope.extend(m.type_params.iter().map(|tp| tp.name.as_str()));
            for tp in &m.type_params {
                for b in &tp.bounds {
                    self.check_type(def, &scope, b)?;
                }
            }
            for ty in m.params.iter().chain(&m.throws) {
                if ty == &TypeExpr::void() {
                    return Err(invalid(format!("`{}` has a void parameter", m.name)));
                }
                self.check_type(def, &scope, ty)?;
            }
            self.check_type(def, &scope, &m.returns)?;
        }
        Ok(())
    }

    /// Whether `name` reaches itself through its supertypes.
    fn is_assignable_strict(&self, name: &str) -> bool {
        let Some(def) = self.get(name) else { return false };
        def.supertypes
            .iter()
            .filter_map(TypeExpr::class_name)
            .any(|s| self.is_assignable(s, name))
    }

    /// `scope` holds the type variables `ty` may mention.
    fn check_type(&self, owner: &ClassDef, scope: &[&str], ty: &TypeExpr) -> Result<(), RegistryError> {
        let invalid = |message: String| RegistryError::Invalid {
            class: owner.name.clone(),
            message,
        };
        match ty {
            TypeExpr::Prim(_) => Ok(()),
            TypeExpr::Var(v) if scope.contains(&v.as_str()) => Ok(()),
            TypeExpr::Var(v) => Err(invalid(format!("type variable `{v}` is not in scope"))),
            TypeExpr::Con(name) => {
                self.class(name)?;
                Ok(())
            }
            TypeExpr::App(name, args) => {
                let def = self.class(name)?;
                if def.params.len() != args.len() {
                    return Err(invalid(format!(
                        "`{ty}` has {} type arguments but `{name}` takes {}",
                        args.len(),
                        def.params.len()
                    )));
                }
                args.iter().try_for_each(|a| self.check_type(owner, scope, a))
            }
            TypeExpr::Wildcard(w) => {
                if let Some(u) = &w.upper {
                    self.check_type(owner, scope, u)?;
                }
                if let Some(l) = &w.lower {
                    self.check_type(owner, scope, l)?;
                }
                Ok(())
            }
            TypeExpr::Array(component) => self.check_type(owner, scope, component),
        }
    }
}

// ---------------------------------------------------------------------------
// Built-in classes
// ---------------------------------------------------------------------------

fn comparable(arg: TypeExpr) -> TypeExpr {
    TypeExpr::app("Comparable", vec![arg])
}

fn builtin_classes() -> Vec<ClassDef> {
    let object = || TypeExpr::con(OBJECT);
    let e = || TypeExpr::var("E");
    let k = || TypeExpr::var("K");
    let v = || TypeExpr::var("V");

    let mut defs = vec![
        ClassDef::class(OBJECT),
        ClassDef::interface("Comparable").params(&["T"]),
        ClassDef::class("String")
            .extends(object())
            .extends(comparable(TypeExpr::string()))
            .layout(Layout::String),
        ClassDef::abstract_class("Number").extends(object()),
        ClassDef::interface("Collection").params(&["E"]),
        ClassDef::interface("List")
            .params(&["E"])
            .extends(TypeExpr::app("Collection", vec![e()])),
        ClassDef::interface("Set")
            .params(&["E"])
            .extends(TypeExpr::app("Collection", vec![e()])),
        ClassDef::interface("Map").params(&["K", "V"]),
        ClassDef::class("ArrayList")
            .params(&["E"])
            .extends(object())
            .extends(TypeExpr::list(e()))
            .layout(Layout::Sequence(e())),
        ClassDef::class("LinkedList")
            .params(&["E"])
            .extends(object())
            .extends(TypeExpr::list(e()))
            .layout(Layout::Sequence(e())),
        ClassDef::class("HashSet")
            .params(&["E"])
            .extends(object())
            .extends(TypeExpr::set(e()))
            .layout(Layout::Sequence(e())),
        ClassDef::class("HashMap")
            .params(&["K", "V"])
            .extends(object())
            .extends(TypeExpr::map(k(), v()))
            .layout(Layout::Map(k(), v())),
        ClassDef::class("LinkedHashMap")
            .params(&["K", "V"])
            .extends(TypeExpr::app("HashMap", vec![k(), v()])),
        ClassDef::class("Throwable")
            .extends(object())
            .field("message", TypeExpr::string()),
        ClassDef::class("Exception").extends(TypeExpr::con("Throwable")),
        ClassDef::class("RuntimeException").extends(TypeExpr::con("Exception")),
        ClassDef::class(INCOMPATIBLE_EXCEPTION).extends(TypeExpr::con("RuntimeException")),
    ];

    for p in Prim::ALL {
        let Some(boxed) = p.boxed_class() else { continue };
        let parent = match p {
            Prim::Bool | Prim::Char => object(),
            _ => TypeExpr::con("Number"),
        };
        defs.push(
            ClassDef::class(boxed)
                .extends(parent)
                .extends(comparable(TypeExpr::con(boxed)))
                .layout(Layout::Boxed(p)),
        );
    }
    defs
}
