//! Declared type expressions.
//!
//! A `TypeExpr` is what a method signature or a field declaration says a
//! value should be, with its full generic structure: parameterized classes,
//! type variables, wildcards with bounds, and arrays. Runtime values only
//! carry an erased class name; the verifier walks a `TypeExpr` in parallel
//! with a decoded value to close that gap.

use std::fmt;

use rustc_hash::FxHashMap;

/// A primitive (unboxed) type. Primitive positions on the wire hold a bare
/// token rather than an object reference.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Prim {
    /// Only valid as a return type: nothing is written.
    Void,
    Bool,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl Prim {
    pub const ALL: [Prim; 9] = [
        Prim::Void,
        Prim::Bool,
        Prim::Byte,
        Prim::Char,
        Prim::Short,
        Prim::Int,
        Prim::Long,
        Prim::Float,
        Prim::Double,
    ];

    /// The keyword used in type expressions and parameter type strings.
    pub fn name(self) -> &'static str {
        match self {
            Prim::Void => "void",
            Prim::Bool => "boolean",
            Prim::Byte => "byte",
            Prim::Char => "char",
            Prim::Short => "short",
            Prim::Int => "int",
            Prim::Long => "long",
            Prim::Float => "float",
            Prim::Double => "double",
        }
    }

    pub fn from_name(name: &str) -> Option<Prim> {
        Prim::ALL.into_iter().find(|p| p.name() == name)
    }

    /// The class a primitive is boxed into when it sits in a reference
    /// position (a list element, an `Object` field, ...).
    pub fn boxed_class(self) -> Option<&'static str> {
        match self {
            Prim::Void => None,
            Prim::Bool => Some("Boolean"),
            Prim::Byte => Some("Byte"),
            Prim::Char => Some("Character"),
            Prim::Short => Some("Short"),
            Prim::Int => Some("Integer"),
            Prim::Long => Some("Long"),
            Prim::Float => Some("Float"),
            Prim::Double => Some("Double"),
        }
    }
}

/// A wildcard type argument: `?`, `? extends U`, or `? super L`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Wildcard {
    pub upper: Option<Box<TypeExpr>>,
    pub lower: Option<Box<TypeExpr>>,
}

/// A declared type.
///
/// - `Prim`: a primitive
/// - `Con`: a class named without type arguments; for a generic class this
///   is the *raw* type
/// - `App`: a class applied to type arguments, `Map<String, Integer>`
/// - `Var`: a type variable of the enclosing class or method
/// - `Wildcard`: a wildcard argument
/// - `Array`: an array of the component type
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeExpr {
    Prim(Prim),
    Con(String),
    App(String, Vec<TypeExpr>),
    Var(String),
    Wildcard(Wildcard),
    Array(Box<TypeExpr>),
}

impl TypeExpr {
    pub fn prim(p: Prim) -> TypeExpr {
        TypeExpr::Prim(p)
    }

    pub fn int() -> TypeExpr {
        TypeExpr::Prim(Prim::Int)
    }

    pub fn void() -> TypeExpr {
        TypeExpr::Prim(Prim::Void)
    }

    pub fn con(name: impl Into<String>) -> TypeExpr {
        TypeExpr::Con(name.into())
    }

    pub fn app(name: impl Into<String>, args: Vec<TypeExpr>) -> TypeExpr {
        TypeExpr::App(name.into(), args)
    }

    pub fn var(name: impl Into<String>) -> TypeExpr {
        TypeExpr::Var(name.into())
    }

    pub fn array(component: TypeExpr) -> TypeExpr {
        TypeExpr::Array(Box::new(component))
    }

    /// `?`
    pub fn unbounded() -> TypeExpr {
        TypeExpr::Wildcard(Wildcard {
            upper: None,
            lower: None,
        })
    }

    /// `? extends upper`
    pub fn extends(upper: TypeExpr) -> TypeExpr {
        TypeExpr::Wildcard(Wildcard {
            upper: Some(Box::new(upper)),
            lower: None,
        })
    }

    /// `? super lower`
    pub fn super_of(lower: TypeExpr) -> TypeExpr {
        TypeExpr::Wildcard(Wildcard {
            upper: None,
            lower: Some(Box::new(lower)),
        })
    }

    /// `String`
    pub fn string() -> TypeExpr {
        TypeExpr::con("String")
    }

    /// `Integer`
    pub fn integer() -> TypeExpr {
        TypeExpr::con("Integer")
    }

    /// `List<T>`
    pub fn list(elem: TypeExpr) -> TypeExpr {
        TypeExpr::app("List", vec![elem])
    }

    /// `Set<T>`
    pub fn set(elem: TypeExpr) -> TypeExpr {
        TypeExpr::app("Set", vec![elem])
    }

    /// `Map<K, V>`
    pub fn map(key: TypeExpr, value: TypeExpr) -> TypeExpr {
        TypeExpr::app("Map", vec![key, value])
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, TypeExpr::Prim(_))
    }

    /// The class this expression names directly, if any.
    pub fn class_name(&self) -> Option<&str> {
        match self {
            TypeExpr::Con(name) | TypeExpr::App(name, _) => Some(name),
            _ => None,
        }
    }

    /// Whether any type variable occurs in this expression.
    pub fn has_vars(&self) -> bool {
        match self {
            TypeExpr::Var(_) => true,
            TypeExpr::Prim(_) | TypeExpr::Con(_) => false,
            TypeExpr::App(_, args) => args.iter().any(TypeExpr::has_vars),
            TypeExpr::Array(inner) => inner.has_vars(),
            TypeExpr::Wildcard(w) => {
                w.upper.as_deref().is_some_and(TypeExpr::has_vars)
                    || w.lower.as_deref().is_some_and(TypeExpr::has_vars)
            }
        }
    }

    /// Whether the named variable occurs in this expression.
    pub fn mentions(&self, var: &str) -> bool {
        match self {
            TypeExpr::Var(v) => v == var,
            TypeExpr::Prim(_) | TypeExpr::Con(_) => false,
            TypeExpr::App(_, args) => args.iter().any(|a| a.mentions(var)),
            TypeExpr::Array(inner) => inner.mentions(var),
            TypeExpr::Wildcard(w) => {
                w.upper.as_deref().is_some_and(|u| u.mentions(var))
                    || w.lower.as_deref().is_some_and(|l| l.mentions(var))
            }
        }
    }

    /// Replace variables found in `env`, in a single pass. Replacements are
    /// not themselves substituted again.
    pub fn subst(&self, env: &FxHashMap<String, TypeExpr>) -> TypeExpr {
        if env.is_empty() {
            return self.clone();
        }
        match self {
            TypeExpr::Var(v) => env.get(v).cloned().unwrap_or_else(|| self.clone()),
            TypeExpr::Prim(_) | TypeExpr::Con(_) => self.clone(),
            TypeExpr::App(name, args) => {
                TypeExpr::App(name.clone(), args.iter().map(|a| a.subst(env)).collect())
            }
            TypeExpr::Array(inner) => TypeExpr::Array(Box::new(inner.subst(env))),
            TypeExpr::Wildcard(w) => TypeExpr::Wildcard(Wildcard {
                upper: w.upper.as_ref().map(|u| Box::new(u.subst(env))),
                lower: w.lower.as_ref().map(|l| Box::new(l.subst(env))),
            }),
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Prim(p) => write!(f, "{}", p.name()),
            TypeExpr::Con(name) => write!(f, "{}", name),
            TypeExpr::App(name, args) => {
                write!(f, "{}<", name)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ">")
            }
            TypeExpr::Var(v) => write!(f, "{}", v),
            TypeExpr::Wildcard(w) => match (&w.upper, &w.lower) {
                (Some(u), _) => write!(f, "? extends {}", u),
                (None, Some(l)) => write!(f, "? super {}", l),
                (None, None) => write!(f, "?"),
            },
            TypeExpr::Array(inner) => write!(f, "{}[]", inner),
        }
    }
}

/// A declared type parameter with its upper bounds: `T extends A & B`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeParam {
    pub name: String,
    pub bounds: Vec<TypeExpr>,
}

impl TypeParam {
    pub fn new(name: impl Into<String>) -> Self {
        TypeParam {
            name: name.into(),
            bounds: Vec::new(),
        }
    }

    pub fn bounded(name: impl Into<String>, bounds: Vec<TypeExpr>) -> Self {
        TypeParam {
            name: name.into(),
            bounds,
        }
    }
}

impl fmt::Display for TypeParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for (i, b) in self.bounds.iter().enumerate() {
            if i == 0 {
                write!(f, " extends {}", b)?;
            } else {
                write!(f, " & {}", b)?;
            }
        }
        Ok(())
    }
}

/// Bindings and bounds for the type variables visible at a call site.
///
/// `bindings` holds variables resolved to a concrete argument (for instance
/// the `T` of `Echo<T>` when the service implements `Echo<Integer>`).
/// `bounds` holds variables left open, checked against their upper bounds.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TypeEnv {
    bindings: FxHashMap<String, TypeExpr>,
    bounds: FxHashMap<String, Vec<TypeExpr>>,
}

impl TypeEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, var: impl Into<String>, ty: TypeExpr) {
        let var = var.into();
        self.bounds.remove(&var);
        self.bindings.insert(var, ty);
    }

    /// Declare an open variable. Shadows any binding of the same name.
    pub fn declare(&mut self, param: &TypeParam) {
        self.bindings.remove(&param.name);
        self.bounds.insert(param.name.clone(), param.bounds.clone());
    }

    pub fn binding(&self, var: &str) -> Option<&TypeExpr> {
        self.bindings.get(var)
    }

    pub fn bounds(&self, var: &str) -> Option<&[TypeExpr]> {
        self.bounds.get(var).map(Vec::as_slice)
    }

    pub fn bindings(&self) -> &FxHashMap<String, TypeExpr> {
        &self.bindings
    }

    /// Substitute bindings until nothing bound remains, giving up after
    /// `limit` rounds. Open variables are left in place.
    pub fn resolve(&self, ty: &TypeExpr, limit: usize) -> TypeExpr {
        let mut current = ty.clone();
        for _ in 0..limit {
            let next = current.subst(&self.bindings);
            if next == current {
                break;
            }
            current = next;
        }
        current
    }
}
