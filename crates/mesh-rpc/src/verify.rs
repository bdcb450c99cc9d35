//! Type-shape verification of decoded values.
//!
//! The wire only carries erased class names, so a payload can claim to be
//! an `ArrayList` where `List<Integer>` is declared while holding anything
//! at all. The verifier walks the declared type and the value graph
//! together and rejects the value unless every generically typed slot
//! (fields, sequence elements, map keys and values, array elements) holds
//! something its declaration admits.
//!
//! For a declared `C<A1..An>` and a value of runtime class `R`:
//!
//! 1. `R` must be assignable to `C`.
//! 2. `R`'s type parameters are bound by walking `R`'s supertype path to
//!    `C` and matching the arguments found there against `A1..An`. A
//!    concrete argument on the path must be admitted by the declared
//!    argument; a parameter seen twice must bind consistently.
//! 3. Parameters left unbound fall back to their bounds.
//! 4. Every slot of `R` is checked against its declared type with those
//!    bindings substituted.
//!
//! A generic class named without arguments (a raw type) only gets step 1.
//! Each `(declared type, object)` pair is checked once per pass, which is
//! also what terminates cycles.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::codec::MAX_DEPTH;
use crate::error::ShapeError;
use crate::registry::{array_component, erase, erased_type, Shape, SuperView, TypeRegistry, OBJECT};
use crate::ty::{Prim, TypeEnv, TypeExpr, Wildcard};
use crate::value::{Heap, InstanceData, ObjId, Value};

/// Rounds of variable substitution before a binding chain counts as cyclic.
const MAX_VAR_DEPTH: usize = 32;

/// Check `value` against `declared` in `env`. `path` names the root, e.g.
/// `arg[0]`.
pub fn verify_value(
    registry: &TypeRegistry,
    heap: &Heap,
    env: &TypeEnv,
    declared: &TypeExpr,
    value: &Value,
    path: &str,
) -> Result<(), ShapeError> {
    Verifier::new(registry, heap, env).verify(declared, value, path)
}

pub struct Verifier<'a> {
    registry: &'a TypeRegistry,
    heap: &'a Heap,
    env: &'a TypeEnv,
    memo: FxHashSet<(TypeExpr, ObjId)>,
    nesting: usize,
}

fn violation(path: &str, expected: impl ToString, actual: impl Into<String>) -> ShapeError {
    let err = ShapeError {
        path: path.to_string(),
        expected: expected.to_string(),
        actual: actual.into(),
    };
    tracing::debug!(path = %err.path, expected = %err.expected, actual = %err.actual, "type-shape violation");
    err
}

impl<'a> Verifier<'a> {
    pub fn new(registry: &'a TypeRegistry, heap: &'a Heap, env: &'a TypeEnv) -> Self {
        Verifier {
            registry,
            heap,
            env,
            memo: FxHashSet::default(),
            nesting: 0,
        }
    }

    pub fn verify(&mut self, declared: &TypeExpr, value: &Value, path: &str) -> Result<(), ShapeError> {
        self.check(declared, value, path, 0)
    }

    fn describe(&self, value: &Value) -> String {
        match (value, self.heap.class_of(value)) {
            (Value::Null, _) => "null".to_string(),
            (_, Some(class)) => class.to_string(),
            (Value::Ref(id), None) => format!("dangling reference {}", id.0),
            (_, None) => "?".to_string(),
        }
    }

    // ── Value level ───────────────────────────────────────────────────

    fn check(&mut self, declared: &TypeExpr, value: &Value, path: &str, vars: usize) -> Result<(), ShapeError> {
        if let TypeExpr::Prim(p) = declared {
            let ok = match p {
                Prim::Void => value.is_null(),
                _ => value.prim() == Some(*p),
            };
            return if ok {
                Ok(())
            } else {
                Err(violation(path, declared, self.prim_or_class(value)))
            };
        }
        if value.is_null() {
            return Ok(());
        }

        match declared {
            TypeExpr::Prim(_) => Ok(()),
            TypeExpr::Var(v) => {
                if vars >= MAX_VAR_DEPTH {
                    return Err(violation(path, declared, "an unresolvable type variable"));
                }
                let env = self.env;
                if let Some(bound) = env.binding(v) {
                    return self.check(bound, value, path, vars + 1);
                }
                // A variable nothing declares has no bounds to check against.
                let Some(bounds) = env.bounds(v) else {
                    return Err(violation(path, declared, "an undeclared type variable"));
                };
                for b in bounds {
                    self.check(b, value, path, vars + 1)?;
                }
                Ok(())
            }
            TypeExpr::Wildcard(w) => match (&w.upper, &w.lower) {
                (Some(upper), _) => self.check(upper, value, path, vars + 1),
                (None, Some(lower)) => {
                    tracing::trace!(path, lower = %lower, "lower-bounded wildcard admits any reference");
                    Ok(())
                }
                (None, None) => Ok(()),
            },
            TypeExpr::Array(component) => self.check_array(declared, component, value, path),
            TypeExpr::Con(name) => self.check_class(declared, name, &[], value, path),
            TypeExpr::App(name, args) => self.check_class(declared, name, args, value, path),
        }
    }

    fn prim_or_class(&self, value: &Value) -> String {
        match value.prim() {
            Some(p) => p.name().to_string(),
            None => self.describe(value),
        }
    }

    fn runtime_class(&self, value: &Value, path: &str, declared: &TypeExpr) -> Result<String, ShapeError> {
        self.heap
            .class_of(value)
            .map(str::to_string)
            .ok_or_else(|| violation(path, declared, self.describe(value)))
    }

    /// Record `(declared, value)` as checked. Returns false if it already was.
    fn first_visit(&mut self, declared: &TypeExpr, value: &Value) -> bool {
        match value {
            Value::Ref(id) => self.memo.insert((declared.clone(), *id)),
            _ => true,
        }
    }

    fn enter(&mut self, path: &str, declared: &TypeExpr) -> Result<(), ShapeError> {
        self.nesting += 1;
        if self.nesting > MAX_DEPTH {
            return Err(violation(path, declared, "an object graph nested too deeply"));
        }
        Ok(())
    }

    fn check_array(
        &mut self,
        declared: &TypeExpr,
        component: &TypeExpr,
        value: &Value,
        path: &str,
    ) -> Result<(), ShapeError> {
        let class = self.runtime_class(value, path, declared)?;
        let Some(runtime_component) = array_component(&class) else {
            return Err(violation(path, declared, class));
        };
        let compatible = match (component, Prim::from_name(runtime_component)) {
            (TypeExpr::Prim(p), Some(q)) => *p == q,
            (TypeExpr::Prim(_), None) | (_, Some(_)) => false,
            (declared_component, None) => {
                let erased = erase(declared_component, self.env);
                self.registry.is_assignable(runtime_component, &erased)
            }
        };
        if !compatible {
            return Err(violation(path, declared, class));
        }
        if !self.first_visit(declared, value) {
            return Ok(());
        }
        self.check_elements(component, value, path, declared)
    }

    fn check_elements(
        &mut self,
        element: &TypeExpr,
        value: &Value,
        path: &str,
        declared: &TypeExpr,
    ) -> Result<(), ShapeError> {
        let Some(id) = value.as_ref_id() else { return Ok(()) };
        let heap = self.heap;
        let Some(instance) = heap.get(id) else {
            return Err(violation(path, declared, self.describe(value)));
        };
        let InstanceData::Elements(elements) = &instance.data else {
            return Err(violation(path, declared, format!("{} without elements", instance.class)));
        };
        self.enter(path, declared)?;
        for (i, e) in elements.iter().enumerate() {
            self.check(element, e, &format!("{path}.element[{i}]"), 0)?;
        }
        self.nesting -= 1;
        Ok(())
    }

    fn check_class(
        &mut self,
        declared: &TypeExpr,
        class_name: &str,
        args: &[TypeExpr],
        value: &Value,
        path: &str,
    ) -> Result<(), ShapeError> {
        let runtime = self.runtime_class(value, path, declared)?;
        let registry = self.registry;
        if !registry.is_assignable(&runtime, class_name) {
            return Err(violation(path, declared, runtime));
        }
        if args.is_empty() && registry.is_generic(class_name) {
            // Raw type: assignability is all that is checked.
            return Ok(());
        }
        if !self.first_visit(declared, value) {
            return Ok(());
        }

        if let Some(component) = array_component(&runtime) {
            // Only `Object` admits arrays here; check the elements against
            // the array's own component type.
            let component = erased_type(component);
            return self.check_elements(&component, value, path, declared);
        }

        let bindings = self.bind_runtime_params(declared, class_name, args, &runtime, path)?;
        self.check_slots(&runtime, &bindings, value, path, declared)
    }

    /// Bind the runtime class's type parameters from the declared arguments.
    fn bind_runtime_params(
        &self,
        declared: &TypeExpr,
        class_name: &str,
        args: &[TypeExpr],
        runtime: &str,
        path: &str,
    ) -> Result<FxHashMap<String, TypeExpr>, ShapeError> {
        let registry = self.registry;
        let Some(def) = registry.get(runtime) else {
            return Err(violation(path, declared, runtime));
        };
        let params: Vec<String> = def.params.iter().map(|p| p.name.clone()).collect();
        let mut bindings: FxHashMap<String, TypeExpr> = FxHashMap::default();

        if !args.is_empty() {
            match registry.supertype_args(runtime, class_name) {
                None => return Err(violation(path, declared, runtime)),
                Some(SuperView::Raw) => {
                    let all_unbounded = args.iter().all(|a| {
                        matches!(a, TypeExpr::Wildcard(Wildcard { upper: None, lower: None }))
                    });
                    if !all_unbounded {
                        return Err(violation(path, declared, format!("{runtime} (raw supertype)")));
                    }
                }
                Some(SuperView::Args(patterns)) => {
                    if patterns.len() != args.len() {
                        return Err(violation(path, declared, runtime));
                    }
                    for (pattern, arg) in patterns.iter().zip(args) {
                        if !self.bind_pattern(&params, pattern, arg, &mut bindings, 0) {
                            return Err(violation(path, declared, runtime));
                        }
                    }
                }
            }
        }

        for p in &def.params {
            if bindings.contains_key(&p.name) {
                continue;
            }
            let fallback = match p.bounds.first() {
                Some(b) if !params.iter().any(|r| b.mentions(r)) => b.clone(),
                Some(b) => TypeExpr::con(erase(b, &def.own_env())),
                None => TypeExpr::con(OBJECT),
            };
            bindings.insert(p.name.clone(), fallback);
        }
        Ok(bindings)
    }

    /// Match a supertype argument written in the runtime class's parameters
    /// against a declared argument. Returns false on mismatch or conflict.
    fn bind_pattern(
        &self,
        params: &[String],
        pattern: &TypeExpr,
        declared: &TypeExpr,
        bindings: &mut FxHashMap<String, TypeExpr>,
        depth: usize,
    ) -> bool {
        if depth > MAX_VAR_DEPTH {
            return false;
        }
        if let TypeExpr::Var(r) = pattern {
            if params.contains(r) {
                return match bindings.get(r) {
                    Some(existing) => {
                        self.env.resolve(existing, MAX_VAR_DEPTH)
                            == self.env.resolve(declared, MAX_VAR_DEPTH)
                    }
                    None => {
                        bindings.insert(r.clone(), declared.clone());
                        true
                    }
                };
            }
        }
        if !params.iter().any(|r| pattern.mentions(r)) {
            return self.arg_contains(declared, pattern, 0);
        }

        let declared = self.env.resolve(declared, MAX_VAR_DEPTH);
        match (pattern, &declared) {
            (TypeExpr::App(pn, ps), TypeExpr::App(dn, ds)) => {
                pn == dn
                    && ps.len() == ds.len()
                    && ps
                        .iter()
                        .zip(ds)
                        .all(|(p, d)| self.bind_pattern(params, p, d, bindings, depth + 1))
            }
            (TypeExpr::Array(p), TypeExpr::Array(d)) => {
                self.bind_pattern(params, p, d, bindings, depth + 1)
            }
            (_, TypeExpr::Wildcard(w)) => match &w.upper {
                Some(upper) => self.bind_pattern(params, pattern, upper, bindings, depth + 1),
                None => true,
            },
            // An open variable or a wildcard pattern leaves the parameters
            // to their bounds.
            (_, TypeExpr::Var(_)) | (TypeExpr::Wildcard(_), _) => true,
            _ => false,
        }
    }

    fn check_slots(
        &mut self,
        runtime: &str,
        bindings: &FxHashMap<String, TypeExpr>,
        value: &Value,
        path: &str,
        declared: &TypeExpr,
    ) -> Result<(), ShapeError> {
        let registry = self.registry;
        let shape = registry
            .instance_shape(runtime)
            .map_err(|e| violation(path, declared, e.to_string()))?;
        let heap = self.heap;
        let data = match value {
            Value::Ref(id) => match heap.get(*id) {
                Some(instance) => Some(&instance.data),
                None => return Err(violation(path, declared, self.describe(value))),
            },
            _ => None,
        };

        self.enter(path, declared)?;
        match (shape, data) {
            (Shape::String | Shape::Boxed(_), None) => {}
            (Shape::Fields(fields), Some(InstanceData::Fields(values))) if fields.len() == values.len() => {
                for ((owner, field), v) in fields.iter().zip(values) {
                    let ty = self.slot_type(runtime, &owner.name, &field.ty, bindings);
                    self.check(&ty, v, &format!("{path}.{}", field.name), 0)?;
                }
            }
            (Shape::Sequence { owner, element }, Some(InstanceData::Elements(values))) => {
                let ty = self.slot_type(runtime, &owner.name, element, bindings);
                for (i, v) in values.iter().enumerate() {
                    self.check(&ty, v, &format!("{path}.element[{i}]"), 0)?;
                }
            }
            (Shape::Map { owner, key, value: val }, Some(InstanceData::Entries(entries))) => {
                let key_ty = self.slot_type(runtime, &owner.name, key, bindings);
                let value_ty = self.slot_type(runtime, &owner.name, val, bindings);
                for (i, (k, v)) in entries.iter().enumerate() {
                    self.check(&key_ty, k, &format!("{path}.key[{i}]"), 0)?;
                    self.check(&value_ty, v, &format!("{path}.value[{i}]"), 0)?;
                }
            }
            _ => {
                return Err(violation(
                    path,
                    declared,
                    format!("{runtime} with contents that do not match its layout"),
                ))
            }
        }
        self.nesting -= 1;
        Ok(())
    }

    /// The type of a slot declared by `owner`, seen from `runtime` with the
    /// runtime class's parameters bound.
    fn slot_type(
        &self,
        runtime: &str,
        owner: &str,
        ty: &TypeExpr,
        bindings: &FxHashMap<String, TypeExpr>,
    ) -> TypeExpr {
        let registry = self.registry;
        let in_runtime = match (registry.get(owner), registry.supertype_args(runtime, owner)) {
            (Some(owner_def), Some(SuperView::Args(args))) => ty.subst(&owner_def.bind_params(&args)),
            (Some(owner_def), _) => {
                let env = owner_def.own_env();
                let erased: FxHashMap<String, TypeExpr> = owner_def
                    .params
                    .iter()
                    .map(|p| (p.name.clone(), TypeExpr::con(erase(&TypeExpr::var(&p.name), &env))))
                    .collect();
                ty.subst(&erased)
            }
            (None, _) => ty.clone(),
        };
        in_runtime.subst(bindings)
    }

    // ── Type level ────────────────────────────────────────────────────

    /// Whether the declared type argument admits the concrete argument
    /// `actual` (which contains no runtime-class variables).
    fn arg_contains(&self, declared: &TypeExpr, actual: &TypeExpr, depth: usize) -> bool {
        if depth > MAX_VAR_DEPTH {
            return false;
        }
        let declared = self.env.resolve(declared, MAX_VAR_DEPTH);
        let actual = self.env.resolve(actual, MAX_VAR_DEPTH);
        match (&declared, &actual) {
            (TypeExpr::Wildcard(d), TypeExpr::Wildcard(a)) => match (&d.upper, &d.lower) {
                (None, None) => true,
                (Some(du), _) => a
                    .upper
                    .as_deref()
                    .is_some_and(|au| self.is_subtype(au, du, depth + 1)),
                (None, Some(dl)) => a
                    .lower
                    .as_deref()
                    .is_some_and(|al| self.is_subtype(dl, al, depth + 1)),
            },
            (TypeExpr::Wildcard(d), _) => match (&d.upper, &d.lower) {
                (None, None) => true,
                (Some(upper), _) => self.is_subtype(&actual, upper, depth + 1),
                (None, Some(lower)) => self.is_subtype(lower, &actual, depth + 1),
            },
            (TypeExpr::Var(v), _) if declared != actual => match self.env.bounds(v) {
                Some(bounds) => {
                    let mut assume = FxHashMap::default();
                    assume.insert(v.clone(), actual.clone());
                    bounds
                        .iter()
                        .all(|b| self.is_subtype(&actual, &b.subst(&assume), depth + 1))
                }
                None => false,
            },
            _ => declared == actual,
        }
    }

    /// Subtyping between two declared types.
    fn is_subtype(&self, sub: &TypeExpr, sup: &TypeExpr, depth: usize) -> bool {
        if depth > MAX_VAR_DEPTH {
            return false;
        }
        let sub = self.env.resolve(sub, MAX_VAR_DEPTH);
        let sup = self.env.resolve(sup, MAX_VAR_DEPTH);
        if sub == sup {
            return true;
        }
        let registry = self.registry;
        match (&sub, &sup) {
            (_, TypeExpr::Con(name)) if name == OBJECT => !sub.is_primitive(),
            (TypeExpr::Prim(_), _) | (_, TypeExpr::Prim(_)) => false,
            (TypeExpr::Var(v), _) => self
                .env
                .bounds(v)
                .is_some_and(|bounds| bounds.iter().any(|b| self.is_subtype(b, &sup, depth + 1))),
            (TypeExpr::Wildcard(w), _) => w
                .upper
                .as_deref()
                .is_some_and(|u| self.is_subtype(u, &sup, depth + 1)),
            (TypeExpr::Array(a), TypeExpr::Array(b)) => {
                !a.is_primitive() && !b.is_primitive() && self.is_subtype(a, b, depth + 1)
            }
            (TypeExpr::Array(_), _) | (_, TypeExpr::Array(_)) => false,
            (TypeExpr::Con(s) | TypeExpr::App(s, _), TypeExpr::Con(c)) => registry.is_assignable(s, c),
            (TypeExpr::Con(s) | TypeExpr::App(s, _), TypeExpr::App(c, declared_args)) => {
                if !registry.is_assignable(s, c) {
                    return false;
                }
                let Some(SuperView::Args(patterns)) = registry.supertype_args(s, c) else {
                    return false;
                };
                let sub_args: &[TypeExpr] = match &sub {
                    TypeExpr::App(_, args) => args,
                    _ => &[],
                };
                let Some(s_def) = registry.get(s) else { return false };
                if sub_args.is_empty() && s_def.is_generic() {
                    // Raw subtype against a parameterized supertype.
                    return false;
                }
                let map = s_def.bind_params(sub_args);
                patterns.len() == declared_args.len()
                    && patterns
                        .iter()
                        .zip(declared_args)
                        .all(|(p, d)| self.arg_contains(d, &p.subst(&map), depth + 1))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ClassDef;
    use crate::ty::TypeParam;

    fn registry() -> TypeRegistry {
        let mut reg = TypeRegistry::with_builtins();
        reg.insert(
            ClassDef::class("IntList")
                .extends(TypeExpr::app("ArrayList", vec![TypeExpr::integer()])),
        )
        .unwrap();
        reg.insert(
            ClassDef::class("Box")
                .params(&["T"])
                .extends(TypeExpr::con(OBJECT))
                .field("item", TypeExpr::var("T")),
        )
        .unwrap();
        reg
    }

    fn check(reg: &TypeRegistry, heap: &Heap, declared: &TypeExpr, value: &Value) -> Result<(), ShapeError> {
        verify_value(reg, heap, &TypeEnv::new(), declared, value, "arg[0]")
    }

    #[test]
    fn list_of_integer_rejects_a_map_element() {
        let reg = registry();
        let mut heap = Heap::new();
        let bad = heap.map("HashMap", vec![]);
        let list = heap.sequence("ArrayList", vec![Value::Int(1), Value::Int(2), bad]);
        let err = check(&reg, &heap, &TypeExpr::list(TypeExpr::integer()), &list).unwrap_err();
        assert_eq!(
            err.to_string(),
            "type-shape violation at arg[0].element[2]: expected Integer, found HashMap"
        );
    }

    #[test]
    fn raw_declaration_accepts_anything_inside() {
        let reg = registry();
        let mut heap = Heap::new();
        let inner = heap.map("HashMap", vec![]);
        let list = heap.sequence("ArrayList", vec![Value::string("x"), inner]);
        check(&reg, &heap, &TypeExpr::con("List"), &list).unwrap();
        check(&reg, &heap, &TypeExpr::list(TypeExpr::unbounded()), &list).unwrap();
        check(&reg, &heap, &TypeExpr::con(OBJECT), &list).unwrap();
    }

    #[test]
    fn fixed_supertype_arguments_are_checked() {
        let reg = registry();
        let mut heap = Heap::new();
        let list = heap.sequence("IntList", vec![Value::Int(4)]);
        check(&reg, &heap, &TypeExpr::list(TypeExpr::integer()), &list).unwrap();
        check(&reg, &heap, &TypeExpr::list(TypeExpr::extends(TypeExpr::con("Number"))), &list).unwrap();
        assert!(check(&reg, &heap, &TypeExpr::list(TypeExpr::string()), &list).is_err());

        // Declared without arguments, the runtime class's own slots still count.
        let bad = heap.sequence("IntList", vec![Value::string("no")]);
        let err = check(&reg, &heap, &TypeExpr::con(OBJECT), &bad).unwrap_err();
        assert_eq!(err.path, "arg[0].element[0]");
    }

    #[test]
    fn nested_maps_report_the_full_path() {
        let reg = registry();
        let mut heap = Heap::new();
        let inner = heap.sequence("ArrayList", vec![Value::Double(1.0), Value::string("x")]);
        let map = heap.map("LinkedHashMap", vec![(Value::string("k"), inner)]);
        let declared = TypeExpr::map(
            TypeExpr::string(),
            TypeExpr::list(TypeExpr::extends(TypeExpr::con("Number"))),
        );
        let err = check(&reg, &heap, &declared, &map).unwrap_err();
        assert_eq!(err.path, "arg[0].value[0].element[1]");
        assert_eq!(err.expected, "Number");
        assert_eq!(err.actual, "String");
    }

    #[test]
    fn arrays_and_collections_do_not_substitute() {
        let reg = registry();
        let mut heap = Heap::new();
        let list = heap.sequence("ArrayList", vec![Value::Int(1)]);
        let array = heap.array("Integer", vec![Value::Int(1)]);
        let ints = heap.array("int", vec![Value::Int(1)]);
        assert!(check(&reg, &heap, &TypeExpr::array(TypeExpr::integer()), &list).is_err());
        assert!(check(&reg, &heap, &TypeExpr::list(TypeExpr::integer()), &array).is_err());
        assert!(check(&reg, &heap, &TypeExpr::array(TypeExpr::integer()), &ints).is_err());
        check(&reg, &heap, &TypeExpr::array(TypeExpr::integer()), &array).unwrap();
        check(&reg, &heap, &TypeExpr::array(TypeExpr::con("Number")), &array).unwrap();
        check(&reg, &heap, &TypeExpr::array(TypeExpr::int()), &ints).unwrap();
    }

    #[test]
    fn cycles_terminate() {
        let reg = registry();
        let mut heap = Heap::new();
        let b = heap.object("Box", vec![Value::Null]);
        let id = b.as_ref_id().unwrap();
        heap.set_field(id, 0, b.clone());
        let declared = TypeExpr::app("Box", vec![TypeExpr::con("Box")]);
        check(&reg, &heap, &declared, &b).unwrap();

        let list = heap.sequence("ArrayList", vec![]);
        let lid = list.as_ref_id().unwrap();
        heap.push_element(lid, list.clone());
        let declared = TypeExpr::list(TypeExpr::list(TypeExpr::unbounded()));
        check(&reg, &heap, &declared, &list).unwrap();
        check(&reg, &heap, &TypeExpr::con(OBJECT), &list).unwrap();
    }

    #[test]
    fn type_variables_resolve_through_the_environment() {
        let reg = registry();
        let mut heap = Heap::new();
        let list = heap.sequence("ArrayList", vec![Value::Int(1), Value::string("x")]);

        let mut env = TypeEnv::new();
        env.bind("T", TypeExpr::integer());
        let declared = TypeExpr::list(TypeExpr::var("T"));
        let err = verify_value(&reg, &heap, &env, &declared, &list, "arg[0]").unwrap_err();
        assert_eq!(err.path, "arg[0].element[1]");

        let mut env = TypeEnv::new();
        env.declare(&TypeParam::bounded(
            "C",
            vec![TypeExpr::app("Comparable", vec![TypeExpr::var("C")])],
        ));
        let declared = TypeExpr::var("C");
        verify_value(&reg, &heap, &env, &declared, &Value::Int(3), "arg[0]").unwrap();
        assert!(verify_value(&reg, &heap, &env, &declared, &list, "arg[0]").is_err());

        let mut env = TypeEnv::new();
        env.bind("A", TypeExpr::var("B"));
        env.bind("B", TypeExpr::var("A"));
        assert!(verify_value(&reg, &heap, &env, &TypeExpr::var("A"), &Value::Int(1), "arg[0]").is_err());
    }

    #[test]
    fn undeclared_type_variables_admit_nothing() {
        let reg = registry();
        let mut heap = Heap::new();
        let map = heap.map("HashMap", vec![]);
        let boxed = heap.object("Box", vec![map]);

        let err = check(&reg, &heap, &TypeExpr::var("Q"), &boxed).unwrap_err();
        assert_eq!(err.actual, "an undeclared type variable");

        let declared = TypeExpr::app("Box", vec![TypeExpr::var("Q")]);
        let err = check(&reg, &heap, &declared, &boxed).unwrap_err();
        assert_eq!(err.path, "arg[0].item");
        assert_eq!(err.expected, "Q");
    }

    #[test]
    fn lower_bounds_are_permissive() {
        let reg = registry();
        let mut heap = Heap::new();
        let list = heap.sequence("ArrayList", vec![Value::string("x")]);
        check(&reg, &heap, &TypeExpr::list(TypeExpr::super_of(TypeExpr::integer())), &list).unwrap();
    }

    #[test]
    fn primitives_must_match_exactly() {
        let reg = registry();
        let heap = Heap::new();
        check(&reg, &heap, &TypeExpr::int(), &Value::Int(1)).unwrap();
        let err = check(&reg, &heap, &TypeExpr::int(), &Value::Long(1)).unwrap_err();
        assert_eq!(err.actual, "long");
        assert!(check(&reg, &heap, &TypeExpr::int(), &Value::Null).is_err());
        check(&reg, &heap, &TypeExpr::integer(), &Value::Null).unwrap();
        assert!(check(&reg, &heap, &TypeExpr::string(), &Value::Int(1)).is_err());
    }
}
