//! Payloads whose erased structure decodes but whose declared generic shape
//! does not hold. Requests are forged below the verifier, the way a hostile
//! client would build them.

use std::sync::atomic::{AtomicUsize, Ordering};

use mesh_rpc::{
    decode_request, parse_manifest, parse_type, Encoder, Heap, ResolvedMethod, RpcContext,
    RpcError, RpcServer, SerializationPolicy, Service, ServiceFault, TypeRule, Value,
};

const MANIFEST: &str = include_str!("fixtures/services.toml");

fn context() -> RpcContext {
    let registry = parse_manifest(MANIFEST).unwrap();
    let policy = SerializationPolicy::permissive(&registry, false);
    RpcContext::new(registry, policy)
}

/// Write a request without checking the arguments against anything.
/// `params` pairs each erased parameter type with the type the argument is
/// written as.
fn forge(ctx: &RpcContext, iface: &str, method: &str, params: &[(&str, &str)], heap: &Heap, args: &[Value]) -> String {
    let mut enc = Encoder::new(ctx);
    let flags = ctx.flags();
    enc.writer().write_string(Some(iface));
    enc.writer().write_string(Some(method));
    enc.writer().write_int(params.len() as i32);
    for (erased, _) in params {
        let ts = ctx.param_type_string(erased, flags).unwrap();
        enc.writer().write_string(Some(&ts));
    }
    for ((_, written), arg) in params.iter().zip(args) {
        let ty = parse_type(written, &[]).unwrap();
        enc.write_value(heap, &ty, arg).unwrap();
    }
    enc.finish()
}

fn rejection(ctx: &RpcContext, wire: &str) -> String {
    decode_request(ctx, wire, Some("Numbers")).unwrap_err().to_string()
}

struct Counting {
    calls: AtomicUsize,
}

impl Service for Counting {
    fn interface(&self) -> &str {
        "Numbers"
    }

    fn invoke(&self, _: &ResolvedMethod, _: &mut Heap, _: Vec<Value>) -> Result<Value, ServiceFault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Value::Long(0))
    }
}

#[test]
fn forbidden_element_never_reaches_the_service() {
    let ctx = context();
    let mut heap = Heap::new();
    let smuggled = heap.map("HashMap", vec![]);
    let list = heap.sequence("ArrayList", vec![Value::Int(1), smuggled]);
    let wire = forge(&ctx, "Numbers", "total", &[("List", "List")], &heap, &[list]);

    let server = RpcServer::new(ctx, Counting { calls: AtomicUsize::new(0) });
    let err = server.process_call(&wire).unwrap_err();
    assert_eq!(err.kind(), "shape");
    insta::assert_snapshot!(
        err.to_string(),
        @"type-shape violation at arg[0].element[1]: expected Integer, found HashMap"
    );
    assert_eq!(server.service().calls.load(Ordering::SeqCst), 0);

    // The same call with honest elements is dispatched.
    let mut heap = Heap::new();
    let list = heap.sequence("ArrayList", vec![Value::Int(1), Value::Int(2)]);
    let wire = forge(server.context(), "Numbers", "total", &[("List", "List")], &heap, &[list]);
    server.process_call(&wire).unwrap();
    assert_eq!(server.service().calls.load(Ordering::SeqCst), 1);
}

#[test]
fn raw_declarations_accept_any_element() {
    let ctx = context();
    let mut heap = Heap::new();
    let map = heap.map("HashMap", vec![]);
    let point = heap.object("Point", vec![Value::Int(0), Value::Int(0)]);
    let list = heap.sequence("ArrayList", vec![map, point, Value::string("s"), Value::Null]);
    let wire = forge(&ctx, "Numbers", "count", &[("List", "List")], &heap, &[list]);
    let request = decode_request(&ctx, &wire, Some("Numbers")).unwrap();
    assert_eq!(request.method_name(), "count");
}

#[test]
fn arrays_and_collections_do_not_substitute() {
    let ctx = context();
    let mut heap = Heap::new();

    let list = heap.sequence("ArrayList", vec![Value::Int(1)]);
    let wire = forge(&ctx, "Numbers", "first", &[("Integer[]", "Object")], &heap, &[list]);
    insta::assert_snapshot!(
        rejection(&ctx, &wire),
        @"type-shape violation at arg[0]: expected Integer[], found ArrayList"
    );

    let array = heap.array("Integer", vec![Value::Int(1)]);
    let wire = forge(&ctx, "Numbers", "total", &[("List", "Object")], &heap, &[array]);
    insta::assert_snapshot!(
        rejection(&ctx, &wire),
        @"type-shape violation at arg[0]: expected List<Integer>, found Integer[]"
    );

    let strings = heap.array("String", vec![Value::string("1")]);
    let wire = forge(&ctx, "Numbers", "first", &[("Integer[]", "Object")], &heap, &[strings]);
    insta::assert_snapshot!(
        rejection(&ctx, &wire),
        @"type-shape violation at arg[0]: expected Integer[], found String[]"
    );
}

#[test]
fn nested_generics_report_the_full_path() {
    let ctx = context();
    let mut heap = Heap::new();
    let good = heap.sequence("ArrayList", vec![Value::Int(1)]);
    let bad = heap.sequence("LinkedList", vec![Value::Int(1), Value::Long(2)]);
    let map = heap.map(
        "HashMap",
        vec![(Value::string("ok"), good), (Value::string("bad"), bad)],
    );
    let wire = forge(&ctx, "Numbers", "index", &[("Map", "Map")], &heap, &[map]);
    insta::assert_snapshot!(
        rejection(&ctx, &wire),
        @"type-shape violation at arg[0].value[1].element[1]: expected Integer, found Long"
    );

    let mut heap = Heap::new();
    let map = heap.map("HashMap", vec![(Value::Int(1), Value::Null)]);
    let wire = forge(&ctx, "Numbers", "index", &[("Map", "Map")], &heap, &[map]);
    insta::assert_snapshot!(
        rejection(&ctx, &wire),
        @"type-shape violation at arg[0].key[0]: expected String, found Integer"
    );
}

#[test]
fn generic_fields_are_checked_through_their_owner() {
    let ctx = context();
    let mut heap = Heap::new();
    let pair = heap.object("Pair", vec![Value::string("a"), Value::Int(1)]);
    let wire = forge(&ctx, "Numbers", "swap", &[("Pair", "Pair")], &heap, &[pair]);
    decode_request(&ctx, &wire, Some("Numbers")).unwrap();

    let mut heap = Heap::new();
    let pair = heap.object("Pair", vec![Value::Int(1), Value::Int(1)]);
    let wire = forge(&ctx, "Numbers", "swap", &[("Pair", "Pair")], &heap, &[pair]);
    insta::assert_snapshot!(
        rejection(&ctx, &wire),
        @"type-shape violation at arg[0].first: expected String, found Integer"
    );
}

#[test]
fn wildcards_and_method_type_variables() {
    let ctx = context();

    let mut heap = Heap::new();
    let numbers = heap.sequence("ArrayList", vec![Value::Int(1), Value::Double(2.5)]);
    let wire = forge(&ctx, "Numbers", "widen", &[("List", "List")], &heap, &[numbers.clone()]);
    decode_request(&ctx, &wire, Some("Numbers")).unwrap();
    let wire = forge(&ctx, "Numbers", "largest", &[("List", "List")], &heap, &[numbers]);
    decode_request(&ctx, &wire, Some("Numbers")).unwrap();

    let mut heap = Heap::new();
    let mixed = heap.sequence("ArrayList", vec![Value::Int(1), Value::string("two")]);
    let wire = forge(&ctx, "Numbers", "widen", &[("List", "List")], &heap, &[mixed.clone()]);
    insta::assert_snapshot!(
        rejection(&ctx, &wire),
        @"type-shape violation at arg[0].element[1]: expected Number, found String"
    );
    let wire = forge(&ctx, "Numbers", "largest", &[("List", "List")], &heap, &[mixed.clone()]);
    insta::assert_snapshot!(
        rejection(&ctx, &wire),
        @"type-shape violation at arg[0].element[1]: expected Number, found String"
    );

    // Lower-bounded wildcards admit any element.
    let wire = forge(&ctx, "Numbers", "fill", &[("List", "List")], &heap, &[mixed]);
    decode_request(&ctx, &wire, Some("Numbers")).unwrap();
}

#[test]
fn boxed_value_in_a_string_position_is_rejected() {
    let ctx = context();
    let heap = Heap::new();
    let wire = forge(&ctx, "Text", "echo", &[("String", "Object")], &heap, &[Value::Int(4)]);
    let err = decode_request(&ctx, &wire, Some("Text")).unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @"type-shape violation at arg[0]: expected String, found Integer"
    );
}

#[test]
fn rejection_classes_are_distinct() {
    let ctx = context();
    let mut heap = Heap::new();
    let point = heap.object("Point", vec![Value::Int(1), Value::Int(2)]);
    let wire = forge(&ctx, "Geometry", "shift", &[("Point", "Point"), ("int", "int")], &heap, &[point, Value::Int(1)]);
    decode_request(&ctx, &wire, Some("Geometry")).unwrap();

    // A receiver whose policy does not admit Point.
    let registry = parse_manifest(MANIFEST).unwrap();
    let policy = SerializationPolicy::from_rules([("ArrayList".to_string(), TypeRule::both())]).unwrap();
    let strict = RpcContext::new(registry, policy);
    let err = decode_request(&strict, &wire, Some("Geometry")).unwrap_err();
    assert_eq!(err.kind(), "policy");
    insta::assert_snapshot!(err.to_string(), @"type `Point` is not allowed to be deserialized");

    // A receiver whose Point has a different field set.
    let skewed_manifest = MANIFEST.replace(
        r#"fields = [{ name = "x", type = "int" }, { name = "y", type = "int" }]"#,
        r#"fields = [{ name = "x", type = "long" }, { name = "y", type = "long" }]"#,
    );
    let registry = parse_manifest(&skewed_manifest).unwrap();
    let policy = SerializationPolicy::permissive(&registry, false);
    let skewed = RpcContext::new(registry, policy);
    let err = decode_request(&skewed, &wire, Some("Geometry")).unwrap_err();
    assert_eq!(err.kind(), "version-skew");
    assert!(matches!(err, RpcError::VersionSkew { ref type_name, .. } if type_name == "Point"));

    // A well-formed Point where a String is declared.
    let mut heap = Heap::new();
    let point = heap.object("Point", vec![Value::Int(1), Value::Int(2)]);
    let wire = forge(&ctx, "Text", "echo", &[("String", "Object")], &heap, &[point]);
    assert_eq!(decode_request(&ctx, &wire, Some("Text")).unwrap_err().kind(), "shape");
}

#[test]
fn declared_types_are_not_taken_from_the_wire() {
    // A request may name a parameter type the method does not have; that is
    // an incompatible call, not a reinterpretation of the argument.
    let ctx = context();
    let mut heap = Heap::new();
    let list = heap.sequence("ArrayList", vec![Value::Int(1)]);
    let wire = forge(&ctx, "Numbers", "total", &[("ArrayList", "List")], &heap, &[list]);
    let err = decode_request(&ctx, &wire, Some("Numbers")).unwrap_err();
    assert_eq!(err.kind(), "incompatible");
    insta::assert_snapshot!(
        err.to_string(),
        @"incompatible remote call: `Numbers` has no method `total(ArrayList)`"
    );
}
