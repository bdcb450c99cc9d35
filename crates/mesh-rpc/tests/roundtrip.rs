//! Requests and responses that survive a full encode/decode trip.

use mesh_rpc::value::InstanceData;
use mesh_rpc::{
    decode_request, decode_response, encode_request, encode_response, graph_eq, parse_manifest,
    Heap, ObjId, Outcome, RpcContext, SerializationPolicy, Value,
};
use mesh_wire::error::WireError;
use mesh_wire::SEPARATOR;

const MANIFEST: &str = include_str!("fixtures/services.toml");

fn context(elide: bool) -> RpcContext {
    let registry = parse_manifest(MANIFEST).unwrap();
    let policy = SerializationPolicy::permissive(&registry, elide);
    RpcContext::new(registry, policy).with_elided_type_names(elide)
}

fn fields(heap: &Heap, value: &Value) -> Vec<Value> {
    let id = value.as_ref_id().expect("not an object");
    match &heap.get(id).expect("dangling").data {
        InstanceData::Fields(values) => values.clone(),
        other => panic!("not a field object: {other:?}"),
    }
}

#[test]
fn cyclic_arguments_keep_identity() {
    let ctx = context(false);
    let relabel = ctx.method("Graph", "relabel", &["Node", "String"]).unwrap();

    let mut heap = Heap::new();
    let a = heap.object("Node", vec![Value::string("a"), Value::Null]);
    let b = heap.object("Node", vec![Value::string("b"), a.clone()]);
    heap.set_field(a.as_ref_id().unwrap(), 1, b.clone());
    let args = vec![a.clone(), Value::string("z")];

    let wire = encode_request(&ctx, &relabel, &heap, &args).unwrap();
    let request = decode_request(&ctx, &wire, Some("Graph")).unwrap();
    assert_eq!(request.method_name(), "relabel");
    assert_eq!(request.heap.len(), 2);
    assert!(graph_eq(&heap, &args[0], &request.heap, &request.args[0]));

    // The service relabels the node and returns it.
    let mut heap = request.heap;
    let node = request.args[0].as_ref_id().unwrap();
    heap.set_field(node, 0, Value::string("z"));
    let response = encode_response(&ctx, &relabel, &heap, &Outcome::Success(Value::Ref(node))).unwrap();
    let decoded = decode_response(&ctx, &relabel, &response).unwrap();

    let Outcome::Success(root) = &decoded.outcome else {
        panic!("expected success");
    };
    let root_fields = fields(&decoded.heap, root);
    assert_eq!(root_fields[0], Value::string("z"));
    let next = fields(&decoded.heap, &root_fields[1]);
    assert_eq!(next[0], Value::string("b"));
    assert_eq!(next[1], *root);
}

#[test]
fn self_reference_round_trips() {
    let ctx = context(false);
    let relabel = ctx.method("Graph", "relabel", &["Node", "String"]).unwrap();
    let mut heap = Heap::new();
    let node = heap.object("Node", vec![Value::string("loop"), Value::Null]);
    heap.set_field(node.as_ref_id().unwrap(), 1, node.clone());

    let wire = encode_request(&ctx, &relabel, &heap, &[node.clone(), Value::Null]).unwrap();
    let request = decode_request(&ctx, &wire, None).unwrap();
    assert_eq!(request.args[0], Value::Ref(ObjId(0)));
    assert_eq!(fields(&request.heap, &request.args[0])[1], Value::Ref(ObjId(0)));
    assert_eq!(request.args[1], Value::Null);
}

#[test]
fn strings_survive_escaping() {
    let ctx = context(false);
    let echo = ctx.method("Text", "echo", &["String"]).unwrap();
    let samples = [
        "Raw backslash \\",
        "\\!\\0",
        "split\u{1f}here",
        "nul\u{0}byte",
        "héllo wörld, 日本語 ✓",
        "",
    ];
    for s in samples {
        let heap = Heap::new();
        let wire = encode_request(&ctx, &echo, &heap, &[Value::string(s)]).unwrap();
        if s.contains(SEPARATOR) {
            assert!(!wire.contains(s), "separator leaked into {wire:?}");
        }
        let request = decode_request(&ctx, &wire, Some("Text")).unwrap();
        assert_eq!(request.args, vec![Value::string(s)], "request for {s:?}");

        let response = encode_response(&ctx, &echo, &request.heap, &Outcome::Success(request.args[0].clone())).unwrap();
        let decoded = decode_response(&ctx, &echo, &response).unwrap();
        assert_eq!(decoded.outcome, Outcome::Success(Value::string(s)));
    }
}

#[test]
fn null_string_is_not_an_empty_string() {
    let ctx = context(false);
    let echo = ctx.method("Text", "echo", &["String"]).unwrap();
    let wire = encode_request(&ctx, &echo, &Heap::new(), &[Value::Null]).unwrap();
    let request = decode_request(&ctx, &wire, None).unwrap();
    assert_eq!(request.args, vec![Value::Null]);
}

#[test]
fn containers_and_arrays_round_trip() {
    let ctx = context(false);
    let mut heap = Heap::new();

    let total = ctx.method("Numbers", "total", &["List"]).unwrap();
    let list = heap.sequence("ArrayList", vec![Value::Int(1), Value::Int(-2), Value::Null]);
    let wire = encode_request(&ctx, &total, &heap, &[list.clone()]).unwrap();
    let request = decode_request(&ctx, &wire, Some("Numbers")).unwrap();
    assert!(graph_eq(&heap, &list, &request.heap, &request.args[0]));

    let first = ctx.method("Numbers", "first", &["Integer[]"]).unwrap();
    let array = heap.array("Integer", vec![Value::Int(7), Value::Int(8)]);
    let wire = encode_request(&ctx, &first, &heap, &[array.clone()]).unwrap();
    let request = decode_request(&ctx, &wire, Some("Numbers")).unwrap();
    assert!(graph_eq(&heap, &array, &request.heap, &request.args[0]));

    let index = ctx.method("Numbers", "index", &["Map"]).unwrap();
    let inner = heap.sequence("LinkedList", vec![Value::Int(3)]);
    let map = heap.map(
        "LinkedHashMap",
        vec![(Value::string("k"), inner.clone()), (Value::string("again"), inner)],
    );
    let wire = encode_request(&ctx, &index, &heap, &[map.clone()]).unwrap();
    let request = decode_request(&ctx, &wire, Some("Numbers")).unwrap();
    assert!(graph_eq(&heap, &map, &request.heap, &request.args[0]));
    // The shared inner list is decoded once.
    assert_eq!(request.heap.len(), 2);

    let response = encode_response(&ctx, &index, &request.heap, &Outcome::Success(Value::Null)).unwrap();
    let decoded = decode_response(&ctx, &index, &response).unwrap();
    assert_eq!(decoded.outcome, Outcome::Success(Value::Null));
}

#[test]
fn elided_type_names_stay_off_the_wire() {
    let ctx = context(true);
    let shift = ctx.method("Geometry", "shift", &["Point", "int"]).unwrap();
    let mut heap = Heap::new();
    let point = heap.object("Point", vec![Value::Int(1), Value::Int(2)]);

    let wire = encode_request(&ctx, &shift, &heap, &[point.clone(), Value::Int(3)]).unwrap();
    assert!(!wire.contains("Point"));
    assert!(wire.contains("Geometry"));

    let request = decode_request(&ctx, &wire, Some("Geometry")).unwrap();
    assert!(graph_eq(&heap, &point, &request.heap, &request.args[0]));
    assert_eq!(request.args[1], Value::Int(3));
}

#[test]
fn version_mismatch_is_rejected_before_the_body() {
    let ctx = context(false);
    let echo = ctx.method("Text", "echo", &["String"]).unwrap();
    let wire = encode_request(&ctx, &echo, &Heap::new(), &[Value::string("x")]).unwrap();
    let stale = format!("6{}", &wire[1..]);

    let err = decode_request(&ctx, &stale, Some("Text")).unwrap_err();
    assert_eq!(
        err,
        mesh_rpc::RpcError::Format(WireError::IncompatibleVersion {
            found: 6,
            expected: 7
        })
    );
    insta::assert_snapshot!(
        err.to_string(),
        @"malformed stream: incompatible stream version 6 (this endpoint speaks version 7)"
    );
}

#[test]
fn trailing_tokens_are_rejected() {
    let ctx = context(false);
    let add = ctx.method("Sum", "add", &["int"]).unwrap();
    let wire = encode_request(&ctx, &add, &Heap::new(), &[Value::Int(1)]).unwrap();
    let padded = format!("{wire}0{SEPARATOR}");
    let err = decode_request(&ctx, &padded, None).unwrap_err();
    assert_eq!(err, mesh_rpc::RpcError::Format(WireError::TrailingTokens(1)));
}

#[test]
fn truncated_requests_are_rejected() {
    let ctx = context(false);
    let shift = ctx.method("Geometry", "shift", &["Point", "int"]).unwrap();
    let mut heap = Heap::new();
    let point = heap.object("Point", vec![Value::Int(1), Value::Int(2)]);
    let wire = encode_request(&ctx, &shift, &heap, &[point, Value::Int(3)]).unwrap();

    // Drop the last argument token.
    let cut = wire[..wire.len() - 1].rfind(SEPARATOR).unwrap() + 1;
    let err = decode_request(&ctx, &wire[..cut], None).unwrap_err();
    assert_eq!(err.kind(), "format");
}
