//! Dispatch through `RpcServer`, and loading manifests and policies from
//! disk.

use mesh_rpc::value::InstanceData;
use mesh_rpc::{
    decode_request, decode_response, encode_request, load_manifest, parse_manifest, Heap,
    Outcome, ResolvedMethod, RpcContext, RpcError, RpcServer, SerializationPolicy, Service,
    ServiceFault, Value,
};

const MANIFEST: &str = include_str!("fixtures/services.toml");

fn context() -> RpcContext {
    let registry = parse_manifest(MANIFEST).unwrap();
    let policy = SerializationPolicy::permissive(&registry, false);
    RpcContext::new(registry, policy)
}

type Handler = fn(&ResolvedMethod, &mut Heap, Vec<Value>) -> Result<Value, ServiceFault>;

struct FnService {
    interface: &'static str,
    handler: Handler,
}

impl Service for FnService {
    fn interface(&self) -> &str {
        self.interface
    }

    fn invoke(&self, method: &ResolvedMethod, heap: &mut Heap, args: Vec<Value>) -> Result<Value, ServiceFault> {
        (self.handler)(method, heap, args)
    }
}

struct Adder {
    base: i32,
}

impl Service for Adder {
    fn interface(&self) -> &str {
        "Sum"
    }

    fn invoke(&self, method: &ResolvedMethod, _: &mut Heap, args: Vec<Value>) -> Result<Value, ServiceFault> {
        match (method.name(), args.as_slice()) {
            ("add", [Value::Int(n)]) => Ok(Value::Int(self.base + n)),
            _ => Err(ServiceFault::Unexpected(format!("no handler for {}", method.display_name()))),
        }
    }
}

fn call(ctx: &RpcContext, server_wire: &str, iface: &str, name: &str, params: &[&str]) -> mesh_rpc::RpcResponse {
    let method = ctx.method(iface, name, params).unwrap();
    decode_response(ctx, &method, server_wire).unwrap()
}

#[test]
fn sum_adds_to_its_base() {
    let ctx = context();
    let server = RpcServer::new(ctx.clone(), Adder { base: 8 });

    let add = ctx.method("Sum", "add", &["int"]).unwrap();
    let request = encode_request(&ctx, &add, &Heap::new(), &[Value::Int(13)]).unwrap();
    let response = server.process_call(&request).unwrap();
    let decoded = decode_response(&ctx, &add, &response).unwrap();
    assert_eq!(decoded.outcome, Outcome::Success(Value::Int(21)));

    // The resolved method is cached and shared.
    assert!(!ctx.methods().is_empty());
}

#[test]
fn unrelated_interface_is_answered_with_incompatibility() {
    let ctx = context();
    let server = RpcServer::new(ctx.clone(), Adder { base: 8 });

    let echo = ctx.method("Text", "echo", &["String"]).unwrap();
    let request = encode_request(&ctx, &echo, &Heap::new(), &[Value::string("hi")]).unwrap();

    let err = decode_request(&ctx, &request, Some("Sum")).unwrap_err();
    assert_eq!(err.kind(), "incompatible");

    let response = server.process_call(&request).unwrap();
    let decoded = call(&ctx, &response, "Text", "echo", &["String"]);
    assert!(matches!(decoded.outcome, Outcome::Failure(_)));
    insta::assert_snapshot!(
        decoded.failure_message().unwrap(),
        @"incompatible remote call: `Sum` does not implement the requested interface `Text`"
    );
}

#[test]
fn unknown_method_is_answered_with_incompatibility() {
    let ctx = context();
    let server = RpcServer::new(ctx.clone(), Adder { base: 0 });

    let add = ctx.method("Sum", "add", &["int"]).unwrap();
    let request = encode_request(&ctx, &add, &Heap::new(), &[Value::Int(1)]).unwrap();
    let renamed = request.replace("add", "subtract");

    let response = server.process_call(&renamed).unwrap();
    let decoded = decode_response(&ctx, &add, &response).unwrap();
    insta::assert_snapshot!(
        decoded.failure_message().unwrap(),
        @"incompatible remote call: `Sum` has no method `subtract(int)`"
    );
}

fn reserve(_: &ResolvedMethod, heap: &mut Heap, args: Vec<Value>) -> Result<Value, ServiceFault> {
    const LIMIT: i32 = 3;
    match args.as_slice() {
        [Value::Int(n)] if *n <= LIMIT => Ok(Value::Int(LIMIT - n)),
        [Value::Int(_)] => Err(ServiceFault::Checked(heap.object(
            "QuotaExceeded",
            vec![Value::string(format!("quota of {LIMIT} exceeded")), Value::Int(LIMIT)],
        ))),
        _ => Err(ServiceFault::Unexpected("bad arguments".to_string())),
    }
}

#[test]
fn declared_failures_round_trip() {
    let ctx = context();
    let server = RpcServer::new(
        ctx.clone(),
        FnService {
            interface: "Quota",
            handler: reserve,
        },
    );
    let method = ctx.method("Quota", "reserve", &["int"]).unwrap();

    let ok = encode_request(&ctx, &method, &Heap::new(), &[Value::Int(2)]).unwrap();
    let decoded = decode_response(&ctx, &method, &server.process_call(&ok).unwrap()).unwrap();
    assert_eq!(decoded.outcome, Outcome::Success(Value::Int(1)));

    let over = encode_request(&ctx, &method, &Heap::new(), &[Value::Int(5)]).unwrap();
    let decoded = decode_response(&ctx, &method, &server.process_call(&over).unwrap()).unwrap();
    let Outcome::Failure(thrown) = &decoded.outcome else {
        panic!("expected a failure");
    };
    assert_eq!(decoded.heap.class_of(thrown), Some("QuotaExceeded"));
    assert_eq!(decoded.failure_message(), Some("quota of 3 exceeded"));
    let instance = decoded.heap.get(thrown.as_ref_id().unwrap()).unwrap();
    assert_eq!(
        instance.data,
        InstanceData::Fields(vec![Value::string("quota of 3 exceeded"), Value::Int(3)])
    );
}

#[test]
fn undeclared_failures_are_unexpected() {
    let ctx = context();
    let method = ctx.method("Quota", "reserve", &["int"]).unwrap();
    let request = encode_request(&ctx, &method, &Heap::new(), &[Value::Int(1)]).unwrap();

    let throws_runtime = RpcServer::new(
        ctx.clone(),
        FnService {
            interface: "Quota",
            handler: |_, heap, _| {
                Err(ServiceFault::Checked(
                    heap.object("RuntimeException", vec![Value::string("boom")]),
                ))
            },
        },
    );
    let err = throws_runtime.process_call(&request).unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @"unexpected failure: Quota.reserve(int) threw undeclared `RuntimeException`"
    );

    let crashes = RpcServer::new(
        ctx,
        FnService {
            interface: "Quota",
            handler: |_, _, _| Err(ServiceFault::Unexpected("disk on fire".to_string())),
        },
    );
    assert_eq!(
        crashes.process_call(&request).unwrap_err(),
        RpcError::Unexpected("disk on fire".to_string())
    );
}

#[test]
fn results_are_verified_before_they_are_sent() {
    let ctx = context();
    let server = RpcServer::new(
        ctx.clone(),
        FnService {
            interface: "Text",
            handler: |_, _, _| Ok(Value::Int(7)),
        },
    );
    let echo = ctx.method("Text", "echo", &["String"]).unwrap();
    let request = encode_request(&ctx, &echo, &Heap::new(), &[Value::string("x")]).unwrap();
    let err = server.process_call(&request).unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @"type-shape violation at return: expected String, found Integer"
    );
}

#[test]
fn format_errors_propagate_before_dispatch() {
    let ctx = context();
    let server = RpcServer::new(ctx, Adder { base: 0 });
    let err = server.process_call("7\u{1f}0\u{1f}").unwrap_err();
    assert_eq!(err.kind(), "format");
}

#[test]
fn manifests_and_policies_load_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let manifest_path = dir.path().join("services.toml");
    std::fs::write(&manifest_path, MANIFEST).unwrap();
    let registry = load_manifest(&manifest_path).unwrap();
    assert!(registry.is_interface("Quota"));

    let policy = SerializationPolicy::permissive(&registry, true);
    let policy_path = dir.path().join("policy.toml");
    std::fs::write(&policy_path, policy.to_toml_string().unwrap()).unwrap();
    let reloaded = SerializationPolicy::from_file(&policy_path).unwrap();
    assert_eq!(reloaded.len(), policy.len());
    assert!(reloaded.can_deserialize("QuotaExceeded"));
    assert_eq!(
        reloaded.type_id_for("Point").unwrap(),
        policy.type_id_for("Point").unwrap()
    );

    let missing = dir.path().join("absent.toml");
    let err = load_manifest(&missing).unwrap_err();
    assert!(err.to_string().starts_with("failed to read"));
}
