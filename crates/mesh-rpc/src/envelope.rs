//! Request and response envelopes.
//!
//! A request body is the interface name, the method name, the parameter
//! count, one type string per parameter, then the arguments. A response body
//! is a status token (`0` success, `1` failure) followed by the return value
//! or the thrown object. Every value is verified against the declared call
//! signature as soon as it is decoded, and before it is encoded.

use std::sync::Arc;

use crate::codec::{Decoder, Encoder};
use crate::context::RpcContext;
use crate::error::RpcError;
use crate::method::ResolvedMethod;
use crate::registry::{erase, INCOMPATIBLE_EXCEPTION};
use crate::ty::{Prim, TypeExpr};
use crate::value::{Heap, InstanceData, Value};
use crate::verify::verify_value;

const STATUS_SUCCESS: i32 = 0;
const STATUS_FAILURE: i32 = 1;

/// A decoded and verified call.
#[derive(Debug, Clone)]
pub struct RpcRequest {
    /// The interface named on the wire.
    pub interface: String,
    pub method: Arc<ResolvedMethod>,
    pub heap: Heap,
    pub args: Vec<Value>,
}

impl RpcRequest {
    pub fn method_name(&self) -> &str {
        self.method.name()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Value),
    /// A thrown object; always a reference to a `Throwable` in the heap.
    Failure(Value),
}

#[derive(Debug, Clone)]
pub struct RpcResponse {
    pub heap: Heap,
    pub outcome: Outcome,
}

impl RpcResponse {
    /// The `message` of a failure, when it carries one.
    pub fn failure_message(&self) -> Option<&str> {
        let Outcome::Failure(value) = &self.outcome else {
            return None;
        };
        let instance = self.heap.get(value.as_ref_id()?)?;
        match &instance.data {
            InstanceData::Fields(fields) => match fields.first()? {
                Value::String(s) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }
}

// ── Requests ──────────────────────────────────────────────────────────

/// Decode a request and verify every argument.
///
/// With `expected`, the call must be addressed to an interface `expected`
/// implements, and the method is resolved on `expected`.
pub fn decode_request(
    ctx: &RpcContext,
    wire: &str,
    expected: Option<&str>,
) -> Result<RpcRequest, RpcError> {
    let mut decoder = Decoder::new(ctx, wire)?;
    let flags = decoder.flags();
    let interface = decoder.reader().read_required_string("interface name")?;
    let method_name = decoder.reader().read_required_string("method name")?;

    let target = match expected {
        Some(expected) => {
            if !ctx.registry().is_assignable(expected, &interface) {
                return Err(RpcError::incompatible(format!(
                    "`{expected}` does not implement the requested interface `{interface}`"
                )));
            }
            expected
        }
        None => interface.as_str(),
    };

    let reader = decoder.reader();
    let pos = reader.position();
    let count = reader.read_int()?;
    let remaining = reader.remaining();
    let count = usize::try_from(count)
        .ok()
        .filter(|n| *n <= remaining)
        .ok_or_else(|| RpcError::malformed(format!("bad parameter count {count} at token {pos}")))?;

    let mut param_types = Vec::with_capacity(count);
    for _ in 0..count {
        let s = decoder.reader().read_required_string("parameter type")?;
        let resolved = ctx.resolve_param_type(&s, flags).map_err(|e| match e {
            RpcError::Malformed(_) => RpcError::incompatible_because(
                format!("cannot resolve parameter type {s:?} of `{method_name}`"),
                e,
            ),
            other => other,
        })?;
        param_types.push(resolved);
    }

    let method = ctx
        .methods()
        .resolve(ctx.registry(), target, &method_name, &param_types)?;
    tracing::debug!(method = %method.display_name(), "decoding request");

    let mut args = Vec::with_capacity(count);
    for (i, declared) in method.method.params.iter().enumerate() {
        let value = decoder.read_value(declared)?;
        verify_value(
            ctx.registry(),
            decoder.heap(),
            &method.env,
            declared,
            &value,
            &format!("arg[{i}]"),
        )?;
        args.push(value);
    }

    Ok(RpcRequest {
        interface,
        method,
        heap: decoder.finish()?,
        args,
    })
}

/// Encode a call to `method`, verifying the arguments first.
pub fn encode_request(
    ctx: &RpcContext,
    method: &ResolvedMethod,
    heap: &Heap,
    args: &[Value],
) -> Result<String, RpcError> {
    let params = &method.method.params;
    if params.len() != args.len() {
        return Err(RpcError::malformed(format!(
            "{} takes {} arguments, {} given",
            method.display_name(),
            params.len(),
            args.len()
        )));
    }
    for (i, (declared, value)) in params.iter().zip(args).enumerate() {
        verify_value(ctx.registry(), heap, &method.env, declared, value, &format!("arg[{i}]"))?;
    }

    let mut encoder = Encoder::new(ctx);
    let flags = ctx.flags();
    let w = encoder.writer();
    w.write_string(Some(&method.interface));
    w.write_string(Some(method.name()));
    w.write_int(len_token(params.len())?);
    for erased in &method.param_types {
        let ts = ctx.param_type_string(erased, flags)?;
        encoder.writer().write_string(Some(&ts));
    }
    for (declared, value) in params.iter().zip(args) {
        encoder.write_value(heap, declared, value)?;
    }
    Ok(encoder.finish())
}

fn len_token(n: usize) -> Result<i32, RpcError> {
    i32::try_from(n).map_err(|_| RpcError::malformed(format!("{n} parameters is too many")))
}

// ── Responses ─────────────────────────────────────────────────────────

/// The declared failure type a thrown object of class `class` is checked
/// against, if any.
fn failure_type(ctx: &RpcContext, method: &ResolvedMethod, class: &str) -> Option<TypeExpr> {
    if ctx.registry().is_assignable(class, INCOMPATIBLE_EXCEPTION) {
        return Some(TypeExpr::con(INCOMPATIBLE_EXCEPTION));
    }
    method
        .method
        .throws
        .iter()
        .find(|t| ctx.registry().is_assignable(class, &erase(t, &method.env)))
        .cloned()
}

fn check_failure(
    ctx: &RpcContext,
    method: &ResolvedMethod,
    heap: &Heap,
    value: &Value,
) -> Result<(), RpcError> {
    let class = match value {
        Value::Ref(_) => heap.class_of(value),
        _ => None,
    }
    .ok_or_else(|| {
        RpcError::Unexpected(format!("{} failed with a non-object", method.display_name()))
    })?;
    let declared = failure_type(ctx, method, class).ok_or_else(|| {
        RpcError::Unexpected(format!(
            "{} threw undeclared `{class}`",
            method.display_name()
        ))
    })?;
    verify_value(ctx.registry(), heap, &method.env, &declared, value, "failure")?;
    Ok(())
}

/// Encode the outcome of a call to `method`.
pub fn encode_response(
    ctx: &RpcContext,
    method: &ResolvedMethod,
    heap: &Heap,
    outcome: &Outcome,
) -> Result<String, RpcError> {
    let mut encoder = Encoder::new(ctx);
    match outcome {
        Outcome::Success(value) => {
            let returns = method.returns();
            verify_value(ctx.registry(), heap, &method.env, returns, value, "return")?;
            encoder.writer().write_int(STATUS_SUCCESS);
            if *returns != TypeExpr::Prim(Prim::Void) {
                encoder.write_value(heap, returns, value)?;
            }
        }
        Outcome::Failure(value) => {
            check_failure(ctx, method, heap, value)?;
            encoder.writer().write_int(STATUS_FAILURE);
            encoder.write_object(heap, value)?;
        }
    }
    Ok(encoder.finish())
}

/// A failure response carrying an `IncompatibleRemoteServiceException`.
pub fn encode_incompatible(ctx: &RpcContext, message: &str) -> Result<String, RpcError> {
    let mut heap = Heap::new();
    let thrown = heap.object(INCOMPATIBLE_EXCEPTION, vec![Value::string(message)]);
    let mut encoder = Encoder::new(ctx);
    encoder.writer().write_int(STATUS_FAILURE);
    encoder.write_object(&heap, &thrown)?;
    Ok(encoder.finish())
}

/// Decode the response to a call of `method`.
pub fn decode_response(
    ctx: &RpcContext,
    method: &ResolvedMethod,
    wire: &str,
) -> Result<RpcResponse, RpcError> {
    let mut decoder = Decoder::new(ctx, wire)?;
    let pos = decoder.reader().position();
    let outcome = match decoder.reader().read_int()? {
        STATUS_SUCCESS => {
            let returns = method.returns();
            let value = decoder.read_value(returns)?;
            verify_value(ctx.registry(), decoder.heap(), &method.env, returns, &value, "return")?;
            Outcome::Success(value)
        }
        STATUS_FAILURE => {
            let value = decoder.read_object()?;
            check_failure(ctx, method, decoder.heap(), &value)?;
            Outcome::Failure(value)
        }
        other => {
            return Err(RpcError::malformed(format!(
                "unknown response status {other} at token {pos}"
            )))
        }
    };
    Ok(RpcResponse {
        heap: decoder.finish()?,
        outcome,
    })
}
