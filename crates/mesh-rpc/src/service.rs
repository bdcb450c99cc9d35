//! Server-side dispatch: decode a call, hand it to a service, encode the
//! outcome.

use crate::context::RpcContext;
use crate::envelope::{decode_request, encode_incompatible, encode_response, Outcome, RpcRequest};
use crate::error::RpcError;
use crate::method::ResolvedMethod;
use crate::value::{Heap, Value};

/// How an invocation failed.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceFault {
    /// A thrown object allocated in the request heap. Sent to the caller
    /// when the method declares its type.
    Checked(Value),
    /// Anything else. Never sent to the caller.
    Unexpected(String),
}

/// An implementation of one remote interface.
pub trait Service: Send + Sync {
    /// The interface this service implements.
    fn interface(&self) -> &str;

    /// Run a verified call. `heap` holds the decoded arguments and receives
    /// any objects the result refers to.
    fn invoke(
        &self,
        method: &ResolvedMethod,
        heap: &mut Heap,
        args: Vec<Value>,
    ) -> Result<Value, ServiceFault>;
}

pub struct RpcServer<S> {
    ctx: RpcContext,
    service: S,
}

impl<S: Service> RpcServer<S> {
    pub fn new(ctx: RpcContext, service: S) -> Self {
        RpcServer { ctx, service }
    }

    pub fn context(&self) -> &RpcContext {
        &self.ctx
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Handle one request string and produce the response string.
    ///
    /// An incompatible call is answered with an
    /// `IncompatibleRemoteServiceException` failure; every other decode error
    /// is returned before the service runs.
    pub fn process_call(&self, wire: &str) -> Result<String, RpcError> {
        let interface = self.service.interface();
        let request = match decode_request(&self.ctx, wire, Some(interface)) {
            Ok(request) => request,
            Err(err @ RpcError::Incompatible { .. }) => {
                tracing::warn!(service = interface, error = %err, "rejecting incompatible call");
                return encode_incompatible(&self.ctx, &err.to_string());
            }
            Err(err) => {
                tracing::warn!(service = interface, kind = err.kind(), error = %err, "rejecting request");
                return Err(err);
            }
        };

        let RpcRequest {
            method,
            mut heap,
            args,
            ..
        } = request;
        tracing::debug!(method = %method.display_name(), "dispatching");
        let outcome = match self.service.invoke(&method, &mut heap, args) {
            Ok(value) => Outcome::Success(value),
            Err(ServiceFault::Checked(thrown)) => Outcome::Failure(thrown),
            Err(ServiceFault::Unexpected(message)) => {
                tracing::error!(method = %method.display_name(), %message, "service failed");
                return Err(RpcError::Unexpected(message));
            }
        };
        encode_response(&self.ctx, &method, &heap, &outcome)
    }
}
