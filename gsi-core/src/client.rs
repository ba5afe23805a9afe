//! # Protocol Dispatcher
//!
//! [`GsiClient`] owns the stubs synthesized from a schema, each bound to the shared transport of
//! its protocol, and executes them by operation id.
//!
//! ## Invocation
//!
//! 1. The arguments, a JSON object keyed by parameter name, are checked against the operation:
//!    unknown names, missing required parameters and mistyped scalars are rejected with
//!    [`DispatchError::InvalidArguments`] before anything is sent.
//! 2. The stub's transport serializes them for its protocol and performs the exchange.
//! 3. Transient transport failures (refused connections, request timeouts, HTTP 502/503/504,
//!    gRPC `UNAVAILABLE`, Neo4j transient errors) are retried with exponential backoff, for
//!    idempotent operations only. Everything else surfaces at once.
//! 4. The whole invocation, retries included, is bounded by a timeout, and can be aborted with
//!    a `CancellationToken`. Dropping the returned future aborts the in-flight request too.
//!
//! The client is cheap to clone and can be shared between tasks.
mod blocking;
mod options;

pub use blocking::BlockingClient;
pub use options::{InvokeOptions, RetryPolicy};

use crate::{
    BoxError,
    config::ClientConfig,
    schema::{Schema, SchemaOperation, TypeRef},
    stub::{BindError, ClientStub, StubDefinition, StubRegistry, UnsupportedTypeError, synthesize},
    transport::{
        CallError, InvocationError, Protocol, TransportError, TransportErrorKind,
        TransportInitError, Transports,
    },
};
use backon::Retryable;
use http_body::Body as HttpBody;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::{sync::Arc, time::Duration};
use tonic::transport::Channel;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error(transparent)]
    UnsupportedType(#[from] UnsupportedTypeError),
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error(transparent)]
    Transport(#[from] TransportInitError),
    #[error("Failed to start the client runtime: '{0}'")]
    Runtime(#[source] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Unknown operation '{0}'")]
    UnknownOperation(String),
    #[error("Invalid arguments for '{operation}': {reason}")]
    InvalidArguments { operation: String, reason: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Invocation(#[from] InvocationError),
    #[error("Invocation of '{0}' was cancelled")]
    Cancelled(String),
    #[error("Failed to decode the result of '{operation}': '{source}'")]
    Decode {
        operation: String,
        source: serde_json::Error,
    },
}

pub struct GsiClient<S = Channel> {
    stubs: Arc<StubRegistry<S>>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl<S> Clone for GsiClient<S> {
    fn clone(&self) -> Self {
        Self {
            stubs: Arc::clone(&self.stubs),
            timeout: self.timeout,
            retry: self.retry,
        }
    }
}

impl GsiClient<Channel> {
    /// Builds the transports described by `config`, then a client over them.
    pub fn from_config(schema: &Schema, config: &ClientConfig) -> Result<Self, InitError> {
        let transports = Transports::from_config(config)?;
        Ok(Self::new(schema, transports)?
            .with_timeout(config.timeout())
            .with_retry(config.retry_policy()))
    }
}

impl<S> GsiClient<S> {
    /// Synthesizes a stub for every operation of the schema and binds it to its transport.
    ///
    /// Fails if a type cannot be represented by its protocol, or if an operation's protocol
    /// has no transport.
    pub fn new(schema: &Schema, transports: Transports<S>) -> Result<Self, InitError> {
        let stubs = synthesize(schema)?.bind(&transports)?;

        tracing::info!(
            schema = schema.title(),
            operations = stubs.len(),
            protocols = ?transports.protocols(),
            "Client initialized"
        );

        Ok(Self {
            stubs: Arc::new(stubs),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        })
    }

    /// Default timeout of an invocation, retries included.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn stubs(&self) -> &StubRegistry<S> {
        &self.stubs
    }

    pub fn operation(&self, id: &str) -> Option<&SchemaOperation> {
        self.stubs.get(id).map(ClientStub::operation)
    }
}

impl<S> GsiClient<S>
where
    S: tonic::client::GrpcService<tonic::body::Body> + Clone,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    /// Invokes an operation with the client's default options.
    pub async fn invoke(&self, operation: &str, arguments: Value) -> Result<Value, DispatchError> {
        self.invoke_with(operation, arguments, InvokeOptions::default())
            .await
    }

    /// Invokes an operation and decodes its result.
    pub async fn invoke_as<T: DeserializeOwned>(
        &self,
        operation: &str,
        arguments: Value,
    ) -> Result<T, DispatchError> {
        let value = self.invoke(operation, arguments).await?;
        serde_json::from_value(value).map_err(|source| DispatchError::Decode {
            operation: operation.to_string(),
            source,
        })
    }

    pub async fn invoke_with(
        &self,
        operation: &str,
        arguments: Value,
        options: InvokeOptions,
    ) -> Result<Value, DispatchError> {
        let stub = self
            .stubs
            .get(operation)
            .ok_or_else(|| DispatchError::UnknownOperation(operation.to_string()))?;
        let arguments = validate_arguments(stub.definition(), arguments)?;

        let protocol = stub.definition().protocol();
        let timeout = options.timeout.unwrap_or(self.timeout);
        let retry = options.retry.unwrap_or(self.retry);
        let cancellation = options.cancellation.unwrap_or_default();

        let exchange = tokio::time::timeout(timeout, call_with_retry(stub, &arguments, retry));
        let outcome = tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                tracing::debug!(operation, "Invocation cancelled");
                return Err(DispatchError::Cancelled(operation.to_string()));
            }
            outcome = exchange => outcome,
        };

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(attribute(err, operation, protocol)),
            Err(_) => Err(TransportError {
                operation: operation.to_string(),
                protocol,
                kind: TransportErrorKind::Timeout,
                source: format!("no response within {} ms", timeout.as_millis()).into(),
            }
            .into()),
        }
    }
}

async fn call_with_retry<S>(
    stub: &ClientStub<S>,
    arguments: &Map<String, Value>,
    retry: RetryPolicy,
) -> Result<Value, CallError>
where
    S: tonic::client::GrpcService<tonic::body::Body> + Clone,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    let operation = stub.definition().id();
    let idempotent = stub.operation().idempotent;
    let mut attempt = 0usize;

    (|| {
        attempt += 1;
        tracing::debug!(operation, attempt, protocol = %stub.definition().protocol(), "Dispatching");
        stub.call(arguments)
    })
    .retry(retry.backoff())
    .when(|err: &CallError| idempotent && err.is_transient())
    .notify(|err: &CallError, delay: Duration| {
        tracing::warn!(operation, ?delay, error = ?err, "Transient failure, retrying");
    })
    .await
}

fn attribute(err: CallError, operation: &str, protocol: Protocol) -> DispatchError {
    let operation = operation.to_string();
    match err {
        CallError::Encode(reason) => DispatchError::InvalidArguments { operation, reason },
        CallError::Transport { kind, source } => TransportError {
            operation,
            protocol,
            kind,
            source,
        }
        .into(),
        CallError::Invocation {
            status,
            message,
            details,
        } => InvocationError {
            operation,
            protocol,
            status,
            message,
            details,
        }
        .into(),
    }
}

fn validate_arguments(
    definition: &StubDefinition,
    arguments: Value,
) -> Result<Map<String, Value>, DispatchError> {
    let invalid = |reason: String| DispatchError::InvalidArguments {
        operation: definition.id().to_string(),
        reason,
    };

    let arguments = match arguments {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => return Err(invalid(format!("expected a JSON object, got {other}"))),
    };

    let operation = &definition.operation;
    if let Some(unknown) = arguments.keys().find(|name| operation.param(name).is_none()) {
        return Err(invalid(format!("unknown argument '{unknown}'")));
    }

    for param in &operation.params {
        match arguments.get(&param.name) {
            None | Some(Value::Null) if param.required => {
                return Err(invalid(format!("missing required argument '{}'", param.name)));
            }
            Some(value) if !value.is_null() && !conforms(&param.ty, value) => {
                return Err(invalid(format!(
                    "argument '{}' should be of type {}, got {value}",
                    param.name, param.ty
                )));
            }
            _ => {}
        }
    }

    Ok(arguments)
}

/// Shallow structural check; named types are left to the server.
fn conforms(ty: &TypeRef, value: &Value) -> bool {
    match ty {
        TypeRef::String => value.is_string(),
        TypeRef::Integer => value.is_i64() || value.is_u64(),
        TypeRef::Number => value.is_number(),
        TypeRef::Boolean => value.is_boolean(),
        TypeRef::Bytes => value.is_string() || value.is_array(),
        TypeRef::Array(item) => value
            .as_array()
            .is_some_and(|items| items.iter().all(|v| conforms(item, v))),
        TypeRef::Map(inner) => value
            .as_object()
            .is_some_and(|map| map.values().all(|v| conforms(inner, v))),
        TypeRef::Unit | TypeRef::Any | TypeRef::Named(_) | TypeRef::Unsupported(_) => true,
    }
}
