//! gRPC over a tonic channel, or any compatible `GrpcService`.
use super::{CallError, TransportErrorKind, TransportInitError};
use crate::{
    BoxError,
    grpc::{
        client::{GrpcClient, GrpcRequestError},
        codec,
    },
    stub::GrpcPlan,
};
use futures_util::{Stream, StreamExt, TryStreamExt};
use http_body::Body as HttpBody;
use prost_reflect::{DynamicMessage, MessageDescriptor};
use serde_json::{Map, Value};
use std::time::Duration;
use tonic::{
    Code, Status,
    transport::{Channel, Endpoint},
};

#[derive(Debug)]
pub struct GrpcTransport<S = Channel> {
    service: S,
    metadata: Vec<(String, String)>,
}

impl GrpcTransport<Channel> {
    /// A transport over a channel to `endpoint`; the connection is made on first use.
    ///
    /// Calls carry no channel-wide deadline, each invocation is bounded by its own timeout.
    /// Must be called from within a tokio runtime.
    pub fn connect_lazy(
        endpoint: &str,
        connect_timeout: Option<Duration>,
    ) -> Result<Self, TransportInitError> {
        let mut builder = Endpoint::from_shared(endpoint.to_string()).map_err(|source| {
            TransportInitError::InvalidEndpoint {
                url: endpoint.to_string(),
                source,
            }
        })?;
        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }

        Ok(Self::from_service(builder.connect_lazy()))
    }
}

impl<S> GrpcTransport<S> {
    /// Wraps an existing service, e.g. an in-process tonic server.
    pub fn from_service(service: S) -> Self {
        Self {
            service,
            metadata: Vec::new(),
        }
    }

    /// Metadata sent with every call.
    pub fn with_metadata(mut self, metadata: Vec<(String, String)>) -> Self {
        self.metadata = metadata;
        self
    }
}

impl<S> GrpcTransport<S>
where
    S: tonic::client::GrpcService<tonic::body::Body> + Clone,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub(crate) async fn call(
        &self,
        plan: &GrpcPlan,
        arguments: &Map<String, Value>,
    ) -> Result<Value, CallError> {
        let method = &plan.method;
        let mut client = GrpcClient::new(self.service.clone());

        match (method.is_client_streaming(), method.is_server_streaming()) {
            (false, false) => {
                let message = encode(method.input(), Value::Object(arguments.clone()))?;
                let response = client
                    .unary(method, message, &self.metadata)
                    .await
                    .map_err(request_error)?;
                response.map_err(status_error)
            }
            (false, true) => {
                let message = encode(method.input(), Value::Object(arguments.clone()))?;
                let stream = client
                    .server_streaming(method, message, &self.metadata)
                    .await
                    .map_err(request_error)?
                    .map_err(status_error)?;
                collect(stream).await
            }
            (true, false) => {
                let messages = message_stream(plan, method.input(), arguments)?;
                let response = client
                    .client_streaming(method, messages, &self.metadata)
                    .await
                    .map_err(request_error)?;
                response.map_err(status_error)
            }
            (true, true) => {
                let messages = message_stream(plan, method.input(), arguments)?;
                let stream = client
                    .bidirectional_streaming(method, messages, &self.metadata)
                    .await
                    .map_err(request_error)?
                    .map_err(status_error)?;
                collect(stream).await
            }
        }
    }
}

fn encode(descriptor: MessageDescriptor, value: Value) -> Result<DynamicMessage, CallError> {
    let name = descriptor.full_name().to_string();
    codec::from_json(descriptor, value)
        .map_err(|e| CallError::Encode(format!("arguments do not match message '{name}': {e}")))
}

/// Encodes every element of the streamed argument up front.
fn message_stream(
    plan: &GrpcPlan,
    descriptor: MessageDescriptor,
    arguments: &Map<String, Value>,
) -> Result<impl Stream<Item = DynamicMessage> + Send + 'static, CallError> {
    let items = match plan.messages_param.as_ref().and_then(|p| arguments.get(p)) {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            return Err(CallError::Encode(
                "client streaming requires a JSON array of messages".to_string(),
            ));
        }
    };

    let messages = items
        .into_iter()
        .map(|item| encode(descriptor.clone(), item))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(tokio_stream::iter(messages))
}

async fn collect(
    stream: impl Stream<Item = Result<Value, Status>> + Unpin,
) -> Result<Value, CallError> {
    let items: Vec<Value> = stream.map_err(status_error).try_collect().await?;
    Ok(Value::Array(items))
}

fn request_error(err: GrpcRequestError) -> CallError {
    match err {
        GrpcRequestError::NotReady(source) => CallError::transport(TransportErrorKind::Connect, source),
        other => CallError::transport(TransportErrorKind::Protocol, other),
    }
}

fn status_error(status: Status) -> CallError {
    match status.code() {
        Code::Unavailable => CallError::transport(TransportErrorKind::Unavailable, status),
        code => CallError::Invocation {
            status: format!("{code:?}"),
            message: status.message().to_string(),
            details: None,
        },
    }
}
