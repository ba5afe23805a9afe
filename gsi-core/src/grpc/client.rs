//! # Dynamic gRPC client
//!
//! Wraps `tonic::client::Grpc` so that any method of a descriptor pool can be called with
//! [`DynamicMessage`] requests. The HTTP/2 path (`/package.Service/Method`) is derived from the
//! `MethodDescriptor` at call time.
//!
//! Every call returns `Result<Result<T, Status>, GrpcRequestError>`: the outer error means the
//! request never reached the server, the inner one is the status the server answered with.
use super::codec::DynamicCodec;
use crate::BoxError;
use futures_util::Stream;
use http_body::Body as HttpBody;
use prost_reflect::{DynamicMessage, MethodDescriptor};
use std::str::FromStr;
use tonic::{
    Status,
    client::GrpcService,
    codec::Streaming,
    metadata::{
        MetadataKey, MetadataValue,
        errors::{InvalidMetadataKey, InvalidMetadataValue},
    },
    transport::Channel,
};

#[derive(thiserror::Error, Debug)]
pub enum GrpcRequestError {
    #[error("The gRPC service was not ready: '{0}'")]
    NotReady(#[source] BoxError),
    #[error("Invalid gRPC path '{0}'")]
    InvalidPath(String),
    #[error("Invalid metadata key '{key}': '{source}'")]
    InvalidMetadataKey {
        key: String,
        source: InvalidMetadataKey,
    },
    #[error("Invalid metadata value for key '{key}': '{source}'")]
    InvalidMetadataValue {
        key: String,
        source: InvalidMetadataValue,
    },
}

pub struct GrpcClient<S = Channel> {
    inner: tonic::client::Grpc<S>,
}

impl<S> GrpcClient<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(service: S) -> Self {
        Self {
            inner: tonic::client::Grpc::new(service),
        }
    }

    async fn ready(&mut self) -> Result<(), GrpcRequestError> {
        self.inner
            .ready()
            .await
            .map_err(|e| GrpcRequestError::NotReady(e.into()))
    }

    /// One request, one response.
    pub async fn unary(
        &mut self,
        method: &MethodDescriptor,
        message: DynamicMessage,
        metadata: &[(String, String)],
    ) -> Result<Result<serde_json::Value, Status>, GrpcRequestError> {
        let path = http_path(method)?;
        let request = build_request(message, metadata)?;
        self.ready().await?;

        Ok(self
            .inner
            .unary(request, path, DynamicCodec::new(method.output()))
            .await
            .map(tonic::Response::into_inner))
    }

    /// One request, a stream of responses.
    pub async fn server_streaming(
        &mut self,
        method: &MethodDescriptor,
        message: DynamicMessage,
        metadata: &[(String, String)],
    ) -> Result<Result<Streaming<serde_json::Value>, Status>, GrpcRequestError> {
        let path = http_path(method)?;
        let request = build_request(message, metadata)?;
        self.ready().await?;

        Ok(self
            .inner
            .server_streaming(request, path, DynamicCodec::new(method.output()))
            .await
            .map(tonic::Response::into_inner))
    }

    /// A stream of requests, one response.
    pub async fn client_streaming(
        &mut self,
        method: &MethodDescriptor,
        messages: impl Stream<Item = DynamicMessage> + Send + 'static,
        metadata: &[(String, String)],
    ) -> Result<Result<serde_json::Value, Status>, GrpcRequestError> {
        let path = http_path(method)?;
        let request = build_request(messages, metadata)?;
        self.ready().await?;

        Ok(self
            .inner
            .client_streaming(request, path, DynamicCodec::new(method.output()))
            .await
            .map(tonic::Response::into_inner))
    }

    /// A stream of requests, a stream of responses.
    pub async fn bidirectional_streaming(
        &mut self,
        method: &MethodDescriptor,
        messages: impl Stream<Item = DynamicMessage> + Send + 'static,
        metadata: &[(String, String)],
    ) -> Result<Result<Streaming<serde_json::Value>, Status>, GrpcRequestError> {
        let path = http_path(method)?;
        let request = build_request(messages, metadata)?;
        self.ready().await?;

        Ok(self
            .inner
            .streaming(request, path, DynamicCodec::new(method.output()))
            .await
            .map(tonic::Response::into_inner))
    }
}

fn http_path(method: &MethodDescriptor) -> Result<http::uri::PathAndQuery, GrpcRequestError> {
    let path = format!("/{}/{}", method.parent_service().full_name(), method.name());
    http::uri::PathAndQuery::from_str(&path).map_err(|_| GrpcRequestError::InvalidPath(path))
}

fn build_request<T>(
    payload: T,
    metadata: &[(String, String)],
) -> Result<tonic::Request<T>, GrpcRequestError> {
    let mut request = tonic::Request::new(payload);
    for (key, value) in metadata {
        let name = MetadataKey::from_str(&key.to_ascii_lowercase()).map_err(|source| {
            GrpcRequestError::InvalidMetadataKey {
                key: key.clone(),
                source,
            }
        })?;
        let value = MetadataValue::from_str(value).map_err(|source| {
            GrpcRequestError::InvalidMetadataValue {
                key: key.clone(),
                source,
            }
        })?;
        request.metadata_mut().insert(name, value);
    }
    Ok(request)
}
