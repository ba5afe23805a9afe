//! # Transports
//!
//! Protocol-specific connection objects shared by every stub bound to the same protocol.
//!
//! A [`TransportHandle`] is a tagged variant over the protocol kind. The dispatcher matches on
//! the tag to pick the wire format, instead of going through a duck-typed client interface.
//!
//! | protocol  | handle              | concurrency model                      |
//! |-----------|---------------------|----------------------------------------|
//! | REST      | [`RestTransport`]   | `reqwest` connection pool              |
//! | gRPC      | [`GrpcTransport`]   | HTTP/2 streams multiplexed on a channel |
//! | Cypher    | [`CypherTransport`] | `reqwest` connection pool              |
//! | Gremlin   | [`GremlinTransport`]| `reqwest` connection pool              |
pub mod cypher;
pub mod gremlin;
pub mod grpc;
pub mod rest;

pub use cypher::CypherTransport;
pub use gremlin::GremlinTransport;
pub use grpc::GrpcTransport;
pub use rest::RestTransport;

use crate::{
    BoxError,
    config::ClientConfig,
    schema::{ProtocolBinding, QueryLanguage},
    stub::RowShape,
};
use std::{fmt, sync::Arc};
use tonic::transport::Channel;

/// The wire protocol an operation is invoked over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    Rest,
    Grpc,
    Cypher,
    Gremlin,
}

impl Protocol {
    pub fn of(binding: &ProtocolBinding) -> Self {
        match binding {
            ProtocolBinding::Rest { .. } => Protocol::Rest,
            ProtocolBinding::Grpc { .. } => Protocol::Grpc,
            ProtocolBinding::Query {
                language: QueryLanguage::Cypher,
                ..
            } => Protocol::Cypher,
            ProtocolBinding::Query {
                language: QueryLanguage::Gremlin,
                ..
            } => Protocol::Gremlin,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Rest => "rest",
            Protocol::Grpc => "grpc",
            Protocol::Cypher => "cypher",
            Protocol::Gremlin => "gremlin",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What went wrong at the transport level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The connection could not be established.
    Connect,
    /// The peer, or a gateway in front of it, is temporarily unavailable.
    Unavailable,
    /// The request or the whole invocation ran out of time.
    Timeout,
    /// The exchange did not follow the protocol (undecodable body, bad metadata...).
    Protocol,
}

impl TransportErrorKind {
    /// Everything but a protocol violation may succeed when tried again.
    pub fn is_transient(&self) -> bool {
        !matches!(self, TransportErrorKind::Protocol)
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Unavailable => "unavailable",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Protocol => "protocol",
        };
        f.write_str(name)
    }
}

/// A connection, timeout or protocol failure.
#[derive(Debug, thiserror::Error)]
#[error("{protocol} transport failure ({kind}) while invoking '{operation}': '{source}'")]
pub struct TransportError {
    pub operation: String,
    pub protocol: Protocol,
    pub kind: TransportErrorKind,
    #[source]
    pub source: BoxError,
}

impl TransportError {
    /// Transient failures are worth retrying for idempotent operations.
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// A failure reported by the server itself.
#[derive(Debug, Clone, thiserror::Error)]
#[error("'{operation}' failed over {protocol} with status {status}: {message}")]
pub struct InvocationError {
    pub operation: String,
    pub protocol: Protocol,
    /// Protocol specific status: an HTTP status code, a gRPC code name, a Neo4j error code...
    pub status: String,
    pub message: String,
    /// The decoded error payload, when the server sent a structured one.
    pub details: Option<serde_json::Value>,
}

/// Outcome of a single failed exchange, before it is attributed to an operation.
#[derive(Debug)]
pub(crate) enum CallError {
    /// The arguments could not be encoded for the wire.
    Encode(String),
    Transport {
        kind: TransportErrorKind,
        source: BoxError,
    },
    Invocation {
        status: String,
        message: String,
        details: Option<serde_json::Value>,
    },
}

impl CallError {
    pub(crate) fn transport(kind: TransportErrorKind, source: impl Into<BoxError>) -> Self {
        CallError::Transport {
            kind,
            source: source.into(),
        }
    }

    pub(crate) fn is_transient(&self) -> bool {
        matches!(self, CallError::Transport { kind, .. } if kind.is_transient())
    }
}

/// Errors raised while building a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportInitError {
    #[error("Invalid URL '{url}': '{message}'")]
    InvalidUrl { url: String, message: String },
    #[error("Invalid gRPC endpoint '{url}': '{source}'")]
    InvalidEndpoint {
        url: String,
        source: tonic::transport::Error,
    },
    #[error("Failed to build HTTP client: '{0}'")]
    HttpClient(#[source] reqwest::Error),
}

/// A shared, protocol-specific connection object.
pub enum TransportHandle<S = Channel> {
    Rest(Arc<RestTransport>),
    Grpc(Arc<GrpcTransport<S>>),
    Cypher(Arc<CypherTransport>),
    Gremlin(Arc<GremlinTransport>),
}

impl<S> TransportHandle<S> {
    pub fn protocol(&self) -> Protocol {
        match self {
            TransportHandle::Rest(_) => Protocol::Rest,
            TransportHandle::Grpc(_) => Protocol::Grpc,
            TransportHandle::Cypher(_) => Protocol::Cypher,
            TransportHandle::Gremlin(_) => Protocol::Gremlin,
        }
    }
}

impl<S> Clone for TransportHandle<S> {
    fn clone(&self) -> Self {
        match self {
            TransportHandle::Rest(t) => TransportHandle::Rest(Arc::clone(t)),
            TransportHandle::Grpc(t) => TransportHandle::Grpc(Arc::clone(t)),
            TransportHandle::Cypher(t) => TransportHandle::Cypher(Arc::clone(t)),
            TransportHandle::Gremlin(t) => TransportHandle::Gremlin(Arc::clone(t)),
        }
    }
}

impl<S> fmt::Debug for TransportHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TransportHandle")
            .field(&self.protocol())
            .finish()
    }
}

/// The set of transports available to an SDK instance, at most one per protocol.
pub struct Transports<S = Channel> {
    rest: Option<Arc<RestTransport>>,
    grpc: Option<Arc<GrpcTransport<S>>>,
    cypher: Option<Arc<CypherTransport>>,
    gremlin: Option<Arc<GremlinTransport>>,
}

impl Transports<Channel> {
    /// An empty set; gRPC, if needed, is added with [`Transports::with_grpc`].
    pub fn new() -> Self {
        Self {
            rest: None,
            grpc: None,
            cypher: None,
            gremlin: None,
        }
    }
}

impl Default for Transports<Channel> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Transports<S> {
    pub fn with_rest(mut self, transport: RestTransport) -> Self {
        self.rest = Some(Arc::new(transport));
        self
    }

    pub fn with_cypher(mut self, transport: CypherTransport) -> Self {
        self.cypher = Some(Arc::new(transport));
        self
    }

    pub fn with_gremlin(mut self, transport: GremlinTransport) -> Self {
        self.gremlin = Some(Arc::new(transport));
        self
    }

    /// Sets the gRPC transport. The service type may change, e.g. from a `Channel` to an
    /// in-process tonic server.
    pub fn with_grpc<T>(self, transport: GrpcTransport<T>) -> Transports<T> {
        Transports {
            rest: self.rest,
            grpc: Some(Arc::new(transport)),
            cypher: self.cypher,
            gremlin: self.gremlin,
        }
    }

    /// The shared handle for a protocol, if a transport is configured for it.
    pub fn handle(&self, protocol: Protocol) -> Option<TransportHandle<S>> {
        match protocol {
            Protocol::Rest => self.rest.clone().map(TransportHandle::Rest),
            Protocol::Grpc => self.grpc.clone().map(TransportHandle::Grpc),
            Protocol::Cypher => self.cypher.clone().map(TransportHandle::Cypher),
            Protocol::Gremlin => self.gremlin.clone().map(TransportHandle::Gremlin),
        }
    }

    /// Protocols that have a transport configured.
    pub fn protocols(&self) -> Vec<Protocol> {
        [
            (Protocol::Rest, self.rest.is_some()),
            (Protocol::Grpc, self.grpc.is_some()),
            (Protocol::Cypher, self.cypher.is_some()),
            (Protocol::Gremlin, self.gremlin.is_some()),
        ]
        .into_iter()
        .filter_map(|(protocol, configured)| configured.then_some(protocol))
        .collect()
    }
}

impl Transports<Channel> {
    /// Builds a transport for every endpoint set in the configuration.
    ///
    /// The gRPC channel connects lazily, on the first call.
    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportInitError> {
        let connect_timeout = Some(config.timeout());
        let headers = config.header_pairs();
        let mut transports = Transports::new();

        if let Some(url) = &config.rest_endpoint {
            transports =
                transports.with_rest(RestTransport::new(url, connect_timeout)?.with_headers(headers.clone()));
        }
        if let Some(url) = &config.cypher_endpoint {
            transports = transports.with_cypher(
                CypherTransport::new(url, &config.cypher_database, connect_timeout)?
                    .with_headers(headers.clone()),
            );
        }
        if let Some(url) = &config.gremlin_endpoint {
            transports = transports
                .with_gremlin(GremlinTransport::new(url, connect_timeout)?.with_headers(headers.clone()));
        }
        if let Some(url) = &config.grpc_endpoint {
            transports =
                transports.with_grpc(GrpcTransport::connect_lazy(url, connect_timeout)?.with_metadata(headers));
        }

        Ok(transports)
    }
}

/// Applies the row shape of a query plan to the decoded rows of a query protocol.
pub(crate) fn shape_rows(rows: Vec<serde_json::Value>, shape: RowShape) -> serde_json::Value {
    match shape {
        RowShape::All => serde_json::Value::Array(rows),
        RowShape::First => rows.into_iter().next().unwrap_or(serde_json::Value::Null),
        RowShape::Discard => serde_json::Value::Null,
    }
}

/// Maps an HTTP-level `reqwest` failure to a transport error kind.
pub(crate) fn classify_reqwest_error(err: reqwest::Error) -> CallError {
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() {
        TransportErrorKind::Connect
    } else if is_dropped_connection(&err) {
        TransportErrorKind::Unavailable
    } else {
        TransportErrorKind::Protocol
    };
    CallError::transport(kind, err)
}

/// Whether the peer reset or closed the connection before the response was complete.
fn is_dropped_connection(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = Some(err);
    while let Some(err) = source {
        if let Some(err) = err.downcast_ref::<hyper::Error>()
            && (err.is_incomplete_message() || err.is_closed() || err.is_canceled())
        {
            return true;
        }
        if let Some(err) = err.downcast_ref::<std::io::Error>()
            && matches!(
                err.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            )
        {
            return true;
        }
        source = err.source();
    }
    false
}

/// Gateway statuses that say the server could not be reached, rather than that it refused the call.
pub(crate) fn is_unavailable_status(status: reqwest::StatusCode) -> bool {
    matches!(
        status,
        reqwest::StatusCode::BAD_GATEWAY
            | reqwest::StatusCode::SERVICE_UNAVAILABLE
            | reqwest::StatusCode::GATEWAY_TIMEOUT
    )
}

/// Builds the pooled HTTP client shared by the HTTP based transports.
///
/// Only connecting is bounded here. The invocation as a whole is bounded by the dispatcher, with
/// the timeout of the call.
pub(crate) fn http_client(
    connect_timeout: Option<std::time::Duration>,
) -> Result<reqwest::Client, TransportInitError> {
    let mut builder = reqwest::Client::builder().user_agent(concat!(
        env!("CARGO_PKG_NAME"),
        "/",
        env!("CARGO_PKG_VERSION")
    ));
    if let Some(timeout) = connect_timeout {
        builder = builder.connect_timeout(timeout);
    }
    builder.build().map_err(TransportInitError::HttpClient)
}

/// Whether a response carries JSON. A response without a `Content-Type` is assumed to.
pub(crate) fn declares_json(headers: &reqwest::header::HeaderMap) -> bool {
    let Some(content_type) = headers.get(reqwest::header::CONTENT_TYPE) else {
        return true;
    };
    let Ok(content_type) = content_type.to_str() else {
        return false;
    };

    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    media_type == "application/json" || media_type.ends_with("+json")
}

/// Parses a base URL, reporting it in the error if it is invalid.
pub(crate) fn parse_url(url: &str) -> Result<reqwest::Url, TransportInitError> {
    reqwest::Url::parse(url).map_err(|e| TransportInitError::InvalidUrl {
        url: url.to_string(),
        message: e.to_string(),
    })
}

/// Reads a JSON response.
///
/// Gateway failures become transient transport errors, other non-2xx statuses become
/// invocation errors carrying the decoded error body. An empty 2xx body reads as `null`.
pub(crate) async fn read_json(response: reqwest::Response) -> Result<serde_json::Value, CallError> {
    let status = response.status();
    let body = response.bytes().await.map_err(classify_reqwest_error)?;

    if status.is_success() {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::Value::Null);
        }
        return serde_json::from_slice(&body)
            .map_err(|e| CallError::transport(TransportErrorKind::Protocol, e));
    }

    if is_unavailable_status(status) {
        return Err(CallError::transport(
            TransportErrorKind::Unavailable,
            format!("HTTP {status}"),
        ));
    }

    let details: Option<serde_json::Value> = serde_json::from_slice(&body).ok();
    let message = details
        .as_ref()
        .and_then(|d| d.get("message"))
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| {
            let text = String::from_utf8_lossy(&body).trim().to_string();
            if text.is_empty() {
                status.canonical_reason().unwrap_or_default().to_string()
            } else {
                text
            }
        });

    Err(CallError::Invocation {
        status: status.as_u16().to_string(),
        message,
        details,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};

    fn with_content_type(value: &'static str) -> HeaderMap {
        HeaderMap::from_iter([(CONTENT_TYPE, HeaderValue::from_static(value))])
    }

    #[test]
    fn test_json_media_types() {
        assert!(declares_json(&with_content_type("application/json")));
        assert!(declares_json(&with_content_type("application/json; charset=utf-8")));
        assert!(declares_json(&with_content_type("application/vnd.graph+json")));
        assert!(declares_json(&HeaderMap::new()));

        assert!(!declares_json(&with_content_type("text/plain; charset=utf-8")));
        assert!(!declares_json(&with_content_type("application/octet-stream")));
    }

    #[test]
    fn test_reset_connection_is_dropped() {
        let reset = std::io::Error::from(std::io::ErrorKind::ConnectionReset);
        assert!(is_dropped_connection(&reset));

        let eof = std::io::Error::from(std::io::ErrorKind::UnexpectedEof);
        assert!(is_dropped_connection(&eof));

        let invalid = std::io::Error::from(std::io::ErrorKind::InvalidData);
        assert!(!is_dropped_connection(&invalid));
    }

    #[test]
    fn test_only_protocol_errors_are_final() {
        assert!(TransportErrorKind::Connect.is_transient());
        assert!(TransportErrorKind::Unavailable.is_transient());
        assert!(TransportErrorKind::Timeout.is_transient());
        assert!(!TransportErrorKind::Protocol.is_transient());
    }
}
