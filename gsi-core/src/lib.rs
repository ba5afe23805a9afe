//! # GSI Core
//!
//! `gsi-core` is the stub-generation and client-dispatch core of the GSI graph client SDK.
//! It turns interface definitions into callable, typed operations and executes them over
//! whichever wire protocol the definition binds them to.
//!
//! ## Key Components
//!
//! * **[`Schema`]:** The schema loader. Parses an OpenAPI 3 document (JSON or YAML) or a
//!   compiled protobuf `FileDescriptorSet` into an ordered set of [`SchemaOperation`]s.
//! * **[`synthesize`]:** The stub synthesizer. Maps every operation to a Rust method
//!   signature plus a protocol-specific invocation plan, producing a deterministic [`StubSet`].
//! * **[`GsiClient`]:** The protocol dispatcher. Owns one shared transport handle per protocol
//!   and a registry of bound stubs, and executes `invoke(operation, arguments)` with retries,
//!   timeouts and cancellation.
//!
//! ## Transports
//!
//! * **REST**: pooled `reqwest` client, JSON bodies.
//! * **gRPC**: tonic channel with a dynamic JSON <-> Protobuf codec (see [`grpc`]).
//! * **Cypher**: the HTTP transactional endpoint of Bolt-speaking graph servers.
//! * **Gremlin**: the Gremlin Server HTTP endpoint, with GraphSON untyping.
//!
//! ## Re-exports
//!
//! This crate re-exports `prost-reflect`, `tonic` and `tokio-util` to ensure that consumers
//! use compatible versions of these underlying dependencies.
//!
//! ```rust,no_run
//! use gsi_core::{ClientConfig, GsiClient, Schema};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let schema = Schema::from_path("interactive.yaml")?;
//! let config = ClientConfig::from_env()?;
//! let client = GsiClient::from_config(&schema, &config)?;
//!
//! let vertex = client
//!     .invoke("getVertex", serde_json::json!({ "id": "v1" }))
//!     .await?;
//! # Ok(())
//! # }
//! ```
pub mod client;
pub mod config;
pub mod grpc;
pub mod schema;
pub mod stub;
pub mod transport;

pub use client::{BlockingClient, DispatchError, GsiClient, InitError, InvokeOptions, RetryPolicy};
pub use config::{ClientConfig, ConfigError};
pub use schema::{
    Parameter, ParameterLocation, ProtocolBinding, QueryLanguage, Schema, SchemaOperation,
    SchemaParseError, TypeDef, TypeRef, Verb,
};
pub use stub::{
    BindError, ClientStub, StubDefinition, StubRegistry, StubSet, UnsupportedTypeError, synthesize,
};
pub use transport::{
    InvocationError, Protocol, TransportError, TransportErrorKind, TransportHandle, Transports,
};

// Re-exports
pub use prost_reflect;
pub use tokio_util;
pub use tonic;

/// Type alias for the standard boxed error used in generic bounds.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
