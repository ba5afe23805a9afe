//! # Dynamic gRPC
//!
//! Building blocks for calling gRPC methods known only through a `DescriptorPool`.
//!
//! Requests are built as `prost_reflect::DynamicMessage`s from JSON arguments before the call
//! starts, so that a malformed argument is reported to the caller instead of surfacing as a
//! status half way through a stream. Responses are transcoded back to `serde_json::Value`.
pub mod client;
pub mod codec;
