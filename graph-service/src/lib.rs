//! # Graph Service
//!
//! **INTERNAL USE ONLY**: This crate exists solely to provide a gRPC server definition
//! and descriptor set for integration testing `gsi_core` and the `gsi` CLI.
//! It is not intended for production use.

pub mod pb {
    include!(concat!(env!("OUT_DIR"), "/interactive.graph.v1.rs"));
}

pub use pb::graph_service_server::{GraphService, GraphServiceServer};
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("descriptors");
