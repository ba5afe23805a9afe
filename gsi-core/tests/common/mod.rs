#![allow(dead_code)]

pub mod graph_service_impl;
pub mod stub_server;

use gsi_core::{ClientConfig, GsiClient, Schema, config::RetryConfig};
use serde::Deserialize;
use std::collections::HashMap;

pub const GRAPH_API_YAML: &str = include_str!("../fixtures/graph-api.yaml");

#[derive(Debug, Deserialize, PartialEq)]
pub struct Vertex {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

pub fn graph_api() -> Schema {
    Schema::from_openapi_yaml(GRAPH_API_YAML).unwrap()
}

pub fn graph_service() -> Schema {
    Schema::from_descriptor_set(graph_service::FILE_DESCRIPTOR_SET).unwrap()
}

/// REST, Cypher and Gremlin all pointed at the stub server, with short retry delays.
pub fn config_for(server: &stub_server::StubServer) -> ClientConfig {
    ClientConfig {
        cypher_endpoint: Some(server.url.clone()),
        gremlin_endpoint: Some(format!("{}/gremlin", server.url)),
        ..rest_config(&server.url)
    }
}

/// Only REST, pointed at `url`, with short retry delays.
pub fn rest_config(url: &str) -> ClientConfig {
    ClientConfig {
        rest_endpoint: Some(url.to_string()),
        retry: RetryConfig {
            max_attempts: 3,
            min_delay_ms: 10,
            max_delay_ms: 50,
        },
        ..ClientConfig::default()
    }
}

pub fn client_for(server: &stub_server::StubServer) -> GsiClient {
    GsiClient::from_config(&graph_api(), &config_for(server)).unwrap()
}
