//! # CLI
//!
//! This module defines the command-line interface of `gsi` using `clap`.
//!
//! Every command reads one or more schema files. Several `--schema` flags are merged into a
//! single schema, so an OpenAPI document and a descriptor set can be served by one client.
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gsi", version, about = "Schema-driven graph service client")]
pub struct Cli {
    /// Client configuration file (JSON or YAML). Without it, the INTERACTIVE_* environment
    /// variables are used.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args)]
pub struct SchemaArgs {
    /// OpenAPI document (.json, .yaml) or descriptor set (.bin, .pb, .desc)
    #[arg(short, long = "schema", required = true)]
    pub schemas: Vec<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the operations of a schema
    List {
        #[command(flatten)]
        schema: SchemaArgs,
    },

    /// Describe a single operation: its signature, binding and parameters
    Describe {
        /// Operation id (e.g. getVertex or my.pkg.Service/Method)
        operation: String,

        #[command(flatten)]
        schema: SchemaArgs,
    },

    /// Print the synthesized stub of every operation
    Stubs {
        #[command(flatten)]
        schema: SchemaArgs,
    },

    /// Invoke an operation
    ///
    /// ## Examples:
    ///
    /// ```bash
    /// gsi call getVertex --schema graph.yaml --rest http://localhost:7777 --args '{"id": "v1"}'
    /// ```
    Call {
        /// Operation id (e.g. getVertex or my.pkg.Service/Method)
        operation: String,

        #[command(flatten)]
        schema: SchemaArgs,

        /// JSON object of arguments, keyed by parameter name
        #[arg(long, value_parser = parse_args, default_value = "{}")]
        args: serde_json::Value,

        /// Timeout of the whole invocation, retries included
        #[arg(long)]
        timeout_ms: Option<u64>,

        #[command(flatten)]
        endpoints: EndpointArgs,

        #[arg(short = 'H', long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,
    },
}

/// Endpoint overrides, applied on top of the configuration file or environment.
#[derive(Args, Default)]
pub struct EndpointArgs {
    /// Base URL of the REST API
    #[arg(long)]
    pub rest: Option<String>,
    /// gRPC server URL (e.g. http://localhost:50051)
    #[arg(long)]
    pub grpc: Option<String>,
    /// Base URL of the Neo4j HTTP API
    #[arg(long)]
    pub cypher: Option<String>,
    /// Gremlin Server HTTP endpoint
    #[arg(long)]
    pub gremlin: Option<String>,
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    s.split_once(':')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| "Format must be 'key:value'".to_string())
}

fn parse_args(value: &str) -> Result<serde_json::Value, String> {
    match serde_json::from_str(value) {
        Ok(value @ serde_json::Value::Object(_)) => Ok(value),
        Ok(_) => Err("Arguments must be a JSON object".to_string()),
        Err(e) => Err(format!("Invalid JSON: {e}")),
    }
}
