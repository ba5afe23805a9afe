//! # GSI CLI Entry Point
//!
//! The main executable of the GSI client. This file drives the application lifecycle:
//!
//! 1. **Initialization**: Loads `.env`, installs logging and parses arguments with [`cli::Cli`].
//! 2. **Schema**: Loads and merges the `--schema` files with `gsi_core`.
//! 3. **Execution**: Lists, describes or synthesizes stubs, or invokes an operation through
//!    a `GsiClient` built from the configuration.
//! 4. **Presentation**: Formats and prints the resulting data or error to standard output/error.
mod cli;
mod formatter;
mod telemetry;

use clap::Parser;
use cli::{Cli, Commands, EndpointArgs, SchemaArgs};
use formatter::{FormattedString, GenericError, OperationList};
use gsi_core::{ClientConfig, GsiClient, Schema, StubSet, synthesize};
use std::{path::PathBuf, process};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    telemetry::init();

    let args = Cli::parse();
    let config_path = args.config;

    match args.command {
        Commands::List { schema } => list_operations(&schema),
        Commands::Describe { operation, schema } => describe_operation(&schema, &operation),
        Commands::Stubs { schema } => print_stubs(&schema),
        Commands::Call {
            operation,
            schema,
            args,
            timeout_ms,
            endpoints,
            headers,
        } => {
            let config = load_config_or_exit(config_path, endpoints, timeout_ms, headers);
            run_call(&schema, &config, &operation, args).await;
        }
    }
}

fn exit_with(err: impl Into<FormattedString>) -> ! {
    eprintln!("{}", err.into());
    process::exit(1);
}

fn load_schema_or_exit(args: &SchemaArgs) -> Schema {
    let mut paths = args.schemas.iter();
    let Some(first) = paths.next() else {
        exit_with(GenericError("No schema given", "pass at least one --schema"));
    };

    let merged = Schema::from_path(first).and_then(|first| {
        paths.try_fold(first, |schema, path| schema.merge(Schema::from_path(path)?))
    });

    match merged {
        Ok(schema) => schema,
        Err(err) => exit_with(err),
    }
}

fn synthesize_or_exit(schema: &Schema) -> StubSet {
    match synthesize(schema) {
        Ok(stubs) => stubs,
        Err(err) => exit_with(GenericError("Stub synthesis failed", err)),
    }
}

fn load_config_or_exit(
    path: Option<PathBuf>,
    endpoints: EndpointArgs,
    timeout_ms: Option<u64>,
    headers: Vec<(String, String)>,
) -> ClientConfig {
    let loaded = match path {
        Some(path) => ClientConfig::from_file(path),
        None => ClientConfig::from_env(),
    };
    let mut config = match loaded {
        Ok(config) => config,
        Err(err) => exit_with(err),
    };

    let EndpointArgs {
        rest,
        grpc,
        cypher,
        gremlin,
    } = endpoints;
    config.rest_endpoint = rest.or(config.rest_endpoint);
    config.grpc_endpoint = grpc.or(config.grpc_endpoint);
    config.cypher_endpoint = cypher.or(config.cypher_endpoint);
    config.gremlin_endpoint = gremlin.or(config.gremlin_endpoint);
    if let Some(timeout_ms) = timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    config.headers.extend(headers);

    config
}

fn list_operations(args: &SchemaArgs) {
    let schema = load_schema_or_exit(args);
    let stubs = synthesize_or_exit(&schema);

    // Declaration order, not the id order of the stub set.
    let listed = schema
        .operations()
        .iter()
        .filter_map(|op| stubs.get(&op.id))
        .collect();

    println!("{}", FormattedString::from(OperationList(listed)));
}

fn describe_operation(args: &SchemaArgs, operation: &str) {
    let schema = load_schema_or_exit(args);
    let stubs = synthesize_or_exit(&schema);

    match stubs.get(operation) {
        Some(stub) => println!("{}", FormattedString::from(stub)),
        None => exit_with(GenericError("Unknown operation", operation)),
    }
}

fn print_stubs(args: &SchemaArgs) {
    let schema = load_schema_or_exit(args);
    let stubs = synthesize_or_exit(&schema);

    println!("{}", FormattedString::from(&stubs));
}

async fn run_call(
    args: &SchemaArgs,
    config: &ClientConfig,
    operation: &str,
    arguments: serde_json::Value,
) {
    let schema = load_schema_or_exit(args);

    let client = match GsiClient::from_config(&schema, config) {
        Ok(client) => client,
        Err(err) => exit_with(err),
    };

    tracing::debug!(operation, "Invoking");

    match client.invoke(operation, arguments).await {
        Ok(value) => println!("{}", FormattedString::from(value)),
        Err(err) => exit_with(err),
    }
}
