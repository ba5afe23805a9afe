use super::{DispatchError, GsiClient, InitError, InvokeOptions};
use crate::{config::ClientConfig, schema::Schema, stub::StubRegistry};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::runtime::Runtime;

/// A [`GsiClient`] that blocks the calling thread until each invocation completes.
///
/// It owns a multi-threaded tokio runtime that drives the transports. It must not be used
/// from within another tokio runtime.
pub struct BlockingClient {
    client: GsiClient,
    runtime: Runtime,
}

impl BlockingClient {
    pub fn from_config(schema: &Schema, config: &ClientConfig) -> Result<Self, InitError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("gsi-blocking")
            .build()
            .map_err(InitError::Runtime)?;

        // The gRPC channel needs a runtime to spawn its connection onto.
        let client = {
            let _guard = runtime.enter();
            GsiClient::from_config(schema, config)?
        };

        Ok(Self { client, runtime })
    }

    pub fn stubs(&self) -> &StubRegistry {
        self.client.stubs()
    }

    pub fn invoke(&self, operation: &str, arguments: Value) -> Result<Value, DispatchError> {
        self.runtime.block_on(self.client.invoke(operation, arguments))
    }

    pub fn invoke_with(
        &self,
        operation: &str,
        arguments: Value,
        options: InvokeOptions,
    ) -> Result<Value, DispatchError> {
        self.runtime
            .block_on(self.client.invoke_with(operation, arguments, options))
    }

    pub fn invoke_as<T: DeserializeOwned>(
        &self,
        operation: &str,
        arguments: Value,
    ) -> Result<T, DispatchError> {
        self.runtime
            .block_on(self.client.invoke_as(operation, arguments))
    }
}
