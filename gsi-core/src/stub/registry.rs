//! Stubs bound to live transports.
use super::{InvocationPlan, StubDefinition, StubSet};
use crate::{
    BoxError,
    schema::SchemaOperation,
    transport::{self, CallError, Protocol, TransportErrorKind, TransportHandle, Transports},
};
use http_body::Body as HttpBody;
use std::collections::BTreeMap;
use tonic::transport::Channel;

#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("Operation '{operation}' needs a {protocol} transport, but none is configured")]
    MissingTransport {
        operation: String,
        protocol: Protocol,
    },
}

/// A stub definition attached to the shared transport of its protocol.
#[derive(Debug)]
pub struct ClientStub<S = Channel> {
    definition: StubDefinition,
    transport: TransportHandle<S>,
}

impl<S> ClientStub<S> {
    pub fn definition(&self) -> &StubDefinition {
        &self.definition
    }

    pub fn operation(&self) -> &SchemaOperation {
        &self.definition.operation
    }

    pub fn transport(&self) -> &TransportHandle<S> {
        &self.transport
    }
}

impl<S> ClientStub<S>
where
    S: tonic::client::GrpcService<tonic::body::Body> + Clone,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    /// Performs a single exchange with the server.
    pub(crate) async fn call(
        &self,
        arguments: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<serde_json::Value, CallError> {
        match (&self.transport, &self.definition.plan) {
            (TransportHandle::Rest(rest), InvocationPlan::Rest(plan)) => {
                rest.call(plan, arguments).await
            }
            (TransportHandle::Grpc(grpc), InvocationPlan::Grpc(plan)) => {
                grpc.call(plan, arguments).await
            }
            (TransportHandle::Cypher(cypher), InvocationPlan::Query(plan)) => {
                let rows = cypher.run(&plan.template, arguments).await?;
                Ok(transport::shape_rows(rows, plan.rows))
            }
            (TransportHandle::Gremlin(gremlin), InvocationPlan::Query(plan)) => {
                let rows = gremlin.submit(&plan.template, arguments).await?;
                Ok(transport::shape_rows(rows, plan.rows))
            }
            (handle, _) => Err(CallError::transport(
                TransportErrorKind::Protocol,
                format!(
                    "operation '{}' is bound to {}, not {}",
                    self.definition.id(),
                    self.definition.protocol(),
                    handle.protocol()
                ),
            )),
        }
    }
}

/// Every stub of a client, keyed by operation id.
#[derive(Debug)]
pub struct StubRegistry<S = Channel> {
    stubs: BTreeMap<String, ClientStub<S>>,
}

impl<S> StubRegistry<S> {
    pub fn get(&self, operation: &str) -> Option<&ClientStub<S>> {
        self.stubs.get(operation)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientStub<S>> {
        self.stubs.values()
    }

    pub fn len(&self) -> usize {
        self.stubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stubs.is_empty()
    }
}

impl StubSet {
    /// Attaches every definition to the transport of its protocol.
    ///
    /// Stubs of the same protocol share one transport handle.
    pub fn bind<S>(self, transports: &Transports<S>) -> Result<StubRegistry<S>, BindError> {
        let mut stubs = BTreeMap::new();

        for definition in self {
            let protocol = definition.protocol();
            let transport =
                transports
                    .handle(protocol)
                    .ok_or_else(|| BindError::MissingTransport {
                        operation: definition.id().to_string(),
                        protocol,
                    })?;

            stubs.insert(
                definition.id().to_string(),
                ClientStub {
                    definition,
                    transport,
                },
            );
        }

        Ok(StubRegistry { stubs })
    }
}
