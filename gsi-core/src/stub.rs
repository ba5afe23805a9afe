//! # Stub Synthesizer
//!
//! Turns every [`SchemaOperation`] of a [`Schema`] into a [`StubDefinition`]: a typed Rust
//! method signature plus the plan the dispatcher follows to put a call on the wire.
//!
//! Synthesis is pure and deterministic. It fails with an [`UnsupportedTypeError`] when a type
//! has no Rust mapping, or when it cannot be carried by the protocol the operation is bound to:
//!
//! | protocol | constraint                                                         |
//! |----------|--------------------------------------------------------------------|
//! | REST     | path and header parameters are scalars, query parameters are scalars or lists of scalars |
//! | gRPC     | the result is a protobuf message known to one of the schema's descriptor pools |
//! | Cypher   | no raw bytes anywhere in parameters or result                      |
//! | Gremlin  | no raw bytes anywhere in parameters or result (GraphSON has no byte type) |
//!
//! Definitions are then attached to live transports with [`StubSet::bind`].
mod registry;
mod signature;

pub use registry::{BindError, ClientStub, StubRegistry};
pub use signature::{MethodSignature, RustType, TypedParam};
pub(crate) use signature::snake_ident;

use crate::{
    schema::{
        ParameterLocation, ProtocolBinding, QueryLanguage, Schema, SchemaOperation, TypeDef,
        TypeRef, Verb,
    },
    transport::Protocol,
};
use prost_reflect::MethodDescriptor;
use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    sync::Arc,
};

#[derive(Debug, Clone, thiserror::Error)]
#[error("Operation '{operation}' cannot be bound to {protocol}: {context} of type '{ty}': {reason}")]
pub struct UnsupportedTypeError {
    pub operation: String,
    pub protocol: Protocol,
    /// Which part of the operation failed, e.g. `parameter 'id'` or `result`.
    pub context: String,
    pub ty: TypeRef,
    pub reason: String,
}

/// How the dispatcher places the arguments of a REST operation.
#[derive(Debug, Clone)]
pub struct RestPlan {
    pub verb: Verb,
    pub path: String,
    pub path_params: Vec<String>,
    pub query_params: Vec<String>,
    pub header_params: Vec<String>,
    pub body_param: Option<String>,
    /// False when the result is unit: whatever the server answers is drained and dropped.
    pub expects_body: bool,
}

#[derive(Debug, Clone)]
pub struct GrpcPlan {
    pub method: MethodDescriptor,
    /// For client and bidirectional streaming, the argument holding the message list.
    pub messages_param: Option<String>,
}

/// Which rows of a query result the caller receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowShape {
    /// Every row, as an array.
    All,
    /// The first row, or `null` when there is none.
    First,
    /// Nothing; the query is run for its side effects.
    Discard,
}

#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub language: QueryLanguage,
    pub template: String,
    pub rows: RowShape,
}

#[derive(Debug, Clone)]
pub enum InvocationPlan {
    Rest(RestPlan),
    Grpc(GrpcPlan),
    Query(QueryPlan),
}

/// The synthesized form of one operation.
#[derive(Debug, Clone)]
pub struct StubDefinition {
    pub operation: Arc<SchemaOperation>,
    pub signature: MethodSignature,
    pub plan: InvocationPlan,
}

impl StubDefinition {
    pub fn id(&self) -> &str {
        &self.operation.id
    }

    pub fn protocol(&self) -> Protocol {
        Protocol::of(&self.operation.binding)
    }
}

impl fmt::Display for StubDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let retry = if self.operation.idempotent {
            "idempotent"
        } else {
            "not idempotent"
        };
        writeln!(f, "{} [{}, {retry}]", self.operation.id, self.protocol())?;
        writeln!(f, "    {}", self.signature)?;
        write!(f, "    {}", self.operation.binding)
    }
}

/// Stub definitions of a schema, keyed and iterated by operation id.
#[derive(Debug, Clone, Default)]
pub struct StubSet {
    stubs: BTreeMap<String, StubDefinition>,
}

impl StubSet {
    pub fn get(&self, operation: &str) -> Option<&StubDefinition> {
        self.stubs.get(operation)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StubDefinition> {
        self.stubs.values()
    }

    pub fn len(&self) -> usize {
        self.stubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stubs.is_empty()
    }
}

impl IntoIterator for StubSet {
    type Item = StubDefinition;
    type IntoIter = std::collections::btree_map::IntoValues<String, StubDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.stubs.into_values()
    }
}

impl fmt::Display for StubSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stub) in self.stubs.values().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{stub}")?;
        }
        Ok(())
    }
}

/// Synthesizes a stub definition for every operation of the schema.
pub fn synthesize(schema: &Schema) -> Result<StubSet, UnsupportedTypeError> {
    let mut stubs = BTreeMap::new();

    for operation in schema.operations() {
        let definition = synthesize_operation(schema, operation)?;
        tracing::debug!(operation = %operation.id, signature = %definition.signature, "Synthesized stub");
        stubs.insert(operation.id.clone(), definition);
    }

    Ok(StubSet { stubs })
}

fn synthesize_operation(
    schema: &Schema,
    operation: &SchemaOperation,
) -> Result<StubDefinition, UnsupportedTypeError> {
    let protocol = Protocol::of(&operation.binding);
    let mapper = TypeMapper {
        schema,
        operation,
        protocol,
    };

    let mut params = Vec::with_capacity(operation.params.len());
    for param in &operation.params {
        let context = format!("parameter '{}'", param.name);
        mapper.check_location(&context, &param.ty, param.location)?;

        let ty = mapper.map(&context, &param.ty)?;
        params.push(TypedParam {
            ident: signature::snake_ident(&param.name),
            name: param.name.clone(),
            ty: if param.required { ty } else { ty.optional() },
        });
    }

    let result = mapper.map("result", &operation.result)?;
    let plan = mapper.plan()?;

    Ok(StubDefinition {
        operation: Arc::new(operation.clone()),
        signature: MethodSignature {
            name: signature::snake_ident(&operation.id),
            params,
            result,
        },
        plan,
    })
}

struct TypeMapper<'a> {
    schema: &'a Schema,
    operation: &'a SchemaOperation,
    protocol: Protocol,
}

impl TypeMapper<'_> {
    fn error(&self, context: &str, ty: &TypeRef, reason: impl Into<String>) -> UnsupportedTypeError {
        UnsupportedTypeError {
            operation: self.operation.id.clone(),
            protocol: self.protocol,
            context: context.to_string(),
            ty: ty.clone(),
            reason: reason.into(),
        }
    }

    fn map(&self, context: &str, ty: &TypeRef) -> Result<RustType, UnsupportedTypeError> {
        self.check_representable(context, ty, &mut HashSet::new())?;
        self.rust_type(context, ty)
    }

    fn rust_type(&self, context: &str, ty: &TypeRef) -> Result<RustType, UnsupportedTypeError> {
        let rust = match ty {
            TypeRef::Unit => RustType::Unit,
            TypeRef::Any => RustType::Value,
            TypeRef::String => RustType::String,
            TypeRef::Integer => RustType::I64,
            TypeRef::Number => RustType::F64,
            TypeRef::Boolean => RustType::Bool,
            TypeRef::Bytes => RustType::Bytes,
            TypeRef::Array(item) => RustType::Vec(Box::new(self.rust_type(context, item)?)),
            TypeRef::Map(value) => RustType::Map(Box::new(self.rust_type(context, value)?)),
            TypeRef::Named(_) => match self.schema.resolve(ty) {
                Some(TypeRef::Named(name)) => RustType::Named(signature::pascal_type(name)),
                Some(target) => self.rust_type(context, target)?,
                None => return Err(self.error(context, ty, "the type is not declared")),
            },
            TypeRef::Unsupported(what) => {
                return Err(self.error(context, ty, format!("no mapping for {what}")));
            }
        };
        Ok(rust)
    }

    /// Walks the type and every named type it reaches, checking the protocol's encoding.
    fn check_representable(
        &self,
        context: &str,
        ty: &TypeRef,
        visited: &mut HashSet<String>,
    ) -> Result<(), UnsupportedTypeError> {
        match ty {
            TypeRef::Bytes if matches!(self.protocol, Protocol::Cypher | Protocol::Gremlin) => Err(
                self.error(context, ty, format!("{} cannot carry raw bytes", self.protocol)),
            ),
            TypeRef::Unsupported(what) => Err(self.error(context, ty, format!("no mapping for {what}"))),
            TypeRef::Array(inner) | TypeRef::Map(inner) => {
                self.check_representable(context, inner, visited)
            }
            TypeRef::Named(name) => {
                if !visited.insert(name.clone()) {
                    return Ok(());
                }
                match self.schema.type_def(name) {
                    None => Err(self.error(context, ty, "the type is not declared")),
                    Some(TypeDef::Enum { .. }) => Ok(()),
                    Some(TypeDef::Alias { target }) => {
                        if self.schema.resolve(ty).is_none() {
                            return Err(self.error(context, ty, "the alias is cyclic"));
                        }
                        self.check_representable(context, target, visited)
                    }
                    Some(TypeDef::Object { fields }) => fields.iter().try_for_each(|field| {
                        let context = format!("{context}, field '{}.{}'", name, field.name);
                        self.check_representable(&context, &field.ty, visited)
                    }),
                }
            }
            _ => Ok(()),
        }
    }

    fn check_location(
        &self,
        context: &str,
        ty: &TypeRef,
        location: ParameterLocation,
    ) -> Result<(), UnsupportedTypeError> {
        if self.protocol != Protocol::Rest {
            return Ok(());
        }

        match location {
            ParameterLocation::Path | ParameterLocation::Header if !self.is_scalar(ty) => Err(
                self.error(context, ty, format!("{location} parameters must be scalars")),
            ),
            ParameterLocation::Query => match self.schema.resolve(ty) {
                Some(TypeRef::Array(item)) if self.is_scalar(item) => Ok(()),
                _ if self.is_scalar(ty) => Ok(()),
                _ => Err(self.error(
                    context,
                    ty,
                    "query parameters must be scalars or lists of scalars",
                )),
            },
            _ => Ok(()),
        }
    }

    /// Scalars, aliases of scalars, and enums, which travel as strings.
    fn is_scalar(&self, ty: &TypeRef) -> bool {
        match self.schema.resolve(ty) {
            Some(TypeRef::Named(name)) => {
                matches!(self.schema.type_def(name), Some(TypeDef::Enum { .. }))
            }
            Some(resolved) => resolved.is_scalar(),
            None => false,
        }
    }

    fn params_at(&self, location: ParameterLocation) -> Vec<String> {
        self.operation
            .params
            .iter()
            .filter(|p| p.location == location)
            .map(|p| p.name.clone())
            .collect()
    }

    fn plan(&self) -> Result<InvocationPlan, UnsupportedTypeError> {
        match &self.operation.binding {
            ProtocolBinding::Rest { verb, path } => Ok(InvocationPlan::Rest(RestPlan {
                verb: *verb,
                path: path.clone(),
                path_params: self.params_at(ParameterLocation::Path),
                query_params: self.params_at(ParameterLocation::Query),
                header_params: self.params_at(ParameterLocation::Header),
                body_param: self.params_at(ParameterLocation::Body).into_iter().next(),
                expects_body: !matches!(
                    self.schema.resolve(&self.operation.result),
                    Some(TypeRef::Unit)
                ),
            })),
            ProtocolBinding::Grpc {
                service,
                method,
                server_streaming,
                ..
            } => {
                let descriptor = self
                    .schema
                    .descriptor_pools()
                    .iter()
                    .find_map(|pool| pool.get_service_by_name(service))
                    .and_then(|svc| svc.methods().find(|m| m.name() == method))
                    .ok_or_else(|| {
                        self.error(
                            "result",
                            &self.operation.result,
                            format!("method '{service}/{method}' is not in any descriptor pool"),
                        )
                    })?;

                self.check_grpc_result(*server_streaming)?;

                Ok(InvocationPlan::Grpc(GrpcPlan {
                    messages_param: descriptor
                        .is_client_streaming()
                        .then(|| self.params_at(ParameterLocation::Body).into_iter().next())
                        .flatten(),
                    method: descriptor,
                }))
            }
            ProtocolBinding::Query { language, template } => {
                let rows = match self.schema.resolve(&self.operation.result) {
                    Some(TypeRef::Array(_)) => RowShape::All,
                    Some(TypeRef::Unit) => RowShape::Discard,
                    _ => RowShape::First,
                };
                Ok(InvocationPlan::Query(QueryPlan {
                    language: *language,
                    template: template.clone(),
                    rows,
                }))
            }
        }
    }

    fn check_grpc_result(&self, server_streaming: bool) -> Result<(), UnsupportedTypeError> {
        let result = &self.operation.result;
        let message = match (server_streaming, result) {
            (true, TypeRef::Array(item)) => item.as_ref(),
            (false, ty) => ty,
            (true, ty) => {
                return Err(self.error("result", ty, "a streaming result must be a list of messages"));
            }
        };

        match message {
            TypeRef::Named(name)
                if matches!(self.schema.type_def(name), Some(TypeDef::Object { .. })) =>
            {
                Ok(())
            }
            ty => Err(self.error("result", ty, "gRPC results must be protobuf messages")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, Parameter};

    fn operation(binding: ProtocolBinding, params: Vec<Parameter>, result: TypeRef) -> SchemaOperation {
        SchemaOperation {
            id: "getVertex".to_string(),
            summary: None,
            params,
            result,
            binding,
            idempotent: true,
        }
    }

    fn param(name: &str, ty: TypeRef, location: ParameterLocation, required: bool) -> Parameter {
        Parameter {
            name: name.to_string(),
            ty,
            location,
            required,
        }
    }

    fn vertex_types() -> BTreeMap<String, TypeDef> {
        BTreeMap::from([
            (
                "Vertex".to_string(),
                TypeDef::Object {
                    fields: vec![
                        Field {
                            name: "id".to_string(),
                            ty: TypeRef::Named("VertexId".to_string()),
                            required: true,
                        },
                        Field {
                            name: "label".to_string(),
                            ty: TypeRef::String,
                            required: true,
                        },
                    ],
                },
            ),
            (
                "VertexId".to_string(),
                TypeDef::Alias {
                    target: TypeRef::String,
                },
            ),
            (
                "Blob".to_string(),
                TypeDef::Object {
                    fields: vec![Field {
                        name: "data".to_string(),
                        ty: TypeRef::Bytes,
                        required: true,
                    }],
                },
            ),
        ])
    }

    fn schema(operations: Vec<SchemaOperation>) -> Schema {
        Schema::new(
            "test".to_string(),
            "1".to_string(),
            crate::schema::SourceKind::OpenApi,
            operations,
            vertex_types(),
        )
        .unwrap()
    }

    fn rest_get() -> ProtocolBinding {
        ProtocolBinding::Rest {
            verb: Verb::Get,
            path: "/vertex/{id}".to_string(),
        }
    }

    fn gremlin() -> ProtocolBinding {
        ProtocolBinding::Query {
            language: QueryLanguage::Gremlin,
            template: "g.V(vid)".to_string(),
        }
    }

    #[test]
    fn test_rest_signature_and_plan() {
        let schema = schema(vec![operation(
            rest_get(),
            vec![
                param("id", TypeRef::Named("VertexId".to_string()), ParameterLocation::Path, true),
                param("type", TypeRef::String, ParameterLocation::Query, false),
            ],
            TypeRef::Named("Vertex".to_string()),
        )]);

        let stubs = synthesize(&schema).unwrap();
        let stub = stubs.get("getVertex").unwrap();

        assert_eq!(
            stub.signature.to_string(),
            "async fn get_vertex(&self, id: String, r#type: Option<String>) -> Result<Vertex, DispatchError>"
        );
        match &stub.plan {
            InvocationPlan::Rest(plan) => {
                assert_eq!(plan.path_params, ["id"]);
                assert_eq!(plan.query_params, ["type"]);
                assert!(plan.body_param.is_none());
                assert!(plan.expects_body);
            }
            other => panic!("Expected a REST plan, got {other:?}"),
        }
    }

    #[test]
    fn test_unit_result_expects_no_body() {
        let schema = schema(vec![operation(
            rest_get(),
            vec![param("id", TypeRef::String, ParameterLocation::Path, true)],
            TypeRef::Unit,
        )]);

        let stubs = synthesize(&schema).unwrap();
        match &stubs.get("getVertex").unwrap().plan {
            InvocationPlan::Rest(plan) => assert!(!plan.expects_body),
            other => panic!("Expected a REST plan, got {other:?}"),
        }
    }

    #[test]
    fn test_object_path_parameter_is_rejected() {
        let schema = schema(vec![operation(
            rest_get(),
            vec![param("id", TypeRef::Named("Vertex".to_string()), ParameterLocation::Path, true)],
            TypeRef::Unit,
        )]);

        let err = synthesize(&schema).unwrap_err();
        assert_eq!(err.operation, "getVertex");
        assert_eq!(err.protocol, Protocol::Rest);
        assert_eq!(err.context, "parameter 'id'");
    }

    #[test]
    fn test_unsupported_type_is_rejected() {
        let schema = schema(vec![operation(
            rest_get(),
            vec![],
            TypeRef::Unsupported("oneOf".to_string()),
        )]);

        let err = synthesize(&schema).unwrap_err();
        assert_eq!(err.context, "result");
        assert!(err.reason.contains("oneOf"));
    }

    #[test]
    fn test_undeclared_named_type_is_rejected() {
        let schema = schema(vec![operation(rest_get(), vec![], TypeRef::Named("Edge".to_string()))]);

        assert!(synthesize(&schema).is_err());
    }

    #[test]
    fn test_gremlin_rejects_nested_bytes() {
        let schema = schema(vec![operation(gremlin(), vec![], TypeRef::Named("Blob".to_string()))]);

        let err = synthesize(&schema).unwrap_err();
        assert_eq!(err.protocol, Protocol::Gremlin);
        assert!(err.context.contains("Blob.data"));
    }

    #[test]
    fn test_query_row_shape_follows_result() {
        let schema = schema(vec![operation(
            gremlin(),
            vec![param("vid", TypeRef::String, ParameterLocation::Binding, true)],
            TypeRef::array(TypeRef::Named("Vertex".to_string())),
        )]);

        let stubs = synthesize(&schema).unwrap();
        match &stubs.get("getVertex").unwrap().plan {
            InvocationPlan::Query(plan) => assert_eq!(plan.rows, RowShape::All),
            other => panic!("Expected a query plan, got {other:?}"),
        }
    }

    #[test]
    fn test_listing_is_ordered_by_operation_id() {
        let mut second = operation(rest_get(), vec![], TypeRef::Unit);
        second.id = "addVertex".to_string();
        let schema = schema(vec![
            operation(
                rest_get(),
                vec![param("id", TypeRef::String, ParameterLocation::Path, true)],
                TypeRef::Unit,
            ),
            second,
        ]);

        let stubs = synthesize(&schema).unwrap();
        let ids: Vec<_> = stubs.iter().map(StubDefinition::id).collect();

        assert_eq!(ids, ["addVertex", "getVertex"]);
        assert_eq!(stubs.to_string(), synthesize(&schema).unwrap().to_string());
    }
}
