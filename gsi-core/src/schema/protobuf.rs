//! Mapping of a protobuf `DescriptorPool` into gRPC [`SchemaOperation`]s.
use super::{
    Field, Parameter, ParameterLocation, ProtocolBinding, Schema, SchemaOperation,
    SchemaParseError, SourceKind, TypeDef, TypeRef,
};
use prost_reflect::{
    Cardinality, DescriptorPool, FieldDescriptor, Kind, MessageDescriptor, MethodDescriptor,
    Value,
};
use prost_types::method_options::IdempotencyLevel;
use std::collections::BTreeMap;

/// Name of the parameter that carries the message stream of a client-streaming method.
pub(crate) const MESSAGES_PARAM: &str = "messages";

pub(crate) fn load(pool: DescriptorPool) -> Result<Schema, SchemaParseError> {
    let mut operations = Vec::new();
    let mut types = BTreeMap::new();

    for service in pool.services() {
        for method in service.methods() {
            collect_message(&method.input(), &mut types);
            collect_message(&method.output(), &mut types);
            operations.push(map_method(&method));
        }
    }

    let title = pool
        .services()
        .next()
        .map(|s| s.package_name().to_string())
        .unwrap_or_default();

    Ok(Schema::new(title, String::new(), SourceKind::Protobuf, operations, types)?
        .with_descriptor_pool(pool))
}

/// The identifier of a gRPC operation: `package.Service/Method`.
pub(crate) fn operation_id(method: &MethodDescriptor) -> String {
    format!("{}/{}", method.parent_service().full_name(), method.name())
}

fn map_method(method: &MethodDescriptor) -> SchemaOperation {
    let input = method.input();
    let output = TypeRef::Named(method.output().full_name().to_string());

    let params = if method.is_client_streaming() {
        vec![Parameter {
            name: MESSAGES_PARAM.to_string(),
            ty: TypeRef::array(TypeRef::Named(input.full_name().to_string())),
            location: ParameterLocation::Body,
            required: true,
        }]
    } else {
        input
            .fields()
            .map(|field| Parameter {
                name: field.name().to_string(),
                ty: field_type(&field),
                location: ParameterLocation::Field,
                required: field.cardinality() == Cardinality::Required,
            })
            .collect()
    };

    SchemaOperation {
        id: operation_id(method),
        summary: None,
        params,
        result: if method.is_server_streaming() {
            TypeRef::array(output)
        } else {
            output
        },
        binding: ProtocolBinding::Grpc {
            service: method.parent_service().full_name().to_string(),
            method: method.name().to_string(),
            client_streaming: method.is_client_streaming(),
            server_streaming: method.is_server_streaming(),
        },
        idempotent: is_idempotent(method),
    }
}

fn is_idempotent(method: &MethodDescriptor) -> bool {
    let options = method.options();
    let level = match options.get_field_by_name("idempotency_level").as_deref() {
        Some(Value::EnumNumber(level)) => *level,
        _ => IdempotencyLevel::IdempotencyUnknown as i32,
    };

    level == IdempotencyLevel::NoSideEffects as i32 || level == IdempotencyLevel::Idempotent as i32
}

fn field_type(field: &FieldDescriptor) -> TypeRef {
    if field.is_map() {
        let Kind::Message(entry) = field.kind() else {
            return TypeRef::Unsupported(format!("map field '{}'", field.full_name()));
        };
        return TypeRef::map(kind_type(&entry.map_entry_value_field().kind()));
    }

    let base = kind_type(&field.kind());
    if field.is_list() {
        TypeRef::array(base)
    } else {
        base
    }
}

fn kind_type(kind: &Kind) -> TypeRef {
    match kind {
        Kind::Double | Kind::Float => TypeRef::Number,
        Kind::Int32
        | Kind::Int64
        | Kind::Uint32
        | Kind::Uint64
        | Kind::Sint32
        | Kind::Sint64
        | Kind::Fixed32
        | Kind::Fixed64
        | Kind::Sfixed32
        | Kind::Sfixed64 => TypeRef::Integer,
        Kind::Bool => TypeRef::Boolean,
        Kind::String => TypeRef::String,
        Kind::Bytes => TypeRef::Bytes,
        Kind::Message(message) => well_known_type(message)
            .unwrap_or_else(|| TypeRef::Named(message.full_name().to_string())),
        Kind::Enum(enumeration) => TypeRef::Named(enumeration.full_name().to_string()),
    }
}

/// The JSON mapping of the `google.protobuf` well known types.
fn well_known_type(message: &MessageDescriptor) -> Option<TypeRef> {
    let ty = match message.full_name() {
        "google.protobuf.Timestamp" | "google.protobuf.Duration" | "google.protobuf.FieldMask" => {
            TypeRef::String
        }
        "google.protobuf.Struct" | "google.protobuf.Value" => TypeRef::Any,
        "google.protobuf.ListValue" => TypeRef::array(TypeRef::Any),
        "google.protobuf.Empty" => TypeRef::Any,
        "google.protobuf.StringValue" => TypeRef::String,
        "google.protobuf.BytesValue" => TypeRef::Bytes,
        "google.protobuf.BoolValue" => TypeRef::Boolean,
        "google.protobuf.DoubleValue" | "google.protobuf.FloatValue" => TypeRef::Number,
        "google.protobuf.Int32Value"
        | "google.protobuf.Int64Value"
        | "google.protobuf.UInt32Value"
        | "google.protobuf.UInt64Value" => TypeRef::Integer,
        "google.protobuf.Any" => TypeRef::Unsupported("google.protobuf.Any".to_string()),
        _ => return None,
    };
    Some(ty)
}

/// Registers a message, and every message and enum it references, as named types.
fn collect_message(message: &MessageDescriptor, types: &mut BTreeMap<String, TypeDef>) {
    if types.contains_key(message.full_name()) {
        return;
    }

    let fields = message
        .fields()
        .map(|field| Field {
            name: field.name().to_string(),
            ty: field_type(&field),
            required: field.cardinality() == Cardinality::Required,
        })
        .collect();
    types.insert(message.full_name().to_string(), TypeDef::Object { fields });

    for field in message.fields() {
        let kind = match field.kind() {
            Kind::Message(entry) if field.is_map() => entry.map_entry_value_field().kind(),
            kind => kind,
        };

        match kind {
            Kind::Message(nested) => collect_message(&nested, types),
            Kind::Enum(enumeration) => {
                types
                    .entry(enumeration.full_name().to_string())
                    .or_insert_with(|| TypeDef::Enum {
                        values: enumeration.values().map(|v| v.name().to_string()).collect(),
                    });
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_types::{
        DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet,
        MethodDescriptorProto, MethodOptions, ServiceDescriptorProto,
        field_descriptor_proto::{Label, Type},
    };

    fn string_field(name: &str, number: i32) -> FieldDescriptorProto {
        FieldDescriptorProto {
            name: Some(name.to_string()),
            number: Some(number),
            label: Some(Label::Optional as i32),
            r#type: Some(Type::String as i32),
            json_name: Some(name.to_string()),
            ..Default::default()
        }
    }

    fn pool() -> DescriptorPool {
        let file = FileDescriptorProto {
            name: Some("graph.proto".to_string()),
            package: Some("test.graph".to_string()),
            syntax: Some("proto3".to_string()),
            message_type: vec![
                DescriptorProto {
                    name: Some("GetVertexRequest".to_string()),
                    field: vec![string_field("id", 1)],
                    ..Default::default()
                },
                DescriptorProto {
                    name: Some("Vertex".to_string()),
                    field: vec![string_field("id", 1), string_field("label", 2)],
                    ..Default::default()
                },
            ],
            service: vec![ServiceDescriptorProto {
                name: Some("GraphService".to_string()),
                method: vec![
                    MethodDescriptorProto {
                        name: Some("GetVertex".to_string()),
                        input_type: Some(".test.graph.GetVertexRequest".to_string()),
                        output_type: Some(".test.graph.Vertex".to_string()),
                        options: Some(MethodOptions {
                            idempotency_level: Some(IdempotencyLevel::NoSideEffects as i32),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                    MethodDescriptorProto {
                        name: Some("PutVertices".to_string()),
                        input_type: Some(".test.graph.Vertex".to_string()),
                        output_type: Some(".test.graph.Vertex".to_string()),
                        client_streaming: Some(true),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }],
            ..Default::default()
        };

        DescriptorPool::from_file_descriptor_set(FileDescriptorSet { file: vec![file] }).unwrap()
    }

    #[test]
    fn test_methods_become_operations() {
        let schema = load(pool()).unwrap();
        let ids: Vec<_> = schema.operations().iter().map(|op| op.id.as_str()).collect();

        assert_eq!(
            ids,
            [
                "test.graph.GraphService/GetVertex",
                "test.graph.GraphService/PutVertices"
            ]
        );
        assert_eq!(schema.source(), SourceKind::Protobuf);
        assert_eq!(schema.descriptor_pools().len(), 1);
    }

    #[test]
    fn test_unary_method_mapping() {
        let schema = load(pool()).unwrap();
        let op = schema.operation("test.graph.GraphService/GetVertex").unwrap();

        assert_eq!(op.params.len(), 1);
        assert_eq!(op.params[0].name, "id");
        assert_eq!(op.params[0].location, ParameterLocation::Field);
        assert_eq!(op.result, TypeRef::Named("test.graph.Vertex".to_string()));
        assert!(op.idempotent);
    }

    #[test]
    fn test_client_streaming_method_mapping() {
        let schema = load(pool()).unwrap();
        let op = schema.operation("test.graph.GraphService/PutVertices").unwrap();

        assert_eq!(op.params.len(), 1);
        assert_eq!(op.params[0].name, MESSAGES_PARAM);
        assert_eq!(
            op.params[0].ty,
            TypeRef::array(TypeRef::Named("test.graph.Vertex".to_string()))
        );
        assert!(!op.idempotent);
    }

    #[test]
    fn test_message_types_are_collected() {
        let schema = load(pool()).unwrap();

        match schema.type_def("test.graph.Vertex").unwrap() {
            TypeDef::Object { fields } => {
                let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
                assert_eq!(names, ["id", "label"]);
            }
            other => panic!("Expected object, got {other:?}"),
        }
        assert!(schema.type_def("test.graph.GetVertexRequest").is_some());
    }
}
