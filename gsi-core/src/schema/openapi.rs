//! OpenAPI 3.x document model and its mapping into [`SchemaOperation`]s.
use super::{
    Field, Parameter, ParameterLocation, ProtocolBinding, QueryLanguage, Schema, SchemaOperation,
    SchemaParseError, SourceKind, TypeDef, TypeRef, Verb,
};
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::BTreeMap;

const SCHEMA_REF_PREFIX: &str = "#/components/schemas/";
const PARAMETER_REF_PREFIX: &str = "#/components/parameters/";
const REQUEST_BODY_REF_PREFIX: &str = "#/components/requestBodies/";
const RESPONSE_REF_PREFIX: &str = "#/components/responses/";

/// Name of the parameter that carries a JSON request body.
pub(crate) const BODY_PARAM: &str = "body";

/// Response codes checked, in order, to find the declared result of an operation.
const SUCCESS_CODES: [&str; 6] = ["200", "201", "202", "203", "204", "2XX"];

#[derive(Debug, Deserialize)]
pub(crate) struct Document {
    openapi: String,
    #[serde(default)]
    info: Info,
    #[serde(default)]
    paths: IndexMap<String, PathItem>,
    #[serde(default)]
    components: Components,
}

#[derive(Debug, Default, Deserialize)]
struct Info {
    #[serde(default)]
    title: String,
    #[serde(default)]
    version: String,
}

#[derive(Debug, Default, Deserialize)]
struct Components {
    #[serde(default)]
    schemas: IndexMap<String, SchemaObject>,
    #[serde(default)]
    parameters: IndexMap<String, ParameterObject>,
    #[serde(default, rename = "requestBodies")]
    request_bodies: IndexMap<String, RequestBody>,
    #[serde(default)]
    responses: IndexMap<String, Response>,
}

#[derive(Debug, Default, Deserialize)]
struct PathItem {
    #[serde(default)]
    parameters: Vec<MaybeRef<ParameterObject>>,
    get: Option<Operation>,
    put: Option<Operation>,
    post: Option<Operation>,
    delete: Option<Operation>,
    options: Option<Operation>,
    head: Option<Operation>,
    patch: Option<Operation>,
}

impl PathItem {
    fn operation(&self, verb: Verb) -> Option<&Operation> {
        match verb {
            Verb::Get => self.get.as_ref(),
            Verb::Put => self.put.as_ref(),
            Verb::Post => self.post.as_ref(),
            Verb::Delete => self.delete.as_ref(),
            Verb::Options => self.options.as_ref(),
            Verb::Head => self.head.as_ref(),
            Verb::Patch => self.patch.as_ref(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Operation {
    #[serde(rename = "operationId")]
    operation_id: Option<String>,
    summary: Option<String>,
    #[serde(default)]
    parameters: Vec<MaybeRef<ParameterObject>>,
    #[serde(rename = "requestBody")]
    request_body: Option<MaybeRef<RequestBody>>,
    #[serde(default)]
    responses: IndexMap<String, MaybeRef<Response>>,
    #[serde(rename = "x-idempotent")]
    idempotent: Option<bool>,
    #[serde(rename = "x-graph-query")]
    graph_query: Option<GraphQuery>,
}

/// The `x-graph-query` extension: binds an operation to a graph query template.
#[derive(Debug, Deserialize)]
struct GraphQuery {
    language: QueryLanguageName,
    template: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum QueryLanguageName {
    Cypher,
    Gremlin,
}

impl From<QueryLanguageName> for QueryLanguage {
    fn from(value: QueryLanguageName) -> Self {
        match value {
            QueryLanguageName::Cypher => QueryLanguage::Cypher,
            QueryLanguageName::Gremlin => QueryLanguage::Gremlin,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ParameterObject {
    name: String,
    #[serde(rename = "in")]
    location: String,
    #[serde(default)]
    required: bool,
    schema: Option<SchemaObject>,
}

#[derive(Debug, Clone, Deserialize)]
struct RequestBody {
    #[serde(default)]
    content: IndexMap<String, MediaType>,
    #[serde(default)]
    required: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct Response {
    #[serde(default)]
    content: IndexMap<String, MediaType>,
}

#[derive(Debug, Clone, Deserialize)]
struct MediaType {
    schema: Option<SchemaObject>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum MaybeRef<T> {
    Ref {
        #[serde(rename = "$ref")]
        reference: String,
    },
    Item(T),
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SchemaObject {
    #[serde(rename = "$ref")]
    reference: Option<String>,
    /// A string, or a list of strings in OpenAPI 3.1.
    #[serde(rename = "type")]
    kind: Option<serde_json::Value>,
    format: Option<String>,
    items: Option<Box<SchemaObject>>,
    #[serde(default)]
    properties: IndexMap<String, SchemaObject>,
    #[serde(default)]
    required: Vec<String>,
    #[serde(rename = "additionalProperties")]
    additional_properties: Option<AdditionalProperties>,
    #[serde(rename = "enum")]
    enum_values: Option<Vec<serde_json::Value>>,
    #[serde(rename = "oneOf")]
    one_of: Option<Vec<SchemaObject>>,
    #[serde(rename = "anyOf")]
    any_of: Option<Vec<SchemaObject>>,
    #[serde(rename = "allOf")]
    all_of: Option<Vec<SchemaObject>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum AdditionalProperties {
    Flag(bool),
    Schema(Box<SchemaObject>),
}

impl SchemaObject {
    /// The declared primitive type, ignoring `null` in OpenAPI 3.1 type lists.
    fn primitive(&self) -> Option<&str> {
        match self.kind.as_ref()? {
            serde_json::Value::String(kind) => Some(kind.as_str()),
            serde_json::Value::Array(kinds) => kinds
                .iter()
                .filter_map(|k| k.as_str())
                .find(|k| *k != "null"),
            _ => None,
        }
    }
}

pub(crate) fn load(document: Document) -> Result<Schema, SchemaParseError> {
    if !document.openapi.starts_with("3.") {
        return Err(SchemaParseError::UnsupportedVersion(document.openapi));
    }

    let mut operations = Vec::new();

    for (path, item) in &document.paths {
        for verb in Verb::ALL {
            let Some(operation) = item.operation(verb) else {
                continue;
            };

            operations.push(map_operation(
                &document.components,
                path,
                verb,
                &item.parameters,
                operation,
            )?);
        }
    }

    let types = document
        .components
        .schemas
        .iter()
        .map(|(name, schema)| (name.clone(), type_def(schema)))
        .collect::<BTreeMap<_, _>>();

    Schema::new(
        document.info.title,
        document.info.version,
        SourceKind::OpenApi,
        operations,
        types,
    )
}

fn map_operation(
    components: &Components,
    path: &str,
    verb: Verb,
    shared_params: &[MaybeRef<ParameterObject>],
    operation: &Operation,
) -> Result<SchemaOperation, SchemaParseError> {
    let id = operation
        .operation_id
        .clone()
        .ok_or_else(|| SchemaParseError::MissingOperationId {
            verb,
            path: path.to_string(),
        })?;

    let context = format!("{verb} {path}");

    // Operation-level parameters override path-level ones with the same name and location.
    let mut declared: IndexMap<(String, String), ParameterObject> = IndexMap::new();
    for param in shared_params.iter().chain(&operation.parameters) {
        let param = resolve_parameter(components, param, &context)?;
        declared.insert((param.name.clone(), param.location.clone()), param);
    }

    let binding = match &operation.graph_query {
        Some(query) => ProtocolBinding::Query {
            language: query.language.into(),
            template: query.template.clone(),
        },
        None => ProtocolBinding::Rest {
            verb,
            path: path.to_string(),
        },
    };
    let is_query = matches!(binding, ProtocolBinding::Query { .. });

    let mut params = Vec::with_capacity(declared.len() + 1);
    for param in declared.into_values() {
        let location = if is_query {
            ParameterLocation::Binding
        } else {
            parse_location(&param.location, &context)?
        };

        params.push(Parameter {
            ty: param.schema.as_ref().map_or(TypeRef::Any, type_ref),
            required: param.required || location == ParameterLocation::Path,
            name: param.name,
            location,
        });
    }

    if !is_query {
        check_path_template(path, &params, &context)?;

        if let Some(body) = &operation.request_body {
            let body = resolve_request_body(components, body, &context)?;
            if let Some(ty) = json_content(&body.content) {
                params.push(Parameter {
                    name: BODY_PARAM.to_string(),
                    ty,
                    location: ParameterLocation::Body,
                    required: body.required,
                });
            }
        }
    }

    Ok(SchemaOperation {
        id,
        summary: operation.summary.clone(),
        params,
        result: result_type(components, &operation.responses, &context)?,
        binding,
        idempotent: operation.idempotent.unwrap_or(verb.is_idempotent()),
    })
}

fn parse_location(location: &str, context: &str) -> Result<ParameterLocation, SchemaParseError> {
    match location {
        "path" => Ok(ParameterLocation::Path),
        "query" => Ok(ParameterLocation::Query),
        "header" => Ok(ParameterLocation::Header),
        other => Err(SchemaParseError::Invalid {
            context: context.to_string(),
            message: format!("parameter location '{other}' is not supported"),
        }),
    }
}

/// Every `{placeholder}` of the path must be declared as a path parameter.
fn check_path_template(
    path: &str,
    params: &[Parameter],
    context: &str,
) -> Result<(), SchemaParseError> {
    for placeholder in path_placeholders(path) {
        let declared = params
            .iter()
            .any(|p| p.location == ParameterLocation::Path && p.name == placeholder);

        if !declared {
            return Err(SchemaParseError::Invalid {
                context: context.to_string(),
                message: format!("path placeholder '{{{placeholder}}}' has no path parameter"),
            });
        }
    }
    Ok(())
}

pub(crate) fn path_placeholders(path: &str) -> impl Iterator<Item = &str> {
    path.split('{')
        .skip(1)
        .filter_map(|segment| segment.split_once('}').map(|(name, _)| name))
}

fn resolve_parameter(
    components: &Components,
    param: &MaybeRef<ParameterObject>,
    context: &str,
) -> Result<ParameterObject, SchemaParseError> {
    match param {
        MaybeRef::Item(param) => Ok(param.clone()),
        MaybeRef::Ref { reference } => lookup(
            &components.parameters,
            reference,
            PARAMETER_REF_PREFIX,
            context,
        ),
    }
}

fn resolve_request_body(
    components: &Components,
    body: &MaybeRef<RequestBody>,
    context: &str,
) -> Result<RequestBody, SchemaParseError> {
    match body {
        MaybeRef::Item(body) => Ok(body.clone()),
        MaybeRef::Ref { reference } => lookup(
            &components.request_bodies,
            reference,
            REQUEST_BODY_REF_PREFIX,
            context,
        ),
    }
}

fn lookup<T: Clone>(
    table: &IndexMap<String, T>,
    reference: &str,
    prefix: &str,
    context: &str,
) -> Result<T, SchemaParseError> {
    reference
        .strip_prefix(prefix)
        .and_then(|name| table.get(name))
        .cloned()
        .ok_or_else(|| SchemaParseError::Invalid {
            context: context.to_string(),
            message: format!("unresolved reference '{reference}'"),
        })
}

fn result_type(
    components: &Components,
    responses: &IndexMap<String, MaybeRef<Response>>,
    context: &str,
) -> Result<TypeRef, SchemaParseError> {
    let chosen = SUCCESS_CODES
        .iter()
        .find_map(|code| responses.get(*code))
        .or_else(|| {
            responses
                .iter()
                .find(|(code, _)| code.starts_with('2'))
                .map(|(_, response)| response)
        })
        .or_else(|| responses.get("default"));

    let Some(response) = chosen else {
        return Ok(TypeRef::Unit);
    };

    let response = match response {
        MaybeRef::Item(response) => response.clone(),
        MaybeRef::Ref { reference } => {
            lookup(&components.responses, reference, RESPONSE_REF_PREFIX, context)?
        }
    };

    Ok(json_content(&response.content).unwrap_or(TypeRef::Unit))
}

/// The type of the JSON media type of a content map, if there is one.
fn json_content(content: &IndexMap<String, MediaType>) -> Option<TypeRef> {
    content
        .iter()
        .find(|(mime, _)| is_json(mime))
        .and_then(|(_, media)| media.schema.as_ref())
        .map(type_ref)
}

fn is_json(mime: &str) -> bool {
    let essence = mime.split(';').next().unwrap_or_default().trim();
    essence == "application/json" || essence.ends_with("+json")
}

fn type_ref(schema: &SchemaObject) -> TypeRef {
    if let Some(reference) = &schema.reference {
        return match reference.strip_prefix(SCHEMA_REF_PREFIX) {
            Some(name) => TypeRef::Named(name.to_string()),
            None => TypeRef::Unsupported(format!("reference '{reference}'")),
        };
    }

    if schema.one_of.is_some() || schema.any_of.is_some() {
        return TypeRef::Unsupported("oneOf/anyOf composition".to_string());
    }

    if let Some(all_of) = &schema.all_of {
        return match all_of.as_slice() {
            [single] => type_ref(single),
            _ => TypeRef::Unsupported("allOf composition".to_string()),
        };
    }

    match schema.primitive() {
        Some("string") => match schema.format.as_deref() {
            Some("binary" | "byte") => TypeRef::Bytes,
            _ => TypeRef::String,
        },
        Some("integer") => TypeRef::Integer,
        Some("number") => TypeRef::Number,
        Some("boolean") => TypeRef::Boolean,
        Some("array") => TypeRef::array(schema.items.as_deref().map_or(TypeRef::Any, type_ref)),
        Some("object") | None => match &schema.additional_properties {
            Some(AdditionalProperties::Schema(value)) if schema.properties.is_empty() => {
                TypeRef::map(type_ref(value))
            }
            _ => TypeRef::Any,
        },
        Some("file") => TypeRef::Unsupported("file upload".to_string()),
        Some(other) => TypeRef::Unsupported(format!("type '{other}'")),
    }
}

fn type_def(schema: &SchemaObject) -> TypeDef {
    if let Some(values) = &schema.enum_values {
        return TypeDef::Enum {
            values: values
                .iter()
                .map(|v| match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
        };
    }

    if !schema.properties.is_empty() {
        return TypeDef::Object {
            fields: schema
                .properties
                .iter()
                .map(|(name, property)| Field {
                    name: name.clone(),
                    ty: type_ref(property),
                    required: schema.required.contains(name),
                })
                .collect(),
        };
    }

    match type_ref(schema) {
        // A bare `type: object` declares an object without known fields.
        TypeRef::Any if schema.primitive() == Some("object") => TypeDef::Object { fields: Vec::new() },
        target => TypeDef::Alias { target },
    }
}
