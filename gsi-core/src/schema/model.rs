use std::fmt;

/// HTTP verb of a REST binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Verb {
    Get,
    Put,
    Post,
    Delete,
    Options,
    Head,
    Patch,
}

impl Verb {
    /// All verbs, in the order an OpenAPI path item declares its fields.
    pub const ALL: [Verb; 7] = [
        Verb::Get,
        Verb::Put,
        Verb::Post,
        Verb::Delete,
        Verb::Options,
        Verb::Head,
        Verb::Patch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Put => "PUT",
            Verb::Post => "POST",
            Verb::Delete => "DELETE",
            Verb::Options => "OPTIONS",
            Verb::Head => "HEAD",
            Verb::Patch => "PATCH",
        }
    }

    /// Whether repeating a request with this verb is safe by HTTP semantics.
    pub fn is_idempotent(&self) -> bool {
        !matches!(self, Verb::Post | Verb::Patch)
    }

    pub fn as_method(&self) -> http::Method {
        match self {
            Verb::Get => http::Method::GET,
            Verb::Put => http::Method::PUT,
            Verb::Post => http::Method::POST,
            Verb::Delete => http::Method::DELETE,
            Verb::Options => http::Method::OPTIONS,
            Verb::Head => http::Method::HEAD,
            Verb::Patch => http::Method::PATCH,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Graph query language understood by a query binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryLanguage {
    Cypher,
    Gremlin,
}

impl QueryLanguage {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryLanguage::Cypher => "cypher",
            QueryLanguage::Gremlin => "gremlin",
        }
    }
}

impl fmt::Display for QueryLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an operation reaches the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolBinding {
    Rest {
        verb: Verb,
        /// Path template, e.g. `/v1/graph/{graph_id}/vertex/{id}`.
        path: String,
    },
    Grpc {
        /// Fully qualified service name.
        service: String,
        method: String,
        client_streaming: bool,
        server_streaming: bool,
    },
    Query {
        language: QueryLanguage,
        template: String,
    },
}

impl fmt::Display for ProtocolBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolBinding::Rest { verb, path } => write!(f, "rest {verb} {path}"),
            ProtocolBinding::Grpc {
                service,
                method,
                client_streaming,
                server_streaming,
            } => {
                let shape = match (client_streaming, server_streaming) {
                    (false, false) => "unary",
                    (false, true) => "server-streaming",
                    (true, false) => "client-streaming",
                    (true, true) => "bidirectional",
                };
                write!(f, "grpc /{service}/{method} ({shape})")
            }
            ProtocolBinding::Query { language, template } => {
                write!(f, "{language} {template:?}")
            }
        }
    }
}

/// Where an argument is placed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    /// The whole request body (REST JSON body, or the message stream of a client-streaming RPC).
    Body,
    /// A field of the gRPC input message.
    Field,
    /// A named parameter of a query template.
    Binding,
}

impl fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParameterLocation::Path => "path",
            ParameterLocation::Query => "query",
            ParameterLocation::Header => "header",
            ParameterLocation::Body => "body",
            ParameterLocation::Field => "field",
            ParameterLocation::Binding => "binding",
        };
        f.write_str(name)
    }
}

/// A schema-level type, independent from any target language.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Unit,
    Any,
    String,
    Integer,
    Number,
    Boolean,
    Bytes,
    Array(Box<TypeRef>),
    /// String-keyed map.
    Map(Box<TypeRef>),
    /// An object, message, enum or alias declared in [`super::Schema::types`].
    Named(String),
    /// A schema construct that has no mapping; the payload says what it was.
    Unsupported(String),
}

impl TypeRef {
    pub fn array(item: TypeRef) -> Self {
        TypeRef::Array(Box::new(item))
    }

    pub fn map(value: TypeRef) -> Self {
        TypeRef::Map(Box::new(value))
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            TypeRef::String | TypeRef::Integer | TypeRef::Number | TypeRef::Boolean
        )
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Unit => f.write_str("unit"),
            TypeRef::Any => f.write_str("any"),
            TypeRef::String => f.write_str("string"),
            TypeRef::Integer => f.write_str("integer"),
            TypeRef::Number => f.write_str("number"),
            TypeRef::Boolean => f.write_str("boolean"),
            TypeRef::Bytes => f.write_str("bytes"),
            TypeRef::Array(item) => write!(f, "array<{item}>"),
            TypeRef::Map(value) => write!(f, "map<{value}>"),
            TypeRef::Named(name) => f.write_str(name),
            TypeRef::Unsupported(what) => write!(f, "unsupported({what})"),
        }
    }
}

/// One typed input of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub ty: TypeRef,
    pub location: ParameterLocation,
    pub required: bool,
}

/// A field of a named object type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: TypeRef,
    pub required: bool,
}

/// A named type declared by a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDef {
    Object { fields: Vec<Field> },
    Enum { values: Vec<String> },
    /// A named alias of another type (e.g. `VertexId: { type: string }`).
    Alias { target: TypeRef },
}

/// A single callable operation. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaOperation {
    pub id: String,
    pub summary: Option<String>,
    pub params: Vec<Parameter>,
    pub result: TypeRef,
    pub binding: ProtocolBinding,
    /// Whether the operation may be retried after a transient transport failure.
    pub idempotent: bool,
}

impl SchemaOperation {
    pub fn param(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }
}
