//! # Schema Loader
//!
//! Parses interface definitions into an in-memory [`Schema`]: an ordered list of
//! [`SchemaOperation`]s plus the named types they reference.
//!
//! Two input formats are supported:
//!
//! * **OpenAPI 3.x** documents, as JSON or YAML. Operations are bound to REST, unless they carry
//!   the `x-graph-query` extension, which binds them to a graph query protocol instead.
//! * **Protobuf** `FileDescriptorSet`s (the output of `protoc --descriptor_set_out`, or of the
//!   `build-proto` binary that the `gsi` crate builds with its `gen-proto` feature). Every
//!   service method becomes a gRPC operation.
//!
//! Loading has no side effects besides reading the input.
mod model;
mod openapi;
mod protobuf;

pub use model::*;

use crate::{stub::snake_ident, transport::Protocol};
use prost_reflect::{DescriptorError, DescriptorPool};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum SchemaParseError {
    #[error("Failed to read schema file '{path}': '{source}'")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Unrecognized schema file extension for '{0}', expected .json, .yaml, .yml, .bin, .pb or .desc")]
    UnknownFormat(PathBuf),
    #[error("Malformed OpenAPI JSON document: '{0}'")]
    Json(#[from] serde_json::Error),
    #[error("Malformed OpenAPI YAML document: '{0}'")]
    Yaml(String),
    #[error("Unsupported OpenAPI version '{0}', expected 3.x")]
    UnsupportedVersion(String),
    #[error("Failed to decode file descriptor set: '{0}'")]
    Descriptor(#[from] DescriptorError),
    #[error("Operation {verb} '{path}' has no operationId")]
    MissingOperationId { verb: Verb, path: String },
    #[error("Operation '{0}' is declared more than once")]
    DuplicateOperation(String),
    #[error("Operations '{first}' and '{second}' both map to the {protocol} method '{method}'")]
    MethodNameClash {
        first: String,
        second: String,
        protocol: Protocol,
        method: String,
    },
    #[error("Invalid schema at '{context}': {message}")]
    Invalid { context: String, message: String },
}

/// The format a schema was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    OpenApi,
    Protobuf,
    /// Several schemas combined with [`Schema::merge`].
    Merged,
}

/// An ordered set of operations and the named types they reference.
#[derive(Debug, Clone)]
pub struct Schema {
    title: String,
    version: String,
    source: SourceKind,
    operations: Vec<SchemaOperation>,
    types: BTreeMap<String, TypeDef>,
    descriptor_pools: Vec<DescriptorPool>,
}

impl Schema {
    pub(crate) fn new(
        title: String,
        version: String,
        source: SourceKind,
        operations: Vec<SchemaOperation>,
        types: BTreeMap<String, TypeDef>,
    ) -> Result<Self, SchemaParseError> {
        ensure_unique_ids(&operations)?;
        Ok(Self {
            title,
            version,
            source,
            operations,
            types,
            descriptor_pools: Vec::new(),
        })
    }

    /// Parses an OpenAPI 3.x document in JSON format.
    pub fn from_openapi_json(document: &str) -> Result<Self, SchemaParseError> {
        let document = serde_json::from_str(document)?;
        openapi::load(document)
    }

    /// Parses an OpenAPI 3.x document in YAML format.
    pub fn from_openapi_yaml(document: &str) -> Result<Self, SchemaParseError> {
        let document =
            serde_saphyr::from_str(document).map_err(|e| SchemaParseError::Yaml(e.to_string()))?;
        openapi::load(document)
    }

    /// Decodes a binary `FileDescriptorSet`.
    pub fn from_descriptor_set(bytes: &[u8]) -> Result<Self, SchemaParseError> {
        let pool = DescriptorPool::decode(bytes)?;
        Self::from_descriptor_pool(pool)
    }

    /// Builds a schema from an already decoded descriptor pool.
    pub fn from_descriptor_pool(pool: DescriptorPool) -> Result<Self, SchemaParseError> {
        protobuf::load(pool)
    }

    /// Reads a schema file, picking the format from its extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SchemaParseError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        let read_err = |source| SchemaParseError::Io {
            path: path.to_path_buf(),
            source,
        };

        match extension.as_deref() {
            Some("json") => Self::from_openapi_json(&std::fs::read_to_string(path).map_err(read_err)?),
            Some("yaml" | "yml") => {
                Self::from_openapi_yaml(&std::fs::read_to_string(path).map_err(read_err)?)
            }
            Some("bin" | "pb" | "desc") => {
                Self::from_descriptor_set(&std::fs::read(path).map_err(read_err)?)
            }
            _ => Err(SchemaParseError::UnknownFormat(path.to_path_buf())),
        }
    }

    /// Combines two schemas, e.g. an OpenAPI document for REST and a descriptor set for gRPC.
    ///
    /// Operation ids must stay unique across both inputs. Types are merged by name, the
    /// receiver's definition wins on conflicts.
    pub fn merge(mut self, other: Schema) -> Result<Self, SchemaParseError> {
        self.operations.extend(other.operations);
        ensure_unique_ids(&self.operations)?;

        for (name, def) in other.types {
            self.types.entry(name).or_insert(def);
        }
        self.descriptor_pools.extend(other.descriptor_pools);

        if self.title.is_empty() {
            self.title = other.title;
            self.version = other.version;
        }
        self.source = SourceKind::Merged;

        Ok(self)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    /// Operations in declaration order.
    pub fn operations(&self) -> &[SchemaOperation] {
        &self.operations
    }

    pub fn operation(&self, id: &str) -> Option<&SchemaOperation> {
        self.operations.iter().find(|op| op.id == id)
    }

    pub fn types(&self) -> &BTreeMap<String, TypeDef> {
        &self.types
    }

    pub fn type_def(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    /// Descriptor pools backing the gRPC operations of this schema.
    pub fn descriptor_pools(&self) -> &[DescriptorPool] {
        &self.descriptor_pools
    }

    pub(crate) fn with_descriptor_pool(mut self, pool: DescriptorPool) -> Self {
        self.descriptor_pools.push(pool);
        self
    }

    /// Follows aliases until a non-alias type is reached.
    ///
    /// Returns `None` if a named type is not declared, or if aliases form a cycle.
    pub fn resolve<'a>(&'a self, ty: &'a TypeRef) -> Option<&'a TypeRef> {
        let mut current = ty;
        let mut seen = HashSet::new();

        while let TypeRef::Named(name) = current {
            match self.types.get(name)? {
                TypeDef::Alias { target } => {
                    if !seen.insert(name.as_str()) {
                        return None;
                    }
                    current = target;
                }
                TypeDef::Object { .. } | TypeDef::Enum { .. } => return Some(current),
            }
        }

        Some(current)
    }
}

/// Operation ids must be unique, and so must the stub method names they map to. gRPC methods
/// are scoped by their service, every other protocol has a single scope.
fn ensure_unique_ids(operations: &[SchemaOperation]) -> Result<(), SchemaParseError> {
    let mut seen = HashSet::new();
    let mut methods = HashMap::new();
    for op in operations {
        if !seen.insert(op.id.as_str()) {
            return Err(SchemaParseError::DuplicateOperation(op.id.clone()));
        }

        let protocol = Protocol::of(&op.binding);
        let scope = match &op.binding {
            ProtocolBinding::Grpc { service, .. } => service.as_str(),
            _ => "",
        };
        let method = snake_ident(&op.id);
        if let Some(first) = methods.insert((protocol, scope, method.clone()), op.id.as_str()) {
            return Err(SchemaParseError::MethodNameClash {
                first: first.to_string(),
                second: op.id.clone(),
                protocol,
                method,
            });
        }
    }
    Ok(())
}
