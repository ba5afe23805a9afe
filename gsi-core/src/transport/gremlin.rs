//! Gremlin over the Gremlin Server HTTP endpoint.
//!
//! A script is submitted as `{"gremlin": "<template>", "bindings": {...}}`. The server answers
//! with a GraphSON document whose `result.data` holds the traversal results; typed GraphSON
//! values are reduced to plain JSON by [`graphson::untype`].
use super::{
    CallError, TransportErrorKind, TransportInitError, classify_reqwest_error, http_client,
    parse_url, read_json,
};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::time::Duration;

#[derive(Debug)]
pub struct GremlinTransport {
    client: reqwest::Client,
    endpoint: String,
    headers: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
struct GremlinResponse {
    status: ResponseStatus,
    #[serde(default)]
    result: ResponseResult,
}

#[derive(Debug, Deserialize)]
struct ResponseStatus {
    code: u16,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseResult {
    #[serde(default)]
    data: Value,
}

impl GremlinTransport {
    pub fn new(endpoint: &str, connect_timeout: Option<Duration>) -> Result<Self, TransportInitError> {
        parse_url(endpoint)?;
        Ok(Self {
            client: http_client(connect_timeout)?,
            endpoint: endpoint.to_string(),
            headers: Vec::new(),
        })
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    /// Submits a script and returns its results, one value per traverser.
    pub(crate) async fn submit(
        &self,
        script: &str,
        bindings: &Map<String, Value>,
    ) -> Result<Vec<Value>, CallError> {
        let body = json!({ "gremlin": script, "bindings": bindings });

        let mut request = self.client.post(&self.endpoint).json(&body);
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(classify_reqwest_error)?;
        let payload = read_json(response).await?;
        let response: GremlinResponse = serde_json::from_value(payload)
            .map_err(|e| CallError::transport(TransportErrorKind::Protocol, e))?;

        if response.status.code >= 400 {
            return Err(CallError::Invocation {
                status: response.status.code.to_string(),
                message: response.status.message,
                details: None,
            });
        }

        Ok(match graphson::untype(response.result.data) {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            single => vec![single],
        })
    }
}

pub mod graphson {
    //! Conversion of GraphSON 2/3 typed values into plain JSON.
    //!
    //! | GraphSON                     | JSON                                        |
    //! |------------------------------|---------------------------------------------|
    //! | `g:Int32`, `g:Double`, ...   | the number                                  |
    //! | `g:List`, `g:Set`            | array                                       |
    //! | `g:Map` (flat key/value list)| object, non-string keys are rendered as JSON |
    //! | `g:Vertex`                   | `{id, label, properties}`                   |
    //! | `g:Edge`                     | `{id, label, outV, inV, properties}`        |
    //! | `g:VertexProperty`, `g:Property` | the property value                      |
    //! | anything else                | its untyped `@value`                        |
    use serde_json::{Map, Value};

    const TYPE_KEY: &str = "@type";
    const VALUE_KEY: &str = "@value";

    pub fn untype(value: Value) -> Value {
        match value {
            Value::Array(items) => Value::Array(items.into_iter().map(untype).collect()),
            Value::Object(mut object) => {
                let ty = match object.get(TYPE_KEY) {
                    Some(Value::String(ty)) if object.len() == 2 && object.contains_key(VALUE_KEY) => {
                        Some(ty.clone())
                    }
                    _ => None,
                };

                match ty {
                    Some(ty) => untype_typed(&ty, object.remove(VALUE_KEY).unwrap_or(Value::Null)),
                    None => Value::Object(object.into_iter().map(|(k, v)| (k, untype(v))).collect()),
                }
            }
            scalar => scalar,
        }
    }

    fn untype_typed(ty: &str, value: Value) -> Value {
        match ty {
            "g:List" | "g:Set" | "g:BulkSet" => untype(value),
            "g:Map" => untype_map(value),
            "g:Vertex" => untype_element(value, &["id", "label"]),
            "g:Edge" => untype_element(value, &["id", "label", "outV", "outVLabel", "inV", "inVLabel"]),
            "g:VertexProperty" | "g:Property" => match value {
                Value::Object(mut object) => untype(object.remove("value").unwrap_or(Value::Null)),
                other => untype(other),
            },
            "g:Path" => match value {
                Value::Object(object) => {
                    Value::Object(object.into_iter().map(|(k, v)| (k, untype(v))).collect())
                }
                other => untype(other),
            },
            _ => untype(value),
        }
    }

    fn untype_map(value: Value) -> Value {
        let Value::Array(items) = value else {
            return untype(value);
        };

        let mut object = Map::new();
        let mut items = items.into_iter();
        while let (Some(key), Some(value)) = (items.next(), items.next()) {
            let key = match untype(key) {
                Value::String(key) => key,
                other => other.to_string(),
            };
            object.insert(key, untype(value));
        }
        Value::Object(object)
    }

    /// Vertices and edges: their identity fields plus a flattened `properties` object.
    fn untype_element(value: Value, keys: &[&str]) -> Value {
        let Value::Object(mut element) = value else {
            return untype(value);
        };

        let mut out = Map::new();
        for key in keys {
            if let Some(value) = element.remove(*key) {
                out.insert(key.to_string(), untype(value));
            }
        }

        let properties = match element.remove("properties") {
            Some(Value::Object(properties)) => properties
                .into_iter()
                .map(|(name, value)| {
                    // Vertex properties are multi-valued lists, edge properties are single values.
                    let value = match untype(value) {
                        Value::Array(mut values) if values.len() == 1 => values.remove(0),
                        other => other,
                    };
                    (name, value)
                })
                .collect(),
            _ => Map::new(),
        };
        out.insert("properties".to_string(), Value::Object(properties));

        Value::Object(out)
    }

}
