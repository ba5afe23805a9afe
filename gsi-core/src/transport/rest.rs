//! REST over HTTP(S), with JSON bodies.
use super::{
    CallError, TransportInitError, classify_reqwest_error, declares_json, http_client, parse_url,
    read_json,
};
use crate::stub::RestPlan;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::{Map, Value};
use std::time::Duration;

/// Characters left as-is in a path segment: RFC 3986 unreserved characters.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Debug)]
pub struct RestTransport {
    client: reqwest::Client,
    base_url: String,
    headers: Vec<(String, String)>,
}

impl RestTransport {
    /// A transport for the service at `base_url`. Operation paths are appended to it.
    pub fn new(base_url: &str, connect_timeout: Option<Duration>) -> Result<Self, TransportInitError> {
        parse_url(base_url)?;
        Ok(Self {
            client: http_client(connect_timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            headers: Vec::new(),
        })
    }

    /// Headers sent with every request, before the operation's own header parameters.
    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) async fn call(
        &self,
        plan: &RestPlan,
        arguments: &Map<String, Value>,
    ) -> Result<Value, CallError> {
        let url = format!("{}{}", self.base_url, render_path(&plan.path, arguments)?);
        let mut request = self.client.request(plan.verb.as_method(), url);

        let mut query = Vec::new();
        for name in &plan.query_params {
            match arguments.get(name) {
                None | Some(Value::Null) => {}
                Some(Value::Array(items)) => {
                    for item in items {
                        query.push((name.as_str(), scalar_to_string(name, item)?));
                    }
                }
                Some(value) => query.push((name.as_str(), scalar_to_string(name, value)?)),
            }
        }
        if !query.is_empty() {
            request = request.query(&query);
        }

        for (name, value) in &self.headers {
            request = request.header(name, value);
        }
        for name in &plan.header_params {
            if let Some(value) = arguments.get(name).filter(|v| !v.is_null()) {
                request = request.header(name, scalar_to_string(name, value)?);
            }
        }

        if let Some(body) = plan.body_param.as_ref().and_then(|name| arguments.get(name)) {
            request = request.json(body);
        }

        let response = request.send().await.map_err(classify_reqwest_error)?;
        if response.status().is_success()
            && (!plan.expects_body || !declares_json(response.headers()))
        {
            response.bytes().await.map_err(classify_reqwest_error)?;
            return Ok(Value::Null);
        }
        read_json(response).await
    }
}

/// Substitutes `{name}` placeholders with percent-encoded arguments.
fn render_path(template: &str, arguments: &Map<String, Value>) -> Result<String, CallError> {
    let mut path = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let name = &rest[start + 1..start + len];
        let value = arguments
            .get(name)
            .filter(|v| !v.is_null())
            .ok_or_else(|| CallError::Encode(format!("missing path parameter '{name}'")))?;

        path.push_str(&rest[..start]);
        path.extend(utf8_percent_encode(&scalar_to_string(name, value)?, PATH_SEGMENT));
        rest = &rest[start + len + 1..];
    }
    path.push_str(rest);

    Ok(path)
}

fn scalar_to_string(name: &str, value: &Value) -> Result<String, CallError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(CallError::Encode(format!(
            "argument '{name}' must be a string, number or boolean, got {other}"
        ))),
    }
}
