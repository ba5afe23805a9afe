//! Cypher over the Neo4j HTTP transactional endpoint.
//!
//! Each invocation is a single auto-committed transaction:
//!
//! ```text
//! POST {base}/db/{database}/tx/commit
//! {"statements": [{"statement": "<template>", "parameters": {...}}]}
//! ```
//!
//! The response carries `results[].columns` and `results[].data[].row`; rows are zipped with
//! the column names into JSON objects. A row with a single column is unwrapped to its value.
use super::{
    CallError, TransportErrorKind, TransportInitError, classify_reqwest_error, http_client,
    parse_url, read_json,
};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::time::Duration;

/// Error codes of this class are safe to retry.
const TRANSIENT_PREFIX: &str = "Neo.TransientError.";

#[derive(Debug)]
pub struct CypherTransport {
    client: reqwest::Client,
    commit_url: String,
    headers: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<StatementError>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<RowData>,
}

#[derive(Debug, Deserialize)]
struct RowData {
    #[serde(default)]
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct StatementError {
    code: String,
    #[serde(default)]
    message: String,
}

impl CypherTransport {
    pub fn new(
        base_url: &str,
        database: &str,
        connect_timeout: Option<Duration>,
    ) -> Result<Self, TransportInitError> {
        parse_url(base_url)?;
        Ok(Self {
            client: http_client(connect_timeout)?,
            commit_url: format!(
                "{}/db/{}/tx/commit",
                base_url.trim_end_matches('/'),
                database
            ),
            headers: Vec::new(),
        })
    }

    /// Headers sent with every request, e.g. `Authorization`.
    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    pub fn commit_url(&self) -> &str {
        &self.commit_url
    }

    /// Runs a statement and returns its rows.
    pub(crate) async fn run(
        &self,
        statement: &str,
        parameters: &Map<String, Value>,
    ) -> Result<Vec<Value>, CallError> {
        let body = json!({
            "statements": [{ "statement": statement, "parameters": parameters }]
        });

        let mut request = self.client.post(&self.commit_url).json(&body);
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(classify_reqwest_error)?;
        let payload = read_json(response).await?;
        let response: CommitResponse = serde_json::from_value(payload)
            .map_err(|e| CallError::transport(TransportErrorKind::Protocol, e))?;

        if let Some(error) = response.errors.into_iter().next() {
            return Err(classify_error(error));
        }

        Ok(response
            .results
            .into_iter()
            .next()
            .map(rows_of)
            .unwrap_or_default())
    }
}

fn classify_error(error: StatementError) -> CallError {
    if error.code.starts_with(TRANSIENT_PREFIX) {
        CallError::transport(
            TransportErrorKind::Unavailable,
            format!("{}: {}", error.code, error.message),
        )
    } else {
        CallError::Invocation {
            details: Some(json!({ "code": error.code, "message": error.message })),
            status: error.code,
            message: error.message,
        }
    }
}

fn rows_of(result: StatementResult) -> Vec<Value> {
    let StatementResult { columns, data } = result;

    data.into_iter()
        .map(|RowData { row }| {
            if columns.len() == 1 {
                row.into_iter().next().unwrap_or(Value::Null)
            } else {
                Value::Object(columns.iter().cloned().zip(row).collect())
            }
        })
        .collect()
}
