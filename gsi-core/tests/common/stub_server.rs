//! An axum server standing in for the REST, Cypher and Gremlin endpoints of a graph service.
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

#[derive(Clone, Default)]
pub struct ServerState {
    pub flaky_gets: Arc<AtomicUsize>,
    pub flaky_posts: Arc<AtomicUsize>,
    pub flaky_statements: Arc<AtomicUsize>,
    pub flaky_scripts: Arc<AtomicUsize>,
    pub statements: Arc<Mutex<Vec<Value>>>,
}

pub struct StubServer {
    pub url: String,
    pub state: ServerState,
    handle: JoinHandle<()>,
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub async fn spawn() -> StubServer {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind temp port");
    serve(listener)
}

/// Serves on an already bound listener, e.g. a port that was refusing connections before.
pub fn serve(listener: TcpListener) -> StubServer {
    let state = ServerState::default();
    let app = Router::new()
        .route("/v1/vertex/{id}", get(get_vertex).delete(delete_vertex))
        .route("/v1/vertex", get(list_vertices).post(add_vertex))
        .route("/v1/flaky/vertex/{id}", get(flaky_get))
        .route("/v1/flaky/vertex", post(flaky_post))
        .route("/v1/slow", get(slow))
        .route("/v1/ping", get(ping))
        .route("/db/neo4j/tx/commit", post(cypher_commit))
        .route("/gremlin", post(gremlin))
        .with_state(state.clone());

    let addr = listener.local_addr().expect("local addr");
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("stub server");
    });

    StubServer {
        url: format!("http://{addr}"),
        state,
        handle,
    }
}

async fn get_vertex(Path(id): Path<String>) -> Response {
    if id == "v1" {
        Json(json!({ "id": "v1", "label": "person" })).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": format!("vertex '{id}' not found") })),
        )
            .into_response()
    }
}

async fn delete_vertex(Path(_id): Path<String>) -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn list_vertices(
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Json<Value> {
    let graph = headers
        .get("x-graph-name")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("none");
    let label = query.get("label").map(String::as_str).unwrap_or("any");
    let limit: usize = query.get("limit").and_then(|l| l.parse().ok()).unwrap_or(1);

    Json(Value::Array(
        (0..limit)
            .map(|i| json!({ "id": format!("{graph}-{i}"), "label": label }))
            .collect(),
    ))
}

async fn add_vertex(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::CREATED,
        Json(json!({ "id": "v100", "label": body["label"], "properties": body["properties"] })),
    )
}

async fn flaky_get(State(state): State<ServerState>, Path(id): Path<String>) -> Response {
    if state.flaky_gets.fetch_add(1, Ordering::SeqCst) == 0 {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    Json(json!({ "id": id, "label": "person" })).into_response()
}

async fn flaky_post(State(state): State<ServerState>, Json(body): Json<Value>) -> Response {
    if state.flaky_posts.fetch_add(1, Ordering::SeqCst) == 0 {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    (
        StatusCode::CREATED,
        Json(json!({ "id": "v101", "label": body["label"] })),
    )
        .into_response()
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(2)).await;
    Json(json!({}))
}

async fn ping() -> &'static str {
    "OK"
}

async fn cypher_commit(State(state): State<ServerState>, Json(body): Json<Value>) -> Json<Value> {
    let statement = body["statements"][0].clone();
    state.statements.lock().unwrap().push(statement.clone());

    let text = statement["statement"].as_str().unwrap_or_default();
    let response = if text.contains("v:Flaky")
        && state.flaky_statements.fetch_add(1, Ordering::SeqCst) == 0
    {
        json!({
            "results": [],
            "errors": [{ "code": "Neo.TransientError.Transaction.DeadlockDetected", "message": "Deadlock" }]
        })
    } else if text.contains("count(v)") {
        json!({
            "results": [{ "columns": ["total"], "data": [{ "row": [6], "meta": [null] }] }],
            "errors": []
        })
    } else if text.contains("KNOWS") && statement["parameters"]["id"] == "v1" {
        json!({
            "results": [{
                "columns": ["id", "label"],
                "data": [
                    { "row": ["v2", "person"], "meta": [null, null] },
                    { "row": ["v4", "person"], "meta": [null, null] }
                ]
            }],
            "errors": []
        })
    } else {
        json!({
            "results": [],
            "errors": [{ "code": "Neo.ClientError.Statement.SyntaxError", "message": "Invalid input" }]
        })
    };

    Json(response)
}

async fn gremlin(State(state): State<ServerState>, Json(body): Json<Value>) -> Response {
    let script = body["gremlin"].as_str().unwrap_or_default();
    if script == "g.V(vid).limit(1)" && state.flaky_scripts.fetch_add(1, Ordering::SeqCst) == 0 {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    if script.starts_with("g.V(vid)") && body["bindings"]["vid"] == 1 {
        Json(json!({
            "requestId": "8d3a8e3c-1d47-4f0a-8a8e-3b6e5f0c1a2b",
            "status": { "message": "", "code": 200, "attributes": {} },
            "result": {
                "data": {
                    "@type": "g:List",
                    "@value": [{
                        "@type": "g:Vertex",
                        "@value": {
                            "id": { "@type": "g:Int64", "@value": 1 },
                            "label": "person",
                            "properties": {
                                "name": [{
                                    "@type": "g:VertexProperty",
                                    "@value": { "id": { "@type": "g:Int64", "@value": 0 }, "value": "marko", "label": "name" }
                                }]
                            }
                        }
                    }]
                },
                "meta": { "@type": "g:Map", "@value": [] }
            }
        }))
        .into_response()
    } else {
        Json(json!({
            "requestId": "8d3a8e3c-1d47-4f0a-8a8e-3b6e5f0c1a2c",
            "status": { "message": "No such property: vid", "code": 597, "attributes": {} },
            "result": { "data": null, "meta": {} }
        }))
        .into_response()
    }
}

/// A bare HTTP/1.1 server that closes its first connection as soon as it has read the request,
/// and answers `GET /v1/vertex/{id}` on every later one.
pub struct DroppingServer {
    pub url: String,
    pub accepted: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl Drop for DroppingServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub async fn spawn_dropping() -> DroppingServer {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind temp port");
    let addr = listener.local_addr().expect("local addr");
    let accepted = Arc::new(AtomicUsize::new(0));

    let counter = accepted.clone();
    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(serve_once(stream, attempt));
        }
    });

    DroppingServer {
        url: format!("http://{addr}"),
        accepted,
        handle,
    }
}

async fn serve_once(mut stream: TcpStream, attempt: usize) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }

    if attempt == 0 {
        return;
    }

    let body = json!({ "id": "v1", "label": "person" }).to_string();
    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}
