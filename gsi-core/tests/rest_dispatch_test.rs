use common::{Vertex, client_for, config_for, graph_api, rest_config, stub_server};
use gsi_core::{
    ClientConfig, DispatchError, GsiClient, InvokeOptions, RetryPolicy, TransportErrorKind,
    tokio_util::sync::CancellationToken,
};
use serde_json::{Value, json};
use std::{collections::HashMap, sync::atomic::Ordering, time::Duration};
use tokio::net::TcpListener;

mod common;

#[tokio::test]
async fn test_get_vertex_by_path_parameter() {
    let server = stub_server::spawn().await;
    let client = client_for(&server);

    let vertex: Vertex = client
        .invoke_as("getVertex", json!({ "id": "v1" }))
        .await
        .unwrap();

    assert_eq!(
        vertex,
        Vertex {
            id: "v1".to_string(),
            label: "person".to_string(),
            properties: HashMap::new(),
        }
    );
}

#[tokio::test]
async fn test_not_found_surfaces_as_invocation_error() {
    let server = stub_server::spawn().await;
    let client = client_for(&server);

    let result = client.invoke("getVertex", json!({ "id": "v9" })).await;

    match result {
        Err(DispatchError::Invocation(err)) => {
            assert_eq!(err.operation, "getVertex");
            assert_eq!(err.status, "404");
            assert_eq!(err.message, "vertex 'v9' not found");
        }
        other => panic!("Expected an invocation error, got {other:?}"),
    }
    assert_eq!(server.state.flaky_gets.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_query_and_header_parameters() {
    let server = stub_server::spawn().await;
    let client = client_for(&server);

    let vertices: Vec<Vertex> = client
        .invoke_as(
            "listVertices",
            json!({ "label": "software", "limit": 2, "X-Graph-Name": "modern" }),
        )
        .await
        .unwrap();

    let ids: Vec<_> = vertices.iter().map(|v| v.id.as_str()).collect();
    assert_eq!(ids, ["modern-0", "modern-1"]);
    assert!(vertices.iter().all(|v| v.label == "software"));
}

#[tokio::test]
async fn test_optional_parameters_can_be_omitted() {
    let server = stub_server::spawn().await;
    let client = client_for(&server);

    let value = client
        .invoke("listVertices", json!({ "X-Graph-Name": "modern" }))
        .await
        .unwrap();

    assert_eq!(value, json!([{ "id": "modern-0", "label": "any" }]));
}

#[tokio::test]
async fn test_post_sends_the_request_body() {
    let server = stub_server::spawn().await;
    let client = client_for(&server);

    let vertex: Vertex = client
        .invoke_as(
            "addVertex",
            json!({ "body": { "label": "person", "properties": { "name": "vadas" } } }),
        )
        .await
        .unwrap();

    assert_eq!(vertex.id, "v100");
    assert_eq!(vertex.label, "person");
    assert_eq!(vertex.properties["name"], "vadas");
}

#[tokio::test]
async fn test_empty_response_is_null() {
    let server = stub_server::spawn().await;
    let client = client_for(&server);

    let value = client
        .invoke("deleteVertex", json!({ "id": "v1" }))
        .await
        .unwrap();

    assert_eq!(value, Value::Null);
}

#[tokio::test]
async fn test_non_json_body_of_unit_result_is_dropped() {
    let server = stub_server::spawn().await;
    let client = client_for(&server);

    let value = client.invoke("ping", json!({})).await.unwrap();

    assert_eq!(value, Value::Null);
}

#[tokio::test]
async fn test_idempotent_operation_is_retried() {
    let server = stub_server::spawn().await;
    let client = client_for(&server);

    let vertex: Vertex = client
        .invoke_as("flakyGetVertex", json!({ "id": "v7" }))
        .await
        .unwrap();

    assert_eq!(vertex.id, "v7");
    assert_eq!(server.state.flaky_gets.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_retry_can_be_disabled_per_invocation() {
    let server = stub_server::spawn().await;
    let client = client_for(&server);

    let result = client
        .invoke_with(
            "flakyGetVertex",
            json!({ "id": "v7" }),
            InvokeOptions::default().with_retry(RetryPolicy::none()),
        )
        .await;

    assert!(matches!(
        result,
        Err(DispatchError::Transport(ref err)) if err.kind == TransportErrorKind::Unavailable
    ));
    assert_eq!(server.state.flaky_gets.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_non_idempotent_operation_is_not_retried() {
    let server = stub_server::spawn().await;
    let client = client_for(&server);

    let result = client
        .invoke("flakyAddVertex", json!({ "body": { "label": "person" } }))
        .await;

    match result {
        Err(DispatchError::Transport(err)) => {
            assert_eq!(err.operation, "flakyAddVertex");
            assert_eq!(err.kind, TransportErrorKind::Unavailable);
            assert!(err.is_transient());
        }
        other => panic!("Expected a transport error, got {other:?}"),
    }
    assert_eq!(server.state.flaky_posts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_timeout() {
    let server = stub_server::spawn().await;
    let client = client_for(&server);

    let result = client
        .invoke_with(
            "slowPing",
            Value::Null,
            InvokeOptions::default().with_timeout(Duration::from_millis(100)),
        )
        .await;

    assert!(matches!(
        result,
        Err(DispatchError::Transport(ref err)) if err.kind == TransportErrorKind::Timeout
    ));
}

#[tokio::test]
async fn test_call_timeout_may_exceed_client_default() {
    let server = stub_server::spawn().await;
    let config = ClientConfig {
        timeout_ms: 500,
        ..config_for(&server)
    };
    let client = GsiClient::from_config(&graph_api(), &config).unwrap();

    let value = client
        .invoke_with(
            "slowPing",
            Value::Null,
            InvokeOptions::default().with_timeout(Duration::from_secs(5)),
        )
        .await
        .unwrap();

    assert_eq!(value, json!({}));
}

#[tokio::test]
async fn test_client_default_timeout_applies() {
    let server = stub_server::spawn().await;
    let config = ClientConfig {
        timeout_ms: 200,
        ..config_for(&server)
    };
    let client = GsiClient::from_config(&graph_api(), &config).unwrap();

    let result = client.invoke("slowPing", Value::Null).await;

    assert!(matches!(
        result,
        Err(DispatchError::Transport(ref err)) if err.kind == TransportErrorKind::Timeout
    ));
}

#[tokio::test]
async fn test_cancellation() {
    let server = stub_server::spawn().await;
    let client = client_for(&server);
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let result = client
        .invoke_with(
            "slowPing",
            json!({}),
            InvokeOptions::default().with_cancellation(token),
        )
        .await;

    assert!(matches!(result, Err(DispatchError::Cancelled(op)) if op == "slowPing"));
}

#[tokio::test]
async fn test_invalid_arguments_are_rejected_before_sending() {
    let server = stub_server::spawn().await;
    let client = client_for(&server);

    let missing = client.invoke("listVertices", json!({ "label": "person" })).await;
    assert!(matches!(
        missing,
        Err(DispatchError::InvalidArguments { ref reason, .. }) if reason.contains("X-Graph-Name")
    ));

    let mistyped = client
        .invoke("listVertices", json!({ "limit": "ten", "X-Graph-Name": "modern" }))
        .await;
    assert!(matches!(mistyped, Err(DispatchError::InvalidArguments { .. })));

    let unknown = client
        .invoke("getVertex", json!({ "id": "v1", "depth": 2 }))
        .await;
    assert!(matches!(
        unknown,
        Err(DispatchError::InvalidArguments { ref reason, .. }) if reason.contains("depth")
    ));

    let not_an_object = client.invoke("getVertex", json!(["v1"])).await;
    assert!(matches!(not_an_object, Err(DispatchError::InvalidArguments { .. })));
}

#[tokio::test]
async fn test_unknown_operation() {
    let server = stub_server::spawn().await;
    let client = client_for(&server);

    let result = client.invoke("dropGraph", json!({})).await;

    assert!(matches!(result, Err(DispatchError::UnknownOperation(op)) if op == "dropGraph"));
}

#[tokio::test]
async fn test_decode_error() {
    let server = stub_server::spawn().await;
    let client = client_for(&server);

    let result = client
        .invoke_as::<Vec<Vertex>>("getVertex", json!({ "id": "v1" }))
        .await;

    assert!(matches!(result, Err(DispatchError::Decode { .. })));
}

#[tokio::test]
async fn test_client_is_shared_between_tasks() {
    let server = stub_server::spawn().await;
    let client = client_for(&server);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.invoke("getVertex", json!({ "id": "v1" })).await })
        })
        .collect();

    for task in tasks {
        let value = task.await.unwrap().unwrap();
        assert_eq!(value["id"], "v1");
    }
}

#[tokio::test]
async fn test_dropped_connection_is_retried() {
    let server = stub_server::spawn_dropping().await;
    let client = GsiClient::from_config(&graph_api(), &rest_config(&server.url)).unwrap();

    let vertex: Vertex = client
        .invoke_as("getVertex", json!({ "id": "v1" }))
        .await
        .unwrap();

    assert_eq!(vertex.id, "v1");
    assert_eq!(server.accepted.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_dropped_connection_is_unavailable() {
    let server = stub_server::spawn_dropping().await;
    let client = GsiClient::from_config(&graph_api(), &rest_config(&server.url)).unwrap();

    let result = client
        .invoke_with(
            "getVertex",
            json!({ "id": "v1" }),
            InvokeOptions::default().with_retry(RetryPolicy::none()),
        )
        .await;

    match result {
        Err(DispatchError::Transport(err)) => {
            assert_eq!(err.kind, TransportErrorKind::Unavailable);
            assert!(err.is_transient());
        }
        other => panic!("Expected a transport error, got {other:?}"),
    }
    assert_eq!(server.accepted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_refused_connection_is_retried_until_the_server_is_up() {
    let reserved = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = reserved.local_addr().unwrap();
    drop(reserved);

    let client =
        GsiClient::from_config(&graph_api(), &rest_config(&format!("http://{addr}"))).unwrap();

    let refused = client
        .invoke_with(
            "getVertex",
            json!({ "id": "v1" }),
            InvokeOptions::default().with_retry(RetryPolicy::none()),
        )
        .await;
    match refused {
        Err(DispatchError::Transport(err)) => {
            assert_eq!(err.kind, TransportErrorKind::Connect);
            assert!(err.is_transient());
        }
        other => panic!("Expected a transport error, got {other:?}"),
    }

    let starter = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        stub_server::serve(TcpListener::bind(addr).await.unwrap())
    });

    let vertex = client
        .invoke_with(
            "getVertex",
            json!({ "id": "v1" }),
            InvokeOptions::default().with_retry(RetryPolicy {
                max_attempts: 20,
                min_delay: Duration::from_millis(50),
                max_delay: Duration::from_millis(100),
            }),
        )
        .await
        .unwrap();
    let _server = starter.await.unwrap();

    assert_eq!(vertex["id"], "v1");
}
