//! Router tests driven through `tower::ServiceExt::oneshot`.

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use claimflow_core::ClaimFields;
use claimflow_queue::{
    Connection, ConsumerConfig, MemoryBroker, QueueConsumer, QueueTransport, SwitchableTransport,
};
use claimflow_server::{ClaimServer, ServerConfig};
use claimflow_testkit::TestStore;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceExt;

struct Harness {
    store: TestStore,
    broker: Arc<MemoryBroker>,
    app: Router,
}

fn harness() -> Harness {
    let store = TestStore::new();
    let broker = Arc::new(MemoryBroker::new());
    let transport: Arc<dyn QueueTransport> = broker.clone();
    let app = ClaimServer::new(ServerConfig::default(), store.shared(), transport).router();
    Harness { store, broker, app }
}

fn seed(store: &TestStore) {
    store
        .append_record(ClaimFields::new("A1", "Ana Torres", 100.0, "Car damage claim"))
        .unwrap();
    store
        .append_record(ClaimFields::new("A2", "Luis", 300.0, "Broken window"))
        .unwrap();
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri, None).await
}

#[tokio::test]
async fn root_banner() {
    let h = harness();
    let (status, body) = get(&h.app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "Claims Reader API");
    assert_eq!(body["status"], "active");
}

#[tokio::test]
async fn health_reports_queue() {
    let store = TestStore::new();
    let transport = Arc::new(SwitchableTransport::new(MemoryBroker::new()));
    let shared: Arc<dyn QueueTransport> = transport.clone();
    let app = ClaimServer::new(ServerConfig::default(), store.shared(), shared).router();

    let (_, body) = get(&app, "/health").await;
    assert_eq!(body["status"], "ok");

    transport.set_connected(false);
    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["queue_connected"], false);
}

#[tokio::test]
async fn submit_is_accepted_and_enqueued() {
    let h = harness();
    let (status, body) = send(
        &h.app,
        Method::POST,
        "/api",
        Some(json!({"id": "A1", "customer": "X", "amount": 100, "description": "d1"})),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, json!({"status": "received"}));
    assert_eq!(h.broker.len("claims"), 1);
}

#[tokio::test]
async fn submit_validation_errors() {
    let h = harness();

    let (status, body) = send(
        &h.app,
        Method::POST,
        "/api",
        Some(json!({"id": "", "customer": "X", "amount": 1, "description": "d"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("id"));

    // Missing required field.
    let (status, _) = send(
        &h.app,
        Method::POST,
        "/api",
        Some(json!({"id": "A1", "customer": "X"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    assert!(h.broker.is_empty("claims"));
}

#[tokio::test]
async fn submit_malformed_json() {
    let h = harness();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn submit_oversized_body() {
    let store = TestStore::new();
    let broker: Arc<dyn QueueTransport> = Arc::new(MemoryBroker::new());
    let config = ServerConfig::default().with_max_body_size(64);
    let app = ClaimServer::new(config, store.shared(), broker).router();

    let (status, _) = send(
        &app,
        Method::POST,
        "/api",
        Some(json!({"id": "A1", "customer": "X", "amount": 1, "description": "x".repeat(200)})),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn submit_when_queue_down() {
    let store = TestStore::new();
    let transport = Arc::new(SwitchableTransport::new(MemoryBroker::new()));
    transport.set_connected(false);
    let shared: Arc<dyn QueueTransport> = transport;
    let app = ClaimServer::new(ServerConfig::default(), store.shared(), shared).router();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api",
        Some(json!({"id": "A1", "customer": "X", "amount": 1, "description": "d"})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn list_with_pagination() {
    let h = harness();
    seed(&h.store);

    let (status, body) = get(&h.app, "/claims").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["claims"].as_array().unwrap().len(), 2);
    assert_eq!(body["metadata"]["total_records"], 2);
    assert_eq!(body["pagination"]["limit"], 100);

    let (_, body) = get(&h.app, "/claims?limit=1&offset=1").await;
    assert_eq!(body["total"], 2);
    assert_eq!(body["claims"][0]["id"], "A2");
    assert_eq!(
        body["pagination"],
        json!({"limit": 1, "offset": 1, "returned": 1})
    );

    let (status, _) = get(&h.app, "/claims?limit=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn search_is_case_insensitive() {
    let h = harness();
    seed(&h.store);

    let (status, body) = get(&h.app, "/claims/search?q=WINDOW").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["claims"][0]["id"], "A2");

    let (_, body) = get(&h.app, "/claims/search?q=ana").await;
    assert_eq!(body["claims"][0]["id"], "A1");

    let (status, _) = get(&h.app, "/claims/search").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_claim_and_not_found() {
    let h = harness();
    seed(&h.store);

    let (status, body) = get(&h.app, "/claims/A1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "A1");
    assert_eq!(body["index"], 0);
    assert_eq!(body["status"], "Enviado");

    let (status, body) = get(&h.app, "/claims/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "claim nope not found");
}

#[tokio::test]
async fn put_replaces_status_without_history() {
    let h = harness();
    seed(&h.store);

    let (status, body) = send(
        &h.app,
        Method::PUT,
        "/claims/A1/status",
        Some(json!({"status": "Aprobado"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["operation"], "PUT");
    assert_eq!(body["id"], "A1");
    assert_eq!(body["new_status"], "Aprobado");
    assert!(body.get("old_status").is_none());
    assert_eq!(body["claim"]["status"], "Aprobado");
    assert!(body["claim"]["last_modified"].is_string());

    let on_disk = h.store.read_disk().unwrap();
    let a1 = on_disk.find("A1").unwrap();
    assert_eq!(a1.status, "Aprobado");
    assert!(a1.history().is_empty());
}

#[tokio::test]
async fn patch_records_history() {
    let h = harness();
    seed(&h.store);

    let (status, body) = send(
        &h.app,
        Method::PATCH,
        "/claims/A1/status",
        Some(json!({"status": "En revision"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["operation"], "PATCH");
    assert_eq!(body["old_status"], "Enviado");

    send(
        &h.app,
        Method::PATCH,
        "/claims/A1/status",
        Some(json!({"status": "Aprobado"})),
    )
    .await;

    let (status, body) = get(&h.app, "/claims/A1/status-history").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["claim_id"], "A1");
    assert_eq!(body["current_status"], "Aprobado");
    let history = body["status_history"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["previous_status"], "Enviado");
    assert_eq!(history[1]["previous_status"], "En revision");
    assert!(history[0]["changed_at"].is_string());
}

#[tokio::test]
async fn update_missing_claim_leaves_file_untouched() {
    let h = harness();
    seed(&h.store);
    let before = std::fs::read(h.store.path().join("claims.json")).unwrap();

    for method in [Method::PUT, Method::PATCH] {
        let (status, body) = send(
            &h.app,
            method,
            "/claims/missing/status",
            Some(json!({"status": "Aprobado"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "claim missing not found");
    }

    let after = std::fs::read(h.store.path().join("claims.json")).unwrap();
    assert_eq!(before, after);

    let (status, _) = get(&h.app, "/claims/missing/status-history").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stats_and_corrupt_file() {
    let h = harness();
    seed(&h.store);

    let (status, body) = get(&h.app, "/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_claims"], 2);
    assert_eq!(body["total_amount"], 400.0);
    assert_eq!(body["average_amount"], 200.0);
    assert!(body["file_size_bytes"].as_u64().unwrap() > 0);
    assert_eq!(body["metadata"]["version"], "1.0");

    std::fs::write(h.store.path().join("claims.json"), b"{\"metadata\": ").unwrap();
    let (status, body) = get(&h.app, "/stats").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "claims file is corrupted");
}

#[tokio::test]
async fn unknown_route_is_json_404() {
    let h = harness();
    let (status, body) = get(&h.app, "/nowhere").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not found");
}

#[tokio::test]
async fn submission_flows_through_consumer() {
    let h = harness();
    h.broker.declare_queue("claims");
    let connection = Connection::open(&h.broker).unwrap();
    let consumer = QueueConsumer::new(h.store.shared(), ConsumerConfig::default())
        .start(&connection)
        .unwrap();

    let (status, _) = send(
        &h.app,
        Method::POST,
        "/api",
        Some(json!({"id": "Z9", "customer": "Zoe", "amount": 42.5, "description": "Hail"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let (status, body) = get(&h.app, "/claims/Z9").await;
        if status == StatusCode::OK {
            assert_eq!(body["customer"], "Zoe");
            assert_eq!(body["amount"], 42.5);
            break;
        }
        assert!(Instant::now() < deadline, "claim never persisted");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let (_, body) = send(
        &h.app,
        Method::PATCH,
        "/claims/Z9/status",
        Some(json!({"status": "Aprobado"})),
    )
    .await;
    assert_eq!(body["new_status"], "Aprobado");

    let stats = tokio::task::spawn_blocking(move || {
        let stats = consumer.shutdown();
        connection.close().unwrap();
        stats
    })
    .await
    .unwrap();
    assert_eq!(stats.acked, 1);
    assert_eq!(h.store.read_by_id("Z9").unwrap().status, "Aprobado");
}
