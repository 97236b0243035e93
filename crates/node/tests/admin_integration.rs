//! Integration tests for the admin HTTP surface.

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusHandle;
use node::AppState;
use participant::{
    InMemoryLedger, Participant, ParticipantConfig, ParticipantServer, RpcCoordinatorClient,
    Supervisor, supervisor,
};
use rpc::Endpoint;
use serde_json::Value;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

type TestState = Arc<AppState<RpcCoordinatorClient>>;

async fn setup() -> (axum::Router, TestState, Supervisor) {
    let config = ParticipantConfig {
        service_endpoint: Endpoint::tcp("127.0.0.1:0"),
        ..ParticipantConfig::default()
    };
    let (reporter, supervisor) = supervisor();
    let participant = Participant::from_config(&config, reporter);
    let ledger = InMemoryLedger::new();
    participant
        .register_caller("debit", Arc::new(ledger.debit_caller()))
        .unwrap();

    let server = ParticipantServer::bind(&config.service_endpoint, participant)
        .await
        .unwrap();
    let state = Arc::new(AppState::new(server));
    let app = node::create_app(state.clone(), get_metrics_handle());
    (app, state, supervisor)
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let (app, _state, _supervisor) = setup().await;

    let (status, json) = send(app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_status_reports_participant() {
    let (app, _state, _supervisor) = setup().await;

    let (status, json) = send(app, get("/status")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["in_flight_parts"], 0);
    assert_eq!(json["rpc_count"], 0);
    assert_eq!(json["unreliable"], false);
    assert_eq!(json["dead"], false);
    assert_eq!(json["callers"], serde_json::json!(["debit"]));
}

#[tokio::test]
async fn test_toggle_unreliable() {
    let (app, state, _supervisor) = setup().await;

    let (status, json) = send(
        app.clone(),
        post_json("/control/unreliable", serde_json::json!({ "enabled": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["unreliable"], true);
    assert!(state.server.is_unreliable());

    let (status, _) = send(
        app,
        post_json("/control/unreliable", serde_json::json!({ "enabled": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!state.server.is_unreliable());
}

#[tokio::test]
async fn test_unreliable_requires_body() {
    let (app, _state, _supervisor) = setup().await;

    let (status, _) = send(app, post_json("/control/unreliable", serde_json::json!({}))).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_kill_is_one_shot() {
    let (app, state, _supervisor) = setup().await;

    let (status, json) = send(app.clone(), post_json("/control/kill", Value::Null)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["dead"], true);
    assert!(state.server.is_dead());

    let (status, json) = send(app.clone(), post_json("/control/kill", Value::Null)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().unwrap().contains("dead"));

    let (status, _) = send(
        app,
        post_json("/control/unreliable", serde_json::json!({ "enabled": true })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _state, _supervisor) = setup().await;

    let response = app.oneshot(get("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}
