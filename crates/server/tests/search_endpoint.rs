//! Router-level tests for `/search`, `/health` and the API docs, backed by
//! the in-memory stub platform.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use grounded_agents::stub::StubPlatform;
use grounded_agents::{GroundedSearch, RunStatus};
use grounded_core::{AgentConfig, Config, PollConfig, ServerConfig};
use grounded_server::{build_router, AppState};

// ── Helpers ─────────────────────────────────────────────────────

fn config(endpoint: Option<&str>, bing: Option<&str>) -> Config {
    Config {
        profile: String::new(),
        server: ServerConfig::default(),
        agent: AgentConfig {
            project_endpoint: endpoint.map(String::from),
            bing_connection_name: bing.map(String::from),
            agent_name: Some("web-search-agent".into()),
            agent_instructions: Some("Answer with sources.".into()),
            model: "gpt-4.1".into(),
            api_version: "2025-05-01".into(),
        },
        polling: PollConfig::default(),
    }
}

fn app_with(platform: Arc<StubPlatform>) -> Router {
    let state = AppState::from_config(
        config(Some("https://example.test/api/projects/demo"), Some("bing")),
        CancellationToken::new(),
        move |settings, policy| GroundedSearch::new(platform, settings, policy),
    );
    build_router(Arc::new(state))
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

// ── /search ─────────────────────────────────────────────────────

#[tokio::test]
async fn missing_settings_report_config_error_without_remote_calls() {
    let connected = Arc::new(AtomicBool::new(false));
    let flag = connected.clone();
    let state = AppState::from_config(config(None, None), CancellationToken::new(), move |settings, policy| {
        flag.store(true, Ordering::SeqCst);
        GroundedSearch::new(Arc::new(StubPlatform::new()), settings, policy)
    });
    let app = build_router(Arc::new(state));

    let (status, body) = get_json(app, "/search?query=hello").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "config");
    assert_eq!(
        body["missing"],
        serde_json::json!(["PROJECT_CONNECTION_STRING", "BING_RESOURCE_NAME"])
    );
    assert_eq!(
        body["error"],
        "Missing environment variable(s): PROJECT_CONNECTION_STRING, BING_RESOURCE_NAME"
    );
    assert!(!connected.load(Ordering::SeqCst));
}

#[tokio::test]
async fn only_missing_connection_is_named() {
    let state = AppState::from_config(
        config(Some("https://example.test/api/projects/demo"), None),
        CancellationToken::new(),
        |settings, policy| GroundedSearch::new(Arc::new(StubPlatform::new()), settings, policy),
    );
    let (_, body) = get_json(build_router(Arc::new(state)), "/search?query=hello").await;
    assert_eq!(body["missing"], serde_json::json!(["BING_RESOURCE_NAME"]));
}

#[tokio::test]
async fn answers_with_latest_assistant_message() {
    let platform = Arc::new(StubPlatform::new());
    platform.reply_with("Paris is the capital of France.");

    let (status, body) = get_json(
        app_with(platform.clone()),
        "/search?query=What%20is%20the%20capital%20of%20France%3F",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query"], "What is the capital of France?");
    assert_eq!(body["assistant_response"], "Paris is the capital of France.");
    assert_eq!(body["run_status"], "completed");
    assert_eq!(body["agent_id"], platform.agents()[0].id.as_str());
    assert!(body["thread_id"].as_str().is_some());
    assert!(body["run_id"].as_str().is_some());
    assert_eq!(platform.calls("create_agent"), 1);
}

#[tokio::test]
async fn failed_run_returns_failure_shape() {
    let platform = Arc::new(StubPlatform::new());
    platform.run_starts_as(RunStatus::Failed);
    platform.fail_runs_with("rate_limited", "");

    let (status, body) = get_json(app_with(platform), "/search?query=news").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        serde_json::json!({"query": "news", "status": "failed", "error": "rate_limited"})
    );
}

#[tokio::test]
async fn silent_assistant_gives_null_answer() {
    let platform = Arc::new(StubPlatform::new());
    let (status, body) = get_json(app_with(platform), "/search?query=hello").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["assistant_response"].is_null());
    assert_eq!(body["run_status"], "completed");
}

#[tokio::test]
async fn existing_agent_is_reused_across_requests() {
    let platform = Arc::new(StubPlatform::new());
    let existing = platform.with_agent("web-search-agent");
    platform.reply_with("ok");
    let app = app_with(platform.clone());

    let (_, first) = get_json(app.clone(), "/search?query=same").await;
    let (_, second) = get_json(app, "/search?query=same").await;

    assert_eq!(first["agent_id"], existing.id.as_str());
    assert_eq!(second["agent_id"], existing.id.as_str());
    assert_ne!(first["thread_id"], second["thread_id"]);
    assert_eq!(platform.calls("create_agent"), 0);
}

#[tokio::test]
async fn platform_failure_reports_kind() {
    let platform = Arc::new(StubPlatform::new());
    platform.fail_operation("get_connection", 404);

    let (status, body) = get_json(app_with(platform), "/search?query=hello").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "platform");
    assert!(body["error"].as_str().unwrap().contains("404"));
    assert!(body.get("missing").is_none());
}

#[tokio::test]
async fn missing_query_is_rejected() {
    let platform = Arc::new(StubPlatform::new());
    let (status, _) = get_json(app_with(platform.clone()), "/search").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(platform.calls("get_connection"), 0);
}

// ── /health and docs ────────────────────────────────────────────

#[tokio::test]
async fn health_reports_configuration() {
    let (status, body) = get_json(app_with(Arc::new(StubPlatform::new())), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["configured"], true);

    let state = AppState::from_config(config(None, None), CancellationToken::new(), |settings, policy| {
        GroundedSearch::new(Arc::new(StubPlatform::new()), settings, policy)
    });
    let (_, body) = get_json(build_router(Arc::new(state)), "/health").await;
    assert_eq!(body["configured"], false);
}

#[tokio::test]
async fn openapi_document_lists_routes() {
    let (status, body) = get_json(app_with(Arc::new(StubPlatform::new())), "/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"].get("/search").is_some());
    assert!(body["paths"].get("/health").is_some());
}

#[tokio::test]
async fn docs_ui_is_served() {
    let response = app_with(Arc::new(StubPlatform::new()))
        .oneshot(Request::builder().uri("/docs").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
