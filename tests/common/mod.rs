//! Shared helpers for HTTP integration tests.

#![allow(dead_code, clippy::panic, clippy::expect_used)]

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::util::ServiceExt;

use cronwatch::alert::AlertDispatcher;
use cronwatch::api;
use cronwatch::app_state::AppState;
use cronwatch::config::ServiceConfig;
use cronwatch::persistence::{MemoryRateLimiter, MemoryStore};

pub struct TestContext {
    pub state: AppState,
    pub app: axum::Router,
}

/// Builds an in-memory app with the given configuration.
pub fn build_test_context_with(config: ServiceConfig) -> TestContext {
    let limiter = MemoryRateLimiter::new(config.ping_rate_policy());
    let state = AppState::new(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(limiter),
        AlertDispatcher::new(),
    );
    let app = api::build_app(state.clone());
    TestContext { state, app }
}

pub fn build_test_context() -> TestContext {
    build_test_context_with(ServiceConfig {
        cron_secret: Some("sweep-secret".to_string()),
        ..ServiceConfig::default()
    })
}

pub async fn request_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let req = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request should build");

    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("router is infallible");
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

/// Creates a monitor and returns its JSON representation.
pub async fn create_monitor(app: &axum::Router, body: Value) -> Value {
    let (status, value) = request_json(app, "POST", "/api/v1/monitors", None, Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {value}");
    value
}

pub fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("missing string field {key} in {value}"))
}
