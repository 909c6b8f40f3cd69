//! End-to-end HTTP flows over the in-memory backend: monitor management,
//! ping ingestion, sweeps, incidents and rate limiting.

#![allow(clippy::panic, clippy::expect_used, clippy::indexing_slicing)]

mod common;

use axum::http::StatusCode;
use chrono::{TimeDelta, Utc};
use serde_json::{Value, json};

use common::{build_test_context, build_test_context_with, create_monitor, request_json, str_field};
use cronwatch::config::ServiceConfig;

#[tokio::test]
async fn health_reports_memory_storage() {
    let ctx = build_test_context();
    let (status, body) = request_json(&ctx.app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(str_field(&body, "status"), "ok");
    assert_eq!(str_field(&body, "storage"), "memory");
}

#[tokio::test]
async fn create_then_get_monitor() {
    let ctx = build_test_context();
    let created = create_monitor(
        &ctx.app,
        json!({ "name": "nightly backup", "slug": "nightly-backup", "interval_secs": 3600, "grace_secs": 300 }),
    )
    .await;
    assert_eq!(str_field(&created, "status"), "pending");
    assert_eq!(str_field(&created, "slug"), "nightly-backup");
    assert_eq!(str_field(&created, "ping_path"), "/ping/nightly-backup");
    assert!(created["next_expected_at"].is_null());

    let id = str_field(&created, "id");
    let (status, body) =
        request_json(&ctx.app, "GET", &format!("/api/v1/monitors/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(str_field(&body, "name"), "nightly backup");
}

#[tokio::test]
async fn create_rejects_out_of_range_interval() {
    let ctx = build_test_context();
    let (status, body) = request_json(
        &ctx.app,
        "POST",
        "/api/v1/monitors",
        None,
        Some(json!({ "name": "too fast", "interval_secs": 10 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].is_string());
}

#[tokio::test]
async fn duplicate_slug_conflicts() {
    let ctx = build_test_context();
    let body = json!({ "name": "a", "slug": "same-slug", "interval_secs": 60 });
    create_monitor(&ctx.app, body.clone()).await;
    let (status, _) = request_json(&ctx.app, "POST", "/api/v1/monitors", None, Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn heartbeat_moves_monitor_up() {
    let ctx = build_test_context();
    let created = create_monitor(
        &ctx.app,
        json!({ "name": "job", "slug": "job-up", "interval_secs": 600 }),
    )
    .await;
    let id = str_field(&created, "id").to_string();

    let (status, body) = request_json(&ctx.app, "POST", "/ping/job-up", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(str_field(&body, "status"), "ok");
    assert!(body["next"].is_string());

    let (_, monitor) =
        request_json(&ctx.app, "GET", &format!("/api/v1/monitors/{id}"), None, None).await;
    assert_eq!(str_field(&monitor, "status"), "up");

    let (status, pings) =
        request_json(&ctx.app, "GET", &format!("/api/v1/monitors/{id}/pings"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pings.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn start_ping_reports_running() {
    let ctx = build_test_context();
    create_monitor(
        &ctx.app,
        json!({ "name": "job", "slug": "job-start", "interval_secs": 600 }),
    )
    .await;
    let (status, body) = request_json(&ctx.app, "GET", "/ping/job-start/start", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(str_field(&body, "status"), "running");
    assert!(body["startedAt"].is_string());
}

#[tokio::test]
async fn unknown_slug_is_not_found() {
    let ctx = build_test_context();
    let (status, body) = request_json(&ctx.app, "GET", "/ping/does-not-exist", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"]["code"].is_number());
}

#[tokio::test]
async fn paused_monitor_ignores_pings() {
    let ctx = build_test_context();
    let created = create_monitor(
        &ctx.app,
        json!({ "name": "job", "slug": "job-paused", "interval_secs": 600 }),
    )
    .await;
    let id = str_field(&created, "id");

    let (status, body) = request_json(
        &ctx.app,
        "POST",
        &format!("/api/v1/monitors/{id}/pause"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(str_field(&body, "status"), "paused");

    let (status, body) = request_json(&ctx.app, "GET", "/ping/job-paused", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(str_field(&body, "status"), "paused");

    let (status, body) = request_json(
        &ctx.app,
        "POST",
        &format!("/api/v1/monitors/{id}/resume"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(str_field(&body, "status"), "pending");
}

#[tokio::test]
async fn pings_are_rate_limited_per_slug() {
    let ctx = build_test_context_with(ServiceConfig {
        ping_rate_limit: 2,
        ping_rate_window_secs: 60,
        ..ServiceConfig::default()
    });
    create_monitor(
        &ctx.app,
        json!({ "name": "chatty", "slug": "chatty", "interval_secs": 60 }),
    )
    .await;

    for _ in 0..2 {
        let (status, _) = request_json(&ctx.app, "POST", "/ping/chatty", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = request_json(&ctx.app, "POST", "/ping/chatty", None, None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn sweep_trigger_requires_secret() {
    let ctx = build_test_context();
    let (status, _) = request_json(&ctx.app, "POST", "/internal/sweep", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) =
        request_json(&ctx.app, "POST", "/internal/sweep", Some("wrong"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, report) =
        request_json(&ctx.app, "POST", "/internal/sweep", Some("sweep-secret"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["examined"], Value::from(0));
}

#[tokio::test]
async fn missed_deadline_opens_incident_and_heartbeat_resolves_it() {
    let ctx = build_test_context();
    let created = create_monitor(
        &ctx.app,
        json!({ "name": "job", "slug": "job-down", "interval_secs": 60, "grace_secs": 60 }),
    )
    .await;
    let id = str_field(&created, "id").to_string();
    let (status, _) = request_json(&ctx.app, "POST", "/ping/job-down", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let Ok(report) = ctx
        .state
        .sweeper
        .sweep(Utc::now() + TimeDelta::minutes(5))
        .await
    else {
        panic!("sweep failed");
    };
    assert_eq!(report.marked_down, 1);
    assert_eq!(report.incidents_opened, 1);

    let (_, monitor) =
        request_json(&ctx.app, "GET", &format!("/api/v1/monitors/{id}"), None, None).await;
    assert_eq!(str_field(&monitor, "status"), "down");

    let (_, incidents) = request_json(
        &ctx.app,
        "GET",
        &format!("/api/v1/monitors/{id}/incidents"),
        None,
        None,
    )
    .await;
    assert_eq!(incidents.as_array().map(Vec::len), Some(1));
    assert_eq!(incidents[0]["open"], Value::Bool(true));

    let (status, _) = request_json(&ctx.app, "POST", "/ping/job-down", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, incidents) = request_json(
        &ctx.app,
        "GET",
        &format!("/api/v1/monitors/{id}/incidents"),
        None,
        None,
    )
    .await;
    assert_eq!(incidents[0]["open"], Value::Bool(false));
}

#[tokio::test]
async fn manual_incident_resolution() {
    let ctx = build_test_context_with(ServiceConfig {
        incident_auto_resolve: false,
        ..ServiceConfig::default()
    });
    let created = create_monitor(
        &ctx.app,
        json!({ "name": "job", "slug": "job-manual", "interval_secs": 60 }),
    )
    .await;
    let id = str_field(&created, "id").to_string();
    request_json(&ctx.app, "POST", "/ping/job-manual", None, None).await;

    let Ok(report) = ctx
        .state
        .sweeper
        .sweep(Utc::now() + TimeDelta::minutes(5))
        .await
    else {
        panic!("sweep failed");
    };
    assert_eq!(report.incidents_opened, 1);

    let (_, incidents) = request_json(
        &ctx.app,
        "GET",
        &format!("/api/v1/monitors/{id}/incidents"),
        None,
        None,
    )
    .await;
    let incident_id = str_field(&incidents[0], "id").to_string();

    let uri = format!("/api/v1/monitors/{id}/incidents/{incident_id}/resolve");
    let (status, body) = request_json(&ctx.app, "POST", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["open"], Value::Bool(false));

    let (status, _) = request_json(&ctx.app, "POST", &uri, None, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn update_clears_alert_target_with_null() {
    let ctx = build_test_context();
    let created = create_monitor(
        &ctx.app,
        json!({ "name": "job", "interval_secs": 600, "alert_email": "ops@example.com" }),
    )
    .await;
    let id = str_field(&created, "id");

    let (status, body) = request_json(
        &ctx.app,
        "PATCH",
        &format!("/api/v1/monitors/{id}"),
        None,
        Some(json!({ "name": "renamed", "alert_email": null })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(str_field(&body, "name"), "renamed");
    assert!(body["alert_email"].is_null());
}

#[tokio::test]
async fn archived_monitor_rejects_pings_until_restored() {
    let ctx = build_test_context();
    let created = create_monitor(
        &ctx.app,
        json!({ "name": "job", "slug": "job-archived", "interval_secs": 600 }),
    )
    .await;
    let id = str_field(&created, "id");

    let (status, body) = request_json(
        &ctx.app,
        "POST",
        &format!("/api/v1/monitors/{id}/archive"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["archived"], Value::Bool(true));
    assert!(body["delete_after"].is_string());

    let (status, _) = request_json(&ctx.app, "GET", "/ping/job-archived", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, list) = request_json(&ctx.app, "GET", "/api/v1/monitors", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["data"].as_array().map(Vec::len), Some(0));

    let (status, _) = request_json(
        &ctx.app,
        "POST",
        &format!("/api/v1/monitors/{id}/restore"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = request_json(&ctx.app, "GET", "/ping/job-archived", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn list_filters_by_status() {
    let ctx = build_test_context();
    create_monitor(
        &ctx.app,
        json!({ "name": "a", "slug": "list-a", "interval_secs": 600 }),
    )
    .await;
    create_monitor(
        &ctx.app,
        json!({ "name": "b", "slug": "list-b", "interval_secs": 600 }),
    )
    .await;
    request_json(&ctx.app, "POST", "/ping/list-a", None, None).await;

    let (status, list) =
        request_json(&ctx.app, "GET", "/api/v1/monitors?status=up", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let Some(data) = list["data"].as_array() else {
        panic!("data should be an array: {list}");
    };
    assert_eq!(data.len(), 1);
    assert_eq!(str_field(&data[0], "slug"), "list-a");
    assert_eq!(list["pagination"]["total"], Value::from(1));
}

#[tokio::test]
async fn openapi_document_lists_core_paths() {
    let ctx = build_test_context();
    let (status, doc) =
        request_json(&ctx.app, "GET", cronwatch::api::OPENAPI_PATH, None, None).await;
    assert_eq!(status, StatusCode::OK);
    let Some(paths) = doc["paths"].as_object() else {
        panic!("openapi paths should be an object");
    };
    for path in [
        "/api/v1/monitors",
        "/api/v1/monitors/{id}",
        "/ping/{slug}",
        "/ping/{slug}/start",
        "/internal/sweep",
        "/health",
    ] {
        assert!(paths.contains_key(path), "missing {path}");
    }
}
