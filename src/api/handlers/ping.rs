//! Ping endpoint: the URL a cron job calls when it starts or finishes.
//!
//! No authentication: possession of the slug authorizes the ping.

use std::net::SocketAddr;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::{Path, State};
use axum::http::header::USER_AGENT;
use axum::http::{Extensions, HeaderMap};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;

use crate::api::dto::PingResponse;
use crate::app_state::AppState;
use crate::domain::{PingKind, PingSource};
use crate::error::{ErrorResponse, WatchError};

/// `GET|POST /ping/{slug}` — Record a heartbeat.
///
/// # Errors
///
/// Returns [`WatchError::MonitorNotFound`] for unknown slugs or
/// [`WatchError::RateLimited`] when the slug exceeded its window.
#[utoipa::path(
    get,
    path = "/ping/{slug}",
    tag = "Ping",
    summary = "Record a heartbeat",
    description = "Marks the job as finished and moves the deadline to now + interval. POST behaves identically. Not idempotent: every call records a ping.",
    params(("slug" = String, Path, description = "Monitor ping slug")),
    responses(
        (status = 200, description = "Heartbeat recorded or monitor paused", body = PingResponse),
        (status = 404, description = "Unknown slug", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
    )
)]
pub async fn heartbeat(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    extensions: Extensions,
) -> Result<impl IntoResponse, WatchError> {
    ingest(&state, &slug, PingKind::Heartbeat, &headers, &extensions).await
}

/// `GET|POST /ping/{slug}/start` — Record a job start.
///
/// # Errors
///
/// Returns [`WatchError::MonitorNotFound`] for unknown slugs or
/// [`WatchError::RateLimited`] when the slug exceeded its window.
#[utoipa::path(
    get,
    path = "/ping/{slug}/start",
    tag = "Ping",
    summary = "Record a job start",
    description = "Marks the job as running. Does not move the deadline of an armed monitor. POST behaves identically.",
    params(("slug" = String, Path, description = "Monitor ping slug")),
    responses(
        (status = 200, description = "Start recorded or monitor paused", body = PingResponse),
        (status = 404, description = "Unknown slug", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
    )
)]
pub async fn start(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    extensions: Extensions,
) -> Result<impl IntoResponse, WatchError> {
    ingest(&state, &slug, PingKind::Start, &headers, &extensions).await
}

async fn ingest(
    state: &AppState,
    slug: &str,
    kind: PingKind,
    headers: &HeaderMap,
    extensions: &Extensions,
) -> Result<Json<PingResponse>, WatchError> {
    let peer = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let source = PingSource::new(
        client_ip(headers, peer),
        headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    );
    let result = state.ingestor.ingest(slug, kind, source, Utc::now()).await?;
    Ok(Json(result.into()))
}

/// Caller IP: first `X-Forwarded-For` entry, then `X-Real-IP`, then the
/// socket peer.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| header("x-real-ip"))
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

/// Ping routes mounted at the root level.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/ping/{slug}", get(heartbeat).post(heartbeat))
        .route("/ping/{slug}/start", get(start).post(start))
}
