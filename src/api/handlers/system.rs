//! System endpoints: health check and the external sweep trigger.

use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;
use crate::error::{ErrorResponse, WatchError};
use crate::service::SweepReport;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
    storage: String,
}

/// `GET /health` — Service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health status, version, storage backend and current timestamp.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let storage = if state.config.persistence_enabled {
        "postgres"
    } else {
        "memory"
    };
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            storage: storage.to_string(),
        }),
    )
}

/// `POST /internal/sweep` — Run one liveness sweep now.
///
/// Intended for an external fixed-interval trigger. When `CRON_SECRET` is
/// configured the request must carry `Authorization: Bearer <secret>`.
///
/// # Errors
///
/// Returns [`WatchError::Unauthorized`] on a missing or wrong secret, or
/// [`WatchError::PersistenceError`] if the candidate query fails.
#[utoipa::path(
    post,
    path = "/internal/sweep",
    tag = "System",
    summary = "Trigger a sweep",
    description = "Checks every overdue monitor, opens incidents, sends alerts and purges expired archives. Safe to call concurrently with the in-process ticker.",
    responses(
        (status = 200, description = "Sweep completed", body = SweepReport),
        (status = 401, description = "Missing or wrong secret", body = ErrorResponse),
        (status = 503, description = "Storage unavailable", body = ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn sweep_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, WatchError> {
    if let Some(secret) = &state.config.cron_secret {
        let presented = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if presented != Some(secret.as_str()) {
            tracing::warn!("sweep trigger rejected: bad secret");
            return Err(WatchError::Unauthorized);
        }
    }
    let report = state.sweeper.sweep(Utc::now()).await?;
    Ok(Json(report))
}

/// System routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/internal/sweep", post(sweep_handler))
}
