//! Service error types with HTTP status code mapping.
//!
//! [`WatchError`] is the central error type for cronwatch. Each variant
//! maps to a specific HTTP status code and structured JSON error response.

use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "monitor not found: nightly-backup",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see the table on [`WatchError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category         | HTTP Status                   |
/// |-----------|------------------|-------------------------------|
/// | 1000–1999 | Validation       | 400 Bad Request               |
/// | 2000–2999 | State/Not Found  | 404 Not Found / 409 Conflict  |
/// | 3000–3999 | Server           | 500 / 503                     |
/// | 4000–4999 | Access           | 401 / 429                     |
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// No monitor matches the given id or slug.
    #[error("monitor not found: {0}")]
    MonitorNotFound(String),

    /// No incident with the given id belongs to the monitor.
    #[error("incident not found: {0}")]
    IncidentNotFound(uuid::Uuid),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Another monitor already owns the requested slug.
    #[error("slug already in use: {0}")]
    SlugTaken(String),

    /// The operation does not apply to the monitor's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Missing or wrong trigger secret.
    #[error("unauthorized")]
    Unauthorized,

    /// Client exceeded rate limit.
    #[error("rate limit exceeded; retry after {retry_after_ms} ms")]
    RateLimited {
        /// Milliseconds until the client may retry.
        retry_after_ms: u64,
    },

    /// Persistence layer failure. Transient: callers retry on their own schedule.
    #[error("persistence error: {0}")]
    PersistenceError(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl WatchError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::MonitorNotFound(_) => 2001,
            Self::IncidentNotFound(_) => 2002,
            Self::SlugTaken(_) => 2003,
            Self::InvalidState(_) => 2004,
            Self::Internal(_) => 3000,
            Self::PersistenceError(_) => 3001,
            Self::Unauthorized => 4001,
            Self::RateLimited { .. } => 4029,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::MonitorNotFound(_) | Self::IncidentNotFound(_) => StatusCode::NOT_FOUND,
            Self::SlugTaken(_) | Self::InvalidState(_) => StatusCode::CONFLICT,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::PersistenceError(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` for failures the caller may retry later.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::PersistenceError(_) | Self::RateLimited { .. })
    }
}

impl From<sqlx::Error> for WatchError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::MonitorNotFound("row not found".to_string()),
            other => Self::PersistenceError(other.to_string()),
        }
    }
}

impl IntoResponse for WatchError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let retry_after_ms = match &self {
            Self::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        };
        let details = retry_after_ms.map(|ms| format!("retry_after_ms={ms}"));
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        if let Some(ms) = retry_after_ms {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(ms.div_ceil(1000).max(1)));
        }
        response
    }
}
