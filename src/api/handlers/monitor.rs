//! Monitor management handlers: CRUD, lifecycle actions and history.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    CreateMonitorRequest, HistoryParams, IncidentDto, ListMonitorsParams, MonitorDto,
    MonitorListResponse, PaginationParams, PingDto, UpdateMonitorRequest,
};
use crate::app_state::AppState;
use crate::domain::{IncidentId, MonitorId};
use crate::error::{ErrorResponse, WatchError};
use crate::persistence::MonitorQuery;

/// `POST /monitors` — Create a monitor.
///
/// # Errors
///
/// Returns [`WatchError::InvalidRequest`] on validation failure or
/// [`WatchError::SlugTaken`] if the slug is in use.
#[utoipa::path(
    post,
    path = "/api/v1/monitors",
    tag = "Monitors",
    summary = "Create a monitor",
    description = "Creates a PENDING monitor. The deadline is armed by the first ping.",
    request_body = CreateMonitorRequest,
    responses(
        (status = 201, description = "Monitor created", body = MonitorDto),
        (status = 400, description = "Validation failed", body = ErrorResponse),
        (status = 409, description = "Slug already in use", body = ErrorResponse),
    )
)]
pub async fn create_monitor(
    State(state): State<AppState>,
    Json(req): Json<CreateMonitorRequest>,
) -> Result<impl IntoResponse, WatchError> {
    let monitor = state.monitors.create(req.into()).await?;
    Ok((StatusCode::CREATED, Json(MonitorDto::from(monitor))))
}

/// `GET /monitors` — List monitors with pagination and filters.
///
/// # Errors
///
/// Returns [`WatchError::PersistenceError`] on storage failure.
#[utoipa::path(
    get,
    path = "/api/v1/monitors",
    tag = "Monitors",
    summary = "List monitors",
    description = "Returns a paginated list of monitors, oldest first, optionally filtered by status.",
    params(ListMonitorsParams),
    responses(
        (status = 200, description = "Paginated monitor list", body = MonitorListResponse),
    )
)]
pub async fn list_monitors(
    State(state): State<AppState>,
    Query(params): Query<ListMonitorsParams>,
) -> Result<impl IntoResponse, WatchError> {
    let query = MonitorQuery {
        status: params.status,
        include_archived: params.include_archived,
    };
    let monitors = state.monitors.list(&query).await?;
    let page = PaginationParams {
        page: params.page,
        per_page: params.per_page,
    };
    let (data, pagination) = page.paginate(monitors);
    Ok(Json(MonitorListResponse {
        data: data.into_iter().map(MonitorDto::from).collect(),
        pagination,
    }))
}

/// `GET /monitors/{id}` — Get one monitor.
///
/// # Errors
///
/// Returns [`WatchError::MonitorNotFound`] if it does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/monitors/{id}",
    tag = "Monitors",
    summary = "Get monitor",
    params(("id" = uuid::Uuid, Path, description = "Monitor UUID")),
    responses(
        (status = 200, description = "Monitor details", body = MonitorDto),
        (status = 404, description = "Monitor not found", body = ErrorResponse),
    )
)]
pub async fn get_monitor(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, WatchError> {
    let monitor = state.monitors.get(MonitorId::from_uuid(id)).await?;
    Ok(Json(MonitorDto::from(monitor)))
}

/// `PATCH /monitors/{id}` — Change name, schedule or alert targets.
///
/// # Errors
///
/// Returns [`WatchError::InvalidRequest`] on validation failure,
/// [`WatchError::MonitorNotFound`], or [`WatchError::InvalidState`] for
/// archived monitors.
#[utoipa::path(
    patch,
    path = "/api/v1/monitors/{id}",
    tag = "Monitors",
    summary = "Update monitor",
    description = "Absent fields are unchanged; `null` clears an alert target. Changing the interval re-derives the deadline from the last heartbeat.",
    params(("id" = uuid::Uuid, Path, description = "Monitor UUID")),
    request_body = UpdateMonitorRequest,
    responses(
        (status = 200, description = "Updated monitor", body = MonitorDto),
        (status = 400, description = "Validation failed", body = ErrorResponse),
        (status = 404, description = "Monitor not found", body = ErrorResponse),
        (status = 409, description = "Monitor is archived", body = ErrorResponse),
    )
)]
pub async fn update_monitor(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<UpdateMonitorRequest>,
) -> Result<impl IntoResponse, WatchError> {
    let monitor = state
        .monitors
        .reconfigure(MonitorId::from_uuid(id), req.into())
        .await?;
    Ok(Json(MonitorDto::from(monitor)))
}

/// `POST /monitors/{id}/pause` — Freeze a monitor.
///
/// # Errors
///
/// Returns [`WatchError::MonitorNotFound`] or [`WatchError::InvalidState`].
#[utoipa::path(
    post,
    path = "/api/v1/monitors/{id}/pause",
    tag = "Monitors",
    summary = "Pause monitor",
    description = "Paused monitors acknowledge pings without recording them and are never swept.",
    params(("id" = uuid::Uuid, Path, description = "Monitor UUID")),
    responses(
        (status = 200, description = "Paused monitor", body = MonitorDto),
        (status = 404, description = "Monitor not found", body = ErrorResponse),
        (status = 409, description = "Monitor is archived", body = ErrorResponse),
    )
)]
pub async fn pause_monitor(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, WatchError> {
    let monitor = state.monitors.pause(MonitorId::from_uuid(id)).await?;
    Ok(Json(MonitorDto::from(monitor)))
}

/// `POST /monitors/{id}/resume` — Unfreeze a paused monitor.
///
/// # Errors
///
/// Returns [`WatchError::MonitorNotFound`] or [`WatchError::InvalidState`]
/// if it is not paused.
#[utoipa::path(
    post,
    path = "/api/v1/monitors/{id}/resume",
    tag = "Monitors",
    summary = "Resume monitor",
    description = "The monitor returns to PENDING and is re-armed by its next ping.",
    params(("id" = uuid::Uuid, Path, description = "Monitor UUID")),
    responses(
        (status = 200, description = "Resumed monitor", body = MonitorDto),
        (status = 404, description = "Monitor not found", body = ErrorResponse),
        (status = 409, description = "Monitor is not paused", body = ErrorResponse),
    )
)]
pub async fn resume_monitor(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, WatchError> {
    let monitor = state.monitors.resume(MonitorId::from_uuid(id)).await?;
    Ok(Json(MonitorDto::from(monitor)))
}

/// `POST /monitors/{id}/archive` — Soft-delete a monitor.
///
/// # Errors
///
/// Returns [`WatchError::MonitorNotFound`] or [`WatchError::InvalidState`]
/// if already archived.
#[utoipa::path(
    post,
    path = "/api/v1/monitors/{id}/archive",
    tag = "Monitors",
    summary = "Archive monitor",
    description = "Archived monitors stop accepting pings and are purged with their history after the retention window.",
    params(("id" = uuid::Uuid, Path, description = "Monitor UUID")),
    responses(
        (status = 200, description = "Archived monitor", body = MonitorDto),
        (status = 404, description = "Monitor not found", body = ErrorResponse),
        (status = 409, description = "Already archived", body = ErrorResponse),
    )
)]
pub async fn archive_monitor(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, WatchError> {
    let monitor = state.monitors.archive(MonitorId::from_uuid(id)).await?;
    Ok(Json(MonitorDto::from(monitor)))
}

/// `POST /monitors/{id}/restore` — Undo an archive.
///
/// # Errors
///
/// Returns [`WatchError::MonitorNotFound`] or [`WatchError::InvalidState`]
/// if not archived.
#[utoipa::path(
    post,
    path = "/api/v1/monitors/{id}/restore",
    tag = "Monitors",
    summary = "Restore monitor",
    params(("id" = uuid::Uuid, Path, description = "Monitor UUID")),
    responses(
        (status = 200, description = "Restored monitor", body = MonitorDto),
        (status = 404, description = "Monitor not found", body = ErrorResponse),
        (status = 409, description = "Not archived", body = ErrorResponse),
    )
)]
pub async fn restore_monitor(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, WatchError> {
    let monitor = state.monitors.restore(MonitorId::from_uuid(id)).await?;
    Ok(Json(MonitorDto::from(monitor)))
}

/// `GET /monitors/{id}/pings` — Recent pings, newest first.
///
/// # Errors
///
/// Returns [`WatchError::MonitorNotFound`] if the monitor does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/monitors/{id}/pings",
    tag = "Monitors",
    summary = "List pings",
    params(("id" = uuid::Uuid, Path, description = "Monitor UUID"), HistoryParams),
    responses(
        (status = 200, description = "Pings, newest first", body = Vec<PingDto>),
        (status = 404, description = "Monitor not found", body = ErrorResponse),
    )
)]
pub async fn list_pings(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, WatchError> {
    let pings = state
        .monitors
        .pings(MonitorId::from_uuid(id), params.limit())
        .await?;
    Ok(Json(pings.into_iter().map(PingDto::from).collect::<Vec<_>>()))
}

/// `GET /monitors/{id}/incidents` — Recent incidents, newest first.
///
/// # Errors
///
/// Returns [`WatchError::MonitorNotFound`] if the monitor does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/monitors/{id}/incidents",
    tag = "Monitors",
    summary = "List incidents",
    params(("id" = uuid::Uuid, Path, description = "Monitor UUID"), HistoryParams),
    responses(
        (status = 200, description = "Incidents, newest first", body = Vec<IncidentDto>),
        (status = 404, description = "Monitor not found", body = ErrorResponse),
    )
)]
pub async fn list_incidents(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, WatchError> {
    let incidents = state
        .monitors
        .incidents(MonitorId::from_uuid(id), params.limit())
        .await?;
    Ok(Json(
        incidents.into_iter().map(IncidentDto::from).collect::<Vec<_>>(),
    ))
}

/// `POST /monitors/{id}/incidents/{incident_id}/resolve` — Close an
/// incident by hand.
///
/// # Errors
///
/// Returns [`WatchError::IncidentNotFound`] or [`WatchError::InvalidState`]
/// if it is already resolved.
#[utoipa::path(
    post,
    path = "/api/v1/monitors/{id}/incidents/{incident_id}/resolve",
    tag = "Monitors",
    summary = "Resolve incident",
    params(
        ("id" = uuid::Uuid, Path, description = "Monitor UUID"),
        ("incident_id" = uuid::Uuid, Path, description = "Incident UUID"),
    ),
    responses(
        (status = 200, description = "Resolved incident", body = IncidentDto),
        (status = 404, description = "Incident not found", body = ErrorResponse),
        (status = 409, description = "Already resolved", body = ErrorResponse),
    )
)]
pub async fn resolve_incident(
    State(state): State<AppState>,
    Path((id, incident_id)): Path<(uuid::Uuid, uuid::Uuid)>,
) -> Result<impl IntoResponse, WatchError> {
    let incident = state
        .monitors
        .resolve_incident(MonitorId::from_uuid(id), IncidentId::from_uuid(incident_id))
        .await?;
    Ok(Json(IncidentDto::from(incident)))
}

/// Monitor management routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/monitors", post(create_monitor).get(list_monitors))
        .route("/monitors/{id}", get(get_monitor).patch(update_monitor))
        .route("/monitors/{id}/pause", post(pause_monitor))
        .route("/monitors/{id}/resume", post(resume_monitor))
        .route("/monitors/{id}/archive", post(archive_monitor))
        .route("/monitors/{id}/restore", post(restore_monitor))
        .route("/monitors/{id}/pings", get(list_pings))
        .route("/monitors/{id}/incidents", get(list_incidents))
        .route(
            "/monitors/{id}/incidents/{incident_id}/resolve",
            post(resolve_incident),
        )
}
