//! REST API layer: route handlers, DTOs, OpenAPI document and router
//! composition.
//!
//! Management endpoints are mounted under `/api/v1`; the ping, health and
//! sweep-trigger endpoints live at the root.

pub mod dto;
pub mod handlers;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// Path the OpenAPI document is served from.
pub const OPENAPI_PATH: &str = "/api-docs/openapi.json";

/// OpenAPI document for every REST endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "cronwatch API",
        description = "Dead man's switch monitoring for cron jobs",
    ),
    paths(
        handlers::monitor::create_monitor,
        handlers::monitor::list_monitors,
        handlers::monitor::get_monitor,
        handlers::monitor::update_monitor,
        handlers::monitor::pause_monitor,
        handlers::monitor::resume_monitor,
        handlers::monitor::archive_monitor,
        handlers::monitor::restore_monitor,
        handlers::monitor::list_pings,
        handlers::monitor::list_incidents,
        handlers::monitor::resolve_incident,
        handlers::ping::heartbeat,
        handlers::ping::start,
        handlers::system::health_handler,
        handlers::system::sweep_handler,
    ),
    tags(
        (name = "Monitors", description = "Monitor management"),
        (name = "Ping", description = "Heartbeat ingestion"),
        (name = "System", description = "Health and sweep trigger"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

#[derive(Debug)]
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            utoipa::openapi::security::SecurityScheme::Http(utoipa::openapi::security::Http::new(
                utoipa::openapi::security::HttpAuthScheme::Bearer,
            )),
        );
    }
}

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::ping::routes())
        .merge(handlers::system::routes())
}

/// Builds the full application: REST, WebSocket feed, API docs and the
/// tracing/CORS layers.
pub fn build_app(state: AppState) -> Router {
    let app = Router::new()
        .merge(build_router())
        .route("/ws", get(ws_handler))
        .with_state(state);

    with_docs(app)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[cfg(feature = "swagger-ui")]
fn with_docs(app: Router) -> Router {
    app.merge(utoipa_swagger_ui::SwaggerUi::new("/swagger-ui").url(OPENAPI_PATH, ApiDoc::openapi()))
}

#[cfg(not(feature = "swagger-ui"))]
fn with_docs(app: Router) -> Router {
    app.route(OPENAPI_PATH, get(|| async { axum::Json(ApiDoc::openapi()) }))
}
