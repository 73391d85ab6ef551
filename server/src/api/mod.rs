//! API Router and Application State
//!
//! Central routing configuration and shared state.

use std::any::Any;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{self, CorsLayer},
    trace::TraceLayer,
};

use crate::{config::ConfigProvider, config::Settings, registry::ConnectionRegistry, webhook, ws};

/// Name reported by the service descriptor.
pub const SERVICE_NAME: &str = "HookBridge";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Secret → connection map shared by the webhook and WebSocket handlers
    pub registry: Arc<ConnectionRegistry>,
    /// Live configuration, re-read on reload
    pub config: Arc<dyn ConfigProvider>,
    /// Settings resolved at startup (bind address, body limit)
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        config: Arc<dyn ConfigProvider>,
        settings: Settings,
    ) -> Self {
        Self {
            registry,
            config,
            settings: Arc::new(settings),
        }
    }
}

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    let max_body_bytes = state.settings.max_body_bytes;

    let routes = Router::new()
        // Service descriptor
        .route("/", get(describe))
        .route("/favicon.ico", get(describe))
        // Health check
        .route("/health", get(health_check))
        // Provider callbacks
        .route("/webhook", post(webhook::handlers::receive_webhook))
        // Bot clients
        .route("/ws/{secret}", get(ws::handler));

    apply_layers(routes, max_body_bytes).with_state(state)
}

/// Middleware shared by every route.
fn apply_layers<S>(router: Router<S>, max_body_bytes: usize) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(cors::Any)
        .allow_methods(cors::Any)
        .allow_headers(cors::Any);

    router
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(CatchPanicLayer::custom(handle_panic))
}

/// Turn a handler panic into a 500 so the listener keeps serving.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(%detail, "Request handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal server error" })),
    )
        .into_response()
}

/// Service descriptor response.
#[derive(Serialize)]
struct Descriptor {
    /// Service name
    name: &'static str,
    /// Human-readable status line
    msg: &'static str,
    /// Server version
    version: &'static str,
    /// Currently registered WebSocket connections
    connections: usize,
}

/// Service descriptor, served on `/` and `/favicon.ico`.
async fn describe(State(state): State<AppState>) -> Json<Descriptor> {
    Json(Descriptor {
        name: SERVICE_NAME,
        msg: "Webhook to WebSocket relay is running",
        version: env!("CARGO_PKG_VERSION"),
        connections: state.registry.len(),
    })
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    /// Service status
    status: &'static str,
}

/// Health check endpoint.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
