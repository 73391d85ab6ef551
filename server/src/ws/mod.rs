//! WebSocket Handler
//!
//! Bot clients connect to `/ws/{secret}` and receive every webhook payload
//! posted for that secret. The socket is a push sink: anything the client
//! sends is read for liveness and dropped.

pub mod session;

use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{info, warn};

use crate::api::AppState;
use crate::config::KeepAlive;
use crate::registry::DEFAULT_OUTBOUND_CAPACITY;
use crate::util::{is_usable_key, key_fingerprint};

pub use session::{drive, CloseReason, Session, SessionState};

/// WebSocket upgrade handler.
pub async fn handler(
    ws: WebSocketUpgrade,
    Path(secret): Path<String>,
    State(state): State<AppState>,
) -> Response {
    if !is_usable_key(&secret) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Secret required" })),
        )
            .into_response();
    }

    // Read per connection so a config reload applies to new sessions.
    let keepalive = KeepAlive::from_provider(state.config.as_ref()).unwrap_or_else(|e| {
        warn!(error = %e, "Invalid keep-alive config, using defaults");
        KeepAlive::default()
    });

    info!(key = %key_fingerprint(&secret), "WebSocket upgrade requested");

    let registry = state.registry.clone();
    ws.on_upgrade(move |socket| {
        session::run(socket, secret, registry, keepalive, DEFAULT_OUTBOUND_CAPACITY)
    })
}
