//! Webhook Relay Handler
//!
//! `POST /webhook?secret=<key>` either answers a verification challenge or
//! forwards the body to the WebSocket registered for `key`.

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, info, instrument};

use super::delivery::forward;
use super::error::WebhookError;
use super::types::{classify, InboundEvent, StatusResponse, WebhookQuery};
use crate::api::AppState;
use crate::util::key_fingerprint;

/// Receive one webhook call.
///
/// The key is checked before anything else, so a missing key never touches
/// the registry or the signer. A query string that does not parse counts as
/// a missing key.
#[instrument(skip_all, fields(key))]
pub async fn receive_webhook(
    State(state): State<AppState>,
    query: Result<Query<WebhookQuery>, QueryRejection>,
    body: Bytes,
) -> Result<Response, WebhookError> {
    let Query(query) = query.map_err(|rejection| {
        debug!(error = %rejection.body_text(), "Unparseable webhook query");
        WebhookError::MissingKey
    })?;
    let key = query.key()?;
    let fingerprint = key_fingerprint(key);
    tracing::Span::current().record("key", fingerprint.as_str());

    match classify(&body)? {
        InboundEvent::Challenge {
            event_ts,
            plain_token,
        } => {
            let reply = hb_crypto::sign_challenge(key, &event_ts, &plain_token)?;
            info!(%event_ts, "Answered verification challenge");
            Ok(Json(reply).into_response())
        }
        InboundEvent::Payload(payload) => {
            debug!(bytes = payload.len(), "Forwarding payload");
            let outcome = forward(&state.registry, key, payload).await;
            Ok(Json(StatusResponse {
                status: outcome.status(),
            })
            .into_response())
        }
    }
}
