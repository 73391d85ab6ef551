//! Webhook Types
//!
//! Request parsing and response bodies for the relay endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::WebhookError;
use crate::util::is_usable_key;

/// Query parameters of `POST /webhook`.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookQuery {
    /// Bot secret that routes the request.
    pub secret: Option<String>,
}

impl WebhookQuery {
    /// The routing key, rejecting absent, empty or whitespace-only values.
    pub fn key(&self) -> Result<&str, WebhookError> {
        self.secret
            .as_deref()
            .filter(|secret| is_usable_key(secret))
            .ok_or(WebhookError::MissingKey)
    }
}

/// What an inbound webhook body turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Verification handshake to be answered with a signature.
    Challenge { event_ts: String, plain_token: String },
    /// Event to forward verbatim.
    Payload(String),
}

/// Field holding the event data in provider envelopes.
const ENVELOPE_FIELD: &str = "d";

/// Decide whether `body` is a challenge or a payload.
///
/// A challenge is a JSON object whose `d` object carries both `event_ts` and
/// `plain_token`. Everything else is forwarded as-is, which requires UTF-8.
pub fn classify(body: &[u8]) -> Result<InboundEvent, WebhookError> {
    if let Ok(Value::Object(envelope)) = serde_json::from_slice::<Value>(body) {
        if let Some(Value::Object(data)) = envelope.get(ENVELOPE_FIELD) {
            if let (Some(event_ts), Some(plain_token)) =
                (data.get("event_ts"), data.get("plain_token"))
            {
                return Ok(InboundEvent::Challenge {
                    event_ts: challenge_field("event_ts", event_ts)?,
                    plain_token: challenge_field("plain_token", plain_token)?,
                });
            }
        }
    }

    String::from_utf8(body.to_vec())
        .map(InboundEvent::Payload)
        .map_err(|_| WebhookError::InvalidEncoding)
}

/// Render a challenge field as the text that gets signed.
fn challenge_field(name: &str, value: &Value) -> Result<String, WebhookError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(WebhookError::SignatureInput(format!(
            "{name} must be a string or number"
        ))),
    }
}

/// Forwarding status reported to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryStatus {
    /// Forwarding was attempted on a registered connection.
    Delivered,
    /// No connection is registered for the key.
    NotReady,
}

/// Body of a forwarding response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: DeliveryStatus,
}
