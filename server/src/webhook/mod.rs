//! Webhook Relay
//!
//! Inbound provider callbacks. A request is either a verification challenge,
//! answered with an Ed25519 signature, or an opaque event payload, forwarded
//! verbatim to the bot's WebSocket connection.

pub mod delivery;
pub mod error;
pub mod handlers;
pub mod types;

pub use delivery::{attempt, forward, DeliveryOutcome};
pub use error::WebhookError;
pub use types::{classify, DeliveryStatus, InboundEvent, StatusResponse, WebhookQuery};
