//! Payload Delivery
//!
//! Forwards one payload to the connection registered for a key. There is no
//! queue and no retry: the provider retries on its own schedule.

use tracing::{info, warn};

use super::types::DeliveryStatus;
use crate::registry::{ChannelHandle, ConnectionRegistry, SendError};
use crate::util::key_fingerprint;

/// Result of one forwarding attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The frame was flushed to the client.
    Delivered,
    /// No connection is registered for the key.
    NotReady,
    /// The registered connection had already gone away.
    Stale,
    /// The socket rejected the write.
    Failed(String),
}

impl DeliveryOutcome {
    /// Status reported to the provider.
    ///
    /// `Stale` and `Failed` still report `Delivered`: the provider contract
    /// only promises that forwarding was attempted.
    pub const fn status(&self) -> DeliveryStatus {
        match self {
            Self::NotReady => DeliveryStatus::NotReady,
            Self::Delivered | Self::Stale | Self::Failed(_) => DeliveryStatus::Delivered,
        }
    }
}

/// Push `payload` to `handle` and classify the result. Performs no cleanup.
pub async fn attempt(handle: &ChannelHandle, payload: String) -> DeliveryOutcome {
    match handle.send(payload).await {
        Ok(()) => DeliveryOutcome::Delivered,
        Err(SendError::Disconnected) => DeliveryOutcome::Stale,
        Err(SendError::Transport(error)) => DeliveryOutcome::Failed(error),
    }
}

/// Forward `payload` to the owner of `key`, dropping the entry if it is stale.
pub async fn forward(registry: &ConnectionRegistry, key: &str, payload: String) -> DeliveryOutcome {
    let fingerprint = key_fingerprint(key);

    let Some(handle) = registry.get(key) else {
        warn!(key = %fingerprint, "No active connection");
        return DeliveryOutcome::NotReady;
    };

    let outcome = attempt(&handle, payload).await;
    match &outcome {
        DeliveryOutcome::Delivered => {
            info!(key = %fingerprint, connection_id = %handle.id(), "Payload delivered");
        }
        DeliveryOutcome::Stale => {
            let removed = registry.remove_if_owner(key, &handle);
            warn!(
                key = %fingerprint,
                connection_id = %handle.id(),
                removed,
                "Connection gone, dropped stale entry"
            );
        }
        DeliveryOutcome::Failed(error) => {
            warn!(key = %fingerprint, connection_id = %handle.id(), %error, "Payload push failed");
        }
        DeliveryOutcome::NotReady => {}
    }
    outcome
}
