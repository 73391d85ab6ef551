//! WebSocket Session Lifecycle
//!
//! One [`Session`] per accepted connection:
//!
//! ```text
//! Connecting --put--> Active --disconnect/supersede/idle--> Closing --remove_if_owner--> Closed
//! ```
//!
//! Registration evicts (and closes) any previous connection for the same key.
//! On the way out a session only unregisters itself if it is still the owner.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::time::{Instant, MissedTickBehavior, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::KeepAlive;
use crate::registry::{ChannelHandle, ChannelOutbox, ConnectionRegistry, SendError};
use crate::util::key_fingerprint;

/// Upper bound on waiting for a close frame to flush.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Lifecycle states of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closing,
    Closed,
}

/// Why a session left the `Active` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Client sent a close frame.
    PeerClosed,
    /// Inbound stream ended without a close frame.
    StreamEnded,
    /// Reading from the socket failed.
    ReceiveError(String),
    /// Writing to the socket failed.
    SendFailed(String),
    /// No inbound frame within the idle timeout.
    IdleTimeout,
    /// Another connection registered the same key, or the server is shutting down.
    Superseded,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed => f.write_str("peer closed"),
            Self::StreamEnded => f.write_str("stream ended"),
            Self::ReceiveError(e) => write!(f, "receive error: {e}"),
            Self::SendFailed(e) => write!(f, "send failed: {e}"),
            Self::IdleTimeout => f.write_str("idle timeout"),
            Self::Superseded => f.write_str("superseded"),
        }
    }
}

/// Registry membership of one connection.
///
/// Dropping a session that never reached `Closed` still runs the
/// owner-checked removal, so an aborted task cannot leave a dead entry.
pub struct Session {
    key: String,
    handle: ChannelHandle,
    registry: Arc<ConnectionRegistry>,
    state: SessionState,
}

impl Session {
    /// Register a new connection under `key` and return its outbox.
    pub fn open(
        registry: Arc<ConnectionRegistry>,
        key: impl Into<String>,
        outbound_capacity: usize,
    ) -> (Self, ChannelOutbox) {
        let (handle, outbox) = ChannelHandle::new(outbound_capacity);
        let mut session = Self {
            key: key.into(),
            handle,
            registry,
            state: SessionState::Connecting,
        };
        session.activate();
        (session, outbox)
    }

    fn activate(&mut self) {
        let fingerprint = key_fingerprint(&self.key);

        if let Some(evicted) = self.registry.put(&self.key, self.handle.clone()) {
            evicted.close();
            info!(
                key = %fingerprint,
                old_connection = %evicted.id(),
                "Closed superseded connection"
            );
        }

        self.state = SessionState::Active;
        info!(key = %fingerprint, connection_id = %self.handle.id(), "Connection established");
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Push handle for this connection.
    pub const fn handle(&self) -> &ChannelHandle {
        &self.handle
    }

    /// Key this session is registered under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Leave the registry. Returns whether this session was still the owner.
    pub fn finish(mut self, reason: &CloseReason) -> bool {
        self.release(Some(reason))
    }

    fn release(&mut self, reason: Option<&CloseReason>) -> bool {
        if self.state == SessionState::Closed {
            return false;
        }
        self.state = SessionState::Closing;

        // Wake anyone still queued on this handle.
        self.handle.close();
        let removed = self.registry.remove_if_owner(&self.key, &self.handle);
        self.state = SessionState::Closed;

        let fingerprint = key_fingerprint(&self.key);
        let reason = reason.map_or_else(|| "dropped".to_string(), ToString::to_string);
        if removed {
            info!(key = %fingerprint, connection_id = %self.handle.id(), %reason, "Connection closed and unregistered");
        } else {
            debug!(key = %fingerprint, connection_id = %self.handle.id(), %reason, "Superseded connection closed");
        }
        removed
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release(None);
    }
}

/// Pump frames between the socket halves and the outbox until the session ends.
///
/// Inbound client frames are read only to detect liveness and are discarded.
pub async fn drive<St, Si, E>(
    mut stream: St,
    mut sink: Si,
    mut outbox: ChannelOutbox,
    keepalive: KeepAlive,
) -> CloseReason
where
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
    Si: Sink<Message> + Unpin,
    Si::Error: fmt::Display,
{
    let shutdown = outbox.shutdown_token();

    let pings_enabled = !keepalive.ping_interval.is_zero();
    let ping_period = keepalive.ping_interval.max(Duration::from_secs(1));
    let mut ping = tokio::time::interval_at(Instant::now() + ping_period, ping_period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let idle_enabled = !keepalive.idle_timeout.is_zero();
    let idle = tokio::time::sleep(keepalive.idle_timeout);
    tokio::pin!(idle);

    let reason = loop {
        tokio::select! {
            () = shutdown.cancelled() => break CloseReason::Superseded,

            Some(outbound) = outbox.recv() => {
                let frame = Message::Text(outbound.text().to_owned().into());
                match write_frame(&mut sink, frame, &shutdown, idle.as_mut(), idle_enabled).await {
                    Ok(()) => {
                        outbound.complete(Ok(()));
                    }
                    Err(reason) => {
                        let error = match &reason {
                            CloseReason::SendFailed(e) => SendError::Transport(e.clone()),
                            _ => SendError::Disconnected,
                        };
                        outbound.complete(Err(error));
                        break reason;
                    }
                }
            }

            frame = stream.next() => match frame {
                Some(Ok(Message::Close(_))) => break CloseReason::PeerClosed,
                Some(Ok(message)) => {
                    if idle_enabled {
                        idle.as_mut().reset(Instant::now() + keepalive.idle_timeout);
                    }
                    if matches!(message, Message::Text(_) | Message::Binary(_)) {
                        debug!(bytes = message_len(&message), "Discarded client frame");
                    }
                }
                Some(Err(e)) => break CloseReason::ReceiveError(e.to_string()),
                None => break CloseReason::StreamEnded,
            },

            _ = ping.tick(), if pings_enabled => {
                let frame = Message::Ping(Bytes::new());
                if let Err(reason) =
                    write_frame(&mut sink, frame, &shutdown, idle.as_mut(), idle_enabled).await
                {
                    break reason;
                }
            }

            () = &mut idle, if idle_enabled => break CloseReason::IdleTimeout,
        }
    };

    if matches!(reason, CloseReason::Superseded | CloseReason::IdleTimeout) {
        // Best effort; the peer may already be gone.
        let _ = tokio::time::timeout(CLOSE_GRACE, sink.send(Message::Close(None))).await;
    }
    reason
}

/// Write one frame, giving up if the session is stopped or goes idle first.
///
/// A peer that stops reading leaves the write pending forever, so the write
/// races the shutdown token and the idle deadline.
async fn write_frame<Si>(
    sink: &mut Si,
    frame: Message,
    shutdown: &CancellationToken,
    idle: Pin<&mut Sleep>,
    idle_enabled: bool,
) -> Result<(), CloseReason>
where
    Si: Sink<Message> + Unpin,
    Si::Error: fmt::Display,
{
    tokio::select! {
        result = sink.send(frame) => result.map_err(|e| CloseReason::SendFailed(e.to_string())),
        () = shutdown.cancelled() => Err(CloseReason::Superseded),
        () = idle, if idle_enabled => Err(CloseReason::IdleTimeout),
    }
}

fn message_len(message: &Message) -> usize {
    match message {
        Message::Text(text) => text.len(),
        Message::Binary(data) => data.len(),
        _ => 0,
    }
}

/// Run a full session on an upgraded socket.
pub async fn run(
    socket: WebSocket,
    key: String,
    registry: Arc<ConnectionRegistry>,
    keepalive: KeepAlive,
    outbound_capacity: usize,
) {
    let (session, outbox) = Session::open(registry, key, outbound_capacity);
    let (sink, stream) = socket.split();

    let reason = drive(stream, sink, outbox, keepalive).await;
    if let CloseReason::ReceiveError(error) | CloseReason::SendFailed(error) = &reason {
        warn!(key = %key_fingerprint(session.key()), %error, "Connection error");
    }
    session.finish(&reason);
}
