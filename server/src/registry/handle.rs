//! Duplex Channel Handles
//!
//! A [`ChannelHandle`] is the push side of one WebSocket session. The session
//! task owns the socket and drains a [`ChannelOutbox`]; everything else talks
//! to the connection through the handle.

use std::fmt;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Default number of frames that may queue behind a slow client.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// Unique identity of one accepted connection.
///
/// Two handles are the same connection only if their ids match; nothing else
/// about a connection is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Why a frame could not be pushed to a client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendError {
    /// The session is gone (closed, superseded or never drained the frame).
    #[error("connection closed")]
    Disconnected,

    /// The socket rejected the write.
    #[error("transport error: {0}")]
    Transport(String),
}

/// One queued text frame plus the acknowledgement the sender waits on.
#[derive(Debug)]
pub struct Outbound {
    text: String,
    ack: oneshot::Sender<Result<(), SendError>>,
}

impl Outbound {
    /// Frame contents.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Report the write result back to the sender and hand back the text.
    pub fn complete(self, result: Result<(), SendError>) -> String {
        // The sender may have given up waiting; nothing to do then.
        let _ = self.ack.send(result);
        self.text
    }
}

/// Push side of a duplex connection.
///
/// Cloning is cheap; all clones refer to the same connection.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    id: ConnectionId,
    outbound: mpsc::Sender<Outbound>,
    shutdown: CancellationToken,
}

/// Receiving end owned by the session task.
#[derive(Debug)]
pub struct ChannelOutbox {
    outbound: mpsc::Receiver<Outbound>,
    shutdown: CancellationToken,
}

impl ChannelHandle {
    /// Create a handle and the outbox its session drains.
    pub fn new(capacity: usize) -> (Self, ChannelOutbox) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let shutdown = CancellationToken::new();

        (
            Self {
                id: ConnectionId::new(),
                outbound: tx,
                shutdown: shutdown.clone(),
            },
            ChannelOutbox {
                outbound: rx,
                shutdown,
            },
        )
    }

    /// Identity of the underlying connection.
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether `other` refers to the same connection.
    pub fn same_connection(&self, other: &Self) -> bool {
        self.id == other.id
    }

    /// Push a text frame and wait until it is flushed or fails.
    pub async fn send(&self, text: impl Into<String>) -> Result<(), SendError> {
        if self.shutdown.is_cancelled() {
            return Err(SendError::Disconnected);
        }

        let (ack, done) = oneshot::channel();
        self.outbound
            .send(Outbound {
                text: text.into(),
                ack,
            })
            .await
            .map_err(|_| SendError::Disconnected)?;

        done.await.map_err(|_| SendError::Disconnected)?
    }

    /// Ask the session to shut down. Never blocks.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Whether the connection has been asked to close or its session is gone.
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled() || self.outbound.is_closed()
    }
}

impl ChannelOutbox {
    /// Next queued frame. `None` once every handle is dropped.
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.outbound.recv().await
    }

    /// Token cancelled when any handle calls [`ChannelHandle::close`].
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}
