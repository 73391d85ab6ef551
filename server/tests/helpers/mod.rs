//! Reusable test helpers for HTTP and WebSocket integration tests.
//!
//! Provides `TestApp` for sending requests through the full axum router,
//! plus a real listener for WebSocket clients.
//!
//! ## Test Servers
//!
//! Use [`spawn_test_server()`] when a test needs real sockets (WebSocket
//! upgrades) instead of `tower::ServiceExt::oneshot`. Both share the same
//! registry, so a webhook sent through `oneshot` reaches a socket connected
//! to the spawned server.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{self, Method, Request, Response};
use axum::Router;
use futures::StreamExt;
use hb_server::api::{create_router, AppState};
use hb_server::config::{ConfigProvider, Settings, StaticConfig};
use hb_server::registry::ConnectionRegistry;
use http_body_util::BodyExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

/// Client side of a test WebSocket.
pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Config used by tests: short keep-alive timings.
const TEST_CONFIG: &str = r"
[websocket]
ping_interval_secs = 5
idle_timeout_secs = 30
";

// ============================================================================
// Test App
// ============================================================================

/// A test application wrapping the full axum router.
pub struct TestApp {
    pub router: Router,
    pub registry: Arc<ConnectionRegistry>,
}

impl TestApp {
    /// Create a new test app with an empty registry.
    pub fn new() -> Self {
        let config = StaticConfig::from_toml(TEST_CONFIG).expect("Invalid test config");
        Self::with_config(config, Settings::default_for_test())
    }

    /// Create a test app with a custom provider and settings.
    pub fn with_config(config: StaticConfig, settings: Settings) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let config: Arc<dyn ConfigProvider> = Arc::new(config);
        let router = create_router(AppState::new(registry.clone(), config, settings));

        Self { router, registry }
    }

    /// Build an HTTP request with the given method and URI.
    pub fn request(method: Method, uri: &str) -> http::request::Builder {
        Request::builder().method(method).uri(uri)
    }

    /// Send a request through the router via `tower::ServiceExt::oneshot`.
    pub async fn oneshot(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot request failed")
    }

    /// POST `body` to `/webhook`, with `?secret=` when `secret` is given.
    pub async fn post_webhook(&self, secret: Option<&str>, body: impl Into<Body>) -> Response<Body> {
        let uri = secret.map_or_else(|| "/webhook".to_string(), |s| format!("/webhook?secret={s}"));
        let request = Self::request(Method::POST, &uri)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .expect("Failed to build webhook request");
        self.oneshot(request).await
    }

    /// Poll until `secret` has a registered connection.
    pub async fn wait_for_registration(&self, secret: &str) {
        wait_until(|| self.registry.contains(secret)).await;
    }
}

/// Poll `condition` every few milliseconds, failing after two seconds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Condition not reached in time");
}

// ============================================================================
// Test Server
// ============================================================================

/// A running test server bound to a random port.
pub struct TestServer {
    /// Server address (127.0.0.1:PORT).
    pub addr: SocketAddr,
    /// Base URL for WebSocket connections (e.g., `ws://127.0.0.1:12345`).
    pub ws_url: String,
    /// Handle to the server task for cleanup.
    _handle: JoinHandle<()>,
}

impl TestServer {
    /// Open a WebSocket under `secret`.
    pub async fn connect(&self, secret: &str) -> WsClient {
        let (socket, _) = connect_async(format!("{}/ws/{secret}", self.ws_url))
            .await
            .expect("WebSocket connect failed");
        socket
    }
}

/// Spawn a real HTTP server on a random port.
pub async fn spawn_test_server(router: Router) -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to get local addr");
    let ws_url = format!("ws://{addr}");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("Test server failed");
    });

    TestServer {
        addr,
        ws_url,
        _handle: handle,
    }
}

/// Next text frame from `socket`, skipping control frames.
pub async fn next_text(socket: &mut WsClient) -> String {
    let read = async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => return text.as_str().to_owned(),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                other => panic!("Expected text frame, got {other:?}"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(2), read)
        .await
        .expect("No text frame received")
}

/// Wait for the server to close `socket`.
pub async fn expect_closed(socket: &mut WsClient) {
    let read = async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Close(_)) | Err(_)) | None => return,
                Some(Ok(_)) => {}
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(2), read)
        .await
        .expect("Socket was not closed");
}

// ============================================================================
// Response helpers
// ============================================================================

/// Collect a response body and parse it as JSON.
pub async fn body_to_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to collect response body")
        .to_bytes();
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        let preview = String::from_utf8_lossy(&bytes);
        panic!("Failed to parse response as JSON: {e}\nBody: {preview}")
    })
}
