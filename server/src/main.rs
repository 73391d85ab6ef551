//! `HookBridge` Server - Main Entry Point
//!
//! Relays provider webhooks to bot WebSocket connections.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use hb_server::api::{self, AppState};
use hb_server::config::{self, ConfigProvider, FileConfig, Settings};
use hb_server::observability::{self, LogHandle};
use hb_server::registry::ConnectionRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config_path = config::locate_or_create().context("Failed to locate config file")?;
    let file_config = Arc::new(
        FileConfig::load(&config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?,
    );
    let settings = Settings::from_provider(file_config.as_ref()).context("Invalid configuration")?;

    // Initialize tracing
    let log = observability::init(&settings.log_level).context("Failed to initialize logging")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "Starting HookBridge Server"
    );

    let bind_address = settings.bind_address();
    info!(
        websocket = %format!("ws://{bind_address}/ws/<secret>"),
        webhook = %format!("http://{bind_address}/webhook?secret=<secret>"),
        "Access addresses"
    );

    // Build application state
    let registry = Arc::new(ConnectionRegistry::new());
    let provider: Arc<dyn ConfigProvider> = file_config.clone();
    let state = AppState::new(registry.clone(), provider, settings.clone());

    // Config reload runs for the lifetime of the process
    tokio::spawn(watch_config(file_config, settings, log));

    // Build router
    let app = api::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;
    info!(address = %bind_address, "Server listening");

    // Graceful shutdown handler
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        let closing = registry.close_all();
        info!(connections = closing, "Received shutdown signal, closing connections");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("Server shutdown complete");

    Ok(())
}

/// Reload config on SIGHUP and, if configured, on a modification poll.
async fn watch_config(config: Arc<FileConfig>, mut current: Settings, log: LogHandle) {
    let mut hangup = hangup_stream();
    let poll = current.poll_interval_secs;
    let mut ticker = (poll > 0).then(|| tokio::time::interval(Duration::from_secs(poll)));

    loop {
        let reloaded = tokio::select! {
            () = next_hangup(&mut hangup) => {
                info!("SIGHUP received, reloading config");
                config.reload()
            }
            () = next_tick(&mut ticker) => config.reload_if_modified(),
        };

        match reloaded {
            Ok(true) => current = apply_reload(config.as_ref(), current, &log),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Config reload failed, keeping previous values"),
        }
    }
}

/// Re-derive settings and apply what can change at runtime.
fn apply_reload(config: &FileConfig, current: Settings, log: &LogHandle) -> Settings {
    let fresh = match Settings::from_provider(config) {
        Ok(fresh) => fresh,
        Err(e) => {
            warn!(error = %e, "Reloaded config is invalid, keeping previous settings");
            return current;
        }
    };

    if fresh.log_level != current.log_level {
        match log.set_level(&fresh.log_level) {
            Ok(true) => info!(level = %fresh.log_level, "Log level changed"),
            Ok(false) => info!("RUST_LOG is set, ignoring configured log level"),
            Err(e) => warn!(error = %e, "Could not apply log level"),
        }
    }

    for (key, (old, new)) in current.restart_required(&fresh) {
        warn!(key, old = %old, new = %new, "Config change takes effect after restart");
    }

    fresh
}

#[cfg(unix)]
type Hangup = Option<tokio::signal::unix::Signal>;

#[cfg(not(unix))]
type Hangup = ();

#[cfg(unix)]
fn hangup_stream() -> Hangup {
    use tokio::signal::unix::{signal, SignalKind};

    signal(SignalKind::hangup())
        .map_err(|e| warn!(error = %e, "SIGHUP reload unavailable"))
        .ok()
}

#[cfg(not(unix))]
const fn hangup_stream() -> Hangup {}

#[cfg(unix)]
async fn next_hangup(hangup: &mut Hangup) {
    if let Some(signal) = hangup {
        if signal.recv().await.is_some() {
            return;
        }
    }
    std::future::pending().await
}

#[cfg(not(unix))]
async fn next_hangup(_hangup: &mut Hangup) {
    std::future::pending().await;
}

async fn next_tick(ticker: &mut Option<tokio::time::Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
