//! tracing-subscriber initialization with a reloadable level filter.
//!
//! Output is JSON on stdout. When `RUST_LOG` is set it wins over the
//! configured level, both at startup and on reload.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{reload, EnvFilter, Registry};

/// Logging setup errors.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// Unknown verbosity name.
    #[error("Unknown log level: {0}")]
    InvalidLevel(String),

    /// Filter directives did not parse.
    #[error("Invalid log filter: {0}")]
    Filter(String),

    /// A global subscriber was already installed.
    #[error("Tracing already initialized: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),

    /// The subscriber backing the reload handle is gone.
    #[error("Log filter reload failed: {0}")]
    Reload(#[from] reload::Error),
}

/// Map a configured level name onto a tracing level.
///
/// Accepts the names older configs used (`WARNING`, `CRITICAL`) as well.
pub fn normalize_level(level: &str) -> Result<&'static str, LoggingError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" | "critical" | "fatal" => Ok("error"),
        "off" => Ok("off"),
        _ => Err(LoggingError::InvalidLevel(level.to_owned())),
    }
}

/// Filter directives for our crates at `level`; everything else at `warn`.
pub fn directives(level: &str) -> Result<String, LoggingError> {
    let level = normalize_level(level)?;
    Ok(format!(
        "warn,hb_server={level},hb_crypto={level},tower_http={level}"
    ))
}

fn build_filter(level: &str, env_override: bool) -> Result<EnvFilter, LoggingError> {
    if env_override {
        return EnvFilter::try_from_default_env().map_err(|e| LoggingError::Filter(e.to_string()));
    }
    EnvFilter::try_new(directives(level)?).map_err(|e| LoggingError::Filter(e.to_string()))
}

/// Handle for changing verbosity after startup.
#[derive(Clone)]
pub struct LogHandle {
    filter: reload::Handle<EnvFilter, Registry>,
    env_override: bool,
}

impl LogHandle {
    /// Swap in a new level. Returns `false` when `RUST_LOG` pins the filter.
    pub fn set_level(&self, level: &str) -> Result<bool, LoggingError> {
        if self.env_override {
            return Ok(false);
        }
        self.filter.reload(build_filter(level, false)?)?;
        Ok(true)
    }
}

/// Install the global subscriber.
pub fn init(level: &str) -> Result<LogHandle, LoggingError> {
    let env_override = std::env::var_os(EnvFilter::DEFAULT_ENV).is_some();
    let (filter, handle) = reload::Layer::new(build_filter(level, env_override)?);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()?;

    Ok(LogHandle {
        filter: handle,
        env_override,
    })
}
