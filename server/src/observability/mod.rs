//! Observability: structured logging.
//!
//! # Quick start
//!
//! ```rust,no_run
//! # use hb_server::observability;
//! // In main(), before any logging:
//! let log = observability::init("info").expect("tracing init");
//! // Later, after a config reload:
//! log.set_level("debug").expect("reload");
//! ```

pub mod logging;

pub use logging::{init, normalize_level, LogHandle, LoggingError};
