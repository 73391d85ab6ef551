//! Signing error types.

use thiserror::Error;

/// Errors produced while signing a verification challenge.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SigningError {
    /// The secret was empty, so no seed can be derived from it.
    #[error("Secret must not be empty")]
    InvalidSecret,

    /// One of the inputs was not valid UTF-8.
    #[error("Invalid UTF-8 in {0}")]
    Encoding(&'static str),
}

/// Result alias for signing operations.
pub type Result<T> = std::result::Result<T, SigningError>;
