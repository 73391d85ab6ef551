//! `HookBridge` Challenge Signing
//!
//! Proves possession of a bot secret during provider-initiated verification
//! handshakes. The secret is stretched into an Ed25519 seed and used to sign
//! `event_ts ++ plain_token`.
//!
//! - **Signing**: [`sign_challenge`] produces the `{plain_token, signature}` reply
//! - **Verification**: [`verify_challenge`] checks a reply against the same secret

pub mod error;
pub mod signing;

pub use error::{Result, SigningError};
pub use signing::{
    normalize_seed, sign_challenge, sign_challenge_bytes, verify_challenge,
    ChallengeResponse, SEED_LEN,
};
