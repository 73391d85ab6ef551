//! Ed25519 Challenge Signing
//!
//! Signs verification challenges with a seed derived from the bot secret.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SigningError};

/// Length of an Ed25519 private key seed in bytes.
pub const SEED_LEN: usize = 32;

/// Reply to a verification challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeResponse {
    /// Echo of the challenge token.
    pub plain_token: String,
    /// Lowercase hex Ed25519 signature over `event_ts ++ plain_token`.
    pub signature: String,
}

/// Derive the 32-byte Ed25519 seed from a secret.
///
/// Short secrets are repeated until they fill the seed; longer secrets
/// contribute only their first 32 bytes.
pub fn normalize_seed(secret: &[u8]) -> Result<[u8; SEED_LEN]> {
    if secret.is_empty() {
        return Err(SigningError::InvalidSecret);
    }

    let mut seed = [0u8; SEED_LEN];
    for (slot, byte) in seed.iter_mut().zip(secret.iter().cycle()) {
        *slot = *byte;
    }
    Ok(seed)
}

fn signing_key(secret: &str) -> Result<SigningKey> {
    let seed = normalize_seed(secret.as_bytes())?;
    Ok(SigningKey::from_bytes(&seed))
}

fn challenge_message(event_ts: &str, plain_token: &str) -> Vec<u8> {
    let mut message = Vec::with_capacity(event_ts.len() + plain_token.len());
    message.extend_from_slice(event_ts.as_bytes());
    message.extend_from_slice(plain_token.as_bytes());
    message
}

/// Sign a verification challenge.
///
/// Deterministic: identical inputs always produce the identical signature.
pub fn sign_challenge(secret: &str, event_ts: &str, plain_token: &str) -> Result<ChallengeResponse> {
    let key = signing_key(secret)?;
    let signature = key.sign(&challenge_message(event_ts, plain_token));

    Ok(ChallengeResponse {
        plain_token: plain_token.to_owned(),
        signature: hex::encode(signature.to_bytes()),
    })
}

/// Sign a verification challenge from raw bytes, rejecting non-UTF-8 input.
pub fn sign_challenge_bytes(
    secret: &[u8],
    event_ts: &[u8],
    plain_token: &[u8],
) -> Result<ChallengeResponse> {
    let secret = std::str::from_utf8(secret).map_err(|_| SigningError::Encoding("secret"))?;
    let event_ts = std::str::from_utf8(event_ts).map_err(|_| SigningError::Encoding("event_ts"))?;
    let plain_token =
        std::str::from_utf8(plain_token).map_err(|_| SigningError::Encoding("plain_token"))?;
    sign_challenge(secret, event_ts, plain_token)
}

/// Check a hex signature produced by [`sign_challenge`].
///
/// Returns `false` for malformed hex, wrong lengths and bad signatures alike.
pub fn verify_challenge(secret: &str, event_ts: &str, plain_token: &str, signature_hex: &str) -> bool {
    let Ok(key) = signing_key(secret) else {
        return false;
    };
    let Ok(bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&bytes) else {
        return false;
    };

    key.verifying_key()
        .verify(&challenge_message(event_ts, plain_token), &signature)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_secret_is_repeated_to_seed_length() {
        let seed = normalize_seed(b"abc").unwrap();
        assert_eq!(seed.len(), SEED_LEN);
        assert_eq!(&seed[..6], b"abcabc");
        assert_eq!(&seed[30..], b"ca");
    }

    #[test]
    fn long_secret_keeps_first_32_bytes() {
        let secret = b"0123456789abcdefghijklmnopqrstuvwxyz";
        let seed = normalize_seed(secret).unwrap();
        assert_eq!(&seed[..], &secret[..SEED_LEN]);
    }

    #[test]
    fn exact_length_secret_is_unchanged() {
        let secret = [7u8; SEED_LEN];
        assert_eq!(normalize_seed(&secret).unwrap(), secret);
    }

    #[test]
    fn normalization_is_total_for_every_length() {
        for len in 1..=80 {
            let secret: Vec<u8> = (0..len).map(|i| b'a' + (i % 26) as u8).collect();
            let seed = normalize_seed(&secret).unwrap();
            assert_eq!(seed.len(), SEED_LEN);
            assert_eq!(seed[0], secret[0]);
        }
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert_eq!(normalize_seed(b""), Err(SigningError::InvalidSecret));
        assert_eq!(
            sign_challenge("", "123", "xyz").unwrap_err(),
            SigningError::InvalidSecret
        );
    }

    #[test]
    fn signature_is_deterministic_hex() {
        let first = sign_challenge("abc", "123", "xyz").unwrap();
        let second = sign_challenge("abc", "123", "xyz").unwrap();

        assert_eq!(first, second);
        assert_eq!(first.plain_token, "xyz");
        assert_eq!(first.signature.len(), 128);
        assert!(first
            .signature
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn known_answer_vectors() {
        assert_eq!(
            sign_challenge("abc", "123", "xyz").unwrap().signature,
            "6a5a509f3648771d6824cd2947f52df422dab1c9405ef5b276b277f6d57fface\
             1f7f2039dad8198da57e30ea89adda0a131be955cd1d4d443e22e78ce3e2fc09"
        );
        // Provider documentation example.
        assert_eq!(
            sign_challenge("DG5g3B4j9X2KOErG", "1725442341", "Arq0D5A61EgUu4OxUvOp")
                .unwrap()
                .signature,
            "87befc99c42c651b3aac0278e71ada338433ae26fcb24307bdc5ad38c1adc2d0\
             1bcfcadc0842edac85e85205028a1132afe09280305f13aa6909ffc2d652c706"
        );
    }

    #[test]
    fn signature_depends_on_every_input() {
        let base = sign_challenge("abc", "123", "xyz").unwrap().signature;
        assert_ne!(base, sign_challenge("abd", "123", "xyz").unwrap().signature);
        assert_ne!(base, sign_challenge("abc", "124", "xyz").unwrap().signature);
        assert_ne!(base, sign_challenge("abc", "123", "xyy").unwrap().signature);
    }

    #[test]
    fn secrets_that_normalize_alike_sign_alike() {
        // "ab" repeated and "abab" repeated yield the same seed.
        let a = sign_challenge("ab", "1", "t").unwrap();
        let b = sign_challenge("abab", "1", "t").unwrap();
        assert_eq!(a.signature, b.signature);
    }

    #[test]
    fn message_has_no_separator() {
        let a = sign_challenge("abc", "12", "3xyz").unwrap();
        let b = sign_challenge("abc", "123", "xyz").unwrap();
        assert_eq!(a.signature, b.signature);
    }

    #[test]
    fn verify_accepts_own_signature() {
        let reply = sign_challenge("bot-secret", "1700000000", "token").unwrap();
        assert!(verify_challenge(
            "bot-secret",
            "1700000000",
            "token",
            &reply.signature
        ));
        assert!(!verify_challenge(
            "other-secret",
            "1700000000",
            "token",
            &reply.signature
        ));
        assert!(!verify_challenge("bot-secret", "1700000001", "token", &reply.signature));
        assert!(!verify_challenge("bot-secret", "1700000000", "token", "zz"));
        assert!(!verify_challenge("bot-secret", "1700000000", "token", "abcd"));
    }

    #[test]
    fn byte_entry_point_rejects_invalid_utf8() {
        assert_eq!(
            sign_challenge_bytes(b"abc", &[0xff, 0xfe], b"xyz").unwrap_err(),
            SigningError::Encoding("event_ts")
        );
        assert_eq!(
            sign_challenge_bytes(b"abc", b"123", b"xyz").unwrap(),
            sign_challenge("abc", "123", "xyz").unwrap()
        );
    }

    #[test]
    fn response_serializes_with_wire_field_names() {
        let reply = sign_challenge("abc", "123", "xyz").unwrap();
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["plain_token"], "xyz");
        assert_eq!(json["signature"], reply.signature);
    }
}
