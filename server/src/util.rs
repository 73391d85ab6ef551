//! Shared utility functions

/// Keys this short are logged by length only.
const FINGERPRINT_MIN_CHARS: usize = 8;

/// Whether `key` can route traffic: at least one non-whitespace character.
pub fn is_usable_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Redacted rendering of a bot secret for log fields.
///
/// Long keys keep their first four characters plus the length so log lines
/// can be correlated. Keys of eight characters or fewer are rendered by
/// length alone.
///
/// # Examples
///
/// ```
/// use hb_server::util::key_fingerprint;
///
/// assert_eq!(key_fingerprint("abcdefghij"), "abcd…(10)");
/// assert_eq!(key_fingerprint("ab"), "…(2)");
/// ```
pub fn key_fingerprint(key: &str) -> String {
    let len = key.chars().count();
    if len <= FINGERPRINT_MIN_CHARS {
        return format!("…({len})");
    }
    let prefix: String = key.chars().take(4).collect();
    format!("{prefix}…({len})")
}
