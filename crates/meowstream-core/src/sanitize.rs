//! Record content sanitization.
//!
//! This module implements the content policy for the free-text `emotion`
//! field of incoming records:
//!
//! - Values longer than [`MAX_EMOTION_CHARS`] characters are truncated
//!   (truncation is logged, never an error).
//! - Values containing a blocked character or term cause the whole message
//!   to be dropped by the caller, not just the field.
//! - Accepted values are normalized for display: lowercased, with control
//!   characters stripped.
//!
//! The blocklist is a content policy, not the injection defense. Untrusted
//! text never reaches a query string unbound — every store predicate goes
//! through the client's bound parameters.

use crate::{Error, MAX_EMOTION_CHARS, Result};

/// Characters that cause the whole message to be rejected.
const BLOCKED_CHARS: [char; 4] = [';', '\'', '"', '`'];

/// Terms that cause the whole message to be rejected (case-insensitive).
const BLOCKED_TERMS: [&str; 5] = ["create", "insert", "update", "delete", "drop"];

/// Sanitize an emotion value for persistence.
///
/// Applies, in order:
/// 1. Truncation to [`MAX_EMOTION_CHARS`] characters (char boundary safe)
/// 2. Rejection on blocked characters or terms
/// 3. Display normalization (lowercase, control characters removed)
///
/// # Errors
///
/// Returns [`Error::BlockedCharacter`] or [`Error::BlockedTerm`] when the
/// truncated value matches the blocklist. The caller must drop the whole
/// message in that case.
pub fn sanitize_emotion(raw: &str) -> Result<String> {
    let truncated: String = raw.chars().take(MAX_EMOTION_CHARS).collect();
    if truncated.len() < raw.len() {
        tracing::debug!(
            original_chars = raw.chars().count(),
            "emotion truncated to {} characters",
            MAX_EMOTION_CHARS
        );
    }

    if let Some(ch) = truncated.chars().find(|c| BLOCKED_CHARS.contains(c)) {
        return Err(Error::BlockedCharacter { ch });
    }

    let lowered = truncated.to_lowercase();
    if let Some(term) = BLOCKED_TERMS.iter().copied().find(|t| lowered.contains(t)) {
        return Err(Error::BlockedTerm { term });
    }

    Ok(lowered.chars().filter(|c| !c.is_control()).collect())
}
