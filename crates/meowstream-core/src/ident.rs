//! Identifier syntax validation.
//!
//! Syntax checks for the external identifiers that flow into store
//! predicates: actor DIDs, record keys, and `did:web` domains. Both the
//! ingester and the query API validate inputs with these checks before any
//! lookup — an identifier that fails here never reaches the store, even as
//! a bound parameter.
//!
//! The rules follow the AT Protocol identifier grammar, trimmed to what the
//! pipeline actually accepts.

/// Maximum length of a DID, per the AT Protocol identifier spec.
const MAX_DID_LEN: usize = 2048;

/// Maximum length of a record key.
const MAX_RKEY_LEN: usize = 512;

/// Returns true if `s` is a syntactically plausible DID.
///
/// Requires the `did:` scheme, a lowercase ASCII method segment, and a
/// non-empty method-specific identifier limited to the characters the DID
/// grammar allows.
pub fn is_valid_did(s: &str) -> bool {
    if s.len() > MAX_DID_LEN {
        return false;
    }
    let Some(rest) = s.strip_prefix("did:") else {
        return false;
    };
    let Some((method, id)) = rest.split_once(':') else {
        return false;
    };
    if method.is_empty() || !method.bytes().all(|b| b.is_ascii_lowercase()) {
        return false;
    }
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b':' | b'%' | b'-'))
}

/// Returns true if `s` is a syntactically valid record key.
///
/// Record keys are 1–512 characters from the restricted set
/// `[A-Za-z0-9._:~-]`.
pub fn is_valid_rkey(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_RKEY_LEN
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b':' | b'~' | b'-'))
}

/// Returns true if `s` is a plausible hostname for a `did:web` lookup.
///
/// Accepts dot-separated labels of ASCII alphanumerics and hyphens. No
/// ports, no paths, no userinfo — anything that could redirect the
/// well-known fetch somewhere unexpected is rejected.
pub fn is_valid_domain(s: &str) -> bool {
    if s.is_empty() || s.len() > 253 {
        return false;
    }
    s.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
            && !label.starts_with('-')
            && !label.ends_with('-')
    })
}
