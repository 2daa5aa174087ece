//! Identity resolution for record subjects.
//!
//! Resolves an opaque subject identifier to its canonical DID via one of
//! two strategies, selected by prefix:
//!
//! - `did:plc:` — fetch the DID document from the PLC directory at a URL
//!   derived from the identifier.
//! - `did:web:` — split the identifier into exactly three colon-delimited
//!   parts, treat the third as a domain, and fetch
//!   `https://{domain}/.well-known/did.json`. Redirects are not followed:
//!   a redirect response is treated as the final answer, so a lookup can
//!   never be bounced to an attacker-controlled host.
//!
//! Every call is bounded by [`RESOLVE_TIMEOUT`]. Any other prefix,
//! malformed split, timeout, non-2xx status, or undecodable body resolves
//! to `None` — resolution failure degrades the subject to null, it never
//! fails the message.

use std::time::Duration;

use metrics::counter;
use serde::Deserialize;

use meowstream_core::is_valid_domain;

/// Timeout applied independently to each resolution call.
pub const RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default PLC directory service.
pub const DEFAULT_PLC_DIRECTORY: &str = "https://plc.directory";

/// Minimal DID document shape: only the canonical `id` matters.
#[derive(Debug, Deserialize)]
struct DidDocument {
    id: String,
}

/// Resolution seam used by the pipeline.
///
/// The production implementation is [`DidResolver`]; tests substitute a
/// stub so planning logic can be exercised without the network.
pub trait Resolve {
    /// Resolve a subject identifier to its canonical DID, or `None`.
    fn resolve(&self, subject: &str) -> impl Future<Output = Option<String>> + Send;
}

/// HTTP-backed DID resolver.
pub struct DidResolver {
    /// Client for PLC directory lookups.
    plc_client: reqwest::Client,
    /// Client for did:web lookups; redirects disabled.
    web_client: reqwest::Client,
    plc_directory: String,
}

impl DidResolver {
    /// Create a resolver against the given PLC directory base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP clients cannot be built.
    pub fn new(plc_directory: impl Into<String>) -> reqwest::Result<Self> {
        let plc_client = reqwest::Client::builder()
            .timeout(RESOLVE_TIMEOUT)
            .build()?;
        let web_client = reqwest::Client::builder()
            .timeout(RESOLVE_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            plc_client,
            web_client,
            plc_directory: plc_directory.into(),
        })
    }

    async fn resolve_plc(&self, did: &str) -> Option<String> {
        let url = plc_request_url(&self.plc_directory, did);
        let resp = match self.plc_client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(did, "PLC lookup failed: {}", e);
                return None;
            }
        };
        if !resp.status().is_success() {
            tracing::debug!(did, status = %resp.status(), "PLC lookup non-success");
            return None;
        }
        match resp.json::<DidDocument>().await {
            Ok(doc) => Some(doc.id),
            Err(e) => {
                tracing::debug!(did, "PLC document undecodable: {}", e);
                None
            }
        }
    }

    async fn resolve_web(&self, did: &str) -> Option<String> {
        let domain = web_did_domain(did)?;
        let url = format!("https://{domain}/.well-known/did.json");
        let resp = match self.web_client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(did, "did:web lookup failed: {}", e);
                return None;
            }
        };
        // Redirects are disabled, so 3xx lands here and is rejected.
        if !resp.status().is_success() {
            tracing::debug!(did, status = %resp.status(), "did:web lookup non-success");
            return None;
        }
        match resp.json::<DidDocument>().await {
            Ok(doc) => Some(doc.id),
            Err(e) => {
                tracing::debug!(did, "did:web document undecodable: {}", e);
                None
            }
        }
    }
}

impl Resolve for DidResolver {
    async fn resolve(&self, subject: &str) -> Option<String> {
        let (method, result) = if subject.starts_with("did:plc:") {
            ("plc", self.resolve_plc(subject).await)
        } else if subject.starts_with("did:web:") {
            ("web", self.resolve_web(subject).await)
        } else {
            ("other", None)
        };

        let outcome = if result.is_some() { "resolved" } else { "failed" };
        counter!("resolver_lookups_total", "method" => method, "outcome" => outcome).increment(1);

        result
    }
}

/// Build the PLC directory request URL for a DID.
fn plc_request_url(base: &str, did: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), did)
}

/// Extract the lookup domain from a `did:web` identifier.
///
/// The identifier must split into exactly three colon-delimited parts, and
/// the third must be a bare hostname.
fn web_did_domain(did: &str) -> Option<&str> {
    let parts: Vec<&str> = did.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let domain = parts[2];
    is_valid_domain(domain).then_some(domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plc_request_url() {
        assert_eq!(
            plc_request_url("https://plc.directory", "did:plc:abc"),
            "https://plc.directory/did:plc:abc"
        );
        // Trailing slash on the base must not double up
        assert_eq!(
            plc_request_url("https://plc.directory/", "did:plc:abc"),
            "https://plc.directory/did:plc:abc"
        );
    }

    #[test]
    fn test_web_did_domain_exactly_three_parts() {
        assert_eq!(web_did_domain("did:web:example.com"), Some("example.com"));
    }

    #[test]
    fn test_web_did_domain_too_few_parts() {
        assert_eq!(web_did_domain("did:web"), None);
        assert_eq!(web_did_domain("did"), None);
    }

    #[test]
    fn test_web_did_domain_too_many_parts() {
        // Path-style did:web identifiers are out of scope
        assert_eq!(web_did_domain("did:web:example.com:u:alice"), None);
    }

    #[test]
    fn test_web_did_domain_rejects_port_and_garbage() {
        assert_eq!(web_did_domain("did:web:example.com%3A8080"), None);
        assert_eq!(web_did_domain("did:web:"), None);
        assert_eq!(web_did_domain("did:web:exa mple.com"), None);
    }

    #[test]
    fn test_did_document_parse() {
        let doc: DidDocument =
            serde_json::from_str(r#"{"id": "did:web:example.com", "alsoKnownAs": []}"#).unwrap();
        assert_eq!(doc.id, "did:web:example.com");
    }

    #[test]
    fn test_did_document_missing_id_is_error() {
        assert!(serde_json::from_str::<DidDocument>(r#"{"service": []}"#).is_err());
    }

    #[tokio::test]
    async fn test_unknown_prefix_resolves_to_none_without_network() {
        let resolver = DidResolver::new(DEFAULT_PLC_DIRECTORY).unwrap();
        assert_eq!(resolver.resolve("at://bafyrei").await, None);
        assert_eq!(resolver.resolve("did:key:z6Mk").await, None);
        assert_eq!(resolver.resolve("").await, None);
    }

    #[tokio::test]
    async fn test_malformed_web_did_resolves_to_none_without_network() {
        let resolver = DidResolver::new(DEFAULT_PLC_DIRECTORY).unwrap();
        assert_eq!(resolver.resolve("did:web:").await, None);
        assert_eq!(resolver.resolve("did:web:a:b:c").await, None);
    }
}
