//! Stream frame decoding.
//!
//! Decodes one Jetstream text frame into an [`Envelope`] and, separately,
//! the embedded record payload into a [`MeowRecord`].
//!
//! Decoding is forward-compatible: unknown fields at any level are ignored,
//! and the nested record is captured as raw JSON so envelope-level fields
//! (actor, key, operation) stay usable even when the record itself fails to
//! parse. A `delete` carries no payload and must never depend on record
//! decoding.
//!
//! A decode failure is reported to the caller, which logs and skips the
//! frame; it is never fatal to the loop.

use crate::Result;
use serde::Deserialize;
use serde_json::value::RawValue;

/// Event kind for record commits. Everything else is skipped.
pub const KIND_COMMIT: &str = "commit";

/// One event from the feed.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    /// Stable identifier of the publishing actor.
    pub did: String,

    /// Producer timestamp in microseconds. Stored with the row and used as
    /// the resumption cursor; not used for conflict resolution.
    #[serde(default)]
    pub time_us: i64,

    /// Event kind discriminator; only [`KIND_COMMIT`] events are processed.
    pub kind: String,

    /// Commit details, present for commit events.
    pub commit: Option<Commit>,
}

/// The commit sub-structure of an envelope.
#[derive(Debug, Deserialize)]
pub struct Commit {
    /// Repo revision at this commit.
    #[serde(default)]
    pub rev: String,

    /// One of `create`, `update`, `delete` (parsed by [`Operation::parse`]).
    pub operation: String,

    /// Record collection this commit belongs to.
    pub collection: String,

    /// Record key, unique per actor and collection.
    pub rkey: String,

    /// Content hash of the record.
    #[serde(default)]
    pub cid: String,

    /// Raw record payload. Present for create/update, absent for delete.
    /// Decoded lazily via [`decode_record`].
    pub record: Option<Box<RawValue>>,
}

/// Decoded record payload.
#[derive(Debug, Deserialize)]
pub struct MeowRecord {
    /// Record schema tag.
    #[serde(rename = "$type", default)]
    pub record_type: String,

    /// Free-text emotion, sanitized before persistence.
    pub emotion: Option<String>,

    /// Subject identifier, resolved to canonical form before persistence.
    pub subject: Option<String>,
}

/// Commit operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    /// Parse an operation string. Unknown values yield `None`; the caller
    /// logs them and skips the message.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// Decode one raw frame into an [`Envelope`].
pub fn decode_envelope(frame: &str) -> Result<Envelope> {
    Ok(serde_json::from_str(frame)?)
}

/// Decode the embedded record payload.
///
/// Kept separate from envelope decoding so a malformed record does not
/// invalidate the envelope around it.
pub fn decode_record(raw: &RawValue) -> Result<MeowRecord> {
    Ok(serde_json::from_str(raw.get())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CREATE_FRAME: &str = r#"{
        "did": "did:plc:abc",
        "time_us": 1725911162329308,
        "kind": "commit",
        "commit": {
            "rev": "3l3f6nzl3cv2s",
            "operation": "create",
            "collection": "cat.kasey.moe.meow",
            "rkey": "abcdefghijklm",
            "record": {"$type": "cat.kasey.moe.meow", "emotion": "Happy!!!", "subject": "did:web:example.com"},
            "cid": "bafyreia"
        }
    }"#;

    #[test]
    fn test_decode_create_envelope() {
        let env = decode_envelope(CREATE_FRAME).unwrap();
        assert_eq!(env.did, "did:plc:abc");
        assert_eq!(env.time_us, 1725911162329308);
        assert_eq!(env.kind, KIND_COMMIT);
        let commit = env.commit.unwrap();
        assert_eq!(commit.operation, "create");
        assert_eq!(commit.rkey, "abcdefghijklm");
        assert!(commit.record.is_some());
    }

    #[test]
    fn test_decode_record_payload() {
        let env = decode_envelope(CREATE_FRAME).unwrap();
        let raw = env.commit.unwrap().record.unwrap();
        let record = decode_record(&raw).unwrap();
        assert_eq!(record.record_type, "cat.kasey.moe.meow");
        assert_eq!(record.emotion.as_deref(), Some("Happy!!!"));
        assert_eq!(record.subject.as_deref(), Some("did:web:example.com"));
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let frame = r#"{
            "did": "did:plc:abc",
            "time_us": 1,
            "kind": "commit",
            "future_field": {"nested": true},
            "commit": {
                "operation": "delete",
                "collection": "cat.kasey.moe.meow",
                "rkey": "k1",
                "extra": 42
            }
        }"#;
        let env = decode_envelope(frame).unwrap();
        assert_eq!(env.commit.unwrap().operation, "delete");
    }

    #[test]
    fn test_delete_without_record_decodes() {
        let frame = r#"{
            "did": "did:plc:abc",
            "time_us": 2,
            "kind": "commit",
            "commit": {
                "operation": "delete",
                "collection": "cat.kasey.moe.meow",
                "rkey": "gone"
            }
        }"#;
        let commit = decode_envelope(frame).unwrap().commit.unwrap();
        assert!(commit.record.is_none());
        assert_eq!(commit.cid, "");
    }

    #[test]
    fn test_envelope_survives_malformed_record() {
        // The record payload is valid JSON but not a valid record shape.
        // Envelope fields must still be available.
        let frame = r#"{
            "did": "did:plc:abc",
            "time_us": 3,
            "kind": "commit",
            "commit": {
                "operation": "create",
                "collection": "cat.kasey.moe.meow",
                "rkey": "k2",
                "record": {"emotion": 17}
            }
        }"#;
        let env = decode_envelope(frame).unwrap();
        let commit = env.commit.unwrap();
        assert_eq!(commit.rkey, "k2");
        assert!(decode_record(commit.record.as_deref().unwrap()).is_err());
    }

    #[test]
    fn test_non_commit_kind_has_no_commit() {
        let frame = r#"{"did": "did:plc:abc", "time_us": 4, "kind": "identity"}"#;
        let env = decode_envelope(frame).unwrap();
        assert_ne!(env.kind, KIND_COMMIT);
        assert!(env.commit.is_none());
    }

    #[test]
    fn test_malformed_frame_is_error() {
        assert!(decode_envelope("not json").is_err());
        assert!(decode_envelope("{\"kind\": 12}").is_err());
    }

    #[test]
    fn test_operation_parse() {
        assert_eq!(Operation::parse("create"), Some(Operation::Create));
        assert_eq!(Operation::parse("update"), Some(Operation::Update));
        assert_eq!(Operation::parse("delete"), Some(Operation::Delete));
        assert_eq!(Operation::parse("truncate"), None);
        assert_eq!(Operation::parse(""), None);
    }
}
