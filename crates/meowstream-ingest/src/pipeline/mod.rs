//! Per-message ingestion pipeline.
//!
//! Each frame flows through a fixed sequence:
//!
//! ```text
//! [Frame] → [decode] → [plan_commit] → [MeowStore]
//!                          │
//!                          ├─ sanitize emotion (reject drops message)
//!                          └─ resolve subject  (failure degrades to null)
//! ```
//!
//! Planning is separated from execution: [`plan_commit`] turns an envelope
//! into an [`Outcome`] without touching the store, and [`Pipeline`] applies
//! that outcome. Nothing a single message does — decode failure, content
//! rejection, resolver timeout, write error — escapes its own handling;
//! the loop always continues with the next frame.

mod clickhouse;

pub use clickhouse::{MeowRow, MeowStore, StoreConfig};

use std::sync::atomic::{AtomicUsize, Ordering};

use metrics::counter;

use crate::decode::{Envelope, KIND_COMMIT, Operation, decode_envelope, decode_record};
use crate::resolver::Resolve;
use meowstream_core::sanitize_emotion;

/// Planned store mutation for one message.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Insert-or-replace the row by record key.
    Upsert(MeowRow),
    /// Remove the row by record key.
    Delete {
        /// Key of the row to remove.
        rkey: String,
    },
    /// Nothing to persist for this message.
    Skip(SkipReason),
}

/// Why a message produced no mutation.
#[derive(Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Event kind was not a commit, or the commit block was missing.
    NotCommit,
    /// Commit targets a collection this pipeline does not process.
    OtherCollection,
    /// Create/update without a record payload.
    MissingRecord,
    /// Record payload present but undecodable.
    RecordDecode,
    /// Validation rejected the content; the whole message is dropped.
    Rejected(meowstream_core::Error),
    /// Operation value was not create/update/delete.
    UnknownOperation,
}

impl SkipReason {
    /// Short label for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotCommit => "not_commit",
            Self::OtherCollection => "other_collection",
            Self::MissingRecord => "missing_record",
            Self::RecordDecode => "record_decode",
            Self::Rejected(_) => "rejected",
            Self::UnknownOperation => "unknown_operation",
        }
    }
}

/// Plan the store mutation for one decoded envelope.
///
/// Pure apart from the resolver call: no store access, no logging beyond
/// what sanitization emits. `delete` never needs the record payload, so a
/// malformed record cannot block a deletion.
pub async fn plan_commit<R: Resolve>(
    envelope: &Envelope,
    collection: &str,
    resolver: &R,
) -> Outcome {
    if envelope.kind != KIND_COMMIT {
        return Outcome::Skip(SkipReason::NotCommit);
    }
    let Some(commit) = &envelope.commit else {
        return Outcome::Skip(SkipReason::NotCommit);
    };
    if commit.collection != collection {
        return Outcome::Skip(SkipReason::OtherCollection);
    }

    match Operation::parse(&commit.operation) {
        None => Outcome::Skip(SkipReason::UnknownOperation),
        Some(Operation::Delete) => Outcome::Delete {
            rkey: commit.rkey.clone(),
        },
        Some(Operation::Create | Operation::Update) => {
            let Some(raw) = commit.record.as_deref() else {
                return Outcome::Skip(SkipReason::MissingRecord);
            };
            let record = match decode_record(raw) {
                Ok(r) => r,
                Err(_) => return Outcome::Skip(SkipReason::RecordDecode),
            };

            let emotion = match record.emotion.as_deref().map(sanitize_emotion).transpose() {
                Ok(e) => e,
                Err(reject) => return Outcome::Skip(SkipReason::Rejected(reject)),
            };

            // Unresolved subjects are stored as null, never as the raw string.
            let subject = match record.subject.as_deref() {
                Some(s) => resolver.resolve(s).await,
                None => None,
            };

            Outcome::Upsert(MeowRow {
                rkey: commit.rkey.clone(),
                time_us: envelope.time_us,
                cid: commit.cid.clone(),
                did: envelope.did.clone(),
                emotion,
                subject,
            })
        }
    }
}

/// Counters for one ingestion run.
#[derive(Debug, Default)]
pub struct PipelineStats {
    frames: AtomicUsize,
    decode_errors: AtomicUsize,
    upserted: AtomicUsize,
    deleted: AtomicUsize,
    dropped: AtomicUsize,
    skipped: AtomicUsize,
}

/// Snapshot of [`PipelineStats`] for the shutdown summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsSnapshot {
    pub frames: usize,
    pub decode_errors: usize,
    pub upserted: usize,
    pub deleted: usize,
    pub dropped: usize,
    pub skipped: usize,
}

impl PipelineStats {
    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            upserted: self.upserted.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// The per-message pipeline: decode → validate → resolve → persist.
pub struct Pipeline<R> {
    resolver: R,
    store: MeowStore,
    collection: String,
    stats: PipelineStats,
}

impl<R: Resolve> Pipeline<R> {
    /// Build a pipeline over the given resolver and store, processing only
    /// commits for `collection`.
    pub fn new(resolver: R, store: MeowStore, collection: impl Into<String>) -> Self {
        Self {
            resolver,
            store,
            collection: collection.into(),
            stats: PipelineStats::default(),
        }
    }

    /// Process one raw frame end to end.
    ///
    /// Returns the envelope's `time_us` for cursor acknowledgement when the
    /// frame decoded, `None` otherwise. Per-message failures are logged and
    /// counted here; they never propagate.
    pub async fn handle_frame(&self, frame: String) -> Option<i64> {
        self.stats.frames.fetch_add(1, Ordering::Relaxed);
        counter!("ingest_frames_total").increment(1);

        let envelope = match decode_envelope(&frame) {
            Ok(e) => e,
            Err(e) => {
                self.stats.decode_errors.fetch_add(1, Ordering::Relaxed);
                counter!("ingest_decode_errors_total").increment(1);
                tracing::debug!("Frame decode failed: {}", e);
                return None;
            }
        };
        let cursor = envelope.time_us;

        match plan_commit(&envelope, &self.collection, &self.resolver).await {
            Outcome::Upsert(row) => match self.store.upsert(&row).await {
                Ok(()) => {
                    self.stats.upserted.fetch_add(1, Ordering::Relaxed);
                    counter!("ingest_rows_upserted_total").increment(1);
                    tracing::debug!(rkey = %row.rkey, did = %row.did, "Row upserted");
                }
                Err(e) => {
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    counter!("ingest_messages_dropped_total", "reason" => "upsert_failed")
                        .increment(1);
                    tracing::error!(rkey = %row.rkey, "Upsert failed, message dropped: {}", e);
                }
            },
            Outcome::Delete { rkey } => match self.store.delete(&rkey).await {
                Ok(()) => {
                    self.stats.deleted.fetch_add(1, Ordering::Relaxed);
                    counter!("ingest_rows_deleted_total").increment(1);
                    tracing::debug!(rkey = %rkey, "Row deleted");
                }
                Err(e) => {
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    counter!("ingest_messages_dropped_total", "reason" => "delete_failed")
                        .increment(1);
                    tracing::error!(rkey = %rkey, "Delete failed, message dropped: {}", e);
                }
            },
            Outcome::Skip(reason) => {
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                counter!("ingest_messages_dropped_total", "reason" => reason.label())
                    .increment(1);
                match &reason {
                    SkipReason::Rejected(err) => {
                        tracing::info!(did = %envelope.did, "Message rejected: {}", err);
                    }
                    SkipReason::UnknownOperation => {
                        if let Some(commit) = &envelope.commit {
                            tracing::warn!(operation = %commit.operation, "Unknown operation");
                        }
                    }
                    _ => tracing::trace!(reason = reason.label(), "Message skipped"),
                }
            }
        }

        Some(cursor)
    }

    /// Snapshot of the run counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Resolver stub returning a fixed canonical identifier.
    struct StubResolver(Option<String>);

    impl Resolve for StubResolver {
        async fn resolve(&self, _subject: &str) -> Option<String> {
            self.0.clone()
        }
    }

    /// Resolver stub that fails the test when called at all.
    struct UnreachableResolver;

    impl Resolve for UnreachableResolver {
        async fn resolve(&self, subject: &str) -> Option<String> {
            panic!("resolver must not be called for subject {subject:?}");
        }
    }

    const COLLECTION: &str = "cat.kasey.moe.meow";

    fn envelope(frame: &str) -> Envelope {
        decode_envelope(frame).unwrap()
    }

    fn create_frame(emotion: &str) -> String {
        format!(
            r#"{{
                "did": "did:plc:abc",
                "time_us": 1725911162329308,
                "kind": "commit",
                "commit": {{
                    "operation": "create",
                    "collection": "{COLLECTION}",
                    "rkey": "abcdefghijklm",
                    "cid": "bafyreia",
                    "record": {{"$type": "x", "emotion": "{emotion}", "subject": "did:web:example.com"}}
                }}
            }}"#
        )
    }

    #[tokio::test]
    async fn test_create_with_resolved_subject() {
        let env = envelope(&create_frame("Happy!!!"));
        let resolver = StubResolver(Some("did:web:example.com".to_string()));

        let outcome = plan_commit(&env, COLLECTION, &resolver).await;

        assert_eq!(
            outcome,
            Outcome::Upsert(MeowRow {
                rkey: "abcdefghijklm".to_string(),
                time_us: 1725911162329308,
                cid: "bafyreia".to_string(),
                did: "did:plc:abc".to_string(),
                emotion: Some("happy!!!".to_string()),
                subject: Some("did:web:example.com".to_string()),
            })
        );
    }

    #[tokio::test]
    async fn test_blocked_emotion_drops_whole_message() {
        let env = envelope(&create_frame("drop table meows"));
        let resolver = StubResolver(Some("did:web:example.com".to_string()));

        let outcome = plan_commit(&env, COLLECTION, &resolver).await;

        assert!(matches!(
            outcome,
            Outcome::Skip(SkipReason::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_resolution_failure_degrades_subject_to_null() {
        let env = envelope(&create_frame("purring"));
        let resolver = StubResolver(None);

        match plan_commit(&env, COLLECTION, &resolver).await {
            Outcome::Upsert(row) => {
                assert_eq!(row.subject, None);
                assert_eq!(row.emotion.as_deref(), Some("purring"));
                assert_eq!(row.rkey, "abcdefghijklm");
            }
            other => panic!("expected upsert, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_resolver_not_called_without_subject() {
        let frame = format!(
            r#"{{
                "did": "did:plc:abc",
                "time_us": 5,
                "kind": "commit",
                "commit": {{
                    "operation": "create",
                    "collection": "{COLLECTION}",
                    "rkey": "k",
                    "record": {{"$type": "x", "emotion": "sleepy"}}
                }}
            }}"#
        );
        let outcome = plan_commit(&envelope(&frame), COLLECTION, &UnreachableResolver).await;
        match outcome {
            Outcome::Upsert(row) => assert_eq!(row.subject, None),
            other => panic!("expected upsert, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete_needs_no_record() {
        let frame = format!(
            r#"{{
                "did": "did:plc:abc",
                "time_us": 6,
                "kind": "commit",
                "commit": {{
                    "operation": "delete",
                    "collection": "{COLLECTION}",
                    "rkey": "gone"
                }}
            }}"#
        );
        let outcome = plan_commit(&envelope(&frame), COLLECTION, &UnreachableResolver).await;
        assert_eq!(
            outcome,
            Outcome::Delete {
                rkey: "gone".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_delete_proceeds_despite_malformed_record() {
        // A delete with a junk payload attached must still plan a delete.
        let frame = format!(
            r#"{{
                "did": "did:plc:abc",
                "time_us": 7,
                "kind": "commit",
                "commit": {{
                    "operation": "delete",
                    "collection": "{COLLECTION}",
                    "rkey": "gone",
                    "record": {{"emotion": 17}}
                }}
            }}"#
        );
        let outcome = plan_commit(&envelope(&frame), COLLECTION, &UnreachableResolver).await;
        assert!(matches!(outcome, Outcome::Delete { .. }));
    }

    #[tokio::test]
    async fn test_create_with_malformed_record_skipped() {
        let frame = format!(
            r#"{{
                "did": "did:plc:abc",
                "time_us": 8,
                "kind": "commit",
                "commit": {{
                    "operation": "create",
                    "collection": "{COLLECTION}",
                    "rkey": "k",
                    "record": {{"emotion": 17}}
                }}
            }}"#
        );
        let outcome = plan_commit(&envelope(&frame), COLLECTION, &UnreachableResolver).await;
        assert_eq!(outcome, Outcome::Skip(SkipReason::RecordDecode));
    }

    #[tokio::test]
    async fn test_create_without_record_skipped() {
        let frame = format!(
            r#"{{
                "did": "did:plc:abc",
                "time_us": 9,
                "kind": "commit",
                "commit": {{
                    "operation": "create",
                    "collection": "{COLLECTION}",
                    "rkey": "k"
                }}
            }}"#
        );
        let outcome = plan_commit(&envelope(&frame), COLLECTION, &UnreachableResolver).await;
        assert_eq!(outcome, Outcome::Skip(SkipReason::MissingRecord));
    }

    #[tokio::test]
    async fn test_other_collection_skipped() {
        let env = envelope(&create_frame("hi"));
        let outcome = plan_commit(&env, "app.bsky.feed.post", &UnreachableResolver).await;
        assert_eq!(outcome, Outcome::Skip(SkipReason::OtherCollection));
    }

    #[tokio::test]
    async fn test_non_commit_kind_skipped() {
        let frame = r#"{"did": "did:plc:abc", "time_us": 10, "kind": "identity"}"#;
        let outcome = plan_commit(&envelope(frame), COLLECTION, &UnreachableResolver).await;
        assert_eq!(outcome, Outcome::Skip(SkipReason::NotCommit));
    }

    #[tokio::test]
    async fn test_unknown_operation_skipped() {
        let frame = format!(
            r#"{{
                "did": "did:plc:abc",
                "time_us": 11,
                "kind": "commit",
                "commit": {{
                    "operation": "truncate",
                    "collection": "{COLLECTION}",
                    "rkey": "k"
                }}
            }}"#
        );
        let outcome = plan_commit(&envelope(&frame), COLLECTION, &UnreachableResolver).await;
        assert_eq!(outcome, Outcome::Skip(SkipReason::UnknownOperation));
    }

    #[tokio::test]
    async fn test_planning_is_deterministic_for_replays() {
        // The same create planned twice yields byte-identical rows; the
        // ReplacingMergeTree key then collapses them to a single row.
        let env = envelope(&create_frame("Happy!!!"));
        let resolver = StubResolver(Some("did:web:example.com".to_string()));

        let first = plan_commit(&env, COLLECTION, &resolver).await;
        let second = plan_commit(&env, COLLECTION, &resolver).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_long_emotion_truncated_in_planned_row() {
        let env = envelope(&create_frame(&"x".repeat(80)));
        let resolver = StubResolver(None);

        match plan_commit(&env, COLLECTION, &resolver).await {
            Outcome::Upsert(row) => {
                assert_eq!(row.emotion.as_deref(), Some("x".repeat(50).as_str()));
            }
            other => panic!("expected upsert, got {other:?}"),
        }
    }
}
