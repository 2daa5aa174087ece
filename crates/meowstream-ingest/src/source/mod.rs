//! Stream source adapters.
//!
//! The ingestion loop reads from a single live source: the Jetstream
//! firehose, filtered server-side to one record collection. The source owns
//! the connection lifecycle (connect, read, reconnect with backoff) and
//! hands raw frames to the pipeline one at a time.

mod jetstream;

pub use jetstream::{JetstreamConfig, JetstreamSource, SourceStats};
