//! meowstream ingestion pipeline components.
//!
//! This crate provides the event-driven consumer that ingests record-change
//! events from the Jetstream firehose into ClickHouse.
//!
//! # Modules
//!
//! - [`source`] - Jetstream connection lifecycle (connect, read, reconnect)
//! - [`decode`] - Envelope and record decoding
//! - [`resolver`] - Subject identity resolution via DID lookups
//! - [`pipeline`] - Per-message pipeline and the ClickHouse store
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ JetstreamSource  │  WebSocket; reconnects with backoff + cursor resume
//! └────────┬─────────┘
//!          │ one frame at a time
//!          ▼
//! ┌──────────────────┐
//! │  Stream Decoder  │  envelope first, record lazily
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │ Record Validator │  emotion policy; rejection drops the message
//! └────────┬─────────┘
//!          │ subject present?
//!          ▼
//! ┌──────────────────┐
//! │ Identity Resolver│  bounded DID lookup; failure degrades to null
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │    MeowStore     │  idempotent upsert / delete by rkey
//! └──────────────────┘
//! ```
//!
//! Processing is strictly sequential per connection: the next frame is not
//! read until the current one has been persisted or dropped. Per-message
//! failures never escape their message; only schema provisioning at
//! startup may terminate the process.

pub mod decode;
pub mod error;
pub mod pipeline;
pub mod resolver;
pub mod source;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

// Re-export pipeline components for convenience
pub use pipeline::{MeowRow, MeowStore, Outcome, Pipeline, SkipReason, StoreConfig};

// Re-export the resolver seam and production implementation
pub use resolver::{DidResolver, Resolve};

// Re-export source types
pub use source::{JetstreamConfig, JetstreamSource, SourceStats};
