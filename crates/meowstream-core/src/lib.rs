//! Core types, validation, and shared utilities for the meowstream pipeline.
//!
//! This crate provides:
//! - Record content sanitization (emotion length/content policy)
//! - Identifier syntax validation shared by the ingester and the query API
//! - Prometheus metrics helpers
//! - Shared error types

mod error;
pub mod ident;
pub mod metrics;
mod sanitize;

// ═══════════════════════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════════════════════

/// Maximum number of characters persisted for a record's emotion field.
/// Longer values are truncated, not rejected.
pub const MAX_EMOTION_CHARS: usize = 50;

pub use error::{Error, Result};
pub use ident::{is_valid_did, is_valid_domain, is_valid_rkey};
pub use sanitize::sanitize_emotion;
