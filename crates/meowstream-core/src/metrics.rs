//! Prometheus metrics helpers for the meowstream system.
//!
//! This module provides centralized metrics initialization and common metric
//! definitions used across meowstream components.
//!
//! # Usage
//!
//! ```rust,ignore
//! use meowstream_core::metrics::{init_metrics, start_metrics_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     // Initialize the Prometheus recorder
//!     let handle = init_metrics();
//!
//!     // Start the HTTP server for /metrics endpoint
//!     start_metrics_server(9090, handle).await.unwrap();
//!
//!     // Now use metrics anywhere in your code
//!     use metrics::{counter, gauge};
//!     counter!("my_counter").increment(1);
//!     gauge!("my_gauge").set(42.0);
//! }
//! ```
//!
//! # Metric Naming Conventions
//!
//! - Prefix: component name (e.g., `ingest_`, `resolver_`)
//! - Suffix: unit or type (e.g., `_total`, `_seconds`)
//! - Labels: use sparingly to avoid cardinality explosion

use axum::{Router, routing::get};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Initialize the Prometheus metrics recorder.
///
/// This must be called once at startup before any metrics are recorded.
/// Returns a handle that can be used with [`start_metrics_server`].
///
/// # Panics
///
/// Panics if called more than once (the recorder can only be installed once).
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    // Register all metric descriptions upfront
    register_common_metrics();

    handle
}

/// Try to initialize the Prometheus metrics recorder.
///
/// Like [`init_metrics`] but returns `None` if the recorder is already
/// installed, instead of panicking. Useful for tests.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    PrometheusBuilder::new().install_recorder().ok()
}

/// Start the Prometheus metrics HTTP server.
///
/// Serves the `/metrics` endpoint on the specified port.
/// This spawns a background task and returns immediately.
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<(), std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Metrics server exited: {}", e);
        }
    });

    Ok(())
}

/// Register descriptions for common metrics used across meowstream.
///
/// Called automatically by [`init_metrics`].
fn register_common_metrics() {
    // =========================================================================
    // Ingestion Loop Metrics
    // =========================================================================

    describe_counter!(
        "ingest_frames_total",
        "Total frames received from the stream"
    );
    describe_counter!(
        "ingest_decode_errors_total",
        "Frames that failed envelope decoding"
    );
    describe_counter!(
        "ingest_messages_dropped_total",
        "Messages dropped before persistence (label: reason)"
    );
    describe_counter!(
        "ingest_rows_upserted_total",
        "Rows upserted into the store"
    );
    describe_counter!("ingest_rows_deleted_total", "Rows deleted from the store");
    describe_counter!(
        "ingest_reconnects_total",
        "Stream reconnection attempts after a drop"
    );
    describe_gauge!(
        "ingest_connected",
        "Whether the stream connection is up (1=yes, 0=no)"
    );
    describe_gauge!(
        "ingest_running",
        "Whether the ingestion daemon is running (1=yes, 0=no)"
    );
    describe_gauge!(
        "ingest_cursor_time_us",
        "Last acknowledged stream cursor (producer microseconds)"
    );

    // =========================================================================
    // Identity Resolver Metrics
    // =========================================================================

    describe_counter!(
        "resolver_lookups_total",
        "Identity resolution attempts (labels: method, outcome)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;

    // Ensure metrics are initialized exactly once for all tests
    static INIT: Once = Once::new();

    fn ensure_metrics_init() {
        INIT.call_once(|| {
            let _ = try_init_metrics();
        });
    }

    #[test]
    fn test_try_init_metrics_idempotent() {
        let handle1 = try_init_metrics();
        let handle2 = try_init_metrics();
        // At most one should succeed
        assert!(handle1.is_none() || handle2.is_none());
    }

    #[test]
    fn test_register_common_metrics_does_not_panic() {
        ensure_metrics_init();
        register_common_metrics();
        register_common_metrics();
    }
}
