//! meowstream live ingestion daemon.
//!
//! This is the main entry point for the live record ingestion service. It
//! connects to the Jetstream firehose, receives commit events for the meow
//! collection in real-time, and writes them to ClickHouse.
//!
//! # Usage
//!
//! ```bash
//! # Run with default settings
//! meowstream-ingest
//!
//! # Run against a remote store, resuming from a cursor
//! meowstream-ingest \
//!     --clickhouse-url http://clickhouse:8123 \
//!     --cursor 1725911162329308
//! ```
//!
//! # Graceful Shutdown
//!
//! The daemon handles SIGINT (Ctrl+C) for graceful shutdown:
//! 1. Stops reading new frames from the stream
//! 2. Finishes the in-flight message
//! 3. Exits cleanly, logging a run summary

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use metrics::gauge;
use tracing_subscriber::EnvFilter;

use meowstream_core::metrics::{init_metrics, start_metrics_server};
use meowstream_ingest::{
    DidResolver, JetstreamConfig, JetstreamSource, MeowStore, Pipeline, StoreConfig,
    resolver::DEFAULT_PLC_DIRECTORY,
};

/// Attempts made to provision the store schema before giving up.
const PROVISION_ATTEMPTS: u32 = 10;

/// Fixed delay between provisioning attempts.
const PROVISION_BACKOFF: std::time::Duration = std::time::Duration::from_secs(3);

/// meowstream live ingestion daemon.
#[derive(Parser, Debug)]
#[command(name = "meowstream-ingest")]
#[command(about = "Live meow record ingestion daemon")]
#[command(version)]
struct Args {
    /// ClickHouse URL
    #[arg(long, env = "CLICKHOUSE_URL", default_value = "http://localhost:8123")]
    clickhouse_url: String,

    /// ClickHouse database name
    #[arg(long, default_value = "cat")]
    clickhouse_db: String,

    /// Jetstream subscribe endpoint
    #[arg(
        long,
        default_value = "wss://jetstream2.us-east.bsky.network/subscribe"
    )]
    jetstream_url: String,

    /// Record collection to ingest
    #[arg(long, default_value = "cat.kasey.moe.meow")]
    collection: String,

    /// PLC directory base URL for identity resolution
    #[arg(long, default_value = DEFAULT_PLC_DIRECTORY)]
    plc_directory: String,

    /// Starting stream cursor (producer microseconds)
    #[arg(long)]
    cursor: Option<i64>,

    /// Metrics HTTP server port (0 to disable)
    #[arg(long, default_value = "9090")]
    metrics_port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls crypto provider (required when both ring and aws-lc-rs are present)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap())
                .add_directive("meowstream_ingest=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    tracing::info!("meowstream ingestion daemon starting...");

    // Initialize metrics
    if args.metrics_port > 0 {
        let metrics_handle = init_metrics();
        start_metrics_server(args.metrics_port, metrics_handle).await?;
        gauge!("ingest_running").set(1.0);
        tracing::info!("Metrics server listening on port {}", args.metrics_port);
    }

    tracing::info!("Configuration:");
    tracing::info!("  ClickHouse: {}", args.clickhouse_url);
    tracing::info!("  Database:   {}", args.clickhouse_db);
    tracing::info!("  Jetstream:  {}", args.jetstream_url);
    tracing::info!("  Collection: {}", args.collection);
    tracing::info!("  Cursor:     {:?}", args.cursor);

    // Provision the store schema. This is the one startup step allowed to
    // terminate the process when it exhausts its retries.
    let store = MeowStore::new(StoreConfig {
        url: args.clickhouse_url.clone(),
        database: args.clickhouse_db.clone(),
        ..Default::default()
    });
    store
        .provision(PROVISION_ATTEMPTS, PROVISION_BACKOFF)
        .await
        .context("Store schema provisioning failed")?;

    // Build the resolver and pipeline
    let resolver = DidResolver::new(args.plc_directory.clone())
        .context("Failed to build identity resolver")?;
    let pipeline = Pipeline::new(resolver, store, args.collection.clone());

    // Build the stream source
    let source = Arc::new(JetstreamSource::new(JetstreamConfig {
        endpoint: args.jetstream_url.clone(),
        collection: args.collection.clone(),
        cursor: args.cursor,
        ..Default::default()
    }));

    // Set up graceful shutdown
    let shutdown_source = Arc::clone(&source);
    ctrlc::set_handler(move || {
        tracing::info!("Shutdown signal received, stopping gracefully...");
        shutdown_source.stop();
    })
    .context("Failed to set Ctrl+C handler")?;

    // Run the ingestion loop
    tracing::info!("Starting live ingestion...");

    let stats = source.run(|frame| pipeline.handle_frame(frame)).await?;

    // Mark as stopped
    gauge!("ingest_running").set(0.0);

    // Print summary
    let processed = pipeline.stats();
    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("SHUTDOWN COMPLETE");
    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("Frames received:   {}", stats.frames);
    tracing::info!("Connections:       {}", stats.connects);
    tracing::info!("Reconnects:        {}", stats.reconnects);
    tracing::info!("Decode errors:     {}", processed.decode_errors);
    tracing::info!("Rows upserted:     {}", processed.upserted);
    tracing::info!("Rows deleted:      {}", processed.deleted);
    tracing::info!("Messages skipped:  {}", processed.skipped);
    tracing::info!("Messages dropped:  {}", processed.dropped);
    tracing::info!("Final cursor:      {}", source.cursor());

    Ok(())
}
