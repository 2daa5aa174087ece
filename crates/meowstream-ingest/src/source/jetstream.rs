//! Jetstream firehose source.
//!
//! Maintains the long-lived WebSocket subscription to the feed and drives
//! the per-frame handler.
//!
//! # Connection Supervision
//!
//! The connection lifecycle is a supervised loop:
//!
//! ```text
//! Connecting → Streaming → (read error / close) → Connecting
//! ```
//!
//! Reconnects use exponential backoff with jitter, and resubscribe from
//! the last acknowledged cursor (the `time_us` of the last decoded frame)
//! so a drop loses nothing the feed can replay. The overlap a replay
//! produces is absorbed by the store's idempotent upserts.
//!
//! # Ordering
//!
//! Frames are handed to the handler strictly in delivery order, one at a
//! time. A slow handler (e.g., a resolver call at its timeout bound)
//! throttles ingestion; it never reorders it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use metrics::{counter, gauge};
use rand::Rng;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::Result;

/// Configuration for the Jetstream source.
#[derive(Debug, Clone)]
pub struct JetstreamConfig {
    /// Subscribe endpoint, without query parameters.
    pub endpoint: String,

    /// Record collection to request server-side filtering for.
    pub collection: String,

    /// Starting cursor (producer microseconds). `None` subscribes live.
    pub cursor: Option<i64>,

    /// First reconnect delay after a drop.
    pub initial_backoff: Duration,

    /// Reconnect delay ceiling.
    pub max_backoff: Duration,

    /// How long one read waits before re-checking the shutdown flag.
    pub poll_interval: Duration,
}

impl Default for JetstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://jetstream2.us-east.bsky.network/subscribe".to_string(),
            collection: "cat.kasey.moe.meow".to_string(),
            cursor: None,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Statistics from one ingestion run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceStats {
    /// Text frames handed to the handler.
    pub frames: usize,
    /// Successful connections (first connect plus reconnects).
    pub connects: usize,
    /// Reconnect attempts after a drop.
    pub reconnects: usize,
}

/// Live Jetstream source.
pub struct JetstreamSource {
    config: JetstreamConfig,
    running: Arc<AtomicBool>,
    /// Last acknowledged cursor; used when resubscribing.
    cursor: AtomicI64,
    frames: AtomicUsize,
    connects: AtomicUsize,
    reconnects: AtomicUsize,
}

impl JetstreamSource {
    /// Create a new source with the given configuration.
    pub fn new(config: JetstreamConfig) -> Self {
        let cursor = AtomicI64::new(config.cursor.unwrap_or(0));
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            cursor,
            frames: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
            reconnects: AtomicUsize::new(0),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &JetstreamConfig {
        &self.config
    }

    /// Signal the source to stop after the current frame.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Last acknowledged cursor, 0 before the first decoded frame.
    pub fn cursor(&self) -> i64 {
        self.cursor.load(Ordering::SeqCst)
    }

    /// Run the source until [`stop`](Self::stop) is called.
    ///
    /// The handler receives each text frame and returns the frame's
    /// `time_us` when it decoded an envelope; that value becomes the
    /// resumption cursor. Handler-internal failures are the handler's
    /// business — the source only cares about the cursor acknowledgement.
    ///
    /// The loop reconnects on any connection failure, including the very
    /// first: the daemon keeps trying until the operator shuts it down.
    pub async fn run<F, Fut>(&self, mut handler: F) -> Result<SourceStats>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Option<i64>>,
    {
        self.running.store(true, Ordering::SeqCst);

        let mut backoff = self.config.initial_backoff;

        while self.running.load(Ordering::SeqCst) {
            let url = self.subscribe_url();
            tracing::info!(url = %url, "Connecting to Jetstream");

            let ws = match connect_async(url.as_str()).await {
                Ok((ws, _response)) => ws,
                Err(e) => {
                    tracing::warn!("Connection failed: {}; retrying in {:?}", e, backoff);
                    counter!("ingest_reconnects_total").increment(1);
                    self.reconnects.fetch_add(1, Ordering::Relaxed);
                    self.sleep_with_jitter(backoff).await;
                    backoff = next_backoff(backoff, self.config.max_backoff);
                    continue;
                }
            };

            self.connects.fetch_add(1, Ordering::Relaxed);
            gauge!("ingest_connected").set(1.0);
            tracing::info!("Connected, streaming");
            backoff = self.config.initial_backoff;

            self.stream(ws, &mut handler).await;

            gauge!("ingest_connected").set(0.0);

            if self.running.load(Ordering::SeqCst) {
                tracing::warn!("Stream dropped; reconnecting in {:?}", backoff);
                counter!("ingest_reconnects_total").increment(1);
                self.reconnects.fetch_add(1, Ordering::Relaxed);
                self.sleep_with_jitter(backoff).await;
                backoff = next_backoff(backoff, self.config.max_backoff);
            }
        }

        self.running.store(false, Ordering::SeqCst);

        Ok(SourceStats {
            frames: self.frames.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        })
    }

    /// Read frames from one connection until it drops or the source stops.
    async fn stream<S, F, Fut>(&self, ws: S, handler: &mut F)
    where
        S: futures_util::Stream<
                Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>,
            > + Unpin,
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Option<i64>>,
    {
        let mut read = ws;

        while self.running.load(Ordering::SeqCst) {
            let next = tokio::time::timeout(self.config.poll_interval, read.next()).await;

            let msg = match next {
                // Timeout: re-check the running flag and keep reading.
                Err(_) => continue,
                Ok(None) => {
                    tracing::info!("Stream closed by peer");
                    return;
                }
                Ok(Some(Err(e))) => {
                    tracing::warn!("Read error: {}", e);
                    return;
                }
                Ok(Some(Ok(msg))) => msg,
            };

            match msg {
                Message::Text(frame) => {
                    self.frames.fetch_add(1, Ordering::Relaxed);
                    if let Some(time_us) = handler(frame.to_string()).await {
                        self.cursor.store(time_us, Ordering::SeqCst);
                        gauge!("ingest_cursor_time_us").set(time_us as f64);
                    }
                }
                Message::Close(_) => {
                    tracing::info!("Close frame received");
                    return;
                }
                // Pings are answered by the protocol layer.
                _ => {}
            }
        }
    }

    /// Build the subscribe URL, resuming from the acknowledged cursor when
    /// one exists.
    fn subscribe_url(&self) -> String {
        let mut url = format!(
            "{}?wantedCollections={}",
            self.config.endpoint, self.config.collection
        );
        let cursor = self.cursor.load(Ordering::SeqCst);
        if cursor > 0 {
            url.push_str(&format!("&cursor={cursor}"));
        }
        url
    }

    async fn sleep_with_jitter(&self, backoff: Duration) {
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..500));
        tokio::time::sleep(backoff + jitter).await;
    }
}

/// Double the backoff up to the ceiling.
fn next_backoff(current: Duration, max: Duration) -> Duration {
    (current * 2).min(max)
}
