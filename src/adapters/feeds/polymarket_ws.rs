//! Polymarket Market WebSocket Feed — Streaming Prices and Arbitrage
//!
//! Connects to the Polymarket market channel, subscribes to a set of
//! instruments and turns every usable frame into a `PriceSample`.
//!
//! Features:
//! - Connection state machine published on a `watch` channel
//!   (Disconnected → Connecting → Subscribed → Disconnected on error)
//! - Jittered exponential reconnect backoff, forever, reset after a
//!   session that reached Subscribed
//! - Subscription follows a `watch` channel of instruments: a changed
//!   list is re-sent on the live socket and used on every reconnect
//! - Bounded per-instrument history (`PriceBook`)
//! - Arbitrage detection on every update (`yes + no < threshold`)
//! - Events pushed with `try_send`, so the receive loop never waits on
//!   the consumer; a full queue drops the event and counts it
//! - Malformed frames are dropped and counted, never fatal

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{RwLock, broadcast, mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, instrument, warn};

use super::backoff::ReconnectPolicy;
use super::normalize::{FeedMessage, normalize};
use crate::adapters::metrics::MetricsRegistry;
use crate::config::FeedConfig;
use crate::domain::{ArbitrageSignal, InstrumentId, PriceRing, PriceSample};
use crate::error::FeedError;
use crate::ports::market_feed::{FeedEvent, FeedState, LivePrices};

/// Keepalive ping cadence while subscribed.
const HEARTBEAT: Duration = Duration::from_secs(10);

/// Bounded per-instrument price history.
pub struct PriceBook {
    rings: RwLock<HashMap<InstrumentId, PriceRing>>,
    capacity: usize,
}

impl PriceBook {
    pub fn new(capacity: usize) -> Self {
        Self {
            rings: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    pub async fn record(&self, sample: PriceSample) {
        let mut rings = self.rings.write().await;
        rings
            .entry(sample.instrument_id.clone())
            .or_insert_with(|| PriceRing::with_capacity(self.capacity))
            .push(sample);
    }

}

#[async_trait]
impl LivePrices for PriceBook {
    async fn latest(&self, instrument_id: &str) -> Option<PriceSample> {
        let rings = self.rings.read().await;
        rings.get(instrument_id).and_then(PriceRing::latest).cloned()
    }

    async fn history(&self, instrument_id: &str) -> Vec<PriceSample> {
        let rings = self.rings.read().await;
        rings
            .get(instrument_id)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn snapshot(&self) -> HashMap<InstrumentId, PriceSample> {
        let rings = self.rings.read().await;
        rings
            .iter()
            .filter_map(|(id, ring)| ring.latest().map(|s| (id.clone(), s.clone())))
            .collect()
    }
}

/// Counters exposed through `status()`.
#[derive(Debug, Default)]
struct FeedStats {
    updates: AtomicU64,
    arbitrage_signals: AtomicU64,
    dropped_unrecognized: AtomicU64,
    dropped_backpressure: AtomicU64,
    reconnects: AtomicU64,
}

/// Point-in-time copy of the feed counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeedStatsSnapshot {
    pub state: FeedState,
    pub updates: u64,
    pub arbitrage_signals: u64,
    pub dropped_unrecognized: u64,
    pub dropped_backpressure: u64,
    pub reconnects: u64,
}

/// Streaming price feed client.
pub struct PriceFeed {
    /// WebSocket URL from config.
    ws_url: String,
    policy: ReconnectPolicy,
    arbitrage_threshold: Decimal,
    book: Arc<PriceBook>,
    events_tx: mpsc::Sender<FeedEvent>,
    state_tx: watch::Sender<FeedState>,
    stats: FeedStats,
    metrics: Arc<MetricsRegistry>,
}

impl PriceFeed {
    /// Create a feed that publishes events on `events_tx`.
    pub fn new(
        config: &FeedConfig,
        events_tx: mpsc::Sender<FeedEvent>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let (state_tx, _) = watch::channel(FeedState::Disconnected);
        Self {
            ws_url: config.ws_url.clone(),
            policy: ReconnectPolicy::from_config(config),
            arbitrage_threshold: config.arbitrage_threshold,
            book: Arc::new(PriceBook::new(config.history_capacity)),
            events_tx,
            state_tx,
            stats: FeedStats::default(),
            metrics,
        }
    }

    /// Shared read view of the price history.
    pub fn book(&self) -> Arc<PriceBook> {
        Arc::clone(&self.book)
    }

    pub fn state(&self) -> FeedState {
        *self.state_tx.borrow()
    }

    pub fn stats(&self) -> FeedStatsSnapshot {
        FeedStatsSnapshot {
            state: self.state(),
            updates: self.stats.updates.load(Ordering::Relaxed),
            arbitrage_signals: self.stats.arbitrage_signals.load(Ordering::Relaxed),
            dropped_unrecognized: self.stats.dropped_unrecognized.load(Ordering::Relaxed),
            dropped_backpressure: self.stats.dropped_backpressure.load(Ordering::Relaxed),
            reconnects: self.stats.reconnects.load(Ordering::Relaxed),
        }
    }

    fn set_state(&self, state: FeedState) {
        self.state_tx.send_replace(state);
        self.metrics
            .feed_connected
            .set(i64::from(state == FeedState::Subscribed));
    }

    /// Run the connection loop until shutdown.
    ///
    /// Every failed session goes back through Disconnected and waits
    /// out the backoff delay before reconnecting. Each session subscribes
    /// to the current value of `instruments`.
    #[instrument(skip_all)]
    pub async fn run(
        &self,
        mut instruments: watch::Receiver<Vec<InstrumentId>>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        info!(url = %self.ws_url, "Starting market feed");
        let mut attempt: u32 = 0;

        loop {
            self.set_state(FeedState::Connecting);
            match self.connect_and_stream(&mut instruments, &mut shutdown_rx).await {
                Ok(()) => {
                    self.set_state(FeedState::Disconnected);
                    info!("Market feed shut down gracefully");
                    return;
                }
                Err(e) => {
                    self.set_state(FeedState::Disconnected);
                    if e.was_subscribed() {
                        attempt = 0;
                    }
                    let delay = self.policy.next_delay(attempt);
                    attempt = attempt.saturating_add(1);
                    self.stats.reconnects.fetch_add(1, Ordering::Relaxed);
                    self.metrics.feed_reconnects.inc();

                    warn!(
                        error = %e,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Market feed disconnected, backing off"
                    );

                    tokio::select! {
                        biased;
                        _ = shutdown_rx.recv() => {
                            info!("Shutdown during feed backoff");
                            return;
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Single session: connect, subscribe, stream until error or shutdown.
    async fn connect_and_stream(
        &self,
        instruments: &mut watch::Receiver<Vec<InstrumentId>>,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<(), FeedError> {
        let (ws_stream, _) = connect_async(&self.ws_url)
            .await
            .map_err(|e| FeedError::Connect {
                url: self.ws_url.clone(),
                reason: e.to_string(),
            })?;

        let (mut write, mut read) = ws_stream.split();

        let subscribed = instruments.borrow_and_update().clone();
        write
            .send(subscribe_frame(&subscribed))
            .await
            .map_err(|e| FeedError::Subscribe(e.to_string()))?;

        self.set_state(FeedState::Subscribed);
        info!(instruments = subscribed.len(), "Market feed subscribed");

        let mut heartbeat = tokio::time::interval(HEARTBEAT);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal in market feed");
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                Ok(()) = instruments.changed() => {
                    let updated = instruments.borrow_and_update().clone();
                    write
                        .send(subscribe_frame(&updated))
                        .await
                        .map_err(|e| FeedError::Stream(format!("resubscribe failed: {e}")))?;
                    info!(instruments = updated.len(), "Market feed resubscribed");
                }
                _ = heartbeat.tick() => {
                    write
                        .send(Message::Ping(Vec::new().into()))
                        .await
                        .map_err(|e| FeedError::Stream(format!("ping failed: {e}")))?;
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text(text.as_ref()).await;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            return Err(FeedError::Stream(format!("closed by server: {frame:?}")));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(FeedError::Stream(e.to_string())),
                        None => return Err(FeedError::Stream("stream ended".to_string())),
                    }
                }
            }
        }
    }

    /// Normalize one frame, record its samples and publish events.
    ///
    /// Returns the number of price updates applied.
    pub async fn handle_text(&self, text: &str) -> usize {
        let mut applied = 0;

        for message in normalize(text) {
            match message {
                FeedMessage::PriceUpdate { instrument, yes, no } => {
                    let sample = PriceSample {
                        instrument_id: instrument,
                        timestamp: Utc::now(),
                        yes_mid: yes,
                        no_mid: no,
                    };
                    let arbitrage = ArbitrageSignal::detect(&sample, self.arbitrage_threshold);

                    self.book.record(sample.clone()).await;
                    self.stats.updates.fetch_add(1, Ordering::Relaxed);
                    self.publish(FeedEvent::Price(sample));

                    if let Some(signal) = arbitrage {
                        info!(
                            instrument = %signal.instrument_id,
                            yes = %signal.yes_mid,
                            no = %signal.no_mid,
                            margin = %signal.margin,
                            "Arbitrage window detected"
                        );
                        self.stats.arbitrage_signals.fetch_add(1, Ordering::Relaxed);
                        self.metrics.arbitrage_signals.inc();
                        self.publish(FeedEvent::Arbitrage(signal));
                    }
                    applied += 1;
                }
                FeedMessage::Unrecognized(reason) => {
                    self.stats.dropped_unrecognized.fetch_add(1, Ordering::Relaxed);
                    self.metrics.feed_dropped.with_label_values(&[reason]).inc();
                    debug!(reason, "Dropped feed message");
                }
            }
        }

        applied
    }

    fn publish(&self, event: FeedEvent) {
        match self.events_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.stats.dropped_backpressure.fetch_add(1, Ordering::Relaxed);
                self.metrics.feed_dropped.with_label_values(&["queue_full"]).inc();
                debug!("Event queue full, dropping feed event");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Event consumer gone, dropping feed event");
            }
        }
    }
}

/// Market channel subscription for `instruments`.
fn subscribe_frame(instruments: &[InstrumentId]) -> Message {
    let subscribe = serde_json::json!({ "type": "market", "assets_ids": instruments });
    Message::Text(subscribe.to_string().into())
}
