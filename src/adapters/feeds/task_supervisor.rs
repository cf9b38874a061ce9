//! Feed Task Supervisor - Lifecycle Management for the Market Feed
//!
//! Owns the spawned `PriceFeed::run` task and its shutdown channel so the
//! feed can be started and stopped on demand from the service facade.
//! The subscribed instrument list can be replaced while the task runs.
//! Provides health status for the /ready endpoint.

use std::sync::Arc;

use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use super::polymarket_ws::PriceFeed;
use crate::domain::InstrumentId;
use crate::ports::market_feed::FeedState;

/// A running feed task.
struct FeedTask {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
    instruments: watch::Sender<Vec<InstrumentId>>,
}

/// Supervises the market feed task.
pub struct FeedSupervisor {
    feed: Arc<PriceFeed>,
    task: Mutex<Option<FeedTask>>,
}

impl FeedSupervisor {
    pub fn new(feed: Arc<PriceFeed>) -> Self {
        Self {
            feed,
            task: Mutex::new(None),
        }
    }

    /// Shared feed instance.
    pub fn feed(&self) -> Arc<PriceFeed> {
        Arc::clone(&self.feed)
    }

    /// Spawn the feed for `instruments`.
    ///
    /// Returns `false` without spawning when a feed task is already alive.
    #[instrument(skip(self, instruments), fields(instruments = instruments.len()))]
    pub async fn start(&self, instruments: Vec<InstrumentId>) -> bool {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            warn!("Market feed already running");
            return false;
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (instruments, instruments_rx) = watch::channel(instruments);
        let feed = Arc::clone(&self.feed);
        let handle = tokio::spawn(async move {
            feed.run(instruments_rx, shutdown_rx).await;
        });

        info!("Market feed task spawned");
        *task = Some(FeedTask {
            shutdown_tx,
            handle,
            instruments,
        });
        true
    }

    /// Signal the feed task and wait for it to finish.
    ///
    /// Returns `false` when nothing was running.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> bool {
        let Some(task) = self.task.lock().await.take() else {
            return false;
        };

        let _ = task.shutdown_tx.send(());
        if let Err(e) = task.handle.await {
            warn!(error = %e, "Market feed task ended abnormally");
        }
        info!(instruments = task.instruments.borrow().len(), "Market feed stopped");
        true
    }

    /// Replace the subscription of the running task.
    ///
    /// Returns `true` when the running feed was given a different list;
    /// `false` when nothing runs or the set is unchanged.
    #[instrument(skip(self, instruments), fields(instruments = instruments.len()))]
    pub async fn resubscribe(&self, mut instruments: Vec<InstrumentId>) -> bool {
        let guard = self.task.lock().await;
        let Some(task) = guard.as_ref().filter(|t| !t.handle.is_finished()) else {
            return false;
        };

        instruments.sort();
        instruments.dedup();
        task.instruments.send_if_modified(|current| {
            let mut sorted = current.clone();
            sorted.sort();
            if sorted == instruments {
                false
            } else {
                *current = instruments;
                true
            }
        })
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Instruments of the running task, empty when stopped.
    pub async fn instruments(&self) -> Vec<InstrumentId> {
        self.task
            .lock()
            .await
            .as_ref()
            .map(|t| t.instruments.borrow().clone())
            .unwrap_or_default()
    }

    /// Whether the feed currently holds a live subscription.
    pub fn is_healthy(&self) -> bool {
        self.feed.state() == FeedState::Subscribed
    }
}
