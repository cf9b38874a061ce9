//! Trader Service - Facade for Presentation Layers
//!
//! Everything a CLI, dashboard or health endpoint may ask of the engine:
//! bet listings, the portfolio summary, manual bets and settlement passes,
//! monitoring and feed lifecycle, and an aggregated status that never fails.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use super::ledger_store::LedgerStore;
use super::portfolio_manager::PortfolioManager;
use super::scheduler::{
  MonitorScheduler, PlacementError, SchedulerHandle, SchedulerStatus, StartOutcome, TickReport,
};
use crate::adapters::feeds::{FeedStatsSnapshot, FeedSupervisor};
use crate::adapters::metrics::HealthProbe;
use crate::domain::{
  Bet, HistoryFilter, InstrumentId, OutcomeSide, PortfolioSummary, PriceSample, SettledBet, select_history,
};
use crate::ports::market_discovery::MarketDiscovery;
use crate::ports::market_feed::{FeedState, LivePrices};
use crate::ports::repository::{LedgerRepository, PortfolioRepository};

/// Aggregated service status.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
  pub started_at: DateTime<Utc>,
  pub scheduler: SchedulerStatus,
  pub feed_running: bool,
  pub feed: Option<FeedStatsSnapshot>,
  pub active_bets: usize,
  pub settled_bets: usize,
  pub portfolio: PortfolioSummary,
  pub ledger_healthy: bool,
  /// Feed expected but not subscribed, last sweep failed, or ledger behind.
  pub degraded: bool,
}

pub struct TraderService<R: LedgerRepository, P: PortfolioRepository> {
  ledger: Arc<LedgerStore<R>>,
  portfolio: Arc<PortfolioManager<P>>,
  scheduler: Arc<MonitorScheduler<R, P>>,
  handle: Mutex<Option<SchedulerHandle>>,
  feed: Option<Arc<FeedSupervisor>>,
  discovery: Arc<dyn MarketDiscovery>,
  started_at: DateTime<Utc>,
}

impl<R: LedgerRepository, P: PortfolioRepository> TraderService<R, P> {
  pub fn new(
    ledger: Arc<LedgerStore<R>>,
    portfolio: Arc<PortfolioManager<P>>,
    scheduler: Arc<MonitorScheduler<R, P>>,
    feed: Option<Arc<FeedSupervisor>>,
    discovery: Arc<dyn MarketDiscovery>,
  ) -> Self {
    Self {
      ledger,
      portfolio,
      scheduler,
      handle: Mutex::new(None),
      feed,
      discovery,
      started_at: Utc::now(),
    }
  }

  pub async fn list_active_bets(&self) -> Vec<Bet> {
    self.ledger.list_active().await
  }

  /// Settled and voided bets, newest first.
  pub async fn list_history(&self, limit: Option<usize>, filter: Option<HistoryFilter>) -> Vec<SettledBet> {
    select_history(&self.ledger.list_history().await, limit, filter)
  }

  pub async fn portfolio_summary(&self) -> PortfolioSummary {
    self.portfolio.summary().await
  }

  /// Open a bet by hand on a discovered market at its current quote.
  pub async fn place_bet(&self, market_id: &str, side: OutcomeSide, stake: Decimal) -> Result<Bet, PlacementError> {
    self.scheduler.place_manual(market_id, side, stake).await
  }

  /// Settle every due bet now instead of waiting for the next tick.
  pub async fn settle_now(&self) -> TickReport {
    self.scheduler.settle_now().await
  }

  /// Start the scheduler loop. `false` when it was already running.
  #[instrument(skip(self))]
  pub async fn start_monitoring(&self) -> bool {
    let mut handle = self.handle.lock().await;
    match self.scheduler.start() {
      StartOutcome::Started(started) => {
        *handle = Some(started);
        true
      }
      StartOutcome::AlreadyRunning => false,
    }
  }

  /// Stop the scheduler loop, waiting for the current tick.
  #[instrument(skip(self))]
  pub async fn stop_monitoring(&self) -> bool {
    let Some(handle) = self.handle.lock().await.take() else {
      return false;
    };
    handle.stop().await;
    true
  }

  /// Start streaming prices for `instruments`, or for the instruments
  /// the scheduler knows about when none are given.
  #[instrument(skip(self, instruments))]
  pub async fn start_realtime_feed(&self, instruments: Option<Vec<InstrumentId>>) -> Result<bool> {
    let Some(feed) = &self.feed else {
      bail!("realtime feed is disabled in config");
    };

    let mut instruments = match instruments {
      Some(ids) => ids,
      None => self.scheduler.watched_instruments().await,
    };
    if instruments.is_empty() {
      let candidates = self
        .discovery
        .list_candidate_markets()
        .await
        .context("Failed to discover instruments for the feed")?;
      instruments = candidates.into_iter().filter_map(|m| m.yes_token).collect();
    }
    if instruments.is_empty() {
      bail!("no instruments to subscribe");
    }

    let started = feed.start(instruments).await;
    if started {
      info!("Realtime feed started");
    }
    Ok(started)
  }

  pub async fn stop_realtime_feed(&self) -> bool {
    match &self.feed {
      Some(feed) => feed.stop().await,
      None => false,
    }
  }

  /// Latest streamed sample per instrument.
  pub async fn realtime_prices(&self) -> HashMap<InstrumentId, PriceSample> {
    match &self.feed {
      Some(feed) => feed.feed().book().snapshot().await,
      None => HashMap::new(),
    }
  }

  pub async fn status(&self) -> ServiceStatus {
    let scheduler = self.scheduler.status().await;
    let (feed_running, feed) = match &self.feed {
      Some(supervisor) => (supervisor.is_running().await, Some(supervisor.feed().stats())),
      None => (false, None),
    };
    let ledger_healthy = self.ledger.is_healthy().await;

    let feed_down = feed_running && feed.is_some_and(|f| f.state != FeedState::Subscribed);
    let degraded = feed_down || scheduler.last_sweep_error.is_some() || !ledger_healthy;

    ServiceStatus {
      started_at: self.started_at,
      scheduler,
      feed_running,
      feed,
      active_bets: self.ledger.active_count().await,
      settled_bets: self.ledger.list_history().await.len(),
      portfolio: self.portfolio.summary().await,
      ledger_healthy,
      degraded,
    }
  }

  /// Stop everything that is running.
  pub async fn shutdown(&self) {
    if self.stop_realtime_feed().await {
      info!("Realtime feed stopped");
    }
    if !self.stop_monitoring().await {
      warn!("Scheduler was not running at shutdown");
    }
  }
}

#[async_trait]
impl<R: LedgerRepository, P: PortfolioRepository> HealthProbe for TraderService<R, P> {
  async fn is_ready(&self) -> bool {
    !self.status().await.degraded
  }

  async fn status_document(&self) -> serde_json::Value {
    serde_json::to_value(self.status().await).unwrap_or_default()
  }
}
