//! Monitor Scheduler - Periodic Bet Lifecycle Driver
//!
//! Top-level loop of the paper trader. One task, one tick at a time:
//! 0. Reconcile the portfolio against the ledger
//! 1. Settlement sweep: settle every bet past its deadline
//! 2. Position sweep: take-profit / stop-loss on active bets
//! 3. Opportunity sweep: discover markets, ask the strategy, open bets
//!
//! Between ticks the same task drains feed events: price updates trigger
//! a fast exit check, arbitrage signals are recorded and optionally
//! traded. Every sweep is fault-isolated per item; only a ledger that
//! cannot be written ends a tick early. After each tick a running feed is
//! pointed at the instruments the scheduler currently watches.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use super::ledger_store::LedgerStore;
use super::portfolio_manager::PortfolioManager;
use super::position_manager::{PositionAction, PositionManager};
use super::risk_manager::{RiskManager, RiskRejection};
use super::settlement::{SettleOutcome, SettlementEngine};
use crate::adapters::feeds::FeedSupervisor;
use crate::adapters::metrics::MetricsRegistry;
use crate::config::{AppConfig, ArbitrageConfig};
use crate::domain::{
  ArbitrageSignal, Bet, BetOrigin, BetRequest, ExitReason, InstrumentId, OutcomeSide, PriceSample,
};
use crate::error::{LedgerError, SettlementError};
use crate::ports::market_discovery::{CandidateMarket, MarketDiscovery};
use crate::ports::market_feed::{FeedEvent, LivePrices};
use crate::ports::repository::{LedgerRepository, PortfolioRepository};
use crate::ports::strategy::{Decision, IndicatorSource, Strategy};

/// Lifecycle of the scheduler loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
  Stopped,
  Running,
  Stopping,
}

/// External collaborators consulted by the sweeps.
#[derive(Clone)]
pub struct Collaborators {
  pub discovery: Arc<dyn MarketDiscovery>,
  pub indicators: Arc<dyn IndicatorSource>,
  pub strategy: Arc<dyn Strategy>,
  /// Streaming price view; `None` when the feed is disabled.
  pub live_prices: Option<Arc<dyn LivePrices>>,
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
  pub started_at: Option<DateTime<Utc>>,
  pub reconciled: bool,
  pub settled: usize,
  pub deferred: usize,
  pub exited: usize,
  pub opened: usize,
  pub skipped: usize,
  /// Per-item failures, `sweep: error`.
  pub errors: Vec<String>,
  /// Set when the tick ended early.
  pub aborted: Option<String>,
  pub duration_ms: u64,
}

impl TickReport {
  fn record_error(&mut self, sweep: &str, error: impl std::fmt::Display) {
    self.errors.push(format!("{sweep}: {error}"));
  }

  /// Last failure of the tick, if any.
  pub fn last_error(&self) -> Option<String> {
    self.aborted.clone().or_else(|| self.errors.last().cloned())
  }
}

/// Point-in-time view of the scheduler for status endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
  pub state: SchedulerState,
  pub ticks: u64,
  pub last_tick: Option<TickReport>,
  pub last_sweep_error: Option<String>,
  pub arbitrage_signals: u64,
  pub last_arbitrage: Option<ArbitrageSignal>,
  pub arbitrage_markets_traded: usize,
}

#[derive(Debug, Default)]
struct Progress {
  ticks: u64,
  last_tick: Option<TickReport>,
  last_sweep_error: Option<String>,
  arbitrage_signals: u64,
  last_arbitrage: Option<ArbitrageSignal>,
}

/// Why a manual bet was not opened.
#[derive(Error, Debug)]
pub enum PlacementError {
  #[error("stake {0} must be positive")]
  InvalidStake(Decimal),

  #[error("market {0} not found among candidates")]
  UnknownMarket(String),

  #[error("market {0} has no strike yet")]
  NoStrike(String),

  #[error("market {0} already closed")]
  Closed(String),

  #[error("no quote for market {0}")]
  NoQuote(String),

  #[error("stake {stake} exceeds cash {cash}")]
  InsufficientCash { stake: Decimal, cash: Decimal },

  #[error("rejected by risk limits: {0}")]
  Rejected(#[from] RiskRejection),

  #[error("bet on market {0} was not opened")]
  NotOpened(String),

  #[error(transparent)]
  Ledger(#[from] LedgerError),
}

/// Result of `MonitorScheduler::start`.
pub enum StartOutcome {
  Started(SchedulerHandle),
  AlreadyRunning,
}

/// Owns the running loop. Dropping it leaves the loop running;
/// `stop` signals it and waits for the current tick to finish.
pub struct SchedulerHandle {
  shutdown_tx: broadcast::Sender<()>,
  join: JoinHandle<()>,
  state: Arc<watch::Sender<SchedulerState>>,
}

impl SchedulerHandle {
  #[instrument(skip(self))]
  pub async fn stop(self) {
    self.state.send_replace(SchedulerState::Stopping);
    let _ = self.shutdown_tx.send(());
    if let Err(e) = self.join.await {
      error!(error = %e, "Scheduler task ended abnormally");
    }
    self.state.send_replace(SchedulerState::Stopped);
    info!("Scheduler stopped");
  }
}

/// Periodic driver of settlement, position and opportunity sweeps.
pub struct MonitorScheduler<R: LedgerRepository, P: PortfolioRepository> {
  ledger: Arc<LedgerStore<R>>,
  portfolio: Arc<PortfolioManager<P>>,
  settlement: Arc<SettlementEngine<R, P>>,
  collaborators: Collaborators,
  positions: PositionManager,
  risk: RiskManager,
  arbitrage: ArbitrageConfig,
  interval: Duration,
  grace: chrono::Duration,
  max_markets_per_tick: usize,
  events: Mutex<mpsc::Receiver<FeedEvent>>,
  state: Arc<watch::Sender<SchedulerState>>,
  /// Held for the duration of a tick.
  tick_lock: Mutex<()>,
  progress: RwLock<Progress>,
  /// YES instrument → market, refreshed by the opportunity sweep.
  instruments: RwLock<HashMap<InstrumentId, CandidateMarket>>,
  /// Markets with an arbitrage pair, by close time.
  arbitrage_markets: Mutex<HashMap<String, DateTime<Utc>>>,
  feed: Option<Arc<FeedSupervisor>>,
  metrics: Arc<MetricsRegistry>,
}

impl<R: LedgerRepository, P: PortfolioRepository> MonitorScheduler<R, P> {
  pub fn new(
    config: &AppConfig,
    ledger: Arc<LedgerStore<R>>,
    portfolio: Arc<PortfolioManager<P>>,
    settlement: Arc<SettlementEngine<R, P>>,
    collaborators: Collaborators,
    events: mpsc::Receiver<FeedEvent>,
    metrics: Arc<MetricsRegistry>,
  ) -> Self {
    let (state, _) = watch::channel(SchedulerState::Stopped);
    Self {
      ledger,
      portfolio,
      settlement,
      collaborators,
      positions: PositionManager::new(&config.positions),
      risk: RiskManager::new(&config.betting),
      arbitrage: config.arbitrage.clone(),
      interval: config.scheduler.interval(),
      grace: config.scheduler.grace(),
      max_markets_per_tick: config.scheduler.max_markets_per_tick,
      events: Mutex::new(events),
      state: Arc::new(state),
      tick_lock: Mutex::new(()),
      progress: RwLock::new(Progress::default()),
      instruments: RwLock::new(HashMap::new()),
      arbitrage_markets: Mutex::new(HashMap::new()),
      feed: None,
      metrics,
    }
  }

  /// Keep `feed`'s subscription in line with the watched instruments.
  #[must_use]
  pub fn with_feed(mut self, feed: Arc<FeedSupervisor>) -> Self {
    self.feed = Some(feed);
    self
  }

  pub fn state(&self) -> SchedulerState {
    *self.state.borrow()
  }

  /// Spawn the loop unless one is already running.
  pub fn start(self: &Arc<Self>) -> StartOutcome {
    let claimed = self.state.send_if_modified(|state| {
      if *state == SchedulerState::Stopped {
        *state = SchedulerState::Running;
        true
      } else {
        false
      }
    });
    if !claimed {
      warn!(state = ?self.state(), "Scheduler already running");
      return StartOutcome::AlreadyRunning;
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let this = Arc::clone(self);
    let join = tokio::spawn(async move {
      this.run(shutdown_rx).await;
    });

    info!(interval_secs = self.interval.as_secs(), "Scheduler started");
    StartOutcome::Started(SchedulerHandle {
      shutdown_tx,
      join,
      state: Arc::clone(&self.state),
    })
  }

  #[instrument(skip_all, name = "scheduler_loop")]
  async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(self.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut events = self.events.lock().await;

    loop {
      tokio::select! {
        biased;
        _ = shutdown_rx.recv() => {
          info!("Shutdown signal in scheduler");
          break;
        }
        _ = ticker.tick() => {
          self.tick().await;
        }
        Some(event) = events.recv() => {
          self.handle_feed_event(event).await;
        }
      }
    }
  }

  /// Run one full tick now. Ticks never overlap.
  #[instrument(skip(self))]
  pub async fn tick(&self) -> TickReport {
    let _guard = self.tick_lock.lock().await;
    let started = Instant::now();
    let now = Utc::now();
    let mut report = TickReport {
      started_at: Some(now),
      ..TickReport::default()
    };

    let active = self.ledger.list_active().await;
    let history = self.ledger.list_history().await;
    match self.portfolio.reconcile(&active, &history).await {
      Ok(outcome) => report.reconciled = !outcome.is_clean(),
      Err(e) => report.record_error("reconcile", e),
    }

    if let Err(e) = self.run_sweeps(now, &mut report).await {
      error!(error = %e, "Ledger unavailable, ending tick early");
      report.aborted = Some(e.to_string());
    }

    self.sync_feed().await;

    report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    self.metrics.tick_duration.observe(started.elapsed().as_secs_f64());
    self.refresh_gauges().await;

    info!(
      settled = report.settled,
      deferred = report.deferred,
      exited = report.exited,
      opened = report.opened,
      skipped = report.skipped,
      errors = report.errors.len(),
      duration_ms = report.duration_ms,
      "Tick complete"
    );

    let mut progress = self.progress.write().await;
    progress.ticks += 1;
    progress.last_sweep_error = report.last_error();
    progress.last_tick = Some(report.clone());
    report
  }

  /// Run the settlement sweep alone, outside the cadence.
  #[instrument(skip(self))]
  pub async fn settle_now(&self) -> TickReport {
    let _guard = self.tick_lock.lock().await;
    let started = Instant::now();
    let now = Utc::now();
    let mut report = TickReport {
      started_at: Some(now),
      ..TickReport::default()
    };

    if let Err(e) = self.settlement_sweep(now, &mut report).await {
      error!(error = %e, "Ledger unavailable, settlement pass ended early");
      report.aborted = Some(e.to_string());
    }
    report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    self.refresh_gauges().await;

    info!(
      settled = report.settled,
      deferred = report.deferred,
      errors = report.errors.len(),
      "Manual settlement pass complete"
    );
    if let Some(error) = report.last_error() {
      self.progress.write().await.last_sweep_error = Some(error);
    }
    report
  }

  /// Point a running feed at the currently watched instruments.
  async fn sync_feed(&self) {
    let Some(feed) = &self.feed else {
      return;
    };
    let watched = self.watched_instruments().await;
    if watched.is_empty() {
      return;
    }
    let count = watched.len();
    if feed.resubscribe(watched).await {
      info!(instruments = count, "Feed subscription updated");
    }
  }

  async fn run_sweeps(&self, now: DateTime<Utc>, report: &mut TickReport) -> Result<(), LedgerError> {
    self.settlement_sweep(now, report).await?;
    self.position_sweep(now, report).await?;
    self.opportunity_sweep(now, report).await
  }

  async fn settlement_sweep(&self, now: DateTime<Utc>, report: &mut TickReport) -> Result<(), LedgerError> {
    for bet in self.ledger.due_for_settlement(now).await {
      match self.settlement.settle_due(&bet, now).await {
        Ok(outcome) => self.count_outcome(&outcome, report),
        Err(SettlementError::Unresolvable(_)) => {
          report.deferred += 1;
          self.metrics.settlements_deferred.inc();
        }
        Err(SettlementError::Ledger(e @ LedgerError::Unavailable(_))) => return Err(e),
        Err(e) => self.sweep_failed("settlement", &bet, &e, report),
      }
    }
    Ok(())
  }

  async fn position_sweep(&self, now: DateTime<Utc>, report: &mut TickReport) -> Result<(), LedgerError> {
    if !self.positions.is_enabled() {
      return Ok(());
    }

    for bet in self.ledger.list_active().await {
      if bet.is_due(now) {
        continue;
      }
      let Some(price) = self.current_price(&bet).await else {
        continue;
      };
      if let PositionAction::Exit(reason) = self.positions.evaluate(&bet, price) {
        match self.settlement.exit_early(&bet, price, reason, now).await {
          Ok(outcome) => self.count_outcome(&outcome, report),
          Err(SettlementError::Ledger(e @ LedgerError::Unavailable(_))) => return Err(e),
          Err(e) => self.sweep_failed("position", &bet, &e, report),
        }
      }
    }
    Ok(())
  }

  /// Price of the bet's side: feed first, then the REST quote.
  async fn current_price(&self, bet: &Bet) -> Option<Decimal> {
    if let (Some(live), Some(instrument)) = (&self.collaborators.live_prices, &bet.instrument_id) {
      if let Some(sample) = live.latest(instrument).await {
        let price = sample.prices().side(bet.outcome_side);
        if price > Decimal::ZERO {
          return Some(price);
        }
      }
    }

    match self.collaborators.discovery.get_outcome_prices(&bet.market_id).await {
      Ok(prices) if !prices.is_unavailable() => {
        Some(prices.side(bet.outcome_side)).filter(|p| *p > Decimal::ZERO)
      }
      Ok(_) => None,
      Err(e) => {
        debug!(bet_id = %bet.bet_id, error = %e, "No quote for open bet");
        None
      }
    }
  }

  async fn opportunity_sweep(&self, now: DateTime<Utc>, report: &mut TickReport) -> Result<(), LedgerError> {
    let candidates = match self.collaborators.discovery.list_candidate_markets().await {
      Ok(candidates) => candidates,
      Err(e) => {
        warn!(error = %e, "Market discovery failed");
        self.metrics.sweep_errors.with_label_values(&["opportunity"]).inc();
        report.record_error("opportunity", format!("{e:#}"));
        return Ok(());
      }
    };

    {
      let mut instruments = self.instruments.write().await;
      for market in &candidates {
        if let Some(token) = &market.yes_token {
          instruments.insert(token.clone(), market.clone());
        }
      }
      instruments.retain(|_, m| m.close_at > now);
    }
    self.arbitrage_markets.lock().await.retain(|_, close_at| *close_at > now);

    let mut eligible = Vec::new();
    for market in candidates {
      if eligible.len() >= self.max_markets_per_tick {
        break;
      }
      if market.strike.is_none() || market.close_at <= now {
        report.skipped += 1;
        continue;
      }
      if self.ledger.has_active_for_market(&market.market_id).await {
        continue;
      }
      eligible.push(market);
    }

    for market in eligible {
      match self.consider(&market, now).await? {
        Some(_) => report.opened += 1,
        None => report.skipped += 1,
      }
    }
    Ok(())
  }

  /// Evaluate one candidate; `Some` when a bet was opened.
  async fn consider(&self, market: &CandidateMarket, now: DateTime<Utc>) -> Result<Option<Bet>, LedgerError> {
    let Some(strike) = market.strike else {
      return Ok(None);
    };

    let prices = match self.collaborators.discovery.get_outcome_prices(&market.market_id).await {
      Ok(prices) if !prices.is_unavailable() => prices,
      Ok(_) => {
        debug!(market_id = %market.market_id, "No outcome prices, skipping");
        return Ok(None);
      }
      Err(e) => {
        warn!(market_id = %market.market_id, error = %e, "Quote lookup failed, skipping");
        return Ok(None);
      }
    };

    let indicators = match self.collaborators.indicators.snapshot(market).await {
      Ok(snapshot) => snapshot,
      Err(e) => {
        debug!(reason = %e, "Skipping market");
        return Ok(None);
      }
    };

    let Decision::Bet { side, confidence } =
      self.collaborators.strategy.decide(&market.market_id, &indicators, &prices)
    else {
      return Ok(None);
    };

    let entry_price = prices.side(side);
    let cash = self.portfolio.cash_balance().await;
    let history = self.ledger.list_history().await;
    let initial_balance = self.portfolio.summary().await.initial_balance;
    let open = self.ledger.active_count().await;
    let checked = self
      .risk
      .check_confidence(confidence)
      .and_then(|()| self.risk.check_entry_price(entry_price))
      .and_then(|()| self.risk.check_limits(open, &history, initial_balance, now))
      .and_then(|()| self.risk.strategy_stake(cash));
    let stake = match checked {
      Ok(stake) => stake,
      Err(rejection) => {
        debug!(market_id = %market.market_id, reason = %rejection, "Bet rejected by risk limits");
        return Ok(None);
      }
    };

    info!(
      market_id = %market.market_id,
      strategy = self.collaborators.strategy.name(),
      side = %side,
      confidence,
      entry_price = %entry_price,
      "Strategy signal accepted"
    );

    self
      .place(
        BetRequest {
          market_id: market.market_id.clone(),
          question: market.question.clone(),
          underlying: market.underlying.clone(),
          instrument_id: market.yes_token.clone(),
          side,
          strike,
          stake,
          entry_price,
          market_close_at: market.close_at,
          origin: BetOrigin::Strategy,
        },
        now,
      )
      .await
  }

  /// Open a bet on request, outside the strategy. Subject to cash and the
  /// open-bet and daily-loss limits; the entry price is the current quote.
  #[instrument(skip(self))]
  pub async fn place_manual(
    &self,
    market_id: &str,
    side: OutcomeSide,
    stake: Decimal,
  ) -> Result<Bet, PlacementError> {
    if stake <= Decimal::ZERO {
      return Err(PlacementError::InvalidStake(stake));
    }
    let _guard = self.tick_lock.lock().await;
    let now = Utc::now();

    let market = self.find_market(market_id).await?;
    let strike = market
      .strike
      .ok_or_else(|| PlacementError::NoStrike(market_id.to_string()))?;
    if market.close_at <= now {
      return Err(PlacementError::Closed(market_id.to_string()));
    }

    let prices = match self.collaborators.discovery.get_outcome_prices(market_id).await {
      Ok(prices) if !prices.is_unavailable() => prices,
      Ok(_) => return Err(PlacementError::NoQuote(market_id.to_string())),
      Err(e) => {
        warn!(market_id, error = %e, "Quote lookup failed");
        return Err(PlacementError::NoQuote(market_id.to_string()));
      }
    };

    let cash = self.portfolio.cash_balance().await;
    if stake > cash {
      return Err(PlacementError::InsufficientCash { stake, cash });
    }
    let history = self.ledger.list_history().await;
    let initial_balance = self.portfolio.summary().await.initial_balance;
    let open = self.ledger.active_count().await;
    self.risk.check_limits(open, &history, initial_balance, now)?;

    let request = BetRequest {
      market_id: market.market_id.clone(),
      question: market.question.clone(),
      underlying: market.underlying.clone(),
      instrument_id: market.yes_token.clone(),
      side,
      strike,
      stake,
      entry_price: prices.side(side),
      market_close_at: market.close_at,
      origin: BetOrigin::Manual,
    };
    self
      .place(request, now)
      .await?
      .ok_or_else(|| PlacementError::NotOpened(market_id.to_string()))
  }

  /// Known market by id, falling back to a fresh discovery scan.
  async fn find_market(&self, market_id: &str) -> Result<CandidateMarket, PlacementError> {
    let known = self
      .instruments
      .read()
      .await
      .values()
      .find(|m| m.market_id == market_id)
      .cloned();
    if let Some(market) = known {
      return Ok(market);
    }

    let candidates = self
      .collaborators
      .discovery
      .list_candidate_markets()
      .await
      .map_err(|e| {
        warn!(error = %e, "Market discovery failed");
        PlacementError::UnknownMarket(market_id.to_string())
      })?;
    candidates
      .into_iter()
      .find(|m| m.market_id == market_id)
      .ok_or_else(|| PlacementError::UnknownMarket(market_id.to_string()))
  }

  /// Record then debit. A failed debit voids the recorded bet.
  async fn place(&self, request: BetRequest, now: DateTime<Utc>) -> Result<Option<Bet>, LedgerError> {
    let bet = match Bet::open(request, now, self.grace) {
      Ok(bet) => bet,
      Err(e) => {
        warn!(error = %e, "Invalid bet, not opened");
        return Ok(None);
      }
    };

    match self.ledger.add(bet.clone()).await {
      Ok(()) => {}
      Err(e @ LedgerError::Unavailable(_)) => return Err(e),
      Err(e) => {
        warn!(bet_id = %bet.bet_id, error = %e, "Bet not recorded");
        return Ok(None);
      }
    }

    if let Err(e) = self.portfolio.open(&bet).await {
      error!(bet_id = %bet.bet_id, error = %e, "Stake debit failed, voiding bet");
      match self.ledger.void(&bet.bet_id, now).await {
        Ok(_) => {
          self.metrics.bets_settled.with_label_values(&[ExitReason::Void.as_str()]).inc();
        }
        Err(e @ LedgerError::Unavailable(_)) => return Err(e),
        Err(e) => warn!(bet_id = %bet.bet_id, error = %e, "Void failed"),
      }
      return Ok(None);
    }

    self
      .metrics
      .bets_opened
      .with_label_values(&[&bet.outcome_side.to_string(), &bet.origin.to_string()])
      .inc();
    info!(
      bet_id = %bet.bet_id,
      market_id = %bet.market_id,
      side = %bet.outcome_side,
      stake = %bet.stake,
      entry_price = %bet.entry_price,
      deadline = %bet.settlement_deadline,
      origin = %bet.origin,
      "Bet opened"
    );
    Ok(Some(bet))
  }

  /// React to one streamed event: fast exits on prices, pair bets on arbitrage.
  pub async fn handle_feed_event(&self, event: FeedEvent) {
    match event {
      FeedEvent::Price(sample) => self.fast_exit(&sample).await,
      FeedEvent::Arbitrage(signal) => self.on_arbitrage(signal).await,
    }
  }

  /// Take-profit / stop-loss on the streamed price, no REST call.
  async fn fast_exit(&self, sample: &PriceSample) {
    if !self.positions.is_enabled() {
      return;
    }
    let now = Utc::now();

    for bet in self.ledger.list_active().await {
      if bet.instrument_id.as_deref() != Some(sample.instrument_id.as_str()) || bet.is_due(now) {
        continue;
      }
      let price = sample.prices().side(bet.outcome_side);
      let PositionAction::Exit(reason) = self.positions.evaluate(&bet, price) else {
        continue;
      };
      match self.settlement.exit_early(&bet, price, reason, now).await {
        Ok(SettleOutcome::Settled(settled)) => {
          self.metrics.bets_settled.with_label_values(&[settled.exit_reason.as_str()]).inc();
        }
        Ok(SettleOutcome::AlreadySettled) => {}
        Err(e) => {
          warn!(bet_id = %bet.bet_id, error = %e, "Fast exit failed");
          self.metrics.sweep_errors.with_label_values(&["fast_exit"]).inc();
          self.progress.write().await.last_sweep_error = Some(format!("fast_exit: {e}"));
        }
      }
    }
  }

  async fn on_arbitrage(&self, signal: ArbitrageSignal) {
    {
      let mut progress = self.progress.write().await;
      progress.arbitrage_signals += 1;
      progress.last_arbitrage = Some(signal.clone());
    }

    if !self.arbitrage.auto_execute || signal.margin < self.arbitrage.min_margin {
      return;
    }

    let Some(market) = self.instruments.read().await.get(&signal.instrument_id).cloned() else {
      debug!(instrument = %signal.instrument_id, "Arbitrage on unmapped instrument");
      return;
    };

    let mut traded = self.arbitrage_markets.lock().await;
    if traded.contains_key(&market.market_id) {
      return;
    }
    match self.open_pair(&market, &signal).await {
      Ok(true) => {
        traded.insert(market.market_id.clone(), market.close_at);
      }
      Ok(false) => {}
      Err(e) => {
        error!(market_id = %market.market_id, error = %e, "Arbitrage pair failed");
        self.progress.write().await.last_sweep_error = Some(format!("arbitrage: {e}"));
      }
    }
  }

  /// Paired YES and NO bets at the streamed mids; `true` once both legs are open.
  async fn open_pair(&self, market: &CandidateMarket, signal: &ArbitrageSignal) -> Result<bool, LedgerError> {
    let now = Utc::now();
    let Some(strike) = market.strike else {
      debug!(market_id = %market.market_id, "Arbitrage market has no strike yet");
      return Ok(false);
    };

    let history = self.ledger.list_history().await;
    let initial_balance = self.portfolio.summary().await.initial_balance;
    let open = self.ledger.active_count().await;
    let cash = self.portfolio.cash_balance().await;
    let stake = self
      .risk
      .check_limits(open + 1, &history, initial_balance, now)
      .and_then(|()| self.risk.stake_from(cash, self.arbitrage.stake_fraction / Decimal::TWO));
    let stake = match stake {
      Ok(stake) => stake,
      Err(rejection) => {
        info!(market_id = %market.market_id, reason = %rejection, "Arbitrage not traded");
        return Ok(false);
      }
    };

    let leg = |side: OutcomeSide, price: Decimal| BetRequest {
      market_id: market.market_id.clone(),
      question: market.question.clone(),
      underlying: market.underlying.clone(),
      instrument_id: Some(signal.instrument_id.clone()),
      side,
      strike,
      stake,
      entry_price: price,
      market_close_at: market.close_at,
      origin: BetOrigin::Arbitrage,
    };

    let Some(first) = self.place(leg(OutcomeSide::Yes, signal.yes_mid), now).await? else {
      return Ok(false);
    };
    let second = match self.place(leg(OutcomeSide::No, signal.no_mid), now).await {
      Ok(second) => second,
      Err(e) => {
        warn!(bet_id = %first.bet_id, error = %e, "Second arbitrage leg failed, voiding first");
        let _ = self.settlement.void(&first, now).await;
        return Err(e);
      }
    };
    if second.is_none() {
      warn!(bet_id = %first.bet_id, "Second arbitrage leg failed, voiding first");
      if let Err(SettlementError::Ledger(e)) = self.settlement.void(&first, now).await {
        return Err(e);
      }
      return Ok(false);
    }

    info!(
      market_id = %market.market_id,
      margin = %signal.margin,
      stake_per_leg = %stake,
      "Arbitrage pair opened"
    );
    Ok(true)
  }

  fn count_outcome(&self, outcome: &SettleOutcome, report: &mut TickReport) {
    if let SettleOutcome::Settled(settled) = outcome {
      self.metrics.bets_settled.with_label_values(&[settled.exit_reason.as_str()]).inc();
      if settled.exit_reason == ExitReason::Expiry {
        report.settled += 1;
      } else {
        report.exited += 1;
      }
    }
  }

  fn sweep_failed(&self, sweep: &str, bet: &Bet, error: &SettlementError, report: &mut TickReport) {
    warn!(sweep, bet_id = %bet.bet_id, error = %error, "Sweep item failed");
    self.metrics.sweep_errors.with_label_values(&[sweep]).inc();
    report.record_error(sweep, format!("{}: {error}", bet.bet_id));
  }

  async fn refresh_gauges(&self) {
    let active = self.ledger.active_count().await;
    self.metrics.active_bets.set(i64::try_from(active).unwrap_or(i64::MAX));
    let cash = self.portfolio.cash_balance().await;
    self.metrics.cash_balance.set(cash.to_f64().unwrap_or_default());
  }

  pub async fn status(&self) -> SchedulerStatus {
    let progress = self.progress.read().await;
    SchedulerStatus {
      state: self.state(),
      ticks: progress.ticks,
      last_tick: progress.last_tick.clone(),
      last_sweep_error: progress.last_sweep_error.clone(),
      arbitrage_signals: progress.arbitrage_signals,
      last_arbitrage: progress.last_arbitrage.clone(),
      arbitrage_markets_traded: self.arbitrage_markets.lock().await.len(),
    }
  }

  /// Instruments worth streaming: YES tokens of active bets and known markets.
  pub async fn watched_instruments(&self) -> Vec<InstrumentId> {
    let mut ids: Vec<InstrumentId> = self
      .ledger
      .list_active()
      .await
      .into_iter()
      .filter_map(|b| b.instrument_id)
      .collect();
    ids.extend(self.instruments.read().await.keys().cloned());
    ids.sort();
    ids.dedup();
    ids
  }
}
