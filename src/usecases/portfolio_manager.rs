//! Portfolio Manager Use Case - Paper Balance Tracking
//!
//! Owns the shared paper portfolio (cash, open exposure, applied
//! settlements). Every update is one mutate-persist-commit step under a
//! single async mutex: the change is applied to a working copy, persisted,
//! and only then becomes visible.
//!
//! `reconcile` brings the portfolio back in line with the ledger after a
//! crash or a failed balance write. It runs at startup and at the start
//! of every scheduler tick.

use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use crate::domain::{Bet, ExitReason, Portfolio, PortfolioSummary, SettledBet};
use crate::error::PersistenceError;
use crate::ports::repository::PortfolioRepository;

/// What a reconciliation pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
  /// Active bets whose stake had not been debited.
  pub debited: usize,
  /// History entries whose payout had not been applied.
  pub settled: usize,
  /// Exposure entries with no ledger record, released back to cash.
  pub released: usize,
}

impl ReconcileReport {
  pub const fn is_clean(&self) -> bool {
    self.debited == 0 && self.settled == 0 && self.released == 0
  }
}

/// Manages the paper portfolio and its durable copy.
pub struct PortfolioManager<P: PortfolioRepository> {
  repo: Arc<P>,
  portfolio: Mutex<Portfolio>,
}

impl<P: PortfolioRepository> PortfolioManager<P> {
  /// Load the persisted portfolio, or start one at `initial_balance`.
  #[instrument(skip(repo))]
  pub async fn load(repo: Arc<P>, initial_balance: Decimal) -> Result<Self, PersistenceError> {
    let portfolio = match repo.load_portfolio().await? {
      Some(portfolio) => {
        info!(
          cash = %portfolio.cash_balance,
          open = portfolio.open_exposure.len(),
          "Portfolio loaded"
        );
        portfolio
      }
      None => {
        let portfolio = Portfolio::new(initial_balance);
        repo.save_portfolio(&portfolio).await?;
        info!(initial_balance = %initial_balance, "Portfolio initialized");
        portfolio
      }
    };

    Ok(Self {
      repo,
      portfolio: Mutex::new(portfolio),
    })
  }

  async fn update<F>(&self, apply: F) -> Result<bool, PersistenceError>
  where
    F: FnOnce(&mut Portfolio) -> bool,
  {
    let mut guard = self.portfolio.lock().await;
    let mut working = guard.clone();
    if !apply(&mut working) {
      return Ok(false);
    }
    self.repo.save_portfolio(&working).await?;
    *guard = working;
    Ok(true)
  }

  /// Debit the stake of a newly recorded bet.
  ///
  /// `Ok(false)` when it was already debited.
  pub async fn open(&self, bet: &Bet) -> Result<bool, PersistenceError> {
    self.update(|p| p.apply_open(bet)).await
  }

  /// Credit a settled bet's payout, at most once per bet id.
  pub async fn apply_settlement(&self, settled: &SettledBet) -> Result<bool, PersistenceError> {
    self.update(|p| p.apply_settlement(settled)).await
  }

  pub async fn snapshot(&self) -> Portfolio {
    self.portfolio.lock().await.clone()
  }

  pub async fn summary(&self) -> PortfolioSummary {
    self.portfolio.lock().await.summary()
  }

  pub async fn cash_balance(&self) -> Decimal {
    self.portfolio.lock().await.cash_balance
  }

  /// Align the portfolio with the ledger tables.
  ///
  /// The ledger is authoritative: an active bet is debited if it was
  /// not, a history entry is applied if it was not, and exposure with no
  /// ledger record is released.
  #[instrument(skip_all, fields(active = active.len(), history = history.len()))]
  pub async fn reconcile(
    &self,
    active: &[Bet],
    history: &[SettledBet],
  ) -> Result<ReconcileReport, PersistenceError> {
    let mut report = ReconcileReport::default();
    let mut guard = self.portfolio.lock().await;
    let mut working = guard.clone();

    for bet in active {
      if working.apply_open(bet) {
        warn!(bet_id = %bet.bet_id, stake = %bet.stake, "Reconciled missing stake debit");
        report.debited += 1;
      }
    }

    for settled in history {
      if working.applied_settlements.contains(settled.bet_id()) {
        continue;
      }
      if settled.exit_reason != ExitReason::Void
        && !working.open_exposure.contains_key(settled.bet_id())
      {
        working.apply_open(&settled.bet);
      }
      if working.apply_settlement(settled) {
        warn!(
          bet_id = %settled.bet_id(),
          pnl = %settled.realized_pnl,
          "Reconciled missing settlement credit"
        );
        report.settled += 1;
      }
    }

    let known: HashSet<&str> = active
      .iter()
      .map(|b| b.bet_id.as_str())
      .chain(history.iter().map(SettledBet::bet_id))
      .collect();
    let orphans: Vec<String> = working
      .open_exposure
      .keys()
      .filter(|id| !known.contains(id.as_str()))
      .cloned()
      .collect();
    for bet_id in orphans {
      if let Some(stake) = working.open_exposure.remove(&bet_id) {
        error!(bet_id = %bet_id, stake = %stake, "Releasing exposure with no ledger record");
        working.cash_balance += stake;
        report.released += 1;
      }
    }

    if report.is_clean() {
      return Ok(report);
    }

    working.updated_at = chrono::Utc::now();
    self.repo.save_portfolio(&working).await?;
    *guard = working;
    info!(
      debited = report.debited,
      settled = report.settled,
      released = report.released,
      "Portfolio reconciled against ledger"
    );
    Ok(report)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::adapters::persistence::JsonFileRepository;
  use crate::domain::{BetOrigin, BetRequest, OutcomeSide};
  use chrono::{Duration, Utc};
  use rust_decimal_macros::dec;

  fn bet() -> Bet {
    let now = Utc::now();
    Bet::open(
      BetRequest {
        market_id: "m1".to_string(),
        question: "ETH up?".to_string(),
        underlying: "ETHUSDT".to_string(),
        instrument_id: None,
        side: OutcomeSide::Yes,
        strike: dec!(3000),
        stake: dec!(100),
        entry_price: dec!(0.60),
        market_close_at: now + Duration::minutes(15),
        origin: BetOrigin::Strategy,
      },
      now,
      Duration::minutes(5),
    )
    .unwrap()
  }

  async fn manager(dir: &tempfile::TempDir) -> PortfolioManager<JsonFileRepository> {
    let repo = Arc::new(JsonFileRepository::from_data_dir(dir.path()).await.unwrap());
    PortfolioManager::load(repo, dec!(1000)).await.unwrap()
  }

  #[tokio::test]
  async fn test_open_and_settle_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let pm = manager(&dir).await;
    let b = bet();

    assert!(pm.open(&b).await.unwrap());
    assert!(!pm.open(&b).await.unwrap());
    assert_eq!(pm.cash_balance().await, dec!(900));

    let settled = b.settle_at_expiry(dec!(3100), "oracle_at_close", Utc::now());
    assert!(pm.apply_settlement(&settled).await.unwrap());
    assert!(!pm.apply_settlement(&settled).await.unwrap());
    assert_eq!(pm.cash_balance().await, dec!(1066.67));
  }

  #[tokio::test]
  async fn test_reconcile_applies_missing_credit_once() {
    let dir = tempfile::tempdir().unwrap();
    let pm = manager(&dir).await;
    let b = bet();
    pm.open(&b).await.unwrap();

    // Ledger moved the bet but the credit was never applied.
    let settled = b.settle_at_expiry(dec!(2900), "oracle_at_close", Utc::now());
    let report = pm.reconcile(&[], std::slice::from_ref(&settled)).await.unwrap();
    assert_eq!(report.settled, 1);
    assert_eq!(pm.cash_balance().await, dec!(900));

    let again = pm.reconcile(&[], std::slice::from_ref(&settled)).await.unwrap();
    assert!(again.is_clean());
  }

  #[tokio::test]
  async fn test_reconcile_debits_active_and_releases_orphans() {
    let dir = tempfile::tempdir().unwrap();
    let pm = manager(&dir).await;
    let recorded = bet();
    let orphan = bet();
    pm.open(&orphan).await.unwrap();

    let report = pm.reconcile(std::slice::from_ref(&recorded), &[]).await.unwrap();
    assert_eq!(report.debited, 1);
    assert_eq!(report.released, 1);
    assert_eq!(pm.cash_balance().await, dec!(900));
    assert_eq!(pm.summary().await.open_positions, 1);
  }

  #[tokio::test]
  async fn test_reload_keeps_balance() {
    let dir = tempfile::tempdir().unwrap();
    {
      let pm = manager(&dir).await;
      pm.open(&bet()).await.unwrap();
    }
    let pm = manager(&dir).await;
    assert_eq!(pm.cash_balance().await, dec!(900));
  }
}
