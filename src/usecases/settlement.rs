//! Settlement Use Case - Resolution and Terminal Transitions
//!
//! Resolves bets at market close and commits every terminal transition
//! (expiry, take-profit, stop-loss) through one path.
//!
//! Settlement flow:
//! 1. Ask each resolution tier, in order, for the underlying's price at close
//! 2. No tier hit → `StaleData`, deferred to the next tick, never guessed
//! 3. Move the bet to history in the ledger
//! 4. Only after that succeeds, credit the payout to the portfolio
//!
//! A failure between 3 and 4 leaves the credit to portfolio reconciliation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::{error, info, instrument, warn};

use super::ledger_store::LedgerStore;
use super::portfolio_manager::PortfolioManager;
use crate::domain::{Bet, ExitReason, SettledBet};
use crate::error::{LedgerError, ResolutionError, SettlementError};
use crate::ports::outcome_source::{OutcomeSample, OutcomeSource};
use crate::ports::repository::{LedgerRepository, PortfolioRepository};

/// One named way of finding the price at close.
#[async_trait]
pub trait ResolutionTier: Send + Sync {
  fn name(&self) -> &'static str;

  /// The outcome sample, or the reason this tier missed.
  async fn lookup(&self, underlying: &str, close_at: DateTime<Utc>) -> Result<OutcomeSample, String>;
}

/// Latest sample at or before close, no older than `staleness` before it.
pub struct OracleAtClose {
  source: Arc<dyn OutcomeSource>,
  staleness: Duration,
}

impl OracleAtClose {
  pub fn new(source: Arc<dyn OutcomeSource>, staleness: Duration) -> Self {
    Self { source, staleness }
  }
}

#[async_trait]
impl ResolutionTier for OracleAtClose {
  fn name(&self) -> &'static str {
    "oracle_at_close"
  }

  async fn lookup(&self, underlying: &str, close_at: DateTime<Utc>) -> Result<OutcomeSample, String> {
    let sample = self
      .source
      .sample_at_or_before(underlying, close_at)
      .await
      .map_err(|e| format!("source error: {e:#}"))?
      .ok_or_else(|| "no sample at or before close".to_string())?;

    let age = close_at - sample.observed_at;
    if age > self.staleness {
      return Err(format!("sample {}s before close", age.num_seconds()));
    }
    usable(sample)
  }
}

/// Most recent sample, accepted when within `staleness` of close.
pub struct RecentWithinStaleness {
  source: Arc<dyn OutcomeSource>,
  staleness: Duration,
}

impl RecentWithinStaleness {
  pub fn new(source: Arc<dyn OutcomeSource>, staleness: Duration) -> Self {
    Self { source, staleness }
  }
}

#[async_trait]
impl ResolutionTier for RecentWithinStaleness {
  fn name(&self) -> &'static str {
    "recent_within_staleness"
  }

  async fn lookup(&self, underlying: &str, close_at: DateTime<Utc>) -> Result<OutcomeSample, String> {
    let sample = self
      .source
      .latest_sample(underlying)
      .await
      .map_err(|e| format!("source error: {e:#}"))?
      .ok_or_else(|| "no recent sample".to_string())?;

    let distance = if sample.observed_at >= close_at {
      sample.observed_at - close_at
    } else {
      close_at - sample.observed_at
    };
    if distance > self.staleness {
      return Err(format!("latest sample {}s from close", distance.num_seconds()));
    }
    usable(sample)
  }
}

fn usable(sample: OutcomeSample) -> Result<OutcomeSample, String> {
  if sample.price > Decimal::ZERO {
    Ok(sample)
  } else {
    Err(format!("non-positive price {}", sample.price))
  }
}

/// Result of a committed terminal transition.
#[derive(Debug, Clone, PartialEq)]
pub enum SettleOutcome {
  Settled(SettledBet),
  /// Another caller settled the bet first; nothing changed.
  AlreadySettled,
}

/// Resolves bets and commits terminal transitions exactly once.
pub struct SettlementEngine<R: LedgerRepository, P: PortfolioRepository> {
  ledger: Arc<LedgerStore<R>>,
  portfolio: Arc<PortfolioManager<P>>,
  tiers: Vec<Box<dyn ResolutionTier>>,
}

impl<R: LedgerRepository, P: PortfolioRepository> SettlementEngine<R, P> {
  /// Create an engine with the standard tier order.
  pub fn new(
    ledger: Arc<LedgerStore<R>>,
    portfolio: Arc<PortfolioManager<P>>,
    outcomes: Arc<dyn OutcomeSource>,
    staleness: Duration,
  ) -> Self {
    let tiers: Vec<Box<dyn ResolutionTier>> = vec![
      Box::new(OracleAtClose::new(Arc::clone(&outcomes), staleness)),
      Box::new(RecentWithinStaleness::new(outcomes, staleness)),
    ];
    Self::with_tiers(ledger, portfolio, tiers)
  }

  /// Create with a custom tier list, tried in order.
  pub fn with_tiers(
    ledger: Arc<LedgerStore<R>>,
    portfolio: Arc<PortfolioManager<P>>,
    tiers: Vec<Box<dyn ResolutionTier>>,
  ) -> Self {
    Self {
      ledger,
      portfolio,
      tiers,
    }
  }

  /// Compute the settled record for `bet` from the first tier that hits.
  pub async fn resolve(&self, bet: &Bet, now: DateTime<Utc>) -> Result<SettledBet, ResolutionError> {
    let mut misses = Vec::with_capacity(self.tiers.len());

    for tier in &self.tiers {
      match tier.lookup(&bet.underlying, bet.market_close_at).await {
        Ok(sample) => {
          return Ok(bet.settle_at_expiry(sample.price, tier.name(), now));
        }
        Err(reason) => misses.push(format!("{}: {reason}", tier.name())),
      }
    }

    Err(ResolutionError::StaleData {
      underlying: bet.underlying.clone(),
      close_at: bet.market_close_at,
      reasons: misses.join("; "),
    })
  }

  /// Resolve and commit a bet past its settlement deadline.
  #[instrument(skip(self, bet), fields(bet_id = %bet.bet_id))]
  pub async fn settle_due(&self, bet: &Bet, now: DateTime<Utc>) -> Result<SettleOutcome, SettlementError> {
    let settled = match self.resolve(bet, now).await {
      Ok(settled) => settled,
      Err(e) => {
        warn!(error = %e, "Settlement deferred");
        return Err(e.into());
      }
    };
    self.commit(settled).await
  }

  /// Close a bet before expiry at `exit_price`.
  #[instrument(skip(self, bet), fields(bet_id = %bet.bet_id))]
  pub async fn exit_early(
    &self,
    bet: &Bet,
    exit_price: Decimal,
    reason: ExitReason,
    now: DateTime<Utc>,
  ) -> Result<SettleOutcome, SettlementError> {
    self.commit(bet.settle_early(exit_price, reason, now)).await
  }

  /// Cancel an active bet with zero PnL, refunding its stake if debited.
  #[instrument(skip(self, bet), fields(bet_id = %bet.bet_id))]
  pub async fn void(&self, bet: &Bet, now: DateTime<Utc>) -> Result<SettleOutcome, SettlementError> {
    self.commit(bet.void(now)).await
  }

  async fn commit(&self, settled: SettledBet) -> Result<SettleOutcome, SettlementError> {
    match self.ledger.settle(settled.clone()).await {
      Ok(()) => {}
      Err(LedgerError::AlreadySettled(bet_id)) => {
        warn!(bet_id = %bet_id, "Bet already settled, skipping");
        return Ok(SettleOutcome::AlreadySettled);
      }
      Err(e) => return Err(e.into()),
    }

    if let Err(source) = self.portfolio.apply_settlement(&settled).await {
      error!(
        bet_id = %settled.bet_id(),
        error = %source,
        "Ledger settled but balance update failed; left to reconciliation"
      );
      return Err(SettlementError::BalanceDeferred {
        bet_id: settled.bet_id().to_string(),
        source,
      });
    }

    info!(
      bet_id = %settled.bet_id(),
      market_id = %settled.bet.market_id,
      reason = %settled.exit_reason,
      outcome_price = %settled.outcome_price,
      pnl = %settled.realized_pnl,
      won = settled.won,
      "Bet settled"
    );
    Ok(SettleOutcome::Settled(settled))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rust_decimal_macros::dec;

  struct FixedSource {
    at_close: Option<OutcomeSample>,
    latest: Option<OutcomeSample>,
  }

  #[async_trait]
  impl OutcomeSource for FixedSource {
    async fn sample_at_or_before(
      &self,
      _underlying: &str,
      _at: DateTime<Utc>,
    ) -> anyhow::Result<Option<OutcomeSample>> {
      Ok(self.at_close)
    }

    async fn latest_sample(&self, _underlying: &str) -> anyhow::Result<Option<OutcomeSample>> {
      Ok(self.latest)
    }
  }

  fn close() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-01T12:15:00Z").unwrap().with_timezone(&Utc)
  }

  fn sample(price: Decimal, offset_secs: i64) -> Option<OutcomeSample> {
    Some(OutcomeSample {
      price,
      observed_at: close() + Duration::seconds(offset_secs),
    })
  }

  #[tokio::test]
  async fn test_oracle_tier_rejects_stale_sample() {
    let source = Arc::new(FixedSource {
      at_close: sample(dec!(100), -3600),
      latest: None,
    });
    let tier = OracleAtClose::new(source, Duration::seconds(1800));
    assert!(tier.lookup("BTCUSDT", close()).await.is_err());
  }

  #[tokio::test]
  async fn test_recent_tier_accepts_sample_just_after_close() {
    let source = Arc::new(FixedSource {
      at_close: None,
      latest: sample(dec!(101), 60),
    });
    let tier = RecentWithinStaleness::new(source, Duration::seconds(1800));
    assert_eq!(tier.lookup("BTCUSDT", close()).await.unwrap().price, dec!(101));
  }

  #[tokio::test]
  async fn test_recent_tier_rejects_far_sample_and_zero_price() {
    let far = RecentWithinStaleness::new(
      Arc::new(FixedSource {
        at_close: None,
        latest: sample(dec!(101), 7200),
      }),
      Duration::seconds(1800),
    );
    assert!(far.lookup("BTCUSDT", close()).await.is_err());

    let zero = OracleAtClose::new(
      Arc::new(FixedSource {
        at_close: sample(dec!(0), 0),
        latest: None,
      }),
      Duration::seconds(1800),
    );
    assert!(zero.lookup("BTCUSDT", close()).await.is_err());
  }
}
