//! Risk Manager - Stake Sizing and Opening Limits
//!
//! Enforces betting controls:
//! - Minimum strategy confidence
//! - Entry price inside (0, max_entry_price]
//! - Stake = fraction of cash, capped, with a floor
//! - Maximum number of open bets
//! - Maximum daily realized loss (fraction of initial balance)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::warn;

use crate::config::BettingConfig;
use crate::domain::SettledBet;
use crate::domain::bet::round_cents;

/// Why a new bet was not opened.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskRejection {
  #[error("confidence {confidence:.2} below minimum {min:.2}")]
  LowConfidence { confidence: f64, min: f64 },

  #[error("entry price {price} outside (0, {max}]")]
  EntryPrice { price: Decimal, max: Decimal },

  #[error("stake {stake} below minimum {min}")]
  StakeTooSmall { stake: Decimal, min: Decimal },

  #[error("{open} open bets, limit {max}")]
  TooManyOpenBets { open: usize, max: usize },

  #[error("daily loss {loss} reached limit {limit}")]
  DailyLossLimit { loss: Decimal, limit: Decimal },
}

/// Risk manager enforcing betting limits.
#[derive(Debug, Clone)]
pub struct RiskManager {
  min_confidence: f64,
  stake_fraction: Decimal,
  max_stake: Decimal,
  min_stake: Decimal,
  max_entry_price: Decimal,
  max_open_bets: usize,
  max_daily_loss_fraction: Decimal,
}

impl RiskManager {
  /// Create a new risk manager from config.
  pub fn new(config: &BettingConfig) -> Self {
    Self {
      min_confidence: config.min_confidence,
      stake_fraction: config.stake_fraction,
      max_stake: config.max_stake,
      min_stake: config.min_stake,
      max_entry_price: config.max_entry_price,
      max_open_bets: config.max_open_bets,
      max_daily_loss_fraction: config.max_daily_loss_fraction,
    }
  }

  pub fn check_confidence(&self, confidence: f64) -> Result<(), RiskRejection> {
    if confidence < self.min_confidence {
      return Err(RiskRejection::LowConfidence {
        confidence,
        min: self.min_confidence,
      });
    }
    Ok(())
  }

  pub fn check_entry_price(&self, price: Decimal) -> Result<(), RiskRejection> {
    if price <= Decimal::ZERO || price > self.max_entry_price {
      return Err(RiskRejection::EntryPrice {
        price,
        max: self.max_entry_price,
      });
    }
    Ok(())
  }

  /// Stake for a strategy bet: `min(max_stake, cash × stake_fraction)`.
  pub fn strategy_stake(&self, cash: Decimal) -> Result<Decimal, RiskRejection> {
    self.stake_from(cash, self.stake_fraction)
  }

  /// Stake from an explicit fraction of cash, same cap and floor.
  pub fn stake_from(&self, cash: Decimal, fraction: Decimal) -> Result<Decimal, RiskRejection> {
    let stake = round_cents((cash * fraction).min(self.max_stake));
    if stake < self.min_stake || stake > cash {
      return Err(RiskRejection::StakeTooSmall {
        stake,
        min: self.min_stake,
      });
    }
    Ok(stake)
  }

  /// Limits that depend on the current book rather than the bet.
  pub fn check_limits(
    &self,
    open_bets: usize,
    history: &[SettledBet],
    initial_balance: Decimal,
    now: DateTime<Utc>,
  ) -> Result<(), RiskRejection> {
    if open_bets >= self.max_open_bets {
      return Err(RiskRejection::TooManyOpenBets {
        open: open_bets,
        max: self.max_open_bets,
      });
    }

    let loss = daily_loss(history, now);
    let limit = round_cents(initial_balance * self.max_daily_loss_fraction);
    if loss >= limit {
      warn!(loss = %loss, limit = %limit, "Daily loss limit reached");
      return Err(RiskRejection::DailyLossLimit { loss, limit });
    }
    Ok(())
  }
}

/// Net realized loss of bets settled on `now`'s UTC day; zero when net positive.
pub fn daily_loss(history: &[SettledBet], now: DateTime<Utc>) -> Decimal {
  let today = now.date_naive();
  let net: Decimal = history
    .iter()
    .filter(|s| s.settled_at.date_naive() == today)
    .map(|s| s.realized_pnl)
    .sum();
  (-net).max(Decimal::ZERO)
}
