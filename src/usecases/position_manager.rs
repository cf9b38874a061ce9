//! Position Manager - Take-Profit and Stop-Loss Evaluation
//!
//! Pure evaluation of an open bet against the current price of its side.
//! Exits are executed by the settlement engine, never here.

use rust_decimal::Decimal;

use crate::config::PositionsConfig;
use crate::domain::{Bet, ExitReason};

/// What to do with an open bet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionAction {
  Hold,
  Exit(ExitReason),
}

#[derive(Debug, Clone)]
pub struct PositionManager {
  enabled: bool,
  take_profit_pct: Decimal,
  stop_loss_pct: Decimal,
}

impl PositionManager {
  pub fn new(config: &PositionsConfig) -> Self {
    Self {
      enabled: config.enabled,
      take_profit_pct: config.take_profit_pct,
      stop_loss_pct: config.stop_loss_pct,
    }
  }

  pub const fn is_enabled(&self) -> bool {
    self.enabled
  }

  /// `return = (current − entry) / entry`; exit at `≥ take_profit` or
  /// `≤ −stop_loss`. Non-positive prices carry no information.
  pub fn evaluate(&self, bet: &Bet, current_price: Decimal) -> PositionAction {
    if !self.enabled || !bet.is_active() || current_price <= Decimal::ZERO {
      return PositionAction::Hold;
    }

    let ret = bet.unrealized_return(current_price);
    if ret >= self.take_profit_pct {
      PositionAction::Exit(ExitReason::TakeProfit)
    } else if ret <= -self.stop_loss_pct {
      PositionAction::Exit(ExitReason::StopLoss)
    } else {
      PositionAction::Hold
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{BetOrigin, BetRequest, OutcomeSide};
  use chrono::{Duration, Utc};
  use rust_decimal_macros::dec;

  fn manager(enabled: bool) -> PositionManager {
    PositionManager::new(&PositionsConfig {
      enabled,
      take_profit_pct: dec!(0.5),
      stop_loss_pct: dec!(0.4),
    })
  }

  fn bet_at(entry: Decimal) -> Bet {
    let now = Utc::now();
    Bet::open(
      BetRequest {
        market_id: "m".to_string(),
        question: String::new(),
        underlying: "SOLUSDT".to_string(),
        instrument_id: Some("tok".to_string()),
        side: OutcomeSide::No,
        strike: dec!(150),
        stake: dec!(20),
        entry_price: entry,
        market_close_at: now + Duration::minutes(15),
        origin: BetOrigin::Strategy,
      },
      now,
      Duration::minutes(5),
    )
    .unwrap()
  }

  #[test]
  fn test_thresholds_are_inclusive() {
    let pm = manager(true);
    let bet = bet_at(dec!(0.40));
    assert_eq!(pm.evaluate(&bet, dec!(0.60)), PositionAction::Exit(ExitReason::TakeProfit));
    assert_eq!(pm.evaluate(&bet, dec!(0.24)), PositionAction::Exit(ExitReason::StopLoss));
    assert_eq!(pm.evaluate(&bet, dec!(0.45)), PositionAction::Hold);
  }

  #[test]
  fn test_disabled_or_unpriced_holds() {
    let bet = bet_at(dec!(0.40));
    assert_eq!(manager(false).evaluate(&bet, dec!(0.99)), PositionAction::Hold);
    assert_eq!(manager(true).evaluate(&bet, dec!(0)), PositionAction::Hold);
  }
}
