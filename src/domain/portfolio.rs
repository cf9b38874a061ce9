//! Paper portfolio value.
//!
//! Cash is debited once when a bet opens and credited once when it
//! settles. Both steps are keyed by `bet_id`, so replaying either one is a
//! no-op; this is what lets reconciliation repair a crash between the
//! ledger transition and the balance update.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::bet::{Bet, BetId, ExitReason, SettledBet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub initial_balance: Decimal,
    pub cash_balance: Decimal,
    #[serde(default)]
    pub realized_pnl: Decimal,
    /// Open exposure per position (bet id → stake).
    #[serde(default)]
    pub open_exposure: BTreeMap<BetId, Decimal>,
    /// Bets whose settlement already moved cash.
    #[serde(default)]
    pub applied_settlements: BTreeSet<BetId>,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub losses: u32,
    pub updated_at: DateTime<Utc>,
}

impl Portfolio {
    pub fn new(initial_balance: Decimal) -> Self {
        Self {
            initial_balance,
            cash_balance: initial_balance,
            realized_pnl: Decimal::ZERO,
            open_exposure: BTreeMap::new(),
            applied_settlements: BTreeSet::new(),
            wins: 0,
            losses: 0,
            updated_at: Utc::now(),
        }
    }

    /// Debit the stake for a newly opened bet.
    ///
    /// Returns `false` when this bet was already debited or settled.
    pub fn apply_open(&mut self, bet: &Bet) -> bool {
        if self.open_exposure.contains_key(&bet.bet_id)
            || self.applied_settlements.contains(&bet.bet_id)
        {
            return false;
        }
        self.cash_balance -= bet.stake;
        self.open_exposure.insert(bet.bet_id.clone(), bet.stake);
        self.updated_at = Utc::now();
        true
    }

    /// Credit the payout of a settled bet.
    ///
    /// Returns `false` when the settlement was already applied. A VOID
    /// record refunds the stake only if it had been debited.
    pub fn apply_settlement(&mut self, settled: &SettledBet) -> bool {
        let bet_id = settled.bet_id();
        if self.applied_settlements.contains(bet_id) {
            return false;
        }
        let exposure = self.open_exposure.remove(bet_id);

        if settled.exit_reason == ExitReason::Void {
            if let Some(stake) = exposure {
                self.cash_balance += stake;
            }
        } else {
            self.cash_balance += settled.payout();
            self.realized_pnl += settled.realized_pnl;
            if settled.won {
                self.wins += 1;
            } else {
                self.losses += 1;
            }
        }

        self.applied_settlements.insert(bet_id.to_string());
        self.updated_at = Utc::now();
        true
    }

    pub fn total_exposure(&self) -> Decimal {
        self.open_exposure.values().copied().sum()
    }

    pub fn summary(&self) -> PortfolioSummary {
        let exposure = self.total_exposure();
        let settled = self.wins + self.losses;
        let win_rate = if settled == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(self.wins) / Decimal::from(settled)
        };
        PortfolioSummary {
            initial_balance: self.initial_balance,
            cash_balance: self.cash_balance,
            open_exposure: exposure,
            open_positions: self.open_exposure.len(),
            equity: self.cash_balance + exposure,
            realized_pnl: self.realized_pnl,
            wins: self.wins,
            losses: self.losses,
            win_rate,
            updated_at: self.updated_at,
        }
    }
}

/// Read-only view for presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSummary {
    pub initial_balance: Decimal,
    pub cash_balance: Decimal,
    pub open_exposure: Decimal,
    pub open_positions: usize,
    /// Cash plus open stakes at cost.
    pub equity: Decimal,
    pub realized_pnl: Decimal,
    pub wins: u32,
    pub losses: u32,
    pub win_rate: Decimal,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bet::{BetOrigin, BetRequest, OutcomeSide};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn bet(stake: Decimal, entry: Decimal) -> Bet {
        let request = BetRequest {
            market_id: "m1".to_string(),
            question: String::new(),
            underlying: "ETHUSDT".to_string(),
            instrument_id: None,
            side: OutcomeSide::Yes,
            strike: dec!(3000),
            stake,
            entry_price: entry,
            market_close_at: Utc::now() + Duration::minutes(15),
            origin: BetOrigin::Strategy,
        };
        Bet::open(request, Utc::now(), Duration::minutes(5)).unwrap()
    }

    #[test]
    fn test_open_and_win_moves_cash_once() {
        let mut portfolio = Portfolio::new(dec!(1000));
        let bet = bet(dec!(100), dec!(0.60));

        assert!(portfolio.apply_open(&bet));
        assert!(!portfolio.apply_open(&bet));
        assert_eq!(portfolio.cash_balance, dec!(900));
        assert_eq!(portfolio.total_exposure(), dec!(100));

        let settled = bet.settle_at_expiry(dec!(3100), "oracle_at_close", Utc::now());
        assert!(portfolio.apply_settlement(&settled));
        assert!(!portfolio.apply_settlement(&settled));
        assert_eq!(portfolio.cash_balance, dec!(1066.67));
        assert_eq!(portfolio.realized_pnl, dec!(66.67));
        assert_eq!(portfolio.wins, 1);
        assert!(portfolio.open_exposure.is_empty());
    }

    #[test]
    fn test_settled_bet_cannot_be_reopened() {
        let mut portfolio = Portfolio::new(dec!(1000));
        let bet = bet(dec!(50), dec!(0.5));
        portfolio.apply_open(&bet);
        portfolio.apply_settlement(&bet.settle_at_expiry(dec!(1), "oracle_at_close", Utc::now()));
        assert!(!portfolio.apply_open(&bet));
        assert_eq!(portfolio.cash_balance, dec!(950));
        assert_eq!(portfolio.losses, 1);
    }

    #[test]
    fn test_void_refunds_only_debited_stake() {
        let mut portfolio = Portfolio::new(dec!(500));
        let never_debited = bet(dec!(40), dec!(0.5));
        portfolio.apply_settlement(&never_debited.void(Utc::now()));
        assert_eq!(portfolio.cash_balance, dec!(500));

        let debited = bet(dec!(40), dec!(0.5));
        portfolio.apply_open(&debited);
        portfolio.apply_settlement(&debited.void(Utc::now()));
        assert_eq!(portfolio.cash_balance, dec!(500));
        assert_eq!(portfolio.wins + portfolio.losses, 0);
    }

    #[test]
    fn test_summary_win_rate_and_equity() {
        let mut portfolio = Portfolio::new(dec!(1000));
        let a = bet(dec!(100), dec!(0.5));
        let b = bet(dec!(100), dec!(0.5));
        let c = bet(dec!(100), dec!(0.5));
        for bet in [&a, &b, &c] {
            portfolio.apply_open(bet);
        }
        portfolio.apply_settlement(&a.settle_at_expiry(dec!(4000), "t", Utc::now()));
        portfolio.apply_settlement(&b.settle_at_expiry(dec!(10), "t", Utc::now()));

        let summary = portfolio.summary();
        assert_eq!(summary.open_positions, 1);
        assert_eq!(summary.win_rate, dec!(0.5));
        // 700 cash after opens, +200 win payout, +0 loss payout, +100 exposure.
        assert_eq!(summary.cash_balance, dec!(900));
        assert_eq!(summary.equity, dec!(1000));
    }
}
