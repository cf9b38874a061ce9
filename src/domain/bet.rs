//! Bet lifecycle types.
//!
//! A `Bet` is a simulated position on one side of a binary market. It is
//! created ACTIVE, and leaves the active set exactly once, either as a
//! SETTLED record (expiry or early exit) or as a VOID record (never
//! confirmed). All money values are exact decimals.
//!
//! PnL conventions:
//! - expiry win: `quantity × (1 − entry_price)`
//! - expiry loss: `−stake`
//! - early exit: `quantity × exit_price − stake`
//!
//! Realized PnL is rounded to cents, midpoint away from zero.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::BetError;

/// Market / condition identifier.
pub type MarketId = String;

/// Streaming instrument (CLOB token) identifier.
pub type InstrumentId = String;

/// Bet identifier (UUID v4 string).
pub type BetId = String;

/// Side of a binary market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutcomeSide {
    Yes,
    No,
}

impl std::fmt::Display for OutcomeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Yes => write!(f, "YES"),
            Self::No => write!(f, "NO"),
        }
    }
}

/// Lifecycle status of a bet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BetStatus {
    Active,
    Settled,
    Void,
}

impl std::fmt::Display for BetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Settled => write!(f, "SETTLED"),
            Self::Void => write!(f, "VOID"),
        }
    }
}

/// What opened the bet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetOrigin {
    #[default]
    Strategy,
    Arbitrage,
    Manual,
}

impl std::fmt::Display for BetOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strategy => write!(f, "strategy"),
            Self::Arbitrage => write!(f, "arbitrage"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Why a bet left the active set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Resolved at market close.
    Expiry,
    /// Closed early above the take-profit threshold.
    TakeProfit,
    /// Closed early below the stop-loss threshold.
    StopLoss,
    /// Never confirmed; no PnL.
    Void,
}

impl ExitReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Expiry => "expiry",
            Self::TakeProfit => "take_profit",
            Self::StopLoss => "stop_loss",
            Self::Void => "void",
        }
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for opening a bet.
#[derive(Debug, Clone)]
pub struct BetRequest {
    pub market_id: MarketId,
    pub question: String,
    pub underlying: String,
    pub instrument_id: Option<InstrumentId>,
    pub side: OutcomeSide,
    pub strike: Decimal,
    pub stake: Decimal,
    pub entry_price: Decimal,
    pub market_close_at: DateTime<Utc>,
    pub origin: BetOrigin,
}

/// A simulated position on one side of a binary market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bet {
    pub bet_id: BetId,
    pub market_id: MarketId,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub underlying: String,
    #[serde(default)]
    pub instrument_id: Option<InstrumentId>,
    pub outcome_side: OutcomeSide,
    pub strike: Decimal,
    pub stake: Decimal,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub opened_at: DateTime<Utc>,
    pub market_close_at: DateTime<Utc>,
    pub settlement_deadline: DateTime<Utc>,
    pub status: BetStatus,
    #[serde(default)]
    pub origin: BetOrigin,
}

impl Bet {
    /// Open a new ACTIVE bet.
    ///
    /// The settlement deadline is `market_close_at + grace`; it must land
    /// strictly after `opened_at`.
    pub fn open(
        request: BetRequest,
        opened_at: DateTime<Utc>,
        grace: Duration,
    ) -> Result<Self, BetError> {
        if request.entry_price <= Decimal::ZERO || request.entry_price > Decimal::ONE {
            return Err(BetError::InvalidEntryPrice(request.entry_price));
        }
        if request.stake <= Decimal::ZERO {
            return Err(BetError::InvalidStake(request.stake));
        }
        let settlement_deadline = request.market_close_at + grace;
        if settlement_deadline <= opened_at {
            return Err(BetError::DeadlineNotAfterOpen {
                deadline: settlement_deadline,
                opened_at,
            });
        }

        Ok(Self {
            bet_id: Uuid::new_v4().to_string(),
            market_id: request.market_id,
            question: request.question,
            underlying: request.underlying,
            instrument_id: request.instrument_id,
            outcome_side: request.side,
            strike: request.strike,
            quantity: request.stake / request.entry_price,
            stake: request.stake,
            entry_price: request.entry_price,
            opened_at,
            market_close_at: request.market_close_at,
            settlement_deadline,
            status: BetStatus::Active,
            origin: request.origin,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == BetStatus::Active
    }

    /// Whether the bet is eligible for deadline settlement at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && now >= self.settlement_deadline
    }

    /// Win rule: YES wins at or above the strike, NO strictly below it.
    pub fn wins_at(&self, close_price: Decimal) -> bool {
        match self.outcome_side {
            OutcomeSide::Yes => close_price >= self.strike,
            OutcomeSide::No => close_price < self.strike,
        }
    }

    /// Fractional return of the position at `current_price` relative to entry.
    pub fn unrealized_return(&self, current_price: Decimal) -> Decimal {
        (current_price - self.entry_price) / self.entry_price
    }

    /// Resolve at market close against the underlying's close price.
    pub fn settle_at_expiry(
        &self,
        close_price: Decimal,
        resolution_source: &str,
        settled_at: DateTime<Utc>,
    ) -> SettledBet {
        let won = self.wins_at(close_price);
        let pnl = if won {
            self.quantity * (Decimal::ONE - self.entry_price)
        } else {
            -self.stake
        };
        self.finish(close_price, pnl, won, ExitReason::Expiry, resolution_source, settled_at)
    }

    /// Close before expiry by selling the position at `exit_price`.
    pub fn settle_early(
        &self,
        exit_price: Decimal,
        reason: ExitReason,
        settled_at: DateTime<Utc>,
    ) -> SettledBet {
        let pnl = self.quantity * exit_price - self.stake;
        self.finish(exit_price, pnl, pnl > Decimal::ZERO, reason, "early_exit", settled_at)
    }

    /// Terminal record for a bet that was never confirmed.
    pub fn void(&self, settled_at: DateTime<Utc>) -> SettledBet {
        let mut bet = self.clone();
        bet.status = BetStatus::Void;
        SettledBet {
            bet,
            outcome_price: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            settled_at,
            won: false,
            exit_reason: ExitReason::Void,
            resolution_source: "void".to_string(),
        }
    }

    fn finish(
        &self,
        outcome_price: Decimal,
        pnl: Decimal,
        won: bool,
        exit_reason: ExitReason,
        resolution_source: &str,
        settled_at: DateTime<Utc>,
    ) -> SettledBet {
        let mut bet = self.clone();
        bet.status = BetStatus::Settled;
        SettledBet {
            bet,
            outcome_price,
            realized_pnl: round_cents(pnl),
            settled_at,
            won,
            exit_reason,
            resolution_source: resolution_source.to_string(),
        }
    }
}

/// A bet that has left the active set. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettledBet {
    #[serde(flatten)]
    pub bet: Bet,
    pub outcome_price: Decimal,
    pub realized_pnl: Decimal,
    pub settled_at: DateTime<Utc>,
    pub won: bool,
    pub exit_reason: ExitReason,
    #[serde(default)]
    pub resolution_source: String,
}

impl SettledBet {
    pub fn bet_id(&self) -> &str {
        &self.bet.bet_id
    }

    /// Cash credited back to the portfolio: the stake plus realized PnL.
    /// VOID records were never debited and pay nothing.
    pub fn payout(&self) -> Decimal {
        if self.exit_reason == ExitReason::Void {
            Decimal::ZERO
        } else {
            self.bet.stake + self.realized_pnl
        }
    }
}

/// Outcome filter for history listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryFilter {
    Won,
    Lost,
    Void,
}

impl HistoryFilter {
    pub fn matches(self, settled: &SettledBet) -> bool {
        let void = settled.exit_reason == ExitReason::Void;
        match self {
            Self::Won => !void && settled.won,
            Self::Lost => !void && !settled.won,
            Self::Void => void,
        }
    }
}

/// Newest-first slice of `history`, optionally filtered and truncated.
pub fn select_history(
    history: &[SettledBet],
    limit: Option<usize>,
    filter: Option<HistoryFilter>,
) -> Vec<SettledBet> {
    let mut selected: Vec<SettledBet> = history
        .iter()
        .filter(|s| filter.is_none_or(|f| f.matches(s)))
        .cloned()
        .collect();
    selected.sort_by(|a, b| b.settled_at.cmp(&a.settled_at));
    if let Some(limit) = limit {
        selected.truncate(limit);
    }
    selected
}

/// Round a money amount to cents, midpoint away from zero.
pub fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// A persisted record that can be recovered from a damaged JSON object.
///
/// Unknown fields are ignored by serde; a record missing required fields
/// is kept as a VOID placeholder so it stays visible but inert.
pub trait LedgerRecord: Sized + Serialize + serde::de::DeserializeOwned {
    fn bet_id(&self) -> &str;

    /// Placeholder for a record that failed to deserialize.
    fn void_placeholder(raw: &Value) -> Self;
}

impl LedgerRecord for Bet {
    fn bet_id(&self) -> &str {
        &self.bet_id
    }

    fn void_placeholder(raw: &Value) -> Self {
        let text = |key: &str| raw.get(key).and_then(Value::as_str).map(str::to_string);
        let epoch = DateTime::<Utc>::UNIX_EPOCH;
        Self {
            bet_id: text("bet_id").unwrap_or_else(|| format!("void-{}", Uuid::new_v4())),
            market_id: text("market_id").unwrap_or_default(),
            question: text("question").unwrap_or_default(),
            underlying: text("underlying").unwrap_or_default(),
            instrument_id: text("instrument_id"),
            outcome_side: OutcomeSide::Yes,
            strike: Decimal::ZERO,
            stake: Decimal::ZERO,
            entry_price: Decimal::ZERO,
            quantity: Decimal::ZERO,
            opened_at: epoch,
            market_close_at: epoch,
            settlement_deadline: epoch,
            status: BetStatus::Void,
            origin: BetOrigin::Strategy,
        }
    }
}

impl LedgerRecord for SettledBet {
    fn bet_id(&self) -> &str {
        &self.bet.bet_id
    }

    fn void_placeholder(raw: &Value) -> Self {
        Bet::void_placeholder(raw).void(DateTime::<Utc>::UNIX_EPOCH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request(side: OutcomeSide, stake: Decimal, entry: Decimal) -> BetRequest {
        BetRequest {
            market_id: "mkt_btc_15m".to_string(),
            question: "Bitcoin Up or Down?".to_string(),
            underlying: "BTCUSDT".to_string(),
            instrument_id: Some("tok_yes".to_string()),
            side,
            strike: dec!(65000),
            stake,
            entry_price: entry,
            market_close_at: Utc::now() + Duration::minutes(15),
            origin: BetOrigin::Strategy,
        }
    }

    fn open(side: OutcomeSide, stake: Decimal, entry: Decimal) -> Bet {
        Bet::open(request(side, stake, entry), Utc::now(), Duration::minutes(5)).unwrap()
    }

    #[test]
    fn test_open_derives_quantity_and_deadline() {
        let bet = open(OutcomeSide::Yes, dec!(100), dec!(0.50));
        assert_eq!(bet.quantity, dec!(200));
        assert_eq!(bet.status, BetStatus::Active);
        assert_eq!(bet.settlement_deadline, bet.market_close_at + Duration::minutes(5));
    }

    #[test]
    fn test_open_rejects_deadline_before_open() {
        let mut req = request(OutcomeSide::Yes, dec!(10), dec!(0.5));
        req.market_close_at = Utc::now() - Duration::hours(1);
        let err = Bet::open(req, Utc::now(), Duration::minutes(5)).unwrap_err();
        assert!(matches!(err, BetError::DeadlineNotAfterOpen { .. }));
    }

    #[test]
    fn test_open_rejects_price_outside_unit_interval() {
        let req = request(OutcomeSide::Yes, dec!(10), dec!(1.01));
        assert!(Bet::open(req, Utc::now(), Duration::minutes(5)).is_err());
        let req = request(OutcomeSide::Yes, dec!(10), dec!(0));
        assert!(Bet::open(req, Utc::now(), Duration::minutes(5)).is_err());
    }

    #[test]
    fn test_yes_win_pnl_rounds_to_cents() {
        let bet = open(OutcomeSide::Yes, dec!(100), dec!(0.60));
        let settled = bet.settle_at_expiry(dec!(65000), "oracle_at_close", Utc::now());
        assert!(settled.won);
        assert_eq!(settled.realized_pnl, dec!(66.67));
        assert_eq!(settled.payout(), dec!(166.67));
        assert_eq!(settled.bet.status, BetStatus::Settled);
    }

    #[test]
    fn test_no_side_wins_strictly_below_strike() {
        let bet = open(OutcomeSide::No, dec!(50), dec!(0.40));
        assert!(!bet.wins_at(dec!(65000)));
        assert!(bet.wins_at(dec!(64999.99)));

        let settled = bet.settle_at_expiry(dec!(65100), "oracle_at_close", Utc::now());
        assert!(!settled.won);
        assert_eq!(settled.realized_pnl, dec!(-50));
        assert_eq!(settled.payout(), Decimal::ZERO);
    }

    #[test]
    fn test_early_exit_pnl() {
        let bet = open(OutcomeSide::Yes, dec!(100), dec!(0.50));
        let settled = bet.settle_early(dec!(0.80), ExitReason::TakeProfit, Utc::now());
        assert_eq!(settled.realized_pnl, dec!(60));
        assert_eq!(settled.exit_reason, ExitReason::TakeProfit);

        let settled = bet.settle_early(dec!(0.20), ExitReason::StopLoss, Utc::now());
        assert_eq!(settled.realized_pnl, dec!(-60));
        assert!(!settled.won);
    }

    #[test]
    fn test_void_pays_nothing() {
        let bet = open(OutcomeSide::Yes, dec!(25), dec!(0.5));
        let voided = bet.void(Utc::now());
        assert_eq!(voided.bet.status, BetStatus::Void);
        assert_eq!(voided.payout(), Decimal::ZERO);
    }

    #[test]
    fn test_void_placeholder_keeps_identity() {
        let raw = serde_json::json!({ "bet_id": "abc", "market_id": "m1", "stake": "oops" });
        let bet = Bet::void_placeholder(&raw);
        assert_eq!(bet.bet_id, "abc");
        assert_eq!(bet.market_id, "m1");
        assert_eq!(bet.status, BetStatus::Void);
        assert!(!bet.is_due(Utc::now()));
    }

    #[test]
    fn test_settled_bet_serializes_flat() {
        let bet = open(OutcomeSide::Yes, dec!(100), dec!(0.60));
        let settled = bet.settle_at_expiry(dec!(70000), "oracle_at_close", Utc::now());
        let json = serde_json::to_value(&settled).unwrap();
        assert_eq!(json["bet_id"], bet.bet_id);
        assert_eq!(json["status"], "SETTLED");
        assert_eq!(json["exit_reason"], "expiry");
        let back: SettledBet = serde_json::from_value(json).unwrap();
        assert_eq!(back, settled);
    }

    #[test]
    fn test_select_history_filters_newest_first() {
        let t0 = Utc::now();
        let won = open(OutcomeSide::Yes, dec!(10), dec!(0.5)).settle_at_expiry(dec!(70000), "oracle_at_close", t0);
        let lost = open(OutcomeSide::Yes, dec!(10), dec!(0.5)).settle_at_expiry(
            dec!(60000),
            "oracle_at_close",
            t0 + Duration::minutes(1),
        );
        let void = open(OutcomeSide::No, dec!(10), dec!(0.5)).void(t0 + Duration::minutes(2));
        let later_win = open(OutcomeSide::No, dec!(10), dec!(0.5)).settle_at_expiry(
            dec!(60000),
            "oracle_at_close",
            t0 + Duration::minutes(3),
        );
        let history = vec![won.clone(), lost.clone(), void.clone(), later_win.clone()];

        let all = select_history(&history, None, None);
        assert_eq!(all, vec![later_win.clone(), void.clone(), lost.clone(), won.clone()]);

        assert_eq!(
            select_history(&history, None, Some(HistoryFilter::Won)),
            vec![later_win.clone(), won]
        );
        assert_eq!(select_history(&history, None, Some(HistoryFilter::Lost)), vec![lost]);
        assert_eq!(select_history(&history, None, Some(HistoryFilter::Void)), vec![void.clone()]);
        assert_eq!(select_history(&history, Some(2), None), vec![later_win, void]);
    }
}
