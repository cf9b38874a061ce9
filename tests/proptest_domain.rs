//! Property-Based Tests — Domain Layer Invariants
//!
//! Uses `proptest` to verify that bet, portfolio, price history and
//! reconnect backoff rules hold across random inputs.

use std::time::Duration;

use chrono::{DateTime, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;

use polymarket_paper_trader::adapters::feeds::ReconnectPolicy;
use polymarket_paper_trader::domain::{
    Bet, BetOrigin, BetRequest, ExitReason, OutcomeSide, Portfolio, PriceRing, PriceSample,
};

fn base_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn cents() -> impl Strategy<Value = Decimal> {
    (100i64..100_000).prop_map(|c| Decimal::new(c, 2))
}

fn probability() -> impl Strategy<Value = Decimal> {
    (1i64..=99).prop_map(|p| Decimal::new(p, 2))
}

fn any_side() -> impl Strategy<Value = OutcomeSide> {
    prop_oneof![Just(OutcomeSide::Yes), Just(OutcomeSide::No)]
}

fn bet(side: OutcomeSide, stake: Decimal, entry: Decimal, close_offset_secs: i64) -> Bet {
    let opened_at = base_time();
    Bet::open(
        BetRequest {
            market_id: "m".to_string(),
            question: String::new(),
            underlying: "BTCUSDT".to_string(),
            instrument_id: None,
            side,
            strike: Decimal::from(100),
            stake,
            entry_price: entry,
            market_close_at: opened_at + chrono::Duration::seconds(close_offset_secs),
            origin: BetOrigin::Strategy,
        },
        opened_at,
        chrono::Duration::seconds(300),
    )
    .unwrap()
}

// ── Bet Settlement Properties ───────────────────────────────

proptest! {
    /// A win never loses money; a loss forfeits exactly the stake.
    #[test]
    fn expiry_pnl_sign_follows_outcome(
        side in any_side(),
        stake in cents(),
        entry in probability(),
        close in 1i64..200,
    ) {
        let bet = bet(side, stake, entry, 900);
        let settled = bet.settle_at_expiry(Decimal::from(close), "test", base_time());

        if settled.won {
            prop_assert!(settled.realized_pnl >= Decimal::ZERO);
        } else {
            prop_assert_eq!(settled.realized_pnl, -stake);
        }
        prop_assert!(settled.payout() >= Decimal::ZERO);
        prop_assert!(settled.realized_pnl.scale() <= 2);
    }

    /// Selling above entry realizes a gain, below entry a loss.
    #[test]
    fn early_exit_pnl_tracks_price_move(
        stake in cents(),
        entry in probability(),
        exit in probability(),
    ) {
        let bet = bet(OutcomeSide::Yes, stake, entry, 900);
        let settled = bet.settle_early(exit, ExitReason::TakeProfit, base_time());

        if exit > entry {
            prop_assert!(settled.realized_pnl >= Decimal::ZERO);
        } else if exit < entry {
            prop_assert!(settled.realized_pnl <= Decimal::ZERO);
        }
    }

    /// A bet is due exactly from its deadline onwards.
    #[test]
    fn due_filter_matches_deadline(close_offset in 1i64..10_000, offset in -20_000i64..20_000) {
        let bet = bet(OutcomeSide::No, Decimal::from(10), Decimal::new(5, 1), close_offset);
        let now = bet.settlement_deadline + chrono::Duration::seconds(offset);
        prop_assert_eq!(bet.is_due(now), offset >= 0);
    }
}

// ── Portfolio Properties ────────────────────────────────────

proptest! {
    /// Open + settle moves cash by exactly the realized PnL, however
    /// many times each step is replayed.
    #[test]
    fn settlement_is_applied_once(
        side in any_side(),
        stake in cents(),
        entry in probability(),
        close in 1i64..200,
        replays in 1usize..4,
    ) {
        let initial = Decimal::from(100_000);
        let mut portfolio = Portfolio::new(initial);
        let bet = bet(side, stake, entry, 900);
        let settled = bet.settle_at_expiry(Decimal::from(close), "test", base_time());

        for _ in 0..replays {
            portfolio.apply_open(&bet);
        }
        for _ in 0..replays {
            portfolio.apply_settlement(&settled);
        }
        prop_assert!(!portfolio.apply_open(&bet));

        prop_assert_eq!(portfolio.cash_balance, initial + settled.realized_pnl);
        prop_assert_eq!(portfolio.realized_pnl, settled.realized_pnl);
        prop_assert!(portfolio.open_exposure.is_empty());
    }
}

// ── Price History Properties ────────────────────────────────

proptest! {
    /// The ring keeps the newest `capacity` samples in arrival order.
    #[test]
    fn ring_retains_newest_samples(capacity in 1usize..50, pushes in 0usize..200) {
        let mut ring = PriceRing::with_capacity(capacity);
        for i in 0..pushes {
            ring.push(PriceSample {
                instrument_id: "tok".to_string(),
                timestamp: base_time() + chrono::Duration::seconds(i64::try_from(i).unwrap()),
                yes_mid: Decimal::new(50, 2),
                no_mid: Decimal::new(50, 2),
            });
        }

        prop_assert_eq!(ring.len(), pushes.min(capacity));
        let times: Vec<_> = ring.iter().map(|s| s.timestamp).collect();
        prop_assert!(times.windows(2).all(|w| w[0] < w[1]));
        if pushes > 0 {
            let last = base_time() + chrono::Duration::seconds(i64::try_from(pushes - 1).unwrap());
            prop_assert_eq!(ring.latest().map(|s| s.timestamp), Some(last));
        }
    }
}

// ── Reconnect Backoff Properties ────────────────────────────

proptest! {
    /// Jittered delays grow strictly until the cap, never exceed it.
    #[test]
    fn backoff_increases_until_cap(
        attempt in 0u32..20,
        u1 in 0.0f64..1.0,
        u2 in 0.0f64..1.0,
    ) {
        let policy = ReconnectPolicy {
            initial: Duration::from_secs(5),
            max: Duration::from_secs(300),
            multiplier: 2.0,
            jitter: 0.25,
        };
        let current = policy.delay_with(attempt, u1);
        let next = policy.delay_with(attempt + 1, u2);

        prop_assert!(current <= policy.max);
        prop_assert!(next <= policy.max);
        if current < policy.max {
            prop_assert!(next > current, "{next:?} should exceed {current:?}");
        } else {
            prop_assert_eq!(next, policy.max);
        }
    }
}
