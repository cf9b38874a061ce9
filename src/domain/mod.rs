//! Domain layer - Core business types for paper betting.
//!
//! Pure values and rules: bets and their terminal transitions, the paper
//! portfolio, price samples and arbitrage detection. No I/O here
//! (hexagonal architecture inner ring).

pub mod bet;
pub mod portfolio;
pub mod price;

// Re-export core types for convenience
pub use bet::{
    Bet, BetId, BetOrigin, BetRequest, BetStatus, ExitReason, HistoryFilter, InstrumentId,
    LedgerRecord, MarketId, OutcomeSide, SettledBet, select_history,
};
pub use portfolio::{Portfolio, PortfolioSummary};
pub use price::{ArbitrageSignal, OutcomePrices, PriceRing, PriceSample};
