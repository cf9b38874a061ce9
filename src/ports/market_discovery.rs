//! Market Discovery Port - Candidate Markets and Quotes
//!
//! The scheduler asks this collaborator which markets are open for
//! betting and what each side currently costs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::{InstrumentId, MarketId, OutcomePrices};

/// A market eligible for a new bet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateMarket {
  pub market_id: MarketId,
  pub question: String,
  /// Market-defined threshold; `None` until the window has opened.
  pub strike: Option<Decimal>,
  pub close_at: DateTime<Utc>,
  /// Underlying symbol used for resolution (e.g. `BTCUSDT`).
  pub underlying: String,
  /// YES outcome token (the streaming instrument).
  pub yes_token: Option<InstrumentId>,
  /// NO outcome token.
  pub no_token: Option<InstrumentId>,
}

/// Trait for market discovery providers.
#[async_trait]
pub trait MarketDiscovery: Send + Sync + 'static {
  /// Markets currently worth analyzing.
  async fn list_candidate_markets(&self) -> anyhow::Result<Vec<CandidateMarket>>;

  /// Current YES/NO prices. Returns zeros when no source has a quote;
  /// callers must treat zero/zero as "skip".
  async fn get_outcome_prices(&self, market_id: &str) -> anyhow::Result<OutcomePrices>;
}
