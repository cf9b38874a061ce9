//! Outcome Source Port - Underlying Price History
//!
//! Supplies reference prices of the underlying asset, used to fix a
//! market's strike at window open and to resolve bets at close.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// One reference price observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutcomeSample {
  pub price: Decimal,
  pub observed_at: DateTime<Utc>,
}

/// Trait for price-history providers.
#[async_trait]
pub trait OutcomeSource: Send + Sync + 'static {
  /// Latest sample observed at or before `at`.
  async fn sample_at_or_before(
    &self,
    underlying: &str,
    at: DateTime<Utc>,
  ) -> anyhow::Result<Option<OutcomeSample>>;

  /// Most recent sample available.
  async fn latest_sample(&self, underlying: &str) -> anyhow::Result<Option<OutcomeSample>>;
}
