//! Strategy Port - Indicator Snapshots and Directional Decisions
//!
//! Indicator math and the decision function live outside the core.
//! The snapshot is an opaque bag of named values from the core's view.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;

use super::market_discovery::CandidateMarket;
use crate::domain::{OutcomePrices, OutcomeSide};
use crate::error::InsufficientData;

/// Named indicator values for one market at one instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
  pub values: BTreeMap<String, f64>,
}

impl IndicatorSnapshot {
  pub fn get(&self, name: &str) -> Option<f64> {
    self.values.get(name).copied()
  }

  #[must_use]
  pub fn with(mut self, name: &str, value: f64) -> Self {
    self.values.insert(name.to_string(), value);
    self
  }
}

/// Strategy output for one market.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
  Bet {
    side: OutcomeSide,
    /// Confidence in [0, 1].
    confidence: f64,
  },
  Skip,
}

/// Produces indicator snapshots for candidate markets.
#[async_trait]
pub trait IndicatorSource: Send + Sync + 'static {
  async fn snapshot(
    &self,
    market: &CandidateMarket,
  ) -> Result<IndicatorSnapshot, InsufficientData>;
}

/// Turns indicators plus the market quote into a decision.
pub trait Strategy: Send + Sync + 'static {
  fn name(&self) -> &'static str;

  fn decide(
    &self,
    market_id: &str,
    indicators: &IndicatorSnapshot,
    prices: &OutcomePrices,
  ) -> Decision;
}
