//! Market Feed Port - Streaming Price View and Events
//!
//! The streaming client never calls into the ledger. It publishes
//! `FeedEvent`s on a bounded channel consumed by the scheduler, and
//! exposes a read-only view of its per-instrument history.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::{ArbitrageSignal, InstrumentId, PriceSample};

/// Connection state of the streaming client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedState {
  Disconnected,
  Connecting,
  Subscribed,
}

impl std::fmt::Display for FeedState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Disconnected => write!(f, "disconnected"),
      Self::Connecting => write!(f, "connecting"),
      Self::Subscribed => write!(f, "subscribed"),
    }
  }
}

/// Event delivered from the feed loop to its consumer, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
  Price(PriceSample),
  Arbitrage(ArbitrageSignal),
}

/// Read-only view over the streaming price history.
#[async_trait]
pub trait LivePrices: Send + Sync + 'static {
  /// Latest sample for an instrument.
  async fn latest(&self, instrument_id: &str) -> Option<PriceSample>;

  /// Samples for an instrument, oldest first.
  async fn history(&self, instrument_id: &str) -> Vec<PriceSample>;

  /// Latest sample of every instrument seen.
  async fn snapshot(&self) -> HashMap<InstrumentId, PriceSample>;
}
