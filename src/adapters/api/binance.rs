//! Binance Outcome Source - Underlying Reference Prices
//!
//! Resolves the underlying's price at an instant from 1-minute klines,
//! and the latest price from the ticker endpoint.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, instrument};

use super::client::HttpClient;
use super::types::{Kline, TickerPrice};
use crate::ports::outcome_source::{OutcomeSample, OutcomeSource};

/// Candles requested per lookup.
const KLINE_LIMIT: u32 = 5;

pub struct BinanceOutcomeSource {
  client: Arc<HttpClient>,
  base_url: String,
}

impl BinanceOutcomeSource {
  pub fn new(client: Arc<HttpClient>, base_url: impl Into<String>) -> Self {
    Self {
      client,
      base_url: base_url.into().trim_end_matches('/').to_string(),
    }
  }

  async fn klines_until(&self, symbol: &str, at: DateTime<Utc>) -> Result<Vec<Kline>> {
    let url = format!("{}/api/v3/klines", self.base_url);
    let rows: Vec<Vec<Value>> = self
      .client
      .get_json(
        &url,
        &[
          ("symbol", symbol.to_string()),
          ("interval", "1m".to_string()),
          ("endTime", at.timestamp_millis().to_string()),
          ("limit", KLINE_LIMIT.to_string()),
        ],
      )
      .await
      .with_context(|| format!("Failed to fetch klines for {symbol}"))?;

    Ok(rows.iter().filter_map(|row| Kline::from_row(row)).collect())
  }
}

/// Close of the last candle that finished at or before `at`.
pub fn last_close_at_or_before(klines: &[Kline], at: DateTime<Utc>) -> Option<OutcomeSample> {
  klines
    .iter()
    .filter(|k| k.close_time <= at)
    .max_by_key(|k| k.close_time)
    .map(|k| OutcomeSample {
      price: k.close,
      observed_at: k.close_time,
    })
}

#[async_trait]
impl OutcomeSource for BinanceOutcomeSource {
  #[instrument(skip(self))]
  async fn sample_at_or_before(
    &self,
    underlying: &str,
    at: DateTime<Utc>,
  ) -> Result<Option<OutcomeSample>> {
    let klines = self.klines_until(underlying, at).await?;
    let sample = last_close_at_or_before(&klines, at);
    debug!(candles = klines.len(), found = sample.is_some(), "Kline lookup");
    Ok(sample)
  }

  async fn latest_sample(&self, underlying: &str) -> Result<Option<OutcomeSample>> {
    let url = format!("{}/api/v3/ticker/price", self.base_url);
    let ticker: TickerPrice = self
      .client
      .get_json(&url, &[("symbol", underlying.to_string())])
      .await
      .with_context(|| format!("Failed to fetch ticker for {underlying}"))?;

    let price: Decimal = ticker
      .price
      .parse()
      .with_context(|| format!("Invalid ticker price for {}: {}", ticker.symbol, ticker.price))?;

    Ok(Some(OutcomeSample {
      price,
      observed_at: Utc::now(),
    }))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;
  use rust_decimal_macros::dec;

  #[test]
  fn test_last_close_skips_candle_still_open_at_instant() {
    let at = DateTime::parse_from_rfc3339("2026-03-01T12:15:00Z").unwrap().with_timezone(&Utc);
    let klines = vec![
      Kline {
        close: dec!(100),
        close_time: at - Duration::seconds(61),
      },
      Kline {
        close: dec!(101),
        close_time: at - Duration::milliseconds(1),
      },
      Kline {
        close: dec!(102),
        close_time: at + Duration::seconds(59),
      },
    ];

    let sample = last_close_at_or_before(&klines, at).unwrap();
    assert_eq!(sample.price, dec!(101));
    assert!(last_close_at_or_before(&klines[2..], at).is_none());
  }
}
