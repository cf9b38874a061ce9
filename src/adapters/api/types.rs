//! REST API Response Types
//!
//! Deserialization types for the Gamma, CLOB and Binance REST APIs.
//! Gamma encodes several list fields as JSON strings (`"[\"Up\",\"Down\"]"`);
//! `string_list` accepts both encodings.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

/// Gamma `/events` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct GammaEvent {
  #[serde(default)]
  pub slug: String,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub markets: Vec<GammaMarket>,
}

/// Gamma market, as embedded in events or returned by `/markets/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct GammaMarket {
  #[serde(default)]
  pub id: Value,
  #[serde(default)]
  pub question: String,
  #[serde(rename = "endDate")]
  pub end_date: Option<String>,
  #[serde(default)]
  pub volume: Value,
  #[serde(default)]
  pub outcomes: Value,
  #[serde(rename = "outcomePrices", default)]
  pub outcome_prices: Value,
  #[serde(rename = "clobTokenIds", default)]
  pub clob_token_ids: Value,
}

impl GammaMarket {
  pub fn market_id(&self) -> Option<String> {
    match &self.id {
      Value::String(s) if !s.is_empty() => Some(s.clone()),
      Value::Number(n) => Some(n.to_string()),
      _ => None,
    }
  }

  pub fn end_time(&self) -> Option<DateTime<Utc>> {
    let raw = self.end_date.as_deref()?;
    DateTime::parse_from_rfc3339(raw)
      .ok()
      .map(|t| t.with_timezone(&Utc))
  }

  pub fn volume(&self) -> Decimal {
    value_decimal(&self.volume).unwrap_or(Decimal::ZERO)
  }

  /// Index of the YES-like and NO-like outcome labels.
  pub fn side_indices(&self) -> Option<(usize, usize)> {
    let labels = string_list(&self.outcomes);
    if labels.len() < 2 {
      return None;
    }
    let mut yes = 0;
    let mut no = 1;
    for (i, label) in labels.iter().enumerate() {
      match label.to_lowercase().as_str() {
        "yes" | "up" | "long" => yes = i,
        "no" | "down" | "short" => no = i,
        _ => {}
      }
    }
    Some((yes, no))
  }

  /// (YES token, NO token) from `clobTokenIds`.
  pub fn tokens(&self) -> (Option<String>, Option<String>) {
    let ids = string_list(&self.clob_token_ids);
    let Some((yes, no)) = self.side_indices() else {
      return (None, None);
    };
    (ids.get(yes).cloned(), ids.get(no).cloned())
  }

  /// (YES price, NO price) from `outcomePrices`.
  pub fn prices(&self) -> Option<(Decimal, Decimal)> {
    let (yes, no) = self.side_indices()?;
    let prices: Vec<Decimal> = string_list(&self.outcome_prices)
      .iter()
      .filter_map(|p| parse_decimal(p))
      .collect();
    Some((*prices.get(yes)?, *prices.get(no)?))
  }
}

/// CLOB `/midpoint` response.
#[derive(Debug, Clone, Deserialize)]
pub struct MidpointResponse {
  pub mid: Value,
}

impl MidpointResponse {
  pub fn mid(&self) -> Option<Decimal> {
    value_decimal(&self.mid)
  }
}

/// Binance `/api/v3/ticker/price` response.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerPrice {
  pub symbol: String,
  pub price: String,
}

/// One Binance kline: `[open_time, open, high, low, close, volume, close_time, ..]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kline {
  pub close: Decimal,
  pub close_time: DateTime<Utc>,
}

impl Kline {
  pub fn from_row(row: &[Value]) -> Option<Self> {
    let close = value_decimal(row.get(4)?)?;
    let close_ms = row.get(6)?.as_i64()?;
    Some(Self {
      close,
      close_time: DateTime::from_timestamp_millis(close_ms)?,
    })
  }
}

/// A list given either as a JSON array or as a JSON-encoded string.
pub fn string_list(value: &Value) -> Vec<String> {
  let items = match value {
    Value::Array(items) => items.clone(),
    Value::String(s) => serde_json::from_str::<Vec<Value>>(s).unwrap_or_default(),
    _ => Vec::new(),
  };
  items
    .iter()
    .filter_map(|v| match v {
      Value::String(s) => Some(s.clone()),
      Value::Number(n) => Some(n.to_string()),
      _ => None,
    })
    .collect()
}

fn value_decimal(value: &Value) -> Option<Decimal> {
  match value {
    Value::String(s) => parse_decimal(s),
    Value::Number(n) => parse_decimal(&n.to_string()),
    _ => None,
  }
}

fn parse_decimal(text: &str) -> Option<Decimal> {
  Decimal::from_str(text)
    .or_else(|_| Decimal::from_scientific(text))
    .ok()
}

#[cfg(test)]
mod tests {
  use super::*;
  use rust_decimal_macros::dec;

  #[test]
  fn test_gamma_market_maps_up_down_labels() {
    let market: GammaMarket = serde_json::from_str(
      r#"{
        "id": "512",
        "question": "Bitcoin Up or Down?",
        "endDate": "2026-03-01T12:15:00Z",
        "volume": "1520.5",
        "outcomes": "[\"Down\", \"Up\"]",
        "outcomePrices": "[\"0.42\", \"0.58\"]",
        "clobTokenIds": "[\"111\", \"222\"]"
      }"#,
    )
    .unwrap();

    assert_eq!(market.market_id().as_deref(), Some("512"));
    assert_eq!(market.side_indices(), Some((1, 0)));
    assert_eq!(market.tokens(), (Some("222".to_string()), Some("111".to_string())));
    assert_eq!(market.prices(), Some((dec!(0.58), dec!(0.42))));
    assert_eq!(market.volume(), dec!(1520.5));
    assert!(market.end_time().is_some());
  }

  #[test]
  fn test_kline_row() {
    let row: Vec<Value> = serde_json::from_str(
      r#"[1700000000000,"100.0","101.0","99.0","100.5","12.0",1700000059999,"0",1,"0","0","0"]"#,
    )
    .unwrap();
    let kline = Kline::from_row(&row).unwrap();
    assert_eq!(kline.close, dec!(100.5));
    assert_eq!(kline.close_time.timestamp_millis(), 1_700_000_059_999);
  }
}
