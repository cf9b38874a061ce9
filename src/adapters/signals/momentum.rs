//! Indicators computed from the streaming YES-mid history.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;

use crate::error::InsufficientData;
use crate::ports::market_discovery::CandidateMarket;
use crate::ports::market_feed::LivePrices;
use crate::ports::strategy::{IndicatorSnapshot, IndicatorSource};

/// Momentum and z-score of the YES mid over the retained feed history.
pub struct FeedMomentumIndicators {
    live: Arc<dyn LivePrices>,
    min_samples: usize,
}

impl FeedMomentumIndicators {
    pub fn new(live: Arc<dyn LivePrices>, min_samples: usize) -> Self {
        Self {
            live,
            min_samples: min_samples.max(2),
        }
    }
}

/// Sample z-score of the last value; `None` for flat or short series.
#[must_use]
pub fn zscore(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let latest = *values.last()?;
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std_dev = variance.sqrt();
    if std_dev < f64::EPSILON {
        return None;
    }
    Some((latest - mean) / std_dev)
}

#[async_trait]
impl IndicatorSource for FeedMomentumIndicators {
    async fn snapshot(&self, market: &CandidateMarket) -> Result<IndicatorSnapshot, InsufficientData> {
        let missing = |reason: String| InsufficientData {
            market_id: market.market_id.clone(),
            reason,
        };

        let token = market
            .yes_token
            .as_deref()
            .ok_or_else(|| missing("no YES token".to_string()))?;

        let mids: Vec<f64> = self
            .live
            .history(token)
            .await
            .iter()
            .filter_map(|s| s.yes_mid.to_f64())
            .collect();
        if mids.len() < self.min_samples {
            return Err(missing(format!("{} of {} samples", mids.len(), self.min_samples)));
        }

        let first = mids[0];
        let latest = mids[mids.len() - 1];

        Ok(IndicatorSnapshot::default()
            .with("yes_mid", latest)
            .with("momentum", latest - first)
            .with("zscore", zscore(&mids).unwrap_or(0.0))
            .with("samples", mids.len() as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use crate::domain::{InstrumentId, PriceSample};

    struct FixedHistory(Vec<PriceSample>);

    #[async_trait]
    impl LivePrices for FixedHistory {
        async fn latest(&self, _instrument_id: &str) -> Option<PriceSample> {
            self.0.last().cloned()
        }

        async fn history(&self, _instrument_id: &str) -> Vec<PriceSample> {
            self.0.clone()
        }

        async fn snapshot(&self) -> HashMap<InstrumentId, PriceSample> {
            HashMap::new()
        }
    }

    fn market(yes_token: Option<&str>) -> CandidateMarket {
        CandidateMarket {
            market_id: "m1".to_string(),
            question: "Up or Down?".to_string(),
            strike: None,
            close_at: Utc::now() + Duration::minutes(10),
            underlying: "BTCUSDT".to_string(),
            yes_token: yes_token.map(ToString::to_string),
            no_token: None,
        }
    }

    fn history(mids: &[i64]) -> Vec<PriceSample> {
        mids.iter()
            .map(|m| PriceSample {
                instrument_id: "t1".to_string(),
                timestamp: Utc::now(),
                yes_mid: Decimal::new(*m, 2),
                no_mid: Decimal::new(100 - m, 2),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_snapshot_reports_rising_mid() {
        let source = FeedMomentumIndicators::new(Arc::new(FixedHistory(history(&[40, 41, 40, 41, 60]))), 3);
        let snapshot = source.snapshot(&market(Some("t1"))).await.unwrap();

        assert!((snapshot.get("momentum").unwrap() - 0.2).abs() < 1e-9);
        assert!(snapshot.get("zscore").unwrap() > 1.0);
        assert_eq!(snapshot.get("samples"), Some(5.0));
    }

    #[tokio::test]
    async fn test_snapshot_needs_token_and_samples() {
        let source = FeedMomentumIndicators::new(Arc::new(FixedHistory(history(&[40, 41]))), 3);
        assert!(source.snapshot(&market(None)).await.is_err());
        assert!(source.snapshot(&market(Some("t1"))).await.is_err());
    }

    #[test]
    fn test_zscore_of_flat_series_is_none() {
        assert_eq!(zscore(&[0.5, 0.5, 0.5]), None);
        assert_eq!(zscore(&[0.5]), None);
    }
}
