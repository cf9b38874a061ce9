//! Price samples, bounded history and arbitrage detection.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::bet::{InstrumentId, OutcomeSide};

/// YES/NO quote for a market. Zero on both sides means "no price".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutcomePrices {
    pub yes: Decimal,
    pub no: Decimal,
}

impl OutcomePrices {
    pub const fn new(yes: Decimal, no: Decimal) -> Self {
        Self { yes, no }
    }

    pub const fn zero() -> Self {
        Self { yes: Decimal::ZERO, no: Decimal::ZERO }
    }

    /// True when neither side carries a price.
    pub fn is_unavailable(&self) -> bool {
        self.yes.is_zero() && self.no.is_zero()
    }

    pub const fn side(&self, side: OutcomeSide) -> Decimal {
        match side {
            OutcomeSide::Yes => self.yes,
            OutcomeSide::No => self.no,
        }
    }
}

/// One normalized observation from the streaming feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceSample {
    pub instrument_id: InstrumentId,
    pub timestamp: DateTime<Utc>,
    pub yes_mid: Decimal,
    pub no_mid: Decimal,
}

impl PriceSample {
    pub const fn prices(&self) -> OutcomePrices {
        OutcomePrices::new(self.yes_mid, self.no_mid)
    }
}

/// Fixed-capacity history for one instrument; evicts the oldest sample.
#[derive(Debug, Clone)]
pub struct PriceRing {
    samples: VecDeque<PriceSample>,
    capacity: usize,
}

impl PriceRing {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: PriceSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn latest(&self) -> Option<&PriceSample> {
        self.samples.back()
    }

    /// Samples oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &PriceSample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// YES+NO mids summing below the threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArbitrageSignal {
    pub instrument_id: InstrumentId,
    pub yes_mid: Decimal,
    pub no_mid: Decimal,
    pub sum: Decimal,
    /// `threshold − sum`.
    pub margin: Decimal,
    pub observed_at: DateTime<Utc>,
}

impl ArbitrageSignal {
    /// Detect an arbitrage window. Both mids must be quoted.
    pub fn detect(sample: &PriceSample, threshold: Decimal) -> Option<Self> {
        if sample.yes_mid <= Decimal::ZERO || sample.no_mid <= Decimal::ZERO {
            return None;
        }
        let sum = sample.yes_mid + sample.no_mid;
        if sum >= threshold {
            return None;
        }
        Some(Self {
            instrument_id: sample.instrument_id.clone(),
            yes_mid: sample.yes_mid,
            no_mid: sample.no_mid,
            sum,
            margin: threshold - sum,
            observed_at: sample.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample(i: i64, yes: Decimal, no: Decimal) -> PriceSample {
        PriceSample {
            instrument_id: "tok".to_string(),
            timestamp: DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::seconds(i),
            yes_mid: yes,
            no_mid: no,
        }
    }

    #[test]
    fn test_ring_evicts_oldest_first() {
        let mut ring = PriceRing::with_capacity(3);
        for i in 0..5 {
            ring.push(sample(i, dec!(0.5), dec!(0.5)));
        }
        let seconds: Vec<i64> = ring.iter().map(|s| s.timestamp.timestamp()).collect();
        assert_eq!(seconds, vec![2, 3, 4]);
        assert_eq!(ring.latest().map(|s| s.timestamp.timestamp()), Some(4));
    }

    #[test]
    fn test_arbitrage_margin() {
        let signal = ArbitrageSignal::detect(&sample(0, dec!(0.45), dec!(0.50)), dec!(0.99)).unwrap();
        assert_eq!(signal.sum, dec!(0.95));
        assert_eq!(signal.margin, dec!(0.04));
    }

    #[test]
    fn test_no_arbitrage_at_or_above_threshold_or_one_sided() {
        assert!(ArbitrageSignal::detect(&sample(0, dec!(0.49), dec!(0.50)), dec!(0.99)).is_none());
        assert!(ArbitrageSignal::detect(&sample(0, dec!(0.40), dec!(0)), dec!(0.99)).is_none());
    }

    #[test]
    fn test_outcome_prices_unavailable() {
        assert!(OutcomePrices::zero().is_unavailable());
        assert!(!OutcomePrices::new(dec!(0.3), Decimal::ZERO).is_unavailable());
        assert_eq!(OutcomePrices::new(dec!(0.3), dec!(0.7)).side(OutcomeSide::No), dec!(0.7));
    }
}
