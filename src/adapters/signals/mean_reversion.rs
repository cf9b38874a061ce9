//! Mean-reversion strategy over the YES-mid z-score.
//!
//! A stretched YES mid is expected to revert: bet NO when the z-score
//! is high, YES when it is low. Confidence grows with the stretch past
//! the entry level and is capped at 1.

use crate::domain::{OutcomePrices, OutcomeSide};
use crate::ports::strategy::{Decision, IndicatorSnapshot, Strategy};

pub struct MeanReversionStrategy {
    zscore_entry: f64,
}

impl MeanReversionStrategy {
    pub fn new(zscore_entry: f64) -> Self {
        Self {
            zscore_entry: zscore_entry.abs(),
        }
    }
}

impl Strategy for MeanReversionStrategy {
    fn name(&self) -> &'static str {
        "mean_reversion"
    }

    fn decide(&self, _market_id: &str, indicators: &IndicatorSnapshot, prices: &OutcomePrices) -> Decision {
        if prices.is_unavailable() {
            return Decision::Skip;
        }
        let Some(z) = indicators.get("zscore") else {
            return Decision::Skip;
        };

        let side = if z >= self.zscore_entry {
            OutcomeSide::No
        } else if z <= -self.zscore_entry {
            OutcomeSide::Yes
        } else {
            return Decision::Skip;
        };

        let confidence = 0.25f64.mul_add(z.abs() - self.zscore_entry, 0.5).min(1.0);
        Decision::Bet { side, confidence }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quote() -> OutcomePrices {
        OutcomePrices::new(dec!(0.6), dec!(0.4))
    }

    #[test]
    fn test_high_zscore_bets_no() {
        let strategy = MeanReversionStrategy::new(1.0);
        let indicators = IndicatorSnapshot::default().with("zscore", 2.0);
        assert_eq!(
            strategy.decide("m1", &indicators, &quote()),
            Decision::Bet {
                side: OutcomeSide::No,
                confidence: 0.75
            }
        );
    }

    #[test]
    fn test_low_zscore_bets_yes_with_capped_confidence() {
        let strategy = MeanReversionStrategy::new(1.0);
        let indicators = IndicatorSnapshot::default().with("zscore", -5.0);
        assert_eq!(
            strategy.decide("m1", &indicators, &quote()),
            Decision::Bet {
                side: OutcomeSide::Yes,
                confidence: 1.0
            }
        );
    }

    #[test]
    fn test_skips_inside_band_or_without_quote() {
        let strategy = MeanReversionStrategy::new(1.0);
        let inside = IndicatorSnapshot::default().with("zscore", 0.5);
        assert_eq!(strategy.decide("m1", &inside, &quote()), Decision::Skip);

        let stretched = IndicatorSnapshot::default().with("zscore", 3.0);
        assert_eq!(strategy.decide("m1", &stretched, &OutcomePrices::zero()), Decision::Skip);
    }
}
