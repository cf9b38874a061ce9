//! Built-in Signals - Feed Indicators and Strategy
//!
//! Default `IndicatorSource` and `Strategy` implementations. Both are
//! replaceable; the scheduler only sees the port traits.

pub mod mean_reversion;
pub mod momentum;

pub use mean_reversion::MeanReversionStrategy;
pub use momentum::FeedMomentumIndicators;
