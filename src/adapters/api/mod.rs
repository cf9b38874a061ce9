//! REST API Adapters
//!
//! HTTP collaborators of the engine: Gamma market discovery, CLOB and
//! Gamma outcome quotes, and Binance reference prices for settlement.
//!
//! Sub-modules:
//! - `client`: HTTP client with rate limiting and retries
//! - `gamma`: candidate market discovery
//! - `quotes`: layered YES/NO quote lookup
//! - `binance`: underlying price history
//! - `types`: API response type definitions

pub mod binance;
pub mod client;
pub mod gamma;
pub mod quotes;
pub mod types;

pub use binance::BinanceOutcomeSource;
pub use client::{HttpClient, HttpClientConfig};
pub use gamma::GammaDiscovery;
pub use quotes::{ClobMidpoints, GammaOutcomePrices, MarketTokens, QuoteChain, QuoteTier};
