//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the usecases layer requires
//! from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `MarketDiscovery`: candidate markets and outcome quotes
//! - `Strategy` / `IndicatorSource`: directional decisions
//! - `OutcomeSource`: underlying price history for settlement
//! - `LivePrices`: streaming feed view and events
//! - `LedgerRepository` / `PortfolioRepository`: durable storage

pub mod market_discovery;
pub mod market_feed;
pub mod outcome_source;
pub mod repository;
pub mod strategy;
