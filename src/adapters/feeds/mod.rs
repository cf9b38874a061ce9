//! Market Data Feed Adapters - Real-time Price Streaming
//!
//! Provides the Polymarket market-channel feed:
//! - `normalize`: raw frames to a single tagged message type
//! - `backoff`: jittered exponential reconnect policy
//! - `polymarket_ws`: the streaming client and its price book
//! - Task Supervisor: starts and stops the feed on demand

pub mod backoff;
pub mod normalize;
pub mod polymarket_ws;
pub mod task_supervisor;

pub use backoff::ReconnectPolicy;
pub use polymarket_ws::{FeedStatsSnapshot, PriceBook, PriceFeed};
pub use task_supervisor::FeedSupervisor;
