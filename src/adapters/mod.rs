//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (HTTP clients, WebSockets, file I/O). Each
//! sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `api`: Gamma, CLOB and Binance REST collaborators
//! - `feeds`: Polymarket market-channel WebSocket feed
//! - `metrics`: Prometheus metrics export and health checks
//! - `persistence`: crash-safe JSON ledger and portfolio files
//! - `signals`: built-in indicator source and strategy

pub mod api;
pub mod feeds;
pub mod metrics;
pub mod persistence;
pub mod signals;
