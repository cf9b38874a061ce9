//! Error taxonomy for the bet-lifecycle engine.
//!
//! Component boundaries return these typed errors so callers can decide
//! per variant: retry, defer, skip or swallow. Adapters and wiring code use
//! `anyhow` with context on top.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

/// Invalid bet construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BetError {
    #[error("entry price {0} outside (0, 1]")]
    InvalidEntryPrice(Decimal),

    #[error("stake {0} must be positive")]
    InvalidStake(Decimal),

    #[error("settlement deadline {deadline} is not after opening time {opened_at}")]
    DeadlineNotAfterOpen {
        deadline: DateTime<Utc>,
        opened_at: DateTime<Utc>,
    },
}

/// Durable storage failures.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// File present but unreadable or structurally invalid.
    #[error("corrupt persisted state at {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Ledger operation failures.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("bet {0} already exists")]
    DuplicateId(String),

    #[error("bet {0} is not in the active set")]
    NotFound(String),

    /// Second settle attempt on an id already in history.
    #[error("bet {0} was already settled")]
    AlreadySettled(String),

    /// The ledger could not be written at all (disk full, permissions).
    #[error("ledger unavailable: {0}")]
    Unavailable(#[from] PersistenceError),
}

/// No trustworthy outcome price; resolution is deferred, never guessed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("stale data for {underlying} at {close_at}: {reasons}")]
    StaleData {
        underlying: String,
        close_at: DateTime<Utc>,
        reasons: String,
    },
}

/// Terminal-transition failures seen by the settlement engine's callers.
#[derive(Error, Debug)]
pub enum SettlementError {
    #[error(transparent)]
    Unresolvable(#[from] ResolutionError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Ledger transition is durable but the cash update was not persisted.
    /// Repaired by portfolio reconciliation.
    #[error("balance update for bet {bet_id} deferred to reconciliation: {source}")]
    BalanceDeferred {
        bet_id: String,
        #[source]
        source: PersistenceError,
    },
}

/// Streaming connection failures; always retried with backoff.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("connect to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    #[error("subscribe failed: {0}")]
    Subscribe(String),

    /// The session had subscribed before it dropped.
    #[error("stream dropped after subscribing: {0}")]
    Stream(String),
}

impl FeedError {
    /// Whether the failed session had reached the subscribed state.
    pub const fn was_subscribed(&self) -> bool {
        matches!(self, Self::Stream(_))
    }
}

/// Indicator or strategy input missing; the market is skipped this tick.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("insufficient data for {market_id}: {reason}")]
pub struct InsufficientData {
    pub market_id: String,
    pub reason: String,
}
