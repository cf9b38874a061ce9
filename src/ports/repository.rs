//! Repository Port - Durable Ledger and Portfolio Storage
//!
//! Two logical bet tables (active, history) plus the portfolio value.
//! Each table is written whole and must survive a crash mid-write:
//! implementations write aside and atomically replace.

use async_trait::async_trait;

use crate::domain::{Bet, Portfolio, SettledBet};
use crate::error::PersistenceError;

/// Where a loaded table came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
  Canonical,
  /// Canonical file was missing or corrupt; last good backup used.
  Backup,
  /// Nothing usable on disk.
  Empty,
}

/// A table loaded at startup.
#[derive(Debug, Clone)]
pub struct LoadedTable<T> {
  pub records: Vec<T>,
  pub source: LoadSource,
  /// Records that failed to parse and were loaded as VOID placeholders.
  pub voided: usize,
}

impl<T> LoadedTable<T> {
  pub const fn empty() -> Self {
    Self {
      records: Vec::new(),
      source: LoadSource::Empty,
      voided: 0,
    }
  }
}

/// Storage for the two bet tables.
#[async_trait]
pub trait LedgerRepository: Send + Sync + 'static {
  /// Load the active table. Corruption degrades to backup or empty.
  async fn load_active(&self) -> Result<LoadedTable<Bet>, PersistenceError>;

  /// Load the history table. Corruption degrades to backup or empty.
  async fn load_history(&self) -> Result<LoadedTable<SettledBet>, PersistenceError>;

  /// Durably replace the active table.
  async fn save_active(&self, bets: &[Bet]) -> Result<(), PersistenceError>;

  /// Durably replace the history table.
  async fn save_history(&self, bets: &[SettledBet]) -> Result<(), PersistenceError>;

  /// Check if the storage is writable.
  async fn is_healthy(&self) -> bool;
}

/// Storage for the portfolio value.
#[async_trait]
pub trait PortfolioRepository: Send + Sync + 'static {
  /// `None` on first run.
  async fn load_portfolio(&self) -> Result<Option<Portfolio>, PersistenceError>;

  async fn save_portfolio(&self, portfolio: &Portfolio) -> Result<(), PersistenceError>;
}
