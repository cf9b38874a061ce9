//! Repository Implementation — File-backed Ledger and Portfolio Storage
//!
//! Three `AtomicJsonFile`s in the data directory:
//! - `active_bets.json`: ACTIVE (and VOID-on-load) bets
//! - `bet_history.json`: settled and voided bets
//! - `portfolio.json`: the paper portfolio
//!
//! This is the hexagonal architecture glue: the usecases layer only
//! knows about the repository traits, never about files or JSON.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tracing::{error, info};

use super::state::AtomicJsonFile;
use crate::domain::{Bet, Portfolio, SettledBet};
use crate::error::PersistenceError;
use crate::ports::repository::{
    LedgerRepository, LoadSource, LoadedTable, PortfolioRepository,
};

pub const ACTIVE_FILE: &str = "active_bets.json";
pub const HISTORY_FILE: &str = "bet_history.json";
pub const PORTFOLIO_FILE: &str = "portfolio.json";

/// Concrete repository adapter over JSON files.
pub struct JsonFileRepository {
    active: AtomicJsonFile,
    history: AtomicJsonFile,
    portfolio: AtomicJsonFile,
}

impl JsonFileRepository {
    /// Create a repository in the given data directory.
    ///
    /// Creates the directory if it doesn't exist.
    pub async fn from_data_dir(data_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = data_dir.as_ref();
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create data directory {}", dir.display()))?;

        info!(path = %dir.display(), "Ledger storage ready");

        Ok(Self {
            active: AtomicJsonFile::new(dir, ACTIVE_FILE),
            history: AtomicJsonFile::new(dir, HISTORY_FILE),
            portfolio: AtomicJsonFile::new(dir, PORTFOLIO_FILE),
        })
    }
}

fn is_portfolio(value: &Value) -> bool {
    value.get("cash_balance").is_some() && value.get("initial_balance").is_some()
}

#[async_trait]
impl LedgerRepository for JsonFileRepository {
    async fn load_active(&self) -> Result<LoadedTable<Bet>, PersistenceError> {
        Ok(self.active.load_table().await)
    }

    async fn load_history(&self) -> Result<LoadedTable<SettledBet>, PersistenceError> {
        Ok(self.history.load_table().await)
    }

    async fn save_active(&self, bets: &[Bet]) -> Result<(), PersistenceError> {
        self.active.write_table(bets).await
    }

    async fn save_history(&self, bets: &[SettledBet]) -> Result<(), PersistenceError> {
        self.history.write_table(bets).await
    }

    async fn is_healthy(&self) -> bool {
        self.active.is_healthy().await && self.history.is_healthy().await
    }
}

#[async_trait]
impl PortfolioRepository for JsonFileRepository {
    async fn load_portfolio(&self) -> Result<Option<Portfolio>, PersistenceError> {
        let Some((value, source)) = self.portfolio.load_document(is_portfolio).await else {
            return Ok(None);
        };
        match serde_json::from_value::<Portfolio>(value) {
            Ok(portfolio) => {
                if source == LoadSource::Backup {
                    info!("Portfolio restored from backup");
                }
                Ok(Some(portfolio))
            }
            Err(e) => {
                error!(error = %e, "Portfolio file invalid, rebuilding from initial balance");
                Ok(None)
            }
        }
    }

    async fn save_portfolio(&self, portfolio: &Portfolio) -> Result<(), PersistenceError> {
        self.portfolio.write_document(portfolio).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_portfolio_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::from_data_dir(dir.path()).await.unwrap();
        assert!(repo.load_portfolio().await.unwrap().is_none());

        let portfolio = Portfolio::new(dec!(10000));
        repo.save_portfolio(&portfolio).await.unwrap();
        let loaded = repo.load_portfolio().await.unwrap().unwrap();
        assert_eq!(loaded, portfolio);
        assert!(repo.is_healthy().await);
    }
}
