//! Atomic JSON Table File - Crash-safe Whole-file Persistence
//!
//! Each table lives in `<name>.json` with two siblings:
//! - `<name>.json.tmp`: write-ahead copy, fsynced before it replaces the canonical file
//! - `<name>.json.bak`: the previous canonical file, kept as the last good backup
//!
//! The canonical file is therefore always a complete old or new version,
//! never a partial write. On load, a missing, unreadable or structurally
//! invalid canonical file falls back to the backup, then to empty; this
//! is logged as an operational error and never fails startup.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, instrument, warn};

use crate::domain::LedgerRecord;
use crate::error::PersistenceError;
use crate::ports::repository::{LoadSource, LoadedTable};

/// On-disk envelope version.
pub const TABLE_VERSION: &str = "1.0";

#[derive(Serialize)]
struct TableEnvelope<'a, T: Serialize> {
    version: &'static str,
    updated_at: chrono::DateTime<Utc>,
    bets: &'a [T],
}

/// One whole-file JSON table with write-ahead and backup siblings.
#[derive(Debug, Clone)]
pub struct AtomicJsonFile {
    /// Path to the canonical file.
    path: PathBuf,
    /// Temporary path for atomic writes.
    tmp_path: PathBuf,
    /// Last good version of the canonical file.
    backup_path: PathBuf,
}

impl AtomicJsonFile {
    pub fn new(dir: &Path, file_name: &str) -> Self {
        Self {
            path: dir.join(file_name),
            tmp_path: dir.join(format!("{file_name}.tmp")),
            backup_path: dir.join(format!("{file_name}.bak")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    /// Write a bet table atomically (tmp → fsync → backup → rename).
    #[instrument(skip(self, records), fields(path = %self.path.display(), count = records.len()))]
    pub async fn write_table<T: Serialize + Sync>(&self, records: &[T]) -> Result<(), PersistenceError> {
        let envelope = TableEnvelope {
            version: TABLE_VERSION,
            updated_at: Utc::now(),
            bets: records,
        };
        let json = serde_json::to_vec_pretty(&envelope)?;
        self.write_bytes(&json).await
    }

    /// Write an arbitrary JSON document atomically.
    pub async fn write_document<T: Serialize + Sync>(&self, value: &T) -> Result<(), PersistenceError> {
        let json = serde_json::to_vec_pretty(value)?;
        self.write_bytes(&json).await
    }

    async fn write_bytes(&self, bytes: &[u8]) -> Result<(), PersistenceError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| PersistenceError::Io { path, source }
        };

        let mut file = fs::File::create(&self.tmp_path)
            .await
            .map_err(io_err(&self.tmp_path))?;
        file.write_all(bytes).await.map_err(io_err(&self.tmp_path))?;
        file.sync_all().await.map_err(io_err(&self.tmp_path))?;
        drop(file);

        // Keep the outgoing version as the backup, but only if it still parses.
        if fs::try_exists(&self.path).await.unwrap_or(false) {
            match read_document(&self.path).await {
                Ok(_) => {
                    fs::copy(&self.path, &self.backup_path)
                        .await
                        .map_err(io_err(&self.backup_path))?;
                }
                Err(e) => warn!(error = %e, "Canonical file invalid, keeping previous backup"),
            }
        }

        fs::rename(&self.tmp_path, &self.path)
            .await
            .map_err(io_err(&self.path))?;

        Ok(())
    }

    /// Load a bet table, degrading to backup or empty on corruption.
    ///
    /// Records that fail to deserialize are kept as VOID placeholders.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn load_table<T: LedgerRecord>(&self) -> LoadedTable<T> {
        let (document, source) = match self.load_document(is_bet_table).await {
            Some(found) => found,
            None => return LoadedTable::empty(),
        };

        let mut voided = 0;
        let records: Vec<T> = document
            .get("bets")
            .and_then(Value::as_array)
            .map(|raw| {
                raw.iter()
                    .map(|value| {
                        serde_json::from_value::<T>(value.clone()).unwrap_or_else(|e| {
                            voided += 1;
                            let record = T::void_placeholder(value);
                            warn!(
                                bet_id = %record.bet_id(),
                                error = %e,
                                "Record missing required fields, loaded as VOID"
                            );
                            record
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        LoadedTable { records, source, voided }
    }

    /// Load a JSON document, trying canonical then backup.
    ///
    /// `check` is the structural validation applied to each candidate.
    pub async fn load_document(&self, check: fn(&Value) -> bool) -> Option<(Value, LoadSource)> {
        let canonical_exists = fs::try_exists(&self.path).await.unwrap_or(false);
        if canonical_exists {
            match read_document(&self.path).await {
                Ok(value) if check(&value) => return Some((value, LoadSource::Canonical)),
                Ok(_) => error!(
                    path = %self.path.display(),
                    "Persisted file failed structural check, trying backup"
                ),
                Err(e) => error!(
                    path = %self.path.display(),
                    error = %e,
                    "Persisted file unreadable, trying backup"
                ),
            }
        }

        if !fs::try_exists(&self.backup_path).await.unwrap_or(false) {
            if canonical_exists {
                error!(path = %self.path.display(), "No backup available, starting empty");
            } else {
                info!(path = %self.path.display(), "No persisted file found, starting fresh");
            }
            return None;
        }

        match read_document(&self.backup_path).await {
            Ok(value) if check(&value) => {
                warn!(
                    path = %self.path.display(),
                    backup = %self.backup_path.display(),
                    "Recovered from last good backup"
                );
                Some((value, LoadSource::Backup))
            }
            Ok(_) => {
                error!(backup = %self.backup_path.display(), "Backup failed structural check, starting empty");
                None
            }
            Err(e) => {
                error!(backup = %self.backup_path.display(), error = %e, "Backup unreadable, starting empty");
                None
            }
        }
    }

    /// Check if the data directory is writable.
    pub async fn is_healthy(&self) -> bool {
        match self.path.parent() {
            Some(dir) => fs::metadata(dir)
                .await
                .map(|m| m.is_dir() && !m.permissions().readonly())
                .unwrap_or(false),
            None => false,
        }
    }
}

/// Structural check for a bet table: an object with a `bets` array.
pub fn is_bet_table(value: &Value) -> bool {
    value.get("bets").is_some_and(Value::is_array)
}

async fn read_document(path: &Path) -> Result<Value, PersistenceError> {
    let bytes = fs::read(path).await.map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_slice(&bytes).map_err(|e| PersistenceError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    if !value.is_object() {
        return Err(PersistenceError::Corrupt {
            path: path.to_path_buf(),
            reason: "top-level value is not an object".to_string(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Bet, BetStatus};

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = AtomicJsonFile::new(dir.path(), "active_bets.json");
        let table: LoadedTable<Bet> = file.load_table().await;
        assert_eq!(table.source, LoadSource::Empty);
        assert!(table.records.is_empty());
    }

    #[tokio::test]
    async fn test_second_write_creates_backup_of_first() {
        let dir = tempfile::tempdir().unwrap();
        let file = AtomicJsonFile::new(dir.path(), "t.json");
        file.write_document(&serde_json::json!({ "bets": [1] })).await.unwrap();
        assert!(!file.backup_path().exists());
        file.write_document(&serde_json::json!({ "bets": [1, 2] })).await.unwrap();

        let backup: Value =
            serde_json::from_slice(&std::fs::read(file.backup_path()).unwrap()).unwrap();
        assert_eq!(backup["bets"].as_array().map(Vec::len), Some(1));
        assert!(!dir.path().join("t.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_structurally_invalid_canonical_uses_backup() {
        let dir = tempfile::tempdir().unwrap();
        let file = AtomicJsonFile::new(dir.path(), "active_bets.json");
        std::fs::write(file.backup_path(), r#"{"version":"1.0","bets":[]}"#).unwrap();
        std::fs::write(file.path(), r#"{"version":"1.0","records":[]}"#).unwrap();

        let table: LoadedTable<Bet> = file.load_table().await;
        assert_eq!(table.source, LoadSource::Backup);
    }

    #[tokio::test]
    async fn test_bad_record_becomes_void_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let file = AtomicJsonFile::new(dir.path(), "active_bets.json");
        std::fs::write(
            file.path(),
            r#"{"version":"1.0","bets":[{"bet_id":"b1","market_id":"m1","extra":true}]}"#,
        )
        .unwrap();

        let table: LoadedTable<Bet> = file.load_table().await;
        assert_eq!(table.voided, 1);
        assert_eq!(table.records[0].bet_id, "b1");
        assert_eq!(table.records[0].status, BetStatus::Void);
    }
}
