//! Ledger Store - Durable Active and History Bet Tables
//!
//! Single owner of the bet records. Every mutation happens under one
//! async mutex that is held across the durable write, so a bet is never
//! visible in both tables and never settled twice.
//!
//! Write order for a terminal transition:
//! 1. history (with the new record) is made durable
//! 2. active (without it) is made durable
//!
//! A failure at step 1 rolls the in-memory change back. A failure at
//! step 2 keeps the transition; the active table is rewritten by the
//! next mutation and startup drops active entries already in history.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use crate::domain::{Bet, BetId, SettledBet};
use crate::error::LedgerError;
use crate::ports::repository::{LedgerRepository, LoadSource};

#[derive(Debug, Default)]
struct LedgerState {
  active: Vec<Bet>,
  history: Vec<SettledBet>,
  settled_ids: HashSet<BetId>,
  /// Active table on disk is behind memory.
  active_dirty: bool,
}

impl LedgerState {
  fn contains(&self, bet_id: &str) -> bool {
    self.settled_ids.contains(bet_id) || self.active.iter().any(|b| b.bet_id == bet_id)
  }
}

/// Durable, crash-consistent store of bet records.
pub struct LedgerStore<R: LedgerRepository> {
  repo: Arc<R>,
  state: Mutex<LedgerState>,
}

impl<R: LedgerRepository> LedgerStore<R> {
  /// Load both tables and repair any half-finished transition.
  ///
  /// Corrupt files degrade to backup or empty inside the repository;
  /// only an I/O failure on read is returned.
  #[instrument(skip(repo))]
  pub async fn open(repo: Arc<R>) -> Result<Self, LedgerError> {
    let active = repo.load_active().await?;
    let history = repo.load_history().await?;
    let now = Utc::now();

    for (table, source, voided) in [
      ("active", active.source, active.voided),
      ("history", history.source, history.voided),
    ] {
      if source == LoadSource::Backup {
        error!(table, "Ledger table recovered from backup");
      }
      if voided > 0 {
        warn!(table, voided, "Unreadable ledger records loaded as VOID");
      }
    }

    let mut state = LedgerState {
      settled_ids: history.records.iter().map(|s| s.bet_id().to_string()).collect(),
      history: history.records,
      ..LedgerState::default()
    };

    let mut repaired = 0usize;
    let mut moved = 0usize;
    for bet in active.records {
      if state.settled_ids.contains(&bet.bet_id) {
        warn!(bet_id = %bet.bet_id, "Dropping active entry already in history");
        repaired += 1;
      } else if state.active.iter().any(|b| b.bet_id == bet.bet_id) {
        warn!(bet_id = %bet.bet_id, "Dropping duplicate active entry");
        repaired += 1;
      } else if !bet.is_active() {
        warn!(bet_id = %bet.bet_id, status = %bet.status, "Moving non-active entry to history");
        state.settled_ids.insert(bet.bet_id.clone());
        state.history.push(bet.void(now));
        moved += 1;
      } else {
        state.active.push(bet);
      }
    }

    if moved > 0 {
      if let Err(e) = repo.save_history(&state.history).await {
        error!(error = %e, "Failed to persist repaired history table");
      }
    }
    if repaired + moved > 0 {
      match repo.save_active(&state.active).await {
        Ok(()) => info!(repaired, moved, "Ledger repaired on startup"),
        Err(e) => {
          error!(error = %e, "Failed to persist repaired active table");
          state.active_dirty = true;
        }
      }
    }

    info!(
      active = state.active.len(),
      history = state.history.len(),
      "Ledger loaded"
    );

    Ok(Self {
      repo,
      state: Mutex::new(state),
    })
  }

  /// Record a new ACTIVE bet.
  #[instrument(skip(self, bet), fields(bet_id = %bet.bet_id))]
  pub async fn add(&self, bet: Bet) -> Result<(), LedgerError> {
    let mut state = self.state.lock().await;
    if state.contains(&bet.bet_id) {
      return Err(LedgerError::DuplicateId(bet.bet_id));
    }

    state.active.push(bet);
    if let Err(e) = self.repo.save_active(&state.active).await {
      state.active.pop();
      error!(error = %e, "Failed to persist new bet, rolled back");
      return Err(LedgerError::Unavailable(e));
    }
    state.active_dirty = false;
    Ok(())
  }

  /// Move a bet from active to history as one indivisible step.
  ///
  /// `AlreadySettled` when the id is in history, `NotFound` when it is
  /// in neither table.
  #[instrument(skip(self, settled), fields(bet_id = %settled.bet_id()))]
  pub async fn settle(&self, settled: SettledBet) -> Result<(), LedgerError> {
    let mut state = self.state.lock().await;
    let bet_id = settled.bet_id().to_string();
    if state.settled_ids.contains(&bet_id) {
      return Err(LedgerError::AlreadySettled(bet_id));
    }
    let Some(index) = state.active.iter().position(|b| b.bet_id == bet_id) else {
      return Err(LedgerError::NotFound(bet_id));
    };

    let bet = state.active.remove(index);
    state.history.push(settled);
    state.settled_ids.insert(bet_id.clone());

    if let Err(e) = self.repo.save_history(&state.history).await {
      state.history.pop();
      state.settled_ids.remove(&bet_id);
      state.active.insert(index, bet);
      error!(error = %e, "Failed to persist history, settlement rolled back");
      return Err(LedgerError::Unavailable(e));
    }

    match self.repo.save_active(&state.active).await {
      Ok(()) => state.active_dirty = false,
      Err(e) => {
        error!(
          error = %e,
          "History written but active table not; will rewrite on next mutation"
        );
        state.active_dirty = true;
      }
    }
    Ok(())
  }

  /// Terminal VOID transition for a bet whose opening was never confirmed.
  pub async fn void(&self, bet_id: &str, at: DateTime<Utc>) -> Result<SettledBet, LedgerError> {
    let bet = self
      .get_active(bet_id)
      .await
      .ok_or_else(|| LedgerError::NotFound(bet_id.to_string()))?;
    let voided = bet.void(at);
    self.settle(voided.clone()).await?;
    Ok(voided)
  }

  /// Snapshot of the active table.
  pub async fn list_active(&self) -> Vec<Bet> {
    self.state.lock().await.active.clone()
  }

  /// Snapshot of the history table.
  pub async fn list_history(&self) -> Vec<SettledBet> {
    self.state.lock().await.history.clone()
  }

  pub async fn get_active(&self, bet_id: &str) -> Option<Bet> {
    let state = self.state.lock().await;
    state.active.iter().find(|b| b.bet_id == bet_id).cloned()
  }

  /// ACTIVE bets whose settlement deadline has passed.
  pub async fn due_for_settlement(&self, now: DateTime<Utc>) -> Vec<Bet> {
    let state = self.state.lock().await;
    state.active.iter().filter(|b| b.is_due(now)).cloned().collect()
  }

  pub async fn has_active_for_market(&self, market_id: &str) -> bool {
    let state = self.state.lock().await;
    state.active.iter().any(|b| b.market_id == market_id)
  }

  pub async fn active_count(&self) -> usize {
    self.state.lock().await.active.len()
  }

  /// Storage writable and no deferred active rewrite pending.
  pub async fn is_healthy(&self) -> bool {
    let dirty = self.state.lock().await.active_dirty;
    !dirty && self.repo.is_healthy().await
  }
}
