//! Ledger Recovery Tests — Restart and Corruption Handling
//!
//! Reopens the file-backed ledger over the same data directory to check
//! what survives a restart, a truncated write and malformed records.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use tempfile::TempDir;

use polymarket_paper_trader::adapters::persistence::JsonFileRepository;
use polymarket_paper_trader::domain::{Bet, BetOrigin, BetRequest, ExitReason, OutcomeSide};
use polymarket_paper_trader::usecases::{LedgerStore, PortfolioManager};

async fn open(dir: &TempDir) -> (Arc<JsonFileRepository>, LedgerStore<JsonFileRepository>) {
    let repo = Arc::new(JsonFileRepository::from_data_dir(dir.path()).await.unwrap());
    let ledger = LedgerStore::open(Arc::clone(&repo)).await.unwrap();
    (repo, ledger)
}

fn new_bet(market: &str) -> Bet {
    let now = Utc::now();
    Bet::open(
        BetRequest {
            market_id: market.to_string(),
            question: format!("{market} Up or Down?"),
            underlying: "SOLUSDT".to_string(),
            instrument_id: Some(format!("{market}-yes")),
            side: OutcomeSide::No,
            strike: dec!(150),
            stake: dec!(50),
            entry_price: dec!(0.5),
            market_close_at: now + Duration::minutes(15),
            origin: BetOrigin::Strategy,
        },
        now,
        Duration::minutes(5),
    )
    .unwrap()
}

#[tokio::test]
async fn test_active_and_history_survive_restart() {
    let dir = TempDir::new().unwrap();
    let mut ids = Vec::new();
    {
        let (_, ledger) = open(&dir).await;
        for i in 0..5 {
            let bet = new_bet(&format!("m{i}"));
            ids.push(bet.bet_id.clone());
            ledger.add(bet).await.unwrap();
        }
        for id in &ids[..2] {
            ledger.void(id, Utc::now()).await.unwrap();
        }
    }

    let (_, reopened) = open(&dir).await;
    let active: Vec<_> = reopened.list_active().await.into_iter().map(|b| b.bet_id).collect();
    let history = reopened.list_history().await;

    assert_eq!(active, ids[2..].to_vec());
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|s| s.exit_reason == ExitReason::Void));
    assert!(reopened.void(&ids[0], Utc::now()).await.is_err());
}

#[tokio::test]
async fn test_truncated_active_file_recovers_from_backup() {
    let dir = TempDir::new().unwrap();
    let first = new_bet("first");
    {
        let (_, ledger) = open(&dir).await;
        ledger.add(first.clone()).await.unwrap();
        ledger.add(new_bet("second")).await.unwrap();
    }

    // Crash mid-write: the canonical file holds half a document.
    let path = dir.path().join("active_bets.json");
    let content = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, &content[..content.len() / 2]).unwrap();

    let (_, reopened) = open(&dir).await;
    let active = reopened.list_active().await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].bet_id, first.bet_id);
}

#[tokio::test]
async fn test_malformed_record_is_moved_to_history_as_void() {
    let dir = TempDir::new().unwrap();
    let good = new_bet("good");
    {
        let (_, ledger) = open(&dir).await;
        ledger.add(good.clone()).await.unwrap();
    }

    let path = dir.path().join("active_bets.json");
    let mut document: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    document["bets"]
        .as_array_mut()
        .unwrap()
        .push(serde_json::json!({ "bet_id": "broken-1", "market_id": "m-broken" }));
    std::fs::write(&path, serde_json::to_vec(&document).unwrap()).unwrap();

    let (_, reopened) = open(&dir).await;
    let active = reopened.list_active().await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].bet_id, good.bet_id);

    let history = reopened.list_history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].bet_id(), "broken-1");
    assert_eq!(history[0].exit_reason, ExitReason::Void);

    // The repair is persisted: a second restart sees the same split.
    let (_, again) = open(&dir).await;
    assert_eq!(again.active_count().await, 1);
    assert_eq!(again.list_history().await.len(), 1);
}

#[tokio::test]
async fn test_reconcile_debits_bet_recorded_before_crash() {
    let dir = TempDir::new().unwrap();
    let bet = new_bet("crash");
    {
        // The ledger write landed, the debit did not.
        let (_, ledger) = open(&dir).await;
        ledger.add(bet.clone()).await.unwrap();
    }

    let (repo, ledger) = open(&dir).await;
    let portfolio = PortfolioManager::load(repo, dec!(1000)).await.unwrap();
    let report = portfolio
        .reconcile(&ledger.list_active().await, &ledger.list_history().await)
        .await
        .unwrap();

    assert_eq!(report.debited, 1);
    assert_eq!(portfolio.cash_balance().await, dec!(950));

    let again = portfolio
        .reconcile(&ledger.list_active().await, &ledger.list_history().await)
        .await
        .unwrap();
    assert!(again.is_clean());
    assert_eq!(portfolio.cash_balance().await, dec!(950));
}

#[tokio::test]
async fn test_settled_and_active_records_reload_identically() {
    let dir = TempDir::new().unwrap();
    let (active, history) = {
        let (_, ledger) = open(&dir).await;
        let mut bets = Vec::new();
        for i in 0..4 {
            let bet = new_bet(&format!("m{i}"));
            ledger.add(bet.clone()).await.unwrap();
            bets.push(bet);
        }

        let now = Utc::now();
        ledger
            .settle(bets[0].settle_at_expiry(dec!(142.37), "oracle_at_close", now))
            .await
            .unwrap();
        ledger
            .settle(bets[1].settle_early(dec!(0.71), ExitReason::TakeProfit, now))
            .await
            .unwrap();
        ledger.void(&bets[2].bet_id, now).await.unwrap();

        (ledger.list_active().await, ledger.list_history().await)
    };

    assert_eq!(active.len(), 1);
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].realized_pnl, dec!(50));
    assert_eq!(history[1].realized_pnl, dec!(21));

    let (_, reopened) = open(&dir).await;
    assert_eq!(reopened.list_active().await, active);
    assert_eq!(reopened.list_history().await, history);
}
