//! Polymarket Paper Trader - Entry Point
//!
//! Loads configuration and logging, restores the ledger and portfolio,
//! wires the REST collaborators, feed and scheduler, and runs until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Open the JSON ledger, load the portfolio, reconcile the two
//! 4. Create the HTTP client and the Gamma/CLOB/Binance adapters
//! 5. Create the price feed and its supervisor
//! 6. Create the settlement engine, scheduler and trader service
//! 7. Spawn metrics (:9090) and health (:8080) servers
//! 8. Start monitoring, and the realtime feed when enabled
//! 9. Wait for SIGINT → stop feed and scheduler → exit

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

use polymarket_paper_trader::adapters::api::{
  BinanceOutcomeSource, ClobMidpoints, GammaDiscovery, GammaOutcomePrices, HttpClient, HttpClientConfig, QuoteChain,
  QuoteTier,
};
use polymarket_paper_trader::adapters::feeds::{FeedSupervisor, PriceFeed};
use polymarket_paper_trader::adapters::metrics::{HealthProbe, HealthServer, MetricsRegistry};
use polymarket_paper_trader::adapters::persistence::JsonFileRepository;
use polymarket_paper_trader::adapters::signals::{FeedMomentumIndicators, MeanReversionStrategy};
use polymarket_paper_trader::config;
use polymarket_paper_trader::ports::market_discovery::MarketDiscovery;
use polymarket_paper_trader::ports::market_feed::LivePrices;
use polymarket_paper_trader::ports::outcome_source::OutcomeSource;
use polymarket_paper_trader::usecases::{
  Collaborators, LedgerStore, MonitorScheduler, PortfolioManager, SettlementEngine, TraderService,
};

#[tokio::main]
async fn main() -> Result<()> {
  // ── 1. Load configuration from config.toml ──────────────
  let config_path = std::env::var("PAPER_TRADER_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
  let config = config::loader::load_config(&config_path).context("Failed to load configuration")?;

  // ── 2. Initialize structured JSON logging ───────────────
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.bot.log_level)),
    )
    .json()
    .init();

  info!(
    name = %config.bot.name,
    version = env!("CARGO_PKG_VERSION"),
    interval_secs = config.scheduler.interval_secs,
    feed = config.feed.enabled,
    "Starting Polymarket paper trader"
  );

  let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);
  let metrics = Arc::new(MetricsRegistry::new().context("Failed to create metrics registry")?);

  // ── 3. Ledger and portfolio ─────────────────────────────
  let repo = Arc::new(
    JsonFileRepository::from_data_dir(&config.persistence.data_dir)
      .await
      .context("Failed to open data directory")?,
  );
  let ledger = Arc::new(LedgerStore::open(Arc::clone(&repo)).await.context("Failed to open ledger")?);
  let portfolio = Arc::new(
    PortfolioManager::load(Arc::clone(&repo), config.portfolio.initial_balance)
      .await
      .context("Failed to load portfolio")?,
  );

  let report = portfolio
    .reconcile(&ledger.list_active().await, &ledger.list_history().await)
    .await
    .context("Startup reconciliation failed")?;
  if !report.is_clean() {
    warn!(
      debited = report.debited,
      settled = report.settled,
      released = report.released,
      "Portfolio reconciled with ledger at startup"
    );
  }

  // ── 4. REST collaborators ───────────────────────────────
  let client = Arc::new(
    HttpClient::new(HttpClientConfig::from_api(&config.api)).context("Failed to create HTTP client")?,
  );
  let outcomes: Arc<dyn OutcomeSource> =
    Arc::new(BinanceOutcomeSource::new(Arc::clone(&client), config.api.binance_url.clone()));
  let tiers: Vec<Box<dyn QuoteTier>> = vec![
    Box::new(ClobMidpoints::new(Arc::clone(&client), &config.api.clob_url)),
    Box::new(GammaOutcomePrices::new(Arc::clone(&client), &config.api.gamma_url)),
  ];
  let quotes = QuoteChain::new(tiers, Duration::from_secs(config.api.quote_cache_ttl_secs));
  let discovery: Arc<dyn MarketDiscovery> = Arc::new(GammaDiscovery::new(
    Arc::clone(&client),
    &config.api.gamma_url,
    config.discovery.clone(),
    Arc::clone(&outcomes),
    quotes,
  ));

  // ── 5. Price feed ───────────────────────────────────────
  let (events_tx, events_rx) = mpsc::channel(config.feed.event_buffer.max(1));
  let feed = Arc::new(PriceFeed::new(&config.feed, events_tx, Arc::clone(&metrics)));
  let live_prices: Arc<dyn LivePrices> = feed.book();
  let supervisor = config
    .feed
    .enabled
    .then(|| Arc::new(FeedSupervisor::new(Arc::clone(&feed))));

  // ── 6. Settlement, scheduler, service ───────────────────
  let settlement = Arc::new(SettlementEngine::new(
    Arc::clone(&ledger),
    Arc::clone(&portfolio),
    outcomes,
    config.scheduler.staleness(),
  ));
  let collaborators = Collaborators {
    discovery: Arc::clone(&discovery),
    indicators: Arc::new(FeedMomentumIndicators::new(
      Arc::clone(&live_prices),
      config.signals.min_samples,
    )),
    strategy: Arc::new(MeanReversionStrategy::new(config.signals.zscore_entry)),
    live_prices: config.feed.enabled.then_some(live_prices),
  };
  let mut scheduler = MonitorScheduler::new(
    &config,
    Arc::clone(&ledger),
    Arc::clone(&portfolio),
    settlement,
    collaborators,
    events_rx,
    Arc::clone(&metrics),
  );
  if let Some(supervisor) = &supervisor {
    scheduler = scheduler.with_feed(Arc::clone(supervisor));
  }
  let scheduler = Arc::new(scheduler);
  let service = Arc::new(TraderService::new(ledger, portfolio, scheduler, supervisor, discovery));

  // ── 7. Metrics and health servers ───────────────────────
  let metrics_handle = config.metrics.enabled.then(|| {
    let shutdown = shutdown_tx.subscribe();
    let address = config.metrics.bind_address.clone();
    let registry = Arc::clone(&metrics);
    tokio::spawn(async move {
      if let Err(e) = registry.serve(address, shutdown).await {
        error!(error = %e, "Metrics server failed");
      }
    })
  });

  let probe: Arc<dyn HealthProbe> = service.clone();
  let health = HealthServer::new(probe, config.metrics.health_port);
  let health_shutdown = shutdown_tx.subscribe();
  let health_handle = tokio::spawn(async move {
    if let Err(e) = health.run(health_shutdown).await {
      error!(error = %e, "Health server failed");
    }
  });

  // ── 8. Start monitoring and the feed ────────────────────
  service.start_monitoring().await;
  if config.feed.enabled {
    if let Err(e) = service.start_realtime_feed(None).await {
      warn!(error = %e, "Realtime feed not started; REST quotes only");
    }
  }

  info!("Paper trader running");

  // ── 9. Wait for SIGINT ──────────────────────────────────
  signal::ctrl_c().await.context("Failed to listen for SIGINT")?;
  info!("SIGINT received, initiating graceful shutdown");

  let _ = shutdown_tx.send(());
  if tokio::time::timeout(Duration::from_secs(30), service.shutdown())
    .await
    .is_err()
  {
    warn!("Shutdown timed out waiting for the current tick");
  }

  let _ = tokio::time::timeout(Duration::from_secs(5), health_handle).await;
  if let Some(handle) = metrics_handle {
    let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
  }

  info!("Shutdown complete");
  Ok(())
}
