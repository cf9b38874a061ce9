//! Configuration Module - TOML-based Engine Configuration
//!
//! Loads and validates configuration from `config.toml`.
//! Cadences, grace windows, stake sizing and exit thresholds are
//! externalized here - nothing is hardcoded in the usecases layer.
//! Take-profit and stop-loss thresholds have no defaults and must be
//! set explicitly by the operator.

pub mod loader;

use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

/// Top-level engine configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before the engine begins operation.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Identity and logging.
  pub bot: BotConfig,
  /// REST collaborator endpoints.
  #[serde(default)]
  pub api: ApiConfig,
  /// Candidate market filters.
  #[serde(default)]
  pub discovery: DiscoveryConfig,
  /// Tick cadence and settlement timing.
  #[serde(default)]
  pub scheduler: SchedulerConfig,
  /// Stake sizing and opening limits.
  #[serde(default)]
  pub betting: BettingConfig,
  /// Early-exit thresholds (required).
  pub positions: PositionsConfig,
  /// Streaming price feed.
  #[serde(default)]
  pub feed: FeedConfig,
  /// Reaction to arbitrage windows.
  #[serde(default)]
  pub arbitrage: ArbitrageConfig,
  /// Built-in indicator and strategy parameters.
  #[serde(default)]
  pub signals: SignalsConfig,
  /// Paper portfolio.
  #[serde(default)]
  pub portfolio: PortfolioConfig,
  /// Ledger storage.
  #[serde(default)]
  pub persistence: PersistenceConfig,
  /// Metrics and health endpoints.
  #[serde(default)]
  pub metrics: MetricsConfig,
}

/// Engine identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
  /// Human-readable name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

/// REST endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Gamma markets API base URL.
  #[serde(default = "default_gamma_url")]
  pub gamma_url: String,
  /// CLOB REST API base URL.
  #[serde(default = "default_clob_url")]
  pub clob_url: String,
  /// Binance spot API base URL (underlying reference prices).
  #[serde(default = "default_binance_url")]
  pub binance_url: String,
  /// Request timeout in seconds.
  #[serde(default = "default_timeout")]
  pub timeout_seconds: u64,
  /// Retries on 429/5xx/transport errors.
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  /// Client-side request rate limit.
  #[serde(default = "default_requests_per_second")]
  pub requests_per_second: u32,
  /// Maximum concurrent in-flight requests.
  #[serde(default = "default_max_concurrent")]
  pub max_concurrent: usize,
  /// How long a cached quote may stand in for a live one (seconds).
  #[serde(default = "default_quote_cache_ttl")]
  pub quote_cache_ttl_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      gamma_url: default_gamma_url(),
      clob_url: default_clob_url(),
      binance_url: default_binance_url(),
      timeout_seconds: default_timeout(),
      max_retries: default_max_retries(),
      requests_per_second: default_requests_per_second(),
      max_concurrent: default_max_concurrent(),
      quote_cache_ttl_secs: default_quote_cache_ttl(),
    }
  }
}

/// Candidate market filters.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
  /// Asset slugs to scan (`btc`, `eth`, ...).
  #[serde(default = "default_assets")]
  pub assets: Vec<String>,
  /// Window lengths to scan (`15m`, `1h`, `4h`).
  #[serde(default = "default_timeframes")]
  pub timeframes: Vec<String>,
  /// Only markets closing within this many minutes.
  #[serde(default = "default_lookahead_minutes")]
  pub lookahead_minutes: i64,
  /// Upper bound on events scanned per discovery pass.
  #[serde(default = "default_max_events")]
  pub max_events: usize,
}

impl Default for DiscoveryConfig {
  fn default() -> Self {
    Self {
      assets: default_assets(),
      timeframes: default_timeframes(),
      lookahead_minutes: default_lookahead_minutes(),
      max_events: default_max_events(),
    }
  }
}

/// Tick cadence and settlement timing.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
  /// Seconds between ticks.
  #[serde(default = "default_interval")]
  pub interval_secs: u64,
  /// Delay after market close before a bet is due (seconds).
  #[serde(default = "default_grace")]
  pub grace_secs: i64,
  /// Maximum distance between a resolution sample and close (seconds).
  #[serde(default = "default_staleness")]
  pub staleness_secs: i64,
  /// Candidate markets analyzed per tick.
  #[serde(default = "default_max_markets")]
  pub max_markets_per_tick: usize,
}

impl SchedulerConfig {
  pub const fn interval(&self) -> Duration {
    Duration::from_secs(self.interval_secs)
  }

  pub fn grace(&self) -> chrono::Duration {
    chrono::Duration::seconds(self.grace_secs)
  }

  pub fn staleness(&self) -> chrono::Duration {
    chrono::Duration::seconds(self.staleness_secs)
  }
}

impl Default for SchedulerConfig {
  fn default() -> Self {
    Self {
      interval_secs: default_interval(),
      grace_secs: default_grace(),
      staleness_secs: default_staleness(),
      max_markets_per_tick: default_max_markets(),
    }
  }
}

/// Stake sizing and opening limits.
#[derive(Debug, Clone, Deserialize)]
pub struct BettingConfig {
  /// Minimum strategy confidence to open a bet.
  #[serde(default = "default_min_confidence")]
  pub min_confidence: f64,
  /// Stake as a fraction of current cash.
  #[serde(default = "default_stake_fraction")]
  pub stake_fraction: Decimal,
  /// Stake cap.
  #[serde(default = "default_max_stake")]
  pub max_stake: Decimal,
  /// Stakes below this are not placed.
  #[serde(default = "default_min_stake")]
  pub min_stake: Decimal,
  /// Highest acceptable entry price.
  #[serde(default = "default_max_entry_price")]
  pub max_entry_price: Decimal,
  /// Maximum simultaneously active bets.
  #[serde(default = "default_max_open_bets")]
  pub max_open_bets: usize,
  /// Stop opening once today's realized loss exceeds this fraction of the initial balance.
  #[serde(default = "default_max_daily_loss")]
  pub max_daily_loss_fraction: Decimal,
}

impl Default for BettingConfig {
  fn default() -> Self {
    Self {
      min_confidence: default_min_confidence(),
      stake_fraction: default_stake_fraction(),
      max_stake: default_max_stake(),
      min_stake: default_min_stake(),
      max_entry_price: default_max_entry_price(),
      max_open_bets: default_max_open_bets(),
      max_daily_loss_fraction: default_max_daily_loss(),
    }
  }
}

/// Early-exit thresholds, as fractions of the entry price.
#[derive(Debug, Clone, Deserialize)]
pub struct PositionsConfig {
  /// Disable to hold every bet to expiry.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Exit when the position's return reaches this (e.g. 0.5 = +50%).
  pub take_profit_pct: Decimal,
  /// Exit when the position's return falls to minus this.
  pub stop_loss_pct: Decimal,
}

/// Streaming feed configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
  /// Start the feed together with monitoring.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Market-channel WebSocket URL.
  #[serde(default = "default_ws_url")]
  pub ws_url: String,
  /// YES+NO sum below which an arbitrage event fires.
  #[serde(default = "default_arbitrage_threshold")]
  pub arbitrage_threshold: Decimal,
  /// Samples kept per instrument.
  #[serde(default = "default_history_capacity")]
  pub history_capacity: usize,
  /// Bounded event queue to the scheduler.
  #[serde(default = "default_event_buffer")]
  pub event_buffer: usize,
  /// First reconnect delay (milliseconds).
  #[serde(default = "default_backoff_initial")]
  pub backoff_initial_ms: u64,
  /// Reconnect delay cap (milliseconds).
  #[serde(default = "default_backoff_max")]
  pub backoff_max_ms: u64,
  /// Growth factor per failed attempt.
  #[serde(default = "default_backoff_multiplier")]
  pub backoff_multiplier: f64,
  /// Random stretch of each delay, as a fraction of it.
  #[serde(default = "default_backoff_jitter")]
  pub backoff_jitter: f64,
}

impl Default for FeedConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      ws_url: default_ws_url(),
      arbitrage_threshold: default_arbitrage_threshold(),
      history_capacity: default_history_capacity(),
      event_buffer: default_event_buffer(),
      backoff_initial_ms: default_backoff_initial(),
      backoff_max_ms: default_backoff_max(),
      backoff_multiplier: default_backoff_multiplier(),
      backoff_jitter: default_backoff_jitter(),
    }
  }
}

/// Reaction to arbitrage events.
#[derive(Debug, Clone, Deserialize)]
pub struct ArbitrageConfig {
  /// Open paired YES+NO bets on qualifying signals.
  #[serde(default)]
  pub auto_execute: bool,
  /// Minimum `threshold − sum` margin to act on.
  #[serde(default = "default_min_margin")]
  pub min_margin: Decimal,
  /// Per-leg stake as a fraction of cash.
  #[serde(default = "default_arb_stake_fraction")]
  pub stake_fraction: Decimal,
}

impl Default for ArbitrageConfig {
  fn default() -> Self {
    Self {
      auto_execute: false,
      min_margin: default_min_margin(),
      stake_fraction: default_arb_stake_fraction(),
    }
  }
}

/// Built-in indicator and strategy parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct SignalsConfig {
  /// Samples required before indicators are computed.
  #[serde(default = "default_min_samples")]
  pub min_samples: usize,
  /// Z-score at which the mean-reversion strategy starts betting.
  #[serde(default = "default_zscore_entry")]
  pub zscore_entry: f64,
}

impl Default for SignalsConfig {
  fn default() -> Self {
    Self {
      min_samples: default_min_samples(),
      zscore_entry: default_zscore_entry(),
    }
  }
}

/// Paper portfolio configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PortfolioConfig {
  /// Starting cash on first run.
  #[serde(default = "default_initial_balance")]
  pub initial_balance: Decimal,
}

impl Default for PortfolioConfig {
  fn default() -> Self {
    Self {
      initial_balance: default_initial_balance(),
    }
  }
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
  /// Directory for ledger and portfolio files.
  #[serde(default = "default_data_dir")]
  pub data_dir: String,
}

impl Default for PersistenceConfig {
  fn default() -> Self {
    Self {
      data_dir: default_data_dir(),
    }
  }
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
  /// Health / status endpoint port.
  #[serde(default = "default_health_port")]
  pub health_port: u16,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
      health_port: default_health_port(),
    }
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

const fn default_true() -> bool {
  true
}

fn default_gamma_url() -> String {
  "https://gamma-api.polymarket.com".to_string()
}

fn default_clob_url() -> String {
  "https://clob.polymarket.com".to_string()
}

fn default_binance_url() -> String {
  "https://api.binance.com".to_string()
}

const fn default_timeout() -> u64 {
  30
}

const fn default_max_retries() -> u32 {
  3
}

const fn default_requests_per_second() -> u32 {
  10
}

const fn default_max_concurrent() -> usize {
  10
}

const fn default_quote_cache_ttl() -> u64 {
  300
}

fn default_assets() -> Vec<String> {
  ["btc", "eth", "sol", "xrp"].iter().map(ToString::to_string).collect()
}

fn default_timeframes() -> Vec<String> {
  ["15m", "1h", "4h"].iter().map(ToString::to_string).collect()
}

const fn default_lookahead_minutes() -> i64 {
  90
}

const fn default_max_events() -> usize {
  2000
}

const fn default_interval() -> u64 {
  900
}

const fn default_grace() -> i64 {
  300
}

const fn default_staleness() -> i64 {
  1800
}

const fn default_max_markets() -> usize {
  5
}

const fn default_min_confidence() -> f64 {
  0.5
}

fn default_stake_fraction() -> Decimal {
  dec!(0.05)
}

fn default_max_stake() -> Decimal {
  dec!(500)
}

fn default_min_stake() -> Decimal {
  dec!(10)
}

fn default_max_entry_price() -> Decimal {
  dec!(0.7)
}

const fn default_max_open_bets() -> usize {
  20
}

fn default_max_daily_loss() -> Decimal {
  dec!(0.2)
}

fn default_ws_url() -> String {
  "wss://ws-subscriptions-clob.polymarket.com/ws/market".to_string()
}

fn default_arbitrage_threshold() -> Decimal {
  dec!(0.99)
}

const fn default_history_capacity() -> usize {
  100
}

const fn default_event_buffer() -> usize {
  1024
}

const fn default_backoff_initial() -> u64 {
  5_000
}

const fn default_backoff_max() -> u64 {
  300_000
}

const fn default_backoff_multiplier() -> f64 {
  2.0
}

const fn default_backoff_jitter() -> f64 {
  0.25
}

fn default_min_margin() -> Decimal {
  dec!(0.01)
}

fn default_arb_stake_fraction() -> Decimal {
  dec!(0.10)
}

const fn default_min_samples() -> usize {
  20
}

const fn default_zscore_entry() -> f64 {
  1.0
}

fn default_initial_balance() -> Decimal {
  dec!(10000)
}

fn default_data_dir() -> String {
  "data".to_string()
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

const fn default_health_port() -> u16 {
  8080
}
