//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tracing::info;

use super::AppConfig;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails (including missing take-profit/stop-loss)
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    interval_secs = config.scheduler.interval_secs,
    grace_secs = config.scheduler.grace_secs,
    take_profit = %config.positions.take_profit_pct,
    stop_loss = %config.positions.stop_loss_pct,
    feed = config.feed.enabled,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content)
    .with_context(|| "Failed to parse config.toml")?;

  validate_config(&config)?;
  Ok(config)
}

fn in_unit_interval(value: Decimal) -> bool {
  value > Decimal::ZERO && value <= Decimal::ONE
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - Positive cadences and windows
/// - Fractions and prices in (0, 1]
/// - Consistent stake bounds
/// - Backoff that grows strictly until its cap
fn validate_config(config: &AppConfig) -> Result<()> {
  // Scheduler validation
  anyhow::ensure!(
    config.scheduler.interval_secs > 0,
    "scheduler.interval_secs must be positive"
  );
  anyhow::ensure!(
    config.scheduler.grace_secs >= 0,
    "scheduler.grace_secs must not be negative, got {}",
    config.scheduler.grace_secs
  );
  anyhow::ensure!(
    config.scheduler.staleness_secs > 0,
    "scheduler.staleness_secs must be positive, got {}",
    config.scheduler.staleness_secs
  );
  anyhow::ensure!(
    config.scheduler.max_markets_per_tick > 0,
    "scheduler.max_markets_per_tick must be positive"
  );

  // Betting validation
  let betting = &config.betting;
  anyhow::ensure!(
    (0.0..=1.0).contains(&betting.min_confidence),
    "betting.min_confidence must be in [0, 1], got {}",
    betting.min_confidence
  );
  anyhow::ensure!(
    in_unit_interval(betting.stake_fraction),
    "betting.stake_fraction must be in (0, 1], got {}",
    betting.stake_fraction
  );
  anyhow::ensure!(
    betting.min_stake > Decimal::ZERO && betting.min_stake <= betting.max_stake,
    "betting.min_stake must be positive and <= max_stake ({} vs {})",
    betting.min_stake,
    betting.max_stake
  );
  anyhow::ensure!(
    in_unit_interval(betting.max_entry_price),
    "betting.max_entry_price must be in (0, 1], got {}",
    betting.max_entry_price
  );
  anyhow::ensure!(
    in_unit_interval(betting.max_daily_loss_fraction),
    "betting.max_daily_loss_fraction must be in (0, 1], got {}",
    betting.max_daily_loss_fraction
  );

  // Position thresholds
  anyhow::ensure!(
    config.positions.take_profit_pct > Decimal::ZERO,
    "positions.take_profit_pct must be positive, got {}",
    config.positions.take_profit_pct
  );
  anyhow::ensure!(
    in_unit_interval(config.positions.stop_loss_pct),
    "positions.stop_loss_pct must be in (0, 1], got {}",
    config.positions.stop_loss_pct
  );

  // Feed validation
  let feed = &config.feed;
  anyhow::ensure!(!feed.ws_url.is_empty(), "WebSocket URL must not be empty");
  anyhow::ensure!(
    in_unit_interval(feed.arbitrage_threshold),
    "feed.arbitrage_threshold must be in (0, 1], got {}",
    feed.arbitrage_threshold
  );
  anyhow::ensure!(feed.history_capacity > 0, "feed.history_capacity must be positive");
  anyhow::ensure!(feed.event_buffer > 0, "feed.event_buffer must be positive");
  anyhow::ensure!(
    feed.backoff_initial_ms > 0 && feed.backoff_max_ms >= feed.backoff_initial_ms,
    "feed backoff must satisfy 0 < initial <= max ({} vs {})",
    feed.backoff_initial_ms,
    feed.backoff_max_ms
  );
  anyhow::ensure!(
    feed.backoff_multiplier > 1.0,
    "feed.backoff_multiplier must be > 1, got {}",
    feed.backoff_multiplier
  );
  anyhow::ensure!(
    feed.backoff_jitter >= 0.0 && feed.backoff_jitter < feed.backoff_multiplier - 1.0,
    "feed.backoff_jitter must be in [0, multiplier - 1), got {}",
    feed.backoff_jitter
  );

  // Arbitrage validation
  anyhow::ensure!(
    config.arbitrage.min_margin >= Decimal::ZERO,
    "arbitrage.min_margin must not be negative"
  );
  anyhow::ensure!(
    in_unit_interval(config.arbitrage.stake_fraction),
    "arbitrage.stake_fraction must be in (0, 1], got {}",
    config.arbitrage.stake_fraction
  );

  // Portfolio / API
  anyhow::ensure!(
    config.portfolio.initial_balance > Decimal::ZERO,
    "portfolio.initial_balance must be positive"
  );
  anyhow::ensure!(
    config.api.requests_per_second > 0,
    "api.requests_per_second must be positive"
  );
  anyhow::ensure!(config.api.max_concurrent > 0, "api.max_concurrent must be positive");
  anyhow::ensure!(
    !config.discovery.assets.is_empty() && !config.discovery.timeframes.is_empty(),
    "discovery.assets and discovery.timeframes must not be empty"
  );

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use rust_decimal_macros::dec;

  const MINIMAL: &str = r#"
[bot]
name = "paper"

[positions]
take_profit_pct = 0.5
stop_loss_pct = 0.4
"#;

  #[test]
  fn test_load_nonexistent_file() {
    let result = load_config("nonexistent.toml");
    assert!(result.is_err());
  }

  #[test]
  fn test_minimal_config_takes_defaults() {
    let config = parse_config(MINIMAL).unwrap();
    assert_eq!(config.scheduler.interval_secs, 900);
    assert_eq!(config.scheduler.grace_secs, 300);
    assert_eq!(config.betting.max_stake, dec!(500));
    assert_eq!(config.feed.arbitrage_threshold, dec!(0.99));
    assert_eq!(config.feed.history_capacity, 100);
    assert_eq!(config.positions.take_profit_pct, dec!(0.5));
    assert!(!config.arbitrage.auto_execute);
  }

  #[test]
  fn test_exit_thresholds_are_required() {
    let result = parse_config("[bot]\nname = \"paper\"\n");
    assert!(result.is_err());
  }

  #[test]
  fn test_rejects_jitter_that_breaks_monotonic_backoff() {
    let text = format!("{MINIMAL}\n[feed]\nbackoff_multiplier = 1.5\nbackoff_jitter = 0.6\n");
    assert!(parse_config(&text).is_err());
  }

  #[test]
  fn test_example_config_is_valid() {
    let config = parse_config(include_str!("../../config.example.toml")).unwrap();
    assert_eq!(config.discovery.timeframes, vec!["15m", "1h", "4h"]);
    assert_eq!(config.metrics.health_port, 8080);
  }
}
