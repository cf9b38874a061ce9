//! Gamma Market Discovery - Recurring Up/Down Markets
//!
//! Scans active Gamma events for the recurring `{asset}-updown-{window}-`
//! series and turns the markets closing soon into candidates.
//!
//! Per market:
//! - skipped without volume or outside the lookahead window
//! - underlying is the Binance `{ASSET}USDT` pair
//! - strike is the underlying's price at window open, once the window has opened
//! - YES/NO tokens follow the outcome labels (Up/Yes/Long vs Down/No/Short)

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use super::client::HttpClient;
use super::quotes::{MarketTokens, QuoteChain};
use super::types::{GammaEvent, GammaMarket};
use crate::config::DiscoveryConfig;
use crate::domain::{MarketId, OutcomePrices};
use crate::ports::market_discovery::{CandidateMarket, MarketDiscovery};
use crate::ports::outcome_source::OutcomeSource;

const PAGE_SIZE: usize = 100;

/// Length of a recurring market window.
pub fn window_length(timeframe: &str) -> Option<Duration> {
  match timeframe {
    "15m" => Some(Duration::minutes(15)),
    "1h" => Some(Duration::hours(1)),
    "4h" => Some(Duration::hours(4)),
    _ => None,
  }
}

/// A market that passed the slug, volume and close-time filters.
#[derive(Debug, Clone)]
pub struct Shortlisted {
  pub market: GammaMarket,
  pub market_id: MarketId,
  pub asset: String,
  pub timeframe: String,
  pub close_at: DateTime<Utc>,
}

/// Apply the discovery filters to a page of events, soonest close first.
pub fn shortlist(events: &[GammaEvent], config: &DiscoveryConfig, now: DateTime<Utc>) -> Vec<Shortlisted> {
  let lookahead = Duration::minutes(config.lookahead_minutes);
  let mut picked = Vec::new();

  for event in events {
    let slug = event.slug.to_lowercase();
    let Some((asset, timeframe)) = match_series(&slug, config) else {
      continue;
    };

    for market in &event.markets {
      let (Some(market_id), Some(close_at)) = (market.market_id(), market.end_time()) else {
        continue;
      };
      if market.volume() <= Decimal::ZERO {
        continue;
      }
      let remaining = close_at - now;
      if remaining <= Duration::zero() || remaining > lookahead {
        continue;
      }
      picked.push(Shortlisted {
        market: market.clone(),
        market_id,
        asset: asset.clone(),
        timeframe: timeframe.clone(),
        close_at,
      });
    }
  }

  picked.sort_by_key(|s| s.close_at);
  picked
}

fn match_series(slug: &str, config: &DiscoveryConfig) -> Option<(String, String)> {
  config.assets.iter().find_map(|asset| {
    config
      .timeframes
      .iter()
      .find(|tf| slug.contains(&format!("{}-updown-{}-", asset.to_lowercase(), tf.to_lowercase())))
      .map(|tf| (asset.to_lowercase(), tf.to_lowercase()))
  })
}

/// `MarketDiscovery` backed by the Gamma API.
pub struct GammaDiscovery {
  client: Arc<HttpClient>,
  gamma_url: String,
  config: DiscoveryConfig,
  outcomes: Arc<dyn OutcomeSource>,
  quotes: QuoteChain,
  known: RwLock<HashMap<MarketId, MarketTokens>>,
}

impl GammaDiscovery {
  pub fn new(
    client: Arc<HttpClient>,
    gamma_url: &str,
    config: DiscoveryConfig,
    outcomes: Arc<dyn OutcomeSource>,
    quotes: QuoteChain,
  ) -> Self {
    Self {
      client,
      gamma_url: gamma_url.trim_end_matches('/').to_string(),
      config,
      outcomes,
      quotes,
      known: RwLock::new(HashMap::new()),
    }
  }

  async fn fetch_events(&self) -> Result<Vec<GammaEvent>> {
    let url = format!("{}/events", self.gamma_url);
    let mut events = Vec::new();
    let mut offset = 0;

    while offset < self.config.max_events {
      let page: Vec<GammaEvent> = self
        .client
        .get_json(
          &url,
          &[
            ("active", "true".to_string()),
            ("closed", "false".to_string()),
            ("limit", PAGE_SIZE.to_string()),
            ("offset", offset.to_string()),
          ],
        )
        .await
        .with_context(|| format!("Failed to fetch events at offset {offset}"))?;

      let count = page.len();
      events.extend(page);
      if count < PAGE_SIZE {
        break;
      }
      offset += PAGE_SIZE;
    }

    debug!(events = events.len(), "Gamma events fetched");
    Ok(events)
  }

  /// Underlying price at window open; `None` before the window opens
  /// or when no sample exists.
  async fn strike(&self, underlying: &str, timeframe: &str, close_at: DateTime<Utc>, now: DateTime<Utc>) -> Option<Decimal> {
    let opens_at = close_at - window_length(timeframe)?;
    if opens_at > now {
      return None;
    }
    match self.outcomes.sample_at_or_before(underlying, opens_at).await {
      Ok(sample) => sample.map(|s| s.price),
      Err(e) => {
        warn!(underlying, error = %e, "Strike lookup failed");
        None
      }
    }
  }

  async fn tokens_for(&self, market_id: &str) -> MarketTokens {
    self
      .known
      .read()
      .await
      .get(market_id)
      .cloned()
      .unwrap_or_else(|| MarketTokens {
        market_id: market_id.to_string(),
        ..MarketTokens::default()
      })
  }
}

#[async_trait]
impl MarketDiscovery for GammaDiscovery {
  #[instrument(skip(self))]
  async fn list_candidate_markets(&self) -> Result<Vec<CandidateMarket>> {
    let now = Utc::now();
    let events = self.fetch_events().await?;
    let shortlisted = shortlist(&events, &self.config, now);

    let mut candidates = Vec::with_capacity(shortlisted.len());
    for item in shortlisted {
      let underlying = format!("{}USDT", item.asset.to_uppercase());
      let strike = self.strike(&underlying, &item.timeframe, item.close_at, now).await;
      let (yes_token, no_token) = item.market.tokens();

      self.known.write().await.insert(
        item.market_id.clone(),
        MarketTokens {
          market_id: item.market_id.clone(),
          yes_token: yes_token.clone(),
          no_token: no_token.clone(),
        },
      );

      candidates.push(CandidateMarket {
        market_id: item.market_id,
        question: item.market.question,
        strike,
        close_at: item.close_at,
        underlying,
        yes_token,
        no_token,
      });
    }

    info!(candidates = candidates.len(), "Candidate markets discovered");
    Ok(candidates)
  }

  async fn get_outcome_prices(&self, market_id: &str) -> Result<OutcomePrices> {
    let tokens = self.tokens_for(market_id).await;
    Ok(self.quotes.quote(&tokens).await)
  }
}
