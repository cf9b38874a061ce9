//! Outcome Quotes - Layered YES/NO Price Lookup
//!
//! Tiers are tried in order; the first one with a usable quote wins.
//! When every tier misses, a cached quote younger than the TTL stands in.
//! With nothing at all the chain returns zero/zero, which callers skip.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::client::HttpClient;
use super::types::{GammaMarket, MidpointResponse};
use crate::domain::{InstrumentId, MarketId, OutcomePrices};

/// What a tier may know about a market.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarketTokens {
  pub market_id: MarketId,
  pub yes_token: Option<InstrumentId>,
  pub no_token: Option<InstrumentId>,
}

/// One source of outcome quotes.
#[async_trait]
pub trait QuoteTier: Send + Sync {
  fn name(&self) -> &'static str;

  /// `Ok(None)` when this tier has nothing for the market.
  async fn quote(&self, market: &MarketTokens) -> Result<Option<OutcomePrices>>;
}

/// CLOB midpoints of the outcome tokens.
pub struct ClobMidpoints {
  client: Arc<HttpClient>,
  clob_url: String,
}

impl ClobMidpoints {
  pub fn new(client: Arc<HttpClient>, clob_url: &str) -> Self {
    Self {
      client,
      clob_url: clob_url.trim_end_matches('/').to_string(),
    }
  }

  async fn midpoint(&self, token_id: &str) -> Result<Option<Decimal>> {
    let url = format!("{}/midpoint", self.clob_url);
    let response: MidpointResponse = self
      .client
      .get_json(&url, &[("token_id", token_id.to_string())])
      .await
      .context("Failed to fetch midpoint")?;
    Ok(response.mid())
  }
}

#[async_trait]
impl QuoteTier for ClobMidpoints {
  fn name(&self) -> &'static str {
    "clob_midpoint"
  }

  async fn quote(&self, market: &MarketTokens) -> Result<Option<OutcomePrices>> {
    let Some(yes_token) = &market.yes_token else {
      return Ok(None);
    };
    let Some(yes) = self.midpoint(yes_token).await? else {
      return Ok(None);
    };
    let no = match &market.no_token {
      Some(token) => self.midpoint(token).await?,
      None => Some(Decimal::ONE - yes),
    };
    Ok(no.map(|no| OutcomePrices::new(yes, no)))
  }
}

/// Last traded prices published on the Gamma market document.
pub struct GammaOutcomePrices {
  client: Arc<HttpClient>,
  gamma_url: String,
}

impl GammaOutcomePrices {
  pub fn new(client: Arc<HttpClient>, gamma_url: &str) -> Self {
    Self {
      client,
      gamma_url: gamma_url.trim_end_matches('/').to_string(),
    }
  }
}

#[async_trait]
impl QuoteTier for GammaOutcomePrices {
  fn name(&self) -> &'static str {
    "gamma_outcome_prices"
  }

  async fn quote(&self, market: &MarketTokens) -> Result<Option<OutcomePrices>> {
    let url = format!("{}/markets/{}", self.gamma_url, market.market_id);
    let document: GammaMarket = self
      .client
      .get_json(&url, &[])
      .await
      .context("Failed to fetch Gamma market")?;
    Ok(document.prices().map(|(yes, no)| OutcomePrices::new(yes, no)))
  }
}

fn usable(prices: &OutcomePrices) -> bool {
  prices.yes > Decimal::ZERO && prices.no > Decimal::ZERO
}

/// Ordered tiers plus a TTL cache of the last good quote per market.
pub struct QuoteChain {
  tiers: Vec<Box<dyn QuoteTier>>,
  cache: RwLock<HashMap<MarketId, (OutcomePrices, Instant)>>,
  ttl: Duration,
}

impl QuoteChain {
  pub fn new(tiers: Vec<Box<dyn QuoteTier>>, ttl: Duration) -> Self {
    Self {
      tiers,
      cache: RwLock::new(HashMap::new()),
      ttl,
    }
  }

  pub async fn quote(&self, market: &MarketTokens) -> OutcomePrices {
    for tier in &self.tiers {
      match tier.quote(market).await {
        Ok(Some(prices)) if usable(&prices) => {
          self
            .cache
            .write()
            .await
            .insert(market.market_id.clone(), (prices, Instant::now()));
          return prices;
        }
        Ok(_) => debug!(market_id = %market.market_id, tier = tier.name(), "Quote tier missed"),
        Err(e) => warn!(market_id = %market.market_id, tier = tier.name(), error = %e, "Quote tier failed"),
      }
    }

    if let Some((prices, at)) = self.cache.read().await.get(&market.market_id) {
      if at.elapsed() <= self.ttl {
        debug!(market_id = %market.market_id, age_ms = at.elapsed().as_millis(), "Using cached quote");
        return *prices;
      }
    }

    debug!(market_id = %market.market_id, "No quote available");
    OutcomePrices::zero()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rust_decimal_macros::dec;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct Scripted {
    answers: Vec<Option<OutcomePrices>>,
    calls: AtomicUsize,
  }

  #[async_trait]
  impl QuoteTier for Scripted {
    fn name(&self) -> &'static str {
      "scripted"
    }

    async fn quote(&self, _market: &MarketTokens) -> Result<Option<OutcomePrices>> {
      let i = self.calls.fetch_add(1, Ordering::SeqCst);
      Ok(self.answers.get(i).copied().flatten())
    }
  }

  fn market() -> MarketTokens {
    MarketTokens {
      market_id: "m1".to_string(),
      ..MarketTokens::default()
    }
  }

  #[tokio::test]
  async fn test_cached_quote_covers_a_later_miss() {
    let chain = QuoteChain::new(
      vec![Box::new(Scripted {
        answers: vec![Some(OutcomePrices::new(dec!(0.6), dec!(0.4))), None],
        calls: AtomicUsize::new(0),
      })],
      Duration::from_secs(60),
    );

    assert_eq!(chain.quote(&market()).await.yes, dec!(0.6));
    assert_eq!(chain.quote(&market()).await.no, dec!(0.4));
  }

  #[tokio::test]
  async fn test_zero_quote_is_not_usable() {
    let chain = QuoteChain::new(
      vec![Box::new(Scripted {
        answers: vec![Some(OutcomePrices::new(dec!(0.5), dec!(0)))],
        calls: AtomicUsize::new(0),
      })],
      Duration::ZERO,
    );
    assert!(chain.quote(&market()).await.is_unavailable());
  }
}
