//! REST HTTP Client - Rate-limited JSON Client
//!
//! Wraps reqwest with a governor rate limiter, a concurrency semaphore
//! and exponential retries for the Gamma, CLOB and Binance REST APIs.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{Context, Result};
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::ApiConfig;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Configuration for the HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
  /// Request timeout.
  pub timeout: Duration,
  /// Maximum concurrent requests.
  pub max_concurrent: usize,
  /// Maximum retries on transient errors.
  pub max_retries: u32,
  /// Base delay between retries (exponential backoff).
  pub retry_base_delay: Duration,
  /// Sustained request rate.
  pub requests_per_second: NonZeroU32,
}

impl Default for HttpClientConfig {
  fn default() -> Self {
    Self {
      timeout: Duration::from_secs(15),
      max_concurrent: 8,
      max_retries: 3,
      retry_base_delay: Duration::from_millis(200),
      requests_per_second: NonZeroU32::MIN.saturating_add(9),
    }
  }
}

impl HttpClientConfig {
  pub fn from_api(config: &ApiConfig) -> Self {
    Self {
      timeout: Duration::from_secs(config.timeout_seconds),
      max_concurrent: config.max_concurrent.max(1),
      max_retries: config.max_retries,
      requests_per_second: NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN),
      ..Self::default()
    }
  }
}

/// Rate-limited HTTP client shared by the REST adapters.
pub struct HttpClient {
  http: Client,
  config: HttpClientConfig,
  limiter: DirectLimiter,
  semaphore: Semaphore,
}

impl HttpClient {
  pub fn new(config: HttpClientConfig) -> Result<Self> {
    let http = Client::builder()
      .timeout(config.timeout)
      .pool_max_idle_per_host(5)
      .build()
      .context("Failed to build HTTP client")?;

    Ok(Self {
      http,
      limiter: RateLimiter::direct(Quota::per_second(config.requests_per_second)),
      semaphore: Semaphore::new(config.max_concurrent),
      config,
    })
  }

  /// GET `url` with query parameters and decode the JSON body.
  pub async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
    let _permit = self
      .semaphore
      .acquire()
      .await
      .context("Semaphore closed")?;

    let mut last_error = None;

    for attempt in 0..=self.config.max_retries {
      if attempt > 0 {
        let delay = self.config.retry_base_delay * 2u32.saturating_pow(attempt - 1);
        debug!(attempt, delay_ms = delay.as_millis(), "Retrying request");
        sleep(delay).await;
      }

      self.limiter.until_ready().await;

      match self.http.get(url).query(query).send().await {
        Ok(response) => match response.status() {
          status if status.is_success() => {
            return response
              .json::<T>()
              .await
              .with_context(|| format!("Failed to decode response from {url}"));
          }
          StatusCode::TOO_MANY_REQUESTS => {
            warn!(url, "Rate limited, backing off");
            sleep(Duration::from_secs(2)).await;
            last_error = Some(anyhow::anyhow!("Rate limited"));
          }
          status if status.is_server_error() => {
            warn!(url, status = %status, "Server error, retrying");
            last_error = Some(anyhow::anyhow!("Server error: {status}"));
          }
          status => {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("API error {status} from {url}: {body}"));
          }
        },
        Err(e) => {
          warn!(url, error = %e, attempt, "Request failed");
          last_error = Some(e.into());
        }
      }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Max retries exceeded")))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_config_from_api_clamps_zero_values() {
    let api = ApiConfig {
      requests_per_second: 0,
      max_concurrent: 0,
      ..ApiConfig::default()
    };
    let config = HttpClientConfig::from_api(&api);
    assert_eq!(config.requests_per_second.get(), 1);
    assert_eq!(config.max_concurrent, 1);
  }

  #[tokio::test]
  async fn test_unreachable_host_errors_after_retries() {
    let client = HttpClient::new(HttpClientConfig {
      max_retries: 1,
      retry_base_delay: Duration::from_millis(1),
      timeout: Duration::from_millis(200),
      ..HttpClientConfig::default()
    })
    .unwrap();
    let result: Result<serde_json::Value> = client.get_json("http://127.0.0.1:9/none", &[]).await;
    assert!(result.is_err());
  }
}
