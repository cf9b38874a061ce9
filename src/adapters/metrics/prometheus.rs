//! Prometheus Metrics Registry - Paper Trading Observability
//!
//! Registers and exposes Prometheus metrics on :9090 for Grafana
//! dashboards. Covers bet lifecycle counts, balance, sweep health,
//! tick latency and feed health.

use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use tokio::sync::broadcast;
use tracing::{error, info, instrument};

/// Centralized Prometheus metrics for the paper trader.
///
/// All metrics follow the naming convention `paper_trader_*`.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Bets opened, by side and origin.
    pub bets_opened: IntCounterVec,
    /// Bets moved to history, by exit reason.
    pub bets_settled: IntCounterVec,
    /// Settlements deferred for lack of fresh outcome data.
    pub settlements_deferred: IntCounter,
    /// Per-item sweep failures, by sweep.
    pub sweep_errors: IntCounterVec,
    /// Feed reconnect attempts.
    pub feed_reconnects: IntCounter,
    /// Feed messages or events dropped, by reason.
    pub feed_dropped: IntCounterVec,
    /// Arbitrage windows seen on the feed.
    pub arbitrage_signals: IntCounter,
    /// Paper cash balance.
    pub cash_balance: Gauge,
    /// Number of active bets.
    pub active_bets: IntGauge,
    /// Feed subscription status (1 = subscribed).
    pub feed_connected: IntGauge,
    /// Scheduler tick duration in seconds.
    pub tick_duration: Histogram,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let bets_opened = IntCounterVec::new(
            Opts::new("paper_trader_bets_opened_total", "Total paper bets opened"),
            &["side", "origin"],
        )?;

        let bets_settled = IntCounterVec::new(
            Opts::new(
                "paper_trader_bets_settled_total",
                "Total paper bets settled, exited or voided",
            ),
            &["reason"],
        )?;

        let settlements_deferred = IntCounter::new(
            "paper_trader_settlements_deferred_total",
            "Settlements deferred for stale outcome data",
        )?;

        let sweep_errors = IntCounterVec::new(
            Opts::new("paper_trader_sweep_errors_total", "Per-item sweep failures"),
            &["sweep"],
        )?;

        let feed_reconnects = IntCounter::new(
            "paper_trader_feed_reconnects_total",
            "Market feed reconnect attempts",
        )?;

        let feed_dropped = IntCounterVec::new(
            Opts::new(
                "paper_trader_feed_dropped_total",
                "Feed messages or events dropped",
            ),
            &["reason"],
        )?;

        let arbitrage_signals = IntCounter::new(
            "paper_trader_arbitrage_signals_total",
            "Arbitrage windows detected on the feed",
        )?;

        let cash_balance = Gauge::new("paper_trader_cash_balance", "Paper cash balance")?;

        let active_bets = IntGauge::new("paper_trader_active_bets", "Number of active bets")?;

        let feed_connected = IntGauge::new(
            "paper_trader_feed_connected",
            "Feed subscription status (1=subscribed, 0=not)",
        )?;

        let tick_duration = Histogram::with_opts(
            HistogramOpts::new(
                "paper_trader_tick_duration_seconds",
                "Scheduler tick duration in seconds",
            )
            .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        )?;

        // Register all metrics
        registry.register(Box::new(bets_opened.clone()))?;
        registry.register(Box::new(bets_settled.clone()))?;
        registry.register(Box::new(settlements_deferred.clone()))?;
        registry.register(Box::new(sweep_errors.clone()))?;
        registry.register(Box::new(feed_reconnects.clone()))?;
        registry.register(Box::new(feed_dropped.clone()))?;
        registry.register(Box::new(arbitrage_signals.clone()))?;
        registry.register(Box::new(cash_balance.clone()))?;
        registry.register(Box::new(active_bets.clone()))?;
        registry.register(Box::new(feed_connected.clone()))?;
        registry.register(Box::new(tick_duration.clone()))?;

        Ok(Self {
            registry,
            bets_opened,
            bets_settled,
            settlements_deferred,
            sweep_errors,
            feed_reconnects,
            feed_dropped,
            arbitrage_signals,
            cash_balance,
            active_bets,
            feed_connected,
            tick_duration,
        })
    }

    /// Render all metrics in the Prometheus text format.
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics_self = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics_self);
                async move {
                    match metrics.render() {
                        Ok(body) => (StatusCode::OK, body),
                        Err(e) => {
                            error!(error = %e, "Failed to encode metrics");
                            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
                        }
                    }
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_registered_metrics() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.bets_opened.with_label_values(&["YES", "strategy"]).inc();
        metrics.cash_balance.set(9_900.0);

        let text = metrics.render().unwrap();
        assert!(text.contains("paper_trader_bets_opened_total"));
        assert!(text.contains("paper_trader_cash_balance 9900"));
    }
}
