/*!
 * Prometheus metrics for the signal engine.
 *
 * Mirrors the sibling `execution` service's metrics module: a single
 * `Registry`, metric fields built via `Opts::new` and registered once at
 * construction, exposed over HTTP with axum.
 */

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use log::{error, info};
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;
use tokio::net::TcpListener;

static METRICS: once_cell::sync::Lazy<Arc<SentinelMetrics>> =
    once_cell::sync::Lazy::new(|| Arc::new(SentinelMetrics::new()));

pub struct SentinelMetrics {
    registry: Registry,

    pub admissions_total: IntCounterVec,
    pub signals_posted_total: IntCounter,
    pub exit_alerts_total: IntCounter,
    pub retirements_total: IntCounterVec,

    pub gate_rejections_total: IntCounterVec,

    pub credits_spent_total: IntCounterVec,
    pub cache_hits_total: IntCounterVec,
    pub cache_misses_total: IntCounterVec,

    pub publisher_retries_total: IntCounter,
    pub publisher_failures_total: IntCounter,

    pub tracked_tokens: IntGauge,

    pub poll_cycle_latency: Histogram,
    pub external_call_latency: HistogramVecByProvider,
}

/// Named fields are used elsewhere in this struct for small, known label
/// sets; the provider label here is open-ended, so a real `HistogramVec`
/// is used instead.
pub type HistogramVecByProvider = prometheus::HistogramVec;

impl SentinelMetrics {
    fn new() -> Self {
        let registry = Registry::new();

        let admissions_total = IntCounterVec::new(
            Opts::new("sentinel_admissions_total", "Tokens admitted to the tracker, by source"),
            &["source"],
        )
        .unwrap();
        registry.register(Box::new(admissions_total.clone())).unwrap();

        let signals_posted_total = IntCounter::with_opts(Opts::new(
            "sentinel_signals_posted_total",
            "Signals successfully posted",
        ))
        .unwrap();
        registry.register(Box::new(signals_posted_total.clone())).unwrap();

        let exit_alerts_total = IntCounter::with_opts(Opts::new(
            "sentinel_exit_alerts_total",
            "Exit alerts emitted by the post-call monitor",
        ))
        .unwrap();
        registry.register(Box::new(exit_alerts_total.clone())).unwrap();

        let retirements_total = IntCounterVec::new(
            Opts::new("sentinel_retirements_total", "Tokens retired, by reason"),
            &["reason"],
        )
        .unwrap();
        registry.register(Box::new(retirements_total.clone())).unwrap();

        let gate_rejections_total = IntCounterVec::new(
            Opts::new("sentinel_gate_rejections_total", "Conviction engine gate rejections, by phase"),
            &["phase"],
        )
        .unwrap();
        registry.register(Box::new(gate_rejections_total.clone())).unwrap();

        let credits_spent_total = IntCounterVec::new(
            Opts::new("sentinel_credits_spent_total", "Fetcher credits spent, by provider"),
            &["provider"],
        )
        .unwrap();
        registry.register(Box::new(credits_spent_total.clone())).unwrap();

        let cache_hits_total = IntCounterVec::new(
            Opts::new("sentinel_cache_hits_total", "Cache hits, by kind"),
            &["kind"],
        )
        .unwrap();
        registry.register(Box::new(cache_hits_total.clone())).unwrap();

        let cache_misses_total = IntCounterVec::new(
            Opts::new("sentinel_cache_misses_total", "Cache misses, by kind"),
            &["kind"],
        )
        .unwrap();
        registry.register(Box::new(cache_misses_total.clone())).unwrap();

        let publisher_retries_total = IntCounter::with_opts(Opts::new(
            "sentinel_publisher_retries_total",
            "Publisher post retries",
        ))
        .unwrap();
        registry.register(Box::new(publisher_retries_total.clone())).unwrap();

        let publisher_failures_total = IntCounter::with_opts(Opts::new(
            "sentinel_publisher_failures_total",
            "Publisher posts exhausted after retry",
        ))
        .unwrap();
        registry.register(Box::new(publisher_failures_total.clone())).unwrap();

        let tracked_tokens = IntGauge::with_opts(Opts::new(
            "sentinel_tracked_tokens",
            "Currently live tracked tokens",
        ))
        .unwrap();
        registry.register(Box::new(tracked_tokens.clone())).unwrap();

        let poll_cycle_latency = Histogram::with_opts(
            HistogramOpts::new("sentinel_poll_cycle_latency_seconds", "Per-token poll cycle latency")
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )
        .unwrap();
        registry.register(Box::new(poll_cycle_latency.clone())).unwrap();

        let external_call_latency = prometheus::HistogramVec::new(
            HistogramOpts::new("sentinel_external_call_latency_seconds", "External call latency, by provider")
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["provider"],
        )
        .unwrap();
        registry.register(Box::new(external_call_latency.clone())).unwrap();

        Self {
            registry,
            admissions_total,
            signals_posted_total,
            exit_alerts_total,
            retirements_total,
            gate_rejections_total,
            credits_spent_total,
            cache_hits_total,
            cache_misses_total,
            publisher_retries_total,
            publisher_failures_total,
            tracked_tokens,
            poll_cycle_latency,
            external_call_latency,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

pub fn metrics() -> Arc<SentinelMetrics> {
    METRICS.clone()
}

pub fn init_metrics() {
    let _ = METRICS.clone();
    info!("📊 Metrics initialized");
}

pub async fn start_metrics_server(port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    info!("📊 Starting metrics server on {}", addr);

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler));

    let listener = TcpListener::bind(&addr).await?;
    info!("✓ Metrics server listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn metrics_handler() -> Response {
    let metrics = METRICS.clone();
    let encoder = prometheus::TextEncoder::new();
    match encoder.encode_to_string(&metrics.registry().gather()) {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("failed to encode metrics: {}", e))
                .into_response()
        }
    }
}

async fn health_handler() -> Response {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"healthy","service":"sentinel"}"#,
    )
        .into_response()
}

/// Records a credit charge for an external call. A cache hit never calls this.
pub fn record_credit(provider: &str, units: u64) {
    metrics()
        .credits_spent_total
        .with_label_values(&[provider])
        .inc_by(units);
}

pub fn record_cache(kind: &str, hit: bool) {
    let m = metrics();
    if hit {
        m.cache_hits_total.with_label_values(&[kind]).inc();
    } else {
        m.cache_misses_total.with_label_values(&[kind]).inc();
    }
}

pub struct CallTimer {
    provider: &'static str,
    start: std::time::Instant,
}

impl CallTimer {
    pub fn start(provider: &'static str) -> Self {
        Self { provider, start: std::time::Instant::now() }
    }

    pub fn observe(self) {
        let elapsed = self.start.elapsed().as_secs_f64();
        metrics()
            .external_call_latency
            .with_label_values(&[self.provider])
            .observe(elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        init_metrics();
        let m = metrics();
        m.signals_posted_total.inc();
        assert!(m.signals_posted_total.get() > 0);
    }

    #[test]
    fn credit_and_cache_helpers_do_not_panic() {
        record_credit("dex_aggregator", 1);
        record_cache("metadata", true);
        record_cache("holders", false);
    }
}
