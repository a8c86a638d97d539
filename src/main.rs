//! 🧠 Sentinel — Real-Time Memecoin Signal Engine
//!
//! Watches curated-wallet buys and third-party Telegram calls, tracks each
//! admitted token through an adaptive poll loop, scores it against the
//! conviction engine, and posts a signal the moment it clears threshold.
//!
//! ## Architecture
//! - Ingress: typed channels feeding KOL buys / Telegram calls / narrative snapshots
//! - Active Token Tracker: one poll task per tracked token
//! - Conviction Engine: six-phase gated scoring
//! - Publisher: posts passed signals to Telegram, falls back to a file queue
//! - Post-Call Monitor: watches for a post-signal price collapse
//! - Metrics: Prometheus endpoint

mod call_index;
mod config;
mod engine;
mod error;
mod fetcher;
mod ingress;
mod logging;
mod metrics;
mod monitor;
mod narrative;
mod persistence;
mod publisher;
mod tracker;
mod types;
mod wallet_registry;

use anyhow::{Context, Result};
use call_index::TelegramCallIndex;
use config::EngineConfig;
use engine::ml::{MlPredictor, NoopPredictor};
use engine::ConvictionEngine;
use fetcher::Fetcher;
use ingress::Ingress;
use log::{error, info, warn};
use logging::DecisionLogger;
use monitor::PostCallMonitor;
use narrative::NarrativeIndex;
use persistence::{JsonlFallbackStore, JsonlStore, SignalStore};
use publisher::{SignalPublisher, TelegramPublisher};
use std::sync::Arc;
use std::time::Duration;
use tracker::ActiveTokenTracker;
use wallet_registry::WalletRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    metrics::init_metrics();
    info!("✅ Metrics: Initialized");

    let config = Arc::new(EngineConfig::from_env().context("failed to load configuration")?);
    config.validate().context("configuration failed validation")?;
    info!("✅ Configuration: Loaded and validated");

    print_banner(&config);

    let metrics_port = config.metrics.port;
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_port).await {
            error!("❌ Metrics server error: {}", e);
        }
    });
    info!("✅ Metrics: Server started on port {}", metrics_port);

    let fetcher = Arc::new(Fetcher::new(&config));
    let wallets = Arc::new(WalletRegistry::new());
    info!("✅ Wallet registry: Initialized ({} seeded wallets)", wallets.len());

    let calls = Arc::new(TelegramCallIndex::new(Duration::from_secs(86_400)));
    Arc::clone(&calls).start_sweeper(Duration::from_secs(300));
    info!("✅ Telegram call index: Sweeper started");

    let narratives = Arc::new(NarrativeIndex::new());

    let ml: Arc<dyn MlPredictor> = Arc::new(NoopPredictor);
    if config.features.enable_ml_predictions {
        warn!("🧠 ENABLE_ML_PREDICTIONS=true but no real predictor is wired in — falling back to NoopPredictor");
    }

    let engine = Arc::new(ConvictionEngine::new(
        Arc::clone(&config),
        Arc::clone(&fetcher),
        Arc::clone(&narratives),
        ml,
    ));
    info!("✅ Conviction engine: Ready");

    let decision_log = Arc::new(
        DecisionLogger::open(&config.logging.decision_log_path).context("failed to open decision log")?,
    );
    info!("✅ Decision log: {}", config.logging.decision_log_path.display());

    let fallback_path = config.logging.decision_log_path.with_file_name("sentinel_fallback_signals.jsonl");
    let fallback_store = Arc::new(JsonlFallbackStore::new(fallback_path));
    let publisher: Arc<dyn SignalPublisher> = Arc::new(TelegramPublisher::new(&config, fallback_store));
    if !config.publisher_ready() {
        warn!("📱 Publisher gated: missing TELEGRAM_BOT_TOKEN/TELEGRAM_CHAT_ID — signals will queue to the fallback file");
    }

    let store_path = config.logging.decision_log_path.with_file_name("sentinel_signals.jsonl");
    let store: Arc<dyn SignalStore> = Arc::new(JsonlStore::new(store_path));
    if config.credentials.store_url.is_empty() {
        warn!("💾 STORE_URL is empty — signals persist to the local file store only");
    }

    let monitor = Arc::new(PostCallMonitor::new(
        Arc::clone(&config),
        Arc::clone(&fetcher),
        Arc::clone(&store),
        Arc::clone(&publisher),
    ));

    let tracker = Arc::new(ActiveTokenTracker::new(
        Arc::clone(&config),
        Arc::clone(&fetcher),
        Arc::clone(&engine),
        Arc::clone(&wallets),
        Arc::clone(&calls),
        publisher,
        monitor,
        decision_log,
        store,
    ));
    info!("✅ Active token tracker: Ready");

    let ingress = Ingress::spawn(Arc::clone(&tracker), Arc::clone(&narratives));
    info!("✅ Ingress: Channels open for KOL buys, Telegram calls, narrative snapshots");

    // The upstream producers (gRPC wallet watcher, Telegram scraper, narrative
    // trainer) are out of scope; this keeps the senders alive so the ingress
    // tasks don't see their channels close the moment main settles into the
    // shutdown wait.
    let _kol_buys = ingress.kol_buys;
    let _telegram_calls = ingress.telegram_calls;
    let _narrative_snapshots = ingress.narrative_snapshots;

    info!("🚀 Sentinel started — watching for admissions...\n");

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    info!("🛑 Shutdown signal received — cancelling {} active poll loops", tracker.tracked_count());
    tracker.cancel_all();
    tokio::time::sleep(Duration::from_millis(200)).await;

    Ok(())
}

fn print_banner(config: &EngineConfig) {
    println!("\n======================================================================");
    println!("🧠 SENTINEL — REAL-TIME MEMECOIN SIGNAL ENGINE");
    println!("======================================================================");
    println!("⏰ {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
    println!("🎯 Min conviction score: {}", config.thresholds.min_conviction_score);
    println!("🎓 Post-graduation threshold: {}", config.thresholds.post_grad_threshold);
    println!("📊 Metrics: http://localhost:{}/metrics", config.metrics.port);
    println!("📱 Publisher ready: {}", config.publisher_ready());
    println!("======================================================================\n");
}
