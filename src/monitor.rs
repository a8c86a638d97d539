//! 👁️ Post-Call Monitor (§4.8)
//!
//! One task per signaled token, spawned by the tracker at the moment a
//! signal posts. Samples price on the same poll cadence shape as the
//! tracker's own loop, emits at most one `ExitAlert`, and exits naturally
//! when the monitoring window elapses without a drop.

use crate::config::EngineConfig;
use crate::fetcher::Fetcher;
use crate::metrics::metrics;
use crate::persistence::SignalStore;
use crate::publisher::SignalPublisher;
use crate::types::{ExitAlert, Signal};
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;

pub struct PostCallMonitor {
    config: Arc<EngineConfig>,
    fetcher: Arc<Fetcher>,
    store: Arc<dyn SignalStore>,
    publisher: Arc<dyn SignalPublisher>,
}

impl PostCallMonitor {
    pub fn new(
        config: Arc<EngineConfig>,
        fetcher: Arc<Fetcher>,
        store: Arc<dyn SignalStore>,
        publisher: Arc<dyn SignalPublisher>,
    ) -> Self {
        Self { config, fetcher, store, publisher }
    }

    /// Spawns the sampling loop for one signal. The token's own poll loop
    /// hands off `cancel` so tracker-side retirement can stop monitoring early.
    pub fn spawn(self: &Arc<Self>, signal: Signal, cancel: CancellationToken) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run(signal, cancel).await;
        });
    }

    async fn run(&self, signal: Signal, cancel: CancellationToken) {
        let deadline = tokio::time::sleep(Duration::from_secs(self.config.monitor.monitoring_duration_secs));
        tokio::pin!(deadline);
        let mut ticker = interval(Duration::from_secs(self.config.monitor.check_interval_secs));
        let started_at = now();
        let mut alerted = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::debug!("👁️ monitor for {} cancelled", signal.symbol);
                    break;
                }
                _ = &mut deadline => {
                    if !alerted {
                        log::info!("👁️ {} exited monitoring window with no alert", signal.symbol);
                    }
                    break;
                }
                _ = ticker.tick() => {
                    if alerted {
                        continue;
                    }
                    if let Some(alert) = self.sample(&signal, started_at).await {
                        alerted = true;
                        metrics().exit_alerts_total.inc();
                        if let Err(e) = self.store.record_exit_alert(&alert).await {
                            log::error!("👁️ failed to persist exit alert for {}: {}", signal.symbol, e);
                        }
                        self.publisher.publish_exit_alert(&signal, &alert).await;
                        log::warn!(
                            "📉 exit alert {} dropped {:.1}% from entry after {}s",
                            signal.symbol, alert.drop_pct, alert.elapsed_seconds
                        );
                    }
                }
            }
        }
    }

    async fn sample(&self, signal: &Signal, started_at: i64) -> Option<ExitAlert> {
        let data = self.fetcher.get_token_data(signal.token).await;
        if data.source_error.is_some() || data.price_usd <= 0.0 {
            return None;
        }

        let drop_pct = (data.price_usd - signal.entry_price) / signal.entry_price * 100.0;
        if drop_pct <= self.config.monitor.exit_alert_threshold_pct {
            let now_ts = now();
            return Some(ExitAlert {
                token: signal.token,
                signal_price: signal.entry_price,
                observed_price: data.price_usd,
                drop_pct,
                elapsed_seconds: (now_ts - started_at).max(0) as u64,
                alerted_at: now_ts,
            });
        }
        None
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_pct_is_negative_when_price_falls() {
        let entry = 1.0;
        let observed = 0.80;
        let drop_pct = (observed - entry) / entry * 100.0;
        assert!((drop_pct - (-20.0)).abs() < 1e-9);
    }
}
