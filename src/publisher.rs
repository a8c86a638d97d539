//! 📱 Publisher (§4.7)
//!
//! Posts a passed signal to Telegram, with a readiness gate (credentials
//! may be absent in a standalone deployment), bounded retry, and a
//! fallback queue so a delivery failure is recorded rather than silently
//! dropped.

use crate::config::EngineConfig;
use crate::error::SentinelError;
use crate::metrics::metrics;
use crate::persistence::FallbackStore;
use crate::types::{ExitAlert, Signal};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait SignalPublisher: Send + Sync {
    /// Attempts delivery; always returns `Ok` — failures are recorded to the
    /// fallback store rather than propagated, since there is no caller left
    /// to retry once this returns (§4.7).
    async fn publish(&self, signal: &Signal) -> PublishOutcome;

    /// Posts an outbound exit alert (§4.8, §6). Best-effort: there is no
    /// fallback queue for exit alerts, only the persisted `ExitAlert` record.
    async fn publish_exit_alert(&self, signal: &Signal, alert: &ExitAlert) -> PublishOutcome;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Delivered,
    Gated,
    FallenBack,
}

pub struct TelegramPublisher {
    http: Client,
    bot_token: String,
    chat_id: String,
    ready: bool,
    fallback: Arc<dyn FallbackStore>,
    /// Rolling count of consecutive delivery failures (§4.7); reset on the
    /// next successful delivery.
    consecutive_failures: AtomicU32,
}

const PROVIDER: &str = "telegram";
const MAX_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_secs(2);
const HEALTH_ERROR_THRESHOLD: u32 = 3;

impl TelegramPublisher {
    pub fn new(config: &EngineConfig, fallback: Arc<dyn FallbackStore>) -> Self {
        Self {
            http: Client::builder().timeout(Duration::from_secs(10)).build().expect("failed to build HTTP client"),
            bot_token: config.credentials.telegram_bot_token.clone(),
            chat_id: config.credentials.telegram_chat_id.clone(),
            ready: config.publisher_ready(),
            fallback,
            consecutive_failures: AtomicU32::new(0),
        }
    }

    /// Bumps the consecutive-failure counter; logs once when it first
    /// crosses the health threshold rather than on every failure after.
    fn note_failure(&self, symbol: &str) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures == HEALTH_ERROR_THRESHOLD {
            log::error!("📱 publisher health: {} consecutive delivery failures (last: {})", failures, symbol);
        }
    }

    fn format_message(signal: &Signal) -> String {
        let narratives =
            if signal.narratives.is_empty() { "none".to_string() } else { signal.narratives.join(", ") };
        format!(
            "🧠 <b>SIGNAL</b> — {}\n\n\
            Token: <code>{}</code>\n\
            Conviction: {}\n\
            Entry: ${:.8}\n\
            Liquidity: ${:.0}\n\
            Buy%: {:.1}%\n\
            KOLs: {}\n\
            Narratives: {}",
            signal.symbol,
            signal.token,
            signal.score,
            signal.entry_price,
            signal.entry_liquidity,
            signal.buy_percentage,
            signal.kol_wallets.len(),
            narratives,
        )
    }

    async fn send(&self, text: &str) -> Result<String, SentinelError> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let payload = json!({ "chat_id": self.chat_id, "text": text, "parse_mode": "HTML" });

        let response = self.http.post(&url).json(&payload).send().await.map_err(|e| SentinelError::TransientExternal {
            provider: PROVIDER,
            message: e.to_string(),
        })?;
        classify_response_status(response.status())?;

        let parsed: serde_json::Value = response.json().await.unwrap_or_default();
        Ok(parsed["result"]["message_id"].to_string())
    }

    fn format_exit_alert_message(signal: &Signal, alert: &ExitAlert) -> String {
        format!(
            "📉 <b>EXIT ALERT</b> — {}\n\n\
            Token: <code>{}</code>\n\
            Entry: ${:.8}\n\
            Now: ${:.8}\n\
            Drop: {:.1}%\n\
            Elapsed: {}s",
            signal.symbol,
            signal.token,
            alert.signal_price,
            alert.observed_price,
            alert.drop_pct,
            alert.elapsed_seconds,
        )
    }
}

/// Bad chat id and message-too-long both come back as 4xx from Telegram and
/// must not be retried (§4.7); 429/5xx are transient.
fn classify_response_status(status: reqwest::StatusCode) -> Result<(), SentinelError> {
    if status.is_success() {
        return Ok(());
    }
    if status.as_u16() == 429 {
        return Err(SentinelError::RateLimited { provider: PROVIDER, retry_after_ms: 1000 });
    }
    if status.is_server_error() {
        return Err(SentinelError::TransientExternal { provider: PROVIDER, message: format!("server error {}", status) });
    }
    Err(SentinelError::PermanentExternal { provider: PROVIDER, message: format!("client error {}", status) })
}

#[async_trait]
impl SignalPublisher for TelegramPublisher {
    async fn publish(&self, signal: &Signal) -> PublishOutcome {
        if !self.ready {
            log::warn!(
                "📱 publisher gated for {} — missing telegram credentials, recording to fallback store",
                signal.symbol
            );
            if let Err(e) = self.fallback.enqueue(signal).await {
                log::error!("📱 fallback store write failed for {}: {}", signal.symbol, e);
            }
            metrics().publisher_failures_total.inc();
            return PublishOutcome::Gated;
        }

        let message = Self::format_message(signal);
        for attempt in 1..=MAX_ATTEMPTS {
            match self.send(&message).await {
                Ok(_message_id) => {
                    self.consecutive_failures.store(0, Ordering::Relaxed);
                    metrics().signals_posted_total.inc();
                    return PublishOutcome::Delivered;
                }
                Err(e) if attempt < MAX_ATTEMPTS && e.is_retryable() => {
                    log::warn!("📱 publish attempt {} failed for {}: {} — retrying", attempt, signal.symbol, e);
                    metrics().publisher_retries_total.inc();
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
                Err(e) => {
                    log::error!("📱 publish failed for {} (not retrying): {}", signal.symbol, e);
                    break;
                }
            }
        }

        self.note_failure(&signal.symbol);
        if let Err(e) = self.fallback.enqueue(signal).await {
            log::error!("📱 fallback store write failed for {}: {}", signal.symbol, e);
        }
        metrics().publisher_failures_total.inc();
        PublishOutcome::FallenBack
    }

    async fn publish_exit_alert(&self, signal: &Signal, alert: &ExitAlert) -> PublishOutcome {
        if !self.ready {
            return PublishOutcome::Gated;
        }

        let message = Self::format_exit_alert_message(signal, alert);
        match self.send(&message).await {
            Ok(_message_id) => {
                self.consecutive_failures.store(0, Ordering::Relaxed);
                PublishOutcome::Delivered
            }
            Err(e) => {
                log::error!("📱 exit alert publish failed for {}: {}", signal.symbol, e);
                self.note_failure(&signal.symbol);
                PublishOutcome::FallenBack
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::JsonlFallbackStore;
    use crate::types::TokenAddress;
    use solana_sdk::pubkey::Pubkey;

    fn signal() -> Signal {
        Signal {
            token: TokenAddress(Pubkey::new_from_array([4u8; 32])),
            score: 60,
            posted_at: 0,
            message_id: None,
            entry_price: 0.002,
            entry_liquidity: 15_000.0,
            buy_percentage: 75.0,
            kol_wallets: Vec::new(),
            narratives: vec!["ai_agents".into()],
            symbol: "AGT".into(),
            delivery_pending: true,
        }
    }

    #[tokio::test]
    async fn gated_publisher_falls_back_without_network_call() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fallback: Arc<dyn FallbackStore> = Arc::new(JsonlFallbackStore::new(dir.path().join("fb.jsonl")));
        let publisher = TelegramPublisher {
            http: Client::new(),
            bot_token: String::new(),
            chat_id: String::new(),
            ready: false,
            fallback,
            consecutive_failures: AtomicU32::new(0),
        };

        let outcome = publisher.publish(&signal()).await;
        assert_eq!(outcome, PublishOutcome::Gated);
    }

    #[test]
    fn message_formatting_includes_symbol_and_narratives() {
        let message = TelegramPublisher::format_message(&signal());
        assert!(message.contains("AGT"));
        assert!(message.contains("ai_agents"));
    }
}
