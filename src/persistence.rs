//! 💾 Persistence interfaces (§6 "Persisted state").
//!
//! The relational store itself (the system of record other services query)
//! is out of scope for this crate — only the interface and a file-backed
//! default live here, so the engine runs standalone without a database and
//! a real `SignalStore` can be dropped in without touching call sites.

use crate::types::{ExitAlert, Signal};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn record_signal(&self, signal: &Signal) -> anyhow::Result<()>;
    async fn record_exit_alert(&self, alert: &ExitAlert) -> anyhow::Result<()>;
}

/// Append-only JSON-lines file, used both as the standalone `SignalStore`
/// and as the publisher's fallback queue when Telegram delivery fails
/// (§4.7 "never silently drop").
pub struct JsonlStore {
    path: PathBuf,
    file: Mutex<Option<tokio::fs::File>>,
}

impl JsonlStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path, file: Mutex::new(None) }
    }

    async fn append(&self, line: String) -> anyhow::Result<()> {
        let mut guard = self.file.lock().await;
        if guard.is_none() {
            if let Some(parent) = self.path.parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            *guard = Some(
                tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)
                    .await?,
            );
        }
        let file = guard.as_mut().expect("just initialized");
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl SignalStore for JsonlStore {
    async fn record_signal(&self, signal: &Signal) -> anyhow::Result<()> {
        self.append(serde_json::to_string(signal)?).await
    }

    async fn record_exit_alert(&self, alert: &ExitAlert) -> anyhow::Result<()> {
        self.append(serde_json::to_string(alert)?).await
    }
}

/// The publisher's undeliverable-signal queue (§4.7): every signal that
/// could not be posted to Telegram lands here instead of being dropped.
#[async_trait]
pub trait FallbackStore: Send + Sync {
    async fn enqueue(&self, signal: &Signal) -> anyhow::Result<()>;
}

pub struct JsonlFallbackStore {
    inner: Arc<JsonlStore>,
}

impl JsonlFallbackStore {
    pub fn new(path: PathBuf) -> Self {
        Self { inner: Arc::new(JsonlStore::new(path)) }
    }
}

#[async_trait]
impl FallbackStore for JsonlFallbackStore {
    async fn enqueue(&self, signal: &Signal) -> anyhow::Result<()> {
        self.inner.record_signal(signal).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TokenAddress;
    use solana_sdk::pubkey::Pubkey;

    fn signal() -> Signal {
        Signal {
            token: TokenAddress(Pubkey::new_from_array([3u8; 32])),
            score: 50,
            posted_at: 0,
            message_id: None,
            entry_price: 0.01,
            entry_liquidity: 10_000.0,
            buy_percentage: 70.0,
            kol_wallets: Vec::new(),
            narratives: Vec::new(),
            symbol: "TST".into(),
            delivery_pending: true,
        }
    }

    #[tokio::test]
    async fn jsonl_store_round_trips_a_signal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("signals.jsonl");
        let store = JsonlStore::new(path.clone());
        store.record_signal(&signal()).await.expect("write signal");
        let contents = tokio::fs::read_to_string(&path).await.expect("read back");
        assert!(contents.contains("\"symbol\":\"TST\""));
    }

    #[tokio::test]
    async fn fallback_store_enqueues_to_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fallback.jsonl");
        let store = JsonlFallbackStore::new(path.clone());
        store.enqueue(&signal()).await.expect("enqueue");
        let contents = tokio::fs::read_to_string(&path).await.expect("read back");
        assert_eq!(contents.lines().count(), 1);
    }
}
