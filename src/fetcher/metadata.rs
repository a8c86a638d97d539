//! Metadata client — `GetMetadata`, with batch coalescing (§4.1, §9).
//!
//! Requests arriving within a 1-second window are coalesced into a single
//! batched provider call (up to 100 addresses), via a bounded queue drained
//! by a ticking background task.

use super::dex::classify_status;
use super::{build_http_client, retry_with_backoff, Metadata, SharedHttp};
use crate::error::SentinelError;
use crate::metrics::{record_cache, record_credit, CallTimer};
use crate::types::TokenAddress;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

const PROVIDER: &str = "metadata";
const BATCH_WINDOW: Duration = Duration::from_secs(1);
const BATCH_MAX: usize = 100;
const QUEUE_CAPACITY: usize = 1024;

type PendingRequest = (TokenAddress, oneshot::Sender<Metadata>);

pub struct MetadataClient {
    cache: super::cache::TtlCache<TokenAddress, Metadata>,
    queue_tx: mpsc::Sender<PendingRequest>,
}

impl MetadataClient {
    pub fn new(ttl: Duration) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(QUEUE_CAPACITY);
        let http = build_http_client();
        tokio::spawn(batch_loop(http, queue_rx));
        Self { cache: super::cache::TtlCache::new(ttl), queue_tx }
    }

    pub async fn get(&self, address: TokenAddress) -> Metadata {
        if let Some(cached) = self.cache.get(&address) {
            record_cache("metadata", true);
            return cached;
        }
        record_cache("metadata", false);

        let (tx, rx) = oneshot::channel();
        if self.queue_tx.send((address, tx)).await.is_err() {
            log::error!("🔌 metadata batch loop is gone");
            return Metadata { source_error: Some("metadata worker unavailable".into()), ..Default::default() };
        }

        match rx.await {
            Ok(data) => {
                self.cache.insert(address, data.clone());
                data
            }
            Err(_) => Metadata { source_error: Some("metadata request dropped".into()), ..Default::default() },
        }
    }
}

async fn batch_loop(http: SharedHttp, mut queue_rx: mpsc::Receiver<PendingRequest>) {
    loop {
        let Some(first) = queue_rx.recv().await else { return };
        let mut batch = vec![first];

        let deadline = tokio::time::sleep(BATCH_WINDOW);
        tokio::pin!(deadline);
        while batch.len() < BATCH_MAX {
            tokio::select! {
                _ = &mut deadline => break,
                maybe_next = queue_rx.recv() => {
                    match maybe_next {
                        Some(next) => batch.push(next),
                        None => break,
                    }
                }
            }
        }

        let addresses: Vec<TokenAddress> = batch.iter().map(|(addr, _)| *addr).collect();
        let batch_size = addresses.len() as u64;
        let result = retry_with_backoff(PROVIDER, || fetch_batch(&http, &addresses)).await;

        match result {
            Ok(mut fetched) => {
                record_credit(PROVIDER, batch_size.clamp(1, 2));
                for (address, tx) in batch {
                    let data = fetched.remove(&address).unwrap_or_default();
                    let _ = tx.send(data);
                }
            }
            Err(e) => {
                log::warn!("🔌 metadata batch of {} failed: {}", batch_size, e);
                for (_, tx) in batch {
                    let _ = tx.send(Metadata { source_error: Some(e.to_string()), ..Default::default() });
                }
            }
        }
    }
}

#[derive(Deserialize)]
struct MetadataBatchItem {
    address: String,
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
}

async fn fetch_batch(
    http: &SharedHttp,
    addresses: &[TokenAddress],
) -> Result<HashMap<TokenAddress, Metadata>, SentinelError> {
    let timer = CallTimer::start(PROVIDER);
    let joined: Vec<String> = addresses.iter().map(|a| a.to_string()).collect();

    let response = http
        .post("https://api.metadata-provider.example/v1/batch")
        .json(&serde_json::json!({ "addresses": joined }))
        .send()
        .await
        .map_err(|e| SentinelError::TransientExternal { provider: PROVIDER, message: e.to_string() })?;
    timer.observe();
    classify_status(response.status())?;

    let items: Vec<MetadataBatchItem> = response
        .json()
        .await
        .map_err(|e| SentinelError::PermanentExternal { provider: PROVIDER, message: format!("malformed body: {}", e) })?;

    let mut out = HashMap::with_capacity(items.len());
    for item in items {
        if let Ok(address) = TokenAddress::from_str(&item.address) {
            out.insert(
                address,
                Metadata { symbol: item.symbol, name: item.name, description: item.description, source_error: None },
            );
        }
    }
    Ok(out)
}
