//! Security-score API client — `GetRugCheck` (§4.1). Once obtained, a
//! result is cached for the rest of the process lifetime (rug risk doesn't
//! meaningfully change poll-to-poll), so this uses a plain concurrent map
//! rather than `TtlCache`.

use super::cache::FetchSlot;
use super::dex::classify_status;
use super::{build_http_client, retry_with_backoff, RugScore, SharedHttp};
use crate::error::SentinelError;
use crate::metrics::{record_cache, record_credit, CallTimer};
use crate::types::TokenAddress;
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Notify;

const PROVIDER: &str = "security_score";

pub struct SecurityScoreClient {
    http: SharedHttp,
    cache: DashMap<TokenAddress, RugScore>,
    in_flight: DashMap<TokenAddress, Arc<Notify>>,
}

#[derive(Deserialize)]
struct RugCheckResponse {
    score: f64,
}

impl SecurityScoreClient {
    pub fn new() -> Self {
        Self { http: build_http_client(), cache: DashMap::new(), in_flight: DashMap::new() }
    }

    /// Single-flight miss coalescing, mirroring `TtlCache::acquire_fetch_slot`
    /// for this client's plain permanent-cache shape.
    async fn acquire_fetch_slot(&self, address: &TokenAddress) -> FetchSlot {
        loop {
            if let Some(entry) = self.in_flight.get(address) {
                let notify = entry.clone();
                drop(entry);
                notify.notified().await;
                if self.cache.contains_key(address) {
                    return FetchSlot::AlreadyFetched;
                }
                continue;
            }
            match self.in_flight.entry(*address) {
                dashmap::mapref::entry::Entry::Vacant(v) => {
                    let notify = Arc::new(Notify::new());
                    v.insert(notify.clone());
                    return FetchSlot::Owner(notify);
                }
                dashmap::mapref::entry::Entry::Occupied(_) => continue,
            }
        }
    }

    fn finish_fetch(&self, address: &TokenAddress) {
        if let Some((_, notify)) = self.in_flight.remove(address) {
            notify.notify_waiters();
        }
    }

    pub async fn get(&self, address: TokenAddress) -> RugScore {
        if let Some(cached) = self.cache.get(&address) {
            record_cache("rug_check", true);
            return cached.clone();
        }
        record_cache("rug_check", false);

        match self.acquire_fetch_slot(&address).await {
            FetchSlot::AlreadyFetched => self.cache.get(&address).expect("winner populated the cache").clone(),
            FetchSlot::Owner(_) => {
                let result = match retry_with_backoff(PROVIDER, || self.fetch(address)).await {
                    Ok(data) => {
                        self.cache.insert(address, data.clone());
                        record_credit(PROVIDER, 1);
                        data
                    }
                    Err(e) => {
                        log::warn!("🔌 rug check failed for {}: {}", address.short(), e);
                        RugScore { source_error: Some(e.to_string()), ..Default::default() }
                    }
                };
                self.finish_fetch(&address);
                result
            }
        }
    }

    async fn fetch(&self, address: TokenAddress) -> Result<RugScore, SentinelError> {
        let timer = CallTimer::start(PROVIDER);
        let url = format!("https://api.security-score.example/v1/rugcheck/{}", address);
        let response = self.http.get(&url).send().await.map_err(|e| SentinelError::TransientExternal {
            provider: PROVIDER,
            message: e.to_string(),
        })?;
        timer.observe();
        classify_status(response.status())?;

        let body: RugCheckResponse = response.json().await.map_err(|e| SentinelError::PermanentExternal {
            provider: PROVIDER,
            message: format!("malformed body: {}", e),
        })?;

        Ok(RugScore { score: body.score, source_error: None })
    }
}

impl Default for SecurityScoreClient {
    fn default() -> Self {
        Self::new()
    }
}
