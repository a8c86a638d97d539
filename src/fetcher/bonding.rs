//! Bonding-curve API client — `GetBondingCurve` (§4.1). TTL is 5 seconds
//! since this is polled every cycle for pre-graduation tokens.

use super::dex::classify_status;
use super::{build_http_client, retry_with_backoff, BondingCurve, SharedHttp};
use crate::error::SentinelError;
use crate::metrics::{record_cache, record_credit, CallTimer};
use crate::types::TokenAddress;
use serde::Deserialize;
use std::time::Duration;

const PROVIDER: &str = "bonding_curve";

pub struct BondingCurveClient {
    http: SharedHttp,
    cache: super::cache::TtlCache<TokenAddress, BondingCurve>,
}

#[derive(Deserialize)]
struct BondingCurveResponse {
    progress_pct: f64,
    reserves: f64,
    #[serde(default)]
    graduated: bool,
}

impl BondingCurveClient {
    pub fn new(ttl: Duration) -> Self {
        Self { http: build_http_client(), cache: super::cache::TtlCache::new(ttl) }
    }

    pub async fn get(&self, address: TokenAddress) -> BondingCurve {
        if let Some(cached) = self.cache.get(&address) {
            record_cache("bonding_curve", true);
            return cached;
        }
        record_cache("bonding_curve", false);

        let result = self
            .cache
            .get_or_fetch(&address, || async {
                let data = retry_with_backoff(PROVIDER, || self.fetch(address)).await?;
                record_credit(PROVIDER, 1);
                Ok(data)
            })
            .await;
        match result {
            Ok(data) => data,
            Err(e) => {
                log::warn!("🔌 bonding curve lookup failed for {}: {}", address.short(), e);
                BondingCurve { source_error: Some(e.to_string()), ..Default::default() }
            }
        }
    }

    async fn fetch(&self, address: TokenAddress) -> Result<BondingCurve, SentinelError> {
        let timer = CallTimer::start(PROVIDER);
        let url = format!("https://api.bonding-curve.example/v1/curve/{}", address);
        let response = self.http.get(&url).send().await.map_err(|e| SentinelError::TransientExternal {
            provider: PROVIDER,
            message: e.to_string(),
        })?;
        timer.observe();
        classify_status(response.status())?;

        let body: BondingCurveResponse = response.json().await.map_err(|e| SentinelError::PermanentExternal {
            provider: PROVIDER,
            message: format!("malformed body: {}", e),
        })?;

        Ok(BondingCurve {
            progress_pct: body.progress_pct,
            reserves: body.reserves,
            graduated: body.graduated,
            source_error: None,
        })
    }
}
