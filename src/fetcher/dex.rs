//! DEX aggregator client — primary source for `GetTokenData` (§4.1).

use super::{build_http_client, retry_with_backoff, SharedHttp, TokenData};
use crate::error::SentinelError;
use crate::metrics::{record_cache, record_credit, CallTimer};
use crate::types::TokenAddress;
use serde::Deserialize;
use std::time::Duration;

const PROVIDER: &str = "dex_aggregator";

pub struct DexAggregatorClient {
    http: SharedHttp,
    api_key: Option<String>,
    cache: super::cache::TtlCache<TokenAddress, TokenData>,
}

#[derive(Deserialize)]
struct DexApiResponse {
    #[serde(rename = "priceUsd")]
    price_usd: f64,
    #[serde(rename = "marketCap")]
    market_cap: f64,
    #[serde(rename = "liquidityUsd")]
    liquidity_usd: f64,
    #[serde(rename = "volume24h")]
    volume_24h: f64,
    #[serde(rename = "buys24h")]
    buys_24h: u64,
    #[serde(rename = "sells24h")]
    sells_24h: u64,
    #[serde(rename = "priceChange1h")]
    price_change_1h: f64,
    #[serde(rename = "priceChange6h")]
    price_change_6h: f64,
    #[serde(rename = "priceChange24h")]
    price_change_24h: f64,
    #[serde(default)]
    socials: Vec<String>,
}

impl DexAggregatorClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            http: build_http_client(),
            api_key,
            cache: super::cache::TtlCache::new(Duration::from_secs(30)),
        }
    }

    pub async fn get_token_data(&self, address: TokenAddress) -> Result<TokenData, SentinelError> {
        if let Some(cached) = self.cache.get(&address) {
            record_cache("token_data_dex", true);
            return Ok(cached);
        }
        record_cache("token_data_dex", false);

        let result = self
            .cache
            .get_or_fetch(&address, || async {
                let data = retry_with_backoff(PROVIDER, || self.fetch(address)).await?;
                record_credit(PROVIDER, 1);
                Ok(data)
            })
            .await;
        match result {
            Ok(data) => Ok(data),
            Err(e) => {
                log::warn!("🔌 {} permanently failed for {}: {}", PROVIDER, address.short(), e);
                Ok(TokenData { source_error: Some(e.to_string()), ..Default::default() })
            }
        }
    }

    async fn fetch(&self, address: TokenAddress) -> Result<TokenData, SentinelError> {
        let timer = CallTimer::start(PROVIDER);
        let url = format!("https://api.dexaggregator.example/v1/tokens/{}", address);
        let mut req = self.http.get(&url);
        if let Some(key) = &self.api_key {
            req = req.header("X-Api-Key", key);
        }

        let response = req.send().await.map_err(|e| SentinelError::TransientExternal {
            provider: PROVIDER,
            message: e.to_string(),
        })?;
        timer.observe();

        classify_status(response.status())?;

        let body: DexApiResponse = response.json().await.map_err(|e| SentinelError::PermanentExternal {
            provider: PROVIDER,
            message: format!("malformed body: {}", e),
        })?;

        Ok(TokenData {
            price_usd: body.price_usd,
            market_cap: body.market_cap,
            liquidity_usd: body.liquidity_usd,
            volume_24h: body.volume_24h,
            buys_24h: body.buys_24h,
            sells_24h: body.sells_24h,
            price_change_1h: body.price_change_1h,
            price_change_6h: body.price_change_6h,
            price_change_24h: body.price_change_24h,
            socials: body.socials,
            source_error: None,
        })
    }
}

pub(crate) fn classify_status(status: reqwest::StatusCode) -> Result<(), SentinelError> {
    if status.is_success() {
        return Ok(());
    }
    if status.as_u16() == 429 {
        return Err(SentinelError::RateLimited { provider: PROVIDER, retry_after_ms: 1000 });
    }
    if status.is_server_error() {
        return Err(SentinelError::TransientExternal {
            provider: PROVIDER,
            message: format!("server error {}", status),
        });
    }
    Err(SentinelError::PermanentExternal {
        provider: PROVIDER,
        message: format!("client error {}", status),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_429_as_rate_limited() {
        let status = reqwest::StatusCode::from_u16(429).unwrap();
        let err = classify_status(status).unwrap_err();
        assert!(matches!(err, SentinelError::RateLimited { .. }));
    }

    #[test]
    fn classifies_503_as_transient() {
        let status = reqwest::StatusCode::from_u16(503).unwrap();
        let err = classify_status(status).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn classifies_404_as_permanent() {
        let status = reqwest::StatusCode::from_u16(404).unwrap();
        let err = classify_status(status).unwrap_err();
        assert!(!err.is_retryable());
    }
}
