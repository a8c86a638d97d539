//! On-chain data provider client — secondary source for `GetTokenData`,
//! sole source for `GetHolders` (§4.1). Holder lookups are the most
//! expensive call (10 credits/miss) and are cached for 120 minutes; whether
//! to call this at all is the engine's Phase 3 eligibility gate, not this
//! client's concern.

use super::dex::classify_status;
use super::{build_http_client, retry_with_backoff, HolderDistribution, SharedHttp, TokenData};
use crate::error::SentinelError;
use crate::metrics::{record_cache, record_credit, CallTimer};
use crate::types::TokenAddress;
use serde::Deserialize;
use std::time::Duration;

const PROVIDER: &str = "onchain";
const HOLDERS_CREDIT_COST: u64 = 10;

pub struct OnChainClient {
    http: SharedHttp,
    api_key: String,
    token_data_cache: super::cache::TtlCache<TokenAddress, TokenData>,
    holders_cache: super::cache::TtlCache<TokenAddress, HolderDistribution>,
}

#[derive(Deserialize)]
struct OnChainTokenResponse {
    #[serde(default)]
    price_usd: f64,
    #[serde(default)]
    liquidity_usd: f64,
    #[serde(default)]
    socials: Vec<String>,
}

#[derive(Deserialize)]
struct HoldersResponse {
    holder_count: u64,
    top10_pct: f64,
    top3_pct: f64,
    top1_pct: f64,
}

impl OnChainClient {
    pub fn new(api_key: String, holders_ttl: Duration) -> Self {
        Self {
            http: build_http_client(),
            api_key,
            token_data_cache: super::cache::TtlCache::new(Duration::from_secs(30)),
            holders_cache: super::cache::TtlCache::new(holders_ttl),
        }
    }

    pub async fn get_token_data(&self, address: TokenAddress) -> Result<TokenData, SentinelError> {
        if let Some(cached) = self.token_data_cache.get(&address) {
            record_cache("token_data_onchain", true);
            return Ok(cached);
        }
        record_cache("token_data_onchain", false);

        self.token_data_cache
            .get_or_fetch(&address, || async {
                let data = retry_with_backoff(PROVIDER, || self.fetch_token_data(address)).await?;
                record_credit(PROVIDER, 1);
                Ok(data)
            })
            .await
    }

    async fn fetch_token_data(&self, address: TokenAddress) -> Result<TokenData, SentinelError> {
        let timer = CallTimer::start(PROVIDER);
        let url = format!("https://api.onchain-provider.example/v1/token/{}?key={}", address, self.api_key);
        let response = self.http.get(&url).send().await.map_err(|e| SentinelError::TransientExternal {
            provider: PROVIDER,
            message: e.to_string(),
        })?;
        timer.observe();
        classify_status(response.status())?;

        let body: OnChainTokenResponse = response.json().await.map_err(|e| SentinelError::PermanentExternal {
            provider: PROVIDER,
            message: format!("malformed body: {}", e),
        })?;

        Ok(TokenData {
            price_usd: body.price_usd,
            liquidity_usd: body.liquidity_usd,
            socials: body.socials,
            ..Default::default()
        })
    }

    pub async fn get_holders(&self, address: TokenAddress) -> HolderDistribution {
        if let Some(cached) = self.holders_cache.get(&address) {
            record_cache("holders", true);
            return cached;
        }
        record_cache("holders", false);

        let result = self
            .holders_cache
            .get_or_fetch(&address, || async {
                let data = retry_with_backoff(PROVIDER, || self.fetch_holders(address)).await?;
                record_credit(PROVIDER, HOLDERS_CREDIT_COST);
                Ok(data)
            })
            .await;
        match result {
            Ok(data) => data,
            Err(e) => {
                log::warn!("🔌 holders lookup failed for {}: {}", address.short(), e);
                HolderDistribution { source_error: Some(e.to_string()), ..Default::default() }
            }
        }
    }

    async fn fetch_holders(&self, address: TokenAddress) -> Result<HolderDistribution, SentinelError> {
        let timer = CallTimer::start(PROVIDER);
        let url = format!(
            "https://api.onchain-provider.example/v1/holders/{}?key={}",
            address, self.api_key
        );
        let response = self.http.get(&url).send().await.map_err(|e| SentinelError::TransientExternal {
            provider: PROVIDER,
            message: e.to_string(),
        })?;
        timer.observe();
        classify_status(response.status())?;

        let body: HoldersResponse = response.json().await.map_err(|e| SentinelError::PermanentExternal {
            provider: PROVIDER,
            message: format!("malformed body: {}", e),
        })?;

        Ok(HolderDistribution {
            holder_count: body.holder_count,
            top10_pct: body.top10_pct,
            top3_pct: body.top3_pct,
            top1_pct: body.top1_pct,
            source_error: None,
        })
    }
}
