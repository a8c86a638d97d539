//! 🔌 Fetcher layer — one coherent view of a token's external state.
//!
//! Composes a DEX aggregator, an on-chain data provider, a bonding-curve
//! API, and a security-score API, each behind its own TTL cache and credit
//! counter (§4.1). Provider failures never raise; they come back as a
//! zero-value snapshot carrying `source_error`, and the engine's data-quality
//! gate does the rejecting (§7 propagation policy).

pub mod bonding;
pub mod cache;
pub mod dex;
pub mod metadata;
pub mod onchain;
pub mod security;

use crate::config::EngineConfig;
use crate::types::TokenAddress;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub use bonding::BondingCurveClient;
pub use dex::DexAggregatorClient;
pub use metadata::MetadataClient;
pub use onchain::OnChainClient;
pub use security::SecurityScoreClient;

/// Aggregated view used by the conviction engine (§4.1 `GetTokenData`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenData {
    pub price_usd: f64,
    pub market_cap: f64,
    pub liquidity_usd: f64,
    pub volume_24h: f64,
    pub buys_24h: u64,
    pub sells_24h: u64,
    pub price_change_1h: f64,
    pub price_change_6h: f64,
    pub price_change_24h: f64,
    pub socials: Vec<String>,
    pub source_error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    pub symbol: String,
    pub name: String,
    pub description: String,
    pub source_error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BondingCurve {
    pub progress_pct: f64,
    pub reserves: f64,
    pub graduated: bool,
    pub source_error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HolderDistribution {
    pub holder_count: u64,
    pub top10_pct: f64,
    pub top3_pct: f64,
    pub top1_pct: f64,
    pub source_error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RugScore {
    /// Normalized risk in [0, 10]; higher is worse.
    pub score: f64,
    pub source_error: Option<String>,
}

/// The fetcher's single entry point; each provider client owns its own cache.
pub struct Fetcher {
    pub dex: DexAggregatorClient,
    pub onchain: OnChainClient,
    pub bonding: BondingCurveClient,
    pub security: SecurityScoreClient,
    pub metadata: MetadataClient,
}

impl Fetcher {
    pub fn new(config: &EngineConfig) -> Self {
        let ttls = &config.cache_ttls;
        Self {
            dex: DexAggregatorClient::new(config.credentials.dex_aggregator_key.clone()),
            onchain: OnChainClient::new(
                config.credentials.data_provider_key.clone(),
                Duration::from_secs(ttls.holders_secs),
            ),
            bonding: BondingCurveClient::new(Duration::from_secs(ttls.bonding_curve_secs)),
            security: SecurityScoreClient::new(),
            metadata: MetadataClient::new(Duration::from_secs(ttls.metadata_secs)),
        }
    }

    /// Aggregates `TokenData`: DEX aggregator primary, on-chain secondary,
    /// name/symbol filled from the metadata cache when the DEX response omits
    /// them. Never raises — provider failures surface as `source_error`.
    pub async fn get_token_data(&self, address: TokenAddress) -> TokenData {
        match self.dex.get_token_data(address).await {
            Ok(data) if data.source_error.is_none() => data,
            Ok(mut partial) => {
                if let Ok(secondary) = self.onchain.get_token_data(address).await {
                    merge_token_data(&mut partial, secondary);
                }
                partial
            }
            Err(e) => {
                log::warn!("🔌 dex aggregator failed for {}: {}", address.short(), e);
                match self.onchain.get_token_data(address).await {
                    Ok(data) => data,
                    Err(e2) => TokenData {
                        source_error: Some(format!("both sources failed: {} / {}", e, e2)),
                        ..Default::default()
                    },
                }
            }
        }
    }

    pub async fn get_metadata(&self, address: TokenAddress) -> Metadata {
        self.metadata.get(address).await
    }

    pub async fn get_bonding_curve(&self, address: TokenAddress) -> BondingCurve {
        self.bonding.get(address).await
    }

    pub async fn get_holders(&self, address: TokenAddress) -> HolderDistribution {
        self.onchain.get_holders(address).await
    }

    pub async fn get_rug_check(&self, address: TokenAddress) -> RugScore {
        self.security.get(address).await
    }
}

fn merge_token_data(primary: &mut TokenData, secondary: TokenData) {
    if primary.price_usd == 0.0 {
        primary.price_usd = secondary.price_usd;
    }
    if primary.liquidity_usd == 0.0 {
        primary.liquidity_usd = secondary.liquidity_usd;
    }
    if primary.socials.is_empty() {
        primary.socials = secondary.socials;
    }
    primary.source_error = None;
}

/// Shared retry policy: 3 attempts, 200/400/800ms backoff, classified via
/// `SentinelError` so callers can tell transient from permanent (§4.1, §5).
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    provider: &'static str,
    mut attempt: F,
) -> Result<T, crate::error::SentinelError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, crate::error::SentinelError>>,
{
    const BACKOFFS_MS: [u64; 3] = [200, 400, 800];
    let mut last_err = None;
    for (i, backoff_ms) in BACKOFFS_MS.iter().enumerate() {
        match attempt().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() => {
                log::debug!("🔌 {} attempt {} failed: {} — retrying", provider, i + 1, e);
                tokio::time::sleep(Duration::from_millis(*backoff_ms)).await;
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or(crate::error::SentinelError::PermanentExternal {
        provider,
        message: "retries exhausted".into(),
    }))
}

pub(crate) type SharedHttp = Arc<reqwest::Client>;

pub(crate) fn build_http_client() -> SharedHttp {
    Arc::new(
        reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build HTTP client"),
    )
}
