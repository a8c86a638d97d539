//! 🗂️ Core data model
//!
//! Semantic types shared across every component. Addresses are opaque,
//! byte-exact identifiers (§3); `TokenAddress`/`WalletAddress` wrap
//! `solana_sdk::Pubkey` rather than a bare `String` so that equality and
//! hashing are the cheap, correct byte comparisons the invariants assume.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenAddress(pub Pubkey);

impl TokenAddress {
    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        Ok(Self(Pubkey::from_str(s)?))
    }

    pub fn short(&self) -> String {
        let s = self.0.to_string();
        s.chars().take(8).collect()
    }
}

impl fmt::Display for TokenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WalletAddress(pub Pubkey);

impl WalletAddress {
    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        Ok(Self(Pubkey::from_str(s)?))
    }

    pub fn short(&self) -> String {
        let s = self.0.to_string();
        s.chars().take(8).collect()
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wallet tier classification (§3 WalletAddress).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletTier {
    Elite,
    TopKol,
    Emerging,
    Whale,
    Unknown,
}

impl WalletTier {
    /// Tier multiplier applied to the smart-wallet contribution (Phase 2, §4.5).
    pub fn score_multiplier(&self) -> f64 {
        match self {
            WalletTier::Elite => 1.5,
            WalletTier::TopKol => 1.0,
            WalletTier::Emerging => 0.5,
            WalletTier::Whale => 0.3,
            WalletTier::Unknown => 0.0,
        }
    }
}

/// Source that first brought a token to the tracker's attention (§3 TrackedToken).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdmissionSource {
    KolBuy,
    TelegramCall,
    WhaleBuy,
}

/// Lifecycle state of a tracked token (§3 TrackedToken).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenLifecycleState {
    Tracking,
    Signaled,
    Monitored,
    Retired,
}

/// On-chain buy event emitted by a curated smart wallet (§3 KOLBuyEvent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KolBuyEvent {
    pub wallet: WalletAddress,
    pub token: TokenAddress,
    pub sol_amount: f64,
    pub timestamp: i64,
    pub tx_signature: String,
}

/// Third-party Telegram group mention of a token address (§3 TelegramCallEvent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramCallEvent {
    pub token: TokenAddress,
    pub group_id: i64,
    pub group_name: String,
    pub timestamp: i64,
    pub message_id: i64,
}

/// Reason a token left the tracker (used in logs and the `outcomes` interface).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetirementReason {
    MaxAgeExceeded,
    SignaledTimeout,
    LowConvictionSustained,
    EarlyKill,
    SourceUnavailable,
}

/// A single KOL buy contribution as seen by the scoring phase: wallet tier
/// plus a flag the tracker sets once per convergence window (§4.6 "Multi-KOL
/// convergence bonus").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KolContribution {
    pub tier: WalletTier,
}

/// Read-only view the conviction engine scores against. Assembled by the
/// tracker from its own mutable `TrackedToken` plus a fresh fetcher
/// snapshot — the engine itself never reads the tracker's state directly
/// (§4.5 "pure apart from its fetcher/index dependencies").
#[derive(Debug, Clone)]
pub struct EngineInput {
    pub token: TokenAddress,
    pub symbol: String,
    pub name: String,
    pub description: String,

    pub price_usd: f64,
    pub market_cap: f64,
    pub liquidity_usd: f64,
    pub volume_24h: f64,
    pub buys_24h: u64,
    pub sells_24h: u64,
    pub price_change_1h: f64,

    pub bonding_progress_pct: f64,
    pub graduated: bool,
    pub holder_count: u64,

    pub token_age_secs: i64,
    pub polls_elapsed: u32,

    pub unique_buyer_count: u32,
    pub kol_contributions: Vec<KolContribution>,
    pub multi_kol_convergence_pending: bool,

    pub distinct_telegram_groups: usize,
    pub total_telegram_mentions: usize,

    pub previous_top10_pct: Option<f64>,
}

/// Created at most once per token per process lifetime (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub token: TokenAddress,
    pub score: i32,
    pub posted_at: i64,
    pub message_id: Option<String>,
    pub entry_price: f64,
    pub entry_liquidity: f64,
    pub buy_percentage: f64,
    pub kol_wallets: Vec<WalletAddress>,
    pub narratives: Vec<String>,
    pub symbol: String,
    pub delivery_pending: bool,
}

/// At most one per `Signal` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitAlert {
    pub token: TokenAddress,
    pub signal_price: f64,
    pub observed_price: f64,
    pub drop_pct: f64,
    pub elapsed_seconds: u64,
    pub alerted_at: i64,
}

impl fmt::Display for RetirementReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RetirementReason::MaxAgeExceeded => "max_age_exceeded",
            RetirementReason::SignaledTimeout => "signaled_timeout",
            RetirementReason::LowConvictionSustained => "low_conviction_sustained",
            RetirementReason::EarlyKill => "early_kill",
            RetirementReason::SourceUnavailable => "source_unavailable",
        };
        write!(f, "{}", s)
    }
}
