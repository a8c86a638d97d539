//! `TrackedToken` — the mutable state owned exclusively by one poll task
//! (§3, §4.6). Everything here is touched only from inside that token's own
//! loop; other components only ever see a read-only `EngineInput` snapshot
//! built from it.

use crate::types::{AdmissionSource, KolContribution, TokenAddress, TokenLifecycleState, WalletAddress, WalletTier};

#[derive(Debug, Clone)]
pub struct KolBuy {
    pub wallet: WalletAddress,
    pub tier: WalletTier,
    pub first_seen_at: i64,
}

#[derive(Debug, Clone, Default)]
pub struct LatestSnapshot {
    pub price_usd: f64,
    pub market_cap: f64,
    pub liquidity_usd: f64,
    pub bonding_progress_pct: f64,
    pub graduated: bool,
    pub holder_count: u64,
    pub volume_24h: f64,
    pub buys_24h: u64,
    pub sells_24h: u64,
    pub price_change_1h: f64,
    pub price_change_6h: f64,
    pub price_change_24h: f64,
    pub symbol: String,
    pub name: String,
    pub description: String,
    pub top10_pct: Option<f64>,
    pub source_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    Initial,
    Normal,
    Slow,
}

pub struct TrackedToken {
    pub address: TokenAddress,
    pub symbol: String,
    pub name: String,

    pub source: AdmissionSource,
    pub source_wallet: Option<WalletAddress>,
    pub source_group: Option<i64>,

    pub first_seen_at: i64,
    pub last_poll_at: i64,
    pub last_nonzero_conviction_at: i64,

    pub kol_buys: Vec<KolBuy>,
    pub unique_buyer_count: u32,
    /// `(timestamp, cumulative unique_buyer_count)` observations, retained
    /// long enough to answer the early-kill window query.
    pub unique_buyer_timeline: Vec<(i64, u32)>,

    pub latest: LatestSnapshot,
    pub previous_top10_pct: Option<f64>,

    pub last_score: f64,
    pub signal_posted: bool,
    pub signal_message_id: Option<String>,
    pub signal_price: Option<f64>,
    pub signal_time: Option<i64>,

    pub state: TokenLifecycleState,
    pub polls_elapsed: u32,

    /// Last 3 score buckets (score / 10) used for stuck detection.
    pub recent_score_buckets: Vec<i32>,
    pub multi_kol_convergence_fired: bool,

    pub consecutive_all_sources_failed: u32,
}

impl TrackedToken {
    pub fn new_from_kol_buy(address: TokenAddress, wallet: WalletAddress, tier: WalletTier, now: i64) -> Self {
        let mut token = Self::bare(address, AdmissionSource::KolBuy, now);
        token.source_wallet = Some(wallet);
        token.record_kol_buy(wallet, tier, now);
        token
    }

    pub fn new_from_telegram_call(address: TokenAddress, group_id: i64, now: i64) -> Self {
        let mut token = Self::bare(address, AdmissionSource::TelegramCall, now);
        token.source_group = Some(group_id);
        token
    }

    fn bare(address: TokenAddress, source: AdmissionSource, now: i64) -> Self {
        Self {
            address,
            symbol: String::new(),
            name: String::new(),
            source,
            source_wallet: None,
            source_group: None,
            first_seen_at: now,
            last_poll_at: now,
            last_nonzero_conviction_at: now,
            kol_buys: Vec::new(),
            unique_buyer_count: 0,
            unique_buyer_timeline: vec![(now, 0)],
            latest: LatestSnapshot::default(),
            previous_top10_pct: None,
            last_score: 0.0,
            signal_posted: false,
            signal_message_id: None,
            signal_price: None,
            signal_time: None,
            state: TokenLifecycleState::Tracking,
            polls_elapsed: 0,
            recent_score_buckets: Vec::new(),
            multi_kol_convergence_fired: false,
            consecutive_all_sources_failed: 0,
        }
    }

    /// Records a buyer; `unique_buyer_count` is monotonically non-decreasing (I3).
    pub fn record_kol_buy(&mut self, wallet: WalletAddress, tier: WalletTier, now: i64) {
        let already_seen = self.kol_buys.iter().any(|b| b.wallet == wallet);
        if !already_seen {
            self.kol_buys.push(KolBuy { wallet, tier, first_seen_at: now });
            self.unique_buyer_count += 1;
            self.unique_buyer_timeline.push((now, self.unique_buyer_count));
        }
    }

    pub fn kol_contributions(&self) -> Vec<KolContribution> {
        self.kol_buys.iter().map(|b| KolContribution { tier: b.tier }).collect()
    }

    /// §4.6 "Multi-KOL convergence bonus": ≥3 distinct KOLs within a 5-minute window, one-shot.
    pub fn check_multi_kol_convergence(&mut self, now: i64) -> bool {
        if self.multi_kol_convergence_fired {
            return false;
        }
        let window_start = now - 300;
        let distinct_in_window = self.kol_buys.iter().filter(|b| b.first_seen_at >= window_start).count();
        if distinct_in_window >= 3 {
            self.multi_kol_convergence_fired = true;
            true
        } else {
            false
        }
    }

    /// New unique buyers observed within the last `window_secs`, for the early-kill rule.
    pub fn new_buyers_within(&self, window_secs: i64, now: i64) -> u32 {
        let cutoff = now - window_secs;
        let count_at_cutoff = self
            .unique_buyer_timeline
            .iter()
            .rev()
            .find(|(ts, _)| *ts <= cutoff)
            .map(|(_, count)| *count)
            .unwrap_or(0);
        self.unique_buyer_count.saturating_sub(count_at_cutoff)
    }

    /// `low_conviction_threshold` is the score below which a token is
    /// considered low-conviction (§4.6); `last_nonzero_conviction_at` tracks
    /// the last time the score was at or above it, not merely nonzero.
    pub fn record_score(&mut self, score: f64, now: i64, low_conviction_threshold: f64) {
        self.last_score = score;
        if score >= low_conviction_threshold {
            self.last_nonzero_conviction_at = now;
        }
        self.recent_score_buckets.push((score / 10.0) as i32);
        if self.recent_score_buckets.len() > 3 {
            self.recent_score_buckets.remove(0);
        }
    }

    /// "Stuck" per §4.6: 3 consecutive polls with no meaningful state change
    /// — same score bucket and no new buyer in the window.
    pub fn is_stuck(&self, window_secs: i64, now: i64) -> bool {
        if self.recent_score_buckets.len() < 3 {
            return false;
        }
        let same_bucket = self.recent_score_buckets.windows(2).all(|w| w[0] == w[1]);
        same_bucket && self.new_buyers_within(window_secs, now) == 0
    }

    pub fn poll_phase(&self, initial_duration_secs: i64, now: i64, stuck_threshold: u32, stuck_window_secs: i64) -> PollPhase {
        if now - self.first_seen_at < initial_duration_secs {
            return PollPhase::Initial;
        }
        if self.polls_elapsed >= stuck_threshold && self.is_stuck(stuck_window_secs, now) {
            return PollPhase::Slow;
        }
        PollPhase::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::pubkey::Pubkey;

    fn token() -> TokenAddress {
        TokenAddress(Pubkey::new_from_array([1u8; 32]))
    }

    fn wallet(n: u8) -> WalletAddress {
        let mut bytes = [0u8; 32];
        bytes[0] = n;
        WalletAddress(Pubkey::new_from_array(bytes))
    }

    #[test]
    fn unique_buyer_count_is_monotonic_and_dedups() {
        let mut t = TrackedToken::new_from_kol_buy(token(), wallet(1), WalletTier::Elite, 0);
        assert_eq!(t.unique_buyer_count, 1);
        t.record_kol_buy(wallet(1), WalletTier::Elite, 10);
        assert_eq!(t.unique_buyer_count, 1);
        t.record_kol_buy(wallet(2), WalletTier::TopKol, 20);
        assert_eq!(t.unique_buyer_count, 2);
    }

    #[test]
    fn multi_kol_convergence_fires_once() {
        let mut t = TrackedToken::new_from_kol_buy(token(), wallet(1), WalletTier::Elite, 0);
        t.record_kol_buy(wallet(2), WalletTier::TopKol, 10);
        t.record_kol_buy(wallet(3), WalletTier::Emerging, 20);
        assert!(t.check_multi_kol_convergence(30));
        assert!(!t.check_multi_kol_convergence(31));
    }

    #[test]
    fn new_buyers_within_window_counts_recent_only() {
        let mut t = TrackedToken::new_from_kol_buy(token(), wallet(1), WalletTier::Elite, 0);
        t.record_kol_buy(wallet(2), WalletTier::TopKol, 150);
        assert_eq!(t.new_buyers_within(120, 200), 1);
    }

    #[test]
    fn is_stuck_requires_same_bucket_and_no_new_buyers() {
        let mut t = TrackedToken::new_from_kol_buy(token(), wallet(1), WalletTier::Elite, 0);
        t.record_score(42.0, 100, 30.0);
        t.record_score(43.0, 200, 30.0);
        t.record_score(41.0, 300, 30.0);
        assert!(t.is_stuck(120, 300));
    }
}
