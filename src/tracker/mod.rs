//! 🎯 Active Token Tracker (§3, §4.6)
//!
//! Owns one poll task per tracked token behind a `DashMap`, mirroring the
//! teacher's per-mint task model: admission spawns a task, the task owns
//! its `TrackedToken` exclusively, and everything else only ever talks to
//! it through a channel or by reading the tracker's own shared collaborators.

pub mod poll_loop;
pub mod token;

use crate::call_index::TelegramCallIndex;
use crate::config::EngineConfig;
use crate::engine::ConvictionEngine;
use crate::fetcher::Fetcher;
use crate::logging::DecisionLogger;
use crate::metrics::metrics;
use crate::monitor::PostCallMonitor;
use crate::persistence::SignalStore;
use crate::publisher::SignalPublisher;
use crate::types::{AdmissionSource, KolBuyEvent, RetirementReason, TelegramCallEvent, TokenAddress, WalletTier};
use crate::wallet_registry::WalletRegistry;
use dashmap::DashMap;
use token::TrackedToken;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Events forwarded into a running poll task from outside (§4.6). The task
/// owns its `TrackedToken`; everything else reaches it only through this.
pub enum TokenEvent {
    KolBuy { wallet: crate::types::WalletAddress, tier: WalletTier, timestamp: i64 },
    TelegramCall(TelegramCallEvent),
}

struct TrackedHandle {
    events: mpsc::Sender<TokenEvent>,
    cancel: CancellationToken,
    _join: JoinHandle<()>,
}

pub struct ActiveTokenTracker {
    handles: DashMap<TokenAddress, TrackedHandle>,
    /// Addresses that have already posted a signal this process lifetime
    /// (I2: "at most one Signal per token per process lifetime"). Kept even
    /// after the token's handle is torn down so a later admission can't
    /// spawn a second poll task for it.
    signaled: DashMap<TokenAddress, ()>,
    config: Arc<EngineConfig>,
    fetcher: Arc<Fetcher>,
    engine: Arc<ConvictionEngine>,
    wallets: Arc<WalletRegistry>,
    calls: Arc<TelegramCallIndex>,
    publisher: Arc<dyn SignalPublisher>,
    monitor: Arc<PostCallMonitor>,
    decision_log: Arc<DecisionLogger>,
    store: Arc<dyn SignalStore>,
}

const EVENT_QUEUE_CAPACITY: usize = 64;

impl ActiveTokenTracker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<EngineConfig>,
        fetcher: Arc<Fetcher>,
        engine: Arc<ConvictionEngine>,
        wallets: Arc<WalletRegistry>,
        calls: Arc<TelegramCallIndex>,
        publisher: Arc<dyn SignalPublisher>,
        monitor: Arc<PostCallMonitor>,
        decision_log: Arc<DecisionLogger>,
        store: Arc<dyn SignalStore>,
    ) -> Self {
        Self {
            handles: DashMap::new(),
            signaled: DashMap::new(),
            config,
            fetcher,
            engine,
            wallets,
            calls,
            publisher,
            monitor,
            decision_log,
            store,
        }
    }

    pub fn is_tracking(&self, token: &TokenAddress) -> bool {
        self.handles.contains_key(token)
    }

    pub fn tracked_count(&self) -> usize {
        self.handles.len()
    }

    /// Admission from a curated-wallet on-chain buy (§3, §4.2). Classifies
    /// the wallet via the registry; `Unknown` tier still admits the token
    /// (it simply contributes nothing to the smart-wallet score).
    pub fn admit_kol_buy(self: &Arc<Self>, event: KolBuyEvent) {
        if self.signaled.contains_key(&event.token) {
            return;
        }
        let tier = self.wallets.lookup(&event.wallet).map(|r| r.tier).unwrap_or(WalletTier::Unknown);
        let now_ts = now();

        if let Some(handle) = self.handles.get(&event.token) {
            let _ = handle.events.try_send(TokenEvent::KolBuy { wallet: event.wallet, tier, timestamp: now_ts });
            return;
        }

        let state = TrackedToken::new_from_kol_buy(event.token, event.wallet, tier, now_ts);
        self.spawn_tracked(state, AdmissionSource::KolBuy);
    }

    /// Admission from a third-party Telegram call (§3, §4.3).
    pub fn admit_telegram_call(self: &Arc<Self>, event: TelegramCallEvent) {
        let token = event.token;
        if self.signaled.contains_key(&token) {
            return;
        }
        let group_id = event.group_id;
        let now_ts = now();

        if let Some(handle) = self.handles.get(&token) {
            let _ = handle.events.try_send(TokenEvent::TelegramCall(event));
            return;
        }

        self.calls.record(event);
        let state = TrackedToken::new_from_telegram_call(token, group_id, now_ts);
        self.spawn_tracked(state, AdmissionSource::TelegramCall);
    }

    /// Marks `token` as having posted a signal this process lifetime (I2).
    /// Subsequent admissions of the same address become no-ops.
    pub(crate) fn mark_signaled(&self, token: TokenAddress) {
        self.signaled.insert(token, ());
    }

    fn spawn_tracked(self: &Arc<Self>, state: TrackedToken, source: AdmissionSource) {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let cancel = CancellationToken::new();
        let tracker = Arc::clone(self);
        let token = state.address;
        let task_cancel = cancel.clone();

        let join = tokio::spawn(async move {
            poll_loop::run(tracker, state, rx, task_cancel).await;
        });

        self.handles.insert(token, TrackedHandle { events: tx, cancel, _join: join });
        metrics().tracked_tokens.inc();
        metrics()
            .admissions_total
            .with_label_values(&[admission_label(source)])
            .inc();
        log::info!("🎯 admitted {} via {:?}", token.short(), source);
    }

    /// Cancels every live poll task (graceful shutdown).
    pub fn cancel_all(&self) {
        for entry in self.handles.iter() {
            entry.cancel.cancel();
        }
    }

    fn remove(&self, token: &TokenAddress) {
        self.handles.remove(token);
        metrics().tracked_tokens.dec();
    }

    /// Records the retirement; the caller's poll loop removes itself from
    /// the map once it actually stops (see `poll_loop::run`'s single exit point).
    async fn retire(&self, token: TokenAddress, symbol: &str, reason: RetirementReason, now_ts: i64) {
        metrics().retirements_total.with_label_values(&[&reason.to_string()]).inc();
        log::info!("🗑️ retiring {} ({}) at {}: {}", symbol, token.short(), now_ts, reason);
    }
}

fn admission_label(source: AdmissionSource) -> &'static str {
    match source {
        AdmissionSource::KolBuy => "kol_buy",
        AdmissionSource::TelegramCall => "telegram_call",
        AdmissionSource::WhaleBuy => "whale_buy",
    }
}

pub(crate) fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
