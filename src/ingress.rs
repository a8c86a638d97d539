//! 📡 Scheduler & Ingress (§9)
//!
//! Typed channels feeding the tracker from whatever upstream collaborators
//! supply raw events — a gRPC wallet-buy watcher, a Telegram-scraping bot,
//! a narrative-training job. This crate only owns the receiving side; the
//! producers themselves are out of scope (§9 "duck-typed plug-ins").

use crate::narrative::NarrativeSnapshot;
use crate::tracker::ActiveTokenTracker;
use crate::types::{KolBuyEvent, TelegramCallEvent};
use std::sync::Arc;
use tokio::sync::mpsc;

pub const CHANNEL_CAPACITY: usize = 1024;

pub struct Ingress {
    pub kol_buys: mpsc::Sender<KolBuyEvent>,
    pub telegram_calls: mpsc::Sender<TelegramCallEvent>,
    pub narrative_snapshots: mpsc::Sender<NarrativeSnapshot>,
}

impl Ingress {
    /// Wires three channels into the running tracker/narrative index and
    /// spawns the forwarding tasks. Producers only ever see the `Sender`
    /// halves returned here.
    pub fn spawn(tracker: Arc<ActiveTokenTracker>, narratives: Arc<crate::narrative::NarrativeIndex>) -> Self {
        let (kol_tx, mut kol_rx) = mpsc::channel::<KolBuyEvent>(CHANNEL_CAPACITY);
        let (tg_tx, mut tg_rx) = mpsc::channel::<TelegramCallEvent>(CHANNEL_CAPACITY);
        let (nar_tx, mut nar_rx) = mpsc::channel::<NarrativeSnapshot>(CHANNEL_CAPACITY);

        {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move {
                while let Some(event) = kol_rx.recv().await {
                    tracker.admit_kol_buy(event);
                }
            });
        }
        {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move {
                while let Some(event) = tg_rx.recv().await {
                    tracker.admit_telegram_call(event);
                }
            });
        }
        tokio::spawn(async move {
            while let Some(snapshot) = nar_rx.recv().await {
                log::info!("📰 narrative snapshot reloaded: {} narratives", snapshot.narratives.len());
                narratives.reload(snapshot);
            }
        });

        Self { kol_buys: kol_tx, telegram_calls: tg_tx, narrative_snapshots: nar_tx }
    }
}
