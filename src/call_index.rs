//! 📣 Telegram Call Index (§4.3)
//!
//! Rolling 24-hour index of third-party group mentions, keyed by token
//! address. Idempotent on `(group_id, message_id)`. A background sweep,
//! spawned via `tokio::spawn` + `interval`, evicts entries older than the
//! window.

use crate::types::{TelegramCallEvent, TokenAddress};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

pub struct TelegramCallIndex {
    mentions: DashMap<TokenAddress, Vec<TelegramCallEvent>>,
    window: Duration,
}

impl TelegramCallIndex {
    pub fn new(window: Duration) -> Self {
        Self { mentions: DashMap::new(), window }
    }

    /// Appends a mention; no-op if `(group_id, message_id)` was already recorded.
    pub fn record(&self, event: TelegramCallEvent) {
        let mut entry = self.mentions.entry(event.token).or_default();
        let already_seen = entry
            .iter()
            .any(|e| e.group_id == event.group_id && e.message_id == event.message_id);
        if !already_seen {
            entry.push(event);
        }
    }

    /// Mentions younger than `within`, relative to `now` (seconds since epoch).
    pub fn mentions(&self, token: &TokenAddress, within_secs: i64, now: i64) -> Vec<TelegramCallEvent> {
        match self.mentions.get(token) {
            Some(entry) => entry
                .iter()
                .filter(|e| now - e.timestamp <= within_secs)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Distinct group count and total mention count within `within`, the two
    /// quantities the conviction engine's narrative scoring consults.
    pub fn stats(&self, token: &TokenAddress, within_secs: i64, now: i64) -> (usize, usize) {
        let matches = self.mentions(token, within_secs, now);
        let total = matches.len();
        let mut groups: Vec<i64> = matches.iter().map(|e| e.group_id).collect();
        groups.sort_unstable();
        groups.dedup();
        (groups.len(), total)
    }

    fn sweep(&self, now: i64) {
        let window_secs = self.window.as_secs() as i64;
        self.mentions.retain(|_, events| {
            events.retain(|e| now - e.timestamp <= window_secs);
            !events.is_empty()
        });
    }

    pub fn start_sweeper(self: Arc<Self>, interval: Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let now = chrono::Utc::now().timestamp();
                self.sweep(now);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::pubkey::Pubkey;

    fn token(n: u8) -> TokenAddress {
        let mut bytes = [0u8; 32];
        bytes[0] = n;
        TokenAddress(Pubkey::new_from_array(bytes))
    }

    fn event(token: TokenAddress, group_id: i64, message_id: i64, timestamp: i64) -> TelegramCallEvent {
        TelegramCallEvent { token, group_id, group_name: format!("group-{}", group_id), timestamp, message_id }
    }

    #[test]
    fn record_is_idempotent_on_group_and_message() {
        let index = TelegramCallIndex::new(Duration::from_secs(86_400));
        let t = token(1);
        index.record(event(t, 10, 100, 0));
        index.record(event(t, 10, 100, 0));
        assert_eq!(index.stats(&t, 86_400, 0), (1, 1));
    }

    #[test]
    fn mentions_filters_by_age() {
        let index = TelegramCallIndex::new(Duration::from_secs(86_400));
        let t = token(1);
        index.record(event(t, 10, 1, 0));
        index.record(event(t, 11, 2, 1000));

        let (groups, total) = index.stats(&t, 500, 1000);
        assert_eq!(groups, 1);
        assert_eq!(total, 1);
    }

    #[test]
    fn sweep_evicts_stale_entries() {
        let index = TelegramCallIndex::new(Duration::from_secs(100));
        let t = token(1);
        index.record(event(t, 10, 1, 0));
        index.sweep(200);
        assert_eq!(index.stats(&t, 10_000, 200), (0, 0));
    }
}
