//! Generic TTL cache used by every fetcher provider client.
//!
//! A `DashMap` wrapped in a small struct, one per provider client. `_at`
//! suffixed methods take an explicit `Instant` so TTL behavior is testable
//! without sleeping.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

struct CacheEntry<V> {
    value: V,
    fetched_at: Instant,
}

/// A concurrent, per-key-TTL cache with single-flight coalescing of misses.
///
/// `K` is typically `TokenAddress`; `V` the provider's response type, wrapped
/// in `Arc` by callers that need cheap clones across tasks.
pub struct TtlCache<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
    ttl: Duration,
    in_flight: DashMap<K, Arc<Notify>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            in_flight: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        match self.entries.get(key) {
            Some(entry) if now.saturating_duration_since(entry.fetched_at) <= self.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, key: K, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    pub fn insert_at(&self, key: K, value: V, now: Instant) {
        self.entries.insert(key, CacheEntry { value, fetched_at: now });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Evicts entries older than `ttl` (lazy sweep; insertion itself never
    /// blocks on eviction per §3 "insertion evicts stale entries lazily").
    pub fn evict_stale(&self) {
        self.evict_stale_at(Instant::now());
    }

    pub fn evict_stale_at(&self, now: Instant) {
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.fetched_at) <= self.ttl);
    }

    /// Registers this caller as the single in-flight fetcher for `key`, or
    /// returns a `Notify` to await if another caller already holds the slot.
    /// Callers that win must call `finish_fetch` when done (success or not)
    /// to release the slot and wake any waiters.
    pub async fn acquire_fetch_slot(&self, key: &K) -> FetchSlot {
        loop {
            if let Some(entry) = self.in_flight.get(key) {
                let notify = entry.clone();
                drop(entry);
                notify.notified().await;
                // Re-check: the winner may have already populated the cache.
                if self.entries.contains_key(key) {
                    return FetchSlot::AlreadyFetched;
                }
                continue;
            }
            match self.in_flight.entry(key.clone()) {
                dashmap::mapref::entry::Entry::Vacant(v) => {
                    let notify = Arc::new(Notify::new());
                    v.insert(notify.clone());
                    return FetchSlot::Owner(notify);
                }
                dashmap::mapref::entry::Entry::Occupied(_) => continue,
            }
        }
    }

    pub fn finish_fetch(&self, key: &K) {
        if let Some((_, notify)) = self.in_flight.remove(key) {
            notify.notify_waiters();
        }
    }

    /// Single-flight get-or-fetch: a cache hit returns immediately; a miss
    /// either becomes the fetch owner or waits on the owner's result, so
    /// concurrent misses for the same key issue at most one external call.
    /// Only successful fetches populate the cache; a failed fetch leaves the
    /// slot for the next waiter to retry rather than caching the failure.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: &K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<V, E>>,
    {
        if let Some(v) = self.get(key) {
            return Ok(v);
        }

        match self.acquire_fetch_slot(key).await {
            FetchSlot::AlreadyFetched => Ok(self.entries.get(key).expect("winner populated the cache").value.clone()),
            FetchSlot::Owner(_) => {
                let result = fetch().await;
                if let Ok(value) = &result {
                    self.insert(key.clone(), value.clone());
                }
                self.finish_fetch(key);
                result
            }
        }
    }
}

pub enum FetchSlot {
    /// Another in-flight fetch already populated the cache by the time we woke up.
    AlreadyFetched,
    /// This caller owns the fetch; must call `finish_fetch(&key)` when done.
    Owner(Arc<Notify>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TokenAddress;

    fn token(n: u8) -> TokenAddress {
        let mut bytes = [0u8; 32];
        bytes[0] = n;
        TokenAddress(solana_sdk::pubkey::Pubkey::new_from_array(bytes))
    }

    #[test]
    fn honors_ttl_boundary() {
        let cache: TtlCache<TokenAddress, u64> = TtlCache::new(Duration::from_secs(60));
        let t0 = Instant::now();
        cache.insert_at(token(1), 100, t0);

        assert_eq!(cache.get_at(&token(1), t0 + Duration::from_secs(60)), Some(100));
        assert_eq!(cache.get_at(&token(1), t0 + Duration::from_secs(61)), None);
    }

    #[test]
    fn miss_on_absent_key_counts_as_miss() {
        let cache: TtlCache<TokenAddress, u64> = TtlCache::new(Duration::from_secs(60));
        assert_eq!(cache.get(&token(2)), None);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.hits(), 0);
    }

    #[test]
    fn evict_stale_removes_only_expired_entries() {
        let cache: TtlCache<TokenAddress, u64> = TtlCache::new(Duration::from_secs(10));
        let t0 = Instant::now();
        cache.insert_at(token(1), 1, t0);
        cache.insert_at(token(2), 2, t0 + Duration::from_secs(5));

        cache.evict_stale_at(t0 + Duration::from_secs(12));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_at(&token(2), t0 + Duration::from_secs(12)), Some(2));
    }
}
