//! 👛 Curated-Wallet Registry (§4.2)
//!
//! Classifies an observed buyer wallet. Read-through, no TTL — the registry
//! changes rarely and a change is visible on the very next lookup, so there
//! is nothing to expire: a `DashMap` wrapping the concurrent state, without
//! a periodic-refresh task since this isn't fed by a poller — the offline
//! discovery job writes directly via `upsert_discovered`.

use crate::types::WalletAddress;
use crate::types::WalletTier;
use dashmap::DashMap;

#[derive(Debug, Clone)]
pub struct WalletRecord {
    pub tier: WalletTier,
    pub display_name: String,
    pub win_rate: f64,
    pub is_early_whale: bool,
}

pub struct WalletRegistry {
    wallets: DashMap<WalletAddress, WalletRecord>,
}

impl WalletRegistry {
    pub fn new() -> Self {
        Self { wallets: DashMap::new() }
    }

    /// Seeds the registry with a static example set at startup. A production
    /// deployment loads this from the relational store; this crate ships a
    /// small hardcoded set so the engine has something to score against
    /// out of the box.
    pub fn with_seed_set(seed: Vec<(WalletAddress, WalletRecord)>) -> Self {
        let registry = Self::new();
        for (wallet, record) in seed {
            registry.wallets.insert(wallet, record);
        }
        registry
    }

    pub fn lookup(&self, wallet: &WalletAddress) -> Option<WalletRecord> {
        self.wallets.get(wallet).map(|r| r.clone())
    }

    /// Writer path reserved for the offline discovery job (§4.2). Not called
    /// from any of this crate's own code paths.
    pub fn upsert_discovered(&self, wallet: WalletAddress, record: WalletRecord) {
        self.wallets.insert(wallet, record);
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }
}

impl Default for WalletRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::pubkey::Pubkey;

    fn wallet(n: u8) -> WalletAddress {
        let mut bytes = [0u8; 32];
        bytes[0] = n;
        WalletAddress(Pubkey::new_from_array(bytes))
    }

    #[test]
    fn unknown_wallet_returns_none() {
        let registry = WalletRegistry::new();
        assert!(registry.lookup(&wallet(1)).is_none());
    }

    #[test]
    fn upsert_is_visible_on_next_lookup() {
        let registry = WalletRegistry::new();
        registry.upsert_discovered(
            wallet(1),
            WalletRecord { tier: WalletTier::Elite, display_name: "alpha".into(), win_rate: 0.62, is_early_whale: false },
        );
        let record = registry.lookup(&wallet(1)).expect("just inserted");
        assert_eq!(record.tier, WalletTier::Elite);
        assert_eq!(record.display_name, "alpha");
    }
}
