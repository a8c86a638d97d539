//! 📰 Narrative Index (§4.4)
//!
//! Snapshot-based lookup of active narrative clusters, refreshed atomically
//! by the external RSS/BERTopic trainer collaborator. `ArcSwap` gives
//! readers a lock-free, always-consistent snapshot while the writer side
//! (`reload`) never blocks them — the same "readers never block writers"
//! shape §5 asks for.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Narrative {
    pub id: String,
    pub keywords: Vec<String>,
    /// One of {1.0, 1.1, 1.2, 1.3, 1.5} per §4.4.
    pub momentum_multiplier: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NarrativeSnapshot {
    pub generated_at: i64,
    pub narratives: Vec<Narrative>,
}

#[derive(Debug, Clone)]
pub struct NarrativeMatch {
    pub narrative_id: Option<String>,
    pub score: f64,
    pub reason: String,
}

pub struct NarrativeIndex {
    snapshot: ArcSwap<NarrativeSnapshot>,
}

impl NarrativeIndex {
    pub fn new() -> Self {
        Self { snapshot: ArcSwap::from_pointee(NarrativeSnapshot::default()) }
    }

    /// Atomically replaces the active snapshot. Called by the collaborator
    /// that owns narrative training; never invoked from the core's own
    /// scoring path.
    pub fn reload(&self, snapshot: NarrativeSnapshot) {
        self.snapshot.store(Arc::new(snapshot));
    }

    /// Pure match against the current snapshot (§4.4): base strength 0-20
    /// scaled by momentum, capped at 25.
    pub fn match_token(&self, symbol: &str, name: &str, description: &str) -> NarrativeMatch {
        let snapshot = self.snapshot.load();
        let haystack = format!("{} {} {}", symbol, name, description).to_lowercase();

        let mut best: Option<(&Narrative, f64)> = None;
        for narrative in &snapshot.narratives {
            let base = match_strength(&haystack, &narrative.keywords);
            if base == 0.0 {
                continue;
            }
            let scaled = (base * narrative.momentum_multiplier).min(25.0);
            if best.as_ref().map(|(_, s)| scaled > *s).unwrap_or(true) {
                best = Some((narrative, scaled));
            }
        }

        match best {
            Some((narrative, score)) => NarrativeMatch {
                narrative_id: Some(narrative.id.clone()),
                score,
                reason: format!("matched narrative '{}' at {:.1}x momentum", narrative.id, narrative.momentum_multiplier),
            },
            None => NarrativeMatch { narrative_id: None, score: 0.0, reason: "no narrative match".into() },
        }
    }
}

impl Default for NarrativeIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Base match strength in [0, 20]: fraction of keywords present, scaled.
fn match_strength(haystack: &str, keywords: &[String]) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }
    let hits = keywords.iter().filter(|k| haystack.contains(&k.to_lowercase())).count();
    (hits as f64 / keywords.len() as f64) * 20.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> NarrativeSnapshot {
        NarrativeSnapshot {
            generated_at: 0,
            narratives: vec![
                Narrative { id: "ai_agents".into(), keywords: vec!["ai".into(), "agent".into()], momentum_multiplier: 1.3 },
                Narrative { id: "zk_privacy".into(), keywords: vec!["zk".into(), "privacy".into()], momentum_multiplier: 1.0 },
            ],
        }
    }

    #[test]
    fn matches_and_applies_momentum_cap() {
        let index = NarrativeIndex::new();
        index.reload(snapshot());
        let result = index.match_token("AGENT", "AI Agent Coin", "an autonomous ai agent");
        assert_eq!(result.narrative_id.as_deref(), Some("ai_agents"));
        assert!(result.score <= 25.0);
        assert!(result.score > 0.0);
    }

    #[test]
    fn no_keywords_present_yields_no_match() {
        let index = NarrativeIndex::new();
        index.reload(snapshot());
        let result = index.match_token("XYZ", "Random Token", "nothing special here");
        assert!(result.narrative_id.is_none());
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn reload_is_visible_to_subsequent_matches() {
        let index = NarrativeIndex::new();
        assert!(index.match_token("ai", "ai", "ai").narrative_id.is_none());
        index.reload(snapshot());
        assert!(index.match_token("ai agent", "ai agent", "ai agent").narrative_id.is_some());
    }
}
