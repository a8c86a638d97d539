//! 📋 Decision audit log.
//!
//! Every scored poll, pass or not, gets one CSV row: an append-only,
//! header-once-on-create file holding score breakdowns for later review.

use crate::engine::ScoreBreakdown;
use crate::types::TokenAddress;
use csv::Writer;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, serde::Serialize)]
struct DecisionRow {
    id: u64,
    timestamp: i64,
    token: String,
    symbol: String,
    score: f64,
    passed: bool,
    emergency_stopped: bool,
    data_quality_failed: bool,
    early_triggered: bool,
    mcap_capped: bool,
    top_components: String,
}

pub struct DecisionLogger {
    writer: Mutex<Writer<std::fs::File>>,
    next_id: AtomicU64,
}

impl DecisionLogger {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let needs_header = !path.exists() || std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let writer = Writer::from_writer(file);
        let logger = Self { writer: Mutex::new(writer), next_id: AtomicU64::new(1) };
        if needs_header {
            logger.write_header()?;
        }
        Ok(logger)
    }

    fn write_header(&self) -> anyhow::Result<()> {
        let mut writer = self.writer.lock().expect("logger mutex poisoned");
        writer.write_record([
            "id",
            "timestamp",
            "token",
            "symbol",
            "score",
            "passed",
            "emergency_stopped",
            "data_quality_failed",
            "early_triggered",
            "mcap_capped",
            "top_components",
        ])?;
        writer.flush()?;
        Ok(())
    }

    pub fn log(&self, token: TokenAddress, symbol: &str, breakdown: &ScoreBreakdown, now: i64) -> anyhow::Result<u64> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let top_components = breakdown
            .components
            .iter()
            .map(|c| format!("{}={:+.1}", c.name, c.value))
            .collect::<Vec<_>>()
            .join(";");

        let row = DecisionRow {
            id,
            timestamp: now,
            token: token.to_string(),
            symbol: symbol.to_string(),
            score: breakdown.final_score,
            passed: breakdown.passed,
            emergency_stopped: breakdown.emergency_stopped,
            data_quality_failed: breakdown.data_quality_failed,
            early_triggered: breakdown.early_triggered,
            mcap_capped: breakdown.mcap_capped,
            top_components,
        };

        let mut writer = self.writer.lock().expect("logger mutex poisoned");
        writer.serialize(row)?;
        writer.flush()?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ScoreBreakdown;
    use solana_sdk::pubkey::Pubkey;

    fn token() -> TokenAddress {
        TokenAddress(Pubkey::new_from_array([9u8; 32]))
    }

    fn passing_breakdown() -> ScoreBreakdown {
        ScoreBreakdown {
            components: vec![crate::engine::ScoreComponent { name: "smart_wallets", value: 20.0 }],
            final_score: 50.0,
            emergency_stopped: false,
            rug_pull_stop: false,
            data_quality_failed: false,
            early_triggered: false,
            mcap_capped: false,
            passed: true,
            why_no_signal: None,
            observed_holders: None,
        }
    }

    #[test]
    fn writes_header_once_and_assigns_increasing_ids() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("decisions.csv");
        let logger = DecisionLogger::open(&path).expect("open logger");
        let id1 = logger.log(token(), "TST", &passing_breakdown(), 0).expect("log row");
        let id2 = logger.log(token(), "TST", &passing_breakdown(), 1).expect("log row");
        assert_eq!(id1, 1);
        assert_eq!(id2, 2);

        let contents = std::fs::read_to_string(&path).expect("read back");
        assert_eq!(contents.lines().next().unwrap(), "id,timestamp,token,symbol,score,passed,emergency_stopped,data_quality_failed,early_triggered,mcap_capped,top_components");
        assert_eq!(contents.lines().count(), 3);
    }
}
