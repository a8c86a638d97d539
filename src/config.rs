//! Configuration for the signal engine.
//!
//! Loads from environment variables (via an optional `.env` file) into a
//! single validated `EngineConfig`. Every knob named in the external
//! interface is a typed field; nothing is read from the environment outside
//! `from_env()`.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub thresholds: ThresholdConfig,
    pub polling: PollingConfig,
    pub early_kill: EarlyKillConfig,
    pub early_trigger: EarlyTriggerConfig,
    pub mcap_cap: McapCapConfig,
    pub low_conviction: LowConvictionConfig,
    pub monitor: MonitorConfig,
    pub cache_ttls: CacheTtlConfig,
    pub features: FeatureFlags,
    pub credentials: Credentials,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// Phase 5 pass/fail thresholds.
#[derive(Debug, Clone)]
pub struct ThresholdConfig {
    pub min_conviction_score: i32,
    pub post_grad_threshold: i32,
}

/// Per-token poll cadence (§4.6).
#[derive(Debug, Clone)]
pub struct PollingConfig {
    pub initial_interval_secs: u64,
    pub initial_duration_secs: u64,
    pub normal_interval_secs: u64,
    pub slow_interval_secs: u64,
    pub stuck_threshold: u32,
    pub max_age_secs: u64,
}

/// Early-kill rule (§4.6).
#[derive(Debug, Clone)]
pub struct EarlyKillConfig {
    pub min_new_buyers: u32,
    pub check_window_secs: u64,
    pub trigger_at_bonding_pct: f64,
}

/// Early-trigger rule (§4.5 Phase 5).
#[derive(Debug, Clone)]
pub struct EarlyTriggerConfig {
    pub bonding_threshold_pct: f64,
    pub min_unique_buyers: u32,
    pub grace_points: i32,
}

/// MCAP-cap rule (§4.5 Phase 5).
#[derive(Debug, Clone)]
pub struct McapCapConfig {
    pub max_mcap_pre_grad: f64,
    pub max_mcap_post_grad: f64,
}

/// Sustained low-conviction retirement rule (§4.6): score below `threshold`
/// continuously for `sustained_secs` retires the token.
#[derive(Debug, Clone)]
pub struct LowConvictionConfig {
    pub threshold: f64,
    pub sustained_secs: i64,
}

/// Post-call monitor parameters (§4.8).
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub exit_alert_threshold_pct: f64,
    pub monitoring_duration_secs: u64,
    pub check_interval_secs: u64,
}

/// Fetcher cache TTLs (§4.1).
#[derive(Debug, Clone)]
pub struct CacheTtlConfig {
    pub metadata_secs: u64,
    pub holders_secs: u64,
    pub bonding_curve_secs: u64,
}

#[derive(Debug, Clone)]
pub struct FeatureFlags {
    pub enable_narratives: bool,
    pub enable_telegram_calls: bool,
    pub enable_ml_predictions: bool,
    pub enable_realtime_narratives: bool,
    pub enable_dev_sell_detection: bool,
}

/// Third-party credentials. `Debug` is implemented by hand below to redact.
#[derive(Clone)]
pub struct Credentials {
    pub dex_aggregator_key: Option<String>,
    pub data_provider_key: String,
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,
    pub store_url: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("dex_aggregator_key", &self.dex_aggregator_key.as_ref().map(|_| "<redacted>"))
            .field("data_provider_key", &redacted(&self.data_provider_key))
            .field("telegram_bot_token", &redacted(&self.telegram_bot_token))
            .field("telegram_chat_id", &redacted(&self.telegram_chat_id))
            .field("store_url", &"<redacted>")
            .finish()
    }
}

fn redacted(s: &str) -> &'static str {
    if s.is_empty() { "<empty>" } else { "<redacted>" }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_level: String,
    pub decision_log_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub port: u16,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let _ = dotenv::dotenv();

        Ok(EngineConfig {
            thresholds: ThresholdConfig {
                min_conviction_score: get_env_i32("MIN_CONVICTION_SCORE", 45)?,
                post_grad_threshold: get_env_i32("POST_GRAD_THRESHOLD", 75)?,
            },
            polling: PollingConfig {
                initial_interval_secs: get_env_u64("POLL_INITIAL_SECS", 5)?,
                initial_duration_secs: get_env_u64("POLL_INITIAL_DURATION_SECS", 120)?,
                normal_interval_secs: get_env_u64("POLL_NORMAL_SECS", 15)?,
                slow_interval_secs: get_env_u64("POLL_SLOW_SECS", 30)?,
                stuck_threshold: get_env_u32("POLL_STUCK_THRESHOLD", 3)?,
                max_age_secs: get_env_u64("POLL_MAX_AGE_SECS", 1800)?,
            },
            early_kill: EarlyKillConfig {
                min_new_buyers: get_env_u32("EARLY_KILL_MIN_NEW_BUYERS", 5)?,
                check_window_secs: get_env_u64("EARLY_KILL_CHECK_WINDOW_SECS", 120)?,
                trigger_at_bonding_pct: get_env_f64("EARLY_KILL_TRIGGER_BONDING_PCT", 50.0)?,
            },
            early_trigger: EarlyTriggerConfig {
                bonding_threshold_pct: get_env_f64("EARLY_TRIGGER_BONDING_PCT", 30.0)?,
                min_unique_buyers: get_env_u32("EARLY_TRIGGER_MIN_UNIQUE_BUYERS", 200)?,
                grace_points: get_env_i32("EARLY_TRIGGER_GRACE_POINTS", 5)?,
            },
            mcap_cap: McapCapConfig {
                max_mcap_pre_grad: get_env_f64("MAX_MCAP_PRE_GRAD", 25_000.0)?,
                max_mcap_post_grad: get_env_f64("MAX_MCAP_POST_GRAD", 50_000.0)?,
            },
            low_conviction: LowConvictionConfig {
                threshold: get_env_f64("LOW_CONVICTION_THRESHOLD", 30.0)?,
                sustained_secs: get_env_i64("LOW_CONVICTION_SUSTAINED_SECS", 1800)?,
            },
            monitor: MonitorConfig {
                exit_alert_threshold_pct: get_env_f64("EXIT_ALERT_THRESHOLD_PCT", -15.0)?,
                monitoring_duration_secs: get_env_u64("MONITORING_DURATION_SECS", 300)?,
                check_interval_secs: get_env_u64("MONITOR_CHECK_INTERVAL_SECS", 30)?,
            },
            cache_ttls: CacheTtlConfig {
                metadata_secs: get_env_u64("CACHE_TTL_METADATA_SECS", 60 * 60)?,
                holders_secs: get_env_u64("CACHE_TTL_HOLDERS_SECS", 120 * 60)?,
                bonding_curve_secs: get_env_u64("CACHE_TTL_BONDING_CURVE_SECS", 5)?,
            },
            features: FeatureFlags {
                enable_narratives: get_env_bool("ENABLE_NARRATIVES", true)?,
                enable_telegram_calls: get_env_bool("ENABLE_TELEGRAM_CALLS", true)?,
                enable_ml_predictions: get_env_bool("ENABLE_ML_PREDICTIONS", false)?,
                enable_realtime_narratives: get_env_bool("ENABLE_REALTIME_NARRATIVES", false)?,
                enable_dev_sell_detection: get_env_bool("ENABLE_DEV_SELL_DETECTION", false)?,
            },
            credentials: Credentials {
                dex_aggregator_key: env::var("DEX_AGGREGATOR_KEY").ok(),
                data_provider_key: get_env_string("DATA_PROVIDER_KEY", "")?,
                telegram_bot_token: get_env_string("TELEGRAM_BOT_TOKEN", "")?,
                telegram_chat_id: get_env_string("TELEGRAM_CHAT_ID", "")?,
                store_url: get_env_string("STORE_URL", "")?,
            },
            logging: LoggingConfig {
                log_level: get_env_string("LOG_LEVEL", "info")?,
                decision_log_path: PathBuf::from(get_env_string(
                    "DECISION_LOG_PATH",
                    "./data/sentinel_decisions.csv",
                )?),
            },
            metrics: MetricsConfig {
                port: get_env_u16("METRICS_PORT", 9095)?,
            },
        })
    }

    /// Refuses to start on out-of-range values or missing required credentials.
    pub fn validate(&self) -> Result<()> {
        if self.thresholds.min_conviction_score < 0 {
            anyhow::bail!("MIN_CONVICTION_SCORE must be ≥ 0");
        }
        if self.thresholds.post_grad_threshold < self.thresholds.min_conviction_score {
            anyhow::bail!("POST_GRAD_THRESHOLD must be ≥ MIN_CONVICTION_SCORE");
        }

        if self.polling.initial_interval_secs == 0
            || self.polling.normal_interval_secs == 0
            || self.polling.slow_interval_secs == 0
        {
            anyhow::bail!("poll intervals must be > 0");
        }
        if self.polling.max_age_secs == 0 {
            anyhow::bail!("POLL_MAX_AGE_SECS must be > 0");
        }

        if self.early_trigger.bonding_threshold_pct < 0.0 || self.early_trigger.bonding_threshold_pct > 100.0 {
            anyhow::bail!("EARLY_TRIGGER_BONDING_PCT must be within [0, 100]");
        }

        if self.mcap_cap.max_mcap_post_grad < self.mcap_cap.max_mcap_pre_grad {
            anyhow::bail!("MAX_MCAP_POST_GRAD must be ≥ MAX_MCAP_PRE_GRAD");
        }

        if self.low_conviction.sustained_secs <= 0 {
            anyhow::bail!("LOW_CONVICTION_SUSTAINED_SECS must be > 0");
        }

        if self.monitor.exit_alert_threshold_pct >= 0.0 {
            anyhow::bail!("EXIT_ALERT_THRESHOLD_PCT must be negative");
        }
        if self.monitor.monitoring_duration_secs == 0 || self.monitor.check_interval_secs == 0 {
            anyhow::bail!("monitor duration and interval must be > 0");
        }

        if self.cache_ttls.metadata_secs == 0
            || self.cache_ttls.holders_secs == 0
            || self.cache_ttls.bonding_curve_secs == 0
        {
            anyhow::bail!("cache TTLs must be > 0");
        }

        if self.credentials.data_provider_key.is_empty() {
            anyhow::bail!("DATA_PROVIDER_KEY is required");
        }
        if self.credentials.telegram_bot_token.is_empty() {
            log::warn!("TELEGRAM_BOT_TOKEN is empty — publisher will gate every post");
        }
        if self.credentials.telegram_chat_id.is_empty() {
            log::warn!("TELEGRAM_CHAT_ID is empty — publisher will gate every post");
        }
        if self.credentials.store_url.is_empty() {
            log::warn!("STORE_URL is empty — signals persist to the fallback file only");
        }

        Ok(())
    }

    /// Whether the publisher has everything it needs to attempt a post (§4.7 gate).
    pub fn publisher_ready(&self) -> bool {
        !self.credentials.telegram_bot_token.is_empty() && !self.credentials.telegram_chat_id.is_empty()
    }
}

fn get_env_string(key: &str, default: &str) -> Result<String> {
    Ok(env::var(key).unwrap_or_else(|_| default.to_string()))
}

fn get_env_bool(key: &str, default: bool) -> Result<bool> {
    Ok(env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default))
}

fn get_env_i32(key: &str, default: i32) -> Result<i32> {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .or(Some(default))
        .context(format!("invalid {} value", key))
}

fn get_env_u32(key: &str, default: u32) -> Result<u32> {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .or(Some(default))
        .context(format!("invalid {} value", key))
}

fn get_env_u16(key: &str, default: u16) -> Result<u16> {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .or(Some(default))
        .context(format!("invalid {} value", key))
}

fn get_env_i64(key: &str, default: i64) -> Result<i64> {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .or(Some(default))
        .context(format!("invalid {} value", key))
}

fn get_env_u64(key: &str, default: u64) -> Result<u64> {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .or(Some(default))
        .context(format!("invalid {} value", key))
}

fn get_env_f64(key: &str, default: f64) -> Result<f64> {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .or(Some(default))
        .context(format!("invalid {} value", key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn clean() {
        for key in [
            "MIN_CONVICTION_SCORE",
            "POST_GRAD_THRESHOLD",
            "DATA_PROVIDER_KEY",
            "MAX_MCAP_PRE_GRAD",
            "MAX_MCAP_POST_GRAD",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn defaults_load_and_validate_with_required_key_set() {
        clean();
        env::set_var("DATA_PROVIDER_KEY", "test-key");
        let config = EngineConfig::from_env().expect("config loads");
        assert_eq!(config.thresholds.min_conviction_score, 45);
        assert_eq!(config.thresholds.post_grad_threshold, 75);
        assert!(config.validate().is_ok());
        clean();
    }

    #[test]
    fn missing_data_provider_key_fails_validation() {
        clean();
        env::remove_var("DATA_PROVIDER_KEY");
        let config = EngineConfig::from_env().expect("config loads");
        assert!(config.validate().is_err());
    }

    #[test]
    fn post_grad_below_pre_grad_fails_validation() {
        clean();
        env::set_var("DATA_PROVIDER_KEY", "test-key");
        env::set_var("MIN_CONVICTION_SCORE", "80");
        env::set_var("POST_GRAD_THRESHOLD", "70");
        let config = EngineConfig::from_env().expect("config loads");
        assert!(config.validate().is_err());
        clean();
    }

    #[test]
    fn mcap_cap_ordering_is_enforced() {
        clean();
        env::set_var("DATA_PROVIDER_KEY", "test-key");
        env::set_var("MAX_MCAP_PRE_GRAD", "60000");
        env::set_var("MAX_MCAP_POST_GRAD", "50000");
        let config = EngineConfig::from_env().expect("config loads");
        assert!(config.validate().is_err());
        clean();
    }

    #[test]
    fn publisher_ready_requires_both_credentials() {
        clean();
        env::set_var("DATA_PROVIDER_KEY", "test-key");
        let config = EngineConfig::from_env().expect("config loads");
        assert!(!config.publisher_ready());
    }
}
