//! 🧯 Error taxonomy
//!
//! Mirrors the kinds of failure this service actually distinguishes between,
//! not a generic wrapper. External-call failures are absorbed at the
//! fetcher boundary (never propagated as panics); the engine and tracker
//! never raise — see `engine::ScoreBreakdown` and `tracker` module docs.

use thiserror::Error;

/// Errors surfaced by the live pipeline (fetcher, publisher, tracker plumbing).
///
/// `DataQualityFailure` from spec §7 is deliberately *not* a variant here:
/// it isn't an error, it's a normal `ScoreBreakdown` outcome recorded by the
/// engine (see `engine::ScoreBreakdown::data_quality_failed`).
#[derive(Debug, Error)]
pub enum SentinelError {
    #[error("transient external error from {provider}: {message}")]
    TransientExternal { provider: &'static str, message: String },

    #[error("rate limited by {provider}: retry after {retry_after_ms}ms")]
    RateLimited { provider: &'static str, retry_after_ms: u64 },

    #[error("permanent external error from {provider}: {message}")]
    PermanentExternal { provider: &'static str, message: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("publisher unavailable: missing {missing_field}")]
    PublisherUnavailable { missing_field: &'static str },

    #[error("internal invariant violated: {0}")]
    InternalInvariantViolation(String),
}

impl SentinelError {
    /// Whether the caller should retry (transient / rate-limited) or give up.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SentinelError::TransientExternal { .. } | SentinelError::RateLimited { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SentinelError>;
