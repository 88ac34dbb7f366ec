//! Unified error type for the race predictor.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Odds API error (status={status}): {message}")]
    OddsApi { status: u16, message: String },

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether a caller may reasonably retry the failed operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RateLimited { .. } | Error::UpstreamUnavailable(_) | Error::Http(_)
        )
    }

    /// Whether the error must abort the whole prediction cycle.
    pub fn is_fatal_for_cycle(&self) -> bool {
        matches!(self, Error::MissingInput(_))
    }
}
