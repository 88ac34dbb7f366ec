//! Predictor configuration types.

use serde::{Deserialize, Serialize};

/// Top-level predictor configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictorConfig {
    /// Odds provider settings.
    #[serde(default)]
    pub odds: OddsConfig,

    /// Result cache lifetimes.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Timing parameters (seconds).
    #[serde(default)]
    pub timing: TimingConfig,
}

/// Settings for The Odds API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsConfig {
    /// API key (`apiKey` query parameter).
    #[serde(default)]
    pub api_key: String,

    /// Base URL, without the sport segment.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Sport key, e.g. `motorsport_f1`.
    #[serde(default = "default_sport")]
    pub sport: String,

    /// Bookmaker regions (`eu`, `uk`, `us`, ...).
    #[serde(default = "default_regions")]
    pub regions: String,

    /// Comma-separated market keys to request.
    #[serde(default = "default_markets")]
    pub markets: String,

    /// Max upstream requests per trailing 60 seconds.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// How long a fetched odds response is reused.
    #[serde(default = "default_response_cache_secs")]
    pub response_cache_secs: u64,

    /// HTTP timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Per-category lifetimes for the result cache (seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_race_data_ttl")]
    pub race_data_secs: u64,
    #[serde(default = "default_practice_data_ttl")]
    pub practice_data_secs: u64,
    #[serde(default = "default_historical_data_ttl")]
    pub historical_data_secs: u64,
    #[serde(default = "default_predictions_ttl")]
    pub predictions_secs: u64,
}

/// Timing configuration (all values in seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Interval between cycles in watch mode.
    #[serde(default = "default_watch_interval")]
    pub watch_interval_secs: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_base_url() -> String {
    "https://api.the-odds-api.com/v4/sports".into()
}
fn default_sport() -> String {
    "motorsport_f1".into()
}
fn default_regions() -> String {
    "eu".into()
}
fn default_markets() -> String {
    "h2h,winner".into()
}
fn default_requests_per_minute() -> u32 {
    10
}
fn default_response_cache_secs() -> u64 {
    300
}
fn default_timeout_secs() -> u64 {
    15
}

fn default_race_data_ttl() -> u64 {
    60 * 60
}
fn default_practice_data_ttl() -> u64 {
    30 * 60
}
fn default_historical_data_ttl() -> u64 {
    24 * 60 * 60
}
fn default_predictions_ttl() -> u64 {
    15 * 60
}

fn default_watch_interval() -> u64 {
    300
}

impl Default for OddsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            sport: default_sport(),
            regions: default_regions(),
            markets: default_markets(),
            requests_per_minute: default_requests_per_minute(),
            response_cache_secs: default_response_cache_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            race_data_secs: default_race_data_ttl(),
            practice_data_secs: default_practice_data_ttl(),
            historical_data_secs: default_historical_data_ttl(),
            predictions_secs: default_predictions_ttl(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            watch_interval_secs: default_watch_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_provider_quota() {
        let cfg = PredictorConfig::default();
        assert_eq!(cfg.odds.requests_per_minute, 10);
        assert_eq!(cfg.odds.response_cache_secs, 300);
        assert_eq!(cfg.cache.predictions_secs, 900);
        assert_eq!(cfg.cache.historical_data_secs, 86_400);
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let cfg: PredictorConfig =
            serde_json::from_str(r#"{"odds": {"api_key": "abc"}}"#).expect("config should parse");
        assert_eq!(cfg.odds.api_key, "abc");
        assert_eq!(cfg.odds.sport, "motorsport_f1");
        assert_eq!(cfg.cache.race_data_secs, 3600);
        assert_eq!(cfg.timing.watch_interval_secs, 300);
    }
}
