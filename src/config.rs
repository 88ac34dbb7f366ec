//! Configuration loader: merges .env, config.toml and environment variables.

use common::{Error, PredictorConfig};
use std::path::Path;

fn parse_positive<T>(raw: &str, env_name: &str) -> Result<T, Error>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let parsed = raw
        .trim()
        .parse::<T>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer > 0")))?;
    if parsed <= T::default() {
        return Err(Error::Config(format!("{env_name} must be an integer > 0")));
    }
    Ok(parsed)
}

/// Apply environment overrides. `lookup` is `std::env::var` outside tests.
fn apply_env_overrides(
    config: &mut PredictorConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), Error> {
    if let Some(key) = lookup("ODDS_API_KEY") {
        config.odds.api_key = key.trim().to_string();
    }
    if let Some(url) = lookup("ODDS_API_BASE_URL") {
        config.odds.base_url = url.trim().to_string();
    }
    if let Some(sport) = lookup("ODDS_SPORT") {
        config.odds.sport = sport.trim().to_string();
    }
    if let Some(raw) = lookup("ODDS_REQUESTS_PER_MINUTE") {
        config.odds.requests_per_minute = parse_positive(&raw, "ODDS_REQUESTS_PER_MINUTE")?;
    }
    if let Some(raw) = lookup("ODDS_CACHE_SECS") {
        config.odds.response_cache_secs = parse_positive(&raw, "ODDS_CACHE_SECS")?;
    }
    if let Some(raw) = lookup("PREDICTOR_WATCH_INTERVAL_SECS") {
        config.timing.watch_interval_secs = parse_positive(&raw, "PREDICTOR_WATCH_INTERVAL_SECS")?;
    }
    Ok(())
}

fn validate_config(config: &PredictorConfig, require_odds: bool) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if require_odds && config.odds.api_key.is_empty() {
        issues.push("ODDS_API_KEY is required unless --no-odds is set".into());
    }
    if config.odds.base_url.trim().is_empty() {
        issues.push("odds.base_url must not be empty".into());
    }
    if config.odds.sport.trim().is_empty() {
        issues.push("odds.sport must not be empty".into());
    }
    if config.odds.requests_per_minute == 0 {
        issues.push("odds.requests_per_minute must be > 0".into());
    }
    if config.odds.timeout_secs == 0 {
        issues.push("odds.timeout_secs must be > 0".into());
    }

    let ttls = [
        ("cache.race_data_secs", config.cache.race_data_secs),
        ("cache.practice_data_secs", config.cache.practice_data_secs),
        ("cache.historical_data_secs", config.cache.historical_data_secs),
        ("cache.predictions_secs", config.cache.predictions_secs),
    ];
    for (name, secs) in ttls {
        if secs == 0 {
            issues.push(format!("{name} must be > 0"));
        }
    }

    if config.timing.watch_interval_secs == 0 {
        issues.push("timing.watch_interval_secs must be > 0".into());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Load predictor configuration from environment and optional config file.
pub fn load_config(require_odds: bool) -> Result<PredictorConfig, Error> {
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    let mut config = PredictorConfig::default();

    let config_path = Path::new("config.toml");
    if config_path.exists() {
        let contents = std::fs::read_to_string(config_path)
            .map_err(|e| Error::Config(format!("Failed to read config.toml: {}", e)))?;
        config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config.toml: {}", e)))?;
    }

    // Environment wins over the file.
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

    validate_config(&config, require_odds)?;

    Ok(config)
}
