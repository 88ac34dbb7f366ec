//! In-memory TTL cache for race results.
//!
//! Uses `DashMap` so independent prediction cycles can share one store
//! without a global lock. Expired entries are evicted lazily on read.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::config::CacheConfig;
use common::{BettingInsights, PredictionResult};
use dashmap::DashMap;
use tracing::debug;

/// What kind of data an entry holds; selects its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheCategory {
    RaceData,
    PracticeData,
    HistoricalData,
    Predictions,
}

impl CacheCategory {
    /// Key prefix used for entries of this category.
    pub fn tag(self) -> &'static str {
        match self {
            CacheCategory::RaceData => "race",
            CacheCategory::PracticeData => "practice",
            CacheCategory::HistoricalData => "historical",
            CacheCategory::Predictions => "predictions",
        }
    }

    /// Deterministic key for a race, e.g. `predictions_Monaco Grand Prix`.
    pub fn key(self, race_name: &str) -> String {
        cache_key(self.tag(), race_name)
    }
}

/// `"{tag}_{race}"`, shared with any other process reading the same keys.
pub fn cache_key(tag: &str, race_name: &str) -> String {
    format!("{}_{}", tag, race_name)
}

/// Lifetime per category.
#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub race_data: Duration,
    pub practice_data: Duration,
    pub historical_data: Duration,
    pub predictions: Duration,
}

impl CacheTtls {
    pub fn ttl(&self, category: CacheCategory) -> Duration {
        match category {
            CacheCategory::RaceData => self.race_data,
            CacheCategory::PracticeData => self.practice_data,
            CacheCategory::HistoricalData => self.historical_data,
            CacheCategory::Predictions => self.predictions,
        }
    }
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for CacheTtls {
    fn from(cfg: &CacheConfig) -> Self {
        Self {
            race_data: Duration::from_secs(cfg.race_data_secs),
            practice_data: Duration::from_secs(cfg.practice_data_secs),
            historical_data: Duration::from_secs(cfg.historical_data_secs),
            predictions: Duration::from_secs(cfg.predictions_secs),
        }
    }
}

/// A cached payload with its expiry bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub payload: V,
    pub stored_at: Instant,
    pub expiration: Duration,
}

impl<V> CacheEntry<V> {
    /// Readable strictly before `stored_at + expiration`.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) >= self.expiration
    }
}

/// Thread-safe keyed store with per-category expiration.
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    ttls: CacheTtls,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttls: CacheTtls) -> Self {
        Self {
            entries: DashMap::new(),
            ttls,
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Lookup as of `now`. An expired entry is removed and reported absent.
    pub fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        {
            let entry = self.entries.get(key)?;
            if !entry.is_expired_at(now) {
                return Some(entry.payload.clone());
            }
        }

        if self.entries.remove_if(key, |_, e| e.is_expired_at(now)).is_some() {
            debug!("Cache entry expired: {}", key);
        }
        None
    }

    pub fn set(&self, key: impl Into<String>, payload: V, category: CacheCategory) {
        self.set_at(key, payload, category, Instant::now());
    }

    /// Store as of `now`, replacing any previous entry for the key.
    pub fn set_at(&self, key: impl Into<String>, payload: V, category: CacheCategory, now: Instant) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                payload,
                stored_at: now,
                expiration: self.ttls.ttl(category),
            },
        );
    }

    /// Remove every entry whose key contains `pattern`. Returns the count.
    pub fn invalidate(&self, pattern: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.contains(pattern));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!("Invalidated {} cache entries matching '{}'", removed, pattern);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ttls(&self) -> &CacheTtls {
        &self.ttls
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new(CacheTtls::default())
    }
}

/// Everything the engine and analyzer store in the shared cache.
#[derive(Debug, Clone)]
pub enum CachedResult {
    Prediction(Box<PredictionResult>),
    Betting(Box<BettingInsights>),
    /// One sub-score per driver name.
    SubScores(HashMap<String, f64>),
}

/// Cache shared by the scoring engine and the betting analyzer.
pub type ResultCache = Arc<TtlCache<CachedResult>>;

/// Create a new empty ResultCache.
pub fn new_result_cache(ttls: CacheTtls) -> ResultCache {
    Arc::new(TtlCache::new(ttls))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> TtlCache<String> {
        TtlCache::new(CacheTtls::default())
    }

    #[test]
    fn test_entry_readable_until_ttl_boundary() {
        let c = cache();
        let t0 = Instant::now();
        c.set_at("predictions_Monza", "p".to_string(), CacheCategory::Predictions, t0);

        let ttl = Duration::from_secs(15 * 60);
        assert_eq!(
            c.get_at("predictions_Monza", t0 + ttl - Duration::from_millis(1)),
            Some("p".to_string())
        );
        assert_eq!(c.get_at("predictions_Monza", t0 + ttl), None);
        assert!(c.is_empty(), "expired entry should be evicted on read");
    }

    #[test]
    fn test_category_ttls() {
        let ttls = CacheTtls::default();
        assert_eq!(ttls.ttl(CacheCategory::RaceData), Duration::from_secs(3600));
        assert_eq!(ttls.ttl(CacheCategory::PracticeData), Duration::from_secs(1800));
        assert_eq!(ttls.ttl(CacheCategory::HistoricalData), Duration::from_secs(86_400));
        assert_eq!(ttls.ttl(CacheCategory::Predictions), Duration::from_secs(900));
    }

    #[test]
    fn test_longer_category_outlives_shorter() {
        let c = cache();
        let t0 = Instant::now();
        c.set_at("historical_Spa", "h".to_string(), CacheCategory::HistoricalData, t0);
        c.set_at("practice_Spa", "p".to_string(), CacheCategory::PracticeData, t0);

        let later = t0 + Duration::from_secs(45 * 60);
        assert!(c.get_at("historical_Spa", later).is_some());
        assert!(c.get_at("practice_Spa", later).is_none());
    }

    #[test]
    fn test_set_overwrites_and_restarts_clock() {
        let c = cache();
        let t0 = Instant::now();
        c.set_at("k", "old".to_string(), CacheCategory::Predictions, t0);
        let t1 = t0 + Duration::from_secs(600);
        c.set_at("k", "new".to_string(), CacheCategory::Predictions, t1);

        assert_eq!(c.len(), 1);
        assert_eq!(
            c.get_at("k", t0 + Duration::from_secs(1000)),
            Some("new".to_string())
        );
    }

    #[test]
    fn test_invalidate_by_substring() {
        let c = cache();
        c.set("predictions_Monaco", "a".to_string(), CacheCategory::Predictions);
        c.set("betting_Monaco", "b".to_string(), CacheCategory::Predictions);
        c.set("predictions_Silverstone", "c".to_string(), CacheCategory::Predictions);

        assert_eq!(c.invalidate("Monaco"), 2);
        assert!(c.get("betting_Monaco").is_none());
        assert!(c.get("predictions_Silverstone").is_some());
    }

    #[test]
    fn test_missing_and_expired_look_the_same() {
        let c = cache();
        let t0 = Instant::now();
        c.set_at("x", "v".to_string(), CacheCategory::Predictions, t0);
        let late = t0 + Duration::from_secs(3600);
        assert_eq!(c.get_at("x", late), c.get_at("never-set", late));
    }

    #[test]
    fn test_key_derivation() {
        assert_eq!(CacheCategory::Predictions.key("Monaco"), "predictions_Monaco");
        assert_eq!(cache_key("betting", "Monaco"), "betting_Monaco");
    }
}
