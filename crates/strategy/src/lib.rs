//! Scoring and betting strategy crate.
//!
//! Ranks drivers for a race, estimates betting value against market odds,
//! and caches both behind a per-category TTL cache.

pub mod betting;
pub mod cache;
pub mod cycle;
pub mod estimator;
pub mod scoring;

pub use betting::{BettingAnalyzer, VALUE_THRESHOLD};
pub use cache::{new_result_cache, CacheCategory, CacheTtls, CachedResult, ResultCache, TtlCache};
pub use cycle::{CycleReport, CycleWarning, PredictionCycle};
pub use estimator::{Estimator, HeuristicEstimator, RandomEstimator};
pub use scoring::{analyze_practice, normalize_lap_times, PracticeAnalysis, PredictionEngine};
