//! Driver scoring engine.
//!
//! Each driver gets six weighted sub-scores (historical, practice, weather,
//! track-specific, recent form, qualifying) scaled by the mean of three
//! modifiers (reliability, team performance, strategy efficiency). The
//! product is raised to the power 1.5 to spread out close competitors.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use common::{
    ConfidenceMetrics, Driver, DriverHistory, DriverScore, Error, PracticeSession,
    PredictionResult, RaceContext, ReliabilityHistory, ScoreBreakdown, Weather,
};
use tracing::{debug, info};

use crate::cache::{CacheCategory, CachedResult, ResultCache};
use crate::estimator::{Estimator, NEUTRAL};

// ── Weight tables ─────────────────────────────────────────────────────

/// Weights of the six sub-scores in the base score.
#[derive(Debug, Clone, Copy)]
pub struct FactorWeights {
    pub historical: f64,
    pub practice: f64,
    pub weather: f64,
    pub track_specific: f64,
    pub recent_form: f64,
    pub qualifying: f64,
}

impl FactorWeights {
    pub fn as_array(&self) -> [f64; 6] {
        [
            self.historical,
            self.practice,
            self.weather,
            self.track_specific,
            self.recent_form,
            self.qualifying,
        ]
    }
}

pub const FACTOR_WEIGHTS: FactorWeights = FactorWeights {
    historical: 0.20,
    practice: 0.25,
    weather: 0.15,
    track_specific: 0.15,
    recent_form: 0.15,
    qualifying: 0.10,
};

/// Weights inside the historical sub-score.
#[derive(Debug, Clone, Copy)]
pub struct HistoricalWeights {
    pub last_race: f64,
    pub last_three_races: f64,
    pub season_performance: f64,
    pub track_history: f64,
}

pub const HISTORICAL_WEIGHTS: HistoricalWeights = HistoricalWeights {
    last_race: 0.3,
    last_three_races: 0.3,
    season_performance: 0.2,
    track_history: 0.2,
};

/// Weights inside one practice session's score.
#[derive(Debug, Clone, Copy)]
pub struct PracticeMetricWeights {
    pub lap_time: f64,
    pub consistency: f64,
    pub tire_management: f64,
}

pub const PRACTICE_METRIC_WEIGHTS: PracticeMetricWeights = PracticeMetricWeights {
    lap_time: 0.4,
    consistency: 0.3,
    tire_management: 0.3,
};

/// Weights inside the reliability modifier.
#[derive(Debug, Clone, Copy)]
pub struct ReliabilityWeights {
    pub technical_dnfs: f64,
    pub component_life: f64,
    pub consistency_rate: f64,
}

pub const RELIABILITY_WEIGHTS: ReliabilityWeights = ReliabilityWeights {
    technical_dnfs: 0.4,
    component_life: 0.3,
    consistency_rate: 0.3,
};

/// Exponent applied to `base × modifier`. Must stay exactly 1.5.
pub const SCORE_EXPONENT: f64 = 1.5;

/// Retirements counted over this many races.
const DNF_WINDOW: f64 = 3.0;

/// Temperature range (°C) mapped onto [0,1] for the weather score.
const TEMP_RANGE_C: (f64, f64) = (10.0, 40.0);

/// A lap-time coefficient of variation of 5% or more scores zero consistency.
const CONSISTENCY_CV_SCALE: f64 = 20.0;

const HIGH_CONFIDENCE: f64 = 0.85;
const MEDIUM_CONFIDENCE: f64 = 0.65;
const LOW_CONFIDENCE: f64 = 0.45;

/// Optional inputs counted by the data-quality estimate.
const OPTIONAL_INPUTS: usize = 2 // recent form, qualifying
    + DriverHistory::FIELDS
    + ReliabilityHistory::FIELDS
    + 1 // weather
    + PracticeSession::ALL.len();

// ── Pure helpers ──────────────────────────────────────────────────────

fn unit(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        NEUTRAL
    }
}

fn or_neutral(v: Option<f64>) -> f64 {
    v.map(unit).unwrap_or(NEUTRAL)
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

/// Population variance; zero for an empty slice.
pub fn variance(values: &[f64]) -> f64 {
    let Some(m) = mean(values) else {
        return 0.0;
    };
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// `1 − (avg − fastest) / fastest`; 0.5 when there is nothing to normalize.
pub fn normalize_lap_times(times: &[f64]) -> f64 {
    let Some(avg) = mean(times) else {
        return NEUTRAL;
    };
    let fastest = times.iter().copied().fold(f64::INFINITY, f64::min);
    if !(fastest.is_finite() && fastest > 0.0) {
        return NEUTRAL;
    }
    unit(1.0 - (avg - fastest) / fastest)
}

/// Lap-to-lap consistency from the coefficient of variation.
pub fn consistency_score(times: &[f64]) -> f64 {
    if times.len() < 2 {
        return NEUTRAL;
    }
    let Some(avg) = mean(times) else {
        return NEUTRAL;
    };
    if avg <= 0.0 {
        return NEUTRAL;
    }
    let cv = variance(times).sqrt() / avg;
    unit(1.0 - cv * CONSISTENCY_CV_SCALE)
}

pub fn tire_management_score(samples: &[f64]) -> f64 {
    mean(samples).map(unit).unwrap_or(NEUTRAL)
}

/// `1 − (pos − 1) / (total − 1)`; a lone driver is trivially on pole.
pub fn normalize_qualifying(position: Option<u32>, total_drivers: usize) -> f64 {
    let Some(pos) = position else {
        return NEUTRAL;
    };
    if total_drivers <= 1 {
        return 1.0;
    }
    let pos = pos.max(1) as f64;
    unit(1.0 - (pos - 1.0) / (total_drivers as f64 - 1.0))
}

pub fn normalize_temperature(celsius: f64) -> f64 {
    let (lo, hi) = TEMP_RANGE_C;
    unit((celsius - lo) / (hi - lo))
}

pub fn historical_score(history: &DriverHistory) -> f64 {
    let w = HISTORICAL_WEIGHTS;
    or_neutral(history.last_race) * w.last_race
        + or_neutral(history.last_three_races) * w.last_three_races
        + or_neutral(history.season_performance) * w.season_performance
        + or_neutral(history.track_history) * w.track_history
}

pub fn weather_score(history: &DriverHistory, weather: Option<&Weather>) -> f64 {
    let Some(weather) = weather else {
        return NEUTRAL;
    };
    let rain = unit(weather.rain_chance / 100.0);
    let wet = or_neutral(history.wet_performance);
    let sensitivity = or_neutral(history.temperature_sensitivity);
    let temp = normalize_temperature(weather.temperature);

    wet * rain + sensitivity * temp * (1.0 - rain)
}

pub fn reliability_score(reliability: &ReliabilityHistory) -> f64 {
    let w = RELIABILITY_WEIGHTS;
    let dnf = reliability
        .technical_dnfs
        .map(|n| unit(1.0 - n as f64 / DNF_WINDOW))
        .unwrap_or(NEUTRAL);

    dnf * w.technical_dnfs
        + or_neutral(reliability.component_life) * w.component_life
        + or_neutral(reliability.consistency_rate) * w.consistency_rate
}

/// `(base × modifier)^1.5` where base is the weighted sub-score sum.
pub fn final_score(metrics: &ScoreBreakdown) -> f64 {
    let base: f64 = FACTOR_WEIGHTS
        .as_array()
        .iter()
        .zip(metrics.sub_scores())
        .map(|(w, s)| w * s)
        .sum();
    let modifier = metrics.modifiers().iter().sum::<f64>() / 3.0;

    unit(base * modifier).powf(SCORE_EXPONENT)
}

/// High when sub-scores agree and the inputs were complete.
pub fn confidence(metrics: &ScoreBreakdown, data_quality: f64) -> f64 {
    let consistency = 1.0 - variance(&metrics.sub_scores()).sqrt();
    unit((consistency + data_quality) / 2.0)
}

/// Share of a driver's optional inputs that were supplied.
pub fn data_quality(driver: &Driver, ctx: &RaceContext) -> f64 {
    let known = usize::from(driver.recent_form.is_some())
        + usize::from(driver.qualifying_position.is_some())
        + driver.history.known_fields()
        + driver.reliability.known_fields()
        + usize::from(ctx.weather.is_some())
        + ctx
            .practice
            .available()
            .filter(|(_, s)| s.has_driver(&driver.name))
            .count();

    known as f64 / OPTIONAL_INPUTS as f64
}

/// Sort by score descending, breaking ties by name.
pub fn rank(mut scores: Vec<DriverScore>) -> Vec<DriverScore> {
    scores.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
    scores
}

pub fn confidence_metrics(scores: &[DriverScore]) -> ConfidenceMetrics {
    let values: Vec<f64> = scores.iter().map(|s| s.confidence).collect();
    if values.is_empty() {
        return ConfidenceMetrics {
            mean: 0.0,
            min: 0.0,
            max: 0.0,
            high: 0,
            medium: 0,
            low: 0,
            very_low: 0,
        };
    }
    let bucket = |lo: f64, hi: f64| values.iter().filter(|&&c| c >= lo && c < hi).count();

    ConfidenceMetrics {
        mean: mean(&values).unwrap_or(0.0),
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        high: values.iter().filter(|&&c| c >= HIGH_CONFIDENCE).count(),
        medium: bucket(MEDIUM_CONFIDENCE, HIGH_CONFIDENCE),
        low: bucket(LOW_CONFIDENCE, MEDIUM_CONFIDENCE),
        very_low: values.iter().filter(|&&c| c < LOW_CONFIDENCE).count(),
    }
}

// ── Practice analysis ─────────────────────────────────────────────────

/// Per-session breakdown behind a driver's practice sub-score.
#[derive(Debug, Clone, PartialEq)]
pub struct PracticeAnalysis {
    /// Unweighted score of each session the driver ran in.
    pub session_scores: Vec<(PracticeSession, f64)>,
    /// Session-weighted blend; 0.5 without practice data.
    pub aggregate: f64,
    /// Relative average lap-time gain from the first to the last supplied
    /// session with laps. Positive means the driver got faster.
    pub lap_time_trend: Option<f64>,
}

/// Blend the driver's practice sessions.
///
/// Only sessions holding data for the driver count. A session that was not
/// run and a session the driver sat out are both skipped, and the session
/// weights are renormalized over what remains.
pub fn analyze_practice(driver: &str, ctx: &RaceContext) -> PracticeAnalysis {
    let w = PRACTICE_METRIC_WEIGHTS;
    let mut session_scores = Vec::new();
    let mut weighted = 0.0;
    let mut weight_total = 0.0;
    let mut session_averages = Vec::new();

    for (session, summary) in ctx.practice.available() {
        if !summary.has_driver(driver) {
            continue;
        }
        let laps = summary.lap_times.get(driver).map(Vec::as_slice).unwrap_or(&[]);
        let tires = summary
            .tire_performance
            .get(driver)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let score = normalize_lap_times(laps) * w.lap_time
            + consistency_score(laps) * w.consistency
            + tire_management_score(tires) * w.tire_management;

        weighted += session.weight() * score;
        weight_total += session.weight();
        session_scores.push((session, score));
        if let Some(avg) = mean(laps) {
            session_averages.push(avg);
        }
    }

    let aggregate = if weight_total > 0.0 {
        weighted / weight_total
    } else {
        NEUTRAL
    };

    let lap_time_trend = match (session_averages.first(), session_averages.last()) {
        (Some(first), Some(last)) if session_averages.len() > 1 && *first > 0.0 => {
            Some((first - last) / first)
        }
        _ => None,
    };

    PracticeAnalysis {
        session_scores,
        aggregate,
        lap_time_trend,
    }
}

// ── Engine ────────────────────────────────────────────────────────────

/// Scores and ranks the field for a race, caching results by race name.
#[derive(Clone)]
pub struct PredictionEngine {
    estimator: Arc<dyn Estimator>,
    cache: ResultCache,
}

impl PredictionEngine {
    pub fn new(estimator: Arc<dyn Estimator>, cache: ResultCache) -> Self {
        Self { estimator, cache }
    }

    /// Full prediction for a race, served from cache within the
    /// predictions TTL.
    ///
    /// # Errors
    ///
    /// `Error::MissingInput` when the race has no name or no drivers.
    pub fn generate_predictions(&self, ctx: &RaceContext) -> Result<PredictionResult, Error> {
        validate(ctx)?;

        let key = CacheCategory::Predictions.key(&ctx.race_name);
        if let Some(CachedResult::Prediction(cached)) = self.cache.get(&key) {
            debug!("{}: predictions served from cache", ctx.race_name);
            return Ok(*cached);
        }

        let finishing_order = self.predict_finishing_order(ctx)?;
        let Some(winner) = finishing_order.first().cloned() else {
            return Err(Error::MissingInput(format!(
                "{}: no drivers to rank",
                ctx.race_name
            )));
        };

        let result = PredictionResult {
            race_name: ctx.race_name.clone(),
            accuracy_index: self.accuracy_index(ctx, &finishing_order),
            confidence_metrics: confidence_metrics(&finishing_order),
            winner,
            finishing_order,
            generated_at: Utc::now(),
        };

        info!(
            "{}: predicted winner {} (score={:.3}, confidence={:.2}, accuracy={:.2})",
            result.race_name,
            result.winner.name,
            result.winner.score,
            result.winner.confidence,
            result.accuracy_index
        );

        self.cache.set(
            key,
            CachedResult::Prediction(Box::new(result.clone())),
            CacheCategory::Predictions,
        );
        Ok(result)
    }

    pub fn predict_finishing_order(&self, ctx: &RaceContext) -> Result<Vec<DriverScore>, Error> {
        Ok(rank(self.compute_driver_scores(ctx)?))
    }

    /// Score every driver in roster order.
    pub fn compute_driver_scores(&self, ctx: &RaceContext) -> Result<Vec<DriverScore>, Error> {
        validate(ctx)?;

        let historical = self.historical_scores(ctx);
        let practice = self.practice_scores(ctx);
        let total = ctx.drivers.len();

        let scores = ctx
            .drivers
            .iter()
            .map(|driver| {
                let metrics = ScoreBreakdown {
                    historical: historical
                        .get(&driver.name)
                        .copied()
                        .unwrap_or_else(|| historical_score(&driver.history)),
                    practice: practice
                        .get(&driver.name)
                        .copied()
                        .unwrap_or_else(|| analyze_practice(&driver.name, ctx).aggregate),
                    weather: weather_score(&driver.history, ctx.weather.as_ref()),
                    track_specific: or_neutral(driver.history.track_history),
                    recent_form: or_neutral(driver.recent_form),
                    qualifying: normalize_qualifying(driver.qualifying_position, total),
                    reliability: reliability_score(&driver.reliability),
                    team_performance: unit(self.estimator.team_performance(driver, ctx)),
                    strategy_efficiency: unit(self.estimator.strategy_efficiency(driver, ctx)),
                };
                let quality = data_quality(driver, ctx);
                let score = DriverScore {
                    name: driver.name.clone(),
                    team: driver.team.clone(),
                    score: final_score(&metrics),
                    confidence: confidence(&metrics, quality),
                    data_quality: quality,
                    metrics,
                };
                debug!(
                    "{}: score={:.4} confidence={:.3} quality={:.2} {:?}",
                    score.name, score.score, score.confidence, score.data_quality, score.metrics
                );
                score
            })
            .collect();

        Ok(scores)
    }

    /// Race-level index: mean of weather reliability, historical accuracy
    /// and data quality. Missing input classes count as 0.5.
    pub fn accuracy_index(&self, ctx: &RaceContext, scores: &[DriverScore]) -> f64 {
        let weather = ctx
            .weather
            .as_ref()
            .map(|w| unit(self.estimator.weather_reliability(w)))
            .unwrap_or(NEUTRAL);

        let has_history = ctx.drivers.iter().any(|d| d.history.known_fields() > 0);
        let historical = if has_history {
            unit(self.estimator.historical_accuracy(ctx))
        } else {
            NEUTRAL
        };

        let qualities: Vec<f64> = scores.iter().map(|s| s.data_quality).collect();
        let quality = mean(&qualities).unwrap_or(NEUTRAL);

        unit((weather + historical + quality) / 3.0)
    }

    fn historical_scores(&self, ctx: &RaceContext) -> HashMap<String, f64> {
        self.cached_sub_scores(ctx, CacheCategory::HistoricalData, |d| {
            historical_score(&d.history)
        })
    }

    fn practice_scores(&self, ctx: &RaceContext) -> HashMap<String, f64> {
        self.cached_sub_scores(ctx, CacheCategory::PracticeData, |d| {
            analyze_practice(&d.name, ctx).aggregate
        })
    }

    fn cached_sub_scores(
        &self,
        ctx: &RaceContext,
        category: CacheCategory,
        compute: impl Fn(&Driver) -> f64,
    ) -> HashMap<String, f64> {
        let key = category.key(&ctx.race_name);
        if let Some(CachedResult::SubScores(map)) = self.cache.get(&key) {
            return map;
        }
        let map: HashMap<String, f64> = ctx
            .drivers
            .iter()
            .map(|d| (d.name.clone(), compute(d)))
            .collect();
        self.cache
            .set(key, CachedResult::SubScores(map.clone()), category);
        map
    }
}

fn validate(ctx: &RaceContext) -> Result<(), Error> {
    if ctx.race_name.trim().is_empty() {
        return Err(Error::MissingInput("race name".into()));
    }
    if ctx.drivers.is_empty() {
        return Err(Error::MissingInput(format!(
            "{}: driver roster is empty",
            ctx.race_name
        )));
    }
    Ok(())
}
