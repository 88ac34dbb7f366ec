//! Domain types shared across the predictor.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Race Input Types ──────────────────────────────────────────────────

/// Everything the engine knows about one upcoming race.
///
/// Supplied whole by the caller and treated as read-only for a cycle.
/// Only `race_name` and `drivers` are load-bearing; every other field
/// falls back to a neutral default when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceContext {
    /// Unique race identity, used to derive cache keys.
    pub race_name: String,
    #[serde(default)]
    pub drivers: Vec<Driver>,
    #[serde(default)]
    pub weather: Option<Weather>,
    #[serde(default)]
    pub practice: PracticeSessions,
}

impl RaceContext {
    pub fn teammates<'a>(&'a self, team: &'a str) -> impl Iterator<Item = &'a Driver> + 'a {
        self.drivers.iter().filter(move |d| d.team == team)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub name: String,
    #[serde(default)]
    pub team: String,
    /// Recent form scalar in [0,1].
    #[serde(default)]
    pub recent_form: Option<f64>,
    /// Grid position from qualifying (1-based).
    #[serde(default)]
    pub qualifying_position: Option<u32>,
    #[serde(default)]
    pub history: DriverHistory,
    #[serde(default)]
    pub reliability: ReliabilityHistory,
}

impl Driver {
    pub fn new(name: impl Into<String>, team: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            team: team.into(),
            recent_form: None,
            qualifying_position: None,
            history: DriverHistory::default(),
            reliability: ReliabilityHistory::default(),
        }
    }
}

/// Normalized (0–1) historical performance indicators.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverHistory {
    #[serde(default)]
    pub last_race: Option<f64>,
    #[serde(default)]
    pub last_three_races: Option<f64>,
    #[serde(default)]
    pub season_performance: Option<f64>,
    #[serde(default)]
    pub track_history: Option<f64>,
    #[serde(default)]
    pub wet_performance: Option<f64>,
    #[serde(default)]
    pub temperature_sensitivity: Option<f64>,
}

impl DriverHistory {
    /// Count of populated fields out of [`DriverHistory::FIELDS`].
    pub fn known_fields(&self) -> usize {
        [
            self.last_race,
            self.last_three_races,
            self.season_performance,
            self.track_history,
            self.wet_performance,
            self.temperature_sensitivity,
        ]
        .iter()
        .filter(|v| v.is_some())
        .count()
    }

    pub const FIELDS: usize = 6;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReliabilityHistory {
    /// Technical retirements over the last three races.
    #[serde(default)]
    pub technical_dnfs: Option<u32>,
    /// Remaining power-unit/gearbox life, 0–1.
    #[serde(default)]
    pub component_life: Option<f64>,
    /// Share of races finished without incident, 0–1.
    #[serde(default)]
    pub consistency_rate: Option<f64>,
}

impl ReliabilityHistory {
    pub fn known_fields(&self) -> usize {
        usize::from(self.technical_dnfs.is_some())
            + usize::from(self.component_life.is_some())
            + usize::from(self.consistency_rate.is_some())
    }

    pub const FIELDS: usize = 3;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Weather {
    /// Chance of rain, 0–100.
    pub rain_chance: f64,
    /// Air temperature in °C.
    pub temperature: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PracticeSession {
    Fp1,
    Fp2,
    Fp3,
}

impl PracticeSession {
    pub const ALL: [PracticeSession; 3] =
        [PracticeSession::Fp1, PracticeSession::Fp2, PracticeSession::Fp3];

    /// Later sessions are closer to race trim and weigh more.
    pub fn weight(self) -> f64 {
        match self {
            PracticeSession::Fp1 => 0.2,
            PracticeSession::Fp2 => 0.3,
            PracticeSession::Fp3 => 0.5,
        }
    }
}

/// Up to three free-practice summaries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PracticeSessions {
    #[serde(default)]
    pub fp1: Option<PracticeSummary>,
    #[serde(default)]
    pub fp2: Option<PracticeSummary>,
    #[serde(default)]
    pub fp3: Option<PracticeSummary>,
}

impl PracticeSessions {
    pub fn get(&self, session: PracticeSession) -> Option<&PracticeSummary> {
        match session {
            PracticeSession::Fp1 => self.fp1.as_ref(),
            PracticeSession::Fp2 => self.fp2.as_ref(),
            PracticeSession::Fp3 => self.fp3.as_ref(),
        }
    }

    /// Sessions that were supplied, in chronological order.
    pub fn available(&self) -> impl Iterator<Item = (PracticeSession, &PracticeSummary)> + '_ {
        PracticeSession::ALL
            .into_iter()
            .filter_map(move |s| self.get(s).map(|summary| (s, summary)))
    }

    pub fn is_empty(&self) -> bool {
        self.available().next().is_none()
    }
}

/// Per-driver samples from one practice session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PracticeSummary {
    /// Lap times in seconds, keyed by driver name.
    #[serde(default)]
    pub lap_times: HashMap<String, Vec<f64>>,
    /// Tire performance samples (0–1), keyed by driver name.
    #[serde(default)]
    pub tire_performance: HashMap<String, Vec<f64>>,
}

impl PracticeSummary {
    pub fn has_driver(&self, name: &str) -> bool {
        self.lap_times.get(name).is_some_and(|t| !t.is_empty())
            || self.tire_performance.get(name).is_some_and(|t| !t.is_empty())
    }
}

// ── Prediction Output Types ───────────────────────────────────────────

/// The six weighted sub-scores and three modifiers behind a driver score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub historical: f64,
    pub practice: f64,
    pub weather: f64,
    pub track_specific: f64,
    pub recent_form: f64,
    pub qualifying: f64,
    pub reliability: f64,
    pub team_performance: f64,
    pub strategy_efficiency: f64,
}

impl ScoreBreakdown {
    /// The six weighted sub-scores, without the modifiers.
    pub fn sub_scores(&self) -> [f64; 6] {
        [
            self.historical,
            self.practice,
            self.weather,
            self.track_specific,
            self.recent_form,
            self.qualifying,
        ]
    }

    pub fn modifiers(&self) -> [f64; 3] {
        [self.reliability, self.team_performance, self.strategy_efficiency]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverScore {
    pub name: String,
    pub team: String,
    /// Composite score in [0,1] after nonlinear scaling.
    pub score: f64,
    pub confidence: f64,
    /// Share of optional inputs that were actually supplied.
    pub data_quality: f64,
    pub metrics: ScoreBreakdown,
}

/// Distribution of per-driver confidence values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceMetrics {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub very_low: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub race_name: String,
    pub winner: DriverScore,
    /// Sorted by score descending, ties broken by name.
    pub finishing_order: Vec<DriverScore>,
    pub accuracy_index: f64,
    pub confidence_metrics: ConfidenceMetrics,
    pub generated_at: DateTime<Utc>,
}

// ── Market Types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsQuote {
    pub bookmaker: String,
    /// Decimal price.
    pub price: f64,
}

/// Race-wide outright odds, keyed by driver name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketOdds {
    pub drivers: BTreeMap<String, Vec<OddsQuote>>,
    pub fetched_at: DateTime<Utc>,
}

impl MarketOdds {
    pub fn new(drivers: BTreeMap<String, Vec<OddsQuote>>) -> Self {
        Self {
            drivers,
            fetched_at: Utc::now(),
        }
    }

    pub fn empty() -> Self {
        Self::new(BTreeMap::new())
    }

    /// Quotes for a driver; empty when the market has none.
    pub fn quotes_for(&self, driver: &str) -> &[OddsQuote] {
        self.drivers.get(driver).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Highest-priced quote for a driver. Ties keep the first occurrence.
    pub fn best_quote(&self, driver: &str) -> Option<&OddsQuote> {
        best_quote(self.quotes_for(driver))
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.values().all(Vec::is_empty)
    }
}

/// Highest-priced quote in a slice. Ties keep the first occurrence.
pub fn best_quote(quotes: &[OddsQuote]) -> Option<&OddsQuote> {
    quotes.iter().fold(None, |best: Option<&OddsQuote>, q| match best {
        Some(b) if q.price <= b.price => Some(b),
        _ => Some(q),
    })
}

// ── Betting Output Types ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BetType {
    Win,
    Place,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetRecommendation {
    pub driver: String,
    pub bet_type: BetType,
    /// Copied from the driver's score.
    pub confidence: f64,
    pub probability: f64,
    pub expected_value: f64,
    pub best_odds: OddsQuote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueOpportunity {
    pub driver: String,
    pub predicted_probability: f64,
    pub market_odds: Option<OddsQuote>,
    /// Predicted probability over market-implied probability; 0 without odds.
    pub value_ratio: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskAnalysis {
    pub weather: f64,
    pub technical: f64,
    pub strategic: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookmakerMargin {
    pub bookmaker: String,
    /// Sum of implied probabilities across quoted drivers.
    pub overround: f64,
    pub drivers_quoted: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketAnalysis {
    pub bookmaker_count: usize,
    pub drivers_quoted: usize,
    /// Mean overround across bookmakers; `None` without odds.
    pub average_overround: Option<f64>,
    pub bookmakers: Vec<BookmakerMargin>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BettingInsights {
    pub race_name: String,
    pub recommended_bets: Vec<BetRecommendation>,
    pub risk_analysis: RiskAnalysis,
    pub value_opportunities: Vec<ValueOpportunity>,
    pub market_analysis: MarketAnalysis,
    /// False when the insights were built without market odds.
    pub odds_available: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(bookmaker: &str, price: f64) -> OddsQuote {
        OddsQuote {
            bookmaker: bookmaker.into(),
            price,
        }
    }

    #[test]
    fn test_best_quote_prefers_first_on_tie() {
        let quotes = vec![quote("a", 2.0), quote("b", 3.5), quote("c", 3.5)];
        let best = best_quote(&quotes).expect("non-empty quotes");
        assert_eq!(best.bookmaker, "b");
    }

    #[test]
    fn test_best_quote_empty() {
        assert!(best_quote(&[]).is_none());
        assert!(MarketOdds::empty().best_quote("Nobody").is_none());
    }

    #[test]
    fn test_practice_sessions_available_in_order() {
        let sessions = PracticeSessions {
            fp1: None,
            fp2: Some(PracticeSummary::default()),
            fp3: Some(PracticeSummary::default()),
        };
        let got: Vec<_> = sessions.available().map(|(s, _)| s).collect();
        assert_eq!(got, vec![PracticeSession::Fp2, PracticeSession::Fp3]);
        assert!(PracticeSessions::default().is_empty());
    }

    #[test]
    fn test_race_context_deserializes_sparse_input() {
        let ctx: RaceContext = serde_json::from_str(
            r#"{
                "race_name": "Monaco",
                "drivers": [{"name": "Charles Leclerc", "team": "Ferrari"}]
            }"#,
        )
        .expect("sparse context should deserialize");

        assert_eq!(ctx.drivers.len(), 1);
        assert!(ctx.weather.is_none());
        assert!(ctx.practice.is_empty());
        assert_eq!(ctx.drivers[0].history.known_fields(), 0);
    }
}
