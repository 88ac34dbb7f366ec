//! Swappable estimators for factors the engine has no hard data for.
//!
//! Team performance, strategy efficiency, data reliability, race risks and
//! win probabilities all go through [`Estimator`], so tests and callers can
//! pin them to known values.

use std::sync::Mutex;

use common::{Driver, DriverScore, RaceContext, Weather};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Neutral value used whenever an input class is missing.
pub const NEUTRAL: f64 = 0.5;

pub trait Estimator: Send + Sync {
    /// Car/team strength for the driver, 0–1.
    fn team_performance(&self, driver: &Driver, ctx: &RaceContext) -> f64;

    /// Pit-wall and tire-strategy execution, 0–1.
    fn strategy_efficiency(&self, driver: &Driver, ctx: &RaceContext) -> f64;

    /// How far the weather forecast can be trusted, 0–1.
    fn weather_reliability(&self, weather: &Weather) -> f64;

    /// How well historical data is expected to predict this race, 0–1.
    fn historical_accuracy(&self, ctx: &RaceContext) -> f64;

    /// Race-wide risk of mechanical retirements, 0–1.
    fn technical_risk(&self, ctx: &RaceContext) -> f64;

    /// Race-wide risk of strategy upsets (safety cars, tire gambles), 0–1.
    fn strategic_risk(&self, ctx: &RaceContext) -> f64;

    /// Probability that `driver` wins, given the whole scored field.
    fn win_probability(&self, driver: &DriverScore, field: &[DriverScore]) -> f64;
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Deterministic estimator derived from the supplied race data.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEstimator;

impl Estimator for HeuristicEstimator {
    fn team_performance(&self, driver: &Driver, ctx: &RaceContext) -> f64 {
        mean(ctx.teammates(&driver.team).filter_map(|d| d.recent_form))
            .unwrap_or(NEUTRAL)
            .clamp(0.0, 1.0)
    }

    fn strategy_efficiency(&self, driver: &Driver, ctx: &RaceContext) -> f64 {
        // Tire management across all practice running is the best proxy we get.
        let samples = ctx
            .practice
            .available()
            .filter_map(|(_, s)| s.tire_performance.get(&driver.name))
            .flatten()
            .copied();
        mean(samples).unwrap_or(NEUTRAL).clamp(0.0, 1.0)
    }

    fn weather_reliability(&self, weather: &Weather) -> f64 {
        // Forecasts near 0% or 100% rain rarely flip; 50% is a coin toss.
        let p = (weather.rain_chance / 100.0).clamp(0.0, 1.0);
        NEUTRAL + (p - 0.5).abs()
    }

    fn historical_accuracy(&self, ctx: &RaceContext) -> f64 {
        let coverage = ctx
            .drivers
            .iter()
            .map(|d| d.history.known_fields() as f64 / common::DriverHistory::FIELDS as f64);
        match mean(coverage) {
            Some(c) if c > 0.0 => c,
            _ => NEUTRAL,
        }
    }

    fn technical_risk(&self, ctx: &RaceContext) -> f64 {
        let dnf_rates = ctx
            .drivers
            .iter()
            .filter_map(|d| d.reliability.technical_dnfs)
            .map(|dnfs| (dnfs as f64 / 3.0).min(1.0));
        mean(dnf_rates).unwrap_or(NEUTRAL)
    }

    fn strategic_risk(&self, ctx: &RaceContext) -> f64 {
        let rain = ctx
            .weather
            .map(|w| (w.rain_chance / 100.0).clamp(0.0, 1.0))
            .unwrap_or(NEUTRAL);
        let missing_practice = 1.0 - ctx.practice.available().count() as f64 / 3.0;
        (0.5 * rain + 0.5 * missing_practice).clamp(0.0, 1.0)
    }

    fn win_probability(&self, driver: &DriverScore, field: &[DriverScore]) -> f64 {
        let total: f64 = field.iter().map(|d| d.score).sum();
        if total > 0.0 {
            (driver.score / total).clamp(0.0, 1.0)
        } else if field.is_empty() {
            0.0
        } else {
            1.0 / field.len() as f64
        }
    }
}

/// Uniform random estimates in [0,1).
///
/// Reproduces the placeholder behaviour of the first prototype; useful for
/// sensitivity runs. Seed it for repeatable output.
#[derive(Debug)]
pub struct RandomEstimator {
    rng: Mutex<StdRng>,
}

impl RandomEstimator {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn sample(&self) -> f64 {
        match self.rng.lock() {
            Ok(mut rng) => rng.gen::<f64>(),
            Err(poisoned) => poisoned.into_inner().gen::<f64>(),
        }
    }
}

impl Default for RandomEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl Estimator for RandomEstimator {
    fn team_performance(&self, _driver: &Driver, _ctx: &RaceContext) -> f64 {
        self.sample()
    }

    fn strategy_efficiency(&self, _driver: &Driver, _ctx: &RaceContext) -> f64 {
        self.sample()
    }

    fn weather_reliability(&self, _weather: &Weather) -> f64 {
        self.sample()
    }

    fn historical_accuracy(&self, _ctx: &RaceContext) -> f64 {
        self.sample()
    }

    fn technical_risk(&self, _ctx: &RaceContext) -> f64 {
        self.sample()
    }

    fn strategic_risk(&self, _ctx: &RaceContext) -> f64 {
        self.sample()
    }

    fn win_probability(&self, _driver: &DriverScore, _field: &[DriverScore]) -> f64 {
        self.sample()
    }
}
