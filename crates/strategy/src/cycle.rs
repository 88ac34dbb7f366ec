//! One prediction cycle: score the field, then try the betting analysis.
//!
//! Missing race inputs abort the cycle. Odds failures only degrade the
//! betting part and are reported as warnings.

use common::{BettingInsights, Error, PredictionResult, RaceContext};
use serde::Serialize;
use tracing::{info, warn};

use crate::betting::BettingAnalyzer;
use crate::cache::ResultCache;
use crate::scoring::PredictionEngine;

/// Non-fatal problem hit during a cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleWarning {
    pub component: &'static str,
    pub message: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub predictions: PredictionResult,
    /// `None` only when no analyzer is configured.
    pub betting: Option<BettingInsights>,
    pub warnings: Vec<CycleWarning>,
}

pub struct PredictionCycle {
    engine: PredictionEngine,
    analyzer: Option<BettingAnalyzer>,
    cache: ResultCache,
}

impl PredictionCycle {
    pub fn new(engine: PredictionEngine, analyzer: Option<BettingAnalyzer>, cache: ResultCache) -> Self {
        Self {
            engine,
            analyzer,
            cache,
        }
    }

    /// # Errors
    ///
    /// Only errors that are fatal for the cycle, i.e. `Error::MissingInput`.
    pub async fn run(&self, ctx: &RaceContext) -> Result<CycleReport, Error> {
        let predictions = self.engine.generate_predictions(ctx)?;
        let mut warnings = Vec::new();

        let betting = match &self.analyzer {
            None => None,
            Some(analyzer) => {
                let scores = &predictions.finishing_order;
                match analyzer.analyze_betting_factors(ctx, scores).await {
                    Ok(insights) => Some(insights),
                    Err(e) if e.is_fatal_for_cycle() => return Err(e),
                    Err(e) => {
                        warn!("{}: betting analysis degraded: {}", ctx.race_name, e);
                        warnings.push(CycleWarning {
                            component: "betting",
                            message: e.to_string(),
                            retryable: e.is_retryable(),
                        });
                        Some(analyzer.degraded_insights(ctx, scores))
                    }
                }
            }
        };

        info!(
            "{}: cycle complete (winner={}, warnings={})",
            ctx.race_name,
            predictions.winner.name,
            warnings.len()
        );

        Ok(CycleReport {
            predictions,
            betting,
            warnings,
        })
    }

    /// Drop every cached entry for a race, so the next cycle recomputes.
    pub async fn invalidate_race(&self, race_name: &str) -> usize {
        let removed = self.cache.invalidate(race_name);
        if let Some(analyzer) = &self.analyzer {
            analyzer.gateway().invalidate().await;
        }
        info!("{}: invalidated {} cached entries", race_name, removed);
        removed
    }
}
