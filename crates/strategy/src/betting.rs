//! Betting value analysis.
//!
//! Compares each driver's estimated win probability against the best
//! available bookmaker price and flags bets whose expected value clears
//! [`VALUE_THRESHOLD`].

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{
    BetRecommendation, BetType, BettingInsights, BookmakerMargin, DriverScore, Error,
    MarketAnalysis, MarketOdds, OddsQuote, RaceContext, RiskAnalysis, ValueOpportunity,
};
use odds_client::OddsGateway;
use tracing::{debug, info};

use crate::cache::{cache_key, CacheCategory, CachedResult, ResultCache};
use crate::estimator::{Estimator, NEUTRAL};

/// Minimum expected value (probability × decimal price) worth recommending.
pub const VALUE_THRESHOLD: f64 = 1.1;

/// Above this win probability a straight win bet is recommended.
const WIN_BET_PROBABILITY: f64 = 0.5;

const BETTING_TAG: &str = "betting";

pub struct BettingAnalyzer {
    gateway: Arc<OddsGateway>,
    estimator: Arc<dyn Estimator>,
    cache: ResultCache,
}

impl BettingAnalyzer {
    pub fn new(gateway: Arc<OddsGateway>, estimator: Arc<dyn Estimator>, cache: ResultCache) -> Self {
        Self {
            gateway,
            estimator,
            cache,
        }
    }

    /// Full betting picture for a race, served from cache within the
    /// predictions TTL.
    ///
    /// # Errors
    ///
    /// Propagates odds gateway failures (`RateLimited`, `UpstreamUnavailable`,
    /// `OddsApi`, `Http`). Callers that want a result regardless should fall
    /// back to [`BettingAnalyzer::degraded_insights`].
    pub async fn analyze_betting_factors(
        &self,
        ctx: &RaceContext,
        scores: &[DriverScore],
    ) -> Result<BettingInsights, Error> {
        let key = cache_key(BETTING_TAG, &ctx.race_name);
        if let Some(CachedResult::Betting(cached)) = self.cache.get(&key) {
            debug!("{}: betting insights served from cache", ctx.race_name);
            return Ok(*cached);
        }

        let odds = self.gateway.fetch_odds().await?;
        let insights = self.build_insights(ctx, scores, &odds);

        info!(
            "{}: {} recommended bets, {} drivers quoted",
            ctx.race_name,
            insights.recommended_bets.len(),
            insights.market_analysis.drivers_quoted
        );

        self.cache.set(
            key,
            CachedResult::Betting(Box::new(insights.clone())),
            CacheCategory::Predictions,
        );
        Ok(insights)
    }

    /// Insights without market odds: no recommendations, neutral risks
    /// where the estimate needs data we do not have, zero-value
    /// opportunities. Never cached.
    pub fn degraded_insights(&self, ctx: &RaceContext, scores: &[DriverScore]) -> BettingInsights {
        let weather = self.analyze_risks(ctx).weather;
        BettingInsights {
            race_name: ctx.race_name.clone(),
            recommended_bets: Vec::new(),
            risk_analysis: RiskAnalysis {
                weather,
                technical: NEUTRAL,
                strategic: NEUTRAL,
            },
            value_opportunities: self.find_value_bets(scores, &MarketOdds::empty()),
            market_analysis: MarketAnalysis::default(),
            odds_available: false,
        }
    }

    /// Insights against an already-fetched market.
    pub fn build_insights(
        &self,
        ctx: &RaceContext,
        scores: &[DriverScore],
        odds: &MarketOdds,
    ) -> BettingInsights {
        BettingInsights {
            race_name: ctx.race_name.clone(),
            recommended_bets: self.recommend_bets(scores, odds),
            risk_analysis: self.analyze_risks(ctx),
            value_opportunities: self.find_value_bets(scores, odds),
            market_analysis: analyze_market(odds),
            odds_available: !odds.is_empty(),
        }
    }

    /// Bets whose expected value exceeds [`VALUE_THRESHOLD`], best first.
    ///
    /// Drivers without quotes are skipped.
    pub fn recommend_bets(&self, scores: &[DriverScore], odds: &MarketOdds) -> Vec<BetRecommendation> {
        let mut bets: Vec<BetRecommendation> = scores
            .iter()
            .filter_map(|score| {
                let best = odds.best_quote(&score.name)?;
                let probability = self.win_probability(score, scores);
                let expected_value = probability * best.price;

                debug!(
                    "{}: p={:.3} best={:.2} ({}) ev={:.3}",
                    score.name, probability, best.price, best.bookmaker, expected_value
                );

                if expected_value <= VALUE_THRESHOLD {
                    return None;
                }

                let bet_type = if probability > WIN_BET_PROBABILITY {
                    BetType::Win
                } else {
                    BetType::Place
                };

                Some(BetRecommendation {
                    driver: score.name.clone(),
                    bet_type,
                    confidence: score.confidence,
                    probability,
                    expected_value,
                    best_odds: best.clone(),
                })
            })
            .collect();

        bets.sort_by(|a, b| {
            b.expected_value
                .total_cmp(&a.expected_value)
                .then_with(|| a.driver.cmp(&b.driver))
        });
        bets
    }

    /// Every driver with its value ratio, sorted descending.
    ///
    /// The ratio is predicted probability over the market-implied
    /// probability of the best price, and zero without quotes.
    pub fn find_value_bets(&self, scores: &[DriverScore], odds: &MarketOdds) -> Vec<ValueOpportunity> {
        let mut opportunities: Vec<ValueOpportunity> = scores
            .iter()
            .map(|score| {
                let probability = self.win_probability(score, scores);
                let market_odds = odds.best_quote(&score.name).cloned();
                let value_ratio = market_odds
                    .as_ref()
                    .map(|q| probability * q.price)
                    .unwrap_or(0.0);

                ValueOpportunity {
                    driver: score.name.clone(),
                    predicted_probability: probability,
                    market_odds,
                    value_ratio,
                    confidence: score.confidence,
                }
            })
            .collect();

        opportunities.sort_by(|a, b| {
            b.value_ratio
                .total_cmp(&a.value_ratio)
                .then_with(|| a.driver.cmp(&b.driver))
        });
        opportunities
    }

    pub fn analyze_risks(&self, ctx: &RaceContext) -> RiskAnalysis {
        let weather = ctx
            .weather
            .map(|w| (w.rain_chance / 100.0).clamp(0.0, 1.0))
            .unwrap_or(NEUTRAL);

        RiskAnalysis {
            weather,
            technical: bounded(self.estimator.technical_risk(ctx)),
            strategic: bounded(self.estimator.strategic_risk(ctx)),
        }
    }

    pub fn gateway(&self) -> &OddsGateway {
        &self.gateway
    }

    fn win_probability(&self, score: &DriverScore, field: &[DriverScore]) -> f64 {
        bounded(self.estimator.win_probability(score, field))
    }
}

fn bounded(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        NEUTRAL
    }
}

fn usable_price(q: &OddsQuote) -> bool {
    q.price.is_finite() && q.price > 0.0
}

/// Per-bookmaker overround (Σ 1/price over quoted drivers) and its mean.
///
/// A fair book sums to 1.0; anything above is the bookmaker's margin.
pub fn analyze_market(odds: &MarketOdds) -> MarketAnalysis {
    let mut books: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for quotes in odds.drivers.values() {
        // One price per bookmaker per driver: the best one they offer.
        let mut seen: BTreeMap<&str, f64> = BTreeMap::new();
        for q in quotes.iter().filter(|q| usable_price(q)) {
            let slot = seen.entry(q.bookmaker.as_str()).or_insert(q.price);
            if q.price > *slot {
                *slot = q.price;
            }
        }
        for (bookmaker, price) in seen {
            let entry = books.entry(bookmaker).or_insert((0.0, 0));
            entry.0 += 1.0 / price;
            entry.1 += 1;
        }
    }

    let bookmakers: Vec<BookmakerMargin> = books
        .into_iter()
        .map(|(bookmaker, (overround, drivers_quoted))| BookmakerMargin {
            bookmaker: bookmaker.to_string(),
            overround,
            drivers_quoted,
        })
        .collect();

    let average_overround = (!bookmakers.is_empty())
        .then(|| bookmakers.iter().map(|b| b.overround).sum::<f64>() / bookmakers.len() as f64);

    MarketAnalysis {
        bookmaker_count: bookmakers.len(),
        drivers_quoted: odds
            .drivers
            .values()
            .filter(|q| q.iter().any(usable_price))
            .count(),
        average_overround,
        bookmakers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use common::{Driver, OddsQuote, PracticeSessions, ScoreBreakdown, Weather};
    use odds_client::{OddsSource, RateLimiter};

    use crate::cache::{new_result_cache, CacheTtls};

    const EPS: f64 = 1e-9;

    /// Fixed probabilities per driver; fixed risks.
    struct StubEstimator {
        probabilities: HashMap<String, f64>,
    }

    impl StubEstimator {
        fn new(pairs: &[(&str, f64)]) -> Self {
            Self {
                probabilities: pairs.iter().map(|(n, p)| (n.to_string(), *p)).collect(),
            }
        }
    }

    impl Estimator for StubEstimator {
        fn team_performance(&self, _: &Driver, _: &RaceContext) -> f64 {
            NEUTRAL
        }
        fn strategy_efficiency(&self, _: &Driver, _: &RaceContext) -> f64 {
            NEUTRAL
        }
        fn weather_reliability(&self, _: &Weather) -> f64 {
            NEUTRAL
        }
        fn historical_accuracy(&self, _: &RaceContext) -> f64 {
            NEUTRAL
        }
        fn technical_risk(&self, _: &RaceContext) -> f64 {
            0.2
        }
        fn strategic_risk(&self, _: &RaceContext) -> f64 {
            // Out of range on purpose; the analyzer clamps.
            1.7
        }
        fn win_probability(&self, driver: &DriverScore, _: &[DriverScore]) -> f64 {
            self.probabilities.get(&driver.name).copied().unwrap_or(0.0)
        }
    }

    struct StubSource {
        odds: Option<MarketOdds>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OddsSource for StubSource {
        async fn fetch_odds(&self) -> Result<MarketOdds, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.odds
                .clone()
                .ok_or_else(|| Error::UpstreamUnavailable("connection refused".into()))
        }
    }

    fn score(name: &str, confidence: f64) -> DriverScore {
        DriverScore {
            name: name.into(),
            team: "T".into(),
            score: 0.5,
            confidence,
            data_quality: 1.0,
            metrics: ScoreBreakdown {
                historical: 0.5,
                practice: 0.5,
                weather: 0.5,
                track_specific: 0.5,
                recent_form: 0.5,
                qualifying: 0.5,
                reliability: 0.5,
                team_performance: 0.5,
                strategy_efficiency: 0.5,
            },
        }
    }

    fn quote(bookmaker: &str, price: f64) -> OddsQuote {
        OddsQuote {
            bookmaker: bookmaker.into(),
            price,
        }
    }

    fn market(entries: &[(&str, Vec<OddsQuote>)]) -> MarketOdds {
        MarketOdds::new(
            entries
                .iter()
                .map(|(n, q)| (n.to_string(), q.clone()))
                .collect(),
        )
    }

    fn ctx() -> RaceContext {
        RaceContext {
            race_name: "Bahrain Grand Prix".into(),
            drivers: vec![Driver::new("A", "X"), Driver::new("B", "Y")],
            weather: Some(Weather {
                rain_chance: 20.0,
                temperature: 30.0,
            }),
            practice: PracticeSessions::default(),
        }
    }

    fn analyzer(estimator: StubEstimator, odds: Option<MarketOdds>) -> (BettingAnalyzer, Arc<StubSource>) {
        let source = Arc::new(StubSource {
            odds,
            calls: AtomicUsize::new(0),
        });
        let gateway = Arc::new(OddsGateway::new(source.clone(), RateLimiter::per_minute(10)));
        let cache = new_result_cache(CacheTtls::default());
        (BettingAnalyzer::new(gateway, Arc::new(estimator), cache), source)
    }

    #[test]
    fn test_ev_threshold_filters_bets() {
        let (analyzer, _) = analyzer(StubEstimator::new(&[("A", 0.6), ("B", 0.4)]), None);
        let scores = vec![score("A", 0.9), score("B", 0.7)];
        let odds = market(&[("A", vec![quote("x", 2.0)]), ("B", vec![quote("x", 2.0)])]);

        let bets = analyzer.recommend_bets(&scores, &odds);
        assert_eq!(bets.len(), 1);
        assert_eq!(bets[0].driver, "A");
        assert!((bets[0].expected_value - 1.2).abs() < EPS);
        assert_eq!(bets[0].bet_type, BetType::Win);
        assert_eq!(bets[0].confidence, 0.9);
    }

    #[test]
    fn test_place_bet_below_even_probability() {
        let (analyzer, _) = analyzer(StubEstimator::new(&[("B", 0.4)]), None);
        let scores = vec![score("B", 0.7)];
        let odds = market(&[("B", vec![quote("x", 3.0)])]);

        let bets = analyzer.recommend_bets(&scores, &odds);
        assert_eq!(bets.len(), 1);
        assert_eq!(bets[0].bet_type, BetType::Place);
    }

    #[test]
    fn test_ev_exactly_at_threshold_is_excluded() {
        // 0.55 × 2.0 is exactly 1.1 in binary: doubling is lossless.
        let (analyzer, _) = analyzer(StubEstimator::new(&[("A", 0.55)]), None);
        let odds = market(&[("A", vec![quote("x", 2.0)])]);
        assert!(analyzer.recommend_bets(&[score("A", 0.5)], &odds).is_empty());
    }

    #[test]
    fn test_best_price_wins_and_first_bookmaker_breaks_ties() {
        let (analyzer, _) = analyzer(StubEstimator::new(&[("A", 0.6)]), None);
        let odds = market(&[(
            "A",
            vec![quote("Unibet", 2.5), quote("Betfair", 3.0), quote("Pinnacle", 3.0)],
        )]);
        let bets = analyzer.recommend_bets(&[score("A", 0.8)], &odds);
        assert_eq!(bets[0].best_odds.bookmaker, "Betfair");
        assert!((bets[0].expected_value - 1.8).abs() < EPS);
    }

    #[test]
    fn test_drivers_without_odds_appear_only_in_value_list() {
        let (analyzer, _) = analyzer(StubEstimator::new(&[("A", 0.6), ("B", 0.9)]), None);
        let scores = vec![score("A", 0.8), score("B", 0.8)];
        let odds = market(&[("A", vec![quote("x", 2.0)])]);

        let bets = analyzer.recommend_bets(&scores, &odds);
        assert!(bets.iter().all(|b| b.driver != "B"));

        let values = analyzer.find_value_bets(&scores, &odds);
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].driver, "A");
        let b = &values[1];
        assert_eq!(b.driver, "B");
        assert!(b.market_odds.is_none());
        assert_eq!(b.value_ratio, 0.0);
    }

    #[test]
    fn test_value_bets_are_unfiltered_and_tie_break_by_name() {
        let (analyzer, _) = analyzer(StubEstimator::new(&[("Zhou", 0.1), ("Albon", 0.1)]), None);
        let scores = vec![score("Zhou", 0.5), score("Albon", 0.5)];
        let odds = market(&[
            ("Zhou", vec![quote("x", 4.0)]),
            ("Albon", vec![quote("x", 4.0)]),
        ]);

        let values = analyzer.find_value_bets(&scores, &odds);
        assert_eq!(values.len(), 2, "below-threshold drivers are still listed");
        assert_eq!(values[0].driver, "Albon");
        assert!((values[0].value_ratio - 0.4).abs() < EPS);
    }

    #[test]
    fn test_risks_are_bounded() {
        let (analyzer, _) = analyzer(StubEstimator::new(&[]), None);
        let risks = analyzer.analyze_risks(&ctx());
        assert!((risks.weather - 0.2).abs() < EPS);
        assert!((risks.technical - 0.2).abs() < EPS);
        assert_eq!(risks.strategic, 1.0);

        let mut dry = ctx();
        dry.weather = None;
        assert_eq!(analyzer.analyze_risks(&dry).weather, 0.5);
    }

    #[test]
    fn test_market_overround() {
        let odds = market(&[
            ("A", vec![quote("Unibet", 2.0), quote("Betfair", 2.5)]),
            ("B", vec![quote("Unibet", 2.0)]),
        ]);
        let m = analyze_market(&odds);
        assert_eq!(m.bookmaker_count, 2);
        assert_eq!(m.drivers_quoted, 2);

        let unibet = m
            .bookmakers
            .iter()
            .find(|b| b.bookmaker == "Unibet")
            .expect("unibet margin");
        assert!((unibet.overround - 1.0).abs() < EPS);
        assert_eq!(unibet.drivers_quoted, 2);

        let avg = m.average_overround.expect("average");
        assert!((avg - (1.0 + 0.4) / 2.0).abs() < EPS);
        assert_eq!(analyze_market(&MarketOdds::empty()), MarketAnalysis::default());
    }

    #[test]
    fn test_market_ignores_unusable_prices() {
        let odds = market(&[
            ("A", vec![quote("Unibet", 2.0), quote("Shady", 0.0)]),
            ("B", vec![quote("Shady", -3.0)]),
        ]);
        let m = analyze_market(&odds);
        assert_eq!(m.bookmaker_count, 1);
        assert_eq!(m.drivers_quoted, 1);
        assert_eq!(m.bookmakers[0].bookmaker, "Unibet");
        let avg = m.average_overround.expect("average");
        assert!(avg.is_finite());
        assert!((avg - 0.5).abs() < EPS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_analysis_is_cached_per_race() {
        let odds = market(&[("A", vec![quote("x", 2.0)])]);
        let (analyzer, source) = analyzer(StubEstimator::new(&[("A", 0.6)]), Some(odds));
        let scores = vec![score("A", 0.8), score("B", 0.6)];

        let first = analyzer
            .analyze_betting_factors(&ctx(), &scores)
            .await
            .expect("insights");
        analyzer.gateway().invalidate().await;
        let second = analyzer
            .analyze_betting_factors(&ctx(), &scores)
            .await
            .expect("insights");

        assert_eq!(first, second);
        assert!(first.odds_available);
        assert_eq!(first.recommended_bets.len(), 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upstream_failure_propagates_and_degrades() {
        let (analyzer, _) = analyzer(StubEstimator::new(&[("A", 0.6)]), None);
        let scores = vec![score("A", 0.8)];

        let err = analyzer
            .analyze_betting_factors(&ctx(), &scores)
            .await
            .expect_err("should fail");
        assert!(matches!(err, Error::UpstreamUnavailable(_)));

        let degraded = analyzer.degraded_insights(&ctx(), &scores);
        assert!(degraded.recommended_bets.is_empty());
        assert!(!degraded.odds_available);
        assert_eq!(degraded.risk_analysis.technical, 0.5);
        assert_eq!(degraded.risk_analysis.strategic, 0.5);
        assert_eq!(degraded.value_opportunities.len(), 1);
        assert_eq!(degraded.value_opportunities[0].value_ratio, 0.0);
    }
}
