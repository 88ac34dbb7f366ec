//! f1-predictor: race winner predictions and betting value analysis.
//!
//! Single-binary Tokio application that:
//! 1. Loads a race context (drivers, weather, practice) from JSON
//! 2. Scores and ranks the field
//! 3. Fetches outright odds from The Odds API (rate limited, cached)
//! 4. Reports value bets and race risks

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::time::sleep;
use tracing::{error, info, warn};

use common::{Error, PredictorConfig, RaceContext};
use odds_client::{OddsApiClient, OddsGateway, RateLimiter};
use strategy::{
    new_result_cache, BettingAnalyzer, CacheTtls, CycleReport, Estimator, HeuristicEstimator,
    PredictionCycle, PredictionEngine, RandomEstimator,
};

/// F1 race outcome predictor
#[derive(Parser)]
#[command(name = "f1-predictor", about = "F1 race outcome and betting value predictor")]
struct Cli {
    /// Race context JSON file.
    #[arg(long, required_unless_present = "check_odds")]
    race: Option<PathBuf>,

    /// Skip the odds provider; predictions only.
    #[arg(long)]
    no_odds: bool,

    /// Re-run on an interval until Ctrl-C, reloading the race file.
    #[arg(long)]
    watch: bool,

    /// Fetch odds once, print how many drivers are quoted, then exit.
    #[arg(long, conflicts_with = "no_odds")]
    check_odds: bool,

    /// Use uniform random estimates for team, strategy and risk factors.
    #[arg(long)]
    random_estimates: bool,
}

fn load_race(path: &Path) -> Result<(RaceContext, String), Error> {
    let raw = std::fs::read_to_string(path)?;
    let ctx: RaceContext = serde_json::from_str(&raw)?;
    Ok((ctx, raw))
}

fn build_gateway(cfg: &PredictorConfig) -> Result<Arc<OddsGateway>, Error> {
    let client = OddsApiClient::new(cfg.odds.clone())?;
    Ok(Arc::new(OddsGateway::with_response_ttl(
        Arc::new(client),
        RateLimiter::per_minute(cfg.odds.requests_per_minute),
        Duration::from_secs(cfg.odds.response_cache_secs),
    )))
}

fn print_report(report: &CycleReport) {
    match serde_json::to_string_pretty(report) {
        Ok(json) => println!("{}", json),
        Err(e) => error!("Failed to serialize report: {}", e),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "f1_predictor=info,odds_client=info,strategy=info".into()
            }),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    info!("F1 predictor starting up...");

    let cfg = match config::load_config(!cli.no_odds) {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Odds: sport={}, regions={}, quota={}/min, response cache={}s",
        cfg.odds.sport, cfg.odds.regions, cfg.odds.requests_per_minute, cfg.odds.response_cache_secs
    );
    info!(
        "Cache TTLs: race={}s, practice={}s, historical={}s, predictions={}s",
        cfg.cache.race_data_secs,
        cfg.cache.practice_data_secs,
        cfg.cache.historical_data_secs,
        cfg.cache.predictions_secs
    );

    let gateway = if cli.no_odds {
        info!("Odds disabled; running predictions only");
        None
    } else {
        match build_gateway(&cfg) {
            Ok(g) => Some(g),
            Err(e) => {
                error!("Odds client initialization failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    // ── Check-odds mode ──────────────────────────────────────────────
    if cli.check_odds {
        let Some(gateway) = gateway else {
            error!("--check-odds needs the odds provider");
            std::process::exit(1);
        };
        info!("Running odds check...");
        match gateway.fetch_odds().await {
            Ok(odds) => {
                let quoted = odds.drivers.values().filter(|q| !q.is_empty()).count();
                info!("Odds check OK: {} drivers quoted", quoted);
            }
            Err(e) => {
                error!("Odds check failed: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let Some(race_path) = cli.race else {
        error!("--race is required");
        std::process::exit(1);
    };

    // ── Shared state ─────────────────────────────────────────────────
    let cache = new_result_cache(CacheTtls::from(&cfg.cache));
    let estimator: Arc<dyn Estimator> = if cli.random_estimates {
        warn!("Using random estimates; results are not reproducible");
        Arc::new(RandomEstimator::new())
    } else {
        Arc::new(HeuristicEstimator)
    };

    let engine = PredictionEngine::new(estimator.clone(), cache.clone());
    let analyzer = gateway.map(|g| BettingAnalyzer::new(g, estimator, cache.clone()));
    let cycle = PredictionCycle::new(engine, analyzer, cache);

    let (mut ctx, mut last_raw) = match load_race(&race_path) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("Failed to load race {}: {}", race_path.display(), e);
            std::process::exit(1);
        }
    };
    info!("Race: {} ({} drivers)", ctx.race_name, ctx.drivers.len());

    match cycle.run(&ctx).await {
        Ok(report) => print_report(&report),
        Err(e) => {
            error!("Prediction cycle failed: {}", e);
            std::process::exit(1);
        }
    }

    if !cli.watch {
        return;
    }

    // ── Watch mode ───────────────────────────────────────────────────
    let interval = Duration::from_secs(cfg.timing.watch_interval_secs);
    info!("Watching {} every {}s (Ctrl-C to stop)", race_path.display(), interval.as_secs());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            _ = sleep(interval) => {}
        }

        match load_race(&race_path) {
            Ok((next, raw)) => {
                if raw != last_raw {
                    info!("Race file changed; invalidating cached results");
                    cycle.invalidate_race(&ctx.race_name).await;
                    if next.race_name != ctx.race_name {
                        cycle.invalidate_race(&next.race_name).await;
                    }
                    ctx = next;
                    last_raw = raw;
                }
            }
            Err(e) => warn!("Keeping previous race context; reload failed: {}", e),
        }

        match cycle.run(&ctx).await {
            Ok(report) => print_report(&report),
            Err(e) => error!("Prediction cycle failed: {}", e),
        }
    }

    info!("F1 predictor stopped");
}
