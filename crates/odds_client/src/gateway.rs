//! Rate-limited, cached gateway in front of an odds source.
//!
//! Every per-driver lookup is answered from one race-wide fetch, which is
//! reused until the response cache lifetime elapses.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{Error, MarketOdds, OddsQuote};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::rate_limit::RateLimiter;

const DEFAULT_RESPONSE_TTL: Duration = Duration::from_secs(5 * 60);

/// Upstream that can produce race-wide outright odds.
#[async_trait]
pub trait OddsSource: Send + Sync {
    /// Fetch the current odds for every quoted driver.
    ///
    /// # Errors
    ///
    /// `Error::RateLimited` when the provider rejects the request for quota
    /// reasons; any other error means the provider is unavailable.
    async fn fetch_odds(&self) -> Result<MarketOdds, Error>;
}

#[derive(Debug, Clone)]
struct CachedOdds {
    odds: MarketOdds,
    stored_at: Instant,
}

/// Serializes odds lookups through a rate limiter and a response cache.
pub struct OddsGateway {
    source: Arc<dyn OddsSource>,
    limiter: RateLimiter,
    cached: Mutex<Option<CachedOdds>>,
    response_ttl: Duration,
}

impl OddsGateway {
    pub fn new(source: Arc<dyn OddsSource>, limiter: RateLimiter) -> Self {
        Self::with_response_ttl(source, limiter, DEFAULT_RESPONSE_TTL)
    }

    pub fn with_response_ttl(
        source: Arc<dyn OddsSource>,
        limiter: RateLimiter,
        response_ttl: Duration,
    ) -> Self {
        Self {
            source,
            limiter,
            cached: Mutex::new(None),
            response_ttl,
        }
    }

    /// Race-wide odds, from cache when fresh, otherwise from upstream.
    ///
    /// Concurrent callers queue on the cache lock, so a burst of lookups
    /// results in at most one upstream request.
    pub async fn fetch_odds(&self) -> Result<MarketOdds, Error> {
        let mut cached = self.cached.lock().await;

        if let Some(entry) = cached.as_ref() {
            if entry.stored_at.elapsed() < self.response_ttl {
                debug!("Odds cache hit ({}s old)", entry.stored_at.elapsed().as_secs());
                return Ok(entry.odds.clone());
            }
            debug!("Odds cache expired");
            *cached = None;
        }

        self.limiter.acquire().await;
        let odds = self.source.fetch_odds().await?;

        info!(
            "Fetched odds for {} drivers",
            odds.drivers.values().filter(|q| !q.is_empty()).count()
        );

        *cached = Some(CachedOdds {
            odds: odds.clone(),
            stored_at: Instant::now(),
        });
        Ok(odds)
    }

    /// Quotes for a single driver, derived from the race-wide fetch.
    pub async fn fetch_driver_odds(&self, driver: &str) -> Result<Vec<OddsQuote>, Error> {
        let odds = self.fetch_odds().await?;
        Ok(odds.quotes_for(driver).to_vec())
    }

    /// Drop the cached response so the next lookup goes upstream.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }
}
