//! REST client for The Odds API (v4).
//!
//! Only the outright winner market is consumed: events → bookmakers →
//! markets (`winner` / `outrights`) → outcomes.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use common::config::OddsConfig;
use common::{Error, MarketOdds, OddsQuote};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::gateway::OddsSource;

const OUTRIGHT_MARKETS: [&str; 2] = ["winner", "outrights"];

// ── Response types ────────────────────────────────────────────────────

/// One event from `GET /v4/sports/{sport}/odds`.
#[derive(Debug, Deserialize)]
pub struct OddsEvent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub sport_key: String,
    #[serde(default)]
    pub bookmakers: Vec<Bookmaker>,
}

#[derive(Debug, Deserialize)]
pub struct Bookmaker {
    #[serde(default)]
    pub key: String,
    pub title: String,
    #[serde(default)]
    pub markets: Vec<BookmakerMarket>,
}

#[derive(Debug, Deserialize)]
pub struct BookmakerMarket {
    pub key: String,
    #[serde(default)]
    pub outcomes: Vec<Outcome>,
}

#[derive(Debug, Deserialize)]
pub struct Outcome {
    pub name: String,
    pub price: f64,
}

/// Flatten outright markets into per-driver quotes.
///
/// Bookmaker order is preserved, so the first bookmaker offering a given
/// price wins best-odds ties downstream.
pub fn parse_outright_odds(events: &[OddsEvent]) -> MarketOdds {
    let mut drivers: BTreeMap<String, Vec<OddsQuote>> = BTreeMap::new();

    for bookmaker in events.iter().flat_map(|e| &e.bookmakers) {
        let outcomes = bookmaker
            .markets
            .iter()
            .filter(|m| OUTRIGHT_MARKETS.contains(&m.key.as_str()))
            .flat_map(|m| &m.outcomes);

        for outcome in outcomes {
            if !(outcome.price.is_finite() && outcome.price > 1.0) {
                debug!(
                    "Skipping invalid price {} for {} at {}",
                    outcome.price, outcome.name, bookmaker.title
                );
                continue;
            }
            drivers
                .entry(outcome.name.clone())
                .or_default()
                .push(OddsQuote {
                    bookmaker: bookmaker.title.clone(),
                    price: outcome.price,
                });
        }
    }

    MarketOdds::new(drivers)
}

// ── Client ────────────────────────────────────────────────────────────

/// Async REST client for the odds endpoint.
#[derive(Debug, Clone)]
pub struct OddsApiClient {
    client: reqwest::Client,
    config: OddsConfig,
}

impl OddsApiClient {
    pub fn new(config: OddsConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(2)
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Http(format!("failed to build odds HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// URL helper.
    fn odds_url(&self) -> String {
        format!(
            "{}/{}/odds/",
            self.config.base_url.trim_end_matches('/'),
            self.config.sport
        )
    }

    /// Fetch raw events for the configured sport.
    pub async fn get_events(&self) -> Result<Vec<OddsEvent>, Error> {
        let url = self.odds_url();
        debug!("Fetching odds: {}", url);

        let resp = self
            .client
            .get(&url)
            .query(&[
                ("apiKey", self.config.api_key.as_str()),
                ("regions", self.config.regions.as_str()),
                ("markets", self.config.markets.as_str()),
                ("oddsFormat", "decimal"),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    Error::UpstreamUnavailable(format!("odds provider unreachable: {}", e))
                } else {
                    Error::Http(e.to_string())
                }
            })?;

        if let Some(remaining) = resp
            .headers()
            .get("x-requests-remaining")
            .and_then(|v| v.to_str().ok())
        {
            debug!("Odds API requests remaining: {}", remaining);
        }

        let status_code = resp.status().as_u16();
        if status_code == 429 {
            let retry_after_ms = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(60_000);
            warn!("Odds provider rate limited the request");
            return Err(Error::RateLimited { retry_after_ms });
        }
        if status_code != 200 {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::OddsApi {
                status: status_code,
                message: body.chars().take(500).collect(),
            });
        }

        resp.json()
            .await
            .map_err(|e| Error::Http(format!("odds JSON decode failed: {}", e)))
    }
}

#[async_trait]
impl OddsSource for OddsApiClient {
    async fn fetch_odds(&self) -> Result<MarketOdds, Error> {
        let events = self.get_events().await?;
        Ok(parse_outright_odds(&events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_response() -> &'static str {
        r#"[
            {
                "id": "f1-2025-aus",
                "sport_key": "motorsport_f1",
                "bookmakers": [
                    {
                        "key": "unibet_eu",
                        "title": "Unibet",
                        "markets": [
                            {"key": "winner", "outcomes": [
                                {"name": "Max Verstappen", "price": 2.75},
                                {"name": "Lando Norris", "price": 3.4}
                            ]},
                            {"key": "h2h", "outcomes": [
                                {"name": "Max Verstappen", "price": 1.5}
                            ]}
                        ]
                    },
                    {
                        "key": "betfair_ex_eu",
                        "title": "Betfair",
                        "markets": [
                            {"key": "outrights", "outcomes": [
                                {"name": "Max Verstappen", "price": 2.9},
                                {"name": "Oscar Piastri", "price": 0.0}
                            ]}
                        ]
                    }
                ]
            }
        ]"#
    }

    #[test]
    fn test_parse_outright_odds_flattens_bookmakers() {
        let events: Vec<OddsEvent> =
            serde_json::from_str(sample_response()).expect("response should deserialize");
        let odds = parse_outright_odds(&events);

        let max = odds.quotes_for("Max Verstappen");
        assert_eq!(max.len(), 2, "h2h market must be ignored");
        assert_eq!(max[0].bookmaker, "Unibet");
        assert_eq!(odds.best_quote("Max Verstappen").map(|q| q.price), Some(2.9));
        assert_eq!(odds.quotes_for("Lando Norris").len(), 1);
    }

    #[test]
    fn test_parse_skips_invalid_prices() {
        let events: Vec<OddsEvent> =
            serde_json::from_str(sample_response()).expect("response should deserialize");
        let odds = parse_outright_odds(&events);
        assert!(odds.quotes_for("Oscar Piastri").is_empty());
    }

    #[test]
    fn test_odds_url_joins_sport() {
        let client = OddsApiClient::new(OddsConfig {
            base_url: "https://api.the-odds-api.com/v4/sports/".into(),
            ..OddsConfig::default()
        })
        .expect("client should build");
        assert_eq!(
            client.odds_url(),
            "https://api.the-odds-api.com/v4/sports/motorsport_f1/odds/"
        );
    }
}
