//! Odds provider client library.
//!
//! Provides rate-limited, cached access to outright race odds from
//! The Odds API.

pub mod gateway;
pub mod rate_limit;
pub mod rest;

pub use gateway::{OddsGateway, OddsSource};
pub use rate_limit::RateLimiter;
pub use rest::{parse_outright_odds, OddsApiClient};
