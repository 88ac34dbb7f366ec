//! Shared types, config, and error definitions for the race predictor.

pub mod config;
pub mod error;
pub mod types;

pub use config::PredictorConfig;
pub use error::Error;
pub use types::*;
