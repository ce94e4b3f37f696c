//! Shared domain types and process configuration for the map-link resolver.

mod app_config;
mod config;
pub mod coordinates;
pub mod location;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env, DEFAULT_USER_AGENT};
pub use coordinates::{validate_candidate, Candidate, Coordinates, RegionFilter};
pub use location::ResolvedLocation;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
