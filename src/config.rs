//! Configuration loader for the fleet telemetry engine.
//!
//! Centralizes all runtime configuration values and their defaults, loading
//! from environment variables (with optional `.env` file support provided
//! by the caller). Consolidating configuration here keeps `env::var` calls
//! from scattering through the codebase.

use std::env;

use anyhow::{anyhow, Result};

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent
/// configuration snapshot for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// Telemetry API base URL.
    pub api_url: String,

    /// Per-request HTTP timeout in seconds.
    pub api_timeout_secs: u32,

    /// Default route-history lookback window in hours.
    pub history_hours: u32,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `FLEET_API_URL` – telemetry API base URL
///
/// Optional:
/// - `FLEET_API_TIMEOUT_SECS` – per-request timeout (default: 10)
/// - `FLEET_HISTORY_HOURS` – route lookback hours (default: 24)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let api_url = require_env!("FLEET_API_URL");
    let api_timeout_secs = parse_env_u32!("FLEET_API_TIMEOUT_SECS", 10);
    let history_hours = parse_env_u32!("FLEET_HISTORY_HOURS", 24);

    Ok(Config {
        api_url,
        api_timeout_secs,
        history_hours,
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  FLEET_API_URL          : {}", self.api_url);
        tracing::info!("  FLEET_API_TIMEOUT_SECS : {}", self.api_timeout_secs);
        tracing::info!("  FLEET_HISTORY_HOURS    : {}", self.history_hours);
    }
}
