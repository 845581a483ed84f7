//! oidstore-config - configuration loading

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use thiserror::Error;

use secrecy::Secret;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] figment::Error),
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    match std::env::var("APP_ENV").as_deref() {
        Ok("production") => 50,
        _ => 10,
    }
}

/// Cleanup sweep configuration
///
/// Controls the batched prune loop and the periodic background task that
/// drives it.
#[derive(Debug, Clone, Deserialize)]
pub struct CleanupConfig {
    /// Rows fetched per prune iteration.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum iterations per prune call.
    #[serde(default = "default_loop_count")]
    pub loop_count: usize,
    /// Whether the periodic token cleanup task is registered.
    #[serde(default = "default_enabled")]
    pub is_token_cleanup_enabled: bool,
    /// Recognized for the engine's sibling authorization store; this crate
    /// only registers the token task.
    #[serde(default = "default_enabled")]
    pub is_authorization_cleanup_enabled: bool,
    /// Seconds between background sweeps.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Tokens younger than this are never handed to the sweep.
    #[serde(default = "default_minimum_token_lifespan_secs")]
    pub minimum_token_lifespan_secs: u64,
}

fn default_batch_size() -> usize {
    1_000
}

fn default_loop_count() -> usize {
    10
}

fn default_enabled() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    3_600
}

fn default_minimum_token_lifespan_secs() -> u64 {
    // 14 days
    14 * 24 * 3_600
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            loop_count: default_loop_count(),
            is_token_cleanup_enabled: default_enabled(),
            is_authorization_cleanup_enabled: default_enabled(),
            interval_secs: default_interval_secs(),
            minimum_token_lifespan_secs: default_minimum_token_lifespan_secs(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Store configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StoreConfig {
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl StoreConfig {
    /// Load configuration from TOML files and environment variables.
    ///
    /// `{config_dir}/default.toml` is merged with the `APP_ENV`-specific
    /// file, then with `OIDSTORE_`-prefixed environment variables; later
    /// sources win.
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config: Self = Figment::new()
            .merge(Toml::file(format!("{}/default.toml", config_dir)))
            .merge(Toml::file(format!("{}/{}.toml", config_dir, env)))
            .merge(Env::prefixed("OIDSTORE_").split("__"))
            .extract()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests;
