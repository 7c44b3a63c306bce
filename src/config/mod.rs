// Configuration module for landmark-streamer
//
// Provides:
// - YAML configuration file loading
// - Environment variable substitution
// - Configuration validation
// - Default values

pub mod types;
mod loader;

pub use types::*;
pub use loader::ConfigLoader;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<StreamerConfig> {
    ConfigLoader::load(path).context("Failed to load configuration")
}

/// Load configuration with environment variable overrides
pub fn load_config_with_env<P: AsRef<Path>>(path: P) -> Result<StreamerConfig> {
    let mut config = load_config(path)?;
    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Apply `STREAMER_*` environment overrides on top of a loaded config
pub fn apply_env_overrides(config: &mut StreamerConfig) -> Result<()> {
    // Allow environment variables to override config values
    if let Ok(endpoints) = std::env::var("STREAMER_ENDPOINTS") {
        config.endpoints.addresses = endpoints
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }

    if let Ok(secure) = std::env::var("STREAMER_SECURE_ORIGIN") {
        config.endpoints.secure_origin = secure
            .parse::<bool>()
            .with_context(|| format!("Invalid STREAMER_SECURE_ORIGIN: '{}'", secure))?;
    }

    ConfigLoader::validate(config)
}
