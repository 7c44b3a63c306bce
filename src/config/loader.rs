// Configuration loader with environment variable substitution

use super::types::*;
use anyhow::{bail, Context, Result};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file with environment variable substitution
    pub fn load<P: AsRef<Path>>(path: P) -> Result<StreamerConfig> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;

        Self::parse(&content)
    }

    /// Parse YAML text, substituting environment variables first
    pub fn parse(content: &str) -> Result<StreamerConfig> {
        let content = Self::substitute_env_vars(content);

        let config: StreamerConfig = serde_yaml::from_str(&content)
            .context("Failed to parse YAML configuration")?;

        Self::validate(&config)?;

        Ok(config)
    }

    /// Substitute ${VAR} and ${VAR:-default} patterns with environment variables
    ///
    /// Examples:
    /// - ${CLASSIFIER_URL} -> ws://classifier:8000/ws
    /// - ${BUFFER_MS:-1000} -> 1000 (if BUFFER_MS not set)
    fn substitute_env_vars(content: &str) -> String {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let re = PATTERN.get_or_init(|| {
            Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").expect("static pattern is valid")
        });

        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str());

            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => match default_value {
                    Some(default) => default.to_string(),
                    // Keep original if no default and var not found
                    None => format!("${{{}}}", var_name),
                },
            }
        })
        .to_string()
    }

    /// Validate configuration
    pub fn validate(config: &StreamerConfig) -> Result<()> {
        for address in &config.endpoints.addresses {
            if address.trim().is_empty() {
                bail!("endpoints.addresses must not contain empty entries");
            }
        }

        if config.endpoints.connect_timeout_ms == 0 {
            bail!("endpoints.connect_timeout_ms must be > 0");
        }

        let reconnect = &config.reconnect;
        if reconnect.base_delay_ms == 0 {
            bail!("reconnect.base_delay_ms must be > 0");
        }
        if reconnect.max_delay_ms < reconnect.base_delay_ms {
            bail!("reconnect.max_delay_ms must be >= reconnect.base_delay_ms");
        }
        if reconnect.check_interval_ms == 0 {
            bail!("reconnect.check_interval_ms must be > 0");
        }

        let capture = &config.capture;
        if capture.buffer_duration_ms == 0 {
            bail!("capture.buffer_duration_ms must be > 0");
        }

        let admission = &capture.admission;
        if !(admission.acceleration_threshold > 0.0) {
            bail!("capture.admission.acceleration_threshold must be > 0");
        }
        if admission.min_movement_threshold < 0.0 || admission.total_movement_threshold < 0.0 {
            bail!("capture.admission movement thresholds must be >= 0");
        }
        if admission.required_consecutive_detections == 0 {
            bail!("capture.admission.required_consecutive_detections must be >= 1");
        }

        match config.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => bail!("Unknown logging.level: '{}'", other),
        }

        Ok(())
    }
}
