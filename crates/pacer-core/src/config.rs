//! Configuration management for pacer
//!
//! Handles loading and validation of `pacer.toml` files. Every field has a
//! default, so an empty file is a valid configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::impls::DEFAULT_SEED_LEADS;

/// Default target of concurrent dials per agent.
pub const DEFAULT_DIAL_RATIO: usize = 2;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub pacing: PacingConfig,

    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pacing.validate()
    }
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// What a dial cycle does when the lead pool runs dry mid-replenishment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadShortagePolicy {
    /// Keep what was created, dispatch it, and succeed.
    #[default]
    Tolerate,
    /// Abort the cycle with `PacingError::NoLeadsAvailable` before dispatching.
    Fail,
}

/// Per-engine pacing settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PacingConfig {
    /// Target number of leads concurrently being dialed per agent.
    #[serde(default = "default_dial_ratio")]
    pub dial_ratio: usize,

    #[serde(default)]
    pub on_lead_shortage: LeadShortagePolicy,
}

impl PacingConfig {
    pub fn new(dial_ratio: usize) -> Result<Self, ConfigError> {
        let config = Self {
            dial_ratio,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_lead_shortage(mut self, policy: LeadShortagePolicy) -> Self {
        self.on_lead_shortage = policy;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dial_ratio == 0 {
            return Err(ConfigError::Invalid(
                "pacing.dial_ratio must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            dial_ratio: default_dial_ratio(),
            on_lead_shortage: LeadShortagePolicy::default(),
        }
    }
}

fn default_dial_ratio() -> usize {
    DEFAULT_DIAL_RATIO
}

/// Settings for the in-memory store and simulated transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationConfig {
    #[serde(default = "default_seed_leads")]
    pub seed_leads: Vec<String>,

    /// Numbers whose dial always fails.
    #[serde(default)]
    pub failing_leads: Vec<String>,

    /// Upper bound of simulated store latency (0 = none).
    #[serde(default)]
    pub store_latency_ms: u64,

    /// Upper bound of simulated dial latency (0 = none).
    #[serde(default = "default_dial_latency_ms")]
    pub dial_latency_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed_leads: default_seed_leads(),
            failing_leads: Vec::new(),
            store_latency_ms: 0,
            dial_latency_ms: default_dial_latency_ms(),
        }
    }
}

fn default_seed_leads() -> Vec<String> {
    DEFAULT_SEED_LEADS.iter().map(|s| s.to_string()).collect()
}

fn default_dial_latency_ms() -> u64 {
    500
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.pacing.dial_ratio, 2);
        assert_eq!(config.pacing.on_lead_shortage, LeadShortagePolicy::Tolerate);
        assert_eq!(config.simulation.seed_leads.len(), 4);
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::from_toml_str(
            r#"
            [general]
            log_level = "debug"

            [pacing]
            dial_ratio = 3
            on_lead_shortage = "fail"

            [simulation]
            seed_leads = ["1", "2"]
            failing_leads = ["2"]
            dial_latency_ms = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.pacing.dial_ratio, 3);
        assert_eq!(config.pacing.on_lead_shortage, LeadShortagePolicy::Fail);
        assert_eq!(config.simulation.seed_leads, vec!["1", "2"]);
        assert_eq!(config.simulation.failing_leads, vec!["2"]);
        assert_eq!(config.simulation.dial_latency_ms, 0);
    }

    #[test]
    fn zero_ratio_is_rejected() {
        let err = Config::from_toml_str("[pacing]\ndial_ratio = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        assert!(PacingConfig::new(0).is_err());
    }

    #[test]
    fn unknown_policy_is_a_parse_error() {
        let err = Config::from_toml_str("[pacing]\non_lead_shortage = \"retry\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = Config::load_from(Path::new("/nonexistent/pacer.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(5)]
    fn positive_ratios_are_accepted(#[case] ratio: usize) {
        let config = PacingConfig::new(ratio).unwrap();
        assert_eq!(config.dial_ratio, ratio);
    }
}
