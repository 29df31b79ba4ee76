//! Simulation tuning, loadable from RON.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File not found.
    #[error("Config file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// A value is out of range.
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Tuning for the simulation step.
///
/// Every field has a default, so a RON document only needs to list the
/// values it overrides.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Ticks per second.
    pub tick_rate: u32,
    /// Allow diagonal steps when planning paths.
    pub allow_diagonal: bool,
    /// Consecutive stalled ticks before a unit replans around traffic.
    pub stall_replan_ticks: u32,
    /// Replans a single order may use before the unit gives up and idles.
    pub max_replans: u32,
    /// Chebyshev radius searched when a formation slot is blocked.
    pub formation_search_radius: u32,
    /// Distance between rings in a spread formation.
    pub spread_spacing: u32,
    /// Ticks between approach replans while chasing an attack target.
    pub chase_replan_interval: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_rate: 20,
            allow_diagonal: true,
            stall_replan_ticks: 3,
            max_replans: 4,
            formation_search_radius: 6,
            spread_spacing: 2,
            chase_replan_interval: 5,
        }
    }
}

impl SimConfig {
    /// Load a config from a RON file.
    ///
    /// # Errors
    ///
    /// Fails if the file is missing, unreadable, malformed or holds
    /// out-of-range values.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Parse a config from a RON string.
    ///
    /// # Errors
    ///
    /// Fails on malformed RON or out-of-range values.
    pub fn from_ron_str(ron: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(ron)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::Invalid("tick_rate must be positive".into()));
        }
        if self.stall_replan_ticks == 0 {
            return Err(ConfigError::Invalid(
                "stall_replan_ticks must be positive".into(),
            ));
        }
        if self.spread_spacing == 0 {
            return Err(ConfigError::Invalid("spread_spacing must be positive".into()));
        }
        if self.chase_replan_interval == 0 {
            return Err(ConfigError::Invalid(
                "chase_replan_interval must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Wall-clock duration of one tick.
    #[must_use]
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate.max(1)
    }
}
