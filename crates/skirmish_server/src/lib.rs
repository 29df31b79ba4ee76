//! # Skirmish Server
//!
//! Runs the simulation at a fixed tick rate. Any number of producers
//! submit commands through a bounded queue; the scheduler task is the
//! only writer of game state and publishes a snapshot after every tick.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use skirmish_core::config::{ConfigError, SimConfig};
use skirmish_core::error::GameError;

pub mod queue;
pub mod scheduler;

/// Server errors.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The command queue is at capacity.
    #[error("Command queue is full")]
    QueueFull,
    /// The scheduler has shut down.
    #[error("Command queue is closed")]
    QueueClosed,
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// World setup failed.
    #[error("Game setup failed: {0}")]
    Game(#[from] GameError),
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Commands that may wait between two ticks before producers are
    /// pushed back.
    pub queue_capacity: usize,
    /// Stop after this many ticks; run until shutdown if unset.
    pub max_ticks: Option<u64>,
    /// Map width in tiles for the generated arena.
    pub map_width: u32,
    /// Map height in tiles for the generated arena.
    pub map_height: u32,
    /// Simulation tuning, including the tick rate.
    pub sim: SimConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_ticks: None,
            map_width: 64,
            map_height: 64,
            sim: SimConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load a config from a RON file.
    ///
    /// # Errors
    ///
    /// Fails if the file is missing, unreadable, malformed or invalid.
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
    /// Fails on malformed RON or invalid values.
    pub fn from_ron_str(ron: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(ron)?;
        config.sim.validate()?;
        if config.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be positive".into()));
        }
        Ok(config)
    }

    /// Wall-clock duration of one tick.
    #[must_use]
    pub fn tick_duration(&self) -> Duration {
        self.sim.tick_duration()
    }
}
