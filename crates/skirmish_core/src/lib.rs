//! # Skirmish Core
//!
//! Deterministic, tick-driven simulation core for a grid-based real-time
//! strategy server.
//!
//! This crate contains **only** deterministic logic:
//! - No networking or threads
//! - No IO beyond loading config files
//! - No randomness
//! - No floating-point math (uses fixed-point)
//!
//! ## Crate Structure
//!
//! - [`terrain`] - Passability grid and building coverage
//! - [`store`] - Entity arena with tile occupancy
//! - [`pathfinding`] - A* route planning
//! - [`formation`] - Group destination planning
//! - [`commands`] - Command validation and execution
//! - [`simulation`] - The tick step
//! - [`interface`] - Abstract game-server contract
//! - [`snapshot`] - Between-tick state for observers

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod commands;
pub mod config;
pub mod entity;
pub mod error;
pub mod formation;
pub mod interface;
pub mod math;
pub mod pathfinding;
pub mod simulation;
pub mod snapshot;
pub mod store;
pub mod terrain;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::commands::{
        Command, CommandEnvelope, CommandKind, CommandProcessor, CommandReport, Issuer,
        UnitOutcome, UnitReport,
    };
    pub use crate::config::{ConfigError, SimConfig};
    pub use crate::entity::{
        BuildingType, Entity, EntityId, EntityKind, MotionState, TeamId, UnitType,
    };
    pub use crate::error::{GameError, Result};
    pub use crate::formation::{FormationKind, FormationPlanner, GridFormationPlanner};
    pub use crate::interface::GameServer;
    pub use crate::math::{Fixed, TilePos};
    pub use crate::pathfinding::{AStarPathfinder, PathError, Pathfinder};
    pub use crate::simulation::{DamageEvent, Simulation, TickEvents, World};
    pub use crate::snapshot::{EntitySnapshot, MotionSummary, WorldSnapshot};
    pub use crate::store::{AdvanceOutcome, EntityStore, SpawnRequest};
    pub use crate::terrain::{CellType, OccupancyView, Passability, TerrainGrid};
}
