//! Error types for the game simulation.
//!
//! Nothing in the simulation is fatal: every variant here describes why a
//! single command, unit order or setup call had no effect.

use thiserror::Error;

use crate::entity::{EntityId, TeamId};
use crate::math::TilePos;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all game simulation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    /// Invalid entity reference.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// The issuing team does not own the entity.
    #[error("Entity {entity} is not owned by team {team}")]
    NotOwned {
        /// Entity that was commanded.
        entity: EntityId,
        /// Team that issued the command.
        team: TeamId,
    },

    /// A unit order was addressed to a building.
    #[error("Entity {0} is not a unit")]
    NotAUnit(EntityId),

    /// A command named no units.
    #[error("Command has no units")]
    EmptySelection,

    /// The command target is malformed (e.g. a unit attacking itself).
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Unrecognised unit, building or formation name.
    #[error("Unknown type name: {0}")]
    UnknownType(String),

    /// The entity has no weapon.
    #[error("Entity {0} cannot attack")]
    CannotAttack(EntityId),

    /// Tile lies outside the map.
    #[error("Tile {0} is out of bounds")]
    OutOfBounds(TilePos),

    /// Tile is impassable terrain or covered by a building.
    #[error("Tile {0} is blocked")]
    TerrainBlocked(TilePos),

    /// Tile is held by another entity.
    #[error("Tile {tile} is occupied by entity {occupant}")]
    TileOccupied {
        /// Contested tile.
        tile: TilePos,
        /// Entity currently on it.
        occupant: EntityId,
    },

    /// No route exists between the two tiles.
    #[error("No path from {from} to {to}")]
    NoPath {
        /// Start tile.
        from: TilePos,
        /// Requested destination.
        to: TilePos,
    },

    /// The formation planner found no free destination for the unit.
    #[error("No formation slot available for entity {0}")]
    NoFormationSlot(EntityId),

    /// Terrain grid cannot be constructed or loaded.
    #[error("Invalid map: {0}")]
    InvalidMap(String),

    /// The map cannot be replaced after the match has started.
    #[error("Match already in progress")]
    MatchInProgress,

    /// Snapshot or state encoding failed.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Invalid game state.
    #[error("Invalid game state: {0}")]
    InvalidState(String),
}
