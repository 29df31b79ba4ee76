//! Between-tick views of the world for observers.
//!
//! A [`WorldSnapshot`] is an owned copy taken after a tick completes, so
//! observers on other threads never touch live simulation state.

use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityId, EntityKind, MotionState, TeamId};
use crate::error::{GameError, Result};
use crate::math::TilePos;

/// Coarse motion state as seen by observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MotionSummary {
    /// Standing still (always the case for buildings).
    Idle,
    /// Walking toward `destination`.
    Moving {
        /// Final tile of the current path.
        destination: TilePos,
    },
    /// Pursuing or hitting `target`.
    Attacking {
        /// Entity under attack.
        target: EntityId,
    },
}

/// One entity as of the end of a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Entity ID.
    pub id: EntityId,
    /// Owning team.
    pub team: TeamId,
    /// Unit or building type.
    pub kind: EntityKind,
    /// Tile (anchor tile for buildings).
    pub tile: TilePos,
    /// Current health.
    pub health: u32,
    /// Maximum health.
    pub max_health: u32,
    /// Motion state.
    pub motion: MotionSummary,
}

impl From<&Entity> for EntitySnapshot {
    fn from(entity: &Entity) -> Self {
        let motion = match &entity.motion {
            MotionState::Idle => MotionSummary::Idle,
            MotionState::Moving(path) => match path.destination() {
                Some(destination) if !path.is_complete() => MotionSummary::Moving { destination },
                _ => MotionSummary::Idle,
            },
            MotionState::Attacking(order) => MotionSummary::Attacking {
                target: order.target,
            },
        };
        Self {
            id: entity.id,
            team: entity.team,
            kind: entity.kind,
            tile: entity.tile,
            health: entity.health.current,
            max_health: entity.health.max,
            motion,
        }
    }
}

/// Complete observable state after a tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Number of ticks completed.
    pub tick: u64,
    /// Map width in tiles.
    pub width: u32,
    /// Map height in tiles.
    pub height: u32,
    /// Tile size in world units.
    pub tile_size: u32,
    /// All live entities, ascending by ID.
    pub entities: Vec<EntitySnapshot>,
}

impl WorldSnapshot {
    /// Look up an entity by ID.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<&EntitySnapshot> {
        self.entities
            .binary_search_by_key(&id, |e| e.id)
            .ok()
            .map(|i| &self.entities[i])
    }

    /// Entities owned by a team.
    pub fn team(&self, team: TeamId) -> impl Iterator<Item = &EntitySnapshot> {
        self.entities.iter().filter(move |e| e.team == team)
    }

    /// Encode with bincode for streaming to observers.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Serialization`] if encoding fails.
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::Serialization(format!("Failed to encode snapshot: {e}")))
    }

    /// Decode a snapshot produced by [`encode`](Self::encode).
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Serialization`] on malformed input.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| GameError::Serialization(format!("Failed to decode snapshot: {e}")))
    }
}
