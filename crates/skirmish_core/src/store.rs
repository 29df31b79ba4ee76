//! Entity store: the arena owning every live unit and building.
//!
//! IDs are handed out from a monotonically increasing counter and are
//! never reused, even after removal. A tile index mirrors every entity's
//! footprint so occupancy queries are O(1), and every mutation keeps the
//! index, the terrain's building layer and the entities in agreement.
//!
//! The store has a single writer: the simulation step. Observers read it
//! only between ticks.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::entity::{BuildingType, Entity, EntityId, EntityKind, MotionState, MovePath, TeamId};
use crate::error::{GameError, Result};
use crate::math::{Fixed, TilePos};
use crate::terrain::TerrainGrid;

/// Parameters for spawning a new entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnRequest {
    /// Unit or building type.
    pub kind: EntityKind,
    /// Owning team.
    pub team: TeamId,
    /// Tile (anchor tile for buildings).
    pub tile: TilePos,
}

/// What happened when a unit's motion was advanced by one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdvanceOutcome {
    /// The entity has no path to walk.
    Idle,
    /// Sub-tile progress was made without entering a new tile.
    Progressing,
    /// The unit entered one or more new tiles.
    Moved {
        /// Tile at the start of the tick.
        from: TilePos,
        /// Tile at the end of the tick.
        to: TilePos,
    },
    /// The unit stands on the final tile of its path.
    Arrived {
        /// Final tile.
        tile: TilePos,
    },
    /// The next step was refused; the unit waits on its tile.
    Stalled {
        /// Tile the unit waits on.
        at: TilePos,
        /// Tile it tried to enter.
        next: TilePos,
        /// Entity holding `next`, if any (`None` for terrain).
        blocked_by: Option<EntityId>,
    },
}

/// Storage for all entities in the simulation.
///
/// Uses a `BTreeMap` so iteration is always in ascending ID order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityStore {
    /// Map of entity ID to entity data.
    entities: BTreeMap<EntityId, Entity>,
    /// Entity covering each occupied tile (units and building footprints).
    tile_index: HashMap<TilePos, EntityId>,
    /// Next entity ID to assign.
    next_id: EntityId,
}

impl EntityStore {
    /// Create empty entity storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entities: BTreeMap::new(),
            tile_index: HashMap::new(),
            next_id: 1,
        }
    }

    /// Spawn a new entity and return its ID.
    ///
    /// # Errors
    ///
    /// Fails without side effects if any footprint tile is out of bounds,
    /// terrain-blocked, or already held by another entity.
    pub fn spawn(&mut self, terrain: &mut TerrainGrid, request: SpawnRequest) -> Result<EntityId> {
        let footprint = match request.kind {
            EntityKind::Unit(_) => vec![request.tile],
            EntityKind::Building(b) => {
                if !footprint_fits(terrain, b, request.tile) {
                    return Err(GameError::OutOfBounds(request.tile));
                }
                b.footprint(request.tile)
            }
        };

        for &tile in &footprint {
            if !terrain.in_bounds(tile) {
                return Err(GameError::OutOfBounds(tile));
            }
            if terrain.is_terrain_blocked(tile) {
                return Err(GameError::TerrainBlocked(tile));
            }
            if let Some(&occupant) = self.tile_index.get(&tile) {
                return Err(GameError::TileOccupied { tile, occupant });
            }
        }

        let id = self.next_id;
        let entity = match request.kind {
            EntityKind::Unit(unit_type) => Entity::unit(id, request.team, unit_type, request.tile),
            EntityKind::Building(building) => {
                terrain.place_building(id, &footprint)?;
                Entity::building(id, request.team, building, request.tile)
            }
        };

        self.next_id += 1;
        for tile in footprint {
            self.tile_index.insert(tile, id);
        }
        self.entities.insert(id, entity);

        tracing::debug!(
            id,
            kind = %request.kind,
            team = request.team,
            tile = %request.tile,
            "Spawned entity"
        );
        Ok(id)
    }

    /// Remove an entity, releasing its tiles. The ID is retired.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::EntityNotFound`] if the entity doesn't exist.
    pub fn remove(&mut self, terrain: &mut TerrainGrid, id: EntityId) -> Result<Entity> {
        let entity = self
            .entities
            .remove(&id)
            .ok_or(GameError::EntityNotFound(id))?;

        let footprint = entity.footprint();
        for tile in &footprint {
            if self.tile_index.get(tile) == Some(&id) {
                self.tile_index.remove(tile);
            }
        }
        if entity.is_building() {
            terrain.clear_building(id, &footprint);
        }

        tracing::debug!(id, kind = %entity.kind, "Removed entity");
        Ok(entity)
    }

    /// Get an entity by ID.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Check if an entity exists.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Get the number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if storage is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// ID the next spawned entity will receive.
    #[must_use]
    pub const fn next_id(&self) -> EntityId {
        self.next_id
    }

    /// Entity IDs in ascending order, for deterministic iteration.
    #[must_use]
    pub fn sorted_ids(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    /// Iterate over all entities in ascending ID order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Entities covering a tile: the unit standing on it or the building
    /// whose footprint includes it.
    #[must_use]
    pub fn occupants(&self, tile: TilePos) -> Vec<EntityId> {
        self.tile_index.get(&tile).copied().into_iter().collect()
    }

    /// Unit standing on a tile, if any.
    #[must_use]
    pub fn unit_at(&self, tile: TilePos) -> Option<EntityId> {
        self.tile_index
            .get(&tile)
            .copied()
            .filter(|id| self.entities.get(id).is_some_and(Entity::is_unit))
    }

    /// Tiles held by units, excluding the listed units.
    #[must_use]
    pub fn unit_tiles_except(&self, except: &HashSet<EntityId>) -> HashSet<TilePos> {
        self.entities
            .values()
            .filter(|e| e.is_unit() && !except.contains(&e.id))
            .map(|e| e.tile)
            .collect()
    }

    /// Give a unit a new route. The route must start on the unit's tile;
    /// a single-tile route leaves the unit idle. Replaces any current
    /// move or attack order.
    ///
    /// # Errors
    ///
    /// Fails if the entity is missing, is a building, or the route does
    /// not start where the unit stands.
    pub fn set_path(&mut self, id: EntityId, path: Vec<TilePos>) -> Result<()> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(GameError::EntityNotFound(id))?;
        if !entity.is_unit() {
            return Err(GameError::NotAUnit(id));
        }
        if path.first() != Some(&entity.tile) {
            return Err(GameError::InvalidState(format!(
                "Path for entity {id} does not start at its tile {}",
                entity.tile
            )));
        }

        entity.motion = if path.len() > 1 {
            MotionState::Moving(MovePath::new(path))
        } else {
            MotionState::Idle
        };
        Ok(())
    }

    /// Overwrite a unit's motion state.
    ///
    /// # Errors
    ///
    /// Fails if the entity is missing or is a building.
    pub fn set_motion(&mut self, id: EntityId, motion: MotionState) -> Result<()> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(GameError::EntityNotFound(id))?;
        if !entity.is_unit() {
            return Err(GameError::NotAUnit(id));
        }
        entity.motion = motion;
        Ok(())
    }

    /// Advance a unit along its active path by one tick of movement.
    ///
    /// Progress accumulates by the unit's speed; each whole tile of
    /// progress steps onto the next path tile if that tile is passable and
    /// not held by another unit. A refused step stalls the unit on its
    /// current tile with progress capped at one tile, so the step is
    /// retried next tick without a catch-up burst. Units therefore never
    /// share a tile.
    pub fn advance(&mut self, terrain: &TerrainGrid, id: EntityId) -> AdvanceOutcome {
        let Some(entity) = self.entities.get_mut(&id) else {
            return AdvanceOutcome::Idle;
        };
        let from = entity.tile;
        let speed = entity.speed;
        let Some(path) = entity.motion.active_path_mut() else {
            return AdvanceOutcome::Idle;
        };

        let mut current = from;
        let mut stall = None;

        if !path.is_complete() {
            path.progress = (path.progress + speed).min(speed.max(Fixed::ONE));
        }

        while path.progress >= Fixed::ONE {
            let Some(next) = path.next_tile() else {
                break;
            };

            let holder = self.tile_index.get(&next).copied().filter(|&o| o != id);
            if holder.is_some() || !terrain.is_passable(next) {
                path.progress = Fixed::ONE;
                path.stalled_ticks += 1;
                stall = Some((next, holder));
                break;
            }

            self.tile_index.remove(&current);
            self.tile_index.insert(next, id);
            current = next;
            path.step();
            path.progress -= Fixed::ONE;
            path.stalled_ticks = 0;
        }

        let complete = path.is_complete();
        if complete {
            path.progress = Fixed::ZERO;
        }
        entity.tile = current;

        if let Some((next, blocked_by)) = stall {
            tracing::trace!(id, at = %current, %next, ?blocked_by, "Unit stalled");
            return AdvanceOutcome::Stalled {
                at: current,
                next,
                blocked_by,
            };
        }

        if complete {
            match &mut entity.motion {
                MotionState::Moving(_) => entity.motion = MotionState::Idle,
                MotionState::Attacking(order) => order.approach = None,
                MotionState::Idle => {}
            }
            return AdvanceOutcome::Arrived { tile: current };
        }

        if current == from {
            AdvanceOutcome::Progressing
        } else {
            tracing::trace!(id, %from, to = %current, "Unit moved");
            AdvanceOutcome::Moved { from, to: current }
        }
    }

    /// Check store invariants against the terrain.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidState`] describing the first violation:
    /// two units on one tile, an entity off the map or on impassable
    /// terrain, or an index entry disagreeing with the entities.
    pub fn validate(&self, terrain: &TerrainGrid) -> Result<()> {
        let mut seen: HashMap<TilePos, EntityId> = HashMap::new();

        for entity in self.entities.values() {
            for tile in entity.footprint() {
                if !terrain.in_bounds(tile) {
                    return Err(GameError::InvalidState(format!(
                        "Entity {} is out of bounds at {tile}",
                        entity.id
                    )));
                }
                if terrain.is_terrain_blocked(tile) {
                    return Err(GameError::InvalidState(format!(
                        "Entity {} stands on blocked terrain at {tile}",
                        entity.id
                    )));
                }
                if entity.is_building() && terrain.building_at(tile) != Some(entity.id) {
                    return Err(GameError::InvalidState(format!(
                        "Building {} footprint at {tile} not marked on terrain",
                        entity.id
                    )));
                }
                if entity.is_unit() && terrain.building_at(tile).is_some() {
                    return Err(GameError::InvalidState(format!(
                        "Unit {} stands inside a building at {tile}",
                        entity.id
                    )));
                }
                if let Some(other) = seen.insert(tile, entity.id) {
                    return Err(GameError::InvalidState(format!(
                        "Entities {other} and {} share tile {tile}",
                        entity.id
                    )));
                }
                if self.tile_index.get(&tile) != Some(&entity.id) {
                    return Err(GameError::InvalidState(format!(
                        "Tile index disagrees with entity {} at {tile}",
                        entity.id
                    )));
                }
            }
        }

        if seen.len() != self.tile_index.len() {
            return Err(GameError::InvalidState(
                "Tile index holds stale entries".into(),
            ));
        }
        Ok(())
    }
}

/// Whether a building anchored at `anchor` lies entirely on the grid.
fn footprint_fits(terrain: &TerrainGrid, building: BuildingType, anchor: TilePos) -> bool {
    let (w, h) = building.footprint_size();
    match (anchor.x.checked_add(w - 1), anchor.y.checked_add(h - 1)) {
        (Some(x), Some(y)) => terrain.in_bounds(anchor) && terrain.in_bounds(TilePos::new(x, y)),
        _ => false,
    }
}
