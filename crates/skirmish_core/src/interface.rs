//! Abstract game-server contract.
//!
//! The networking layer and the scenario harness both drive the core
//! through [`GameServer`], so either can run against the real
//! [`Simulation`] or a substitute.
//!
//! Orders issued here come from the server itself ([`Issuer::Server`]),
//! so ownership is not checked. They fail synchronously only when the
//! command is malformed; everything else is queued and takes effect on
//! the next [`tick`](GameServer::tick), with per-unit failures showing up
//! in that tick's reports.

use crate::commands::{Command, CommandEnvelope, Issuer};
use crate::entity::{BuildingType, EntityId, EntityKind, TeamId, UnitType};
use crate::error::{GameError, Result};
use crate::formation::FormationKind;
use crate::math::TilePos;
use crate::simulation::{Simulation, TickEvents};
use crate::store::SpawnRequest;
use crate::terrain::TerrainGrid;

/// Operations exposed by an authoritative game server.
pub trait GameServer {
    /// Install the map. Only allowed before the match starts.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::MatchInProgress`] once entities exist or a
    /// tick has run.
    fn load_map(&mut self, terrain: TerrainGrid) -> Result<()>;

    /// Spawn a unit immediately.
    ///
    /// # Errors
    ///
    /// Fails if the tile is off the map, blocked or occupied.
    fn spawn_unit(&mut self, unit: UnitType, team: TeamId, x: i32, y: i32) -> Result<EntityId>;

    /// Spawn a building immediately, anchored at its top-left tile.
    ///
    /// # Errors
    ///
    /// Fails if any footprint tile is off the map, blocked or occupied.
    fn spawn_building(
        &mut self,
        building: BuildingType,
        team: TeamId,
        x: i32,
        y: i32,
    ) -> Result<EntityId>;

    /// Advance by one simulation step.
    fn tick(&mut self) -> TickEvents;

    /// Current tile of an entity.
    fn get_entity_position(&self, id: EntityId) -> Option<TilePos>;

    /// Whether a unit is walking, on a move order or approaching an
    /// attack target.
    fn is_entity_moving(&self, id: EntityId) -> bool;

    /// Whether the entity is alive.
    fn entity_exists(&self, id: EntityId) -> bool;

    /// Owning team of an entity.
    fn get_entity_team(&self, id: EntityId) -> Option<TeamId>;

    /// Order units to a target tile in formation.
    ///
    /// # Errors
    ///
    /// Fails on an empty selection or an off-map target.
    fn move_units(
        &mut self,
        ids: &[EntityId],
        x: i32,
        y: i32,
        formation: FormationKind,
    ) -> Result<()>;

    /// Order units to attack an entity.
    ///
    /// # Errors
    ///
    /// Fails on an empty selection or an unknown target.
    fn attack_target(&mut self, ids: &[EntityId], target: EntityId) -> Result<()>;

    /// Have a unit place a building.
    ///
    /// # Errors
    ///
    /// Fails if the unit does not exist.
    fn build(&mut self, unit: EntityId, building: BuildingType, x: i32, y: i32) -> Result<()>;
}

impl GameServer for Simulation {
    fn load_map(&mut self, terrain: TerrainGrid) -> Result<()> {
        Simulation::load_map(self, terrain)
    }

    fn spawn_unit(&mut self, unit: UnitType, team: TeamId, x: i32, y: i32) -> Result<EntityId> {
        self.spawn(SpawnRequest {
            kind: EntityKind::Unit(unit),
            team,
            tile: TilePos::new(x, y),
        })
    }

    fn spawn_building(
        &mut self,
        building: BuildingType,
        team: TeamId,
        x: i32,
        y: i32,
    ) -> Result<EntityId> {
        self.spawn(SpawnRequest {
            kind: EntityKind::Building(building),
            team,
            tile: TilePos::new(x, y),
        })
    }

    fn tick(&mut self) -> TickEvents {
        Simulation::tick(self)
    }

    fn get_entity_position(&self, id: EntityId) -> Option<TilePos> {
        self.get_entity(id).map(|e| e.tile)
    }

    fn is_entity_moving(&self, id: EntityId) -> bool {
        self.get_entity(id).is_some_and(crate::entity::Entity::is_moving)
    }

    fn entity_exists(&self, id: EntityId) -> bool {
        self.entities().contains(id)
    }

    fn get_entity_team(&self, id: EntityId) -> Option<TeamId> {
        self.get_entity(id).map(|e| e.team)
    }

    fn move_units(
        &mut self,
        ids: &[EntityId],
        x: i32,
        y: i32,
        formation: FormationKind,
    ) -> Result<()> {
        let target = TilePos::new(x, y);
        if ids.is_empty() {
            return Err(GameError::EmptySelection);
        }
        if !self.terrain().in_bounds(target) {
            return Err(GameError::OutOfBounds(target));
        }
        self.submit(CommandEnvelope {
            issuer: Issuer::Server,
            command: Command::Move {
                units: ids.to_vec(),
                target,
                formation,
            },
        });
        Ok(())
    }

    fn attack_target(&mut self, ids: &[EntityId], target: EntityId) -> Result<()> {
        if ids.is_empty() {
            return Err(GameError::EmptySelection);
        }
        if !self.entities().contains(target) {
            return Err(GameError::EntityNotFound(target));
        }
        self.submit(CommandEnvelope::from_server(Command::Attack {
            units: ids.to_vec(),
            target,
        }));
        Ok(())
    }

    fn build(&mut self, unit: EntityId, building: BuildingType, x: i32, y: i32) -> Result<()> {
        if !self.entities().contains(unit) {
            return Err(GameError::EntityNotFound(unit));
        }
        self.submit(CommandEnvelope::from_server(Command::Build {
            unit,
            building,
            target: TilePos::new(x, y),
        }));
        Ok(())
    }
}
