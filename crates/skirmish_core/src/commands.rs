//! Player commands and their execution.
//!
//! Commands are a closed set of variants, each with its own handler in
//! [`CommandProcessor`]. Validation happens per unit: one bad ID in a
//! selection is rejected on its own and never aborts its siblings. Only
//! malformed commands (empty selection, off-map target, unknown attack
//! target) fail as a whole, and they do so before any state changes.
//!
//! Pathfinding and formation planning are injected as capabilities so the
//! processor can be driven with deterministic fakes.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::config::SimConfig;
use crate::entity::{AttackOrder, BuildingType, Entity, EntityId, EntityKind, MotionState, TeamId};
use crate::error::GameError;
use crate::formation::{FormationKind, FormationPlanner, GridFormationPlanner};
use crate::math::TilePos;
use crate::pathfinding::{AStarPathfinder, Pathfinder};
use crate::simulation::World;
use crate::store::SpawnRequest;

/// A player or harness request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Move a group of units to a target tile in formation.
    Move {
        /// Units to move.
        units: Vec<EntityId>,
        /// Target tile (the formation tip).
        target: TilePos,
        /// Shape used when more than one unit moves.
        formation: FormationKind,
    },
    /// Have a unit place a building.
    Build {
        /// Issuing unit.
        unit: EntityId,
        /// Building to place.
        building: BuildingType,
        /// Anchor (top-left) tile of the footprint.
        target: TilePos,
    },
    /// Order units to attack an entity.
    Attack {
        /// Attacking units.
        units: Vec<EntityId>,
        /// Entity to attack.
        target: EntityId,
    },
}

impl Command {
    /// Tag of this command.
    #[must_use]
    pub const fn kind(&self) -> CommandKind {
        match self {
            Self::Move { .. } => CommandKind::Move,
            Self::Build { .. } => CommandKind::Build,
            Self::Attack { .. } => CommandKind::Attack,
        }
    }
}

/// Command tag, used in reports and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    /// [`Command::Move`]
    Move,
    /// [`Command::Build`]
    Build,
    /// [`Command::Attack`]
    Attack,
}

/// Who sent a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Issuer {
    /// A player team; may only command its own units.
    Team(TeamId),
    /// The server itself or a test harness; ownership is not checked.
    Server,
}

impl Issuer {
    fn check_owner(self, entity: &Entity) -> Result<(), GameError> {
        match self {
            Self::Team(team) if entity.team != team => Err(GameError::NotOwned {
                entity: entity.id,
                team,
            }),
            _ => Ok(()),
        }
    }
}

/// A command together with its origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandEnvelope {
    /// Originating team or the server.
    pub issuer: Issuer,
    /// The request itself.
    pub command: Command,
}

impl CommandEnvelope {
    /// Wrap a command sent by a team.
    #[must_use]
    pub const fn from_team(team: TeamId, command: Command) -> Self {
        Self {
            issuer: Issuer::Team(team),
            command,
        }
    }

    /// Wrap a command sent by the server or harness.
    #[must_use]
    pub const fn from_server(command: Command) -> Self {
        Self {
            issuer: Issuer::Server,
            command,
        }
    }
}

/// Result of a command for a single unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// The unit is walking toward `destination`.
    Moving {
        /// Assigned destination tile.
        destination: TilePos,
        /// Path length in steps.
        steps: usize,
    },
    /// The unit is (or stays) idle. `None` means it already stands on
    /// its destination.
    Idle {
        /// Why the unit is not moving.
        reason: Option<GameError>,
    },
    /// The unit is pursuing `target`.
    Attacking {
        /// Entity under attack.
        target: EntityId,
    },
    /// The unit placed a building.
    Built {
        /// ID of the new building.
        building: EntityId,
    },
    /// Validation failed; nothing about the unit changed.
    Rejected {
        /// Validation failure.
        reason: GameError,
    },
}

/// Per-unit entry of a [`CommandReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitReport {
    /// Unit the entry is about.
    pub unit: EntityId,
    /// What happened to it.
    pub outcome: UnitOutcome,
}

/// What a command did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReport {
    /// Originating team or the server.
    pub issuer: Issuer,
    /// Command tag.
    pub kind: CommandKind,
    /// Per-unit outcomes in selection order.
    pub outcomes: Vec<UnitReport>,
    /// Set when the command failed as a whole; `outcomes` is then empty.
    pub error: Option<GameError>,
}

impl CommandReport {
    fn new(issuer: Issuer, kind: CommandKind) -> Self {
        Self {
            issuer,
            kind,
            outcomes: Vec::new(),
            error: None,
        }
    }

    fn failed(issuer: Issuer, kind: CommandKind, error: GameError) -> Self {
        Self {
            error: Some(error),
            ..Self::new(issuer, kind)
        }
    }

    fn push(&mut self, unit: EntityId, outcome: UnitOutcome) {
        self.outcomes.push(UnitReport { unit, outcome });
    }

    /// Outcome recorded for a unit, if it was part of the command.
    #[must_use]
    pub fn outcome_for(&self, unit: EntityId) -> Option<&UnitOutcome> {
        self.outcomes
            .iter()
            .find(|r| r.unit == unit)
            .map(|r| &r.outcome)
    }

    /// Number of units whose outcome was a rejection.
    #[must_use]
    pub fn rejected_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|r| matches!(r.outcome, UnitOutcome::Rejected { .. }))
            .count()
    }
}

/// Validates and executes commands against a [`World`].
#[derive(Debug, Clone, Default)]
pub struct CommandProcessor<P = AStarPathfinder, F = GridFormationPlanner> {
    pathfinder: P,
    planner: F,
}

impl CommandProcessor {
    /// Build the default processor from simulation config.
    #[must_use]
    pub fn from_config(config: &SimConfig) -> Self {
        Self::new(
            AStarPathfinder::new(config.allow_diagonal),
            GridFormationPlanner {
                search_radius: config.formation_search_radius,
                spread_spacing: config.spread_spacing,
            },
        )
    }
}

impl<P: Pathfinder, F: FormationPlanner> CommandProcessor<P, F> {
    /// Build a processor from explicit capabilities.
    pub const fn new(pathfinder: P, planner: F) -> Self {
        Self {
            pathfinder,
            planner,
        }
    }

    /// Pathfinding capability, shared with the tick step for replans.
    pub const fn pathfinder(&self) -> &P {
        &self.pathfinder
    }

    /// Execute one command. Never panics; every failure is reported.
    pub fn execute(&self, world: &mut World, envelope: &CommandEnvelope) -> CommandReport {
        let issuer = envelope.issuer;
        let report = match &envelope.command {
            Command::Move {
                units,
                target,
                formation,
            } => self.execute_move(world, issuer, units, *target, *formation),
            Command::Build {
                unit,
                building,
                target,
            } => Self::execute_build(world, issuer, *unit, *building, *target),
            Command::Attack { units, target } => {
                Self::execute_attack(world, issuer, units, *target)
            }
        };

        if let Some(error) = &report.error {
            tracing::warn!(?issuer, kind = ?report.kind, %error, "Command rejected");
        } else {
            tracing::debug!(
                ?issuer,
                kind = ?report.kind,
                units = report.outcomes.len(),
                rejected = report.rejected_count(),
                "Command executed"
            );
        }
        report
    }

    fn execute_move(
        &self,
        world: &mut World,
        issuer: Issuer,
        units: &[EntityId],
        target: TilePos,
        formation: FormationKind,
    ) -> CommandReport {
        let mut report = CommandReport::new(issuer, CommandKind::Move);
        if units.is_empty() {
            return CommandReport::failed(issuer, CommandKind::Move, GameError::EmptySelection);
        }
        if !world.terrain.in_bounds(target) {
            return CommandReport::failed(
                issuer,
                CommandKind::Move,
                GameError::OutOfBounds(target),
            );
        }

        let selection = dedup(units);
        let checked: Vec<(EntityId, Result<TilePos, GameError>)> = selection
            .iter()
            .map(|&id| (id, validate_unit(world, issuer, id).map(|e| e.tile)))
            .collect();
        let valid: Vec<(EntityId, TilePos)> = checked
            .iter()
            .filter_map(|(id, r)| r.as_ref().ok().map(|&tile| (*id, tile)))
            .collect();

        let destinations: BTreeMap<EntityId, TilePos> = if valid.len() > 1 {
            let group: HashSet<EntityId> = valid.iter().map(|&(id, _)| id).collect();
            let view = world.occupancy_view(&group);
            self.planner
                .plan(&view, formation, target, &valid)
                .assignments
        } else {
            valid.iter().map(|&(id, _)| (id, target)).collect()
        };

        for (id, checked) in checked {
            let from = match checked {
                Ok(tile) => tile,
                Err(reason) => {
                    report.push(id, UnitOutcome::Rejected { reason });
                    continue;
                }
            };

            let outcome = match destinations.get(&id) {
                None => Self::stop(world, id, GameError::NoFormationSlot(id)),
                Some(&destination) => {
                    match self.pathfinder.find_path(&world.terrain, from, destination) {
                        Ok(path) => {
                            let steps = path.len().saturating_sub(1);
                            match world.entities.set_path(id, path) {
                                Ok(()) if steps == 0 => UnitOutcome::Idle { reason: None },
                                Ok(()) => UnitOutcome::Moving { destination, steps },
                                Err(reason) => UnitOutcome::Rejected { reason },
                            }
                        }
                        Err(e) => Self::stop(world, id, e.into()),
                    }
                }
            };
            report.push(id, outcome);
        }
        report
    }

    /// Cancel a unit's current order and report it idle.
    fn stop(world: &mut World, id: EntityId, reason: GameError) -> UnitOutcome {
        tracing::debug!(id, %reason, "Unit left idle");
        match world.entities.set_motion(id, MotionState::Idle) {
            Ok(()) => UnitOutcome::Idle {
                reason: Some(reason),
            },
            Err(reason) => UnitOutcome::Rejected { reason },
        }
    }

    fn execute_build(
        world: &mut World,
        issuer: Issuer,
        unit: EntityId,
        building: BuildingType,
        target: TilePos,
    ) -> CommandReport {
        let mut report = CommandReport::new(issuer, CommandKind::Build);
        let team = match validate_unit(world, issuer, unit) {
            Ok(entity) => entity.team,
            Err(reason) => {
                report.push(unit, UnitOutcome::Rejected { reason });
                return report;
            }
        };

        let request = SpawnRequest {
            kind: EntityKind::Building(building),
            team,
            tile: target,
        };
        let outcome = match world.spawn(request) {
            Ok(building) => UnitOutcome::Built { building },
            Err(reason) => UnitOutcome::Rejected { reason },
        };
        report.push(unit, outcome);
        report
    }

    fn execute_attack(
        world: &mut World,
        issuer: Issuer,
        units: &[EntityId],
        target: EntityId,
    ) -> CommandReport {
        let mut report = CommandReport::new(issuer, CommandKind::Attack);
        if units.is_empty() {
            return CommandReport::failed(issuer, CommandKind::Attack, GameError::EmptySelection);
        }
        let Some(target_team) = world.entities.get(target).map(|e| e.team) else {
            return CommandReport::failed(
                issuer,
                CommandKind::Attack,
                GameError::EntityNotFound(target),
            );
        };

        for id in dedup(units) {
            let checked = validate_unit(world, issuer, id).and_then(|entity| {
                if id == target {
                    Err(GameError::InvalidTarget(format!("entity {id} cannot attack itself")))
                } else if entity.weapon.is_none() {
                    Err(GameError::CannotAttack(id))
                } else if matches!(issuer, Issuer::Team(team) if team == target_team) {
                    Err(GameError::InvalidTarget(format!("entity {target} is friendly")))
                } else {
                    Ok(())
                }
            });

            let outcome = match checked
                .and_then(|()| {
                    world
                        .entities
                        .set_motion(id, MotionState::Attacking(AttackOrder::new(target)))
                }) {
                Ok(()) => UnitOutcome::Attacking { target },
                Err(reason) => UnitOutcome::Rejected { reason },
            };
            report.push(id, outcome);
        }
        report
    }
}

/// Check that `id` names a unit the issuer may command.
fn validate_unit(world: &World, issuer: Issuer, id: EntityId) -> Result<&Entity, GameError> {
    let entity = world
        .entities
        .get(id)
        .ok_or(GameError::EntityNotFound(id))?;
    if !entity.is_unit() {
        return Err(GameError::NotAUnit(id));
    }
    issuer.check_owner(entity)?;
    Ok(entity)
}

/// Drop repeated IDs, keeping first occurrences in order.
fn dedup(ids: &[EntityId]) -> Vec<EntityId> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}
