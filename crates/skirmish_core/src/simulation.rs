//! Core simulation loop.
//!
//! The simulation is fully deterministic: entities are always processed in
//! ascending ID order, all arithmetic is integer or fixed-point, and the
//! only input is the queue of submitted commands.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashSet, VecDeque};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::commands::{CommandEnvelope, CommandProcessor, CommandReport};
use crate::config::SimConfig;
use crate::entity::{Entity, EntityId, MotionState, MovePath};
use crate::error::{GameError, Result};
use crate::pathfinding::Pathfinder;
use crate::snapshot::{EntitySnapshot, WorldSnapshot};
use crate::store::{AdvanceOutcome, EntityStore, SpawnRequest};
use crate::terrain::{OccupancyView, TerrainGrid};

/// Terrain plus every live entity: the state commands act on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct World {
    /// Passability map.
    pub terrain: TerrainGrid,
    /// Live units and buildings.
    pub entities: EntityStore,
}

impl World {
    /// Create an empty world on `terrain`.
    #[must_use]
    pub fn new(terrain: TerrainGrid) -> Self {
        Self {
            terrain,
            entities: EntityStore::new(),
        }
    }

    /// Spawn an entity.
    ///
    /// # Errors
    ///
    /// See [`EntityStore::spawn`].
    pub fn spawn(&mut self, request: SpawnRequest) -> Result<EntityId> {
        self.entities.spawn(&mut self.terrain, request)
    }

    /// Remove an entity and release its tiles.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::EntityNotFound`] if it does not exist.
    pub fn remove(&mut self, id: EntityId) -> Result<Entity> {
        self.entities.remove(&mut self.terrain, id)
    }

    /// Passability view where every unit outside `group` blocks its tile.
    #[must_use]
    pub fn occupancy_view(&self, group: &HashSet<EntityId>) -> OccupancyView<'_> {
        OccupancyView::new(&self.terrain, self.entities.unit_tiles_except(group))
    }

    /// Check all entity invariants.
    ///
    /// # Errors
    ///
    /// See [`EntityStore::validate`].
    pub fn validate(&self) -> Result<()> {
        self.entities.validate(&self.terrain)
    }
}

/// A single hit landed during combat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageEvent {
    /// Entity that dealt the damage.
    pub attacker: EntityId,
    /// Entity that took the damage.
    pub target: EntityId,
    /// Damage applied after clamping to remaining health.
    pub damage: u32,
    /// Target health after the hit.
    pub remaining_health: u32,
}

/// Events generated during a simulation tick.
///
/// Published to observers alongside the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickEvents {
    /// Tick that produced these events (0 for the first tick).
    pub tick: u64,
    /// One report per drained command, in arrival order.
    pub command_reports: Vec<CommandReport>,
    /// Units that completed a move order. Attack approaches are not listed.
    pub arrivals: Vec<EntityId>,
    /// Units whose next step was refused this tick.
    pub stalls: Vec<EntityId>,
    /// Units that planned a new route around traffic.
    pub replans: Vec<EntityId>,
    /// Units that gave up their order after exhausting replans.
    pub abandoned: Vec<EntityId>,
    /// Damage events from combat.
    pub damage_events: Vec<DamageEvent>,
    /// Entities that died this tick.
    pub deaths: Vec<EntityId>,
}

/// The core game simulation.
///
/// Owns the [`World`], the pending command queue and the tick counter.
///
/// # System Execution Order
///
/// Each tick, systems run in this order:
/// 1. **Commands** - Drain queued commands in arrival order
/// 2. **Movement** - Advance units on move orders, replanning around stalls
/// 3. **Combat** - Chase and hit attack targets
/// 4. **Health** - Remove dead entities and release their tiles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Simulation {
    /// Number of completed ticks.
    tick: u64,
    /// Terrain and entities.
    world: World,
    /// Tuning.
    config: SimConfig,
    /// Commands waiting for the next tick.
    pending: VecDeque<CommandEnvelope>,
    /// Rebuilt from `config` after deserialization.
    #[serde(skip)]
    processor: CommandProcessor,
}

impl Simulation {
    /// Create a simulation on `terrain` with default tuning.
    ///
    /// # Example
    ///
    /// ```
    /// use skirmish_core::simulation::Simulation;
    /// use skirmish_core::terrain::TerrainGrid;
    ///
    /// let mut sim = Simulation::new(TerrainGrid::new(16, 16, 1).unwrap());
    /// sim.tick();
    /// assert_eq!(sim.get_tick(), 1);
    /// ```
    #[must_use]
    pub fn new(terrain: TerrainGrid) -> Self {
        Self::with_config(terrain, SimConfig::default())
    }

    /// Create a simulation with explicit tuning.
    #[must_use]
    pub fn with_config(terrain: TerrainGrid, config: SimConfig) -> Self {
        Self {
            tick: 0,
            world: World::new(terrain),
            processor: CommandProcessor::from_config(&config),
            config,
            pending: VecDeque::new(),
        }
    }

    /// Create a simulation with no map; call
    /// [`load_map`](Self::load_map) before spawning anything.
    #[must_use]
    pub fn unloaded(config: SimConfig) -> Self {
        Self::with_config(TerrainGrid::default(), config)
    }

    /// Get the current tick number.
    #[must_use]
    pub const fn get_tick(&self) -> u64 {
        self.tick
    }

    /// Terrain and entities.
    #[must_use]
    pub const fn world(&self) -> &World {
        &self.world
    }

    /// Get a reference to the entity storage.
    #[must_use]
    pub const fn entities(&self) -> &EntityStore {
        &self.world.entities
    }

    /// Get a reference to the terrain.
    #[must_use]
    pub const fn terrain(&self) -> &TerrainGrid {
        &self.world.terrain
    }

    /// Tuning in effect.
    #[must_use]
    pub const fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Get an entity by ID.
    #[must_use]
    pub fn get_entity(&self, id: EntityId) -> Option<&Entity> {
        self.world.entities.get(id)
    }

    /// Commands queued for the next tick.
    #[must_use]
    pub fn pending_commands(&self) -> usize {
        self.pending.len()
    }

    /// Replace the map before the match starts.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::MatchInProgress`] once any tick has run or any
    /// entity exists.
    pub fn load_map(&mut self, terrain: TerrainGrid) -> Result<()> {
        if self.tick > 0 || !self.world.entities.is_empty() {
            return Err(GameError::MatchInProgress);
        }
        tracing::info!(
            width = terrain.width(),
            height = terrain.height(),
            "Loaded map"
        );
        self.world.terrain = terrain;
        Ok(())
    }

    /// Spawn an entity immediately (match setup).
    ///
    /// # Errors
    ///
    /// See [`EntityStore::spawn`].
    pub fn spawn(&mut self, request: SpawnRequest) -> Result<EntityId> {
        self.world.spawn(request)
    }

    /// Remove an entity immediately.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::EntityNotFound`] if it does not exist.
    pub fn despawn(&mut self, id: EntityId) -> Result<()> {
        self.world.remove(id).map(|_| ())
    }

    /// Queue a command for the next tick.
    pub fn submit(&mut self, envelope: CommandEnvelope) {
        tracing::trace!(issuer = ?envelope.issuer, kind = ?envelope.command.kind(), "Command queued");
        self.pending.push_back(envelope);
    }

    /// Advance the simulation by one tick.
    ///
    /// Runs all systems in deterministic order and increments the tick
    /// counter. Returns the events generated during this tick.
    pub fn tick(&mut self) -> TickEvents {
        let mut events = TickEvents {
            tick: self.tick,
            ..TickEvents::default()
        };

        // 1. Commands
        while let Some(envelope) = self.pending.pop_front() {
            let report = self.processor.execute(&mut self.world, &envelope);
            events.command_reports.push(report);
        }

        let entity_ids = self.world.entities.sorted_ids();

        // 2. Movement
        self.run_movement_system(&entity_ids, &mut events);

        // 3. Combat
        self.run_combat_system(&entity_ids, &mut events);

        // 4. Health
        events.deaths = self.run_health_system(&entity_ids);

        self.tick += 1;

        #[cfg(any(debug_assertions, feature = "debug-validation"))]
        if let Err(error) = self.world.validate() {
            tracing::error!(tick = self.tick, %error, "World invariant violated");
        }

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            tracing::debug!(tick = self.tick, state_hash = hash, "Simulation state hash");
        }

        events
    }

    /// Advance every unit on a plain move order.
    fn run_movement_system(&mut self, entity_ids: &[EntityId], events: &mut TickEvents) {
        for &id in entity_ids {
            let moving = self
                .world
                .entities
                .get(id)
                .is_some_and(|e| matches!(e.motion, MotionState::Moving(_)));
            if moving {
                self.advance_unit(id, events);
            }
        }
    }

    /// Step a unit along its active path and handle the outcome.
    ///
    /// Only move orders report arrivals; finishing an attack approach is
    /// not a completed order.
    fn advance_unit(&mut self, id: EntityId, events: &mut TickEvents) {
        let on_move_order = self
            .world
            .entities
            .get(id)
            .is_some_and(|e| matches!(e.motion, MotionState::Moving(_)));
        match self.world.entities.advance(&self.world.terrain, id) {
            AdvanceOutcome::Arrived { .. } if on_move_order => events.arrivals.push(id),
            AdvanceOutcome::Arrived { .. } => {}
            AdvanceOutcome::Stalled { blocked_by, .. } => {
                events.stalls.push(id);
                self.resolve_stall(id, blocked_by, events);
            }
            AdvanceOutcome::Idle | AdvanceOutcome::Progressing | AdvanceOutcome::Moved { .. } => {}
        }
    }

    /// Replan a unit that has been stalled long enough, treating other
    /// units as obstacles. Each attempt, successful or not, uses up one
    /// replan; once none are left the unit abandons its order.
    ///
    /// When two moving units block each other, the higher ID gives way:
    /// a unit held up by a moving unit with a higher ID keeps waiting.
    fn resolve_stall(
        &mut self,
        id: EntityId,
        blocked_by: Option<EntityId>,
        events: &mut TickEvents,
    ) {
        let Some(entity) = self.world.entities.get(id) else {
            return;
        };
        let Some(path) = entity.motion.active_path() else {
            return;
        };
        if path.stalled_ticks < self.config.stall_replan_ticks {
            return;
        }
        let yields_to_blocker = blocked_by.is_some_and(|other| {
            other > id && self.world.entities.get(other).is_some_and(Entity::is_moving)
        });
        if yields_to_blocker {
            return;
        }

        let exhausted = path.replans >= self.config.max_replans;
        let goal = match &entity.motion {
            MotionState::Attacking(order) => self
                .world
                .entities
                .get(order.target)
                .map(|target| (target.tile, entity.weapon.map_or(0, |w| w.range))),
            _ => path.destination().map(|d| (d, 0)),
        };

        let route = if exhausted {
            None
        } else {
            goal.and_then(|(to, range)| {
                let group = HashSet::from([id]);
                let view = self.world.occupancy_view(&group);
                self.processor
                    .pathfinder()
                    .find_path_within(&view, entity.tile, to, range)
                    .ok()
            })
        };

        let Some(entity) = self.world.entities.get_mut(id) else {
            return;
        };
        match route {
            Some(route) => {
                if let Some(path) = entity.motion.active_path_mut() {
                    path.replace_route(route);
                }
                tracing::debug!(id, "Replanned around traffic");
                events.replans.push(id);
            }
            None if exhausted => {
                tracing::debug!(id, tile = %entity.tile, "Order abandoned after repeated stalls");
                entity.motion = MotionState::Idle;
                events.abandoned.push(id);
            }
            None => {
                if let Some(path) = entity.motion.active_path_mut() {
                    path.replans += 1;
                    path.stalled_ticks = 0;
                }
            }
        }
    }

    /// Chase and hit attack targets.
    ///
    /// Strikes within a tick are simultaneous: deaths are only applied by
    /// the health system afterwards, so a unit killed earlier in the pass
    /// still gets its strike this tick.
    fn run_combat_system(&mut self, entity_ids: &[EntityId], events: &mut TickEvents) {
        for &id in entity_ids {
            let Some(entity) = self.world.entities.get_mut(id) else {
                continue;
            };
            if let Some(weapon) = entity.weapon.as_mut() {
                weapon.cooldown_remaining = weapon.cooldown_remaining.saturating_sub(1);
            }
            let MotionState::Attacking(order) = &entity.motion else {
                continue;
            };
            let target_id = order.target;

            let in_range = match (
                self.world.entities.get(id),
                self.world.entities.get(target_id),
            ) {
                (Some(attacker), Some(target)) => attacker
                    .weapon
                    .map(|weapon| attacker.distance_to(target) <= weapon.range),
                _ => None,
            };

            match in_range {
                Some(true) => self.strike(id, target_id, events),
                Some(false) => self.chase(id, events),
                None => self.drop_attack(id, "target gone"),
            }
        }
    }

    /// Attack from range: stop approaching and fire when ready.
    fn strike(&mut self, id: EntityId, target_id: EntityId, events: &mut TickEvents) {
        let Some(attacker) = self.world.entities.get_mut(id) else {
            return;
        };
        if let MotionState::Attacking(order) = &mut attacker.motion {
            order.approach = None;
        }
        let Some(weapon) = attacker.weapon.as_mut() else {
            return;
        };
        if weapon.cooldown_remaining > 0 {
            return;
        }
        let damage = weapon.damage;

        let Some(target) = self.world.entities.get_mut(target_id) else {
            return;
        };
        if target.health.is_dead() {
            return;
        }
        let dealt = target.health.apply_damage(damage);
        let remaining_health = target.health.current;

        if let Some(weapon) = self
            .world
            .entities
            .get_mut(id)
            .and_then(|a| a.weapon.as_mut())
        {
            weapon.cooldown_remaining = weapon.cooldown;
        }

        tracing::trace!(attacker = id, target = target_id, dealt, remaining_health, "Hit");
        events.damage_events.push(DamageEvent {
            attacker: id,
            target: target_id,
            damage: dealt,
            remaining_health,
        });
    }

    /// Move toward an out-of-range target, replanning the approach
    /// periodically since the target may be moving.
    fn chase(&mut self, id: EntityId, events: &mut TickEvents) {
        let Some(attacker) = self.world.entities.get(id) else {
            return;
        };
        let MotionState::Attacking(order) = &attacker.motion else {
            return;
        };
        let needs_plan = order
            .approach
            .as_ref()
            .map_or(true, MovePath::is_complete)
            || order.ticks_since_plan >= self.config.chase_replan_interval;

        if needs_plan {
            let Some(target) = self.world.entities.get(order.target) else {
                return;
            };
            let range = attacker.weapon.map_or(0, |w| w.range);
            let planned = self.processor.pathfinder().find_path_within(
                &self.world.terrain,
                attacker.tile,
                target.tile,
                range,
            );

            match planned {
                Ok(route) => {
                    if let Some(MotionState::Attacking(order)) =
                        self.world.entities.get_mut(id).map(|a| &mut a.motion)
                    {
                        // Keep partial progress so frequent replans don't slow the chase.
                        let mut approach = MovePath::new(route);
                        if let Some(previous) = &order.approach {
                            approach.progress = previous.progress;
                        }
                        order.approach = Some(approach);
                        order.ticks_since_plan = 0;
                    }
                }
                Err(error) => {
                    tracing::debug!(id, %error, "Attack target unreachable");
                    self.drop_attack(id, "target unreachable");
                    events.abandoned.push(id);
                    return;
                }
            }
        }

        if let Some(MotionState::Attacking(order)) =
            self.world.entities.get_mut(id).map(|a| &mut a.motion)
        {
            order.ticks_since_plan += 1;
        }
        self.advance_unit(id, events);
    }

    fn drop_attack(&mut self, id: EntityId, reason: &str) {
        if let Some(entity) = self.world.entities.get_mut(id) {
            tracing::debug!(id, reason, "Attack order dropped");
            entity.motion = MotionState::Idle;
        }
    }

    /// Remove dead entities and cancel attacks aimed at them.
    fn run_health_system(&mut self, entity_ids: &[EntityId]) -> Vec<EntityId> {
        let dead: Vec<EntityId> = entity_ids
            .iter()
            .copied()
            .filter(|&id| self.world.entities.get(id).is_some_and(|e| e.health.is_dead()))
            .collect();

        for &id in &dead {
            if let Ok(entity) = self.world.remove(id) {
                tracing::info!(id, kind = %entity.kind, tile = %entity.tile, "Entity destroyed");
            }
        }

        if !dead.is_empty() {
            for id in self.world.entities.sorted_ids() {
                let targets_dead = self.world.entities.get(id).is_some_and(|e| {
                    matches!(&e.motion, MotionState::Attacking(order) if dead.contains(&order.target))
                });
                if targets_dead {
                    self.drop_attack(id, "target destroyed");
                }
            }
        }

        dead
    }

    /// Owned copy of the observable state.
    #[must_use]
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            tick: self.tick,
            width: self.world.terrain.width(),
            height: self.world.terrain.height(),
            tile_size: self.world.terrain.tile_size(),
            entities: self.world.entities.iter().map(EntitySnapshot::from).collect(),
        }
    }

    /// Calculate a hash of the current simulation state.
    ///
    /// Two simulations with identical state produce identical hashes.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.tick.hash(&mut hasher);
        self.world.terrain.hash(&mut hasher);

        // Entities in ascending ID order
        self.world.entities.len().hash(&mut hasher);
        for entity in self.world.entities.iter() {
            entity.hash(&mut hasher);
        }

        self.pending.hash(&mut hasher);
        hasher.finish()
    }

    /// Serialize the simulation state for network sync or determinism checks.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::Serialization(format!("Failed to serialize simulation: {e}")))
    }

    /// Deserialize simulation state from bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let mut sim: Self = bincode::deserialize(data).map_err(|e| {
            GameError::Serialization(format!("Failed to deserialize simulation: {e}"))
        })?;
        sim.processor = CommandProcessor::from_config(&sim.config);
        Ok(sim)
    }
}
