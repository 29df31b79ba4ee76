//! Declarative scenario documents and the runner that replays them.
//!
//! A scenario names a map, the units and buildings placed before the first
//! tick, orders issued at given ticks and what must hold afterwards. The
//! runner drives any [`GameServer`] through its public interface only and
//! reports every expectation that failed, not just the first.
//!
//! Documents are JSON or RON with camelCase keys:
//!
//! ```json
//! {
//!   "name": "walk around a rock",
//!   "map": { "width": 20, "height": 11, "rocks": [[10, 5]] },
//!   "setup": [{ "ref": "w", "team": 1, "type": "worker", "x": 5, "y": 5 }],
//!   "actions": [{ "tick": 0, "order": { "move": { "units": ["w"], "x": 15, "y": 5 } } }],
//!   "expectations": {
//!     "maxTicks": 100,
//!     "positions": [{ "ref": "w", "x": 15, "y": 5 }],
//!     "avoidTiles": [{ "tiles": [[10, 5]] }],
//!     "allStop": true
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use skirmish_core::config::SimConfig;
use skirmish_core::entity::{BuildingType, EntityId, TeamId, UnitType};
use skirmish_core::error::GameError;
use skirmish_core::formation::FormationKind;
use skirmish_core::interface::GameServer;
use skirmish_core::math::TilePos;
use skirmish_core::simulation::Simulation;
use skirmish_core::terrain::{CellType, TerrainGrid};

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Malformed JSON document.
    #[error("Failed to parse scenario JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Malformed RON document.
    #[error("Failed to parse scenario RON: {0}")]
    Ron(#[from] ron::error::SpannedError),
    /// The document is well-formed but inconsistent.
    #[error("Invalid scenario: {0}")]
    Invalid(String),
    /// The server refused the map or a setup placement.
    #[error("Scenario setup failed: {0}")]
    Setup(#[from] GameError),
}

/// A complete scenario document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Terrain.
    pub map: MapSpec,
    /// Entities placed before the first tick.
    #[serde(default)]
    pub setup: Vec<Placement>,
    /// Orders keyed by the tick they are issued before.
    #[serde(default)]
    pub actions: Vec<Action>,
    /// What must hold once the run ends.
    #[serde(default)]
    pub expectations: Expectations,
}

/// Terrain as dimensions plus rock tiles, or as text rows (`#` = rock).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapSpec {
    /// Width in tiles; ignored when `rows` is given.
    #[serde(default)]
    pub width: u32,
    /// Height in tiles; ignored when `rows` is given.
    #[serde(default)]
    pub height: u32,
    /// Rock tiles as `[x, y]`.
    #[serde(default)]
    pub rocks: Vec<[i32; 2]>,
    /// Text rows, top row first.
    #[serde(default)]
    pub rows: Vec<String>,
}

impl MapSpec {
    /// Build the terrain grid.
    ///
    /// # Errors
    ///
    /// Fails on zero dimensions or ragged rows.
    pub fn build(&self) -> Result<TerrainGrid, GameError> {
        if !self.rows.is_empty() {
            let rows: Vec<&str> = self.rows.iter().map(String::as_str).collect();
            return TerrainGrid::from_rows(&rows);
        }
        let mut grid = TerrainGrid::new(self.width, self.height, 1)?;
        for &[x, y] in &self.rocks {
            if !grid.set_terrain(TilePos::new(x, y), CellType::Blocked) {
                return Err(GameError::OutOfBounds(TilePos::new(x, y)));
            }
        }
        Ok(grid)
    }
}

/// A unit or building placed during setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Name the rest of the document uses for this entity.
    #[serde(rename = "ref")]
    pub reference: String,
    /// Owning team.
    pub team: TeamId,
    /// Unit or building type name, e.g. `worker` or `barracks`.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Column (top-left tile for buildings).
    pub x: i32,
    /// Row (top-left tile for buildings).
    pub y: i32,
}

/// An order issued before a given tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Tick the order is issued before (0 = before the first tick).
    pub tick: u64,
    /// The order.
    pub order: Order,
}

/// Orders a scenario can issue, by entity reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Order {
    /// Group move.
    Move {
        /// Units to move.
        units: Vec<String>,
        /// Target column.
        x: i32,
        /// Target row.
        y: i32,
        /// Formation; box if omitted.
        #[serde(default)]
        formation: FormationKind,
    },
    /// Attack a target entity.
    Attack {
        /// Attacking units.
        units: Vec<String>,
        /// Target reference.
        target: String,
    },
    /// Place a building.
    Build {
        /// Builder.
        unit: String,
        /// Building type.
        building: BuildingType,
        /// Anchor column.
        x: i32,
        /// Anchor row.
        y: i32,
    },
}

/// Expected motion state at the end of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExpectedState {
    /// Still walking.
    Moving,
    /// Not walking.
    Stopped,
}

/// Final position of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionExpectation {
    /// Entity reference.
    #[serde(rename = "ref")]
    pub reference: String,
    /// Expected column.
    pub x: i32,
    /// Expected row.
    pub y: i32,
    /// Allowed Chebyshev distance from `(x, y)`; 0 means exact.
    #[serde(default)]
    pub tolerance: u32,
}

/// Final motion state of one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateExpectation {
    /// Unit reference.
    #[serde(rename = "ref")]
    pub reference: String,
    /// Expected state.
    pub state: ExpectedState,
}

/// Tiles a unit (or every unit) must never stand on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvoidExpectation {
    /// Unit reference; every placed unit if omitted.
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    /// Forbidden tiles as `[x, y]`.
    pub tiles: Vec<[i32; 2]>,
}

/// Whether an entity exists at the end of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistsExpectation {
    /// Entity reference.
    #[serde(rename = "ref")]
    pub reference: String,
    /// Expected existence.
    pub exists: bool,
}

/// Everything a scenario checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Expectations {
    /// Tick budget; the run never goes past it.
    pub max_ticks: u64,
    /// Final positions.
    pub positions: Vec<PositionExpectation>,
    /// Final motion states.
    pub states: Vec<StateExpectation>,
    /// Tiles that must never be entered.
    pub avoid_tiles: Vec<AvoidExpectation>,
    /// No two placed units on one tile after any tick.
    pub no_stacking: bool,
    /// Every unit stops within the budget.
    pub all_stop: bool,
    /// Final existence.
    pub exists: Vec<ExistsExpectation>,
    /// End the run early once every action is issued and no placed unit
    /// is walking. Turn off for fights, where units stand still while
    /// attacking.
    pub stop_when_idle: bool,
}

impl Default for Expectations {
    fn default() -> Self {
        Self {
            max_ticks: 200,
            positions: Vec::new(),
            states: Vec::new(),
            avoid_tiles: Vec::new(),
            no_stacking: false,
            all_stop: false,
            exists: Vec::new(),
            stop_when_idle: true,
        }
    }
}

impl Scenario {
    /// Load a scenario file; `.ron` files are read as RON, anything else
    /// as JSON.
    ///
    /// # Errors
    ///
    /// Fails if the file is missing, unreadable or malformed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("ron") => Self::from_ron_str(&contents),
            _ => Self::from_json_str(&contents),
        }
    }

    /// Parse a JSON document.
    ///
    /// # Errors
    ///
    /// Fails on malformed JSON.
    pub fn from_json_str(json: &str) -> Result<Self, ScenarioError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse a RON document.
    ///
    /// # Errors
    ///
    /// Fails on malformed RON.
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        Ok(ron::from_str(ron)?)
    }

    /// Tick of the last action, if any.
    #[must_use]
    pub fn last_action_tick(&self) -> Option<u64> {
        self.actions.iter().map(|a| a.tick).max()
    }
}

/// One expectation that did not hold.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpectationFailure {
    /// Final position outside the tolerance.
    #[error("{reference} ended at {actual:?}, expected {expected} (tolerance {tolerance})")]
    Position {
        /// Entity reference.
        reference: String,
        /// Expected tile.
        expected: TilePos,
        /// Observed tile, `None` if the entity is gone.
        actual: Option<TilePos>,
        /// Allowed distance.
        tolerance: u32,
    },
    /// Final motion state differs.
    #[error("{reference} expected {expected:?}, was {actual:?}")]
    State {
        /// Unit reference.
        reference: String,
        /// Expected state.
        expected: ExpectedState,
        /// Observed state.
        actual: ExpectedState,
    },
    /// A unit stood on a forbidden tile.
    #[error("{reference} entered avoided tile {tile} at tick {tick}")]
    EnteredAvoidedTile {
        /// Unit reference.
        reference: String,
        /// Forbidden tile.
        tile: TilePos,
        /// Tick it was observed there.
        tick: u64,
    },
    /// Two units shared a tile.
    #[error("{first} and {second} shared tile {tile} at tick {tick}")]
    Stacked {
        /// First unit reference.
        first: String,
        /// Second unit reference.
        second: String,
        /// Shared tile.
        tile: TilePos,
        /// Tick it was observed.
        tick: u64,
    },
    /// Units were still walking when the budget ran out.
    #[error("still moving after {ticks} ticks: {references:?}")]
    StillMoving {
        /// Ticks run.
        ticks: u64,
        /// Units still walking.
        references: Vec<String>,
    },
    /// Existence differs.
    #[error("{reference} expected to exist: {expected}")]
    Existence {
        /// Entity reference.
        reference: String,
        /// Expected existence.
        expected: bool,
    },
}

/// Result of replaying a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioOutcome {
    /// Scenario name.
    pub name: String,
    /// Ticks actually run.
    pub ticks_run: u64,
    /// Failed expectations, in check order.
    pub failures: Vec<ExpectationFailure>,
    /// Orders the server refused synchronously, with the reason.
    pub rejected_actions: Vec<String>,
    /// Final tile of every placed entity, `None` once destroyed.
    pub final_positions: BTreeMap<String, Option<TilePos>>,
}

impl ScenarioOutcome {
    /// Whether every expectation held.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    /// Assert that every expectation held.
    ///
    /// # Panics
    ///
    /// Panics listing every failure otherwise.
    pub fn assert_passed(&self) {
        if !self.passed() {
            let lines: Vec<String> = self.failures.iter().map(ToString::to_string).collect();
            panic!(
                "Scenario '{}' failed after {} ticks:\n  {}",
                self.name,
                self.ticks_run,
                lines.join("\n  ")
            );
        }
    }
}

/// Replays scenarios against a [`GameServer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ScenarioRunner;

impl ScenarioRunner {
    /// Replay `scenario` on a fresh [`Simulation`] with `config`.
    ///
    /// # Errors
    ///
    /// See [`ScenarioRunner::run`].
    pub fn run_simulation(
        &self,
        scenario: &Scenario,
        config: SimConfig,
    ) -> Result<ScenarioOutcome, ScenarioError> {
        let mut sim = Simulation::unloaded(config);
        self.run(&mut sim, scenario)
    }

    /// Replay `scenario` on `server`, which must not have a match running.
    ///
    /// The run stops after `maxTicks`, or earlier once every action has
    /// been issued and no placed unit is walking (unless `stopWhenIdle`
    /// is off).
    ///
    /// # Errors
    ///
    /// Fails if the map or a placement is refused, if a reference is
    /// duplicated or unknown, or if a type name is not recognised.
    pub fn run<S: GameServer>(
        &self,
        server: &mut S,
        scenario: &Scenario,
    ) -> Result<ScenarioOutcome, ScenarioError> {
        server.load_map(scenario.map.build()?)?;
        let refs = Self::place(server, &scenario.setup)?;
        Self::check_references(scenario, &refs)?;

        let mut observer = Observer::new(scenario, &refs);
        let mut rejected_actions = Vec::new();
        let budget = scenario.expectations.max_ticks;
        let last_action = scenario.last_action_tick();

        observer.observe(server, 0);
        let mut ticks_run = 0;
        while ticks_run < budget {
            for action in scenario.actions.iter().filter(|a| a.tick == ticks_run) {
                if let Err(e) = Self::issue(server, &refs, &action.order) {
                    tracing::debug!(tick = ticks_run, error = %e, "Scenario order refused");
                    rejected_actions.push(format!("tick {}: {e}", action.tick));
                }
            }
            server.tick();
            ticks_run += 1;
            observer.observe(server, ticks_run);

            let actions_done = last_action.map_or(true, |t| ticks_run > t);
            if scenario.expectations.stop_when_idle
                && actions_done
                && !observer.any_moving(server)
            {
                break;
            }
        }

        let mut failures = observer.failures;
        failures.extend(Self::check_final(server, scenario, &refs, ticks_run));

        let final_positions = refs
            .iter()
            .map(|(name, &id)| (name.clone(), server.get_entity_position(id)))
            .collect();

        tracing::info!(
            scenario = %scenario.name,
            ticks_run,
            failures = failures.len(),
            "Scenario finished"
        );

        Ok(ScenarioOutcome {
            name: scenario.name.clone(),
            ticks_run,
            failures,
            rejected_actions,
            final_positions,
        })
    }

    fn place<S: GameServer>(
        server: &mut S,
        setup: &[Placement],
    ) -> Result<BTreeMap<String, EntityId>, ScenarioError> {
        let mut refs = BTreeMap::new();
        for placement in setup {
            if refs.contains_key(&placement.reference) {
                return Err(ScenarioError::Invalid(format!(
                    "duplicate ref '{}'",
                    placement.reference
                )));
            }
            let id = if let Ok(unit) = UnitType::from_str(&placement.type_name) {
                server.spawn_unit(unit, placement.team, placement.x, placement.y)?
            } else if let Ok(building) = BuildingType::from_str(&placement.type_name) {
                server.spawn_building(building, placement.team, placement.x, placement.y)?
            } else {
                return Err(ScenarioError::Invalid(format!(
                    "unknown type '{}'",
                    placement.type_name
                )));
            };
            refs.insert(placement.reference.clone(), id);
        }
        Ok(refs)
    }

    fn check_references(
        scenario: &Scenario,
        refs: &BTreeMap<String, EntityId>,
    ) -> Result<(), ScenarioError> {
        let known = |r: &String| {
            if refs.contains_key(r) {
                Ok(())
            } else {
                Err(ScenarioError::Invalid(format!("unknown ref '{r}'")))
            }
        };

        for action in &scenario.actions {
            match &action.order {
                Order::Move { units, .. } => units.iter().try_for_each(known)?,
                Order::Attack { units, target } => {
                    units.iter().try_for_each(known)?;
                    known(target)?;
                }
                Order::Build { unit, .. } => known(unit)?,
            }
        }
        let expectations = &scenario.expectations;
        expectations
            .positions
            .iter()
            .map(|p| &p.reference)
            .chain(expectations.states.iter().map(|s| &s.reference))
            .chain(expectations.exists.iter().map(|e| &e.reference))
            .chain(expectations.avoid_tiles.iter().filter_map(|a| a.reference.as_ref()))
            .try_for_each(known)
    }

    fn issue<S: GameServer>(
        server: &mut S,
        refs: &BTreeMap<String, EntityId>,
        order: &Order,
    ) -> Result<(), GameError> {
        let lookup = |names: &[String]| -> Vec<EntityId> {
            names.iter().filter_map(|n| refs.get(n).copied()).collect()
        };
        match order {
            Order::Move {
                units,
                x,
                y,
                formation,
            } => server.move_units(&lookup(units), *x, *y, *formation),
            Order::Attack { units, target } => {
                let target = refs
                    .get(target)
                    .copied()
                    .ok_or_else(|| GameError::InvalidTarget(target.clone()))?;
                server.attack_target(&lookup(units), target)
            }
            Order::Build {
                unit,
                building,
                x,
                y,
            } => {
                let unit = refs
                    .get(unit)
                    .copied()
                    .ok_or_else(|| GameError::InvalidTarget(unit.clone()))?;
                server.build(unit, *building, *x, *y)
            }
        }
    }

    fn check_final<S: GameServer>(
        server: &S,
        scenario: &Scenario,
        refs: &BTreeMap<String, EntityId>,
        ticks_run: u64,
    ) -> Vec<ExpectationFailure> {
        let expectations = &scenario.expectations;
        let mut failures = Vec::new();
        let id_of = |r: &str| refs.get(r).copied().unwrap_or(EntityId::MAX);

        for expected in &expectations.positions {
            let target = TilePos::new(expected.x, expected.y);
            let actual = server.get_entity_position(id_of(&expected.reference));
            let within = actual.is_some_and(|t| t.chebyshev_distance(target) <= expected.tolerance);
            if !within {
                failures.push(ExpectationFailure::Position {
                    reference: expected.reference.clone(),
                    expected: target,
                    actual,
                    tolerance: expected.tolerance,
                });
            }
        }

        for expected in &expectations.states {
            let actual = if server.is_entity_moving(id_of(&expected.reference)) {
                ExpectedState::Moving
            } else {
                ExpectedState::Stopped
            };
            if actual != expected.state {
                failures.push(ExpectationFailure::State {
                    reference: expected.reference.clone(),
                    expected: expected.state,
                    actual,
                });
            }
        }

        if expectations.all_stop {
            let moving: Vec<String> = refs
                .iter()
                .filter(|&(_, &id)| server.is_entity_moving(id))
                .map(|(name, _)| name.clone())
                .collect();
            if !moving.is_empty() {
                failures.push(ExpectationFailure::StillMoving {
                    ticks: ticks_run,
                    references: moving,
                });
            }
        }

        for expected in &expectations.exists {
            if server.entity_exists(id_of(&expected.reference)) != expected.exists {
                failures.push(ExpectationFailure::Existence {
                    reference: expected.reference.clone(),
                    expected: expected.exists,
                });
            }
        }

        failures
    }
}

/// Per-tick checks: avoided tiles and stacking.
struct Observer<'a> {
    refs: &'a BTreeMap<String, EntityId>,
    /// Forbidden tiles per unit reference.
    avoid: Vec<(&'a str, Vec<TilePos>)>,
    no_stacking: bool,
    failures: Vec<ExpectationFailure>,
}

impl<'a> Observer<'a> {
    fn new(scenario: &'a Scenario, refs: &'a BTreeMap<String, EntityId>) -> Self {
        let mut avoid = Vec::new();
        for rule in &scenario.expectations.avoid_tiles {
            let tiles: Vec<TilePos> = rule.tiles.iter().map(|&[x, y]| TilePos::new(x, y)).collect();
            match &rule.reference {
                Some(r) => avoid.push((r.as_str(), tiles)),
                None => avoid.extend(refs.keys().map(|r| (r.as_str(), tiles.clone()))),
            }
        }
        Self {
            refs,
            avoid,
            no_stacking: scenario.expectations.no_stacking,
            failures: Vec::new(),
        }
    }

    fn observe<S: GameServer>(&mut self, server: &S, tick: u64) {
        for (reference, tiles) in &self.avoid {
            let Some(&id) = self.refs.get(*reference) else {
                continue;
            };
            let Some(tile) = server.get_entity_position(id) else {
                continue;
            };
            if tiles.contains(&tile) {
                self.failures.push(ExpectationFailure::EnteredAvoidedTile {
                    reference: (*reference).to_string(),
                    tile,
                    tick,
                });
            }
        }

        if self.no_stacking {
            let mut holders: HashMap<TilePos, &str> = HashMap::new();
            for (reference, &id) in self.refs {
                let Some(tile) = server.get_entity_position(id) else {
                    continue;
                };
                if let Some(first) = holders.insert(tile, reference.as_str()) {
                    self.failures.push(ExpectationFailure::Stacked {
                        first: first.to_string(),
                        second: reference.clone(),
                        tile,
                        tick,
                    });
                }
            }
        }
    }

    fn any_moving<S: GameServer>(&self, server: &S) -> bool {
        self.refs.values().any(|&id| server.is_entity_moving(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROCK_DETOUR: &str = r#"{
        "name": "rock detour",
        "map": { "width": 20, "height": 11, "rocks": [[10, 5]] },
        "setup": [{ "ref": "w", "team": 1, "type": "worker", "x": 5, "y": 5 }],
        "actions": [{ "tick": 0, "order": { "move": { "units": ["w"], "x": 15, "y": 5 } } }],
        "expectations": {
            "maxTicks": 100,
            "positions": [{ "ref": "w", "x": 15, "y": 5 }],
            "states": [{ "ref": "w", "state": "stopped" }],
            "avoidTiles": [{ "ref": "w", "tiles": [[10, 5]] }],
            "allStop": true
        }
    }"#;

    #[test]
    fn test_parse_json() {
        let scenario = Scenario::from_json_str(ROCK_DETOUR).unwrap();
        assert_eq!(scenario.name, "rock detour");
        assert_eq!(scenario.expectations.max_ticks, 100);
        assert_eq!(
            scenario.actions[0].order,
            Order::Move {
                units: vec!["w".into()],
                x: 15,
                y: 5,
                formation: FormationKind::Box,
            }
        );
        assert!(!scenario.expectations.no_stacking);
    }

    #[test]
    fn test_parse_ron() {
        let scenario = Scenario::from_ron_str(
            r#"(
                name: "ron",
                map: (rows: ["..#", "..."]),
                setup: [(ref: "s", team: 2, type: "scout", x: 0, y: 0)],
                actions: [(tick: 1, order: attack(units: ["s"], target: "s"))],
                expectations: (noStacking: true),
            )"#,
        )
        .unwrap();
        let map = scenario.map.build().unwrap();
        assert_eq!((map.width(), map.height()), (3, 2));
        assert!(map.is_terrain_blocked(TilePos::new(2, 0)));
        assert_eq!(scenario.expectations.max_ticks, 200);
        assert!(scenario.expectations.no_stacking);
    }

    #[test]
    fn test_rock_detour_passes() {
        let scenario = Scenario::from_json_str(ROCK_DETOUR).unwrap();
        let outcome = ScenarioRunner
            .run_simulation(&scenario, SimConfig::default())
            .unwrap();
        outcome.assert_passed();
        assert!(outcome.ticks_run < 100);
        assert_eq!(outcome.final_positions["w"], Some(TilePos::new(15, 5)));
    }

    #[test]
    fn test_failures_are_reported() {
        let mut scenario = Scenario::from_json_str(ROCK_DETOUR).unwrap();
        scenario.expectations.max_ticks = 3;
        scenario.expectations.positions[0].tolerance = 1;
        let outcome = ScenarioRunner
            .run_simulation(&scenario, SimConfig::default())
            .unwrap();
        assert!(!outcome.passed());
        assert_eq!(outcome.ticks_run, 3);
        assert!(outcome
            .failures
            .iter()
            .any(|f| matches!(f, ExpectationFailure::Position { .. })));
        assert!(outcome
            .failures
            .iter()
            .any(|f| matches!(f, ExpectationFailure::StillMoving { .. })));
        assert!(outcome.failures.iter().any(|f| matches!(
            f,
            ExpectationFailure::State {
                actual: ExpectedState::Moving,
                ..
            }
        )));
    }

    #[test]
    fn test_avoid_tile_violation_detected() {
        let mut scenario = Scenario::from_json_str(ROCK_DETOUR).unwrap();
        scenario.expectations.avoid_tiles = vec![AvoidExpectation {
            reference: None,
            tiles: vec![[6, 5], [6, 4], [6, 6]],
        }];
        let outcome = ScenarioRunner
            .run_simulation(&scenario, SimConfig::default())
            .unwrap();
        assert!(outcome.failures.iter().any(|f| matches!(
            f,
            ExpectationFailure::EnteredAvoidedTile { reference, .. } if reference == "w"
        )));
    }

    #[test]
    fn test_unknown_reference_rejected() {
        let mut scenario = Scenario::from_json_str(ROCK_DETOUR).unwrap();
        scenario.actions[0].order = Order::Move {
            units: vec!["ghost".into()],
            x: 1,
            y: 1,
            formation: FormationKind::Line,
        };
        let err = ScenarioRunner
            .run_simulation(&scenario, SimConfig::default())
            .unwrap_err();
        assert!(matches!(err, ScenarioError::Invalid(_)));
    }

    #[test]
    fn test_unknown_type_and_bad_placement() {
        let mut scenario = Scenario::from_json_str(ROCK_DETOUR).unwrap();
        scenario.setup[0].type_name = "dragon".into();
        assert!(matches!(
            ScenarioRunner.run_simulation(&scenario, SimConfig::default()),
            Err(ScenarioError::Invalid(_))
        ));

        let mut scenario = Scenario::from_json_str(ROCK_DETOUR).unwrap();
        scenario.setup[0].x = 10;
        assert!(matches!(
            ScenarioRunner.run_simulation(&scenario, SimConfig::default()),
            Err(ScenarioError::Setup(GameError::TerrainBlocked(_)))
        ));
    }

    #[test]
    fn test_out_of_bounds_order_is_recorded() {
        let mut scenario = Scenario::from_json_str(ROCK_DETOUR).unwrap();
        scenario.actions[0].order = Order::Move {
            units: vec!["w".into()],
            x: 50,
            y: 5,
            formation: FormationKind::Box,
        };
        scenario.expectations.positions[0].x = 5;
        let outcome = ScenarioRunner
            .run_simulation(&scenario, SimConfig::default())
            .unwrap();
        assert_eq!(outcome.rejected_actions.len(), 1);
        outcome.assert_passed();
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("detour.json");
        std::fs::write(&json, ROCK_DETOUR).unwrap();
        assert_eq!(Scenario::load(&json).unwrap().name, "rock detour");

        let ron_path = dir.path().join("tiny.ron");
        std::fs::write(&ron_path, r#"(name: "tiny", map: (width: 2, height: 2))"#).unwrap();
        assert_eq!(Scenario::load(&ron_path).unwrap().name, "tiny");

        assert!(matches!(
            Scenario::load(dir.path().join("missing.json")),
            Err(ScenarioError::FileNotFound(_))
        ));
    }
}
