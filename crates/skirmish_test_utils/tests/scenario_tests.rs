//! Replays the bundled scenario documents.

use std::path::PathBuf;

use skirmish_core::config::SimConfig;
use skirmish_core::entity::{BuildingType, EntityId, TeamId, UnitType};
use skirmish_core::error::Result;
use skirmish_core::formation::FormationKind;
use skirmish_core::interface::GameServer;
use skirmish_core::math::TilePos;
use skirmish_core::simulation::{Simulation, TickEvents};
use skirmish_core::terrain::TerrainGrid;
use skirmish_test_utils::scenario::{Scenario, ScenarioOutcome, ScenarioRunner};

fn scenario_path(file: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("scenarios")
        .join(file)
}

fn run(file: &str) -> ScenarioOutcome {
    let scenario = Scenario::load(scenario_path(file)).unwrap();
    ScenarioRunner
        .run_simulation(&scenario, SimConfig::default())
        .unwrap()
}

#[test]
fn test_rock_detour() {
    let outcome = run("rock_detour.json");
    outcome.assert_passed();
    assert!(outcome.ticks_run <= 100);
}

#[test]
fn test_move_onto_rock_leaves_unit_idle() {
    let outcome = run("move_onto_rock.json");
    outcome.assert_passed();
    assert!(outcome.rejected_actions.is_empty());
}

#[test]
fn test_walled_in_unit_does_not_hold_back_its_group() {
    let outcome = run("walled_in_batch.json");
    outcome.assert_passed();
    assert!(outcome.rejected_actions.is_empty());
    assert_ne!(outcome.final_positions["free"], Some(TilePos::new(1, 6)));
}

#[test]
fn test_box_of_five() {
    let outcome = run("box_five.json");
    outcome.assert_passed();

    let mut tiles: Vec<TilePos> = outcome.final_positions.values().flatten().copied().collect();
    tiles.sort_unstable();
    tiles.dedup();
    assert_eq!(tiles.len(), 5);
}

#[test]
fn test_soldiers_destroy_generator() {
    let outcome = run("skirmish.ron");
    outcome.assert_passed();
    assert_eq!(outcome.final_positions["gen"], None);
}

#[test]
fn test_scenarios_are_deterministic() {
    for file in ["rock_detour.json", "box_five.json", "skirmish.ron"] {
        assert_eq!(run(file), run(file), "{file} replayed differently");
    }
}

/// Counts ticks on the way through to a real simulation.
struct CountingServer {
    inner: Simulation,
    ticks: u64,
}

impl GameServer for CountingServer {
    fn load_map(&mut self, terrain: TerrainGrid) -> Result<()> {
        self.inner.load_map(terrain)
    }

    fn spawn_unit(&mut self, unit: UnitType, team: TeamId, x: i32, y: i32) -> Result<EntityId> {
        self.inner.spawn_unit(unit, team, x, y)
    }

    fn spawn_building(
        &mut self,
        building: BuildingType,
        team: TeamId,
        x: i32,
        y: i32,
    ) -> Result<EntityId> {
        self.inner.spawn_building(building, team, x, y)
    }

    fn tick(&mut self) -> TickEvents {
        self.ticks += 1;
        GameServer::tick(&mut self.inner)
    }

    fn get_entity_position(&self, id: EntityId) -> Option<TilePos> {
        self.inner.get_entity_position(id)
    }

    fn is_entity_moving(&self, id: EntityId) -> bool {
        self.inner.is_entity_moving(id)
    }

    fn entity_exists(&self, id: EntityId) -> bool {
        self.inner.entity_exists(id)
    }

    fn get_entity_team(&self, id: EntityId) -> Option<TeamId> {
        self.inner.get_entity_team(id)
    }

    fn move_units(
        &mut self,
        ids: &[EntityId],
        x: i32,
        y: i32,
        formation: FormationKind,
    ) -> Result<()> {
        self.inner.move_units(ids, x, y, formation)
    }

    fn attack_target(&mut self, ids: &[EntityId], target: EntityId) -> Result<()> {
        self.inner.attack_target(ids, target)
    }

    fn build(&mut self, unit: EntityId, building: BuildingType, x: i32, y: i32) -> Result<()> {
        self.inner.build(unit, building, x, y)
    }
}

#[test]
fn test_runner_drives_any_game_server() {
    let scenario = Scenario::load(scenario_path("rock_detour.json")).unwrap();
    let mut server = CountingServer {
        inner: Simulation::unloaded(SimConfig::default()),
        ticks: 0,
    };
    let outcome = ScenarioRunner.run(&mut server, &scenario).unwrap();
    outcome.assert_passed();
    assert_eq!(server.ticks, outcome.ticks_run);
}
