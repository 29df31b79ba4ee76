//! Test fixtures and helpers.
//!
//! Pre-built maps, unit layouts and tick drivers for consistent testing.

use skirmish_core::entity::{EntityId, TeamId, UnitType};
use skirmish_core::interface::GameServer;
use skirmish_core::math::TilePos;
use skirmish_core::simulation::Simulation;
use skirmish_core::terrain::{CellType, TerrainGrid};

/// Fully walkable map.
///
/// # Panics
///
/// Panics if either dimension is zero.
#[must_use]
pub fn open_map(width: u32, height: u32) -> TerrainGrid {
    TerrainGrid::new(width, height, 1).expect("fixture map dimensions must be non-zero")
}

/// Map with rocks at the given tiles.
///
/// # Panics
///
/// Panics if either dimension is zero.
#[must_use]
pub fn map_with_rocks(width: u32, height: u32, rocks: &[(i32, i32)]) -> TerrainGrid {
    let mut map = open_map(width, height);
    for &(x, y) in rocks {
        map.set_terrain(TilePos::new(x, y), CellType::Blocked);
    }
    map
}

/// Map drawn as text rows, `#` marking rock.
///
/// # Panics
///
/// Panics on empty or ragged rows.
#[must_use]
pub fn ascii_map(rows: &[&str]) -> TerrainGrid {
    TerrainGrid::from_rows(rows).expect("fixture rows must be non-empty and equal length")
}

/// Vertical rock wall at column `x` with a single gap at row `gap_y`.
#[must_use]
pub fn wall_with_gap(width: u32, height: u32, x: i32, gap_y: i32) -> TerrainGrid {
    let rocks: Vec<(i32, i32)> = (0..height as i32)
        .filter(|&y| y != gap_y)
        .map(|y| (x, y))
        .collect();
    map_with_rocks(width, height, &rocks)
}

/// Spawn one unit per tile and return their IDs in spawn order.
///
/// # Panics
///
/// Panics if any tile cannot take a unit.
pub fn spawn_units(
    sim: &mut Simulation,
    unit: UnitType,
    team: TeamId,
    tiles: &[(i32, i32)],
) -> Vec<EntityId> {
    tiles
        .iter()
        .map(|&(x, y)| {
            sim.spawn_unit(unit, team, x, y)
                .unwrap_or_else(|e| panic!("fixture spawn at ({x}, {y}) failed: {e}"))
        })
        .collect()
}

/// Spawn a `cols` x `rows` block of units with its top-left unit at `origin`.
pub fn spawn_block(
    sim: &mut Simulation,
    unit: UnitType,
    team: TeamId,
    origin: (i32, i32),
    cols: i32,
    rows: i32,
) -> Vec<EntityId> {
    let tiles: Vec<(i32, i32)> = (0..rows)
        .flat_map(|dy| (0..cols).map(move |dx| (origin.0 + dx, origin.1 + dy)))
        .collect();
    spawn_units(sim, unit, team, &tiles)
}

/// Whether any unit is still walking or an order is waiting for the next tick.
#[must_use]
pub fn any_moving(sim: &Simulation) -> bool {
    sim.pending_commands() > 0 || sim.entities().iter().any(|e| e.is_moving())
}

/// Tick until no unit is walking and no order is pending. Returns the
/// ticks taken, or `None` if units were still walking after `max_ticks`.
pub fn run_until_idle(sim: &mut Simulation, max_ticks: u64) -> Option<u64> {
    for ticks in 0..=max_ticks {
        if !any_moving(sim) {
            return Some(ticks);
        }
        if ticks < max_ticks {
            sim.tick();
        }
    }
    None
}

/// Current tile of every unit, in ID order.
#[must_use]
pub fn unit_tiles(sim: &Simulation) -> Vec<(EntityId, TilePos)> {
    sim.entities()
        .iter()
        .filter(|e| e.is_unit())
        .map(|e| (e.id, e.tile))
        .collect()
}

/// Current tile of a unit.
///
/// # Panics
///
/// Panics if the entity does not exist.
#[must_use]
pub fn tile_of(sim: &Simulation, id: EntityId) -> TilePos {
    sim.get_entity_position(id)
        .unwrap_or_else(|| panic!("entity {id} does not exist"))
}
