//! Movement invariants checked between ticks.
//!
//! The checks read only public state, so they work on any
//! [`Simulation`] a test builds, and they report every violation found
//! instead of stopping at the first.

use std::collections::HashMap;

use skirmish_core::math::TilePos;
use skirmish_core::pathfinding::is_valid_path;
use skirmish_core::simulation::Simulation;

/// Every tile holds at most one unit, and no unit stands on rock or on a
/// building.
pub fn check_no_stacking(sim: &Simulation) -> Result<(), Vec<String>> {
    let mut seen: HashMap<TilePos, u64> = HashMap::new();
    let mut problems = Vec::new();

    for entity in sim.entities().iter().filter(|e| e.is_unit()) {
        if let Some(other) = seen.insert(entity.tile, entity.id) {
            problems.push(format!(
                "units {other} and {} share tile {}",
                entity.id, entity.tile
            ));
        }
        if !sim.terrain().is_passable(entity.tile) {
            problems.push(format!(
                "unit {} stands on impassable tile {}",
                entity.id, entity.tile
            ));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems)
    }
}

/// Every route being walked starts where its unit stands and is a chain of
/// adjacent open tiles.
pub fn check_paths_valid(sim: &Simulation) -> Result<(), Vec<String>> {
    let mut problems = Vec::new();

    for entity in sim.entities().iter() {
        let Some(path) = entity.motion.active_path() else {
            continue;
        };
        let remaining = &path.tiles()[path.index()..];
        if remaining.first() != Some(&entity.tile) {
            problems.push(format!(
                "unit {} at {} walks a route positioned at {:?}",
                entity.id,
                entity.tile,
                remaining.first()
            ));
        }
        // A building placed after planning blocks the route until the next
        // stall replan; only routes over bare terrain must be open.
        let crosses_building = remaining
            .iter()
            .any(|&t| sim.terrain().building_at(t).is_some());
        if !crosses_building && !is_valid_path(sim.terrain(), remaining) {
            problems.push(format!("unit {} has a broken route", entity.id));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems)
    }
}

/// Run both checks.
pub fn check_all(sim: &Simulation) -> Result<(), Vec<String>> {
    let mut problems = Vec::new();
    if let Err(mut p) = check_no_stacking(sim) {
        problems.append(&mut p);
    }
    if let Err(mut p) = check_paths_valid(sim) {
        problems.append(&mut p);
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems)
    }
}
