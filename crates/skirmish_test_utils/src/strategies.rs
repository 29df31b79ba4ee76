//! Proptest strategies for maps, unit layouts and order scripts.
//!
//! Everything generated stays on the map it is generated for, so failures
//! shrink toward small maps with few rocks and few orders.

use std::collections::BTreeSet;

use proptest::prelude::*;

use skirmish_core::entity::UnitType;
use skirmish_core::formation::FormationKind;
use skirmish_core::math::TilePos;
use skirmish_core::terrain::{CellType, TerrainGrid};

/// A group move issued at a given tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedOrder {
    /// Tick the order is submitted before.
    pub tick: u64,
    /// Indices into the scenario's unit list.
    pub units: Vec<usize>,
    /// Target tile.
    pub target: (i32, i32),
    /// Requested formation.
    pub formation: FormationKind,
}

/// Any tile on a `width` x `height` map.
pub fn arb_tile(width: u32, height: u32) -> impl Strategy<Value = (i32, i32)> {
    (0..width as i32, 0..height as i32)
}

/// Up to `max` rock tiles.
pub fn arb_rocks(width: u32, height: u32, max: usize) -> impl Strategy<Value = Vec<(i32, i32)>> {
    proptest::collection::vec(arb_tile(width, height), 0..=max)
}

/// Map with random rocks.
pub fn arb_map(width: u32, height: u32, max_rocks: usize) -> impl Strategy<Value = TerrainGrid> {
    arb_rocks(width, height, max_rocks).prop_map(move |rocks| {
        let mut map = TerrainGrid::new(width.max(1), height.max(1), 1).unwrap_or_default();
        for (x, y) in rocks {
            map.set_terrain(TilePos::new(x, y), CellType::Blocked);
        }
        map
    })
}

/// Between one and `max` distinct tiles, in ascending order.
pub fn arb_distinct_tiles(
    width: u32,
    height: u32,
    max: usize,
) -> impl Strategy<Value = Vec<(i32, i32)>> {
    proptest::collection::btree_set(arb_tile(width, height), 1..=max.max(1))
        .prop_map(|set: BTreeSet<(i32, i32)>| set.into_iter().collect())
}

/// Any unit type.
pub fn arb_unit_type() -> impl Strategy<Value = UnitType> {
    prop_oneof![
        Just(UnitType::Worker),
        Just(UnitType::Soldier),
        Just(UnitType::Scout),
    ]
}

/// Any formation.
pub fn arb_formation() -> impl Strategy<Value = FormationKind> {
    prop_oneof![
        Just(FormationKind::Box),
        Just(FormationKind::Line),
        Just(FormationKind::Spread),
    ]
}

/// A move order for a non-empty subset of `num_units` units.
pub fn arb_order(
    num_units: usize,
    width: u32,
    height: u32,
    max_tick: u64,
) -> impl Strategy<Value = ScriptedOrder> {
    (
        0..max_tick.max(1),
        proptest::collection::btree_set(0..num_units.max(1), 1..=num_units.max(1)),
        arb_tile(width, height),
        arb_formation(),
    )
        .prop_map(|(tick, units, target, formation)| ScriptedOrder {
            tick,
            units: units.into_iter().collect(),
            target,
            formation,
        })
}

/// Up to `max_orders` orders, sorted by tick.
pub fn arb_order_script(
    num_units: usize,
    width: u32,
    height: u32,
    max_tick: u64,
    max_orders: usize,
) -> impl Strategy<Value = Vec<ScriptedOrder>> {
    proptest::collection::vec(arb_order(num_units, width, height, max_tick), 0..=max_orders)
        .prop_map(|mut orders| {
            orders.sort_by_key(|o| o.tick);
            orders
        })
}
