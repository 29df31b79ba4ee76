//! Multi-unit formation planning.
//!
//! Given a group of units and a target tile, the planner computes one
//! destination tile per unit. Directional shapes (`box`, `line`) are
//! oriented along the group's direction of travel with their tip on the
//! target; `spread` is laid out in rings around the target.
//!
//! The planner is pure: it reads passability and returns assignments,
//! leaving all mutation to the command processor.

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::error::GameError;
use crate::math::{ceil_sqrt, Fixed, TilePos, Vec2Fixed};
use crate::terrain::Passability;

/// Formation shapes a group move can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormationKind {
    /// Near-square grid, `ceil(sqrt(n))` wide, front row at the target.
    #[default]
    Box,
    /// Single file trailing back from the target along the travel axis.
    Line,
    /// Rings around the target with gaps between units; no orientation.
    Spread,
}

impl FromStr for FormationKind {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "box" => Ok(Self::Box),
            "line" => Ok(Self::Line),
            "spread" => Ok(Self::Spread),
            other => Err(GameError::UnknownType(other.to_string())),
        }
    }
}

/// Eight compass directions. North is toward row 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// -y
    North,
    /// +x, -y
    NorthEast,
    /// +x
    East,
    /// +x, +y
    SouthEast,
    /// +y
    South,
    /// -x, +y
    SouthWest,
    /// -x
    West,
    /// -x, -y
    NorthWest,
}

impl Direction {
    /// Direction used when the group already stands on the target.
    pub const CANONICAL: Self = Self::East;

    /// Classify a travel vector into one of eight buckets.
    ///
    /// An axis dominates when it is more than twice the other; otherwise
    /// the vector is diagonal. The zero vector maps to [`Self::CANONICAL`].
    #[must_use]
    pub fn classify(v: Vec2Fixed) -> Self {
        if v.is_zero() {
            return Self::CANONICAL;
        }
        let ax = v.x.abs();
        let ay = v.y.abs();
        let two = Fixed::from_num(2);
        let east = v.x > Fixed::ZERO;
        let south = v.y > Fixed::ZERO;

        if ax > ay * two {
            if east {
                Self::East
            } else {
                Self::West
            }
        } else if ay > ax * two {
            if south {
                Self::South
            } else {
                Self::North
            }
        } else {
            match (east, south) {
                (true, true) => Self::SouthEast,
                (true, false) => Self::NorthEast,
                (false, true) => Self::SouthWest,
                (false, false) => Self::NorthWest,
            }
        }
    }

    /// Unit tile step in this direction.
    #[must_use]
    pub const fn offset(self) -> (i32, i32) {
        match self {
            Self::North => (0, -1),
            Self::NorthEast => (1, -1),
            Self::East => (1, 0),
            Self::SouthEast => (1, 1),
            Self::South => (0, 1),
            Self::SouthWest => (-1, 1),
            Self::West => (-1, 0),
            Self::NorthWest => (-1, -1),
        }
    }

    /// Check if this is an ordinal (diagonal) direction.
    #[must_use]
    pub const fn is_diagonal(self) -> bool {
        let (dx, dy) = self.offset();
        dx != 0 && dy != 0
    }
}

/// Result of planning a formation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FormationPlan {
    /// Destination per unit; all destinations are distinct.
    pub assignments: BTreeMap<EntityId, TilePos>,
    /// Units for which no free destination was found.
    pub unassigned: Vec<EntityId>,
    /// Travel direction the shape was oriented to (`None` for spread).
    pub direction: Option<Direction>,
}

/// Formation planning capability.
pub trait FormationPlanner {
    /// Assign a destination to each unit in `units` (`(id, current tile)`).
    fn plan(
        &self,
        map: &dyn Passability,
        kind: FormationKind,
        target: TilePos,
        units: &[(EntityId, TilePos)],
    ) -> FormationPlan;
}

/// Default planner laying shapes out on the tile grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridFormationPlanner {
    /// How far (Chebyshev) a blocked slot may be moved to a free tile.
    pub search_radius: u32,
    /// Tile gap between neighbouring units in a spread.
    pub spread_spacing: u32,
}

impl Default for GridFormationPlanner {
    fn default() -> Self {
        Self {
            search_radius: 6,
            spread_spacing: 2,
        }
    }
}

impl GridFormationPlanner {
    /// Ideal slots for a box, front row first, centre columns first.
    fn box_slots(count: usize, tip: TilePos, dir: Direction) -> Vec<TilePos> {
        let side = ceil_sqrt(count).max(1);
        let side_i = side as i32;
        let (fx, fy) = dir.offset();

        if dir.is_diagonal() {
            // Axis-aligned square with its corner on the tip, extending
            // back along both axes.
            let mut cells: Vec<(i32, i32)> = (0..side_i)
                .flat_map(|r| (0..side_i).map(move |c| (r, c)))
                .collect();
            cells.sort_by_key(|&(r, c)| (r + c, (r - c).abs(), r));
            return cells
                .into_iter()
                .take(count)
                .map(|(r, c)| tip.offset(-fx * c, -fy * r))
                .collect();
        }

        let (lx, ly) = (-fy, fx);
        let first = -((side_i - 1) / 2);
        let mut lateral: Vec<i32> = (first..first + side_i).collect();
        lateral.sort_by_key(|&o| (o.abs(), o));

        let rows = count.div_ceil(side) as i32;
        (0..rows)
            .flat_map(|r| {
                lateral
                    .iter()
                    .map(move |&o| tip.offset(lx * o - fx * r, ly * o - fy * r))
            })
            .take(count)
            .collect()
    }

    /// Ideal slots for a single file trailing back from the tip.
    fn line_slots(count: usize, tip: TilePos, dir: Direction) -> Vec<TilePos> {
        let (fx, fy) = dir.offset();
        (0..count as i32)
            .map(|k| tip.offset(-fx * k, -fy * k))
            .collect()
    }

    /// Ideal slots in spaced rings around the centre, innermost first.
    fn spread_slots(&self, count: usize, centre: TilePos) -> Vec<TilePos> {
        let spacing = self.spread_spacing.max(1) as i32;
        let mut slots = Vec::with_capacity(count);
        let mut ring = 0i32;
        while slots.len() < count {
            let mut ring_cells: Vec<(i32, i32)> = ring_offsets(ring);
            ring_cells.sort_by_key(|&(dx, dy)| (dx * dx + dy * dy, dy, dx));
            slots.extend(
                ring_cells
                    .into_iter()
                    .map(|(dx, dy)| centre.offset(dx * spacing, dy * spacing)),
            );
            ring += 1;
        }
        slots.truncate(count);
        slots
    }

    /// Move each ideal slot to a free passable tile, dropping slots with
    /// no free tile within the search radius. Output tiles are distinct.
    fn resolve_slots(
        &self,
        map: &dyn Passability,
        ideal: &[TilePos],
        target: TilePos,
    ) -> Vec<TilePos> {
        let mut taken: HashSet<TilePos> = HashSet::new();
        let mut resolved = Vec::with_capacity(ideal.len());

        for &slot in ideal {
            let free = |t: TilePos, taken: &HashSet<TilePos>| map.is_passable(t) && !taken.contains(&t);

            let chosen = if free(slot, &taken) {
                Some(slot)
            } else {
                (1..=self.search_radius as i32).find_map(|radius| {
                    let mut ring: Vec<TilePos> = ring_offsets(radius)
                        .into_iter()
                        .map(|(dx, dy)| slot.offset(dx, dy))
                        .collect();
                    ring.sort_by_key(|t| {
                        (t.distance_squared(slot), t.distance_squared(target), t.y, t.x)
                    });
                    ring.into_iter().find(|&t| free(t, &taken))
                })
            };

            if let Some(tile) = chosen {
                taken.insert(tile);
                resolved.push(tile);
            }
        }

        resolved
    }
}

/// Offsets at exactly Chebyshev distance `radius` from the origin.
fn ring_offsets(radius: i32) -> Vec<(i32, i32)> {
    if radius == 0 {
        return vec![(0, 0)];
    }
    (-radius..=radius)
        .flat_map(|dy| (-radius..=radius).map(move |dx| (dx, dy)))
        .filter(|&(dx, dy)| dx.abs() == radius || dy.abs() == radius)
        .collect()
}

impl FormationPlanner for GridFormationPlanner {
    fn plan(
        &self,
        map: &dyn Passability,
        kind: FormationKind,
        target: TilePos,
        units: &[(EntityId, TilePos)],
    ) -> FormationPlan {
        let mut plan = FormationPlan::default();
        if units.is_empty() {
            return plan;
        }

        let positions: Vec<TilePos> = units.iter().map(|&(_, t)| t).collect();
        let direction = Vec2Fixed::centroid(&positions)
            .map_or(Direction::CANONICAL, |c| {
                Direction::classify(target.to_vec2() - c)
            });

        let ideal = match kind {
            FormationKind::Box => Self::box_slots(units.len(), target, direction),
            FormationKind::Line => Self::line_slots(units.len(), target, direction),
            FormationKind::Spread => self.spread_slots(units.len(), target),
        };
        plan.direction = (kind != FormationKind::Spread).then_some(direction);

        let slots = self.resolve_slots(map, &ideal, target);

        // Front slots first: each takes the nearest remaining unit, so the
        // most forward unit lands on the tip.
        let mut remaining: Vec<(EntityId, TilePos)> = units.to_vec();
        for slot in slots {
            let Some(best) = remaining
                .iter()
                .enumerate()
                .min_by_key(|(_, unit)| (unit.1.distance_squared(slot), unit.0))
                .map(|(i, _)| i)
            else {
                break;
            };
            let (id, _) = remaining.swap_remove(best);
            plan.assignments.insert(id, slot);
        }

        plan.unassigned = remaining.into_iter().map(|(id, _)| id).collect();
        plan.unassigned.sort_unstable();

        tracing::trace!(
            ?kind,
            ?direction,
            %target,
            assigned = plan.assignments.len(),
            unassigned = plan.unassigned.len(),
            "Planned formation"
        );

        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::{CellType, TerrainGrid};

    fn tile(x: i32, y: i32) -> TilePos {
        TilePos::new(x, y)
    }

    fn units(tiles: &[(i32, i32)]) -> Vec<(EntityId, TilePos)> {
        tiles
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| (i as EntityId + 1, tile(x, y)))
            .collect()
    }

    fn assert_distinct(plan: &FormationPlan) {
        let set: HashSet<_> = plan.assignments.values().collect();
        assert_eq!(set.len(), plan.assignments.len(), "duplicate destinations");
    }

    #[test]
    fn test_direction_classification() {
        let v = |x: i32, y: i32| Vec2Fixed::new(Fixed::from_num(x), Fixed::from_num(y));
        assert_eq!(Direction::classify(v(10, 0)), Direction::East);
        assert_eq!(Direction::classify(v(-10, 1)), Direction::West);
        assert_eq!(Direction::classify(v(0, 7)), Direction::South);
        assert_eq!(Direction::classify(v(1, -9)), Direction::North);
        assert_eq!(Direction::classify(v(5, 5)), Direction::SouthEast);
        assert_eq!(Direction::classify(v(-4, -3)), Direction::NorthWest);
        assert_eq!(Direction::classify(v(3, -4)), Direction::NorthEast);
        assert_eq!(Direction::classify(Vec2Fixed::ZERO), Direction::CANONICAL);
    }

    #[test]
    fn test_line_horizontal_is_single_row() {
        let grid = TerrainGrid::new(30, 20, 1).unwrap();
        let group = units(&[(2, 4), (2, 5), (2, 6)]);
        let plan = GridFormationPlanner::default().plan(&grid, FormationKind::Line, tile(12, 5), &group);

        assert_eq!(plan.direction, Some(Direction::East));
        assert_eq!(plan.assignments.len(), 3);
        assert!(plan.assignments.values().all(|t| t.y == 5));
        assert!(plan.assignments.values().any(|&t| t == tile(12, 5)));
        assert_distinct(&plan);
    }

    #[test]
    fn test_line_vertical_is_single_column() {
        let grid = TerrainGrid::new(20, 30, 1).unwrap();
        let group = units(&[(4, 25), (5, 25), (6, 25), (5, 26)]);
        let plan = GridFormationPlanner::default().plan(&grid, FormationKind::Line, tile(5, 3), &group);

        assert_eq!(plan.direction, Some(Direction::North));
        assert!(plan.assignments.values().all(|t| t.x == 5));
        let mut rows: Vec<i32> = plan.assignments.values().map(|t| t.y).collect();
        rows.sort_unstable();
        assert_eq!(rows, vec![3, 4, 5, 6]);
    }

    #[test]
    fn test_line_diagonal() {
        let grid = TerrainGrid::new(30, 30, 1).unwrap();
        let group = units(&[(1, 1), (2, 1), (1, 2)]);
        let plan = GridFormationPlanner::default().plan(&grid, FormationKind::Line, tile(15, 15), &group);
        assert_eq!(plan.direction, Some(Direction::SouthEast));
        let mut slots: Vec<TilePos> = plan.assignments.values().copied().collect();
        slots.sort();
        assert_eq!(slots, vec![tile(13, 13), tile(14, 14), tile(15, 15)]);
    }

    #[test]
    fn test_box_tip_on_target_and_extends_backward() {
        let grid = TerrainGrid::new(40, 20, 1).unwrap();
        let group = units(&[(2, 9), (2, 10), (3, 10), (2, 11), (3, 11)]);
        let target = tile(20, 10);
        let plan = GridFormationPlanner::default().plan(&grid, FormationKind::Box, target, &group);

        assert_eq!(plan.assignments.len(), 5);
        assert_distinct(&plan);
        // The most forward unit (id 3 at (3,10)) takes the tip.
        assert_eq!(plan.assignments.get(&3), Some(&target));
        // Box is 3 wide: front row at x=20, back row at x=19; nothing ahead.
        assert!(plan.assignments.values().all(|t| t.x == 20 || t.x == 19));
        assert!(plan.assignments.values().all(|t| (9..=11).contains(&t.y)));
    }

    #[test]
    fn test_box_diagonal_corner_at_tip() {
        let grid = TerrainGrid::new(30, 30, 1).unwrap();
        let group = units(&[(20, 20), (21, 20), (20, 21), (21, 21)]);
        let target = tile(5, 5);
        let plan = GridFormationPlanner::default().plan(&grid, FormationKind::Box, target, &group);

        assert_eq!(plan.direction, Some(Direction::NorthWest));
        let mut slots: Vec<TilePos> = plan.assignments.values().copied().collect();
        slots.sort();
        assert_eq!(slots, vec![tile(5, 5), tile(5, 6), tile(6, 5), tile(6, 6)]);
    }

    #[test]
    fn test_spread_is_spaced_around_target() {
        let grid = TerrainGrid::new(30, 30, 1).unwrap();
        let group = units(&[(1, 1), (2, 1), (3, 1), (4, 1), (5, 1)]);
        let target = tile(15, 15);
        let plan = GridFormationPlanner::default().plan(&grid, FormationKind::Spread, target, &group);

        assert_eq!(plan.direction, None);
        assert_eq!(plan.assignments.len(), 5);
        assert!(plan.assignments.values().any(|&t| t == target));
        for &slot in plan.assignments.values() {
            assert_eq!((slot.x - target.x) % 2, 0);
            assert_eq!((slot.y - target.y) % 2, 0);
        }
        assert_distinct(&plan);
    }

    #[test]
    fn test_blocked_slot_is_redirected() {
        let mut grid = TerrainGrid::new(20, 20, 1).unwrap();
        grid.set_terrain(tile(10, 10), CellType::Blocked);
        let group = units(&[(1, 10), (1, 11)]);
        let plan = GridFormationPlanner::default().plan(&grid, FormationKind::Line, tile(10, 10), &group);

        assert_eq!(plan.assignments.len(), 2);
        assert_distinct(&plan);
        for &slot in plan.assignments.values() {
            assert!(grid.is_passable(slot));
            assert!(slot.chebyshev_distance(tile(10, 10)) <= 2);
        }
    }

    #[test]
    fn test_crowded_area_leaves_units_unassigned() {
        // A walled pocket with room for only two of the three file slots.
        let grid = TerrainGrid::from_rows(&[
            ".........",
            "..#####..",
            "..#...#..",
            "..#####..",
            ".........",
        ])
        .unwrap();
        let planner = GridFormationPlanner {
            search_radius: 0,
            spread_spacing: 2,
        };
        let group = units(&[(0, 0), (1, 0), (0, 4)]);
        let plan = planner.plan(&grid, FormationKind::Line, tile(4, 2), &group);

        assert!(!plan.assignments.is_empty());
        assert_eq!(plan.assignments.len() + plan.unassigned.len(), 3);
        assert!(!plan.unassigned.is_empty());
        assert_distinct(&plan);
    }

    #[test]
    fn test_units_already_at_target_use_canonical_direction() {
        let grid = TerrainGrid::new(20, 20, 1).unwrap();
        let group = units(&[(10, 10), (10, 10)]);
        let plan = GridFormationPlanner::default().plan(&grid, FormationKind::Line, tile(10, 10), &group);
        assert_eq!(plan.direction, Some(Direction::CANONICAL));
        let mut slots: Vec<TilePos> = plan.assignments.values().copied().collect();
        slots.sort();
        assert_eq!(slots, vec![tile(9, 10), tile(10, 10)]);
    }

    #[test]
    fn test_formation_kind_parses() {
        assert_eq!("box".parse::<FormationKind>(), Ok(FormationKind::Box));
        assert_eq!("LINE".parse::<FormationKind>(), Ok(FormationKind::Line));
        assert!("wedge".parse::<FormationKind>().is_err());
    }
}
