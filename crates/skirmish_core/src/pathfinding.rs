//! Grid-based pathfinding using the A* algorithm.
//!
//! Costs are fixed-point so that every server computes the same routes,
//! and the open set is ordered with an explicit tie breaker so repeated
//! queries against the same grid return identical paths.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use thiserror::Error;

use crate::error::GameError;
use crate::math::{Fixed, TilePos};
use crate::terrain::Passability;

/// Reasons a path query can fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// Start or goal tile lies outside the map.
    #[error("Tile {0} is outside the grid")]
    OutOfBounds(TilePos),
    /// The start tile is impassable.
    #[error("Start tile {0} is blocked")]
    StartBlocked(TilePos),
    /// The goal tile is impassable; approaching it is not enough.
    #[error("Goal tile {0} is blocked")]
    GoalBlocked(TilePos),
    /// Every route to the goal is cut off.
    #[error("No path from {from} to {to}")]
    Unreachable {
        /// Start tile.
        from: TilePos,
        /// Goal tile.
        to: TilePos,
    },
}

impl From<PathError> for GameError {
    fn from(err: PathError) -> Self {
        match err {
            PathError::OutOfBounds(tile) => GameError::OutOfBounds(tile),
            PathError::GoalBlocked(tile) => GameError::TerrainBlocked(tile),
            PathError::StartBlocked(from) => GameError::NoPath { from, to: from },
            PathError::Unreachable { from, to } => GameError::NoPath { from, to },
        }
    }
}

/// Route planning capability.
///
/// Returned routes start with `from` and end with the goal tile, and every
/// tile on them is passable on `map`.
pub trait Pathfinder {
    /// Find a route from `from` to exactly `to`.
    ///
    /// # Errors
    ///
    /// Fails if either tile is out of bounds, if `to` (or `from`) is
    /// impassable, or if no route exists.
    fn find_path(
        &self,
        map: &dyn Passability,
        from: TilePos,
        to: TilePos,
    ) -> Result<Vec<TilePos>, PathError>;

    /// Find a route to the nearest passable tile within Chebyshev `range`
    /// of `to`. The tile `to` itself may be impassable (e.g. a building).
    ///
    /// # Errors
    ///
    /// Fails if `from` is out of bounds or blocked, or no such tile is reachable.
    fn find_path_within(
        &self,
        map: &dyn Passability,
        from: TilePos,
        to: TilePos,
        range: u32,
    ) -> Result<Vec<TilePos>, PathError>;
}

/// A node in the A* open set priority queue.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct AStarNode {
    tile: TilePos,
    /// f_score = g_score + heuristic
    f_score: Fixed,
    /// Remaining estimate, prefers nodes closer to the goal on equal f.
    h_score: Fixed,
    /// Tie-breaker for determinism: lower row, then lower column first.
    tie_breaker: u64,
}

impl Ord for AStarNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap, so compare in reverse for min-heap behavior.
        other
            .f_score
            .cmp(&self.f_score)
            .then_with(|| other.h_score.cmp(&self.h_score))
            .then_with(|| other.tie_breaker.cmp(&self.tie_breaker))
    }
}

impl PartialOrd for AStarNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Direction offsets, cardinals first so 4-way search is a prefix.
const DIRECTIONS: [(i32, i32); 8] = [
    (1, 0),   // East
    (0, 1),   // South
    (-1, 0),  // West
    (0, -1),  // North
    (1, 1),   // Southeast
    (-1, 1),  // Southwest
    (-1, -1), // Northwest
    (1, -1),  // Northeast
];

/// Cost of a cardinal step.
const CARDINAL_COST: Fixed = Fixed::ONE;

/// Cost of a diagonal step: sqrt(2) rounded to the nearest I32F32 value.
const DIAGONAL_COST: Fixed = Fixed::from_bits(0x1_6A09_E668);

/// Octile distance, exact cost on an open 8-way grid.
#[inline]
fn octile_heuristic(a: TilePos, b: TilePos) -> Fixed {
    let dx = a.x.abs_diff(b.x);
    let dy = a.y.abs_diff(b.y);
    let (long, short) = if dx > dy { (dx, dy) } else { (dy, dx) };
    Fixed::from_num(long - short) * CARDINAL_COST + Fixed::from_num(short) * DIAGONAL_COST
}

#[inline]
fn tie_breaker(tile: TilePos) -> u64 {
    // Coordinates are in bounds (non-negative) whenever a node is pushed.
    ((tile.y as u32 as u64) << 32) | (tile.x as u32 as u64)
}

/// A* pathfinder over a tile grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AStarPathfinder {
    /// Allow 8-way movement; otherwise only cardinal steps are taken.
    pub allow_diagonal: bool,
}

impl Default for AStarPathfinder {
    fn default() -> Self {
        Self {
            allow_diagonal: true,
        }
    }
}

impl AStarPathfinder {
    /// Create a pathfinder.
    #[must_use]
    pub const fn new(allow_diagonal: bool) -> Self {
        Self { allow_diagonal }
    }

    fn directions(&self) -> &'static [(i32, i32)] {
        if self.allow_diagonal {
            &DIRECTIONS
        } else {
            &DIRECTIONS[..4]
        }
    }

    fn heuristic(&self, tile: TilePos, target: TilePos, range: u32) -> Fixed {
        if range > 0 {
            // Each step shrinks the Chebyshev distance by at most one.
            let gap = tile.chebyshev_distance(target).saturating_sub(range);
            return Fixed::from_num(gap);
        }
        if self.allow_diagonal {
            octile_heuristic(tile, target)
        } else {
            Fixed::from_num(tile.manhattan_distance(target))
        }
    }

    /// Check if a diagonal move is valid (no corner cutting through blocked cells).
    #[inline]
    fn is_diagonal_valid(map: &dyn Passability, tile: TilePos, dx: i32, dy: i32) -> bool {
        if dx != 0 && dy != 0 {
            map.is_passable(tile.offset(dx, 0)) && map.is_passable(tile.offset(0, dy))
        } else {
            true
        }
    }

    /// Core search: expands from `from` until a tile satisfying the goal
    /// condition (passable and within `range` of `target`) is popped.
    fn search(
        &self,
        map: &dyn Passability,
        from: TilePos,
        target: TilePos,
        range: u32,
    ) -> Result<Vec<TilePos>, PathError> {
        let is_goal = |tile: TilePos| tile.chebyshev_distance(target) <= range;

        let mut open_set: BinaryHeap<AStarNode> = BinaryHeap::new();
        let mut came_from: HashMap<TilePos, TilePos> = HashMap::new();
        let mut g_score: HashMap<TilePos, Fixed> = HashMap::new();
        let mut closed: HashSet<TilePos> = HashSet::new();

        let start_h = self.heuristic(from, target, range);
        g_score.insert(from, Fixed::ZERO);
        open_set.push(AStarNode {
            tile: from,
            f_score: start_h,
            h_score: start_h,
            tie_breaker: tie_breaker(from),
        });

        while let Some(current) = open_set.pop() {
            if !closed.insert(current.tile) {
                continue;
            }

            if is_goal(current.tile) {
                return Ok(reconstruct_path(&came_from, current.tile));
            }

            let current_g = g_score.get(&current.tile).copied().unwrap_or(Fixed::MAX);

            for &(dx, dy) in self.directions() {
                let next = current.tile.offset(dx, dy);
                if closed.contains(&next) || !map.is_passable(next) {
                    continue;
                }
                if !Self::is_diagonal_valid(map, current.tile, dx, dy) {
                    continue;
                }

                let step = if dx != 0 && dy != 0 {
                    DIAGONAL_COST
                } else {
                    CARDINAL_COST
                };
                let tentative_g = current_g + step;
                let neighbor_g = g_score.get(&next).copied().unwrap_or(Fixed::MAX);

                if tentative_g < neighbor_g {
                    came_from.insert(next, current.tile);
                    g_score.insert(next, tentative_g);

                    let h = self.heuristic(next, target, range);
                    open_set.push(AStarNode {
                        tile: next,
                        f_score: tentative_g + h,
                        h_score: h,
                        tie_breaker: tie_breaker(next),
                    });
                }
            }
        }

        Err(PathError::Unreachable { from, to: target })
    }

    fn check_start(map: &dyn Passability, from: TilePos) -> Result<(), PathError> {
        if !map.in_bounds(from) {
            return Err(PathError::OutOfBounds(from));
        }
        if !map.is_passable(from) {
            return Err(PathError::StartBlocked(from));
        }
        Ok(())
    }
}

impl Pathfinder for AStarPathfinder {
    fn find_path(
        &self,
        map: &dyn Passability,
        from: TilePos,
        to: TilePos,
    ) -> Result<Vec<TilePos>, PathError> {
        Self::check_start(map, from)?;
        if !map.in_bounds(to) {
            return Err(PathError::OutOfBounds(to));
        }
        if !map.is_passable(to) {
            return Err(PathError::GoalBlocked(to));
        }
        if from == to {
            return Ok(vec![from]);
        }

        self.search(map, from, to, 0)
    }

    fn find_path_within(
        &self,
        map: &dyn Passability,
        from: TilePos,
        to: TilePos,
        range: u32,
    ) -> Result<Vec<TilePos>, PathError> {
        Self::check_start(map, from)?;
        if !map.in_bounds(to) {
            return Err(PathError::OutOfBounds(to));
        }
        if range == 0 {
            return self.find_path(map, from, to);
        }

        self.search(map, from, to, range)
    }
}

/// Reconstruct path from came_from map, start tile first.
fn reconstruct_path(came_from: &HashMap<TilePos, TilePos>, goal: TilePos) -> Vec<TilePos> {
    let mut path = vec![goal];
    let mut current = goal;

    while let Some(&prev) = came_from.get(&current) {
        path.push(prev);
        current = prev;
    }

    path.reverse();
    path
}

/// Check that consecutive tiles are adjacent and every tile is passable.
#[must_use]
pub fn is_valid_path(map: &dyn Passability, path: &[TilePos]) -> bool {
    path.iter().all(|&t| map.is_passable(t))
        && path.windows(2).all(|w| w[0].chebyshev_distance(w[1]) == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::{CellType, TerrainGrid};
    use proptest::prelude::*;

    fn tile(x: i32, y: i32) -> TilePos {
        TilePos::new(x, y)
    }

    fn open_grid(w: u32, h: u32) -> TerrainGrid {
        TerrainGrid::new(w, h, 1).unwrap()
    }

    #[test]
    fn test_simple_path() {
        let grid = open_grid(10, 10);
        let path = AStarPathfinder::default()
            .find_path(&grid, tile(0, 0), tile(5, 5))
            .unwrap();

        assert_eq!(path.first(), Some(&tile(0, 0)));
        assert_eq!(path.last(), Some(&tile(5, 5)));
        // Pure diagonal: 5 steps plus the start tile.
        assert_eq!(path.len(), 6);
        assert!(is_valid_path(&grid, &path));
    }

    #[test]
    fn test_straight_path_stays_on_row() {
        let grid = open_grid(20, 10);
        let path = AStarPathfinder::default()
            .find_path(&grid, tile(5, 5), tile(15, 5))
            .unwrap();
        assert_eq!(path.len(), 11);
        assert!(path.iter().all(|t| t.y == 5));
    }

    #[test]
    fn test_path_around_obstacle() {
        let mut grid = open_grid(10, 10);
        for y in 2..8 {
            grid.set_terrain(tile(5, y), CellType::Blocked);
        }

        let path = AStarPathfinder::default()
            .find_path(&grid, tile(2, 5), tile(8, 5))
            .unwrap();

        for point in &path {
            assert!(grid.is_passable(*point), "Path goes through blocked cell {point}");
        }
        assert!(is_valid_path(&grid, &path));
    }

    #[test]
    fn test_no_corner_cutting() {
        let grid = TerrainGrid::from_rows(&["..", "#.", ".."]).unwrap();
        // (0,0) -> (1,1) diagonally would clip the rock at (0,1); the only
        // legal route is east then south.
        let path = AStarPathfinder::default()
            .find_path(&grid, tile(0, 0), tile(1, 1))
            .unwrap();
        assert_eq!(path, vec![tile(0, 0), tile(1, 0), tile(1, 1)]);
    }

    #[test]
    fn test_no_path_exists() {
        let mut grid = open_grid(10, 10);
        for y in 0..10 {
            grid.set_terrain(tile(5, y), CellType::Blocked);
        }

        let result = AStarPathfinder::default().find_path(&grid, tile(2, 5), tile(8, 5));
        assert_eq!(
            result,
            Err(PathError::Unreachable {
                from: tile(2, 5),
                to: tile(8, 5)
            })
        );
    }

    #[test]
    fn test_enclosed_goal_unreachable() {
        let grid = TerrainGrid::from_rows(&[".....", ".###.", ".#.#.", ".###.", "....."]).unwrap();
        let result = AStarPathfinder::default().find_path(&grid, tile(0, 0), tile(2, 2));
        assert!(matches!(result, Err(PathError::Unreachable { .. })));
    }

    #[test]
    fn test_path_to_same_cell() {
        let grid = open_grid(10, 10);
        let path = AStarPathfinder::default()
            .find_path(&grid, tile(5, 5), tile(5, 5))
            .unwrap();
        assert_eq!(path, vec![tile(5, 5)]);
    }

    #[test]
    fn test_blocked_start() {
        let mut grid = open_grid(10, 10);
        grid.set_terrain(tile(0, 0), CellType::Blocked);
        let result = AStarPathfinder::default().find_path(&grid, tile(0, 0), tile(5, 5));
        assert_eq!(result, Err(PathError::StartBlocked(tile(0, 0))));
    }

    #[test]
    fn test_blocked_goal_fails_even_when_adjacent_reachable() {
        let mut grid = open_grid(10, 10);
        grid.set_terrain(tile(5, 5), CellType::Blocked);
        let result = AStarPathfinder::default().find_path(&grid, tile(0, 0), tile(5, 5));
        assert_eq!(result, Err(PathError::GoalBlocked(tile(5, 5))));
    }

    #[test]
    fn test_out_of_bounds_goal() {
        let grid = open_grid(4, 4);
        let result = AStarPathfinder::default().find_path(&grid, tile(0, 0), tile(9, 0));
        assert_eq!(result, Err(PathError::OutOfBounds(tile(9, 0))));
    }

    #[test]
    fn test_four_way_paths_use_cardinal_steps() {
        let grid = open_grid(10, 10);
        let path = AStarPathfinder::new(false)
            .find_path(&grid, tile(0, 0), tile(3, 3))
            .unwrap();
        assert_eq!(path.len(), 7);
        assert!(path.windows(2).all(|w| w[0].manhattan_distance(w[1]) == 1));
    }

    #[test]
    fn test_find_path_within_stops_in_range() {
        let mut grid = open_grid(12, 5);
        grid.set_terrain(tile(10, 2), CellType::Blocked);
        let path = AStarPathfinder::default()
            .find_path_within(&grid, tile(0, 2), tile(10, 2), 2)
            .unwrap();
        let end = *path.last().unwrap();
        assert_eq!(end.chebyshev_distance(tile(10, 2)), 2);
        assert!(is_valid_path(&grid, &path));
    }

    #[test]
    fn test_find_path_within_already_in_range() {
        let grid = open_grid(5, 5);
        let path = AStarPathfinder::default()
            .find_path_within(&grid, tile(1, 1), tile(2, 2), 1)
            .unwrap();
        assert_eq!(path, vec![tile(1, 1)]);
    }

    #[test]
    fn test_determinism() {
        let mut grid = open_grid(20, 20);
        for i in 5..15 {
            grid.set_terrain(tile(10, i), CellType::Blocked);
        }

        let finder = AStarPathfinder::default();
        let path1 = finder.find_path(&grid, tile(5, 10), tile(15, 10)).unwrap();
        let path2 = finder.find_path(&grid, tile(5, 10), tile(15, 10)).unwrap();
        let path3 = finder.find_path(&grid, tile(5, 10), tile(15, 10)).unwrap();

        assert_eq!(path1, path2);
        assert_eq!(path2, path3);
    }

    #[test]
    fn test_octile_heuristic() {
        assert_eq!(octile_heuristic(tile(0, 0), tile(4, 0)), Fixed::from_num(4));
        assert_eq!(octile_heuristic(tile(0, 0), tile(2, 2)), DIAGONAL_COST * Fixed::from_num(2));
        assert_eq!(octile_heuristic(tile(3, 3), tile(3, 3)), Fixed::ZERO);
    }

    #[test]
    fn test_path_error_maps_to_game_error() {
        let err: GameError = PathError::GoalBlocked(tile(1, 2)).into();
        assert_eq!(err, GameError::TerrainBlocked(tile(1, 2)));
        let err: GameError = PathError::Unreachable {
            from: tile(0, 0),
            to: tile(1, 1),
        }
        .into();
        assert!(matches!(err, GameError::NoPath { .. }));
    }

    proptest! {
        #[test]
        fn prop_open_grid_paths_are_shortest(
            fx in 0i32..16, fy in 0i32..16, tx in 0i32..16, ty in 0i32..16,
        ) {
            let grid = open_grid(16, 16);
            let (from, to) = (tile(fx, fy), tile(tx, ty));

            let eight = AStarPathfinder::default().find_path(&grid, from, to).unwrap();
            prop_assert_eq!(eight.len() as u32, from.chebyshev_distance(to) + 1);

            let four = AStarPathfinder { allow_diagonal: false }
                .find_path(&grid, from, to)
                .unwrap();
            prop_assert_eq!(four.len() as u32, from.manhattan_distance(to) + 1);
        }
    }
}
