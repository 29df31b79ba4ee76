//! Terrain grid: the per-match passability map.
//!
//! Terrain cells never change once the match starts. Buildings add and
//! remove dynamic blocking on top of the terrain through
//! [`TerrainGrid::place_building`] and [`TerrainGrid::clear_building`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::error::{GameError, Result};
use crate::math::TilePos;

/// Terrain cell types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CellType {
    /// Open ground.
    #[default]
    Walkable,
    /// Rock, water or any other permanent obstacle.
    Blocked,
}

impl CellType {
    /// Returns true if this cell is walkable.
    #[must_use]
    pub const fn is_walkable(self) -> bool {
        !matches!(self, Self::Blocked)
    }
}

/// Read-only passability queries used by the planners.
///
/// Implemented by [`TerrainGrid`] (terrain and buildings) and by
/// [`OccupancyView`] (additionally treats tiles held by units as blocked).
pub trait Passability {
    /// Check if a tile lies on the map.
    fn in_bounds(&self, tile: TilePos) -> bool;

    /// Check if a unit may stand on or move through a tile.
    fn is_passable(&self, tile: TilePos) -> bool;
}

/// Immutable-per-match grid of terrain cells plus building coverage.
///
/// The `Default` grid has no tiles at all; it stands in until a map is
/// loaded, and every tile is out of bounds on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TerrainGrid {
    /// Grid width in tiles.
    width: u32,
    /// Grid height in tiles.
    height: u32,
    /// Size of one tile in world units (informational for clients).
    tile_size: u32,
    /// Terrain cells in row-major order.
    cells: Vec<CellType>,
    /// Building covering each tile, row-major.
    buildings: Vec<Option<EntityId>>,
}

impl TerrainGrid {
    /// Create a fully walkable grid.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidMap`] if a dimension or the tile size is zero.
    pub fn new(width: u32, height: u32, tile_size: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(GameError::InvalidMap(format!(
                "dimensions must be positive, got {width}x{height}"
            )));
        }
        if tile_size == 0 {
            return Err(GameError::InvalidMap("tile size must be positive".into()));
        }
        if i32::try_from(width).is_err() || i32::try_from(height).is_err() {
            return Err(GameError::InvalidMap(format!(
                "dimensions too large: {width}x{height}"
            )));
        }

        let cell_count = (width as usize) * (height as usize);
        Ok(Self {
            width,
            height,
            tile_size,
            cells: vec![CellType::Walkable; cell_count],
            buildings: vec![None; cell_count],
        })
    }

    /// Build a grid from text rows: `#` is rock, anything else is walkable.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidMap`] for empty input or ragged rows.
    pub fn from_rows(rows: &[&str]) -> Result<Self> {
        let height = rows.len();
        let width = rows.first().map_or(0, |r| r.chars().count());
        if rows.iter().any(|r| r.chars().count() != width) {
            return Err(GameError::InvalidMap("rows have unequal length".into()));
        }
        let width = u32::try_from(width).map_err(|_| GameError::InvalidMap("too wide".into()))?;
        let height = u32::try_from(height).map_err(|_| GameError::InvalidMap("too tall".into()))?;

        let mut grid = Self::new(width, height, 1)?;
        for (y, row) in rows.iter().enumerate() {
            for (x, ch) in row.chars().enumerate() {
                if ch == '#' {
                    grid.set_terrain(TilePos::new(x as i32, y as i32), CellType::Blocked);
                }
            }
        }
        Ok(grid)
    }

    /// Grid width in tiles.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in tiles.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Tile size in world units.
    #[must_use]
    pub const fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Number of tiles on the grid.
    #[must_use]
    pub fn area(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    fn index(&self, tile: TilePos) -> Option<usize> {
        if self.in_bounds(tile) {
            Some((tile.y as usize) * (self.width as usize) + (tile.x as usize))
        } else {
            None
        }
    }

    /// Check if coordinates are within grid bounds.
    #[must_use]
    pub fn in_bounds(&self, tile: TilePos) -> bool {
        tile.x >= 0 && tile.y >= 0 && (tile.x as u32) < self.width && (tile.y as u32) < self.height
    }

    /// Get the terrain cell at a tile, `None` if out of bounds.
    #[must_use]
    pub fn cell(&self, tile: TilePos) -> Option<CellType> {
        self.index(tile).map(|i| self.cells[i])
    }

    /// Set the terrain at a tile. Only meant for map construction.
    /// Returns `false` if out of bounds.
    pub fn set_terrain(&mut self, tile: TilePos, cell: CellType) -> bool {
        match self.index(tile) {
            Some(i) => {
                self.cells[i] = cell;
                true
            }
            None => false,
        }
    }

    /// Check if the terrain itself blocks a tile (ignores buildings).
    #[must_use]
    pub fn is_terrain_blocked(&self, tile: TilePos) -> bool {
        self.cell(tile).map_or(true, |c| !c.is_walkable())
    }

    /// Building covering a tile, if any.
    #[must_use]
    pub fn building_at(&self, tile: TilePos) -> Option<EntityId> {
        self.index(tile).and_then(|i| self.buildings[i])
    }

    /// Check if a unit may stand on a tile: in bounds, walkable terrain,
    /// and not under a building.
    #[must_use]
    pub fn is_passable(&self, tile: TilePos) -> bool {
        match self.index(tile) {
            Some(i) => self.cells[i].is_walkable() && self.buildings[i].is_none(),
            None => false,
        }
    }

    /// Mark a building's footprint as blocked.
    ///
    /// # Errors
    ///
    /// Fails without changing anything if any tile is out of bounds,
    /// terrain-blocked or already under a building.
    pub fn place_building(&mut self, id: EntityId, footprint: &[TilePos]) -> Result<()> {
        for &tile in footprint {
            if !self.in_bounds(tile) {
                return Err(GameError::OutOfBounds(tile));
            }
            if let Some(occupant) = self.building_at(tile) {
                return Err(GameError::TileOccupied { tile, occupant });
            }
            if self.is_terrain_blocked(tile) {
                return Err(GameError::TerrainBlocked(tile));
            }
        }
        for &tile in footprint {
            if let Some(i) = self.index(tile) {
                self.buildings[i] = Some(id);
            }
        }
        Ok(())
    }

    /// Release the tiles of a building's footprint that it still holds.
    pub fn clear_building(&mut self, id: EntityId, footprint: &[TilePos]) {
        for &tile in footprint {
            if let Some(i) = self.index(tile) {
                if self.buildings[i] == Some(id) {
                    self.buildings[i] = None;
                }
            }
        }
    }
}

impl Passability for TerrainGrid {
    fn in_bounds(&self, tile: TilePos) -> bool {
        TerrainGrid::in_bounds(self, tile)
    }

    fn is_passable(&self, tile: TilePos) -> bool {
        TerrainGrid::is_passable(self, tile)
    }
}

/// Terrain view that also treats tiles held by units as blocked.
///
/// Used when replanning around stalled traffic and when choosing formation
/// slots. Tiles listed in `ignored` (typically the units being planned
/// for) are not considered held.
#[derive(Debug, Clone)]
pub struct OccupancyView<'a> {
    terrain: &'a TerrainGrid,
    held: HashSet<TilePos>,
}

impl<'a> OccupancyView<'a> {
    /// Create a view over `terrain` where every tile in `held` is blocked.
    #[must_use]
    pub fn new(terrain: &'a TerrainGrid, held: HashSet<TilePos>) -> Self {
        Self { terrain, held }
    }

    /// Tiles treated as held by units.
    #[must_use]
    pub fn held(&self) -> &HashSet<TilePos> {
        &self.held
    }
}

impl Passability for OccupancyView<'_> {
    fn in_bounds(&self, tile: TilePos) -> bool {
        self.terrain.in_bounds(tile)
    }

    fn is_passable(&self, tile: TilePos) -> bool {
        self.terrain.is_passable(tile) && !self.held.contains(&tile)
    }
}
