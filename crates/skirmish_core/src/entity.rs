//! Entity definitions.
//!
//! Entities are plain data: identity, ownership, kind, tile position,
//! health and (for units) a motion state. All behaviour lives in the
//! [`store`](crate::store), [`commands`](crate::commands) and
//! [`simulation`](crate::simulation) modules.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GameError;
use crate::math::{fixed_serde, Fixed, TilePos};

/// Unique identifier for entities. Assigned monotonically, never reused.
pub type EntityId = u64;

/// Team / owner identifier.
pub type TeamId = u8;

/// Mobile unit archetypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitType {
    /// Builder unit with a weak melee attack.
    Worker,
    /// Slow ranged combat unit.
    Soldier,
    /// Fast, lightly armed unit.
    Scout,
}

/// Static per-type unit statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitStats {
    /// Starting and maximum health.
    pub max_health: u32,
    /// Tiles advanced per tick.
    pub speed: Fixed,
    /// Weapon, if the unit can attack.
    pub weapon: Option<Weapon>,
}

impl UnitType {
    /// Statistics for this unit type.
    #[must_use]
    pub fn stats(self) -> UnitStats {
        match self {
            Self::Worker => UnitStats {
                max_health: 60,
                speed: Fixed::from_num(1) / Fixed::from_num(2),
                weapon: Some(Weapon::new(3, 1, 10)),
            },
            Self::Soldier => UnitStats {
                max_health: 120,
                speed: Fixed::from_num(1) / Fixed::from_num(4),
                weapon: Some(Weapon::new(10, 3, 8)),
            },
            Self::Scout => UnitStats {
                max_health: 50,
                speed: Fixed::from_num(1),
                weapon: Some(Weapon::new(4, 2, 6)),
            },
        }
    }

    /// Lowercase name used by scenario documents and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Worker => "worker",
            Self::Soldier => "soldier",
            Self::Scout => "scout",
        }
    }
}

impl FromStr for UnitType {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "worker" => Ok(Self::Worker),
            "soldier" => Ok(Self::Soldier),
            "scout" => Ok(Self::Scout),
            other => Err(GameError::UnknownType(other.to_string())),
        }
    }
}

/// Static structure archetypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildingType {
    /// Power generator, 1x1.
    Generator,
    /// Unit production hall, 2x2.
    Barracks,
    /// Wall segment, 1x1.
    Wall,
}

impl BuildingType {
    /// Footprint size in tiles `(width, height)`, anchored at the top-left tile.
    #[must_use]
    pub const fn footprint_size(self) -> (i32, i32) {
        match self {
            Self::Generator | Self::Wall => (1, 1),
            Self::Barracks => (2, 2),
        }
    }

    /// Starting and maximum health.
    #[must_use]
    pub const fn max_health(self) -> u32 {
        match self {
            Self::Generator => 400,
            Self::Barracks => 800,
            Self::Wall => 300,
        }
    }

    /// All tiles covered when anchored at `anchor`, in row-major order.
    #[must_use]
    pub fn footprint(self, anchor: TilePos) -> Vec<TilePos> {
        let (w, h) = self.footprint_size();
        (0..h)
            .flat_map(|dy| (0..w).map(move |dx| anchor.offset(dx, dy)))
            .collect()
    }

    /// Lowercase name used by scenario documents and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Generator => "generator",
            Self::Barracks => "barracks",
            Self::Wall => "wall",
        }
    }
}

impl FromStr for BuildingType {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "generator" => Ok(Self::Generator),
            "barracks" => Ok(Self::Barracks),
            "wall" => Ok(Self::Wall),
            other => Err(GameError::UnknownType(other.to_string())),
        }
    }
}

/// Whether an entity is a unit or a building, with its concrete type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Mobile unit.
    Unit(UnitType),
    /// Static structure.
    Building(BuildingType),
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit(t) => f.write_str(t.name()),
            Self::Building(t) => f.write_str(t.name()),
        }
    }
}

/// Health component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Health {
    /// Current health points.
    pub current: u32,
    /// Maximum health points.
    pub max: u32,
}

impl Health {
    /// Create new health component at full health.
    #[must_use]
    pub const fn new(max: u32) -> Self {
        Self { current: max, max }
    }

    /// Check if entity is dead (health == 0).
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.current == 0
    }

    /// Apply damage, returning actual damage dealt.
    /// Uses saturating subtraction to prevent underflow.
    pub fn apply_damage(&mut self, amount: u32) -> u32 {
        let actual = amount.min(self.current);
        self.current = self.current.saturating_sub(actual);
        actual
    }
}

/// Melee or ranged weapon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Weapon {
    /// Damage per hit.
    pub damage: u32,
    /// Reach in tiles (Chebyshev distance).
    pub range: u32,
    /// Ticks between hits.
    pub cooldown: u32,
    /// Ticks until the next hit is allowed.
    pub cooldown_remaining: u32,
}

impl Weapon {
    /// Create a weapon that is ready to fire.
    #[must_use]
    pub const fn new(damage: u32, range: u32, cooldown: u32) -> Self {
        Self {
            damage,
            range,
            cooldown,
            cooldown_remaining: 0,
        }
    }
}

/// A planned route being walked by a unit.
///
/// `tiles[index]` is always the tile the unit currently stands on; the
/// unit steps onto `tiles[index + 1]` once `progress` reaches one tile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MovePath {
    tiles: Vec<TilePos>,
    index: usize,
    /// Fraction of the next tile already covered.
    #[serde(with = "fixed_serde")]
    pub progress: Fixed,
    /// Consecutive ticks the next step has been refused.
    pub stalled_ticks: u32,
    /// Replans performed since the order was issued.
    pub replans: u32,
}

impl MovePath {
    /// Create a path. The first tile must be the unit's current tile.
    #[must_use]
    pub fn new(tiles: Vec<TilePos>) -> Self {
        Self {
            tiles,
            index: 0,
            progress: Fixed::ZERO,
            stalled_ticks: 0,
            replans: 0,
        }
    }

    /// All tiles of the route, including the starting tile.
    #[must_use]
    pub fn tiles(&self) -> &[TilePos] {
        &self.tiles
    }

    /// Index of the tile the unit currently stands on.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Final tile of the route.
    #[must_use]
    pub fn destination(&self) -> Option<TilePos> {
        self.tiles.last().copied()
    }

    /// Next tile to step onto, if any.
    #[must_use]
    pub fn next_tile(&self) -> Option<TilePos> {
        self.tiles.get(self.index + 1).copied()
    }

    /// Tiles left to walk.
    #[must_use]
    pub fn remaining_steps(&self) -> usize {
        self.tiles.len().saturating_sub(self.index + 1)
    }

    /// Whether the unit has reached the last tile.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.next_tile().is_none()
    }

    pub(crate) fn step(&mut self) {
        if self.index + 1 < self.tiles.len() {
            self.index += 1;
        }
    }

    /// Replace the unwalked part of the route, keeping the replan count.
    pub(crate) fn replace_route(&mut self, tiles: Vec<TilePos>) {
        self.tiles = tiles;
        self.index = 0;
        self.progress = Fixed::ZERO;
        self.stalled_ticks = 0;
        self.replans += 1;
    }
}

/// An attack order in progress.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttackOrder {
    /// Entity being attacked.
    pub target: EntityId,
    /// Route toward the target while out of range.
    pub approach: Option<MovePath>,
    /// Ticks since `approach` was planned.
    pub ticks_since_plan: u32,
}

impl AttackOrder {
    /// Start attacking `target`.
    #[must_use]
    pub const fn new(target: EntityId) -> Self {
        Self {
            target,
            approach: None,
            ticks_since_plan: 0,
        }
    }
}

/// What a unit is doing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MotionState {
    /// Standing still.
    #[default]
    Idle,
    /// Walking a path.
    Moving(MovePath),
    /// Pursuing and attacking a target.
    Attacking(AttackOrder),
}

impl MotionState {
    /// Path currently being walked, for both plain moves and attack approaches.
    #[must_use]
    pub fn active_path(&self) -> Option<&MovePath> {
        match self {
            Self::Idle => None,
            Self::Moving(path) => Some(path),
            Self::Attacking(order) => order.approach.as_ref(),
        }
    }

    pub(crate) fn active_path_mut(&mut self) -> Option<&mut MovePath> {
        match self {
            Self::Idle => None,
            Self::Moving(path) => Some(path),
            Self::Attacking(order) => order.approach.as_mut(),
        }
    }
}

/// A live unit or building.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    /// Unique identifier.
    pub id: EntityId,
    /// Owning team.
    pub team: TeamId,
    /// Unit or building type.
    pub kind: EntityKind,
    /// Current tile (anchor tile for buildings).
    pub tile: TilePos,
    /// Hit points.
    pub health: Health,
    /// Motion state; always `Idle` for buildings.
    pub motion: MotionState,
    /// Tiles per tick; zero for buildings.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
    /// Weapon, if the entity can attack.
    pub weapon: Option<Weapon>,
}

impl Entity {
    /// Build a fresh unit at full health.
    #[must_use]
    pub fn unit(id: EntityId, team: TeamId, unit_type: UnitType, tile: TilePos) -> Self {
        let stats = unit_type.stats();
        Self {
            id,
            team,
            kind: EntityKind::Unit(unit_type),
            tile,
            health: Health::new(stats.max_health),
            motion: MotionState::Idle,
            speed: stats.speed,
            weapon: stats.weapon,
        }
    }

    /// Build a fresh building at full health.
    #[must_use]
    pub fn building(id: EntityId, team: TeamId, building: BuildingType, anchor: TilePos) -> Self {
        Self {
            id,
            team,
            kind: EntityKind::Building(building),
            tile: anchor,
            health: Health::new(building.max_health()),
            motion: MotionState::Idle,
            speed: Fixed::ZERO,
            weapon: None,
        }
    }

    /// Check if this entity is a unit.
    #[must_use]
    pub const fn is_unit(&self) -> bool {
        matches!(self.kind, EntityKind::Unit(_))
    }

    /// Check if this entity is a building.
    #[must_use]
    pub const fn is_building(&self) -> bool {
        matches!(self.kind, EntityKind::Building(_))
    }

    /// Check if the unit is walking, either on a move order or approaching
    /// an attack target.
    #[must_use]
    pub fn is_moving(&self) -> bool {
        self.motion.active_path().is_some_and(|p| !p.is_complete())
    }

    /// Tiles covered by this entity.
    #[must_use]
    pub fn footprint(&self) -> Vec<TilePos> {
        match self.kind {
            EntityKind::Unit(_) => vec![self.tile],
            EntityKind::Building(b) => b.footprint(self.tile),
        }
    }

    /// Chebyshev distance from this entity to the nearest tile of `other`.
    #[must_use]
    pub fn distance_to(&self, other: &Entity) -> u32 {
        other
            .footprint()
            .into_iter()
            .map(|t| self.tile.chebyshev_distance(t))
            .min()
            .unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_damage_saturates() {
        let mut health = Health::new(10);
        assert_eq!(health.apply_damage(4), 4);
        assert_eq!(health.apply_damage(20), 6);
        assert!(health.is_dead());
    }

    #[test]
    fn test_type_names_parse() {
        assert_eq!("worker".parse::<UnitType>(), Ok(UnitType::Worker));
        assert_eq!("Generator".parse::<BuildingType>(), Ok(BuildingType::Generator));
        assert!(matches!(
            "dragon".parse::<UnitType>(),
            Err(GameError::UnknownType(_))
        ));
    }

    #[test]
    fn test_barracks_footprint() {
        let tiles = BuildingType::Barracks.footprint(TilePos::new(3, 4));
        assert_eq!(
            tiles,
            vec![
                TilePos::new(3, 4),
                TilePos::new(4, 4),
                TilePos::new(3, 5),
                TilePos::new(4, 5)
            ]
        );
    }

    #[test]
    fn test_move_path_steps() {
        let mut path = MovePath::new(vec![TilePos::new(0, 0), TilePos::new(1, 0)]);
        assert_eq!(path.next_tile(), Some(TilePos::new(1, 0)));
        assert_eq!(path.remaining_steps(), 1);
        path.step();
        assert!(path.is_complete());
        assert_eq!(path.destination(), Some(TilePos::new(1, 0)));
        path.step();
        assert_eq!(path.index(), 1);
    }

    #[test]
    fn test_distance_to_building_uses_footprint() {
        let unit = Entity::unit(1, 0, UnitType::Worker, TilePos::new(0, 0));
        let barracks = Entity::building(2, 1, BuildingType::Barracks, TilePos::new(2, 2));
        assert_eq!(unit.distance_to(&barracks), 2);
    }
}
