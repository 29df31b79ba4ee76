//! Fixed-point and tile-coordinate math for deterministic simulation.
//!
//! All simulation math uses fixed-point arithmetic or plain integers so
//! that every server and replay produces bit-identical results.
//! Floating-point operations can differ between CPUs.

use std::fmt;

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all fractional simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
pub type Fixed = I32F32;

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// Integer tile coordinate on the terrain grid.
///
/// `x` grows east, `y` grows south (row index). Coordinates are signed so
/// that offsets computed by the formation planner can step off the map
/// before being bounds-checked.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct TilePos {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl TilePos {
    /// Create a tile coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Tile shifted by the given offset, saturating at the `i32` range.
    ///
    /// A saturated coordinate is never inside a grid, so callers that check
    /// bounds afterwards reject it.
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
        }
    }

    /// Chebyshev (king-move) distance, the step count under 8-way movement.
    #[must_use]
    pub fn chebyshev_distance(self, other: Self) -> u32 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }

    /// Manhattan distance, the step count under 4-way movement.
    #[must_use]
    pub fn manhattan_distance(self, other: Self) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// Squared Euclidean distance in tiles.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> i64 {
        let dx = i64::from(self.x) - i64::from(other.x);
        let dy = i64::from(self.y) - i64::from(other.y);
        dx * dx + dy * dy
    }

    /// Position of this tile as a fixed-point vector.
    #[must_use]
    pub fn to_vec2(self) -> Vec2Fixed {
        Vec2Fixed::new(Fixed::from_num(self.x), Fixed::from_num(self.y))
    }
}

impl fmt::Display for TilePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(i32, i32)> for TilePos {
    fn from((x, y): (i32, i32)) -> Self {
        Self::new(x, y)
    }
}

/// Fixed-point 2D vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Check whether both components are exactly zero.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.x == Fixed::ZERO && self.y == Fixed::ZERO
    }

    /// Arithmetic mean of a set of tiles.
    ///
    /// Returns `None` for an empty set.
    #[must_use]
    pub fn centroid(tiles: &[TilePos]) -> Option<Self> {
        if tiles.is_empty() {
            return None;
        }
        let (sum_x, sum_y) = tiles.iter().fold((0i64, 0i64), |(sx, sy), t| {
            (sx + i64::from(t.x), sy + i64::from(t.y))
        });
        let count = Fixed::from_num(tiles.len());
        Some(Self::new(
            Fixed::from_num(sum_x) / count,
            Fixed::from_num(sum_y) / count,
        ))
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

/// Smallest integer `s` with `s * s >= n`.
#[must_use]
pub fn ceil_sqrt(n: usize) -> usize {
    let mut side = 0usize;
    while side * side < n {
        side += 1;
    }
    side
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_determinism() {
        let a = Fixed::from_num(1) / Fixed::from_num(3);
        let b = Fixed::from_num(1) / Fixed::from_num(3);
        assert_eq!(a, b);
        assert_eq!(a * Fixed::from_num(7), b * Fixed::from_num(7));
    }

    #[test]
    fn test_tile_distances() {
        let a = TilePos::new(1, 1);
        let b = TilePos::new(4, 3);
        assert_eq!(a.chebyshev_distance(b), 3);
        assert_eq!(a.manhattan_distance(b), 5);
        assert_eq!(a.distance_squared(b), 13);
        assert_eq!(a.offset(3, 2), b);
    }

    #[test]
    fn test_offset_saturates() {
        let edge = TilePos::new(i32::MAX, i32::MIN);
        assert_eq!(edge.offset(1, -1), edge);
        assert_eq!(edge.offset(-1, 1), TilePos::new(i32::MAX - 1, i32::MIN + 1));
    }

    #[test]
    fn test_centroid() {
        let tiles = [TilePos::new(0, 0), TilePos::new(2, 0), TilePos::new(1, 3)];
        let c = Vec2Fixed::centroid(&tiles).unwrap();
        assert_eq!(c.x, Fixed::from_num(1));
        assert_eq!(c.y, Fixed::from_num(1));
        assert!(Vec2Fixed::centroid(&[]).is_none());
    }

    #[test]
    fn test_ceil_sqrt() {
        assert_eq!(ceil_sqrt(0), 0);
        assert_eq!(ceil_sqrt(1), 1);
        assert_eq!(ceil_sqrt(4), 2);
        assert_eq!(ceil_sqrt(5), 3);
        assert_eq!(ceil_sqrt(9), 3);
        assert_eq!(ceil_sqrt(10), 4);
    }
}
