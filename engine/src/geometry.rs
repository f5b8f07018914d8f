//! Grid geometry: movement cost, range checks and area-of-effect containment.
//!
//! Positions are grid cells; every cell is five distance units wide, and all
//! ranges, sizes and speeds are expressed in distance units.

use serde::{Deserialize, Serialize};

use crate::combat::actions::{AoeShape, AoeTemplate};

pub const UNITS_PER_CELL: i32 = 5;
/// cos(30°): a cone spans 60° in total.
pub const CONE_COS_HALF_ANGLE: f64 = 0.866;
pub const DEFAULT_LINE_WIDTH: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub z: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Offset to `other` in distance units.
    pub fn offset_to(&self, other: &Position) -> Vec3 {
        Vec3 {
            x: ((other.x - self.x) * UNITS_PER_CELL) as f64,
            y: ((other.y - self.y) * UNITS_PER_CELL) as f64,
            z: ((other.z - self.z) * UNITS_PER_CELL) as f64,
        }
    }

    pub fn distance(&self, other: &Position) -> f64 {
        self.offset_to(other).length()
    }

    /// Heading in degrees from `self` to `other` on the horizontal plane.
    pub fn heading_to(&self, other: &Position) -> Option<f64> {
        let (dx, dy) = (other.x - self.x, other.y - self.y);
        if dx == 0 && dy == 0 {
            return None;
        }
        Some((dy as f64).atan2(dx as f64).to_degrees().rem_euclid(360.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const X: Vec3 = Vec3 { x: 1.0, y: 0.0, z: 0.0 };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn dot(&self, other: &Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: &Vec3) -> Vec3 {
        Vec3 {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    pub fn normalized(&self) -> Option<Vec3> {
        let len = self.length();
        if len <= f64::EPSILON {
            return None;
        }
        Some(Vec3::new(self.x / len, self.y / len, self.z / len))
    }
}

/// Cost of moving between two cells. Diagonals cost the same as orthogonal
/// steps; climbing or descending is charged separately. Difficult terrain
/// doubles the whole move.
pub fn movement_cost(from: &Position, to: &Position, difficult_terrain: bool) -> u32 {
    let horizontal = (to.x - from.x).unsigned_abs().max((to.y - from.y).unsigned_abs());
    let vertical = (to.z - from.z).unsigned_abs();
    let cost = (horizontal + vertical) * UNITS_PER_CELL as u32;
    if difficult_terrain { cost * 2 } else { cost }
}

/// `-1` is self-targeting and always in range. `0` (touch) is not decided
/// here and always reports false; callers check adjacency with [`is_adjacent`].
pub fn is_in_range(from: &Position, to: &Position, range: i32) -> bool {
    match range {
        -1 => true,
        0 => false,
        r if r < 0 => false,
        r => from.distance(to) <= r as f64,
    }
}

pub fn is_adjacent(a: &Position, b: &Position) -> bool {
    (a.x - b.x).abs() <= 1 && (a.y - b.y).abs() <= 1 && (a.z - b.z).abs() <= 1
}

pub fn aoe_contains(template: &AoeTemplate, point: &Position) -> bool {
    let offset = template.origin.offset_to(point);
    let distance = offset.length();
    let size = template.size;

    match template.shape {
        AoeShape::Sphere => distance <= size,
        AoeShape::Cube => {
            let half_extent = size / 10.0;
            let cells = [
                (point.x - template.origin.x).abs(),
                (point.y - template.origin.y).abs(),
                (point.z - template.origin.z).abs(),
            ];
            cells.iter().all(|c| *c as f64 <= half_extent)
        }
        AoeShape::Cylinder => {
            let horizontal = (offset.x * offset.x + offset.y * offset.y).sqrt();
            let height = template.height.unwrap_or(size);
            horizontal <= size && offset.z.abs() <= height
        }
        AoeShape::Cone => {
            if distance > size {
                return false;
            }
            let (Some(dir), Some(to_target)) = (template.direction().normalized(), offset.normalized()) else {
                return false;
            };
            dir.dot(&to_target) >= CONE_COS_HALF_ANGLE
        }
        AoeShape::Line => {
            if distance > size {
                return false;
            }
            let width = template.width.unwrap_or(DEFAULT_LINE_WIDTH);
            let lateral = match template.direction().normalized() {
                Some(dir) => dir.cross(&offset).length(),
                None => distance,
            };
            lateral <= width / 2.0
        }
    }
}
