//! Positions and block coordinates.

use serde::{Deserialize, Serialize};

use crate::WorldId;

/// A point in one world's coordinate space, with an orientation.
///
/// Yaw and pitch ride along because spawn and teleport packets carry
/// them (quantized to a byte by the protocol layer). Most geometry
/// helpers ignore them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// The world this point belongs to.
    pub world: WorldId,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Horizontal facing, degrees.
    pub yaw: f32,
    /// Vertical facing, degrees.
    pub pitch: f32,
}

impl Position {
    /// Creates a position with zero orientation.
    pub fn new(world: WorldId, x: f64, y: f64, z: f64) -> Self {
        Self {
            world,
            x,
            y,
            z,
            yaw: 0.0,
            pitch: 0.0,
        }
    }

    /// Squared distance to another position.
    ///
    /// Both positions must be in the same world; the beam layer
    /// enforces that before ever comparing distances, so this is a
    /// debug-only assertion here.
    pub fn distance_squared(&self, other: &Position) -> f64 {
        debug_assert_eq!(self.world, other.world, "cross-world distance");
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    /// The integer block this position falls in (floor, not truncation:
    /// x = -0.3 is in block -1).
    pub fn block_pos(&self) -> BlockPos {
        BlockPos {
            x: self.x.floor() as i32,
            y: self.y.floor() as i32,
            z: self.z.floor() as i32,
        }
    }

    /// A copy snapped to integer block coordinates with orientation
    /// reset. Crystal beams apply this to every end assignment, so a
    /// crystal end never has a fractional component.
    pub fn block_snapped(&self) -> Position {
        let block = self.block_pos();
        Position::new(
            self.world,
            block.x as f64,
            block.y as f64,
            block.z as f64,
        )
    }

    /// A translated copy. Orientation is preserved.
    pub fn offset(&self, dx: f64, dy: f64, dz: f64) -> Position {
        Position {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
            ..*self
        }
    }

    /// Unit direction vector from `self` towards `other`.
    ///
    /// When the two points coincide the naive normalization divides by
    /// zero and every axis becomes NaN. Each axis independently falls
    /// back to 0.0 in that case, so a degenerate beam gets a zero
    /// corrective offset instead of NaN coordinates in its packets.
    pub fn direction_to(&self, other: &Position) -> (f64, f64, f64) {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        let dz = other.z - self.z;
        let len = (dx * dx + dy * dy + dz * dz).sqrt();
        let norm = |v: f64| {
            let n = v / len;
            if n.is_nan() { 0.0 } else { n }
        };
        (norm(dx), norm(dy), norm(dz))
    }
}

/// Integer block coordinates.
///
/// Used by crystal-beam metadata (the target indicator is a block
/// position on the wire) and for snap-idempotence checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}
