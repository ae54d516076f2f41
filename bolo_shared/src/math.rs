//! Math types.
//!
//! Replicated state only needs a planar position and a heading, so this
//! module stays small and deterministic.

/// Planar position plus rotation (radians).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Transform {
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
}

impl Transform {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        rotation: 0.0,
    };

    pub const fn new(x: f32, y: f32, rotation: f32) -> Self {
        Self { x, y, rotation }
    }

    /// Squared distance between the two positions, ignoring rotation.
    pub fn distance_sq(self, other: Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}
