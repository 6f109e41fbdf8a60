//! Linear delta tower projection.
//!
//! Each carriage sits `sqrt(arm² - dx² - dy²)` above the effector, where
//! `dx, dy` is the horizontal offset from the effector to the tower. Points
//! outside the reachable disc yield NaN; boundary checks happen before moves
//! reach the solver.

use crate::geometry::{AxisFlags, Coord, Move};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeltaTower {
    /// Squared diagonal rod length [mm²].
    pub arm2: f64,
    pub tower_x: f64,
    pub tower_y: f64,
}

impl DeltaTower {
    /// Tower at `angle_deg` on a circle of `radius`.
    pub fn new(arm_length: f64, radius: f64, angle_deg: f64) -> Self {
        let angle = angle_deg.to_radians();
        Self {
            arm2: arm_length * arm_length,
            tower_x: angle.cos() * radius,
            tower_y: angle.sin() * radius,
        }
    }

    #[inline]
    pub fn at_coord(&self, c: Coord) -> f64 {
        let dx = self.tower_x - c.x;
        let dy = self.tower_y - c.y;
        (self.arm2 - dx * dx - dy * dy).sqrt() + c.z
    }

    #[inline]
    pub fn position(&self, m: &Move, move_time: f64) -> f64 {
        self.at_coord(m.coord(move_time))
    }

    pub const fn active_axes(&self) -> AxisFlags {
        AxisFlags::all()
    }
}
