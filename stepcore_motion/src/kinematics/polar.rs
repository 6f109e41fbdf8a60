//! Polar projections: rotating bed angle and radial arm.
//!
//! The angle is the raw `atan2(y, x)` in `(-pi, pi]`. Moves that cross the
//! negative x axis jump by `2 pi` and are not unwrapped into a multi-turn
//! position; callers must split such moves.

use crate::geometry::{AxisFlags, Coord, Move};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolarAxis {
    /// Bed rotation [rad].
    Angle,
    /// Distance from the bed center [mm].
    Radius,
}

impl PolarAxis {
    #[inline]
    pub fn at_coord(self, c: Coord) -> f64 {
        match self {
            Self::Angle => c.y.atan2(c.x),
            Self::Radius => c.x.hypot(c.y),
        }
    }

    #[inline]
    pub fn position(self, m: &Move, move_time: f64) -> f64 {
        self.at_coord(m.coord(move_time))
    }

    pub const fn active_axes(self) -> AxisFlags {
        AxisFlags::X.union(AxisFlags::Y)
    }
}
