//! Cartesian axis projection.

use crate::geometry::{AxisFlags, Coord, Move};

/// One of the three cartesian axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartesianAxis {
    X,
    Y,
    Z,
}

impl CartesianAxis {
    #[inline]
    pub fn at_coord(self, c: Coord) -> f64 {
        match self {
            Self::X => c.x,
            Self::Y => c.y,
            Self::Z => c.z,
        }
    }

    /// Axis position at `move_time`, without building the full coordinate.
    #[inline]
    pub fn position(self, m: &Move, move_time: f64) -> f64 {
        let d = m.distance(move_time);
        match self {
            Self::X => m.start_pos.x + m.axes_r.x * d,
            Self::Y => m.start_pos.y + m.axes_r.y * d,
            Self::Z => m.start_pos.z + m.axes_r.z * d,
        }
    }

    pub const fn active_axes(self) -> AxisFlags {
        match self {
            Self::X => AxisFlags::X,
            Self::Y => AxisFlags::Y,
            Self::Z => AxisFlags::Z,
        }
    }
}
