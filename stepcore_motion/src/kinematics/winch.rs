//! Cable winch projection: cable length from a fixed anchor.

use crate::geometry::{AxisFlags, Coord, Move};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WinchAnchor {
    pub anchor: Coord,
}

impl WinchAnchor {
    pub const fn new(anchor: Coord) -> Self {
        Self { anchor }
    }

    #[inline]
    pub fn at_coord(&self, c: Coord) -> f64 {
        (self.anchor - c).norm()
    }

    #[inline]
    pub fn position(&self, m: &Move, move_time: f64) -> f64 {
        self.at_coord(m.coord(move_time))
    }

    pub const fn active_axes(&self) -> AxisFlags {
        AxisFlags::all()
    }
}
