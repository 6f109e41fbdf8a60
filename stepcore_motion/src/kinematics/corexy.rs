//! CoreXY belt projections: the A motor follows `x + y`, the B motor `x - y`.

use crate::geometry::{AxisFlags, Coord, Move};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreXyRail {
    Plus,
    Minus,
}

impl CoreXyRail {
    #[inline]
    pub fn at_coord(self, c: Coord) -> f64 {
        match self {
            Self::Plus => c.x + c.y,
            Self::Minus => c.x - c.y,
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
