//! Linear extruder projection.
//!
//! Extruder moves carry the filament position in `start_pos.x` and travel
//! along `+x`/`-x`, so the stepper position is the start plus the signed
//! distance, with no coordinate step.

use crate::geometry::{AxisFlags, Coord, Move};

#[inline]
pub fn position(m: &Move, move_time: f64) -> f64 {
    m.start_pos.x + m.axes_r.x * m.distance(move_time)
}

#[inline]
pub fn at_coord(c: Coord) -> f64 {
    c.x
}

pub const fn active_axes() -> AxisFlags {
    AxisFlags::X
}
