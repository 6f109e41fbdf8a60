//! Coordinates and velocity-trapezoid moves.
//!
//! A [`Move`] is immutable once built. Its distance along the direction of
//! travel is a piecewise function of the time since `print_time`:
//!
//! ```text
//!   v
//!   |     cruise_v ________
//!   |            /|        |\
//!   |           / |        | \
//!   |  start_v /  |        |  \ end_v
//!   +---------+---+--------+---+------ t
//!             0 accel_t  +cruise_t  move_t
//! ```

use bitflags::bitflags;
use std::ops::{Add, Mul, Sub};
use thiserror::Error;

/// Cartesian coordinate [mm].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Coord {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean length.
    #[inline]
    pub fn norm(self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<[f64; 3]> for Coord {
    fn from(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

impl Add for Coord {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Coord {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Coord {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

bitflags! {
    /// Cartesian axes a move travels along, or a stepper depends on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AxisFlags: u8 {
        const X = 1 << 0;
        const Y = 1 << 1;
        const Z = 1 << 2;
    }
}

/// Rejected move parameters.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum MoveError {
    #[error("move phase durations must be finite and >= 0")]
    InvalidDuration,

    #[error("move parameters must be finite")]
    NonFinite,

    #[error("velocities {start_v}/{end_v} cannot be joined over {distance} mm at accel {accel}")]
    Unreachable {
        start_v: f64,
        end_v: f64,
        distance: f64,
        accel: f64,
    },
}

/// Quadratic `c1 * t + c2 * t²` (one acceleration phase).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct AccelPhase {
    c1: f64,
    c2: f64,
}

impl AccelPhase {
    #[inline]
    fn eval(&self, t: f64) -> f64 {
        (self.c1 + self.c2 * t) * t
    }
}

/// Velocity-trapezoid move along a straight line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Move {
    /// Absolute start time [s].
    pub print_time: f64,
    /// Total duration [s].
    pub move_t: f64,
    pub accel_t: f64,
    pub cruise_t: f64,
    pub cruise_v: f64,
    cruise_start_d: f64,
    decel_start_d: f64,
    accel: AccelPhase,
    decel: AccelPhase,
    pub start_pos: Coord,
    /// Unit direction (zero vector for a move with no travel).
    pub axes_r: Coord,
}

impl Move {
    /// Build a move from its phase durations.
    ///
    /// `axes_d` is the total displacement; it is normalized internally.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        print_time: f64,
        accel_t: f64,
        cruise_t: f64,
        decel_t: f64,
        start_pos: Coord,
        axes_d: Coord,
        start_v: f64,
        cruise_v: f64,
        accel: f64,
    ) -> Result<Self, MoveError> {
        for t in [accel_t, cruise_t, decel_t] {
            if !(t.is_finite() && t >= 0.0) {
                return Err(MoveError::InvalidDuration);
            }
        }
        if !(print_time.is_finite()
            && start_v.is_finite()
            && cruise_v.is_finite()
            && accel.is_finite()
            && start_pos.is_finite()
            && axes_d.is_finite())
        {
            return Err(MoveError::NonFinite);
        }

        let move_d = axes_d.norm();
        let axes_r = if move_d > 0.0 {
            axes_d * (1.0 / move_d)
        } else {
            Coord::ZERO
        };
        let cruise_start_d = accel_t * 0.5 * (cruise_v + start_v);
        let half_accel = 0.5 * accel;
        Ok(Self {
            print_time,
            move_t: accel_t + cruise_t + decel_t,
            accel_t,
            cruise_t,
            cruise_v,
            cruise_start_d,
            decel_start_d: cruise_start_d + cruise_t * cruise_v,
            accel: AccelPhase {
                c1: start_v,
                c2: half_accel,
            },
            decel: AccelPhase {
                c1: cruise_v,
                c2: -half_accel,
            },
            start_pos,
            axes_r,
        })
    }

    /// Plan a trapezoid between two points from velocity limits.
    ///
    /// `cruise_v` is lowered when the distance is too short to reach it
    /// (triangle profile).
    pub fn from_trapezoid(
        print_time: f64,
        start_pos: Coord,
        end_pos: Coord,
        start_v: f64,
        cruise_v: f64,
        end_v: f64,
        accel: f64,
    ) -> Result<Self, MoveError> {
        let axes_d = end_pos - start_pos;
        let distance = axes_d.norm();
        if !distance.is_finite() {
            return Err(MoveError::NonFinite);
        }
        if distance == 0.0 {
            return Self::new(print_time, 0.0, 0.0, 0.0, start_pos, axes_d, 0.0, 0.0, 0.0);
        }
        let unreachable = MoveError::Unreachable {
            start_v,
            end_v,
            distance,
            accel,
        };
        if !(accel > 0.0) || start_v < 0.0 || end_v < 0.0 || !(cruise_v > 0.0) {
            return Err(unreachable);
        }

        let peak_v2 = accel * distance + 0.5 * (start_v * start_v + end_v * end_v);
        let cruise_v = cruise_v.min(peak_v2.sqrt());
        if cruise_v < start_v.max(end_v) {
            return Err(unreachable);
        }

        let accel_t = (cruise_v - start_v) / accel;
        let decel_t = (cruise_v - end_v) / accel;
        let accel_d = 0.5 * (start_v + cruise_v) * accel_t;
        let decel_d = 0.5 * (end_v + cruise_v) * decel_t;
        let cruise_t = ((distance - accel_d - decel_d) / cruise_v).max(0.0);

        Self::new(
            print_time, accel_t, cruise_t, decel_t, start_pos, axes_d, start_v, cruise_v, accel,
        )
    }

    /// Absolute end time [s].
    #[inline]
    pub fn end_time(&self) -> f64 {
        self.print_time + self.move_t
    }

    /// Distance travelled `move_time` seconds into the move.
    pub fn distance(&self, move_time: f64) -> f64 {
        if move_time < self.accel_t {
            return self.accel.eval(move_time);
        }
        let t = move_time - self.accel_t;
        if t < self.cruise_t {
            return self.cruise_start_d + self.cruise_v * t;
        }
        self.decel_start_d + self.decel.eval(t - self.cruise_t)
    }

    /// Tool coordinate `move_time` seconds into the move.
    #[inline]
    pub fn coord(&self, move_time: f64) -> Coord {
        self.start_pos + self.axes_r * self.distance(move_time)
    }

    /// Axes with non-zero travel.
    pub fn axes_involved(&self) -> AxisFlags {
        let mut flags = AxisFlags::empty();
        flags.set(AxisFlags::X, self.axes_r.x != 0.0);
        flags.set(AxisFlags::Y, self.axes_r.y != 0.0);
        flags.set(AxisFlags::Z, self.axes_r.z != 0.0);
        flags
    }
}
