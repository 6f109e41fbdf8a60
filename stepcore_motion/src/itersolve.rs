//! Iterative step solver.
//!
//! Finds the time of every step of one stepper during a move. A step happens
//! when the stepper position crosses the midpoint between two step
//! positions, so the solver searches for `last.position ± half_step` with
//! false-position root finding inside a `[low, high]` time bracket. The
//! bracket starts 100us wide and doubles until it contains a crossing or the
//! end of the move.
//!
//! The search never goes back in time: `low` starts at the last accepted
//! step, and a direction reversal only counts once the position is more than
//! half a step past the last step.
//!
//! # Usage
//!
//! ```rust
//! use stepcore_motion::geometry::{Coord, Move};
//! use stepcore_motion::itersolve::{StepSink, gen_steps};
//! use stepcore_motion::kinematics::{CartesianAxis, StepperKinematics};
//! use stepcore_motion::StepError;
//!
//! #[derive(Default)]
//! struct Collect(Vec<f64>, Option<bool>);
//!
//! impl StepSink for Collect {
//!     fn step_dir(&self) -> Option<bool> { self.1 }
//!     fn set_next_step_dir(&mut self, sdir: bool) -> Result<(), StepError> {
//!         self.1 = Some(sdir);
//!         Ok(())
//!     }
//!     fn append_step(&mut self, _print_time: f64, step_time: f64) -> Result<(), StepError> {
//!         self.0.push(step_time);
//!         Ok(())
//!     }
//! }
//!
//! let m = Move::new(0.0, 0.0, 1.0, 0.0, Coord::ZERO, Coord::new(1.0, 0.0, 0.0), 1.0, 1.0, 0.0).unwrap();
//! let kin = StepperKinematics::Cartesian(CartesianAxis::X);
//! let mut sink = Collect::default();
//! let pos = gen_steps(&kin, 0.1, 0.0, &mut sink, &m, 0.0, m.move_t).unwrap();
//! assert_eq!(sink.0.len(), 10);
//! assert!((pos - 1.0).abs() < 1e-9);
//! ```

use crate::error::StepError;
use crate::geometry::{AxisFlags, Move};
use crate::kinematics::{KinematicsError, StepperKinematics};
use crate::stepcompress::SharedCompressor;

/// Initial search window [s].
const SEEK_TIME_RESET: f64 = 0.000_100;

/// Time resolution of the root finder [s].
const TIME_EPSILON: f64 = 0.000_000_001;

/// Position tolerance for a direction change.
const DIR_CHANGE_EPSILON: f64 = 0.000_000_001;

/// Receiver of solver output.
pub trait StepSink {
    /// Direction of the last step sent, `None` if unknown.
    fn step_dir(&self) -> Option<bool>;

    /// Announce the direction of the following steps.
    fn set_next_step_dir(&mut self, sdir: bool) -> Result<(), StepError>;

    /// Record a step `step_time` seconds after `print_time`.
    fn append_step(&mut self, print_time: f64, step_time: f64) -> Result<(), StepError>;
}

#[derive(Debug, Clone, Copy)]
struct TimePos {
    time: f64,
    position: f64,
}

/// False-position search for the time `target` is crossed in `[low, high]`.
fn find_step(
    kin: &StepperKinematics,
    m: &Move,
    mut low: TimePos,
    mut high: TimePos,
    target: f64,
) -> TimePos {
    let mut best_guess = high;
    low.position -= target;
    high.position -= target;
    if high.position == 0.0 {
        return best_guess;
    }
    let high_sign = high.position.is_sign_negative();
    if high_sign == low.position.is_sign_negative() {
        // Target not bracketed.
        return TimePos {
            time: low.time,
            position: target,
        };
    }
    loop {
        let guess_time = (low.time * high.position - high.time * low.position)
            / (high.position - low.position);
        if (guess_time - best_guess.time).abs() <= TIME_EPSILON {
            break;
        }
        best_guess = TimePos {
            time: guess_time,
            position: kin.position(m, guess_time),
        };
        let guess_position = best_guess.position - target;
        if guess_position.is_sign_negative() == high_sign {
            high = TimePos {
                time: guess_time,
                position: guess_position,
            };
        } else {
            low = TimePos {
                time: guess_time,
                position: guess_position,
            };
        }
    }
    best_guess
}

/// Generate every step of `m` between the absolute times `abs_start` and
/// `abs_end`, starting from `commanded_pos`.
///
/// Returns the position of the last step taken.
pub fn gen_steps<S: StepSink + ?Sized>(
    kin: &StepperKinematics,
    step_dist: f64,
    commanded_pos: f64,
    sink: &mut S,
    m: &Move,
    abs_start: f64,
    abs_end: f64,
) -> Result<f64, StepError> {
    let half_step = 0.5 * step_dist;
    let start = (abs_start - m.print_time).max(0.0);
    let move_end = (abs_end - m.print_time).min(m.move_t);
    let mut last = TimePos {
        time: start,
        position: commanded_pos,
    };
    let mut low = last;
    let mut high = last;
    let mut seek_time_delta = SEEK_TIME_RESET;
    let mut sdir = sink.step_dir();

    loop {
        let dist = high.position - last.position;
        let mut widen = dist.abs() < half_step;
        let next_sdir = dist > 0.0;
        if !widen && sdir != Some(next_sdir) {
            if dist.abs() < half_step + DIR_CHANGE_EPSILON {
                // Not past the midpoint yet.
                widen = true;
            } else if last.time >= low.time && high.time > last.time + TIME_EPSILON {
                // Reseek so the previous step is not found again.
                high.time = (last.time + high.time) * 0.5;
                high.position = kin.position(m, high.time);
                continue;
            } else {
                sink.set_next_step_dir(next_sdir)?;
                sdir = Some(next_sdir);
            }
        }
        if widen {
            if high.time >= move_end {
                break;
            }
            low = high;
            high.time = (last.time + seek_time_delta).min(move_end);
            seek_time_delta += seek_time_delta;
            high.position = kin.position(m, high.time);
            continue;
        }

        let forward = sdir == Some(true);
        let target = last.position + if forward { half_step } else { -half_step };
        let next = find_step(kin, m, low, high, target);
        sink.append_step(m.print_time, next.time)?;
        seek_time_delta = (next.time - last.time).max(TIME_EPSILON);
        last = TimePos {
            time: next.time,
            position: target + if forward { half_step } else { -half_step },
        };
        low = next;
        if low.time < high.time {
            continue;
        }
        high.time = (last.time + seek_time_delta).min(move_end);
        seek_time_delta += seek_time_delta;
        high.position = kin.position(m, high.time);
    }
    Ok(last.position)
}

/// One physical stepper: its transform, step size and compressor.
#[derive(Debug)]
pub struct Stepper {
    name: String,
    kin: StepperKinematics,
    step_dist: f64,
    commanded_pos: f64,
    active_axes: AxisFlags,
    sc: SharedCompressor,
}

impl Stepper {
    pub fn new(
        name: impl Into<String>,
        kin: StepperKinematics,
        step_dist: f64,
        sc: SharedCompressor,
    ) -> Result<Self, KinematicsError> {
        if !(step_dist.is_finite() && step_dist > 0.0) {
            return Err(KinematicsError::InvalidStepDistance(step_dist));
        }
        Ok(Self {
            name: name.into(),
            kin,
            step_dist,
            commanded_pos: 0.0,
            active_axes: kin.active_axes(),
            sc,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kinematics(&self) -> &StepperKinematics {
        &self.kin
    }

    pub fn step_dist(&self) -> f64 {
        self.step_dist
    }

    pub fn commanded_pos(&self) -> f64 {
        self.commanded_pos
    }

    pub fn compressor(&self) -> &SharedCompressor {
        &self.sc
    }

    /// Whether travel along `axis` moves this stepper.
    pub fn is_active_axis(&self, axis: AxisFlags) -> bool {
        self.active_axes.intersects(axis)
    }

    /// Set the stepper position from a tool coordinate.
    pub fn set_position(&mut self, x: f64, y: f64, z: f64) {
        self.commanded_pos = self.kin.calc_position_from_coord(x, y, z);
    }

    /// Stepper position with the tool at `(x, y, z)`.
    pub fn calc_position_from_coord(&self, x: f64, y: f64, z: f64) -> f64 {
        self.kin.calc_position_from_coord(x, y, z)
    }

    /// Generate all steps of `m`.
    ///
    /// Moves along axes this stepper does not follow are skipped.
    pub fn generate_steps(&mut self, m: &Move) -> Result<(), StepError> {
        self.generate_steps_range(m, m.print_time, m.end_time())
    }

    /// Generate the steps of `m` falling in `[abs_start, abs_end]`.
    pub fn generate_steps_range(
        &mut self,
        m: &Move,
        abs_start: f64,
        abs_end: f64,
    ) -> Result<(), StepError> {
        if !self.active_axes.intersects(m.axes_involved()) {
            return Ok(());
        }
        let mut sc = self.sc.lock();
        self.commanded_pos = gen_steps(
            &self.kin,
            self.step_dist,
            self.commanded_pos,
            &mut *sc,
            m,
            abs_start,
            abs_end,
        )?;
        Ok(())
    }
}
