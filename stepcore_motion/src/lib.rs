//! # stepcore Motion Library
//!
//! Host-side step generation: turns velocity-trapezoid moves into
//! compressed, time-ordered step commands for the mcu.
//!
//! ## Pipeline
//!
//! 1. **Geometry**: [`geometry::Move`] evaluates distance and coordinate at
//!    any time inside a move.
//! 2. **Kinematics**: [`kinematics::StepperKinematics`] projects the
//!    coordinate onto one stepper's axis.
//! 3. **Step solver**: [`itersolve::Stepper`] finds the exact time of every
//!    step with false-position root finding.
//! 4. **Compressor**: [`stepcompress::StepCompressor`] packs step clocks into
//!    `(interval, count, add)` commands within a bounded timing error.
//! 5. **Synchronizer**: [`steppersync::StepperSync`] merges all compressors
//!    in requested-clock order, paced by the mcu move queue.
//!
//! ## Errors
//!
//! Compressor verification failures are fatal ([`error::StepError`]) and are
//! propagated unchanged through the solver and the synchronizer. Geometry
//! problems are caught at construction time ([`kinematics::KinematicsError`],
//! [`geometry::MoveError`]).

pub mod error;
pub mod geometry;
pub mod itersolve;
pub mod kinematics;
pub mod stepcompress;
pub mod steppersync;

pub use error::StepError;
pub use geometry::{AxisFlags, Coord, Move};
pub use itersolve::{StepSink, Stepper};
pub use kinematics::{MachineKinematics, StepperKinematics};
pub use stepcompress::{SharedCompressor, StepCompressor, StepMove};
pub use steppersync::StepperSync;
