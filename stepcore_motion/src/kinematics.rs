//! Kinematic transforms.
//!
//! Every stepper is driven by one [`StepperKinematics`] value: a pure
//! function from tool coordinate to stepper position. Dispatch is a `match`
//! on the geometry variant; the per-geometry math lives in the submodules.
//!
//! # Usage
//!
//! ```rust
//! use stepcore_common::machine::KinematicsConfig;
//! use stepcore_motion::kinematics::MachineKinematics;
//!
//! let kin = MachineKinematics::from_config(&KinematicsConfig::CoreXy).unwrap();
//! assert_eq!(kin.steppers().len(), 3);
//! ```

pub mod cartesian;
pub mod corexy;
pub mod delta;
pub mod extruder;
pub mod polar;
pub mod winch;

pub use cartesian::CartesianAxis;
pub use corexy::CoreXyRail;
pub use delta::DeltaTower;
pub use polar::PolarAxis;
pub use winch::WinchAnchor;

use crate::geometry::{AxisFlags, Coord, Move};
use stepcore_common::machine::KinematicsConfig;
use thiserror::Error;

/// Construction-time geometry errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KinematicsError {
    #[error("delta arm length {arm_length} must exceed tower radius {radius}")]
    ArmTooShort { arm_length: f64, radius: f64 },

    #[error("winch needs at least 3 anchors, got {0}")]
    TooFewAnchors(usize),

    #[error("winch anchors {0} and {1} coincide")]
    CoincidentAnchors(usize, usize),

    #[error("step distance must be finite and > 0 (got {0})")]
    InvalidStepDistance(f64),
}

/// Position function of a single stepper.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepperKinematics {
    Cartesian(CartesianAxis),
    CoreXy(CoreXyRail),
    Polar(PolarAxis),
    Delta(DeltaTower),
    Winch(WinchAnchor),
    Extruder,
}

impl StepperKinematics {
    /// Stepper position `move_time` seconds into `m`.
    #[inline]
    pub fn position(&self, m: &Move, move_time: f64) -> f64 {
        match self {
            Self::Cartesian(axis) => axis.position(m, move_time),
            Self::CoreXy(rail) => rail.position(m, move_time),
            Self::Polar(axis) => axis.position(m, move_time),
            Self::Delta(tower) => tower.position(m, move_time),
            Self::Winch(anchor) => anchor.position(m, move_time),
            Self::Extruder => extruder::position(m, move_time),
        }
    }

    /// Stepper position with the tool at `(x, y, z)`.
    pub fn calc_position_from_coord(&self, x: f64, y: f64, z: f64) -> f64 {
        let c = Coord::new(x, y, z);
        match self {
            Self::Cartesian(axis) => axis.at_coord(c),
            Self::CoreXy(rail) => rail.at_coord(c),
            Self::Polar(axis) => axis.at_coord(c),
            Self::Delta(tower) => tower.at_coord(c),
            Self::Winch(anchor) => anchor.at_coord(c),
            Self::Extruder => extruder::at_coord(c),
        }
    }

    /// Cartesian axes whose travel moves this stepper.
    pub fn active_axes(&self) -> AxisFlags {
        match self {
            Self::Cartesian(axis) => axis.active_axes(),
            Self::CoreXy(rail) => rail.active_axes(),
            Self::Polar(axis) => axis.active_axes(),
            Self::Delta(tower) => tower.active_axes(),
            Self::Winch(anchor) => anchor.active_axes(),
            Self::Extruder => extruder::active_axes(),
        }
    }
}

/// Per-stepper transforms of one configured machine, in `[[stepper]]` order.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineKinematics {
    name: &'static str,
    steppers: Vec<StepperKinematics>,
}

impl MachineKinematics {
    /// Instantiate the transform set for a geometry.
    pub fn from_config(config: &KinematicsConfig) -> Result<Self, KinematicsError> {
        let steppers = match config {
            KinematicsConfig::Cartesian => vec![
                StepperKinematics::Cartesian(CartesianAxis::X),
                StepperKinematics::Cartesian(CartesianAxis::Y),
                StepperKinematics::Cartesian(CartesianAxis::Z),
            ],
            KinematicsConfig::CoreXy => vec![
                StepperKinematics::CoreXy(CoreXyRail::Plus),
                StepperKinematics::CoreXy(CoreXyRail::Minus),
                StepperKinematics::Cartesian(CartesianAxis::Z),
            ],
            KinematicsConfig::Polar => vec![
                StepperKinematics::Polar(PolarAxis::Angle),
                StepperKinematics::Polar(PolarAxis::Radius),
                StepperKinematics::Cartesian(CartesianAxis::Z),
            ],
            KinematicsConfig::Delta {
                arm_length,
                radius,
                angles,
            } => {
                if arm_length <= radius {
                    return Err(KinematicsError::ArmTooShort {
                        arm_length: *arm_length,
                        radius: *radius,
                    });
                }
                angles
                    .iter()
                    .map(|&a| StepperKinematics::Delta(DeltaTower::new(*arm_length, *radius, a)))
                    .collect()
            }
            KinematicsConfig::Winch { anchors } => {
                if anchors.len() < 3 {
                    return Err(KinematicsError::TooFewAnchors(anchors.len()));
                }
                for (i, a) in anchors.iter().enumerate() {
                    if let Some(j) = anchors[..i].iter().position(|b| b == a) {
                        return Err(KinematicsError::CoincidentAnchors(j, i));
                    }
                }
                anchors
                    .iter()
                    .map(|&a| StepperKinematics::Winch(WinchAnchor::new(Coord::from(a))))
                    .collect()
            }
        };
        Ok(Self {
            name: config.name(),
            steppers,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn steppers(&self) -> &[StepperKinematics] {
        &self.steppers
    }

    /// Positions of every stepper with the tool at `c`.
    pub fn stepper_positions(&self, c: Coord) -> Vec<f64> {
        self.steppers
            .iter()
            .map(|k| k.calc_position_from_coord(c.x, c.y, c.z))
            .collect()
    }
}
