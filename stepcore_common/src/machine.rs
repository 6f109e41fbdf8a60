//! Machine description types.
//!
//! This module contains the configuration loaded from `machine.toml`:
//! - `HostConfig` - top-level document
//! - `McuConfig` - clock, link, and command ids of the microcontroller
//! - `KinematicsConfig` - machine geometry, tagged by `type`
//! - `StepperConfig` - per-stepper parameters
//!
//! Steppers are bound to the geometry by position in the `[[stepper]]`
//! list:
//!
//! | type | steppers |
//! |------|----------|
//! | cartesian | x, y, z |
//! | corexy | x+y, x-y, z |
//! | polar | bed angle, arm radius, z |
//! | delta | tower a, tower b, tower c |
//! | winch | one per anchor |

use crate::config::{ConfigError, SharedConfig};
use crate::consts::{
    DEFAULT_BAUD, DEFAULT_CLOCK_FREQ, DEFAULT_DELTA_ANGLES, DEFAULT_MAX_ERROR,
    DEFAULT_MOVE_QUEUE_DEPTH, DEFAULT_RECEIVE_WINDOW, DEFAULT_SERIAL_PATH,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

fn default_clock_freq() -> f64 {
    DEFAULT_CLOCK_FREQ
}

fn default_baud() -> u32 {
    DEFAULT_BAUD
}

fn default_receive_window() -> u32 {
    DEFAULT_RECEIVE_WINDOW
}

fn default_move_queue_depth() -> usize {
    DEFAULT_MOVE_QUEUE_DEPTH
}

fn default_serial() -> PathBuf {
    PathBuf::from(DEFAULT_SERIAL_PATH)
}

fn default_max_error() -> f64 {
    DEFAULT_MAX_ERROR
}

fn default_delta_angles() -> [f64; 3] {
    DEFAULT_DELTA_ANGLES
}

fn default_queue_step_msgid() -> u32 {
    20
}

fn default_set_next_step_dir_msgid() -> u32 {
    21
}

/// Top-level machine description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    pub shared: SharedConfig,
    pub mcu: McuConfig,
    pub kinematics: KinematicsConfig,
    #[serde(rename = "stepper", default)]
    pub steppers: Vec<StepperConfig>,
    #[serde(default)]
    pub extruder: Option<StepperConfig>,
}

impl HostConfig {
    /// Validate the whole document.
    ///
    /// # Validation Rules
    /// 1. Every section validates on its own
    /// 2. Stepper count matches the geometry
    /// 3. Object ids are unique across steppers and the extruder
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.mcu.validate()?;
        self.kinematics.validate()?;

        let expected = self.kinematics.stepper_count();
        if self.steppers.len() != expected {
            return Err(ConfigError::ValidationError(format!(
                "{} kinematics needs {} steppers, found {}",
                self.kinematics.name(),
                expected,
                self.steppers.len()
            )));
        }

        let mut oids = HashSet::new();
        for stepper in self.steppers.iter().chain(self.extruder.iter()) {
            stepper.validate()?;
            if !oids.insert(stepper.oid) {
                return Err(ConfigError::ValidationError(format!(
                    "Stepper '{}': duplicate oid {}",
                    stepper.name, stepper.oid
                )));
            }
        }
        Ok(())
    }

    /// All step-generating objects in oid declaration order, extruder last.
    pub fn all_steppers(&self) -> impl Iterator<Item = &StepperConfig> {
        self.steppers.iter().chain(self.extruder.iter())
    }
}

/// Microcontroller parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McuConfig {
    /// Nominal mcu clock frequency [Hz].
    #[serde(default = "default_clock_freq")]
    pub clock_freq: f64,

    /// Serial device path.
    #[serde(default = "default_serial")]
    pub serial: PathBuf,

    #[serde(default = "default_baud")]
    pub baud: u32,

    /// Receive buffer the mcu advertises [bytes].
    #[serde(default = "default_receive_window")]
    pub receive_window: u32,

    /// Number of move-queue slots on the mcu.
    #[serde(default = "default_move_queue_depth")]
    pub move_queue_depth: usize,

    #[serde(default = "default_queue_step_msgid")]
    pub queue_step_msgid: u32,

    #[serde(default = "default_set_next_step_dir_msgid")]
    pub set_next_step_dir_msgid: u32,
}

impl Default for McuConfig {
    fn default() -> Self {
        Self {
            clock_freq: DEFAULT_CLOCK_FREQ,
            serial: default_serial(),
            baud: DEFAULT_BAUD,
            receive_window: DEFAULT_RECEIVE_WINDOW,
            move_queue_depth: DEFAULT_MOVE_QUEUE_DEPTH,
            queue_step_msgid: default_queue_step_msgid(),
            set_next_step_dir_msgid: default_set_next_step_dir_msgid(),
        }
    }
}

impl McuConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.clock_freq.is_finite() && self.clock_freq > 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "mcu clock_freq must be > 0 (got {})",
                self.clock_freq
            )));
        }
        if self.baud == 0 {
            return Err(ConfigError::ValidationError(
                "mcu baud must be greater than 0".to_string(),
            ));
        }
        if self.move_queue_depth == 0 {
            return Err(ConfigError::ValidationError(
                "mcu move_queue_depth must be greater than 0".to_string(),
            ));
        }
        if self.queue_step_msgid == self.set_next_step_dir_msgid {
            return Err(ConfigError::ValidationError(
                "queue_step_msgid and set_next_step_dir_msgid must differ".to_string(),
            ));
        }
        Ok(())
    }
}

/// Machine geometry.
///
/// # TOML Example
///
/// ```toml
/// [kinematics]
/// type = "delta"
/// arm_length = 250.0
/// radius = 120.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum KinematicsConfig {
    Cartesian,
    CoreXy,
    Polar,
    Delta {
        /// Diagonal rod length [mm].
        arm_length: f64,
        /// Horizontal distance from the center to each tower [mm].
        radius: f64,
        /// Tower angles [deg].
        #[serde(default = "default_delta_angles")]
        angles: [f64; 3],
    },
    Winch {
        /// Cable anchor points [mm], one per stepper.
        anchors: Vec<[f64; 3]>,
    },
}

impl KinematicsConfig {
    /// Lowercase geometry name, as written in TOML.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Cartesian => "cartesian",
            Self::CoreXy => "corexy",
            Self::Polar => "polar",
            Self::Delta { .. } => "delta",
            Self::Winch { .. } => "winch",
        }
    }

    /// Number of `[[stepper]]` entries the geometry drives.
    pub fn stepper_count(&self) -> usize {
        match self {
            Self::Cartesian | Self::CoreXy | Self::Polar | Self::Delta { .. } => 3,
            Self::Winch { anchors } => anchors.len(),
        }
    }

    /// Reject geometries no machine can have.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Cartesian | Self::CoreXy | Self::Polar => Ok(()),
            Self::Delta {
                arm_length,
                radius,
                angles,
            } => {
                if !(*radius > 0.0) {
                    return Err(ConfigError::ValidationError(format!(
                        "delta radius must be > 0 (got {radius})"
                    )));
                }
                if arm_length <= radius {
                    return Err(ConfigError::ValidationError(format!(
                        "delta arm_length ({arm_length}) must exceed radius ({radius})"
                    )));
                }
                if angles.iter().any(|a| !a.is_finite()) {
                    return Err(ConfigError::ValidationError(
                        "delta tower angles must be finite".to_string(),
                    ));
                }
                Ok(())
            }
            Self::Winch { anchors } => {
                if anchors.len() < 3 {
                    return Err(ConfigError::ValidationError(format!(
                        "winch needs at least 3 anchors, found {}",
                        anchors.len()
                    )));
                }
                for (i, a) in anchors.iter().enumerate() {
                    if anchors[..i].iter().any(|b| b == a) {
                        return Err(ConfigError::ValidationError(format!(
                            "winch anchor {i} coincides with an earlier anchor"
                        )));
                    }
                }
                Ok(())
            }
        }
    }
}

/// Per-stepper parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepperConfig {
    pub name: String,

    /// Object id on the mcu.
    pub oid: u32,

    /// Travel per step pulse [mm] (or [rad] for the polar bed).
    pub step_distance: f64,

    /// Maximum step timing error [s].
    #[serde(default = "default_max_error")]
    pub max_error: f64,

    #[serde(default)]
    pub invert_dir: bool,
}

impl StepperConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "Stepper with oid {} has empty name",
                self.oid
            )));
        }
        if !(self.step_distance.is_finite() && self.step_distance > 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "Stepper '{}': step_distance must be > 0 (got {})",
                self.name, self.step_distance
            )));
        }
        if !(self.max_error.is_finite() && self.max_error >= 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "Stepper '{}': max_error must be >= 0 (got {})",
                self.name, self.max_error
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigLoader;

    const CARTESIAN: &str = r#"
[shared]
service_name = "bench-printer"

[mcu]
clock_freq = 16000000.0

[kinematics]
type = "cartesian"

[[stepper]]
name = "stepper_x"
oid = 0
step_distance = 0.0125

[[stepper]]
name = "stepper_y"
oid = 1
step_distance = 0.0125

[[stepper]]
name = "stepper_z"
oid = 2
step_distance = 0.0025
invert_dir = true
"#;

    #[test]
    fn cartesian_document_loads_with_defaults() {
        let config = HostConfig::from_toml(CARTESIAN).unwrap();
        config.validate().unwrap();

        assert_eq!(config.kinematics, KinematicsConfig::Cartesian);
        assert_eq!(config.mcu.baud, DEFAULT_BAUD);
        assert_eq!(config.mcu.move_queue_depth, DEFAULT_MOVE_QUEUE_DEPTH);
        assert_eq!(config.steppers.len(), 3);
        assert!(config.steppers[2].invert_dir);
        assert_eq!(config.steppers[0].max_error, DEFAULT_MAX_ERROR);
        assert!(config.extruder.is_none());
    }

    #[test]
    fn delta_angles_default() {
        let k: KinematicsConfig =
            toml::from_str("type = \"delta\"\narm_length = 250.0\nradius = 120.0").unwrap();
        match k {
            KinematicsConfig::Delta { angles, .. } => assert_eq!(angles, DEFAULT_DELTA_ANGLES),
            other => panic!("unexpected geometry {other:?}"),
        }
    }

    #[test]
    fn delta_arm_must_exceed_radius() {
        let k = KinematicsConfig::Delta {
            arm_length: 100.0,
            radius: 100.0,
            angles: DEFAULT_DELTA_ANGLES,
        };
        assert!(matches!(k.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn winch_needs_three_distinct_anchors() {
        let two = KinematicsConfig::Winch {
            anchors: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
        };
        assert!(two.validate().is_err());

        let coincident = KinematicsConfig::Winch {
            anchors: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 0.0]],
        };
        assert!(coincident.validate().is_err());

        let ok = KinematicsConfig::Winch {
            anchors: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        };
        ok.validate().unwrap();
        assert_eq!(ok.stepper_count(), 3);
    }

    #[test]
    fn stepper_count_mismatch_is_rejected() {
        let mut config = HostConfig::from_toml(CARTESIAN).unwrap();
        config.steppers.pop();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("needs 3 steppers"));
    }

    #[test]
    fn duplicate_oid_is_rejected() {
        let mut config = HostConfig::from_toml(CARTESIAN).unwrap();
        config.extruder = Some(StepperConfig {
            name: "extruder".to_string(),
            oid: 1,
            step_distance: 0.002,
            max_error: DEFAULT_MAX_ERROR,
            invert_dir: false,
        });
        assert!(config.validate().is_err());
        assert_eq!(config.all_steppers().count(), 4);
    }

    #[test]
    fn non_positive_step_distance_is_rejected() {
        let stepper = StepperConfig {
            name: "stepper_x".to_string(),
            oid: 0,
            step_distance: 0.0,
            max_error: DEFAULT_MAX_ERROR,
            invert_dir: false,
        };
        assert!(stepper.validate().is_err());
    }

    #[test]
    fn unknown_geometry_fails_to_parse() {
        let doc = CARTESIAN.replace("\"cartesian\"", "\"scara\"");
        assert!(matches!(
            HostConfig::from_toml(&doc),
            Err(ConfigError::ParseError(_))
        ));
    }
}
