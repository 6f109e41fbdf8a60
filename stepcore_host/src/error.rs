//! Host errors.

use std::path::PathBuf;
use stepcore_common::config::ConfigError;
use stepcore_motion::StepError;
use stepcore_motion::geometry::MoveError;
use stepcore_motion::kinematics::KinematicsError;
use stepcore_serial::SerialError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Kinematics(#[from] KinematicsError),

    #[error(transparent)]
    Move(#[from] MoveError),

    #[error(transparent)]
    Step(#[from] StepError),

    #[error(transparent)]
    Serial(#[from] SerialError),

    #[error("cannot open serial device {}: {source}", path.display())]
    Link {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("mcu did not acknowledge all blocks within {0:.1} s")]
    Timeout(f64),

    #[error("report encoding failed: {0}")]
    Report(#[from] serde_json::Error),
}
