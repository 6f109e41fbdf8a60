//! TOML configuration loading.
//!
//! Any deserializable type gets [`ConfigLoader`] for free. Documents embed
//! a `[shared]` table ([`SharedConfig`]) with the log level and the
//! instance name; the machine description in [`crate::machine`] is the main
//! user.
//!
//! # Usage
//!
//! ```rust,no_run
//! use serde::Deserialize;
//! use stepcore_common::config::{ConfigError, ConfigLoader, SharedConfig};
//!
//! #[derive(Debug, Deserialize)]
//! struct BenchRig {
//!     shared: SharedConfig,
//!     baud: u32,
//! }
//!
//! fn main() -> Result<(), ConfigError> {
//!     let rig = BenchRig::load("rig.toml")?;
//!     rig.shared.validate()?;
//!     println!("{} at {} baud", rig.shared.service_name, rig.baud);
//!     Ok(())
//! }
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why a configuration could not be used.
///
/// Raised while building a machine only; a running pipeline never sees it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("configuration file {} not found", .0.display())]
    FileNotFound(PathBuf),

    #[error("cannot read {}: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },

    #[error("invalid TOML: {0}")]
    ParseError(String),

    /// A value parsed but describes an impossible machine.
    #[error("invalid configuration: {0}")]
    ValidationError(String),
}

/// Verbosity of the `[shared]` table, lowercase in TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Every frame on the wire.
    Trace,
    /// Retransmits, resyncs, compressor decisions.
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Filter directive for `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// The `[shared]` table.
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "printer-host"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    #[serde(default)]
    pub log_level: LogLevel,

    /// Instance name, shown in logs.
    pub service_name: String,
}

impl SharedConfig {
    /// The service name must be non-blank.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "shared.service_name must not be blank".to_string(),
            ));
        }
        Ok(())
    }
}

/// Read a type from a TOML document.
///
/// Blanket-implemented for every [`DeserializeOwned`] type. Loading does not
/// validate; callers run the type's own `validate()` afterwards.
pub trait ConfigLoader: Sized + DeserializeOwned {
    /// Read and parse the file at `path`.
    fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound(path.to_path_buf()),
            _ => ConfigError::Unreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            },
        })?;
        Self::from_toml(&content)
    }

    /// Parse an in-memory document.
    fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: DeserializeOwned> ConfigLoader for T {}
