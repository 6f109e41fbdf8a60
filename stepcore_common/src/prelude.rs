//! Prelude module for common re-exports.
//!
//! ```rust
//! use stepcore_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};
pub use crate::machine::{HostConfig, KinematicsConfig, McuConfig, StepperConfig};

// ─── Protocol ───────────────────────────────────────────────────────
pub use crate::protocol::ProtocolError;
pub use crate::protocol::consts::{BACKGROUND_PRIORITY_CLOCK, MAX_CLOCK};
pub use crate::protocol::message::{CommandQueueId, QueueMessage};

// ─── Transport seam ─────────────────────────────────────────────────
pub use crate::transport::MessageTransport;
