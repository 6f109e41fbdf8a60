//! stepcore Common Library
//!
//! This crate provides shared constants, wire protocol primitives and
//! configuration loading utilities for all stepcore workspace crates.
//!
//! # Module Structure
//!
//! - [`protocol`] - Frame constants, CRC16, VLQ integers, queued messages
//! - [`config`] - Configuration loading traits and types
//! - [`machine`] - Machine description (mcu, kinematics, steppers)
//! - [`transport`] - The seam between step generation and the serial link
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use stepcore_common::protocol::crc::crc16_ccitt;
//! use stepcore_common::config::{ConfigLoader, SharedConfig};
//! ```

pub mod config;
pub mod consts;
pub mod machine;
pub mod prelude;
pub mod protocol;
pub mod transport;
