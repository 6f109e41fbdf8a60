//! Wire protocol primitives shared by the step compressor and the serial
//! transport.
//!
//! ```text
//! +--------+--------+------------------+--------+--------+--------+
//! | length | seq    | payload (0..59)  | crc_hi | crc_lo | sync   |
//! | (u8)   | 0x1N   | VLQ-encoded cmds |        |        | (0x7E) |
//! +--------+--------+------------------+--------+--------+--------+
//! ```

pub mod consts;
pub mod crc;
pub mod message;
pub mod vlq;

use thiserror::Error;

/// Errors from encoding or decoding protocol payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Input ended in the middle of a variable-length integer.
    #[error("truncated variable-length integer")]
    Truncated,

    /// More than five bytes carried the continuation bit.
    #[error("variable-length integer longer than 5 bytes")]
    Overlong,

    /// Encoded payload does not fit in a single frame.
    #[error("message of {len} bytes exceeds the {max} byte payload limit")]
    MessageTooLong {
        /// Encoded length.
        len: usize,
        /// Allowed length.
        max: usize,
    },
}
