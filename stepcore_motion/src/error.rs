//! Fatal step generation errors.
//!
//! Every variant means the compressor produced (or was fed) something that
//! cannot be reproduced on the mcu. None of them is recoverable: the caller
//! must stop issuing moves for the affected stepper.

use stepcore_common::protocol::ProtocolError;
use thiserror::Error;

/// Step pipeline failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StepError {
    /// Command shape the mcu cannot execute (zero count, zero interval run,
    /// interval beyond 31 bits, add beyond 16 bits).
    #[error("stepcompress o={oid} i={interval} c={count} a={add}: Invalid sequence")]
    InvalidSequence {
        oid: u32,
        interval: i64,
        count: i64,
        add: i64,
    },

    /// Reconstructed step falls outside its error window.
    #[error(
        "stepcompress o={oid} i={interval} c={count} a={add}: Point {index}: {point} not in {min}:{max}"
    )]
    PointOutOfRange {
        oid: u32,
        interval: i64,
        count: i64,
        add: i64,
        index: i64,
        point: i64,
        min: i64,
        max: i64,
    },

    /// Accumulated interval left the 31-bit wire field.
    #[error(
        "stepcompress o={oid} i={interval} c={count} a={add}: Point {index}: interval overflow {value}"
    )]
    IntervalOverflow {
        oid: u32,
        interval: i64,
        count: i64,
        add: i64,
        index: i64,
        value: i64,
    },

    /// Step scheduled before one already queued.
    #[error("stepcompress o={oid}: step clock {clock} precedes {last}")]
    ClockRegression { oid: u32, clock: u64, last: u64 },

    /// Command could not be encoded into a payload.
    #[error("stepcompress o={oid}: {source}")]
    Encode {
        oid: u32,
        #[source]
        source: ProtocolError,
    },
}

impl StepError {
    /// Object id of the stepper that failed.
    pub const fn oid(&self) -> u32 {
        match *self {
            Self::InvalidSequence { oid, .. }
            | Self::PointOutOfRange { oid, .. }
            | Self::IntervalOverflow { oid, .. }
            | Self::ClockRegression { oid, .. }
            | Self::Encode { oid, .. } => oid,
        }
    }
}
