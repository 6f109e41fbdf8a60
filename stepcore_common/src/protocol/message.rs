//! Queued messages and command queue handles.
//!
//! A [`QueueMessage`] is used in two places that never overlap for the same
//! instance:
//!
//! - **Pending**: produced by the step compressor or any other sender, tagged
//!   with `min_clock` (earliest mcu clock at which it may be transmitted, or
//!   the move-queue slot availability time while it sits in a compressor) and
//!   `req_clock` (the clock by which it should have arrived).
//! - **On the wire**: a complete frame held in the sent queue for
//!   retransmission, or a received data frame, stamped with `sent_time` and
//!   `receive_time`.

use heapless::Vec as FixedVec;

use super::consts::{MESSAGE_MAX, MESSAGE_PAYLOAD_MAX};
use super::vlq::{MAX_VLQ_LEN, encode_vlq};
use super::ProtocolError;

/// Opaque handle of a command queue registered with the serial transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandQueueId(pub u32);

/// A message (or complete frame) plus its scheduling metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueMessage {
    data: FixedVec<u8, MESSAGE_MAX>,
    /// Earliest clock the message may be sent at (0 = no constraint).
    pub min_clock: u64,
    /// Clock by which the message should reach the mcu.
    pub req_clock: u64,
    /// Host time the frame was written (wire context).
    pub sent_time: f64,
    /// Host time the frame was received or finished transmitting (wire context).
    pub receive_time: f64,
}

impl QueueMessage {
    /// Copy raw bytes into a new message.
    pub fn fill(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let data = FixedVec::from_slice(bytes).map_err(|_| ProtocolError::MessageTooLong {
            len: bytes.len(),
            max: MESSAGE_MAX,
        })?;
        Ok(Self {
            data,
            min_clock: 0,
            req_clock: 0,
            sent_time: 0.0,
            receive_time: 0.0,
        })
    }

    /// Encode a command (message id followed by its arguments) as VLQ bytes.
    ///
    /// Signed arguments are passed as their two's complement `u32` pattern.
    pub fn encode(values: &[u32]) -> Result<Self, ProtocolError> {
        let mut data: FixedVec<u8, MESSAGE_MAX> = FixedVec::new();
        let mut total = 0;
        for &v in values {
            let mut buf = [0u8; MAX_VLQ_LEN];
            let len = encode_vlq(v, &mut buf);
            total += len;
            if total > MESSAGE_PAYLOAD_MAX {
                return Err(ProtocolError::MessageTooLong {
                    len: total,
                    max: MESSAGE_PAYLOAD_MAX,
                });
            }
            data.extend_from_slice(&buf[..len])
                .map_err(|_| ProtocolError::MessageTooLong {
                    len: total,
                    max: MESSAGE_PAYLOAD_MAX,
                })?;
        }
        Ok(Self {
            data,
            min_clock: 0,
            req_clock: 0,
            sent_time: 0.0,
            receive_time: 0.0,
        })
    }

    /// Set both scheduling clocks, builder style.
    #[must_use]
    pub fn with_clocks(mut self, min_clock: u64, req_clock: u64) -> Self {
        self.min_clock = min_clock;
        self.req_clock = req_clock;
        self
    }

    /// Encoded bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Encoded length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
