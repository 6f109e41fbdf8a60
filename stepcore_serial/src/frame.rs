//! Frame scanning and building.
//!
//! ```text
//! +--------+--------+------------------+--------+--------+--------+
//! | length | seq    | payload (0..59)  | crc_hi | crc_lo | sync   |
//! +--------+--------+------------------+--------+--------+--------+
//! ```
//!
//! The input side is a byte stream: [`FrameScanner::check`] looks at the
//! head of the receive buffer and reports either a complete valid frame, a
//! prefix of garbage to discard, or that more bytes are needed. After a bad
//! frame everything up to and including the next sync byte is dropped; if the
//! buffer holds no sync byte at all the scanner stays in resync mode and
//! rejects data until one shows up.

use heapless::Vec as FixedVec;
use stepcore_common::protocol::ProtocolError;
use stepcore_common::protocol::consts::{
    MESSAGE_DEST, MESSAGE_HEADER_SIZE, MESSAGE_MAX, MESSAGE_MIN, MESSAGE_PAYLOAD_MAX,
    MESSAGE_POS_LEN, MESSAGE_POS_SEQ, MESSAGE_SEQ_MASK, MESSAGE_SYNC, MESSAGE_TRAILER_CRC,
    MESSAGE_TRAILER_SIZE, MESSAGE_TRAILER_SYNC,
};
use stepcore_common::protocol::crc::{append_crc16, crc16_ccitt};

/// A complete frame.
pub type FrameBuf = FixedVec<u8, MESSAGE_MAX>;

/// Result of scanning the head of the input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    /// Not enough bytes to decide.
    NeedMore,
    /// A valid frame of this length starts the buffer.
    Frame(usize),
    /// This many leading bytes are invalid and must be dropped.
    Discard(usize),
}

/// Stateful frame validator.
#[derive(Debug, Default, Clone)]
pub struct FrameScanner {
    need_sync: bool,
}

impl FrameScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while no sync byte has been seen since the last bad frame.
    pub fn needs_sync(&self) -> bool {
        self.need_sync
    }

    /// Inspect the head of `buf`.
    pub fn check(&mut self, buf: &[u8]) -> Scan {
        if buf.len() < MESSAGE_MIN {
            return Scan::NeedMore;
        }
        if !self.need_sync {
            match validate(buf) {
                Some(Scan::NeedMore) => return Scan::NeedMore,
                Some(frame) => return frame,
                None => {}
            }
        }
        match buf.iter().position(|&b| b == MESSAGE_SYNC) {
            Some(pos) => {
                self.need_sync = false;
                Scan::Discard(pos + 1)
            }
            None => {
                self.need_sync = true;
                Scan::Discard(buf.len())
            }
        }
    }
}

/// `None` when the head of `buf` cannot be a valid frame.
fn validate(buf: &[u8]) -> Option<Scan> {
    let len = usize::from(buf[MESSAGE_POS_LEN]);
    if !(MESSAGE_MIN..=MESSAGE_MAX).contains(&len) {
        return None;
    }
    if buf[MESSAGE_POS_SEQ] & !(MESSAGE_SEQ_MASK as u8) != MESSAGE_DEST {
        return None;
    }
    if buf.len() < len {
        return Some(Scan::NeedMore);
    }
    if buf[len - MESSAGE_TRAILER_SYNC] != MESSAGE_SYNC {
        return None;
    }
    let crc_pos = len - MESSAGE_TRAILER_CRC;
    let msg_crc = u16::from_be_bytes([buf[crc_pos], buf[crc_pos + 1]]);
    if crc16_ccitt(&buf[..len - MESSAGE_TRAILER_SIZE]) != msg_crc {
        return None;
    }
    Some(Scan::Frame(len))
}

/// Sequence byte for the 64-bit sequence number `seq`.
#[inline]
pub fn seq_byte(seq: u64) -> u8 {
    MESSAGE_DEST | (seq & MESSAGE_SEQ_MASK) as u8
}

/// Accumulates payloads into one outgoing frame.
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    buf: [u8; MESSAGE_MAX],
    len: usize,
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self {
            buf: [0; MESSAGE_MAX],
            len: MESSAGE_HEADER_SIZE,
        }
    }

    /// Payload bytes added so far.
    pub fn payload_len(&self) -> usize {
        self.len - MESSAGE_HEADER_SIZE
    }

    /// Whether `n` more payload bytes fit.
    pub fn fits(&self, n: usize) -> bool {
        self.len + n <= MESSAGE_MAX - MESSAGE_TRAILER_SIZE
    }

    /// Append a payload; false (and nothing written) if it does not fit.
    pub fn push(&mut self, payload: &[u8]) -> bool {
        if !self.fits(payload.len()) {
            return false;
        }
        self.buf[self.len..self.len + payload.len()].copy_from_slice(payload);
        self.len += payload.len();
        true
    }

    /// Write header and trailer for sequence `seq`.
    pub fn finish(mut self, seq: u64) -> FrameBuf {
        let len = self.len + MESSAGE_TRAILER_SIZE;
        self.buf[MESSAGE_POS_LEN] = len as u8;
        self.buf[MESSAGE_POS_SEQ] = seq_byte(seq);
        append_crc16(&mut self.buf, len - MESSAGE_TRAILER_SIZE);
        self.buf[len - MESSAGE_TRAILER_SYNC] = MESSAGE_SYNC;
        let mut out = FrameBuf::new();
        // len <= MESSAGE_MAX by construction
        let _ = out.extend_from_slice(&self.buf[..len]);
        out
    }
}

/// Frame a single payload.
pub fn encode_frame(seq: u64, payload: &[u8]) -> Result<FrameBuf, ProtocolError> {
    let mut builder = FrameBuilder::new();
    if !builder.push(payload) {
        return Err(ProtocolError::MessageTooLong {
            len: payload.len(),
            max: MESSAGE_PAYLOAD_MAX,
        });
    }
    Ok(builder.finish(seq))
}

/// Payload bytes of a validated frame.
#[inline]
pub fn payload(frame: &[u8]) -> &[u8] {
    &frame[MESSAGE_HEADER_SIZE..frame.len() - MESSAGE_TRAILER_SIZE]
}
