//! Frame layout constants.

use static_assertions::const_assert;

/// Smallest valid frame (header + trailer, no payload). Pure ack/nak.
pub const MESSAGE_MIN: usize = 5;
/// Largest valid frame.
pub const MESSAGE_MAX: usize = 64;
/// Length byte + sequence byte.
pub const MESSAGE_HEADER_SIZE: usize = 2;
/// CRC (2 bytes) + sync byte.
pub const MESSAGE_TRAILER_SIZE: usize = 3;
/// Offset of the length byte.
pub const MESSAGE_POS_LEN: usize = 0;
/// Offset of the sequence byte.
pub const MESSAGE_POS_SEQ: usize = 1;
/// Offset of the CRC, counted back from the end of the frame.
pub const MESSAGE_TRAILER_CRC: usize = 3;
/// Offset of the sync byte, counted back from the end of the frame.
pub const MESSAGE_TRAILER_SYNC: usize = 1;
/// Maximum payload carried by one frame.
pub const MESSAGE_PAYLOAD_MAX: usize = MESSAGE_MAX - MESSAGE_MIN;
/// Low nibble of the sequence byte.
pub const MESSAGE_SEQ_MASK: u64 = 0x0f;
/// High nibble of the sequence byte (destination marker).
pub const MESSAGE_DEST: u8 = 0x10;
/// Frame terminator and resync marker.
pub const MESSAGE_SYNC: u8 = 0x7E;

/// "No deadline" clock value.
pub const MAX_CLOCK: u64 = 0x7fff_ffff_ffff_ffff;
/// Requested clock for messages that may go out whenever the link is idle.
pub const BACKGROUND_PRIORITY_CLOCK: u64 = 0x7fff_ffff_0000_0000;

const_assert!(MESSAGE_MAX <= u8::MAX as usize);
const_assert!(MESSAGE_MIN == MESSAGE_HEADER_SIZE + MESSAGE_TRAILER_SIZE);
const_assert!(BACKGROUND_PRIORITY_CLOCK < MAX_CLOCK);
