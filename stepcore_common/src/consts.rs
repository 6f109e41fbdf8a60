//! System-wide constants for the stepcore workspace.
//!
//! Single source of truth for numeric limits and defaults. Wire framing
//! constants live in [`crate::protocol::consts`].

/// Default mcu clock frequency [Hz].
pub const DEFAULT_CLOCK_FREQ: f64 = 16_000_000.0;

/// Default serial baud rate.
pub const DEFAULT_BAUD: u32 = 250_000;

/// Bits on the wire per transmitted byte (start + 8 data + stop).
pub const BITS_PER_BYTE: f64 = 10.0;

/// Default mcu receive window [bytes].
pub const DEFAULT_RECEIVE_WINDOW: u32 = 192;

/// Default mcu move queue depth [slots].
pub const DEFAULT_MOVE_QUEUE_DEPTH: usize = 16;

/// Default maximum step timing error [s].
pub const DEFAULT_MAX_ERROR: f64 = 0.000_025;

/// Default delta tower angles [deg].
pub const DEFAULT_DELTA_ANGLES: [f64; 3] = [210.0, 330.0, 90.0];

/// Default serial device path.
pub const DEFAULT_SERIAL_PATH: &str = "/dev/ttyACM0";
