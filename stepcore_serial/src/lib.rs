//! # stepcore Serial Library
//!
//! Reliable, sequenced message transport between the host and one mcu.
//!
//! Messages are queued per command queue with a `min_clock` (earliest mcu
//! clock at which they may be sent) and a `req_clock` (when the mcu needs
//! them). A background thread packs ready messages into checksummed frames,
//! keeps a window of unacknowledged blocks in flight and retransmits on
//! timeout or duplicate ack.
//!
//! ## Module Structure
//!
//! - [`frame`]: frame layout, scanning and building
//! - [`command_queue`]: stalled and ready messages per queue
//! - [`rtt`]: retransmission timeout estimation
//! - [`clock`]: host monotonic time and mcu clock estimate
//! - [`session`]: the protocol state machine, free of I/O
//! - [`link`]: byte links ([`LoopbackLink`], [`FileLink`])
//! - [`serialqueue`]: the threaded public handle
//! - [`sim`]: a simulated mcu for tests and dry runs
//!
//! # Usage
//!
//! ```rust
//! use stepcore_serial::{LoopbackLink, SerialQueue, SimMcu};
//! use stepcore_common::transport::MessageTransport;
//!
//! let (host, mcu) = LoopbackLink::pair();
//! let _sim = SimMcu::spawn(mcu, &[(1, 2)]).unwrap();
//! let sq = SerialQueue::new(host, 192, 10.0 / 250_000.0).unwrap();
//! let cq = sq.alloc_command_queue();
//! sq.encode_and_send(cq, &[1, 7, 8], 0, 0).unwrap();
//! ```

pub mod clock;
pub mod command_queue;
pub mod error;
pub mod frame;
pub mod link;
mod reactor;
pub mod rtt;
pub mod serialqueue;
pub mod session;
pub mod sim;

pub use error::SerialError;
pub use link::{FileLink, LoopbackLink, SerialLink};
pub use serialqueue::SerialQueue;
pub use session::{LinkState, SerialStats};
pub use sim::{SimMcu, SimMcuStats};
