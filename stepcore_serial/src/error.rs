//! Transport errors.
//!
//! Only link I/O and lifecycle problems surface here. Corrupt input, lost
//! acks and retransmissions are handled inside the session and show up as
//! counters in [`SerialStats`](crate::session::SerialStats).

use stepcore_common::protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SerialError {
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("serial queue is shut down")]
    Shutdown,

    #[error("serial polling thread panicked")]
    ThreadPanicked,
}

impl From<nix::Error> for SerialError {
    fn from(e: nix::Error) -> Self {
        Self::Io(std::io::Error::from(e))
    }
}
