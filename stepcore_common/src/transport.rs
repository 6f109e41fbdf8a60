//! Seam between message producers and the serial link.
//!
//! The step synchronizer only needs to hand over ordered batches; it does
//! not care whether they end up on a real serial port, a simulated mcu, or a
//! test recorder.

use crate::protocol::message::{CommandQueueId, QueueMessage};

/// Sink for ordered message batches.
///
/// # Contract
///
/// - Messages of one batch are transmitted in the order given (no
///   reordering inside a command queue).
/// - `send_batch` never blocks on the link; it only enqueues.
pub trait MessageTransport: Send + Sync {
    /// Register a new command queue and return its handle.
    fn alloc_command_queue(&self) -> CommandQueueId;

    /// Append `msgs` to the stalled queue of `cq`.
    fn send_batch(&self, cq: CommandQueueId, msgs: Vec<QueueMessage>);
}
