//! Shared helpers for the motion integration tests.

use parking_lot::Mutex;
use stepcore_common::protocol::message::{CommandQueueId, QueueMessage};
use stepcore_common::protocol::vlq::decode_all;
use stepcore_common::transport::MessageTransport;
use stepcore_motion::StepError;
use stepcore_motion::itersolve::StepSink;

/// Transport that keeps every batch it is handed.
#[derive(Default)]
pub struct RecordingTransport {
    next_cq: Mutex<u32>,
    pub batches: Mutex<Vec<(CommandQueueId, Vec<QueueMessage>)>>,
}

impl MessageTransport for RecordingTransport {
    fn alloc_command_queue(&self) -> CommandQueueId {
        let mut n = self.next_cq.lock();
        *n += 1;
        CommandQueueId(*n)
    }

    fn send_batch(&self, cq: CommandQueueId, msgs: Vec<QueueMessage>) {
        self.batches.lock().push((cq, msgs));
    }
}

impl RecordingTransport {
    /// Every message sent so far, decoded, with its clocks.
    pub fn decoded(&self) -> Vec<(Vec<u32>, u64, u64)> {
        self.batches
            .lock()
            .iter()
            .flat_map(|(_, b)| b.iter())
            .map(|qm| (decode_all(qm.as_bytes()).unwrap(), qm.min_clock, qm.req_clock))
            .collect()
    }
}

/// Sink that records step times and direction changes.
#[derive(Debug, Default)]
pub struct StepLog {
    pub sdir: Option<bool>,
    pub times: Vec<f64>,
    pub dirs: Vec<bool>,
}

impl StepSink for StepLog {
    fn step_dir(&self) -> Option<bool> {
        self.sdir
    }

    fn set_next_step_dir(&mut self, sdir: bool) -> Result<(), StepError> {
        self.sdir = Some(sdir);
        Ok(())
    }

    fn append_step(&mut self, print_time: f64, step_time: f64) -> Result<(), StepError> {
        self.times.push(print_time + step_time);
        self.dirs.push(self.sdir.unwrap_or(false));
        Ok(())
    }
}
