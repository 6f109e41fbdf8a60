//! Cross-stepper synchronizer.
//!
//! Merges the output of every compressor on one mcu into a single stream
//! ordered by requested clock, and paces `queue_step` commands by the mcu's
//! move queue.
//!
//! A queued message whose `min_clock` is non-zero occupies a move-queue
//! slot; `min_clock` then holds the clock at which that slot frees up again.
//! The synchronizer keeps the availability time of every slot in a binary
//! min-heap (`move_clocks[0]` is the earliest free slot). Sending such a
//! message replaces the root with the message's own release clock, and the
//! message is sent with `min_clock` set to the old root: the mcu cannot
//! accept it before a slot is free.

use crate::error::StepError;
use crate::stepcompress::SharedCompressor;
use std::sync::Arc;
use stepcore_common::prelude::*;
use tracing::{debug, trace};

/// Orders and paces the step commands of all steppers on one mcu.
pub struct StepperSync<T: MessageTransport + ?Sized> {
    transport: Arc<T>,
    cq: CommandQueueId,
    compressors: Vec<SharedCompressor>,
    move_clocks: Vec<u64>,
}

impl<T: MessageTransport + ?Sized> StepperSync<T> {
    /// Create a synchronizer for `compressors` with `move_num` move-queue slots.
    pub fn new(transport: Arc<T>, compressors: Vec<SharedCompressor>, move_num: usize) -> Self {
        let cq = transport.alloc_command_queue();
        debug!(
            steppers = compressors.len(),
            move_num,
            cq = cq.0,
            "steppersync created"
        );
        Self {
            transport,
            cq,
            compressors,
            move_clocks: vec![0; move_num],
        }
    }

    pub fn command_queue(&self) -> CommandQueueId {
        self.cq
    }

    pub fn compressors(&self) -> &[SharedCompressor] {
        &self.compressors
    }

    /// Earliest free move-queue slot.
    pub fn next_slot_clock(&self) -> u64 {
        self.move_clocks.first().copied().unwrap_or(0)
    }

    /// Set the print time to mcu clock mapping of every compressor.
    pub fn set_time(&self, time_offset: f64, mcu_freq: f64) {
        for sc in &self.compressors {
            sc.lock().set_time(time_offset, mcu_freq);
        }
    }

    /// Flush every compressor up to `move_clock` and send the resulting
    /// messages that may go out now.
    pub fn flush(&mut self, move_clock: u64) -> Result<(), StepError> {
        for sc in &self.compressors {
            sc.lock().flush(move_clock)?;
        }

        let mut batch: Vec<QueueMessage> = Vec::new();
        loop {
            // Compressor whose oldest message has the lowest req_clock.
            let mut req_clock = MAX_CLOCK;
            let mut pick: Option<(usize, u64)> = None;
            for (i, sc) in self.compressors.iter().enumerate() {
                if let Some(qm) = sc.lock().front_message() {
                    if qm.req_clock < req_clock {
                        req_clock = qm.req_clock;
                        pick = Some((i, qm.min_clock));
                    }
                }
            }
            let Some((idx, min_clock)) = pick else {
                break;
            };
            if min_clock != 0 && req_clock > move_clock {
                break;
            }

            let Some(mut qm) = self.compressors[idx].lock().pop_message() else {
                break;
            };
            let next_avail = self.next_slot_clock();
            if min_clock != 0 {
                self.heap_replace(min_clock);
            }
            qm.min_clock = next_avail;
            batch.push(qm);
        }

        if !batch.is_empty() {
            trace!(count = batch.len(), move_clock, "steppersync batch");
            self.transport.send_batch(self.cq, batch);
        }
        Ok(())
    }

    /// Replace the root of the slot heap and restore the heap order.
    fn heap_replace(&mut self, req_clock: u64) {
        let mc = &mut self.move_clocks;
        let nc = mc.len();
        if nc == 0 {
            return;
        }
        let mut pos = 0;
        loop {
            let child1 = 2 * pos + 1;
            let child2 = 2 * pos + 2;
            let child1_clock = mc.get(child1).copied().unwrap_or(u64::MAX);
            let child2_clock = mc.get(child2).copied().unwrap_or(u64::MAX);
            if req_clock <= child1_clock && req_clock <= child2_clock {
                mc[pos] = req_clock;
                break;
            }
            if child1_clock < child2_clock {
                mc[pos] = child1_clock;
                pos = child1;
            } else {
                mc[pos] = child2_clock;
                pos = child2;
            }
        }
    }
}
