//! Per-producer command queues.
//!
//! Every producer (a stepper synchronizer, a config sender, ...) owns one
//! command queue. Messages enter the stalled sub-queue and move to the ready
//! sub-queue once the estimated mcu clock passes their `min_clock`. A queue
//! holding messages is "pending"; pending queues are visited in allocation
//! (id) order, whichever received messages first.

use std::collections::{BTreeMap, VecDeque};
use stepcore_common::protocol::message::{CommandQueueId, QueueMessage};

/// Stalled and ready messages of one producer.
#[derive(Debug, Default)]
pub struct CommandQueue {
    pub(crate) stalled: VecDeque<QueueMessage>,
    pub(crate) ready: VecDeque<QueueMessage>,
}

impl CommandQueue {
    pub fn is_empty(&self) -> bool {
        self.stalled.is_empty() && self.ready.is_empty()
    }

    /// Move stalled messages whose `min_clock` has passed to the ready queue.
    ///
    /// Returns the bytes moved and the `min_clock` of the first message still
    /// stalled.
    pub fn promote(&mut self, ack_clock: u64) -> (usize, Option<u64>) {
        let mut moved = 0;
        while let Some(qm) = self.stalled.front() {
            if ack_clock < qm.min_clock {
                return (moved, Some(qm.min_clock));
            }
            if let Some(qm) = self.stalled.pop_front() {
                moved += qm.len();
                self.ready.push_back(qm);
            }
        }
        (moved, None)
    }

    pub fn front_ready(&self) -> Option<&QueueMessage> {
        self.ready.front()
    }
}

/// All registered queues plus the pending set.
#[derive(Debug, Default)]
pub struct CommandQueues {
    next_id: u32,
    queues: BTreeMap<CommandQueueId, CommandQueue>,
    pending: Vec<CommandQueueId>,
}

impl CommandQueues {
    pub fn alloc(&mut self) -> CommandQueueId {
        self.next_id += 1;
        let id = CommandQueueId(self.next_id);
        self.queues.insert(id, CommandQueue::default());
        id
    }

    /// Drop a queue and whatever it still holds. Returns the bytes dropped.
    pub fn free(&mut self, id: CommandQueueId) -> (usize, usize) {
        self.pending.retain(|&p| p != id);
        self.queues.remove(&id).map_or((0, 0), |q| {
            (
                q.stalled.iter().map(QueueMessage::len).sum(),
                q.ready.iter().map(QueueMessage::len).sum(),
            )
        })
    }

    /// Append messages to the stalled queue of `id`.
    ///
    /// Returns false for an unknown queue.
    pub fn push_stalled(
        &mut self,
        id: CommandQueueId,
        msgs: impl IntoIterator<Item = QueueMessage>,
    ) -> bool {
        let Some(q) = self.queues.get_mut(&id) else {
            return false;
        };
        if q.is_empty() {
            self.pending.push(id);
        }
        q.stalled.extend(msgs);
        true
    }

    /// Pending queues in id order.
    pub fn pending_mut(&mut self) -> impl Iterator<Item = &mut CommandQueue> + '_ {
        let queues = &mut self.queues;
        let ids = &self.pending;
        queues
            .iter_mut()
            .filter(|(id, _)| ids.contains(id))
            .map(|(_, q)| q)
    }

    /// Pop the ready message with the lowest `req_clock` across all queues,
    /// if it is at most `max_len` bytes long.
    pub fn pop_lowest_ready(&mut self, max_len: usize) -> Option<QueueMessage> {
        let mut best: Option<(CommandQueueId, u64)> = None;
        for id in &self.pending {
            if let Some(qm) = self.queues.get(id).and_then(CommandQueue::front_ready) {
                if best.is_none_or(|(_, c)| qm.req_clock < c) {
                    best = Some((*id, qm.req_clock));
                }
            }
        }
        let (id, _) = best?;
        let q = self.queues.get_mut(&id)?;
        if q.ready.front().is_none_or(|qm| qm.len() > max_len) {
            return None;
        }
        let qm = q.ready.pop_front();
        if q.is_empty() {
            self.pending.retain(|&p| p != id);
        }
        qm
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    pub(crate) fn get(&self, id: CommandQueueId) -> Option<&CommandQueue> {
        self.queues.get(&id)
    }
}
