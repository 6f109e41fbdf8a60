//! Transport state machine.
//!
//! [`Session`] owns everything the serial link needs to stay reliable:
//! sequence counters, command queues, the sent queue kept for
//! retransmission, the receive queue and round-trip statistics. It performs
//! no I/O. The polling loop feeds it received bytes through
//! [`Session::handle_input`] and lets it run its two timers
//! ([`Session::command_event`], [`Session::retransmit_event`]); frames to
//! write are appended to a caller-provided buffer.
//!
//! Sequence numbers are 64-bit on the host and truncated to four bits on
//! the wire. `receive_seq` is the next sequence the mcu expects, so every
//! sent block below it has been acknowledged.
//!
//! Timers hold absolute host times; [`NOW`] fires on the next loop
//! iteration and [`NEVER`] disarms.

use crate::clock::ClockEstimate;
use crate::command_queue::CommandQueues;
use crate::frame::{FrameBuf, FrameBuilder, FrameScanner, Scan};
use crate::rtt::RttEstimator;
use serde::Serialize;
use static_assertions::const_assert;
use std::collections::VecDeque;
use std::fmt;
use stepcore_common::protocol::consts::{
    BACKGROUND_PRIORITY_CLOCK, MAX_CLOCK, MESSAGE_MAX, MESSAGE_MIN, MESSAGE_PAYLOAD_MAX,
    MESSAGE_POS_SEQ, MESSAGE_SEQ_MASK, MESSAGE_SYNC,
};
use stepcore_common::protocol::message::{CommandQueueId, QueueMessage};
use tracing::{debug, info, trace, warn};

/// Timer value that fires immediately.
pub const NOW: f64 = 0.0;
/// Timer value that never fires.
pub const NEVER: f64 = f64::INFINITY;

/// Unacknowledged blocks allowed in flight.
pub const MAX_PENDING_BLOCKS: u64 = 12;
// The window must stay inside the sequence space.
const_assert!(MAX_PENDING_BLOCKS <= MESSAGE_SEQ_MASK);
/// Send a ready message this long before its requested clock [s].
pub const MIN_REQTIME_DELTA: f64 = 0.250;
/// Extra slack for background-priority messages [s].
pub const MIN_BACKGROUND_DELTA: f64 = 0.005;
/// Sent blocks kept for debugging.
pub const DEBUG_QUEUE_SENT: usize = 100;
/// Received messages kept for debugging.
pub const DEBUG_QUEUE_RECEIVE: usize = 20;

/// Largest distance between `min_clock` and `req_clock` of a queued message.
const MAX_CLOCK_SPREAD: u64 = 1 << 31;

/// Link synchronization state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    /// Nothing valid received yet.
    #[default]
    Disconnected,
    /// Discarding input until the next frame boundary.
    Syncing,
    /// Valid frames are arriving.
    Connected,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Syncing => "syncing",
            Self::Connected => "connected",
        })
    }
}

/// Snapshot of the transport counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SerialStats {
    pub bytes_write: u64,
    pub bytes_read: u64,
    pub bytes_retransmit: u64,
    pub bytes_invalid: u64,
    pub send_seq: u64,
    pub receive_seq: u64,
    pub retransmit_seq: u64,
    pub srtt: f64,
    pub rttvar: f64,
    pub rto: f64,
    pub ready_bytes: usize,
    pub stalled_bytes: usize,
}

impl fmt::Display for SerialStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bytes_write={} bytes_read={} bytes_retransmit={} bytes_invalid={} \
             send_seq={} receive_seq={} retransmit_seq={} \
             srtt={:.3} rttvar={:.3} rto={:.3} \
             ready_bytes={} stalled_bytes={}",
            self.bytes_write,
            self.bytes_read,
            self.bytes_retransmit,
            self.bytes_invalid,
            self.send_seq,
            self.receive_seq,
            self.retransmit_seq,
            self.srtt,
            self.rttvar,
            self.rto,
            self.ready_bytes,
            self.stalled_bytes,
        )
    }
}

fn push_bounded(queue: &mut VecDeque<QueueMessage>, qm: QueueMessage, cap: usize) {
    if queue.len() >= cap {
        queue.pop_front();
    }
    queue.push_back(qm);
}

/// Host side of the reliable link.
#[derive(Debug)]
pub struct Session {
    scanner: FrameScanner,
    input: Vec<u8>,
    state: LinkState,

    baud_adjust: f64,
    idle_time: f64,
    clock: ClockEstimate,
    receive_window: usize,
    last_receive_sent_time: f64,

    send_seq: u64,
    receive_seq: u64,
    ignore_nak_seq: u64,
    last_ack_seq: u64,
    retransmit_seq: u64,
    rtt_sample_seq: u64,
    rtt: RttEstimator,

    sent: VecDeque<QueueMessage>,
    queues: CommandQueues,
    ready_bytes: usize,
    stalled_bytes: usize,
    need_ack_bytes: usize,
    last_ack_bytes: usize,
    need_kick_clock: u64,

    received: VecDeque<QueueMessage>,
    old_sent: VecDeque<QueueMessage>,
    old_received: VecDeque<QueueMessage>,

    bytes_write: u64,
    bytes_read: u64,
    bytes_retransmit: u64,
    bytes_invalid: u64,

    command_timer: f64,
    retransmit_timer: f64,
}

impl Session {
    /// New session. `receive_window` of zero disables byte-level flow
    /// control; `baud_adjust` is the wire time of one byte in seconds.
    pub fn new(receive_window: usize, baud_adjust: f64) -> Self {
        Self {
            scanner: FrameScanner::new(),
            input: Vec::with_capacity(4096),
            state: LinkState::Disconnected,
            baud_adjust,
            idle_time: 0.0,
            clock: ClockEstimate::default(),
            receive_window,
            last_receive_sent_time: 0.0,
            send_seq: 1,
            receive_seq: 1,
            ignore_nak_seq: 0,
            last_ack_seq: 0,
            retransmit_seq: 0,
            rtt_sample_seq: 0,
            rtt: RttEstimator::default(),
            sent: VecDeque::new(),
            queues: CommandQueues::default(),
            ready_bytes: 0,
            stalled_bytes: 0,
            need_ack_bytes: 0,
            last_ack_bytes: 0,
            need_kick_clock: MAX_CLOCK,
            received: VecDeque::new(),
            old_sent: VecDeque::with_capacity(DEBUG_QUEUE_SENT),
            old_received: VecDeque::with_capacity(DEBUG_QUEUE_RECEIVE),
            bytes_write: 0,
            bytes_read: 0,
            bytes_retransmit: 0,
            bytes_invalid: 0,
            command_timer: NEVER,
            retransmit_timer: NEVER,
        }
    }

    // ─── Configuration ──────────────────────────────────────────────

    pub fn set_receive_window(&mut self, receive_window: usize) {
        self.receive_window = receive_window;
    }

    pub fn set_baud_adjust(&mut self, baud_adjust: f64) {
        self.baud_adjust = baud_adjust;
    }

    /// Install a new mcu clock estimate and re-run the send check.
    pub fn set_clock_est(&mut self, clock: ClockEstimate) {
        self.clock = clock;
        self.command_timer = NOW;
    }

    // ─── Queues ─────────────────────────────────────────────────────

    pub fn alloc_command_queue(&mut self) -> CommandQueueId {
        self.queues.alloc()
    }

    pub fn free_command_queue(&mut self, cq: CommandQueueId) {
        let (stalled, ready) = self.queues.free(cq);
        self.stalled_bytes -= stalled;
        self.ready_bytes -= ready;
    }

    /// Queue messages on `cq` in order.
    ///
    /// Payloads that cannot fit in a frame and messages for an unknown queue
    /// are dropped and counted as invalid.
    pub fn send_batch(&mut self, cq: CommandQueueId, msgs: Vec<QueueMessage>) {
        let mut len = 0;
        let mut batch = Vec::with_capacity(msgs.len());
        for mut qm in msgs {
            if qm.len() > MESSAGE_PAYLOAD_MAX || qm.is_empty() {
                warn!(cq = cq.0, len = qm.len(), "dropping unsendable message");
                self.bytes_invalid += qm.len() as u64;
                continue;
            }
            if qm.min_clock.saturating_add(MAX_CLOCK_SPREAD) < qm.req_clock
                && qm.req_clock != BACKGROUND_PRIORITY_CLOCK
            {
                qm.min_clock = qm.req_clock - MAX_CLOCK_SPREAD;
            }
            len += qm.len();
            batch.push(qm);
        }
        let Some(first_min_clock) = batch.first().map(|qm| qm.min_clock) else {
            return;
        };
        if !self.queues.push_stalled(cq, batch) {
            warn!(cq = cq.0, "send on unknown command queue");
            self.bytes_invalid += len as u64;
            return;
        }
        self.stalled_bytes += len;
        if first_min_clock < self.need_kick_clock {
            self.need_kick_clock = 0;
            self.command_timer = NOW;
        }
    }

    /// Next received data message, if any.
    pub fn pull(&mut self) -> Option<QueueMessage> {
        let qm = self.received.pop_front()?;
        push_bounded(&mut self.old_received, qm.clone(), DEBUG_QUEUE_RECEIVE);
        Some(qm)
    }

    // ─── Input ──────────────────────────────────────────────────────

    /// Process bytes read from the link at host time `eventtime`.
    pub fn handle_input(&mut self, eventtime: f64, data: &[u8]) {
        self.input.extend_from_slice(data);
        loop {
            match self.scanner.check(&self.input) {
                Scan::NeedMore => break,
                Scan::Frame(len) => {
                    let mut frame = FrameBuf::new();
                    // len <= MESSAGE_MAX
                    let _ = frame.extend_from_slice(&self.input[..len]);
                    self.input.drain(..len);
                    self.handle_frame(eventtime, &frame);
                }
                Scan::Discard(len) => {
                    self.input.drain(..len);
                    self.bytes_invalid += len as u64;
                    if self.state != LinkState::Syncing {
                        warn!(len, state = %self.state, "discarding invalid input, resyncing");
                        self.state = LinkState::Syncing;
                    } else {
                        warn!(len, "discarding invalid input");
                    }
                }
            }
        }
    }

    fn handle_frame(&mut self, eventtime: f64, frame: &[u8]) {
        let len = frame.len();
        let low = u64::from(frame[MESSAGE_POS_SEQ]) & MESSAGE_SEQ_MASK;
        let mut rseq = (self.receive_seq & !MESSAGE_SEQ_MASK) | low;
        if rseq != self.receive_seq {
            if rseq < self.receive_seq {
                rseq += MESSAGE_SEQ_MASK + 1;
            }
            if rseq > self.send_seq && self.receive_seq != 1 {
                warn!(rseq, send_seq = self.send_seq, "ack for unsent block");
                self.bytes_invalid += len as u64;
                return;
            }
            self.update_receive_seq(eventtime, rseq);
        }
        self.bytes_read += len as u64;
        trace!(rseq, len, "frame received");

        if self.state != LinkState::Connected {
            info!(rseq, "serial link connected");
            self.state = LinkState::Connected;
        }

        if len == MESSAGE_MIN {
            if self.last_ack_seq < rseq {
                self.last_ack_seq = rseq;
            } else if rseq > self.ignore_nak_seq && !self.sent.is_empty() {
                debug!(rseq, "nak, fast retransmit");
                self.retransmit_timer = NOW;
            }
            return;
        }

        let Ok(mut qm) = QueueMessage::fill(frame) else {
            return;
        };
        qm.sent_time = if rseq > self.retransmit_seq {
            self.last_receive_sent_time
        } else {
            0.0
        };
        qm.receive_time = eventtime - self.baud_adjust * len as f64;
        self.received.push_back(qm);
    }

    fn update_receive_seq(&mut self, eventtime: f64, rseq: u64) {
        let mut sent_seq = self.receive_seq;
        loop {
            let Some(sent) = self.sent.pop_front() else {
                // Acked past everything sent: the mcu restarted its sequence.
                info!(rseq, send_seq = self.send_seq, "sequence reset by mcu");
                self.send_seq = rseq;
                self.last_receive_sent_time = 0.0;
                break;
            };
            self.need_ack_bytes = self.need_ack_bytes.saturating_sub(sent.len());
            sent_seq += 1;
            let acked = rseq == sent_seq;
            if acked {
                self.last_receive_sent_time = sent.receive_time;
                self.last_ack_bytes = sent.len();
            }
            push_bounded(&mut self.old_sent, sent, DEBUG_QUEUE_SENT);
            if acked {
                break;
            }
        }
        self.receive_seq = rseq;
        self.command_timer = NOW;

        if self.rtt_sample_seq != 0
            && rseq > self.rtt_sample_seq
            && self.last_receive_sent_time != 0.0
        {
            self.rtt.sample(eventtime - self.last_receive_sent_time);
            trace!(srtt = self.rtt.srtt, rto = self.rtt.rto, "rtt sample");
            self.rtt_sample_seq = 0;
        }
        self.retransmit_timer = match self.sent.front() {
            None => NEVER,
            Some(first) => eventtime + self.rtt.rto + first.len() as f64 * self.baud_adjust,
        };
    }

    // ─── Output ─────────────────────────────────────────────────────

    /// Host time the next command check is due.
    pub fn command_timer(&self) -> f64 {
        self.command_timer
    }

    /// Host time the next retransmit is due.
    pub fn retransmit_timer(&self) -> f64 {
        self.retransmit_timer
    }

    /// Earliest of both timers.
    pub fn next_wake(&self) -> f64 {
        self.command_timer.min(self.retransmit_timer)
    }

    /// Send every block that may go out now; re-arm the command timer.
    pub fn command_event(&mut self, eventtime: f64, out: &mut Vec<u8>) {
        loop {
            let waketime = self.check_send_command(eventtime);
            if waketime != NOW {
                self.command_timer = waketime;
                return;
            }
            self.build_and_send_command(eventtime, out);
        }
    }

    /// Decide whether a block should be sent now, and if not, when to look
    /// again.
    fn check_send_command(&mut self, eventtime: f64) -> f64 {
        if self.send_seq - self.receive_seq >= MAX_PENDING_BLOCKS {
            return NEVER;
        }
        if self.send_seq > self.receive_seq && self.receive_window > 0 {
            let mut need_ack_bytes = self.need_ack_bytes + MESSAGE_MAX;
            if self.last_ack_seq < self.receive_seq {
                need_ack_bytes += self.last_ack_bytes;
            }
            if need_ack_bytes > self.receive_window {
                return NEVER;
            }
        }

        let idletime = eventtime.max(self.idle_time) + MESSAGE_MIN as f64 * self.baud_adjust;
        let ack_clock = self.clock.clock_from_time(idletime);
        let background_clock = self
            .clock
            .clock_from_time(self.idle_time + MIN_REQTIME_DELTA + MIN_BACKGROUND_DELTA);
        let mut min_stalled_clock = MAX_CLOCK;
        let mut min_ready_clock = MAX_CLOCK;
        for q in self.queues.pending_mut() {
            let (moved, stalled) = q.promote(ack_clock);
            self.stalled_bytes -= moved;
            self.ready_bytes += moved;
            if let Some(clock) = stalled {
                min_stalled_clock = min_stalled_clock.min(clock);
            }
            if let Some(qm) = q.front_ready() {
                let req_clock = if qm.req_clock == BACKGROUND_PRIORITY_CLOCK {
                    background_clock
                } else {
                    qm.req_clock
                };
                min_ready_clock = min_ready_clock.min(req_clock);
            }
        }

        if self.ready_bytes >= MESSAGE_PAYLOAD_MAX {
            return NOW;
        }
        if !self.clock.is_known() {
            if self.ready_bytes > 0 {
                return NOW;
            }
            self.need_kick_clock = MAX_CLOCK;
            return NEVER;
        }
        let reqclock_delta = self.clock.ticks(MIN_REQTIME_DELTA);
        if min_ready_clock <= ack_clock.saturating_add(reqclock_delta) {
            return NOW;
        }
        let wantclock = (min_ready_clock - reqclock_delta).min(min_stalled_clock);
        self.need_kick_clock = wantclock;
        idletime + wantclock.saturating_sub(ack_clock) as f64 / self.clock.est_freq
    }

    /// Pack ready messages, lowest `req_clock` first, into one block.
    fn build_and_send_command(&mut self, eventtime: f64, out: &mut Vec<u8>) {
        let mut builder = FrameBuilder::new();
        while self.ready_bytes > 0 {
            let room = MESSAGE_PAYLOAD_MAX - builder.payload_len();
            let Some(qm) = self.queues.pop_lowest_ready(room) else {
                break;
            };
            builder.push(qm.as_bytes());
            self.ready_bytes -= qm.len();
        }

        let seq = self.send_seq;
        let frame = builder.finish(seq);
        let len = frame.len();
        self.idle_time = self.idle_time.max(eventtime) + len as f64 * self.baud_adjust;
        let Ok(mut block) = QueueMessage::fill(&frame) else {
            return;
        };
        block.sent_time = eventtime;
        block.receive_time = self.idle_time;
        if self.sent.is_empty() {
            self.retransmit_timer = self.idle_time + self.rtt.rto;
        }
        if self.rtt_sample_seq == 0 {
            self.rtt_sample_seq = seq;
        }
        self.send_seq += 1;
        self.need_ack_bytes += len;
        self.sent.push_back(block);

        out.extend_from_slice(&frame);
        self.bytes_write += len as u64;
        trace!(seq, len, "frame sent");
    }

    /// Resend every unacknowledged block; re-arm the retransmit timer.
    ///
    /// The caller should discard unsent link output before writing `out`.
    pub fn retransmit_event(&mut self, eventtime: f64, out: &mut Vec<u8>) {
        let Some(first_len) = self.sent.front().map(|qm| qm.len() + 1) else {
            self.retransmit_timer = NEVER;
            return;
        };
        let start = out.len();
        out.push(MESSAGE_SYNC);
        for qm in &self.sent {
            out.extend_from_slice(qm.as_bytes());
        }
        let buflen = out.len() - start;
        self.bytes_retransmit += buflen as u64;

        if self.retransmit_timer == NOW {
            self.ignore_nak_seq = self.receive_seq.max(self.retransmit_seq);
            debug!(
                cause = "nak",
                bytes = buflen,
                rto = self.rtt.rto,
                "retransmit"
            );
        } else {
            self.rtt.backoff();
            self.ignore_nak_seq = self.send_seq;
            debug!(
                cause = "timeout",
                bytes = buflen,
                rto = self.rtt.rto,
                "retransmit"
            );
        }
        self.retransmit_seq = self.send_seq;
        self.rtt_sample_seq = 0;
        self.idle_time = eventtime + buflen as f64 * self.baud_adjust;
        self.retransmit_timer =
            self.idle_time + first_len as f64 * self.baud_adjust + self.rtt.rto;
    }

    // ─── Introspection ──────────────────────────────────────────────

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn rtt(&self) -> RttEstimator {
        self.rtt
    }

    pub fn stats(&self) -> SerialStats {
        SerialStats {
            bytes_write: self.bytes_write,
            bytes_read: self.bytes_read,
            bytes_retransmit: self.bytes_retransmit,
            bytes_invalid: self.bytes_invalid,
            send_seq: self.send_seq,
            receive_seq: self.receive_seq,
            retransmit_seq: self.retransmit_seq,
            srtt: self.rtt.srtt,
            rttvar: self.rtt.rttvar,
            rto: self.rtt.rto,
            ready_bytes: self.ready_bytes,
            stalled_bytes: self.stalled_bytes,
        }
    }

    /// Unacknowledged blocks.
    pub fn in_flight(&self) -> usize {
        self.sent.len()
    }

    /// Last sent blocks, oldest first.
    pub fn extract_old_sent(&self) -> Vec<QueueMessage> {
        self.old_sent.iter().cloned().collect()
    }

    /// Last pulled messages, oldest first.
    pub fn extract_old_received(&self) -> Vec<QueueMessage> {
        self.old_received.iter().cloned().collect()
    }
}
