//! Public transport handle.
//!
//! # Usage
//!
//! ```rust
//! use stepcore_common::transport::MessageTransport;
//! use stepcore_serial::link::LoopbackLink;
//! use stepcore_serial::serialqueue::SerialQueue;
//!
//! let (host, _mcu) = LoopbackLink::pair();
//! let sq = SerialQueue::new(host, 192, 10.0 / 250_000.0).unwrap();
//! let cq = sq.alloc_command_queue();
//! sq.encode_and_send(cq, &[1, 2, 3], 0, 0).unwrap();
//! sq.exit().unwrap();
//! ```

use crate::clock::{ClockEstimate, monotonic};
use crate::error::SerialError;
use crate::link::SerialLink;
use crate::reactor::{self, Shared};
use crate::session::{LinkState, SerialStats, Session};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use stepcore_common::consts::BITS_PER_BYTE;
use stepcore_common::prelude::*;
use tracing::{info, warn};

/// Reliable message queue to one mcu, serviced by a background thread.
pub struct SerialQueue {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<Result<(), SerialError>>>>,
}

impl SerialQueue {
    /// Start the transport over `link`.
    pub fn new<L>(link: L, receive_window: usize, baud_adjust: f64) -> Result<Self, SerialError>
    where
        L: SerialLink + 'static,
    {
        let shared = Arc::new(Shared {
            session: Mutex::new(Session::new(receive_window, baud_adjust)),
            running: AtomicBool::new(true),
        });
        let thread_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("serialqueue".into())
            .spawn(move || reactor::run(link, &thread_shared))?;
        info!(receive_window, baud_adjust, "serial queue started");
        Ok(Self {
            shared,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Start the transport with the window and baud rate of `mcu`.
    pub fn from_config<L>(link: L, mcu: &McuConfig) -> Result<Self, SerialError>
    where
        L: SerialLink + 'static,
    {
        Self::new(
            link,
            mcu.receive_window as usize,
            BITS_PER_BYTE / f64::from(mcu.baud),
        )
    }

    /// Host time base used by every timestamp of this queue.
    pub fn monotonic(&self) -> f64 {
        monotonic()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    fn check_running(&self) -> Result<(), SerialError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(SerialError::Shutdown)
        }
    }

    /// Queue one already encoded message.
    pub fn send(
        &self,
        cq: CommandQueueId,
        msg: &[u8],
        min_clock: u64,
        req_clock: u64,
    ) -> Result<(), SerialError> {
        self.check_running()?;
        let qm = QueueMessage::fill(msg)?.with_clocks(min_clock, req_clock);
        self.shared.session.lock().send_batch(cq, vec![qm]);
        Ok(())
    }

    /// Encode `values` (message id first) and queue the result.
    pub fn encode_and_send(
        &self,
        cq: CommandQueueId,
        values: &[u32],
        min_clock: u64,
        req_clock: u64,
    ) -> Result<(), SerialError> {
        self.check_running()?;
        let qm = QueueMessage::encode(values)?.with_clocks(min_clock, req_clock);
        self.shared.session.lock().send_batch(cq, vec![qm]);
        Ok(())
    }

    /// Next received message, without waiting.
    pub fn pull(&self) -> Option<QueueMessage> {
        self.shared.session.lock().pull()
    }

    pub fn free_command_queue(&self, cq: CommandQueueId) {
        self.shared.session.lock().free_command_queue(cq);
    }

    /// Install the mcu clock estimate.
    pub fn set_clock_est(&self, est_freq: f64, conv_time: f64, conv_clock: u64, last_clock: u64) {
        self.shared
            .session
            .lock()
            .set_clock_est(ClockEstimate::new(est_freq, conv_time, conv_clock, last_clock));
    }

    pub fn set_receive_window(&self, receive_window: usize) {
        self.shared.session.lock().set_receive_window(receive_window);
    }

    pub fn set_baud_adjust(&self, baud_adjust: f64) {
        self.shared.session.lock().set_baud_adjust(baud_adjust);
    }

    pub fn stats(&self) -> SerialStats {
        self.shared.session.lock().stats()
    }

    pub fn state(&self) -> LinkState {
        self.shared.session.lock().state()
    }

    /// Blocks not yet acknowledged.
    pub fn in_flight(&self) -> usize {
        self.shared.session.lock().in_flight()
    }

    pub fn extract_old_sent(&self) -> Vec<QueueMessage> {
        self.shared.session.lock().extract_old_sent()
    }

    pub fn extract_old_received(&self) -> Vec<QueueMessage> {
        self.shared.session.lock().extract_old_received()
    }

    /// Stop the polling thread and wait for it.
    ///
    /// Returns the error that ended the loop, if any. Calling it again is a
    /// no-op.
    pub fn exit(&self) -> Result<(), SerialError> {
        self.shared.running.store(false, Ordering::Release);
        let Some(thread) = self.thread.lock().take() else {
            return Ok(());
        };
        let result = thread.join().map_err(|_| SerialError::ThreadPanicked)?;
        info!(stats = %self.stats(), "serial queue stopped");
        result
    }
}

impl Drop for SerialQueue {
    fn drop(&mut self) {
        if let Err(e) = self.exit() {
            warn!(%e, "serial queue ended with an error");
        }
    }
}

impl MessageTransport for SerialQueue {
    fn alloc_command_queue(&self) -> CommandQueueId {
        self.shared.session.lock().alloc_command_queue()
    }

    fn send_batch(&self, cq: CommandQueueId, msgs: Vec<QueueMessage>) {
        if !self.is_running() {
            warn!(cq = cq.0, count = msgs.len(), "send on stopped serial queue");
            return;
        }
        self.shared.session.lock().send_batch(cq, msgs);
    }
}
