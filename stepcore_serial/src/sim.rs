//! Simulated mcu.
//!
//! Speaks the mcu side of the link protocol on a background thread: it
//! validates frames, acks in-sequence blocks, naks out-of-sequence ones and
//! once after each run of invalid bytes, and decodes the commands it
//! receives. It can be told to lose or corrupt incoming frames to exercise
//! the host's retransmission path.
//!
//! The first valid frame sets the expected sequence, so a freshly started
//! host and simulator agree without a reset handshake.

use crate::error::SerialError;
use crate::frame::{FrameBuf, FrameScanner, Scan, encode_frame, payload};
use crate::link::SerialLink;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use stepcore_common::protocol::consts::{MESSAGE_POS_SEQ, MESSAGE_SEQ_MASK, MESSAGE_SYNC};
use stepcore_common::protocol::message::QueueMessage;
use stepcore_common::protocol::vlq::{decode_all, decode_vlq};
use tracing::{debug, info, warn};

/// Counters of the simulated mcu.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SimMcuStats {
    /// In-sequence blocks accepted.
    pub frames_received: u64,
    /// Valid frames thrown away on request.
    pub frames_dropped: u64,
    /// Input chunks damaged on request.
    pub frames_corrupted: u64,
    pub naks_sent: u64,
    pub bytes_invalid: u64,
    /// Commands decoded.
    pub commands: u64,
}

#[derive(Debug)]
struct SimState {
    scanner: FrameScanner,
    input: Vec<u8>,
    next_seq: Option<u64>,
    nak_pending: bool,
    arg_counts: HashMap<u32, usize>,
    drop_next: usize,
    corrupt_next: usize,
    commands: Vec<Vec<u32>>,
    responses: VecDeque<Vec<u8>>,
    stats: SimMcuStats,
}

impl SimState {
    fn new(arg_counts: HashMap<u32, usize>) -> Self {
        Self {
            scanner: FrameScanner::new(),
            input: Vec::new(),
            next_seq: None,
            nak_pending: true,
            arg_counts,
            drop_next: 0,
            corrupt_next: 0,
            commands: Vec::new(),
            responses: VecDeque::new(),
            stats: SimMcuStats::default(),
        }
    }

    fn process(&mut self, data: &[u8], out: &mut Vec<u8>) {
        let start = self.input.len();
        self.input.extend_from_slice(data);
        if self.corrupt_next > 0 && !data.is_empty() {
            self.corrupt_next -= 1;
            self.stats.frames_corrupted += 1;
            self.input[start + data.len() / 2] ^= 0x55;
        }
        loop {
            // Leading sync bytes are padding, not errors.
            if !self.scanner.needs_sync() && self.input.first() == Some(&MESSAGE_SYNC) {
                self.input.remove(0);
                continue;
            }
            match self.scanner.check(&self.input) {
                Scan::NeedMore => break,
                Scan::Frame(len) => {
                    let mut frame = FrameBuf::new();
                    let _ = frame.extend_from_slice(&self.input[..len]);
                    self.input.drain(..len);
                    self.handle_frame(&frame, out);
                }
                Scan::Discard(len) => {
                    self.input.drain(..len);
                    self.stats.bytes_invalid += len as u64;
                    if self.nak_pending {
                        self.nak_pending = false;
                        self.nak(out);
                    }
                }
            }
        }
    }

    fn handle_frame(&mut self, frame: &[u8], out: &mut Vec<u8>) {
        if self.drop_next > 0 {
            self.drop_next -= 1;
            self.stats.frames_dropped += 1;
            debug!(seq = frame[MESSAGE_POS_SEQ], "sim mcu dropped frame");
            return;
        }
        self.nak_pending = true;
        let seq = u64::from(frame[MESSAGE_POS_SEQ]) & MESSAGE_SEQ_MASK;
        let expected = *self.next_seq.get_or_insert(seq);
        if seq != expected {
            self.nak(out);
            return;
        }
        self.stats.frames_received += 1;
        self.decode(payload(frame));
        self.next_seq = Some((seq + 1) & MESSAGE_SEQ_MASK);
        self.send_frame(&[], out);
    }

    fn nak(&mut self, out: &mut Vec<u8>) {
        self.stats.naks_sent += 1;
        self.send_frame(&[], out);
    }

    fn send_frame(&self, data: &[u8], out: &mut Vec<u8>) {
        if let Ok(frame) = encode_frame(self.next_seq.unwrap_or(0), data) {
            out.extend_from_slice(&frame);
        }
    }

    fn flush_responses(&mut self, out: &mut Vec<u8>) {
        if self.next_seq.is_none() {
            return;
        }
        while let Some(data) = self.responses.pop_front() {
            self.send_frame(&data, out);
        }
    }

    fn decode(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let Ok((msgid, used)) = decode_vlq(data) else {
                self.stats.bytes_invalid += data.len() as u64;
                return;
            };
            data = &data[used..];
            let mut cmd = vec![msgid];
            match self.arg_counts.get(&msgid) {
                Some(&nargs) => {
                    for _ in 0..nargs {
                        let Ok((v, used)) = decode_vlq(data) else {
                            self.stats.bytes_invalid += data.len() as u64;
                            return;
                        };
                        cmd.push(v);
                        data = &data[used..];
                    }
                }
                None => {
                    // Unknown layout: the rest of the block is its arguments.
                    cmd.extend(decode_all(data).unwrap_or_default());
                    data = &[];
                }
            }
            self.stats.commands += 1;
            self.commands.push(cmd);
        }
    }
}

/// Handle of a running simulated mcu.
pub struct SimMcu {
    state: Arc<Mutex<SimState>>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SimMcu {
    /// Serve `link`; `commands` lists `(msgid, argument count)` pairs used to
    /// split blocks into commands.
    pub fn spawn<L>(link: L, commands: &[(u32, usize)]) -> Result<Self, SerialError>
    where
        L: SerialLink + 'static,
    {
        let state = Arc::new(Mutex::new(SimState::new(commands.iter().copied().collect())));
        let running = Arc::new(AtomicBool::new(true));
        let thread = {
            let state = Arc::clone(&state);
            let running = Arc::clone(&running);
            std::thread::Builder::new()
                .name("sim-mcu".into())
                .spawn(move || run(link, &state, &running))?
        };
        info!(commands = commands.len(), "sim mcu started");
        Ok(Self {
            state,
            running,
            thread: Some(thread),
        })
    }

    /// Lose the next `n` valid frames.
    pub fn drop_frames(&self, n: usize) {
        self.state.lock().drop_next += n;
    }

    /// Damage the next `n` input chunks.
    pub fn corrupt_frames(&self, n: usize) {
        self.state.lock().corrupt_next += n;
    }

    /// Send a data frame to the host.
    pub fn respond(&self, values: &[u32]) -> Result<(), SerialError> {
        let qm = QueueMessage::encode(values)?;
        self.state.lock().responses.push_back(qm.as_bytes().to_vec());
        Ok(())
    }

    /// Every command decoded so far.
    pub fn commands(&self) -> Vec<Vec<u32>> {
        self.state.lock().commands.clone()
    }

    /// Decoded commands with message id `msgid`.
    pub fn commands_with_id(&self, msgid: u32) -> Vec<Vec<u32>> {
        self.state
            .lock()
            .commands
            .iter()
            .filter(|c| c.first() == Some(&msgid))
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> SimMcuStats {
        self.state.lock().stats
    }

    /// Stop the simulator thread.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("sim mcu thread panicked");
            }
        }
    }
}

impl Drop for SimMcu {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<L: SerialLink>(mut link: L, state: &Mutex<SimState>, running: &AtomicBool) {
    let mut buf = [0u8; 4096];
    let mut out = Vec::new();
    while running.load(Ordering::Acquire) {
        let n = match link.read(&mut buf) {
            Ok(n) => n,
            Err(e) => {
                warn!(%e, "sim mcu read failed");
                break;
            }
        };
        out.clear();
        {
            let mut st = state.lock();
            if n > 0 {
                st.process(&buf[..n], &mut out);
            }
            st.flush_responses(&mut out);
        }
        if !out.is_empty() {
            if let Err(e) = link.write_all(&out) {
                warn!(%e, "sim mcu write failed");
                break;
            }
        }
        if n == 0 {
            std::thread::sleep(Duration::from_micros(200));
        }
    }
}
