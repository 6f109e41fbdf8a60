//! Step compressor.
//!
//! Buffers absolute step clocks for one stepper and packs them into
//! `queue_step` commands. A command `(interval, count, add)` produces
//! `count` steps; the k-th step happens `interval + k * add` ticks after the
//! previous one.
//!
//! Every step is allowed to land early by up to half the gap to the previous
//! step, capped at `max_error` ticks, and never late:
//!
//! ```text
//!          prev                     point
//!   --------|--------------[==========|---------
//!                          minp      maxp
//! ```
//!
//! The search for a run bisects the `add` range; for a given `add` the
//! feasible `interval` range shrinks with each added point until it becomes
//! empty. Every chosen run is re-verified point by point before it is
//! emitted; a failed verification is a [`StepError`].
//!
//! # Usage
//!
//! ```rust
//! use stepcore_motion::stepcompress::StepCompressor;
//!
//! let mut sc = StepCompressor::new(0, 20, 20, 21);
//! sc.reset(900).unwrap();
//! for clock in [1000, 1100, 1200, 1300, 1400] {
//!     sc.push_clock(clock).unwrap();
//! }
//! sc.flush(u64::MAX).unwrap();
//! assert_eq!(sc.last_step_clock(), 1400);
//! ```

use crate::error::StepError;
use crate::itersolve::StepSink;
use parking_lot::Mutex;
use static_assertions::const_assert;
use std::collections::VecDeque;
use std::sync::Arc;
use stepcore_common::machine::{McuConfig, StepperConfig};
use stepcore_common::protocol::message::QueueMessage;
use tracing::{debug, error, trace};

/// Compressor shared between a [`Stepper`](crate::Stepper) and the
/// [`StepperSync`](crate::StepperSync) that drains it.
pub type SharedCompressor = Arc<Mutex<StepCompressor>>;

/// Initial capacity of the clock queue [entries].
const QUEUE_START_SIZE: usize = 1024;

/// Longest run a single command can describe (16-bit count).
const MAX_RUN: usize = 65535;

/// Queue length above which steps are flushed eagerly.
const MAX_PENDING: usize = MAX_RUN + 2000;

/// Furthest a step may be from `last_step_clock` before the queue is
/// flushed early or the step is sent on its own.
pub const CLOCK_DIFF_MAX: u64 = 3 << 28;

/// Deviation factor between two quadratic sequences over `count` points.
const QUADRATIC_DEV: i64 = 11;

/// Run length beyond which no other `add` can win.
const ADD_SEARCH_LIMIT: i64 = 0x200;

/// Exclusive upper bound of the 31-bit interval field.
const INTERVAL_LIMIT: i64 = 0x8000_0000;

const_assert!(CLOCK_DIFF_MAX < INTERVAL_LIMIT as u64);
const_assert!(MAX_PENDING > MAX_RUN);

/// One verified `queue_step` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepMove {
    pub interval: u32,
    pub count: u16,
    pub add: i16,
}

impl StepMove {
    /// Total ticks covered by the run.
    pub fn ticks(&self) -> i64 {
        let count = i64::from(self.count);
        i64::from(self.add) * count * (count - 1) / 2 + i64::from(self.interval) * count
    }

    /// Absolute clocks of every step, starting from `start_clock`.
    pub fn step_clocks(&self, start_clock: u64) -> impl Iterator<Item = u64> {
        let add = i64::from(self.add);
        let mut interval = i64::from(self.interval);
        let mut clock = start_clock;
        (0..self.count).map(move |_| {
            clock = clock.wrapping_add_signed(interval);
            interval += add;
            clock
        })
    }
}

/// Unverified search result.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    interval: i64,
    count: i64,
    add: i64,
}

#[inline]
fn idiv_up(n: i64, d: i64) -> i64 {
    if n >= 0 { (n + d - 1) / d } else { n / d }
}

#[inline]
fn idiv_down(n: i64, d: i64) -> i64 {
    if n >= 0 { n / d } else { (n - d + 1) / d }
}

/// Step clock queue and command encoder for one stepper.
#[derive(Debug)]
pub struct StepCompressor {
    oid: u32,
    max_error: u32,
    queue_step_msgid: u32,
    set_next_step_dir_msgid: u32,
    invert_sdir: bool,

    /// Absolute clocks; entries before `queue_pos` are already encoded.
    queue: Vec<u64>,
    queue_pos: usize,

    mcu_time_offset: f64,
    mcu_freq: f64,
    last_step_clock: u64,
    homing_clock: u64,

    /// Last direction sent to the mcu (`None` until the first step).
    sdir: Option<bool>,
    msg_queue: VecDeque<QueueMessage>,
}

impl StepCompressor {
    /// Create a compressor. `max_error` is in mcu ticks.
    pub fn new(oid: u32, max_error: u32, queue_step_msgid: u32, set_next_step_dir_msgid: u32) -> Self {
        Self {
            oid,
            max_error,
            queue_step_msgid,
            set_next_step_dir_msgid,
            invert_sdir: false,
            queue: Vec::with_capacity(QUEUE_START_SIZE),
            queue_pos: 0,
            mcu_time_offset: 0.0,
            mcu_freq: 1.0,
            last_step_clock: 0,
            homing_clock: 0,
            sdir: None,
            msg_queue: VecDeque::new(),
        }
    }

    /// Create a compressor for a configured stepper on a configured mcu.
    pub fn from_config(stepper: &StepperConfig, mcu: &McuConfig) -> Self {
        let max_error = (stepper.max_error * mcu.clock_freq).clamp(0.0, f64::from(u32::MAX)) as u32;
        let mut sc = Self::new(
            stepper.oid,
            max_error,
            mcu.queue_step_msgid,
            mcu.set_next_step_dir_msgid,
        );
        sc.invert_sdir = stepper.invert_dir;
        sc.set_time(0.0, mcu.clock_freq);
        sc
    }

    /// Wrap into the shared handle used by the solver and the synchronizer.
    pub fn into_shared(self) -> SharedCompressor {
        Arc::new(Mutex::new(self))
    }

    pub fn oid(&self) -> u32 {
        self.oid
    }

    pub fn max_error(&self) -> u32 {
        self.max_error
    }

    pub fn mcu_freq(&self) -> f64 {
        self.mcu_freq
    }

    pub fn last_step_clock(&self) -> u64 {
        self.last_step_clock
    }

    /// Print time of the last emitted step.
    pub fn last_step_print_time(&self) -> f64 {
        self.mcu_time_offset + (self.last_step_clock as f64 - 0.5) / self.mcu_freq
    }

    /// Step clocks queued but not yet encoded.
    pub fn pending_len(&self) -> usize {
        self.queue.len() - self.queue_pos
    }

    /// Encoded messages waiting for the synchronizer.
    pub fn queued_messages(&self) -> usize {
        self.msg_queue.len()
    }

    /// Set the mapping from print time to mcu clock.
    pub fn set_time(&mut self, time_offset: f64, mcu_freq: f64) {
        self.mcu_time_offset = time_offset;
        self.mcu_freq = mcu_freq;
    }

    /// Flip the direction pin polarity.
    ///
    /// A known direction is flipped too, so the next step re-sends it.
    pub fn set_invert_sdir(&mut self, invert: bool) {
        if invert != self.invert_sdir {
            self.invert_sdir = invert;
            self.sdir = self.sdir.map(|d| !d);
        }
    }

    /// Tag every subsequent step command with `homing_clock` (0 disables).
    pub fn set_homing(&mut self, homing_clock: u64) {
        debug!(oid = self.oid, homing_clock, "stepcompress homing clock");
        self.homing_clock = homing_clock;
    }

    /// Flush everything and restart from `last_step_clock` with an unknown
    /// direction.
    pub fn reset(&mut self, last_step_clock: u64) -> Result<(), StepError> {
        self.flush(u64::MAX)?;
        debug!(oid = self.oid, last_step_clock, "stepcompress reset");
        self.last_step_clock = last_step_clock;
        self.sdir = None;
        Ok(())
    }

    /// Queue an arbitrary command after all current steps.
    pub fn queue_msg(&mut self, data: &[u32]) -> Result<(), StepError> {
        self.flush(u64::MAX)?;
        let mut qm = self.encode(data)?;
        qm.req_clock = self.last_step_clock;
        self.msg_queue.push_back(qm);
        Ok(())
    }

    /// Queue one absolute step clock.
    pub fn push_clock(&mut self, step_clock: u64) -> Result<(), StepError> {
        let last = self
            .queue
            .get(self.queue_pos..)
            .and_then(|p| p.last().copied())
            .unwrap_or(self.last_step_clock);
        if step_clock < last {
            error!(oid = self.oid, step_clock, last, "step clock regression");
            return Err(StepError::ClockRegression {
                oid: self.oid,
                clock: step_clock,
                last,
            });
        }

        if step_clock >= self.last_step_clock + CLOCK_DIFF_MAX {
            self.flush(step_clock - CLOCK_DIFF_MAX + 1)?;
            if step_clock >= self.last_step_clock + CLOCK_DIFF_MAX {
                return self.flush_far(step_clock);
            }
        }

        if self.pending_len() > MAX_PENDING {
            let target = self.queue[self.queue.len() - MAX_RUN];
            self.flush(target)?;
        }
        if self.queue.len() == self.queue.capacity() && self.queue_pos > 0 {
            // Reuse the encoded prefix before growing.
            self.queue.drain(..self.queue_pos);
            self.queue_pos = 0;
        }
        self.queue.push(step_clock);
        Ok(())
    }

    /// Encode queued steps until `last_step_clock` reaches `move_clock`.
    pub fn flush(&mut self, move_clock: u64) -> Result<(), StepError> {
        if self.pending_len() == 0 {
            return Ok(());
        }
        while self.last_step_clock < move_clock {
            let candidate = self.compress_bisect_add();
            let mv = self.check_line(candidate)?;

            let mut qm = self.encode(&[
                self.queue_step_msgid,
                self.oid,
                mv.interval,
                u32::from(mv.count),
                i32::from(mv.add) as u32,
            ])?;
            let clock = if self.homing_clock != 0 {
                self.homing_clock
            } else {
                self.last_step_clock
            };
            qm.min_clock = clock;
            qm.req_clock = clock;
            trace!(
                oid = self.oid,
                interval = mv.interval,
                count = mv.count,
                add = mv.add,
                clock = self.last_step_clock,
                "queue_step"
            );
            self.last_step_clock = self.last_step_clock.wrapping_add_signed(mv.ticks());
            self.msg_queue.push_back(qm);

            let count = usize::from(mv.count);
            if self.queue_pos + count >= self.queue.len() {
                self.queue.clear();
                self.queue_pos = 0;
                break;
            }
            self.queue_pos += count;
        }
        Ok(())
    }

    /// Oldest encoded message, if any.
    pub fn front_message(&self) -> Option<&QueueMessage> {
        self.msg_queue.front()
    }

    /// Remove the oldest encoded message.
    pub fn pop_message(&mut self) -> Option<QueueMessage> {
        self.msg_queue.pop_front()
    }

    // ─── Internals ──────────────────────────────────────────────────

    fn encode(&self, data: &[u32]) -> Result<QueueMessage, StepError> {
        QueueMessage::encode(data).map_err(|source| StepError::Encode {
            oid: self.oid,
            source,
        })
    }

    /// Emit a single step too far ahead to share a run with anything.
    fn flush_far(&mut self, step_clock: u64) -> Result<(), StepError> {
        let interval = (step_clock - self.last_step_clock) as i64;
        if interval >= INTERVAL_LIMIT {
            error!(oid = self.oid, interval, "far step exceeds interval field");
            return Err(StepError::IntervalOverflow {
                oid: self.oid,
                interval,
                count: 1,
                add: 0,
                index: 0,
                value: interval,
            });
        }
        let mut qm = self.encode(&[self.queue_step_msgid, self.oid, interval as u32, 1, 0])?;
        if self.homing_clock != 0 {
            qm.min_clock = self.homing_clock;
            qm.req_clock = self.homing_clock;
        } else {
            qm.min_clock = self.last_step_clock;
            qm.req_clock = step_clock;
        }
        debug!(oid = self.oid, step_clock, interval, "stepcompress flush far");
        self.last_step_clock = step_clock;
        self.msg_queue.push_back(qm);
        Ok(())
    }

    /// Error window `(minp, maxp)` of pending point `i`, relative to
    /// `last_step_clock`.
    #[inline]
    fn minmax_point(&self, pending: &[u64], i: usize) -> (i64, i64) {
        let lsc = self.last_step_clock;
        let point = pending[i].wrapping_sub(lsc) as i64;
        let prev = if i > 0 {
            pending[i - 1].wrapping_sub(lsc) as i64
        } else {
            0
        };
        let max_error = ((point - prev) / 2).min(i64::from(self.max_error));
        (point - max_error, point)
    }

    /// Find the run reaching furthest from the front of the queue.
    fn compress_bisect_add(&self) -> Candidate {
        let pending = &self.queue[self.queue_pos..];
        let qlast = pending.len().min(MAX_RUN);
        let (minp, maxp) = self.minmax_point(pending, 0);
        let (mut outer_min, mut outer_max) = (minp, maxp);
        let (mut add, mut minadd, mut maxadd) = (0i64, -0x8000i64, 0x7fffi64);
        let mut best = Candidate {
            interval: 0,
            count: 1,
            add: 1,
        };
        let mut bestreach = i64::MIN;
        let mut zero = Candidate {
            interval: 0,
            count: 0,
            add: 0,
        };

        loop {
            // Longest run for this `add`.
            let mut nextmin = outer_min;
            let mut nextmax = outer_max;
            let mut interval = nextmax;
            let mut nextcount = 1i64;
            let (next_minp, next_maxp) = loop {
                nextcount += 1;
                let idx = (nextcount - 1) as usize;
                if idx >= qlast {
                    return Candidate {
                        interval,
                        count: nextcount - 1,
                        add,
                    };
                }
                let (pmin, pmax) = self.minmax_point(pending, idx);
                let c = add * (nextcount * (nextcount - 1) / 2);
                if nextmin * nextcount < pmin - c {
                    nextmin = idiv_up(pmin - c, nextcount);
                }
                if nextmax * nextcount > pmax - c {
                    nextmax = idiv_down(pmax - c, nextcount);
                }
                if nextmin > nextmax {
                    break (pmin, pmax);
                }
                interval = nextmax;
            };

            let count = nextcount - 1;
            let reach = add * (count * (count - 1) / 2) + interval * count;
            if reach > bestreach || (reach == bestreach && interval > best.interval) {
                best = Candidate {
                    interval,
                    count,
                    add,
                };
                bestreach = reach;
                if add == 0 {
                    zero = best;
                }
                if count > ADD_SEARCH_LIMIT {
                    break;
                }
            }

            // Would a larger or smaller add reach the next point?
            let nextaddfactor = nextcount * (nextcount - 1) / 2;
            let nextreach = add * nextaddfactor + interval * nextcount;
            if nextreach < next_minp {
                minadd = add + 1;
                outer_max = nextmax;
            } else {
                maxadd = add - 1;
                outer_min = nextmin;
            }

            if count > 1 {
                let errdelta = i64::from(self.max_error) * QUADRATIC_DEV / (count * count);
                minadd = minadd.max(add - errdelta);
                maxadd = maxadd.min(add + errdelta);
            }

            let c = outer_max * nextcount;
            if minadd * nextaddfactor < next_minp - c {
                minadd = idiv_up(next_minp - c, nextaddfactor);
            }
            let c = outer_min * nextcount;
            if maxadd * nextaddfactor > next_maxp - c {
                maxadd = idiv_down(next_maxp - c, nextaddfactor);
            }

            if minadd > maxadd {
                break;
            }
            add = maxadd - (maxadd - minadd) / 4;
        }

        if zero.count + zero.count / 16 >= best.count {
            zero
        } else {
            best
        }
    }

    /// Re-verify a candidate against every point it covers.
    fn check_line(&self, c: Candidate) -> Result<StepMove, StepError> {
        let oid = self.oid;
        if c.count <= 0
            || c.count > MAX_RUN as i64
            || (c.interval == 0 && c.add == 0 && c.count > 1)
            || !(0..INTERVAL_LIMIT).contains(&c.interval)
            || !(i64::from(i16::MIN)..=i64::from(i16::MAX)).contains(&c.add)
        {
            error!(oid, interval = c.interval, count = c.count, add = c.add, "invalid step sequence");
            return Err(StepError::InvalidSequence {
                oid,
                interval: c.interval,
                count: c.count,
                add: c.add,
            });
        }

        let pending = &self.queue[self.queue_pos..];
        let mut interval = c.interval;
        let mut p = 0i64;
        for i in 0..c.count {
            let (minp, maxp) = self.minmax_point(pending, i as usize);
            p += interval;
            if p < minp || p > maxp {
                error!(oid, index = i, point = p, minp, maxp, "step point out of range");
                return Err(StepError::PointOutOfRange {
                    oid,
                    interval: c.interval,
                    count: c.count,
                    add: c.add,
                    index: i,
                    point: p,
                    min: minp,
                    max: maxp,
                });
            }
            if !(0..INTERVAL_LIMIT).contains(&interval) {
                error!(oid, index = i, interval, "step interval overflow");
                return Err(StepError::IntervalOverflow {
                    oid,
                    interval: c.interval,
                    count: c.count,
                    add: c.add,
                    index: i,
                    value: interval,
                });
            }
            interval += c.add;
        }

        Ok(StepMove {
            interval: c.interval as u32,
            count: c.count as u16,
            add: c.add as i16,
        })
    }
}

impl StepSink for StepCompressor {
    fn step_dir(&self) -> Option<bool> {
        self.sdir
    }

    fn set_next_step_dir(&mut self, sdir: bool) -> Result<(), StepError> {
        if self.sdir == Some(sdir) {
            return Ok(());
        }
        self.sdir = Some(sdir);
        self.flush(u64::MAX)?;
        let mut qm = self.encode(&[
            self.set_next_step_dir_msgid,
            self.oid,
            u32::from(sdir ^ self.invert_sdir),
        ])?;
        qm.req_clock = self.last_step_clock;
        trace!(oid = self.oid, sdir, "set_next_step_dir");
        self.msg_queue.push_back(qm);
        Ok(())
    }

    fn append_step(&mut self, print_time: f64, step_time: f64) -> Result<(), StepError> {
        let offset = (print_time - self.mcu_time_offset) * self.mcu_freq;
        let clock = offset + step_time * self.mcu_freq + 0.5;
        let last = self.last_step_clock;
        if !(clock >= last as f64) {
            error!(oid = self.oid, clock, last, "step before last step clock");
            return Err(StepError::ClockRegression {
                oid: self.oid,
                clock: clock.max(0.0) as u64,
                last,
            });
        }
        self.push_clock(clock as u64)
    }
}
