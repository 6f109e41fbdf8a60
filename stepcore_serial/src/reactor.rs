//! Polling loop of the transport thread.
//!
//! One iteration: read whatever the link has, feed it to the session, fire
//! the retransmit and command timers if due, write the produced bytes, then
//! pause for a time scaled to the nearest deadline. The session lock is
//! never held across link I/O.

use crate::clock::monotonic;
use crate::error::SerialError;
use crate::link::SerialLink;
use crate::session::{MAX_PENDING_BLOCKS, Session};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use stepcore_common::protocol::consts::MESSAGE_MAX;
use tracing::{error, info};

/// Read chunk size.
const INPUT_CHUNK: usize = 4096;

/// State shared between the handle and the polling thread.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) session: Mutex<Session>,
    pub(crate) running: AtomicBool,
}

/// Run until `shared.running` is cleared or the link fails.
pub(crate) fn run<L: SerialLink>(mut link: L, shared: &Shared) -> Result<(), SerialError> {
    info!("serial polling loop started");
    let mut buf = [0u8; INPUT_CHUNK];
    let mut out = Vec::with_capacity(MESSAGE_MAX * MAX_PENDING_BLOCKS as usize + 1);

    while shared.running.load(Ordering::Acquire) {
        let n = match link.read(&mut buf) {
            Ok(n) => n,
            Err(e) => {
                error!(%e, "serial read failed");
                shared.running.store(false, Ordering::Release);
                return Err(e.into());
            }
        };
        let now = monotonic();

        out.clear();
        let (retransmit, wake) = {
            let mut session = shared.session.lock();
            if n > 0 {
                session.handle_input(now, &buf[..n]);
            }
            let retransmit = now >= session.retransmit_timer();
            if retransmit {
                session.retransmit_event(now, &mut out);
            }
            if now >= session.command_timer() {
                session.command_event(now, &mut out);
            }
            (retransmit, session.next_wake())
        };

        if let Err(e) = write_out(&mut link, retransmit, &out) {
            error!(%e, "serial write failed");
            shared.running.store(false, Ordering::Release);
            return Err(e.into());
        }

        if n == 0 {
            pause(wake - monotonic());
        }
    }
    info!("serial polling loop stopped");
    Ok(())
}

fn write_out<L: SerialLink>(link: &mut L, retransmit: bool, out: &[u8]) -> std::io::Result<()> {
    if retransmit {
        link.flush_output()?;
    }
    if !out.is_empty() {
        link.write_all(out)?;
    }
    Ok(())
}

/// Wait before the next iteration: spin under 1 ms, nap under 5 ms,
/// otherwise sleep briefly so new input is still picked up quickly.
fn pause(remaining: f64) {
    if remaining < 0.001 {
        std::thread::yield_now();
    } else if remaining < 0.005 {
        std::thread::sleep(Duration::from_micros(100));
    } else {
        std::thread::sleep(Duration::from_millis(1));
    }
}
