//! Shared helpers for the serial integration tests.

use std::time::{Duration, Instant};
use stepcore_serial::{LoopbackLink, SerialQueue, SimMcu};

/// Wire time of one byte at 250000 baud.
pub const BAUD_ADJUST: f64 = 10.0 / 250_000.0;

/// Message id used for plain test commands: `[TEST_MSGID, index, value]`.
pub const TEST_MSGID: u32 = 1;

pub const WAIT: Duration = Duration::from_secs(10);

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}

/// Host queue and simulated mcu on the two ends of a loopback link.
pub fn connected(commands: &[(u32, usize)]) -> (SerialQueue, SimMcu) {
    let (host, mcu) = LoopbackLink::pair();
    let sim = SimMcu::spawn(mcu, commands).unwrap();
    let sq = SerialQueue::new(host, 192, BAUD_ADJUST).unwrap();
    (sq, sim)
}

/// Send `[TEST_MSGID, i, i * 7]` for every `i` in `range` on a fresh queue.
pub fn send_numbered(sq: &SerialQueue, range: std::ops::Range<u32>) {
    use stepcore_common::transport::MessageTransport;
    let cq = sq.alloc_command_queue();
    for i in range {
        sq.encode_and_send(cq, &[TEST_MSGID, i, i * 7], 0, 0).unwrap();
    }
}

/// Wait until `count` test commands arrived and nothing is in flight.
pub fn wait_delivered(sq: &SerialQueue, sim: &SimMcu, count: usize) {
    let done = wait_for(WAIT, || {
        sim.commands_with_id(TEST_MSGID).len() >= count && sq.in_flight() == 0
    });
    assert!(
        done,
        "delivered {} of {count}, stats: {}",
        sim.commands_with_id(TEST_MSGID).len(),
        sq.stats()
    );
}

/// Assert test commands `0..count` arrived exactly once, in order.
pub fn assert_in_order(sim: &SimMcu, count: u32) {
    let expected: Vec<Vec<u32>> = (0..count).map(|i| vec![TEST_MSGID, i, i * 7]).collect();
    assert_eq!(sim.commands_with_id(TEST_MSGID), expected);
}
