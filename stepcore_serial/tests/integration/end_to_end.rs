//! Normal operation over a clean link.

use super::common::*;
use stepcore_serial::LinkState;
use stepcore_serial::SerialError;
use stepcore_serial::frame::payload;
use stepcore_common::protocol::vlq::decode_all;

#[test]
fn messages_arrive_once_in_order() {
    let (sq, sim) = connected(&[(TEST_MSGID, 2)]);
    send_numbered(&sq, 0..300);
    wait_delivered(&sq, &sim, 300);
    assert_in_order(&sim, 300);

    let stats = sq.stats();
    assert_eq!(sq.state(), LinkState::Connected);
    assert_eq!(stats.send_seq, stats.receive_seq);
    assert!(stats.bytes_write > 0);
    assert!(stats.bytes_read > 0);
    assert_eq!(stats.ready_bytes, 0);
    assert_eq!(stats.stalled_bytes, 0);
    assert_eq!(sim.stats().commands, 300);
    sq.exit().unwrap();
}

#[test]
fn blocks_are_packed() {
    let (sq, sim) = connected(&[(TEST_MSGID, 2)]);
    send_numbered(&sq, 0..100);
    wait_delivered(&sq, &sim, 100);
    // Three-value messages are far smaller than a frame payload.
    assert!(sim.stats().frames_received < 100);
}

#[test]
fn responses_are_pulled_with_timestamps() {
    let (sq, sim) = connected(&[(TEST_MSGID, 2)]);
    send_numbered(&sq, 0..1);
    wait_delivered(&sq, &sim, 1);

    sim.respond(&[9, 1234, 5]).unwrap();
    let mut got = None;
    assert!(wait_for(WAIT, || {
        got = sq.pull();
        got.is_some()
    }));
    let qm = got.unwrap();
    assert_eq!(decode_all(payload(qm.as_bytes())).unwrap(), vec![9, 1234, 5]);
    assert!(qm.receive_time > 0.0);
    assert!(qm.receive_time <= sq.monotonic());

    assert_eq!(sq.extract_old_received().len(), 1);
    assert!(!sq.extract_old_sent().is_empty());
    assert!(sq.pull().is_none());
}

#[test]
fn exit_is_idempotent_and_stops_sends() {
    let (sq, _sim) = connected(&[]);
    assert!(sq.is_running());
    sq.exit().unwrap();
    sq.exit().unwrap();
    assert!(!sq.is_running());
    let cq = stepcore_common::protocol::message::CommandQueueId(1);
    assert!(matches!(
        sq.encode_and_send(cq, &[TEST_MSGID, 0, 0], 0, 0),
        Err(SerialError::Shutdown)
    ));
}

#[test]
fn freed_queue_drops_pending_messages() {
    use stepcore_common::transport::MessageTransport;
    let (sq, sim) = connected(&[(TEST_MSGID, 2)]);
    sq.set_clock_est(1_000_000.0, sq.monotonic(), 0, 0);
    let cq = sq.alloc_command_queue();
    // Not allowed out for an hour.
    sq.encode_and_send(cq, &[TEST_MSGID, 1, 7], 3_600_000_000, 3_600_000_000)
        .unwrap();
    assert!(wait_for(WAIT, || sq.stats().stalled_bytes > 0));
    sq.free_command_queue(cq);
    assert_eq!(sq.stats().stalled_bytes, 0);
    std::thread::sleep(std::time::Duration::from_millis(20));
    assert!(sim.commands().is_empty());
}
