//! Loss and corruption on the host to mcu direction.

use super::common::*;

#[test]
fn dropped_frames_are_retransmitted() {
    let (sq, sim) = connected(&[(TEST_MSGID, 2)]);
    // Establish the sequence first.
    send_numbered(&sq, 0..1);
    wait_delivered(&sq, &sim, 1);

    sim.drop_frames(3);
    send_numbered(&sq, 1..150);
    wait_delivered(&sq, &sim, 150);

    assert_in_order(&sim, 150);
    assert_eq!(sim.stats().frames_dropped, 3);
    assert!(sq.stats().bytes_retransmit > 0);
}

#[test]
fn lost_last_frame_times_out() {
    let (sq, sim) = connected(&[(TEST_MSGID, 2)]);
    send_numbered(&sq, 0..1);
    wait_delivered(&sq, &sim, 1);

    sim.drop_frames(1);
    send_numbered(&sq, 1..2);
    wait_delivered(&sq, &sim, 2);
    assert_in_order(&sim, 2);
    assert!(sq.stats().bytes_retransmit > 0);
}

#[test]
fn corrupted_frames_are_recovered() {
    let (sq, sim) = connected(&[(TEST_MSGID, 2)]);
    send_numbered(&sq, 0..1);
    wait_delivered(&sq, &sim, 1);

    sim.corrupt_frames(2);
    send_numbered(&sq, 1..200);
    wait_delivered(&sq, &sim, 200);

    assert_in_order(&sim, 200);
    let st = sim.stats();
    assert_eq!(st.frames_corrupted, 2);
    assert!(st.bytes_invalid > 0);
    assert!(sq.stats().bytes_retransmit > 0);
}
