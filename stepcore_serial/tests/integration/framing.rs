//! Frame recovery from a noisy byte stream.

use proptest::prelude::*;
use stepcore_common::protocol::consts::{MESSAGE_PAYLOAD_MAX, MESSAGE_SYNC};
use stepcore_serial::frame::{FrameScanner, Scan, encode_frame, payload};

/// Feed `stream` in chunks of the given sizes; collect every frame found.
fn scan_chunked(stream: &[u8], chunks: &[usize]) -> (Vec<Vec<u8>>, usize) {
    let mut scanner = FrameScanner::new();
    let mut buf = Vec::new();
    let mut frames = Vec::new();
    let mut discarded = 0;
    let mut rest = stream;
    let mut sizes = chunks.iter().cycle();
    while !rest.is_empty() {
        let n = (*sizes.next().unwrap()).clamp(1, rest.len());
        buf.extend_from_slice(&rest[..n]);
        rest = &rest[n..];
        loop {
            match scanner.check(&buf) {
                Scan::NeedMore => break,
                Scan::Frame(len) => {
                    frames.push(payload(&buf[..len]).to_vec());
                    buf.drain(..len);
                }
                Scan::Discard(len) => {
                    discarded += len;
                    buf.drain(..len);
                }
            }
        }
    }
    (frames, discarded)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn frames_after_garbage_are_recovered(
        garbage in prop::collection::vec(0x80u8..=0xff, 0..40),
        payloads in prop::collection::vec(
            prop::collection::vec(any::<u8>(), 0..=MESSAGE_PAYLOAD_MAX),
            1..8,
        ),
        chunks in prop::collection::vec(1usize..32, 1..6),
    ) {
        let mut stream = garbage.clone();
        stream.push(MESSAGE_SYNC);
        for (seq, p) in payloads.iter().enumerate() {
            stream.extend_from_slice(&encode_frame(seq as u64, p).unwrap());
        }

        let (frames, discarded) = scan_chunked(&stream, &chunks);
        prop_assert_eq!(frames, payloads);
        prop_assert_eq!(discarded, garbage.len() + 1);
    }
}

#[test]
fn truncated_frame_is_skipped_at_next_sync() {
    let good = encode_frame(3, &[1, 2, 3]).unwrap();
    let mut stream = good[..good.len() - 2].to_vec();
    stream.extend_from_slice(&good);
    stream.extend_from_slice(&encode_frame(4, &[4]).unwrap());

    let (frames, discarded) = scan_chunked(&stream, &[64]);
    // The torn frame swallows the next one up to its sync byte.
    assert_eq!(frames, vec![vec![4]]);
    assert_eq!(discarded, good.len() - 2 + good.len());
}
