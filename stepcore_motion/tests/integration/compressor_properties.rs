//! Compressor properties: every emitted command reproduces the queued
//! clocks within the error bound, never late.

use proptest::prelude::*;
use stepcore_common::protocol::vlq::decode_all;
use stepcore_motion::stepcompress::{StepCompressor, StepMove};

/// Expand all `queue_step` messages back into absolute clocks.
fn reconstruct(sc: &mut StepCompressor, start_clock: u64) -> Vec<u64> {
    let mut clock = start_clock;
    let mut out = Vec::new();
    while let Some(qm) = sc.pop_message() {
        let args = decode_all(qm.as_bytes()).unwrap();
        assert_eq!(args[0], 20);
        let mv = StepMove {
            interval: args[2],
            count: args[3] as u16,
            add: args[4] as i32 as i16,
        };
        out.extend(mv.step_clocks(clock));
        clock = *out.last().unwrap();
    }
    out
}

fn check_round_trip(clocks: &[u64], max_error: u32) {
    let mut sc = StepCompressor::new(1, max_error, 20, 21);
    for &c in clocks {
        sc.push_clock(c).unwrap();
    }
    sc.flush(u64::MAX).unwrap();
    let rebuilt = reconstruct(&mut sc, 0);
    assert_eq!(rebuilt.len(), clocks.len());
    for (i, (&orig, &got)) in clocks.iter().zip(&rebuilt).enumerate() {
        assert!(got <= orig, "step {i}: {got} later than {orig}");
        assert!(
            orig - got <= u64::from(max_error),
            "step {i}: {got} more than {max_error} before {orig}"
        );
    }
}

#[test]
fn scenario_constant_spacing() {
    let mut sc = StepCompressor::new(1, 20, 20, 21);
    sc.reset(900).unwrap();
    for c in [1000, 1100, 1200, 1300, 1400] {
        sc.push_clock(c).unwrap();
    }
    sc.flush(u64::MAX).unwrap();
    let qm = sc.pop_message().unwrap();
    assert_eq!(decode_all(qm.as_bytes()).unwrap(), vec![20, 1, 100, 5, 0]);
    assert!(sc.pop_message().is_none());
}

#[test]
fn accelerate_cruise_decelerate_round_trips() {
    // 16 MHz clock, 80 steps/mm, 0 -> 200 mm/s -> 0 at 3000 mm/s².
    let freq = 16_000_000.0;
    let steps_per_mm = 80.0;
    let (v, a) = (200.0, 3000.0);
    let t_acc = v / a;
    let d_acc = 0.5 * v * t_acc;
    let total = 2.0 * d_acc + 20.0;
    let t_cruise = 20.0 / v;
    let n = (total * steps_per_mm) as usize;
    let clocks: Vec<u64> = (1..n)
        .map(|k| {
            let d = (k as f64 - 0.5) / steps_per_mm;
            let t = if d < d_acc {
                (2.0 * d / a).sqrt()
            } else if d < d_acc + 20.0 {
                t_acc + (d - d_acc) / v
            } else {
                let rem = total - d;
                2.0 * t_acc + t_cruise - (2.0 * rem / a).sqrt()
            };
            (t * freq) as u64 + 1
        })
        .collect();
    check_round_trip(&clocks, 400);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_schedules_stay_within_error(
        gaps in prop::collection::vec(1u64..20_000, 1..400),
        max_error in 0u32..500,
    ) {
        let mut clock = 0u64;
        let clocks: Vec<u64> = gaps
            .iter()
            .map(|g| {
                clock += g;
                clock
            })
            .collect();
        check_round_trip(&clocks, max_error);
    }

    #[test]
    fn linear_ramps_compress_to_few_commands(
        start in 200u64..5_000,
        add in -5i64..=5,
        count in 2usize..300,
    ) {
        let mut clocks = Vec::with_capacity(count);
        let mut clock = 0u64;
        let mut interval = start as i64;
        for _ in 0..count {
            if interval <= 0 {
                break;
            }
            clock += interval as u64;
            clocks.push(clock);
            interval += add;
        }
        let mut sc = StepCompressor::new(1, 0, 20, 21);
        for &c in &clocks {
            sc.push_clock(c).unwrap();
        }
        sc.flush(u64::MAX).unwrap();
        prop_assert!(sc.queued_messages() <= 2);
        let rebuilt = reconstruct(&mut sc, 0);
        prop_assert_eq!(rebuilt, clocks);
    }
}
