//! Solver properties over random moves and every transform.

use super::common::StepLog;
use proptest::prelude::*;
use stepcore_motion::geometry::{Coord, Move};
use stepcore_motion::itersolve::gen_steps;
use stepcore_motion::kinematics::{
    CartesianAxis, CoreXyRail, DeltaTower, PolarAxis, StepperKinematics, WinchAnchor,
};

fn transforms() -> Vec<StepperKinematics> {
    vec![
        StepperKinematics::Cartesian(CartesianAxis::X),
        StepperKinematics::Cartesian(CartesianAxis::Z),
        StepperKinematics::CoreXy(CoreXyRail::Plus),
        StepperKinematics::CoreXy(CoreXyRail::Minus),
        StepperKinematics::Polar(PolarAxis::Radius),
        StepperKinematics::Delta(DeltaTower::new(300.0, 140.0, 330.0)),
        StepperKinematics::Winch(WinchAnchor::new(Coord::new(-200.0, 150.0, 400.0))),
        StepperKinematics::Extruder,
    ]
}

fn coord() -> impl Strategy<Value = Coord> {
    (-60.0f64..60.0, -60.0f64..60.0, 0.0f64..50.0).prop_map(|(x, y, z)| Coord::new(x, y, z))
}

/// Run the solver over consecutive moves and check every step.
fn check_moves(kin: &StepperKinematics, step_dist: f64, moves: &[Move]) {
    let half = 0.5 * step_dist;
    let first = moves[0].start_pos;
    let mut pos = kin.calc_position_from_coord(first.x, first.y, first.z);
    let mut log = StepLog::default();
    for m in moves {
        let before = log.times.len();
        let mut expected = pos;
        pos = gen_steps(kin, step_dist, pos, &mut log, m, m.print_time, m.end_time()).unwrap();

        for (&t, &forward) in log.times[before..].iter().zip(&log.dirs[before..]) {
            let target = expected + if forward { half } else { -half };
            let actual = kin.position(m, t - m.print_time);
            assert!(
                (actual - target).abs() < 1e-6,
                "{kin:?}: step at {t} lands at {actual}, wanted {target}"
            );
            expected = target + if forward { half } else { -half };
        }
        assert!((expected - pos).abs() < 1e-9);

        let end = kin.position(m, m.move_t);
        assert!(
            (end - pos).abs() <= half + 1e-6,
            "{kin:?}: final position {pos} too far from {end}"
        );
    }
    assert!(
        log.times.windows(2).all(|w| w[1] > w[0]),
        "{kin:?}: step times not strictly increasing"
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn steps_are_ordered_and_one_step_apart(
        points in prop::collection::vec(coord(), 2..5),
        cruise_v in 5.0f64..250.0,
        accel in 500.0f64..5000.0,
        step_dist in prop::sample::select(vec![0.0125, 0.025, 0.1]),
    ) {
        let mut moves = Vec::new();
        let mut print_time = 0.25;
        for pair in points.windows(2) {
            if (pair[1] - pair[0]).norm() < 1e-3 {
                continue;
            }
            let m = Move::from_trapezoid(print_time, pair[0], pair[1], 0.0, cruise_v, 0.0, accel)
                .unwrap();
            print_time = m.end_time();
            moves.push(m);
        }
        prop_assume!(!moves.is_empty());
        for kin in transforms() {
            check_moves(&kin, step_dist, &moves);
        }
    }
}

#[test]
fn out_and_back_reverses_once() {
    let kin = StepperKinematics::Cartesian(CartesianAxis::Y);
    let a = Coord::new(0.0, 0.0, 0.0);
    let b = Coord::new(0.0, 4.0, 0.0);
    let out = Move::from_trapezoid(0.0, a, b, 0.0, 50.0, 0.0, 1000.0).unwrap();
    let back = Move::from_trapezoid(out.end_time(), b, a, 0.0, 50.0, 0.0, 1000.0).unwrap();

    let mut log = StepLog::default();
    let mut pos = 0.0;
    for m in [out, back] {
        pos = gen_steps(&kin, 0.5, pos, &mut log, &m, m.print_time, m.end_time()).unwrap();
    }
    assert_eq!(log.times.len(), 16);
    assert_eq!(log.dirs.iter().filter(|&&d| d).count(), 8);
    assert!(pos.abs() < 1e-9);
}

#[test]
fn split_generation_matches_single_pass() {
    let kin = StepperKinematics::Delta(DeltaTower::new(250.0, 100.0, 90.0));
    let m = Move::from_trapezoid(
        1.0,
        Coord::new(-30.0, 10.0, 2.0),
        Coord::new(25.0, -15.0, 2.0),
        0.0,
        120.0,
        0.0,
        2500.0,
    )
    .unwrap();
    let start = kin.calc_position_from_coord(-30.0, 10.0, 2.0);

    let mut whole = StepLog::default();
    gen_steps(&kin, 0.02, start, &mut whole, &m, m.print_time, m.end_time()).unwrap();

    let mid = m.print_time + 0.5 * m.move_t;
    let mut parts = StepLog::default();
    let pos = gen_steps(&kin, 0.02, start, &mut parts, &m, m.print_time, mid).unwrap();
    gen_steps(&kin, 0.02, pos, &mut parts, &m, mid, m.end_time()).unwrap();

    assert_eq!(whole.times.len(), parts.times.len());
    for (a, b) in whole.times.iter().zip(&parts.times) {
        assert!((a - b).abs() < 1e-8);
    }
}
