//! Move to wire: config, kinematics, solver, compressor and synchronizer.

use super::common::RecordingTransport;
use std::collections::HashMap;
use std::sync::Arc;
use stepcore_common::config::ConfigLoader;
use stepcore_common::machine::HostConfig;
use stepcore_motion::geometry::{Coord, Move};
use stepcore_motion::itersolve::Stepper;
use stepcore_motion::kinematics::MachineKinematics;
use stepcore_motion::stepcompress::{StepCompressor, StepMove};
use stepcore_motion::steppersync::StepperSync;

const MACHINE: &str = r#"
[shared]
service_name = "pipeline-test"

[mcu]
clock_freq = 16000000.0
move_queue_depth = 4

[kinematics]
type = "corexy"

[[stepper]]
name = "stepper_a"
oid = 0
step_distance = 0.0125

[[stepper]]
name = "stepper_b"
oid = 1
step_distance = 0.0125

[[stepper]]
name = "stepper_z"
oid = 2
step_distance = 0.0025
"#;

fn build(config: &HostConfig) -> (Vec<Stepper>, StepperSync<RecordingTransport>, Arc<RecordingTransport>) {
    config.validate().unwrap();
    let kin = MachineKinematics::from_config(&config.kinematics).unwrap();
    let mut steppers = Vec::new();
    let mut compressors = Vec::new();
    for (sc_cfg, k) in config.steppers.iter().zip(kin.steppers()) {
        let sc = StepCompressor::from_config(sc_cfg, &config.mcu).into_shared();
        compressors.push(sc.clone());
        steppers.push(Stepper::new(sc_cfg.name.clone(), *k, sc_cfg.step_distance, sc).unwrap());
    }
    let transport = Arc::new(RecordingTransport::default());
    let sync = StepperSync::new(transport.clone(), compressors, config.mcu.move_queue_depth);
    (steppers, sync, transport)
}

#[test]
fn square_path_reaches_every_corner() {
    let config = HostConfig::from_toml(MACHINE).unwrap();
    let (mut steppers, mut sync, transport) = build(&config);
    let freq = config.mcu.clock_freq;

    let corners = [
        Coord::new(0.0, 0.0, 0.0),
        Coord::new(20.0, 0.0, 0.0),
        Coord::new(20.0, 20.0, 0.0),
        Coord::new(0.0, 20.0, 0.0),
        Coord::new(0.0, 0.0, 0.0),
    ];
    let mut print_time = 0.1;
    for pair in corners.windows(2) {
        let m = Move::from_trapezoid(print_time, pair[0], pair[1], 0.0, 100.0, 0.0, 2000.0)
            .unwrap();
        for s in &mut steppers {
            s.generate_steps(&m).unwrap();
        }
        print_time = m.end_time();
        sync.flush((print_time * freq) as u64).unwrap();
        let c = pair[1];
        for s in &steppers {
            let target = s.calc_position_from_coord(c.x, c.y, c.z);
            assert!((s.commanded_pos() - target).abs() <= 0.5 * s.step_dist() + 1e-9);
        }
    }
    sync.flush(u64::MAX).unwrap();

    for (_, batch) in transport.batches.lock().iter() {
        assert!(
            batch.windows(2).all(|w| w[0].req_clock <= w[1].req_clock),
            "batch not in req_clock order"
        );
    }

    // Rebuild net step counts per oid from the wire messages.
    let mut dir: HashMap<u32, i64> = HashMap::new();
    let mut net: HashMap<u32, i64> = HashMap::new();
    for (args, _, _) in transport.decoded() {
        let oid = args[1];
        match args[0] {
            21 => {
                dir.insert(oid, if args[2] == 1 { 1 } else { -1 });
            }
            20 => {
                let count = i64::from(args[3]);
                *net.entry(oid).or_default() += count * dir.get(&oid).copied().unwrap_or(0);
            }
            other => panic!("unexpected msgid {other}"),
        }
    }
    // A closed path returns every motor home.
    assert_eq!(net.get(&0).copied().unwrap_or(0), 0);
    assert_eq!(net.get(&1).copied().unwrap_or(0), 0);
    assert!(!net.contains_key(&2));
    // Rail a travels 20 mm per side in 0.0125 mm steps.
    let steps_a: i64 = transport
        .decoded()
        .iter()
        .filter(|(a, _, _)| a[0] == 20 && a[1] == 0)
        .map(|(a, _, _)| i64::from(a[3]))
        .sum();
    assert_eq!(steps_a, 4 * 1600);
}

#[test]
fn wire_clocks_match_solver_within_max_error() {
    let config = HostConfig::from_toml(MACHINE).unwrap();
    let (mut steppers, mut sync, transport) = build(&config);
    let freq = config.mcu.clock_freq;
    let max_error = (config.steppers[0].max_error * freq) as u64;

    let m = Move::from_trapezoid(
        0.05,
        Coord::ZERO,
        Coord::new(15.0, 5.0, 0.0),
        0.0,
        150.0,
        0.0,
        3000.0,
    )
    .unwrap();

    // Reference step clocks straight from the solver.
    let mut reference = super::common::StepLog::default();
    stepcore_motion::itersolve::gen_steps(
        steppers[0].kinematics(),
        steppers[0].step_dist(),
        0.0,
        &mut reference,
        &m,
        m.print_time,
        m.end_time(),
    )
    .unwrap();

    steppers[0].generate_steps(&m).unwrap();
    sync.flush(u64::MAX).unwrap();

    let mut clock = 0u64;
    let mut wire = Vec::new();
    for (args, _, _) in transport.decoded() {
        if args[0] != 20 || args[1] != 0 {
            continue;
        }
        let mv = StepMove {
            interval: args[2],
            count: args[3] as u16,
            add: args[4] as i32 as i16,
        };
        wire.extend(mv.step_clocks(clock));
        clock = wire.last().copied().unwrap_or(clock);
    }
    assert_eq!(wire.len(), reference.times.len());
    for (t, &c) in reference.times.iter().zip(&wire) {
        // One tick of slack for rounding of the print time split.
        let exact = (t * freq + 0.5) as u64;
        assert!(c <= exact + 1 && exact <= c + max_error + 1, "{c} vs {exact}");
    }
}
