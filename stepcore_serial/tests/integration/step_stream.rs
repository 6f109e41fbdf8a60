//! Step generation streamed through the serial queue to the simulated mcu.

use super::common::{WAIT, wait_for};
use parking_lot::Mutex;
use std::sync::Arc;
use stepcore_common::config::ConfigLoader;
use stepcore_common::machine::HostConfig;
use stepcore_common::protocol::message::{CommandQueueId, QueueMessage};
use stepcore_common::protocol::vlq::decode_all;
use stepcore_common::transport::MessageTransport;
use stepcore_motion::geometry::{Coord, Move};
use stepcore_motion::itersolve::Stepper;
use stepcore_motion::kinematics::MachineKinematics;
use stepcore_motion::stepcompress::StepCompressor;
use stepcore_motion::steppersync::StepperSync;
use stepcore_serial::{LoopbackLink, SerialQueue, SimMcu};

const MACHINE: &str = r#"
[shared]
service_name = "step-stream-test"

[mcu]
clock_freq = 16000000.0
move_queue_depth = 8

[kinematics]
type = "cartesian"

[[stepper]]
name = "stepper_x"
oid = 0
step_distance = 0.0125

[[stepper]]
name = "stepper_y"
oid = 1
step_distance = 0.0125

[[stepper]]
name = "stepper_z"
oid = 2
step_distance = 0.0025
"#;

/// Forwards to the serial queue and keeps a decoded copy.
struct Tee {
    inner: Arc<SerialQueue>,
    sent: Mutex<Vec<Vec<u32>>>,
}

impl MessageTransport for Tee {
    fn alloc_command_queue(&self) -> CommandQueueId {
        self.inner.alloc_command_queue()
    }

    fn send_batch(&self, cq: CommandQueueId, msgs: Vec<QueueMessage>) {
        self.sent
            .lock()
            .extend(msgs.iter().map(|qm| decode_all(qm.as_bytes()).unwrap()));
        self.inner.send_batch(cq, msgs);
    }
}

#[test]
fn mcu_receives_the_generated_step_stream() {
    let config = HostConfig::from_toml(MACHINE).unwrap();
    config.validate().unwrap();
    let freq = config.mcu.clock_freq;

    let (host, mcu) = LoopbackLink::pair();
    let sim = SimMcu::spawn(
        mcu,
        &[
            (config.mcu.queue_step_msgid, 4),
            (config.mcu.set_next_step_dir_msgid, 2),
        ],
    )
    .unwrap();
    let sq = Arc::new(SerialQueue::from_config(host, &config.mcu).unwrap());
    sq.set_clock_est(freq, sq.monotonic(), 0, 0);

    let kin = MachineKinematics::from_config(&config.kinematics).unwrap();
    let mut steppers = Vec::new();
    let mut compressors = Vec::new();
    for (sc_cfg, k) in config.steppers.iter().zip(kin.steppers()) {
        let sc = StepCompressor::from_config(sc_cfg, &config.mcu).into_shared();
        compressors.push(sc.clone());
        steppers.push(Stepper::new(sc_cfg.name.clone(), *k, sc_cfg.step_distance, sc).unwrap());
    }
    let tee = Arc::new(Tee {
        inner: sq.clone(),
        sent: Mutex::default(),
    });
    let mut sync = StepperSync::new(tee.clone(), compressors, config.mcu.move_queue_depth);
    sync.set_time(0.0, freq);

    let path = [
        Coord::ZERO,
        Coord::new(10.0, 0.0, 0.0),
        Coord::new(10.0, 10.0, 1.0),
        Coord::ZERO,
    ];
    let mut print_time = 0.05;
    for pair in path.windows(2) {
        let m = Move::from_trapezoid(print_time, pair[0], pair[1], 0.0, 200.0, 0.0, 4000.0)
            .unwrap();
        for s in &mut steppers {
            s.generate_steps(&m).unwrap();
        }
        print_time = m.end_time();
        sync.flush((print_time * freq) as u64).unwrap();
    }
    sync.flush(u64::MAX).unwrap();

    let expected = tee.sent.lock().clone();
    assert!(!expected.is_empty());
    let delivered = wait_for(WAIT, || {
        sim.commands().len() >= expected.len() && sq.in_flight() == 0
    });
    assert!(delivered, "stats: {}", sq.stats());

    // One command queue: the mcu sees exactly the synchronizer's order.
    assert_eq!(sim.commands(), expected);
    let z_steps: u32 = sim
        .commands_with_id(config.mcu.queue_step_msgid)
        .iter()
        .filter(|c| c[1] == 2)
        .map(|c| c[3])
        .sum();
    // 1 mm up and 1 mm back down at 0.0025 mm per step.
    assert_eq!(z_steps, 800);
    sq.exit().unwrap();
}
