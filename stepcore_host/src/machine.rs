//! Machine assembly and the demo program.
//!
//! [`Machine`] wires the configured kinematics, steppers, compressors and
//! synchronizer to one serial queue. The clock estimate is seeded from the
//! host clock at build time: print time zero is mcu clock zero at that
//! instant.

use crate::error::HostError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use stepcore_common::machine::{HostConfig, McuConfig, StepperConfig};
use stepcore_motion::geometry::{Coord, Move};
use stepcore_motion::itersolve::Stepper;
use stepcore_motion::kinematics::{MachineKinematics, StepperKinematics};
use stepcore_motion::stepcompress::{SharedCompressor, StepCompressor};
use stepcore_motion::steppersync::StepperSync;
use stepcore_serial::{LinkState, SerialLink, SerialQueue, SerialStats, SimMcu, SimMcuStats};
use tracing::{debug, info, warn};

/// Lead time between building the first move and its first step [s].
const START_DELAY: f64 = 0.25;

/// Extruded filament per mm of XY travel on the demo perimeter.
const EXTRUDE_RATIO: f64 = 0.05;

/// Demo move parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemoParams {
    /// Side of the square [mm].
    pub size: f64,
    /// Cruise speed [mm/s].
    pub speed: f64,
    /// Acceleration [mm/s^2].
    pub accel: f64,
}

struct Axis {
    oid: u32,
    stepper: Stepper,
}

/// A configured machine bound to a serial queue.
pub struct Machine {
    kinematics: &'static str,
    freq: f64,
    conv_time: f64,
    print_time: f64,
    position: Coord,
    extruder_pos: f64,
    axes: Vec<Axis>,
    extruder: Option<Axis>,
    sync: StepperSync<SerialQueue>,
    serial: Arc<SerialQueue>,
}

impl Machine {
    /// Validate `config` and build the step pipeline over `link`.
    pub fn build<L>(config: &HostConfig, link: L) -> Result<Self, HostError>
    where
        L: SerialLink + 'static,
    {
        config.validate()?;
        let kin = MachineKinematics::from_config(&config.kinematics)?;
        let serial = Arc::new(SerialQueue::from_config(link, &config.mcu)?);

        let mut compressors = Vec::new();
        let mut axes = Vec::with_capacity(config.steppers.len());
        for (sc_cfg, k) in config.steppers.iter().zip(kin.steppers()) {
            axes.push(build_axis(sc_cfg, *k, &config.mcu, &mut compressors)?);
        }
        let extruder = config
            .extruder
            .as_ref()
            .map(|e| build_axis(e, StepperKinematics::Extruder, &config.mcu, &mut compressors))
            .transpose()?;

        let freq = config.mcu.clock_freq;
        let sync = StepperSync::new(
            Arc::clone(&serial),
            compressors,
            config.mcu.move_queue_depth,
        );
        sync.set_time(0.0, freq);
        let conv_time = serial.monotonic();
        serial.set_clock_est(freq, conv_time, 0, 0);

        info!(
            kinematics = kin.name(),
            steppers = axes.len(),
            extruder = extruder.is_some(),
            freq,
            "machine ready"
        );
        Ok(Self {
            kinematics: kin.name(),
            freq,
            conv_time,
            print_time: 0.0,
            position: Coord::ZERO,
            extruder_pos: 0.0,
            axes,
            extruder,
            sync,
            serial,
        })
    }

    pub fn serial(&self) -> &Arc<SerialQueue> {
        &self.serial
    }

    pub fn print_time(&self) -> f64 {
        self.print_time
    }

    fn clock(&self, print_time: f64) -> u64 {
        (print_time * self.freq) as u64
    }

    /// Move the tool to `to` in a straight line, extruding `extrude` mm of
    /// filament along the way when an extruder is configured.
    pub fn move_to(
        &mut self,
        to: Coord,
        speed: f64,
        accel: f64,
        extrude: f64,
    ) -> Result<(), HostError> {
        let now = self.serial.monotonic() - self.conv_time + START_DELAY;
        let start = self.print_time.max(now);
        let m = Move::from_trapezoid(start, self.position, to, 0.0, speed, 0.0, accel)?;
        for axis in &mut self.axes {
            axis.stepper.generate_steps(&m)?;
        }

        let move_t = m.end_time() - m.print_time;
        if let Some(e) = &mut self.extruder {
            if extrude != 0.0 && move_t > 0.0 {
                let v = extrude.abs() / move_t;
                let em = Move::new(
                    m.print_time,
                    0.0,
                    move_t,
                    0.0,
                    Coord::new(self.extruder_pos, 0.0, 0.0),
                    Coord::new(extrude, 0.0, 0.0),
                    v,
                    v,
                    0.0,
                )?;
                e.stepper.generate_steps(&em)?;
                self.extruder_pos += extrude;
            }
        }

        debug!(
            x = to.x,
            y = to.y,
            z = to.z,
            start,
            end = m.end_time(),
            "move queued"
        );
        self.position = to;
        self.print_time = m.end_time();
        self.sync.flush(self.clock(self.print_time))?;
        Ok(())
    }

    /// Send every remaining step.
    pub fn finish(&mut self) -> Result<(), HostError> {
        self.sync.flush(u64::MAX)?;
        Ok(())
    }

    /// Wait until the mcu acknowledged everything queued.
    ///
    /// Returns early without error when `running` is cleared.
    pub fn wait_idle(&self, timeout: Duration, running: &AtomicBool) -> Result<(), HostError> {
        let deadline = Instant::now() + timeout;
        loop {
            let stats = self.serial.stats();
            if self.serial.in_flight() == 0 && stats.ready_bytes == 0 && stats.stalled_bytes == 0
            {
                return Ok(());
            }
            if !running.load(Ordering::Acquire) {
                warn!("interrupted before the mcu caught up");
                return Ok(());
            }
            if !self.serial.is_running() {
                return Err(stepcore_serial::SerialError::Shutdown.into());
            }
            if Instant::now() >= deadline {
                return Err(HostError::Timeout(timeout.as_secs_f64()));
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Summary of the run so far.
    pub fn report(&self, sim: Option<&SimMcu>, mcu: &McuConfig) -> Report {
        let steppers = self
            .axes
            .iter()
            .chain(self.extruder.iter())
            .map(|a| StepperReport {
                name: a.stepper.name().to_string(),
                oid: a.oid,
                position: a.stepper.commanded_pos(),
            })
            .collect();
        Report {
            kinematics: self.kinematics,
            print_time: self.print_time,
            steppers,
            link_state: self.serial.state(),
            serial: self.serial.stats(),
            mcu: sim.map(|sim| McuReport {
                stats: sim.stats(),
                net_steps: net_steps(
                    &sim.commands(),
                    mcu.queue_step_msgid,
                    mcu.set_next_step_dir_msgid,
                ),
            }),
        }
    }
}

fn build_axis(
    config: &StepperConfig,
    kin: StepperKinematics,
    mcu: &McuConfig,
    compressors: &mut Vec<SharedCompressor>,
) -> Result<Axis, HostError> {
    let sc = StepCompressor::from_config(config, mcu).into_shared();
    compressors.push(Arc::clone(&sc));
    let stepper = Stepper::new(config.name.clone(), kin, config.step_distance, sc)?;
    Ok(Axis {
        oid: config.oid,
        stepper,
    })
}

/// Trace a square of `params.size` around the origin at layer height 0,
/// hop 1 mm in z, then return home.
pub fn run_demo(
    machine: &mut Machine,
    params: DemoParams,
    running: &AtomicBool,
) -> Result<(), HostError> {
    let h = params.size / 2.0;
    let path = [
        (Coord::new(-h, -h, 0.0), 0.0),
        (Coord::new(h, -h, 0.0), params.size * EXTRUDE_RATIO),
        (Coord::new(h, h, 0.0), params.size * EXTRUDE_RATIO),
        (Coord::new(-h, h, 0.0), params.size * EXTRUDE_RATIO),
        (Coord::new(-h, -h, 0.0), params.size * EXTRUDE_RATIO),
        (Coord::new(-h, -h, 1.0), 0.0),
        (Coord::ZERO, 0.0),
    ];
    for (to, extrude) in path {
        if !running.load(Ordering::Acquire) {
            warn!("demo interrupted");
            break;
        }
        machine.move_to(to, params.speed, params.accel, extrude)?;
    }
    machine.finish()?;
    info!(print_time = machine.print_time(), "demo queued");
    Ok(())
}

/// Signed step count per oid from decoded step commands.
pub fn net_steps(
    commands: &[Vec<u32>],
    queue_step_msgid: u32,
    dir_msgid: u32,
) -> BTreeMap<u32, i64> {
    let mut dir: BTreeMap<u32, i64> = BTreeMap::new();
    let mut net = BTreeMap::new();
    for cmd in commands {
        match cmd.as_slice() {
            [id, oid, d] if *id == dir_msgid => {
                dir.insert(*oid, if *d != 0 { 1 } else { -1 });
            }
            [id, oid, _interval, count, _add] if *id == queue_step_msgid => {
                let sign = dir.get(oid).copied().unwrap_or(1);
                *net.entry(*oid).or_default() += sign * i64::from(*count);
            }
            _ => {}
        }
    }
    net
}

// ─── Report ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct StepperReport {
    pub name: String,
    pub oid: u32,
    pub position: f64,
}

/// Simulated mcu side of the report.
#[derive(Debug, Clone, Serialize)]
pub struct McuReport {
    pub stats: SimMcuStats,
    pub net_steps: BTreeMap<u32, i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub kinematics: &'static str,
    pub print_time: f64,
    pub steppers: Vec<StepperReport>,
    pub link_state: LinkState,
    pub serial: SerialStats,
    pub mcu: Option<McuReport>,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} machine, print time {:.3} s, link {}",
            self.kinematics, self.print_time, self.link_state
        )?;
        for s in &self.steppers {
            writeln!(f, "  {:<12} oid {:<3} position {:.4}", s.name, s.oid, s.position)?;
        }
        writeln!(f, "  serial: {}", self.serial)?;
        if let Some(mcu) = &self.mcu {
            writeln!(
                f,
                "  mcu: blocks={} commands={} dropped={} naks={} invalid={}",
                mcu.stats.frames_received,
                mcu.stats.commands,
                mcu.stats.frames_dropped,
                mcu.stats.naks_sent,
                mcu.stats.bytes_invalid
            )?;
            for (oid, steps) in &mcu.net_steps {
                writeln!(f, "  oid {oid}: net steps {steps}")?;
            }
        }
        Ok(())
    }
}
