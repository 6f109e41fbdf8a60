//! # stepcore Host Binary
//!
//! Loads a machine description, builds the step pipeline and runs a short
//! demo program through it to the mcu.
//!
//! # Usage
//!
//! ```bash
//! # Dry run against the simulated mcu
//! stepcore_host --config config/machine.toml --simulate
//!
//! # Real device from [mcu].serial, verbose JSON logs
//! stepcore_host --config config/machine.toml -v --json
//! ```

mod error;
mod machine;

use clap::Parser;
use error::HostError;
use machine::{DemoParams, Machine, run_demo};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use stepcore_common::prelude::*;
use stepcore_serial::{FileLink, LoopbackLink, SimMcu};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// stepcore host - step generation and mcu transport
#[derive(Parser, Debug)]
#[command(name = "stepcore_host")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Generate steps for a configured machine and stream them to the mcu")]
#[command(long_about = None)]
struct Args {
    /// Path to the machine description (machine.toml).
    #[arg(short, long, default_value = "/etc/stepcore/machine.toml")]
    config: PathBuf,

    /// Talk to a simulated mcu instead of the serial device.
    #[arg(short = 's', long)]
    simulate: bool,

    /// Side of the demo square [mm].
    #[arg(long, default_value_t = 20.0)]
    size: f64,

    /// Demo cruise speed [mm/s].
    #[arg(long, default_value_t = 100.0)]
    speed: f64,

    /// Demo acceleration [mm/s^2].
    #[arg(long, default_value_t = 2000.0)]
    accel: f64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs and the final report in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    let config = match HostConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    setup_tracing(&args, &config);

    if let Err(e) = run(&args, &config) {
        error!("host failed: {e}");
        std::process::exit(1);
    }
}

fn run(args: &Args, config: &HostConfig) -> Result<(), HostError> {
    info!(
        service = %config.shared.service_name,
        "stepcore host v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        handler_flag.store(false, Ordering::SeqCst);
    })?;

    let (mut machine, sim) = if args.simulate {
        info!("Simulation mode enabled");
        let (host, mcu) = LoopbackLink::pair();
        let sim = SimMcu::spawn(
            mcu,
            &[
                (config.mcu.queue_step_msgid, 4),
                (config.mcu.set_next_step_dir_msgid, 2),
            ],
        )?;
        (Machine::build(config, host)?, Some(sim))
    } else {
        let path = config.mcu.serial.clone();
        let link = FileLink::open(&path).map_err(|source| HostError::Link { path, source })?;
        (Machine::build(config, link)?, None)
    };

    let params = DemoParams {
        size: args.size,
        speed: args.speed,
        accel: args.accel,
    };
    run_demo(&mut machine, params, &running)?;
    let timeout = Duration::from_secs_f64(machine.print_time() + 5.0);
    machine.wait_idle(timeout, &running)?;

    let report = machine.report(sim.as_ref(), &config.mcu);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }

    machine.serial().exit()?;
    info!("stepcore host shutdown complete");
    Ok(())
}

/// Setup tracing subscriber from the CLI flags and `[shared].log_level`.
fn setup_tracing(args: &Args, config: &HostConfig) {
    let directive = if args.verbose {
        "debug"
    } else {
        config.shared.log_level.as_directive()
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
