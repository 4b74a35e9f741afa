//! SenseMon: environmental monitor for the Raspberry Pi Sense HAT.
//!
//! Samples temperature, pressure and humidity, shows them on the 8x8 LED
//! matrix and a terminal console, and uploads them to Adafruit IO.
//!
//! # Joystick
//!
//! | Input      | Action                          |
//! |------------|---------------------------------|
//! | Left/Right | Previous/next display mode      |
//! | Up/Down    | Rotate the matrix               |
//! | Press      | Toggle the LED matrix on or off |
//!
//! Any input wakes a blanked display. Ctrl-C or SIGTERM stops the run.

mod aio;
mod cli;
mod clock;
mod config;
mod console;
mod joystick;
mod logging;
mod matrix;
mod sensor;
mod uplink;

use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Local};
use clap::Parser;
use log::{debug, error, info, warn};

use sensemon_core::run_loop::{Devices, RunSummary};
use sensemon_core::upload::UploadScheduler;
use sensemon_core::{APP_NAME, Clock, RunLoop, Settings, ShutdownToken};

use crate::aio::AdafruitIo;
use crate::cli::Cli;
use crate::clock::SystemClock;
use crate::config::AppConfig;
use crate::console::Console;
use crate::joystick::Controls;
use crate::matrix::Matrix;
use crate::sensor::IioSensor;
use crate::uplink::{ThreadedLink, UPLOAD_COMPLETIONS};

static SHUTDOWN: ShutdownToken = ShutdownToken::new();

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            eprintln!("sensemon: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    // ------------------------------------------------------------------
    // Configuration and logging
    // ------------------------------------------------------------------
    let mut config = AppConfig::load(&cli.config)?;
    config.apply_cli(cli);
    logging::init(config.log_level, config.log_file.as_deref(), !cli.no_cli)?;

    info!("{APP_NAME} v{} starting", env!("CARGO_PKG_VERSION"));
    match &config.loaded_from {
        Some(path) => info!("Settings loaded from {}", path.display()),
        None => info!("No settings file at {}, using defaults", cli.config.display()),
    }

    let settings = &config.settings;
    // ConfigError is a no_std error type, so it goes through Display.
    settings
        .validate()
        .map_err(|err| anyhow!("invalid settings: {err}"))?;
    debug!("Command line: {cli:?}");
    debug!("Effective settings: {:?}", redacted(settings));

    ctrlc::set_handler(|| SHUTDOWN.cancel()).context("failed to install signal handler")?;

    // ------------------------------------------------------------------
    // Uploads
    // ------------------------------------------------------------------
    let clock = SystemClock;
    let work_start = Local::now();

    let mut telemetry = AdafruitIo::new(settings)?;
    let uploads = UploadScheduler::configure(settings, &mut telemetry, clock.now())
        .map_err(|err| anyhow!("upload setup failed: {err}"))?;
    if uploads.enabled_count() == 0 {
        warn!("No upload targets enabled, running display-only");
    } else {
        info!("{} upload target(s) enabled", uploads.enabled_count());
    }

    // ------------------------------------------------------------------
    // Devices
    // ------------------------------------------------------------------
    let devices = Devices {
        sensor: IioSensor::new(config.sensor_dir(), config.cpu_temp_path()),
        link: ThreadedLink::new(telemetry, &UPLOAD_COMPLETIONS),
        matrix: Matrix::open(config.led_device.as_deref()),
        input: Controls::open(config.joystick_device.as_deref()),
    };

    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x5e45_e3a0);

    // ------------------------------------------------------------------
    // Main loop
    // ------------------------------------------------------------------
    let mut run_loop = RunLoop::new(settings, uploads, devices, clock, seed);
    if !cli.no_cli {
        run_loop.set_observer(Box::new(Console::new()));
    }

    let summary = run_loop.run(&SHUTDOWN);
    report(&summary, work_start, Local::now());
    Ok(())
}

/// Settings as logged at debug level, with the service key masked.
fn redacted(settings: &Settings) -> Settings {
    let mut shown = settings.clone();
    if !shown.aio_key.is_empty() {
        shown.aio_key = String::from("********");
    }
    shown
}

fn report(summary: &RunSummary, start: DateTime<Local>, end: DateTime<Local>) {
    info!("Stopped: {}", summary.reason);

    println!();
    println!("{APP_NAME} stopped ({})", summary.reason);
    println!("  Work start:    {}", start.format(TIME_FORMAT));
    println!("  Work end:      {}", end.format(TIME_FORMAT));
    println!("  Upload cycles: {}", summary.upload_cycles);
    for target in &summary.targets {
        if target.enabled {
            println!(
                "  {:<13}  {} ok / {} failed",
                target.metric.label(),
                target.successes,
                target.failures
            );
        } else {
            println!("  {:<13}  not uploaded", target.metric.label());
        }
    }
    if summary.abandoned > 0 {
        println!("  Abandoned:     {} in-flight upload(s)", summary.abandoned);
    }
}
