//! Settings file handling for the Linux binary.
//!
//! The core [`Settings`] are flattened into [`AppConfig`], which adds the
//! host-only keys: log level and file, plus the device paths.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use log::LevelFilter;
use serde::Deserialize;

use sensemon_core::Settings;

use crate::cli::Cli;

pub const DEFAULT_SENSOR_DIR: &str = "/sys/bus/iio/devices";
pub const DEFAULT_CPU_TEMP_PATH: &str = "/sys/class/thermal/thermal_zone0/temp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Off,
    Error,
    #[serde(alias = "WARNING")]
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(flatten)]
    pub settings: Settings,
    #[serde(rename = "LOGLVL")]
    pub log_level: Option<LogLevel>,
    #[serde(rename = "LOGFILE")]
    pub log_file: Option<PathBuf>,
    /// Sense HAT framebuffer, e.g. `/dev/fb1`. Unset runs headless.
    #[serde(rename = "LED_DEVICE")]
    pub led_device: Option<PathBuf>,
    /// Joystick evdev node. Unset disables input.
    #[serde(rename = "JOYSTICK_DEVICE")]
    pub joystick_device: Option<PathBuf>,
    #[serde(rename = "SENSOR_DIR")]
    pub sensor_dir: Option<PathBuf>,
    #[serde(rename = "CPU_TEMP_PATH")]
    pub cpu_temp_path: Option<PathBuf>,
    #[serde(skip)]
    pub loaded_from: Option<PathBuf>,
}

impl AppConfig {
    /// Read `path`. A missing file is not an error; defaults apply.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => {
                let mut config = Self::parse(&text)
                    .with_context(|| format!("invalid settings file {}", path.display()))?;
                config.loaded_from = Some(path.to_path_buf());
                Ok(config)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err).with_context(|| format!("cannot read {}", path.display())),
        }
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Overlay command line flags.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(uploads) = cli.uploads {
            self.settings.max_uploads = u32::try_from(uploads).ok().filter(|n| *n > 0);
        }
        if cli.progress {
            self.settings.progress = true;
        }
        if let Some(mode) = cli.dmode {
            self.settings.display = mode;
        }
        if cli.no_led {
            self.settings.start_dark = true;
        }
        if cli.debug {
            self.log_level = Some(LogLevel::Debug);
        }
        if let Some(path) = &cli.log {
            self.log_file = Some(path.clone());
        }
    }

    pub fn sensor_dir(&self) -> &Path {
        self.sensor_dir
            .as_deref()
            .unwrap_or(Path::new(DEFAULT_SENSOR_DIR))
    }

    pub fn cpu_temp_path(&self) -> &Path {
        self.cpu_temp_path
            .as_deref()
            .unwrap_or(Path::new(DEFAULT_CPU_TEMP_PATH))
    }
}
