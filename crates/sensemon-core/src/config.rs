//! Runtime settings
//!
//! [`Settings`] is built once at startup (from the settings file plus CLI
//! overrides) and then only ever borrowed. Keys use the upper-case option
//! names of the settings file; every field has a default.

use alloc::string::String;
use core::fmt;

use embassy_time::Duration;
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use thiserror_no_std::Error;

use crate::display::{DisplayMode, Rotation};
use crate::sensors::{CPU_WINDOW_MAX, Metric};
use crate::units::{MAX_DECIMALS, TempUnit};

/// Default Adafruit IO endpoint.
pub const DEFAULT_AIO_URL: &str = "https://io.adafruit.com";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        reason: &'static str,
    },
    #[error("unsupported rotation {0} (expected 0, 90, 180 or 270)")]
    InvalidRotation(u16),
    #[error("unknown display mode '{0}'")]
    UnknownDisplayMode(String),
    #[error("AIO_ID and AIO_KEY are required when uploads are forced")]
    MissingCredentials,
    #[error("feed for {metric} is invalid: '{feed}'")]
    InvalidFeed { metric: Metric, feed: String },
}

/// How uploads behave at startup (`AIO_UPLOAD`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    /// Invalid feeds disable their target; the rest keep running.
    #[default]
    Yes,
    /// Every feed must validate or startup fails.
    Force,
    /// Nothing is uploaded.
    No,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(rename = "AIO_ID", alias = "AIO_USERNAME")]
    pub aio_id: String,
    #[serde(rename = "AIO_KEY")]
    pub aio_key: String,
    #[serde(rename = "AIO_URL")]
    pub aio_url: String,
    /// Network timeout for one upload call, in seconds.
    #[serde(rename = "AIO_TIMEOUT")]
    pub aio_timeout: u32,
    #[serde(rename = "AIO_UPLOAD")]
    pub upload_mode: UploadMode,

    #[serde(rename = "FEED_TEMPS")]
    pub feed_temps: String,
    #[serde(rename = "FEED_PRESS")]
    pub feed_press: String,
    #[serde(rename = "FEED_HUMID")]
    pub feed_humid: String,

    #[serde(rename = "UNIT_TEMPS")]
    pub temp_unit: TempUnit,
    #[serde(rename = "ROTATION")]
    pub rotation: Rotation,
    #[serde(rename = "DISPLAY")]
    pub display: DisplayMode,
    #[serde(rename = "PROGRESS", deserialize_with = "deserialize_flag")]
    pub progress: bool,

    /// Seconds of inactivity before the display blanks. 0 disables blanking.
    #[serde(rename = "SLEEP")]
    pub sleep: u32,
    /// Seconds between upload attempts per target.
    #[serde(rename = "FREQ")]
    pub freq: u32,
    /// Seconds after startup before the first upload.
    #[serde(rename = "DELAY")]
    pub delay: u32,
    /// Seconds between sensor samples.
    #[serde(rename = "WAIT")]
    pub wait: u32,
    /// Seconds to back off after the service rate-limits us.
    #[serde(rename = "THROTTLE")]
    pub throttle: u32,
    #[serde(rename = "ROUNDING")]
    pub rounding: u8,
    /// CPU heat compensation factor. 0 disables compensation.
    #[serde(rename = "TEMP_COMP")]
    pub temp_comp: f32,
    #[serde(rename = "MAX_LEN_CPU_TEMPS")]
    pub cpu_temps_window: usize,

    /// Stop after this many upload cycles (`--uploads`).
    #[serde(skip)]
    pub max_uploads: Option<u32>,
    /// Start with the LED matrix powered off (`--noLED`).
    #[serde(skip)]
    pub start_dark: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            aio_id: String::new(),
            aio_key: String::new(),
            aio_url: String::from(DEFAULT_AIO_URL),
            aio_timeout: 10,
            upload_mode: UploadMode::Yes,
            feed_temps: String::new(),
            feed_press: String::new(),
            feed_humid: String::new(),
            temp_unit: TempUnit::Celsius,
            rotation: Rotation::R0,
            display: DisplayMode::Sparkle,
            progress: false,
            sleep: 600,
            freq: 600,
            delay: 300,
            wait: 1,
            throttle: 120,
            rounding: 2,
            temp_comp: 0.0,
            cpu_temps_window: 5,
            max_uploads: None,
            start_dark: false,
        }
    }
}

impl Settings {
    /// Check numeric constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.freq == 0 {
            return Err(ConfigError::InvalidValue {
                key: "FREQ",
                reason: "must be at least 1 second",
            });
        }
        if self.rounding > MAX_DECIMALS {
            return Err(ConfigError::InvalidValue {
                key: "ROUNDING",
                reason: "must be between 0 and 6",
            });
        }
        if !self.temp_comp.is_finite() || self.temp_comp < 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "TEMP_COMP",
                reason: "must be a non-negative number",
            });
        }
        if self.cpu_temps_window == 0 || self.cpu_temps_window > CPU_WINDOW_MAX {
            return Err(ConfigError::InvalidValue {
                key: "MAX_LEN_CPU_TEMPS",
                reason: "must be between 1 and 32",
            });
        }
        if self.aio_timeout == 0 {
            return Err(ConfigError::InvalidValue {
                key: "AIO_TIMEOUT",
                reason: "must be at least 1 second",
            });
        }
        if self.upload_mode == UploadMode::Force
            && (self.aio_id.trim().is_empty() || self.aio_key.trim().is_empty())
        {
            return Err(ConfigError::MissingCredentials);
        }
        Ok(())
    }

    pub fn feed(&self, metric: Metric) -> &str {
        match metric {
            Metric::Temperature => &self.feed_temps,
            Metric::Pressure => &self.feed_press,
            Metric::Humidity => &self.feed_humid,
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.aio_id.trim().is_empty() && !self.aio_key.trim().is_empty()
    }

    /// Sampling interval. `WAIT` below one second is raised to one second.
    pub fn wait_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.wait.max(1)))
    }

    pub fn freq_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.freq))
    }

    pub fn delay_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.delay))
    }

    pub fn throttle_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.throttle))
    }

    pub fn sleep_timeout(&self) -> Option<Duration> {
        (self.sleep > 0).then(|| Duration::from_secs(u64::from(self.sleep)))
    }
}

/// Accept `true`/`false` as well as `0`/`1` for on/off options.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    struct FlagVisitor;

    impl<'de> Visitor<'de> for FlagVisitor {
        type Value = bool;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a boolean or 0/1")
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<bool, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<bool, E> {
            match v {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(E::invalid_value(de::Unexpected::Signed(v), &self)),
            }
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<bool, E> {
            match v {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(E::invalid_value(de::Unexpected::Unsigned(v), &self)),
            }
        }
    }

    deserializer.deserialize_any(FlagVisitor)
}
