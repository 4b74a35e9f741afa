//! Sensor sampling
//!
//! The physical sensor block is reached through [`SensorSource`]. The
//! [`SensorReader`] wraps it, applies CPU-heat compensation and unit
//! conversion, substitutes synthetic values when the hardware is missing,
//! and keeps a bounded [`MetricHistory`] per metric.

mod history;
mod reader;

pub use history::{HISTORY_CAPACITY, MetricHistory};
pub use reader::{CPU_WINDOW_MAX, SensorReader};

use core::fmt;

use embassy_time::Instant;
use thiserror_no_std::Error;

use crate::units::{TempUnit, round_to};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("sensor hardware unavailable")]
    Unavailable,
    #[error("sensor read failed")]
    ReadError,
    #[error("sensor returned an implausible value")]
    OutOfRange,
}

/// The three environmental metrics SenseMon tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Temperature,
    Pressure,
    Humidity,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Temperature, Metric::Pressure, Metric::Humidity];

    /// Position of this metric in per-metric arrays.
    pub const fn index(self) -> usize {
        match self {
            Self::Temperature => 0,
            Self::Pressure => 1,
            Self::Humidity => 2,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Pressure => "pressure",
            Self::Humidity => "humidity",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Temperature => "Temperature",
            Self::Pressure => "Pressure",
            Self::Humidity => "Humidity",
        }
    }

    /// Plausible physical range in the source unit (°C, hPa, %).
    ///
    /// Used both for the synthetic fallback and to reject garbage reads.
    pub const fn plausible_range(self) -> (f32, f32) {
        match self {
            Self::Temperature => (0.0, 65.0),
            Self::Pressure => (260.0, 1260.0),
            Self::Humidity => (0.0, 100.0),
        }
    }

    /// Unit a stored reading of this metric carries.
    pub const fn unit(self, temp_unit: TempUnit) -> Unit {
        match self {
            Self::Temperature => match temp_unit {
                TempUnit::Celsius => Unit::Celsius,
                TempUnit::Fahrenheit => Unit::Fahrenheit,
                TempUnit::Kelvin => Unit::Kelvin,
            },
            Self::Pressure => Unit::Hectopascal,
            Self::Humidity => Unit::Percent,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Celsius,
    Fahrenheit,
    Kelvin,
    Hectopascal,
    Percent,
}

impl Unit {
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Celsius => "°C",
            Self::Fahrenheit => "°F",
            Self::Kelvin => "K",
            Self::Hectopascal => "hPa",
            Self::Percent => "%",
        }
    }
}

/// One stored sample. `value` is compensated and converted but never rounded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub metric: Metric,
    pub value: f32,
    pub unit: Unit,
    pub timestamp: Instant,
    /// Set when the value came from the synthetic fallback.
    pub synthetic: bool,
}

impl Reading {
    pub fn rounded(&self, decimals: u8) -> f32 {
        round_to(self.value, decimals)
    }
}

/// Physical sensor block.
///
/// Values are returned in °C, hPa and percent relative humidity.
pub trait SensorSource {
    fn read(&mut self, metric: Metric) -> Result<f32, SensorError>;

    /// CPU die temperature in °C, used for heat compensation.
    fn cpu_temperature(&mut self) -> Result<f32, SensorError> {
        Err(SensorError::Unavailable)
    }
}

/// A source with no hardware behind it. Every read falls back to synthetic data.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSensor;

impl SensorSource for NoSensor {
    fn read(&mut self, _metric: Metric) -> Result<f32, SensorError> {
        Err(SensorError::Unavailable)
    }
}
