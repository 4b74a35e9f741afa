//! Unit conversions and display rounding
//!
//! Sensors report temperature in degrees Celsius, pressure in hPa and
//! relative humidity in percent. Temperature is converted to the configured
//! unit before it is stored. Rounding only happens when a value leaves the
//! process (upload payloads, display text), never on stored history.

use core::fmt;

use serde::Deserialize;

/// Offset between the Celsius and Kelvin scales.
pub const KELVIN_OFFSET: f32 = 273.15;

/// Upper bound for the `ROUNDING` setting.
pub const MAX_DECIMALS: u8 = 6;

/// Temperature unit selected by `UNIT_TEMPS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum TempUnit {
    #[default]
    #[serde(rename = "C", alias = "c")]
    Celsius,
    #[serde(rename = "F", alias = "f")]
    Fahrenheit,
    #[serde(rename = "K", alias = "k")]
    Kelvin,
}

impl TempUnit {
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Celsius => "°C",
            Self::Fahrenheit => "°F",
            Self::Kelvin => "K",
        }
    }

    /// Convert a Celsius value into this unit.
    pub fn from_celsius(self, celsius: f32) -> f32 {
        match self {
            Self::Celsius => celsius,
            Self::Fahrenheit => celsius_to_fahrenheit(celsius),
            Self::Kelvin => celsius_to_kelvin(celsius),
        }
    }
}

impl fmt::Display for TempUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

pub fn celsius_to_fahrenheit(celsius: f32) -> f32 {
    celsius * 9.0 / 5.0 + 32.0
}

pub fn celsius_to_kelvin(celsius: f32) -> f32 {
    celsius + KELVIN_OFFSET
}

/// Apply a calibration offset to a raw value (CPU heat compensation).
pub fn apply_offset(value: f32, offset: f32) -> f32 {
    value + offset
}

/// Round half away from zero to `decimals` places.
///
/// `core` has no `f32::round`, so the value is scaled in `f64` and truncated
/// after adding a signed half.
pub fn round_to(value: f32, decimals: u8) -> f32 {
    let factor = (0..decimals.min(MAX_DECIMALS)).fold(1.0f64, |acc, _| acc * 10.0);
    let scaled = f64::from(value) * factor;
    let nudged = if scaled >= 0.0 {
        scaled + 0.5
    } else {
        scaled - 0.5
    };
    ((nudged as i64) as f64 / factor) as f32
}

/// Linearly map `value` from `[in_min, in_max]` onto `[out_min, out_max]`.
///
/// A degenerate input range maps everything to the middle of the output.
pub fn map_range(value: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    let span = in_max - in_min;
    if span <= f32::EPSILON {
        return (out_min + out_max) / 2.0;
    }
    let frac = ((value - in_min) / span).clamp(0.0, 1.0);
    out_min + frac * (out_max - out_min)
}
