//! 8x8 LED matrix display
//!
//! The [`DisplayController`] owns the logical [`DisplayState`] and renders
//! one [`LedFrame`] per refresh tick. Frames are always drawn upright; the
//! configured [`Rotation`] travels with the frame to the [`LedMatrix`]
//! collaborator, which orients it for the physical panel.

mod controller;
mod frame;
pub mod graph;
mod sparkle;

pub use controller::DisplayController;
pub use frame::{LedFrame, MATRIX_SIZE};
pub use sparkle::Sparkle;

use core::fmt;
use core::str::FromStr;

use alloc::string::ToString;
use embassy_time::{Duration, Instant};
use serde::de::{self, Deserializer, Unexpected, Visitor};
use serde::Deserialize;
use thiserror_no_std::Error;

use crate::config::{ConfigError, Settings};
use crate::sensors::Metric;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayError {
    #[error("LED matrix I/O failed")]
    Io,
}

/// What the matrix shows.
///
/// Settings accept the name in any case or its index in [`DisplayMode::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    #[default]
    Sparkle,
    Temperature,
    Pressure,
    Humidity,
}

impl DisplayMode {
    pub const ALL: [DisplayMode; 4] = [
        DisplayMode::Sparkle,
        DisplayMode::Temperature,
        DisplayMode::Pressure,
        DisplayMode::Humidity,
    ];

    const fn position(self) -> usize {
        match self {
            Self::Sparkle => 0,
            Self::Temperature => 1,
            Self::Pressure => 2,
            Self::Humidity => 3,
        }
    }

    pub const fn next(self) -> Self {
        Self::ALL[(self.position() + 1) % Self::ALL.len()]
    }

    pub const fn previous(self) -> Self {
        Self::ALL[(self.position() + Self::ALL.len() - 1) % Self::ALL.len()]
    }

    /// The metric graphed in this mode, if any.
    pub const fn metric(self) -> Option<Metric> {
        match self {
            Self::Sparkle => None,
            Self::Temperature => Some(Metric::Temperature),
            Self::Pressure => Some(Metric::Pressure),
            Self::Humidity => Some(Metric::Humidity),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Sparkle => "sparkle",
            Self::Temperature => "temperature",
            Self::Pressure => "pressure",
            Self::Humidity => "humidity",
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DisplayMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|mode| mode.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ConfigError::UnknownDisplayMode(trimmed.to_string()))
    }
}

impl<'de> Deserialize<'de> for DisplayMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ModeVisitor;

        impl Visitor<'_> for ModeVisitor {
            type Value = DisplayMode;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a display mode name or an index from 0 to 3")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<DisplayMode, E> {
                value
                    .parse()
                    .map_err(|_| E::invalid_value(Unexpected::Str(value), &self))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<DisplayMode, E> {
                usize::try_from(value)
                    .ok()
                    .and_then(|index| DisplayMode::ALL.get(index).copied())
                    .ok_or_else(|| E::invalid_value(Unexpected::Unsigned(value), &self))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<DisplayMode, E> {
                match u64::try_from(value) {
                    Ok(index) => self.visit_u64(index),
                    Err(_) => Err(E::invalid_value(Unexpected::Signed(value), &self)),
                }
            }
        }

        deserializer.deserialize_any(ModeVisitor)
    }
}

/// Clockwise rotation applied on the way to the matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "u16")]
pub enum Rotation {
    #[default]
    R0,
    R90,
    R180,
    R270,
}

impl Rotation {
    pub const ALL: [Rotation; 4] = [Rotation::R0, Rotation::R90, Rotation::R180, Rotation::R270];

    pub const fn degrees(self) -> u16 {
        match self {
            Self::R0 => 0,
            Self::R90 => 90,
            Self::R180 => 180,
            Self::R270 => 270,
        }
    }

    /// Number of clockwise quarter turns.
    pub const fn quarter_turns(self) -> usize {
        self.degrees() as usize / 90
    }

    pub const fn next(self) -> Self {
        Self::ALL[(self.quarter_turns() + 1) % 4]
    }

    pub const fn previous(self) -> Self {
        Self::ALL[(self.quarter_turns() + 3) % 4]
    }
}

impl TryFrom<u16> for Rotation {
    type Error = ConfigError;

    fn try_from(degrees: u16) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Self::R0),
            90 => Ok(Self::R90),
            180 => Ok(Self::R180),
            270 => Ok(Self::R270),
            other => Err(ConfigError::InvalidRotation(other)),
        }
    }
}

/// Physical LED matrix.
///
/// Implementations return immediately; a failed write is reported and the
/// frame is simply dropped by the caller.
pub trait LedMatrix {
    /// Show `frame`, oriented by `rotation`.
    fn write(&mut self, frame: &LedFrame, rotation: Rotation) -> Result<(), DisplayError>;

    /// Show a short text message (startup banner).
    fn write_text(&mut self, text: &str) -> Result<(), DisplayError>;

    /// Turn every pixel off.
    fn clear(&mut self) -> Result<(), DisplayError>;

    /// Release the panel at shutdown.
    fn power_off(&mut self) -> Result<(), DisplayError> {
        self.clear()
    }
}

/// Logical display state, mutated only by input events and the sleep timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayState {
    pub mode: DisplayMode,
    pub rotation: Rotation,
    pub powered: bool,
    pub blanked: bool,
    pub last_interaction: Instant,
}

impl DisplayState {
    pub fn new(settings: &Settings, now: Instant) -> Self {
        Self {
            mode: settings.display,
            rotation: settings.rotation,
            powered: !settings.start_dark,
            blanked: false,
            last_interaction: now,
        }
    }

    /// Instant at which the display blanks, if it is not already blanked.
    pub fn sleep_deadline(&self, sleep: Option<Duration>) -> Option<Instant> {
        match sleep {
            Some(timeout) if !self.blanked => self.last_interaction.checked_add(timeout),
            _ => None,
        }
    }

    /// Blank the display once the inactivity timeout has passed.
    ///
    /// Returns true on the transition into the blanked state.
    pub fn update_sleep(&mut self, now: Instant, sleep: Option<Duration>) -> bool {
        match self.sleep_deadline(sleep) {
            Some(deadline) if now >= deadline => {
                self.blanked = true;
                true
            }
            _ => false,
        }
    }

    /// Whether frames should reach the matrix.
    pub fn is_rendering(&self) -> bool {
        self.powered && !self.blanked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_cycle() {
        let mut mode = DisplayMode::Sparkle;
        for _ in 0..4 {
            mode = mode.next();
        }
        assert_eq!(mode, DisplayMode::Sparkle);
        assert_eq!(DisplayMode::Sparkle.previous(), DisplayMode::Humidity);
        assert_eq!(DisplayMode::Humidity.next(), DisplayMode::Sparkle);
        assert_eq!(DisplayMode::Pressure.metric(), Some(Metric::Pressure));
        assert_eq!(DisplayMode::Sparkle.metric(), None);
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("Humidity".parse::<DisplayMode>(), Ok(DisplayMode::Humidity));
        assert_eq!(" sparkle ".parse::<DisplayMode>(), Ok(DisplayMode::Sparkle));
        assert!("radar".parse::<DisplayMode>().is_err());
    }

    #[test]
    fn test_rotation_cycle() {
        assert_eq!(Rotation::R270.next(), Rotation::R0);
        assert_eq!(Rotation::R0.previous(), Rotation::R270);
        assert_eq!(Rotation::try_from(180), Ok(Rotation::R180));
        assert_eq!(Rotation::try_from(45), Err(ConfigError::InvalidRotation(45)));
    }

    #[test]
    fn test_sleep_blanks_after_timeout() {
        let settings = Settings::default();
        let mut state = DisplayState::new(&settings, Instant::from_secs(0));
        let sleep = settings.sleep_timeout();

        assert!(!state.update_sleep(Instant::from_secs(599), sleep));
        assert!(state.is_rendering());
        assert!(state.update_sleep(Instant::from_secs(600), sleep));
        assert!(state.blanked);
        assert!(!state.is_rendering());
        // Already blanked: no second transition.
        assert!(!state.update_sleep(Instant::from_secs(700), sleep));
    }

    #[test]
    fn test_sleep_disabled_never_blanks() {
        let settings = Settings {
            sleep: 0,
            ..Settings::default()
        };
        let mut state = DisplayState::new(&settings, Instant::from_secs(0));
        assert!(!state.update_sleep(Instant::from_secs(1_000_000), settings.sleep_timeout()));
        assert_eq!(state.sleep_deadline(settings.sleep_timeout()), None);
    }

    #[test]
    fn test_start_dark() {
        let settings = Settings {
            start_dark: true,
            ..Settings::default()
        };
        let state = DisplayState::new(&settings, Instant::from_secs(0));
        assert!(!state.powered);
        assert!(!state.is_rendering());
    }
}
