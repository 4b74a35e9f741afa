//! Hardware-independent core library for SenseMon
//!
//! This crate contains the run loop core of the SenseMon environmental
//! monitor: sensor sampling with rolling history, throttled telemetry
//! uploads, the LED matrix display state machine, joystick input handling,
//! and the cooperative scheduler that ties them together.
//!
//! Everything that touches real hardware or the network is reached through
//! the collaborator traits ([`sensors::SensorSource`], [`upload::Telemetry`],
//! [`upload::UploadLink`], [`display::LedMatrix`], [`input::InputSource`],
//! [`run_loop::Clock`]). Time is always passed in explicitly, so every
//! component can be driven in virtual time from tests.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets and desktop hosts (for the Linux binary and tests).

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod display;
pub mod input;
pub mod rng;
pub mod run_loop;
pub mod sensors;
pub mod units;
pub mod upload;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ConfigError, Settings, UploadMode};
pub use display::{DisplayMode, Rotation};
pub use run_loop::{Clock, RunLoop, RunSummary, ShutdownToken, StopReason};
pub use sensors::{Metric, Reading};
pub use units::TempUnit;

/// Full application name, shown in the terminal console and logs.
pub const APP_NAME: &str = "f451 Labs - SenseMon";

/// Short application name, scrolled on the LED matrix at startup.
pub const APP_NAME_SHORT: &str = "SenseMon";
