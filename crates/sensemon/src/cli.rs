//! Command line flags. Anything set here wins over the settings file.

use std::path::PathBuf;

use clap::Parser;
use sensemon_core::DisplayMode;

#[derive(Debug, Parser)]
#[command(
    name = "sensemon",
    version,
    about = "Sense HAT environmental monitor with Adafruit IO uploads"
)]
pub struct Cli {
    /// Settings file (TOML)
    #[arg(long, value_name = "FILE", default_value = "settings.toml")]
    pub config: PathBuf,

    /// Stop after N upload cycles (0 or less runs until interrupted)
    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    pub uploads: Option<i64>,

    /// Show time until the next upload on the bottom LED row
    #[arg(long)]
    pub progress: bool,

    /// Initial display mode: sparkle, temperature, pressure or humidity
    #[arg(long, value_name = "MODE", value_parser = parse_display_mode)]
    pub dmode: Option<DisplayMode>,

    /// Do not draw the terminal console
    #[arg(long = "noCLI")]
    pub no_cli: bool,

    /// Start with the LED matrix switched off
    #[arg(long = "noLED")]
    pub no_led: bool,

    /// Log at debug level
    #[arg(long)]
    pub debug: bool,

    /// Append log output to FILE instead of stderr
    #[arg(long, value_name = "FILE")]
    pub log: Option<PathBuf>,
}

fn parse_display_mode(value: &str) -> Result<DisplayMode, String> {
    value.parse().map_err(|err| format!("{err}"))
}
