//! Logger setup.
//!
//! Level precedence: `--debug`, then `LOGLVL` from the settings file, then
//! `RUST_LOG`, then the default. The default is `info`, except when the
//! full-screen console owns the terminal and no log file is set: then only
//! warnings and errors reach stderr so routine records don't scroll the view.

use std::fs::OpenOptions;
use std::path::Path;

use anyhow::Context;
use env_logger::{Builder, Env, Target, WriteStyle};

use crate::config::LogLevel;

/// Default filter when neither `LOGLVL` nor `RUST_LOG` is given.
pub fn default_filter(console: bool, file: Option<&Path>) -> &'static str {
    if console && file.is_none() { "warn" } else { "info" }
}

pub fn init(level: Option<LogLevel>, file: Option<&Path>, console: bool) -> anyhow::Result<()> {
    let mut builder =
        Builder::from_env(Env::default().default_filter_or(default_filter(console, file)));
    if let Some(level) = level {
        builder.filter_level(level.into());
    }

    if let Some(path) = file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("cannot open log file {}", path.display()))?;
        builder.target(Target::Pipe(Box::new(file)));
        builder.write_style(WriteStyle::Never);
    }

    builder.format_timestamp_secs();
    builder.try_init().context("logger already initialised")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_quiets_terminal_logging() {
        assert_eq!(default_filter(true, None), "warn");
        assert_eq!(default_filter(false, None), "info");
        assert_eq!(default_filter(true, Some(Path::new("sensemon.log"))), "info");
    }
}
