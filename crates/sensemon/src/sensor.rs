//! Sense HAT sensors through the Linux IIO sysfs interface.
//!
//! The HTS221 (humidity, temperature) and LPS25H (pressure, temperature)
//! show up as `iio:deviceN` directories. A channel is read from its
//! `_input` file when the driver provides one, otherwise from
//! `(_raw + _offset) * _scale`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;

use sensemon_core::Metric;
use sensemon_core::sensors::{SensorError, SensorSource};

/// IIO channel name and the factor that turns its value into the unit
/// the core expects (°C, hPa, %).
const fn channel(metric: Metric) -> (&'static str, f32) {
    match metric {
        // milli-degrees Celsius
        Metric::Temperature => ("in_temp", 0.001),
        // kilopascal
        Metric::Pressure => ("in_pressure", 10.0),
        // milli-percent
        Metric::Humidity => ("in_humidityrelative", 0.001),
    }
}

pub struct IioSensor {
    root: PathBuf,
    cpu_temp_path: PathBuf,
    devices: [Option<PathBuf>; 3],
}

impl IioSensor {
    pub fn new(root: &Path, cpu_temp_path: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            cpu_temp_path: cpu_temp_path.to_path_buf(),
            devices: [None, None, None],
        }
    }

    /// Device directory exposing `metric`, cached after the first hit.
    fn locate(&mut self, metric: Metric) -> Result<PathBuf, SensorError> {
        if let Some(dir) = &self.devices[metric.index()] {
            return Ok(dir.clone());
        }

        let (name, _) = channel(metric);
        let found = if has_channel(&self.root, name) {
            Some(self.root.clone())
        } else {
            let mut candidates: Vec<PathBuf> = fs::read_dir(&self.root)
                .map_err(io_error)?
                .filter_map(Result::ok)
                .filter(|entry| entry.file_name().to_string_lossy().starts_with("iio:device"))
                .map(|entry| entry.path())
                .collect();
            candidates.sort();
            candidates.into_iter().find(|dir| has_channel(dir, name))
        };

        let dir = found.ok_or(SensorError::Unavailable)?;
        debug!("{metric} channel found in {}", dir.display());
        self.devices[metric.index()] = Some(dir.clone());
        Ok(dir)
    }
}

impl SensorSource for IioSensor {
    fn read(&mut self, metric: Metric) -> Result<f32, SensorError> {
        let dir = self.locate(metric)?;
        let (name, factor) = channel(metric);
        read_channel(&dir, name).map(|value| value * factor)
    }

    fn cpu_temperature(&mut self) -> Result<f32, SensorError> {
        read_value(&self.cpu_temp_path).map(|milli| milli * 0.001)
    }
}

fn has_channel(dir: &Path, name: &str) -> bool {
    dir.join(format!("{name}_input")).is_file() || dir.join(format!("{name}_raw")).is_file()
}

fn read_channel(dir: &Path, name: &str) -> Result<f32, SensorError> {
    match read_value(&dir.join(format!("{name}_input"))) {
        Err(SensorError::Unavailable) => {}
        processed => return processed,
    }
    let raw = read_value(&dir.join(format!("{name}_raw")))?;
    let offset = read_value(&dir.join(format!("{name}_offset"))).unwrap_or(0.0);
    let scale = read_value(&dir.join(format!("{name}_scale"))).unwrap_or(1.0);
    Ok((raw + offset) * scale)
}

fn read_value(path: &Path) -> Result<f32, SensorError> {
    let text = fs::read_to_string(path).map_err(io_error)?;
    text.trim().parse().map_err(|_| SensorError::ReadError)
}

fn io_error(err: io::Error) -> SensorError {
    match err.kind() {
        io::ErrorKind::NotFound => SensorError::Unavailable,
        _ => SensorError::ReadError,
    }
}
