//! Sensor polling with compensation, conversion and synthetic fallback

use embassy_time::Instant;
use heapless::Deque;
use log::{debug, warn};

use super::{HISTORY_CAPACITY, Metric, MetricHistory, Reading, SensorError, SensorSource};
use crate::config::Settings;
use crate::rng::SparkleRng;
use crate::units::{TempUnit, apply_offset};

/// Largest CPU temperature smoothing window accepted by `MAX_LEN_CPU_TEMPS`.
pub const CPU_WINDOW_MAX: usize = 32;

/// Polls the sensor block and owns the per-metric histories.
///
/// Temperature is corrected for heat soaked up from the CPU using
/// `raw - (avg_cpu - raw) / factor`, where `avg_cpu` is a rolling average
/// over the last few CPU readings. The factor comes from `TEMP_COMP`; zero
/// disables compensation.
pub struct SensorReader<S> {
    source: S,
    rng: SparkleRng,
    temp_unit: TempUnit,
    temp_comp: f32,
    cpu_window: usize,
    cpu_temps: Deque<f32, CPU_WINDOW_MAX>,
    histories: [MetricHistory<HISTORY_CAPACITY>; 3],
    synthetic: [bool; 3],
}

impl<S: SensorSource> SensorReader<S> {
    pub fn new(source: S, settings: &Settings, rng: SparkleRng) -> Self {
        Self {
            source,
            rng,
            temp_unit: settings.temp_unit,
            temp_comp: settings.temp_comp,
            cpu_window: settings.cpu_temps_window.clamp(1, CPU_WINDOW_MAX),
            cpu_temps: Deque::new(),
            histories: [
                MetricHistory::new(),
                MetricHistory::new(),
                MetricHistory::new(),
            ],
            synthetic: [false; 3],
        }
    }

    /// Read every metric once and append the results to history.
    pub fn sample_all(&mut self, now: Instant) -> [Reading; 3] {
        Metric::ALL.map(|metric| self.sample(metric, now))
    }

    /// Read one metric, append it to its history and return it.
    ///
    /// Never fails: an unavailable or failing sensor yields a synthetic value
    /// inside the metric's plausible range and the reading is flagged.
    pub fn sample(&mut self, metric: Metric, now: Instant) -> Reading {
        let (raw, synthetic) = match self.read_checked(metric) {
            Ok(value) => {
                if self.synthetic[metric.index()] {
                    debug!("{metric} sensor recovered");
                }
                (value, false)
            }
            Err(err) => {
                let (min, max) = metric.plausible_range();
                let value = self.rng.tenths_between(min, max);
                if self.synthetic[metric.index()] {
                    debug!("{metric} still unavailable ({err}), using synthetic {value}");
                } else {
                    warn!("{metric} sensor unavailable ({err}), substituting synthetic data");
                }
                (value, true)
            }
        };
        self.synthetic[metric.index()] = synthetic;

        let value = match metric {
            Metric::Temperature => {
                let compensated = self.compensate(raw);
                self.temp_unit.from_celsius(compensated)
            }
            Metric::Pressure | Metric::Humidity => raw,
        };

        let reading = Reading {
            metric,
            value,
            unit: metric.unit(self.temp_unit),
            timestamp: now,
            synthetic,
        };
        self.histories[metric.index()].push(reading);
        reading
    }

    fn read_checked(&mut self, metric: Metric) -> Result<f32, SensorError> {
        let value = self.source.read(metric)?;
        let (min, max) = metric.plausible_range();
        // Allow some headroom past the nominal range before calling it garbage.
        let slack = (max - min) * 0.5;
        if !value.is_finite() || value < min - slack || value > max + slack {
            return Err(SensorError::OutOfRange);
        }
        Ok(value)
    }

    fn compensate(&mut self, raw: f32) -> f32 {
        if self.temp_comp <= 0.0 {
            return raw;
        }
        let cpu = match self.source.cpu_temperature() {
            Ok(cpu) if cpu.is_finite() => cpu,
            Ok(_) | Err(_) => return raw,
        };
        if self.cpu_temps.is_empty() {
            // Seed the window so the first average is the first reading.
            for _ in 0..self.cpu_window {
                let _ = self.cpu_temps.push_back(cpu);
            }
        } else {
            while self.cpu_temps.len() >= self.cpu_window {
                self.cpu_temps.pop_front();
            }
            let _ = self.cpu_temps.push_back(cpu);
        }
        let avg = self.cpu_temps.iter().sum::<f32>() / self.cpu_temps.len() as f32;
        apply_offset(raw, -(avg - raw) / self.temp_comp)
    }

    pub fn history(&self, metric: Metric) -> &MetricHistory {
        &self.histories[metric.index()]
    }

    pub fn histories(&self) -> &[MetricHistory; 3] {
        &self.histories
    }

    pub fn latest(&self, metric: Metric) -> Option<&Reading> {
        self.history(metric).latest()
    }

    /// Whether the last sample of `metric` was synthetic.
    pub fn is_synthetic(&self, metric: Metric) -> bool {
        self.synthetic[metric.index()]
    }

    pub fn temp_unit(&self) -> TempUnit {
        self.temp_unit
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::{NoSensor, Unit};
    use crate::testing::ScriptedSensor;
    use approx::assert_relative_eq;
    use rand_core::SeedableRng;

    fn reader_with<S: SensorSource>(source: S, settings: &Settings) -> SensorReader<S> {
        SensorReader::new(source, settings, SparkleRng::seed_from_u64(11))
    }

    #[test]
    fn test_sample_appends_to_history() {
        let settings = Settings::default();
        let mut reader = reader_with(ScriptedSensor::new(21.5, 1013.2, 40.0), &settings);
        let readings = reader.sample_all(Instant::from_secs(1));

        assert_relative_eq!(readings[0].value, 21.5);
        assert_eq!(readings[1].unit, Unit::Hectopascal);
        assert!(!readings[2].synthetic);
        for metric in Metric::ALL {
            assert_eq!(reader.history(metric).len(), 1);
        }
    }

    #[test]
    fn test_temperature_converted_not_rounded() {
        let settings = Settings {
            temp_unit: TempUnit::Fahrenheit,
            ..Settings::default()
        };
        let mut reader = reader_with(ScriptedSensor::new(21.123, 1000.0, 50.0), &settings);
        let reading = reader.sample(Metric::Temperature, Instant::from_secs(0));

        assert_eq!(reading.unit, Unit::Fahrenheit);
        assert_relative_eq!(reading.value, 21.123 * 9.0 / 5.0 + 32.0, epsilon = 1e-4);
        assert_relative_eq!(reading.rounded(1), 70.0);
    }

    #[test]
    fn test_synthetic_fallback_within_range() {
        let settings = Settings::default();
        let mut reader = reader_with(NoSensor, &settings);
        for i in 0..50 {
            let readings = reader.sample_all(Instant::from_secs(i));
            for reading in readings {
                let (min, max) = reading.metric.plausible_range();
                assert!(reading.synthetic);
                assert!(reading.value >= min && reading.value <= max);
            }
        }
        assert!(reader.is_synthetic(Metric::Pressure));
    }

    #[test]
    fn test_out_of_range_value_is_replaced() {
        let settings = Settings::default();
        let mut reader = reader_with(ScriptedSensor::new(21.0, 99_999.0, 40.0), &settings);
        let reading = reader.sample(Metric::Pressure, Instant::from_secs(0));
        assert!(reading.synthetic);
        assert!(reading.value <= 1260.0);
    }

    #[test]
    fn test_cpu_compensation_formula() {
        let settings = Settings {
            temp_comp: 2.0,
            cpu_temps_window: 3,
            ..Settings::default()
        };
        let mut sensor = ScriptedSensor::new(30.0, 1000.0, 50.0);
        sensor.cpu = Some(50.0);
        let mut reader = reader_with(sensor, &settings);

        // Window seeded with 50: 30 - (50 - 30) / 2 = 20
        let first = reader.sample(Metric::Temperature, Instant::from_secs(0));
        assert_relative_eq!(first.value, 20.0);

        // Window becomes [50, 50, 56] -> avg 52: 30 - 22 / 2 = 19
        reader.source_mut().cpu = Some(56.0);
        let second = reader.sample(Metric::Temperature, Instant::from_secs(1));
        assert_relative_eq!(second.value, 19.0, epsilon = 1e-4);
    }

    #[test]
    fn test_compensation_skipped_without_cpu_reading() {
        let settings = Settings {
            temp_comp: 2.0,
            ..Settings::default()
        };
        let mut reader = reader_with(ScriptedSensor::new(30.0, 1000.0, 50.0), &settings);
        let reading = reader.sample(Metric::Temperature, Instant::from_secs(0));
        assert_relative_eq!(reading.value, 30.0);
    }
}
