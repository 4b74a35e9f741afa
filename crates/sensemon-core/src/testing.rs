//! Fake collaborators for driving the core in virtual time.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use embassy_time::Instant;

use crate::display::{DisplayError, LedFrame, LedMatrix, Rotation};
use crate::input::{InputError, InputEvent, InputSource};
use crate::run_loop::Clock;
use crate::sensors::{Metric, SensorError, SensorSource};
use crate::upload::{Telemetry, UploadCompletion, UploadError, UploadLink, UploadRequest};

/// Virtual clock. Sleeping jumps straight to the deadline.
#[derive(Debug, Clone)]
pub struct FakeClock {
    now: Rc<Cell<Instant>>,
}

impl FakeClock {
    pub fn at_zero() -> Self {
        Self {
            now: Rc::new(Cell::new(Instant::from_ticks(0))),
        }
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.now.get()
    }

    fn sleep_until(&mut self, deadline: Instant) {
        if deadline > self.now.get() {
            self.now.set(deadline);
        }
    }
}

/// Sensor returning fixed values; `None` reads as unavailable.
#[derive(Debug, Clone)]
pub struct ScriptedSensor {
    pub values: [Option<f32>; 3],
    pub cpu: Option<f32>,
}

impl ScriptedSensor {
    pub fn new(temperature: f32, pressure: f32, humidity: f32) -> Self {
        Self {
            values: [Some(temperature), Some(pressure), Some(humidity)],
            cpu: None,
        }
    }
}

impl SensorSource for ScriptedSensor {
    fn read(&mut self, metric: Metric) -> Result<f32, SensorError> {
        self.values[metric.index()].ok_or(SensorError::Unavailable)
    }

    fn cpu_temperature(&mut self) -> Result<f32, SensorError> {
        self.cpu.ok_or(SensorError::Unavailable)
    }
}

#[derive(Debug, Default)]
struct TelemetryLog {
    sent: Vec<(String, f32, Instant)>,
    responses: VecDeque<Result<(), UploadError>>,
    rejected: Vec<String>,
    clock: Option<FakeClock>,
}

/// Telemetry that records every call. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingTelemetry {
    log: Rc<RefCell<TelemetryLog>>,
}

impl RecordingTelemetry {
    /// Stamp each send with the virtual time of `clock`.
    pub fn with_clock(clock: &FakeClock) -> Self {
        let telemetry = Self::default();
        telemetry.log.borrow_mut().clock = Some(clock.clone());
        telemetry
    }

    /// Queue the result of the next send. Unscripted sends succeed.
    pub fn respond_with(&self, result: Result<(), UploadError>) {
        self.log.borrow_mut().responses.push_back(result);
    }

    /// Make startup validation fail for `feed`.
    pub fn reject_feed(&self, feed: &str) {
        self.log.borrow_mut().rejected.push(feed.to_string());
    }

    pub fn sent(&self) -> Vec<(String, f32)> {
        self.log
            .borrow()
            .sent
            .iter()
            .map(|(feed, value, _)| (feed.clone(), *value))
            .collect()
    }

    pub fn sent_at(&self, feed: &str) -> Vec<Instant> {
        self.log
            .borrow()
            .sent
            .iter()
            .filter(|(f, _, _)| f == feed)
            .map(|(_, _, at)| *at)
            .collect()
    }
}

impl Telemetry for RecordingTelemetry {
    fn send(&mut self, feed: &str, value: f32) -> Result<(), UploadError> {
        let mut log = self.log.borrow_mut();
        let at = log
            .clock
            .as_ref()
            .map_or(Instant::from_ticks(0), |clock| clock.now());
        log.sent.push((feed.to_string(), value, at));
        log.responses.pop_front().unwrap_or(Ok(()))
    }

    fn validate_feed(&mut self, feed: &str) -> Result<(), UploadError> {
        if self.log.borrow().rejected.iter().any(|f| f == feed) {
            Err(UploadError::Invalid)
        } else {
            Ok(())
        }
    }
}

/// Link that accepts uploads and never finishes them.
#[derive(Debug, Default)]
pub struct PendingLink {
    pub requests: Vec<UploadRequest>,
    pub abandoned: bool,
}

impl UploadLink for PendingLink {
    fn dispatch(&mut self, request: UploadRequest) {
        self.requests.push(request);
    }

    fn poll_completion(&mut self) -> Option<UploadCompletion> {
        None
    }

    fn abandon(&mut self) {
        self.abandoned = true;
    }
}

#[derive(Debug, Default)]
pub struct RecordingMatrix {
    pub frames: Vec<(LedFrame, Rotation)>,
    pub texts: Vec<String>,
    pub clears: usize,
    pub power_offs: usize,
    pub fail_writes: bool,
}

impl LedMatrix for RecordingMatrix {
    fn write(&mut self, frame: &LedFrame, rotation: Rotation) -> Result<(), DisplayError> {
        if self.fail_writes {
            return Err(DisplayError::Io);
        }
        self.frames.push((frame.clone(), rotation));
        Ok(())
    }

    fn write_text(&mut self, text: &str) -> Result<(), DisplayError> {
        self.texts.push(text.to_string());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        self.clears += 1;
        Ok(())
    }

    fn power_off(&mut self) -> Result<(), DisplayError> {
        self.power_offs += 1;
        Ok(())
    }
}

/// Input that releases each queued event once virtual time reaches it.
#[derive(Debug)]
pub struct ScriptedInput {
    clock: FakeClock,
    events: VecDeque<(Instant, InputEvent)>,
    pub failing: bool,
}

impl ScriptedInput {
    pub fn new(clock: &FakeClock) -> Self {
        Self {
            clock: clock.clone(),
            events: VecDeque::new(),
            failing: false,
        }
    }

    pub fn push(&mut self, at: Instant, event: InputEvent) {
        self.events.push_back((at, event));
    }
}

impl InputSource for ScriptedInput {
    fn poll_event(&mut self) -> Result<Option<InputEvent>, InputError> {
        if self.failing {
            return Err(InputError::Io);
        }
        match self.events.front() {
            Some((at, _)) if *at <= self.clock.now() => {
                Ok(self.events.pop_front().map(|(_, event)| event))
            }
            _ => Ok(None),
        }
    }
}
