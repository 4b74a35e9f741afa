//! Cooperative run loop
//!
//! One thread, no async runtime. Each iteration services whatever is due,
//! in priority order input > sampling > display refresh > uploads, then
//! sleeps until the earliest next deadline:
//!
//! | obligation        | period                                  |
//! |-------------------|-----------------------------------------|
//! | input poll        | [`INPUT_TICK`], drains upload results   |
//! | sensor sample     | `WAIT` seconds (at least one)           |
//! | display refresh   | [`REFRESH_INTERVAL`], or right after input |
//! | display sleep     | `SLEEP` seconds after last interaction  |
//! | upload check      | whenever a target becomes due           |

use alloc::boxed::Box;
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_time::{Duration, Instant};
use log::{debug, info, warn};
use rand_core::{RngCore, SeedableRng};

use crate::APP_NAME_SHORT;
use crate::config::Settings;
use crate::display::{DisplayController, DisplayState, LedFrame, LedMatrix};
use crate::input::{InputDispatcher, InputOutcome, InputSource};
use crate::rng::SparkleRng;
use crate::sensors::{Metric, MetricHistory, SensorReader, SensorSource};
use crate::units::TempUnit;
use crate::upload::{UploadCompletion, UploadLink, UploadScheduler};

pub const INPUT_TICK: Duration = Duration::from_millis(50);
pub const REFRESH_INTERVAL: Duration = Duration::from_millis(250);

/// How long the startup banner stays up before the first frame.
pub const BANNER_HOLD: Duration = Duration::from_secs(2);

/// How long shutdown waits for in-flight uploads before abandoning them.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Upper bound on events handled per input tick.
const MAX_EVENTS_PER_TICK: usize = 8;

/// Source of time for the loop.
pub trait Clock {
    fn now(&self) -> Instant;

    /// Block until `deadline`. Returns at once if it already passed.
    fn sleep_until(&mut self, deadline: Instant);
}

/// Cancellation flag set from a signal handler and polled by the loop.
#[derive(Debug, Default)]
pub struct ShutdownToken {
    cancelled: AtomicBool,
}

impl ShutdownToken {
    pub const fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Hardware and network collaborators handed to the loop.
pub struct Devices<S, L, M, I> {
    pub sensor: S,
    pub link: L,
    pub matrix: M,
    pub input: I,
}

/// Read-only view of the loop state passed to a [`LoopObserver`].
pub struct Snapshot<'a> {
    pub now: Instant,
    pub started_at: Instant,
    pub histories: &'a [MetricHistory; 3],
    pub uploads: &'a UploadScheduler,
    pub display: &'a DisplayState,
    pub frame: &'a LedFrame,
    pub temp_unit: TempUnit,
    pub rounding: u8,
}

impl Snapshot<'_> {
    pub fn history(&self, metric: Metric) -> &MetricHistory {
        &self.histories[metric.index()]
    }
}

/// Hook for status output (the terminal console in the binary).
pub trait LoopObserver {
    fn on_sample(&mut self, snapshot: &Snapshot<'_>) {
        let _ = snapshot;
    }

    fn on_upload(&mut self, completion: &UploadCompletion, snapshot: &Snapshot<'_>) {
        let _ = (completion, snapshot);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    Running,
    /// The `--uploads` limit was hit and all of its uploads finished.
    UploadLimitReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Interrupted,
    UploadLimit,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupted => f.write_str("interrupted"),
            Self::UploadLimit => f.write_str("upload limit reached"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSummary {
    pub metric: Metric,
    pub enabled: bool,
    pub successes: u32,
    pub failures: u32,
}

/// What happened during a run, reported at shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub reason: StopReason,
    pub started_at: Instant,
    pub stopped_at: Instant,
    pub upload_cycles: u32,
    pub targets: [TargetSummary; 3],
    pub abandoned: usize,
}

struct Schedule {
    next_input: Instant,
    next_sample: Instant,
    next_refresh: Instant,
}

/// Next occurrence of a periodic obligation, skipping missed slots.
fn reschedule(previous: Instant, interval: Duration, now: Instant) -> Instant {
    let next = previous + interval;
    if next > now { next } else { now + interval }
}

pub struct RunLoop<S, L, M, I, C> {
    clock: C,
    sensors: SensorReader<S>,
    uploads: UploadScheduler,
    link: L,
    display: DisplayController,
    matrix: M,
    input: I,
    dispatcher: InputDispatcher,
    observer: Option<Box<dyn LoopObserver>>,
    schedule: Schedule,
    wait: Duration,
    rounding: u8,
    started_at: Instant,
    input_failing: bool,
}

impl<S, L, M, I, C> RunLoop<S, L, M, I, C>
where
    S: SensorSource,
    L: UploadLink,
    M: LedMatrix,
    I: InputSource,
    C: Clock,
{
    /// Assemble the loop. `seed` drives the sparkle animation and the
    /// synthetic sensor fallback.
    pub fn new(
        settings: &Settings,
        uploads: UploadScheduler,
        devices: Devices<S, L, M, I>,
        clock: C,
        seed: u64,
    ) -> Self {
        let now = clock.now();
        let mut seeds = SparkleRng::seed_from_u64(seed);
        let sensor_rng = SparkleRng::seed_from_u64(seeds.next_u64());
        let display_rng = SparkleRng::seed_from_u64(seeds.next_u64());

        Self {
            sensors: SensorReader::new(devices.sensor, settings, sensor_rng),
            uploads,
            link: devices.link,
            display: DisplayController::new(settings, now, display_rng),
            matrix: devices.matrix,
            input: devices.input,
            dispatcher: InputDispatcher::new(),
            observer: None,
            schedule: Schedule {
                next_input: now,
                next_sample: now,
                next_refresh: now,
            },
            wait: settings.wait_interval(),
            rounding: settings.rounding,
            started_at: now,
            input_failing: false,
            clock,
        }
    }

    pub fn set_observer(&mut self, observer: Box<dyn LoopObserver>) {
        self.observer = Some(observer);
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    pub fn sensors(&self) -> &SensorReader<S> {
        &self.sensors
    }

    pub fn uploads(&self) -> &UploadScheduler {
        &self.uploads
    }

    pub fn display(&self) -> &DisplayController {
        &self.display
    }

    pub fn matrix(&self) -> &M {
        &self.matrix
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Show the startup banner on the matrix.
    pub fn announce(&mut self) {
        if !self.display.state().is_rendering() {
            return;
        }
        match self.matrix.write_text(APP_NAME_SHORT) {
            Ok(()) => self.schedule.next_refresh = self.clock.now() + BANNER_HOLD,
            Err(err) => debug!("Failed to show banner: {err}"),
        }
    }

    /// Run until `shutdown` is cancelled or the upload limit is reached.
    pub fn run(&mut self, shutdown: &ShutdownToken) -> RunSummary {
        info!("-- START Data Logging --");
        self.announce();
        let reason = loop {
            if shutdown.is_cancelled() {
                break StopReason::Interrupted;
            }
            if self.step() == LoopStatus::UploadLimitReached {
                break StopReason::UploadLimit;
            }
        };
        self.shutdown(reason)
    }

    /// One loop iteration: service every due obligation, then sleep until
    /// the next one.
    pub fn step(&mut self) -> LoopStatus {
        let now = self.clock.now();
        let mut redraw = false;

        if now >= self.schedule.next_input {
            redraw = self.poll_input(now);
            self.drain_completions(now);
            self.uploads.expire_backoff(now);
            self.schedule.next_input = reschedule(self.schedule.next_input, INPUT_TICK, now);
        }

        if now >= self.schedule.next_sample {
            self.sample(now);
            self.schedule.next_sample = reschedule(self.schedule.next_sample, self.wait, now);
        }

        let sleep_due = self.display.sleep_deadline().is_some_and(|at| now >= at);
        if redraw || sleep_due || now >= self.schedule.next_refresh {
            self.refresh(now);
            self.schedule.next_refresh =
                reschedule(self.schedule.next_refresh, REFRESH_INTERVAL, now);
        }

        if self.uploads.next_due().is_some_and(|at| now >= at) {
            let sensors = &self.sensors;
            self.uploads.dispatch_due(
                now,
                |metric| sensors.latest(metric).map(|r| r.value),
                &mut self.link,
            );
        }

        if self.uploads.finished() {
            return LoopStatus::UploadLimitReached;
        }

        let deadline = self.next_deadline(now);
        self.clock.sleep_until(deadline);
        LoopStatus::Running
    }

    /// Power down the display, give in-flight uploads a grace period and
    /// report what happened.
    pub fn shutdown(&mut self, reason: StopReason) -> RunSummary {
        info!("Stopping: {reason}");
        if let Err(err) = self.matrix.power_off() {
            warn!("Failed to power off LED matrix: {err}");
        }

        let mut now = self.clock.now();
        let deadline = now + SHUTDOWN_GRACE;
        let mut abandoned = 0;
        loop {
            self.drain_completions(now);
            if self.uploads.in_flight() == 0 {
                break;
            }
            if now >= deadline {
                abandoned = self.uploads.abandon_in_flight();
                self.link.abandon();
                warn!("Abandoned {abandoned} upload(s) still in flight");
                break;
            }
            self.clock.sleep_until((now + INPUT_TICK).min(deadline));
            now = self.clock.now();
        }

        info!("-- END Data Logging --");
        log::Log::flush(log::logger());

        RunSummary {
            reason,
            started_at: self.started_at,
            stopped_at: now,
            upload_cycles: self.uploads.cycles(),
            targets: Metric::ALL.map(|metric| {
                let state = self.uploads.state(metric);
                TargetSummary {
                    metric,
                    enabled: self.uploads.target(metric).enabled,
                    successes: state.successes,
                    failures: state.failures,
                }
            }),
            abandoned,
        }
    }

    /// Returns true if an accepted event needs an immediate redraw.
    fn poll_input(&mut self, now: Instant) -> bool {
        let mut redraw = false;
        for _ in 0..MAX_EVENTS_PER_TICK {
            let event = match self.input.poll_event() {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(err) => {
                    if !self.input_failing {
                        warn!("Input read failed: {err}");
                    }
                    self.input_failing = true;
                    break;
                }
            };
            self.input_failing = false;

            let Some(outcome) = self.dispatcher.dispatch(event, now, self.display.state_mut())
            else {
                continue;
            };
            match outcome {
                InputOutcome::Woke => info!("Display woken"),
                InputOutcome::ModeChanged(mode) => info!("Display mode: {mode}"),
                InputOutcome::Rotated(rotation) => {
                    info!("Display rotation: {}°", rotation.degrees())
                }
                InputOutcome::PowerToggled(on) => {
                    info!("Display {}", if on { "on" } else { "off" })
                }
            }
            redraw = true;
        }
        redraw
    }

    fn drain_completions(&mut self, now: Instant) {
        while let Some(completion) = self.link.poll_completion() {
            self.uploads.complete(completion, now);
            if let Some(observer) = self.observer.as_mut() {
                let snapshot = Snapshot {
                    now,
                    started_at: self.started_at,
                    histories: self.sensors.histories(),
                    uploads: &self.uploads,
                    display: self.display.state(),
                    frame: self.display.frame(),
                    temp_unit: self.sensors.temp_unit(),
                    rounding: self.rounding,
                };
                observer.on_upload(&completion, &snapshot);
            }
        }
    }

    fn sample(&mut self, now: Instant) {
        let readings = self.sensors.sample_all(now);
        debug!(
            "Sampled T={:.2} P={:.2} H={:.2}",
            readings[0].value, readings[1].value, readings[2].value
        );
        if let Some(observer) = self.observer.as_mut() {
            let snapshot = Snapshot {
                now,
                started_at: self.started_at,
                histories: self.sensors.histories(),
                uploads: &self.uploads,
                display: self.display.state(),
                frame: self.display.frame(),
                temp_unit: self.sensors.temp_unit(),
                rounding: self.rounding,
            };
            observer.on_sample(&snapshot);
        }
    }

    fn refresh(&mut self, now: Instant) {
        let metric = self.display.state().mode.metric();
        let history = metric.map(|m| self.sensors.history(m));
        let progress = metric.and_then(|m| self.uploads.progress(m, now));
        self.display.refresh(now, history, progress, &mut self.matrix);
    }

    fn next_deadline(&self, now: Instant) -> Instant {
        let mut deadline = self
            .schedule
            .next_input
            .min(self.schedule.next_sample)
            .min(self.schedule.next_refresh);
        let pending = [self.uploads.next_due(), self.display.sleep_deadline()];
        for at in pending.into_iter().flatten().filter(|at| *at > now) {
            deadline = deadline.min(at);
        }
        deadline
    }
}
