//! Per-target upload timing, throttling and startup validation

use alloc::string::{String, ToString};

use embassy_time::{Duration, Instant};
use log::{debug, info, warn};

use super::{Telemetry, UploadCompletion, UploadError, UploadLink, UploadRequest, is_valid_feed_key};
use crate::config::{ConfigError, Settings, UploadMode};
use crate::sensors::Metric;
use crate::units::round_to;

/// A remote feed fed by one metric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub metric: Metric,
    pub feed: String,
    pub enabled: bool,
}

/// Where a target is in its upload cycle.
///
/// "Due" is not stored; it is derived from the timestamps below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadPhase {
    #[default]
    Idle,
    Sending,
    Backoff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UploadState {
    pub last_attempt: Option<Instant>,
    pub last_success: Option<Instant>,
    pub backoff_until: Option<Instant>,
    pub consecutive_failures: u32,
    pub phase: UploadPhase,
    pub successes: u32,
    pub failures: u32,
}

/// Decides when each target uploads and tracks the outcome.
///
/// A target first becomes due `DELAY` after startup, then `FREQ` after each
/// attempt. A rate-limited target additionally waits until its backoff
/// expires. A target with an upload in flight is never due, so there is at
/// most one outstanding call per target.
pub struct UploadScheduler {
    targets: [UploadTarget; 3],
    states: [UploadState; 3],
    started_at: Instant,
    freq: Duration,
    delay: Duration,
    throttle: Duration,
    rounding: u8,
    max_cycles: Option<u32>,
    cycles: u32,
}

impl UploadScheduler {
    /// Build the targets for `settings.upload_mode`, validating feeds.
    ///
    /// In `force` mode any unusable feed aborts startup. In `yes` mode an
    /// unusable feed only disables its own target.
    pub fn configure<T: Telemetry>(
        settings: &Settings,
        telemetry: &mut T,
        started_at: Instant,
    ) -> Result<Self, ConfigError> {
        let mut targets = Metric::ALL.map(|metric| UploadTarget {
            metric,
            feed: settings.feed(metric).trim().to_string(),
            enabled: false,
        });

        match settings.upload_mode {
            UploadMode::No => info!("Uploads disabled"),
            UploadMode::Force => {
                if !settings.has_credentials() {
                    return Err(ConfigError::MissingCredentials);
                }
                for target in &mut targets {
                    if let Err(reason) = check_feed(telemetry, &target.feed) {
                        warn!("Feed '{}' for {} failed validation: {reason}", target.feed, target.metric);
                        return Err(ConfigError::InvalidFeed {
                            metric: target.metric,
                            feed: target.feed.clone(),
                        });
                    }
                    target.enabled = true;
                }
            }
            UploadMode::Yes if !settings.has_credentials() => {
                warn!("No service credentials configured, uploads disabled");
            }
            UploadMode::Yes => {
                for target in &mut targets {
                    match check_feed(telemetry, &target.feed) {
                        Ok(()) => target.enabled = true,
                        Err(reason) => warn!(
                            "Disabling {} uploads, feed '{}' is unusable: {reason}",
                            target.metric, target.feed
                        ),
                    }
                }
            }
        }

        for target in targets.iter().filter(|t| t.enabled) {
            info!("Uploading {} to feed '{}'", target.metric, target.feed);
        }
        let scheduler = Self::with_targets(settings, targets, started_at);
        if let Some(max) = scheduler.max_cycles
            && scheduler.enabled_count() == 0
        {
            warn!("Upload limit of {max} cycles set but nothing to upload, stopping at once");
        }
        Ok(scheduler)
    }

    /// Build a scheduler from already-validated targets.
    pub fn with_targets(settings: &Settings, targets: [UploadTarget; 3], started_at: Instant) -> Self {
        Self {
            targets,
            states: [UploadState::default(); 3],
            started_at,
            freq: settings.freq_interval(),
            delay: settings.delay_interval(),
            throttle: settings.throttle_interval(),
            rounding: settings.rounding,
            max_cycles: settings.max_uploads.filter(|n| *n > 0),
            cycles: 0,
        }
    }

    pub fn target(&self, metric: Metric) -> &UploadTarget {
        &self.targets[metric.index()]
    }

    pub fn targets(&self) -> &[UploadTarget; 3] {
        &self.targets
    }

    pub fn state(&self, metric: Metric) -> &UploadState {
        &self.states[metric.index()]
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Instant at which target `index` becomes due, ignoring the cycle limit.
    fn due_at(&self, index: usize) -> Option<Instant> {
        if !self.targets[index].enabled {
            return None;
        }
        let state = &self.states[index];
        let natural = match state.last_attempt {
            Some(last) => last + self.freq,
            None => self.started_at + self.delay,
        };
        match state.phase {
            UploadPhase::Sending => None,
            UploadPhase::Idle => Some(natural),
            UploadPhase::Backoff => Some(state.backoff_until.map_or(natural, |until| until.max(natural))),
        }
    }

    pub fn is_due(&self, metric: Metric, now: Instant) -> bool {
        !self.limit_reached() && self.due_at(metric.index()).is_some_and(|at| at <= now)
    }

    /// Earliest instant at which any target becomes due.
    pub fn next_due(&self) -> Option<Instant> {
        if self.limit_reached() {
            return None;
        }
        (0..self.targets.len()).filter_map(|i| self.due_at(i)).min()
    }

    /// Return targets whose throttle window has elapsed to `Idle`.
    pub fn expire_backoff(&mut self, now: Instant) {
        for (target, state) in self.targets.iter().zip(self.states.iter_mut()) {
            if state.phase == UploadPhase::Backoff
                && state.backoff_until.is_none_or(|until| now >= until)
            {
                debug!("Backoff over for {}", target.metric);
                state.phase = UploadPhase::Idle;
                state.backoff_until = None;
            }
        }
    }

    /// Start an upload for every due target.
    ///
    /// `latest` supplies the newest stored value per metric; it is rounded
    /// to `ROUNDING` decimals for the payload. Returns the number of uploads
    /// started. A check that starts at least one upload counts as a cycle.
    pub fn dispatch_due<L, F>(&mut self, now: Instant, latest: F, link: &mut L) -> usize
    where
        L: UploadLink,
        F: Fn(Metric) -> Option<f32>,
    {
        if self.limit_reached() {
            return 0;
        }

        self.expire_backoff(now);

        let mut dispatched = 0;
        for index in 0..self.targets.len() {
            if !self.due_at(index).is_some_and(|at| at <= now) {
                continue;
            }

            let metric = self.targets[index].metric;
            let Some(value) = latest(metric) else {
                debug!("No {metric} reading yet, postponing upload");
                continue;
            };

            let state = &mut self.states[index];
            state.phase = UploadPhase::Sending;
            state.last_attempt = Some(now);
            link.dispatch(UploadRequest {
                metric,
                feed: self.targets[index].feed.clone(),
                value: round_to(value, self.rounding),
            });
            dispatched += 1;
        }

        if dispatched > 0 {
            self.cycles += 1;
            debug!("Upload cycle {} started {dispatched} upload(s)", self.cycles);
        }
        dispatched
    }

    /// Record the outcome of an upload that finished at `now`.
    pub fn complete(&mut self, completion: UploadCompletion, now: Instant) {
        let index = completion.metric.index();
        let metric = completion.metric;
        let state = &mut self.states[index];
        if state.phase != UploadPhase::Sending {
            warn!("Ignoring completion for {metric} with no upload in flight");
            return;
        }

        match completion.result {
            Ok(()) => {
                state.consecutive_failures = 0;
                state.last_success = Some(now);
                state.successes += 1;
                state.phase = UploadPhase::Idle;
                info!("Uploaded {metric} to '{}'", self.targets[index].feed);
            }
            Err(UploadError::RateLimited) => {
                state.consecutive_failures += 1;
                state.failures += 1;
                state.backoff_until = Some(now + self.throttle);
                state.phase = UploadPhase::Backoff;
                warn!(
                    "Rate limited while uploading {metric}, backing off for {}s",
                    self.throttle.as_secs()
                );
            }
            Err(err) => {
                state.consecutive_failures += 1;
                state.failures += 1;
                state.phase = UploadPhase::Idle;
                warn!(
                    "Upload of {metric} failed: {err} ({} in a row)",
                    state.consecutive_failures
                );
            }
        }
    }

    /// Fraction of the current upload interval that has elapsed for `metric`.
    ///
    /// Measured against `DELAY` from startup until the first attempt, then
    /// against `FREQ` from the last attempt. `None` for disabled targets.
    pub fn progress(&self, metric: Metric, now: Instant) -> Option<f32> {
        let index = metric.index();
        if !self.targets[index].enabled {
            return None;
        }
        let (since, interval) = match self.states[index].last_attempt {
            Some(last) => (last, self.freq),
            None => (self.started_at, self.delay),
        };
        if interval.as_ticks() == 0 {
            return Some(1.0);
        }
        let elapsed = now.saturating_duration_since(since);
        Some((elapsed.as_ticks() as f32 / interval.as_ticks() as f32).clamp(0.0, 1.0))
    }

    /// Number of targets with an upload in flight.
    pub fn in_flight(&self) -> usize {
        self.states
            .iter()
            .filter(|s| s.phase == UploadPhase::Sending)
            .count()
    }

    /// Forget every in-flight upload, counting each as a failure.
    pub fn abandon_in_flight(&mut self) -> usize {
        let mut abandoned = 0;
        for state in self.states.iter_mut().filter(|s| s.phase == UploadPhase::Sending) {
            state.phase = UploadPhase::Idle;
            state.failures += 1;
            abandoned += 1;
        }
        abandoned
    }

    pub fn enabled_count(&self) -> usize {
        self.targets.iter().filter(|t| t.enabled).count()
    }

    /// Upload cycles started so far.
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    pub fn total_successes(&self) -> u32 {
        self.states.iter().map(|s| s.successes).sum()
    }

    /// No new cycle may start. A limit with no enabled target can never
    /// be met, so it counts as reached straight away.
    pub fn limit_reached(&self) -> bool {
        self.max_cycles
            .is_some_and(|max| self.cycles >= max || self.enabled_count() == 0)
    }

    /// The cycle limit was hit and every upload of the last cycle finished.
    pub fn finished(&self) -> bool {
        self.limit_reached() && self.in_flight() == 0
    }
}

fn check_feed<T: Telemetry>(telemetry: &mut T, feed: &str) -> Result<(), &'static str> {
    if feed.is_empty() {
        return Err("no feed configured");
    }
    if !is_valid_feed_key(feed) {
        return Err("not a valid feed key");
    }
    telemetry.validate_feed(feed).map_err(|err| match err {
        UploadError::Invalid => "feed not found or not writable",
        UploadError::RateLimited => "rate limited during validation",
        UploadError::Network => "network error during validation",
        UploadError::Timeout => "validation timed out",
    })
}
