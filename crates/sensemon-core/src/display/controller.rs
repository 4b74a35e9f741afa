//! Display state machine and frame rendering

use embassy_time::{Duration, Instant};
use log::{debug, info};

use super::graph::{draw_history, draw_progress};
use super::{DisplayMode, DisplayState, LedFrame, LedMatrix, Rotation, Sparkle};
use crate::config::Settings;
use crate::rng::SparkleRng;
use crate::sensors::MetricHistory;

/// Owns the display state and the logical frame.
///
/// Rendering only happens while the display is powered and not blanked.
/// When it stops rendering the matrix is cleared once, and a full frame is
/// pushed again as soon as it comes back.
pub struct DisplayController {
    state: DisplayState,
    frame: LedFrame,
    sparkle: Sparkle,
    sleep: Option<Duration>,
    progress: bool,
    /// Mode the frame was last rendered in.
    rendered: DisplayMode,
    /// Mode and rotation of the last frame pushed to the matrix.
    shown: Option<(DisplayMode, Rotation)>,
    dark: bool,
}

impl DisplayController {
    pub fn new(settings: &Settings, now: Instant, rng: SparkleRng) -> Self {
        Self {
            state: DisplayState::new(settings, now),
            frame: LedFrame::new(),
            sparkle: Sparkle::new(rng),
            sleep: settings.sleep_timeout(),
            progress: settings.progress,
            rendered: settings.display,
            shown: None,
            dark: false,
        }
    }

    pub fn state(&self) -> &DisplayState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut DisplayState {
        &mut self.state
    }

    pub fn frame(&self) -> &LedFrame {
        &self.frame
    }

    /// Instant at which the inactivity timer blanks the display.
    pub fn sleep_deadline(&self) -> Option<Instant> {
        self.state.sleep_deadline(self.sleep)
    }

    /// Render one frame and push it to `matrix` if anything changed.
    ///
    /// `history` and `progress` belong to the metric of the current mode and
    /// are ignored in sparkle mode.
    pub fn refresh<M: LedMatrix>(
        &mut self,
        now: Instant,
        history: Option<&MetricHistory>,
        progress: Option<f32>,
        matrix: &mut M,
    ) {
        if self.state.update_sleep(now, self.sleep) {
            info!("Display asleep after inactivity");
        }

        if !self.state.is_rendering() {
            if !self.dark {
                if let Err(err) = matrix.clear() {
                    debug!("Failed to clear LED matrix: {err}");
                }
                self.dark = true;
                self.shown = None;
            }
            return;
        }
        self.dark = false;

        let mode = self.state.mode;
        match mode.metric() {
            None => {
                if self.rendered != DisplayMode::Sparkle {
                    self.frame.blank();
                }
                self.sparkle.tick(&mut self.frame);
            }
            Some(_) => {
                let mut next = LedFrame::new();
                if let Some(history) = history {
                    let _ = draw_history(&mut next, history);
                }
                if self.progress
                    && let Some(fraction) = progress
                {
                    let _ = draw_progress(&mut next, fraction);
                }
                self.frame.copy_from(&next);
            }
        }
        self.rendered = mode;

        let current = (mode, self.state.rotation);
        if !self.frame.is_dirty() && self.shown == Some(current) {
            return;
        }
        match matrix.write(&self.frame, self.state.rotation) {
            Ok(()) => {
                self.frame.mark_clean();
                self.shown = Some(current);
            }
            Err(err) => debug!("Skipping LED frame: {err}"),
        }
    }
}
