//! Joystick input handling
//!
//! Events come from an [`InputSource`] that never blocks. The
//! [`InputDispatcher`] debounces them and applies them to the
//! [`DisplayState`].

use embassy_time::{Duration, Instant};
use log::debug;
use thiserror_no_std::Error;

use crate::display::{DisplayMode, DisplayState, Rotation};

pub const DEBOUNCE_MS: u64 = 150;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputError {
    #[error("input device read failed")]
    Io,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Up,
    Down,
    Left,
    Right,
    Press,
}

impl InputEvent {
    const fn index(self) -> usize {
        match self {
            Self::Up => 0,
            Self::Down => 1,
            Self::Left => 2,
            Self::Right => 3,
            Self::Press => 4,
        }
    }
}

/// Non-blocking source of joystick events.
pub trait InputSource {
    /// The next pending event, or `None` if nothing is queued.
    fn poll_event(&mut self) -> Result<Option<InputEvent>, InputError>;
}

/// A source that never produces events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInput;

impl InputSource for NoInput {
    fn poll_event(&mut self) -> Result<Option<InputEvent>, InputError> {
        Ok(None)
    }
}

/// What an accepted event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    /// The display was blanked; the event only woke it.
    Woke,
    ModeChanged(DisplayMode),
    Rotated(Rotation),
    PowerToggled(bool),
}

/// Drops repeats of the same event kind inside the debounce window.
#[derive(Debug, Default, Clone)]
pub struct Debouncer {
    last: [Option<Instant>; 5],
}

impl Debouncer {
    pub fn accept(&mut self, event: InputEvent, now: Instant) -> bool {
        let slot = &mut self.last[event.index()];
        if let Some(last) = *slot
            && now.saturating_duration_since(last) < Duration::from_millis(DEBOUNCE_MS)
        {
            return false;
        }
        *slot = Some(now);
        true
    }
}

#[derive(Debug, Default, Clone)]
pub struct InputDispatcher {
    debouncer: Debouncer,
}

impl InputDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `event` to `state`.
    ///
    /// Any accepted event counts as interaction. While blanked the event
    /// only wakes the display and changes nothing else.
    pub fn dispatch(
        &mut self,
        event: InputEvent,
        now: Instant,
        state: &mut DisplayState,
    ) -> Option<InputOutcome> {
        if !self.debouncer.accept(event, now) {
            debug!("Debounced {event:?}");
            return None;
        }

        state.last_interaction = now;
        if state.blanked {
            state.blanked = false;
            return Some(InputOutcome::Woke);
        }

        let outcome = match event {
            InputEvent::Left => {
                state.mode = state.mode.previous();
                InputOutcome::ModeChanged(state.mode)
            }
            InputEvent::Right => {
                state.mode = state.mode.next();
                InputOutcome::ModeChanged(state.mode)
            }
            InputEvent::Up => {
                state.rotation = state.rotation.previous();
                InputOutcome::Rotated(state.rotation)
            }
            InputEvent::Down => {
                state.rotation = state.rotation.next();
                InputOutcome::Rotated(state.rotation)
            }
            InputEvent::Press => {
                state.powered = !state.powered;
                InputOutcome::PowerToggled(state.powered)
            }
        };
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    fn state() -> DisplayState {
        DisplayState::new(&Settings::default(), Instant::from_secs(0))
    }

    #[test]
    fn test_left_right_cycle_modes() {
        let mut dispatcher = InputDispatcher::new();
        let mut state = state();

        let outcome = dispatcher.dispatch(InputEvent::Right, Instant::from_secs(1), &mut state);
        assert_eq!(outcome, Some(InputOutcome::ModeChanged(DisplayMode::Temperature)));

        let outcome = dispatcher.dispatch(InputEvent::Left, Instant::from_secs(2), &mut state);
        assert_eq!(outcome, Some(InputOutcome::ModeChanged(DisplayMode::Sparkle)));

        dispatcher.dispatch(InputEvent::Left, Instant::from_secs(3), &mut state);
        assert_eq!(state.mode, DisplayMode::Humidity);
    }

    #[test]
    fn test_up_down_cycle_rotation() {
        let mut dispatcher = InputDispatcher::new();
        let mut state = state();

        dispatcher.dispatch(InputEvent::Down, Instant::from_secs(1), &mut state);
        assert_eq!(state.rotation, Rotation::R90);
        dispatcher.dispatch(InputEvent::Up, Instant::from_secs(2), &mut state);
        dispatcher.dispatch(InputEvent::Up, Instant::from_secs(3), &mut state);
        assert_eq!(state.rotation, Rotation::R270);
    }

    #[test]
    fn test_press_toggles_power() {
        let mut dispatcher = InputDispatcher::new();
        let mut state = state();

        assert_eq!(
            dispatcher.dispatch(InputEvent::Press, Instant::from_secs(1), &mut state),
            Some(InputOutcome::PowerToggled(false))
        );
        assert_eq!(
            dispatcher.dispatch(InputEvent::Press, Instant::from_secs(2), &mut state),
            Some(InputOutcome::PowerToggled(true))
        );
    }

    #[test]
    fn test_event_while_blanked_only_wakes() {
        let mut dispatcher = InputDispatcher::new();
        let mut state = state();
        state.blanked = true;

        let outcome = dispatcher.dispatch(InputEvent::Right, Instant::from_secs(700), &mut state);
        assert_eq!(outcome, Some(InputOutcome::Woke));
        assert!(!state.blanked);
        assert_eq!(state.mode, DisplayMode::Sparkle);
        assert_eq!(state.last_interaction, Instant::from_secs(700));
    }

    #[test]
    fn test_repeats_inside_window_dropped() {
        let mut dispatcher = InputDispatcher::new();
        let mut state = state();
        let t0 = Instant::from_millis(1_000);

        assert!(dispatcher.dispatch(InputEvent::Right, t0, &mut state).is_some());
        assert!(
            dispatcher
                .dispatch(InputEvent::Right, Instant::from_millis(1_100), &mut state)
                .is_none()
        );
        // A different kind is not affected.
        assert!(
            dispatcher
                .dispatch(InputEvent::Down, Instant::from_millis(1_100), &mut state)
                .is_some()
        );
        assert!(
            dispatcher
                .dispatch(InputEvent::Right, Instant::from_millis(1_150), &mut state)
                .is_some()
        );
        assert_eq!(state.mode, DisplayMode::Pressure);
    }
}
