//! Sense HAT joystick via its evdev node.
//!
//! A reader thread blocks on the device and forwards decoded key events
//! through a static channel; the run loop polls that channel without
//! blocking.

use std::ffi::c_long;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use anyhow::Context;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{debug, warn};

use sensemon_core::input::{InputError, InputEvent, InputSource, NoInput};

/// `struct input_event`: a `timeval` followed by type, code and value.
pub const EVENT_SIZE: usize = 2 * size_of::<c_long>() + 8;

const EV_KEY: u16 = 0x01;
const KEY_ENTER: u16 = 28;
const KEY_UP: u16 = 103;
const KEY_LEFT: u16 = 105;
const KEY_RIGHT: u16 = 106;
const KEY_DOWN: u16 = 108;

const QUEUE_DEPTH: usize = 16;

type EventQueue = Channel<CriticalSectionRawMutex, InputEvent, QUEUE_DEPTH>;

static JOYSTICK_EVENTS: EventQueue = Channel::new();

/// Decode one raw `input_event`. Releases and non-key events yield `None`.
pub fn decode_event(buf: &[u8; EVENT_SIZE]) -> Option<InputEvent> {
    let tail = &buf[EVENT_SIZE - 8..];
    let kind = u16::from_ne_bytes([tail[0], tail[1]]);
    let code = u16::from_ne_bytes([tail[2], tail[3]]);
    let value = i32::from_ne_bytes([tail[4], tail[5], tail[6], tail[7]]);

    // 1 = press, 2 = auto-repeat
    if kind != EV_KEY || value == 0 {
        return None;
    }
    match code {
        KEY_UP => Some(InputEvent::Up),
        KEY_DOWN => Some(InputEvent::Down),
        KEY_LEFT => Some(InputEvent::Left),
        KEY_RIGHT => Some(InputEvent::Right),
        KEY_ENTER => Some(InputEvent::Press),
        _ => None,
    }
}

fn pump_events(mut reader: impl Read, queue: &EventQueue, failed: &AtomicBool) {
    let mut buf = [0u8; EVENT_SIZE];
    loop {
        if let Err(err) = reader.read_exact(&mut buf) {
            warn!("Joystick read failed: {err}");
            failed.store(true, Ordering::Release);
            return;
        }
        if let Some(event) = decode_event(&buf)
            && queue.try_send(event).is_err()
        {
            debug!("Joystick queue full, dropping {event:?}");
        }
    }
}

pub struct Joystick {
    events: &'static EventQueue,
    failed: Arc<AtomicBool>,
    reported: bool,
}

impl Joystick {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("cannot open joystick {}", path.display()))?;
        let failed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&failed);
        thread::Builder::new()
            .name("joystick".into())
            .spawn(move || pump_events(file, &JOYSTICK_EVENTS, &flag))
            .context("failed to start joystick reader")?;

        Ok(Self {
            events: &JOYSTICK_EVENTS,
            failed,
            reported: false,
        })
    }
}

impl InputSource for Joystick {
    fn poll_event(&mut self) -> Result<Option<InputEvent>, InputError> {
        if let Ok(event) = self.events.try_receive() {
            return Ok(Some(event));
        }
        // Surface a dead reader once; afterwards the joystick is just quiet.
        if !self.reported && self.failed.load(Ordering::Acquire) {
            self.reported = true;
            return Err(InputError::Io);
        }
        Ok(None)
    }
}

/// Input picked at startup.
pub enum Controls {
    Joystick(Joystick),
    None(NoInput),
}

impl Controls {
    pub fn open(device: Option<&Path>) -> Self {
        match device.map(Joystick::open) {
            Some(Ok(joystick)) => Self::Joystick(joystick),
            Some(Err(err)) => {
                warn!("{err:#}, joystick disabled");
                Self::None(NoInput)
            }
            None => Self::None(NoInput),
        }
    }
}

impl InputSource for Controls {
    fn poll_event(&mut self) -> Result<Option<InputEvent>, InputError> {
        match self {
            Self::Joystick(joystick) => joystick.poll_event(),
            Self::None(none) => none.poll_event(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn raw(kind: u16, code: u16, value: i32) -> [u8; EVENT_SIZE] {
        let mut buf = [0u8; EVENT_SIZE];
        let tail = EVENT_SIZE - 8;
        buf[tail..tail + 2].copy_from_slice(&kind.to_ne_bytes());
        buf[tail + 2..tail + 4].copy_from_slice(&code.to_ne_bytes());
        buf[tail + 4..].copy_from_slice(&value.to_ne_bytes());
        buf
    }

    #[test]
    fn test_event_size_matches_platform() {
        #[cfg(target_pointer_width = "64")]
        assert_eq!(EVENT_SIZE, 24);
        #[cfg(target_pointer_width = "32")]
        assert_eq!(EVENT_SIZE, 16);
    }

    #[test]
    fn test_decode_directions() {
        assert_eq!(decode_event(&raw(EV_KEY, KEY_UP, 1)), Some(InputEvent::Up));
        assert_eq!(decode_event(&raw(EV_KEY, KEY_DOWN, 1)), Some(InputEvent::Down));
        assert_eq!(decode_event(&raw(EV_KEY, KEY_LEFT, 2)), Some(InputEvent::Left));
        assert_eq!(decode_event(&raw(EV_KEY, KEY_RIGHT, 1)), Some(InputEvent::Right));
        assert_eq!(decode_event(&raw(EV_KEY, KEY_ENTER, 1)), Some(InputEvent::Press));
    }

    #[test]
    fn test_ignores_release_and_sync() {
        assert_eq!(decode_event(&raw(EV_KEY, KEY_UP, 0)), None);
        assert_eq!(decode_event(&raw(0, 0, 0)), None);
        assert_eq!(decode_event(&raw(EV_KEY, 30, 1)), None);
    }

    #[test]
    fn test_pump_forwards_until_eof() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&raw(EV_KEY, KEY_LEFT, 1));
        stream.extend_from_slice(&raw(0, 0, 0));
        stream.extend_from_slice(&raw(EV_KEY, KEY_LEFT, 0));
        stream.extend_from_slice(&raw(EV_KEY, KEY_ENTER, 1));

        let queue: &'static EventQueue = Box::leak(Box::new(Channel::new()));
        let failed = Arc::new(AtomicBool::new(false));
        pump_events(Cursor::new(stream), queue, &failed);

        let mut joystick = Joystick {
            events: queue,
            failed,
            reported: false,
        };
        assert_eq!(joystick.poll_event(), Ok(Some(InputEvent::Left)));
        assert_eq!(joystick.poll_event(), Ok(Some(InputEvent::Press)));
        assert_eq!(joystick.poll_event(), Err(InputError::Io));
        assert_eq!(joystick.poll_event(), Ok(None));
    }
}
