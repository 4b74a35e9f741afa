//! Sense HAT LED matrix output.
//!
//! The HAT exposes its 8x8 panel as a framebuffer (`/dev/fbN`) holding 64
//! little-endian RGB565 pixels in row-major order.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use embedded_graphics::pixelcolor::{IntoStorage, Rgb565, Rgb888};
use embedded_graphics::prelude::*;
use log::{debug, warn};

use sensemon_core::display::{DisplayError, LedFrame, LedMatrix, MATRIX_SIZE};
use sensemon_core::Rotation;

pub const FRAME_BYTES: usize = MATRIX_SIZE * MATRIX_SIZE * 2;

/// Encode `frame` as the framebuffer expects it.
pub fn encode_rgb565(frame: &LedFrame) -> [u8; FRAME_BYTES] {
    let mut bytes = [0u8; FRAME_BYTES];
    for (chunk, pixel) in bytes.chunks_exact_mut(2).zip(frame.pixels()) {
        let raw: u16 = Rgb565::from(*pixel).into_storage();
        chunk.copy_from_slice(&raw.to_le_bytes());
    }
    bytes
}

pub struct FramebufferMatrix {
    path: PathBuf,
    file: Option<File>,
}

impl FramebufferMatrix {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            file: None,
        }
    }

    fn push(&mut self, frame: &LedFrame) -> Result<(), DisplayError> {
        let bytes = encode_rgb565(frame);
        if self.file.is_none() {
            let file = OpenOptions::new().write(true).open(&self.path).map_err(|err| {
                debug!("Cannot open {}: {err}", self.path.display());
                DisplayError::Io
            })?;
            self.file = Some(file);
        }
        let Some(file) = self.file.as_mut() else {
            return Err(DisplayError::Io);
        };

        if let Err(err) = write_frame(file, &bytes) {
            debug!("Write to {} failed: {err}", self.path.display());
            // Reopen on the next frame in case the device came back.
            self.file = None;
            return Err(DisplayError::Io);
        }
        Ok(())
    }
}

fn write_frame(file: &mut File, bytes: &[u8]) -> io::Result<()> {
    file.seek(SeekFrom::Start(0))?;
    file.write_all(bytes)?;
    file.flush()
}

impl LedMatrix for FramebufferMatrix {
    fn write(&mut self, frame: &LedFrame, rotation: Rotation) -> Result<(), DisplayError> {
        self.push(&frame.rotated(rotation))
    }

    fn write_text(&mut self, text: &str) -> Result<(), DisplayError> {
        self.push(&LedFrame::with_text(text, Rgb888::WHITE))
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        self.push(&LedFrame::new())
    }
}

/// LED output picked at startup.
pub enum Matrix {
    Framebuffer(FramebufferMatrix),
    /// No panel attached; frames only reach the console.
    Headless,
}

impl Matrix {
    pub fn open(device: Option<&Path>) -> Self {
        match device {
            Some(path) => {
                if !path.exists() {
                    warn!("LED device {} not found, frames will be dropped", path.display());
                }
                Self::Framebuffer(FramebufferMatrix::new(path))
            }
            None => Self::Headless,
        }
    }
}

impl LedMatrix for Matrix {
    fn write(&mut self, frame: &LedFrame, rotation: Rotation) -> Result<(), DisplayError> {
        match self {
            Self::Framebuffer(fb) => fb.write(frame, rotation),
            Self::Headless => Ok(()),
        }
    }

    fn write_text(&mut self, text: &str) -> Result<(), DisplayError> {
        match self {
            Self::Framebuffer(fb) => fb.write_text(text),
            Self::Headless => Ok(()),
        }
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        match self {
            Self::Framebuffer(fb) => fb.clear(),
            Self::Headless => Ok(()),
        }
    }
}
