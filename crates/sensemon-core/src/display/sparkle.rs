//! Sparkle heartbeat animation

use embedded_graphics::pixelcolor::Rgb888;
use rand_core::RngCore;

use super::frame::{LedFrame, MATRIX_SIZE};
use crate::rng::SparkleRng;

/// Random pixels that pile up until the frame is wiped.
///
/// Each tick lights one random pixel with a random colour three times out of
/// four and clears the whole frame otherwise.
pub struct Sparkle {
    rng: SparkleRng,
}

impl Sparkle {
    pub fn new(rng: SparkleRng) -> Self {
        Self { rng }
    }

    pub fn tick(&mut self, frame: &mut LedFrame) {
        if self.rng.chance(3, 4) {
            let x = self.rng.below(MATRIX_SIZE as u32) as usize;
            let y = self.rng.below(MATRIX_SIZE as u32) as usize;
            let [r, g, b, _] = self.rng.next_u32().to_le_bytes();
            frame.set(x, y, Rgb888::new(r, g, b));
        } else {
            frame.blank();
        }
    }
}
