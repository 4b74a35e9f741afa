//! 8x8 frame buffer with change tracking.
//!
//! All matrix rendering targets this buffer through `embedded-graphics`.
//! The controller only pushes a frame to the matrix when a pixel actually
//! changed since the last push.

use core::convert::Infallible;

use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::mono_font::ascii::FONT_4X6;
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use embedded_graphics::text::{Baseline, Text};

use super::Rotation;

/// Edge length of the LED matrix.
pub const MATRIX_SIZE: usize = 8;

const PIXEL_COUNT: usize = MATRIX_SIZE * MATRIX_SIZE;
const LAST: usize = MATRIX_SIZE - 1;

/// Upright 8x8 RGB frame implementing `DrawTarget<Color = Rgb888>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedFrame {
    pixels: [Rgb888; PIXEL_COUNT],
    dirty: bool,
}

impl Default for LedFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl LedFrame {
    /// A frame with every pixel off.
    pub const fn new() -> Self {
        Self {
            pixels: [Rgb888::BLACK; PIXEL_COUNT],
            dirty: false,
        }
    }

    /// Render `text` starting at the top-left corner, clipped to the matrix.
    pub fn with_text(text: &str, color: Rgb888) -> Self {
        let mut frame = Self::new();
        let style = MonoTextStyle::new(&FONT_4X6, color);
        let _ = Text::with_baseline(text, Point::new(0, 1), style, Baseline::Top).draw(&mut frame);
        frame
    }

    /// Write a single pixel, marking the frame dirty only if the color changed.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, color: Rgb888) {
        if x >= MATRIX_SIZE || y >= MATRIX_SIZE {
            return;
        }
        let idx = y * MATRIX_SIZE + x;
        if self.pixels[idx] != color {
            self.pixels[idx] = color;
            self.dirty = true;
        }
    }

    pub fn get(&self, x: usize, y: usize) -> Option<Rgb888> {
        (x < MATRIX_SIZE && y < MATRIX_SIZE).then(|| self.pixels[y * MATRIX_SIZE + x])
    }

    /// Turn every pixel off.
    pub fn blank(&mut self) {
        for idx in 0..PIXEL_COUNT {
            self.set(idx % MATRIX_SIZE, idx / MATRIX_SIZE, Rgb888::BLACK);
        }
    }

    /// Overwrite this frame with `other`, tracking changes pixel by pixel.
    pub fn copy_from(&mut self, other: &LedFrame) {
        for (idx, color) in other.pixels.iter().enumerate() {
            self.set(idx % MATRIX_SIZE, idx / MATRIX_SIZE, *color);
        }
    }

    /// Row-major pixels, top-left first.
    pub fn pixels(&self) -> &[Rgb888; PIXEL_COUNT] {
        &self.pixels
    }

    pub fn lit_count(&self) -> usize {
        self.pixels.iter().filter(|p| **p != Rgb888::BLACK).count()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Mark the current content as pushed to the matrix.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Copy of this frame turned clockwise by `rotation`.
    ///
    /// Matrix drivers call this right before pushing pixels out. The
    /// logical frame held by the controller is never rotated.
    pub fn rotated(&self, rotation: Rotation) -> Self {
        let mut out = Self::new();
        for y in 0..MATRIX_SIZE {
            for x in 0..MATRIX_SIZE {
                let (dx, dy) = match rotation {
                    Rotation::R0 => (x, y),
                    Rotation::R90 => (LAST - y, x),
                    Rotation::R180 => (LAST - x, LAST - y),
                    Rotation::R270 => (y, LAST - x),
                };
                out.pixels[dy * MATRIX_SIZE + dx] = self.pixels[y * MATRIX_SIZE + x];
            }
        }
        out.dirty = self.dirty;
        out
    }
}

impl OriginDimensions for LedFrame {
    fn size(&self) -> Size {
        Size::new(MATRIX_SIZE as u32, MATRIX_SIZE as u32)
    }
}

impl DrawTarget for LedFrame {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(coord, color) in pixels {
            if coord.x >= 0 && coord.y >= 0 {
                self.set(coord.x as usize, coord.y as usize, color);
            }
        }
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        let x_start = (area.top_left.x.max(0) as usize).min(MATRIX_SIZE);
        let y_start = (area.top_left.y.max(0) as usize).min(MATRIX_SIZE);
        let x_end = (area.top_left.x.max(0) as usize)
            .saturating_add(area.size.width as usize)
            .min(MATRIX_SIZE);
        let y_end = (area.top_left.y.max(0) as usize)
            .saturating_add(area.size.height as usize)
            .min(MATRIX_SIZE);

        for y in y_start..y_end {
            for x in x_start..x_end {
                self.set(x, y, color);
            }
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        for idx in 0..PIXEL_COUNT {
            self.set(idx % MATRIX_SIZE, idx / MATRIX_SIZE, color);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::primitives::PrimitiveStyle;

    fn marked() -> LedFrame {
        let mut frame = LedFrame::new();
        frame.set(0, 0, Rgb888::RED);
        frame.set(3, 1, Rgb888::GREEN);
        frame.set(7, 6, Rgb888::BLUE);
        frame
    }

    #[test]
    fn test_set_marks_dirty_only_on_change() {
        let mut frame = LedFrame::new();
        frame.set(2, 2, Rgb888::BLACK);
        assert!(!frame.is_dirty());
        frame.set(2, 2, Rgb888::WHITE);
        assert!(frame.is_dirty());
        frame.mark_clean();
        frame.set(2, 2, Rgb888::WHITE);
        assert!(!frame.is_dirty());
    }

    #[test]
    fn test_copy_from_same_content_stays_clean() {
        let mut frame = marked();
        frame.mark_clean();
        frame.copy_from(&marked());
        assert!(!frame.is_dirty());
        frame.copy_from(&LedFrame::new());
        assert!(frame.is_dirty());
        assert_eq!(frame.lit_count(), 0);
    }

    #[test]
    fn test_out_of_bounds_ignored() {
        let mut frame = LedFrame::new();
        frame.set(8, 0, Rgb888::WHITE);
        frame.set(0, 8, Rgb888::WHITE);
        assert_eq!(frame.lit_count(), 0);
        assert_eq!(frame.get(8, 8), None);
    }

    #[test]
    fn test_rotate_quarter_turn_clockwise() {
        let frame = marked();
        let turned = frame.rotated(Rotation::R90);
        // Top-left moves to top-right on a clockwise turn.
        assert_eq!(turned.get(7, 0), Some(Rgb888::RED));
        assert_eq!(turned.get(6, 3), Some(Rgb888::GREEN));
        assert_eq!(turned.get(1, 7), Some(Rgb888::BLUE));
    }

    #[test]
    fn test_four_quarter_turns_restore_frame() {
        let frame = marked();
        let mut turned = frame.clone();
        for _ in 0..4 {
            turned = turned.rotated(Rotation::R90);
        }
        assert_eq!(turned.pixels(), frame.pixels());
        assert_eq!(
            frame.rotated(Rotation::R90).rotated(Rotation::R270).pixels(),
            frame.pixels()
        );
        assert_eq!(
            frame.rotated(Rotation::R180).rotated(Rotation::R180).pixels(),
            frame.pixels()
        );
    }

    #[test]
    fn test_rotation_preserves_content() {
        let frame = marked();
        for rotation in Rotation::ALL {
            assert_eq!(frame.rotated(rotation).lit_count(), frame.lit_count());
        }
    }

    #[test]
    fn test_draw_target_clips_rectangles() {
        let mut frame = LedFrame::new();
        Rectangle::new(Point::new(6, 6), Size::new(5, 5))
            .into_styled(PrimitiveStyle::with_fill(Rgb888::RED))
            .draw(&mut frame)
            .unwrap();
        assert_eq!(frame.lit_count(), 4);
    }

    #[test]
    fn test_text_lights_pixels() {
        let frame = LedFrame::with_text("Hi", Rgb888::WHITE);
        assert!(frame.lit_count() > 0);
    }
}
