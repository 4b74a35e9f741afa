//! Metric bar graph and upload progress overlay

use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};

use super::frame::MATRIX_SIZE;
use crate::sensors::MetricHistory;
use crate::units::map_range;

/// Low-to-high colour stops for graph bars.
pub const GRAPH_GRADIENT: [Rgb888; 4] = [
    Rgb888::new(0, 0, 255),
    Rgb888::new(0, 255, 0),
    Rgb888::new(255, 255, 0),
    Rgb888::new(255, 0, 0),
];

/// Colour used when every value in the history is equal.
pub const FLAT_COLOR: Rgb888 = Rgb888::new(0, 255, 0);

pub const PROGRESS_COLOR: Rgb888 = Rgb888::new(127, 0, 255);

const ROWS: u32 = MATRIX_SIZE as u32;

/// Bar height in rows for `value`, scaled into `1..=8` against `min..=max`.
///
/// A flat range gives a mid-height bar.
pub fn bar_height(value: f32, min: f32, max: f32) -> u32 {
    if max - min <= f32::EPSILON {
        return ROWS / 2;
    }
    let scaled = map_range(value, min, max, 1.0, ROWS as f32);
    ((scaled + 0.5) as u32).clamp(1, ROWS)
}

/// Gradient colour for `value` within `min..=max`.
pub fn bar_color(value: f32, min: f32, max: f32) -> Rgb888 {
    if max - min <= f32::EPSILON {
        return FLAT_COLOR;
    }
    let segments = (GRAPH_GRADIENT.len() - 1) as f32;
    let position = map_range(value, min, max, 0.0, segments);
    let index = (position as usize).min(GRAPH_GRADIENT.len() - 2);
    let frac = position - index as f32;
    let (from, to) = (GRAPH_GRADIENT[index], GRAPH_GRADIENT[index + 1]);
    Rgb888::new(
        lerp(from.r(), to.r(), frac),
        lerp(from.g(), to.g(), frac),
        lerp(from.b(), to.b(), frac),
    )
}

fn lerp(from: u8, to: u8, frac: f32) -> u8 {
    let value = f32::from(from) + (f32::from(to) - f32::from(from)) * frac;
    (value + 0.5).clamp(0.0, 255.0) as u8
}

/// Draw the newest eight samples of `history` as vertical bars.
///
/// Oldest on the left, newest in the rightmost column. Bars are scaled
/// against the whole history, not just the visible slice.
pub fn draw_history<D, const N: usize>(
    target: &mut D,
    history: &MetricHistory<N>,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb888>,
{
    let Some((min, max)) = history.range() else {
        return Ok(());
    };
    let visible = history.len().min(MATRIX_SIZE);
    let first_column = MATRIX_SIZE - visible;

    for (offset, reading) in history.recent(MATRIX_SIZE).enumerate() {
        let height = bar_height(reading.value, min, max);
        let color = bar_color(reading.value, min, max);
        Rectangle::new(
            Point::new((first_column + offset) as i32, (ROWS - height) as i32),
            Size::new(1, height),
        )
        .into_styled(PrimitiveStyle::with_fill(color))
        .draw(target)?;
    }
    Ok(())
}

/// Light `floor(fraction * 8)` pixels of the bottom row.
pub fn draw_progress<D>(target: &mut D, fraction: f32) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb888>,
{
    let lit = (fraction.clamp(0.0, 1.0) * ROWS as f32) as u32;
    if lit == 0 {
        return Ok(());
    }
    Rectangle::new(Point::new(0, ROWS as i32 - 1), Size::new(lit, 1))
        .into_styled(PrimitiveStyle::with_fill(PROGRESS_COLOR))
        .draw(target)
}
