//! Test patterns for bringing up a panel.
//!
//! Both patterns draw white on black, which makes row-select or column
//! ordering mistakes easy to spot.

use embedded_graphics::pixelcolor::RgbColor;

use crate::framebuffer::FrameBuffer;
use crate::Color;

/// Diagonal lines: white wherever `x` and `y` are congruent modulo `ROWS`,
/// black elsewhere.
///
/// The difference is reduced with a true (euclidean) modulo, so each row has
/// exactly one lit pixel per `ROWS` columns for any panel height. Wrapping
/// unsigned subtraction would only agree with this for power-of-two heights.
pub fn diagonal<const ROWS: usize, const COLS: usize>(framebuffer: &mut FrameBuffer<ROWS, COLS>) {
    for y in 0..ROWS {
        for x in 0..COLS {
            let lit = (x as isize - y as isize).rem_euclid(ROWS as isize) == 0;
            framebuffer.set_color(x, y, if lit { Color::WHITE } else { Color::BLACK });
        }
    }
}

/// Stripes one pixel wide, every `width` pixels, shifted by `offset`.
///
/// With `vertical` the stripes are columns where `(x + offset) mod width == 0`,
/// otherwise rows where `(y + offset) mod width == 0`. A `width` of zero
/// draws nothing but black.
pub fn stripes<const ROWS: usize, const COLS: usize>(
    framebuffer: &mut FrameBuffer<ROWS, COLS>,
    width: usize,
    offset: usize,
    vertical: bool,
) {
    for y in 0..ROWS {
        for x in 0..COLS {
            let var = if vertical { x } else { y };
            let lit = width != 0 && (var + offset) % width == 0;
            framebuffer.set_color(x, y, if lit { Color::WHITE } else { Color::BLACK });
        }
    }
}
