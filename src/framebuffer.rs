//! Caller-owned RGB888 image that gets composed into bitplanes.
//!
//! The framebuffer is a plain row-major array of 24-bit pixels. Pixel sources
//! write into it freely and hand it to
//! [`Display::commit_frame`](crate::display::Display::commit_frame) once a
//! frame is complete; the compositor only ever reads it, so there is nothing
//! to synchronise.
//!
//! # Example
//! ```rust
//! use embedded_graphics::prelude::*;
//! use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
//! use hub75_bitplane::framebuffer::FrameBuffer;
//! use hub75_bitplane::Color;
//!
//! let mut fb = FrameBuffer::<32, 64>::new();
//! fb.set_pixel(3, 4, 0x00FF_8000);
//! assert_eq!(fb.pixel(3, 4), Color::new(0xFF, 0x80, 0x00));
//!
//! Rectangle::new(Point::new(10, 10), Size::new(4, 4))
//!     .into_styled(PrimitiveStyle::with_fill(Color::BLUE))
//!     .draw(&mut fb)
//!     .unwrap();
//! ```

use core::convert::Infallible;

use embedded_graphics::pixelcolor::RgbColor;
use embedded_graphics::prelude::{OriginDimensions, Point, Size};

use crate::Color;

/// Unpack a `0x00RRGGBB` value into a [`Color`]. The top byte is ignored.
#[must_use]
pub const fn unpack_rgb(packed: u32) -> Color {
    Color::new((packed >> 16) as u8, (packed >> 8) as u8, packed as u8)
}

/// Pack a [`Color`] into `0x00RRGGBB`.
#[must_use]
pub fn pack_rgb(color: Color) -> u32 {
    (u32::from(color.r()) << 16) | (u32::from(color.g()) << 8) | u32::from(color.b())
}

/// Row-major `ROWS × COLS` RGB888 image.
#[derive(Clone, PartialEq, Eq)]
pub struct FrameBuffer<const ROWS: usize, const COLS: usize> {
    pixels: [[Color; COLS]; ROWS],
}

impl<const ROWS: usize, const COLS: usize> Default for FrameBuffer<ROWS, COLS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const ROWS: usize, const COLS: usize> FrameBuffer<ROWS, COLS> {
    /// Create an all-black framebuffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pixels: [[Color::BLACK; COLS]; ROWS],
        }
    }

    /// Set the pixel at `(x, y)` from a packed `0x00RRGGBB` value.
    /// Coordinates outside the panel are ignored.
    pub fn set_pixel(&mut self, x: usize, y: usize, packed_rgb: u32) {
        self.set_color(x, y, unpack_rgb(packed_rgb));
    }

    /// Set the pixel at `(x, y)`. Coordinates outside the panel are ignored.
    pub fn set_color(&mut self, x: usize, y: usize, color: Color) {
        if x >= COLS || y >= ROWS {
            return;
        }
        self.pixels[y][x] = color;
    }

    /// Pixel at `(x, y)`.
    ///
    /// # Panics
    ///
    /// If `(x, y)` lies outside the panel.
    #[must_use]
    pub fn pixel(&self, x: usize, y: usize) -> Color {
        self.pixels[y][x]
    }

    /// One row of pixels.
    #[must_use]
    pub fn row(&self, y: usize) -> &[Color; COLS] {
        &self.pixels[y]
    }

    /// Set every pixel to `color`.
    pub fn fill(&mut self, color: Color) {
        for row in &mut self.pixels {
            row.fill(color);
        }
    }

    /// Set every pixel to black.
    pub fn clear(&mut self) {
        self.fill(Color::BLACK);
    }
}

impl<const ROWS: usize, const COLS: usize> core::fmt::Debug for FrameBuffer<ROWS, COLS> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("rows", &ROWS)
            .field("cols", &COLS)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "defmt")]
impl<const ROWS: usize, const COLS: usize> defmt::Format for FrameBuffer<ROWS, COLS> {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "FrameBuffer<{}, {}>", ROWS, COLS);
    }
}

impl<const ROWS: usize, const COLS: usize> OriginDimensions for FrameBuffer<ROWS, COLS> {
    fn size(&self) -> Size {
        Size::new(COLS as u32, ROWS as u32)
    }
}

impl<const ROWS: usize, const COLS: usize> embedded_graphics::draw_target::DrawTarget
    for FrameBuffer<ROWS, COLS>
{
    type Color = Color;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = embedded_graphics::Pixel<Self::Color>>,
    {
        for embedded_graphics::Pixel(Point { x, y }, color) in pixels {
            if x < 0 || y < 0 {
                continue;
            }
            self.set_color(x as usize, y as usize, color);
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.fill(color);
        Ok(())
    }
}
