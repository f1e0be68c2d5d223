//! Bitplane compositor and double-buffered DMA descriptor chains for HUB75
//! LED matrix displays.
//!
//! ## How HUB75 LED Displays Work
//!
//! HUB75 RGB LED matrix panels are scanned, time-multiplexed displays that behave like a long
//! daisy-chained shift register rather than a random-access framebuffer.
//!
//! ### Signal names
//! - **R1 G1 B1 / R2 G2 B2** – Serial colour data for the upper and lower halves of the active scan line
//! - **CLK** – Shift-register clock; every rising edge pushes the six colour bits one pixel to the right
//! - **LAT / STB** – Latch; copies the shift-register contents to the LED drivers for the row currently selected by the address lines
//! - **OE** – Output-Enable (active LOW): LEDs are lit while OE is LOW and blanked when it is HIGH
//! - **A B C D** – Row-address select lines (choose which pair of rows is lit)
//!
//! Every pixel clock carries one 16-bit [`word::TransferWord`] holding all of
//! these signals, so a whole scan of the panel is just a block of words the
//! DMA engine pushes out through a parallel peripheral (I²S, LCD_CAM, PARL_IO).
//!
//! ### Brightness and colour depth (Binary Code Modulation)
//! Colour depth comes from **Binary Code Modulation (BCM)**, also known as
//! *Bit-Angle Modulation (BAM)*: bit `p` of every channel lives in its own
//! *bitplane*, and bitplane `p` is streamed `2^p` times per BCM cycle. See
//! [Batsocks – LED dimming using Binary Code Modulation](https://www.batsocks.co.uk/readme/art_bcm_1.htm)
//! for a deeper explanation. With `BITS` bitplanes a cycle is
//! [`compute_frame_count(BITS)`](compute_frame_count) bitplane scans long.
//!
//! Instead of storing every scan, this crate stores each bitplane once and
//! lets the DMA descriptor chain visit it repeatedly, in an order that spreads
//! the visits of the heavy planes evenly over the cycle to reduce flicker.
//!
//! ## Pipeline
//!
//! 1. Pixel sources draw into a [`framebuffer::FrameBuffer`], either through
//!    [`set_pixel`](framebuffer::FrameBuffer::set_pixel) or
//!    `embedded-graphics`.
//! 2. [`bitplane::compose`] slices the framebuffer into bitplanes, adding
//!    row-select, latch and blanking bits.
//! 3. [`schedule::compute_visitation_order`] fixes which bitplane each BCM
//!    tick shows.
//! 4. [`chain::ChainArena`] lays out two circular descriptor chains, one per
//!    buffer slot, and [`descriptor::DescriptorTable`] materialises them in
//!    the peripheral's descriptor format.
//! 5. [`display::Display`] ties it together: compose into the back slot, then
//!    retarget the loop closure of both chains so the hardware glides into the
//!    new frame without being stopped.
//!
//! ```rust
//! use hub75_bitplane::descriptor::DmaDescriptor;
//! use hub75_bitplane::display::{Config, Display, ParallelOutput};
//! use hub75_bitplane::framebuffer::FrameBuffer;
//! use hub75_bitplane::{compute_frame_count, compute_rows};
//!
//! const ROWS: usize = 32;
//! const COLS: usize = 128;
//! const BITS: u8 = 7;
//! const NROWS: usize = compute_rows(ROWS);
//! const FRAME_COUNT: usize = compute_frame_count(BITS);
//!
//! struct Output;
//!
//! impl ParallelOutput for Output {
//!     fn start(&mut self, _head: &DmaDescriptor) {}
//! }
//!
//! let mut display =
//!     Display::<_, ROWS, COLS, NROWS, BITS, FRAME_COUNT>::new(Config::new(), Output).unwrap();
//! let mut fb = FrameBuffer::<ROWS, COLS>::new();
//! hub75_bitplane::patterns::diagonal(&mut fb);
//! display.commit_frame(&fb);
//! ```
//!
//! ## Available Feature Flags
//!
//! ### `esp-dma` Feature (required when using `esp-hal`)
//! Switches the `ReadBuffer` implementation of [`bitplane::Bitplane`] from
//! `embedded-dma` to `esp-hal::dma`. The chip features `esp32`, `esp32s3` and
//! `esp32c6` enable it along with the matching `esp-hal` chip.
//!
//! ```toml
//! [dependencies]
//! hub75-bitplane = { version = "0.1.0", features = ["esp32s3"] }
//! ```
//!
//! ### `esp32-ordering` Feature (required for original ESP32 only)
//! **Required** when targeting the original ESP32 chip (not ESP32-S3 or other variants).
//! The ESP32's I²S peripheral in 16-bit mode emits the two halves of every 32-bit
//! word swapped, so bitplane words are stored pairwise swapped. Enabled by the
//! `esp32` feature.
//!
//! ### `defmt` Feature
//! Implements `defmt::Format` for the public types and routes the crate's
//! internal logging to `defmt`.
//!
//! ### `log` Feature
//! Routes the crate's internal logging to the `log` facade.
#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

extern crate alloc;

// must come first so the macros are visible to the other modules
#[macro_use]
mod fmt;

pub mod bitplane;
pub mod chain;
pub mod descriptor;
pub mod display;
pub mod error;
pub mod framebuffer;
pub mod patterns;
pub mod schedule;
pub mod word;

use embedded_graphics::pixelcolor::Rgb888;

pub use error::{Error, Result};

/// Color type used in the framebuffer
pub type Color = Rgb888;

/// Computes the NROWS value from ROWS for [`display::Display`]
///
/// # Arguments
///
/// * `rows` - Total number of rows in the display
///
/// # Returns
///
/// Number of rows scanned, two panel rows per scan row
#[must_use]
pub const fn compute_rows(rows: usize) -> usize {
    rows / 2
}

/// Computes the number of BCM ticks for a given bit depth
///
/// This is the length of one BCM cycle: how many bitplane scans the
/// descriptor chain walks before it loops.
///
/// # Arguments
///
/// * `bits` - Number of bits per color channel
///
/// # Returns
///
/// Number of bitplane visits per cycle for the given bit depth
#[must_use]
pub const fn compute_frame_count(bits: u8) -> usize {
    (1usize << bits) - 1
}

/// Computes the size in bytes of one bitplane
///
/// # Arguments
///
/// * `rows` - Total number of rows in the display
/// * `cols` - Number of columns in the display
#[must_use]
pub const fn compute_bitplane_bytes(rows: usize, cols: usize) -> usize {
    compute_rows(rows) * cols * core::mem::size_of::<word::TransferWord>()
}

/// Computes the number of hardware descriptors in one chain
///
/// # Arguments
///
/// * `rows` - Total number of rows in the display
/// * `cols` - Number of columns in the display
/// * `bits` - Number of bits per color channel
/// * `max_transfer` - Largest transfer per descriptor in bytes
#[must_use]
pub const fn compute_descriptor_count(
    rows: usize,
    cols: usize,
    bits: u8,
    max_transfer: usize,
) -> usize {
    compute_frame_count(bits)
        * chain::descriptor_count(compute_bitplane_bytes(rows, cols), max_transfer)
}
