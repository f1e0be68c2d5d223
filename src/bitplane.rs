//! Bitplane memory and the compositor that fills it.
//!
//! A bitplane is one 1-bit-per-subpixel rendition of the image, laid out
//! exactly as the parallel output peripheral has to clock it into the panel:
//! `NROWS` rows of `COLS` [`TransferWord`]s, each word carrying one pixel of
//! the upper half and the matching pixel of the lower half.
//!
//! Bitplane `p` out of `n` holds bit `8 - n + p` of every colour channel, so
//! the last bitplane holds the most significant bit and the first one holds
//! the least significant bit that is still displayed.
//!
//! # Memory Layout
//! Each row consists of `COLS` words in shift order:
//! - the address bits name the row *before* the one being shifted in
//! - the blank bit is set for columns `>= brightness`
//! - the latch bit is set on the last column only
//!
//! With the `esp32-ordering` feature the words of each row are stored in
//! swapped pairs, matching the order the original ESP32 I²S peripheral emits
//! 16-bit samples in.

use alloc::boxed::Box;
use alloc::vec::Vec;

use embedded_graphics::pixelcolor::RgbColor;
#[cfg(not(feature = "esp-dma"))]
use embedded_dma::ReadBuffer;
#[cfg(feature = "esp-dma")]
use esp_hal::dma::ReadBuffer;

use crate::framebuffer::FrameBuffer;
use crate::word::TransferWord;
use crate::{Color, Result};

// 16-bit words are output in the order 1, 0, 3, 2, ...
#[cfg(feature = "esp32-ordering")]
#[inline]
pub(crate) const fn map_index(index: usize) -> usize {
    index ^ 1
}

#[cfg(not(feature = "esp32-ordering"))]
#[inline]
pub(crate) const fn map_index(index: usize) -> usize {
    index
}

/// `true` if a row of `cols` words can be stored in the active word order.
///
/// With `esp32-ordering` words are swapped in pairs, which needs an even
/// number of columns.
#[must_use]
pub const fn columns_supported(cols: usize) -> bool {
    !cfg!(feature = "esp32-ordering") || cols % 2 == 0
}

/// One bitplane worth of transfer words for a `(2 * NROWS) × COLS` panel.
///
/// The words live in their own heap block whose address never changes, so a
/// DMA descriptor can keep pointing at it while its contents are rewritten.
pub struct Bitplane<const NROWS: usize, const COLS: usize> {
    words: Box<[TransferWord]>,
}

impl<const NROWS: usize, const COLS: usize> Bitplane<NROWS, COLS> {
    /// Number of transfer words in one bitplane.
    pub const WORDS: usize = NROWS * COLS;

    /// Size of one bitplane in bytes.
    pub const BYTES: usize = Self::WORDS * core::mem::size_of::<TransferWord>();

    /// Allocate a zeroed bitplane.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`](crate::Error::OutOfMemory) if the allocator cannot supply the block.
    pub fn new() -> Result<Self> {
        let mut words = Vec::new();
        words.try_reserve_exact(Self::WORDS)?;
        words.resize(Self::WORDS, TransferWord::new());
        Ok(Self {
            words: words.into_boxed_slice(),
        })
    }

    /// Allocate `count` bitplanes, one heap block each.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`](crate::Error::OutOfMemory) if any block cannot be allocated.
    pub fn new_set(count: usize) -> Result<Vec<Self>> {
        let mut set = Vec::new();
        set.try_reserve_exact(count)?;
        for _ in 0..count {
            set.push(Self::new()?);
        }
        Ok(set)
    }

    /// All words in shift order.
    #[must_use]
    pub fn words(&self) -> &[TransferWord] {
        &self.words
    }

    /// Words for output row `y`, in memory order.
    #[must_use]
    pub fn row(&self, y: usize) -> &[TransferWord] {
        &self.words[y * COLS..(y + 1) * COLS]
    }

    /// Word for column `x` of output row `y`, independent of the memory
    /// ordering in use.
    #[must_use]
    pub fn word(&self, x: usize, y: usize) -> TransferWord {
        self.row(y)[map_index(x)]
    }

    fn row_mut(&mut self, y: usize) -> &mut [TransferWord] {
        &mut self.words[y * COLS..(y + 1) * COLS]
    }

    /// Start address and length in bytes of the block, as the DMA engine
    /// sees it.
    #[must_use]
    pub fn dma_block(&self) -> (*const u8, usize) {
        // SAFETY: the block is owned by `self` and is only handed to the
        // DMA engine as a read-only source.
        let (ptr, len) = unsafe { self.read_buffer() };
        #[cfg(not(feature = "esp-dma"))]
        let len = len * core::mem::size_of::<TransferWord>();
        (ptr.cast::<u8>(), len)
    }
}

impl<const NROWS: usize, const COLS: usize> core::fmt::Debug for Bitplane<NROWS, COLS> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Bitplane")
            .field("rows", &NROWS)
            .field("cols", &COLS)
            .field("size", &Self::BYTES)
            .finish()
    }
}

#[cfg(feature = "defmt")]
impl<const NROWS: usize, const COLS: usize> defmt::Format for Bitplane<NROWS, COLS> {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Bitplane<{}, {}>", NROWS, COLS);
        defmt::write!(f, " size: {}", Self::BYTES);
    }
}

unsafe impl<const NROWS: usize, const COLS: usize> ReadBuffer for Bitplane<NROWS, COLS> {
    #[cfg(not(feature = "esp-dma"))]
    type Word = u16;

    #[cfg(not(feature = "esp-dma"))]
    unsafe fn read_buffer(&self) -> (*const u16, usize) {
        // TransferWord is a transparent u16
        (self.words.as_ptr().cast::<u16>(), self.words.len())
    }

    #[cfg(feature = "esp-dma")]
    unsafe fn read_buffer(&self) -> (*const u8, usize) {
        let ptr = self.words.as_ptr().cast::<u8>();
        let len = core::mem::size_of_val(&*self.words);
        (ptr, len)
    }
}

/// Output blanking threshold: columns at or past it are shifted with the LEDs
/// off, which dims the whole panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Brightness(usize);

impl Brightness {
    /// Brightness used when nothing else is configured.
    pub const DEFAULT: Self = Self(16);

    /// Create a brightness threshold. Zero would blank every column and is
    /// clamped to one; values `>= COLS` disable blanking entirely.
    #[must_use]
    pub const fn new(value: usize) -> Self {
        if value == 0 {
            Self(1)
        } else {
            Self(value)
        }
    }

    /// The threshold column.
    #[must_use]
    pub const fn value(self) -> usize {
        self.0
    }
}

impl Default for Brightness {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Compose `framebuffer` into `planes`, one bitplane per displayed bit.
///
/// `planes.len()` is the bit depth: plane `p` receives bit
/// `8 - planes.len() + p` of every channel.
///
/// # Panics
///
/// In debug builds, if `planes` is empty, has more than 8 entries,
/// `ROWS != 2 * NROWS`, or `COLS` is odd with `esp32-ordering`.
pub fn compose<const ROWS: usize, const COLS: usize, const NROWS: usize>(
    framebuffer: &FrameBuffer<ROWS, COLS>,
    planes: &mut [Bitplane<NROWS, COLS>],
    brightness: Brightness,
) {
    debug_assert!(
        (1..=8).contains(&planes.len()),
        "bitplane count must be between 1 and 8"
    );
    debug_assert_eq!(ROWS, 2 * NROWS, "bitplanes must cover half the panel");
    debug_assert!(
        columns_supported(COLS),
        "esp32-ordering needs an even number of columns"
    );

    let first_bit = 8 - planes.len();
    for (p, plane) in planes.iter_mut().enumerate() {
        let mask = 1u8 << (first_bit + p);
        for y in 0..NROWS {
            let upper = framebuffer.row(y);
            let lower = framebuffer.row(y + NROWS);
            let template = TransferWord::for_row(y);
            let row = plane.row_mut(y);
            for x in 0..COLS {
                let mut word = template;
                // keep the LEDs dark while address lines change and for dimming
                word.set_blank(x >= brightness.value());
                word.set_latch(x == COLS - 1);
                let (r, g, b) = bits(upper[x], mask);
                word.set_color0(r, g, b);
                let (r, g, b) = bits(lower[x], mask);
                word.set_color1(r, g, b);
                row[map_index(x)] = word;
            }
        }
    }
}

#[inline]
fn bits(color: Color, mask: u8) -> (bool, bool, bool) {
    (
        color.r() & mask != 0,
        color.g() & mask != 0,
        color.b() & mask != 0,
    )
}
