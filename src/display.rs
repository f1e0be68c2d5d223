//! The double-buffered BCM pipeline.
//!
//! [`Display`] owns everything the DMA engine reads: two sets of bitplanes
//! (slot A and slot B), the two circular descriptor chains over them and the
//! peripheral that streams them. Software composes into the *back* slot
//! while the hardware keeps looping over the front one, then flips:
//!
//! 1. [`Display::compose`] writes the framebuffer into the back slot's
//!    bitplanes. The chains over the front slot never reference that memory.
//! 2. [`Display::flip`] points the tails of *both* chains at the back slot's
//!    head. Whichever chain is live finishes its pass and continues into
//!    the new one, so at most one stale BCM cycle is shown.
//! 3. The slots swap roles.
//!
//! [`Display::commit_frame`] does all three. Committing again before the
//! previous flip took effect simply overwrites the pending frame; there is no
//! queue.
//!
//! # Example
//! ```rust
//! use hub75_bitplane::descriptor::DmaDescriptor;
//! use hub75_bitplane::display::{Config, Display, ParallelOutput};
//! use hub75_bitplane::framebuffer::FrameBuffer;
//! use hub75_bitplane::{compute_frame_count, compute_rows};
//!
//! const ROWS: usize = 32;
//! const COLS: usize = 64;
//! const BITS: u8 = 4;
//! const NROWS: usize = compute_rows(ROWS);
//! const FRAME_COUNT: usize = compute_frame_count(BITS);
//!
//! struct I2sOutput;
//!
//! impl ParallelOutput for I2sOutput {
//!     fn start(&mut self, head: &DmaDescriptor) {
//!         // program the peripheral's out-link with `head` and start it
//!         let _ = head;
//!     }
//! }
//!
//! let mut display =
//!     Display::<_, ROWS, COLS, NROWS, BITS, FRAME_COUNT>::new(Config::new(), I2sOutput)
//!         .unwrap();
//!
//! let mut fb = FrameBuffer::<ROWS, COLS>::new();
//! fb.set_pixel(1, 2, 0x00FF_0000);
//! display.commit_frame(&fb);
//! ```

use alloc::vec::Vec;

use crate::bitplane::{self, Bitplane, Brightness};
use crate::chain::{ChainArena, Slot};
use crate::descriptor::{DescriptorTable, DmaDescriptor, DMA_MAX};
use crate::framebuffer::FrameBuffer;
use crate::schedule::{compute_visitation_order, MAX_BITPLANES};
use crate::{compute_frame_count, Result};

/// The parallel output peripheral, as far as the pipeline is concerned.
///
/// Register programming, clocking and pin routing stay with the implementor.
pub trait ParallelOutput {
    /// Start streaming the descriptor chain that begins at `head`, following
    /// `next` links indefinitely.
    fn start(&mut self, head: &DmaDescriptor);
}

impl<T: ParallelOutput + ?Sized> ParallelOutput for &mut T {
    fn start(&mut self, head: &DmaDescriptor) {
        (**self).start(head);
    }
}

/// Runtime settings for a [`Display`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    brightness: Brightness,
    max_transfer: usize,
}

impl Config {
    /// Brightness 16 and [`DMA_MAX`] bytes per descriptor.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            brightness: Brightness::DEFAULT,
            max_transfer: DMA_MAX,
        }
    }

    /// Set the blanking threshold column, see [`Brightness::new`].
    #[must_use]
    pub const fn with_brightness(mut self, brightness: usize) -> Self {
        self.brightness = Brightness::new(brightness);
        self
    }

    /// Set the largest number of bytes a single descriptor transfers.
    ///
    /// Must be a nonzero multiple of
    /// [`TRANSFER_ALIGN`](crate::descriptor::TRANSFER_ALIGN) no larger than
    /// [`DMA_MAX`]; [`Display::new`] rejects anything else.
    #[must_use]
    pub const fn with_max_transfer(mut self, max_transfer: usize) -> Self {
        self.max_transfer = max_transfer;
        self
    }

    /// Blanking threshold.
    #[must_use]
    pub const fn brightness(&self) -> Brightness {
        self.brightness
    }

    /// Largest transfer per descriptor in bytes.
    #[must_use]
    pub const fn max_transfer(&self) -> usize {
        self.max_transfer
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Double-buffered bitplane pipeline for a `ROWS × COLS` panel with `BITS`
/// bits of BCM per channel.
///
/// # Type Parameters
/// - `O`: the [`ParallelOutput`] streaming the chains
/// - `ROWS`: Total number of rows in the panel
/// - `COLS`: Number of columns in the panel
/// - `NROWS`: Number of rows per scan, [`compute_rows(ROWS)`](crate::compute_rows)
/// - `BITS`: Displayed bits per channel (1-8)
/// - `FRAME_COUNT`: BCM ticks per cycle, [`compute_frame_count(BITS)`](crate::compute_frame_count)
///
/// Mismatched parameters are rejected when [`Display::new`] is instantiated.
///
/// The peripheral keeps reading the bitplanes and descriptors for as long as
/// it streams, so it must be stopped before the `Display` is dropped.
pub struct Display<
    O,
    const ROWS: usize,
    const COLS: usize,
    const NROWS: usize,
    const BITS: u8,
    const FRAME_COUNT: usize,
> {
    // holds addresses into `planes`
    table: DescriptorTable,
    arena: ChainArena,
    planes: [Vec<Bitplane<NROWS, COLS>>; 2],
    order: [u8; FRAME_COUNT],
    back: Slot,
    config: Config,
    output: O,
}

// SAFETY: the raw pointers in `table` only reference heap memory owned by
// the same `Display`, which moves along with it.
unsafe impl<
        O: Send,
        const ROWS: usize,
        const COLS: usize,
        const NROWS: usize,
        const BITS: u8,
        const FRAME_COUNT: usize,
    > Send for Display<O, ROWS, COLS, NROWS, BITS, FRAME_COUNT>
{
}

impl<
        O: ParallelOutput,
        const ROWS: usize,
        const COLS: usize,
        const NROWS: usize,
        const BITS: u8,
        const FRAME_COUNT: usize,
    > Display<O, ROWS, COLS, NROWS, BITS, FRAME_COUNT>
{
    const GEOMETRY: () = {
        assert!(BITS >= 1 && BITS <= MAX_BITPLANES, "BITS must be between 1 and 8");
        assert!(
            FRAME_COUNT == compute_frame_count(BITS),
            "FRAME_COUNT must equal compute_frame_count(BITS)"
        );
        assert!(NROWS * 2 == ROWS, "NROWS must equal compute_rows(ROWS)");
        assert!(COLS > 0, "COLS must not be zero");
        assert!(
            bitplane::columns_supported(COLS),
            "COLS must be even with esp32-ordering"
        );
    };

    /// Allocate both bitplane sets, build both descriptor chains and start
    /// `output` streaming slot A.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidTransferSize`](crate::Error::InvalidTransferSize) if
    ///   `config` names a transfer size a descriptor cannot express
    /// - [`Error::OutOfMemory`](crate::Error::OutOfMemory) if bitplane or
    ///   descriptor memory cannot be allocated
    pub fn new(config: Config, mut output: O) -> Result<Self> {
        let () = Self::GEOMETRY;

        let mut order = [0u8; FRAME_COUNT];
        for (entry, plane) in order.iter_mut().zip(compute_visitation_order(BITS)) {
            *entry = plane;
        }
        debug!("bitplane order: {:?}", &order[..]);

        let blocks = [Bitplane::<NROWS, COLS>::BYTES; MAX_BITPLANES as usize];
        let arena = ChainArena::build(&order, &blocks[..BITS as usize], config.max_transfer)?;
        let planes = [
            Bitplane::new_set(BITS as usize)?,
            Bitplane::new_set(BITS as usize)?,
        ];
        let table =
            DescriptorTable::materialize(&arena, [planes[0].as_slice(), planes[1].as_slice()])?;

        output.start(table.head(Slot::A));
        info!(
            "display started: {} bitplanes of {} bytes, {} descriptors per chain",
            BITS,
            Bitplane::<NROWS, COLS>::BYTES,
            arena.len(Slot::A)
        );

        Ok(Self {
            table,
            arena,
            planes,
            order,
            back: Slot::B,
            config,
            output,
        })
    }
}

impl<
        O,
        const ROWS: usize,
        const COLS: usize,
        const NROWS: usize,
        const BITS: u8,
        const FRAME_COUNT: usize,
    > Display<O, ROWS, COLS, NROWS, BITS, FRAME_COUNT>
{
    /// Compose `framebuffer` into the back slot and flip to it.
    pub fn commit_frame(&mut self, framebuffer: &FrameBuffer<ROWS, COLS>) {
        self.compose(framebuffer);
        self.flip();
    }

    /// Compose `framebuffer` into the back slot without showing it yet.
    pub fn compose(&mut self, framebuffer: &FrameBuffer<ROWS, COLS>) {
        bitplane::compose(
            framebuffer,
            &mut self.planes[self.back.index()],
            self.config.brightness,
        );
    }

    /// Show the back slot from the next loop closure on; the slots swap
    /// roles.
    pub fn flip(&mut self) {
        self.flip_to(self.back);
    }

    /// Make both chains continue into `slot` at their next loop closure.
    /// The other slot becomes the back slot.
    pub fn flip_to(&mut self, slot: Slot) {
        self.arena.flip_to(slot);
        self.table.redirect_to(slot);
        self.back = slot.other();
        trace!("flipped to slot {}", slot.index());
    }

    /// Slot the next [`compose`](Self::compose) writes into.
    #[must_use]
    pub fn back_slot(&self) -> Slot {
        self.back
    }

    /// Slot the chains lead into: the most recently flipped-to slot, or slot
    /// A before the first flip.
    #[must_use]
    pub fn front_slot(&self) -> Slot {
        self.back.other()
    }

    /// Change the blanking threshold; applies from the next compose on.
    pub fn set_brightness(&mut self, brightness: usize) {
        self.config = self.config.with_brightness(brightness);
    }

    /// Current settings.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bitplane visitation order baked into both chains.
    #[must_use]
    pub fn visitation_order(&self) -> &[u8] {
        &self.order
    }

    /// Bitplanes of `slot`, least significant first.
    #[must_use]
    pub fn bitplanes(&self, slot: Slot) -> &[Bitplane<NROWS, COLS>] {
        &self.planes[slot.index()]
    }

    /// Index-based view of both chains.
    #[must_use]
    pub fn arena(&self) -> &ChainArena {
        &self.arena
    }

    /// Hardware descriptors the peripheral is walking.
    #[must_use]
    pub fn descriptor_table(&self) -> &DescriptorTable {
        &self.table
    }

    /// The peripheral.
    #[must_use]
    pub fn output(&self) -> &O {
        &self.output
    }

    /// The peripheral, mutably.
    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }
}

impl<
        O,
        const ROWS: usize,
        const COLS: usize,
        const NROWS: usize,
        const BITS: u8,
        const FRAME_COUNT: usize,
    > core::fmt::Debug for Display<O, ROWS, COLS, NROWS, BITS, FRAME_COUNT>
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Display")
            .field("bitplanes", &BITS)
            .field("bitplane_size", &Bitplane::<NROWS, COLS>::BYTES)
            .field("frame_count", &FRAME_COUNT)
            .field("back", &self.back)
            .field("config", &self.config)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "defmt")]
impl<
        O,
        const ROWS: usize,
        const COLS: usize,
        const NROWS: usize,
        const BITS: u8,
        const FRAME_COUNT: usize,
    > defmt::Format for Display<O, ROWS, COLS, NROWS, BITS, FRAME_COUNT>
{
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "Display<{}, {}, {}, {}, {}>",
            ROWS,
            COLS,
            NROWS,
            BITS,
            FRAME_COUNT
        );
        defmt::write!(f, " bitplane_size: {}", Bitplane::<NROWS, COLS>::BYTES);
        defmt::write!(f, " back: {}", self.back);
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use core::ptr;
    use std::format;
    use std::vec::Vec;

    use super::*;
    use crate::descriptor::TRANSFER_ALIGN;
    use crate::Color;
    use crate::Error;
    use embedded_graphics::pixelcolor::RgbColor;

    // the panel the pipeline was first built for
    const TEST_ROWS: usize = 32;
    const TEST_COLS: usize = 128;
    const TEST_NROWS: usize = TEST_ROWS / 2;
    const TEST_BITS: u8 = 7;
    const TEST_FRAME_COUNT: usize = (1 << TEST_BITS) - 1;

    type TestDisplay<'a> =
        Display<&'a mut Recorder, TEST_ROWS, TEST_COLS, TEST_NROWS, TEST_BITS, TEST_FRAME_COUNT>;
    type TestFrameBuffer = FrameBuffer<TEST_ROWS, TEST_COLS>;

    #[derive(Default)]
    struct Recorder {
        starts: Vec<*const DmaDescriptor>,
    }

    impl ParallelOutput for Recorder {
        fn start(&mut self, head: &DmaDescriptor) {
            self.starts.push(ptr::from_ref(head));
        }
    }

    fn slot_of(display: &TestDisplay<'_>, desc: *const DmaDescriptor) -> Slot {
        let index = display
            .descriptor_table()
            .entries()
            .iter()
            .position(|e| ptr::eq(e, desc))
            .unwrap();
        display.arena().descriptor(index).slot
    }

    #[test]
    fn test_new_starts_slot_a() {
        let mut recorder = Recorder::default();
        let display = TestDisplay::new(Config::new(), &mut recorder).unwrap();
        let head_a = ptr::from_ref(display.descriptor_table().head(Slot::A));
        assert_eq!(display.back_slot(), Slot::B);
        assert_eq!(display.front_slot(), Slot::A);
        assert_eq!(display.output().starts, [head_a]);
    }

    #[test]
    fn test_new_builds_chains() {
        let mut recorder = Recorder::default();
        let display = TestDisplay::new(Config::new(), &mut recorder).unwrap();
        let expected: Vec<u8> = compute_visitation_order(TEST_BITS).collect();
        assert_eq!(display.visitation_order(), expected.as_slice());
        assert_eq!(display.visitation_order().len(), TEST_FRAME_COUNT);
        // 128 * 16 words of 2 bytes need two descriptors per bitplane
        for slot in Slot::ALL {
            assert_eq!(display.arena().len(slot), 2 * TEST_FRAME_COUNT);
            assert_eq!(display.bitplanes(slot).len(), TEST_BITS as usize);
        }
    }

    #[test]
    fn test_invalid_transfer_size() {
        let mut recorder = Recorder::default();
        let config = Config::new().with_max_transfer(0);
        let err = TestDisplay::new(config, &mut recorder).unwrap_err();
        assert_eq!(err, Error::InvalidTransferSize(0));
        assert!(recorder.starts.is_empty());
    }

    #[test]
    fn test_commit_alternates_slots() {
        let mut recorder = Recorder::default();
        let mut display = TestDisplay::new(Config::new(), &mut recorder).unwrap();
        let fb = TestFrameBuffer::new();

        display.commit_frame(&fb);
        let head_b = ptr::from_ref(display.descriptor_table().head(Slot::B));
        assert_eq!(display.descriptor_table().tail(Slot::A).next.cast_const(), head_b);
        assert_eq!(display.descriptor_table().tail(Slot::B).next.cast_const(), head_b);
        assert_eq!(display.arena().successor(Slot::A), Slot::B);
        assert_eq!(display.back_slot(), Slot::A);

        display.commit_frame(&fb);
        let head_a = ptr::from_ref(display.descriptor_table().head(Slot::A));
        assert_eq!(display.descriptor_table().tail(Slot::A).next.cast_const(), head_a);
        assert_eq!(display.descriptor_table().tail(Slot::B).next.cast_const(), head_a);
        assert_eq!(display.back_slot(), Slot::B);

        // the peripheral was started once and never touched again
        assert_eq!(display.output().starts.len(), 1);
    }

    #[test]
    fn test_compose_targets_back_slot_only() {
        let mut recorder = Recorder::default();
        let mut display = TestDisplay::new(Config::new(), &mut recorder).unwrap();
        let mut fb = TestFrameBuffer::new();
        fb.fill(Color::WHITE);

        display.compose(&fb);
        for plane in display.bitplanes(Slot::B) {
            assert!(plane.words().iter().all(|w| w.color_bits() == 0b11_1111));
        }
        for plane in display.bitplanes(Slot::A) {
            assert!(plane.words().iter().all(|w| w.color_bits() == 0));
        }
        // composing alone does not flip
        assert_eq!(display.back_slot(), Slot::B);
        assert_eq!(display.arena().successor(Slot::A), Slot::A);
    }

    #[test]
    fn test_recompose_before_flip_overwrites_pending() {
        let mut recorder = Recorder::default();
        let mut display = TestDisplay::new(Config::new(), &mut recorder).unwrap();
        let mut fb = TestFrameBuffer::new();
        fb.fill(Color::RED);
        display.compose(&fb);
        fb.fill(Color::BLUE);
        display.compose(&fb);
        display.flip();
        let word = display.bitplanes(Slot::B)[0].word(0, 0);
        assert!(!word.red1());
        assert!(word.blu1());
    }

    #[test]
    fn test_hardware_walk_switches_at_loop_closure() {
        let mut recorder = Recorder::default();
        let mut display = TestDisplay::new(Config::new(), &mut recorder).unwrap();
        display.commit_frame(&TestFrameBuffer::new());

        let len_a = display.arena().len(Slot::A);
        let mut current = ptr::from_ref(display.descriptor_table().head(Slot::A));
        for hop in 0..len_a + len_a {
            let expected = if hop < len_a { Slot::A } else { Slot::B };
            assert_eq!(slot_of(&display, current), expected, "hop {hop}");
            // SAFETY: every link points into the descriptor table
            current = unsafe { (*current).next.cast_const() };
        }
    }

    #[test]
    fn test_descriptors_cover_back_slot_memory() {
        let mut recorder = Recorder::default();
        let display = TestDisplay::new(Config::new(), &mut recorder).unwrap();
        for slot in Slot::ALL {
            for plane in display.bitplanes(slot) {
                let (start, len) = plane.dma_block();
                let covered: usize = display
                    .descriptor_table()
                    .entries()
                    .iter()
                    .filter(|e| {
                        let buffer = e.buffer.cast_const();
                        buffer >= start && buffer < start.wrapping_add(len)
                    })
                    .map(DmaDescriptor::len)
                    .sum();
                // every visit covers the whole block
                assert_eq!(covered % len, 0);
                assert!(covered > 0);
            }
        }
    }

    #[test]
    fn test_set_brightness_applies_on_next_compose() {
        let mut recorder = Recorder::default();
        let mut display = TestDisplay::new(Config::new(), &mut recorder).unwrap();
        let fb = TestFrameBuffer::new();
        display.set_brightness(100);
        assert_eq!(display.config().brightness().value(), 100);
        display.commit_frame(&fb);
        let plane = &display.bitplanes(Slot::B)[0];
        assert!(!plane.word(99, 0).blank());
        assert!(plane.word(100, 0).blank());

        display.set_brightness(0);
        assert_eq!(display.config().brightness().value(), 1);
    }

    #[test]
    fn test_unaligned_transfer_size_rejected() {
        for max_transfer in [4095, 1001, 2046] {
            let mut recorder = Recorder::default();
            let config = Config::new().with_max_transfer(max_transfer);
            let err = TestDisplay::new(config, &mut recorder).unwrap_err();
            assert_eq!(err, Error::InvalidTransferSize(max_transfer));
            assert!(recorder.starts.is_empty());
        }
    }

    #[test]
    fn test_descriptors_never_split_words() {
        let mut recorder = Recorder::default();
        let config = Config::new().with_max_transfer(1000);
        let display = TestDisplay::new(config, &mut recorder).unwrap();
        let table = display.descriptor_table();
        for (entry, d) in table.entries().iter().zip(display.arena().descriptors()) {
            assert_eq!(entry.buffer as usize % 2, 0);
            assert_eq!(d.offset % TRANSFER_ALIGN, 0);
        }
    }

    #[test]
    fn test_config_builder() {
        let config = Config::new().with_brightness(32).with_max_transfer(1024);
        assert_eq!(config.brightness().value(), 32);
        assert_eq!(config.max_transfer(), 1024);
        assert_eq!(Config::default(), Config::new());
        assert_eq!(Config::default().max_transfer(), DMA_MAX);
    }

    #[test]
    fn test_small_transfer_unit() {
        let mut recorder = Recorder::default();
        let config = Config::new().with_max_transfer(1000);
        let display = TestDisplay::new(config, &mut recorder).unwrap();
        // 4096 bytes in 1000 byte pieces
        assert_eq!(display.arena().len(Slot::A), 5 * TEST_FRAME_COUNT);
    }

    #[test]
    fn test_debug() {
        let mut recorder = Recorder::default();
        let display = TestDisplay::new(Config::new(), &mut recorder).unwrap();
        let debug = format!("{:?}", display);
        assert!(debug.contains("Display"));
        assert!(debug.contains("bitplanes: 7"));
        assert!(debug.contains("frame_count: 127"));
    }
}
