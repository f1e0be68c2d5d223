//! Linked-list DMA descriptors as the hardware walks them.
//!
//! The ESP32 family's I²S/LCD DMA engine follows a chain of `lldesc_t`
//! descriptors: one flags word, a buffer address and the address of the next
//! descriptor. With the `esp-dma` feature [`DmaDescriptor`] is
//! `esp_hal::dma::DmaDescriptor`, the type esp-hal's parallel output drivers
//! consume; otherwise it is a local type with the same layout.
//!
//! A [`DescriptorTable`] is built once from a [`ChainArena`] by swapping arena
//! indices for real addresses; afterwards the only thing that ever changes is
//! the `next` link of the two tail descriptors. A tail rewrite is a single
//! aligned volatile word store, so the DMA engine reading it concurrently
//! sees either the old or the new chain head, never a mix.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::ptr;
use core::sync::atomic::{fence, Ordering};

#[cfg(not(feature = "esp-dma"))]
use bitfield::bitfield;
#[cfg(feature = "esp-dma")]
pub use esp_hal::dma::DmaDescriptor;
#[cfg(feature = "esp-dma")]
use esp_hal::dma::Owner;

use crate::bitplane::Bitplane;
use crate::chain::{ChainArena, Slot};
use crate::Result;

/// Largest length a descriptor can express (12-bit field).
pub const DESCRIPTOR_MAX_LEN: usize = 4095;

/// Alignment in bytes the DMA engine needs for buffer addresses and for
/// every transfer length but the last of a block.
pub const TRANSFER_ALIGN: usize = 4;

/// Default maximum transfer per descriptor: the largest word-aligned length.
pub const DMA_MAX: usize = 4096 - TRANSFER_ALIGN;

#[cfg(not(feature = "esp-dma"))]
bitfield! {
    /// First word of a DMA descriptor.
    ///
    /// The bit layout is as follows:
    /// - Bit 31: Owner (set = DMA engine owns the descriptor)
    /// - Bit 30: End of frame
    /// - Bit 29: Start of sub-frame
    /// - Bits 28-24: Offset
    /// - Bits 23-12: Length of valid data in bytes
    /// - Bits 11-0: Size of the buffer in bytes
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct DescriptorFlags(u32);
    impl Debug;
    pub owner, set_owner: 31;
    pub eof, set_eof: 30;
    pub sosf, set_sosf: 29;
    pub u8, offset, set_offset: 28, 24;
    pub u16, length, set_length: 23, 12;
    pub u16, size, set_size: 11, 0;
}

#[cfg(not(feature = "esp-dma"))]
impl DescriptorFlags {
    /// Flags for a DMA-owned transfer of `len` bytes.
    #[must_use]
    pub fn for_transfer(len: usize) -> Self {
        debug_assert!(len <= DESCRIPTOR_MAX_LEN);
        let mut flags = Self(0);
        flags.set_size(len as u16);
        flags.set_length(len as u16);
        flags.set_owner(true);
        flags
    }
}

/// One hardware DMA descriptor.
#[cfg(not(feature = "esp-dma"))]
#[derive(Clone, Copy)]
#[repr(C)]
pub struct DmaDescriptor {
    /// Size, length and ownership
    pub flags: DescriptorFlags,
    /// Address of the first byte transferred
    pub buffer: *mut u8,
    /// Descriptor the DMA engine continues with
    pub next: *mut DmaDescriptor,
}

#[cfg(not(feature = "esp-dma"))]
impl DmaDescriptor {
    /// A zero-length descriptor owned by the CPU, linked to nothing.
    pub const EMPTY: Self = Self {
        flags: DescriptorFlags(0),
        buffer: ptr::null_mut(),
        next: ptr::null_mut(),
    };

    /// Number of bytes transferred.
    #[must_use]
    pub fn len(&self) -> usize {
        usize::from(self.flags.length())
    }

    /// `true` for a zero-length transfer.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(not(feature = "esp-dma"))]
impl core::fmt::Debug for DmaDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DmaDescriptor")
            .field("flags", &self.flags)
            .field("buffer", &self.buffer)
            .field("next", &self.next)
            .finish()
    }
}

#[cfg(not(feature = "esp-dma"))]
fn transfer(buffer: *const u8, len: usize) -> DmaDescriptor {
    DmaDescriptor {
        flags: DescriptorFlags::for_transfer(len),
        buffer: buffer.cast_mut(),
        next: ptr::null_mut(),
    }
}

#[cfg(feature = "esp-dma")]
fn transfer(buffer: *const u8, len: usize) -> DmaDescriptor {
    let mut desc = DmaDescriptor::EMPTY;
    desc.set_size(len);
    desc.set_length(len);
    desc.set_owner(Owner::Dma);
    desc.buffer = buffer.cast_mut();
    desc
}

/// Both descriptor chains, laid out for the DMA engine.
///
/// Buffer addresses point into the bitplanes the table was built from, so
/// those bitplanes must outlive the table and must not be reallocated.
/// [`Display`](crate::display::Display) owns both and keeps them together.
pub struct DescriptorTable {
    entries: Box<[DmaDescriptor]>,
    heads: [usize; 2],
    tails: [usize; 2],
}

impl DescriptorTable {
    /// Translate `arena` into hardware descriptors whose buffers point into
    /// `planes[slot]`.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`](crate::Error::OutOfMemory) if the descriptor
    /// memory cannot be allocated.
    ///
    /// # Panics
    ///
    /// If the arena names a bitplane missing from `planes`. In debug builds
    /// also if a descriptor reaches past the end of its bitplane.
    pub fn materialize<const NROWS: usize, const COLS: usize>(
        arena: &ChainArena,
        planes: [&[Bitplane<NROWS, COLS>]; 2],
    ) -> Result<Self> {
        let mut entries = Vec::new();
        entries.try_reserve_exact(arena.descriptors().len())?;
        for d in arena.descriptors() {
            let (block, block_len) = planes[d.slot.index()][d.plane as usize].dma_block();
            debug_assert!(d.offset + d.len <= block_len, "descriptor exceeds bitplane");
            entries.push(transfer(block.wrapping_add(d.offset), d.len));
        }
        let mut entries = entries.into_boxed_slice();

        // entries no longer move, link them by address
        let base = entries.as_mut_ptr();
        for (entry, d) in entries.iter_mut().zip(arena.descriptors()) {
            entry.next = base.wrapping_add(d.next);
        }

        Ok(Self {
            entries,
            heads: Slot::ALL.map(|s| arena.head(s)),
            tails: Slot::ALL.map(|s| arena.tail(s)),
        })
    }

    /// First descriptor of `slot`'s chain; hand this to the peripheral.
    #[must_use]
    pub fn head(&self, slot: Slot) -> &DmaDescriptor {
        &self.entries[self.heads[slot.index()]]
    }

    /// Last descriptor of `slot`'s chain.
    #[must_use]
    pub fn tail(&self, slot: Slot) -> &DmaDescriptor {
        &self.entries[self.tails[slot.index()]]
    }

    /// All descriptors, in arena order.
    #[must_use]
    pub fn entries(&self) -> &[DmaDescriptor] {
        &self.entries
    }

    /// Table index of the descriptor `entries()[index]` links to.
    #[must_use]
    pub fn next_index(&self, index: usize) -> Option<usize> {
        let next = self.entries[index].next as usize;
        let base = self.entries.as_ptr() as usize;
        let offset = next.checked_sub(base)?;
        let index = offset / core::mem::size_of::<DmaDescriptor>();
        (index < self.entries.len()).then_some(index)
    }

    /// Point the tails of both chains at the head of `slot`.
    ///
    /// Whichever chain the DMA engine is in finishes its current pass and
    /// then continues into `slot`. Each tail is updated with one store.
    pub fn redirect_to(&mut self, slot: Slot) {
        let base = self.entries.as_mut_ptr();
        let head = base.wrapping_add(self.heads[slot.index()]);
        // bitplane writes must be visible before the engine can follow the link
        fence(Ordering::Release);
        for tail in self.tails {
            // SAFETY: `tail` indexes `entries`, and a pointer-sized aligned
            // field is written with a single store
            unsafe { ptr::write_volatile(ptr::addr_of_mut!((*base.add(tail)).next), head) };
        }
    }
}

impl core::fmt::Debug for DescriptorTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DescriptorTable")
            .field("descriptors", &self.entries.len())
            .field("heads", &self.heads)
            .field("tails", &self.tails)
            .finish()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for DescriptorTable {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "DescriptorTable descriptors: {} heads: {} tails: {}",
            self.entries.len(),
            self.heads,
            self.tails
        );
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::vec::Vec;

    use super::*;
    use crate::schedule::compute_visitation_order;

    const TEST_NROWS: usize = 16;
    const TEST_COLS: usize = 128;
    const TEST_BITS: usize = 3;

    type TestBitplane = Bitplane<TEST_NROWS, TEST_COLS>;

    struct Fixture {
        planes: [Vec<TestBitplane>; 2],
        arena: ChainArena,
    }

    fn fixture() -> Fixture {
        let planes = [
            TestBitplane::new_set(TEST_BITS).unwrap(),
            TestBitplane::new_set(TEST_BITS).unwrap(),
        ];
        let order: Vec<u8> = compute_visitation_order(TEST_BITS as u8).collect();
        let arena = ChainArena::build(&order, &[TestBitplane::BYTES; TEST_BITS], DMA_MAX).unwrap();
        Fixture { planes, arena }
    }

    fn table(f: &Fixture) -> DescriptorTable {
        let planes = [f.planes[0].as_slice(), f.planes[1].as_slice()];
        DescriptorTable::materialize(&f.arena, planes).unwrap()
    }

    fn next_of(desc: &DmaDescriptor) -> *const DmaDescriptor {
        desc.next.cast_const()
    }

    #[cfg(not(feature = "esp-dma"))]
    #[test]
    fn test_flags_layout() {
        let flags = DescriptorFlags::for_transfer(DMA_MAX);
        assert_eq!(flags.size() as usize, DMA_MAX);
        assert_eq!(flags.length() as usize, DMA_MAX);
        assert_eq!(flags.owner(), true);
        assert_eq!(flags.eof(), false);
        assert_eq!(flags.sosf(), false);
        assert_eq!(flags.offset(), 0);
        assert_eq!(flags.0, (1 << 31) | ((DMA_MAX as u32) << 12) | DMA_MAX as u32);
    }

    #[test]
    fn test_descriptor_layout_matches_lldesc() {
        // flags word, buffer pointer, next pointer; 12 bytes on the ESP32
        let word = core::mem::size_of::<usize>();
        assert_eq!(core::mem::size_of::<DmaDescriptor>(), 3 * word);
        assert_eq!(core::mem::offset_of!(DmaDescriptor, flags), 0);
        assert_eq!(core::mem::offset_of!(DmaDescriptor, buffer), word);
        assert_eq!(core::mem::offset_of!(DmaDescriptor, next), 2 * word);
    }

    #[test]
    fn test_default_transfer_is_aligned() {
        assert_eq!(DMA_MAX % TRANSFER_ALIGN, 0);
        assert!(DMA_MAX <= DESCRIPTOR_MAX_LEN);
    }

    #[test]
    fn test_materialize_mirrors_arena() {
        let f = fixture();
        let table = table(&f);
        assert_eq!(table.entries().len(), f.arena.descriptors().len());
        // 128 * 16 * 2 = 4096 bytes per plane, two descriptors each
        assert_eq!(f.arena.len(Slot::A), 7 * 2);
        for (i, (entry, d)) in table.entries().iter().zip(f.arena.descriptors()).enumerate() {
            let (block, _) = f.planes[d.slot.index()][d.plane as usize].dma_block();
            assert_eq!(entry.buffer.cast_const(), block.wrapping_add(d.offset));
            assert_eq!(entry.len(), d.len);
            assert!(!entry.is_empty());
            assert_eq!(table.next_index(i), Some(d.next));
        }
    }

    #[test]
    fn test_table_is_closed_loop() {
        let f = fixture();
        let table = table(&f);
        for slot in Slot::ALL {
            let head = ptr::from_ref(table.head(slot));
            let mut current = head;
            let mut hops = 0;
            loop {
                // SAFETY: every link points into `table.entries`
                current = unsafe { next_of(&*current) };
                hops += 1;
                if current == head {
                    break;
                }
                assert!(hops <= f.arena.len(slot));
            }
            assert_eq!(hops, f.arena.len(slot));
            assert_eq!(next_of(table.tail(slot)), head);
        }
    }

    #[test]
    fn test_redirect_to_rewrites_both_tails() {
        let f = fixture();
        let mut table = table(&f);
        let head_b = ptr::from_ref(table.head(Slot::B));
        table.redirect_to(Slot::B);
        assert_eq!(next_of(table.tail(Slot::A)), head_b);
        assert_eq!(next_of(table.tail(Slot::B)), head_b);

        let head_a = ptr::from_ref(table.head(Slot::A));
        table.redirect_to(Slot::A);
        assert_eq!(next_of(table.tail(Slot::A)), head_a);
        assert_eq!(next_of(table.tail(Slot::B)), head_a);
    }

    #[test]
    fn test_redirect_only_touches_tails() {
        let f = fixture();
        let mut table = table(&f);
        let before: Vec<_> = table.entries().iter().map(next_of).collect();
        table.redirect_to(Slot::B);
        let tail_a = f.arena.tail(Slot::A);
        for (i, entry) in table.entries().iter().enumerate() {
            if i == tail_a {
                assert_ne!(next_of(entry), before[i]);
            } else {
                assert_eq!(next_of(entry), before[i]);
            }
        }
    }
}
