//! Circular descriptor chains, kept as an index arena.
//!
//! Both chains (one per buffer slot) live in one `Vec`. Chain A occupies the
//! front of the arena and chain B the back; every [`Descriptor`] names the
//! bitplane bytes it covers and the arena index of its successor. Nothing in
//! here is an address: [`DescriptorTable`](crate::descriptor::DescriptorTable)
//! turns the arena into the structures the DMA engine actually walks.
//!
//! A chain visits the bitplanes in visitation order, splitting any bitplane
//! larger than one transfer unit into consecutive descriptors, and its last
//! descriptor links back to its first so the peripheral can loop forever
//! without the CPU. [`ChainArena::flip_to`] re-points the tails of both
//! chains at one head, which is all it takes to switch buffers.

use alloc::vec::Vec;

use crate::descriptor::{DESCRIPTOR_MAX_LEN, TRANSFER_ALIGN};
use crate::{Error, Result};

/// One of the two buffer slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Slot {
    /// Front buffer, streamed first after start-up
    A,
    /// Back buffer
    B,
}

impl Slot {
    /// Both slots, in arena order.
    pub const ALL: [Slot; 2] = [Slot::A, Slot::B];

    /// `0` for [`Slot::A`], `1` for [`Slot::B`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Slot::A => 0,
            Slot::B => 1,
        }
    }

    /// The slot that is not `self`.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }
}

/// Number of descriptors needed to cover `block_len` bytes with transfers of
/// at most `max_transfer` bytes.
#[must_use]
pub const fn descriptor_count(block_len: usize, max_transfer: usize) -> usize {
    block_len.div_ceil(max_transfer)
}

/// A transfer of `len` bytes starting `offset` bytes into bitplane `plane` of
/// `slot`, followed by the descriptor at arena index `next`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Descriptor {
    /// Buffer slot owning the bitplane
    pub slot: Slot,
    /// Bitplane index within the slot
    pub plane: u8,
    /// Byte offset into the bitplane
    pub offset: usize,
    /// Transfer length in bytes
    pub len: usize,
    /// Arena index of the next descriptor
    pub next: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Bounds {
    head: usize,
    len: usize,
}

/// Arena holding the two circular descriptor chains.
#[derive(Debug, Clone)]
pub struct ChainArena {
    descriptors: Vec<Descriptor>,
    chains: [Bounds; 2],
}

impl ChainArena {
    /// Build both chains.
    ///
    /// `order` is the bitplane visitation order and `blocks[p]` the size in
    /// bytes of bitplane `p` (identical for both slots).
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidTransferSize`] if `max_transfer` is zero, not a
    ///   multiple of [`TRANSFER_ALIGN`] or larger than a descriptor can express
    /// - [`Error::OutOfMemory`] if the arena cannot be allocated
    ///
    /// # Panics
    ///
    /// In debug builds, if `order` is empty, names a bitplane that has no
    /// entry in `blocks`, or a block is empty.
    pub fn build(order: &[u8], blocks: &[usize], max_transfer: usize) -> Result<Self> {
        // every descriptor but the last of a block must end word aligned
        if max_transfer == 0
            || max_transfer % TRANSFER_ALIGN != 0
            || max_transfer > DESCRIPTOR_MAX_LEN
        {
            return Err(Error::InvalidTransferSize(max_transfer));
        }
        debug_assert!(!order.is_empty(), "visitation order must not be empty");
        debug_assert!(
            order.iter().all(|&p| blocks.get(p as usize).is_some_and(|&len| len > 0)),
            "every visited bitplane needs a non-empty block"
        );

        let per_chain: usize = order
            .iter()
            .map(|&p| descriptor_count(blocks[p as usize], max_transfer))
            .sum();
        let mut descriptors = Vec::new();
        descriptors.try_reserve_exact(2 * per_chain)?;

        let mut arena = Self {
            descriptors,
            chains: [Bounds::default(); 2],
        };
        for slot in Slot::ALL {
            arena.build_chain(slot, order, blocks, max_transfer);
        }
        Ok(arena)
    }

    fn build_chain(&mut self, slot: Slot, order: &[u8], blocks: &[usize], max_transfer: usize) {
        let head = self.descriptors.len();
        for &plane in order {
            let block_len = blocks[plane as usize];
            let mut offset = 0;
            while offset < block_len {
                let len = (block_len - offset).min(max_transfer);
                let next = self.descriptors.len() + 1;
                self.descriptors.push(Descriptor {
                    slot,
                    plane,
                    offset,
                    len,
                    next,
                });
                offset += len;
            }
        }
        let len = self.descriptors.len() - head;
        if len > 0 {
            // loop last back to first
            self.descriptors[head + len - 1].next = head;
        }
        self.chains[slot.index()] = Bounds { head, len };
    }

    /// Arena index of the first descriptor of `slot`'s chain.
    #[must_use]
    pub fn head(&self, slot: Slot) -> usize {
        self.chains[slot.index()].head
    }

    /// Arena index of the last descriptor of `slot`'s chain.
    #[must_use]
    pub fn tail(&self, slot: Slot) -> usize {
        let bounds = self.chains[slot.index()];
        bounds.head + bounds.len - 1
    }

    /// Number of descriptors in `slot`'s chain.
    #[must_use]
    pub fn len(&self, slot: Slot) -> usize {
        self.chains[slot.index()].len
    }

    /// `true` if no chain holds any descriptor.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// The descriptors of `slot`'s chain, in build order.
    #[must_use]
    pub fn chain(&self, slot: Slot) -> &[Descriptor] {
        let bounds = self.chains[slot.index()];
        &self.descriptors[bounds.head..bounds.head + bounds.len]
    }

    /// Every descriptor in the arena.
    #[must_use]
    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    /// Descriptor at arena index `index`.
    #[must_use]
    pub fn descriptor(&self, index: usize) -> &Descriptor {
        &self.descriptors[index]
    }

    /// The slot whose head `slot`'s tail currently links to.
    #[must_use]
    pub fn successor(&self, slot: Slot) -> Slot {
        let next = self.descriptors[self.tail(slot)].next;
        self.descriptors[next].slot
    }

    /// Make both chains continue into `slot` at their next loop closure.
    ///
    /// Rewriting both tails means the switch happens no matter which chain
    /// the hardware is in the middle of.
    pub fn flip_to(&mut self, slot: Slot) {
        let head = self.head(slot);
        for s in Slot::ALL {
            let tail = self.tail(s);
            self.descriptors[tail].next = head;
        }
    }

    /// Follow `next` links starting at arena index `start`. The walk never
    /// ends on its own.
    #[must_use]
    pub fn walk(&self, start: usize) -> Walk<'_> {
        Walk {
            arena: self,
            current: start,
        }
    }
}

/// Endless iterator over arena indices along the `next` links.
#[derive(Debug, Clone)]
pub struct Walk<'a> {
    arena: &'a ChainArena,
    current: usize,
}

impl Iterator for Walk<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let index = self.current;
        self.current = self.arena.descriptors[index].next;
        Some(index)
    }
}
