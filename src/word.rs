//! The 16-bit word clocked out to the panel on every pixel clock.
//!
//! One word drives the whole HUB75 connector for one clock cycle:
//!
//! | Bit | Signal | Meaning |
//! |-----|--------|---------|
//! | 0   | R1     | red, upper half |
//! | 1   | G1     | green, upper half |
//! | 2   | B1     | blue, upper half |
//! | 3   | R2     | red, lower half |
//! | 4   | G2     | green, lower half |
//! | 5   | B2     | blue, lower half |
//! | 8-11| A-D    | row address of the row being *displayed* |
//! | 12  | LAT    | latch, pulsed on the last column of a row |
//! | 13  | OE     | output enable, active low (set = LEDs blanked) |
//!
//! Bits 6, 7, 14 and 15 are not connected.

use bitfield::bitfield;

/// Number of row address lines (A, B, C, D).
pub const ADDRESS_BITS: u8 = 4;

/// Mask applied to row numbers before they are put on the address lines.
pub const ADDRESS_MASK: usize = (1 << ADDRESS_BITS) - 1;

bitfield! {
    /// 16-bit word representing the state of every HUB75 input for one pixel
    /// clock.
    ///
    /// The bit layout is as follows:
    /// - Bit 13: Output enable (active low, so `blank` = LEDs off)
    /// - Bit 12: Latch signal
    /// - Bits 11-8: Row address
    /// - Bit 5: Blue channel for the lower half
    /// - Bit 4: Green channel for the lower half
    /// - Bit 3: Red channel for the lower half
    /// - Bit 2: Blue channel for the upper half
    /// - Bit 1: Green channel for the upper half
    /// - Bit 0: Red channel for the upper half
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct TransferWord(u16);
    impl Debug;
    pub blank, set_blank: 13;
    pub latch, set_latch: 12;
    pub u8, addr, set_addr: 11, 8;
    pub blu2, set_blu2: 5;
    pub grn2, set_grn2: 4;
    pub red2, set_red2: 3;
    pub blu1, set_blu1: 2;
    pub grn1, set_grn1: 1;
    pub red1, set_red1: 0;
}

impl TransferWord {
    /// Bits carrying colour data for both halves.
    pub const COLOR_MASK: u16 = 0b0011_1111;

    /// An all-zero word: no colour, row 0, no latch, LEDs on.
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }

    /// Word carrying only the row address of the row currently on display
    /// while `row` is being shifted in.
    ///
    /// The panel keeps showing the previously latched row while new data is
    /// clocked in, so the address lines have to name the *previous* row:
    /// `(row - 1) mod 16`. Row 0 therefore carries address 15.
    #[must_use]
    pub fn for_row(row: usize) -> Self {
        let mut word = Self::new();
        word.set_addr((row.wrapping_sub(1) & ADDRESS_MASK) as u8);
        word
    }

    /// Raw bits as they appear on the bus.
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Set the colour bits for the upper half of the panel.
    pub fn set_color0(&mut self, r: bool, g: bool, b: bool) {
        self.set_red1(r);
        self.set_grn1(g);
        self.set_blu1(b);
    }

    /// Set the colour bits for the lower half of the panel.
    pub fn set_color1(&mut self, r: bool, g: bool, b: bool) {
        self.set_red2(r);
        self.set_grn2(g);
        self.set_blu2(b);
    }

    /// Colour bits only, with every control signal masked off.
    #[must_use]
    pub const fn color_bits(self) -> u16 {
        self.0 & Self::COLOR_MASK
    }
}
