//! Errors reported while bringing up the display pipeline.
//!
//! Everything after [`Display::new`](crate::display::Display::new) is
//! infallible: composing and flipping only touch memory that was allocated
//! up front.

use core::fmt;

/// Initialization failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Bitplane or descriptor memory could not be allocated
    OutOfMemory,
    /// The configured maximum transfer unit does not fit a DMA descriptor
    InvalidTransferSize(usize),
}

/// Result type used throughout the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfMemory => f.write_str("out of DMA-capable memory"),
            Error::InvalidTransferSize(size) => {
                write!(f, "invalid DMA transfer size: {size} bytes")
            }
        }
    }
}

impl core::error::Error for Error {}

impl From<alloc::collections::TryReserveError> for Error {
    fn from(_: alloc::collections::TryReserveError) -> Self {
        Error::OutOfMemory
    }
}
