//! Error types for flashmap-core
//!
//! This module provides a no_std compatible error type shared by the
//! region registry, the dispatcher and every block device adapter.

use core::fmt;

use crate::area::AreaId;

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Configuration errors
    /// Region id is not one of primary, secondary or scratch
    UnknownArea(u8),
    /// No backing device has been supplied for this region
    DeviceMissing(AreaId),
    /// Device table cannot change while an area is open
    AreaBusy,
    /// Placement constants under- or overflow the address space
    InvalidPlacement,
    /// Slot translation was requested for an image other than the first
    MultiImageUnsupported {
        /// Image index that was requested
        image_index: u8,
    },
    /// Area handle is not open (close without open, or use after close)
    NotOpen,
    /// Too many concurrent opens of the same area
    OpenCountOverflow,

    // Device errors
    /// Device initialization failed
    InitFailed,
    /// Device deinitialization failed
    DeinitFailed,
    /// Read operation failed
    ReadError,
    /// Program operation failed
    ProgramError,
    /// Erase operation failed
    EraseError,
    /// Address is beyond the device size
    AddressOutOfBounds,
    /// Operation requires aligned address or size
    InvalidAlignment,
    /// Shared device is already borrowed by another window
    DeviceBusy,
    /// Device reported a geometry that cannot be walked (e.g. zero-sized sector)
    InvalidGeometry,

    // Read emulation errors
    /// Unaligned read is longer than the device's minimum read size
    ReadExceedsGranularity {
        /// Requested length
        len: usize,
        /// Device minimum read size
        read_size: u32,
    },
    /// Device read size exceeds the emulation buffer
    BufferTooSmall,

    // Config errors
    /// Map configuration could not be loaded or parsed
    ConfigError,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownArea(id) => write!(f, "unknown flash area id {}", id),
            Self::DeviceMissing(id) => write!(f, "no block device supplied for {} area", id),
            Self::AreaBusy => write!(f, "device table cannot change while areas are open"),
            Self::InvalidPlacement => write!(f, "placement constants overflow the address space"),
            Self::MultiImageUnsupported { image_index } => {
                write!(f, "multi-image slot translation unsupported (image {})", image_index)
            }
            Self::NotOpen => write!(f, "flash area is not open"),
            Self::OpenCountOverflow => write!(f, "flash area open count overflow"),
            Self::InitFailed => write!(f, "device initialization failed"),
            Self::DeinitFailed => write!(f, "device deinitialization failed"),
            Self::ReadError => write!(f, "read operation failed"),
            Self::ProgramError => write!(f, "program operation failed"),
            Self::EraseError => write!(f, "erase operation failed"),
            Self::AddressOutOfBounds => write!(f, "address out of bounds"),
            Self::InvalidAlignment => write!(f, "invalid alignment"),
            Self::DeviceBusy => write!(f, "device is busy"),
            Self::InvalidGeometry => write!(f, "invalid device geometry"),
            Self::ReadExceedsGranularity { len, read_size } => write!(
                f,
                "unaligned read of {} bytes exceeds device read size {}",
                len, read_size
            ),
            Self::BufferTooSmall => write!(f, "buffer too small"),
            Self::ConfigError => write!(f, "invalid map configuration"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
