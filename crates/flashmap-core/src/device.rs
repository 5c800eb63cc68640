//! Block device capability
//!
//! This module provides the `BlockDevice` trait that every storage backing a
//! flash area implements: internal flash windows, external SPI NOR, or the
//! in-memory emulator used on the host.

use crate::error::Result;

/// Raw block storage backing a flash area
///
/// The flash map never drives hardware itself; it only forwards requests to
/// a `BlockDevice`. Implementations are expected to be synchronous and to
/// report failures through the core error type, which the flash map passes
/// through to its caller unchanged.
///
/// # Geometry
///
/// All addresses are relative to the start of the device and use 32-bit
/// offsets. A device advertises three granularities:
/// - `read_size()` - minimum read unit; reads must be aligned to it
/// - `program_size()` - minimum program unit
/// - `erase_size_at(addr)` - size of the erase block covering `addr`, which
///   may vary across the device
///
/// # Example
///
/// ```ignore
/// use flashmap_core::BlockDevice;
///
/// fn first_word<D: BlockDevice + ?Sized>(device: &mut D) -> Result<[u8; 4]> {
///     let mut buf = [0u8; 4];
///     device.read(0, &mut buf)?;
///     Ok(buf)
/// }
/// ```
pub trait BlockDevice {
    /// Physically initialize the device
    ///
    /// May be called more than once; the flash map initializes every device
    /// at startup and again on the first open of each area.
    fn init(&mut self) -> Result<()>;

    /// Physically deinitialize the device
    fn deinit(&mut self) -> Result<()>;

    /// Read device contents into the provided buffer
    ///
    /// # Errors
    /// * `InvalidAlignment` - If `addr` or `buf.len()` is not a multiple of `read_size()`
    /// * `AddressOutOfBounds` - If the read extends beyond the device size
    /// * `ReadError` - If the read operation fails
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()>;

    /// Program data into previously erased storage
    ///
    /// # Errors
    /// * `InvalidAlignment` - If `addr` or `data.len()` is not a multiple of `program_size()`
    /// * `AddressOutOfBounds` - If the program extends beyond the device size
    /// * `ProgramError` - If the program operation fails
    fn program(&mut self, addr: u32, data: &[u8]) -> Result<()>;

    /// Erase a range of blocks
    ///
    /// # Errors
    /// * `InvalidAlignment` - If the range does not cover whole erase blocks
    /// * `AddressOutOfBounds` - If the erase extends beyond the device size
    /// * `EraseError` - If the erase operation fails
    fn erase(&mut self, addr: u32, len: u32) -> Result<()>;

    /// Total device size in bytes
    fn size(&self) -> u32;

    /// Minimum read unit in bytes
    fn read_size(&self) -> u32;

    /// Minimum program unit in bytes
    fn program_size(&self) -> u32;

    /// Size of the erase block covering `addr`
    fn erase_size_at(&self, addr: u32) -> u32;

    /// Byte value the storage reads back as after an erase
    fn erase_value(&self) -> u8 {
        0xFF
    }

    /// Check whether a read can be served natively
    fn is_valid_read(&self, addr: u32, len: usize) -> bool {
        let unit = self.read_size() as u64;
        unit != 0
            && (addr as u64).is_multiple_of(unit)
            && (len as u64).is_multiple_of(unit)
            && in_bounds(addr, len as u64, self.size())
    }

    /// Check whether a program request is aligned and in range
    fn is_valid_program(&self, addr: u32, len: usize) -> bool {
        let unit = self.program_size() as u64;
        unit != 0
            && (addr as u64).is_multiple_of(unit)
            && (len as u64).is_multiple_of(unit)
            && in_bounds(addr, len as u64, self.size())
    }

    /// Check whether an erase request covers whole erase blocks and is in range
    fn is_valid_erase(&self, addr: u32, len: u32) -> bool {
        if !in_bounds(addr, len as u64, self.size()) {
            return false;
        }
        let unit = self.erase_size_at(addr);
        if unit == 0 || !addr.is_multiple_of(unit) {
            return false;
        }
        let end = addr as u64 + len as u64;
        if end == self.size() as u64 {
            return true;
        }
        let last = self.erase_size_at(end as u32);
        last != 0 && (end as u32).is_multiple_of(last)
    }
}

// Use u64 arithmetic to avoid truncation when addr + len > u32::MAX
fn in_bounds(addr: u32, len: u64, size: u32) -> bool {
    addr as u64 + len <= size as u64
}

impl<D: BlockDevice + ?Sized> BlockDevice for &mut D {
    fn init(&mut self) -> Result<()> {
        (**self).init()
    }

    fn deinit(&mut self) -> Result<()> {
        (**self).deinit()
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        (**self).read(addr, buf)
    }

    fn program(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        (**self).program(addr, data)
    }

    fn erase(&mut self, addr: u32, len: u32) -> Result<()> {
        (**self).erase(addr, len)
    }

    fn size(&self) -> u32 {
        (**self).size()
    }

    fn read_size(&self) -> u32 {
        (**self).read_size()
    }

    fn program_size(&self) -> u32 {
        (**self).program_size()
    }

    fn erase_size_at(&self, addr: u32) -> u32 {
        (**self).erase_size_at(addr)
    }

    fn erase_value(&self) -> u8 {
        (**self).erase_value()
    }

    fn is_valid_read(&self, addr: u32, len: usize) -> bool {
        (**self).is_valid_read(addr, len)
    }

    fn is_valid_program(&self, addr: u32, len: usize) -> bool {
        (**self).is_valid_program(addr, len)
    }

    fn is_valid_erase(&self, addr: u32, len: u32) -> bool {
        (**self).is_valid_erase(addr, len)
    }
}
