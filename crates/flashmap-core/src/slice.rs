//! Windowed view of a shared block device
//!
//! The primary and scratch areas normally live on the same internal flash.
//! `SlicedDevice` exposes one window of such a device as a block device of
//! its own, with addresses relative to the window start, so both areas can
//! be handed to the flash map independently.

use core::cell::RefCell;

use crate::device::BlockDevice;
use crate::error::{Error, Result};
use crate::placement::Span;

/// A `[start, start + size)` window of a shared device
///
/// The underlying device is shared through a `RefCell`; the flash map is
/// single-threaded and never re-enters a device, so a conflicting borrow is
/// reported as `DeviceBusy` rather than expected in normal operation.
///
/// # Example
///
/// ```ignore
/// let internal = RefCell::new(NorFlashDevice::new(flash));
/// let placement = config.placement()?;
/// let mut primary = SlicedDevice::new(&internal, placement.primary)?;
/// let mut scratch = SlicedDevice::new(&internal, placement.scratch)?;
/// ```
pub struct SlicedDevice<'a, D: BlockDevice> {
    inner: &'a RefCell<D>,
    span: Span,
    read_size: u32,
    program_size: u32,
    erase_value: u8,
}

impl<'a, D: BlockDevice> SlicedDevice<'a, D> {
    /// Create a window over `inner`
    ///
    /// # Errors
    /// * `AddressOutOfBounds` - If the window extends beyond the device
    /// * `DeviceBusy` - If the device is currently borrowed
    pub fn new(inner: &'a RefCell<D>, span: Span) -> Result<Self> {
        let device = inner.try_borrow().map_err(|_| Error::DeviceBusy)?;
        let end = span.checked_end().ok_or(Error::AddressOutOfBounds)?;
        if end > device.size() {
            log::error!(
                "Window 0x{:08X}..0x{:08X} exceeds device size 0x{:08X}",
                span.start,
                end,
                device.size()
            );
            return Err(Error::AddressOutOfBounds);
        }

        Ok(Self {
            span,
            read_size: device.read_size(),
            program_size: device.program_size(),
            erase_value: device.erase_value(),
            inner,
        })
    }

    /// The window within the underlying device
    pub fn span(&self) -> Span {
        self.span
    }

    fn absolute(&self, addr: u32, len: u64) -> Result<u32> {
        if addr as u64 + len > self.span.size as u64 {
            return Err(Error::AddressOutOfBounds);
        }
        Ok(self.span.start + addr)
    }

    fn device(&self) -> Result<core::cell::RefMut<'a, D>> {
        self.inner.try_borrow_mut().map_err(|_| Error::DeviceBusy)
    }
}

impl<D: BlockDevice> BlockDevice for SlicedDevice<'_, D> {
    fn init(&mut self) -> Result<()> {
        self.device()?.init()
    }

    fn deinit(&mut self) -> Result<()> {
        self.device()?.deinit()
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        let addr = self.absolute(addr, buf.len() as u64)?;
        self.device()?.read(addr, buf)
    }

    fn program(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        let addr = self.absolute(addr, data.len() as u64)?;
        self.device()?.program(addr, data)
    }

    fn erase(&mut self, addr: u32, len: u32) -> Result<()> {
        let addr = self.absolute(addr, len as u64)?;
        self.device()?.erase(addr, len)
    }

    fn size(&self) -> u32 {
        self.span.size
    }

    fn read_size(&self) -> u32 {
        self.read_size
    }

    fn program_size(&self) -> u32 {
        self.program_size
    }

    // A busy device reports 0, which sector enumeration rejects as invalid geometry
    fn erase_size_at(&self, addr: u32) -> u32 {
        self.inner
            .try_borrow()
            .map(|d| d.erase_size_at(self.span.start.saturating_add(addr)))
            .unwrap_or(0)
    }

    fn erase_value(&self) -> u8 {
        self.erase_value
    }

    fn is_valid_read(&self, addr: u32, len: usize) -> bool {
        match self.absolute(addr, len as u64) {
            Ok(abs) => self
                .inner
                .try_borrow()
                .map(|d| d.is_valid_read(abs, len))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    fn is_valid_program(&self, addr: u32, len: usize) -> bool {
        match self.absolute(addr, len as u64) {
            Ok(abs) => self
                .inner
                .try_borrow()
                .map(|d| d.is_valid_program(abs, len))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    fn is_valid_erase(&self, addr: u32, len: u32) -> bool {
        match self.absolute(addr, len as u64) {
            Ok(abs) => self
                .inner
                .try_borrow()
                .map(|d| d.is_valid_erase(abs, len))
                .unwrap_or(false),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDevice;

    #[test]
    fn test_window_translation() {
        let shared = RefCell::new(MockDevice::new(0x4000, 1, 1, 0x400));
        let mut low = SlicedDevice::new(&shared, Span::new(0x0, 0x2000)).unwrap();
        let mut high = SlicedDevice::new(&shared, Span::new(0x2000, 0x2000)).unwrap();

        high.program(0x10, &[0xAA, 0xBB]).unwrap();
        low.program(0x10, &[0x11]).unwrap();

        let device = shared.borrow();
        assert_eq!(&device.data[0x2010..0x2012], &[0xAA, 0xBB]);
        assert_eq!(device.data[0x10], 0x11);
    }

    #[test]
    fn test_window_bounds() {
        let shared = RefCell::new(MockDevice::new(0x4000, 1, 1, 0x400));
        assert_eq!(
            SlicedDevice::new(&shared, Span::new(0x3000, 0x2000)).err(),
            Some(Error::AddressOutOfBounds)
        );
        assert_eq!(
            SlicedDevice::new(&shared, Span::new(u32::MAX, 2)).err(),
            Some(Error::AddressOutOfBounds)
        );

        let mut window = SlicedDevice::new(&shared, Span::new(0x1000, 0x1000)).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(window.read(0xFFE, &mut buf), Err(Error::AddressOutOfBounds));
        assert!(!window.is_valid_read(0xFFE, 4));
        assert!(window.is_valid_read(0xFFC, 4));
        assert_eq!(window.size(), 0x1000);
    }

    #[test]
    fn test_window_geometry_is_absolute() {
        let shared = RefCell::new(MockDevice::new(0x4000, 4, 4, 0x400));
        let window = SlicedDevice::new(&shared, Span::new(0x202, 0x800)).unwrap();
        // 0x202 + 0x2 is word aligned on the device even though 0x2 is not
        assert!(window.is_valid_read(0x2, 4));
        assert!(!window.is_valid_read(0x0, 4));
        assert_eq!(window.erase_size_at(0), 0x400);
    }

    #[test]
    fn test_window_busy() {
        let shared = RefCell::new(MockDevice::new(0x1000, 1, 1, 0x400));
        let mut window = SlicedDevice::new(&shared, Span::new(0, 0x1000)).unwrap();
        let _guard = shared.borrow_mut();
        assert_eq!(window.init(), Err(Error::DeviceBusy));
        assert_eq!(window.erase_size_at(0), 0);
    }
}
