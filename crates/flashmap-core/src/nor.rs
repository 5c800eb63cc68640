//! `embedded-storage` adapter
//!
//! Most HAL crates expose their internal flash (and many SPI NOR drivers
//! their external flash) through `embedded_storage::nor_flash::NorFlash`.
//! `NorFlashDevice` turns any such driver into a [`BlockDevice`].

use embedded_storage::nor_flash::{NorFlash, NorFlashError, NorFlashErrorKind};

use crate::device::BlockDevice;
use crate::error::{Error, Result};

/// Block device backed by a `NorFlash` driver
///
/// NOR drivers are ready once constructed, so `init`/`deinit` only track
/// state. Read, program and erase granularities come from the driver's
/// associated constants; the erase value defaults to `0xFF`.
pub struct NorFlashDevice<F: NorFlash> {
    flash: F,
    erase_value: u8,
    initialized: bool,
}

impl<F: NorFlash> NorFlashDevice<F> {
    /// Wrap a NOR flash driver
    pub fn new(flash: F) -> Self {
        Self {
            flash,
            erase_value: 0xFF,
            initialized: false,
        }
    }

    /// Override the erased byte value (some parts erase to 0x00)
    pub fn with_erase_value(mut self, value: u8) -> Self {
        self.erase_value = value;
        self
    }

    /// Whether `init` has been called without a matching `deinit`
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Give back the wrapped driver
    pub fn into_inner(self) -> F {
        self.flash
    }
}

fn map_error<E: NorFlashError>(err: E, fallback: Error) -> Error {
    match err.kind() {
        NorFlashErrorKind::NotAligned => Error::InvalidAlignment,
        NorFlashErrorKind::OutOfBounds => Error::AddressOutOfBounds,
        _ => fallback,
    }
}

impl<F: NorFlash> BlockDevice for NorFlashDevice<F> {
    fn init(&mut self) -> Result<()> {
        self.initialized = true;
        Ok(())
    }

    fn deinit(&mut self) -> Result<()> {
        self.initialized = false;
        Ok(())
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        self.flash
            .read(addr, buf)
            .map_err(|e| map_error(e, Error::ReadError))
    }

    fn program(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        self.flash
            .write(addr, data)
            .map_err(|e| map_error(e, Error::ProgramError))
    }

    fn erase(&mut self, addr: u32, len: u32) -> Result<()> {
        let end = addr.checked_add(len).ok_or(Error::AddressOutOfBounds)?;
        self.flash
            .erase(addr, end)
            .map_err(|e| map_error(e, Error::EraseError))
    }

    fn size(&self) -> u32 {
        self.flash.capacity() as u32
    }

    fn read_size(&self) -> u32 {
        F::READ_SIZE as u32
    }

    fn program_size(&self) -> u32 {
        F::WRITE_SIZE as u32
    }

    fn erase_size_at(&self, _addr: u32) -> u32 {
        F::ERASE_SIZE as u32
    }

    fn erase_value(&self) -> u8 {
        self.erase_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_storage::nor_flash::{ErrorType, ReadNorFlash};

    #[derive(Debug)]
    struct RamError(NorFlashErrorKind);

    impl NorFlashError for RamError {
        fn kind(&self) -> NorFlashErrorKind {
            self.0
        }
    }

    struct RamFlash {
        data: [u8; 0x800],
    }

    impl ErrorType for RamFlash {
        type Error = RamError;
    }

    impl ReadNorFlash for RamFlash {
        const READ_SIZE: usize = 1;

        fn read(&mut self, offset: u32, bytes: &mut [u8]) -> core::result::Result<(), RamError> {
            let start = offset as usize;
            let end = start + bytes.len();
            if end > self.data.len() {
                return Err(RamError(NorFlashErrorKind::OutOfBounds));
            }
            bytes.copy_from_slice(&self.data[start..end]);
            Ok(())
        }

        fn capacity(&self) -> usize {
            self.data.len()
        }
    }

    impl NorFlash for RamFlash {
        const WRITE_SIZE: usize = 4;
        const ERASE_SIZE: usize = 0x200;

        fn erase(&mut self, from: u32, to: u32) -> core::result::Result<(), RamError> {
            if from as usize % Self::ERASE_SIZE != 0 || to as usize % Self::ERASE_SIZE != 0 {
                return Err(RamError(NorFlashErrorKind::NotAligned));
            }
            self.data[from as usize..to as usize].fill(0xFF);
            Ok(())
        }

        fn write(&mut self, offset: u32, bytes: &[u8]) -> core::result::Result<(), RamError> {
            if offset as usize % Self::WRITE_SIZE != 0 {
                return Err(RamError(NorFlashErrorKind::NotAligned));
            }
            let start = offset as usize;
            self.data[start..start + bytes.len()].copy_from_slice(bytes);
            Ok(())
        }
    }

    #[test]
    fn test_geometry_from_driver() {
        let dev = NorFlashDevice::new(RamFlash { data: [0xFF; 0x800] });
        assert_eq!(dev.size(), 0x800);
        assert_eq!(dev.read_size(), 1);
        assert_eq!(dev.program_size(), 4);
        assert_eq!(dev.erase_size_at(0x600), 0x200);
        assert_eq!(dev.erase_value(), 0xFF);
    }

    #[test]
    fn test_program_erase() {
        let mut dev = NorFlashDevice::new(RamFlash { data: [0xFF; 0x800] });
        dev.init().unwrap();
        assert!(dev.is_initialized());

        dev.program(0x204, &[1, 2, 3, 4]).unwrap();
        let mut buf = [0u8; 4];
        dev.read(0x204, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);

        dev.erase(0x200, 0x200).unwrap();
        dev.read(0x204, &mut buf).unwrap();
        assert_eq!(buf, [0xFF; 4]);
    }

    #[test]
    fn test_error_mapping() {
        let mut dev = NorFlashDevice::new(RamFlash { data: [0xFF; 0x800] });
        assert_eq!(dev.program(0x2, &[0; 4]), Err(Error::InvalidAlignment));
        assert_eq!(dev.erase(0x100, 0x200), Err(Error::InvalidAlignment));
        let mut buf = [0u8; 4];
        assert_eq!(dev.read(0x7FE, &mut buf), Err(Error::AddressOutOfBounds));
        assert_eq!(dev.erase(u32::MAX, 2), Err(Error::AddressOutOfBounds));
    }
}
