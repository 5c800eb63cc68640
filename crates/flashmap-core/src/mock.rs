//! Recording block device used by the unit tests

use std::cell::Cell;
use std::rc::Rc;
use std::vec;
use std::vec::Vec;

use crate::device::BlockDevice;
use crate::error::{Error, Result};

/// In-memory block device that counts calls and can be told to fail
///
/// Call counters are shared so a test can watch them while the device is
/// lent to a `FlashMap`.
pub(crate) struct MockDevice {
    pub data: Vec<u8>,
    pub read_size: u32,
    pub program_size: u32,
    pub erase_size: u32,
    pub erase_value: u8,
    pub init_calls: Rc<Cell<usize>>,
    pub deinit_calls: Rc<Cell<usize>>,
    pub reads: Vec<(u32, usize)>,
    pub fail_init: bool,
    pub fail_deinit: bool,
    pub fail_read: bool,
}

impl MockDevice {
    pub fn new(size: u32, read_size: u32, program_size: u32, erase_size: u32) -> Self {
        Self {
            data: vec![0xFF; size as usize],
            read_size,
            program_size,
            erase_size,
            erase_value: 0xFF,
            init_calls: Rc::new(Cell::new(0)),
            deinit_calls: Rc::new(Cell::new(0)),
            reads: Vec::new(),
            fail_init: false,
            fail_deinit: false,
            fail_read: false,
        }
    }

    pub fn with_erase_value(mut self, value: u8) -> Self {
        self.erase_value = value;
        self.data.fill(value);
        self
    }
}

impl BlockDevice for MockDevice {
    fn init(&mut self) -> Result<()> {
        self.init_calls.set(self.init_calls.get() + 1);
        if self.fail_init {
            return Err(Error::InitFailed);
        }
        Ok(())
    }

    fn deinit(&mut self) -> Result<()> {
        self.deinit_calls.set(self.deinit_calls.get() + 1);
        if self.fail_deinit {
            return Err(Error::DeinitFailed);
        }
        Ok(())
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        self.reads.push((addr, buf.len()));
        if self.fail_read {
            return Err(Error::ReadError);
        }
        if !self.is_valid_read(addr, buf.len()) {
            return Err(Error::InvalidAlignment);
        }
        let start = addr as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    fn program(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        if !self.is_valid_program(addr, data.len()) {
            return Err(Error::InvalidAlignment);
        }
        let start = addr as usize;
        self.data[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn erase(&mut self, addr: u32, len: u32) -> Result<()> {
        if !self.is_valid_erase(addr, len) {
            return Err(Error::InvalidAlignment);
        }
        let start = addr as usize;
        let value = self.erase_value;
        self.data[start..start + len as usize].fill(value);
        Ok(())
    }

    fn size(&self) -> u32 {
        self.data.len() as u32
    }

    fn read_size(&self) -> u32 {
        self.read_size
    }

    fn program_size(&self) -> u32 {
        self.program_size
    }

    fn erase_size_at(&self, _addr: u32) -> u32 {
        self.erase_size
    }

    fn erase_value(&self) -> u8 {
        self.erase_value
    }
}
