//! flashmap-sim - In-memory block device emulator
//!
//! This crate provides `SimFlash`, a block device that emulates NOR-style
//! flash in memory with configurable geometry. It backs the host CLI and is
//! used to exercise complete flash maps in tests without real hardware.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
use alloc::vec;
#[cfg(feature = "alloc")]
use alloc::vec::Vec;

use flashmap_core::{BlockDevice, Error, Result};

/// Geometry of the emulated flash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimConfig {
    /// Flash size in bytes
    pub size: u32,
    /// Minimum read unit
    pub read_size: u32,
    /// Minimum program unit
    pub program_size: u32,
    /// Uniform erase block size
    pub erase_size: u32,
    /// Value of an erased byte
    pub erase_value: u8,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            size: 512 * 1024,
            read_size: 1,
            program_size: 4,
            erase_size: 4096,
            erase_value: 0xFF,
        }
    }
}

/// Operations that can be told to fail
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Faults {
    /// `init` returns `InitFailed`
    pub init: bool,
    /// `deinit` returns `DeinitFailed`
    pub deinit: bool,
    /// `read` returns `ReadError`
    pub read: bool,
    /// `program` returns `ProgramError`
    pub program: bool,
    /// `erase` returns `EraseError`
    pub erase: bool,
}

/// Emulated flash device
///
/// Programming can only clear bits (1 -> 0 for an 0xFF erase value), erasing
/// restores whole blocks to the erase value. Every `init`/`deinit` call is
/// counted so tests can check how a flash map drives the device.
#[cfg(feature = "alloc")]
pub struct SimFlash {
    config: SimConfig,
    data: Vec<u8>,
    faults: Faults,
    init_count: usize,
    deinit_count: usize,
    initialized: bool,
}

#[cfg(feature = "alloc")]
impl SimFlash {
    /// Create an erased flash with the given geometry
    pub fn new(config: SimConfig) -> Self {
        let data = vec![config.erase_value; config.size as usize];
        Self {
            config,
            data,
            faults: Faults::default(),
            init_count: 0,
            deinit_count: 0,
            initialized: false,
        }
    }

    /// Create a flash with pre-filled data
    ///
    /// Data beyond the flash size is ignored; a shorter image leaves the
    /// remainder erased.
    pub fn with_data(config: SimConfig, initial_data: &[u8]) -> Self {
        let mut flash = Self::new(config);
        let len = core::cmp::min(initial_data.len(), flash.data.len());
        flash.data[..len].copy_from_slice(&initial_data[..len]);
        flash
    }

    /// Get a reference to the flash data
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get a mutable reference to the flash data
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Get the configuration
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Configure fault injection
    pub fn faults_mut(&mut self) -> &mut Faults {
        &mut self.faults
    }

    /// Number of `init` calls so far
    pub fn init_count(&self) -> usize {
        self.init_count
    }

    /// Number of `deinit` calls so far
    pub fn deinit_count(&self) -> usize {
        self.deinit_count
    }

    /// Whether the last lifecycle call was a successful `init`
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn range(&self, addr: u32, len: usize) -> Result<core::ops::Range<usize>> {
        let start = addr as usize;
        let end = start.checked_add(len).ok_or(Error::AddressOutOfBounds)?;
        if end > self.data.len() {
            return Err(Error::AddressOutOfBounds);
        }
        Ok(start..end)
    }
}

#[cfg(feature = "alloc")]
impl BlockDevice for SimFlash {
    fn init(&mut self) -> Result<()> {
        self.init_count += 1;
        if self.faults.init {
            return Err(Error::InitFailed);
        }
        self.initialized = true;
        Ok(())
    }

    fn deinit(&mut self) -> Result<()> {
        self.deinit_count += 1;
        if self.faults.deinit {
            return Err(Error::DeinitFailed);
        }
        self.initialized = false;
        Ok(())
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        let range = self.range(addr, buf.len())?;
        if !self.is_valid_read(addr, buf.len()) {
            return Err(Error::InvalidAlignment);
        }
        if self.faults.read {
            return Err(Error::ReadError);
        }
        buf.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn program(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        let range = self.range(addr, data.len())?;
        if !self.is_valid_program(addr, data.len()) {
            return Err(Error::InvalidAlignment);
        }
        if self.faults.program {
            return Err(Error::ProgramError);
        }

        // Programming can only move bits away from the erased state
        let erased = self.config.erase_value;
        for (cell, &byte) in self.data[range].iter_mut().zip(data) {
            *cell = ((*cell ^ erased) | (byte ^ erased)) ^ erased;
        }
        Ok(())
    }

    fn erase(&mut self, addr: u32, len: u32) -> Result<()> {
        let range = self.range(addr, len as usize)?;
        if !self.is_valid_erase(addr, len) {
            return Err(Error::InvalidAlignment);
        }
        if self.faults.erase {
            return Err(Error::EraseError);
        }
        log::trace!("SimFlash erase 0x{:08X}+0x{:X}", addr, len);
        self.data[range].fill(self.config.erase_value);
        Ok(())
    }

    fn size(&self) -> u32 {
        self.config.size
    }

    fn read_size(&self) -> u32 {
        self.config.read_size
    }

    fn program_size(&self) -> u32 {
        self.config.program_size
    }

    fn erase_size_at(&self, _addr: u32) -> u32 {
        self.config.erase_size
    }

    fn erase_value(&self) -> u8 {
        self.config.erase_value
    }
}
