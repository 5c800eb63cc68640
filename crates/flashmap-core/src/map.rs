//! Flash area dispatcher
//!
//! `FlashMap` is the context object a boot loader owns for the whole of its
//! run. It holds the device table, the area descriptors and the open counts,
//! and exposes the operations the image and swap logic call: open/close,
//! read/write/erase, alignment queries, erased-range checks and sector
//! enumeration.
//!
//! # Reference counting
//!
//! Every `open` of an area increments its counter and every `close`
//! decrements it. The backing device is initialized on the 0 -> 1
//! transition and deinitialized on the 1 -> 0 transition; intermediate
//! opens hand back the same descriptor without touching the device.
//!
//! # Read emulation
//!
//! Some devices only read in units larger than a byte. A read the device
//! cannot serve natively is emulated by reading one full read unit at the
//! requested offset into a zeroed buffer and copying the requested prefix
//! out of it. Requests longer than one read unit are rejected.

use crate::area::{AreaId, FlashArea, FlashSector};
use crate::device::BlockDevice;
use crate::error::{Error, Result};
use crate::placement::{MapConfig, Placement};

/// Largest device read unit the read emulation can buffer
pub const MAX_READ_SIZE: usize = 512;

/// Outcome of a sector enumeration into a caller buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorScan {
    /// Number of sectors written to the buffer
    pub count: usize,
    /// The device had more sectors than the limit allowed
    pub truncated: bool,
}

/// Sector table collected into a fixed-capacity vector
#[derive(Debug, Clone)]
pub struct SectorTable<const N: usize> {
    /// Sectors in address order
    pub sectors: heapless::Vec<FlashSector, N>,
    /// The device had more sectors than the limit allowed
    pub truncated: bool,
}

/// Flash map context
///
/// Construct it once with the primary and scratch devices, supply the
/// secondary device, call [`initialize`](Self::initialize) and pass it by
/// `&mut` to everything that touches flash.
///
/// # Example
///
/// ```ignore
/// let mut map = FlashMap::new(CONFIG, &mut primary, &mut scratch)?
///     .with_secondary(&mut external);
/// map.initialize()?;
///
/// let area = map.open(AreaId::Secondary.into())?;
/// let mut header = [0u8; 32];
/// map.read(&area, 0, &mut header)?;
/// map.close(&area)?;
/// ```
/// A device [`FlashMap::set_secondary`] refused to take
pub struct Rejected<'d> {
    pub error: Error,
    pub device: &'d mut dyn BlockDevice,
}

impl core::fmt::Debug for Rejected<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Rejected")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl From<Rejected<'_>> for Error {
    fn from(rejected: Rejected<'_>) -> Self {
        rejected.error
    }
}

pub struct FlashMap<'d> {
    config: MapConfig,
    placement: Placement,
    devices: [Option<&'d mut dyn BlockDevice>; AreaId::COUNT],
    areas: [FlashArea; AreaId::COUNT],
    open_count: [u8; AreaId::COUNT],
    deinit_failures: u32,
}

impl<'d> FlashMap<'d> {
    /// Create a flash map over the internal primary and scratch devices
    ///
    /// The placement is resolved here, once; the secondary device must be
    /// supplied with [`with_secondary`](Self::with_secondary) or
    /// [`set_secondary`](Self::set_secondary) before it is used.
    ///
    /// # Errors
    /// * `InvalidPlacement` - If the configuration does not resolve
    pub fn new(
        config: MapConfig,
        primary: &'d mut dyn BlockDevice,
        scratch: &'d mut dyn BlockDevice,
    ) -> Result<Self> {
        let placement = config.placement()?;
        Ok(Self {
            config,
            placement,
            devices: [Some(primary), None, Some(scratch)],
            areas: AreaId::ALL.map(FlashArea::empty),
            open_count: [0; AreaId::COUNT],
            deinit_failures: 0,
        })
    }

    /// Supply the secondary (update candidate) device
    pub fn with_secondary(mut self, secondary: &'d mut dyn BlockDevice) -> Self {
        self.devices[AreaId::Secondary.index()] = Some(secondary);
        self
    }

    /// Supply or replace the secondary device
    ///
    /// A rejected device is handed back inside the error so the caller can
    /// retry once the open areas are closed.
    ///
    /// # Errors
    /// * `AreaBusy` - If any area is currently open
    pub fn set_secondary(
        &mut self,
        secondary: &'d mut dyn BlockDevice,
    ) -> core::result::Result<(), Rejected<'d>> {
        if self.open_count.iter().any(|&n| n > 0) {
            log::error!("Cannot replace the secondary device while areas are open");
            return Err(Rejected {
                error: Error::AreaBusy,
                device: secondary,
            });
        }
        self.devices[AreaId::Secondary.index()] = Some(secondary);
        Ok(())
    }

    /// The configuration this map was built from
    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// The resolved internal-flash placement
    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    /// Number of open handles on an area
    pub fn open_count(&self, id: AreaId) -> u8 {
        self.open_count[id.index()]
    }

    /// Number of device deinit failures seen by `close`
    pub fn deinit_failures(&self) -> u32 {
        self.deinit_failures
    }

    fn device(&self, id: AreaId) -> Result<&(dyn BlockDevice + 'd)> {
        self.devices[id.index()]
            .as_deref()
            .ok_or(Error::DeviceMissing(id))
    }

    fn device_mut(&mut self, id: AreaId) -> Result<&mut (dyn BlockDevice + 'd)> {
        self.devices[id.index()]
            .as_deref_mut()
            .ok_or(Error::DeviceMissing(id))
    }

    fn open_device(&mut self, area: &FlashArea) -> Result<&mut (dyn BlockDevice + 'd)> {
        if self.open_count[area.id.index()] == 0 {
            log::warn!("Access to {} area without an open handle", area.id);
            return Err(Error::NotOpen);
        }
        self.device_mut(area.id)
    }

    /// Physically initialize every backing device
    ///
    /// Runs once at startup before any area is opened. The first open of
    /// each area initializes its device again; devices must tolerate that.
    ///
    /// # Errors
    /// * `DeviceMissing` - If no secondary device was supplied
    /// * Any error returned by a device's `init`
    pub fn initialize(&mut self) -> Result<()> {
        for id in AreaId::ALL {
            self.device(id)?;
        }

        for id in AreaId::ALL {
            log::debug!("Initializing {} device", id);
            self.device_mut(id)?.init().inspect_err(|e| {
                log::error!("Failed to initialize {} device: {}", id, e);
            })?;
        }

        Ok(())
    }

    /// Open an area by raw id
    ///
    /// # Errors
    /// * `UnknownArea` - If `id` is not a valid area id; no state is touched
    /// * `DeviceMissing` - If the area has no backing device
    /// * `OpenCountOverflow` - If the area is already open too many times
    /// * Any error returned by the device's `init` on first open
    pub fn open(&mut self, id: u8) -> Result<FlashArea> {
        let id = AreaId::try_from(id).inspect_err(|_| {
            log::error!("Attempt to open unknown flash area {}", id);
        })?;
        let idx = id.index();

        let count = self.open_count[idx];
        let next = count.checked_add(1).ok_or(Error::OpenCountOverflow)?;
        if count > 0 {
            self.open_count[idx] = next;
            log::trace!("{} area already open, count {}", id, next);
            return Ok(self.areas[idx]);
        }

        let off = match id {
            AreaId::Primary => self.placement.primary.start,
            AreaId::Secondary => 0,
            AreaId::Scratch => self.placement.scratch.start,
        };

        let device = self.device_mut(id)?;
        let size = device.size();
        device.init().inspect_err(|e| {
            log::error!("Failed to initialize {} device on open: {}", id, e);
        })?;

        let area = FlashArea {
            id,
            device_id: 0,
            off,
            size,
        };
        self.areas[idx] = area;
        self.open_count[idx] = next;
        log::debug!("Opened {}", area);

        Ok(area)
    }

    /// Release a handle obtained from `open`
    ///
    /// The device is deinitialized when the last handle is closed. A deinit
    /// failure still closes the area; it is logged, counted and returned.
    ///
    /// # Errors
    /// * `NotOpen` - If the area has no open handles
    /// * Any error returned by the device's `deinit`
    pub fn close(&mut self, area: &FlashArea) -> Result<()> {
        let idx = area.id.index();
        match self.open_count[idx] {
            0 => {
                log::warn!("Close of {} area without a matching open", area.id);
                Err(Error::NotOpen)
            }
            1 => {
                self.open_count[idx] = 0;
                log::debug!("Closing {}", area);
                let result = self.device_mut(area.id)?.deinit();
                if let Err(e) = result {
                    self.deinit_failures += 1;
                    log::warn!("Failed to deinitialize {} device: {}", area.id, e);
                }
                result
            }
            n => {
                self.open_count[idx] = n - 1;
                Ok(())
            }
        }
    }

    /// Read area contents into `buf`
    ///
    /// Reads the device cannot serve natively are emulated through a full
    /// read unit at `off`; only `buf.len()` bytes of it are copied out.
    ///
    /// # Errors
    /// * `NotOpen` - If the area has no open handles
    /// * `ReadExceedsGranularity` - If an emulated read is longer than one read unit
    /// * `BufferTooSmall` - If the device read unit exceeds [`MAX_READ_SIZE`]
    /// * Any error returned by the device's `read`
    pub fn read(&mut self, area: &FlashArea, off: u32, buf: &mut [u8]) -> Result<()> {
        let device = self.open_device(area)?;
        log::trace!("Read {} area: 0x{:08X}+{}", area.id, off, buf.len());

        if buf.is_empty() {
            return Ok(());
        }
        if device.is_valid_read(off, buf.len()) {
            return device.read(off, buf);
        }

        let read_size = device.read_size();
        if buf.len() > read_size as usize {
            return Err(Error::ReadExceedsGranularity {
                len: buf.len(),
                read_size,
            });
        }
        if read_size as usize > MAX_READ_SIZE {
            return Err(Error::BufferTooSmall);
        }

        let mut unit = [0u8; MAX_READ_SIZE];
        let unit = &mut unit[..read_size as usize];
        device.read(off, unit)?;
        buf.copy_from_slice(&unit[..buf.len()]);
        Ok(())
    }

    /// Program `data` into the area
    ///
    /// # Errors
    /// * `NotOpen` - If the area has no open handles
    /// * Any error returned by the device's `program`
    pub fn write(&mut self, area: &FlashArea, off: u32, data: &[u8]) -> Result<()> {
        let device = self.open_device(area)?;
        log::trace!("Write {} area: 0x{:08X}+{}", area.id, off, data.len());
        device.program(off, data)
    }

    /// Erase `len` bytes of the area starting at `off`
    ///
    /// # Errors
    /// * `NotOpen` - If the area has no open handles
    /// * Any error returned by the device's `erase`
    pub fn erase(&mut self, area: &FlashArea, off: u32, len: u32) -> Result<()> {
        let device = self.open_device(area)?;
        log::trace!("Erase {} area: 0x{:08X}+{}", area.id, off, len);
        device.erase(off, len)
    }

    /// Minimum program unit of the area's device
    pub fn align(&mut self, area: &FlashArea) -> Result<u32> {
        Ok(self.open_device(area)?.program_size())
    }

    /// Byte value the area reads back as after an erase
    pub fn erased_value(&mut self, area: &FlashArea) -> Result<u8> {
        Ok(self.open_device(area)?.erase_value())
    }

    /// Read into `buf` and report whether every byte is erased
    ///
    /// # Errors
    /// Any error from [`read`](Self::read); a failed read is never reported
    /// as "not empty".
    pub fn is_empty(&mut self, area: &FlashArea, off: u32, buf: &mut [u8]) -> Result<bool> {
        self.read(area, off, buf)?;
        let erased = self.erased_value(area)?;
        Ok(buf.iter().all(|&b| b == erased))
    }

    // Walk the device's erase blocks from offset 0 while it still accepts reads.
    fn scan_sectors(
        &self,
        id: u8,
        limit: usize,
        mut push: impl FnMut(FlashSector) -> Result<()>,
    ) -> Result<SectorScan> {
        let id = AreaId::try_from(id)?;
        let device = self.device(id)?;
        let limit = limit.min(self.config.max_img_sectors as usize);
        let read_size = device.read_size() as usize;

        let mut offset = 0u32;
        let mut count = 0;
        let mut truncated = false;
        while device.is_valid_read(offset, read_size) {
            if count == limit {
                truncated = true;
                break;
            }
            let size = device.erase_size_at(offset);
            if size == 0 {
                log::error!("{} device reports a zero-sized sector at 0x{:08X}", id, offset);
                return Err(Error::InvalidGeometry);
            }
            push(FlashSector { off: offset, size })?;
            count += 1;
            match offset.checked_add(size) {
                Some(next) => offset = next,
                None => break,
            }
        }

        if truncated {
            log::warn!(
                "{} area has more than {} sectors; sector table truncated at 0x{:08X}",
                id,
                limit,
                offset
            );
        }

        Ok(SectorScan { count, truncated })
    }

    /// Enumerate the erase sectors of an area's device into `sectors`
    ///
    /// At most `min(sectors.len(), max_img_sectors)` entries are written.
    /// A device with more sectors than that is not an error; the scan
    /// reports `truncated` instead. The area does not need to be open.
    ///
    /// # Errors
    /// * `UnknownArea` - If `id` is not a valid area id
    /// * `DeviceMissing` - If the area has no backing device
    /// * `InvalidGeometry` - If the device reports a zero-sized sector
    pub fn get_sectors(&self, id: u8, sectors: &mut [FlashSector]) -> Result<SectorScan> {
        let mut next = 0;
        self.scan_sectors(id, sectors.len(), |sector| {
            sectors[next] = sector;
            next += 1;
            Ok(())
        })
    }

    /// Enumerate the erase sectors of an area into a fixed-capacity table
    pub fn sector_table<const N: usize>(&self, id: u8) -> Result<SectorTable<N>> {
        let mut sectors = heapless::Vec::new();
        let scan = self.scan_sectors(id, N, |sector| {
            sectors.push(sector).map_err(|_| Error::BufferTooSmall)
        })?;
        Ok(SectorTable {
            sectors,
            truncated: scan.truncated,
        })
    }

    /// Enumerate the erase sectors of an area, up to `max_img_sectors`
    #[cfg(feature = "alloc")]
    pub fn sectors(&self, id: u8) -> Result<alloc::vec::Vec<FlashSector>> {
        let mut sectors = alloc::vec::Vec::new();
        self.scan_sectors(id, usize::MAX, |sector| {
            sectors.push(sector);
            Ok(())
        })?;
        Ok(sectors)
    }
}
