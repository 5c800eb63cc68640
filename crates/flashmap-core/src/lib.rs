//! flashmap-core - Flash-area layer for boot loaders
//!
//! This crate maps the three logical regions a swap-capable boot loader
//! works with (primary slot, secondary slot and scratch) onto raw block
//! devices. It computes region placement from build-time constants,
//! reference-counts device initialization, dispatches read/write/erase
//! requests and enumerates erase sectors. It is `no_std` compatible.
//!
//! # Features
//!
//! - `std` - Enable standard library support (includes `alloc`) and TOML
//!   loading of [`MapConfig`]
//! - `alloc` - Enable heap-allocated sector tables
//!
//! # Example
//!
//! ```ignore
//! use core::cell::RefCell;
//! use flashmap_core::{AreaId, FlashMap, MapConfig, NorFlashDevice, SlicedDevice};
//!
//! const CONFIG: MapConfig = MapConfig::application(0x10000, 0x20000, 0x200, 0x1000, 128);
//!
//! fn run(internal: impl NorFlash, external: &mut impl BlockDevice) -> flashmap_core::Result<()> {
//!     let placement = CONFIG.placement()?;
//!     let internal = RefCell::new(NorFlashDevice::new(internal));
//!     let mut primary = SlicedDevice::new(&internal, placement.primary)?;
//!     let mut scratch = SlicedDevice::new(&internal, placement.scratch)?;
//!
//!     let mut map = FlashMap::new(CONFIG, &mut primary, &mut scratch)?.with_secondary(external);
//!     map.initialize()?;
//!
//!     let area = map.open(AreaId::Primary.into())?;
//!     let mut magic = [0u8; 16];
//!     map.read(&area, area.size - 16, &mut magic)?;
//!     map.close(&area)
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod area;
pub mod device;
pub mod error;
pub mod map;
pub mod nor;
pub mod placement;
pub mod slice;

#[cfg(test)]
mod mock;

pub use area::{
    area_id_from_image_slot, area_id_from_multi_image_slot, area_id_to_image_slot,
    area_id_to_multi_image_slot, AreaId, FlashArea, FlashSector,
};
pub use device::BlockDevice;
pub use error::{Error, Result};
pub use map::{FlashMap, Rejected, SectorScan, SectorTable, MAX_READ_SIZE};
pub use nor::NorFlashDevice;
pub use placement::{BuildMode, MapConfig, Placement, Span};
pub use slice::SlicedDevice;
