//! Flash area types
//!
//! Identifiers and descriptors for the three areas a swap-capable boot
//! loader operates on, plus the slot/area translation helpers.

use core::fmt;

use crate::error::{Error, Result};

/// Logical flash area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "std", serde(rename_all = "lowercase"))]
#[repr(u8)]
pub enum AreaId {
    /// Loadable image slot
    Primary = 0,
    /// Update candidate slot
    Secondary = 1,
    /// Swap staging space
    Scratch = 2,
}

impl AreaId {
    /// Number of areas in the map
    pub const COUNT: usize = 3;

    /// All areas, in id order
    pub const ALL: [AreaId; AreaId::COUNT] = [AreaId::Primary, AreaId::Secondary, AreaId::Scratch];

    /// Table index for this area
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Lowercase name used in logs and on the command line
    pub const fn name(self) -> &'static str {
        match self {
            AreaId::Primary => "primary",
            AreaId::Secondary => "secondary",
            AreaId::Scratch => "scratch",
        }
    }
}

impl TryFrom<u8> for AreaId {
    type Error = Error;

    fn try_from(id: u8) -> Result<Self> {
        match id {
            0 => Ok(AreaId::Primary),
            1 => Ok(AreaId::Secondary),
            2 => Ok(AreaId::Scratch),
            _ => Err(Error::UnknownArea(id)),
        }
    }
}

impl From<AreaId> for u8 {
    fn from(id: AreaId) -> u8 {
        id as u8
    }
}

impl fmt::Display for AreaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl core::str::FromStr for AreaId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        AreaId::ALL
            .into_iter()
            .find(|id| id.name().eq_ignore_ascii_case(s))
            .ok_or(Error::ConfigError)
    }
}

/// Descriptor of an open flash area
///
/// Returned by [`FlashMap::open`](crate::FlashMap::open) and passed back to
/// every dispatch call. `off` is the physical placement of the area; request
/// offsets are always relative to the area (and its backing device).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashArea {
    /// Which area this is
    pub id: AreaId,
    /// Device namespace; always 0
    pub device_id: u8,
    /// Physical byte offset of the area start
    pub off: u32,
    /// Area size in bytes, as reported by the backing device
    pub size: u32,
}

impl FlashArea {
    pub(crate) const fn empty(id: AreaId) -> Self {
        Self {
            id,
            device_id: 0,
            off: 0,
            size: 0,
        }
    }

    /// Physical end address (exclusive)
    pub fn end(&self) -> u64 {
        self.off as u64 + self.size as u64
    }

    /// Check if an area-relative range lies within this area
    pub fn contains(&self, off: u32, len: u32) -> bool {
        off as u64 + len as u64 <= self.size as u64
    }
}

impl fmt::Display for FlashArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ 0x{:08X} (+0x{:08X})", self.id, self.off, self.size)
    }
}

/// One erase sector of a backing device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlashSector {
    /// Offset from the start of the device
    pub off: u32,
    /// Sector size in bytes
    pub size: u32,
}

/// Map an image slot number to its area (single-image builds)
pub fn area_id_from_image_slot(slot: u8) -> Result<AreaId> {
    AreaId::try_from(slot)
}

/// Map an area to its image slot number (single-image builds)
pub fn area_id_to_image_slot(id: AreaId) -> u8 {
    id.into()
}

/// Map a slot of the given image to its area
///
/// Only image 0 is laid out; any other image index is rejected instead of
/// being folded onto the primary area.
pub fn area_id_from_multi_image_slot(image_index: u8, slot: u8) -> Result<AreaId> {
    match image_index {
        0 => area_id_from_image_slot(slot),
        _ => {
            log::error!("No flash areas are laid out for image {}", image_index);
            Err(Error::MultiImageUnsupported { image_index })
        }
    }
}

/// Map an area of the given image to its slot number
pub fn area_id_to_multi_image_slot(image_index: u8, id: AreaId) -> Result<u8> {
    match image_index {
        0 => Ok(area_id_to_image_slot(id)),
        _ => {
            log::error!("No flash areas are laid out for image {}", image_index);
            Err(Error::MultiImageUnsupported { image_index })
        }
    }
}
