//! Region placement
//!
//! Computes where the primary and scratch areas live in internal flash from
//! the constants the build system hands to the boot loader (or to the
//! application that shares its flash map). The secondary area always lives
//! at offset 0 of its own device and is not described here.
//!
//! Two build modes exist:
//!
//! - **Bootloader**: the boot loader image is size-restricted and the build
//!   reports everything after it as `post_application_addr/size`. The
//!   primary slot (header included) starts right there and the scratch area
//!   is carved off its end.
//! - **Application**: the application is linked at `application_addr` with
//!   `application_size`. The slot header sits immediately before the code,
//!   and scratch starts right after the application.
//!
//! ```text
//!  bootloader mode                         application mode
//!  post_application_addr                   application_addr - header_size
//!  |                                       |
//!  v                                       v
//!  +--------+-------------------+-------+  +--------+-----------------+-------+
//!  | header | application       | scr.  |  | header | application     | scr.  |
//!  +--------+-------------------+-------+  +--------+-----------------+-------+
//!  |<--- post_application_size -------->|           |<-- app size --->|
//! ```

#[cfg(feature = "std")]
mod toml;

#[cfg(feature = "std")]
pub use self::toml::{deserialize_number, parse_size};

use crate::error::{Error, Result};

/// Build mode selecting which placement constants apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "std", serde(tag = "kind", rename_all = "kebab-case"))]
pub enum BuildMode {
    /// Building the boot loader itself
    Bootloader {
        /// First address after the boot loader image
        #[cfg_attr(feature = "std", serde(deserialize_with = "toml::deserialize_number"))]
        post_application_addr: u32,
        /// Bytes of internal flash from `post_application_addr` to the end
        #[cfg_attr(feature = "std", serde(deserialize_with = "toml::deserialize_number"))]
        post_application_size: u32,
    },
    /// Building an application that runs from the primary slot
    Application {
        /// Link address of the application's first instruction
        #[cfg_attr(feature = "std", serde(deserialize_with = "toml::deserialize_number"))]
        application_addr: u32,
        /// Size reserved for the application code
        #[cfg_attr(feature = "std", serde(deserialize_with = "toml::deserialize_number"))]
        application_size: u32,
    },
}

impl BuildMode {
    /// Short name of the mode
    pub const fn name(&self) -> &'static str {
        match self {
            BuildMode::Bootloader { .. } => "bootloader",
            BuildMode::Application { .. } => "application",
        }
    }
}

/// Build-time flash map configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub struct MapConfig {
    /// Active build mode
    pub mode: BuildMode,
    /// Size of the image header preceding the application code
    #[cfg_attr(feature = "std", serde(deserialize_with = "toml::deserialize_number"))]
    pub header_size: u32,
    /// Size of the scratch area
    #[cfg_attr(feature = "std", serde(deserialize_with = "toml::deserialize_number"))]
    pub scratch_size: u32,
    /// Upper bound on sectors reported per area
    #[cfg_attr(feature = "std", serde(deserialize_with = "toml::deserialize_number"))]
    pub max_img_sectors: u32,
}

impl MapConfig {
    /// Configuration for a boot loader build
    pub const fn bootloader(
        post_application_addr: u32,
        post_application_size: u32,
        header_size: u32,
        scratch_size: u32,
        max_img_sectors: u32,
    ) -> Self {
        Self {
            mode: BuildMode::Bootloader {
                post_application_addr,
                post_application_size,
            },
            header_size,
            scratch_size,
            max_img_sectors,
        }
    }

    /// Configuration for an application build
    pub const fn application(
        application_addr: u32,
        application_size: u32,
        header_size: u32,
        scratch_size: u32,
        max_img_sectors: u32,
    ) -> Self {
        Self {
            mode: BuildMode::Application {
                application_addr,
                application_size,
            },
            header_size,
            scratch_size,
            max_img_sectors,
        }
    }

    /// Compute the physical placement of the primary and scratch areas
    ///
    /// # Errors
    /// * `InvalidPlacement` - If any intermediate address under- or overflows
    pub fn placement(&self) -> Result<Placement> {
        let (primary_start, primary_size, app_start, scratch_start) = match self.mode {
            BuildMode::Bootloader {
                post_application_addr,
                post_application_size,
            } => {
                let start = post_application_addr;
                let size = post_application_size.checked_sub(self.scratch_size);
                let size = size.ok_or(Error::InvalidPlacement)?;
                let app = start.checked_add(self.header_size);
                let scratch = start.checked_add(size);
                (start, size, app, scratch)
            }
            BuildMode::Application {
                application_addr,
                application_size,
            } => {
                let start = application_addr.checked_sub(self.header_size);
                let size = application_size.checked_add(self.header_size);
                let scratch = application_addr.checked_add(application_size);
                (
                    start.ok_or(Error::InvalidPlacement)?,
                    size.ok_or(Error::InvalidPlacement)?,
                    Some(application_addr),
                    scratch,
                )
            }
        };

        let placement = Placement {
            primary: Span::new(primary_start, primary_size),
            primary_app_start: app_start.ok_or(Error::InvalidPlacement)?,
            scratch: Span::new(scratch_start.ok_or(Error::InvalidPlacement)?, self.scratch_size),
        };

        if placement.primary.checked_end().is_none() || placement.scratch.checked_end().is_none() {
            return Err(Error::InvalidPlacement);
        }

        log::debug!(
            "{} placement: primary 0x{:08X}+0x{:X} (app 0x{:08X}), scratch 0x{:08X}+0x{:X}",
            self.mode.name(),
            placement.primary.start,
            placement.primary.size,
            placement.primary_app_start,
            placement.scratch.start,
            placement.scratch.size
        );

        Ok(placement)
    }
}

/// Contiguous physical byte range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// First byte (inclusive)
    pub start: u32,
    /// Length in bytes
    pub size: u32,
}

impl Span {
    /// Create a new span
    pub const fn new(start: u32, size: u32) -> Self {
        Self { start, size }
    }

    /// End address (exclusive), `None` if it does not fit in 32 bits
    pub fn checked_end(&self) -> Option<u32> {
        self.start.checked_add(self.size)
    }

    /// Check if this span overlaps with another
    pub fn overlaps(&self, other: &Span) -> bool {
        let (a0, a1) = (self.start as u64, self.start as u64 + self.size as u64);
        let (b0, b1) = (other.start as u64, other.start as u64 + other.size as u64);
        a0 < b1 && b0 < a1
    }
}

/// Resolved placement of the internal-flash areas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Primary slot, header included
    pub primary: Span,
    /// Address of the first application byte in the primary slot
    pub primary_app_start: u32,
    /// Scratch area
    pub scratch: Span,
}

impl Placement {
    /// Check if the primary and scratch areas alias the same bytes
    pub fn overlaps(&self) -> bool {
        self.primary.overlaps(&self.scratch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: u32 = 0x200;
    const SCRATCH: u32 = 0x1000;

    #[test]
    fn test_application_placement() {
        let config = MapConfig::application(0x10000, 0x20000, HEADER, SCRATCH, 128);
        let placement = config.placement().unwrap();
        assert_eq!(placement.primary, Span::new(0x0FE00, 0x20200));
        assert_eq!(placement.primary_app_start, 0x10000);
        assert_eq!(placement.scratch, Span::new(0x30000, SCRATCH));
        assert!(!placement.overlaps());
    }

    #[test]
    fn test_bootloader_placement() {
        let config = MapConfig::bootloader(0x10000, 0x20000, HEADER, SCRATCH, 128);
        let placement = config.placement().unwrap();
        assert_eq!(placement.primary, Span::new(0x10000, 0x1F000));
        assert_eq!(placement.primary_app_start, 0x10200);
        assert_eq!(placement.scratch, Span::new(0x2F000, SCRATCH));
        assert_eq!(placement.scratch.checked_end(), Some(0x30000));
        assert!(!placement.overlaps());
    }

    #[test]
    fn test_modes_differ_for_same_constants() {
        let app = MapConfig::application(0x10000, 0x20000, HEADER, SCRATCH, 128);
        let boot = MapConfig::bootloader(0x10000, 0x20000, HEADER, SCRATCH, 128);
        assert_eq!(app.placement().unwrap().primary.start, 0x0FE00);
        assert_eq!(boot.placement().unwrap().primary.start, 0x10000);
    }

    #[test]
    fn test_placement_underflow() {
        let config = MapConfig::application(0x100, 0x20000, HEADER, SCRATCH, 128);
        assert_eq!(config.placement(), Err(Error::InvalidPlacement));

        let config = MapConfig::bootloader(0x10000, 0x800, HEADER, SCRATCH, 128);
        assert_eq!(config.placement(), Err(Error::InvalidPlacement));
    }

    #[test]
    fn test_placement_overflow() {
        let config = MapConfig::application(0xFFFF_0000, 0x10000, HEADER, SCRATCH, 128);
        assert_eq!(config.placement(), Err(Error::InvalidPlacement));
    }

    #[test]
    fn test_span_overlap() {
        let a = Span::new(0x1000, 0x1000);
        assert!(a.overlaps(&Span::new(0x1FFF, 1)));
        assert!(!a.overlaps(&Span::new(0x2000, 0x10)));
        assert!(!a.overlaps(&Span::new(0x0, 0x1000)));
    }
}
