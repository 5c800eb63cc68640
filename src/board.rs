//! Board description parsing
//!
//! A board file describes the placement constants and the flash devices the
//! map runs on (see `boards/example.toml`):
//!
//! ```toml
//! [placement]
//! header_size = "4 KiB"
//! scratch_size = "4 KiB"
//! max_img_sectors = 128
//!
//! [placement.mode]
//! kind = "application"
//! application_addr = 0x11000
//! application_size = "124 KiB"
//!
//! [internal]
//! size = "256 KiB"
//! erase_size = "4 KiB"
//! program_size = 4
//! image = "internal.bin"
//!
//! [secondary]
//! size = "128 KiB"
//! read_size = 4
//! erase_size = "4 KiB"
//! image = "secondary.bin"
//! ```
//!
//! Primary and scratch should start on an erase boundary of the internal
//! flash, otherwise whole-area erases fail.
//!
//! Relative image paths are resolved against the board file's directory.

use crate::error::{CliError, Result};
use flashmap_core::placement::deserialize_number;
use flashmap_core::MapConfig;
use flashmap_sim::{SimConfig, SimFlash};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

fn default_unit() -> u32 {
    1
}

fn default_erase_value() -> u8 {
    0xFF
}

/// Geometry and backing image of one emulated device
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceSpec {
    /// Device size in bytes
    #[serde(deserialize_with = "deserialize_number")]
    pub size: u32,
    /// Minimum read unit
    #[serde(default = "default_unit", deserialize_with = "deserialize_number")]
    pub read_size: u32,
    /// Minimum program unit
    #[serde(default = "default_unit", deserialize_with = "deserialize_number")]
    pub program_size: u32,
    /// Uniform erase block size
    #[serde(deserialize_with = "deserialize_number")]
    pub erase_size: u32,
    /// Value of an erased byte
    #[serde(default = "default_erase_value")]
    pub erase_value: u8,
    /// Raw image holding the device contents
    #[serde(default)]
    pub image: Option<PathBuf>,
}

impl DeviceSpec {
    /// Emulator configuration for this device
    pub fn sim_config(&self) -> SimConfig {
        SimConfig {
            size: self.size,
            read_size: self.read_size,
            program_size: self.program_size,
            erase_size: self.erase_size,
            erase_value: self.erase_value,
        }
    }

    /// Create the emulated device, loaded from its image if one exists
    pub fn load(&self) -> Result<SimFlash> {
        let config = self.sim_config();
        let Some(path) = &self.image else {
            return Ok(SimFlash::new(config));
        };
        if !path.exists() {
            log::info!("Image {} does not exist yet, starting erased", path.display());
            return Ok(SimFlash::new(config));
        }

        let data = fs::read(path)?;
        if data.len() > self.size as usize {
            log::warn!(
                "Image {} is larger than the device ({} > {} bytes), ignoring the tail",
                path.display(),
                data.len(),
                self.size
            );
        }
        log::debug!("Loaded {} bytes from {}", data.len(), path.display());
        Ok(SimFlash::with_data(config, &data))
    }

    /// Write device contents back to the image
    ///
    /// Returns `false` if the device has no image configured.
    pub fn save(&self, flash: &SimFlash) -> Result<bool> {
        let Some(path) = &self.image else {
            return Ok(false);
        };
        fs::write(path, flash.data())?;
        log::debug!("Saved {} bytes to {}", flash.data().len(), path.display());
        Ok(true)
    }
}

/// Complete board description
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Board {
    /// Build-time placement constants
    pub placement: MapConfig,
    /// Internal flash holding the primary and scratch areas
    pub internal: DeviceSpec,
    /// Device holding the secondary area
    #[serde(default)]
    pub secondary: Option<DeviceSpec>,
}

impl Board {
    /// Load a board description from a TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| CliError::Board {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut board = Self::from_toml_str(&content)?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for spec in core::iter::once(&mut board.internal).chain(board.secondary.as_mut()) {
            if let Some(image) = spec.image.as_mut() {
                if image.is_relative() {
                    *image = base.join(&*image);
                }
            }
        }

        Ok(board)
    }

    /// Parse a board description from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
