//! TOML map configuration parsing
//!
//! Parses flash map configurations in TOML format:
//!
//! ```toml
//! header_size = 0x200
//! scratch_size = "4 KiB"
//! max_img_sectors = 128
//!
//! [mode]
//! kind = "application"
//! application_addr = 0x10000
//! application_size = "128 KiB"
//! ```

use std::fs;
use std::path::Path;
use std::string::String;
use std::format;

use super::MapConfig;
use crate::error::{Error, Result};

/// Deserialize a u32 that can be an integer, hex (0x...) or a size string
pub fn deserialize_number<'de, D>(deserializer: D) -> core::result::Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    // Try to deserialize as a number first, then as a string
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HexOrInt {
        Int(u32),
        Str(String),
    }

    match HexOrInt::deserialize(deserializer)? {
        HexOrInt::Int(n) => Ok(n),
        HexOrInt::Str(s) => parse_size(&s).map_err(serde::de::Error::custom),
    }
}

/// Parse a size string like "4 KiB", "0x1000" or "4096"
pub fn parse_size(s: &str) -> core::result::Result<u32, String> {
    let s = s.trim();

    if let Ok(n) = s.parse::<u32>() {
        return Ok(n);
    }

    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u32::from_str_radix(hex.trim(), 16).map_err(|e| format!("invalid hex: {}", e));
    }

    let s_lower = s.to_lowercase();
    let (num_str, multiplier) = if let Some(n) = s_lower.strip_suffix("mib") {
        (n.trim(), 1024 * 1024)
    } else if let Some(n) = s_lower.strip_suffix("kib") {
        (n.trim(), 1024)
    } else if let Some(n) = s_lower.strip_suffix("b") {
        (n.trim(), 1)
    } else {
        return Err(format!("invalid size: {}", s));
    };

    let num: u32 = num_str.parse().map_err(|_| format!("invalid size: {}", s))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size out of range: {}", s))
}

impl MapConfig {
    /// Load a map configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|_| Error::ConfigError)?;
        Self::from_toml_str(&content)
    }

    /// Parse a map configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        ::toml::from_str(content).map_err(|e| {
            log::error!("Invalid map configuration: {}", e);
            Error::ConfigError
        })
    }
}
