//! CLI argument parsing

use clap::{Parser, Subcommand};
use flashmap_core::AreaId;
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
pub fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse an area name (primary, secondary, scratch) or raw id
fn parse_area(s: &str) -> Result<AreaId, String> {
    if let Ok(id) = s.parse::<AreaId>() {
        return Ok(id);
    }
    let raw = parse_hex_u32(s).map_err(|_| format!("Unknown area: {}", s))?;
    u8::try_from(raw)
        .ok()
        .and_then(|raw| AreaId::try_from(raw).ok())
        .ok_or_else(|| format!("Unknown area: {}", s))
}

#[derive(Parser)]
#[command(name = "flashmap")]
#[command(author, version, about = "Boot loader flash map inspector", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Board description (TOML format)
    #[arg(short, long, global = true, default_value = "board.toml")]
    pub board: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the build mode, placement and every area descriptor
    Layout,

    /// Validate the placement against the board
    Check,

    /// List the erase sectors of an area
    Sectors {
        /// Area name (primary, secondary, scratch) or id
        #[arg(short, long, value_parser = parse_area)]
        area: AreaId,
    },

    /// Read area contents
    Read {
        /// Area name (primary, secondary, scratch) or id
        #[arg(short, long, value_parser = parse_area)]
        area: AreaId,

        /// Offset within the area (hex or decimal)
        #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
        offset: u32,

        /// Number of bytes to read (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        length: u32,

        /// Write raw bytes to this file instead of a hexdump
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check whether a range of an area is erased
    IsEmpty {
        /// Area name (primary, secondary, scratch) or id
        #[arg(short, long, value_parser = parse_area)]
        area: AreaId,

        /// Offset within the area (hex or decimal)
        #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
        offset: u32,

        /// Number of bytes to check (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        length: u32,
    },

    /// Erase an area, or a sector-aligned range of it
    Erase {
        /// Area name (primary, secondary, scratch) or id
        #[arg(short, long, value_parser = parse_area)]
        area: AreaId,

        /// Start offset for partial erase (hex, e.g., 0x1000)
        #[arg(long, value_parser = parse_hex_u32)]
        offset: Option<u32>,

        /// Length of range to erase (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        length: Option<u32>,
    },

    /// Program a file into an area
    Write {
        /// Area name (primary, secondary, scratch) or id
        #[arg(short, long, value_parser = parse_area)]
        area: AreaId,

        /// Offset within the area (hex or decimal)
        #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
        offset: u32,

        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },
}
