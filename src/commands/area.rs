//! Per-area command implementations

use super::format_size;
use crate::error::{CliError, Result};
use flashmap_core::{AreaId, FlashArea, FlashMap, FlashSector, SectorScan};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::Path;

const HEXDUMP_WIDTH: usize = 16;

/// Format `data` as a hexdump whose first byte lives at `base`
pub fn hexdump(base: u32, data: &[u8]) -> String {
    let mut out = String::new();
    for (i, line) in data.chunks(HEXDUMP_WIDTH).enumerate() {
        let addr = base as u64 + (i * HEXDUMP_WIDTH) as u64;
        out.push_str(&format!("{:08X}: ", addr));
        for col in 0..HEXDUMP_WIDTH {
            match line.get(col) {
                Some(b) => out.push_str(&format!("{:02X} ", b)),
                None => out.push_str("   "),
            }
            if col == 7 {
                out.push(' ');
            }
        }
        out.push('|');
        out.extend(line.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
        out.push_str("|\n");
    }
    out
}

fn open(map: &mut FlashMap<'_>, id: AreaId) -> Result<FlashArea> {
    let area = map.open(id.into())?;
    log::debug!("Opened {}", area);
    Ok(area)
}

// Run `f` on an open handle and close it again, keeping the first error.
fn with_area<'d, T>(
    map: &mut FlashMap<'d>,
    id: AreaId,
    f: impl FnOnce(&mut FlashMap<'d>, &FlashArea) -> Result<T>,
) -> Result<T> {
    let area = open(map, id)?;
    let result = f(map, &area);
    let closed = map.close(&area);
    let value = result?;
    closed?;
    Ok(value)
}

fn check_range(area: &FlashArea, offset: u32, length: u32) -> Result<()> {
    if !area.contains(offset, length) {
        return Err(CliError::Usage(format!(
            "Range 0x{:08X}+0x{:X} is outside the {} area (size 0x{:X})",
            offset, length, area.id, area.size
        )));
    }
    Ok(())
}

/// Largest sector table the `sectors` command will allocate
pub const MAX_LISTED_SECTORS: usize = 4096;

/// Collect the sector table of an area, bounded by `max_img_sectors` and
/// [`MAX_LISTED_SECTORS`]
pub fn list_sectors(map: &FlashMap<'_>, id: AreaId) -> Result<(Vec<FlashSector>, SectorScan)> {
    let limit = (map.config().max_img_sectors as usize).min(MAX_LISTED_SECTORS);
    let mut sectors = vec![FlashSector::default(); limit];
    let scan = map.get_sectors(id.into(), &mut sectors)?;
    sectors.truncate(scan.count);
    Ok((sectors, scan))
}

/// List the erase sectors of an area
pub fn cmd_sectors(map: &mut FlashMap<'_>, id: AreaId) -> Result<()> {
    let (sectors, scan) = list_sectors(map, id)?;

    println!("Sectors of {} ({}):", id, scan.count);
    println!("{:>6} {:>10} {:>10}", "Index", "Offset", "Size");
    println!("{:-<28}", "");
    for (i, sector) in sectors.iter().enumerate() {
        println!("{:>6} {:#010X} {:>10}", i, sector.off, format_size(sector.size));
    }
    if scan.truncated {
        println!("(truncated at {} sectors)", scan.count);
    }

    Ok(())
}

/// Read area contents to stdout (hexdump) or to a file
pub fn cmd_read(
    map: &mut FlashMap<'_>,
    id: AreaId,
    offset: u32,
    length: u32,
    output: Option<&Path>,
) -> Result<()> {
    let data = with_area(map, id, |map, area| {
        check_range(area, offset, length)?;
        let mut buf = vec![0u8; length as usize];
        map.read(area, offset, &mut buf)?;
        Ok(buf)
    })?;

    match output {
        Some(path) => {
            fs::write(path, &data)?;
            println!("Read {} bytes from {} into {:?}", data.len(), id, path);
        }
        None => print!("{}", hexdump(offset, &data)),
    }

    Ok(())
}

/// Check whether a range of an area is erased
pub fn cmd_is_empty(map: &mut FlashMap<'_>, id: AreaId, offset: u32, length: u32) -> Result<()> {
    let empty = with_area(map, id, |map, area| {
        check_range(area, offset, length)?;
        let mut buf = vec![0u8; length as usize];
        Ok(map.is_empty(area, offset, &mut buf)?)
    })?;

    println!(
        "{} 0x{:08X}+0x{:X}: {}",
        id,
        offset,
        length,
        if empty { "empty" } else { "not empty" }
    );
    Ok(())
}

/// Pick the sectors covering exactly `[offset, offset + length)`
pub fn sectors_in_range(sectors: &[FlashSector], offset: u32, length: u32) -> Result<&[FlashSector]> {
    let end = offset as u64 + length as u64;
    let first = sectors.iter().position(|s| s.off == offset);
    let last = sectors
        .iter()
        .position(|s| s.off as u64 + s.size as u64 == end);

    match (first, last) {
        (Some(first), Some(last)) if first <= last => Ok(&sectors[first..=last]),
        _ => Err(CliError::Usage(format!(
            "Erase range 0x{:08X}..0x{:08X} does not match sector boundaries",
            offset, end
        ))),
    }
}

/// Erase an area, or a sector-aligned range of it
pub fn cmd_erase(
    map: &mut FlashMap<'_>,
    id: AreaId,
    offset: Option<u32>,
    length: Option<u32>,
) -> Result<()> {
    let sectors = map.sectors(id.into())?;

    let selected = match (offset, length) {
        (Some(offset), Some(length)) => sectors_in_range(&sectors, offset, length)?,
        (None, None) => &sectors[..],
        _ => {
            return Err(CliError::Usage(
                "Both --offset and --length must be specified for partial erase".into(),
            ))
        }
    };
    let total: u64 = selected.iter().map(|s| s.size as u64).sum();

    with_area(map, id, |map, area| {
        if offset.is_none() && total < area.size as u64 {
            log::warn!(
                "Sector table covers only 0x{:X} of 0x{:X} bytes of the {} area",
                total,
                area.size,
                id
            );
        }

        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) Erasing")?
                .progress_chars("#>-"),
        );

        for sector in selected {
            map.erase(area, sector.off, sector.size)?;
            pb.inc(sector.size as u64);
        }

        pb.finish_with_message("Erase complete");
        Ok(())
    })?;

    println!(
        "Erased {} sector(s) ({} bytes) of the {} area",
        selected.len(),
        total,
        id
    );
    Ok(())
}

/// Pad `data` to a multiple of `align` with the erased value
pub fn pad_to_alignment(mut data: Vec<u8>, align: u32, erased: u8) -> Vec<u8> {
    let align = align.max(1) as usize;
    let padded = data.len().div_ceil(align) * align;
    data.resize(padded, erased);
    data
}

/// Program a file into an area
pub fn cmd_write(map: &mut FlashMap<'_>, id: AreaId, offset: u32, input: &Path) -> Result<()> {
    let data = fs::read(input)?;
    let len = data.len();

    with_area(map, id, |map, area| {
        let align = map.align(area)?;
        let erased = map.erased_value(area)?;
        let data = pad_to_alignment(data, align, erased);
        check_range(area, offset, data.len() as u32)?;

        if data.len() != len {
            log::info!("Padded {} bytes to {} for {}-byte programming", len, data.len(), align);
        }

        let mut current = vec![0u8; data.len()];
        match map.is_empty(area, offset, &mut current) {
            Ok(true) => {}
            Ok(false) => log::warn!("Target range is not erased; programming may not take effect"),
            Err(e) => log::debug!("Could not check target range: {}", e),
        }

        map.write(area, offset, &data)?;
        Ok(())
    })?;

    println!("Wrote {} bytes from {:?} to {} @ 0x{:08X}", len, input, id, offset);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flashmap_core::MapConfig;
    use flashmap_sim::{SimConfig, SimFlash};

    #[test]
    fn test_hexdump_full_line() {
        let data: Vec<u8> = (0x41..0x51).collect();
        assert_eq!(
            hexdump(0x1000, &data),
            "00001000: 41 42 43 44 45 46 47 48  49 4A 4B 4C 4D 4E 4F 50 |ABCDEFGHIJKLMNOP|\n"
        );
    }

    #[test]
    fn test_hexdump_partial_line() {
        let out = hexdump(0xFE00, &[0x00, 0xFF, b'a']);
        assert_eq!(
            out,
            format!("0000FE00: 00 FF 61 {}|..a|\n", " ".repeat(3 * 13 + 1))
        );
    }

    #[test]
    fn test_hexdump_multiple_lines() {
        let out = hexdump(0, &[0u8; 20]);
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("00000010: 00 00 00 00 "));
    }

    #[test]
    fn test_sectors_in_range() {
        let sectors: Vec<_> = (0..8)
            .map(|k| FlashSector {
                off: k * 0x1000,
                size: 0x1000,
            })
            .collect();

        let picked = sectors_in_range(&sectors, 0x2000, 0x3000).unwrap();
        assert_eq!(picked.len(), 3);
        assert_eq!(picked[0].off, 0x2000);

        assert!(sectors_in_range(&sectors, 0x2100, 0x1000).is_err());
        assert!(sectors_in_range(&sectors, 0x2000, 0x1800).is_err());
        assert!(sectors_in_range(&sectors, 0x7000, 0x2000).is_err());
    }

    fn flash(size: u32, erase_size: u32) -> SimFlash {
        SimFlash::new(SimConfig {
            size,
            read_size: 1,
            program_size: 4,
            erase_size,
            erase_value: 0xFF,
        })
    }

    #[test]
    fn test_list_sectors_ignores_huge_max_img_sectors() {
        let config = MapConfig::bootloader(0x10000, 0x20000, 0x200, 0x1000, u32::MAX);
        let mut p = flash(0x40000, 0x1000);
        let mut s = flash(0x20000, 0x1000);
        let mut x = flash(0x1000, 0x1000);
        let map = FlashMap::new(config, &mut p, &mut x)
            .unwrap()
            .with_secondary(&mut s);

        let (sectors, scan) = list_sectors(&map, AreaId::Secondary).unwrap();
        assert_eq!(sectors.len(), 32);
        assert!(!scan.truncated);
        assert_eq!(sectors[31].off, 0x1F000);
    }

    #[test]
    fn test_list_sectors_capped() {
        let config = MapConfig::bootloader(0x10000, 0x20000, 0x200, 0x1000, u32::MAX);
        let count = MAX_LISTED_SECTORS as u32 + 1;
        let mut p = flash(0x40000, 0x1000);
        let mut s = flash(count * 16, 16);
        let mut x = flash(0x1000, 0x1000);
        let map = FlashMap::new(config, &mut p, &mut x)
            .unwrap()
            .with_secondary(&mut s);

        let (sectors, scan) = list_sectors(&map, AreaId::Secondary).unwrap();
        assert_eq!(sectors.len(), MAX_LISTED_SECTORS);
        assert_eq!(scan.count, MAX_LISTED_SECTORS);
        assert!(scan.truncated);
    }

    #[test]
    fn test_pad_to_alignment() {
        assert_eq!(pad_to_alignment(vec![1, 2, 3], 4, 0xFF), vec![1, 2, 3, 0xFF]);
        assert_eq!(pad_to_alignment(vec![1, 2, 3, 4], 4, 0xFF), vec![1, 2, 3, 4]);
        assert_eq!(pad_to_alignment(vec![1], 1, 0xFF), vec![1]);
        assert_eq!(pad_to_alignment(vec![], 8, 0), Vec::<u8>::new());
    }
}
