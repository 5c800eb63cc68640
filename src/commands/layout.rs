//! Layout command implementations

use super::format_size;
use crate::board::Board;
use crate::error::{CliError, Result};
use flashmap_core::{AreaId, BuildMode, FlashMap, Placement};

/// Show the build mode, placement and every area descriptor
pub fn cmd_layout(map: &mut FlashMap<'_>) -> Result<()> {
    let config = *map.config();
    let placement = *map.placement();

    println!("Flash Map");
    println!("=========");
    match config.mode {
        BuildMode::Bootloader {
            post_application_addr,
            post_application_size,
        } => {
            println!("Mode:        bootloader");
            println!(
                "Post-app:    0x{:08X} ({})",
                post_application_addr,
                format_size(post_application_size)
            );
        }
        BuildMode::Application {
            application_addr,
            application_size,
        } => {
            println!("Mode:        application");
            println!(
                "Application: 0x{:08X} ({})",
                application_addr,
                format_size(application_size)
            );
        }
    }
    println!("Header:      {}", format_size(config.header_size));
    println!("App start:   0x{:08X}", placement.primary_app_start);
    println!("Max sectors: {}", config.max_img_sectors);

    println!("\nAreas:");
    println!(
        "{:<10} {:>4} {:>10} {:>10} {:>10} {:>6} {:>6}",
        "Name", "Id", "Offset", "End", "Size", "Align", "Erased"
    );
    println!("{:-<62}", "");

    for id in AreaId::ALL {
        let area = match map.open(id.into()) {
            Ok(area) => area,
            Err(e) => {
                println!("{:<10} {:>4} <unavailable: {}>", id.name(), u8::from(id), e);
                continue;
            }
        };
        let align = map.align(&area);
        let erased = map.erased_value(&area);
        map.close(&area)?;

        println!(
            "{:<10} {:>4} {:#010X} {:#010X} {:>10} {:>6} {:>#6X}",
            id.name(),
            u8::from(id),
            area.off,
            area.end(),
            format_size(area.size),
            align?,
            erased?
        );
    }

    Ok(())
}

/// Problems that make a board unusable, in the order they were found
pub fn check_board(board: &Board) -> Vec<String> {
    let mut problems = Vec::new();

    let placement = match board.placement.placement() {
        Ok(p) => p,
        Err(e) => {
            problems.push(format!("placement does not resolve: {}", e));
            return problems;
        }
    };

    if placement.overlaps() {
        problems.push(format!(
            "primary 0x{:08X}+0x{:X} overlaps scratch 0x{:08X}+0x{:X}",
            placement.primary.start,
            placement.primary.size,
            placement.scratch.start,
            placement.scratch.size
        ));
    }

    let internal = board.internal.size as u64;
    for (name, span) in [("primary", placement.primary), ("scratch", placement.scratch)] {
        let end = span.start as u64 + span.size as u64;
        if end > internal {
            problems.push(format!(
                "{} ends at 0x{:08X}, beyond internal flash (0x{:08X})",
                name, end, internal
            ));
        }
    }

    if board.internal.erase_size == 0 {
        problems.push("internal flash erase size is zero".to_string());
    } else if placement.scratch.size < board.internal.erase_size {
        problems.push(format!(
            "scratch ({}) is smaller than one erase sector ({})",
            format_size(placement.scratch.size),
            format_size(board.internal.erase_size)
        ));
    }

    match &board.secondary {
        None => problems.push("no secondary device described".to_string()),
        Some(secondary) if secondary.erase_size == 0 => {
            problems.push("secondary erase size is zero".to_string())
        }
        Some(_) => {}
    }

    problems
}

/// Non-fatal layout problems: misaligned area starts and a secondary
/// device too small to hold the primary image
pub fn layout_warnings(board: &Board, placement: &Placement) -> Vec<String> {
    let mut warnings = Vec::new();
    let erase = board.internal.erase_size;
    if erase != 0 {
        for (name, start) in [
            ("primary", placement.primary.start),
            ("scratch", placement.scratch.start),
        ] {
            if start % erase != 0 {
                warnings.push(format!(
                    "{} starts at 0x{:08X}, not aligned to the {} erase size",
                    name,
                    start,
                    format_size(erase)
                ));
            }
        }
    }
    if let Some(secondary) = &board.secondary {
        if secondary.size < placement.primary.size {
            warnings.push(format!(
                "secondary ({}) is smaller than primary ({})",
                format_size(secondary.size),
                format_size(placement.primary.size)
            ));
        }
    }
    warnings
}

/// Validate the placement against the board
pub fn cmd_check(board: &Board) -> Result<()> {
    let problems = check_board(board);
    if let Some(first) = problems.first() {
        for problem in &problems {
            println!("FAIL  {}", problem);
        }
        return Err(CliError::Check(first.clone()));
    }

    let placement = board.placement.placement()?;
    for warning in layout_warnings(board, &placement) {
        log::warn!("{}", warning);
    }
    println!(
        "OK    {} mode: primary 0x{:08X}+0x{:X}, scratch 0x{:08X}+0x{:X}",
        board.placement.mode.name(),
        placement.primary.start,
        placement.primary.size,
        placement.scratch.start,
        placement.scratch.size
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::DeviceSpec;
    use flashmap_core::MapConfig;

    fn device(size: u32, erase_size: u32) -> DeviceSpec {
        DeviceSpec {
            size,
            read_size: 1,
            program_size: 4,
            erase_size,
            erase_value: 0xFF,
            image: None,
        }
    }

    fn board(placement: MapConfig) -> Board {
        Board {
            placement,
            internal: device(0x40000, 0x1000),
            secondary: Some(device(0x20000, 0x1000)),
        }
    }

    #[test]
    fn test_check_passes() {
        let board = board(MapConfig::bootloader(0x10000, 0x20000, 0x200, 0x1000, 128));
        assert!(check_board(&board).is_empty());
        assert!(cmd_check(&board).is_ok());
    }

    #[test]
    fn test_example_board_is_erase_aligned() {
        let board = Board::from_toml_str(include_str!("../../boards/example.toml")).unwrap();
        assert!(check_board(&board).is_empty());

        let placement = board.placement.placement().unwrap();
        assert_eq!(placement.primary.start, 0x10000);
        assert_eq!(placement.scratch.start, 0x30000);
        assert!(layout_warnings(&board, &placement).is_empty());
    }

    #[test]
    fn test_layout_warnings_unaligned_primary() {
        let board = board(MapConfig::application(0x10000, 0x20000, 0x200, 0x1000, 128));
        let placement = board.placement.placement().unwrap();
        let warnings = layout_warnings(&board, &placement);
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].starts_with("primary starts at 0x0000FE00"));
        assert!(warnings[1].starts_with("secondary (128 KiB) is smaller"));
    }

    #[test]
    fn test_check_out_of_range() {
        let board = board(MapConfig::application(0x30000, 0x10000, 0x200, 0x1000, 128));
        let problems = check_board(&board);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].starts_with("scratch ends at 0x00041000"));
    }

    #[test]
    fn test_check_unresolvable() {
        let board = board(MapConfig::bootloader(0x10000, 0x800, 0x200, 0x1000, 128));
        let problems = check_board(&board);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].starts_with("placement does not resolve"));
        assert!(matches!(cmd_check(&board), Err(CliError::Check(_))));
    }

    #[test]
    fn test_check_small_scratch_and_missing_secondary() {
        let mut board = board(MapConfig::bootloader(0x10000, 0x20000, 0x200, 0x800, 128));
        board.secondary = None;
        let problems = check_board(&board);
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("smaller than one erase sector"));
        assert_eq!(problems[1], "no secondary device described");
    }
}
