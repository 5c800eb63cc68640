//! flashmap - Boot loader flash map inspector
//!
//! Runs the `flashmap-core` flash map on emulated devices backed by raw
//! image files, so the placement and sector geometry a boot loader would
//! see can be inspected and the images manipulated through the same
//! open/read/write/erase path.
//!
//! # Architecture
//!
//! The board file describes one internal flash and an optional secondary
//! device. The internal flash is a single `SimFlash` shared by two
//! `SlicedDevice` windows (primary and scratch); the secondary device is a
//! separate `SimFlash`. Commands that modify contents write the images back
//! when they succeed.

mod board;
mod cli;
mod commands;
mod error;

use board::Board;
use clap::Parser;
use cli::{Cli, Commands};
use std::cell::RefCell;
use error::Result;
use flashmap_core::{FlashMap, SlicedDevice};
use flashmap_sim::SimFlash;

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let board = Board::from_toml_file(&cli.board)?;
    log::debug!("Loaded board from {:?}", cli.board);

    run(&board, cli.command)?;
    Ok(())
}

fn run(board: &Board, command: Commands) -> Result<()> {
    match command {
        Commands::Check => commands::layout::cmd_check(board),
        // No initialize: a missing secondary is reported per area
        Commands::Layout => {
            Devices::load(board)?.with_map(board, false, commands::layout::cmd_layout)
        }
        Commands::Sectors { area } => Devices::load(board)?.with_map(board, true, |map| {
            commands::area::cmd_sectors(map, area)
        }),
        Commands::Read {
            area,
            offset,
            length,
            output,
        } => Devices::load(board)?.with_map(board, true, |map| {
            commands::area::cmd_read(map, area, offset, length, output.as_deref())
        }),
        Commands::IsEmpty {
            area,
            offset,
            length,
        } => Devices::load(board)?.with_map(board, true, |map| {
            commands::area::cmd_is_empty(map, area, offset, length)
        }),
        Commands::Erase {
            area,
            offset,
            length,
        } => {
            let mut devices = Devices::load(board)?;
            devices.with_map(board, true, |map| {
                commands::area::cmd_erase(map, area, offset, length)
            })?;
            devices.save(board)
        }
        Commands::Write {
            area,
            offset,
            input,
        } => {
            let mut devices = Devices::load(board)?;
            devices.with_map(board, true, |map| {
                commands::area::cmd_write(map, area, offset, &input)
            })?;
            devices.save(board)
        }
    }
}

/// Emulated devices of a board, loaded from their images
struct Devices {
    internal: RefCell<SimFlash>,
    secondary: Option<SimFlash>,
}

impl Devices {
    fn load(board: &Board) -> Result<Self> {
        Ok(Self {
            internal: RefCell::new(board.internal.load()?),
            secondary: board.secondary.as_ref().map(|s| s.load()).transpose()?,
        })
    }

    /// Build the flash map over the devices and run `f` on it
    fn with_map<T>(
        &mut self,
        board: &Board,
        initialize: bool,
        f: impl FnOnce(&mut FlashMap<'_>) -> Result<T>,
    ) -> Result<T> {
        let placement = board.placement.placement()?;
        let mut primary = SlicedDevice::new(&self.internal, placement.primary)?;
        let mut scratch = SlicedDevice::new(&self.internal, placement.scratch)?;

        let mut map = FlashMap::new(board.placement, &mut primary, &mut scratch)?;
        if let Some(secondary) = self.secondary.as_mut() {
            map.set_secondary(secondary).map_err(flashmap_core::Error::from)?;
        }
        if initialize {
            map.initialize()?;
        }

        f(&mut map)
    }

    fn save(self, board: &Board) -> Result<()> {
        if !board.internal.save(&self.internal.into_inner())? {
            log::warn!("Internal flash has no image configured; changes discarded");
        }
        if let (Some(spec), Some(flash)) = (&board.secondary, &self.secondary) {
            if !spec.save(flash)? {
                log::warn!("Secondary device has no image configured; changes discarded");
            }
        }
        Ok(())
    }
}
