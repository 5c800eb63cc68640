//! Error types for the flashmap CLI

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// CLI errors
#[derive(Debug, Error)]
pub enum CliError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Board file could not be read
    #[error("Failed to read board file {path:?}: {source}")]
    Board {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Board file is not valid TOML or misses required tables
    #[error("Invalid board file: {0}")]
    Toml(#[from] toml::de::Error),

    /// Flash map operation failed
    #[error("Flash map error: {0}")]
    Flash(#[from] flashmap_core::Error),

    /// Progress bar template is invalid
    #[error("Progress bar template error: {0}")]
    Template(#[from] indicatif::style::TemplateError),

    /// Placement does not fit the board
    #[error("Placement check failed: {0}")]
    Check(String),

    /// Invalid combination of arguments
    #[error("{0}")]
    Usage(String),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
