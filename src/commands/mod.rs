//! CLI command implementations
//!
//! `layout` covers the commands that describe the map as a whole (placement,
//! descriptors, validation). `area` covers the commands that operate on one
//! area through an open handle.

pub mod area;
pub mod layout;

/// Format a byte count for display
pub fn format_size(bytes: u32) -> String {
    if bytes >= 1024 * 1024 && bytes % (1024 * 1024) == 0 {
        format!("{} MiB", bytes / (1024 * 1024))
    } else if bytes >= 1024 && bytes % 1024 == 0 {
        format!("{} KiB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}
