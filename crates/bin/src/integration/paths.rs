//! Data directory resolution.
//!
//! The episode state and price archive databases live in a
//! platform-specific data directory unless the caller points somewhere
//! else.

use std::io;
use std::path::{Path, PathBuf};

/// Get the default data directory path.
///
/// Uses platform-specific data directories:
/// - Linux: `~/.local/share/vigil/`
/// - macOS: `~/Library/Application Support/vigil/`
/// - Windows: `%APPDATA%\vigil\`
pub(crate) fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vigil")
}

/// Resolve the data directory, creating it if needed.
pub(crate) fn resolve_data_dir(override_dir: Option<PathBuf>) -> io::Result<PathBuf> {
    let dir = override_dir.unwrap_or_else(default_data_dir);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Episode state database path inside the data directory.
pub(crate) fn state_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("state.db")
}

/// Price archive database path inside the data directory.
pub(crate) fn prices_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("prices.db")
}
