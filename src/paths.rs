//! Default locations for workstat's files.

use std::path::{Path, PathBuf};

/// Status file name inside the runtime directory.
pub const STATUS_FILENAME: &str = "wsgi_status.json";

/// Per-user runtime directory for workstat.
///
/// Uses `$XDG_RUNTIME_DIR/workstat` where the platform has one, otherwise
/// a `workstat` directory under the system temp dir.
pub fn get_runtime_dir() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("workstat")
}

/// Default path of the shared status file.
pub fn default_status_path() -> PathBuf {
    get_runtime_dir().join(STATUS_FILENAME)
}

/// Expands a leading `~` in a path to the user's home directory.
///
/// Covers `--status-file=~/x.json`, where the shell does not expand the tilde.
pub fn expand_tilde<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();
    if let Ok(stripped) = path.strip_prefix("~")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(stripped);
    }
    path.to_path_buf()
}
