//! Resolved runtime settings.

use std::path::PathBuf;

/// Name of the data subdirectory under the platform data dir.
const DATA_SUBDIR: &str = "harvest";

/// Settings resolved from config, environment and command line.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Root of the filesystem storage backend.
    pub data_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        // Platform data dir -> home dir -> current dir
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DATA_SUBDIR);
        Self { data_dir }
    }
}

impl Settings {
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
    }
}
