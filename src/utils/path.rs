//! Path utilities for finding data directories

use std::env;
use std::path::PathBuf;

/// Returns the folder where data files (config, templates, logs) live.
/// Uses the executable directory when it looks like a deployed bundle,
/// otherwise falls back to the current working directory.
pub fn get_data_dir() -> PathBuf {
    if let Ok(exe_path) = env::current_exe() {
        if let Some(parent) = exe_path.parent() {
            // A deployed bundle carries its config folder next to the exe
            let config_path = parent.join("config");
            if config_path.exists() {
                return parent.to_path_buf();
            }
        }
    }

    env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}
