//! Path utilities for the llamapen data directory.

use std::path::{Path, PathBuf};

use crate::model::Model;

/// Get the default data directory (~/.llamapen/).
pub fn default_base_dir() -> PathBuf {
    dirs::home_dir()
        .expect("Could not determine home directory")
        .join(".llamapen")
}

/// Get the path to the llama executable inside a base directory.
pub fn executable_path(base_dir: &Path) -> PathBuf {
    let binary_name = if cfg!(target_os = "windows") {
        "llama.exe"
    } else {
        "llama"
    };
    base_dir.join(binary_name)
}

/// Get the path to a model's weight file inside a base directory.
pub fn model_path(base_dir: &Path, model: Model) -> PathBuf {
    base_dir.join(model.filename())
}

/// Ensure the base directory exists.
pub fn ensure_dirs(base_dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(base_dir)
}
