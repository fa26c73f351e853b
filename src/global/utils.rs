use std::path::PathBuf;
use directories::ProjectDirs;
use crate::error::{Error, Result};

/// Environment variable overriding the install root.
pub const ROOT_DIR_ENV: &str = "TOOLPIN_ROOT_DIR";

/// Returns the directory packages are installed into.
///
/// `TOOLPIN_ROOT_DIR` wins; otherwise the platform data directory is used
/// (e.g. `~/.local/share/toolpin` on Linux).
pub fn get_root_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(ROOT_DIR_ENV).filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    get_global_data_dir()
}

pub fn get_global_data_dir() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("org", "toolpin", "toolpin").ok_or_else(|| {
        Error::io(
            "get project directories",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no home directory"),
        )
    })?;
    Ok(proj_dirs.data_dir().to_path_buf())
}

/// `<root>/pkgs`, where every package version gets its own directory.
pub fn get_pkgs_dir(root: &std::path::Path) -> PathBuf {
    root.join("pkgs")
}

/// `<root>/bin`, holding links to installed executables.
pub fn get_bin_dir(root: &std::path::Path) -> PathBuf {
    root.join("bin")
}
