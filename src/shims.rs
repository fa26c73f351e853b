use std::path::{Path, PathBuf};
use crate::error::{Error, Result};

/// Creates a platform-specific "shim" forwarding execution to `target`,
/// replacing any shim already at `shim_path`.
///
/// On Unix this is a symbolic link. On Windows it is a `.bat` script next to
/// `shim_path` that calls `target`.
///
/// Returns the path of the created shim.
pub fn create_shim(target: &Path, shim_path: &Path) -> Result<PathBuf> {
    if let Some(parent) = shim_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::io(format!("create a directory {}", parent.display()), e))?;
    }
    link(target, shim_path)
}

#[cfg(unix)]
fn link(target: &Path, shim_path: &Path) -> Result<PathBuf> {
    use std::os::unix::fs::symlink;
    if std::fs::symlink_metadata(shim_path).is_ok() {
        std::fs::remove_file(shim_path)
            .map_err(|e| Error::io(format!("remove {}", shim_path.display()), e))?;
    }
    symlink(target, shim_path)
        .map_err(|e| Error::io(format!("create a symlink {}", shim_path.display()), e))?;
    Ok(shim_path.to_path_buf())
}

#[cfg(windows)]
fn link(target: &Path, shim_path: &Path) -> Result<PathBuf> {
    let script = format!("@echo off\r\ncall \"{}\" %*\r\n", target.display());
    let bat = shim_path.with_extension("bat");
    std::fs::write(&bat, script)
        .map_err(|e| Error::io(format!("write {}", bat.display()), e))?;
    Ok(bat)
}

/// Returns the shim for `name` in `bin_dir` if one exists.
pub fn find_shim(bin_dir: &Path, name: &str) -> Option<PathBuf> {
    #[cfg(windows)]
    let shim = bin_dir.join(name).with_extension("bat");
    #[cfg(not(windows))]
    let shim = bin_dir.join(name);
    std::fs::symlink_metadata(&shim).ok().map(|_| shim)
}
