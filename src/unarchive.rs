use std::fs::File;
use std::io;
use std::path::Path;
use flate2::read::GzDecoder;
use tar::Archive;
use zip::ZipArchive;
use crate::error::{Error, Result};

/// Unpacks a verified artifact into `dest`.
///
/// `tar.gz` and `zip` archives are extracted; anything else is treated as a
/// single executable and copied to `dest/<raw_name>`.
pub fn unarchive(mut file: File, format: &str, raw_name: &str, dest: &Path) -> Result<()> {
    match format {
        "tar.gz" => {
            let mut archive = Archive::new(GzDecoder::new(file));
            archive
                .unpack(dest)
                .map_err(|e| Error::io(format!("unarchive a tarball into {}", dest.display()), e))
        }
        "zip" => {
            let mut archive = ZipArchive::new(file)
                .map_err(|e| Error::io("open a zip archive", io::Error::other(e)))?;
            archive
                .extract(dest)
                .map_err(|e| Error::io(format!("unarchive a zip into {}", dest.display()), io::Error::other(e)))
        }
        _ => {
            let target = dest.join(raw_name);
            let mut out = File::create(&target)
                .map_err(|e| Error::io(format!("create {}", target.display()), e))?;
            io::copy(&mut file, &mut out)
                .map_err(|e| Error::io(format!("write {}", target.display()), e))?;
            set_executable(&target)
        }
    }
}

/// Adds the executable bits on Unix; a no-op elsewhere.
#[cfg(unix)]
pub fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let meta = std::fs::metadata(path).map_err(|e| Error::io(format!("stat {}", path.display()), e))?;
    let mut perms = meta.permissions();
    perms.set_mode(perms.mode() | 0o755);
    std::fs::set_permissions(path, perms)
        .map_err(|e| Error::io(format!("chmod {}", path.display()), e))
}

#[cfg(not(unix))]
pub fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}
