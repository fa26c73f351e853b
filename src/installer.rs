use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use regex::Regex;
use tracing::{debug, info};
use walkdir::WalkDir;
use crate::checksum::{copy_and_hash, ChecksumLedger, ChecksumRecord, ChecksumVerifier};
use crate::config::PolicyConfig;
use crate::context::InstallContext;
use crate::download::{ArtifactSource, ChecksumSource};
use crate::error::{Error, Result};
use crate::global::utils::{get_bin_dir, get_pkgs_dir};
use crate::package::{FileSpec, PackageDescriptor};
use crate::platform::PlatformInfo;
use crate::shims::create_shim;
use crate::unarchive::{set_executable, unarchive};

/// Arguments of [`Installer::install_package`].
pub struct ParamInstallPackage<'a> {
    /// Ledger used for verification. `None` skips verification unless
    /// `checksum` is given.
    pub ledger: Option<&'a ChecksumLedger>,
    pub package: &'a PackageDescriptor,
    /// Checksum known out-of-band, seeded into the ledger before verification.
    pub checksum: Option<ChecksumRecord>,
    /// Skip the registry allow-list, for helper tools pulled in by another package.
    pub disable_policy: bool,
}

/// Downloads, verifies, unpacks and links packages under a root directory.
pub struct Installer {
    root_dir: PathBuf,
    platform: PlatformInfo,
    artifacts: Arc<dyn ArtifactSource>,
    verifier: ChecksumVerifier,
    policy: PolicyConfig,
}

impl Installer {
    pub fn new(
        root_dir: PathBuf,
        platform: PlatformInfo,
        artifacts: Arc<dyn ArtifactSource>,
        checksums: Arc<dyn ChecksumSource>,
    ) -> Self {
        Self {
            verifier: ChecksumVerifier::new(platform.clone(), checksums),
            root_dir,
            platform,
            artifacts,
            policy: PolicyConfig::default(),
        }
    }

    pub fn with_policy(mut self, policy: PolicyConfig) -> Self {
        self.policy = policy;
        self
    }

    /// See [`ChecksumVerifier::trust_on_first_use`].
    pub fn trust_on_first_use(mut self, enabled: bool) -> Self {
        self.verifier = self.verifier.trust_on_first_use(enabled);
        self
    }

    pub fn platform(&self) -> &PlatformInfo {
        &self.platform
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn bin_dir(&self) -> PathBuf {
        get_bin_dir(&self.root_dir)
    }

    /// `<root>/pkgs/<type>/<registry>/<name>/<version>`
    pub fn package_dir(&self, package: &PackageDescriptor) -> PathBuf {
        get_pkgs_dir(&self.root_dir)
            .join(package.metadata.kind.as_str())
            .join(&package.registry)
            .join(&package.name)
            .join(&package.version)
    }

    /// Installs one package whose metadata was already overridden for its
    /// version and checked against the platform.
    ///
    /// An existing package directory counts as installed; only the links are refreshed.
    pub fn install_package(&self, ctx: &InstallContext, param: ParamInstallPackage<'_>) -> Result<()> {
        let package = param.package;
        let metadata = &package.metadata;
        if !param.disable_policy && !self.policy.allows(&package.registry) {
            return Err(Error::PolicyViolation {
                registry: package.registry.clone(),
                package: package.name.clone(),
            });
        }

        let platform = self.platform.effective(metadata.rosetta2, metadata.windows_arm_emulation);
        let pkg_dir = self.package_dir(package);
        if pkg_dir.exists() {
            debug!(package_name = %package.name, package_version = %package.version, "the package is already installed");
            return self.link_files(package, &pkg_dir);
        }

        let asset = metadata.asset_name(&package.version, &platform)?;
        let url = metadata.download_url(&package.version, &platform)?;
        ctx.check()?;
        info!(package_name = %package.name, package_version = %package.version, url = %url, "download and unarchive the package");
        let mut body = self.artifacts.open(ctx, &url)?;

        let throwaway;
        let ledger = match (param.ledger, &param.checksum) {
            (Some(ledger), _) => Some(ledger),
            (None, Some(_)) => {
                throwaway = ChecksumLedger::new();
                Some(&throwaway)
            }
            (None, None) => None,
        };
        let file = match ledger {
            Some(ledger) => {
                if let Some(checksum) = param.checksum {
                    ledger.set(&package.checksum_id(&self.platform)?, checksum);
                }
                let artifact = self.verifier.verify(ctx, ledger, package, &asset, &mut *body)?;
                debug!(
                    package_name = %package.name,
                    package_version = %package.version,
                    checksum = %artifact.checksum().checksum,
                    "verified the artifact"
                );
                artifact.into_file()
            }
            None => {
                let mut file = tempfile::tempfile().map_err(|e| Error::io("create a temporary file", e))?;
                copy_and_hash(ctx, &mut *body, &mut file, metadata.checksum_algorithm())?;
                file.seek(SeekFrom::Start(0))
                    .map_err(|e| Error::io("rewind the downloaded file", e))?;
                file
            }
        };

        let parent = pkg_dir.parent().unwrap_or(&self.root_dir).to_path_buf();
        std::fs::create_dir_all(&parent)
            .map_err(|e| Error::io(format!("create a directory {}", parent.display()), e))?;
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&parent)
            .map_err(|e| Error::io("create a staging directory", e))?;
        let files = metadata.files();
        let raw_name = raw_file_name(files.first().map_or(metadata.short_name(), |f| f.name.as_str()));
        unarchive(file, &metadata.archive_format(&asset), &raw_name, staging.path())?;
        if let Err(e) = std::fs::rename(staging.path(), &pkg_dir) {
            if !pkg_dir.exists() {
                return Err(Error::io(format!("move the package to {}", pkg_dir.display()), e));
            }
            debug!(package_name = %package.name, "the package was installed concurrently");
        }
        self.link_files(package, &pkg_dir)
    }

    fn link_files(&self, package: &PackageDescriptor, pkg_dir: &Path) -> Result<()> {
        let bin_dir = self.bin_dir();
        for file in package.metadata.files() {
            let target = find_executable(pkg_dir, &file)?;
            set_executable(&target)?;
            let shim = create_shim(&target, &bin_dir.join(&file.name))?;
            debug!(file_name = %file.name, shim = %shim.display(), "linked an executable");
        }
        Ok(())
    }
}

fn raw_file_name(name: &str) -> String {
    if cfg!(windows) && !name.ends_with(".exe") {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

/// Locates the executable for `file` inside an installed package.
///
/// Uses `src` (or the file name) when it exists; otherwise picks the file
/// whose name best matches, preferring exact stems.
pub fn find_executable(pkg_dir: &Path, file: &FileSpec) -> Result<PathBuf> {
    let relative = file.src.as_deref().unwrap_or(&file.name);
    for candidate in [pkg_dir.join(relative), pkg_dir.join(format!("{relative}.exe"))] {
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    let re = Regex::new(&format!(r"(?i)^{}(\.exe)?$", regex::escape(&file.name)))
        .map_err(|e| Error::io("build a file name pattern", std::io::Error::other(e)))?;
    let mut candidates: Vec<PathBuf> = WalkDir::new(pkg_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| re.is_match(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.into_path())
        .collect();
    // shallowest match first
    candidates.sort_by_key(|p| p.components().count());
    candidates.into_iter().next().ok_or_else(|| {
        Error::io(
            format!("find {} in {}", file.name, pkg_dir.display()),
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such executable"),
        )
    })
}
