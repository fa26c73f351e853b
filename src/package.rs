use std::collections::BTreeMap;
use std::fmt;
use serde::Deserialize;
use crate::checksum::Algorithm;
use crate::error::{Error, Result};
use crate::platform::{PlatformInfo, KNOWN_PLATFORMS};

/// File name used in checksum IDs for artifacts without an asset name,
/// e.g. GitHub source archives.
pub const ARCHIVE_ASSET_NAME: &str = "archive.tar.gz";

/// How a package's artifact is located.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageKind {
    /// An asset attached to a GitHub release.
    #[default]
    GithubRelease,
    /// The source archive GitHub generates for a tag.
    GithubArchive,
    /// An arbitrary URL template.
    Http,
}

impl PackageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageKind::GithubRelease => "github_release",
            PackageKind::GithubArchive => "github_archive",
            PackageKind::Http => "http",
        }
    }
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A package as declared in a registry.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: PackageKind,
    /// GitHub repository, e.g. `"BurntSushi/ripgrep"`.
    pub repo: Option<String>,
    /// Asset file name template for `github_release` packages.
    pub asset: Option<String>,
    /// Download URL template for `http` packages.
    pub url: Option<String>,
    /// Archive format. Inferred from the asset name when absent.
    pub format: Option<String>,
    /// Executables to link into the bin directory. Defaults to the package's short name.
    #[serde(default)]
    pub files: Vec<FileSpec>,
    /// Substitutions applied to `{os}` and `{arch}`, e.g. `amd64 => x86_64`.
    #[serde(default)]
    pub replacements: BTreeMap<String, String>,
    /// Entries like `linux`, `arm64`, `darwin/amd64` or `all`. Absent means all.
    pub supported_envs: Option<Vec<String>>,
    #[serde(default)]
    pub rosetta2: bool,
    #[serde(default)]
    pub windows_arm_emulation: bool,
    pub checksum: Option<ChecksumPolicy>,
    /// When absent or true for the requested version, `version_overrides` are skipped.
    pub version_constraint: Option<String>,
    #[serde(default)]
    pub version_overrides: Vec<VersionOverride>,
    #[serde(default)]
    pub aliases: Vec<Alias>,
    #[serde(default)]
    pub requires: Vec<Requirement>,
    pub description: Option<String>,
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FileSpec {
    pub name: String,
    /// Path of the executable inside the extracted artifact. Defaults to `name`.
    pub src: Option<String>,
}

/// Where a package's release checksums come from and how they're computed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChecksumPolicy {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub algorithm: Algorithm,
    /// Checksum file asset name template (github_release).
    pub asset: Option<String>,
    /// Checksum file URL template.
    pub url: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Metadata patch applied when `version_constraint` matches the requested version.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VersionOverride {
    pub version_constraint: String,
    pub asset: Option<String>,
    pub url: Option<String>,
    pub format: Option<String>,
    pub files: Option<Vec<FileSpec>>,
    pub replacements: Option<BTreeMap<String, String>>,
    pub supported_envs: Option<Vec<String>>,
    pub checksum: Option<ChecksumPolicy>,
    pub rosetta2: Option<bool>,
    pub windows_arm_emulation: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Alias {
    pub name: String,
}

/// A helper tool installed on behalf of a package, using the checksums the
/// package recorded for it rather than a fresh lookup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Requirement {
    pub registry: Option<String>,
    pub name: String,
    pub version: String,
    /// `os/arch` => checksum.
    #[serde(default)]
    pub checksums: BTreeMap<String, String>,
}

impl Requirement {
    pub fn registry(&self) -> &str {
        self.registry.as_deref().unwrap_or(crate::registry::STANDARD_REGISTRY)
    }

    /// Key shared by every caller that needs this exact requirement.
    pub fn key(&self) -> String {
        format!("{},{}@{}", self.registry(), self.name, self.version)
    }
}

impl PackageMetadata {
    /// Name without the repository owner, used in file names and templates.
    pub fn short_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    pub fn checksum_enabled(&self) -> bool {
        self.checksum.as_ref().is_some_and(|c| c.enabled)
    }

    pub fn checksum_algorithm(&self) -> Algorithm {
        self.checksum.as_ref().map(|c| c.algorithm).unwrap_or_default()
    }

    /// Evaluates `supported_envs` against the platform, honouring emulation.
    pub fn is_supported(&self, platform: &PlatformInfo) -> bool {
        let Some(envs) = &self.supported_envs else {
            return true;
        };
        let arch = platform.effective_arch(self.rosetta2, self.windows_arm_emulation);
        envs.iter().any(|env| {
            env == "all"
                || env == &platform.os
                || env == &platform.arch
                || env == arch
                || *env == format!("{}/{}", platform.os, platform.arch)
                || *env == format!("{}/{}", platform.os, arch)
        })
    }

    /// Substitutes `{name}`, `{version}`, `{semver}`, `{os}`, `{arch}` and `{format}`.
    /// `platform` is expected to already carry the effective architecture.
    pub fn render(&self, template: &str, version: &str, platform: &PlatformInfo) -> String {
        let os = self.replacements.get(&platform.os).unwrap_or(&platform.os);
        let arch = self.replacements.get(&platform.arch).unwrap_or(&platform.arch);
        let semver = version.strip_prefix('v').unwrap_or(version);
        let format = self.format.clone().unwrap_or_default();
        template
            .replace("{name}", self.short_name())
            .replace("{version}", version)
            .replace("{semver}", semver)
            .replace("{os}", os)
            .replace("{arch}", arch)
            .replace("{format}", &format)
    }

    /// The file name of the artifact. Empty for `github_archive` packages.
    pub fn asset_name(&self, version: &str, platform: &PlatformInfo) -> Result<String> {
        match self.kind {
            PackageKind::GithubRelease => {
                let template = self.asset.as_deref().ok_or_else(|| self.template_error("asset is required"))?;
                Ok(self.render(template, version, platform))
            }
            PackageKind::GithubArchive => Ok(String::new()),
            PackageKind::Http => {
                let url = self.download_url(version, platform)?;
                Ok(url_file_name(&url))
            }
        }
    }

    pub fn download_url(&self, version: &str, platform: &PlatformInfo) -> Result<String> {
        match self.kind {
            PackageKind::GithubRelease => {
                let repo = self.repo()?;
                let asset = self.asset_name(version, platform)?;
                Ok(format!("https://github.com/{repo}/releases/download/{version}/{asset}"))
            }
            PackageKind::GithubArchive => {
                let repo = self.repo()?;
                Ok(format!("https://github.com/{repo}/archive/refs/tags/{version}.tar.gz"))
            }
            PackageKind::Http => {
                let template = self.url.as_deref().ok_or_else(|| self.template_error("url is required"))?;
                Ok(self.render(template, version, platform))
            }
        }
    }

    /// URL of the release's checksum file, if the policy declares one.
    pub fn checksum_url(&self, version: &str, platform: &PlatformInfo) -> Result<Option<String>> {
        let Some(policy) = &self.checksum else {
            return Ok(None);
        };
        if let Some(url) = &policy.url {
            return Ok(Some(self.render(url, version, platform)));
        }
        match (&policy.asset, self.kind) {
            (Some(asset), PackageKind::GithubRelease) => {
                let repo = self.repo()?;
                let asset = self.render(asset, version, platform);
                Ok(Some(format!("https://github.com/{repo}/releases/download/{version}/{asset}")))
            }
            _ => Ok(None),
        }
    }

    /// `tar.gz`, `zip` or `raw`.
    pub fn archive_format(&self, asset: &str) -> String {
        if let Some(format) = &self.format {
            return normalize_format(format).to_string();
        }
        if self.kind == PackageKind::GithubArchive {
            return "tar.gz".to_string();
        }
        if asset.ends_with(".tar.gz") || asset.ends_with(".tgz") {
            "tar.gz".to_string()
        } else if asset.ends_with(".zip") {
            "zip".to_string()
        } else {
            "raw".to_string()
        }
    }

    pub fn files(&self) -> Vec<FileSpec> {
        if self.files.is_empty() {
            vec![FileSpec { name: self.short_name().to_string(), src: None }]
        } else {
            self.files.clone()
        }
    }

    /// Derives every checksum ID a checksum file entry named `asset` stands for,
    /// one per known platform whose rendered asset name equals it.
    pub fn checksum_ids_from_asset(&self, version: &str, asset: &str) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for (os, arch) in KNOWN_PLATFORMS {
            let platform = PlatformInfo::new(os, arch);
            let Ok(rendered) = self.asset_name(version, &platform) else {
                continue;
            };
            let rendered = if rendered.is_empty() { ARCHIVE_ASSET_NAME } else { rendered.as_str() };
            if rendered == asset {
                ids.push(checksum_id(&self.name, version, &platform, asset));
            }
        }
        if ids.is_empty() {
            return Err(self.template_error(&format!("asset {asset} doesn't match any platform")));
        }
        Ok(ids)
    }

    fn repo(&self) -> Result<&str> {
        self.repo.as_deref().ok_or_else(|| self.template_error("repo is required"))
    }

    fn template_error(&self, reason: &str) -> Error {
        Error::Template {
            package: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Key of a ledger entry: `{name}/{version}/{os}/{arch}/{asset}`.
/// An empty asset name maps to [`ARCHIVE_ASSET_NAME`].
pub fn checksum_id(name: &str, version: &str, platform: &PlatformInfo, asset: &str) -> String {
    let asset = if asset.is_empty() { ARCHIVE_ASSET_NAME } else { asset };
    format!("{}/{}/{}/{}/{}", name, version, platform.os, platform.arch, asset)
}

fn url_file_name(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path).to_string()
}

fn normalize_format(format: &str) -> &str {
    match format {
        "tgz" => "tar.gz",
        other => other,
    }
}

/// A package requested for installation or resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageDescriptor {
    pub name: String,
    pub registry: String,
    /// May be empty when resolving without a version.
    pub version: String,
    pub metadata: PackageMetadata,
}

impl PackageDescriptor {
    /// Returns a descriptor carrying `metadata` in place of the current one.
    pub fn with_metadata(&self, metadata: PackageMetadata) -> PackageDescriptor {
        PackageDescriptor {
            name: self.name.clone(),
            registry: self.registry.clone(),
            version: self.version.clone(),
            metadata,
        }
    }

    /// `registry,name@version`, the same shape as [`Requirement::key`].
    pub fn key(&self) -> String {
        format!("{},{}@{}", self.registry, self.name, self.version)
    }

    /// Checksum ID of this package's artifact on `platform`.
    pub fn checksum_id(&self, platform: &PlatformInfo) -> Result<String> {
        let platform = platform.effective(self.metadata.rosetta2, self.metadata.windows_arm_emulation);
        let asset = self.metadata.asset_name(&self.version, &platform)?;
        Ok(checksum_id(&self.name, &self.version, &platform, &asset))
    }
}
