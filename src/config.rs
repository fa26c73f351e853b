use std::collections::HashSet;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use crate::registry::{RegistryConfig, STANDARD_REGISTRY};

/// Default configuration file name, looked up in the current directory.
pub const CONFIG_FILE_NAME: &str = "toolpin.toml";

/// Represents the contents of a `toolpin.toml` file.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct ProjectConfig {
    #[serde(default)]
    pub checksum: ChecksumConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub registries: Vec<RegistryConfig>,
    #[serde(default)]
    pub packages: Vec<DeclaredPackage>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ChecksumConfig {
    /// Verify downloads and keep the checksum ledger next to the config file.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Refuse artifacts whose checksum isn't known from the ledger or a
    /// release checksum file instead of recording them on first use.
    #[serde(default)]
    pub require_checksum: bool,
}

impl Default for ChecksumConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            require_checksum: false,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct PolicyConfig {
    /// Registries packages may be installed from. Empty allows every registry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_registries: Vec<String>,
}

impl PolicyConfig {
    pub fn allows(&self, registry: &str) -> bool {
        self.allowed_registries.is_empty() || self.allowed_registries.iter().any(|r| r == registry)
    }
}

/// A `[[packages]]` entry. The version is either folded into the name
/// (`name = "jq@1.7.1"`) or given separately.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct DeclaredPackage {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl DeclaredPackage {
    pub fn registry(&self) -> &str {
        self.registry.as_deref().unwrap_or(STANDARD_REGISTRY)
    }

    /// Returns `(name, version)`. The version is empty when none is declared.
    pub fn name_and_version(&self) -> (&str, &str) {
        match self.version.as_deref() {
            Some(version) if !version.is_empty() => (self.name.as_str(), version),
            _ => self.name.split_once('@').unwrap_or((self.name.as_str(), "")),
        }
    }
}

impl ProjectConfig {
    /// Saves the config to the given file path in pretty TOML format.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let toml_str = toml::to_string_pretty(self).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        std::fs::write(path, toml_str)
            .map_err(|e| Error::io(format!("write {}", path.display()), e))
    }

    /// Loads and validates a config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ProjectConfig> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::io(format!("read {}", path.display()), e))?;
        let config: ProjectConfig = toml::from_str(&content).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let mut names = HashSet::new();
        for registry in &self.registries {
            if !names.insert(registry.name.as_str()) {
                return Err(Error::Config {
                    path: path.to_path_buf(),
                    reason: format!("registry {} is declared twice", registry.name),
                });
            }
        }
        Ok(())
    }

    /// Appends packages, skipping entries already declared.
    pub fn add_packages(&mut self, packages: impl IntoIterator<Item = DeclaredPackage>) {
        for package in packages {
            if !self.packages.contains(&package) {
                self.packages.push(package);
            }
        }
    }
}

/// Path of the checksum ledger that belongs to `config_path`:
/// `toolpin.toml` => `toolpin-checksums.toml` in the same directory.
pub fn checksum_file_path(config_path: &Path) -> PathBuf {
    let stem = config_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "toolpin".to_string());
    let file_name = format!("{stem}-checksums.toml");
    match config_path.parent() {
        Some(parent) => parent.join(file_name),
        None => PathBuf::from(file_name),
    }
}
