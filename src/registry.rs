use std::collections::BTreeMap;
use std::path::Path;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use crate::download::HttpClient;
use crate::error::{Error, Result};
use crate::package::{PackageDescriptor, PackageMetadata};

/// Registry used for identifiers that don't name one.
pub const STANDARD_REGISTRY: &str = "standard";

/// A registry as declared in `toolpin.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: RegistryKind,
    /// Registry file, relative to the configuration file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryKind {
    Local,
    Http,
}

/// Contents of a registry file.
#[derive(Debug, Default, Deserialize)]
pub struct RegistryContent {
    #[serde(default)]
    packages: Vec<PackageMetadata>,
    /// Name or alias => index into `packages`.
    #[serde(skip)]
    names: BTreeMap<String, usize>,
}

impl RegistryContent {
    pub fn parse(name: &str, raw: &str) -> Result<Self> {
        let mut content: Self = serde_json::from_str(raw).map_err(|e| Error::Registry {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        content.index_names();
        Ok(content)
    }

    pub fn packages(&self) -> &[PackageMetadata] {
        &self.packages
    }

    /// Looks a package up by exact name, then by alias.
    pub fn get(&self, name: &str) -> Option<&PackageMetadata> {
        self.names.get(name).and_then(|&i| self.packages.get(i))
    }

    fn index_names(&mut self) {
        let mut names = BTreeMap::new();
        for (i, package) in self.packages.iter().enumerate() {
            names.insert(package.name.clone(), i);
        }
        for (i, package) in self.packages.iter().enumerate() {
            for alias in &package.aliases {
                if alias.name.is_empty() {
                    warn!(package_name = %package.name, "ignore a package alias because the alias is empty");
                    continue;
                }
                names.entry(alias.name.clone()).or_insert(i);
            }
        }
        self.names = names;
    }
}

/// Every registry loaded for one command invocation.
#[derive(Debug, Default)]
pub struct RegistryIndex {
    registries: BTreeMap<String, RegistryContent>,
}

impl RegistryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every configured registry. Local paths are relative to `base_dir`.
    pub fn load(configs: &[RegistryConfig], base_dir: &Path, http: &HttpClient) -> Result<Self> {
        let mut index = Self::new();
        for config in configs {
            let raw = read_registry(config, base_dir, http)?;
            index.insert(&config.name, RegistryContent::parse(&config.name, &raw)?);
            debug!(registry_name = %config.name, "loaded a registry");
        }
        Ok(index)
    }

    pub fn insert(&mut self, name: &str, content: RegistryContent) {
        self.registries.insert(name.to_string(), content);
    }

    pub fn registries(&self) -> impl Iterator<Item = (&str, &RegistryContent)> {
        self.registries.iter().map(|(name, content)| (name.as_str(), content))
    }

    /// Finds a package by exact name or alias.
    pub fn find(&self, registry: &str, name: &str) -> Result<&PackageMetadata> {
        let content = self.registries.get(registry).ok_or_else(|| Error::UnknownRegistry {
            name: registry.to_string(),
        })?;
        content.get(name).ok_or_else(|| Error::UnknownPackage {
            identifier: format!("{registry},{name}"),
        })
    }

    /// Builds the descriptor for `registry,name@version`.
    pub fn descriptor(&self, registry: &str, name: &str, version: &str) -> Result<PackageDescriptor> {
        let metadata = self.find(registry, name)?;
        Ok(PackageDescriptor {
            name: metadata.name.clone(),
            registry: registry.to_string(),
            version: version.to_string(),
            metadata: metadata.clone(),
        })
    }
}

fn read_registry(config: &RegistryConfig, base_dir: &Path, http: &HttpClient) -> Result<String> {
    let missing = |field: &str| Error::Registry {
        name: config.name.clone(),
        reason: format!("{field} is required"),
    };
    match config.kind {
        RegistryKind::Local => {
            let path = base_dir.join(config.path.as_deref().ok_or_else(|| missing("path"))?);
            std::fs::read_to_string(&path).map_err(|e| Error::Registry {
                name: config.name.clone(),
                reason: format!("read {}: {e}", path.display()),
            })
        }
        RegistryKind::Http => {
            let url = config.url.as_deref().ok_or_else(|| missing("url"))?;
            http.get_text(url)?.ok_or_else(|| Error::Registry {
                name: config.name.clone(),
                reason: format!("{url} isn't found"),
            })
        }
    }
}
