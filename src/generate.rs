//! Turns package identifiers typed by a user into `[[packages]]` entries.
//!
//! Identifiers look like `name`, `name@version`, `registry,name` or
//! `registry,name@version`. Without a registry the standard one is assumed.

use std::collections::HashSet;
use std::path::Path;
use serde::Serialize;
use tracing::{debug, info};
use crate::config::{DeclaredPackage, ProjectConfig};
use crate::download::VersionSource;
use crate::error::{Error, Result};
use crate::package::PackageMetadata;
use crate::registry::{RegistryIndex, STANDARD_REGISTRY};

/// Written in place of a version that couldn't be looked up.
pub const VERSION_PLACEHOLDER: &str = "[SET PACKAGE VERSION]";

#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateOptions {
    /// Keep the version in its own field instead of folding it into the name.
    pub pin: bool,
    /// Include the package's description and link.
    pub detail: bool,
}

/// A resolved package ready to be written to a configuration file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputPackage {
    pub name: String,
    /// Empty for the standard registry.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub registry: String,
    /// Empty when folded into `name`.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl OutputPackage {
    fn registry(&self) -> &str {
        if self.registry.is_empty() { STANDARD_REGISTRY } else { &self.registry }
    }
}

impl From<OutputPackage> for DeclaredPackage {
    fn from(package: OutputPackage) -> Self {
        let non_empty = |s: String| if s.is_empty() { None } else { Some(s) };
        DeclaredPackage {
            name: package.name,
            registry: non_empty(package.registry),
            version: non_empty(package.version),
            description: package.description,
            link: package.link,
        }
    }
}

/// Prefixes identifiers without a registry with the standard registry.
pub fn qualify_identifier(identifier: &str) -> String {
    if identifier.contains(',') {
        identifier.to_string()
    } else {
        format!("{STANDARD_REGISTRY},{identifier}")
    }
}

/// Resolves `identifiers` against the loaded registries.
///
/// Fails as a whole when any identifier names an unknown package. Packages
/// already in `declared`, or repeated within `identifiers`, are dropped; the
/// first occurrence wins and order is kept.
pub fn resolve(
    identifiers: &[String],
    index: &RegistryIndex,
    declared: &[DeclaredPackage],
    versions: &dyn VersionSource,
    options: GenerateOptions,
) -> Result<Vec<OutputPackage>> {
    let mut seen: HashSet<(String, String)> = declared
        .iter()
        .map(|p| (p.name.clone(), p.registry().to_string()))
        .collect();
    let mut packages = Vec::new();
    for identifier in identifiers {
        let qualified = qualify_identifier(identifier);
        let (key, version) = qualified.split_once('@').unwrap_or((qualified.as_str(), ""));
        let (registry, name) = key.split_once(',').unwrap_or((STANDARD_REGISTRY, key));
        let metadata = index.find(registry, name).map_err(|_| Error::UnknownPackage {
            identifier: qualified.clone(),
        })?;

        let package = output_package(metadata, registry, version, versions, options);
        if !seen.insert((package.name.clone(), package.registry().to_string())) {
            debug!(package_name = %package.name, "skip a package that is already declared");
            continue;
        }
        packages.push(package);
    }
    Ok(packages)
}

fn output_package(
    metadata: &PackageMetadata,
    registry: &str,
    version: &str,
    versions: &dyn VersionSource,
    options: GenerateOptions,
) -> OutputPackage {
    let mut package = OutputPackage {
        name: metadata.name.clone(),
        registry: if registry == STANDARD_REGISTRY { String::new() } else { registry.to_string() },
        version: version.to_string(),
        description: None,
        link: None,
    };
    if options.detail {
        package.description = metadata.description.clone();
        package.link = metadata
            .link
            .clone()
            .or_else(|| metadata.repo.as_ref().map(|repo| format!("https://github.com/{repo}")));
    }
    if package.version.is_empty() {
        match versions.latest_version(metadata) {
            Some(latest) => package.version = latest,
            None => {
                package.version = VERSION_PLACEHOLDER.to_string();
                return package;
            }
        }
    }
    if !options.pin {
        package.name = format!("{}@{}", package.name, package.version);
        package.version.clear();
    }
    package
}

/// `registry,name` for every package of every registry.
pub fn list_packages(index: &RegistryIndex) -> Vec<String> {
    index
        .registries()
        .flat_map(|(registry, content)| {
            content
                .packages()
                .iter()
                .map(move |package| format!("{registry},{}", package.name))
        })
        .collect()
}

/// Renders packages as `[[packages]]` TOML tables.
pub fn render_packages(packages: &[OutputPackage]) -> Result<String> {
    #[derive(Serialize)]
    struct Output<'a> {
        packages: &'a [OutputPackage],
    }
    Ok(toml::to_string_pretty(&Output { packages })?)
}

/// Appends packages to the configuration file at `config_path`.
pub fn insert_packages(config_path: &Path, packages: Vec<OutputPackage>) -> Result<()> {
    let mut config = ProjectConfig::load(config_path)?;
    let count = packages.len();
    config.add_packages(packages.into_iter().map(DeclaredPackage::from));
    config.save(config_path)?;
    info!(config = %config_path.display(), count, "added packages to the configuration");
    Ok(())
}
