use std::sync::Arc;
use rayon::prelude::*;
use tracing::{debug, error, info};
use crate::checksum::ChecksumLedger;
use crate::config::DeclaredPackage;
use crate::context::InstallContext;
use crate::coordinator::{CoordinatorMap, SingleInstallCoordinator};
use crate::error::{Error, Result};
use crate::installer::{Installer, ParamInstallPackage};
use crate::overrides::override_metadata;
use crate::package::PackageDescriptor;
use crate::registry::RegistryIndex;

/// One `install` invocation: the declared packages are installed in parallel
/// against a shared ledger, and helper tools they require go through one
/// coordinator per requirement.
pub struct InstallSession {
    installer: Arc<Installer>,
    index: Arc<RegistryIndex>,
    ledger: Option<Arc<ChecksumLedger>>,
    coordinators: CoordinatorMap,
}

impl InstallSession {
    /// `ledger` is `None` when checksum verification is turned off.
    pub fn new(installer: Arc<Installer>, index: Arc<RegistryIndex>, ledger: Option<Arc<ChecksumLedger>>) -> Self {
        Self {
            installer,
            index,
            ledger,
            coordinators: CoordinatorMap::new(),
        }
    }

    /// Looks up the declared packages in the registries. With `only`, just
    /// the package of that name is returned.
    pub fn descriptors(&self, declared: &[DeclaredPackage], only: Option<&str>) -> Result<Vec<PackageDescriptor>> {
        let mut descriptors = Vec::new();
        for package in declared {
            let (name, version) = package.name_and_version();
            if only.is_some_and(|only| only != name) {
                continue;
            }
            if version.is_empty() {
                return Err(Error::MissingVersion {
                    package: name.to_string(),
                });
            }
            descriptors.push(self.index.descriptor(package.registry(), name, version)?);
        }
        if let (Some(only), true) = (only, descriptors.is_empty()) {
            return Err(Error::UnknownPackage {
                identifier: only.to_string(),
            });
        }
        Ok(descriptors)
    }

    /// Installs every package, continuing past failures. Each failure is
    /// logged; the result reports how many there were.
    pub fn run(&self, ctx: &InstallContext, packages: &[PackageDescriptor]) -> Result<()> {
        let failed = packages
            .par_iter()
            .filter_map(|package| {
                self.install(ctx, package)
                    .map_err(|e| e.for_package(&package.name, &package.version))
                    .err()
            })
            .inspect(|e| error!(error = %e, "install the package"))
            .count();
        if failed > 0 {
            return Err(Error::InstallFailures { failed });
        }
        Ok(())
    }

    fn install(&self, ctx: &InstallContext, package: &PackageDescriptor) -> Result<()> {
        ctx.check()?;
        let platform = self.installer.platform();
        let metadata = override_metadata(&package.metadata, &package.version, platform)?;
        if !metadata.is_supported(platform) {
            debug!(
                package_name = %package.name,
                package_version = %package.version,
                "the package isn't supported on this platform"
            );
            return Ok(());
        }
        let package = package.with_metadata(metadata);
        self.install_requirements(ctx, &package)?;

        // the package may also be a requirement of another declared package
        let lock = self.coordinators.lock(&package.key());
        let _guard = lock.lock();
        self.installer.install_package(
            ctx,
            ParamInstallPackage {
                ledger: self.ledger.as_deref(),
                package: &package,
                checksum: None,
                disable_policy: false,
            },
        )?;
        info!(package_name = %package.name, package_version = %package.version, "installed the package");
        Ok(())
    }

    fn install_requirements(&self, ctx: &InstallContext, package: &PackageDescriptor) -> Result<()> {
        for requirement in &package.metadata.requires {
            // aliases share the key of the package they name
            let key = match self.index.find(requirement.registry(), &requirement.name) {
                Ok(metadata) => format!("{},{}@{}", requirement.registry(), metadata.name, requirement.version),
                Err(_) => requirement.key(),
            };
            let coordinator = self.coordinators.get_or_insert_with(&key, || {
                let index = self.index.clone();
                let registry = requirement.registry().to_string();
                let name = requirement.name.clone();
                let version = requirement.version.clone();
                SingleInstallCoordinator::new(
                    self.installer.clone(),
                    requirement,
                    Box::new(move || index.descriptor(&registry, &name, &version)),
                )
            });
            coordinator.install(ctx)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use crate::download::{ArtifactSource, ChecksumSource};
    use crate::platform::PlatformInfo;
    use crate::registry::RegistryContent;

    struct Unreachable;

    impl ArtifactSource for Unreachable {
        fn open(&self, _ctx: &InstallContext, url: &str) -> Result<Box<dyn Read + Send>> {
            Err(Error::Download {
                url: url.to_string(),
                reason: "offline".to_string(),
            })
        }
    }

    impl ChecksumSource for Unreachable {
        fn fetch_checksum_file(
            &self,
            _ctx: &InstallContext,
            _package: &PackageDescriptor,
            _platform: &PlatformInfo,
        ) -> Result<Option<String>> {
            Ok(None)
        }
    }

    fn session(root: &std::path::Path) -> InstallSession {
        let mut index = RegistryIndex::new();
        let content = RegistryContent::parse(
            "standard",
            r#"{"packages": [
                {"name": "acme/tool", "type": "http", "url": "https://example.com/tool_{os}_{arch}"},
                {"name": "acme/mac-only", "type": "http", "url": "https://example.com/mac", "supported_envs": ["darwin"]}
            ]}"#,
        )
        .unwrap();
        index.insert("standard", content);
        let installer = Installer::new(
            root.to_path_buf(),
            PlatformInfo::new("linux", "amd64"),
            Arc::new(Unreachable),
            Arc::new(Unreachable),
        );
        InstallSession::new(Arc::new(installer), Arc::new(index), Some(Arc::new(ChecksumLedger::new())))
    }

    fn declared(name: &str) -> DeclaredPackage {
        DeclaredPackage {
            name: name.to_string(),
            registry: None,
            version: None,
            description: None,
            link: None,
        }
    }

    #[test]
    fn test_descriptors_accept_folded_versions() {
        let dir = tempfile::tempdir().unwrap();
        let descriptors = session(dir.path())
            .descriptors(&[declared("acme/tool@v1.0.0")], None)
            .unwrap();
        assert_eq!(descriptors[0].name, "acme/tool");
        assert_eq!(descriptors[0].version, "v1.0.0");
    }

    #[test]
    fn test_descriptors_require_a_version() {
        let dir = tempfile::tempdir().unwrap();
        let err = session(dir.path()).descriptors(&[declared("acme/tool")], None).unwrap_err();
        assert!(matches!(err, Error::MissingVersion { .. }));
    }

    #[test]
    fn test_descriptors_filter_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        let packages = [declared("acme/tool@v1.0.0"), declared("acme/mac-only@v2")];
        let descriptors = session.descriptors(&packages, Some("acme/mac-only")).unwrap();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].version, "v2");
        assert!(session.descriptors(&packages, Some("missing")).is_err());
    }

    #[test]
    fn test_failures_are_counted_and_unsupported_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        let packages = session
            .descriptors(&[declared("acme/tool@v1.0.0"), declared("acme/mac-only@v2")], None)
            .unwrap();
        let err = session.run(&InstallContext::new(), &packages).unwrap_err();
        assert!(matches!(err, Error::InstallFailures { failed: 1 }));
    }
}
