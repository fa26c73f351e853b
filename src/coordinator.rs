//! Serialized installation of helper tools shared between packages.
//!
//! Several packages may require the same helper at the same version. Every
//! requirement key gets exactly one [`SingleInstallCoordinator`], and all
//! installs through it run one at a time. The lock is shared with direct
//! installs of the same package through [`CoordinatorMap::lock`], so
//! concurrent workers never race on the same package directory.

use std::collections::BTreeMap;
use std::sync::Arc;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;
use crate::checksum::{ChecksumLedger, ChecksumRecord};
use crate::context::InstallContext;
use crate::error::Result;
use crate::installer::{Installer, ParamInstallPackage};
use crate::overrides::override_metadata;
use crate::package::{PackageDescriptor, Requirement};

/// Produces the descriptor of a coordinated package on demand.
pub trait DeferredPackage: Send + Sync {
    fn resolve(&self) -> Result<PackageDescriptor>;
}

impl<F> DeferredPackage for F
where
    F: Fn() -> Result<PackageDescriptor> + Send + Sync,
{
    fn resolve(&self) -> Result<PackageDescriptor> {
        self()
    }
}

pub struct SingleInstallCoordinator {
    installer: Arc<Installer>,
    lock: Arc<Mutex<()>>,
    name: String,
    version: String,
    package: Box<dyn DeferredPackage>,
    /// `os/arch` => checksum.
    checksums: BTreeMap<String, String>,
}

impl SingleInstallCoordinator {
    pub fn new(installer: Arc<Installer>, requirement: &Requirement, package: Box<dyn DeferredPackage>) -> Self {
        Self {
            installer,
            lock: Arc::new(Mutex::new(())),
            name: requirement.name.clone(),
            version: requirement.version.clone(),
            package,
            checksums: requirement.checksums.clone(),
        }
    }

    /// Replaces the coordinator's own lock with one shared with other installers of the package.
    pub fn with_lock(mut self, lock: Arc<Mutex<()>>) -> Self {
        self.lock = lock;
        self
    }

    /// Installs the package, waiting for any other install through this
    /// coordinator to finish first.
    ///
    /// Verification uses a ledger private to this call, seeded with the
    /// checksum recorded for the current platform, so nothing it learns is
    /// ever written to the project's ledger.
    pub fn install(&self, ctx: &InstallContext) -> Result<()> {
        let _guard = self.lock.lock();
        ctx.check()?;
        let package = self
            .package
            .resolve()
            .map_err(|e| e.for_package(&self.name, &self.version))?;
        let platform = self.installer.platform();

        let metadata = override_metadata(&package.metadata, &package.version, platform)
            .map_err(|e| e.for_package(&package.name, &package.version))?;
        if !metadata.is_supported(platform) {
            debug!(
                package_name = %package.name,
                package_version = %package.version,
                "the package isn't supported on this platform"
            );
            return Ok(());
        }
        let package = package.with_metadata(metadata);

        let key = platform.key(package.metadata.rosetta2, package.metadata.windows_arm_emulation);
        let checksum = self
            .checksums
            .get(&key)
            .map(|value| ChecksumRecord::new(package.metadata.checksum_algorithm(), value));

        let ledger = ChecksumLedger::new();
        self.installer
            .install_package(
                ctx,
                ParamInstallPackage {
                    ledger: Some(&ledger),
                    package: &package,
                    checksum,
                    disable_policy: true,
                },
            )
            .map_err(|e| e.for_package(&package.name, &package.version))
    }
}

/// Package key => coordinator, shared by every install worker.
#[derive(Default)]
pub struct CoordinatorMap {
    coordinators: DashMap<String, Arc<SingleInstallCoordinator>>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl CoordinatorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the coordinator for `key`, creating it with `create` if this is
    /// the first request. `create` runs at most once per key, and the
    /// coordinator holds [`lock`](Self::lock) of the same key.
    pub fn get_or_insert_with<F>(&self, key: &str, create: F) -> Arc<SingleInstallCoordinator>
    where
        F: FnOnce() -> SingleInstallCoordinator,
    {
        self.coordinators
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(create().with_lock(self.lock(key))))
            .clone()
    }

    /// The install lock of `key`. Anything installing the package outside a
    /// coordinator must hold it.
    pub fn lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks.entry(key.to_string()).or_default().clone()
    }

    pub fn len(&self) -> usize {
        self.coordinators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinators.is_empty()
    }
}
