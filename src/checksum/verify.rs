//! Verification of downloaded artifacts against the checksum ledger.
//!
//! The expected checksum of an artifact comes from, in order:
//! - the ledger (pre-seeded by the caller or recorded by an earlier install),
//! - the checksum file published with the release, when the package's
//!   checksum policy is enabled.
//!
//! When neither source knows the artifact, the computed digest is recorded
//! as the expected one (trust on first use) unless the verifier was built
//! with trust on first use turned off.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;
use tracing::{debug, info, warn};
use crate::checksum::{copy_and_hash, format_hash, parse_checksum_file, Algorithm, ChecksumLedger, ChecksumRecord};
use crate::context::InstallContext;
use crate::download::ChecksumSource;
use crate::error::{Error, Result};
use crate::package::{checksum_id, PackageDescriptor, ARCHIVE_ASSET_NAME};
use crate::platform::PlatformInfo;

/// A downloaded artifact whose checksum was verified, rewound to its start.
///
/// Backed by an anonymous temporary file which the OS removes once the
/// handle is dropped.
#[derive(Debug)]
pub struct VerifiedArtifact {
    file: File,
    checksum: ChecksumRecord,
}

impl VerifiedArtifact {
    pub fn checksum(&self) -> &ChecksumRecord {
        &self.checksum
    }

    pub fn into_file(self) -> File {
        self.file
    }
}

impl Read for VerifiedArtifact {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for VerifiedArtifact {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

pub struct ChecksumVerifier {
    platform: PlatformInfo,
    checksum_source: Arc<dyn ChecksumSource>,
    trust_on_first_use: bool,
}

impl ChecksumVerifier {
    pub fn new(platform: PlatformInfo, checksum_source: Arc<dyn ChecksumSource>) -> Self {
        Self {
            platform,
            checksum_source,
            trust_on_first_use: true,
        }
    }

    /// When disabled, an artifact without any known checksum fails with
    /// [`Error::ChecksumMissing`] instead of being recorded as-is.
    pub fn trust_on_first_use(mut self, enabled: bool) -> Self {
        self.trust_on_first_use = enabled;
        self
    }

    /// Streams `body` into a temporary file and checks its digest.
    ///
    /// `asset_name` is the artifact's file name; empty for source archives.
    pub fn verify(
        &self,
        ctx: &InstallContext,
        ledger: &ChecksumLedger,
        package: &PackageDescriptor,
        asset_name: &str,
        body: &mut (dyn Read + Send),
    ) -> Result<VerifiedArtifact> {
        let metadata = &package.metadata;
        let algorithm = metadata.checksum_algorithm();

        let mut file = tempfile::tempfile().map_err(|e| Error::io("create a temporary file", e))?;
        let calculated = copy_and_hash(ctx, body, &mut file, algorithm)?;

        let platform = self.platform.effective(metadata.rosetta2, metadata.windows_arm_emulation);
        let id = checksum_id(&package.name, &package.version, &platform, asset_name);
        let mut expected = ledger.get_record(&id);

        if expected.is_none() && metadata.checksum_enabled() {
            info!(package_name = %package.name, package_version = %package.version, "downloading a checksum file");
            if let Some(raw) = self.checksum_source.fetch_checksum_file(ctx, package, &platform)? {
                let checksums = parse_checksum_file(&raw, metadata)?;
                ctx.check()?;
                for (file_name, value) in &checksums {
                    match metadata.checksum_ids_from_asset(&package.version, file_name) {
                        Ok(ids) => {
                            for manifest_id in ids {
                                ledger.set(&manifest_id, ChecksumRecord::new(algorithm, value));
                            }
                        }
                        Err(e) => {
                            warn!(asset = %file_name, error = %e, "get checksum ID");
                        }
                    }
                }
                let lookup = if asset_name.is_empty() { ARCHIVE_ASSET_NAME } else { asset_name };
                expected = checksums.get(lookup).map(|value| ChecksumRecord::new(algorithm, value));
            }
        }

        let checksum = ChecksumRecord::new(algorithm, &calculated);
        match expected {
            Some(expected) => {
                let actual = if expected.algorithm == algorithm {
                    calculated
                } else {
                    rehash(ctx, &mut file, expected.algorithm)?
                };
                if format_hash(&expected.checksum) != actual {
                    return Err(Error::Integrity {
                        package: package.name.clone(),
                        expected: expected.checksum,
                        actual,
                    });
                }
                debug!(checksum_id = %id, "checksum is valid");
            }
            None => {
                if !self.trust_on_first_use {
                    return Err(Error::ChecksumMissing { id });
                }
                debug!(checksum_id = %id, checksum = %checksum.checksum, "record the calculated checksum");
                ledger.set(&id, checksum.clone());
            }
        }

        file.seek(SeekFrom::Start(0))
            .map_err(|e| Error::io("rewind the downloaded file", e))?;
        Ok(VerifiedArtifact { file, checksum })
    }
}

fn rehash(ctx: &InstallContext, file: &mut File, algorithm: Algorithm) -> Result<String> {
    file.seek(SeekFrom::Start(0))
        .map_err(|e| Error::io("rewind the downloaded file", e))?;
    copy_and_hash(ctx, file, &mut io::sink(), algorithm)
}
