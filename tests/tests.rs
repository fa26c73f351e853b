use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::TempDir;
use toolpin::checksum::{Algorithm, ChecksumLedger, ChecksumRecord, Hasher};
use toolpin::config::PolicyConfig;
use toolpin::download::{ArtifactSource, ChecksumSource};
use toolpin::registry::{RegistryContent, RegistryIndex};
use toolpin::*;

const REGISTRY: &str = r#"{"packages": [
    {
        "name": "acme/tool",
        "repo": "acme/tool",
        "asset": "tool_{os}_{arch}.tar.gz",
        "checksum": {"asset": "checksums.txt"},
        "requires": [{"name": "acme/helper", "version": "v0.1.0"}]
    },
    {
        "name": "acme/other",
        "repo": "acme/other",
        "asset": "other_{os}_{arch}.tar.gz",
        "requires": [{"name": "acme/helper", "version": "v0.1.0"}]
    },
    {
        "name": "acme/helper",
        "type": "http",
        "url": "https://example.com/helper/{version}/helper_{os}_{arch}.tar.gz"
    },
    {
        "name": "acme/mac-only",
        "repo": "acme/mac-only",
        "asset": "mac-only.tar.gz",
        "supported_envs": ["darwin"]
    }
]}"#;

const TOOL_URL: &str = "https://github.com/acme/tool/releases/download/v1.0.0/tool_linux_amd64.tar.gz";
const OTHER_URL: &str = "https://github.com/acme/other/releases/download/v2.0.0/other_linux_amd64.tar.gz";
const HELPER_URL: &str = "https://example.com/helper/v0.1.0/helper_linux_amd64.tar.gz";
const TOOL_ID: &str = "acme/tool/v1.0.0/linux/amd64/tool_linux_amd64.tar.gz";

fn tarball(file_name: &str, content: &[u8]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o755);
    header.set_cksum();
    builder.append_data(&mut header, file_name, content).unwrap();
    builder.into_inner().unwrap().finish().unwrap()
}

fn sha256(data: &[u8]) -> String {
    let mut hasher = Hasher::new(Algorithm::Sha256);
    hasher.update(data);
    hasher.finalize()
}

#[derive(Default)]
struct MemoryArtifacts {
    files: HashMap<String, Vec<u8>>,
    opened: Mutex<Vec<String>>,
    /// Time each helper download takes.
    helper_delay: Duration,
    helper_active: AtomicUsize,
    helper_max_active: AtomicUsize,
}

impl MemoryArtifacts {
    fn new() -> Self {
        let mut files = HashMap::new();
        files.insert(TOOL_URL.to_string(), tarball("tool", b"tool v1"));
        files.insert(OTHER_URL.to_string(), tarball("other", b"other v2"));
        files.insert(HELPER_URL.to_string(), tarball("helper", b"helper"));
        Self {
            files,
            ..Default::default()
        }
    }

    fn opened(&self, url: &str) -> usize {
        self.opened.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

impl ArtifactSource for MemoryArtifacts {
    fn open(&self, ctx: &InstallContext, url: &str) -> Result<Box<dyn Read + Send>> {
        ctx.check()?;
        self.opened.lock().unwrap().push(url.to_string());
        if url == HELPER_URL {
            let active = self.helper_active.fetch_add(1, Ordering::SeqCst) + 1;
            self.helper_max_active.fetch_max(active, Ordering::SeqCst);
            std::thread::sleep(self.helper_delay);
            self.helper_active.fetch_sub(1, Ordering::SeqCst);
        }
        let body = self.files.get(url).cloned().ok_or_else(|| Error::Download {
            url: url.to_string(),
            reason: "404 Not Found".to_string(),
        })?;
        Ok(Box::new(Cursor::new(body)))
    }
}

#[derive(Default)]
struct MemoryChecksums {
    manifest: Option<String>,
}

impl ChecksumSource for MemoryChecksums {
    fn fetch_checksum_file(
        &self,
        _ctx: &InstallContext,
        _package: &PackageDescriptor,
        _platform: &PlatformInfo,
    ) -> Result<Option<String>> {
        Ok(self.manifest.clone())
    }
}

struct Fixture {
    root: TempDir,
    index: Arc<RegistryIndex>,
    artifacts: Arc<MemoryArtifacts>,
}

impl Fixture {
    fn new(artifacts: MemoryArtifacts) -> Self {
        let mut index = RegistryIndex::new();
        index.insert("standard", RegistryContent::parse("standard", REGISTRY).unwrap());
        Self {
            root: TempDir::new().unwrap(),
            index: Arc::new(index),
            artifacts: Arc::new(artifacts),
        }
    }

    fn installer(&self, checksums: MemoryChecksums) -> Installer {
        Installer::new(
            self.root.path().to_path_buf(),
            PlatformInfo::new("linux", "amd64"),
            self.artifacts.clone(),
            Arc::new(checksums),
        )
    }

    fn session(&self, installer: Installer, ledger: &Arc<ChecksumLedger>) -> InstallSession {
        InstallSession::new(Arc::new(installer), self.index.clone(), Some(ledger.clone()))
    }

    fn descriptor(&self, name: &str, version: &str) -> PackageDescriptor {
        self.index.descriptor("standard", name, version).unwrap()
    }

    fn package_dir(&self, name: &str, version: &str) -> std::path::PathBuf {
        self.root.path().join("pkgs").join("github_release").join("standard").join(name).join(version)
    }
}

fn is_linked(root: &Path, name: &str) -> bool {
    std::fs::symlink_metadata(root.join("bin").join(name)).is_ok()
        || root.join("bin").join(format!("{name}.bat")).exists()
}

#[test]
fn test_first_install_records_checksum_and_persists() {
    let fixture = Fixture::new(MemoryArtifacts::new());
    let ledger = Arc::new(ChecksumLedger::new());
    let session = fixture.session(fixture.installer(MemoryChecksums::default()), &ledger);

    session
        .run(&InstallContext::new(), &[fixture.descriptor("acme/tool", "v1.0.0")])
        .unwrap();

    assert!(fixture.package_dir("acme/tool", "v1.0.0").join("tool").is_file());
    assert!(is_linked(fixture.root.path(), "tool"));
    assert!(is_linked(fixture.root.path(), "helper"));
    let expected = sha256(&tarball("tool", b"tool v1"));
    assert_eq!(ledger.get(TOOL_ID).as_deref(), Some(expected.as_str()));
    // the helper is verified against a private ledger
    assert_eq!(ledger.len(), 1);

    let ledger_path = fixture.root.path().join("toolpin-checksums.toml");
    assert!(ledger.persist(&ledger_path).unwrap());
    let reloaded = ChecksumLedger::load(&ledger_path).unwrap();
    assert_eq!(reloaded.snapshot(), ledger.snapshot());
    assert!(!reloaded.persist(&ledger_path).unwrap());
}

#[test]
fn test_tampered_artifact_is_rejected() {
    let mut artifacts = MemoryArtifacts::new();
    artifacts.files.insert(TOOL_URL.to_string(), tarball("tool", b"tampered"));
    let fixture = Fixture::new(artifacts);
    let ledger = ChecksumLedger::new();
    ledger.set(TOOL_ID, ChecksumRecord::new(Algorithm::Sha256, &sha256(&tarball("tool", b"tool v1"))));
    let installer = fixture.installer(MemoryChecksums::default());

    let err = installer
        .install_package(
            &InstallContext::new(),
            ParamInstallPackage {
                ledger: Some(&ledger),
                package: &fixture.descriptor("acme/tool", "v1.0.0"),
                checksum: None,
                disable_policy: false,
            },
        )
        .unwrap_err();
    assert!(err.is_integrity());
    assert!(!fixture.package_dir("acme/tool", "v1.0.0").exists());
    assert!(!is_linked(fixture.root.path(), "tool"));
}

#[test]
fn test_published_checksums_fill_the_ledger() {
    let fixture = Fixture::new(MemoryArtifacts::new());
    let manifest = format!(
        "{}  tool_linux_amd64.tar.gz\n{}  tool_darwin_arm64.tar.gz\n",
        sha256(&tarball("tool", b"tool v1")),
        "a".repeat(64)
    );
    let ledger = Arc::new(ChecksumLedger::new());
    let installer = fixture.installer(MemoryChecksums { manifest: Some(manifest) });
    fixture
        .session(installer, &ledger)
        .run(&InstallContext::new(), &[fixture.descriptor("acme/tool", "v1.0.0")])
        .unwrap();

    assert!(ledger.get(TOOL_ID).is_some());
    assert_eq!(
        ledger.get("acme/tool/v1.0.0/darwin/arm64/tool_darwin_arm64.tar.gz"),
        Some("a".repeat(64))
    );
}

#[test]
fn test_unsupported_package_is_a_no_op() {
    let fixture = Fixture::new(MemoryArtifacts::new());
    let ledger = Arc::new(ChecksumLedger::new());
    fixture
        .session(fixture.installer(MemoryChecksums::default()), &ledger)
        .run(&InstallContext::new(), &[fixture.descriptor("acme/mac-only", "v1.0.0")])
        .unwrap();

    assert!(!fixture.root.path().join("pkgs").exists());
    assert!(!fixture.root.path().join("bin").exists());
    assert!(ledger.is_empty());
    assert!(!ledger.is_changed());
}

#[test]
fn test_shared_requirement_is_installed_once() {
    let fixture = Fixture::new(MemoryArtifacts::new());
    let ledger = Arc::new(ChecksumLedger::new());
    let packages = [
        fixture.descriptor("acme/tool", "v1.0.0"),
        fixture.descriptor("acme/other", "v2.0.0"),
    ];
    fixture
        .session(fixture.installer(MemoryChecksums::default()), &ledger)
        .run(&InstallContext::new(), &packages)
        .unwrap();

    assert_eq!(fixture.artifacts.opened(HELPER_URL), 1);
    assert_eq!(fixture.artifacts.opened(TOOL_URL), 1);
    assert_eq!(fixture.artifacts.opened(OTHER_URL), 1);
    assert!(
        fixture
            .root
            .path()
            .join("pkgs/http/standard/acme/helper/v0.1.0/helper")
            .is_file()
    );
}

#[test]
fn test_declared_requirement_is_installed_once() {
    let mut artifacts = MemoryArtifacts::new();
    artifacts.helper_delay = Duration::from_millis(200);
    let fixture = Fixture::new(artifacts);
    let ledger = Arc::new(ChecksumLedger::new());
    let session = fixture.session(fixture.installer(MemoryChecksums::default()), &ledger);
    let packages = [
        fixture.descriptor("acme/tool", "v1.0.0"),
        fixture.descriptor("acme/helper", "v0.1.0"),
    ];
    let pool = rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap();
    pool.install(|| session.run(&InstallContext::new(), &packages)).unwrap();

    assert_eq!(fixture.artifacts.opened(HELPER_URL), 1);
    assert_eq!(fixture.artifacts.helper_max_active.load(Ordering::SeqCst), 1);
    assert!(is_linked(fixture.root.path(), "helper"));
    assert!(is_linked(fixture.root.path(), "tool"));
}

#[test]
fn test_policy_rejects_other_registries() {
    let fixture = Fixture::new(MemoryArtifacts::new());
    let ledger = Arc::new(ChecksumLedger::new());
    let installer = fixture.installer(MemoryChecksums::default()).with_policy(PolicyConfig {
        allowed_registries: vec!["internal".to_string()],
    });
    let err = fixture
        .session(installer, &ledger)
        .run(&InstallContext::new(), &[fixture.descriptor("acme/tool", "v1.0.0")])
        .unwrap_err();
    assert!(matches!(err, Error::InstallFailures { failed: 1 }));
    assert_eq!(fixture.artifacts.opened(TOOL_URL), 0);
    // helpers skip the policy
    assert_eq!(fixture.artifacts.opened(HELPER_URL), 1);
}

#[test]
fn test_required_checksum_refuses_unknown_artifacts() {
    let fixture = Fixture::new(MemoryArtifacts::new());
    let ledger = Arc::new(ChecksumLedger::new());
    let installer = fixture.installer(MemoryChecksums::default()).trust_on_first_use(false);
    let err = installer
        .install_package(
            &InstallContext::new(),
            ParamInstallPackage {
                ledger: Some(&ledger),
                package: &fixture.descriptor("acme/tool", "v1.0.0"),
                checksum: None,
                disable_policy: false,
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::ChecksumMissing { ref id } if id == TOOL_ID));
    assert!(ledger.is_empty());
}

#[test]
fn test_cancelled_session_leaves_ledger_untouched() {
    let fixture = Fixture::new(MemoryArtifacts::new());
    let ledger = Arc::new(ChecksumLedger::new());
    let ctx = InstallContext::new();
    ctx.cancel();
    let err = fixture
        .session(fixture.installer(MemoryChecksums::default()), &ledger)
        .run(&ctx, &[fixture.descriptor("acme/tool", "v1.0.0")])
        .unwrap_err();
    assert!(matches!(err, Error::InstallFailures { failed: 1 }));
    assert!(ledger.is_empty());
    assert_eq!(fixture.artifacts.opened(TOOL_URL), 0);
}
