use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use crate::checksum::{Algorithm, ChecksumRecord};
use crate::error::{Error, Result};

/// On-disk layout of the checksum ledger.
#[derive(Serialize, Deserialize, Debug, Default)]
struct LedgerFile {
    #[serde(default)]
    checksums: Vec<LedgerEntry>,
}

#[derive(Serialize, Deserialize, Debug)]
struct LedgerEntry {
    id: String,
    algorithm: Algorithm,
    checksum: String,
}

#[derive(Debug, Default)]
struct LedgerState {
    entries: BTreeMap<String, ChecksumRecord>,
    changed: bool,
}

/// Checksums known for every package, version, platform and asset.
///
/// Shared by all installers of one command invocation. Every access goes
/// through one lock; holders never perform I/O while holding it.
#[derive(Debug, Default)]
pub struct ChecksumLedger {
    state: Mutex<LedgerState>,
}

impl ChecksumLedger {
    /// Creates an empty ledger that is never loaded from disk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the ledger at `path`. A missing file is an empty ledger.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let exists = path
            .try_exists()
            .map_err(|e| Error::io(format!("access the checksum ledger {}", path.display()), e))?;
        if !exists {
            debug!(path = %path.display(), "checksum ledger doesn't exist yet");
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::io(format!("read the checksum ledger {}", path.display()), e))?;
        let file: LedgerFile = toml::from_str(&content).map_err(|source| Error::LedgerParse {
            path: path.to_path_buf(),
            source,
        })?;
        let entries = file
            .checksums
            .into_iter()
            .map(|entry| (entry.id, ChecksumRecord::new(entry.algorithm, &entry.checksum)))
            .collect();
        Ok(Self {
            state: Mutex::new(LedgerState {
                entries,
                changed: false,
            }),
        })
    }

    /// Returns the checksum recorded for `id`, if any.
    pub fn get(&self, id: &str) -> Option<String> {
        self.state.lock().entries.get(id).map(|r| r.checksum.clone())
    }

    pub fn get_record(&self, id: &str) -> Option<ChecksumRecord> {
        self.state.lock().entries.get(id).cloned()
    }

    /// Records `record` for `id`, replacing any previous value.
    pub fn set(&self, id: &str, record: ChecksumRecord) {
        let mut state = self.state.lock();
        if state.entries.get(id) == Some(&record) {
            return;
        }
        state.entries.insert(id.to_string(), record);
        state.changed = true;
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a copy of every entry, ordered by ID.
    pub fn snapshot(&self) -> BTreeMap<String, ChecksumRecord> {
        self.state.lock().entries.clone()
    }

    pub fn is_changed(&self) -> bool {
        self.state.lock().changed
    }

    /// Writes the ledger if it changed since it was loaded.
    /// Returns whether the file was written.
    pub fn persist<P: AsRef<Path>>(&self, path: P) -> Result<bool> {
        if !self.is_changed() {
            return Ok(false);
        }
        self.save(path)?;
        self.state.lock().changed = false;
        Ok(true)
    }

    /// Like [`persist`](Self::persist), but logs failures instead of returning them.
    pub fn persist_or_log<P: AsRef<Path>>(&self, path: P) {
        let path = path.as_ref();
        if let Err(e) = self.persist(path) {
            error!(path = %path.display(), error = %e, "update the checksum ledger");
        }
    }

    /// Unconditionally writes the ledger, sorted by ID, replacing the file atomically.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = LedgerFile {
            checksums: self
                .snapshot()
                .into_iter()
                .map(|(id, record)| LedgerEntry {
                    id,
                    algorithm: record.algorithm,
                    checksum: record.checksum,
                })
                .collect(),
        };
        let content = toml::to_string_pretty(&file).map_err(|e| {
            Error::io(
                format!("serialize the checksum ledger {}", path.display()),
                std::io::Error::other(e),
            )
        })?;
        let dir = parent_dir(path);
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::io(format!("create a directory {}", dir.display()), e))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| Error::io("create a temporary file for the checksum ledger", e))?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| Error::io("write the checksum ledger", e))?;
        tmp.persist(path)
            .map_err(|e| Error::io(format!("write the checksum ledger {}", path.display()), e.error))?;
        Ok(())
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
