//! Checksum computation, the persistent checksum ledger, checksum file
//! parsing and artifact verification.

pub mod ledger;
pub mod manifest;
pub mod verify;

use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use crate::context::InstallContext;
use crate::error::{Error, Result};

pub use ledger::ChecksumLedger;
pub use manifest::parse_checksum_file;
pub use verify::{ChecksumVerifier, VerifiedArtifact};

const BUF_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    #[default]
    Sha256,
    Sha512,
    Md5,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha512 => "sha512",
            Algorithm::Md5 => "md5",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Algorithm::Sha256),
            "sha512" | "sha-512" => Ok(Algorithm::Sha512),
            "md5" => Ok(Algorithm::Md5),
            other => Err(Error::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// An expected or computed checksum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumRecord {
    pub algorithm: Algorithm,
    pub checksum: String,
}

impl ChecksumRecord {
    pub fn new(algorithm: Algorithm, checksum: &str) -> Self {
        Self {
            algorithm,
            checksum: format_hash(checksum),
        }
    }
}

/// Lowercases a hex digest and strips an `<algorithm>:` prefix if present.
pub fn format_hash(hash: &str) -> String {
    let hash = hash.trim();
    let hash = match hash.split_once(':') {
        Some((prefix, rest)) if prefix.parse::<Algorithm>().is_ok() => rest,
        _ => hash,
    };
    hash.to_ascii_lowercase()
}

/// Incremental hasher over the supported algorithms.
pub enum Hasher {
    Sha256(Sha256),
    Sha512(Sha512),
    Md5(Md5),
}

impl Hasher {
    pub fn new(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            Algorithm::Sha512 => Hasher::Sha512(Sha512::new()),
            Algorithm::Md5 => Hasher::Md5(Md5::new()),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Sha256(h) => h.update(data),
            Hasher::Sha512(h) => h.update(data),
            Hasher::Md5(h) => h.update(data),
        }
    }

    /// Returns the digest as lowercase hex.
    pub fn finalize(self) -> String {
        match self {
            Hasher::Sha256(h) => hex::encode(h.finalize()),
            Hasher::Sha512(h) => hex::encode(h.finalize()),
            Hasher::Md5(h) => hex::encode(h.finalize()),
        }
    }
}

/// Copies `reader` into `writer` in chunks, hashing as it goes.
/// Checks for cancellation between chunks.
pub fn copy_and_hash<R: Read + ?Sized, W: Write>(
    ctx: &InstallContext,
    reader: &mut R,
    writer: &mut W,
    algorithm: Algorithm,
) -> Result<String> {
    let mut hasher = Hasher::new(algorithm);
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        ctx.check()?;
        let n = reader
            .read(&mut buf)
            .map_err(|e| Error::io("read the downloaded file", e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        writer
            .write_all(&buf[..n])
            .map_err(|e| Error::io("write a temporary file", e))?;
    }
    writer
        .flush()
        .map_err(|e| Error::io("write a temporary file", e))?;
    Ok(hasher.finalize())
}
