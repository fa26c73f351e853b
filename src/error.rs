//! Error types shared by every stage of the install pipeline.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("download {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("parse the checksum file of {package}: {reason}")]
    ManifestParse { package: String, reason: String },

    /// The computed digest differs from the expected one. Never retried.
    #[error("checksum is invalid for {package}: expected {expected}, actual {actual}")]
    Integrity {
        package: String,
        expected: String,
        actual: String,
    },

    #[error("no checksum of {id} is known and checksum.require_checksum is set")]
    ChecksumMissing { id: String },

    #[error("evaluate the version constraint `{expression}`: {reason}")]
    ConstraintEval { expression: String, reason: String },

    #[error("unknown package: {identifier}")]
    UnknownPackage { identifier: String },

    #[error("no version is declared for {package}")]
    MissingVersion { package: String },

    #[error("unknown registry: {name}")]
    UnknownRegistry { name: String },

    #[error("package {package} from registry {registry} isn't allowed by the policy")]
    PolicyViolation { registry: String, package: String },

    #[error("parse the checksum ledger {path}: {source}")]
    LedgerParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("load the registry {name}: {reason}")]
    Registry { name: String, reason: String },

    #[error("render a template of {package}: {reason}")]
    Template { package: String, reason: String },

    #[error("render packages as TOML: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("unsupported checksum algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("the operation was cancelled")]
    Cancelled,

    #[error("install {name}@{version}: {source}")]
    Package {
        name: String,
        version: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{failed} package(s) failed to install")]
    InstallFailures { failed: usize },
}

impl Error {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    /// Wraps the error with the name and version of the package being installed.
    pub fn for_package(self, name: &str, version: &str) -> Self {
        Error::Package {
            name: name.to_string(),
            version: version.to_string(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, looking through [`Error::Package`] annotations.
    pub fn root(&self) -> &Error {
        match self {
            Error::Package { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_integrity(&self) -> bool {
        matches!(self.root(), Error::Integrity { .. })
    }
}
