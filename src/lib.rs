//! # toolpin Core Library
//!
//! This crate contains the core logic of `toolpin`, a version manager that installs command-line
//! tools pinned per project in a `toolpin.toml`, verifying every download against a checksum ledger
//! kept next to the configuration (`toolpin-checksums.toml`).
//!
//! This library is built for the `toolpin` CLI, but you can also reuse it as a backend in other tools.
//!
//! ## Modules Overview
//! - [`config`] – Parsing and serialization of `toolpin.toml`
//! - [`registry`] – Loading registries and looking up packages by name or alias
//! - [`package`] – Package metadata, URL templates and checksum IDs
//! - [`checksum`] – The checksum ledger, checksum file parsing and artifact verification
//! - [`overrides`] / [`constraint`] – Version-specific metadata and the constraint language
//! - [`installer`] – Downloading, unpacking and linking one package
//! - [`coordinator`] – Serialized installs of helper tools shared between packages
//! - [`session`] – Parallel installation of every declared package
//! - [`generate`] – Turning identifiers into `[[packages]]` entries
//! - [`shims`] – Links forwarding tool invocations to installed executables
//! - [`global`] – Install root and directory layout

pub mod checksum;
pub mod config;
pub mod constraint;
pub mod context;
pub mod coordinator;
pub mod download;
pub mod error;
pub mod generate;
pub mod global;
pub mod installer;
pub mod logging;
pub mod overrides;
pub mod package;
pub mod platform;
pub mod registry;
pub mod session;
pub mod shims;
pub mod unarchive;

pub use error::{Error, Result};
pub use checksum::{ChecksumLedger, ChecksumVerifier};
pub use context::InstallContext;
pub use coordinator::{CoordinatorMap, SingleInstallCoordinator};
pub use installer::{Installer, ParamInstallPackage};
pub use package::{PackageDescriptor, PackageMetadata};
pub use platform::PlatformInfo;
pub use session::InstallSession;
