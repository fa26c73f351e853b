use std::collections::BTreeMap;
use regex::Regex;
use tracing::trace;
use crate::checksum::format_hash;
use crate::error::{Error, Result};
use crate::package::PackageMetadata;

/// `<hex-digest> <filename>`, as written by `sha256sum` and friends.
/// The filename may carry the `*` binary marker or a `./` prefix.
const GNU_LINE: &str = r"^([0-9a-fA-F]+)\s+\*?(?:\./)?(\S+)$";
/// `SHA256 (filename) = <hex-digest>`, as written by BSD `shasum --tag`.
const BSD_LINE: &str = r"^[A-Za-z0-9-]+ \((.+)\) = ([0-9a-fA-F]+)$";

/// Parses a release checksum file into `filename => checksum`.
///
/// Lines that match neither format are skipped. A file that yields no entry
/// at all is an error when the package has checksum verification enabled.
pub fn parse_checksum_file(raw: &str, package: &PackageMetadata) -> Result<BTreeMap<String, String>> {
    let gnu = Regex::new(GNU_LINE).map_err(|e| parse_error(package, &e.to_string()))?;
    let bsd = Regex::new(BSD_LINE).map_err(|e| parse_error(package, &e.to_string()))?;

    let mut checksums = BTreeMap::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(caps) = gnu.captures(line) {
            checksums.insert(caps[2].to_string(), format_hash(&caps[1]));
        } else if let Some(caps) = bsd.captures(line) {
            checksums.insert(caps[1].to_string(), format_hash(&caps[2]));
        } else {
            trace!(line, "skip an unrecognized line of the checksum file");
        }
    }

    if checksums.is_empty() && package.checksum_enabled() {
        return Err(parse_error(package, "no checksum is found"));
    }
    Ok(checksums)
}

fn parse_error(package: &PackageMetadata, reason: &str) -> Error {
    Error::ManifestParse {
        package: package.name.clone(),
        reason: reason.to_string(),
    }
}
