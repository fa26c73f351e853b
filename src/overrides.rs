use tracing::debug;
use crate::constraint::evaluate;
use crate::error::Result;
use crate::package::{PackageMetadata, VersionOverride};
use crate::platform::PlatformInfo;

/// Returns the metadata that applies to `version`.
///
/// When the package's own `version_constraint` is absent or matches, the
/// metadata is returned as declared. Otherwise the first matching entry of
/// `version_overrides` is applied. The input is never modified, so the same
/// registry entry can be shared between concurrent installs.
pub fn override_metadata(
    metadata: &PackageMetadata,
    version: &str,
    platform: &PlatformInfo,
) -> Result<PackageMetadata> {
    let Some(constraint) = &metadata.version_constraint else {
        return Ok(metadata.clone());
    };
    if evaluate(constraint, version)? {
        return Ok(metadata.clone());
    }
    for rule in &metadata.version_overrides {
        if evaluate(&rule.version_constraint, version)? {
            debug!(
                package_name = %metadata.name,
                package_version = version,
                platform = %platform,
                version_constraint = %rule.version_constraint,
                "apply a version override"
            );
            return Ok(apply(metadata, rule));
        }
    }
    Ok(metadata.clone())
}

fn apply(metadata: &PackageMetadata, rule: &VersionOverride) -> PackageMetadata {
    let mut patched = metadata.clone();
    if let Some(asset) = &rule.asset {
        patched.asset = Some(asset.clone());
    }
    if let Some(url) = &rule.url {
        patched.url = Some(url.clone());
    }
    if let Some(format) = &rule.format {
        patched.format = Some(format.clone());
    }
    if let Some(files) = &rule.files {
        patched.files = files.clone();
    }
    if let Some(replacements) = &rule.replacements {
        patched.replacements = replacements.clone();
    }
    if let Some(envs) = &rule.supported_envs {
        patched.supported_envs = Some(envs.clone());
    }
    if let Some(checksum) = &rule.checksum {
        patched.checksum = Some(checksum.clone());
    }
    if let Some(rosetta2) = rule.rosetta2 {
        patched.rosetta2 = rosetta2;
    }
    if let Some(emulation) = rule.windows_arm_emulation {
        patched.windows_arm_emulation = emulation;
    }
    patched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn metadata() -> PackageMetadata {
        PackageMetadata {
            name: "tool".to_string(),
            repo: Some("acme/tool".to_string()),
            asset: Some("tool_{os}_{arch}.tar.gz".to_string()),
            version_constraint: Some(r#"semver(">=2.0.0")"#.to_string()),
            version_overrides: vec![
                VersionOverride {
                    version_constraint: r#"semver(">=1.0.0")"#.to_string(),
                    asset: Some("tool-{os}-{arch}.zip".to_string()),
                    ..Default::default()
                },
                VersionOverride {
                    version_constraint: "true".to_string(),
                    supported_envs: Some(vec!["linux".to_string()]),
                    asset: Some("tool-legacy".to_string()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    fn linux() -> PlatformInfo {
        PlatformInfo::new("linux", "amd64")
    }

    #[test]
    fn test_matching_top_level_constraint_keeps_metadata() {
        let original = metadata();
        let resolved = override_metadata(&original, "v2.3.0", &linux()).unwrap();
        assert_eq!(resolved, original);
    }

    #[test]
    fn test_first_matching_override_wins() {
        let original = metadata();
        let resolved = override_metadata(&original, "v1.4.0", &linux()).unwrap();
        assert_eq!(resolved.asset.as_deref(), Some("tool-{os}-{arch}.zip"));
        assert_eq!(resolved.supported_envs, None);
        // the input is untouched
        assert_eq!(original, metadata());
    }

    #[test]
    fn test_fallback_override() {
        let resolved = override_metadata(&metadata(), "v0.9.0", &linux()).unwrap();
        assert_eq!(resolved.asset.as_deref(), Some("tool-legacy"));
        assert_eq!(resolved.supported_envs, Some(vec!["linux".to_string()]));
    }

    #[test]
    fn test_no_constraint_returns_copy() {
        let mut original = metadata();
        original.version_constraint = None;
        let resolved = override_metadata(&original, "v0.1.0", &linux()).unwrap();
        assert_eq!(resolved, original);
    }

    #[test]
    fn test_malformed_rule_is_an_error() {
        let mut original = metadata();
        original.version_overrides[0].version_constraint = "semver(".to_string();
        let err = override_metadata(&original, "v1.0.0", &linux()).unwrap_err();
        assert!(matches!(err, Error::ConstraintEval { .. }));
    }
}
