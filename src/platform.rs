use std::fmt;

/// Platforms a release asset can be built for. Used to map checksum file
/// entries back to the platform they belong to.
pub const KNOWN_PLATFORMS: &[(&str, &str)] = &[
    ("darwin", "amd64"),
    ("darwin", "arm64"),
    ("linux", "386"),
    ("linux", "amd64"),
    ("linux", "arm64"),
    ("windows", "386"),
    ("windows", "amd64"),
    ("windows", "arm64"),
];

/// The operating system and architecture a package is installed for,
/// in `linux|darwin|windows` / `amd64|arm64|386` naming.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlatformInfo {
    pub os: String,
    pub arch: String,
}

impl PlatformInfo {
    pub fn new(os: &str, arch: &str) -> Self {
        Self {
            os: os.to_string(),
            arch: arch.to_string(),
        }
    }

    /// Returns the host platform. `TOOLPIN_OS` and `TOOLPIN_ARCH` override detection.
    pub fn current() -> Self {
        let os = std::env::var("TOOLPIN_OS")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| normalize_os(std::env::consts::OS).to_string());
        let arch = std::env::var("TOOLPIN_ARCH")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| normalize_arch(std::env::consts::ARCH).to_string());
        Self { os, arch }
    }

    /// Returns the architecture whose assets are installed, substituting
    /// `amd64` when the package runs under Rosetta 2 or Windows ARM emulation.
    pub fn effective_arch(&self, rosetta2: bool, windows_arm_emulation: bool) -> &str {
        if self.arch == "arm64"
            && ((rosetta2 && self.os == "darwin") || (windows_arm_emulation && self.os == "windows"))
        {
            return "amd64";
        }
        &self.arch
    }

    /// Platform with the emulation substitution applied.
    pub fn effective(&self, rosetta2: bool, windows_arm_emulation: bool) -> PlatformInfo {
        PlatformInfo::new(&self.os, self.effective_arch(rosetta2, windows_arm_emulation))
    }

    /// The `os/arch` key used by precomputed checksum maps.
    pub fn key(&self, rosetta2: bool, windows_arm_emulation: bool) -> String {
        format!("{}/{}", self.os, self.effective_arch(rosetta2, windows_arm_emulation))
    }
}

impl fmt::Display for PlatformInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

fn normalize_os(os: &str) -> &str {
    match os {
        "macos" => "darwin",
        other => other,
    }
}

fn normalize_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_host_names() {
        assert_eq!(normalize_os("macos"), "darwin");
        assert_eq!(normalize_os("linux"), "linux");
        assert_eq!(normalize_arch("x86_64"), "amd64");
        assert_eq!(normalize_arch("aarch64"), "arm64");
    }

    #[test]
    fn test_rosetta_substitutes_amd64_on_darwin_arm64() {
        let platform = PlatformInfo::new("darwin", "arm64");
        assert_eq!(platform.key(true, false), "darwin/amd64");
        assert_eq!(platform.key(false, false), "darwin/arm64");
        // windows emulation doesn't apply on darwin
        assert_eq!(platform.key(false, true), "darwin/arm64");
    }

    #[test]
    fn test_windows_arm_emulation() {
        let platform = PlatformInfo::new("windows", "arm64");
        assert_eq!(platform.key(false, true), "windows/amd64");
        let linux = PlatformInfo::new("linux", "arm64");
        assert_eq!(linux.key(true, true), "linux/arm64");
    }
}
