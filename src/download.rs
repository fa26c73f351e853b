use std::io::Read;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use tracing::{debug, warn};
use crate::context::InstallContext;
use crate::error::{Error, Result};
use crate::package::{PackageDescriptor, PackageMetadata};
use crate::platform::PlatformInfo;

const USER_AGENT: &str = concat!("toolpin/", env!("CARGO_PKG_VERSION"));

/// Opens a byte stream for a package artifact.
pub trait ArtifactSource: Send + Sync {
    fn open(&self, ctx: &InstallContext, url: &str) -> Result<Box<dyn Read + Send>>;
}

/// Fetches the checksum file published with a release.
pub trait ChecksumSource: Send + Sync {
    /// Returns `None` when the package publishes no checksum file for this release.
    fn fetch_checksum_file(
        &self,
        ctx: &InstallContext,
        package: &PackageDescriptor,
        platform: &PlatformInfo,
    ) -> Result<Option<String>>;
}

/// Looks up the latest released version of a package.
pub trait VersionSource: Send + Sync {
    fn latest_version(&self, package: &PackageMetadata) -> Option<String>;
}

/// HTTP implementation of the download traits on top of `reqwest`'s blocking client.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    github_token: Option<String>,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Download {
                url: String::new(),
                reason: e.to_string(),
            })?;
        let github_token = std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty());
        Ok(Self { client, github_token })
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let request = self.client.get(url);
        match &self.github_token {
            Some(token) if is_github(url) => request.bearer_auth(token),
            _ => request,
        }
    }

    /// Fetches `url` as text. A 404 is reported as `None`.
    pub fn get_text(&self, url: &str) -> Result<Option<String>> {
        let response = self.get(url).send().map_err(|e| download_error(url, e))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response.error_for_status().map_err(|e| download_error(url, e))?;
        response.text().map(Some).map_err(|e| download_error(url, e))
    }
}

impl ArtifactSource for HttpClient {
    fn open(&self, ctx: &InstallContext, url: &str) -> Result<Box<dyn Read + Send>> {
        ctx.check()?;
        debug!(url = %url, "downloading a file");
        let response = self
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| download_error(url, e))?;
        Ok(Box::new(response))
    }
}

impl ChecksumSource for HttpClient {
    fn fetch_checksum_file(
        &self,
        ctx: &InstallContext,
        package: &PackageDescriptor,
        platform: &PlatformInfo,
    ) -> Result<Option<String>> {
        let Some(url) = package.metadata.checksum_url(&package.version, platform)? else {
            return Ok(None);
        };
        ctx.check()?;
        let body = self.get_text(&url)?;
        if body.is_none() {
            warn!(url = %url, package_name = %package.name, "the checksum file isn't found");
        }
        Ok(body)
    }
}

#[derive(Deserialize)]
struct GitHubRelease {
    tag_name: String,
}

impl VersionSource for HttpClient {
    fn latest_version(&self, package: &PackageMetadata) -> Option<String> {
        let repo = package.repo.as_deref()?;
        let url = format!("https://api.github.com/repos/{repo}/releases/latest");
        let result = self
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json::<GitHubRelease>());
        match result {
            Ok(release) => Some(release.tag_name),
            Err(e) => {
                warn!(repo = %repo, error = %e, "get the latest release");
                None
            }
        }
    }
}

fn is_github(url: &str) -> bool {
    url.starts_with("https://github.com/") || url.starts_with("https://api.github.com/")
}

fn download_error(url: &str, e: reqwest::Error) -> Error {
    Error::Download {
        url: url.to_string(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_only_sent_to_github() {
        assert!(is_github("https://github.com/acme/tool/releases/download/v1/tool.tar.gz"));
        assert!(is_github("https://api.github.com/repos/acme/tool/releases/latest"));
        assert!(!is_github("https://example.com/tool.tar.gz"));
    }
}
