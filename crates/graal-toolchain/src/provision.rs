//! GraalVM toolchain provisioning
//!
//! Downloads a versioned distribution into a shared cache, unpacks it, and
//! installs the `native-image` component with the distribution's own `gu`
//! installer. The archive file name doubles as the cache key: with the
//! `default` policy an existing archive means the toolchain is ready.

use crate::archive::{self, ArchiveFormat};
use crate::error::ToolchainError;
use crate::platform::Platform;
use crate::version::VersionNumber;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Release URL of GraalVM Community Edition builds
pub const DEFAULT_DOWNLOAD_URL: &str = "https://github.com/graalvm/graalvm-ce-builds/releases/download/vm-{version}/graalvm-ce-java{java}-{platform}-{arch}-{version}.{ext}";

/// Component installed into every freshly provisioned toolchain
const NATIVE_IMAGE_COMPONENT: &str = "native-image";

/// When to fetch the toolchain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadPolicy {
    /// Re-download and re-install on every build
    Always,
    /// Download only if the archive is not cached yet
    #[default]
    Default,
    /// Never download; `native-image` must be on `PATH`
    Skip,
}

impl DownloadPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadPolicy::Always => "always",
            DownloadPolicy::Default => "default",
            DownloadPolicy::Skip => "skip",
        }
    }
}

impl fmt::Display for DownloadPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DownloadPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "always" => Ok(DownloadPolicy::Always),
            "default" => Ok(DownloadPolicy::Default),
            "skip" => Ok(DownloadPolicy::Skip),
            other => Err(format!(
                "unknown download policy '{other}' (expected always, default or skip)"
            )),
        }
    }
}

/// Identity of one toolchain distribution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainDescriptor {
    pub version: VersionNumber,
    pub java_version: String,
    pub platform: Platform,
}

impl ToolchainDescriptor {
    pub fn new(version: VersionNumber, java_version: impl Into<String>, platform: Platform) -> Self {
        ToolchainDescriptor {
            version,
            java_version: java_version.into(),
            platform,
        }
    }

    /// Top-level directory the distribution unpacks into
    pub fn install_dir_name(&self) -> String {
        format!("graalvm-ce-java{}-{}", self.java_version, self.version)
    }

    /// Toolchain home under `cache_root`; macOS bundles nest it in `Contents/Home`
    pub fn home(&self, cache_root: &Path) -> PathBuf {
        let dir = cache_root.join(self.install_dir_name());
        if self.platform.is_macos() {
            dir.join("Contents").join("Home")
        } else {
            dir
        }
    }

    /// Expand a URL template
    ///
    /// Placeholders: `{version}`, `{java}`, `{platform}`, `{arch}`, `{ext}`.
    pub fn download_url(&self, template: &str) -> String {
        template
            .replace("{version}", self.version.as_str())
            .replace("{java}", &self.java_version)
            .replace("{platform}", self.platform.os.as_str())
            .replace("{arch}", self.platform.arch.as_str())
            .replace("{ext}", self.platform.archive_extension())
    }
}

/// File name of the downloaded archive: the last URL path segment
pub fn archive_file_name(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

/// Where the toolchain lives after provisioning
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolchainLocation {
    /// Provisioning was skipped; launchers are resolved through `PATH`
    SystemPath,
    /// Extracted under the cache
    Installed { home: PathBuf },
}

impl ToolchainLocation {
    pub fn home(&self) -> Option<&Path> {
        match self {
            ToolchainLocation::SystemPath => None,
            ToolchainLocation::Installed { home } => Some(home),
        }
    }

    /// Path of a launcher from the toolchain's `bin` directory
    pub fn launcher(&self, platform: &Platform, name: &str) -> PathBuf {
        let file = platform.launcher_name(name);
        match self {
            ToolchainLocation::SystemPath => PathBuf::from(file),
            ToolchainLocation::Installed { home } => home.join("bin").join(file),
        }
    }
}

/// Transport for toolchain archives
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Stream `url` into `destination`, returning the number of bytes written
    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64>;
}

/// HTTP(S) fetcher
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("graal-toolchain/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(HttpFetcher { client })
    }
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64> {
        let mut response = self.client.get(url).send().await?.error_for_status()?;

        let mut file = tokio::fs::File::create(destination).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }
}

/// Provisioner settings
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    /// Shared cache directory holding archives and extracted toolchains
    pub cache_root: PathBuf,
    /// Download URL template, see [`ToolchainDescriptor::download_url`]
    pub url_template: String,
    /// Expected SHA-256 of the archive, hex encoded
    pub expected_sha256: Option<String>,
    pub platform: Platform,
}

impl ProvisionerConfig {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        ProvisionerConfig {
            cache_root: cache_root.into(),
            url_template: DEFAULT_DOWNLOAD_URL.to_string(),
            expected_sha256: None,
            platform: Platform::current(),
        }
    }

    pub fn with_url_template(mut self, template: &str) -> Self {
        self.url_template = template.to_string();
        self
    }

    pub fn with_sha256(mut self, digest: &str) -> Self {
        self.expected_sha256 = Some(digest.to_ascii_lowercase());
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }
}

/// Ensures a toolchain is present on disk
pub struct ToolchainProvisioner<F: ArtifactFetcher = HttpFetcher> {
    config: ProvisionerConfig,
    fetcher: F,
}

impl ToolchainProvisioner<HttpFetcher> {
    /// Provisioner downloading over HTTP
    pub fn new(config: ProvisionerConfig) -> Result<Self> {
        Ok(Self::with_fetcher(config, HttpFetcher::new()?))
    }
}

impl<F: ArtifactFetcher> ToolchainProvisioner<F> {
    pub fn with_fetcher(config: ProvisionerConfig, fetcher: F) -> Self {
        ToolchainProvisioner { config, fetcher }
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    pub fn descriptor(&self, version: &VersionNumber, java_version: &str) -> ToolchainDescriptor {
        ToolchainDescriptor::new(version.clone(), java_version, self.config.platform)
    }

    /// Make the requested toolchain available
    ///
    /// # TDD: test_default_policy_fetches_once
    pub async fn provision(
        &self,
        version: &VersionNumber,
        java_version: &str,
        policy: DownloadPolicy,
    ) -> Result<ToolchainLocation> {
        let descriptor = self.descriptor(version, java_version);
        let home = descriptor.home(&self.config.cache_root);
        let url = descriptor.download_url(&self.config.url_template);

        if policy == DownloadPolicy::Skip {
            info!("Download skipped, expecting native-image on PATH");
            return Ok(ToolchainLocation::SystemPath);
        }

        let archive_name = archive_file_name(&url);
        let archive_path = self.config.cache_root.join(archive_name);

        if policy == DownloadPolicy::Default && archive_path.exists() {
            debug!("Reusing cached toolchain {:?}", home);
            return Ok(ToolchainLocation::Installed { home });
        }

        fs::create_dir_all(&self.config.cache_root).map_err(|source| {
            ToolchainError::Extraction {
                path: self.config.cache_root.clone(),
                source,
            }
        })?;

        // Each run downloads into its own file; only a fully provisioned
        // toolchain is published under the archive name. Dropping `staged`
        // on any error path removes the partial download.
        let staged = NamedTempFile::new_in(&self.config.cache_root)?;

        info!(url = %url, "Downloading GraalVM {}", descriptor.version);
        let bytes = self.fetcher.fetch(&url, staged.path()).await?;
        debug!(bytes, "Download complete");

        let download = staged.path().to_path_buf();
        let digest = blocking(move || sha256_file(&download)).await?;
        self.verify_checksum(staged.path(), digest)?;

        let download = staged.path().to_path_buf();
        let cache_root = self.config.cache_root.clone();
        let format = ArchiveFormat::for_platform(&self.config.platform);
        blocking(move || archive::extract(&download, &cache_root, format)).await?;

        self.install_component(&ToolchainLocation::Installed { home: home.clone() })
            .await?;

        blocking(move || {
            staged.persist(&archive_path).map_err(|e| e.error)?;
            Ok(())
        })
        .await?;
        info!("GraalVM {} ready at {:?}", descriptor.version, home);

        Ok(ToolchainLocation::Installed { home })
    }

    fn verify_checksum(&self, archive: &Path, actual: String) -> Result<()> {
        debug!(sha256 = %actual, "Archive digest");

        match &self.config.expected_sha256 {
            Some(expected) if *expected != actual => {
                warn!("Checksum mismatch for {:?}", archive);
                Err(ToolchainError::ChecksumMismatch {
                    expected: expected.clone(),
                    actual,
                })
            }
            _ => Ok(()),
        }
    }

    /// Run `gu install native-image` from the provisioned toolchain
    async fn install_component(&self, location: &ToolchainLocation) -> Result<()> {
        let installer = location.launcher(&self.config.platform, "gu");
        info!("Installing {} component", NATIVE_IMAGE_COMPONENT);

        let status = tokio::process::Command::new(&installer)
            .args(["install", NATIVE_IMAGE_COMPONENT])
            .status()
            .await
            .map_err(|source| ToolchainError::InstallerLaunch {
                path: installer.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(ToolchainError::Install {
                code: status.code(),
            })
        }
    }
}

/// Run filesystem-bound work on the blocking pool
async fn blocking<T, W>(work: W) -> Result<T>
where
    W: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| ToolchainError::Io(std::io::Error::other(err)))?
}

/// Hex-encoded SHA-256 of a file
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
