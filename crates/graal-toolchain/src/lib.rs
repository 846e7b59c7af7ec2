//! Graal-Toolchain: GraalVM provisioning for Native Build
//!
//! This crate provides the toolchain layer for Native Build.
//! It downloads and caches GraalVM distributions, unpacks archives without
//! letting entries escape their destination, and knows which command-line
//! syntax a given GraalVM version speaks.
//!
//! ## Layer 1 - Toolchain
//!
//! Focus: Idempotent caching and path-traversal safety.

pub mod archive;
pub mod error;
pub mod platform;
pub mod provision;
pub mod version;

pub use archive::{extract, ArchiveEntry, ArchiveFormat, EntryKind, EntrySource, ExtractSummary};
pub use error::ToolchainError;
pub use platform::{Arch, OsFamily, Platform};
pub use provision::{
    archive_file_name, sha256_file, ArtifactFetcher, DownloadPolicy, HttpFetcher,
    ProvisionerConfig, ToolchainDescriptor, ToolchainLocation, ToolchainProvisioner,
    DEFAULT_DOWNLOAD_URL,
};
pub use version::{compare_versions, VersionNumber};

/// Result type for toolchain operations
pub type Result<T> = std::result::Result<T, ToolchainError>;

/// Check if `native-image` is reachable through `PATH`
pub fn is_native_image_available(platform: &Platform) -> bool {
    std::process::Command::new(platform.launcher_name("native-image"))
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
