//! Error types for graal-toolchain

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while provisioning a toolchain or unpacking an archive
#[derive(Error, Debug)]
pub enum ToolchainError {
    /// An archive entry resolves outside the extraction root
    #[error("Archive entry is outside of the output directory: {entry}")]
    PathTraversal { entry: String },

    /// Filesystem failure while writing an extracted entry
    #[error("Failed to extract {path:?}: {source}")]
    Extraction {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The archive container itself could not be read
    #[error("Unreadable archive: {0}")]
    Archive(String),

    /// Toolchain download failed
    #[error("Download failed: {0}")]
    Network(String),

    /// Downloaded archive does not match the configured digest
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// The component installer could not be started
    #[error("Failed to launch installer {path:?}: {source}")]
    InstallerLaunch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The component installer exited unsuccessfully
    #[error("Failed to install GraalVM Native Image. Error code: {}", code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()))]
    Install { code: Option<i32> },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ToolchainError {
    fn from(err: reqwest::Error) -> Self {
        ToolchainError::Network(err.to_string())
    }
}

impl From<zip::result::ZipError> for ToolchainError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(io) => ToolchainError::Io(io),
            other => ToolchainError::Archive(other.to_string()),
        }
    }
}
