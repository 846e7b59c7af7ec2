//! Error types for native-build-core

use graal_toolchain::ToolchainError;
use std::path::PathBuf;
use thiserror::Error;

/// Exit status for failures detected before any I/O
pub const PREFLIGHT_EXIT_CODE: i32 = 2;

/// Errors that can terminate a native build
#[derive(Error, Debug)]
pub enum BuildError {
    /// Required configuration is missing or invalid
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Configuration file could not be read or parsed
    #[error("Failed to load configuration from {path:?}: {message}")]
    Config { path: PathBuf, message: String },

    /// Toolchain provisioning or archive extraction failed
    #[error(transparent)]
    Toolchain(#[from] ToolchainError),

    /// The staged build directory could not be prepared
    #[error("Failed to stage {path:?}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The compiler process could not be started
    #[error("Failed to launch {program}: {source}")]
    ProcessLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The compiler exited unsuccessfully
    #[error("native-image exited with {}", code.map(|c| format!("code {c}")).unwrap_or_else(|| "a signal".to_string()))]
    ExternalProcess { code: Option<i32> },
}

impl BuildError {
    /// Process exit status mirroring this failure
    ///
    /// The compiler's own code is passed through; pre-flight failures get a
    /// distinct status so callers can tell them apart from compile errors.
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildError::ExternalProcess { code: Some(code) } => *code,
            BuildError::Configuration(_) | BuildError::Config { .. } => PREFLIGHT_EXIT_CODE,
            _ => 1,
        }
    }
}
