//! Native-Build-Core: building GraalVM native images from boot jars
//!
//! This crate provides the build layer for Native Build.
//! It turns a [`BuildConfiguration`] and an application bundle into a
//! `native-image` invocation: the toolchain is provisioned through
//! `graal-toolchain`, the bundle is exploded into a staging directory, and
//! the compiler runs there with its output passed straight through.
//!
//! ## Layer 2 - Build
//!
//! Focus: Deterministic command lines and fail-fast validation.

pub mod command;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod staging;
pub mod telemetry;

pub use command::{BuildCommandBuilder, ClassInitTraceSyntax, CommandLine, CLASS_LIST_TRACE_VERSION};
pub use config::{
    default_cache_root, BuildConfiguration, ConfigOverrides, NativeMode, DEFAULT_CONFIG_FILE,
    DEFAULT_JAVA_VERSION, DEFAULT_TOOL_VERSION,
};
pub use error::BuildError;
pub use orchestrator::{BuildOrchestrator, BuildPhase, BuildRequest, PreparedBuild};
pub use staging::{compute_classpath, delete_output_dir, stage_bundle, StagedBundle};
pub use telemetry::init_tracing;

/// Result type for build operations
pub type Result<T> = std::result::Result<T, BuildError>;
