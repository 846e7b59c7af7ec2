//! Build configuration
//!
//! Every option is optional; accessors resolve the documented defaults.
//! The record is loaded from a TOML file with kebab-case keys and may be
//! overlaid with command-line overrides before the build starts. After that
//! it is read-only.
//!
//! ```toml
//! main-class = "com.example.Application"
//! tool-version = "21.0.0"
//! java-version = "11"
//! download = "default"
//! mode = "functional"
//! enable-https = true
//! initialize-at-build-time = ["org.slf4j"]
//! ```

use crate::error::BuildError;
use crate::Result;
use graal_toolchain::{DownloadPolicy, Platform, ProvisionerConfig, VersionNumber, DEFAULT_DOWNLOAD_URL};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Toolchain version used when none is configured
pub const DEFAULT_TOOL_VERSION: &str = "20.2.0";

/// Java ABI level used when none is configured
pub const DEFAULT_JAVA_VERSION: &str = "8";

/// Configuration file picked up from the working directory when present
pub const DEFAULT_CONFIG_FILE: &str = "native-build.toml";

/// Environment variable overriding the toolchain cache location
pub const CACHE_DIR_ENV: &str = "NATIVE_BUILD_CACHE";

/// How the Spring native feature contributes configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NativeMode {
    /// Substitutions and initialization only; the tracing agent supplies the rest
    Agent,
    /// Provide everything
    #[default]
    #[serde(alias = "reflection")]
    Feature,
    /// Functional bean registration
    Functional,
}

impl NativeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NativeMode::Agent => "agent",
            NativeMode::Feature => "feature",
            NativeMode::Functional => "functional",
        }
    }
}

impl fmt::Display for NativeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NativeMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "agent" => Ok(NativeMode::Agent),
            "feature" | "reflection" => Ok(NativeMode::Feature),
            "functional" => Ok(NativeMode::Functional),
            other => Err(format!(
                "unknown mode '{other}' (expected agent, feature or functional)"
            )),
        }
    }
}

/// User-supplied build options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct BuildConfiguration {
    /// Fully qualified entry-point class. Required.
    pub main_class: Option<String>,
    pub tool_version: Option<String>,
    pub java_version: Option<String>,
    pub download: Option<DownloadPolicy>,
    pub mode: Option<NativeMode>,
    /// Compiler heap limit, e.g. `6G`
    pub max_heap_size: Option<String>,

    /// Legacy boolean class-initialization tracing (toolchains before 20.3)
    pub trace_class_initialization: Option<bool>,
    /// Classes to trace initialization for (toolchains 20.3 and later)
    pub trace_class_initialization_for: Vec<String>,

    pub remove_saturated_type_flows: Option<bool>,
    pub report_exception_stack_traces: Option<bool>,
    pub print_analysis_call_tree: Option<bool>,
    pub disable_toolchain_checking: Option<bool>,
    pub enable_all_security_services: Option<bool>,
    pub enable_http: Option<bool>,
    pub enable_https: Option<bool>,
    pub statically_linked: Option<bool>,
    pub verbose: Option<bool>,

    pub warn_missing_selector_hints: Option<bool>,
    pub remove_unused_autoconfig: Option<bool>,
    pub enable_url_protocols: Vec<String>,
    pub remove_yaml_support: Option<bool>,
    pub remove_xml_support: Option<bool>,
    pub remove_spel_support: Option<bool>,
    pub remove_jmx_support: Option<bool>,
    pub verify: Option<bool>,
    pub spring_native_verbose: Option<bool>,
    /// File the native feature dumps its computed configuration to
    pub dump_config: Option<String>,
    pub initialize_at_build_time: Vec<String>,

    /// Download URL template, see [`graal_toolchain::ToolchainDescriptor::download_url`]
    pub download_url: Option<String>,
    /// Toolchain cache root
    pub cache_dir: Option<PathBuf>,
    /// Expected SHA-256 of the toolchain archive
    pub toolchain_sha256: Option<String>,
}

/// Values supplied on the command line, applied over a loaded configuration
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub main_class: Option<String>,
    pub tool_version: Option<String>,
    pub java_version: Option<String>,
    pub download: Option<DownloadPolicy>,
    pub mode: Option<NativeMode>,
    pub max_heap_size: Option<String>,
    pub cache_dir: Option<PathBuf>,
}

impl BuildConfiguration {
    pub fn from_toml_str(source: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(source)
    }

    /// Load and parse a TOML configuration file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| BuildError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Self::from_toml_str(&source).map_err(|e| BuildError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load `explicit` if given, else [`DEFAULT_CONFIG_FILE`] from `dir` if it
    /// exists, else an empty configuration
    pub fn discover(explicit: Option<&Path>, dir: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_toml_file(path);
        }

        let candidate = dir.join(DEFAULT_CONFIG_FILE);
        if candidate.is_file() {
            debug!("Loading configuration from {:?}", candidate);
            Self::from_toml_file(&candidate)
        } else {
            Ok(Self::default())
        }
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if overrides.main_class.is_some() {
            self.main_class = overrides.main_class;
        }
        if overrides.tool_version.is_some() {
            self.tool_version = overrides.tool_version;
        }
        if overrides.java_version.is_some() {
            self.java_version = overrides.java_version;
        }
        if overrides.download.is_some() {
            self.download = overrides.download;
        }
        if overrides.mode.is_some() {
            self.mode = overrides.mode;
        }
        if overrides.max_heap_size.is_some() {
            self.max_heap_size = overrides.max_heap_size;
        }
        if overrides.cache_dir.is_some() {
            self.cache_dir = overrides.cache_dir;
        }
    }

    /// The entry-point class, or a configuration error when unset
    ///
    /// # TDD: test_missing_main_class_is_rejected
    pub fn require_main_class(&self) -> Result<&str> {
        match self.main_class.as_deref().map(str::trim) {
            Some(class) if !class.is_empty() => Ok(class),
            _ => Err(BuildError::Configuration(
                "main-class is not set".to_string(),
            )),
        }
    }

    pub fn tool_version(&self) -> VersionNumber {
        VersionNumber::new(self.tool_version.as_deref().unwrap_or(DEFAULT_TOOL_VERSION))
    }

    pub fn java_version(&self) -> &str {
        self.java_version.as_deref().unwrap_or(DEFAULT_JAVA_VERSION)
    }

    pub fn download_policy(&self) -> DownloadPolicy {
        self.download.unwrap_or_default()
    }

    pub fn mode(&self) -> NativeMode {
        self.mode.unwrap_or_default()
    }

    pub fn url_template(&self) -> &str {
        self.download_url.as_deref().unwrap_or(DEFAULT_DOWNLOAD_URL)
    }

    /// Configured cache root, else [`default_cache_root`]
    pub fn cache_root(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(default_cache_root)
    }

    /// Provisioner settings for the given platform
    pub fn provisioner_config(&self, platform: Platform) -> ProvisionerConfig {
        let config = ProvisionerConfig::new(self.cache_root())
            .with_url_template(self.url_template())
            .with_platform(platform);

        match &self.toolchain_sha256 {
            Some(digest) => config.with_sha256(digest),
            None => config,
        }
    }
}

/// Shared toolchain cache: `$NATIVE_BUILD_CACHE`, else
/// `$HOME/.cache/native-build`, else the system temp dir
pub fn default_cache_root() -> PathBuf {
    cache_root_from(std::env::var_os(CACHE_DIR_ENV), std::env::var_os("HOME"))
}

fn cache_root_from(cache_env: Option<OsString>, home: Option<OsString>) -> PathBuf {
    let base = match (cache_env, home) {
        (Some(dir), _) if !dir.is_empty() => PathBuf::from(dir),
        (_, Some(home)) if !home.is_empty() => PathBuf::from(home).join(".cache").join("native-build"),
        _ => std::env::temp_dir().join("native-build"),
    };
    base.join("toolchains")
}
