//! Build orchestration
//!
//! Phases run strictly in order:
//! `Validate -> Provision -> Stage -> ComputeClasspath -> BuildCommand -> Execute`.
//! The first failure ends the build. Nothing is kept in memory between
//! builds; the only state that outlives a build is the toolchain cache and
//! the staged output directory.

use crate::command::{BuildCommandBuilder, CommandLine};
use crate::config::BuildConfiguration;
use crate::error::BuildError;
use crate::staging::{delete_output_dir, stage_bundle, OUTPUT_DIR};
use crate::telemetry::{build_span, emit_build_finished, emit_command, emit_phase};
use crate::Result;
use graal_toolchain::{
    ArtifactFetcher, HttpFetcher, Platform, ToolchainLocation, ToolchainProvisioner,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tracing::{info, Instrument};

/// Stages of one build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildPhase {
    Validate,
    Provision,
    Stage,
    ComputeClasspath,
    BuildCommand,
    Execute,
}

impl BuildPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildPhase::Validate => "validate",
            BuildPhase::Provision => "provision",
            BuildPhase::Stage => "stage",
            BuildPhase::ComputeClasspath => "compute_classpath",
            BuildPhase::BuildCommand => "build_command",
            BuildPhase::Execute => "execute",
        }
    }
}

/// What to build and where
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Project name, used as the executable name
    pub project_name: String,
    /// Boot jar to compile
    pub bundle: PathBuf,
    /// Build output root; staging happens in its `native` subdirectory
    pub build_dir: PathBuf,
}

impl BuildRequest {
    pub fn new(
        project_name: impl Into<String>,
        bundle: impl Into<PathBuf>,
        build_dir: impl Into<PathBuf>,
    ) -> Self {
        BuildRequest {
            project_name: project_name.into(),
            bundle: bundle.into(),
            build_dir: build_dir.into(),
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.build_dir.join(OUTPUT_DIR)
    }
}

/// A command ready to run
#[derive(Debug, Clone)]
pub struct PreparedBuild {
    pub command: CommandLine,
    pub working_dir: PathBuf,
    pub toolchain: ToolchainLocation,
}

struct PhaseClock(Instant);

impl PhaseClock {
    fn start() -> Self {
        PhaseClock(Instant::now())
    }

    fn enter(&self, phase: BuildPhase) {
        emit_phase(phase, self.elapsed_ms());
    }

    fn elapsed_ms(&self) -> u64 {
        self.0.elapsed().as_millis() as u64
    }
}

/// Sequences provisioning, staging and compilation
pub struct BuildOrchestrator<F: ArtifactFetcher = HttpFetcher> {
    config: BuildConfiguration,
    provisioner: ToolchainProvisioner<F>,
}

impl BuildOrchestrator<HttpFetcher> {
    /// Orchestrator for the current platform, downloading over HTTP
    pub fn new(config: BuildConfiguration) -> Result<Self> {
        let mut provisioner_config = config.provisioner_config(Platform::current());
        // The compiler runs from the staging directory, so its path must not be relative.
        provisioner_config.cache_root = absolute(&provisioner_config.cache_root)?;

        let provisioner = ToolchainProvisioner::new(provisioner_config)?;
        Ok(Self::with_provisioner(config, provisioner))
    }
}

impl<F: ArtifactFetcher> BuildOrchestrator<F> {
    pub fn with_provisioner(config: BuildConfiguration, provisioner: ToolchainProvisioner<F>) -> Self {
        BuildOrchestrator {
            config,
            provisioner,
        }
    }

    pub fn config(&self) -> &BuildConfiguration {
        &self.config
    }

    pub fn platform(&self) -> Platform {
        self.provisioner.config().platform
    }

    /// Run every phase up to, but not including, `Execute`
    ///
    /// Fails before any filesystem or network access when the entry-point
    /// class is missing.
    ///
    /// # TDD: test_prepare_without_main_class_touches_nothing
    pub async fn prepare(&self, request: &BuildRequest) -> Result<PreparedBuild> {
        self.prepare_timed(request, &PhaseClock::start()).await
    }

    async fn prepare_timed(&self, request: &BuildRequest, clock: &PhaseClock) -> Result<PreparedBuild> {
        clock.enter(BuildPhase::Validate);
        self.config.require_main_class()?;

        clock.enter(BuildPhase::Provision);
        let version = self.config.tool_version();
        let toolchain = self
            .provisioner
            .provision(&version, self.config.java_version(), self.config.download_policy())
            .await?;

        clock.enter(BuildPhase::Stage);
        let output_dir = absolute(&request.output_dir())?;
        delete_output_dir(&output_dir)?;
        let staged = stage_bundle(&request.bundle, &output_dir)?;

        clock.enter(BuildPhase::ComputeClasspath);
        let platform = self.platform();
        let class_path = staged.classpath(platform.path_separator())?;

        clock.enter(BuildPhase::BuildCommand);
        let command = BuildCommandBuilder::new(&self.config, &version, &toolchain, &platform)
            .build(&request.project_name, &class_path)?;
        emit_command(&command);

        Ok(PreparedBuild {
            command,
            working_dir: staged.root,
            toolchain,
        })
    }

    /// Run the compiler with inherited stdio in the staging directory
    ///
    /// # TDD: test_execute_propagates_exit_code
    pub async fn execute(&self, prepared: &PreparedBuild) -> Result<()> {
        self.execute_timed(prepared, &PhaseClock::start()).await
    }

    async fn execute_timed(&self, prepared: &PreparedBuild, clock: &PhaseClock) -> Result<()> {
        clock.enter(BuildPhase::Execute);
        info!("Running {}", prepared.command.program());

        let status = tokio::process::Command::new(prepared.command.program())
            .args(prepared.command.args())
            .current_dir(&prepared.working_dir)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|source| BuildError::ProcessLaunch {
                program: prepared.command.program().to_string(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(BuildError::ExternalProcess {
                code: status.code(),
            })
        }
    }

    /// Prepare and execute a build
    pub async fn run(&self, request: &BuildRequest) -> Result<PreparedBuild> {
        let clock = PhaseClock::start();

        let result = async {
            let prepared = self.prepare_timed(request, &clock).await?;
            self.execute_timed(&prepared, &clock).await?;
            Ok::<_, BuildError>(prepared)
        }
        .instrument(build_span(&request.project_name))
        .await;

        let exit_code = result.as_ref().err().map(BuildError::exit_code).unwrap_or(0);
        emit_build_finished(clock.elapsed_ms(), result.is_ok(), exit_code);

        result
    }
}

/// Resolve `path` against the current directory without touching the filesystem
fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .map_err(|source| BuildError::Staging {
                path: path.to_path_buf(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graal_toolchain::ProvisionerConfig;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[test]
    fn test_output_dir_is_native_subdir() {
        let request = BuildRequest::new("demo", "/tmp/demo.jar", "/work/build");
        assert_eq!(request.output_dir(), PathBuf::from("/work/build/native"));
    }

    /// Collects formatted log output
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_execute_phase_reports_build_clock() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let dir = tempfile::tempdir().unwrap();
        let provisioner = ToolchainProvisioner::new(ProvisionerConfig::new(dir.path())).unwrap();
        let orchestrator = BuildOrchestrator::with_provisioner(BuildConfiguration::default(), provisioner);
        let prepared = PreparedBuild {
            command: CommandLine::from(vec!["native-image-does-not-exist".to_string()]),
            working_dir: dir.path().to_path_buf(),
            toolchain: ToolchainLocation::SystemPath,
        };
        let started = Instant::now().checked_sub(Duration::from_secs(5)).unwrap();

        let _ = orchestrator
            .execute_timed(&prepared, &PhaseClock(started))
            .await;

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let event = output
            .lines()
            .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap())
            .find(|line| line["fields"]["phase"] == "execute")
            .unwrap();
        assert!(event["fields"]["elapsed_ms"].as_u64().unwrap() >= 5000);
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(BuildPhase::ComputeClasspath.as_str(), "compute_classpath");
        assert_eq!(
            serde_json::to_string(&BuildPhase::BuildCommand).unwrap(),
            "\"build_command\""
        );
    }
}
