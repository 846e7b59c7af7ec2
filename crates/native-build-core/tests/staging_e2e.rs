//! Staging and orchestration against real archives on disk.

use async_trait::async_trait;
use graal_toolchain::{
    Arch, ArtifactFetcher, DownloadPolicy, OsFamily, Platform, ToolchainError, ToolchainLocation,
    ToolchainProvisioner,
};
use native_build_core::{
    stage_bundle, BuildConfiguration, BuildError, BuildOrchestrator, BuildRequest, CommandLine,
    PreparedBuild,
};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use zip::write::SimpleFileOptions;

const MAIN_CLASS: &str = "com.example.Application";
const MANIFEST: &str = "Manifest-Version: 1.0\nStart-Class: com.example.Application\n";

fn linux() -> Platform {
    Platform::new(OsFamily::Linux, Arch::Amd64)
}

/// Boot jar with classes, two libraries and a manifest. No directory entries,
/// like jars written by most packaging tools.
fn write_boot_jar(path: &Path) {
    write_jar(
        path,
        &[
            ("META-INF/MANIFEST.MF", MANIFEST),
            ("BOOT-INF/classes/com/example/Application.class", "class"),
            ("BOOT-INF/classes/application.properties", "server.port=8080\n"),
            ("BOOT-INF/lib/a.jar", "a"),
            ("BOOT-INF/lib/b.jar", "b"),
        ],
    );
}

fn write_jar(path: &Path, entries: &[(&str, &str)]) {
    let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, data) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(data.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

/// Fails the test if anything tries to download
struct NeverFetch;

#[async_trait]
impl ArtifactFetcher for NeverFetch {
    async fn fetch(&self, url: &str, _destination: &Path) -> graal_toolchain::Result<u64> {
        panic!("unexpected fetch of {url}");
    }
}

fn orchestrator<F: ArtifactFetcher>(
    config: BuildConfiguration,
    cache: &Path,
    fetcher: F,
) -> BuildOrchestrator<F> {
    let mut provisioner_config = config.provisioner_config(linux());
    provisioner_config.cache_root = cache.to_path_buf();
    let provisioner = ToolchainProvisioner::with_fetcher(provisioner_config, fetcher);
    BuildOrchestrator::with_provisioner(config, provisioner)
}

fn skip_config() -> BuildConfiguration {
    BuildConfiguration {
        main_class: Some(MAIN_CLASS.into()),
        download: Some(DownloadPolicy::Skip),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Staging
// ---------------------------------------------------------------------------

#[test]
fn test_stage_bundle_layout() {
    let dir = tempfile::tempdir().unwrap();
    let jar = dir.path().join("demo.jar");
    write_boot_jar(&jar);

    let staged = stage_bundle(&jar, &dir.path().join("native")).unwrap();

    assert!(staged.classes_dir.join("com/example/Application.class").is_file());
    assert!(staged.lib_dir.join("a.jar").is_file());
    assert!(staged.root.join("META-INF/MANIFEST.MF").is_file());
    assert_eq!(
        fs::read_to_string(staged.classes_dir.join("META-INF/MANIFEST.MF")).unwrap(),
        MANIFEST
    );
}

#[test]
fn test_bundle_without_manifest_fails_staging() {
    let dir = tempfile::tempdir().unwrap();
    let jar = dir.path().join("plain.jar");
    write_jar(&jar, &[("BOOT-INF/classes/App.class", "class")]);

    let err = stage_bundle(&jar, &dir.path().join("native")).unwrap_err();
    assert!(matches!(err, BuildError::Staging { .. }));
}

#[test]
fn test_bundle_traversal_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let jar = dir.path().join("evil.jar");
    write_jar(&jar, &[("../evil.txt", "pwned"), ("META-INF/MANIFEST.MF", MANIFEST)]);

    let err = stage_bundle(&jar, &dir.path().join("native")).unwrap_err();

    assert!(matches!(
        err,
        BuildError::Toolchain(ToolchainError::PathTraversal { .. })
    ));
    assert!(!dir.path().join("evil.txt").exists());
}

// ---------------------------------------------------------------------------
// Prepare
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_prepare_without_main_class_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("cache");
    let build_dir = dir.path().join("build");

    let orchestrator = orchestrator(BuildConfiguration::default(), &cache, NeverFetch);
    let request = BuildRequest::new("demo", dir.path().join("missing.jar"), &build_dir);

    let err = orchestrator.prepare(&request).await.unwrap_err();

    assert!(matches!(err, BuildError::Configuration(_)));
    assert_eq!(err.exit_code(), 2);
    assert!(!cache.exists());
    assert!(!build_dir.exists());
}

#[tokio::test]
async fn test_prepare_with_skip_policy() {
    let dir = tempfile::tempdir().unwrap();
    let jar = dir.path().join("demo.jar");
    write_boot_jar(&jar);

    let build_dir = dir.path().join("build");
    let stale = build_dir.join("native").join("stale.txt");
    fs::create_dir_all(stale.parent().unwrap()).unwrap();
    fs::write(&stale, "left over").unwrap();

    let orchestrator = orchestrator(skip_config(), &dir.path().join("cache"), NeverFetch);
    let prepared = orchestrator
        .prepare(&BuildRequest::new("demo", &jar, &build_dir))
        .await
        .unwrap();

    assert_eq!(prepared.toolchain, ToolchainLocation::SystemPath);
    assert_eq!(prepared.command.program(), "native-image");
    assert_eq!(
        prepared.command.tokens().last().map(String::as_str),
        Some(MAIN_CLASS)
    );
    assert!(!stale.exists());
    assert!(prepared.working_dir.join("BOOT-INF/lib/b.jar").is_file());

    let cp = prepared.command.position("-cp").unwrap();
    let class_path = &prepared.command.tokens()[cp + 1];
    let entries: Vec<&str> = class_path.split(':').collect();
    let classes = prepared.working_dir.join("BOOT-INF/classes");
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0], classes.to_string_lossy());
    assert!(entries[1..].iter().all(|e| e.ends_with(".jar")));
}

// ---------------------------------------------------------------------------
// Execute
// ---------------------------------------------------------------------------

fn prepared(tokens: &[&str], working_dir: &Path) -> PreparedBuild {
    PreparedBuild {
        command: CommandLine::from(tokens.iter().map(|t| t.to_string()).collect::<Vec<_>>()),
        working_dir: working_dir.to_path_buf(),
        toolchain: ToolchainLocation::SystemPath,
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_execute_propagates_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = orchestrator(skip_config(), &dir.path().join("cache"), NeverFetch);

    let err = orchestrator
        .execute(&prepared(&["sh", "-c", "exit 3"], dir.path()))
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::ExternalProcess { code: Some(3) }));
    assert_eq!(err.exit_code(), 3);
}

#[cfg(unix)]
#[tokio::test]
async fn test_execute_runs_in_working_dir() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = orchestrator(skip_config(), &dir.path().join("cache"), NeverFetch);

    orchestrator
        .execute(&prepared(&["sh", "-c", "touch marker"], dir.path()))
        .await
        .unwrap();

    assert!(dir.path().join("marker").is_file());
}

#[tokio::test]
async fn test_missing_compiler_is_launch_error() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = orchestrator(skip_config(), &dir.path().join("cache"), NeverFetch);

    let err = orchestrator
        .execute(&prepared(&["native-image-does-not-exist"], dir.path()))
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::ProcessLaunch { .. }));
    assert_eq!(err.exit_code(), 1);
}

// ---------------------------------------------------------------------------
// Full pipeline
// ---------------------------------------------------------------------------

/// Serves a fake toolchain whose `native-image` records its arguments
#[cfg(unix)]
struct FakeToolchain {
    archive: PathBuf,
    calls: Arc<AtomicUsize>,
}

#[cfg(unix)]
#[async_trait]
impl ArtifactFetcher for FakeToolchain {
    async fn fetch(&self, _url: &str, destination: &Path) -> graal_toolchain::Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(tokio::fs::copy(&self.archive, destination).await?)
    }
}

#[cfg(unix)]
fn write_fake_toolchain(path: &Path) {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (name, body) in [
        ("graalvm-ce-java11-21.0.0/bin/gu", "#!/bin/sh\nexit 0\n"),
        (
            "graalvm-ce-java11-21.0.0/bin/native-image",
            "#!/bin/sh\nprintf '%s\\n' \"$@\" > args.txt\n",
        ),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, name, body.as_bytes()).unwrap();
    }

    builder.into_inner().unwrap().finish().unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_run_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let toolchain_archive = dir.path().join("graalvm.tar.gz");
    write_fake_toolchain(&toolchain_archive);
    let jar = dir.path().join("demo.jar");
    write_boot_jar(&jar);

    let config = BuildConfiguration {
        main_class: Some(MAIN_CLASS.into()),
        tool_version: Some("21.0.0".into()),
        java_version: Some("11".into()),
        trace_class_initialization_for: vec!["com.example.Config".into()],
        enable_https: Some(true),
        ..Default::default()
    };
    let calls = Arc::new(AtomicUsize::new(0));
    let fetcher = FakeToolchain {
        archive: toolchain_archive,
        calls: calls.clone(),
    };
    let cache = dir.path().join("cache");
    let orchestrator = orchestrator(config, &cache, fetcher);
    let request = BuildRequest::new("demo", &jar, dir.path().join("build"));

    let first = orchestrator.run(&request).await.unwrap();
    let second = orchestrator.run(&request).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.command, second.command);
    assert_eq!(
        first.command.program(),
        cache
            .join("graalvm-ce-java11-21.0.0/bin/native-image")
            .to_string_lossy()
    );

    let args = fs::read_to_string(second.working_dir.join("args.txt")).unwrap();
    let args: Vec<&str> = args.lines().collect();
    assert_eq!(args.first(), Some(&"--allow-incomplete-classpath"));
    assert!(args.contains(&"-H:TraceClassInitialization=com.example.Config"));
    assert!(args.contains(&"--enable-https"));
    assert!(args.contains(&"-H:Name=demo"));
    assert_eq!(args.last(), Some(&MAIN_CLASS));
}
