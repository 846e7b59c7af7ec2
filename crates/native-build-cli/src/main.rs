//! Native Build - GraalVM native images from Spring Boot jars
//!
//! The `native-build` command provisions a GraalVM toolchain and compiles an
//! executable boot jar with `native-image`.
//!
//! ## Commands
//!
//! - `build`: Stage a boot jar and run `native-image` on it
//! - `provision`: Download and install a toolchain into the cache
//! - `extract`: Safely unpack a tar.gz, zip or jar archive
//! - `platform`: Show the resolved platform tokens and download URL

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use graal_toolchain::{
    extract, is_native_image_available, ArchiveFormat, DownloadPolicy, Platform,
    ToolchainDescriptor, ToolchainProvisioner,
};
use native_build_core::{
    BuildConfiguration, BuildError, BuildOrchestrator, BuildRequest, ConfigOverrides, NativeMode,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "native-build")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build GraalVM native images from Spring Boot jars", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and machine-readable output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Configuration file and the settings that may override it
#[derive(Args)]
struct ConfigArgs {
    /// Configuration file (default: native-build.toml in the current directory, if present)
    #[arg(short, long, env = "NATIVE_BUILD_CONFIG")]
    config: Option<PathBuf>,

    /// Fully qualified entry-point class
    #[arg(long)]
    main_class: Option<String>,

    /// GraalVM version
    #[arg(long)]
    tool_version: Option<String>,

    /// Java version of the GraalVM distribution
    #[arg(long)]
    java_version: Option<String>,

    /// Download policy: always, default or skip
    #[arg(long)]
    download: Option<DownloadPolicy>,

    /// Spring native mode: agent, feature or functional
    #[arg(long)]
    mode: Option<NativeMode>,

    /// Maximum heap for the compiler, e.g. 6G
    #[arg(long)]
    max_heap: Option<String>,

    /// Toolchain cache directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

impl ConfigArgs {
    fn load(self) -> Result<BuildConfiguration> {
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        let mut config = BuildConfiguration::discover(self.config.as_deref(), &cwd)
            .context("Failed to load configuration")?;

        config.apply_overrides(ConfigOverrides {
            main_class: self.main_class,
            tool_version: self.tool_version,
            java_version: self.java_version,
            download: self.download,
            mode: self.mode,
            max_heap_size: self.max_heap,
            cache_dir: self.cache_dir,
        });

        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Stage a boot jar and compile it with native-image
    Build {
        /// Executable boot jar to compile
        #[arg(short, long)]
        bundle: PathBuf,

        /// Build output root; staging happens in its `native` subdirectory
        #[arg(long, default_value = "build")]
        build_dir: PathBuf,

        /// Name of the produced executable (default: bundle file name without extension)
        #[arg(long)]
        project_name: Option<String>,

        /// Print the native-image command instead of running it
        #[arg(long)]
        dry_run: bool,

        #[command(flatten)]
        settings: ConfigArgs,
    },

    /// Download and install a GraalVM toolchain into the cache
    Provision {
        #[command(flatten)]
        settings: ConfigArgs,
    },

    /// Unpack an archive, refusing entries that escape the destination
    Extract {
        /// Archive to unpack
        archive: PathBuf,

        /// Destination directory
        destination: PathBuf,

        /// Archive format: tar-gz, zip or jar (inferred from the file name if omitted)
        #[arg(long)]
        format: Option<ArchiveFormat>,
    },

    /// Show platform tokens and the resolved toolchain download URL
    Platform {
        #[command(flatten)]
        settings: ConfigArgs,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    native_build_core::init_tracing(cli.json, level);

    let json = cli.json;
    let result = match cli.command {
        Commands::Build {
            bundle,
            build_dir,
            project_name,
            dry_run,
            settings,
        } => cmd_build(settings, bundle, build_dir, project_name, dry_run, json).await,
        Commands::Provision { settings } => cmd_provision(settings).await,
        Commands::Extract {
            archive,
            destination,
            format,
        } => cmd_extract(&archive, &destination, format),
        Commands::Platform { settings } => cmd_platform(settings, json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(exit_status(&err))
        }
    }
}

/// Mirror the compiler's exit code; 2 for invalid configuration, 1 otherwise
fn exit_status(err: &anyhow::Error) -> u8 {
    let code = err
        .downcast_ref::<BuildError>()
        .map(BuildError::exit_code)
        .unwrap_or(1);
    u8::try_from(code).ok().filter(|c| *c != 0).unwrap_or(1)
}

async fn cmd_build(
    settings: ConfigArgs,
    bundle: PathBuf,
    build_dir: PathBuf,
    project_name: Option<String>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let config = settings.load()?;
    let project_name = project_name.unwrap_or_else(|| default_project_name(&bundle));
    let request = BuildRequest::new(project_name, bundle, build_dir);
    let orchestrator = BuildOrchestrator::new(config).context("Failed to set up build")?;

    if dry_run {
        let prepared = orchestrator
            .prepare(&request)
            .await
            .context("Failed to prepare native image build")?;

        if json {
            println!("{}", serde_json::to_string_pretty(&prepared.command)?);
        } else {
            println!("{}", prepared.command);
        }
        return Ok(());
    }

    let prepared = orchestrator
        .run(&request)
        .await
        .context("Native image build failed")?;
    info!("Native image written to {:?}", prepared.working_dir);

    Ok(())
}

fn default_project_name(bundle: &Path) -> String {
    bundle
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "application".to_string())
}

async fn cmd_provision(settings: ConfigArgs) -> Result<()> {
    let config = settings.load()?;
    let platform = Platform::current();
    let provisioner = ToolchainProvisioner::new(config.provisioner_config(platform))
        .context("Failed to set up downloader")?;

    let location = provisioner
        .provision(
            &config.tool_version(),
            config.java_version(),
            config.download_policy(),
        )
        .await
        .context("Failed to provision GraalVM")?;

    match location.home() {
        Some(home) => println!("{}", home.display()),
        None => {
            let available = is_native_image_available(&platform);
            println!("native-image expected on PATH (found: {available})");
        }
    }

    Ok(())
}

fn cmd_extract(archive: &Path, destination: &Path, format: Option<ArchiveFormat>) -> Result<()> {
    let format = match format {
        Some(format) => format,
        None => ArchiveFormat::from_path(archive)
            .with_context(|| format!("Cannot infer archive format of {:?}, use --format", archive))?,
    };

    let summary = extract(archive, destination, format)
        .with_context(|| format!("Failed to extract {:?}", archive))?;

    println!(
        "{} directories, {} files, {} links, {} skipped",
        summary.directories, summary.files, summary.links, summary.skipped
    );
    Ok(())
}

fn cmd_platform(settings: ConfigArgs, json: bool) -> Result<()> {
    let config = settings.load()?;
    let platform = Platform::current();
    let descriptor = ToolchainDescriptor::new(config.tool_version(), config.java_version(), platform);
    let url = descriptor.download_url(config.url_template());
    let home = descriptor.home(&config.cache_root());

    if json {
        let report = serde_json::json!({
            "os": platform.os.as_str(),
            "arch": platform.arch.as_str(),
            "path_separator": platform.path_separator().to_string(),
            "download_url": url,
            "toolchain_home": home,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("os:             {}", platform.os.as_str());
        println!("arch:           {}", platform.arch.as_str());
        println!("path separator: {}", platform.path_separator());
        println!("download url:   {url}");
        println!("toolchain home: {}", home.display());
    }

    Ok(())
}
