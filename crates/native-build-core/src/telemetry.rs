//! Tracing initialisation and build lifecycle events.
//!
//! Call [`init_tracing`] once at program start. Lifecycle events carry an
//! `event` field (`build.phase`, `build.command`, `build.finished`) so JSON
//! output can be filtered without parsing messages.

use crate::command::CommandLine;
use crate::orchestrator::BuildPhase;
use tracing::{debug, info, Level, Span};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global tracing subscriber.
///
/// * `json` - emit newline-delimited JSON log lines.
/// * `level` - default verbosity when `RUST_LOG` is not set.
///
/// Only the first call takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}

/// Span covering one build of `project_name`
pub fn build_span(project_name: &str) -> Span {
    tracing::info_span!("native_build", project = %project_name)
}

/// Emit event: the orchestrator entered `phase`, `elapsed_ms` after the build started.
pub fn emit_phase(phase: BuildPhase, elapsed_ms: u64) {
    info!(event = "build.phase", phase = phase.as_str(), elapsed_ms = elapsed_ms);
}

/// Emit event: the full compiler argument vector (debug level).
pub fn emit_command(command: &CommandLine) {
    debug!(event = "build.command", argc = command.tokens().len(), argv = %command);
}

/// Emit event: build finished.
pub fn emit_build_finished(duration_ms: u64, success: bool, exit_code: i32) {
    info!(
        event = "build.finished",
        duration_ms = duration_ms,
        success = success,
        exit_code = exit_code,
    );
}
