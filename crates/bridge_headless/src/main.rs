//! Headless agent runner.
//!
//! Plays a match on the sandbox engine with remote agents reached over
//! GraphQL, printing observations as JSON lines.
//!
//! # Usage
//!
//! ```bash
//! # List sandbox maps
//! cargo run -p bridge_headless -- maps
//!
//! # Run a match described in run.ron
//! cargo run -p bridge_headless -- run --config run.ron
//!
//! # Shorter match with a tighter agent timeout
//! cargo run -p bridge_headless -- run --config run.ron --frames 200 --timeout-ms 500
//! ```
//!
//! Output (stdout): one observation per line
//! Logs (stderr): controlled by `RUST_LOG`, or `--verbose`

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use bridge_core::config::{OrchestratorConfig, RunConfig};
use bridge_core::status::StatusCode;
use bridge_headless::maps::builtin_maps;
use bridge_headless::{HeadlessError, HeadlessRunner, RunnerOptions, SandboxConfig};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "bridge_headless")]
#[command(about = "Headless runner driving remote agents against a sandbox engine")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one match
    Run {
        /// Run config (RON)
        #[arg(short, long)]
        config: PathBuf,

        /// Orchestrator settings (RON)
        #[arg(long)]
        orchestrator: Option<PathBuf>,

        /// Frames before the match ends
        #[arg(long, default_value = "1000")]
        frames: u64,

        /// Agent call timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Wall-clock pause between frames in milliseconds
        #[arg(long, default_value = "0")]
        frame_ms: u64,

        /// Interval between observation lines in milliseconds
        #[arg(long, default_value = "250")]
        observe_ms: u64,
    },

    /// List sandbox maps
    Maps,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr (stdout is for observations)
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let result = match cli.command {
        Commands::Run {
            config,
            orchestrator,
            frames,
            timeout_ms,
            frame_ms,
            observe_ms,
        } => cmd_run(config, orchestrator, frames, timeout_ms, frame_ms, observe_ms).await,
        Commands::Maps => cmd_maps(),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Headless runner failed");
            ExitCode::FAILURE
        }
    }
}

/// Run a single match
async fn cmd_run(
    config: PathBuf,
    orchestrator: Option<PathBuf>,
    frames: u64,
    timeout_ms: Option<u64>,
    frame_ms: u64,
    observe_ms: u64,
) -> Result<ExitCode, HeadlessError> {
    let run_config = RunConfig::load(&config)?;
    let mut orchestrator_config = match orchestrator {
        Some(path) => OrchestratorConfig::load(path)?,
        None => OrchestratorConfig::default(),
    };
    if let Some(timeout_ms) = timeout_ms {
        orchestrator_config.agent_timeout_ms = timeout_ms;
    }

    tracing::info!(
        config = %config.display(),
        environment = %run_config.environment_id,
        agents = run_config.agents.len(),
        "Starting headless run"
    );

    let sandbox = SandboxConfig {
        frame_limit: frames,
        frame_interval_ms: frame_ms,
        ..Default::default()
    };
    let options = RunnerOptions {
        observe_interval: Duration::from_millis(observe_ms),
    };
    let runner = HeadlessRunner::with_graphql(sandbox, orchestrator_config, options)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let status = runner.run(run_config, &mut out).await?;

    Ok(if status.code == StatusCode::Ended {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Print the sandbox map catalog
fn cmd_maps() -> Result<ExitCode, HeadlessError> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for map in builtin_maps() {
        serde_json::to_writer(&mut out, &map)?;
        writeln!(out)?;
    }
    Ok(ExitCode::SUCCESS)
}
