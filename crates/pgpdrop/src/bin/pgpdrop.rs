//! pgpdrop CLI: run once per scheduler event (cron, inotify, a transfer hook).

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{error, info};

use pgpdrop::config::load_config;
use pgpdrop::lifecycle::Lifecycle;
use pgpdrop::telemetry::init_invocation_log;
use pgpdrop::worker::WorkerConfig;
use pgpdrop::{FileLockGuard, Invocation, PgpdropError, RunOutcome};

#[derive(Parser)]
#[command(
    name = "pgpdrop",
    version,
    about = "Decrypt files dropped into an intake directory, exactly once"
)]
struct Cli {
    /// Path to the JSON config file
    #[arg(
        short,
        long,
        env = "PGPDROP_CONFIG",
        default_value = "/etc/pgpdrop/config.json"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Enqueue new inputs and drain the queue unless another instance is (default)
    Run,
    /// Show queued items and whether a drainer is running
    Status,
    /// Put inputs back on the queue, e.g. after a failed decrypt
    Requeue {
        /// Filenames in the intake directory
        #[arg(required = true)]
        files: Vec<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let worker = match load_worker_config(&cli.config) {
        Ok(worker) => worker,
        Err(e) => {
            eprintln!("pgpdrop: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(&worker),
        Command::Status => status(&worker),
        Command::Requeue { files } => requeue(&worker, &files),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("pgpdrop: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_worker_config(path: &Path) -> Result<WorkerConfig, PgpdropError> {
    let config = load_config(path)?;
    Ok(WorkerConfig::from_config(&config)?)
}

fn run(worker: &WorkerConfig) -> Result<(), PgpdropError> {
    let log_path = init_invocation_log(&worker.log_directory)?;
    info!(
        "pgpdrop v{} starting (pid {}, log {})",
        env!("CARGO_PKG_VERSION"),
        std::process::id(),
        log_path.display()
    );

    let lifecycle: Lifecycle<FileLockGuard> = Lifecycle::new();
    lifecycle.install_signal_handlers()?;

    let invocation = Invocation::from_worker_config(worker)
        .with_lifecycle(lifecycle.shutdown_flag(), lifecycle.slot());

    match invocation.run_once()? {
        RunOutcome::EnqueueOnly { enqueued } => {
            info!("Exiting after enqueueing {} item(s)", enqueued);
        }
        RunOutcome::Drained { enqueued, report } => {
            info!(
                "Exiting: enqueued {}, completed {}, skipped {}, failed {}",
                enqueued,
                report.completed.len(),
                report.skipped.len(),
                report.failed.len()
            );
            for (item, reason) in report.failed.iter().chain(&report.unarchived) {
                info!("Needs attention: {} ({})", item, reason);
            }
        }
    }
    Ok(())
}

fn status(worker: &WorkerConfig) -> Result<(), PgpdropError> {
    let status = Invocation::from_worker_config(worker).status()?;

    println!(
        "drainer: {}",
        if status.drainer_running {
            "running"
        } else {
            "idle"
        }
    );
    println!("queued: {}", status.pending.len());
    for item in &status.pending {
        println!("  {}", item);
    }
    Ok(())
}

fn requeue(worker: &WorkerConfig, files: &[String]) -> Result<(), PgpdropError> {
    let added = Invocation::from_worker_config(worker).requeue(files)?;
    println!("requeued {} of {}", added, files.len());
    Ok(())
}
