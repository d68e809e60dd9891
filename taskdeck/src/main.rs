//! `TaskDeck`: tasks, habits and a Pomodoro timer from the terminal.
//!
//! Configuration via CLI flags, environment variables, or config file
//! (`~/.config/taskdeck/config.toml`). Documents are kept in
//! `<data dir>/store.json`; timer and theme state next to it.
//!
//! ```bash
//! cargo run --bin taskdeck -- --user alice tasks add "Write report" --priority high
//! cargo run --bin taskdeck -- --user alice board
//!
//! # Or via environment variables
//! TASKDECK_USER=alice cargo run --bin taskdeck -- habits list
//! ```

use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing_appender::non_blocking::WorkerGuard;

use taskdeck::cli::{CliError, Command, Session};
use taskdeck::config::{CliArgs, ClientConfig};
use taskdeck::remote::memory::InMemoryRemote;
use taskdeck::storage::FileStorage;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    // Load and resolve configuration (CLI args > env > config file > defaults).
    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::info!("taskdeck starting");

    let command = cli.command.unwrap_or(Command::Board);
    let result = run(command, config).await;
    tracing::info!(ok = result.is_ok(), "taskdeck exiting");

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: ClientConfig) -> Result<(), CliError> {
    let data_dir = config.data_dir()?;
    let remote = Arc::new(InMemoryRemote::open(config.store_file()?)?);
    let storage = Arc::new(FileStorage::new(&data_dir));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    let session = Session::new(remote, storage, config, shutdown_rx);
    let mut stdout = io::stdout().lock();
    session.execute(command, &mut stdout).await?;
    stdout.flush()?;
    Ok(())
}

/// Initialize file-based logging.
///
/// Logs are written to a file so they never mix with command output.
/// Returns a guard that must be held for the lifetime of the program
/// to ensure logs are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("taskdeck.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}
