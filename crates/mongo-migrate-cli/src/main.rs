//! mongo-migrate CLI - interactive parallel MongoDB collection migration.

mod prompts;
mod selector;
mod terminal;

use clap::Parser;
use mongo_migrate::error::EXIT_INTERRUPTED;
use mongo_migrate::orchestrator::DumpWorkspace;
use mongo_migrate::{
    MigrateError, MongoShellCatalog, MongoTools, Orchestrator, PredefinedConnections, RunOutcome,
    RunState, Settings,
};
use prompts::DialoguerPrompter;
use selector::TerminalSelector;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "mongo-migrate")]
#[command(about = "Interactive parallel MongoDB collection migration")]
#[command(version)]
struct Cli {
    /// Path to optional YAML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Worker count offered at the prompt (1-10)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Kill a dump or restore process after this many seconds
    #[arg(long)]
    item_timeout: Option<u64>,

    /// Parent directory for the temporary dump workspace
    #[arg(long)]
    temp_dir: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Seconds to wait for cleanup after an interrupt before forcing exit
    #[arg(long, default_value = "10")]
    shutdown_timeout: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            terminal::reset();
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(MigrateError::Config)?;

    let mut settings = match &cli.config {
        Some(path) => {
            let settings = Settings::load(path)?;
            info!("Loaded settings from {}", path.display());
            settings
        }
        None => Settings::default(),
    };
    if let Some(workers) = cli.workers {
        settings.default_workers = Some(workers);
    }
    if let Some(secs) = cli.item_timeout {
        settings.item_timeout_secs = Some(secs);
    }
    if let Some(dir) = cli.temp_dir {
        settings.temp_dir = Some(dir);
    }
    settings.validate()?;
    let settings = settings.with_auto_tuning();

    let predefined = PredefinedConnections::from_env();
    info!("Found {} predefined connections", predefined.len());

    let cancel = CancellationToken::new();
    terminal::install_panic_hook();

    let mut orchestrator = Orchestrator::new(
        settings.clone(),
        predefined,
        Box::new(DialoguerPrompter::new()),
        Box::new(TerminalSelector::new(cancel.clone())),
        Arc::new(MongoShellCatalog::new(&settings.tools.shell).with_cancel(cancel.clone())),
        Arc::new(MongoTools::new(&settings.tools)),
    );

    setup_signal_handler(
        cancel.clone(),
        orchestrator.subscribe(),
        orchestrator.subscribe_workspace(),
        cli.shutdown_timeout,
    )?;

    match orchestrator.run(cancel).await? {
        RunOutcome::Completed(report) => {
            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                println!("\n{}", report);
            }
        }
        RunOutcome::Cancelled => {
            if cli.output_json {
                println!("{}", serde_json::json!({ "status": "cancelled" }));
            } else {
                println!("\nMigration cancelled. Nothing was changed.");
            }
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("unknown verbosity '{}'", other)),
    };

    // Logs go to stderr so prompts and the JSON report own stdout
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("unknown log format '{}'", other)),
    }

    Ok(())
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM. The first signal cancels the
/// run; a second one, or the shutdown timeout, exits immediately. While the
/// run is waiting on a prompt there is nothing to clean up, so it exits at
/// once.
#[cfg(unix)]
fn setup_signal_handler(
    cancel: CancellationToken,
    state: watch::Receiver<RunState>,
    workspace: watch::Receiver<Option<PathBuf>>,
    shutdown_timeout: u64,
) -> Result<(), MigrateError> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        cancel.cancel();

        let interactive = state.borrow().is_interactive();
        if interactive {
            remove_abandoned_workspace(&workspace);
            terminal::reset();
            eprintln!("\nReceived {}. Nothing was changed.", name);
            std::process::exit(EXIT_INTERRUPTED.into());
        }

        eprintln!(
            "\nReceived {}. Stopping workers and cleaning up (timeout: {}s)...",
            name, shutdown_timeout
        );
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(shutdown_timeout)) => {
                eprintln!("Shutdown timed out after {}s, exiting", shutdown_timeout);
            }
            _ = sigint.recv() => eprintln!("Received second SIGINT, exiting"),
        }
        remove_abandoned_workspace(&workspace);
        terminal::reset();
        std::process::exit(EXIT_INTERRUPTED.into());
    });

    Ok(())
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler(
    cancel: CancellationToken,
    state: watch::Receiver<RunState>,
    workspace: watch::Receiver<Option<PathBuf>>,
    shutdown_timeout: u64,
) -> Result<(), MigrateError> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        cancel.cancel();
        let interactive = state.borrow().is_interactive();
        if !interactive {
            eprintln!("\nReceived Ctrl-C. Shutting down gracefully...");
            tokio::time::sleep(Duration::from_secs(shutdown_timeout)).await;
        }
        remove_abandoned_workspace(&workspace);
        terminal::reset();
        std::process::exit(EXIT_INTERRUPTED.into());
    });

    Ok(())
}

/// `process::exit` skips destructors, so the dump workspace still owned by
/// the orchestrator is removed here.
fn remove_abandoned_workspace(workspace: &watch::Receiver<Option<PathBuf>>) {
    let path = workspace.borrow().clone();
    if let Some(path) = path {
        DumpWorkspace::remove_path(&path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_forced_exit_removes_published_workspace() {
        let parent = TempDir::new().unwrap();
        let path = parent.path().join("mongo-migrate-run");
        std::fs::create_dir_all(path.join("shop")).unwrap();
        std::fs::write(path.join("shop").join("orders.bson"), b"partial").unwrap();

        let (tx, rx) = watch::channel(Some(path.clone()));
        remove_abandoned_workspace(&rx);
        assert!(!path.exists());
        assert!(parent.path().exists());

        tx.send_replace(None);
        remove_abandoned_workspace(&rx);
    }

    #[test]
    fn test_unknown_log_settings_rejected() {
        assert!(setup_logging("loud", "text").is_err());
    }
}
