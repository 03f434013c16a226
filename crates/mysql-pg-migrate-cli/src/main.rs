//! mysql-pg-migrate CLI - one-shot MySQL to PostgreSQL migration.

mod credentials;
mod report;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use mysql_pg_migrate::logging::DEFAULT_LOG_FILE;
use mysql_pg_migrate::{
    Config, ConsoleFormat, LogHandle, LogOptions, MigrateError, Orchestrator, ProgressUpdate,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::instrument::WithSubscriber;

use credentials::CredentialArgs;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Config file read when `--config` is not given, if it exists.
const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Parser)]
#[command(name = "mysql-pg-migrate")]
#[command(about = "One-shot MySQL to PostgreSQL schema and data migration")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file [default: config.yaml, if present]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Append-only migration log file
    #[arg(long, default_value = DEFAULT_LOG_FILE)]
    log_file: PathBuf,

    /// Console log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Print progress updates as JSON lines to stderr
    #[arg(long)]
    progress: bool,

    #[command(flatten)]
    credentials: CredentialArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate schema and data
    Run {
        /// Dry run: introspect and print the plan without touching the target
        #[arg(long)]
        dry_run: bool,
    },

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    let console = ConsoleFormat::parse(&cli.log_format)?;
    let mut config = load_config(cli.config.as_deref())?;
    cli.credentials.apply(&mut config)?;
    config.validate()?;

    let log = LogHandle::open(
        &cli.log_file,
        &LogOptions {
            level: log_level(&cli.verbosity).to_string(),
            console: Some(console),
        },
    )?;
    let outcome = execute(&cli, config, &log).await;
    if let Err(e) = &outcome {
        tracing::dispatcher::with_default(&log.dispatch(), || tracing::error!("{}", e));
    }
    log.close();
    outcome
}

async fn execute(cli: &Cli, config: Config, log: &LogHandle) -> Result<(), MigrateError> {
    match cli.command {
        Commands::Run { dry_run } => {
            let cancel = setup_signal_handler(log)?;
            let mut orchestrator = Orchestrator::connect(config)
                .with_subscriber(log.dispatch())
                .await?
                .with_log(log.dispatch());

            if dry_run {
                let plan = orchestrator.dry_run().await?;
                if cli.output_json {
                    println!("{}", serde_json::to_string_pretty(&plan)?);
                } else {
                    print!("{}", report::render_dry_run(&plan));
                }
                return Ok(());
            }

            let mut printer = None;
            if cli.progress {
                let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
                orchestrator = orchestrator.with_progress(tx);
                printer = Some(spawn_progress_printer(rx, std::io::stderr()));
            }

            // The orchestrator owns the sender, so the printer drains and
            // exits once the run returns.
            let outcome = orchestrator.run(cancel).await;
            if let Some(printer) = printer {
                let _ = printer.await;
            }
            let result = outcome?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                print!("{}", report::render_report(&result));
            }
        }

        Commands::HealthCheck => {
            let result = Orchestrator::health_check(&config)
                .with_subscriber(log.dispatch())
                .await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print!("{}", report::render_health(&result));
            }

            if !result.healthy {
                return Err(MigrateError::connection(
                    "health check",
                    "one or more databases are unreachable",
                ));
            }
        }
    }

    Ok(())
}

/// Read the YAML file, or start from defaults when none is configured.
fn load_config(path: Option<&Path>) -> Result<Config, MigrateError> {
    match path {
        Some(path) => Config::read(path),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => Config::read(DEFAULT_CONFIG_FILE),
        None => Ok(Config::default()),
    }
}

fn log_level(verbosity: &str) -> &'static str {
    match verbosity.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    }
}

/// Write each progress update as one JSON line until the sender is dropped.
fn spawn_progress_printer<W>(mut rx: UnboundedReceiver<ProgressUpdate>, mut out: W) -> JoinHandle<W>
where
    W: Write + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            if let Ok(line) = serde_json::to_string(&update) {
                let _ = writeln!(out, "{}", line);
            }
        }
        let _ = out.flush();
        out
    })
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
fn setup_signal_handler(log: &LogHandle) -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token = cancel_token.clone();
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        eprintln!("\nReceived {}. Rolling back and shutting down...", name);
        info!("Received {}; cancelling migration", name);
        token.cancel();
    }
    .with_subscriber(log.dispatch()));

    Ok(cancel_token)
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler(log: &LogHandle) -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Rolling back and shutting down...");
            info!("Received Ctrl-C; cancelling migration");
            token.cancel();
        }
    }
    .with_subscriber(log.dispatch()));

    Ok(cancel_token)
}
