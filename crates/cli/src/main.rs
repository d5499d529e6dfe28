use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gapfade_core::ConfigLoader;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gapfade")]
#[command(about = "Intraday gap mean-reversion bot for US equities", long_about = None)]
struct Cli {
    /// Optional log file path (logs to file instead of stderr)
    #[arg(long, global = true, env = "GAPFADE_LOG_FILE")]
    log_file: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the polling loop until SIGINT/SIGTERM
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Print the effective configuration (credentials redacted)
    ShowConfig {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv_path = load_dotenv()?;
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref(), cli.json_logs)?;
    if let Some(path) = dotenv_path {
        tracing::debug!(path = %path.display(), "Loaded environment from .env");
    }

    match cli.command {
        Commands::Run { config } => run(&config).await,
        Commands::ShowConfig { config } => show_config(&config),
    }
}

/// Loads `.env` from the working directory or a parent. Variables already set
/// in the environment win. A missing file is not an error.
fn load_dotenv() -> Result<Option<PathBuf>> {
    match dotenv::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e).context("failed to read .env"),
    }
}

fn init_logging(log_file: Option<&str>, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let writer = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {path}"))?;
            BoxMakeWriter::new(std::sync::Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

async fn run(config_path: &str) -> Result<()> {
    let config = ConfigLoader::load(config_path)?;
    tracing::info!(
        config = config_path,
        symbol = %config.strategy.symbol,
        paper = config.broker.paper,
        dry_run = config.strategy.dry_run,
        "Configuration loaded"
    );

    let runner = gapfade_bot::alpaca_runner(&config)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handle = tokio::spawn(runner.run(shutdown_rx));

    tokio::select! {
        result = &mut handle => {
            return result.context("runner task panicked")?;
        }
        signal = shutdown_signal() => signal?,
    }

    // Receiver is gone only if the runner already exited.
    let _ = shutdown_tx.send(true);
    handle.await.context("runner task panicked")??;
    tracing::info!("gapfade stopped");
    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        }
    }
    Ok(())
}

fn show_config(config_path: &str) -> Result<()> {
    let config = ConfigLoader::load_unvalidated(config_path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    println!(
        "credentials: key {}, secret {}",
        presence(config.broker.api_key.as_deref()),
        presence(config.broker.api_secret.as_deref())
    );
    match config.validate() {
        Ok(()) => println!("configuration is valid"),
        Err(e) => println!("configuration is INVALID: {e}"),
    }
    Ok(())
}

fn presence(value: Option<&str>) -> &'static str {
    if value.is_some_and(|v| !v.is_empty()) {
        "set"
    } else {
        "missing"
    }
}
