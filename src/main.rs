// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Docuflow: watched-folder document classifier
//!
//! Drains the backlog of a source directory, then watches it for new files
//! until interrupted.

use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use docuflow::classifier::DocumentAnalyst;
use docuflow::config::{AppConfig, Session};
use docuflow::ledger::LedgerSummary;
use docuflow::ollama::OllamaClient;
use docuflow::pipeline::{run_batch, run_live, scan_existing};
use docuflow::processor::{FileProcessor, ProcessOutcome};
use docuflow::watcher::FileWatcher;
use docuflow::{DocuflowError, Result};

/// Docuflow CLI - watched-folder document classifier
#[derive(Parser, Debug)]
#[command(name = "docuflow")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Classify, rename and file documents dropped into a folder", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Process the existing backlog, then watch for new files
    Run {
        /// Directory to ingest (overrides config)
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Where the session folder is created (overrides config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Classify and plan without moving files
        #[arg(long)]
        dry_run: bool,

        /// Skip the classification service health check on startup
        #[arg(long)]
        skip_health_check: bool,

        /// Do not process files already in the source directory
        #[arg(long)]
        no_batch: bool,
    },

    /// Classify and file a single document
    Process {
        /// File to process
        path: PathBuf,

        /// Where the session folder is created (overrides config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Show the destination without moving the file
        #[arg(long)]
        dry_run: bool,
    },

    /// Summarize the ledgers of a session folder
    Report {
        /// Session folder (Organized_Batch_...)
        session: PathBuf,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show classification service status
    Status,

    /// Create a config file and an inbox folder
    Init {
        /// Directory to initialize (default: current)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Force overwrite existing configuration
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Load configuration
    let config = AppConfig::load(&cli.config)?;

    match cli.command {
        Some(Commands::Run { source, output, dry_run, skip_health_check, no_batch }) => {
            let config = with_overrides(config, source, output);
            run(config, dry_run, skip_health_check, no_batch).await
        }
        Some(Commands::Process { path, output, dry_run }) => {
            let config = with_overrides(config, None, output);
            run_process(config, path, dry_run).await
        }
        Some(Commands::Report { session }) => run_report(&session),
        Some(Commands::Config { action }) => run_config_command(config, action, &cli.config),
        Some(Commands::Status) => run_status(config).await,
        Some(Commands::Init { dir, force }) => run_init(dir, force),
        None => run(config, false, false, false).await,
    }
}

fn with_overrides(mut config: AppConfig, source: Option<PathBuf>, output: Option<PathBuf>) -> AppConfig {
    if let Some(source) = source {
        config.source_dir = source.to_string_lossy().into_owned();
    }
    if let Some(output) = output {
        config.output_root = Some(output.to_string_lossy().into_owned());
    }
    config
}

/// Connect to the classification service and wrap it in the retry policy
async fn build_classifier(config: &AppConfig, skip_health_check: bool) -> Result<DocumentAnalyst<OllamaClient>> {
    let mut client = OllamaClient::new(&config.ai_engine)?;

    if skip_health_check {
        warn!("Skipping classification service health check");
    } else {
        info!("Initializing AI engine...");
        client.health_check().await?;
        if let Err(e) = client.select_models(&config.ai_engine).await {
            warn!("Could not list models ({}), using {} (vision: {})", e, client.text_model(), client.vision_model());
        }
    }

    Ok(DocumentAnalyst::new(client, config))
}

/// Batch scan, then live watch until Ctrl+C
async fn run(config: AppConfig, dry_run: bool, skip_health_check: bool, no_batch: bool) -> Result<()> {
    config.validate()?;

    let source = config.source_path();
    if !source.is_dir() {
        return Err(DocuflowError::Config(format!(
            "Source directory {:?} does not exist", source
        )));
    }

    let classifier = build_classifier(&config, skip_health_check).await?;
    let session = Session::create(&config.output_path(), Local::now())?;

    info!("Watching:  {}", source.display());
    info!("Target:    {}", session.root.display());
    if dry_run {
        warn!("DRY RUN MODE - files will not be moved");
    }

    let mut processor = FileProcessor::new(&config, session, Arc::new(classifier)).with_dry_run(dry_run);

    if !no_batch {
        info!("Scanning source for existing files...");
        let files = scan_existing(&source, &config)?;
        run_batch(&mut processor, &files).await;
    }

    let watcher = FileWatcher::new(&source)?;
    let shutdown_rx = shutdown_signal();

    info!("Live watch active at: {}", watcher.watched_path().display());
    info!("(Press Ctrl+C to stop)");

    run_live(&watcher, &mut processor, &config.schedule, shutdown_rx).await
}

/// Flip a watch channel on Ctrl+C or SIGTERM
fn shutdown_signal() -> watch::Receiver<bool> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = terminate => info!("Received SIGTERM, shutting down..."),
        }

        let _ = shutdown_tx.send(true);
    });

    shutdown_rx
}

/// Process a single file into a fresh session
async fn run_process(config: AppConfig, path: PathBuf, dry_run: bool) -> Result<()> {
    config.validate()?;

    let classifier = build_classifier(&config, false).await?;
    let output_root = match &config.output_root {
        Some(root) => PathBuf::from(root),
        None => path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(".")),
    };
    let session = Session::create(&output_root, Local::now())?;
    let mut processor = FileProcessor::new(&config, session, Arc::new(classifier)).with_dry_run(dry_run);

    match processor.process(&path).await {
        ProcessOutcome::Moved(dest) | ProcessOutcome::Planned(dest) => {
            println!("{} -> {}", path.display(), dest.path.display());
        }
        ProcessOutcome::Skipped(reason) => {
            println!("{}: skipped ({:?})", path.display(), reason);
        }
        ProcessOutcome::Stuck { reason, .. } => {
            eprintln!("{}: {}", path.display(), reason);
        }
    }

    Ok(())
}

fn run_report(session_root: &Path) -> Result<()> {
    if !session_root.is_dir() {
        return Err(DocuflowError::Config(format!(
            "{:?} is not a session folder", session_root
        )));
    }

    let session = Session::at(session_root.to_path_buf(), Local::now());
    let summary = LedgerSummary::load(&session)?;

    println!("Session: {}", session_root.display());
    println!("  Filed:   {}", summary.succeeded);
    println!("  Failed:  {}", summary.failed);
    println!("  Finance: {} rows", summary.finance_rows);
    if !summary.per_category.is_empty() {
        println!("\nBy category:");
        for (category, count) in &summary.per_category {
            println!("  {:<12} {}", category, count);
        }
    }

    Ok(())
}

/// Run config commands
fn run_config_command(config: AppConfig, action: ConfigCommands, config_path: &Path) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        ConfigCommands::Generate { output } => {
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            config.validate()?;
            println!("Configuration at {:?} is valid", config_path);
            println!("  Source: {}", config.source_dir);
            println!("  Output: {}", config.output_path().display());
            println!("  Text models: {:?}", config.ai_engine.models.text);
        }
    }

    Ok(())
}

/// Run status check
async fn run_status(config: AppConfig) -> Result<()> {
    let client = OllamaClient::new(&config.ai_engine)?;

    println!("Docuflow v{} Status", env!("CARGO_PKG_VERSION"));
    println!("======================");

    match client.health_check().await {
        Ok(()) => println!("Classification service: Running"),
        Err(e) => println!("Classification service: Error - {}", e),
    }

    match client.list_models().await {
        Ok(models) => {
            let text = docuflow::ollama::select_model(&config.ai_engine.models.text, &models);
            let vision = docuflow::ollama::select_model(&config.ai_engine.models.vision, &models);
            println!("\nAvailable models:");
            for m in &models {
                let marker = if *m == text || *m == vision { "→" } else { " " };
                println!("  {} {}", marker, m);
            }
        }
        Err(e) => println!("  Error listing models: {}", e),
    }

    println!("\nConfiguration:");
    println!("  Source: {}", config.source_dir);
    println!("  Output: {}", config.output_path().display());
    println!("  Cool-down: {} ms", config.schedule.cooldown_ms);

    Ok(())
}

/// Initialize a new Docuflow project
fn run_init(dir: Option<PathBuf>, force: bool) -> Result<()> {
    let target = dir.unwrap_or_else(|| PathBuf::from("."));
    let config_path = target.join("config.json");

    if config_path.exists() && !force {
        return Err(DocuflowError::Config(
            "config.json already exists. Use --force to overwrite".to_string()
        ));
    }

    let inbox = target.join("inbox");
    std::fs::create_dir_all(&inbox)?;

    let config = AppConfig {
        source_dir: inbox.to_string_lossy().into_owned(),
        ..AppConfig::default()
    };
    config.save(&config_path)?;

    println!("Docuflow initialized in {:?}", target);
    println!("\nCreated:");
    println!("  - config.json");
    println!("  - inbox/");
    println!("\nNext: docuflow run");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["docuflow"]).unwrap();
        assert!(!cli.verbose);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_run_command() {
        let cli = Cli::try_parse_from([
            "docuflow", "run", "--source", "/tmp/in", "--output", "/tmp/out", "--dry-run"
        ]).unwrap();

        match cli.command {
            Some(Commands::Run { source, output, dry_run, no_batch, .. }) => {
                assert!(dry_run);
                assert!(!no_batch);
                assert_eq!(source, Some(PathBuf::from("/tmp/in")));
                assert_eq!(output, Some(PathBuf::from("/tmp/out")));
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_report_command() {
        let cli = Cli::try_parse_from(["docuflow", "report", "/tmp/Organized_Batch_x"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Report { .. })));
    }

    #[test]
    fn test_overrides() {
        let config = with_overrides(AppConfig::default(), Some(PathBuf::from("/a")), None);
        assert_eq!(config.source_dir, "/a");
        assert_eq!(config.output_path(), PathBuf::from("/a"));
    }
}
