//! envcheck - environment variable consistency checker
//!
//! Cross-references the variables a containerized project declares in its
//! env template against those its compose files, scripts, deployment charts
//! and (optionally) source code actually use.

mod compare;
mod config;
mod extract;
mod report;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::extract::ProjectScanner;
use crate::report::ValidationReport;

#[derive(Parser)]
#[command(name = "envcheck")]
#[command(author = "envcheck Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Check environment variables are declared everywhere they are used", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project root (defaults to current directory)
    #[arg(short, long, value_name = "PATH")]
    path: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Comma-separated directories to scan for code usage
    #[arg(long, value_name = "DIRS", value_delimiter = ',', env = "ENVCHECK_SCAN_DIRS")]
    scan_dirs: Option<Vec<PathBuf>>,

    /// Comma-separated names to ignore in script and code usage
    #[arg(long, value_name = "NAMES", value_delimiter = ',')]
    ignore: Vec<String>,

    /// Output format for reports and set listings
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all consistency checks (default)
    Check,

    /// Print every extracted variable set
    Sets,

    /// Write a default .envcheck.toml for this project
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn setup_logging(
    verbosity: u8,
    log_dir: Option<&Path>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let Some(log_dir) = log_dir else {
        // stdout carries the report
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
        return Ok(None);
    };

    let log_dir = if log_dir.is_absolute() {
        log_dir.to_path_buf()
    } else {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("envcheck")
            .join(log_dir)
    };

    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "envcheck.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let root = match cli.path {
        Some(path) => path,
        None => std::env::current_dir().context("failed to get current directory")?,
    };

    if let Some(Commands::Init { force }) = cli.command {
        config::init_project_config(&root, force)?;
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = config::Config::discover(&root, cli.config.as_deref())?;

    // Keep the guard alive for the duration of the program
    let _logging_guard = setup_logging(cli.verbose, config.logging.dir.as_deref())?;

    config.apply_overrides(cli.scan_dirs, cli.ignore);

    let scan = ProjectScanner::new(&root, &config).scan().await?;

    match cli.command {
        Some(Commands::Sets) => {
            match cli.format {
                OutputFormat::Text => print!("{}", report::render_sets(&scan)),
                OutputFormat::Json => println!("{}", report::render_sets_json(&scan)?),
            }
            Ok(ExitCode::SUCCESS)
        }
        _ => {
            let report = ValidationReport::from_scan(&scan);
            match cli.format {
                OutputFormat::Text => print!("{}", report.render_text()),
                OutputFormat::Json => println!("{}", report.render_json()?),
            }
            tracing::info!(
                verdict = %report.verdict,
                skipped = report.skipped(),
                "validation finished"
            );
            Ok(ExitCode::from(report.verdict.exit_code()))
        }
    }
}
