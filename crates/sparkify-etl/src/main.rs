//! Sparkify ETL - batch loader for song and log data

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use sparkify_common::config::EtlConfig;
use sparkify_common::logging::{init_logging, LogConfig, LogLevel};
use sparkify_etl::pipeline::{BatchDriver, PipelineOptions};
use sparkify_etl::progress::stderr_is_terminal;
use sparkify_etl::report::RunReport;
use sparkify_etl::storage::postgres::{connect, run_migrations};
use sparkify_etl::storage::{MemorySession, PgSession};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "sparkify-etl")]
#[command(author, version, about = "Load Sparkify song and log data into PostgreSQL")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load song data, then log data (default)
    Run(RunArgs),

    /// Apply database migrations and exit
    Migrate {
        /// PostgreSQL connection string
        #[arg(long)]
        database_url: Option<String>,
    },
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Root directory of song files
    #[arg(long)]
    song_data: Option<PathBuf>,

    /// Root directory of log files
    #[arg(long)]
    log_data: Option<PathBuf>,

    /// PostgreSQL connection string
    #[arg(long)]
    database_url: Option<String>,

    /// Match song durations within this many seconds instead of exactly
    #[arg(long)]
    duration_tolerance: Option<f64>,

    /// Stop after the first failed file
    #[arg(long)]
    fail_fast: bool,

    /// Load into an in-memory engine; nothing is written to PostgreSQL
    #[arg(long)]
    dry_run: bool,

    /// Apply migrations before loading
    #[arg(long, conflicts_with = "dry_run")]
    migrate: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut EtlConfig) {
        if let Some(ref dir) = self.song_data {
            config.song_data = dir.clone();
        }
        if let Some(ref dir) = self.log_data {
            config.log_data = dir.clone();
        }
        if let Some(ref url) = self.database_url {
            config.database.url = url.clone();
        }
        if self.duration_tolerance.is_some() {
            config.duration_tolerance = self.duration_tolerance;
        }
        if self.fail_fast {
            config.fail_fast = true;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flag
    let log_config = match LogConfig::builder()
        .level(log_level)
        .log_file_prefix("sparkify-etl")
        .build()
        .merge_env()
    {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: invalid logging configuration: {:#}", e);
            return ExitCode::from(2);
        },
    };

    let _guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: failed to initialize logging: {:#}", e);
            return ExitCode::from(2);
        },
    };

    let command = cli.command.unwrap_or(Command::Run(RunArgs::default()));
    let result = match command {
        Command::Run(args) => run(args).await,
        Command::Migrate { database_url } => migrate(database_url).await.map(|_| true),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = %e, "Run failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        },
    }
}

/// Returns `false` when at least one file failed
async fn run(args: RunArgs) -> Result<bool> {
    let mut config = EtlConfig::load().context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let options = PipelineOptions::from_config(&config).with_progress(stderr_is_terminal());

    info!(
        song_data = %config.song_data.display(),
        log_data = %config.log_data.display(),
        dry_run = args.dry_run,
        fail_fast = config.fail_fast,
        duration_tolerance = ?config.duration_tolerance,
        "Starting Sparkify load"
    );

    let reports = if args.dry_run {
        let mut driver = BatchDriver::new(MemorySession::new(), options);
        driver.run_all(&config.song_data, &config.log_data).await?
    } else {
        let pool = connect(&config.database)
            .await
            .context("Failed to connect to database")?;
        if args.migrate {
            run_migrations(&pool).await?;
        }

        let mut driver = BatchDriver::new(PgSession::new(pool.clone()), options);
        let reports = driver.run_all(&config.song_data, &config.log_data).await;
        drop(driver);
        pool.close().await;
        reports?
    };

    let failed: usize = reports.iter().map(RunReport::failed).sum();
    let attempted: usize = reports.iter().map(RunReport::attempted).sum();

    if failed > 0 {
        warn!(failed, attempted, "Load finished with failed files");
        return Ok(false);
    }

    info!(attempted, "Load complete");
    Ok(true)
}

async fn migrate(database_url: Option<String>) -> Result<()> {
    let mut config = EtlConfig::load().context("Failed to load configuration")?;
    if let Some(url) = database_url {
        config.database.url = url;
    }

    let pool = connect(&config.database)
        .await
        .context("Failed to connect to database")?;
    run_migrations(&pool).await?;
    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_run_flags_parse() {
        let cli = Cli::try_parse_from(["sparkify-etl", "run", "--migrate", "--fail-fast"]).unwrap();
        match cli.command {
            Some(Command::Run(args)) => {
                assert!(args.migrate);
                assert!(args.fail_fast);
                assert!(!args.dry_run);
            }
            other => panic!("expected run, got {:?}", other),
        }
    }

    #[test]
    fn test_dry_run_rejects_migrate() {
        let err = Cli::try_parse_from(["sparkify-etl", "run", "--dry-run", "--migrate"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }
}
