use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use company_sync::{
    collect_stats, open_database, render_table, StrategyKind, SyncConfig, Synchronizer,
    DEFAULT_BATCH_SIZE,
};

#[derive(Parser)]
#[command(name = "company-sync")]
#[command(author, version, about = "Mirror company CSV exports into SQLite", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// SQLite database file
    #[arg(short, long, global = true, default_value = "company.db")]
    database: PathBuf,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize the four CSV files into the database
    Sync {
        /// Directory with departments.csv, employees.csv, dept_emp.csv, emp_salary.csv
        #[arg(short, long, default_value = "csv")]
        source_dir: PathBuf,

        /// Synchronization strategy
        #[arg(long, value_enum, default_value_t = StrategyKind::Bulk)]
        strategy: StrategyKind,

        /// Records per batch flush and per progress line
        #[arg(short, long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,

        /// Resolve foreign keys with a lookup per row instead of inside the upsert
        #[arg(long)]
        no_inline_resolution: bool,

        /// Empty all tables before importing
        #[arg(long)]
        truncate: bool,

        /// Skip the table summary after the run
        #[arg(long)]
        no_stats: bool,
    },
    /// Show row totals and modified-row counts per table
    Stats,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("company_sync=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sync {
            source_dir,
            strategy,
            batch_size,
            no_inline_resolution,
            truncate,
            no_stats,
        } => {
            let config = SyncConfig {
                source_dir,
                database: cli.database,
                strategy,
                batch_size,
                inline_key_resolution: !no_inline_resolution,
                truncate,
                report_stats: !no_stats,
            };
            run_sync(&config, cli.format)
        }
        Commands::Stats => run_stats(&cli.database, cli.format),
    }
}

fn run_sync(config: &SyncConfig, format: OutputFormat) -> Result<()> {
    info!("connecting to {}", config.database.display());
    let mut conn = open_database(&config.database)
        .with_context(|| format!("Failed to open database {}", config.database.display()))?;

    let synchronizer = Synchronizer::new(config).context("Invalid configuration")?;
    let report = synchronizer
        .run(&mut conn)
        .with_context(|| format!("{} synchronization failed", config.strategy))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            if let Some(stats) = &report.stats {
                print!("{}", render_table(stats));
            }
            println!(
                "Finished in {:.1} seconds ({} rows)",
                report.elapsed_ms as f64 / 1000.0,
                report.total_processed()
            );
        }
    }

    Ok(())
}

fn run_stats(database: &Path, format: OutputFormat) -> Result<()> {
    let conn = open_database(database)
        .with_context(|| format!("Failed to open database {}", database.display()))?;
    let stats = collect_stats(&conn).context("Failed to collect table statistics")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Text => print!("{}", render_table(&stats)),
    }

    Ok(())
}
