use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use roster_storage::MemoryRecordStore;
use roster_sync::{CleanseConfig, CleansePipeline};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "roster-cli")]
#[command(about = "Artist roster snapshot cleanser")]
struct Cli {
    /// YAML file overriding environment configuration.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Cleanse a snapshot into the store and the output directory.
    Run(RunArgs),
    /// Load, normalize and partition a snapshot without writing anything.
    Check {
        #[arg(long)]
        source: Option<PathBuf>,
    },
    /// Create the clean and reject tables.
    Migrate,
}

#[derive(Debug, Default, Args)]
struct RunArgs {
    #[arg(long)]
    source: Option<PathBuf>,
    #[arg(long)]
    run_token: Option<String>,
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

fn load_config(path: Option<&PathBuf>) -> Result<CleanseConfig> {
    match path {
        Some(path) => CleanseConfig::from_yaml_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(CleanseConfig::from_env()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_ref())?;

    match cli.command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Run(args) => {
            if let Some(source) = args.source {
                config.source_path = source;
            }
            if let Some(run_token) = args.run_token {
                config.run_token = run_token;
            }
            if let Some(output_dir) = args.output_dir {
                config.output_dir = output_dir;
            }
            let summary = roster_sync::run_once_with_config(config).await?;
            println!(
                "cleanse complete: run_token={} clean={} rejected={} clean_table={} reject_table={}",
                summary.run_token,
                summary.clean_count,
                summary.rejected_count,
                summary.clean_table_total,
                summary.reject_table_total
            );
            println!(
                "  {} sha256={} bytes={}",
                summary.clean_artifact.path,
                summary.clean_artifact.sha256,
                summary.clean_artifact.bytes
            );
            println!(
                "  {} sha256={} bytes={}",
                summary.rejected_artifact.path,
                summary.rejected_artifact.sha256,
                summary.rejected_artifact.bytes
            );
        }
        Commands::Check { source } => {
            let source = source.unwrap_or_else(|| config.source_path.clone());
            let pipeline = CleansePipeline::new(config, Box::new(MemoryRecordStore::new()));
            let staged = pipeline.stage(&source).await?;
            println!(
                "check complete: source={} rows={} clean={} rejected={} missing_dates={} dropped_track_ids={}",
                source.display(),
                staged.report.rows,
                staged.partition.clean.len(),
                staged.partition.rejected.len(),
                staged.report.missing_dates,
                staged.report.dropped_track_ids
            );
        }
        Commands::Migrate => {
            roster_sync::migrate_with_config(&config).await?;
            println!("migrations applied");
        }
    }

    Ok(())
}
