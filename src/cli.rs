//! Command definitions and the async entrypoint shared by `main()` and the
//! integration tests.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::load_config::{load_config, write_default};
use crate::runner::Subprocess;
use crate::sync::{CleanOutcome, SyncRunner};

/// CLI for b2-sync: mirror a local directory to a Backblaze B2 bucket.
#[derive(Parser)]
#[clap(
    name = "b2-sync",
    version,
    about = "Mirror a local directory to a Backblaze B2 bucket, with per-run logs and share links"
)]
pub struct Cli {
    /// Path to the YAML config file
    #[clap(long, global = true, default_value = "b2_sync_config.yml")]
    pub config: PathBuf,

    /// Enable verbose logging
    #[clap(long, global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synchronize the input directory to the B2 bucket
    Sync {
        /// Preview changes without making them
        #[clap(long)]
        dry_run: bool,
    },
    /// Remove all files from the B2 bucket
    Clean {
        /// Skip the confirmation prompt
        #[clap(long)]
        force: bool,
        /// Preview what would be deleted without making changes
        #[clap(long)]
        dry_run: bool,
    },
    /// Write a default configuration file
    InitConfig,
}

/// Extracted async CLI logic entrypoint for integration tests and main().
pub async fn run(cli: Cli) -> Result<()> {
    // sync is the default when no subcommand is given
    let command = cli.command.unwrap_or(Commands::Sync { dry_run: false });

    match command {
        Commands::InitConfig => {
            write_default(&cli.config)?;
            println!(
                "Created default configuration file: {}",
                cli.config.display()
            );
            println!("Edit it to set your bucket name and 1Password item name.");
            Ok(())
        }
        Commands::Sync { dry_run } => {
            let config = load_config(&cli.config)?;
            config.validate_environment(true)?;
            let subprocess = Subprocess::new(config.sync_timeout());
            let report = SyncRunner::new(&config, &subprocess).sync(dry_run).await?;
            println!(
                "Sync complete: {} files processed ({} uploaded, {} updated, {} deleted, {} skipped, {} failed).",
                report.events.len(),
                report.summary.files_uploaded,
                report.summary.files_updated,
                report.summary.files_deleted,
                report.summary.files_skipped,
                report.summary.files_failed,
            );
            Ok(())
        }
        Commands::Clean { force, dry_run } => {
            let config = load_config(&cli.config)?;
            config.validate_environment(false)?;
            let subprocess = Subprocess::new(config.sync_timeout());
            match SyncRunner::new(&config, &subprocess)
                .clean(force, dry_run)
                .await?
            {
                CleanOutcome::Completed(report) => {
                    println!(
                        "Clean complete: bucket {} emptied.",
                        report.bucket_name
                    );
                }
                CleanOutcome::DryRun { file_count } => {
                    println!("Dry run: would delete {file_count} files.");
                }
                CleanOutcome::Cancelled => {
                    println!("Clean cancelled.");
                }
            }
            Ok(())
        }
    }
}
