//! High-level pipeline: orchestrates the sync and clean operations.
//!
//! Each operation authenticates, runs the b2 CLI through the injected
//! [`ToolRunner`], parses the captured output into events, and persists a run
//! report into a fresh timestamped directory. Fail-fast: a failed subprocess
//! still gets its failure documented on disk before the error propagates.
//!
//! # Callable From
//! - The CLI binary and integration tests; tests inject a mock runner.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Result};
use chrono::Local;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::artifacts::{attach_file_sizes, RunDir};
use crate::auth::B2Auth;
use crate::classify::parse_sync_output;
use crate::config::Config;
use crate::links::resolve_download_endpoint;
use crate::report::{OperationError, RunReport, SyncAction, SyncEvent, SyncStatus};
use crate::runner::{argv, ToolRunner};

/// Runs sync/clean operations against one loaded configuration.
pub struct SyncRunner<'a, R: ToolRunner> {
    config: &'a Config,
    runner: &'a R,
}

/// How a clean run ended.
#[derive(Debug)]
pub enum CleanOutcome {
    Completed(RunReport),
    DryRun { file_count: usize },
    Cancelled,
}

impl<'a, R: ToolRunner> SyncRunner<'a, R> {
    pub fn new(config: &'a Config, runner: &'a R) -> Self {
        Self { config, runner }
    }

    /// Mirrors the input directory into the bucket and writes the run report,
    /// link files and, on subprocess failure, a failure report.
    pub async fn sync(&self, dry_run: bool) -> Result<RunReport> {
        let started = Local::now();
        let clock = Instant::now();
        info!("Starting B2 sync operation");

        let mut auth = B2Auth::new(self.config, self.runner);
        auth.authorize().await?;
        let bucket = auth.bucket_name();

        let run_dir = RunDir::create(&self.config.paths.output_dir, started)?;

        let limit = self.config.max_file_size_bytes();
        for path in oversized_files(&self.config.paths.input_dir, limit) {
            warn!(
                path = %path.display(),
                limit_gb = self.config.b2.max_file_size_gb,
                "File exceeds the upload size limit and may fail to sync"
            );
        }

        let mut args = argv(&["sync", "--replace-newer", "--delete"]);
        for pattern in &self.config.processing.exclude_patterns {
            args.push("--exclude-regex".to_string());
            args.push(pattern.clone());
        }
        args.push(self.config.paths.input_dir.display().to_string());
        args.push(format!("b2://{bucket}/"));
        if dry_run {
            args.push("--dry-run".to_string());
            info!("Dry run mode, no changes will be made");
        }

        info!(
            command = %format!("{} {}", self.config.paths.b2_bin, args.join(" ")),
            "Executing sync command"
        );
        let out = self.runner.run(&self.config.paths.b2_bin, &args).await?;
        let execution_time = clock.elapsed();

        if !out.success() {
            error!(status = out.status, stderr = %out.stderr, "B2 sync failed");
            let errors = vec![OperationError::new(
                "sync_operation",
                "B2SyncFailure",
                out.stderr.clone(),
            )];
            let report = RunReport::new(
                "sync",
                &bucket,
                started,
                execution_time,
                Vec::new(),
                errors,
            );
            run_dir.write_json_log(&report)?;
            run_dir.write_failure_report(&report.errors, &report.operation)?;
            bail!("b2 sync exited with status {}", out.status);
        }

        let mut events = parse_sync_output(&out.stdout);
        attach_file_sizes(&mut events);

        let report = RunReport::new("sync", &bucket, started, execution_time, events, Vec::new());
        run_dir.write_json_log(&report)?;

        let endpoint = resolve_download_endpoint(auth.account_info().await.as_deref());
        run_dir.write_link_artifacts(&report.events, &bucket, &endpoint)?;

        info!(
            files = report.events.len(),
            seconds = %format!("{:.2}", report.execution_time.as_secs_f64()),
            output_dir = %run_dir.path().display(),
            "Sync completed"
        );
        Ok(report)
    }

    /// Removes every file (and version) from the bucket, after counting the
    /// contents and, unless forced, asking for confirmation on stdin.
    pub async fn clean(&self, force: bool, dry_run: bool) -> Result<CleanOutcome> {
        self.clean_with_confirmation(force, dry_run, confirm_on_stdin)
            .await
    }

    /// Clean with an injected confirmation prompt. The prompt receives the
    /// bucket name and the file count and decides whether to proceed.
    pub async fn clean_with_confirmation<F>(
        &self,
        force: bool,
        dry_run: bool,
        confirm: F,
    ) -> Result<CleanOutcome>
    where
        F: FnOnce(&str, usize) -> Result<bool>,
    {
        let started = Local::now();
        let clock = Instant::now();
        info!("Starting B2 clean operation");

        let mut auth = B2Auth::new(self.config, self.runner);
        auth.authorize().await?;
        let bucket = auth.bucket_name();

        let run_dir = RunDir::create(&self.config.paths.output_dir, started)?;

        let remote = format!("b2://{bucket}");
        let out = self
            .runner
            .run(&self.config.paths.b2_bin, &argv(&["ls", &remote]))
            .await?;
        if !out.success() {
            error!(bucket = %bucket, stderr = %out.stderr, "Failed to access bucket");
            bail!("failed to access bucket {bucket:?}: {}", out.stderr.trim());
        }

        let out = self
            .runner
            .run(&self.config.paths.b2_bin, &argv(&["ls", "--long", &remote]))
            .await?;
        if !out.success() {
            error!(stderr = %out.stderr, "Failed to list bucket contents");
            bail!("failed to list bucket contents: {}", out.stderr.trim());
        }
        let file_count = listing_rows(&out.stdout).count();

        if !force && !dry_run && !confirm(&bucket, file_count)? {
            info!("Clean operation cancelled by user");
            return Ok(CleanOutcome::Cancelled);
        }

        if dry_run {
            info!(file_count, bucket = %bucket, "Dry run, would delete all files");
            return Ok(CleanOutcome::DryRun { file_count });
        }

        let args = argv(&["rm", "--versions", "--recursive", &remote]);
        info!(
            command = %format!("{} {}", self.config.paths.b2_bin, args.join(" ")),
            "Executing clean command"
        );
        let out = self.runner.run(&self.config.paths.b2_bin, &args).await?;
        let execution_time = clock.elapsed();
        if !out.success() {
            error!(status = out.status, stderr = %out.stderr, "B2 clean failed");
            bail!("b2 rm exited with status {}", out.status);
        }

        // Best effort: leftover unfinished large files are not fatal.
        let cancel = self
            .runner
            .run(
                &self.config.paths.b2_bin,
                &argv(&["cancel-all-unfinished-large-files", &bucket]),
            )
            .await;
        match cancel {
            Ok(out) if out.success() => info!("Cancelled unfinished large files"),
            Ok(out) => warn!(status = out.status, "Could not cancel unfinished large files"),
            Err(e) => warn!(error = %e, "Could not cancel unfinished large files"),
        }

        let events = vec![SyncEvent {
            action: SyncAction::Delete,
            local_path: String::new(),
            remote_key: format!("bucket://{bucket}"),
            status: SyncStatus::Success,
            timestamp: chrono::Utc::now(),
            error_message: None,
            file_size_bytes: None,
        }];
        let report = RunReport::new("clean", &bucket, started, execution_time, events, Vec::new())
            .with_extra("files_deleted", Value::from(file_count));
        run_dir.write_json_log(&report)?;

        info!(
            files_deleted = file_count,
            output_dir = %run_dir.path().display(),
            "Clean completed"
        );
        Ok(CleanOutcome::Completed(report))
    }
}

/// Object rows of a `b2 ls --long` listing: non-blank lines that are not the
/// `--` header/footer rules.
fn listing_rows(stdout: &str) -> impl Iterator<Item = &str> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("--"))
}

fn confirm_on_stdin(bucket: &str, file_count: usize) -> Result<bool> {
    print!(
        "\nWARNING: This will permanently delete {file_count} files from bucket {bucket:?}\n\
         Are you sure you want to continue? (yes/no): "
    );
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "yes" | "y"))
}

/// Walks the input directory and collects files larger than `limit` bytes.
/// Unreadable directories are skipped; the scan is advisory only.
fn oversized_files(dir: &Path, limit: u64) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return found,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            found.extend(oversized_files(&path, limit));
        } else if let Ok(meta) = path.metadata() {
            if meta.len() > limit {
                found.push(path);
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn listing_rows_skips_blank_lines_and_rules() {
        let listing = "--------\nfile_a.txt\n\nfile_b.txt\n--------\n";
        let rows: Vec<_> = listing_rows(listing).collect();
        assert_eq!(rows, vec!["file_a.txt", "file_b.txt"]);
    }

    #[test]
    fn oversized_files_finds_large_files_in_nested_directories() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("small.bin"), [0u8; 4]).unwrap();
        fs::write(dir.path().join("large.bin"), [0u8; 32]).unwrap();
        let nested = dir.path().join("nested");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("also_large.bin"), [0u8; 64]).unwrap();

        let mut found = oversized_files(dir.path(), 16);
        found.sort();
        assert_eq!(
            found,
            vec![dir.path().join("large.bin"), nested.join("also_large.bin")]
        );
    }

    #[test]
    fn oversized_files_is_empty_for_a_missing_directory() {
        assert!(oversized_files(Path::new("/nonexistent/input"), 1).is_empty());
    }
}
