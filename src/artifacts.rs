//! Durable per-run artifacts: the timestamped run directory and everything
//! written into it.
//!
//! Each invocation owns exactly one `YYYYMMDD_HHMMSS` directory under the
//! configured output root. Into it go:
//! - `<stamp>_<operation>_log.json` — the structured run log
//! - one `<stem>.txt` per uploaded/updated object, holding its public URL
//! - `FAILURE.md`, only when out-of-band errors occurred
//!
//! Write failures are the one hard error class here: a missing or partial run
//! log cannot be papered over, so every `fs` failure propagates with the
//! artifact kind and target path attached.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::links::{build_public_url, EndpointResolution};
use crate::report::{OperationError, RunReport, SyncAction, SyncEvent};

/// One run's output directory, named by the run's start timestamp.
#[derive(Debug)]
pub struct RunDir {
    path: PathBuf,
    stamp: String,
}

#[derive(Serialize)]
struct LogDocument<'a> {
    run_metadata: RunMetadata<'a>,
    files_processed: &'a [SyncEvent],
    errors: &'a [OperationError],
}

#[derive(Serialize)]
struct RunMetadata<'a> {
    timestamp: String,
    operation: &'a str,
    bucket_name: &'a str,
    total_files: usize,
    execution_time_seconds: f64,
    #[serde(flatten)]
    counters: Map<String, Value>,
}

impl RunDir {
    /// Creates `base/YYYYMMDD_HHMMSS/` from the run's start time.
    pub fn create(base: &Path, started: DateTime<Local>) -> Result<Self> {
        let stamp = started.format("%Y%m%d_%H%M%S").to_string();
        let path = base.join(&stamp);
        fs::create_dir_all(&path)
            .with_context(|| format!("creating run directory {}", path.display()))?;
        info!(path = %path.display(), "Created run directory");
        Ok(Self { path, stamp })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stamp(&self) -> &str {
        &self.stamp
    }

    /// Serializes the whole report as one JSON document. The file name reuses
    /// the run's start stamp, so repeated runs land in distinct files even if
    /// they were somehow pointed at the same directory.
    pub fn write_json_log(&self, report: &RunReport) -> Result<PathBuf> {
        // Summary counters first, then caller extras; an extra with the same
        // name (e.g. files_deleted on clean runs) wins.
        let mut counters = match serde_json::to_value(report.summary)
            .context("serializing run summary")?
        {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        counters.extend(report.extra.clone());

        let doc = LogDocument {
            run_metadata: RunMetadata {
                timestamp: report.started.to_rfc3339(),
                operation: &report.operation,
                bucket_name: &report.bucket_name,
                total_files: report.events.len(),
                execution_time_seconds: report.execution_time.as_secs_f64(),
                counters,
            },
            files_processed: &report.events,
            errors: &report.errors,
        };

        let path = self
            .path
            .join(format!("{}_{}_log.json", self.stamp, report.operation));
        let body = serde_json::to_string_pretty(&doc).context("serializing run log")?;
        fs::write(&path, body)
            .with_context(|| format!("writing JSON run log {}", path.display()))?;
        info!(path = %path.display(), "Generated JSON run log");
        Ok(path)
    }

    /// Writes one `<stem>.txt` per successfully uploaded/updated object, each
    /// containing exactly the object's public URL.
    ///
    /// Two keys sharing a stem after extension-stripping overwrite each other;
    /// the collision is logged rather than resolved.
    pub fn write_link_artifacts(
        &self,
        events: &[SyncEvent],
        bucket: &str,
        endpoint: &EndpointResolution,
    ) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        let mut seen = HashSet::new();
        for event in events.iter().filter(|e| e.is_successful_transfer()) {
            let Some(stem) = Path::new(&event.remote_key)
                .file_stem()
                .and_then(|s| s.to_str())
            else {
                warn!(key = %event.remote_key, "Object key has no usable file stem, skipping link file");
                continue;
            };
            if !seen.insert(stem.to_string()) {
                warn!(stem = %stem, key = %event.remote_key, "Link file stem collision, overwriting earlier link");
            }
            let path = self.path.join(format!("{stem}.txt"));
            let url = build_public_url(&endpoint.token, bucket, &event.remote_key);
            fs::write(&path, &url)
                .with_context(|| format!("writing link file {}", path.display()))?;
            debug!(path = %path.display(), "Created link file");
            written.push(path);
        }
        info!(
            count = written.len(),
            fallback_endpoint = endpoint.from_fallback,
            path = %self.path.display(),
            "Generated link files"
        );
        Ok(written)
    }

    /// Renders `FAILURE.md` when out-of-band errors occurred. With an empty
    /// error list nothing is written and `None` is returned: the report's
    /// absence is what marks a clean run.
    pub fn write_failure_report(
        &self,
        errors: &[OperationError],
        operation: &str,
    ) -> Result<Option<PathBuf>> {
        if errors.is_empty() {
            return Ok(None);
        }
        let path = self.path.join("FAILURE.md");
        let mut body = String::from("# Sync Failure Report\n");
        body.push_str(&format!(
            "**Date**: {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        ));
        body.push_str(&format!("**Operation**: {operation}\n\n"));
        body.push_str("## Summary\n");
        body.push_str(&format!("- **Failed Files**: {}\n\n", errors.len()));
        body.push_str("## Failed Files\n");
        for error in errors {
            body.push_str(&format!("### {}\n", error.source));
            body.push_str(&format!("- **Error**: {}\n", error.message));
            body.push_str(&format!("- **Type**: {}\n\n", error.kind));
        }
        body.push_str("## Next Steps\n");
        body.push_str("1. Fix the identified issues with failed files\n");
        body.push_str("2. Re-run the sync to pick up the corrections\n");

        fs::write(&path, body)
            .with_context(|| format!("writing failure report {}", path.display()))?;
        warn!(path = %path.display(), failures = errors.len(), "Generated failure report");
        Ok(Some(path))
    }
}

/// Fills in `file_size_bytes` for uploaded/updated events whose local file
/// still exists. Called after parsing, before the report is frozen.
pub fn attach_file_sizes(events: &mut [SyncEvent]) {
    for event in events {
        let sized = matches!(event.action, SyncAction::Upload | SyncAction::Update);
        if !sized || event.local_path.is_empty() {
            continue;
        }
        match fs::metadata(&event.local_path) {
            Ok(meta) => event.file_size_bytes = Some(meta.len()),
            Err(e) => {
                debug!(path = %event.local_path, error = %e, "Could not stat local file for size")
            }
        }
    }
}
