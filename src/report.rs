//! Data model for one sync/clean run: parsed events, aggregate counters and
//! the immutable report handed to the artifact writer.
//!
//! # Major Types
//! - [`SyncEvent`]: one parsed line of `b2 sync` output
//! - [`RunSummary`]: per-action/per-status counters, recomputed fresh per run
//! - [`RunReport`]: everything one invocation produced, frozen before writing
//! - [`OperationError`]: an out-of-band failure not tied to a single file
//!
//! # Invariants
//! - `remote_key` is non-empty for every classified event; unparseable lines
//!   never reach this module.
//! - Action counts and the failed count are orthogonal: a failed line is
//!   classified as `action = error`, so it only contributes to `files_failed`.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// What the sync tool reported doing with one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Upload,
    Update,
    Delete,
    Skip,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Failed,
}

/// One parsed line of sync output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEvent {
    pub action: SyncAction,
    /// Source path on disk. Empty for deletes, which have no local side.
    pub local_path: String,
    /// Object path within the bucket.
    pub remote_key: String,
    pub status: SyncStatus,
    /// Instant the line was parsed, not when the tool acted.
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size_bytes: Option<u64>,
}

impl SyncEvent {
    /// True for events that placed an object in the bucket, i.e. the ones
    /// that get a public share link.
    pub fn is_successful_transfer(&self) -> bool {
        matches!(self.action, SyncAction::Upload | SyncAction::Update)
            && self.status == SyncStatus::Success
    }
}

/// Aggregate counters over one run's events. Derived, never stored on its own.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub files_uploaded: u64,
    pub files_updated: u64,
    pub files_deleted: u64,
    pub files_skipped: u64,
    pub files_failed: u64,
}

/// Counts events per action and per status in one pass. Order-independent;
/// an empty slice yields all zeroes.
pub fn aggregate(events: &[SyncEvent]) -> RunSummary {
    let mut summary = RunSummary::default();
    for event in events {
        match event.action {
            SyncAction::Upload => summary.files_uploaded += 1,
            SyncAction::Update => summary.files_updated += 1,
            SyncAction::Delete => summary.files_deleted += 1,
            SyncAction::Skip => summary.files_skipped += 1,
            SyncAction::Error => {}
        }
        if event.status == SyncStatus::Failed {
            summary.files_failed += 1;
        }
    }
    summary
}

/// A whole-operation failure, e.g. the sync subprocess exiting non-zero.
/// Recorded as data alongside the events, and rendered into `FAILURE.md`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationError {
    /// Identifier of what failed, e.g. `sync_operation` or a file path.
    pub source: String,
    /// Coarse classification, e.g. `B2SyncFailure`.
    pub kind: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl OperationError {
    pub fn new(source: impl Into<String>, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            kind: kind.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// The outcome of one sync or clean invocation. Built once the subprocess has
/// completed, then treated as immutable by the artifact writer.
#[derive(Debug)]
pub struct RunReport {
    /// `sync` or `clean`.
    pub operation: String,
    pub bucket_name: String,
    /// Wall-clock start of the run, also the source of the run-dir stamp.
    pub started: DateTime<Local>,
    pub execution_time: Duration,
    pub events: Vec<SyncEvent>,
    pub summary: RunSummary,
    pub errors: Vec<OperationError>,
    /// Caller-supplied metadata merged into the JSON log, e.g. `files_deleted`
    /// for clean runs. Keys here override summary counters of the same name.
    pub extra: Map<String, Value>,
}

impl RunReport {
    pub fn new(
        operation: impl Into<String>,
        bucket_name: impl Into<String>,
        started: DateTime<Local>,
        execution_time: Duration,
        events: Vec<SyncEvent>,
        errors: Vec<OperationError>,
    ) -> Self {
        let summary = aggregate(&events);
        Self {
            operation: operation.into(),
            bucket_name: bucket_name.into(),
            started,
            execution_time,
            events,
            summary,
            errors,
            extra: Map::new(),
        }
    }

    pub fn with_extra(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }
}
