//! Pattern-matching for `b2 sync` output lines.
//!
//! The sync tool reports one action per line, e.g.
//! `upload: input/cat.jpg -> b2://fal-bucket/cat.jpg`. This module turns each
//! recognized line into a [`SyncEvent`]; anything else (banners, progress
//! bars, blank lines) yields `None` and is dropped without complaint. The
//! bucket name embedded in the line is matched but ignored, since the caller
//! already knows which bucket it ran against.

use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;

use crate::report::{SyncAction, SyncEvent, SyncStatus};

static PATTERNS: OnceLock<Vec<(SyncAction, Regex)>> = OnceLock::new();

/// The five recognized line shapes, in priority order. The local-path capture
/// is non-greedy so paths with spaces still split at the ` -> ` arrow.
fn patterns() -> &'static [(SyncAction, Regex)] {
    PATTERNS.get_or_init(|| {
        let transfer =
            |verb: &str| format!(r"^{verb}:\s+(.+?)\s+->\s+[a-z0-9+.-]+://[^/]+/(.+)$");
        let compile = |pattern: &str| Regex::new(pattern).expect("valid sync-line pattern");
        vec![
            (SyncAction::Upload, compile(&transfer("upload"))),
            (SyncAction::Update, compile(&transfer("update"))),
            (
                SyncAction::Delete,
                compile(r"^delete:\s+[a-z0-9+.-]+://[^/]+/(.+)$"),
            ),
            (SyncAction::Skip, compile(&transfer("skip"))),
            (SyncAction::Error, compile(&transfer("error"))),
        ]
    })
}

/// Classifies one line of sync output. Returns `None` for anything that is
/// not one of the five known shapes.
pub fn classify(line: &str) -> Option<SyncEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    for (action, pattern) in patterns() {
        let Some(caps) = pattern.captures(line) else {
            continue;
        };
        // Deletes carry no local side, only the remote key.
        let (local_path, remote_key) = if *action == SyncAction::Delete {
            (String::new(), caps[1].to_string())
        } else {
            (caps[1].to_string(), caps[2].to_string())
        };
        let failed = *action == SyncAction::Error;
        return Some(SyncEvent {
            action: *action,
            local_path,
            remote_key,
            status: if failed {
                SyncStatus::Failed
            } else {
                SyncStatus::Success
            },
            timestamp: Utc::now(),
            error_message: failed.then(|| line.to_string()),
            file_size_bytes: None,
        });
    }
    None
}

/// Classifies every line of a captured stdout, dropping the unrecognized ones.
pub fn parse_sync_output(output: &str) -> Vec<SyncEvent> {
    output.lines().filter_map(classify).collect()
}
