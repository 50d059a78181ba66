//! Public download URL construction for bucket objects.
//!
//! B2 serves public downloads from a per-account node, e.g.
//! `https://f003.backblazeb2.com`. The node label is read from the
//! `downloadUrl` field of `b2 account get` output; when that is missing or
//! malformed we degrade to a fixed default rather than fail link generation.
//! The resolution records whether the fallback was used so wrong URLs can be
//! traced back to a failed lookup.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

/// Node label used when the account metadata gives us nothing better. May
/// produce wrong URLs for buckets served from another node.
pub const DEFAULT_ENDPOINT: &str = "f003";

/// Domain that serves public file downloads.
pub const DOWNLOAD_DOMAIN: &str = "backblazeb2.com";

/// The endpoint token plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointResolution {
    pub token: String,
    /// True when the default was used because the metadata lookup failed.
    pub from_fallback: bool,
}

impl EndpointResolution {
    fn fallback() -> Self {
        Self {
            token: DEFAULT_ENDPOINT.to_string(),
            from_fallback: true,
        }
    }
}

fn host_label_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^https?://([^./]+)\.").expect("valid host pattern"))
}

/// Extracts the download node label from account metadata JSON, e.g. `f003`
/// from `{"downloadUrl": "https://f003.backblazeb2.com"}`.
///
/// `account_info` is the captured stdout of `b2 account get`, or `None` when
/// that lookup already failed. Never errors: any missing field, parse failure
/// or unexpected URL shape degrades to [`DEFAULT_ENDPOINT`].
pub fn resolve_download_endpoint(account_info: Option<&str>) -> EndpointResolution {
    let Some(raw) = account_info else {
        warn!(default = DEFAULT_ENDPOINT, "No account metadata available, using default download endpoint");
        return EndpointResolution::fallback();
    };
    let doc: Value = match serde_json::from_str(raw) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(error = %e, default = DEFAULT_ENDPOINT, "Account metadata is not valid JSON, using default download endpoint");
            return EndpointResolution::fallback();
        }
    };
    let Some(url) = doc.get("downloadUrl").and_then(Value::as_str) else {
        warn!(default = DEFAULT_ENDPOINT, "Account metadata has no downloadUrl field, using default download endpoint");
        return EndpointResolution::fallback();
    };
    match host_label_pattern().captures(url) {
        Some(caps) => {
            let token = caps[1].to_string();
            debug!(endpoint = %token, "Resolved download endpoint from account metadata");
            EndpointResolution {
                token,
                from_fallback: false,
            }
        }
        None => {
            warn!(download_url = %url, default = DEFAULT_ENDPOINT, "Unexpected downloadUrl shape, using default download endpoint");
            EndpointResolution::fallback()
        }
    }
}

/// Builds the public download URL for one object. The key is used verbatim;
/// the sync tool already reports it relative to the bucket root.
pub fn build_public_url(endpoint: &str, bucket: &str, key: &str) -> String {
    format!("https://{endpoint}.{DOWNLOAD_DOMAIN}/file/{bucket}/{key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_endpoint_from_download_url() {
        let resolved =
            resolve_download_endpoint(Some(r#"{"downloadUrl": "https://f003.example.com"}"#));
        assert_eq!(resolved.token, "f003");
        assert!(!resolved.from_fallback);
    }

    #[test]
    fn resolves_other_node_labels() {
        let resolved =
            resolve_download_endpoint(Some(r#"{"downloadUrl": "https://f001.backblazeb2.com"}"#));
        assert_eq!(resolved.token, "f001");
    }

    #[test]
    fn falls_back_when_metadata_is_absent() {
        let resolved = resolve_download_endpoint(None);
        assert_eq!(resolved.token, DEFAULT_ENDPOINT);
        assert!(resolved.from_fallback);
    }

    #[test]
    fn falls_back_on_malformed_json() {
        let resolved = resolve_download_endpoint(Some("not json at all"));
        assert_eq!(resolved.token, DEFAULT_ENDPOINT);
        assert!(resolved.from_fallback);
    }

    #[test]
    fn falls_back_when_field_is_missing_or_odd() {
        assert!(resolve_download_endpoint(Some(r#"{"accountId": "abc"}"#)).from_fallback);
        assert!(resolve_download_endpoint(Some(r#"{"downloadUrl": 42}"#)).from_fallback);
        assert!(resolve_download_endpoint(Some(r#"{"downloadUrl": "ftp://x"}"#)).from_fallback);
    }

    #[test]
    fn builds_url_with_key_verbatim() {
        assert_eq!(
            build_public_url("f003", "fal-bucket", "nested/dir/cat.jpg"),
            "https://f003.backblazeb2.com/file/fal-bucket/nested/dir/cat.jpg"
        );
    }
}
