//! Configuration for the sync tool.
//!
//! All knobs live in one YAML file and every field has a default, so an empty
//! or missing file still yields a usable configuration. The loaded value is
//! passed explicitly into the components that need it; there is no global.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub b2: B2Section,
    pub onepassword: OnePasswordSection,
    pub processing: ProcessingSection,
    pub paths: PathsSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct B2Section {
    /// Bucket to mirror into, unless the 1Password item names one.
    pub bucket_name: String,
    pub sync_timeout_secs: u64,
    pub max_file_size_gb: u64,
}

impl Default for B2Section {
    fn default() -> Self {
        Self {
            bucket_name: "fal-bucket".to_string(),
            sync_timeout_secs: 1800,
            max_file_size_gb: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OnePasswordSection {
    /// 1Password item holding the B2 application key.
    pub item_name: String,
}

impl Default for OnePasswordSection {
    fn default() -> Self {
        Self {
            item_name: "B2 Application Key Fal".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingSection {
    /// Regexes passed to the sync tool as `--exclude-regex`.
    pub exclude_patterns: Vec<String>,
}

impl Default for ProcessingSection {
    fn default() -> Self {
        Self {
            exclude_patterns: vec![r".*\.DS_Store".to_string(), r".*Thumbs\.db".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    /// Local directory mirrored into the bucket.
    pub input_dir: PathBuf,
    /// Root under which per-run output directories are created.
    pub output_dir: PathBuf,
    /// The b2 CLI binary, name or absolute path.
    pub b2_bin: String,
    /// The 1Password CLI binary, name or absolute path.
    pub op_bin: String,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("input"),
            output_dir: PathBuf::from("output"),
            b2_bin: "b2".to_string(),
            op_bin: "op".to_string(),
        }
    }
}

impl Config {
    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.b2.sync_timeout_secs)
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.b2.max_file_size_gb * 1024 * 1024 * 1024
    }

    /// Checks that the external CLI tools are installed and, when an input
    /// directory is required, that it exists. Run before any operation so a
    /// missing tool fails with a clear message instead of surfacing later as
    /// a subprocess error.
    pub fn validate_environment(&self, require_input_dir: bool) -> Result<()> {
        let mut problems = Vec::new();
        if !tool_available(&self.paths.b2_bin) {
            problems.push(format!(
                "b2 CLI tool {:?} not found, install it first",
                self.paths.b2_bin
            ));
        }
        if !tool_available(&self.paths.op_bin) {
            problems.push(format!(
                "1Password CLI tool {:?} not found, install it first",
                self.paths.op_bin
            ));
        }
        if require_input_dir && !self.paths.input_dir.is_dir() {
            problems.push(format!(
                "input directory {} does not exist",
                self.paths.input_dir.display()
            ));
        }
        if !problems.is_empty() {
            for problem in &problems {
                error!(problem = %problem, "Environment validation failed");
            }
            bail!("environment validation failed: {}", problems.join("; "));
        }
        Ok(())
    }

    pub fn trace_loaded(&self) {
        info!(
            bucket = %self.b2.bucket_name,
            input_dir = %self.paths.input_dir.display(),
            output_dir = %self.paths.output_dir.display(),
            "Loaded Config"
        );
        debug!(?self, "Config loaded (full debug)");
    }
}

/// True when `bin` names an existing file, either as a path or somewhere on
/// `PATH`.
fn tool_available(bin: &str) -> bool {
    let path = Path::new(bin);
    if path.components().count() > 1 {
        return path.is_file();
    }
    env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).any(|dir| dir.join(bin).is_file()))
        .unwrap_or(false)
}
