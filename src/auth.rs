//! B2 authentication through the 1Password CLI.
//!
//! The application key never touches the config file: it is read from a
//! 1Password item (`op item get`) and handed straight to
//! `b2 account authorize`. An already-authorized CLI short-circuits the flow.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{error, info};

use crate::config::Config;
use crate::runner::{argv, ToolRunner};

/// Credentials pulled from the 1Password item.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub key_id: String,
    pub application_key: String,
    pub key_name: Option<String>,
    /// Bucket named on the item, overriding the configured default.
    pub bucket: Option<String>,
}

#[derive(Deserialize)]
struct OpItem {
    #[serde(default)]
    fields: Vec<OpField>,
}

#[derive(Deserialize)]
struct OpField {
    label: Option<String>,
    value: Option<String>,
}

/// Drives the authentication flow against the `op` and `b2` CLIs.
pub struct B2Auth<'a, R: ToolRunner> {
    config: &'a Config,
    runner: &'a R,
    credentials: Option<Credentials>,
}

impl<'a, R: ToolRunner> B2Auth<'a, R> {
    pub fn new(config: &'a Config, runner: &'a R) -> Self {
        Self {
            config,
            runner,
            credentials: None,
        }
    }

    async fn session_active(&self) -> bool {
        match self
            .runner
            .run(&self.config.paths.op_bin, &argv(&["account", "list"]))
            .await
        {
            Ok(out) => out.success(),
            Err(_) => false,
        }
    }

    /// Reads the B2 application key from the configured 1Password item.
    pub async fn fetch_credentials(&mut self) -> Result<&Credentials> {
        if !self.session_active().await {
            error!("1Password CLI session not active");
            bail!("1Password session required, run `op signin` first");
        }

        let item_name = &self.config.onepassword.item_name;
        let out = self
            .runner
            .run(
                &self.config.paths.op_bin,
                &argv(&["item", "get", item_name, "--format", "json"]),
            )
            .await?;
        if !out.success() {
            error!(item = %item_name, stderr = %out.stderr, "Failed to retrieve 1Password item");
            bail!("1Password item {item_name:?} not found");
        }

        let item: OpItem = serde_json::from_str(&out.stdout)
            .context("parsing 1Password item JSON")?;

        let mut key_id = None;
        let mut application_key = None;
        let mut key_name = None;
        let mut bucket = None;
        for field in item.fields {
            let Some(value) = field.value.filter(|v| !v.is_empty()) else {
                continue;
            };
            match field.label.as_deref() {
                Some("keyID") => key_id = Some(value),
                Some("applicationKey") => application_key = Some(value),
                Some("keyName") => key_name = Some(value),
                Some("Bucket") => bucket = Some(value),
                _ => {}
            }
        }

        let missing: Vec<&str> = [("keyID", &key_id), ("applicationKey", &application_key)]
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(label, _)| *label)
            .collect();
        if !missing.is_empty() {
            bail!("missing required fields in 1Password item {item_name:?}: {missing:?}");
        }

        info!(item = %item_name, "Retrieved B2 credentials from 1Password");
        self.credentials = Some(Credentials {
            key_id: key_id.unwrap_or_default(),
            application_key: application_key.unwrap_or_default(),
            key_name,
            bucket,
        });
        Ok(self.credentials.as_ref().expect("credentials just stored"))
    }

    /// True when the b2 CLI already has a valid authorization.
    pub async fn verify(&self) -> bool {
        match self
            .runner
            .run(&self.config.paths.b2_bin, &argv(&["account", "get"]))
            .await
        {
            Ok(out) => out.success(),
            Err(_) => false,
        }
    }

    /// Full flow: short-circuit if already authorized, otherwise fetch
    /// credentials and run `b2 account authorize`, then re-verify.
    pub async fn authorize(&mut self) -> Result<()> {
        info!("Starting B2 authentication flow");
        if self.verify().await {
            info!("Already authorized with B2");
            return Ok(());
        }

        self.fetch_credentials().await?;
        let creds = self.credentials.as_ref().expect("credentials fetched above");

        let out = self
            .runner
            .run(
                &self.config.paths.b2_bin,
                &argv(&[
                    "account",
                    "authorize",
                    &creds.key_id,
                    &creds.application_key,
                ]),
            )
            .await?;
        if !out.success() {
            error!(stderr = %out.stderr, "B2 authorization failed");
            bail!("b2 account authorize failed: {}", out.stderr.trim());
        }

        if !self.verify().await {
            bail!("B2 authorization did not verify after authorize");
        }
        info!("B2 authentication completed");
        Ok(())
    }

    /// Captured stdout of `b2 account get`, for download-endpoint resolution.
    /// Any failure is reported as `None`; the caller degrades to a default.
    pub async fn account_info(&self) -> Option<String> {
        match self
            .runner
            .run(&self.config.paths.b2_bin, &argv(&["account", "get"]))
            .await
        {
            Ok(out) if out.success() => Some(out.stdout),
            _ => None,
        }
    }

    /// Bucket named on the 1Password item if any, otherwise the configured one.
    pub fn bucket_name(&self) -> String {
        self.credentials
            .as_ref()
            .and_then(|c| c.bucket.clone())
            .unwrap_or_else(|| self.config.b2.bucket_name.clone())
    }
}
