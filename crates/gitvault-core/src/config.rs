use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{GitvaultError, GitvaultResult};

/// Environment variable holding the repository passphrase
pub const PASSPHRASE_ENV: &str = "GITVAULT_PASSPHRASE";

/// Top-level configuration (loaded from gitvault.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GitvaultConfig {
    pub repo: RepoConfig,
    pub daemon: DaemonConfig,
    /// File containing the passphrase (first line is used)
    pub passphrase_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    /// Version-controlled repository holding the encrypted tree
    pub path: PathBuf,
    /// Plaintext directory tree to back up
    pub watch_path: PathBuf,
    /// Remote to push to after each commit (no push when unset)
    pub remote_url: Option<String>,
    /// Remote name (default: origin)
    pub remote_name: String,
    /// Branch to push (default: main)
    pub branch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
    /// Quiet period before a batch of changes is processed (default: 2000)
    pub quiescence_ms: u64,
    /// Reconcile the watch root against the ledger at startup (default: true)
    pub scan_on_start: bool,
    /// Message used for every automated commit
    pub commit_message: String,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            watch_path: PathBuf::new(),
            remote_url: None,
            remote_name: "origin".into(),
            branch: "main".into(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_format: "text".into(),
            quiescence_ms: 2000,
            scan_on_start: true,
            commit_message: "Automated encrypted backup".into(),
        }
    }
}

impl GitvaultConfig {
    /// Load from a TOML file, falling back to defaults when it is missing,
    /// then apply `GITVAULT_*` environment overrides.
    pub fn load(path: &Path) -> GitvaultResult<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content).map_err(|e| {
                GitvaultError::Config(format!("parsing config {}: {e}", path.display()))
            })?
        } else {
            tracing::warn!(
                "config file not found: {}  (using defaults and environment)",
                path.display()
            );
            GitvaultConfig::default()
        };
        config.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Override repository settings from the environment.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("GITVAULT_REPO_PATH").filter(|v| !v.is_empty()) {
            self.repo.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("GITVAULT_WATCH_PATH").filter(|v| !v.is_empty()) {
            self.repo.watch_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("GITVAULT_REMOTE_URL").filter(|v| !v.is_empty()) {
            self.repo.remote_url = Some(v);
        }
    }

    /// Reject configurations the daemon cannot start with.
    pub fn validate(&self) -> GitvaultResult<()> {
        if self.repo.path.as_os_str().is_empty() {
            return Err(GitvaultError::Config("no repository path provided".into()));
        }
        if self.repo.watch_path.as_os_str().is_empty() {
            return Err(GitvaultError::Config("no watch path provided".into()));
        }
        if self.repo.watch_path.starts_with(&self.repo.path) {
            return Err(GitvaultError::Config(format!(
                "watch path {} must not be inside the repository {}",
                self.repo.watch_path.display(),
                self.repo.path.display()
            )));
        }
        if self.daemon.quiescence_ms == 0 {
            return Err(GitvaultError::Config("quiescence_ms must be positive".into()));
        }
        Ok(())
    }

    /// Resolve the passphrase: environment first, then `passphrase_file`.
    ///
    /// Returns `Ok(None)` when neither source is configured so interactive
    /// callers can prompt.
    pub fn resolve_passphrase(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> GitvaultResult<Option<SecretString>> {
        if let Some(pw) = lookup(PASSPHRASE_ENV).filter(|v| !v.is_empty()) {
            return Ok(Some(SecretString::from(pw)));
        }
        if let Some(ref file) = self.passphrase_file {
            let content = std::fs::read_to_string(file).map_err(|e| {
                GitvaultError::Config(format!("reading passphrase file {}: {e}", file.display()))
            })?;
            let pw = content.lines().next().unwrap_or("").to_string();
            if pw.is_empty() {
                return Err(GitvaultError::Config(format!(
                    "passphrase file {} is empty",
                    file.display()
                )));
            }
            return Ok(Some(SecretString::from(pw)));
        }
        Ok(None)
    }
}
