//! Configuration for reclaim paths and worker behavior.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (RECLAIM_HOME)
//! 2. Config file (.reclaim/config.yaml)
//! 3. Defaults (~/.reclaim)
//!
//! Config file discovery searches the current directory and parents for
//! .reclaim/config.yaml. Settings are loaded once at startup and passed by
//! value to the components that need them; there is no global singleton.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::backoff::BackoffPolicy;
use crate::core::quarantine::QuarantinePolicy;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub worker: WorkerSettings,
    #[serde(default)]
    pub submission: Option<SubmissionSettings>,
    #[serde(default)]
    pub quarantine: QuarantinePolicy,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory (relative to the config file)
    pub home: Option<String>,
}

/// Filing worker knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    /// Claims/cases processed per cycle
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Claim amounts above this hold for operator approval
    #[serde(default = "default_approval_threshold")]
    pub approval_threshold: f64,

    /// Per-submission timeout; elapsed timeouts count as transient failures
    #[serde(default = "default_submission_timeout")]
    pub submission_timeout_seconds: u64,

    /// Concurrent filings across distinct signatures
    #[serde(default = "default_max_parallel")]
    pub max_parallel_signatures: usize,

    #[serde(default)]
    pub backoff: BackoffPolicy,
}

fn default_batch_size() -> usize {
    100
}
fn default_approval_threshold() -> f64 {
    500.0
}
fn default_submission_timeout() -> u64 {
    30
}
fn default_max_parallel() -> usize {
    4
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            approval_threshold: default_approval_threshold(),
            submission_timeout_seconds: default_submission_timeout(),
            max_parallel_signatures: default_max_parallel(),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Marketplace API endpoint and credentials
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionSettings {
    pub endpoint: String,
    pub api_token: String,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct Settings {
    /// Absolute path to reclaim home (engine state)
    pub home: PathBuf,
    /// Path to the config file, if one was found
    pub config_file: Option<PathBuf>,
    pub worker: WorkerSettings,
    pub submission: Option<SubmissionSettings>,
    pub quarantine: QuarantinePolicy,
}

impl Settings {
    /// Audit ledger directory ($RECLAIM_HOME/ledger)
    pub fn ledger_dir(&self) -> PathBuf {
        self.home.join("ledger")
    }

    /// SQLite database path ($RECLAIM_HOME/reclaim.db)
    pub fn db_path(&self) -> PathBuf {
        self.home.join("reclaim.db")
    }

    /// Load configuration from all sources
    pub fn load() -> Result<Self> {
        let default_home = dirs::home_dir()
            .context("Failed to determine home directory")?
            .join(".reclaim");

        let config_file = find_config_file();

        let parsed = match &config_file {
            Some(path) => load_config_file(path)?,
            None => ConfigFile::default(),
        };

        let home = if let Ok(env_home) = std::env::var("RECLAIM_HOME") {
            PathBuf::from(env_home)
        } else if let (Some(path), Some(home)) = (&config_file, &parsed.paths.home) {
            let reclaim_dir = path.parent().unwrap_or(Path::new("."));
            resolve_path(reclaim_dir, home)
        } else {
            default_home
        };

        Ok(Self {
            home,
            config_file,
            worker: parsed.worker,
            submission: parsed.submission,
            quarantine: parsed.quarantine,
        })
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".reclaim").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path_str)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}
