//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.pushrelay/config.json`) and environment.
//! Paths left unset default to files next to the config file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Host application identity used by the run-state probe.
    #[serde(default)]
    pub app: AppConfig,

    /// Where relay metadata (channel id, icon, relay target, job id) is read from.
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Durable relay queue settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Downstream relay targets registered at startup.
    #[serde(default)]
    pub relay: RelayTargetsConfig,
}

/// Host application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Process name matched against running processes (default "pushrelay").
    #[serde(default = "default_process_name")]
    pub process_name: String,

    /// procfs mount point (default "/proc").
    #[serde(default = "default_proc_root")]
    pub proc_root: PathBuf,
}

fn default_process_name() -> String {
    "pushrelay".to_string()
}

fn default_proc_root() -> PathBuf {
    PathBuf::from("/proc")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            process_name: default_process_name(),
            proc_root: default_proc_root(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataConfig {
    /// Metadata JSON file. Relative paths resolve against the config file's parent; default `metadata.json` there.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueConfig {
    /// Queue database file. Relative paths resolve against the config file's parent; default `relay-queue.redb` there.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Upper bound on a single enqueue call, in milliseconds (default 5000).
    #[serde(default = "default_enqueue_timeout_ms")]
    pub enqueue_timeout_ms: u64,
}

fn default_enqueue_timeout_ms() -> u64 {
    5000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            path: None,
            enqueue_timeout_ms: default_enqueue_timeout_ms(),
        }
    }
}

impl QueueConfig {
    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }
}

/// Relay target id -> target settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayTargetsConfig {
    #[serde(default)]
    pub targets: BTreeMap<String, RelayTargetConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayTargetConfig {
    /// File that delivered payloads are appended to (JSON lines).
    pub outbox: PathBuf,
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("PUSHRELAY_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".pushrelay").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, or the default path (or PUSHRELAY_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used (for resolving relative paths).
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

fn config_dir(config_path: &Path) -> &Path {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Absolute paths pass through; relative ones are joined onto the config file's parent.
pub fn resolve_relative(config_path: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        config_dir(config_path).join(p)
    }
}

pub fn resolve_metadata_path(config: &Config, config_path: &Path) -> PathBuf {
    match &config.metadata.path {
        Some(p) if !p.as_os_str().is_empty() => resolve_relative(config_path, p),
        _ => config_dir(config_path).join("metadata.json"),
    }
}

pub fn resolve_queue_path(config: &Config, config_path: &Path) -> PathBuf {
    match &config.queue.path {
        Some(p) if !p.as_os_str().is_empty() => resolve_relative(config_path, p),
        _ => config_dir(config_path).join("relay-queue.redb"),
    }
}
