//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub submit: SubmitConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which list store backs the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// JSON files on local disk.
    #[default]
    File,
    /// Process memory, lost on exit.
    Memory,
}

/// Store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Root directory of the file store. `None` means the default location.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    /// Resolved store directory.
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(default_store_path)
    }
}

/// Failure ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// List used when no failure queue is named.
    #[serde(default = "default_queue")]
    pub default_queue: String,

    /// Set holding every derived failure queue name.
    #[serde(default = "default_registry_key")]
    pub registry_key: String,

    /// Appended to an originating queue name to derive its failure queue.
    #[serde(default = "default_failure_suffix")]
    pub failure_suffix: String,

    /// Backtrace frames from the first one containing this marker onward are dropped.
    #[serde(default = "default_backtrace_boundary")]
    pub backtrace_boundary: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_queue: default_queue(),
            registry_key: default_registry_key(),
            failure_suffix: default_failure_suffix(),
            backtrace_boundary: default_backtrace_boundary(),
        }
    }
}

/// Job resubmission configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitConfig {
    /// Prefix of the list a resubmitted job is pushed onto.
    #[serde(default = "default_queue_prefix")]
    pub queue_prefix: String,

    /// Set of known job queues.
    #[serde(default = "default_queues_key")]
    pub queues_key: String,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            queue_prefix: default_queue_prefix(),
            queues_key: default_queues_key(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Also write logs to rolling files.
    #[serde(default)]
    pub file: bool,

    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: false,
            directory: None,
        }
    }
}

impl LoggingConfig {
    /// Resolved log directory.
    pub fn resolved_directory(&self) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(|| failbox_dir().join("logs"))
    }
}

/// The `~/.failbox` directory.
pub fn failbox_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".failbox"))
        .unwrap_or_else(|| PathBuf::from(".failbox"))
}

fn default_store_path() -> PathBuf {
    failbox_dir().join("store")
}

fn default_queue() -> String {
    "failed".to_string()
}

fn default_registry_key() -> String {
    "failed_queues".to_string()
}

fn default_failure_suffix() -> String {
    "_failed".to_string()
}

fn default_backtrace_boundary() -> String {
    "job::perform".to_string()
}

fn default_queue_prefix() -> String {
    "queue:".to_string()
}

fn default_queues_key() -> String {
    "queues".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}
