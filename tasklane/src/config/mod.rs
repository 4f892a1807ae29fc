//! Configuration system for the `tasklane` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/tasklane/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::connectivity::DEFAULT_PROBE_INTERVAL;
use crate::remote::http::DEFAULT_TIMEOUT;
use crate::sync::SyncConfig;

/// Server the client talks to when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    remote: RemoteFileConfig,
    sync: SyncFileConfig,
    storage: StorageFileConfig,
}

/// `[remote]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RemoteFileConfig {
    base_url: Option<String>,
    request_timeout_secs: Option<u64>,
}

/// `[sync]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SyncFileConfig {
    interval_secs: Option<u64>,
    probe_interval_secs: Option<u64>,
    max_rejections: Option<u32>,
    event_buffer: Option<usize>,
}

/// `[storage]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StorageFileConfig {
    data_dir: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Remote --
    /// Base URL of the task server.
    pub base_url: String,
    /// Per-request timeout.
    pub request_timeout: Duration,

    // -- Sync --
    /// Sync engine and runner settings.
    pub sync: SyncConfig,
    /// Period between connectivity probes.
    pub probe_interval: Duration,

    // -- Storage --
    /// Directory holding the cache and queue snapshots.
    pub data_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: DEFAULT_TIMEOUT,
            sync: SyncConfig::default(),
            probe_interval: DEFAULT_PROBE_INTERVAL,
            data_dir: default_data_dir(),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            base_url: cli
                .server_url
                .clone()
                .or_else(|| file.remote.base_url.clone())
                .unwrap_or(defaults.base_url),
            request_timeout: cli
                .timeout_secs
                .or(file.remote.request_timeout_secs)
                .map_or(defaults.request_timeout, Duration::from_secs),
            sync: SyncConfig {
                interval: cli
                    .sync_interval_secs
                    .or(file.sync.interval_secs)
                    .map_or(defaults.sync.interval, period_from_secs),
                max_rejections: file
                    .sync
                    .max_rejections
                    .unwrap_or(defaults.sync.max_rejections)
                    .max(1),
                event_buffer: file
                    .sync
                    .event_buffer
                    .unwrap_or(defaults.sync.event_buffer),
            },
            probe_interval: file
                .sync
                .probe_interval_secs
                .map_or(defaults.probe_interval, period_from_secs),
            data_dir: cli
                .data_dir
                .clone()
                .or_else(|| file.storage.data_dir.clone())
                .unwrap_or(defaults.data_dir),
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Offline-first personal task manager")]
pub struct CliArgs {
    /// Base URL of the task server.
    #[arg(long, env = "TASKLANE_SERVER")]
    pub server_url: Option<String>,

    /// Path to config file (default: `~/.config/tasklane/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for local state (default: platform data dir).
    #[arg(long, env = "TASKLANE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Request timeout in seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Background sync period in seconds (used by `sync --watch`).
    #[arg(long)]
    pub sync_interval_secs: Option<u64>,

    /// Do not contact the server; only queue changes locally.
    #[arg(long)]
    pub offline: bool,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKLANE_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/tasklane.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// What to do (default: `list`).
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands of the `tasklane` binary.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Add a task.
    Add {
        /// Task title.
        title: String,
        /// Due date: RFC 3339, `YYYY-MM-DD`, or relative (`+2h`, `+3d`).
        #[arg(short, long, default_value = "+1d")]
        due: String,
        /// Priority: low, medium, high.
        #[arg(short, long, default_value = "medium")]
        priority: String,
        /// Longer description.
        #[arg(long)]
        description: Option<String>,
        /// Category label.
        #[arg(long)]
        category: Option<String>,
    },
    /// Show tasks in ranked order.
    List {
        /// Include completed tasks.
        #[arg(short, long)]
        all: bool,
    },
    /// Show task statistics.
    Stats,
    /// Mark a task completed.
    Done {
        /// Task id or unique id prefix.
        id: String,
    },
    /// Move a completed task back to pending.
    Reopen {
        /// Task id or unique id prefix.
        id: String,
    },
    /// Change fields of a task.
    Edit {
        /// Task id or unique id prefix.
        id: String,
        /// New title.
        #[arg(long)]
        title: Option<String>,
        /// New description.
        #[arg(long)]
        description: Option<String>,
        /// New priority.
        #[arg(short, long)]
        priority: Option<String>,
        /// New status: pending, in_progress, completed.
        #[arg(short, long)]
        status: Option<String>,
        /// New category.
        #[arg(long)]
        category: Option<String>,
        /// New due date.
        #[arg(short, long)]
        due: Option<String>,
    },
    /// Delete a task.
    Rm {
        /// Task id or unique id prefix.
        id: String,
    },
    /// Replay queued changes now.
    Sync {
        /// Keep running in the background until interrupted.
        #[arg(short, long)]
        watch: bool,
    },
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Timer periods of zero are raised to one second.
const fn period_from_secs(secs: u64) -> Duration {
    Duration::from_secs(if secs == 0 { 1 } else { secs })
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir().map_or_else(|| PathBuf::from(".tasklane"), |d| d.join("tasklane"))
}

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("tasklane").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
