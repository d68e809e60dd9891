//! Configuration system for the `TaskDeck` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskdeck/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use taskdeck_proto::UserId;
use taskdeck_proto::task::MAX_TASK_TITLE_LENGTH;

use crate::cli::Command;
use crate::storage::FileStorage;

/// File name of the JSON document store inside the data directory.
pub const STORE_FILE_NAME: &str = "store.json";

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

    /// No data directory was configured and the platform has none.
    #[error("could not determine data directory (set --data-dir or [session] data_dir)")]
    NoDataDir,
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    session: SessionFileConfig,
    pomodoro: PomodoroFileConfig,
    ui: UiFileConfig,
}

/// `[session]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SessionFileConfig {
    user_id: Option<String>,
    data_dir: Option<PathBuf>,
}

/// `[pomodoro]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct PomodoroFileConfig {
    work_minutes: Option<u32>,
    break_minutes: Option<u32>,
    tick_millis: Option<u64>,
}

/// `[ui]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct UiFileConfig {
    date_format: Option<String>,
    max_task_title_len: Option<usize>,
    prefer_dark: Option<bool>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Session --
    /// Signed-in user the commands act for.
    pub user_id: Option<UserId>,
    /// Directory for the document store and local state. `None` means the
    /// platform data directory.
    pub data_dir: Option<PathBuf>,

    // -- Pomodoro --
    /// Work session length applied at startup, if configured.
    pub work_minutes: Option<u32>,
    /// Break session length applied at startup, if configured.
    pub break_minutes: Option<u32>,
    /// Interval between timer ticks.
    pub tick: Duration,

    // -- UI --
    /// Date display format string (chrono).
    pub date_format: String,
    /// Maximum task title length in characters.
    pub max_task_title_len: usize,
    /// Stand-in for the system dark-mode preference.
    pub prefer_dark: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_id: None,
            data_dir: None,
            work_minutes: None,
            break_minutes: None,
            tick: Duration::from_secs(1),
            date_format: "%Y-%m-%d".to_string(),
            max_task_title_len: MAX_TASK_TITLE_LENGTH,
            prefer_dark: false,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an
    /// error. Otherwise the default path (`~/.config/taskdeck/config.toml`)
    /// is tried and silently ignored if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
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
            user_id: cli
                .user
                .clone()
                .or_else(|| file.session.user_id.clone())
                .filter(|u| !u.trim().is_empty())
                .map(UserId::new),
            data_dir: cli
                .data_dir
                .clone()
                .or_else(|| file.session.data_dir.clone()),
            work_minutes: file.pomodoro.work_minutes,
            break_minutes: file.pomodoro.break_minutes,
            tick: file
                .pomodoro
                .tick_millis
                .filter(|ms| *ms > 0)
                .map_or(defaults.tick, Duration::from_millis),
            date_format: cli
                .date_format
                .clone()
                .or_else(|| file.ui.date_format.clone())
                .unwrap_or(defaults.date_format),
            max_task_title_len: file
                .ui
                .max_task_title_len
                .unwrap_or(defaults.max_task_title_len),
            prefer_dark: file.ui.prefer_dark.unwrap_or(defaults.prefer_dark),
        }
    }

    /// The configured data directory, or the platform default.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoDataDir`] when neither is available.
    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        self.data_dir
            .clone()
            .or_else(FileStorage::default_dir)
            .ok_or(ConfigError::NoDataDir)
    }

    /// Path of the JSON document store.
    ///
    /// # Errors
    ///
    /// Same as [`data_dir`](Self::data_dir).
    pub fn store_file(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.data_dir()?.join(STORE_FILE_NAME))
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Tasks, habits and a Pomodoro timer")]
pub struct CliArgs {
    /// User id the commands act for.
    #[arg(short, long, env = "TASKDECK_USER")]
    pub user: Option<String>,

    /// Directory for the document store and local state.
    #[arg(long, env = "TASKDECK_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Path to config file (default: `~/.config/taskdeck/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Date display format (chrono format string).
    #[arg(long)]
    pub date_format: Option<String>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKDECK_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/taskdeck.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// What to do. Defaults to the board overview.
    #[command(subcommand)]
    pub command: Option<Command>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

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
        config_dir.join("taskdeck").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
