//! Client settings
//!
//! Values come from built-in defaults, then `config.toml` under the user's
//! config directory (or `JUSTSHOP_CONFIG`), then `JUSTSHOP_*` variables.
//!
//! The sync engine never holds on to a `Config` value directly. It reads
//! through a [`SettingsProvider`] on every request, so credentials and the
//! server URL can change while the engine runs.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::sync::ConflictPolicy;

/// Read `JUSTSHOP_<key>`
fn env_var(key: &str) -> Option<String> {
    std::env::var(format!("JUSTSHOP_{}", key)).ok()
}

/// Server used when nothing else is configured
pub const DEFAULT_SERVER_URL: &str = "https://justshop.eloque.nz";

/// Lower bound for the fallback poll interval
pub const MIN_SYNC_INTERVAL_SECS: u64 = 1;

/// Everything the client reads from `config.toml`
///
/// Missing keys fall back to their defaults, so an empty file is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for data storage (SQLite db, default log file)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Base URL of the list server, without the `/v1` suffix
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Basic auth user name (empty = anonymous)
    #[serde(default)]
    pub username: String,

    /// Basic auth password (empty = anonymous)
    #[serde(default)]
    pub password: String,

    /// Fallback poll interval while the push channel is down
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,

    /// First reconnect delay after the push channel drops
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,

    /// Upper bound for the reconnect delay
    #[serde(default = "default_max_reconnect_delay")]
    pub max_reconnect_delay_secs: u64,

    /// Endpoint (relative to `/v1`) used for "delete all"
    #[serde(default = "default_delete_all_endpoint")]
    pub delete_all_endpoint: String,

    /// How inbound snapshots treat newer local rows
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,

    /// Log file for the CLI (stderr when unset)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            server_url: default_server_url(),
            username: String::new(),
            password: String::new(),
            sync_interval_secs: default_sync_interval(),
            reconnect_delay_secs: default_reconnect_delay(),
            max_reconnect_delay_secs: default_max_reconnect_delay(),
            delete_all_endpoint: default_delete_all_endpoint(),
            conflict_policy: ConflictPolicy::default(),
            log_file: None,
        }
    }
}

impl Config {
    /// Defaults, overlaid by the config file, overlaid by the environment
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Like [`Config::load`], but `--config` replaces the default file
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load `path` (defaults when it does not exist) and create `data_dir`
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = Self::from_file(path)?.unwrap_or_default();
        config.apply_env_overrides();
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("Cannot create data directory {:?}", config.data_dir))?;
        Ok(config)
    }

    /// Parse TOML and apply the environment, without touching the disk
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(toml_content).context("Invalid config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let text =
            std::fs::read_to_string(path).with_context(|| format!("Cannot read {:?}", path))?;
        let config = toml::from_str(&text).with_context(|| format!("Invalid TOML in {:?}", path))?;
        Ok(Some(config))
    }

    fn apply_env_overrides(&mut self) {
        if let Some(dir) = env_var("DATA_DIR") {
            self.data_dir = dir.into();
        }
        if let Some(url) = env_var("SERVER_URL").filter(|url| !url.is_empty()) {
            self.server_url = url;
        }
        if let Some(user) = env_var("USERNAME") {
            self.username = user;
        }
        if let Some(password) = env_var("PASSWORD") {
            self.password = password;
        }
        if let Some(raw) = env_var("SYNC_INTERVAL") {
            match raw.parse() {
                Ok(secs) => self.sync_interval_secs = secs,
                Err(_) => tracing::warn!(value = %raw, "Ignoring JUSTSHOP_SYNC_INTERVAL, not a number"),
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Write as TOML, creating parent directories
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).with_context(|| format!("Cannot create {:?}", dir))?;
        }
        let text = toml::to_string_pretty(self).context("Cannot encode config as TOML")?;
        std::fs::write(path, text).with_context(|| format!("Cannot write {:?}", path))
    }

    /// `JUSTSHOP_CONFIG`, or `<config dir>/justshop/config.toml`
    pub fn config_file_path() -> PathBuf {
        env_var("CONFIG").map(PathBuf::from).unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("justshop")
                .join("config.toml")
        })
    }

    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("justshop.db")
    }

    /// Poll interval, clamped to the one second minimum
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs.max(MIN_SYNC_INTERVAL_SECS))
    }
}

/// Source of the values the sync engine reads on every request
///
/// Implementations must return current values; callers never cache them.
pub trait SettingsProvider: Send + Sync {
    /// Base URL of the server, without the `/v1` suffix
    fn server_url(&self) -> String;
    /// Basic auth user name
    fn username(&self) -> String;
    /// Basic auth password
    fn password(&self) -> String;
    /// Fallback poll interval (at least one second)
    fn sync_interval(&self) -> Duration;
    /// Endpoint used for "delete all"
    fn delete_all_endpoint(&self) -> String;
}

impl SettingsProvider for Config {
    fn server_url(&self) -> String {
        self.server_url.clone()
    }

    fn username(&self) -> String {
        self.username.clone()
    }

    fn password(&self) -> String {
        self.password.clone()
    }

    fn sync_interval(&self) -> Duration {
        Config::sync_interval(self)
    }

    fn delete_all_endpoint(&self) -> String {
        self.delete_all_endpoint.clone()
    }
}

/// Mutable settings shared between the engine and whoever edits them
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<Config>>,
}

impl SharedSettings {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Copy of the current configuration
    pub fn snapshot(&self) -> Config {
        self.read(Config::clone)
    }

    /// Apply an edit; the next request picks it up
    pub fn update(&self, edit: impl FnOnce(&mut Config)) {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        edit(&mut guard);
    }

    fn read<T>(&self, f: impl FnOnce(&Config) -> T) -> T {
        let guard = self
            .inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&guard)
    }
}

impl SettingsProvider for SharedSettings {
    fn server_url(&self) -> String {
        self.read(|c| c.server_url.clone())
    }

    fn username(&self) -> String {
        self.read(|c| c.username.clone())
    }

    fn password(&self) -> String {
        self.read(|c| c.password.clone())
    }

    fn sync_interval(&self) -> Duration {
        self.read(Config::sync_interval)
    }

    fn delete_all_endpoint(&self) -> String {
        self.read(|c| c.delete_all_endpoint.clone())
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir().unwrap_or_default().join("justshop")
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_sync_interval() -> u64 {
    1
}

fn default_reconnect_delay() -> u64 {
    1
}

fn default_max_reconnect_delay() -> u64 {
    30
}

fn default_delete_all_endpoint() -> String {
    "delete-checked".to_string()
}
