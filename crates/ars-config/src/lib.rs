//! Configuration management for autoreload-web-server.
//!
//! Parses `autoreload.toml` with serde and discovers it in the current
//! directory or any parent. CLI settings are applied on top via
//! [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! `server.host` supports `${VAR}` and `${VAR:-default}`.

mod expand;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "autoreload.toml";

/// Upper bound for the debounce window.
const MAX_DEBOUNCE_MS: u64 = 10_000;

/// CLI settings that override configuration file values.
///
/// Only `Some` values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub directory: Option<PathBuf>,
    pub pattern: Option<String>,
    /// Replaces the configured ignore list when non-empty.
    pub ignore: Vec<String>,
    pub transport: Option<Transport>,
}

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Watch configuration as written (directory relative to the file).
    watch: WatchConfigRaw,
    /// Live reload transport configuration.
    pub live_reload: LiveReloadConfig,

    /// Resolved watch configuration (set after loading).
    #[serde(skip)]
    pub watch_resolved: WatchConfig,
    /// Path to the config file, if one was loaded.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 4000,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct WatchConfigRaw {
    directory: Option<String>,
    pattern: Option<String>,
    ignore: Option<Vec<String>>,
    debounce_ms: Option<u64>,
}

/// Resolved watch configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    /// Directory to serve and watch.
    pub directory: PathBuf,
    /// Glob selecting files that trigger a reload.
    pub pattern: String,
    /// Globs excluded even when they match `pattern`.
    pub ignore: Vec<String>,
    /// Debounce window in milliseconds.
    pub debounce_ms: u64,
}

impl WatchConfig {
    fn with_directory(directory: PathBuf) -> Self {
        Self {
            directory,
            pattern: "**/*".to_owned(),
            ignore: Vec::new(),
            debounce_ms: 100,
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self::with_directory(PathBuf::from("."))
    }
}

/// How browsers are told about changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Client polls a JSON endpoint.
    Poll,
    /// Server-sent events stream.
    Sse,
    /// WebSocket text frames.
    #[default]
    #[serde(alias = "ws")]
    WebSocket,
}

impl Transport {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Poll => "poll",
            Self::Sse => "sse",
            Self::WebSocket => "websocket",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transport {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "poll" | "polling" => Ok(Self::Poll),
            "sse" => Ok(Self::Sse),
            "websocket" | "ws" => Ok(Self::WebSocket),
            other => Err(ConfigError::Validation(format!(
                "unknown transport '{other}' (expected poll, sse or websocket)"
            ))),
        }
    }
}

/// Live reload configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LiveReloadConfig {
    /// Transport the injected client script uses.
    pub transport: Transport,
    /// Heartbeat interval for streaming connections.
    pub heartbeat_secs: u64,
    /// How often the polling client asks for updates.
    pub poll_interval_ms: u64,
    /// Named polling clients idle this long are dropped.
    pub poll_timeout_secs: u64,
}

impl Default for LiveReloadConfig {
    fn default() -> Self {
        Self {
            transport: Transport::default(),
            heartbeat_secs: 30,
            poll_interval_ms: 1000,
            poll_timeout_secs: 60,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`server.host`").
        field: String,
        /// Error message (e.g., "${`ARS_HOST`} not set").
        message: String,
    },
}

fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

fn require_positive(value: u64, field: &str) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Validation(format!(
            "{field} must be greater than 0"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file. Otherwise searches
    /// for `autoreload.toml` in the current directory and its parents, and
    /// falls back to defaults rooted at the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit `config_path` doesn't exist, parsing
    /// fails, or the final configuration is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        config.validate()?;
        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(directory) = &settings.directory {
            self.watch_resolved.directory.clone_from(directory);
        }
        if let Some(pattern) = &settings.pattern {
            self.watch_resolved.pattern.clone_from(pattern);
        }
        if !settings.ignore.is_empty() {
            self.watch_resolved.ignore.clone_from(&settings.ignore);
        }
        if let Some(transport) = settings.transport {
            self.live_reload.transport = transport;
        }
    }

    /// Search for the config file in the current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Default config with the watched directory at `base`.
    fn default_with_base(base: &Path) -> Self {
        Self {
            server: ServerConfig::default(),
            watch: WatchConfigRaw::default(),
            live_reload: LiveReloadConfig::default(),
            watch_resolved: WatchConfig::with_directory(base.to_path_buf()),
            config_path: None,
        }
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.server.host, "server.host")?;
        // Port 0 would make the OS pick one, which is never what a config file means
        if self.server.port == 0 {
            return Err(ConfigError::Validation("server.port cannot be 0".to_owned()));
        }

        require_non_empty(&self.watch_resolved.pattern, "watch.pattern")?;
        require_positive(self.watch_resolved.debounce_ms, "watch.debounce_ms")?;
        if self.watch_resolved.debounce_ms > MAX_DEBOUNCE_MS {
            return Err(ConfigError::Validation(format!(
                "watch.debounce_ms cannot exceed {MAX_DEBOUNCE_MS}"
            )));
        }

        require_positive(self.live_reload.heartbeat_secs, "live_reload.heartbeat_secs")?;
        require_positive(self.live_reload.poll_interval_ms, "live_reload.poll_interval_ms")?;
        require_positive(self.live_reload.poll_timeout_secs, "live_reload.poll_timeout_secs")?;

        Ok(())
    }

    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.server.host = expand::expand_env(&self.server.host, "server.host")?;
        Ok(())
    }

    /// Resolve the watched directory against the config file's directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let defaults = WatchConfig::with_directory(PathBuf::new());
        let watch = std::mem::take(&mut self.watch);

        self.watch_resolved = WatchConfig {
            directory: config_dir.join(watch.directory.as_deref().unwrap_or(".")),
            pattern: watch.pattern.unwrap_or(defaults.pattern),
            ignore: watch.ignore.unwrap_or_default(),
            debounce_ms: watch.debounce_ms.unwrap_or(defaults.debounce_ms),
        };
    }
}
