use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default port the development server listens on.
pub const DEFAULT_PORT: u16 = 8080;
/// Default quiet period before a burst of watch events triggers a restart.
pub const DEFAULT_DEBOUNCE_MS: u64 = 350;
/// Default delay between SIGTERM and the port check that may escalate to SIGKILL.
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 1200;
/// Default interval between port probes while waiting for the port to free.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 150;
/// Default bound on the wait for the port to free.
pub const DEFAULT_PORT_WAIT_TIMEOUT_MS: u64 = 8000;
/// Default time an artifact must stay unchanged before a write is considered finished.
pub const DEFAULT_WRITE_STABILITY_MS: u64 = 2000;
/// Default interval between artifact size checks while a write settles.
pub const DEFAULT_WRITE_POLL_MS: u64 = 100;

/// Placeholder that an install argument may use to position the artifact path.
pub const ARTIFACT_PLACEHOLDER: &str = "{artifact}";

/// An external command invocation.
///
/// # Examples
///
/// ```
/// use devloop_runner::config::CommandConfig;
/// use std::collections::HashMap;
///
/// let server = CommandConfig {
///     command: "npm".to_string(),
///     args: vec!["run".to_string(), "dev".to_string()],
///     env: HashMap::new(),
/// };
/// assert_eq!(server.display(), "npm run dev");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Program to execute, either an absolute path or a name on `PATH`.
    pub command: String,

    /// Arguments passed to the program.
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables, added on top of the inherited environment.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl CommandConfig {
    /// Builds a command with no extra environment.
    pub fn new(command: impl Into<String>, args: &[&str]) -> Self {
        Self {
            command: command.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            env: HashMap::new(),
        }
    }

    /// Human-readable rendering used in log lines.
    pub fn display(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// `npm i --no-save`, with the artifact path appended at install time.
    pub fn default_install() -> Self {
        Self::new("npm", &["i", "--no-save"])
    }

    /// `npm run dev`.
    pub fn default_server() -> Self {
        Self::new("npm", &["run", "dev"])
    }
}

/// Timing knobs for the restart state machine.
///
/// All values are in milliseconds in the configuration file; use the
/// accessor methods to get [`Duration`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Timings {
    pub debounce_ms: u64,
    pub grace_period_ms: u64,
    pub poll_interval_ms: u64,
    pub port_wait_timeout_ms: u64,
    pub write_stability_ms: u64,
    pub write_poll_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            grace_period_ms: DEFAULT_GRACE_PERIOD_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            port_wait_timeout_ms: DEFAULT_PORT_WAIT_TIMEOUT_MS,
            write_stability_ms: DEFAULT_WRITE_STABILITY_MS,
            write_poll_ms: DEFAULT_WRITE_POLL_MS,
        }
    }
}

impl Timings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn port_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.port_wait_timeout_ms)
    }

    pub fn write_stability(&self) -> Duration {
        Duration::from_millis(self.write_stability_ms)
    }

    pub fn write_poll(&self) -> Duration {
        Duration::from_millis(self.write_poll_ms)
    }
}

fn default_app_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Main configuration for the dev loop.
///
/// # JSON Schema
///
/// Only `artifact` is required:
///
/// ```json
/// {
///   "artifact": "../pack/openedx-frontend-base.tgz",
///   "appRoot": ".",
///   "port": 8080,
///   "install": { "command": "npm", "args": ["i", "--no-save"] },
///   "server": { "command": "npm", "args": ["run", "dev"], "env": { "NODE_ENV": "development" } },
///   "timings": { "debounceMs": 350, "gracePeriodMs": 1200 }
/// }
/// ```
///
/// # Examples
///
/// ```
/// use devloop_runner::config::Config;
///
/// let config = Config::parse_from_str(r#"{ "artifact": "/tmp/pkg.tgz" }"#).unwrap();
/// assert_eq!(config.port, 8080);
/// assert_eq!(config.server.display(), "npm run dev");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// The artifact to watch and install. Relative paths resolve against `app_root`.
    pub artifact: PathBuf,

    /// Directory the install and server commands run in.
    #[serde(default = "default_app_root")]
    pub app_root: PathBuf,

    /// Port the development server binds; its release marks the server as gone.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Command that installs the artifact into the app.
    #[serde(default = "CommandConfig::default_install")]
    pub install: CommandConfig,

    /// Command that runs the development server.
    #[serde(default = "CommandConfig::default_server")]
    pub server: CommandConfig,

    #[serde(default)]
    pub timings: Timings,
}

impl Config {
    /// Creates a configuration with defaults for everything but the artifact.
    pub fn new(artifact: impl Into<PathBuf>) -> Self {
        Self {
            artifact: artifact.into(),
            app_root: default_app_root(),
            port: DEFAULT_PORT,
            install: CommandConfig::default_install(),
            server: CommandConfig::default_server(),
            timings: Timings::default(),
        }
    }

    /// Loads a configuration from a file path.
    ///
    /// Files ending in `.yaml` or `.yml` are read as YAML, anything else as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigParse`] if the file cannot be read or does not
    /// match the expected schema.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigParse(format!("Failed to read config file: {}", e)))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::parse_from_yaml_str(&content),
            _ => Self::parse_from_str(&content),
        }
    }

    /// Parses a configuration from a JSON string.
    pub fn parse_from_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse JSON config: {}", e)))
    }

    /// Parses a configuration from a YAML string.
    pub fn parse_from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse YAML config: {}", e)))
    }

    /// The application root as an absolute path.
    pub fn app_root_path(&self) -> PathBuf {
        if self.app_root.is_absolute() {
            return self.app_root.clone();
        }
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(&self.app_root),
            Err(_) => self.app_root.clone(),
        }
    }

    /// The artifact as an absolute path, resolved against the application root.
    pub fn artifact_path(&self) -> PathBuf {
        if self.artifact.is_absolute() {
            self.artifact.clone()
        } else {
            self.app_root_path().join(&self.artifact)
        }
    }
}
