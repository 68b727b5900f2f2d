//! Configuration module for devloop-runner.
//!
//! This module handles parsing, validation, and access to the settings of a
//! dev loop: which artifact to watch, which commands install it and run the
//! server, which port the server holds, and the timing of the restart state
//! machine. Configurations load from JSON or YAML files or strings.
//!
//! # Examples
//!
//! Loading a configuration from a file:
//!
//! ```no_run
//! use devloop_runner::config::Config;
//!
//! let config = Config::from_file("devloop.json").unwrap();
//! println!("Watching {}", config.artifact_path().display());
//! ```
//!
//! Creating a configuration programmatically:
//!
//! ```
//! use devloop_runner::config::{validate_config, CommandConfig, Config};
//!
//! let mut config = Config::new("/work/pack/base.tgz");
//! config.port = 3000;
//! config.server = CommandConfig::new("pnpm", &["dev"]);
//! validate_config(&config).unwrap();
//! ```
mod parser;
pub mod validator;

pub use parser::{
    ARTIFACT_PLACEHOLDER, CommandConfig, Config, DEFAULT_DEBOUNCE_MS, DEFAULT_GRACE_PERIOD_MS,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_PORT, DEFAULT_PORT_WAIT_TIMEOUT_MS,
    DEFAULT_WRITE_POLL_MS, DEFAULT_WRITE_STABILITY_MS, Timings,
};
pub use validator::validate_config;
