/// Error handling module for devloop-runner.
///
/// This module defines the error types used throughout the library. Errors
/// raised inside a restart cycle are caught at the cycle boundary and logged;
/// errors raised during startup are returned to the caller.
///
/// # Example
///
/// ```
/// use devloop_runner::error::{Error, Result};
///
/// fn describe(result: Result<()>) {
///     match result {
///         Ok(_) => println!("Cycle completed"),
///         Err(Error::MissingArtifact(path)) => println!("Nothing to install at {}", path.display()),
///         Err(Error::InstallFailed(msg)) => println!("Install failed: {}", msg),
///         Err(Error::Timeout(msg)) => println!("Port still busy: {}", msg),
///         Err(e) => println!("Other error: {}", e),
///     }
/// }
/// ```
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the devloop-runner library.
///
/// Each variant carries enough context to produce a useful console
/// diagnostic, since console output is the only place failures surface.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to read or parse configuration from a file or string.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration parsed but contains unusable values.
    ///
    /// This error occurs when:
    /// - A command is empty
    /// - The port is zero
    /// - A polling interval is zero or longer than its timeout
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// The artifact file was not present when an install was attempted.
    ///
    /// The install command is never spawned in this case.
    #[error("Artifact not found at {}", .0.display())]
    MissingArtifact(PathBuf),

    /// The install command could not be spawned or exited unsuccessfully.
    #[error("Install failed: {0}")]
    InstallFailed(String),

    /// The supervised port did not become free within the allowed time.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Signaling the server's process group failed.
    ///
    /// A group that no longer exists is not an error; this variant covers
    /// everything else (permissions, invalid signal, unsupported platform).
    #[error("Signal error: {0}")]
    Signal(String),

    /// The server command could not be spawned.
    ///
    /// `ServerProcess::start` logs and records this rather than returning it.
    #[error("Failed to spawn server: {0}")]
    Spawn(String),

    /// The file watch backend could not be set up.
    #[error("Watch error: {0}")]
    Watch(String),

    /// The server is already running.
    ///
    /// This error occurs when attempting to start a handle that still holds a process.
    #[error("Already running")]
    AlreadyRunning,

    /// Any other error not covered by the above categories.
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for devloop-runner operations.
pub type Result<T> = std::result::Result<T, Error>;
