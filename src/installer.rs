//! Installs the watched artifact into the application.

use crate::config::{ARTIFACT_PLACEHOLDER, CommandConfig, Config};
use crate::error::{Error, Result};
use async_process::{Command, Stdio};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// One-shot installation of the artifact.
#[async_trait]
pub trait Installer: Send + Sync {
    /// Install the artifact, returning once the install has finished.
    async fn install(&self) -> Result<()>;
}

/// Runs the configured install command against the artifact.
///
/// The artifact path is appended to the command's arguments, or substituted
/// for an argument equal to `{artifact}` when one is present.
#[derive(Debug, Clone)]
pub struct ArtifactInstaller {
    artifact: PathBuf,
    app_root: PathBuf,
    command: CommandConfig,
}

impl ArtifactInstaller {
    pub fn new(
        artifact: impl Into<PathBuf>,
        app_root: impl Into<PathBuf>,
        command: CommandConfig,
    ) -> Self {
        Self {
            artifact: artifact.into(),
            app_root: app_root.into(),
            command,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.artifact_path(),
            config.app_root_path(),
            config.install.clone(),
        )
    }

    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    fn args(&self) -> Vec<OsString> {
        let mut substituted = false;
        let mut args: Vec<OsString> = self
            .command
            .args
            .iter()
            .map(|arg| {
                if arg == ARTIFACT_PLACEHOLDER {
                    substituted = true;
                    self.artifact.clone().into_os_string()
                } else {
                    OsString::from(arg)
                }
            })
            .collect();

        if !substituted {
            args.push(self.artifact.clone().into_os_string());
        }
        args
    }

    /// Install the artifact
    ///
    /// # Errors
    ///
    /// * [`Error::MissingArtifact`] if the artifact does not exist; nothing is spawned
    /// * [`Error::InstallFailed`] if the artifact's existence cannot be checked,
    ///   or the command cannot be spawned or exits non-zero
    #[tracing::instrument(skip(self), fields(artifact = %self.artifact.display()))]
    pub async fn install(&self) -> Result<()> {
        match tokio::fs::try_exists(&self.artifact).await {
            Ok(true) => {}
            Ok(false) => return Err(Error::MissingArtifact(self.artifact.clone())),
            Err(e) => {
                return Err(Error::InstallFailed(format!(
                    "cannot check {}: {}",
                    self.artifact.display(),
                    e
                )));
            }
        }

        tracing::info!(command = %self.command.display(), "Installing artifact");

        let status = Command::new(&self.command.command)
            .args(self.args())
            .envs(&self.command.env)
            .current_dir(&self.app_root)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| {
                Error::InstallFailed(format!(
                    "could not run {}: {}",
                    self.command.command, e
                ))
            })?;

        match status.code() {
            Some(0) => {
                tracing::debug!("Install finished");
                Ok(())
            }
            Some(code) => Err(Error::InstallFailed(format!(
                "{} exited {}",
                self.command.command, code
            ))),
            None => Err(Error::InstallFailed(format!(
                "{} terminated without an exit code ({})",
                self.command.command, status
            ))),
        }
    }
}

#[async_trait]
impl Installer for ArtifactInstaller {
    async fn install(&self) -> Result<()> {
        ArtifactInstaller::install(self).await
    }
}
