// src/server/process.rs
use crate::config::{CommandConfig, Config, Timings};
use crate::error::{Error, Result};
use crate::server::port::{wait_for_port_free, LoopbackProbe, PortProbe};
use crate::server::signal::{signal_group, GroupSignal, SignalDelivery};
use async_process::{Child, Command, Stdio};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time;

/// Status of the supervised server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    /// Server is starting
    Starting,
    /// Server is running
    Running,
    /// Server is stopping
    Stopping,
    /// No server process is held
    Stopped,
    /// Server command failed to spawn
    Failed,
}

/// Start and stop operations the restart cycle drives.
///
/// Implemented by [`ServerProcess`]; tests substitute their own.
#[async_trait]
pub trait ServerControl: Send {
    /// Launch the server. Does not wait for it to become ready.
    async fn start(&mut self) -> Result<()>;

    /// Retire the running server, returning only once its port is free.
    /// A no-op when nothing is running.
    async fn stop(&mut self) -> Result<()>;

    /// Current status
    fn status(&self) -> ServerStatus;
}

/// The single supervised development server.
///
/// The server runs detached as the leader of its own process group, so
/// stopping it signals the whole group and reaches any descendants the
/// launcher spawned (`npm run dev` typically forks the real server).
pub struct ServerProcess {
    /// Server command
    config: CommandConfig,
    /// Working directory for the server
    app_root: PathBuf,
    /// Port the server binds
    port: u16,
    timings: Timings,
    probe: Arc<dyn PortProbe>,
    /// Child process, held from spawn until the port is confirmed free
    child: Option<Child>,
    /// Process group of `child`
    pgid: Option<u32>,
    status: ServerStatus,
}

impl ServerProcess {
    /// Create a handle for the server command; nothing is spawned yet
    pub fn new(
        config: CommandConfig,
        app_root: impl Into<PathBuf>,
        port: u16,
        timings: Timings,
        probe: Arc<dyn PortProbe>,
    ) -> Self {
        Self {
            config,
            app_root: app_root.into(),
            port,
            timings,
            probe,
            child: None,
            pgid: None,
            status: ServerStatus::Stopped,
        }
    }

    /// Create a handle from a dev loop configuration, probing the port on loopback
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.server.clone(),
            config.app_root_path(),
            config.port,
            config.timings,
            Arc::new(LoopbackProbe),
        )
    }

    /// Get the server status
    pub fn status(&self) -> ServerStatus {
        self.status
    }

    /// Process id of the running server, if any
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Process group the server leads, if any
    pub fn process_group(&self) -> Option<u32> {
        self.pgid
    }

    /// Port the server is expected to hold
    pub fn port(&self) -> u16 {
        self.port
    }

    fn command(&self) -> Command {
        let mut command = std::process::Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .envs(&self.config.env)
            .current_dir(&self.app_root)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        Command::from(command)
    }

    /// Start the server process
    ///
    /// A spawn failure is logged and leaves the status at
    /// [`ServerStatus::Failed`]; it is not returned as an error.
    #[tracing::instrument(skip(self), fields(command = %self.config.display(), port = self.port))]
    pub async fn start(&mut self) -> Result<()> {
        if self.child.is_some() {
            return Err(Error::AlreadyRunning);
        }

        self.status = ServerStatus::Starting;
        tracing::info!("Starting server");

        match self.command().spawn() {
            Ok(child) => {
                let pid = child.id();
                tracing::debug!(pid, "Server spawned as process group leader");
                self.pgid = Some(pid);
                self.child = Some(child);
                self.status = ServerStatus::Running;
            }
            Err(e) => {
                let err = Error::Spawn(format!("{}: {}", self.config.display(), e));
                tracing::error!(error = %err, "Server spawn failed");
                self.status = ServerStatus::Failed;
            }
        }

        Ok(())
    }

    /// Stop the server process
    ///
    /// Sends SIGTERM to the group, waits the grace period, escalates to
    /// SIGKILL if the port is still held, then waits for the port to free.
    /// On error the process stays held so a later call can try again.
    #[tracing::instrument(skip(self), fields(port = self.port))]
    pub async fn stop(&mut self) -> Result<()> {
        let Some(pgid) = self.pgid.filter(|_| self.child.is_some()) else {
            self.status = ServerStatus::Stopped;
            return Ok(());
        };

        self.status = ServerStatus::Stopping;
        tracing::info!(pgid, "Stopping server");

        if signal_group(pgid, GroupSignal::Terminate)? == SignalDelivery::AlreadyGone {
            tracing::debug!(pgid, "Process group already gone");
        }

        time::sleep(self.timings.grace_period()).await;

        if self.probe.is_port_in_use(self.port).await {
            tracing::warn!(
                pgid,
                grace_ms = self.timings.grace_period_ms,
                "Port still in use after grace period, sending SIGKILL"
            );
            signal_group(pgid, GroupSignal::Kill)?;
        }

        wait_for_port_free(
            self.probe.as_ref(),
            self.port,
            self.timings.poll_interval(),
            self.timings.port_wait_timeout(),
        )
        .await?;

        if let Some(mut child) = self.child.take() {
            match child.try_status() {
                Ok(Some(status)) => tracing::debug!(%status, "Server process exited"),
                Ok(None) => tracing::debug!("Server leader still exiting, leaving it to the reaper"),
                Err(e) => tracing::debug!(error = %e, "Could not query server exit status"),
            }
        }
        self.pgid = None;
        self.status = ServerStatus::Stopped;
        tracing::info!("Server stopped");

        Ok(())
    }
}

#[async_trait]
impl ServerControl for ServerProcess {
    async fn start(&mut self) -> Result<()> {
        ServerProcess::start(self).await
    }

    async fn stop(&mut self) -> Result<()> {
        ServerProcess::stop(self).await
    }

    fn status(&self) -> ServerStatus {
        ServerProcess::status(self)
    }
}
