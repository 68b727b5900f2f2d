/*!
 # devloop-runner

 Keeps a development server running against a locally built package.

 ## Overview

 devloop-runner watches one build artifact (typically a packed `.tgz`) and,
 every time it is rewritten:

 - stops the development server, signaling its whole process group and
   escalating from SIGTERM to SIGKILL if the server's port stays busy
 - reinstalls the artifact into the application
 - starts the server again

 Bursts of file events collapse into one restart, and restarts never
 overlap. A trigger that fires while a restart is already running is
 dropped, not queued.

 ## Basic Usage

 ```no_run
 use devloop_runner::{DevLoopRunner, Result};

 #[tokio::main]
 async fn main() -> Result<()> {
     let runner = DevLoopRunner::from_config_file("devloop.json")?;

     // Runs until Ctrl+C, then stops the server and returns.
     runner
         .run(async {
             let _ = tokio::signal::ctrl_c().await;
         })
         .await
 }
 ```

 ## Features

 - **Debounced restarts**: one stop → install → start cycle per burst of writes
 - **Process-group shutdown**: descendants of the server command are reached too
 - **Port-based liveness**: a server is gone once its port can be bound again
 - **Configuration**: JSON or YAML files with documented timing defaults
 - **Tracing**: all operations log through `tracing`
*/

pub mod config;
pub mod error;
pub mod installer;
pub mod restart;
pub mod server;
pub mod watch;

pub use config::Config;
pub use error::{Error, Result};
pub use installer::{ArtifactInstaller, Installer};
pub use server::{LifecycleEvent, LifecycleJournal, ServerControl, ServerProcess, ServerStatus};
pub use watch::{NotifyWatchSource, WatchEvent, WatchSource};

use restart::{CycleEnd, CycleOutcome, RestartDebouncer, RestartSerializer};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch::Sender;

/// Supervises the dev loop.
///
/// This struct owns every piece of mutable state the loop has: the server
/// handle (or the restart cycle currently holding it), the pending restart
/// timer, and the watch subscription. All public methods are instrumented
/// with `tracing` spans.
pub struct DevLoopRunner<S = ServerProcess, I = ArtifactInstaller, W = NotifyWatchSource> {
    /// Watched artifact, absolute
    artifact: PathBuf,
    installer: Arc<I>,
    watch: W,
    debouncer: RestartDebouncer,
    cycles: RestartSerializer<S>,
    journal: Arc<LifecycleJournal>,
    /// Flips to `true` once shutdown begins; in-flight cycles watch it
    shutdown_requested: Sender<bool>,
}

impl DevLoopRunner {
    /// Create a runner from a configuration file path
    #[tracing::instrument(skip(path), fields(config_path = ?path.as_ref()))]
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        tracing::info!("Loading configuration from file");
        let config = Config::from_file(path)?;
        Self::from_config(config)
    }

    /// Create a runner with the real server, installer and file watcher
    #[tracing::instrument(skip(config), fields(artifact = %config.artifact.display(), port = config.port))]
    pub fn from_config(config: Config) -> Result<Self> {
        config::validate_config(&config)?;

        Ok(Self::with_parts(
            config.artifact_path(),
            ServerProcess::from_config(&config),
            ArtifactInstaller::from_config(&config),
            NotifyWatchSource::from_timings(&config.timings),
            config.timings.debounce(),
        ))
    }
}

impl<S, I, W> DevLoopRunner<S, I, W>
where
    S: ServerControl + 'static,
    I: Installer + 'static,
    W: WatchSource,
{
    /// Create a runner from its collaborators
    pub fn with_parts(
        artifact: impl Into<PathBuf>,
        server: S,
        installer: I,
        watch: W,
        debounce: Duration,
    ) -> Self {
        Self {
            artifact: artifact.into(),
            installer: Arc::new(installer),
            watch,
            debouncer: RestartDebouncer::new(debounce),
            cycles: RestartSerializer::new(server),
            journal: Arc::new(LifecycleJournal::new()),
            shutdown_requested: Sender::new(false),
        }
    }

    /// Shared handle on the journal of starts, stops and restart cycles
    pub fn journal(&self) -> Arc<LifecycleJournal> {
        Arc::clone(&self.journal)
    }

    /// Run the dev loop until `shutdown` resolves.
    ///
    /// Startup subscribes to the artifact, installs it, and starts the
    /// server, in that order; any startup failure is returned and the
    /// server is not started. After startup, restart failures are logged
    /// and the loop keeps going. Once `shutdown` resolves the pending
    /// restart is cancelled, the watch is closed, an in-flight restart is
    /// allowed to finish its stop but goes no further, and the server is
    /// stopped. Shutdown problems are logged; the method then returns
    /// `Ok(())` regardless. A `shutdown` that resolves during startup
    /// abandons the startup install the same way.
    #[tracing::instrument(skip_all, fields(artifact = %self.artifact.display()))]
    pub async fn run<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut events = self.watch.subscribe(&self.artifact).await?;
        tokio::pin!(shutdown);

        let started = tokio::select! {
            biased;

            _ = &mut shutdown => None,
            result = self.start_up() => Some(result),
        };

        match started {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                tracing::error!(error = %e, "Startup failed");
                if let Err(close_err) = self.watch.close().await {
                    tracing::warn!(error = %close_err, "Failed to close watch");
                }
                return Err(e);
            }
            None => {
                tracing::info!("Shutdown requested during startup");
                self.shut_down().await;
                return Ok(());
            }
        }

        let mut watching = true;

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => break,
                event = events.recv(), if watching => match event {
                    Some(event) => {
                        tracing::debug!(reason = event.reason(), "Artifact event");
                        self.debouncer.schedule(event.reason());
                    }
                    None => {
                        tracing::warn!("Watch feed ended, no further restarts will be triggered");
                        watching = false;
                    }
                },
                reason = self.debouncer.fired() => self.begin_cycle(&reason),
                outcome = self.cycles.next_outcome() => self.finish_cycle(outcome),
            }
        }

        self.shut_down().await;
        Ok(())
    }

    async fn start_up(&mut self) -> Result<()> {
        self.installer.install().await?;
        self.journal
            .record(LifecycleEvent::Installed, None, None, None);

        match self.cycles.server_mut() {
            Some(server) => restart::start_server(server, &self.journal, None).await,
            None => Err(Error::Other("server handle unavailable at startup".to_string())),
        }
    }

    fn begin_cycle(&mut self, reason: &str) {
        let installer = Arc::clone(&self.installer);
        let journal = Arc::clone(&self.journal);
        let shutdown = self.shutdown_requested.subscribe();

        match self.cycles.try_begin(reason, installer, journal, shutdown) {
            Some(id) => tracing::info!(cycle = %id, reason, "Restarting"),
            None => {
                tracing::debug!(reason, "Restart already in progress, dropping trigger");
                self.journal
                    .record(LifecycleEvent::CycleDropped, None, Some(reason), None);
            }
        }
    }

    fn finish_cycle(&mut self, outcome: CycleOutcome) {
        let CycleOutcome { id, reason, result } = outcome;
        match result {
            Ok(CycleEnd::Restarted) => {
                tracing::info!(cycle = %id, reason = %reason, "Restart complete");
                self.journal
                    .record(LifecycleEvent::CycleCompleted, Some(id), Some(reason.as_str()), None);
            }
            Ok(CycleEnd::Interrupted) => {
                tracing::info!(cycle = %id, reason = %reason, "Restart cut short by shutdown");
                self.journal
                    .record(LifecycleEvent::CycleInterrupted, Some(id), Some(reason.as_str()), None);
            }
            Err(e) => {
                tracing::error!(cycle = %id, reason = %reason, error = %e, "Restart failed");
                self.journal.record(
                    LifecycleEvent::CycleFailed,
                    Some(id),
                    Some(reason.as_str()),
                    Some(e.to_string()),
                );
            }
        }
    }

    async fn shut_down(&mut self) {
        tracing::info!("Shutting down");
        self.shutdown_requested.send_replace(true);

        if self.debouncer.cancel() {
            tracing::debug!("Cancelled pending restart");
        }

        if let Err(e) = self.watch.close().await {
            tracing::warn!(error = %e, "Failed to close watch");
        }

        if self.cycles.in_flight() {
            tracing::info!("Waiting for in-flight restart to stop the server");
            let outcome = self.cycles.next_outcome().await;
            self.finish_cycle(outcome);
        }

        if let Some(server) = self.cycles.server_mut() {
            match server.stop().await {
                Ok(()) => self
                    .journal
                    .record(LifecycleEvent::ServerStopped, None, None, None),
                Err(e) => tracing::error!(error = %e, "Failed to stop server during shutdown"),
            }
        }
    }
}
