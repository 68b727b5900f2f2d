//! Restart debouncing and serialization.
//!
//! [`RestartDebouncer`] turns a burst of watch events into one timer that
//! fires with the most recent reason. [`RestartSerializer`] runs at most one
//! stop → install → start cycle at a time; a trigger that fires while a
//! cycle is in flight is dropped rather than queued. Once shutdown is
//! requested an in-flight cycle goes no further than its stop.

use crate::error::Result;
use crate::installer::Installer;
use crate::server::{CycleId, LifecycleEvent, LifecycleJournal, ServerControl, ServerStatus};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tracing::Instrument;

struct PendingRestart {
    deadline: Instant,
    reason: String,
}

/// The single pending restart timer.
///
/// Scheduling replaces any pending timer, so only the latest request
/// survives a burst.
pub struct RestartDebouncer {
    window: Duration,
    pending: Option<PendingRestart>,
}

impl RestartDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// (Re)arm the timer to fire one window from now with `reason`.
    pub fn schedule(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        let replaced = self.pending.is_some();
        tracing::trace!(%reason, replaced, "Scheduling restart");
        self.pending = Some(PendingRestart {
            deadline: Instant::now() + self.window,
            reason,
        });
    }

    /// Discard the pending timer. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Resolves with the reason once the pending timer's deadline passes.
    /// Never resolves while nothing is pending.
    ///
    /// Cancel safe: dropping the future leaves the timer armed.
    pub async fn fired(&mut self) -> String {
        let Some(deadline) = self.pending.as_ref().map(|p| p.deadline) else {
            return future::pending().await;
        };

        time::sleep_until(deadline).await;

        match self.pending.take() {
            Some(pending) => pending.reason,
            None => future::pending().await,
        }
    }
}

/// How far a successful cycle got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleEnd {
    /// Stopped, installed and started again
    Restarted,
    /// Shutdown was requested; the server was stopped and left down
    Interrupted,
}

/// How a restart cycle ended.
#[derive(Debug)]
pub struct CycleOutcome {
    pub id: CycleId,
    pub reason: String,
    pub result: Result<CycleEnd>,
}

type CycleFuture<S> = BoxFuture<'static, (S, CycleOutcome)>;

/// Owns the server handle and the at-most-one in-flight restart cycle.
///
/// While a cycle runs, its future owns the server; when it finishes the
/// handle comes back. "Restarting" is simply "the handle is out".
pub struct RestartSerializer<S> {
    idle: Option<S>,
    in_flight: Option<CycleFuture<S>>,
}

impl<S: ServerControl + 'static> RestartSerializer<S> {
    pub fn new(server: S) -> Self {
        Self {
            idle: Some(server),
            in_flight: None,
        }
    }

    /// Whether a cycle is running
    pub fn in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// The server handle, unless a cycle currently owns it
    pub fn server(&self) -> Option<&S> {
        self.idle.as_ref()
    }

    pub fn server_mut(&mut self) -> Option<&mut S> {
        self.idle.as_mut()
    }

    /// Begin a cycle unless one is already running.
    ///
    /// `shutdown` turning `true` stops the cycle from installing or
    /// starting anything further. Returns the new cycle's id, or `None` if
    /// the trigger was dropped.
    pub fn try_begin<I>(
        &mut self,
        reason: &str,
        installer: Arc<I>,
        journal: Arc<LifecycleJournal>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Option<CycleId>
    where
        I: Installer + ?Sized + 'static,
    {
        if self.in_flight.is_some() {
            return None;
        }
        let mut server = self.idle.take()?;

        let id = CycleId::new();
        let reason = reason.to_string();
        let span = tracing::info_span!("restart_cycle", cycle = %id, reason = %reason);

        let cycle = async move {
            journal.record(LifecycleEvent::CycleStarted, Some(id), Some(reason.as_str()), None);
            let result = run_restart_cycle(
                &mut server,
                installer.as_ref(),
                &journal,
                Some(id),
                &mut shutdown,
            )
            .await;
            let outcome = CycleOutcome { id, reason, result };
            (server, outcome)
        }
        .instrument(span)
        .boxed();

        self.in_flight = Some(cycle);
        Some(id)
    }

    /// Drive the in-flight cycle to completion and take the handle back.
    /// Never resolves while no cycle is running.
    ///
    /// Cancel safe: dropping the future leaves the cycle in place.
    pub async fn next_outcome(&mut self) -> CycleOutcome {
        let Some(cycle) = self.in_flight.as_mut() else {
            return future::pending().await;
        };

        let (server, outcome) = cycle.await;
        self.in_flight = None;
        self.idle = Some(server);
        outcome
    }
}

/// One restart: stop the server, install the artifact, start the server.
///
/// Strictly sequential; the first failure ends the cycle and is returned.
/// The stop always runs to completion. After it, a shutdown request ends
/// the cycle with [`CycleEnd::Interrupted`]: an install still running is
/// abandoned and the server is not started again.
pub async fn run_restart_cycle<S, I>(
    server: &mut S,
    installer: &I,
    journal: &LifecycleJournal,
    cycle: Option<CycleId>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<CycleEnd>
where
    S: ServerControl + ?Sized,
    I: Installer + ?Sized,
{
    server.stop().await?;
    journal.record(LifecycleEvent::ServerStopped, cycle, None, None);

    if *shutdown.borrow() {
        tracing::info!("Shutdown requested, not reinstalling");
        return Ok(CycleEnd::Interrupted);
    }

    tokio::select! {
        result = installer.install() => result?,
        true = shutdown.wait_for(|requested| *requested).map(|r| r.is_ok()) => {
            tracing::info!("Shutdown requested, abandoning install");
            return Ok(CycleEnd::Interrupted);
        }
    }
    journal.record(LifecycleEvent::Installed, cycle, None, None);

    if *shutdown.borrow() {
        tracing::info!("Shutdown requested, not starting server");
        return Ok(CycleEnd::Interrupted);
    }

    start_server(server, journal, cycle).await?;
    Ok(CycleEnd::Restarted)
}

/// Start the server and journal whether the spawn went through.
pub(crate) async fn start_server<S>(
    server: &mut S,
    journal: &LifecycleJournal,
    cycle: Option<CycleId>,
) -> Result<()>
where
    S: ServerControl + ?Sized,
{
    server.start().await?;
    let event = match server.status() {
        ServerStatus::Failed => LifecycleEvent::ServerSpawnFailed,
        _ => LifecycleEvent::ServerStarted,
    };
    journal.record(event, cycle, None, None);
    Ok(())
}
