use crate::config::Timings;
use crate::error::{Error, Result};
use crate::watch::{WatchEvent, WatchEventKind, WatchSource};
use async_trait::async_trait;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

/// [`WatchSource`] backed by the platform's native file notifications.
///
/// The artifact's parent directory is watched non-recursively so the
/// artifact may be created after the subscription starts. While that
/// directory does not exist, its nearest existing ancestor is watched
/// instead and the watch moves down as the missing directories appear.
/// Raw events are held back until the file's size and modification time
/// have stopped changing for the stability window, so one rebuild that
/// writes the file in several chunks yields one notification.
pub struct NotifyWatchSource {
    stability: Duration,
    poll: Duration,
    forwarder: Option<JoinHandle<()>>,
}

impl NotifyWatchSource {
    pub fn new(stability: Duration, poll: Duration) -> Self {
        Self {
            stability,
            poll,
            forwarder: None,
        }
    }

    pub fn from_timings(timings: &Timings) -> Self {
        Self::new(timings.write_stability(), timings.write_poll())
    }

    pub fn is_watching(&self) -> bool {
        self.forwarder.is_some()
    }
}

impl Default for NotifyWatchSource {
    fn default() -> Self {
        Self::from_timings(&Timings::default())
    }
}

#[async_trait]
impl WatchSource for NotifyWatchSource {
    #[tracing::instrument(skip(self), fields(path = %path.display()))]
    async fn subscribe(&mut self, path: &Path) -> Result<mpsc::Receiver<WatchEvent>> {
        if self.forwarder.is_some() {
            return Err(Error::Watch("already subscribed".to_string()));
        }

        let file_name = path
            .file_name()
            .ok_or_else(|| Error::Watch(format!("{} has no file name", path.display())))?
            .to_os_string();
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if raw_tx.send(event).is_err() {
                    tracing::debug!("watch event dropped because forwarder is closed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "watch backend error"),
        })
        .map_err(|e| Error::Watch(format!("watch backend error: {}", e)))?;

        let mut target = WatchTarget {
            watcher,
            dir,
            watched: None,
        };
        target.arm()?;
        if !target.at_dir() {
            tracing::info!(
                dir = %target.dir.display(),
                "Artifact directory does not exist yet, watching for it"
            );
        }

        let (tx, rx) = mpsc::channel(16);
        self.forwarder = Some(tokio::spawn(forward_settled(
            target,
            raw_rx,
            tx,
            Artifact {
                path: path.to_path_buf(),
                file_name,
            },
            self.stability,
            self.poll,
        )));

        tracing::info!("Watching artifact");
        Ok(rx)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
            tracing::debug!("Watch closed");
        }
        Ok(())
    }
}

impl Drop for NotifyWatchSource {
    fn drop(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}

struct Artifact {
    path: PathBuf,
    file_name: OsString,
}

/// The one directory currently under watch: the artifact's parent, or its
/// nearest existing ancestor while the parent is missing.
struct WatchTarget {
    watcher: RecommendedWatcher,
    dir: PathBuf,
    watched: Option<PathBuf>,
}

impl WatchTarget {
    fn at_dir(&self) -> bool {
        self.watched.as_deref() == Some(self.dir.as_path())
    }

    /// Point the watch at the deepest existing directory on the way to
    /// the artifact. Returns whether the watched directory changed.
    fn arm(&mut self) -> Result<bool> {
        let next = nearest_existing_dir(&self.dir);
        if self.watched.as_ref() == Some(&next) {
            return Ok(false);
        }

        if let Some(previous) = self.watched.take() {
            // Fails harmlessly when the directory itself was removed.
            if let Err(e) = self.watcher.unwatch(&previous) {
                tracing::debug!(dir = %previous.display(), error = %e, "unwatch failed");
            }
        }
        self.watcher
            .watch(&next, RecursiveMode::NonRecursive)
            .map_err(|e| Error::Watch(format!("cannot watch {}: {}", next.display(), e)))?;

        tracing::debug!(dir = %next.display(), "Watching directory");
        self.watched = Some(next);
        Ok(true)
    }
}

fn nearest_existing_dir(dir: &Path) -> PathBuf {
    dir.ancestors()
        .find(|candidate| candidate.is_dir())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Events that can create or remove directories on the way to the artifact.
fn is_structural(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
    )
}

/// Maps a raw notification to the artifact change it represents, if any.
fn map_notify_event(event: &Event, file_name: &OsStr) -> Option<WatchEventKind> {
    if !event
        .paths
        .iter()
        .any(|p| p.file_name() == Some(file_name))
    {
        return None;
    }

    match event.kind {
        EventKind::Create(_) => Some(WatchEventKind::Add),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => None,
        EventKind::Modify(_) => Some(WatchEventKind::Change),
        _ => None,
    }
}

async fn forward_settled(
    mut target: WatchTarget,
    mut raw_rx: mpsc::UnboundedReceiver<Event>,
    tx: mpsc::Sender<WatchEvent>,
    artifact: Artifact,
    stability: Duration,
    poll: Duration,
) {
    while let Some(event) = raw_rx.recv().await {
        let direct = if target.at_dir() {
            map_notify_event(&event, &artifact.file_name)
        } else {
            None
        };

        let kind = match direct {
            Some(kind) => kind,
            None if is_structural(&event) => match target.arm() {
                // The artifact can land before the watch reaches its directory.
                Ok(true) if target.at_dir() => {
                    if !matches!(tokio::fs::try_exists(&artifact.path).await, Ok(true)) {
                        continue;
                    }
                    WatchEventKind::Add
                }
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to follow artifact directory");
                    continue;
                }
            },
            None => continue,
        };

        if !await_write_finish(&artifact.path, &mut raw_rx, stability, poll).await {
            tracing::debug!(path = %artifact.path.display(), "Artifact vanished before write settled");
            continue;
        }

        let event = WatchEvent {
            kind,
            path: artifact.path.clone(),
        };
        if tx.send(event).await.is_err() {
            break;
        }
    }
}

async fn file_signature(path: &Path) -> Option<(u64, Option<SystemTime>)> {
    let metadata = tokio::fs::metadata(path).await.ok()?;
    Some((metadata.len(), metadata.modified().ok()))
}

/// Waits until `path` has been unchanged for `stability`, absorbing raw
/// events that arrive meanwhile. Returns `false` if the file is missing.
async fn await_write_finish(
    path: &Path,
    raw_rx: &mut mpsc::UnboundedReceiver<Event>,
    stability: Duration,
    poll: Duration,
) -> bool {
    let mut last = file_signature(path).await;
    let mut stable_since = Instant::now();

    loop {
        time::sleep(poll).await;
        while raw_rx.try_recv().is_ok() {}

        let current = file_signature(path).await;
        if current.is_none() {
            return false;
        }
        if current != last {
            last = current;
            stable_since = Instant::now();
        } else if stable_since.elapsed() >= stability {
            return true;
        }
    }
}
