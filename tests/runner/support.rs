use async_trait::async_trait;
use devloop_runner::error::{Error, Result};
use devloop_runner::{DevLoopRunner, Installer, ServerControl, ServerStatus, WatchEvent, WatchSource};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

pub const DEBOUNCE: Duration = Duration::from_millis(350);

/// Ordered log of what the fakes were asked to do.
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == entry).count()
    }
}

/// How the fakes behave.
#[derive(Debug, Clone, Copy, Default)]
pub struct Behaviour {
    pub stop_delay: Duration,
    pub install_delay: Duration,
    pub stop_fails: bool,
}

pub struct FakeServer {
    log: Recorder,
    port_bound: Arc<AtomicBool>,
    behaviour: Behaviour,
    status: ServerStatus,
}

#[async_trait]
impl ServerControl for FakeServer {
    async fn start(&mut self) -> Result<()> {
        if self.status == ServerStatus::Running {
            return Err(Error::AlreadyRunning);
        }
        self.log.push("start");
        self.port_bound.store(true, Ordering::SeqCst);
        self.status = ServerStatus::Running;
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if self.status != ServerStatus::Running {
            return Ok(());
        }
        self.log.push("stop");
        self.status = ServerStatus::Stopping;
        time::sleep(self.behaviour.stop_delay).await;
        if self.behaviour.stop_fails {
            self.log.push("stop failed");
            return Err(Error::Timeout("port 8080 still in use after 8000ms".to_string()));
        }
        self.port_bound.store(false, Ordering::SeqCst);
        self.status = ServerStatus::Stopped;
        self.log.push("stopped");
        Ok(())
    }

    fn status(&self) -> ServerStatus {
        self.status
    }
}

pub struct FakeInstaller {
    log: Recorder,
    artifact: PathBuf,
    port_bound: Arc<AtomicBool>,
    delay: Duration,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

#[async_trait]
impl Installer for FakeInstaller {
    async fn install(&self) -> Result<()> {
        if !self.artifact.exists() {
            return Err(Error::MissingArtifact(self.artifact.clone()));
        }

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        self.log.push(format!(
            "install port_bound={}",
            self.port_bound.load(Ordering::SeqCst)
        ));
        time::sleep(self.delay).await;
        self.log.push("installed");
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeWatch {
    log: Recorder,
    feed: Arc<Mutex<Option<mpsc::Sender<WatchEvent>>>>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl WatchSource for FakeWatch {
    async fn subscribe(&mut self, _path: &Path) -> Result<mpsc::Receiver<WatchEvent>> {
        let (tx, rx) = mpsc::channel(16);
        *self.feed.lock().unwrap() = Some(tx);
        self.log.push("subscribe");
        Ok(rx)
    }

    async fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.feed.lock().unwrap().take();
        self.log.push("close");
        Ok(())
    }
}

pub type FakeRunner = DevLoopRunner<FakeServer, FakeInstaller, FakeWatch>;

/// Shared state between a test and the fakes it hands to a runner.
pub struct Harness {
    pub log: Recorder,
    pub port_bound: Arc<AtomicBool>,
    pub closes: Arc<AtomicUsize>,
    pub max_active_installs: Arc<AtomicUsize>,
    feed: Arc<Mutex<Option<mpsc::Sender<WatchEvent>>>>,
    pub artifact: PathBuf,
    _dir: TempDir,
}

impl Harness {
    /// A harness whose artifact exists on disk.
    pub fn new() -> Self {
        let harness = Self::without_artifact();
        harness.write_artifact();
        harness
    }

    pub fn without_artifact() -> Self {
        Self::with_artifact_at(&["openedx-frontend-base.tgz"])
    }

    /// A harness whose artifact lives in a `pack/` directory that does not exist.
    pub fn in_missing_dir() -> Self {
        Self::with_artifact_at(&["pack", "openedx-frontend-base.tgz"])
    }

    fn with_artifact_at(components: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let artifact = components
            .iter()
            .fold(dir.path().to_path_buf(), |path, c| path.join(c));
        Self {
            log: Recorder::default(),
            port_bound: Arc::new(AtomicBool::new(false)),
            closes: Arc::new(AtomicUsize::new(0)),
            max_active_installs: Arc::new(AtomicUsize::new(0)),
            feed: Arc::new(Mutex::new(None)),
            artifact,
            _dir: dir,
        }
    }

    pub fn write_artifact(&self) {
        std::fs::write(&self.artifact, b"package").unwrap();
    }

    pub fn remove_artifact(&self) {
        std::fs::remove_file(&self.artifact).unwrap();
    }

    pub fn runner(&self, behaviour: Behaviour) -> FakeRunner {
        let watch = FakeWatch {
            log: self.log.clone(),
            feed: Arc::clone(&self.feed),
            closes: Arc::clone(&self.closes),
        };
        self.runner_with_watch(behaviour, watch)
    }

    /// Fake server and installer around a caller-chosen watch source.
    pub fn runner_with_watch<W: WatchSource>(
        &self,
        behaviour: Behaviour,
        watch: W,
    ) -> DevLoopRunner<FakeServer, FakeInstaller, W> {
        let server = FakeServer {
            log: self.log.clone(),
            port_bound: Arc::clone(&self.port_bound),
            behaviour,
            status: ServerStatus::Stopped,
        };
        let installer = FakeInstaller {
            log: self.log.clone(),
            artifact: self.artifact.clone(),
            port_bound: Arc::clone(&self.port_bound),
            delay: behaviour.install_delay,
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::clone(&self.max_active_installs),
        };

        DevLoopRunner::with_parts(&self.artifact, server, installer, watch, DEBOUNCE)
    }

    /// Run `runner` on its own task until [`Running::shutdown`].
    pub fn spawn(&self, runner: FakeRunner) -> Running {
        let (tx, rx) = oneshot::channel();
        let task = tokio::spawn(runner.run(async move {
            let _ = rx.await;
        }));
        Running {
            shutdown: Some(tx),
            task,
        }
    }

    /// Deliver a watch notification to the running loop.
    pub async fn emit(&self, event: WatchEvent) {
        let tx = self
            .feed
            .lock()
            .unwrap()
            .clone()
            .expect("runner has not subscribed");
        tx.send(event).await.unwrap();
    }

    pub fn change(&self) -> WatchEvent {
        WatchEvent::change(&self.artifact)
    }

    pub fn add(&self) -> WatchEvent {
        WatchEvent::add(&self.artifact)
    }

    /// Wait (in virtual time) until `entry` has been logged `times` times.
    pub async fn wait_for_entry(&self, entry: &str, times: usize) {
        let log = self.log.clone();
        wait_until(entry, || log.count(entry) >= times).await;
    }
}

pub struct Running {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl Running {
    /// Request shutdown and wait for the loop to return.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.task.await.expect("runner task panicked")
    }
}

pub async fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(120);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        time::sleep(Duration::from_millis(10)).await;
    }
}
