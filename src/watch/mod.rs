//! Notification feed for changes to the watched artifact.
//!
//! The dev loop only needs to hear that the artifact was created or
//! rewritten, after the write has finished. [`WatchSource`] is that seam;
//! [`NotifyWatchSource`] implements it on top of the `notify` crate.

mod notify_source;

pub use notify_source::NotifyWatchSource;

use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Kind of change observed on the artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    /// The artifact appeared
    Add,
    /// The artifact was rewritten
    Change,
}

/// A settled change to the watched artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: PathBuf,
}

impl WatchEvent {
    pub fn add(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: WatchEventKind::Add,
            path: path.into(),
        }
    }

    pub fn change(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: WatchEventKind::Change,
            path: path.into(),
        }
    }

    /// Restart reason carried into log lines
    pub fn reason(&self) -> &'static str {
        match self.kind {
            WatchEventKind::Add => "artifact:add",
            WatchEventKind::Change => "artifact:change",
        }
    }
}

/// Subscription to add/change notifications for one path.
#[async_trait]
pub trait WatchSource: Send {
    /// Start watching `path`. Events arrive on the returned channel once
    /// each write has settled; no event is sent for a file that already exists.
    async fn subscribe(&mut self, path: &Path) -> Result<mpsc::Receiver<WatchEvent>>;

    /// Stop watching. Calling it again is harmless.
    async fn close(&mut self) -> Result<()>;
}
