use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use std::time::Instant;
use uuid::Uuid;

const MAX_EVENTS: usize = 1000;

/// Identifies one restart cycle across log lines and journal entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CycleId(Uuid);

impl CycleId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle event types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Server process spawned
    ServerStarted,
    /// Server process retired with its port free
    ServerStopped,
    /// Server command could not be spawned
    ServerSpawnFailed,
    /// Artifact installed
    Installed,
    /// Restart cycle began
    CycleStarted,
    /// Restart cycle ran stop, install and start
    CycleCompleted,
    /// Restart cycle aborted on an error
    CycleFailed,
    /// Restart cycle cut short by shutdown after its stop
    CycleInterrupted,
    /// Debounced trigger discarded because a cycle was in flight
    CycleDropped,
}

/// One journal entry
#[derive(Debug, Clone)]
pub struct LifecycleRecord {
    pub event: LifecycleEvent,
    /// Cycle this entry belongs to, if any
    pub cycle: Option<CycleId>,
    /// Trigger reason, for cycle entries
    pub reason: Option<String>,
    pub timestamp: Instant,
    pub details: Option<String>,
}

/// Bounded, in-memory history of what the dev loop did.
///
/// Purely observational; nothing in the restart state machine reads it back.
#[derive(Debug, Default)]
pub struct LifecycleJournal {
    records: Mutex<VecDeque<LifecycleRecord>>,
}

impl LifecycleJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event
    pub fn record(
        &self,
        event: LifecycleEvent,
        cycle: Option<CycleId>,
        reason: Option<&str>,
        details: Option<String>,
    ) {
        let record = LifecycleRecord {
            event,
            cycle,
            reason: reason.map(str::to_string),
            timestamp: Instant::now(),
            details,
        };

        match self.records.lock() {
            Ok(mut records) => {
                records.push_back(record);
                if records.len() > MAX_EVENTS {
                    records.pop_front();
                }
            }
            Err(_) => tracing::warn!(?event, "Lifecycle journal lock poisoned, dropping record"),
        }
    }

    /// Recorded events in order, oldest first, optionally only the newest `limit`
    pub fn events(&self, limit: Option<usize>) -> Result<Vec<LifecycleRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|_| Error::Other("Failed to lock lifecycle journal".to_string()))?;

        let skip = match limit {
            Some(limit) => records.len().saturating_sub(limit),
            None => 0,
        };
        Ok(records.iter().skip(skip).cloned().collect())
    }

    /// Number of recorded entries of one kind
    pub fn count(&self, event: LifecycleEvent) -> usize {
        self.records
            .lock()
            .map(|records| records.iter().filter(|r| r.event == event).count())
            .unwrap_or(0)
    }

    /// Events only, oldest first
    pub fn kinds(&self) -> Vec<LifecycleEvent> {
        self.records
            .lock()
            .map(|records| records.iter().map(|r| r.event).collect())
            .unwrap_or_default()
    }

    /// Clear events
    pub fn clear(&self) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| Error::Other("Failed to lock lifecycle journal".to_string()))?;
        records.clear();
        Ok(())
    }
}
