//! Append-only alert history with a live listener bus.
//!
//! [`HistoryLog::record`] de-duplicates on its own key (device, status,
//! title and body) independently of the notification sink, writes the
//! record to the remote [`HistoryStore`], and broadcasts it to registered
//! listeners whether or not the write succeeded. Listeners see locally
//! observed alerts even while the remote store is unreachable.

mod rest;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;

pub use rest::RestHistoryStore;

use crate::debounce::DebounceStore;
use crate::error::Result;
use crate::tracing::prelude::*;
use crate::types::{AlertRecord, EpochClock};

/// Durable alert history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn insert(&self, record: &AlertRecord) -> Result<()>;

    /// Most recent records first.
    async fn recent(&self, limit: usize) -> Result<Vec<AlertRecord>>;
}

/// History kept in process memory, for hosts without a remote store.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    records: Mutex<Vec<AlertRecord>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn insert(&self, record: &AlertRecord) -> Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AlertRecord>> {
        let mut newest_first = self.records.lock().clone();
        newest_first.sort_by(|a, b| b.delivered_at_ms.cmp(&a.delivered_at_ms));
        newest_first.truncate(limit);
        Ok(newest_first)
    }
}

type Listener = Arc<dyn Fn(&AlertRecord) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

/// Outcome of [`HistoryLog::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// No device identity; not a real sensor episode.
    Dropped,
    /// Identical record already written within the window.
    Suppressed,
    /// Broadcast to listeners. `persisted` is whether the remote insert
    /// succeeded.
    Recorded { persisted: bool },
}

pub struct HistoryLog {
    store: Arc<dyn HistoryStore>,
    debounce: DebounceStore,
    clock: EpochClock,
    listeners: Arc<Mutex<Listeners>>,
}

impl HistoryLog {
    pub fn new(store: Arc<dyn HistoryStore>, debounce: DebounceStore, clock: EpochClock) -> Self {
        Self {
            store,
            debounce,
            clock,
            listeners: Arc::new(Mutex::new(Listeners::default())),
        }
    }

    pub async fn record(
        &self,
        device_id: &str,
        status: &str,
        title: &str,
        body: &str,
    ) -> RecordOutcome {
        if device_id.is_empty() {
            debug!(status, title, "Dropping history record without device id");
            return RecordOutcome::Dropped;
        }

        let key = format!("{device_id}|{status}|{title}|{body}");
        if self.debounce.should_suppress(&key).await {
            debug!(device_id, status, "History record suppressed");
            return RecordOutcome::Suppressed;
        }

        let record = AlertRecord {
            device_id: device_id.to_owned(),
            status: status.to_owned(),
            title: title.to_owned(),
            body: body.to_owned(),
            delivered_at_ms: self.clock.now_ms(),
        };

        let persisted = match self.store.insert(&record).await {
            Ok(()) => true,
            Err(e) => {
                warn!(device_id, status, error = %e, "History insert failed");
                false
            }
        };

        self.broadcast(&record);

        RecordOutcome::Recorded { persisted }
    }

    /// Register a listener for newly recorded alerts. Listeners run in
    /// registration order on the recording task.
    pub fn add_listener<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&AlertRecord) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.lock();
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.entries.push((id, Arc::new(listener)));

        ListenerHandle {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    pub async fn recent(&self, limit: usize) -> Result<Vec<AlertRecord>> {
        self.store.recent(limit).await
    }

    /// Drop every listener.
    pub fn clear_listeners(&self) {
        self.listeners.lock().entries.clear();
    }

    pub(crate) fn debounce(&self) -> &DebounceStore {
        &self.debounce
    }

    fn broadcast(&self, record: &AlertRecord) {
        // Snapshot so a listener may (un)subscribe without deadlocking.
        let snapshot: Vec<Listener> = self
            .listeners
            .lock()
            .entries
            .iter()
            .map(|(_, l)| l.clone())
            .collect();

        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(record))).is_err() {
                error!(device_id = %record.device_id, "History listener panicked");
            }
        }
    }
}

/// Disposer returned by [`HistoryLog::add_listener`].
///
/// Dropping the handle leaves the listener registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
#[derive(Debug)]
pub struct ListenerHandle {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
}

impl ListenerHandle {
    pub fn unsubscribe(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().entries.retain(|(id, _)| *id != self.id);
        }
    }
}
