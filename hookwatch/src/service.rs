//! Process-wide alert services.
//!
//! [`Services`] bundles the key-value store, the notification sink and the
//! history log. Build it once at startup with [`Services::init`] and hand
//! the `Arc` to whatever needs it; tests build one from parts and call
//! [`Services::reset`] between cases.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::debounce::DebounceStore;
use crate::error::Result;
use crate::history::{HistoryLog, HistoryStore, MemoryHistoryStore, RestHistoryStore};
use crate::notify::{LocalNotifier, LogNotifier, NotificationSink, PushRelay};
use crate::store::{FileStore, KeyValueStore, LAST_ADDRESS_KEY};
use crate::tracing::prelude::*;
use crate::types::EpochClock;

pub struct Services {
    store: Arc<dyn KeyValueStore>,
    notifications: NotificationSink,
    history: HistoryLog,
}

impl Services {
    /// Build the services described by `config`.
    ///
    /// State lives in the configured JSON file. Alerts are shown through
    /// the log and, when configured, the push relay; history goes to the
    /// REST store when configured and process memory otherwise.
    pub async fn init(config: &Config, http: reqwest::Client) -> Result<Arc<Self>> {
        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(&config.state_file).await?);

        let push = config
            .push
            .clone()
            .map(|push| PushRelay::new(http.clone(), push));

        let history_store: Arc<dyn HistoryStore> = match &config.history {
            Some(history) => Arc::new(RestHistoryStore::new(http.clone(), history.clone())),
            None => {
                info!("No history store configured, keeping alert history in memory");
                Arc::new(MemoryHistoryStore::new())
            }
        };

        Ok(Arc::new(Self::from_parts(
            store,
            Some(Arc::new(LogNotifier)),
            push,
            history_store,
            config.debounce_window,
            EpochClock::new(),
        )))
    }

    pub fn from_parts(
        store: Arc<dyn KeyValueStore>,
        local: Option<Arc<dyn LocalNotifier>>,
        push: Option<PushRelay>,
        history_store: Arc<dyn HistoryStore>,
        debounce_window: Duration,
        clock: EpochClock,
    ) -> Self {
        let notify_debounce = DebounceStore::new("notify", debounce_window, store.clone(), clock);
        let history_debounce = DebounceStore::new("history", debounce_window, store.clone(), clock);

        Self {
            store,
            notifications: NotificationSink::new(notify_debounce, local, push),
            history: HistoryLog::new(history_store, history_debounce, clock),
        }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn notifications(&self) -> &NotificationSink {
        &self.notifications
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    /// Forget in-process state: debounce fast paths and history listeners.
    /// Persisted debounce timestamps are left alone.
    pub fn reset(&self) {
        self.notifications.debounce().clear();
        self.history.debounce().clear();
        self.history.clear_listeners();
    }

    /// Remember the device address for the next start.
    pub async fn remember_address(&self, address: &str) {
        if let Err(e) = self.store.set(LAST_ADDRESS_KEY, address).await {
            warn!(address, error = %e, "Failed to persist device address");
        }
    }

    pub async fn last_address(&self) -> Option<String> {
        match self.store.get(LAST_ADDRESS_KEY).await {
            Ok(address) => address.filter(|a| !a.is_empty()),
            Err(e) => {
                warn!(error = %e, "Failed to read last device address");
                None
            }
        }
    }
}
