//! Time-window de-duplication of repeated events.
//!
//! A [`DebounceStore`] answers one question: has this key fired within the
//! last window? Two layers answer it:
//!
//! - an in-process map of key to [`Instant`], checked and updated
//!   synchronously, which catches rapid duplicates without touching
//!   storage, and
//! - a persisted epoch-millisecond timestamp in the [`KeyValueStore`],
//!   which is authoritative and survives restarts.
//!
//! Storage faults fail open: a key whose timestamp cannot be read is
//! treated as never fired, so a broken disk can never swallow a safety
//! alert.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::store::KeyValueStore;
use crate::tracing::prelude::*;
use crate::types::EpochClock;

pub struct DebounceStore {
    /// Key prefix in the backing store, e.g. `debounce:notify:`.
    namespace: String,
    window: Duration,
    store: Arc<dyn KeyValueStore>,
    clock: EpochClock,
    recent: Mutex<HashMap<String, Instant>>,
}

impl DebounceStore {
    pub fn new(
        domain: &str,
        window: Duration,
        store: Arc<dyn KeyValueStore>,
        clock: EpochClock,
    ) -> Self {
        Self {
            namespace: format!("debounce:{domain}:"),
            window,
            store,
            clock,
            recent: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns `true` if `key` fired within the window and the caller should
    /// skip its work. Otherwise records the key as fired now and returns
    /// `false`.
    pub async fn should_suppress(&self, key: &str) -> bool {
        if self.check_recent(key) {
            trace!(key, "Suppressed by in-process debounce");
            return true;
        }

        let storage_key = format!("{}{key}", self.namespace);
        let now_ms = self.clock.now_ms();
        let window_ms = self.window.as_millis() as u64;

        match self.store.get(&storage_key).await {
            Ok(Some(raw)) => match raw.parse::<u64>() {
                Ok(last_ms) if now_ms.saturating_sub(last_ms) < window_ms => {
                    debug!(key, last_ms, now_ms, "Suppressed by persisted debounce");
                    return true;
                }
                Ok(_) => {}
                Err(_) => warn!(key, value = %raw, "Ignoring unparsable debounce timestamp"),
            },
            Ok(None) => {}
            Err(e) => warn!(key, error = %e, "Debounce read failed, not suppressing"),
        }

        if let Err(e) = self.store.set(&storage_key, &now_ms.to_string()).await {
            warn!(key, error = %e, "Debounce write failed");
        }

        false
    }

    /// Forget the in-process layer. Persisted timestamps are kept.
    pub fn clear(&self) {
        self.recent.lock().clear();
    }

    /// Check-and-insert on the in-process map. Evicts expired entries on the
    /// way so the map stays bounded by the number of keys seen per window.
    fn check_recent(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut recent = self.recent.lock();
        recent.retain(|_, fired_at| now.duration_since(*fired_at) < self.window);

        if recent.contains_key(key) {
            return true;
        }
        recent.insert(key.to_owned(), now);
        false
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::error::{Error, Result};
    use crate::store::MemoryStore;

    const WINDOW: Duration = Duration::from_secs(10);

    /// Store whose every operation fails.
    struct BrokenStore;

    #[async_trait]
    impl KeyValueStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(Error::Other("disk on fire".into()))
        }

        async fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(Error::Other("disk on fire".into()))
        }
    }

    fn debounce(store: Arc<dyn KeyValueStore>) -> DebounceStore {
        DebounceStore::new("test", WINDOW, store, EpochClock::new())
    }

    #[tokio::test(start_paused = true)]
    async fn first_call_proceeds_second_is_suppressed() {
        let debounce = debounce(Arc::new(MemoryStore::new()));

        assert!(!debounce.should_suppress("dev-1:unhooked").await);
        assert!(debounce.should_suppress("dev-1:unhooked").await);
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_keys_are_independent() {
        let debounce = debounce(Arc::new(MemoryStore::new()));

        assert!(!debounce.should_suppress("dev-1:unhooked").await);
        assert!(!debounce.should_suppress("dev-2:unhooked").await);
    }

    #[tokio::test(start_paused = true)]
    async fn proceeds_again_after_window() {
        let debounce = debounce(Arc::new(MemoryStore::new()));

        assert!(!debounce.should_suppress("k").await);
        tokio::time::advance(Duration::from_millis(9_999)).await;
        assert!(debounce.should_suppress("k").await);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(!debounce.should_suppress("k").await);
    }

    #[tokio::test(start_paused = true)]
    async fn persisted_timestamp_suppresses_after_restart() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

        let before_restart = debounce(store.clone());
        assert!(!before_restart.should_suppress("k").await);

        // A fresh instance has an empty in-process layer.
        let after_restart = debounce(store.clone());
        assert!(after_restart.should_suppress("k").await);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_keeps_persisted_guard() {
        let debounce = debounce(Arc::new(MemoryStore::new()));

        assert!(!debounce.should_suppress("k").await);
        debounce.clear();
        assert!(debounce.should_suppress("k").await);
    }

    #[tokio::test(start_paused = true)]
    async fn domains_do_not_share_keys() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let notify = DebounceStore::new("notify", WINDOW, store.clone(), EpochClock::new());
        let history = DebounceStore::new("history", WINDOW, store.clone(), EpochClock::new());

        assert!(!notify.should_suppress("k").await);
        assert!(!history.should_suppress("k").await);
        assert!(store.get("debounce:notify:k").await.unwrap().is_some());
        assert!(store.get("debounce:history:k").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn storage_failure_fails_open() {
        let store: Arc<dyn KeyValueStore> = Arc::new(BrokenStore);

        // Separate instances so the in-process layer cannot mask the store.
        assert!(!debounce(store.clone()).should_suppress("k").await);
        assert!(!debounce(store.clone()).should_suppress("k").await);
    }

    #[tokio::test(start_paused = true)]
    async fn garbage_timestamp_is_ignored() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        store.set("debounce:test:k", "yesterday").await.unwrap();

        assert!(!debounce(store.clone()).should_suppress("k").await);
    }
}
