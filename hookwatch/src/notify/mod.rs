//! Alert delivery.
//!
//! The [`NotificationSink`] fans an alert out to the configured channels:
//! an immediate local notification and, when configured, a remote push
//! relay. Each logical event is delivered at most once per debounce window;
//! the debounce key is `device_id:status`, so rewording an alert does not
//! get it past suppression.
//!
//! Delivery is fire-and-forget. A failing channel is logged and skipped;
//! nothing is retried.

mod local;
mod push;

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

pub use local::{LocalNotifier, LogNotifier};
pub use push::PushRelay;

use crate::debounce::DebounceStore;
use crate::tracing::prelude::*;

/// What a notification is about. Travels with the notification as its data
/// payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertContext {
    pub device_id: String,
    pub status: String,
    /// Additional key/value pairs forwarded to the channels verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AlertContext {
    pub fn new(device_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            status: status.into(),
            extra: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_owned(), value.into());
        self
    }
}

/// A notification as handed to a delivery channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub data: AlertContext,
}

/// Outcome of [`NotificationSink::notify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Same device and status already notified within the window.
    Suppressed,
    /// Handed to every channel; counts how many accepted it.
    Attempted { delivered: usize, failed: usize },
}

pub struct NotificationSink {
    debounce: DebounceStore,
    local: Option<Arc<dyn LocalNotifier>>,
    push: Option<PushRelay>,
}

impl NotificationSink {
    pub fn new(
        debounce: DebounceStore,
        local: Option<Arc<dyn LocalNotifier>>,
        push: Option<PushRelay>,
    ) -> Self {
        Self {
            debounce,
            local,
            push,
        }
    }

    pub async fn notify(&self, title: &str, body: &str, context: AlertContext) -> Delivery {
        let key = format!("{}:{}", context.device_id, context.status);
        if self.debounce.should_suppress(&key).await {
            debug!(device_id = %context.device_id, status = %context.status, "Notification suppressed");
            return Delivery::Suppressed;
        }

        let notification = Notification {
            title: title.to_owned(),
            body: body.to_owned(),
            data: context,
        };

        let mut delivered = 0;
        let mut failed = 0;

        if let Some(local) = &self.local {
            match local.schedule(&notification).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    failed += 1;
                    warn!(device_id = %notification.data.device_id, error = %e, "Local notification failed");
                }
            }
        }

        if let Some(push) = &self.push {
            match push.send(&notification).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    failed += 1;
                    warn!(device_id = %notification.data.device_id, error = %e, "Push delivery failed");
                }
            }
        }

        info!(
            device_id = %notification.data.device_id,
            status = %notification.data.status,
            delivered,
            failed,
            "Alert delivered"
        );

        Delivery::Attempted { delivered, failed }
    }

    pub(crate) fn debounce(&self) -> &DebounceStore {
        &self.debounce
    }
}
