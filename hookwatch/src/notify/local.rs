use async_trait::async_trait;

use super::Notification;
use crate::error::Result;
use crate::tracing::prelude::*;

/// Shows a notification on this device immediately.
#[async_trait]
pub trait LocalNotifier: Send + Sync {
    async fn schedule(&self, notification: &Notification) -> Result<()>;
}

/// Local notifier for headless hosts: the alert goes to the log at warn
/// level, where journald or a log shipper can pick it up.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl LocalNotifier for LogNotifier {
    async fn schedule(&self, notification: &Notification) -> Result<()> {
        warn!(
            device_id = %notification.data.device_id,
            status = %notification.data.status,
            title = %notification.title,
            "{}",
            notification.body
        );
        Ok(())
    }
}
