//! Unhooked episode monitor.
//!
//! Consumes [`LinkEvent`]s and raises at most one alert per device per
//! continuous unhooked run, once the run has lasted the configured dwell.
//! A hooked reading ends the run immediately, overriding a pending
//! deadline; an explicit link reset (`connect`/`disconnect`) ends every
//! run. Transport drops alone do not, so a brief reconnect gap does not
//! restart the dwell.

mod episode;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub use episode::{Episode, Phase, Transition};

use crate::config::MonitorConfig;
use crate::link::LinkEvent;
use crate::notify::AlertContext;
use crate::service::Services;
use crate::tracing::prelude::*;
use crate::types::Reading;

/// Status carried by unhooked alerts.
pub const STATUS_UNHOOKED: &str = "unhooked";

const ALERT_TITLE: &str = "Harness unhooked";

pub struct EpisodeMonitor {
    config: MonitorConfig,
    services: Arc<Services>,
    episodes: HashMap<String, Episode>,
}

impl EpisodeMonitor {
    pub fn new(config: MonitorConfig, services: Arc<Services>) -> Self {
        Self {
            config,
            services,
            episodes: HashMap::new(),
        }
    }

    /// Drive the monitor until cancelled or the link goes away.
    ///
    /// Pending link events are always handled before an elapsed deadline,
    /// so a recovery that arrived in time wins over the timer.
    pub async fn run(mut self, mut events: broadcast::Receiver<LinkEvent>, cancel: CancellationToken) {
        debug!(dwell = ?self.config.dwell, "Episode monitor started");

        loop {
            let deadline = self.next_deadline();

            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                event = events.recv() => match event {
                    Ok(event) => self.handle_event(event).await,
                    Err(RecvError::Lagged(missed)) => {
                        // A dropped SessionReset would leave a stale
                        // deadline armed. The next unhooked reading re-arms.
                        warn!(missed, "Episode monitor fell behind, resetting episodes");
                        self.reset();
                    }
                    Err(RecvError::Closed) => {
                        debug!("Link event channel closed");
                        break;
                    }
                },

                _ = sleep_until(deadline) => self.fire_due().await,
            }
        }

        debug!("Episode monitor stopped");
    }

    pub fn episode(&self, device_id: &str) -> Option<&Episode> {
        self.episodes.get(device_id)
    }

    /// Earliest pending dwell deadline across devices.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.episodes.values().filter_map(Episode::deadline).min()
    }

    pub async fn handle_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Reading { reading, .. } => self.observe(reading),
            LinkEvent::SessionReset => self.reset(),
            LinkEvent::Status(status) => trace!(%status, "Link status"),
        }
    }

    /// End every episode: pending deadlines are dropped and fired flags
    /// cleared.
    pub fn reset(&mut self) {
        for episode in self.episodes.values_mut() {
            episode.cancel();
        }
        self.episodes.clear();
    }

    /// Alert for every episode whose deadline has passed and which is
    /// still unhooked.
    pub async fn fire_due(&mut self) {
        let now = Instant::now();
        let due: Vec<Reading> = self
            .episodes
            .values_mut()
            .filter_map(|episode| episode.expire(now))
            .collect();
        self.episodes.retain(|_, episode| episode.phase() != Phase::Idle);

        for reading in due {
            self.alert(&reading).await;
        }
    }

    fn observe(&mut self, reading: Reading) {
        let device_id = reading.device_id.clone();
        let episode = self.episodes.entry(device_id.clone()).or_default();

        match episode.observe(reading, Instant::now(), self.config.dwell) {
            Transition::Armed(_) => debug!(%device_id, "Both hooks detached, dwell started"),
            Transition::Disarmed => debug!(%device_id, "Hooked again before dwell elapsed"),
            Transition::Recovered => info!(%device_id, "Hooked again after alert"),
            Transition::Unchanged => {}
        }

        if episode.phase() == Phase::Idle {
            self.episodes.remove(&device_id);
        }
    }

    async fn alert(&self, reading: &Reading) {
        let body = format!(
            "Both hooks on {} have been detached for {}s.",
            display_device(&reading.device_id),
            self.config.dwell.as_secs()
        );

        warn!(device_id = %reading.device_id, "Unhooked alert");

        let context = AlertContext::new(reading.device_id.as_str(), STATUS_UNHOOKED)
            .with("reading_ts", reading.timestamp_ms);
        let delivery = self
            .services
            .notifications()
            .notify(ALERT_TITLE, &body, context)
            .await;

        let recorded = self
            .services
            .history()
            .record(&reading.device_id, STATUS_UNHOOKED, ALERT_TITLE, &body)
            .await;

        debug!(device_id = %reading.device_id, ?delivery, ?recorded, "Alert handled");
    }
}

fn display_device(device_id: &str) -> &str {
    if device_id.is_empty() {
        "the harness"
    } else {
        device_id
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
