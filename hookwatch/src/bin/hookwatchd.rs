//! Unhooked-alert monitor daemon.
//!
//! Connects to the device named by `HOOKWATCH_DEVICE` (or the last device
//! it was connected to), reconnecting dropped WebSockets with backoff, and
//! alerts on sustained unhooked episodes until SIGINT or SIGTERM.

use anyhow::{Result, bail};
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

use hookwatch::config::Config;
use hookwatch::link::{DeviceLink, Endpoint};
use hookwatch::monitor::EpisodeMonitor;
use hookwatch::service::Services;
use hookwatch::tracing::{self, prelude::*};
use hookwatch::types::EpochClock;

#[tokio::main]
async fn main() -> Result<()> {
    tracing::init();

    let config = Config::from_env()?;
    let http = reqwest::Client::new();
    let services = Services::init(&config, http.clone()).await?;

    let address = match &config.device_address {
        Some(address) => address.clone(),
        None => match services.last_address().await {
            Some(address) => {
                info!(%address, "Reconnecting to last device");
                address
            }
            None => bail!("no device address: set HOOKWATCH_DEVICE"),
        },
    };

    let mut link = DeviceLink::new(config.link.clone(), http, EpochClock::new());
    let monitor = EpisodeMonitor::new(config.monitor.clone(), services.clone());

    let running = CancellationToken::new();
    let monitor_task = tokio::spawn(monitor.run(link.subscribe(), running.clone()));

    let _history = services.history().add_listener(|record| {
        info!(
            device_id = %record.device_id,
            status = %record.status,
            delivered_at_ms = record.delivered_at_ms,
            "Alert recorded"
        );
    });

    services.remember_address(&address).await;
    info!(%address, endpoint = ?Endpoint::from_address(&address), "Monitoring device");

    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = link.maintain(&address, running.clone()) => {}
        _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
        _ = sigterm.recv() => info!("Terminated, shutting down"),
    }

    link.disconnect();
    running.cancel();
    monitor_task.await?;

    Ok(())
}
