//! HTTP polling transport.

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::Publisher;
use crate::config::LinkConfig;
use crate::error::{Error, Result};
use crate::tracing::prelude::*;
use crate::types::{ConnectionState, Reading};

pub(super) async fn run(
    client: reqwest::Client,
    status_url: String,
    config: LinkConfig,
    publisher: Publisher,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(config.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    trace!(url = %status_url, "Poll session started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = fetch(&client, &status_url, &config, &publisher) => result,
        };

        match result {
            Ok((reading, received_at_ms)) => {
                publisher.set_status(ConnectionState::Connected);
                publisher.publish(reading, received_at_ms);
            }
            Err(e) => {
                debug!(url = %status_url, error = %e, "Poll failed");
                publisher.set_status(ConnectionState::Disconnected);
            }
        }
    }

    trace!(url = %status_url, "Poll session stopped");
}

async fn fetch(
    client: &reqwest::Client,
    status_url: &str,
    config: &LinkConfig,
    publisher: &Publisher,
) -> Result<(Reading, u64)> {
    let response = client
        .get(status_url)
        .timeout(config.poll_timeout)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(Error::Status {
            service: "device",
            status: response.status(),
        });
    }

    let body = response.text().await?;
    let received_at_ms = publisher.now_ms();
    let reading = Reading::from_json(&body, received_at_ms)?;
    Ok((reading, received_at_ms))
}
