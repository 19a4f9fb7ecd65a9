//! Keeping a link up for a long-running caller.

use tokio_util::sync::CancellationToken;

use super::backoff::ExponentialBackoff;
use super::{DeviceLink, Endpoint};
use crate::tracing::prelude::*;
use crate::types::ConnectionState;

impl DeviceLink {
    /// Connect to `address` and keep it connected until `cancel` fires.
    ///
    /// A WebSocket session ends for good when the socket drops, so each
    /// drop is followed by a fresh [`connect`](DeviceLink::connect) after
    /// an exponential backoff, which resets once the link is `Connected`
    /// again. Polling sessions recover on their own and are left alone.
    /// The link is left connected when this returns.
    pub async fn maintain(&mut self, address: &str, cancel: CancellationToken) {
        let mut backoff =
            ExponentialBackoff::new(self.config.reconnect_initial, self.config.reconnect_max);
        let mut status = self.watch_status();
        self.connect(address);

        loop {
            let current = *status.borrow_and_update();
            info!(status = %current, "Device link");

            match current {
                ConnectionState::Connected => backoff.reset(),
                ConnectionState::Disconnected
                    if matches!(self.endpoint(), Some(Endpoint::WebSocket { .. })) =>
                {
                    let delay = backoff.next_delay();
                    debug!(address, ?delay, "Reconnecting after backoff");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    self.connect(address);
                    continue;
                }
                _ => {}
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    }
}
