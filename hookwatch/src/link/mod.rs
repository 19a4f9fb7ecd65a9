//! Live connection to a harness sensor device.
//!
//! A [`DeviceLink`] owns at most one transport session at a time, chosen
//! from the address passed to [`DeviceLink::connect`]:
//!
//! - `http://` / `https://` addresses are polled: `GET {address}/status.json`
//!   every poll interval.
//! - Anything else is a WebSocket target. `ws://` / `wss://` URLs are used
//!   verbatim; a bare `host[:port]` becomes `ws://{host[:port]}/ws`.
//!
//! Transport faults never escape this module. They show up as
//! [`ConnectionState::Disconnected`] and a log line; polling keeps going,
//! while a dropped WebSocket waits for the caller to `connect` again.
//! [`DeviceLink::maintain`] does that with backoff for long-running callers.
//!
//! # Stale sessions
//!
//! Every session is stamped with a generation number. A session may only
//! publish a status change or reading while its generation is current, and
//! the check happens under the same lock [`DeviceLink::disconnect`] takes to
//! bump the generation. Once `disconnect` returns, nothing from the old
//! session can reach subscribers, even if its task has not yet noticed the
//! cancellation.

mod backoff;
mod poll;
mod supervise;
mod ws;

use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use regex::Regex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::LinkConfig;
use crate::tracing::prelude::*;
use crate::types::{ConnectionState, EpochClock, Reading};

const EVENT_CHANNEL_CAPACITY: usize = 256;

static HTTP_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^https?://").expect("static regex"));

static WS_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^wss?://").expect("static regex"));

/// Transport selected for an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// HTTP polling of the given `status.json` URL.
    Poll { status_url: String },
    /// WebSocket stream at the given URL.
    WebSocket { url: String },
}

impl Endpoint {
    pub fn from_address(address: &str) -> Self {
        let address = address.trim();
        if HTTP_ADDRESS.is_match(address) {
            Endpoint::Poll {
                status_url: format!("{}/status.json", address.trim_end_matches('/')),
            }
        } else if WS_ADDRESS.is_match(address) {
            Endpoint::WebSocket {
                url: address.to_owned(),
            }
        } else {
            Endpoint::WebSocket {
                url: format!("ws://{}/ws", address.trim_end_matches('/')),
            }
        }
    }
}

/// Events published to link subscribers, in the order they happened.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Status(ConnectionState),
    Reading {
        reading: Reading,
        /// Local receive time, epoch milliseconds.
        received_at_ms: u64,
    },
    /// The previous session ended by request (`connect` or `disconnect`).
    /// Anything derived from its readings is void.
    SessionReset,
}

struct LinkState {
    generation: u64,
    status: ConnectionState,
    latest: Option<(Reading, u64)>,
}

struct Shared {
    state: Mutex<LinkState>,
    events: broadcast::Sender<LinkEvent>,
    status_tx: watch::Sender<ConnectionState>,
    clock: EpochClock,
}

impl Shared {
    /// Caller holds the state lock.
    fn set_status_locked(&self, state: &mut LinkState, status: ConnectionState) {
        if state.status == status {
            return;
        }
        debug!(from = %state.status, to = %status, "Link status changed");
        state.status = status;
        self.status_tx.send_replace(status);
        // No subscribers is fine.
        let _ = self.events.send(LinkEvent::Status(status));
    }
}

/// A session's handle for publishing into the link.
#[derive(Clone)]
struct Publisher {
    generation: u64,
    shared: Arc<Shared>,
}

impl Publisher {
    fn set_status(&self, status: ConnectionState) {
        let mut state = self.shared.state.lock();
        if state.generation != self.generation {
            return;
        }
        self.shared.set_status_locked(&mut state, status);
    }

    fn publish(&self, reading: Reading, received_at_ms: u64) {
        let mut state = self.shared.state.lock();
        if state.generation != self.generation {
            return;
        }
        state.latest = Some((reading.clone(), received_at_ms));
        let _ = self.shared.events.send(LinkEvent::Reading {
            reading,
            received_at_ms,
        });
    }

    /// Parse and publish a pushed payload. Malformed payloads are dropped
    /// without touching the link status.
    fn publish_payload(&self, payload: &str) {
        let received_at_ms = self.now_ms();
        match Reading::from_json(payload, received_at_ms) {
            Ok(reading) => self.publish(reading, received_at_ms),
            Err(e) => trace!(error = %e, "Dropping malformed device payload"),
        }
    }

    fn now_ms(&self) -> u64 {
        self.shared.clock.now_ms()
    }
}

struct Session {
    endpoint: Endpoint,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct DeviceLink {
    config: LinkConfig,
    http: reqwest::Client,
    shared: Arc<Shared>,
    session: Option<Session>,
}

impl DeviceLink {
    pub fn new(config: LinkConfig, http: reqwest::Client, clock: EpochClock) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (status_tx, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            config,
            http,
            shared: Arc::new(Shared {
                state: Mutex::new(LinkState {
                    generation: 0,
                    status: ConnectionState::Disconnected,
                    latest: None,
                }),
                events,
                status_tx,
                clock,
            }),
            session: None,
        }
    }

    /// Subscribe to status changes, readings and session resets.
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.shared.events.subscribe()
    }

    /// Watch the connection status.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionState> {
        self.shared.status_tx.subscribe()
    }

    pub fn status(&self) -> ConnectionState {
        self.shared.state.lock().status
    }

    /// Most recent reading of the current session and when it arrived.
    pub fn latest(&self) -> Option<(Reading, u64)> {
        self.shared.state.lock().latest.clone()
    }

    /// Endpoint of the current session, if any.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.session.as_ref().map(|s| &s.endpoint)
    }

    /// Tear down any current session and start one for `address`.
    ///
    /// Status is [`Connecting`](ConnectionState::Connecting) when this
    /// returns; the transport itself comes up in the background. Must be
    /// called from within a tokio runtime.
    pub fn connect(&mut self, address: &str) -> Endpoint {
        self.disconnect();

        let endpoint = Endpoint::from_address(address);
        let cancel = CancellationToken::new();

        let publisher = {
            let mut state = self.shared.state.lock();
            state.generation += 1;
            self.shared
                .set_status_locked(&mut state, ConnectionState::Connecting);
            Publisher {
                generation: state.generation,
                shared: self.shared.clone(),
            }
        };

        info!(address, endpoint = ?endpoint, "Connecting to device");

        let task = match &endpoint {
            Endpoint::Poll { status_url } => tokio::spawn(poll::run(
                self.http.clone(),
                status_url.clone(),
                self.config.clone(),
                publisher,
                cancel.clone(),
            )),
            Endpoint::WebSocket { url } => tokio::spawn(ws::run(url.clone(), publisher, cancel.clone())),
        };

        self.session = Some(Session {
            endpoint: endpoint.clone(),
            cancel,
            task,
        });

        endpoint
    }

    /// Stop the current session, if any, and reset to
    /// [`Disconnected`](ConnectionState::Disconnected). Always publishes
    /// [`LinkEvent::SessionReset`] so consumers drop episode state.
    ///
    /// The session task is cancelled, not aborted, so a WebSocket gets its
    /// close frame out. That close is bounded by a short timeout.
    pub fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel.cancel();
            debug!(endpoint = ?session.endpoint, "Device session cancelled");
        }

        let mut state = self.shared.state.lock();
        state.generation += 1;
        state.latest = None;
        let _ = self.shared.events.send(LinkEvent::SessionReset);
        self.shared
            .set_status_locked(&mut state, ConnectionState::Disconnected);
    }
}

impl Drop for DeviceLink {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel.cancel();
            session.task.abort();
        }
    }
}
