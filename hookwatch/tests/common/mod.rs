//! Device stubs shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::{Router, extract::State, routing::get};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;

use hookwatch::error::Result;
use hookwatch::link::LinkEvent;
use hookwatch::notify::{LocalNotifier, Notification};
use hookwatch::types::Reading;

pub const UNHOOKED: &str = r#"{"device_id":"harness-1","left_sensor":false,"right_sensor":false,"ts":1700000000000}"#;
pub const HOOKED: &str = r#"{"device_id":"harness-1","left_sensor":true,"right_sensor":true,"ts":1700000000000}"#;

/// HTTP device serving `GET /status.json`. `None` answers 503.
pub struct PollDevice {
    pub base_url: String,
    pub payload: Arc<Mutex<Option<String>>>,
    pub requests: Arc<AtomicUsize>,
}

#[derive(Clone)]
struct PollState {
    payload: Arc<Mutex<Option<String>>>,
    requests: Arc<AtomicUsize>,
}

async fn status_json(State(state): State<PollState>) -> (StatusCode, String) {
    state.requests.fetch_add(1, Ordering::SeqCst);
    match state.payload.lock().clone() {
        Some(body) => (StatusCode::OK, body),
        None => (StatusCode::SERVICE_UNAVAILABLE, String::new()),
    }
}

pub async fn poll_device(payload: Option<&str>) -> PollDevice {
    let state = PollState {
        payload: Arc::new(Mutex::new(payload.map(str::to_owned))),
        requests: Arc::new(AtomicUsize::new(0)),
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new()
        .route("/status.json", get(status_json))
        .with_state(state.clone());
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    PollDevice {
        base_url: format!("http://{addr}"),
        payload: state.payload,
        requests: state.requests,
    }
}

/// One request as seen by a [`recording_server`].
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: String,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

/// HTTP endpoint that records every request and answers each with
/// `status` and `body`.
pub struct RecordingServer {
    pub base_url: String,
    pub requests: Arc<Mutex<Vec<Recorded>>>,
}

#[derive(Clone)]
struct RecordingState {
    requests: Arc<Mutex<Vec<Recorded>>>,
    status: StatusCode,
    body: &'static str,
}

async fn record_request(
    State(state): State<RecordingState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, &'static str) {
    state.requests.lock().push(Recorded {
        method,
        uri,
        headers,
        body,
    });
    (state.status, state.body)
}

pub async fn recording_server(status: StatusCode, body: &'static str) -> RecordingServer {
    let state = RecordingState {
        requests: Arc::new(Mutex::new(Vec::new())),
        status,
        body,
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new()
        .fallback(record_request)
        .with_state(state.clone());
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    RecordingServer {
        base_url: format!("http://{addr}"),
        requests: state.requests,
    }
}

/// WebSocket device. Each connection receives `frames` at `interval`, then
/// is closed (`close_after`) or held open until the client leaves.
pub struct WsDevice {
    /// `host:port`, so the link synthesizes `ws://host:port/ws`.
    pub address: String,
    pub accepted: Arc<AtomicUsize>,
}

pub async fn ws_device(frames: Vec<String>, interval: Duration, close_after: bool) -> WsDevice {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));

    let counter = accepted.clone();
    tokio::spawn(async move {
        loop {
            let (tcp, _) = listener.accept().await.unwrap();
            counter.fetch_add(1, Ordering::SeqCst);
            let frames = frames.clone();

            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(tcp).await else {
                    return;
                };
                for frame in frames {
                    if ws.send(Message::Text(frame)).await.is_err() {
                        return;
                    }
                    tokio::time::sleep(interval).await;
                }
                if close_after {
                    let _ = ws.close(None).await;
                } else {
                    while let Some(Ok(_)) = ws.next().await {}
                }
            });
        }
    });

    WsDevice {
        address: addr.to_string(),
        accepted,
    }
}

/// Local notifier that counts what it was asked to show.
#[derive(Default)]
pub struct CountingNotifier {
    pub shown: Mutex<Vec<Notification>>,
}

#[async_trait]
impl LocalNotifier for CountingNotifier {
    async fn schedule(&self, notification: &Notification) -> Result<()> {
        self.shown.lock().push(notification.clone());
        Ok(())
    }
}

/// Wait for the first event matching `pred`, or `None` on timeout.
pub async fn wait_for<F>(
    events: &mut broadcast::Receiver<LinkEvent>,
    timeout: Duration,
    mut pred: F,
) -> Option<LinkEvent>
where
    F: FnMut(&LinkEvent) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Drain everything currently queued.
pub fn drain(events: &mut broadcast::Receiver<LinkEvent>) -> Vec<LinkEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

pub fn readings(events: &[LinkEvent]) -> Vec<Reading> {
    events
        .iter()
        .filter_map(|e| match e {
            LinkEvent::Reading { reading, .. } => Some(reading.clone()),
            _ => None,
        })
        .collect()
}
