//! WebSocket transport.

use std::time::Duration;

use futures::{Sink, SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::Publisher;
use crate::tracing::prelude::*;
use crate::types::ConnectionState;

/// How long a requested close may wait on a peer that stopped reading.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

pub(super) async fn run(url: String, publisher: Publisher, cancel: CancellationToken) {
    let connected = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        result = connect_async(url.as_str()) => result,
    };

    let ws_stream = match connected {
        Ok((ws_stream, _response)) => ws_stream,
        Err(e) => {
            warn!(url = %url, error = %e, "WebSocket connection failed");
            publisher.set_status(ConnectionState::Disconnected);
            return;
        }
    };

    info!(url = %url, "WebSocket connected");
    publisher.set_status(ConnectionState::Connected);

    let (mut sink, mut stream) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                send_close(&mut sink).await;
                debug!(url = %url, "WebSocket closed by request");
                return;
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => publisher.publish_payload(&text),
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => publisher.publish_payload(text),
                        Err(_) => trace!("Dropping non-UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        info!(url = %url, ?frame, "Device closed WebSocket");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Ping/pong are answered by tungstenite.
                    }
                    Some(Err(e)) => {
                        warn!(url = %url, error = %e, "WebSocket receive error");
                        break;
                    }
                    None => {
                        debug!(url = %url, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    publisher.set_status(ConnectionState::Disconnected);
}

/// Best effort; the peer may already be gone or wedged.
async fn send_close<S>(sink: &mut S)
where
    S: Sink<Message> + Unpin,
{
    if tokio::time::timeout(CLOSE_TIMEOUT, sink.send(Message::Close(None)))
        .await
        .is_err()
    {
        debug!("WebSocket close frame timed out");
    }
}
