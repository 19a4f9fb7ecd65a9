//! Sensor readings and link status.

use serde::Deserialize;

/// Connection status of a device link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// One normalized snapshot of a harness's two hook sensors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    pub device_id: String,
    pub left_sensor: bool,
    pub right_sensor: bool,
    /// Device-reported time, epoch milliseconds.
    pub timestamp_ms: u64,
}

/// Payload as sent by the device firmware, over WebSocket or in
/// `status.json`.
#[derive(Debug, Deserialize)]
struct WireReading {
    #[serde(default)]
    device_id: String,
    left_sensor: bool,
    right_sensor: bool,
    #[serde(default)]
    ts: Option<f64>,
}

impl Reading {
    /// Both hooks are detached.
    pub fn is_unhooked(&self) -> bool {
        !self.left_sensor && !self.right_sensor
    }

    /// Parse a device payload.
    ///
    /// `received_at_ms` stands in for the device timestamp when the payload
    /// omits it (or sends something that is not a usable time).
    pub fn from_json(payload: &str, received_at_ms: u64) -> serde_json::Result<Self> {
        let wire: WireReading = serde_json::from_str(payload)?;
        let timestamp_ms = match wire.ts {
            Some(ts) if ts.is_finite() && ts >= 0.0 => ts as u64,
            _ => received_at_ms,
        };
        Ok(Self {
            device_id: wire.device_id,
            left_sensor: wire.left_sensor,
            right_sensor: wire.right_sensor,
            timestamp_ms,
        })
    }
}
