use serde::{Deserialize, Serialize};

/// One delivered (or attempted) alert, as kept by the history log and
/// broadcast to its listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub device_id: String,
    pub status: String,
    pub title: String,
    pub body: String,
    /// Epoch milliseconds.
    pub delivered_at_ms: u64,
}
