//! PostgREST-style remote history table.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::HistoryStore;
use crate::config::HistoryConfig;
use crate::error::{Error, Result};
use crate::types::AlertRecord;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Row shape of the `alert_history` table.
#[derive(Debug, Serialize, Deserialize)]
struct HistoryRow {
    device_id: String,
    title: String,
    body: String,
    status: String,
    created_at: String,
}

impl HistoryRow {
    fn from_record(record: &AlertRecord) -> Result<Self> {
        let created_at = OffsetDateTime::from_unix_timestamp_nanos(
            record.delivered_at_ms as i128 * 1_000_000,
        )
        .map_err(|e| Error::Other(format!("timestamp out of range: {e}")))?
        .format(&Rfc3339)
        .map_err(|e| Error::Other(format!("cannot format timestamp: {e}")))?;

        Ok(Self {
            device_id: record.device_id.clone(),
            title: record.title.clone(),
            body: record.body.clone(),
            status: record.status.clone(),
            created_at,
        })
    }

    fn into_record(self) -> Result<AlertRecord> {
        let created_at = OffsetDateTime::parse(&self.created_at, &Rfc3339)
            .map_err(|e| Error::Other(format!("bad created_at {:?}: {e}", self.created_at)))?;

        Ok(AlertRecord {
            device_id: self.device_id,
            status: self.status,
            title: self.title,
            body: self.body,
            delivered_at_ms: (created_at.unix_timestamp_nanos() / 1_000_000).max(0) as u64,
        })
    }
}

/// History table behind a PostgREST endpoint (`{base}/rest/v1/{table}`),
/// authenticated with an API key.
#[derive(Debug, Clone)]
pub struct RestHistoryStore {
    client: reqwest::Client,
    config: HistoryConfig,
}

impl RestHistoryStore {
    pub fn new(client: reqwest::Client, config: HistoryConfig) -> Self {
        Self { client, config }
    }

    fn table_url(&self) -> String {
        format!(
            "{}/rest/v1/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.table
        )
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
            .timeout(REQUEST_TIMEOUT)
    }
}

#[async_trait]
impl HistoryStore for RestHistoryStore {
    async fn insert(&self, record: &AlertRecord) -> Result<()> {
        let row = HistoryRow::from_record(record)?;
        let response = self
            .authorized(self.client.post(self.table_url()))
            .header("Prefer", "return=minimal")
            .json(&row)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Status {
                service: "history store",
                status: response.status(),
            });
        }
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AlertRecord>> {
        let limit = limit.to_string();
        let response = self
            .authorized(self.client.get(self.table_url()))
            .query(&[
                ("select", "device_id,title,body,status,created_at"),
                ("order", "created_at.desc"),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Status {
                service: "history store",
                status: response.status(),
            });
        }

        let rows: Vec<HistoryRow> = response.json().await?;
        rows.into_iter().map(HistoryRow::into_record).collect()
    }
}
