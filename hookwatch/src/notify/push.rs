use std::time::Duration;

use serde::Serialize;

use super::{AlertContext, Notification};
use crate::config::PushConfig;
use crate::error::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the remote push relay.
///
/// The relay takes `{token, title, body, data}` and forwards it to the
/// push provider for the registered device token.
#[derive(Debug, Clone)]
pub struct PushRelay {
    client: reqwest::Client,
    config: PushConfig,
}

#[derive(Serialize)]
struct PushRequest<'a> {
    token: &'a str,
    title: &'a str,
    body: &'a str,
    data: &'a AlertContext,
}

impl PushRelay {
    pub fn new(client: reqwest::Client, config: PushConfig) -> Self {
        Self { client, config }
    }

    pub async fn send(&self, notification: &Notification) -> Result<()> {
        let request = PushRequest {
            token: &self.config.token,
            title: &notification.title,
            body: &notification.body,
            data: &notification.data,
        };

        let response = self
            .client
            .post(&self.config.url)
            .timeout(REQUEST_TIMEOUT)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Status {
                service: "push relay",
                status: response.status(),
            });
        }
        Ok(())
    }
}
