//! Outbound webhook delivery.
//!
//! Delivery is best effort: a payload is posted once, the response body is
//! ignored and any transport failure is logged and swallowed.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// Upper bound for one webhook request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

#[async_trait]
pub trait WebhookSender: Send + Sync {
    /// POST `body` as JSON to `url`. Succeeds once a response arrives,
    /// whatever its status.
    async fn post_json(&self, url: &str, body: &Value) -> Result<()>;
}

/// Sends `payload` to `url`, returning whether the request completed.
///
/// An empty `url` means the webhook is disabled: nothing is sent and the
/// call reports success.
pub async fn send<T: Serialize + ?Sized>(sender: &dyn WebhookSender, url: &str, payload: &T) -> bool {
    if url.is_empty() {
        debug!("Webhook URL not configured, skipping send");
        return true;
    }

    let body = match serde_json::to_value(payload) {
        Ok(body) => body,
        Err(e) => {
            warn!("Failed to serialize webhook payload: {}", e);
            return false;
        }
    };

    match sender.post_json(url, &body).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Webhook delivery to {} failed: {}", url, e);
            false
        }
    }
}

pub struct HttpWebhookSender {
    client: reqwest::Client,
}

impl HttpWebhookSender {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("verhook/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn post_json(&self, url: &str, body: &Value) -> Result<()> {
        let response = self.client.post(url).json(body).send().await?;
        debug!("Webhook {} answered {}", url, response.status());
        Ok(())
    }
}
